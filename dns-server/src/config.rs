//! Server configuration: transports to listen on, timeouts, and the
//! TSIG keys available to [`crate::tsig`]. Loadable from a YAML file
//! via the `config` crate, with the same options exposed as `clap`
//! flags for the `dnsserved` binary so a flag on the command line
//! overrides whatever the file says.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use dns_proto::name::DomainName;
use dns_proto::tsig::{Algorithm, KeySelector};
use dns_transport::endpoint::Protocol;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ListenEndpoint {
    pub protocol: Protocol,
    pub address: IpAddr,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TsigKeyConfig {
    pub name: String,
    pub algorithm: String,
    /// Base64-encoded shared secret.
    pub secret_base64: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub transports: Vec<ListenEndpoint>,
    pub timeout_ms: u64,
    pub keepalive_ms: u64,
    pub tsig_keys: Vec<TsigKeyConfig>,
    pub udp_payload_size: u16,
    /// Domains to periodically re-check the SPF record of; see
    /// [`crate::spf_watch`].
    pub spf_check_domains: Vec<String>,
    pub spf_check_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            transports: vec![ListenEndpoint {
                protocol: Protocol::Udp,
                address: IpAddr::from([0, 0, 0, 0]),
                port: 53,
            }],
            timeout_ms: 10_000,
            keepalive_ms: 5_000,
            tsig_keys: Vec::new(),
            udp_payload_size: 1232,
            spf_check_domains: Vec::new(),
            spf_check_interval_ms: 300_000,
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }

    pub fn spf_check_interval(&self) -> Duration {
        Duration::from_millis(self.spf_check_interval_ms)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()
    }

    /// Builds the [`KeySelector`] this configuration's keys provide,
    /// for signing and verifying TSIG-protected requests.
    pub fn key_selector(&self) -> Result<ConfiguredKeys, KeyConfigError> {
        let mut keys = HashMap::new();
        for key in &self.tsig_keys {
            let name = DomainName::from_dotted_string(&key.name)
                .map_err(|_| KeyConfigError::InvalidName(key.name.clone()))?;
            let algorithm = Algorithm::from_dotted_name(&key.algorithm)
                .ok_or_else(|| KeyConfigError::UnknownAlgorithm(key.algorithm.clone()))?;
            let secret = base64_decode(&key.secret_base64)
                .ok_or_else(|| KeyConfigError::InvalidSecret(key.name.clone()))?;
            keys.insert((name, algorithm), secret);
        }
        Ok(ConfiguredKeys { keys })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyConfigError {
    #[error("invalid TSIG key name: {0}")]
    InvalidName(String),
    #[error("unknown TSIG algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("invalid base64 secret for key: {0}")]
    InvalidSecret(String),
}

/// A [`KeySelector`] built from [`ServerConfig::tsig_keys`].
pub struct ConfiguredKeys {
    keys: HashMap<(DomainName, Algorithm), Vec<u8>>,
}

impl KeySelector for ConfiguredKeys {
    fn key_for(&self, key_name: &DomainName, algorithm: Algorithm) -> Option<Vec<u8>> {
        self.keys.get(&(key_name.clone(), algorithm)).cloned()
    }
}

/// A small dependency-free base64 decoder (standard alphabet, with or
/// without padding) so this module doesn't need to pull in a
/// dedicated crate for the one decode TSIG key loading needs.
fn base64_decode(input: &str) -> Option<Vec<u8>> {
    fn value(byte: u8) -> Option<u8> {
        match byte {
            b'A'..=b'Z' => Some(byte - b'A'),
            b'a'..=b'z' => Some(byte - b'a' + 26),
            b'0'..=b'9' => Some(byte - b'0' + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }
    let cleaned: Vec<u8> = input.bytes().filter(|&b| b != b'=' && !b.is_ascii_whitespace()).collect();
    let mut out = Vec::with_capacity(cleaned.len() * 3 / 4);
    for chunk in cleaned.chunks(4) {
        let vals: Vec<u8> = chunk.iter().map(|&b| value(b)).collect::<Option<_>>()?;
        out.push((vals[0] << 2) | (vals.get(1).copied().unwrap_or(0) >> 4));
        if vals.len() > 2 {
            out.push((vals[1] << 4) | (vals[2] >> 2));
        }
        if vals.len() > 3 {
            out.push((vals[2] << 6) | vals[3]);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(10_000, config.timeout_ms);
        assert_eq!(5_000, config.keepalive_ms);
    }

    #[test]
    fn base64_round_trips_a_known_value() {
        assert_eq!(Some(b"hello".to_vec()), base64_decode("aGVsbG8="));
    }

    #[test]
    fn key_selector_finds_configured_key() {
        let mut config = ServerConfig::default();
        config.tsig_keys.push(TsigKeyConfig {
            name: "key.example.".to_string(),
            algorithm: "hmac-sha256.".to_string(),
            secret_base64: "aGVsbG8=".to_string(),
        });
        let selector = config.key_selector().unwrap();
        let name = DomainName::from_dotted_string("key.example.").unwrap();
        assert_eq!(Some(b"hello".to_vec()), selector.key_for(&name, Algorithm::HmacSha256));
    }
}
