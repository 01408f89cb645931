//! Client configuration options, loadable from a YAML file via the
//! `config` crate, and overridable by CLI flags in `dnsq`.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub query_timeout_ms: u64,
    pub response_validation: bool,
    pub case_randomization_0x20: bool,
    pub reuse_tcp: bool,
    pub idle_timeout_ms: u64,
    pub udp_payload_size: u16,
}

impl ClientConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            query_timeout_ms: 10_000,
            response_validation: true,
            case_randomization_0x20: false,
            reuse_tcp: false,
            idle_timeout_ms: 5_000,
            udp_payload_size: 1232,
        }
    }
}
