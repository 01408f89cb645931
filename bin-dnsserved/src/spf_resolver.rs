//! A [`dns_spf::Resolver`] backed by a real upstream query, so the
//! periodic SPF health check has something to ask. Every lookup goes
//! out over the endpoint this binary was given at startup; there is
//! no cache here, that's [`dns_client`]'s concern if it ever grows
//! one.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use dns_client::config::ClientConfig;
use dns_client::query::{query, QueryError};
use dns_proto::message::Question;
use dns_proto::name::DomainName;
use dns_proto::record::{QueryClass, QueryType, RecordClass, RecordType, RecordTypeWithData};
use dns_spf::{LookupError, Resolver};
use dns_transport::endpoint::Endpoint;

pub struct DnsClientResolver {
    endpoint: Endpoint,
    config: ClientConfig,
}

impl DnsClientResolver {
    pub fn new(endpoint: Endpoint) -> Self {
        DnsClientResolver {
            endpoint,
            config: ClientConfig::default(),
        }
    }

    async fn lookup(&self, domain: &str, qtype: QueryType) -> Result<Vec<RecordTypeWithData>, LookupError> {
        let name = DomainName::from_dotted_string(domain).map_err(|_| LookupError)?;
        let question = Question {
            name,
            qtype,
            qclass: QueryClass::Record(RecordClass::IN),
        };
        let outcome = query(
            std::slice::from_ref(&self.endpoint),
            question,
            &self.config,
            None,
            &CancellationToken::new(),
        )
        .await
        .map_err(|error: QueryError| {
            tracing::debug!(%domain, %error, "spf resolver lookup failed");
            LookupError
        })?;
        Ok(outcome.message.answers.into_iter().map(|rr| rr.rdata).collect())
    }
}

#[async_trait]
impl Resolver for DnsClientResolver {
    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>, LookupError> {
        let records = self.lookup(domain, QueryType::Record(RecordType::TXT)).await?;
        Ok(records
            .into_iter()
            .filter_map(|rdata| match rdata {
                RecordTypeWithData::Txt { octets } => Some(
                    octets
                        .into_iter()
                        .map(|chunk| String::from_utf8_lossy(&chunk).into_owned())
                        .collect::<String>(),
                ),
                _ => None,
            })
            .collect())
    }

    async fn lookup_a(&self, domain: &str) -> Result<Vec<Ipv4Addr>, LookupError> {
        let records = self.lookup(domain, QueryType::Record(RecordType::A)).await?;
        Ok(records
            .into_iter()
            .filter_map(|rdata| match rdata {
                RecordTypeWithData::A { address } => Some(address),
                _ => None,
            })
            .collect())
    }

    async fn lookup_aaaa(&self, domain: &str) -> Result<Vec<Ipv6Addr>, LookupError> {
        let records = self.lookup(domain, QueryType::Record(RecordType::AAAA)).await?;
        Ok(records
            .into_iter()
            .filter_map(|rdata| match rdata {
                RecordTypeWithData::Aaaa { address } => Some(address),
                _ => None,
            })
            .collect())
    }

    async fn lookup_mx(&self, domain: &str) -> Result<Vec<String>, LookupError> {
        let records = self.lookup(domain, QueryType::Record(RecordType::MX)).await?;
        let mut by_preference: Vec<(u16, String)> = records
            .into_iter()
            .filter_map(|rdata| match rdata {
                RecordTypeWithData::Mx { preference, exchange } => {
                    Some((preference, exchange.to_dotted_string()))
                }
                _ => None,
            })
            .collect();
        by_preference.sort_by_key(|(preference, _)| *preference);
        Ok(by_preference.into_iter().map(|(_, exchange)| exchange).collect())
    }

    async fn lookup_ptr(&self, ip: IpAddr) -> Result<Vec<String>, LookupError> {
        let name = reverse_name(ip);
        let records = self.lookup(&name, QueryType::Record(RecordType::PTR)).await?;
        Ok(records
            .into_iter()
            .filter_map(|rdata| match rdata {
                RecordTypeWithData::Ptr { ptrdname } => Some(ptrdname.to_dotted_string()),
                _ => None,
            })
            .collect())
    }
}

/// Builds the `in-addr.arpa.`/`ip6.arpa.` owner name a PTR lookup for
/// `ip` would use.
fn reverse_name(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            format!(
                "{}.{}.{}.{}.in-addr.arpa.",
                octets[3], octets[2], octets[1], octets[0]
            )
        }
        IpAddr::V6(v6) => {
            let mut nibbles = String::new();
            for byte in v6.octets().iter().rev() {
                nibbles.push_str(&format!("{:x}.{:x}.", byte & 0xf, byte >> 4));
            }
            format!("{nibbles}ip6.arpa.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_name_v4() {
        let ip = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!("1.2.0.192.in-addr.arpa.", reverse_name(ip));
    }

    #[test]
    fn reverse_name_v6() {
        let ip = IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1));
        let name = reverse_name(ip);
        assert!(name.ends_with("ip6.arpa."));
        assert!(name.starts_with("1.0.0.0."));
    }
}
