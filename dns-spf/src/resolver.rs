//! The lookups an SPF evaluation needs, abstracted behind a trait so
//! this crate doesn't depend on a concrete query engine: a binary
//! wires this up against `dns-client`, a test wires it up against a
//! fixed map.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
#[error("DNS lookup failed")]
pub struct LookupError;

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>, LookupError>;
    async fn lookup_a(&self, domain: &str) -> Result<Vec<Ipv4Addr>, LookupError>;
    async fn lookup_aaaa(&self, domain: &str) -> Result<Vec<Ipv6Addr>, LookupError>;
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<String>, LookupError>;
    async fn lookup_ptr(&self, ip: IpAddr) -> Result<Vec<String>, LookupError>;
}
