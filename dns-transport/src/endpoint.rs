//! Nameserver endpoints: an address, port and transport protocol.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Which of UDP, TCP or DNS-over-TLS a query should be sent over.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    Tcp,
    Tls,
}

impl Protocol {
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Udp | Protocol::Tcp => 53,
            Protocol::Tls => 853,
        }
    }
}

/// A nameserver to talk to: address, port and protocol. Multicast
/// addresses carry an optional `scope_id` naming the interface to
/// bind to (RFC 4291 section 2.7), since a single multicast group can
/// be reachable over several interfaces at once.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Endpoint {
    pub address: IpAddr,
    pub port: u16,
    pub protocol: Protocol,
    pub scope_id: Option<u32>,
}

impl Endpoint {
    pub fn new(address: IpAddr, protocol: Protocol) -> Self {
        Endpoint {
            address,
            port: protocol.default_port(),
            protocol,
            scope_id: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_scope_id(mut self, scope_id: u32) -> Self {
        self.scope_id = Some(scope_id);
        self
    }

    pub fn is_multicast(&self) -> bool {
        self.address.is_multicast()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Expands a multicast endpoint into one concrete endpoint per
    /// network interface that could plausibly reach it, so the
    /// caller can query over each and take the first answer. A
    /// non-multicast endpoint expands to itself.
    pub fn expand_over_interfaces(&self, interfaces: &[u32]) -> Vec<Endpoint> {
        if !self.is_multicast() || interfaces.is_empty() {
            return vec![self.clone()];
        }
        interfaces
            .iter()
            .map(|&scope_id| self.clone().with_scope_id(scope_id))
            .collect()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Protocol::Udp => write!(f, "udp://{}:{}", self.address, self.port),
            Protocol::Tcp => write!(f, "tcp://{}:{}", self.address, self.port),
            Protocol::Tls => write!(f, "tls://{}:{}", self.address, self.port),
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), Protocol::Udp)
    }
}
