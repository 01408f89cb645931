#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]

//! UDP, TCP and DNS-over-TLS I/O primitives: framing, endpoint
//! selection, and a small connection-reuse table. No DNS semantics
//! live here beyond the 512-octet UDP cutoff and the two-octet TCP
//! length prefix (RFC 1035 section 4.2); retry/fallback policy is
//! `dns-client`'s job.

pub mod endpoint;
pub mod framing;
pub mod reuse;
pub mod tls;

pub use endpoint::{Endpoint, Protocol};
pub use framing::{read_tcp_message, send_tcp_message, send_udp_message};
pub use reuse::ConnectionTable;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error talking to {endpoint}: {source}")]
    Io {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },
    #[error("message of {0} octets is too large for a single UDP datagram without truncation")]
    MessageTooLargeForUdp(usize),
    #[error("peer sent a TCP message length prefix of {0}, which does not fit in memory bounds")]
    TcpLengthPrefixInvalid(u16),
    #[error("TLS handshake with {endpoint} failed: {source}")]
    Tls {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },
    #[error("operation on {endpoint} timed out")]
    Timeout { endpoint: Endpoint },
}
