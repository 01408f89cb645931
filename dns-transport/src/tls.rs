//! DNS-over-TLS (RFC 7858): a TLS session wrapped around the same
//! length-prefixed framing TCP uses.

use std::net::SocketAddr;
use std::sync::Arc;

use rustls::{ClientConfig, RootCertStore, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::{Endpoint, TransportError};

/// Builds a `ClientConfig` trusting the Mozilla root store shipped by
/// `webpki-roots`. Authoritative server operators who terminate TLS
/// with a private CA should build their own `ClientConfig` instead of
/// going through this helper.
pub fn webpki_client_config() -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));
    Arc::new(
        ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

/// Opens a TCP connection to `endpoint` and performs a TLS handshake,
/// verifying the peer's certificate against `server_name` (the
/// nameserver's hostname, per RFC 7858 section 4.1).
pub async fn connect(
    config: Arc<ClientConfig>,
    endpoint: &Endpoint,
    server_name: &str,
) -> Result<TlsStream<TcpStream>, TransportError> {
    let addr: SocketAddr = endpoint.socket_addr();
    let tcp = TcpStream::connect(addr).await.map_err(|source| TransportError::Io {
        endpoint: endpoint.clone(),
        source,
    })?;
    let name = ServerName::try_from(server_name).map_err(|e| TransportError::Tls {
        endpoint: endpoint.clone(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
    })?;
    let connector = TlsConnector::from(config);
    connector
        .connect(name, tcp)
        .await
        .map_err(|source| TransportError::Tls {
            endpoint: endpoint.clone(),
            source,
        })
}
