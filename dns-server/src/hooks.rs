//! Event hooks: a place for the surrounding binary to plug in
//! behaviour (structured audit logging, alerting, rate limiting)
//! without the server loop itself knowing about any of it.

use std::net::SocketAddr;
use std::sync::Arc;

use dns_proto::message::Message;

/// Called at each point in a request's lifecycle the server loop
/// passes through. The default implementation logs at `tracing`
/// `debug`/`warn` level; a binary can override any subset of these to
/// add its own behaviour.
pub trait Hooks: Send + Sync {
    fn client_connected(&self, peer: SocketAddr) {
        tracing::debug!(%peer, "client connected");
    }

    fn query_received(&self, peer: SocketAddr, request: &Message) {
        tracing::debug!(%peer, id = request.header.id, "query received");
    }

    fn invalid_signed_message_received(&self, peer: SocketAddr, tsig_error: u16) {
        tracing::warn!(%peer, tsig_error, "invalid signed message received");
    }

    fn exception_thrown(&self, peer: Option<SocketAddr>, error: &dyn std::error::Error) {
        tracing::error!(?peer, %error, "exception thrown while handling request");
    }
}

/// The hooks implementation used when a binary doesn't supply its own.
pub struct DefaultHooks;
impl Hooks for DefaultHooks {}

pub type SharedHooks = Arc<dyn Hooks>;
