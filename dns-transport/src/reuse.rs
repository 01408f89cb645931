//! A small table of kept-alive TCP connections, keyed by endpoint,
//! each torn down after an idle timeout. Single-writer discipline: a
//! caller that wants exclusive use of a connection `take`s it out of
//! the table and, if it wants to keep it alive for next time, `put`s
//! it back.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::endpoint::Endpoint;

struct Entry {
    stream: TcpStream,
    last_used: Instant,
}

/// Default idle timeout for a kept-alive connection (matches the
/// client configuration default of 5000ms).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(5_000);

pub struct ConnectionTable {
    idle_timeout: Duration,
    entries: Mutex<HashMap<Endpoint, Entry>>,
}

impl ConnectionTable {
    pub fn new(idle_timeout: Duration) -> Self {
        ConnectionTable {
            idle_timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Removes and returns a still-fresh connection for `endpoint`,
    /// if one is sitting idle in the table. A connection past its
    /// idle timeout is dropped rather than handed back.
    pub async fn take(&self, endpoint: &Endpoint) -> Option<TcpStream> {
        let mut entries = self.entries.lock().await;
        let entry = entries.remove(endpoint)?;
        if entry.last_used.elapsed() > self.idle_timeout {
            tracing::trace!(%endpoint, "dropping expired pooled connection");
            None
        } else {
            Some(entry.stream)
        }
    }

    /// Stores `stream` for reuse against future queries to `endpoint`,
    /// replacing (and dropping) whatever was there before.
    pub async fn put(&self, endpoint: Endpoint, stream: TcpStream) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            endpoint,
            Entry {
                stream,
                last_used: Instant::now(),
            },
        );
    }

    /// Drops every entry that has been idle past the timeout. Callers
    /// run this periodically; it does not run itself.
    pub async fn prune(&self) {
        let mut entries = self.entries.lock().await;
        let idle_timeout = self.idle_timeout;
        entries.retain(|endpoint, entry| {
            let keep = entry.last_used.elapsed() <= idle_timeout;
            if !keep {
                tracing::trace!(%endpoint, "pruning idle pooled connection");
            }
            keep
        });
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        ConnectionTable::new(DEFAULT_IDLE_TIMEOUT)
    }
}
