//! Subscriber registry and broadcast.
//!
//! The broker owns every open event-stream connection, keyed by client.
//! Broadcasts share the read lock and write to each connection in turn;
//! connections whose write fails are collected and removed afterwards under
//! the write lock, so the read lock is never upgraded mid-iteration.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use super::sink::StreamingSink;

/// The only frame ever sent to subscribers.
///
/// `data:` is mandatory for the browser to dispatch a message; named events
/// are not used because clients only listen on `onmessage`.
pub const RELOAD_FRAME: &[u8] = b"data: reload\n\n";

/// Registry key of a subscriber.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Key derived from the remote endpoint only.
    ///
    /// Two connections from the same address and port map to the same key.
    #[must_use]
    pub fn remote(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }

    /// Key derived from the remote endpoint plus a fresh session id.
    #[must_use]
    pub fn session(addr: SocketAddr) -> Self {
        Self(format!("{addr}#{}", Uuid::new_v4().simple()))
    }
}

#[cfg(test)]
impl From<&str> for ClientKey {
    fn from(key: &str) -> Self {
        Self(key.to_owned())
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered subscriber connection.
///
/// Writes to one connection are serialized, so concurrent broadcasts never
/// interleave bytes on the same stream.
pub struct Connection {
    sink: Mutex<Box<dyn StreamingSink>>,
}

impl Connection {
    /// Wrap a streaming sink.
    #[must_use]
    pub fn new(sink: Box<dyn StreamingSink>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    /// Write `frame` and flush it to the peer.
    fn send(&self, frame: &[u8]) -> io::Result<()> {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        sink.write(frame)?;
        sink.flush()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Outcome of a single broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers the frame was written and flushed to.
    pub delivered: usize,
    /// Subscribers whose write failed and that were removed.
    pub dropped: usize,
}

/// Registry of subscriber connections.
#[derive(Debug, Default)]
pub struct Broker {
    connections: RwLock<HashMap<ClientKey, Arc<Connection>>>,
}

impl Broker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ClientKey, Arc<Connection>>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ClientKey, Arc<Connection>>> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `connection` under `key`, replacing any existing entry.
    ///
    /// Returns the registered handle, for use with
    /// [`unregister_connection`](Self::unregister_connection).
    pub fn register(&self, key: ClientKey, connection: Connection) -> Arc<Connection> {
        let connection = Arc::new(connection);
        let replaced = self
            .write()
            .insert(key.clone(), Arc::clone(&connection));
        if replaced.is_some() {
            tracing::warn!(client = %key, "Subscriber key reused, previous connection replaced");
        } else {
            tracing::debug!(client = %key, "Subscriber registered");
        }
        connection
    }

    /// Remove `key`. Removing an absent key is a no-op.
    pub fn unregister(&self, key: &ClientKey) {
        if self.write().remove(key).is_some() {
            tracing::debug!(client = %key, "Subscriber unregistered");
        }
    }

    /// Remove `key` only while it still maps to `connection`.
    ///
    /// A connection that was replaced under its key never removes its
    /// replacement.
    pub fn unregister_connection(&self, key: &ClientKey, connection: &Arc<Connection>) {
        if remove_if_current(&mut self.write(), key, connection) {
            tracing::debug!(client = %key, "Subscriber unregistered");
        }
    }

    /// Write `payload` to every subscriber.
    ///
    /// A failing subscriber is removed and never affects delivery to the
    /// others. Removal only happens if the key still maps to the connection
    /// that failed.
    pub fn broadcast(&self, payload: &[u8]) -> BroadcastReport {
        let mut failed = Vec::new();
        let mut delivered = 0;

        {
            let connections = self.read();
            for (key, connection) in connections.iter() {
                match connection.send(payload) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        tracing::debug!(client = %key, error = %e, "Subscriber write failed");
                        failed.push((key.clone(), Arc::clone(connection)));
                    }
                }
            }
        }

        if !failed.is_empty() {
            self.remove_failed(&failed);
        }

        BroadcastReport {
            delivered,
            dropped: failed.len(),
        }
    }

    /// Remove connections whose write failed, skipping keys that were
    /// re-registered in the meantime.
    fn remove_failed(&self, failed: &[(ClientKey, Arc<Connection>)]) {
        let mut connections = self.write();
        for (key, connection) in failed {
            remove_if_current(&mut connections, key, connection);
        }
    }

    /// Broadcast [`RELOAD_FRAME`].
    pub fn reload(&self) -> BroadcastReport {
        self.broadcast(RELOAD_FRAME)
    }

    /// Drop every connection, ending their event streams.
    ///
    /// Returns the number of connections closed.
    pub fn close_all(&self) -> usize {
        let closed = std::mem::take(&mut *self.write());
        closed.len()
    }

    /// Whether `key` is registered.
    #[cfg(test)]
    pub(crate) fn contains(&self, key: &ClientKey) -> bool {
        self.read().contains_key(key)
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no subscriber is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

fn remove_if_current(
    connections: &mut HashMap<ClientKey, Arc<Connection>>,
    key: &ClientKey,
    connection: &Arc<Connection>,
) -> bool {
    let current = connections
        .get(key)
        .is_some_and(|registered| Arc::ptr_eq(registered, connection));
    if current {
        connections.remove(key);
    }
    current
}
