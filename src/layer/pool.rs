//! Idle connection reuse per remote address.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::config::TransportConfig;
use crate::core::{Connection, StreamLayer, TransportResult};

/// Keeps up to `max_pool` idle connections per remote address and dials
/// new ones on demand.
pub struct ConnPool<S: StreamLayer> {
    layer: Arc<S>,
    max_pool: usize,
    timeout: Duration,
    idle: Mutex<HashMap<String, Vec<S::Conn>>>,
}

impl<S: StreamLayer> ConnPool<S> {
    /// Create a pool dialing through `layer` with the given deadline.
    pub fn new(layer: Arc<S>, max_pool: usize, timeout: Duration) -> Self {
        Self {
            layer,
            max_pool,
            timeout,
            idle: Mutex::new(HashMap::new()),
        }
    }

    /// Create a pool using `max_pool` and `timeout` from `config`.
    pub fn from_config(layer: Arc<S>, config: &TransportConfig) -> Self {
        Self::new(layer, config.max_pool, config.timeout)
    }

    /// The stream layer connections are dialed through.
    pub fn layer(&self) -> &Arc<S> {
        &self.layer
    }

    /// Take an idle connection to `addr`, or dial a new one.
    pub async fn get(&self, addr: &str) -> TransportResult<S::Conn> {
        loop {
            let pooled = self.idle.lock().get_mut(addr).and_then(Vec::pop);
            match pooled {
                Some(conn) if !conn.is_closed() => {
                    trace!(addr, "reusing pooled connection");
                    return Ok(conn);
                }
                // Dead: dropping it releases whatever is left.
                Some(_) => continue,
                None => break,
            }
        }

        trace!(addr, "no pooled connection, dialing");
        self.layer.dial(addr, self.timeout).await
    }

    /// Return a connection for reuse. Closes it when the pool for `addr`
    /// is full or the connection is already dead.
    pub async fn put(&self, addr: &str, conn: S::Conn) {
        if conn.is_closed() {
            return;
        }
        let overflow = {
            let mut idle = self.idle.lock();
            let conns = idle.entry(addr.to_owned()).or_default();
            if conns.len() < self.max_pool {
                conns.push(conn);
                None
            } else {
                Some(conn)
            }
        };

        if let Some(mut conn) = overflow {
            debug!(addr, max_pool = self.max_pool, "pool full, closing connection");
            if let Err(err) = conn.close().await {
                warn!(addr, %err, "closing surplus connection failed");
            }
        }
    }

    /// Idle connections currently pooled for `addr`.
    pub fn idle_count(&self, addr: &str) -> usize {
        self.idle.lock().get(addr).map_or(0, Vec::len)
    }

    /// Close every idle connection. Returns the last close failure.
    pub async fn close_all(&self) -> TransportResult<()> {
        let conns: Vec<S::Conn> = self.idle.lock().drain().flat_map(|(_, conns)| conns).collect();
        let mut failure = None;
        for mut conn in conns {
            if let Err(err) = conn.close().await {
                warn!(%err, "closing pooled connection failed");
                failure = Some(err);
            }
        }
        failure.map_or(Ok(()), Err)
    }
}
