//! KCP raw connections.
//!
//! [`KcpRawListener`] and [`KcpRawDialer`] plug `tokio_kcp` into the
//! stream layer as its raw connection collaborators.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::lookup_host;
use tokio::sync::{Mutex, watch};
use tokio_kcp::{KcpConfig, KcpListener, KcpStream};
use tracing::{debug, trace};

use crate::core::{BoxedConn, RawDialer, RawListener};

fn kcp_error<E>(err: E) -> io::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    io::Error::other(err)
}

fn listener_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "kcp listener closed")
}

/// Bound KCP listener.
pub struct KcpRawListener {
    inner: Mutex<Option<KcpListener>>,
    local_addr: SocketAddr,
    closed: watch::Sender<bool>,
}

impl KcpRawListener {
    /// Bind a KCP listener on `addr`.
    pub async fn bind(addr: SocketAddr, config: KcpConfig) -> io::Result<Self> {
        let listener = KcpListener::bind(config, addr).await.map_err(kcp_error)?;
        let local_addr = listener.local_addr().map_err(kcp_error)?;
        debug!(%local_addr, "kcp listener bound");

        Ok(Self {
            inner: Mutex::new(Some(listener)),
            local_addr,
            closed: watch::channel(false).0,
        })
    }
}

impl fmt::Debug for KcpRawListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KcpRawListener")
            .field("local_addr", &self.local_addr)
            .field("closed", &*self.closed.borrow())
            .finish()
    }
}

#[async_trait]
impl RawListener for KcpRawListener {
    async fn accept(&self) -> io::Result<(BoxedConn, SocketAddr)> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(listener_closed());
        }

        let mut inner = self.inner.lock().await;
        let Some(listener) = inner.as_mut() else {
            return Err(listener_closed());
        };
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(kcp_error)?;
                trace!(%peer, "kcp connection accepted");
                Ok((Box::new(stream) as BoxedConn, peer))
            }
            _ = closed.wait_for(|closed| *closed) => Err(listener_closed()),
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn close(&self) {
        self.closed.send_replace(true);
        // Waits for a pending accept to observe the flag and let go.
        let listener = self.inner.lock().await.take();
        if listener.is_some() {
            debug!(local_addr = %self.local_addr, "kcp listener closed");
        }
    }
}

/// Dials KCP connections with a fixed configuration.
pub struct KcpRawDialer {
    config: KcpConfig,
}

impl KcpRawDialer {
    /// Create a dialer using `config` for every connection.
    pub fn new(config: KcpConfig) -> Self {
        Self { config }
    }
}

impl Default for KcpRawDialer {
    fn default() -> Self {
        Self::new(KcpConfig::default())
    }
}

impl fmt::Debug for KcpRawDialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KcpRawDialer").finish_non_exhaustive()
    }
}

#[async_trait]
impl RawDialer for KcpRawDialer {
    async fn dial(&self, addr: &str) -> io::Result<(BoxedConn, SocketAddr)> {
        let peer = lookup_host(addr).await?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("no address found for {addr}"))
        })?;
        let stream = KcpStream::connect(&self.config, peer).await.map_err(kcp_error)?;
        trace!(%peer, "kcp connection established");
        Ok((Box::new(stream), peer))
    }
}
