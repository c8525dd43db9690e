//! Accept, dial and close over multiplexed raw connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;
use tracing::{debug, trace, warn};

use super::address::validate_advertise;
use super::conn::{MuxConn, close_ordered, shutdown_raw};
use super::registry::{DialRegistry, Dialed};
use crate::core::{RawDialer, RawListener, StreamLayer, TransportError, TransportResult};
use crate::mux::{MuxConfig, Session};

/// Stream layer over a raw listener and dialer.
///
/// Each accepted or dialed connection gets its own session carrying one
/// channel. Dialed sessions are tracked until their [`MuxConn`] is closed
/// or dropped, so [`close`](StreamLayer::close) can release whatever the
/// caller still holds.
pub struct StreamLayerAdapter<L, D> {
    listener: L,
    dialer: D,
    advertise: SocketAddr,
    mux: MuxConfig,
    dialed: Arc<DialRegistry>,
    shut_down: AtomicBool,
}

impl<L: RawListener, D: RawDialer> StreamLayerAdapter<L, D> {
    /// Build an adapter from already bound collaborators.
    ///
    /// `advertise` defaults to the listener's address. On a validation
    /// failure the listener is closed before the error is returned.
    pub async fn from_parts(
        listener: L,
        dialer: D,
        advertise: Option<SocketAddr>,
        mux: MuxConfig,
    ) -> TransportResult<Self> {
        let bound = listener.local_addr();
        let checked = mux
            .validate()
            .map_err(|err| TransportError::Config(err.to_string()))
            .and_then(|()| validate_advertise(advertise.unwrap_or(bound), bound));

        let advertise = match checked {
            Ok(advertise) => advertise,
            Err(err) => {
                warn!(%bound, %err, "rejecting stream layer configuration");
                listener.close().await;
                return Err(err);
            }
        };

        debug!(%bound, %advertise, "stream layer ready");
        Ok(Self {
            listener,
            dialer,
            advertise,
            mux,
            dialed: Arc::new(DialRegistry::default()),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Address peers should dial to reach this node.
    pub fn advertise_addr(&self) -> SocketAddr {
        self.advertise
    }

    /// Session settings applied to every connection.
    pub fn mux_config(&self) -> &MuxConfig {
        &self.mux
    }

    /// Dialed connections not yet closed or dropped.
    pub fn dialed_count(&self) -> usize {
        self.dialed.len()
    }

    /// Close every dialed connection, then the listener.
    ///
    /// A pending [`accept`](StreamLayer::accept) returns
    /// [`TransportError::ListenerClosed`].
    pub async fn shutdown(&self) -> TransportResult<()> {
        self.shut_down.store(true, Ordering::Release);
        let result = StreamLayer::close(self).await;
        self.listener.close().await;
        debug!(addr = %self.listener.local_addr(), "stream layer shut down");
        result
    }

    async fn dial_pipeline(&self, addr: &str) -> TransportResult<MuxConn> {
        let (raw, peer) = self.dialer.dial(addr).await.map_err(|source| TransportError::Dial {
            addr: addr.to_owned(),
            source,
        })?;
        trace!(addr, %peer, "raw connection established");

        let session = match Session::client(raw, &self.mux) {
            Ok(session) => session,
            Err(err) => {
                let (err, raw) = err.into_parts();
                warn!(addr, %err, "session setup failed, closing raw connection");
                shutdown_raw(raw).await;
                return Err(TransportError::SessionSetup(err));
            }
        };

        self.open_dialed(session, peer, addr).await
    }

    /// Open the single channel of a fresh dial-side session and track it.
    /// On failure the session and raw connection are closed.
    async fn open_dialed(
        &self,
        session: Session,
        peer: SocketAddr,
        addr: &str,
    ) -> TransportResult<MuxConn> {
        let channel = match session.open_channel().await {
            Ok(channel) => channel,
            Err(err) => {
                warn!(addr, %err, "channel open failed, unwinding session");
                if let Err(close_err) = close_ordered(None, &session).await {
                    warn!(addr, %close_err, "unwinding dial incomplete");
                }
                return Err(TransportError::ChannelOpen(err));
            }
        };

        let registration = self.dialed.register(Dialed {
            channel: channel.closer(),
            session: session.clone(),
        });
        debug!(addr, %peer, "outbound connection ready");
        Ok(MuxConn::new(channel, session, peer, Some(registration)))
    }
}

#[async_trait]
impl<L: RawListener, D: RawDialer> StreamLayer for StreamLayerAdapter<L, D> {
    type Conn = MuxConn;

    async fn accept(&self) -> TransportResult<MuxConn> {
        let (raw, peer) = match self.listener.accept().await {
            Ok(accepted) => accepted,
            Err(_) if self.shut_down.load(Ordering::Acquire) => {
                return Err(TransportError::ListenerClosed);
            }
            Err(err) => return Err(TransportError::Accept(err)),
        };
        trace!(%peer, "raw connection accepted");

        let session = match Session::server(raw, &self.mux) {
            Ok(session) => session,
            Err(err) => {
                let (err, raw) = err.into_parts();
                warn!(%peer, %err, "session setup failed, closing raw connection");
                shutdown_raw(raw).await;
                return Err(TransportError::SessionSetup(err));
            }
        };

        match session.accept_channel().await {
            Ok(channel) => {
                debug!(%peer, "inbound connection ready");
                Ok(MuxConn::new(channel, session, peer, None))
            }
            Err(err) => {
                warn!(%peer, %err, "channel accept failed, unwinding session");
                if let Err(close_err) = close_ordered(None, &session).await {
                    warn!(%peer, %close_err, "unwinding accept incomplete");
                }
                Err(TransportError::ChannelAccept(err))
            }
        }
    }

    async fn dial(&self, addr: &str, timeout: Duration) -> TransportResult<MuxConn> {
        if timeout.is_zero() {
            return self.dial_pipeline(addr).await;
        }
        match time::timeout(timeout, self.dial_pipeline(addr)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(addr, ?timeout, "dial timed out");
                Err(TransportError::DialTimeout {
                    addr: addr.to_owned(),
                    timeout,
                })
            }
        }
    }

    async fn close(&self) -> TransportResult<()> {
        let dialed = self.dialed.drain();
        if dialed.is_empty() {
            trace!("no dialed connections to close");
            return Ok(());
        }

        let mut failure = None;
        for conn in &dialed {
            if let Err(err) = close_ordered(Some(&conn.channel), &conn.session).await {
                failure = Some(err);
            }
        }
        debug!(closed = dialed.len(), "dialed connections closed");
        failure.map_or(Ok(()), Err)
    }

    fn addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }
}

#[cfg(feature = "kcp")]
mod kcp_layer {
    use tokio_kcp::KcpConfig;

    use super::StreamLayerAdapter;
    use crate::core::{TransportError, TransportResult};
    use crate::kcp::{KcpRawDialer, KcpRawListener};
    use crate::layer::TransportConfig;

    /// Stream layer on KCP raw connections.
    pub type KcpStreamLayer = StreamLayerAdapter<KcpRawListener, KcpRawDialer>;

    impl StreamLayerAdapter<KcpRawListener, KcpRawDialer> {
        /// Bind a KCP listener with default KCP settings.
        pub async fn bind(config: TransportConfig) -> TransportResult<Self> {
            Self::bind_with(config, KcpConfig::default()).await
        }

        /// Bind a KCP listener; `kcp` is used for both accepted and dialed
        /// connections.
        pub async fn bind_with(config: TransportConfig, kcp: KcpConfig) -> TransportResult<Self> {
            let listener = KcpRawListener::bind(config.bind_addr, kcp.clone())
                .await
                .map_err(TransportError::Bind)?;
            let dialer = KcpRawDialer::new(kcp);
            Self::from_parts(listener, dialer, config.advertise, config.mux).await
        }
    }
}

#[cfg(feature = "kcp")]
pub use kcp_layer::KcpStreamLayer;
