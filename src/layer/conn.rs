//! Owned connection handle returned by accept and dial.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::{debug, warn};

use super::registry::Registration;
use crate::core::{BoxedConn, CloseStage, Connection, TransportError, TransportResult};
use crate::mux::{Channel, ChannelCloser, Session};

/// A logical channel together with the session and raw connection under it.
///
/// Reads and writes go to the channel. [`close`](MuxConn::close) tears the
/// stack down channel first, raw connection last. Dropping the handle
/// releases everything as well, without waiting for it.
#[derive(Debug)]
pub struct MuxConn {
    channel: Channel,
    session: Session,
    remote: SocketAddr,
    registration: Option<Registration>,
    closed: bool,
}

impl MuxConn {
    pub(crate) fn new(
        channel: Channel,
        session: Session,
        remote: SocketAddr,
        registration: Option<Registration>,
    ) -> Self {
        Self {
            channel,
            session,
            remote,
            registration,
            closed: false,
        }
    }

    /// Address of the remote peer.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// The session carrying this connection.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// `true` after [`close`](MuxConn::close) or once the session died.
    pub fn is_closed(&self) -> bool {
        self.closed || self.session.is_closed()
    }

    /// Close channel, session and raw connection, in that order.
    ///
    /// Every step is attempted; the last failure is returned. Closing twice,
    /// or after the owning adapter closed the session, is a no-op for the
    /// layers already released.
    pub async fn close(&mut self) -> TransportResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.registration.take();
        close_ordered(Some(&self.channel.closer()), &self.session).await
    }
}

/// Close `channel` (if any), then `session`, then the raw connection the
/// session hands back.
pub(crate) async fn close_ordered(
    channel: Option<&ChannelCloser>,
    session: &Session,
) -> TransportResult<()> {
    let mut failure = None;

    if let Some(channel) = channel {
        if let Err(err) = channel.close().await {
            warn!(%err, "closing channel failed");
            failure = Some(TransportError::close(CloseStage::Channel, err));
        }
    }

    match session.close().await {
        Ok(Some(mut raw)) => {
            if let Err(err) = raw.shutdown().await {
                warn!(%err, "closing raw connection failed");
                failure = Some(TransportError::close(CloseStage::RawConnection, err));
            }
        }
        Ok(None) => debug!("session already closed"),
        Err(err) => {
            warn!(%err, "closing session failed");
            failure = Some(TransportError::close(CloseStage::Session, err));
        }
    }

    failure.map_or(Ok(()), Err)
}

/// Release a raw connection no session was built on.
pub(crate) async fn shutdown_raw(mut raw: BoxedConn) {
    if let Err(err) = raw.shutdown().await {
        debug!(%err, "raw connection shutdown failed");
    }
}

impl AsyncRead for MuxConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.channel).poll_read(cx, buf)
    }
}

impl AsyncWrite for MuxConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.channel).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.channel).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.channel).poll_shutdown(cx)
    }
}

#[async_trait]
impl Connection for MuxConn {
    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    fn is_closed(&self) -> bool {
        MuxConn::is_closed(self)
    }

    async fn close(&mut self) -> TransportResult<()> {
        MuxConn::close(self).await
    }
}
