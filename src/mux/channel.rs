//! One logical stream of a session.

use std::fmt;
use std::future::{Future, poll_fn};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use async_smux::MuxStream;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::raw::SharedConn;
use super::session::SessionStatus;

pub(crate) type SmuxStream = MuxStream<SharedConn>;

type ClosedSignal = Pin<Box<dyn Future<Output = ()> + Send>>;

struct ChannelState {
    stream: Mutex<SmuxStream>,
    closed: AtomicBool,
}

/// A bidirectional byte stream inside a [`Session`](super::Session).
///
/// Reads return EOF once the peer closed its side. If the session dies
/// underneath, pending and further reads fail with
/// [`io::ErrorKind::ConnectionReset`] instead, and writes fail with
/// [`io::ErrorKind::BrokenPipe`].
pub struct Channel {
    state: Arc<ChannelState>,
    session: Arc<SessionStatus>,
    session_closed: ClosedSignal,
}

/// Second handle on a channel that can only close it.
#[derive(Clone)]
pub(crate) struct ChannelCloser {
    state: Arc<ChannelState>,
}

impl Channel {
    pub(crate) fn new(stream: SmuxStream, session: Arc<SessionStatus>) -> Self {
        let session_closed = Box::pin(session.wait_closed());
        Self {
            state: Arc::new(ChannelState {
                stream: Mutex::new(stream),
                closed: AtomicBool::new(false),
            }),
            session,
            session_closed,
        }
    }

    /// `true` once closed locally or once the session is gone.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire) || self.session.is_closed()
    }

    /// Flush pending writes and send FIN. Only the first call does
    /// anything.
    pub async fn close(&mut self) -> io::Result<()> {
        self.closer().close().await
    }

    pub(crate) fn closer(&self) -> ChannelCloser {
        ChannelCloser {
            state: self.state.clone(),
        }
    }

    fn session_gone(&mut self, cx: &mut Context<'_>) -> bool {
        self.session.is_closed() || self.session_closed.as_mut().poll(cx).is_ready()
    }
}

impl ChannelCloser {
    pub async fn close(&self) -> io::Result<()> {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let state = &self.state;
        poll_fn(|cx| Pin::new(&mut *state.stream.lock()).poll_flush(cx)).await?;
        poll_fn(|cx| Pin::new(&mut *state.stream.lock()).poll_shutdown(cx)).await
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for ChannelCloser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelCloser")
            .field("closed", &self.state.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl AsyncRead for Channel {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let polled = Pin::new(&mut *self.state.stream.lock()).poll_read(cx, buf);
        match polled {
            Poll::Ready(Ok(())) if buf.filled().len() == before && buf.remaining() > 0 => {
                Poll::Ready(self.session.end_of_stream())
            }
            Poll::Ready(Err(_)) if self.session.is_closed() => {
                Poll::Ready(self.session.end_of_stream())
            }
            Poll::Pending if self.session_gone(cx) => Poll::Ready(self.session.end_of_stream()),
            other => other,
        }
    }
}

impl AsyncWrite for Channel {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.session.is_closed() {
            return Poll::Ready(Err(broken_pipe()));
        }
        let polled = Pin::new(&mut *self.state.stream.lock()).poll_write(cx, buf);
        match polled {
            Poll::Pending if self.session_gone(cx) => Poll::Ready(Err(broken_pipe())),
            other => other,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let polled = Pin::new(&mut *self.state.stream.lock()).poll_flush(cx);
        match polled {
            Poll::Pending if self.session_gone(cx) => Poll::Ready(Err(broken_pipe())),
            other => other,
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut *self.state.stream.lock()).poll_shutdown(cx)
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "mux session closed")
}
