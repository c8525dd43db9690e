//! Raw connection shared between the multiplexer and the session handle.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::core::BoxedConn;

/// The connection handed to the multiplexer.
///
/// The session keeps a second handle so it can take the connection back
/// once the multiplexer is stopped. Afterwards reads see EOF and writes
/// fail. Shutting the connection down is left to whoever takes it, so
/// `poll_shutdown` only flushes.
#[derive(Clone)]
pub(crate) struct SharedConn {
    inner: Arc<Mutex<Option<BoxedConn>>>,
}

impl SharedConn {
    pub fn new(conn: BoxedConn) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(conn))),
        }
    }

    /// Take the connection out; only the first caller gets it.
    pub fn take(&self) -> Option<BoxedConn> {
        self.inner.lock().take()
    }
}

fn released() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "raw connection released")
}

impl AsyncRead for SharedConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut inner = self.inner.lock();
        match inner.as_mut() {
            Some(conn) => Pin::new(conn).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl AsyncWrite for SharedConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut inner = self.inner.lock();
        match inner.as_mut() {
            Some(conn) => Pin::new(conn).poll_write(cx, buf),
            None => Poll::Ready(Err(released())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut inner = self.inner.lock();
        match inner.as_mut() {
            Some(conn) => Pin::new(conn).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_flush(cx)
    }
}
