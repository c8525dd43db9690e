//! In-memory collaborators for unit tests.

use std::collections::VecDeque;
use std::future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::{mpsc, watch};

use crate::core::{BoxedConn, RawConnection, RawDialer, RawListener};

/// Counts how a raw connection was released.
#[derive(Debug, Default)]
pub(crate) struct CloseCounter {
    shutdowns: AtomicUsize,
    drops: AtomicUsize,
}

impl CloseCounter {
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

/// Duplex stream that reports shutdown and drop to a [`CloseCounter`].
#[derive(Debug)]
pub(crate) struct CountedConn {
    io: DuplexStream,
    closes: Arc<CloseCounter>,
    failing_shutdown: Option<io::ErrorKind>,
}

impl CountedConn {
    /// Make every shutdown fail with `kind`.
    pub fn fail_shutdown(mut self, kind: io::ErrorKind) -> Self {
        self.failing_shutdown = Some(kind);
        self
    }
}

impl Drop for CountedConn {
    fn drop(&mut self) {
        self.closes.drops.fetch_add(1, Ordering::SeqCst);
    }
}

impl AsyncRead for CountedConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for CountedConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Some(kind) = self.failing_shutdown {
            return Poll::Ready(Err(io::Error::new(kind, "shutdown refused")));
        }
        let polled = Pin::new(&mut self.io).poll_shutdown(cx);
        if let Poll::Ready(Ok(())) = polled {
            self.closes.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
        polled
    }
}

/// A counted raw connection plus the plain peer end.
pub(crate) fn counted_pair() -> (CountedConn, Arc<CloseCounter>, DuplexStream) {
    let (ours, peer) = tokio::io::duplex(64 * 1024);
    let closes = Arc::new(CloseCounter::default());
    let conn = CountedConn {
        io: ours,
        closes: closes.clone(),
        failing_shutdown: None,
    };
    (conn, closes, peer)
}

pub(crate) fn peer_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40_000))
}

fn listener_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "listener closed")
}

/// Listener fed by the test through [`ListenerHandle`].
pub(crate) struct MemoryListener {
    addr: SocketAddr,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<BoxedConn>>,
    closed: watch::Sender<bool>,
}

/// Test side of a [`MemoryListener`].
pub(crate) struct ListenerHandle {
    pub conns: mpsc::UnboundedSender<BoxedConn>,
    pub closed: watch::Receiver<bool>,
}

impl ListenerHandle {
    pub fn push(&self, conn: impl RawConnection) {
        let _ = self.conns.send(Box::new(conn));
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl MemoryListener {
    pub fn new(addr: SocketAddr) -> (Self, ListenerHandle) {
        let (conns, incoming) = mpsc::unbounded_channel();
        let (closed_tx, closed) = watch::channel(false);
        let listener = Self {
            addr,
            incoming: tokio::sync::Mutex::new(incoming),
            closed: closed_tx,
        };
        (listener, ListenerHandle { conns, closed })
    }
}

#[async_trait]
impl RawListener for MemoryListener {
    async fn accept(&self) -> io::Result<(BoxedConn, SocketAddr)> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(listener_closed());
        }
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            conn = incoming.recv() => conn
                .map(|conn| (conn, peer_addr()))
                .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionAborted)),
            _ = closed.wait_for(|closed| *closed) => Err(listener_closed()),
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn close(&self) {
        self.closed.send_replace(true);
    }
}

/// Dialer replaying queued outcomes in order.
#[derive(Default)]
pub(crate) struct ScriptedDialer {
    script: Mutex<VecDeque<io::Result<BoxedConn>>>,
}

impl ScriptedDialer {
    pub fn push_conn(&self, conn: impl RawConnection) {
        self.script.lock().push_back(Ok(Box::new(conn)));
    }

    pub fn push_err(&self, kind: io::ErrorKind) {
        self.script.lock().push_back(Err(io::Error::from(kind)));
    }
}

#[async_trait]
impl RawDialer for ScriptedDialer {
    async fn dial(&self, addr: &str) -> io::Result<(BoxedConn, SocketAddr)> {
        let peer: SocketAddr = addr
            .parse()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(conn)) => Ok((conn, peer)),
            Some(Err(err)) => Err(err),
            None => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
        }
    }
}

/// Dialer whose connections never complete.
pub(crate) struct HangingDialer;

#[async_trait]
impl RawDialer for HangingDialer {
    async fn dial(&self, _addr: &str) -> io::Result<(BoxedConn, SocketAddr)> {
        future::pending().await
    }
}
