//! Collaborator and capability traits.
//!
//! The raw connection collaborators ([`RawListener`], [`RawDialer`]) hide
//! the reliable-datagram transport. [`StreamLayer`] is the capability set
//! a consensus transport builds its connection pool on.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::error::TransportResult;

/// A reliable, ordered byte stream between two peers.
pub trait RawConnection: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> RawConnection for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased raw connection, as owned by a multiplexed session.
pub type BoxedConn = Box<dyn RawConnection>;

/// Produces raw connections for a bound local address (accept side).
#[async_trait]
pub trait RawListener: Send + Sync + 'static {
    /// Wait for the next incoming raw connection.
    ///
    /// Must return an error promptly once [`close`](Self::close) was
    /// called, including for calls already waiting.
    async fn accept(&self) -> io::Result<(BoxedConn, SocketAddr)>;

    /// The bound local address, with any ephemeral port resolved.
    fn local_addr(&self) -> SocketAddr;

    /// Release the listening socket. Idempotent.
    async fn close(&self);
}

/// Establishes raw connections to remote peers (dial side).
#[async_trait]
pub trait RawDialer: Send + Sync + 'static {
    /// Connect to `addr`, returning the connection and the resolved peer.
    async fn dial(&self, addr: &str) -> io::Result<(BoxedConn, SocketAddr)>;
}

/// A connection handed out by a [`StreamLayer`].
#[async_trait]
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {
    /// Address of the remote peer.
    fn remote_addr(&self) -> SocketAddr;

    /// `true` once the connection can no longer carry data.
    fn is_closed(&self) -> bool;

    /// Close the connection and everything it is layered on.
    async fn close(&mut self) -> TransportResult<()>;
}

/// The capability set a consensus transport expects from its network.
#[async_trait]
pub trait StreamLayer: Send + Sync {
    /// Connection type returned by [`accept`](Self::accept) and [`dial`](Self::dial).
    type Conn: Connection;

    /// Wait for the next inbound connection.
    async fn accept(&self) -> TransportResult<Self::Conn>;

    /// Open an outbound connection. `Duration::ZERO` disables the deadline.
    async fn dial(&self, addr: &str, timeout: Duration) -> TransportResult<Self::Conn>;

    /// Close the outbound connections this layer still tracks.
    async fn close(&self) -> TransportResult<()>;

    /// The bound local address.
    fn addr(&self) -> SocketAddr;
}
