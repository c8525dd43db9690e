//! Error types for the stream layer and the multiplexer.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by a multiplexed session or one of its channels.
#[derive(Debug, Error)]
pub enum MuxError {
    /// Session configuration rejected.
    #[error("invalid mux config: {0}")]
    InvalidConfig(String),

    /// The session is closed or dead.
    #[error("session closed")]
    SessionClosed,

    /// The multiplexer refused to open a stream.
    #[error("opening stream failed: {0}")]
    Open(String),

    /// I/O error on the raw connection.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The session driver panicked.
    #[error("session driver failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Result type for multiplexer operations.
pub type MuxResult<T> = Result<T, MuxError>;

/// Step of the channel → session → raw connection close sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStage {
    /// Closing the logical channel.
    Channel,
    /// Stopping the multiplexed session.
    Session,
    /// Shutting down the raw connection.
    RawConnection,
}

impl fmt::Display for CloseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloseStage::Channel => "channel",
            CloseStage::Session => "session",
            CloseStage::RawConnection => "raw connection",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the stream layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Binding the listener failed.
    #[error("bind failed: {0}")]
    Bind(#[source] io::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The advertised address cannot be used by peers.
    #[error("address is not advertisable: {0}")]
    NotAdvertisable(SocketAddr),

    /// The advertised address family does not match the bound address.
    #[error("advertised address {advertise} does not match the family of bound address {bound}")]
    InvalidAddressFamily {
        /// Advertised address.
        advertise: SocketAddr,
        /// Bound local address.
        bound: SocketAddr,
    },

    /// The listener failed while waiting for a connection.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// The listener has been closed.
    #[error("listener closed")]
    ListenerClosed,

    /// Establishing the raw connection failed.
    #[error("dial {addr} failed: {source}")]
    Dial {
        /// Remote address as given by the caller.
        addr: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The dial pipeline did not finish in time.
    #[error("dial {addr} timed out after {timeout:?}")]
    DialTimeout {
        /// Remote address as given by the caller.
        addr: String,
        /// Deadline that expired.
        timeout: Duration,
    },

    /// Starting the multiplexed session failed.
    #[error("session setup failed: {0}")]
    SessionSetup(#[source] MuxError),

    /// Waiting for the peer's channel failed.
    #[error("channel accept failed: {0}")]
    ChannelAccept(#[source] MuxError),

    /// Opening a channel on a fresh session failed.
    #[error("channel open failed: {0}")]
    ChannelOpen(#[source] MuxError),

    /// A step of the close sequence failed.
    #[error("closing {stage} failed: {source}")]
    Close {
        /// Failing step.
        stage: CloseStage,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The connection is not (or no longer) established.
    #[error("not connected")]
    NotConnected,
}

impl TransportError {
    /// Check if this error should end an accept loop.
    ///
    /// Per-connection setup failures only lose that one peer; a broken or
    /// closed listener will not produce further connections.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Accept(_) | TransportError::ListenerClosed | TransportError::Bind(_)
        )
    }

    /// Check if a dial that failed with this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Dial { .. }
                | TransportError::DialTimeout { .. }
                | TransportError::SessionSetup(MuxError::Io(_))
                | TransportError::ChannelOpen(_)
        )
    }

    pub(crate) fn close(stage: CloseStage, source: impl Into<CloseSource>) -> Self {
        TransportError::Close {
            stage,
            source: source.into().0,
        }
    }
}

/// Adapter so close errors from either layer land in one `io::Error`.
pub(crate) struct CloseSource(io::Error);

impl From<io::Error> for CloseSource {
    fn from(err: io::Error) -> Self {
        CloseSource(err)
    }
}

impl From<MuxError> for CloseSource {
    fn from(err: MuxError) -> Self {
        match err {
            MuxError::Io(err) => CloseSource(err),
            other => CloseSource(io::Error::other(other)),
        }
    }
}

/// Result type for stream layer operations.
pub type TransportResult<T> = Result<T, TransportError>;
