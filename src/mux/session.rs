//! Multiplexed session over one raw connection.
//!
//! Framing, stream ids and keep-alive are handled by `async_smux`. Its
//! worker runs on a driver task; the session keeps a second handle on the
//! raw connection so [`Session::close`] can stop the worker and hand the
//! connection back to its caller.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_smux::{MuxAcceptor, MuxBuilder, MuxConnector};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::channel::Channel;
use super::config::MuxConfig;
use super::raw::SharedConn;
use crate::core::{BoxedConn, MuxError, MuxResult};

/// Which side of the raw connection a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Dialing side.
    Client,
    /// Accepting side.
    Server,
}

/// A session that could not start. Carries the raw connection back so the
/// caller decides how to close it.
pub struct SetupError {
    error: MuxError,
    conn: BoxedConn,
}

impl SetupError {
    /// Why the session did not start.
    pub fn error(&self) -> &MuxError {
        &self.error
    }

    /// Split into the error and the untouched raw connection.
    pub fn into_parts(self) -> (MuxError, BoxedConn) {
        (self.error, self.conn)
    }
}

impl fmt::Debug for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session setup failed: {}", self.error)
    }
}

impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Liveness of a session, shared with its channels.
pub(crate) struct SessionStatus {
    closed: watch::Sender<bool>,
    died: AtomicBool,
}

impl SessionStatus {
    fn new() -> Self {
        Self {
            closed: watch::channel(false).0,
            died: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub fn wait_closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut closed = self.closed.subscribe();
        async move {
            let _ = closed.wait_for(|closed| *closed).await;
        }
    }

    /// What a channel read reports once nothing more will arrive: EOF
    /// after a local close or peer FIN, an error if the session died.
    pub fn end_of_stream(&self) -> io::Result<()> {
        if self.died.load(Ordering::Acquire) {
            Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "mux session died",
            ))
        } else {
            Ok(())
        }
    }

    fn mark_closed(&self) {
        self.closed.send_replace(true);
    }

    fn mark_died(&self) {
        self.died.store(true, Ordering::Release);
        self.mark_closed();
    }
}

struct Shared {
    role: Role,
    raw: SharedConn,
    connector: Mutex<Option<MuxConnector<SharedConn>>>,
    acceptor: tokio::sync::Mutex<Option<MuxAcceptor<SharedConn>>>,
    status: Arc<SessionStatus>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Last handle gone: stop the worker, which drops the raw connection.
        if let Some(driver) = self.driver.get_mut().take() {
            driver.abort();
        }
        self.status.mark_closed();
    }
}

/// Handle to a running session. Cheap to clone; the session stops when
/// [`close`](Session::close) is called or the last handle is dropped.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.shared.role)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    /// Start a dialing-side session on `conn`.
    pub fn client(conn: BoxedConn, config: &MuxConfig) -> Result<Self, SetupError> {
        Self::start(conn, config, Role::Client)
    }

    /// Start an accepting-side session on `conn`.
    pub fn server(conn: BoxedConn, config: &MuxConfig) -> Result<Self, SetupError> {
        Self::start(conn, config, Role::Server)
    }

    fn start(conn: BoxedConn, config: &MuxConfig, role: Role) -> Result<Self, SetupError> {
        let (interval, timeout) = match config.keep_alive_secs() {
            Ok(secs) => secs,
            Err(error) => return Err(SetupError { error, conn }),
        };

        let raw = SharedConn::new(conn);
        let (connector, acceptor, worker) = match role {
            Role::Client => MuxBuilder::client()
                .with_keep_alive_interval(interval)
                .with_idle_timeout(timeout)
                .with_connection(raw.clone())
                .build(),
            Role::Server => MuxBuilder::server()
                .with_keep_alive_interval(interval)
                .with_idle_timeout(timeout)
                .with_connection(raw.clone())
                .build(),
        };

        let status = Arc::new(SessionStatus::new());
        let driver = tokio::spawn({
            let status = status.clone();
            async move {
                let outcome = worker.await;
                debug!(?role, ?outcome, "mux session died");
                status.mark_died();
            }
        });
        debug!(?role, ?config, "mux session started");

        Ok(Self {
            shared: Arc::new(Shared {
                role,
                raw,
                connector: Mutex::new(Some(connector)),
                acceptor: tokio::sync::Mutex::new(Some(acceptor)),
                status,
                driver: Mutex::new(Some(driver)),
            }),
        })
    }

    /// Session role.
    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// `true` once the session was closed or died.
    pub fn is_closed(&self) -> bool {
        self.shared.status.is_closed()
    }

    /// Resolves once the session was closed or died.
    pub async fn closed(&self) {
        self.shared.status.wait_closed().await;
    }

    /// Open a new channel to the peer.
    pub async fn open_channel(&self) -> MuxResult<Channel> {
        if self.is_closed() {
            return Err(MuxError::SessionClosed);
        }
        let stream = {
            let mut connector = self.shared.connector.lock();
            let Some(connector) = connector.as_mut() else {
                return Err(MuxError::SessionClosed);
            };
            connector
                .connect()
                .map_err(|err| MuxError::Open(err.to_string()))?
        };
        trace!(role = ?self.shared.role, "channel opened");
        Ok(Channel::new(stream, self.shared.status.clone()))
    }

    /// Wait for the peer to open a channel.
    pub async fn accept_channel(&self) -> MuxResult<Channel> {
        let closed = self.shared.status.wait_closed();
        if self.is_closed() {
            return Err(MuxError::SessionClosed);
        }
        let mut acceptor = self.shared.acceptor.lock().await;
        let Some(acceptor) = acceptor.as_mut() else {
            return Err(MuxError::SessionClosed);
        };
        let stream = tokio::select! {
            stream = acceptor.accept() => stream.ok_or(MuxError::SessionClosed)?,
            () = closed => return Err(MuxError::SessionClosed),
        };
        trace!(role = ?self.shared.role, "channel accepted");
        Ok(Channel::new(stream, self.shared.status.clone()))
    }

    /// Stop the session.
    ///
    /// Stops the multiplexer worker, waits for its driver task, and returns
    /// the raw connection for the caller to close. Channels should be
    /// closed first; anything they still buffer is dropped. Only the first
    /// call gets the connection; later calls return `Ok(None)`.
    pub async fn close(&self) -> MuxResult<Option<BoxedConn>> {
        let driver = self.shared.driver.lock().take();
        let Some(driver) = driver else {
            return Ok(None);
        };

        self.shared.status.mark_closed();
        let connector = self.shared.connector.lock().take();
        drop(connector);
        let acceptor = self.shared.acceptor.lock().await.take();
        drop(acceptor);

        driver.abort();
        let joined = driver.await;
        let raw = self.shared.raw.take();
        match joined {
            Err(err) if err.is_panic() => {
                warn!(role = ?self.shared.role, %err, "mux driver panicked");
                Err(MuxError::TaskFailed(err))
            }
            _ => {
                debug!(role = ?self.shared.role, "mux session closed");
                Ok(raw)
            }
        }
    }
}
