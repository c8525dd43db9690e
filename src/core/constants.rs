//! Constants shared by the multiplexer and the stream layer.
//!
//! Keep-alive values are whole seconds: the smux keep-alive and idle
//! timers only tick at that granularity.

use std::time::Duration;

// =============================================================================
// MULTIPLEXER DEFAULTS
// =============================================================================

/// Default keep-alive interval for a generic session.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Default keep-alive timeout for a generic session.
pub const DEFAULT_KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// STREAM LAYER
// =============================================================================

/// Keep-alive interval used by every stream layer session.
pub const STREAM_LAYER_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Keep-alive timeout used by every stream layer session.
///
/// Tolerates two missed heartbeats before the session is declared dead.
pub const STREAM_LAYER_KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(13);

/// Default number of idle pooled connections kept per peer.
pub const DEFAULT_MAX_POOL: usize = 3;

/// Default dial timeout used by the connection pool.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);
