//! Stream multiplexing over one raw connection.
//!
//! Many logical [`Channel`]s share one raw connection through a
//! [`Session`]. The smux v1 protocol itself (framing, stream ids and the
//! keep-alive timers) comes from `async_smux`; this module wires it to raw
//! connections and gives the stream layer an ordered, exactly-once close.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   Channel   Channel   Channel   ...     │
//! ├─────────────────────────────────────────┤
//! │              Session                    │  ← This module
//! │   async_smux worker, raw handback       │
//! ├─────────────────────────────────────────┤
//! │         Raw connection (KCP)            │
//! └─────────────────────────────────────────┘
//! ```

mod channel;
mod config;
mod raw;
mod session;

pub use channel::Channel;
pub use config::MuxConfig;
pub use session::{Role, Session, SetupError};

pub(crate) use channel::ChannelCloser;
