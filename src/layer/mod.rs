//! Stream layer: one channel per accepted or dialed connection.
//!
//! ```text
//! accept:  listener ──► raw conn ──► server session ──► peer's channel
//! dial:    dialer   ──► raw conn ──► client session ──► new channel
//! close:   channel  ──► session  ──► raw conn
//! ```
//!
//! A failing step releases everything the earlier steps opened before the
//! error is returned.

mod adapter;
mod address;
mod config;
mod conn;
mod pool;
mod registry;

#[cfg(feature = "kcp")]
pub use adapter::KcpStreamLayer;
pub use adapter::StreamLayerAdapter;
pub use address::validate_advertise;
pub use config::{TransportBuilder, TransportConfig};
pub use conn::MuxConn;
pub use pool::ConnPool;
