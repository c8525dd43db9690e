//! # kcp-stream-layer
//!
//! Stream layer for consensus replication over KCP.
//!
//! Every connection a consensus transport accepts or dials is a KCP raw
//! connection wrapped in its own multiplexed session (smux v1 wire format)
//! carrying exactly one logical channel. The layer exposes the four
//! operations a connection-pooling network transport expects: accept,
//! dial with a deadline, close, and the bound address.
//!
//! ## Feature Flags
//!
//! - `kcp` (default): KCP raw connections and the [`KcpStreamLayer`] alias
//!
//! ## Modules
//!
//! - [`core`]: Collaborator traits, constants, and error types
//! - [`mux`]: smux-compatible session and channel
//! - [`layer`]: The stream layer adapter, connection handle, and pool
//! - [`kcp`]: KCP listener and dialer (requires `kcp` feature)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use kcp_stream_layer::prelude::*;
//! use tokio::io::AsyncWriteExt;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TransportBuilder::new()
//!     .bind_addr("127.0.0.1:7000".parse().unwrap())
//!     .build();
//! let layer = KcpStreamLayer::bind(config).await?;
//!
//! let mut conn = layer.dial("127.0.0.1:7001", Duration::from_secs(10)).await?;
//! conn.write_all(b"append entries").await?;
//! conn.close().await?;
//! layer.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Multiplexer
pub mod mux;

// Stream layer
pub mod layer;

// KCP collaborators (feature-gated)
#[cfg(feature = "kcp")]
#[cfg_attr(docsrs, doc(cfg(feature = "kcp")))]
pub mod kcp;

#[cfg(test)]
mod testing;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::layer::{
        ConnPool, MuxConn, StreamLayerAdapter, TransportBuilder, TransportConfig,
    };
    pub use crate::mux::MuxConfig;

    #[cfg(feature = "kcp")]
    pub use crate::layer::KcpStreamLayer;
}

// Re-export commonly used items at crate root
pub use crate::core::{Connection, StreamLayer, TransportError, TransportResult};
pub use layer::{ConnPool, MuxConn, StreamLayerAdapter, TransportBuilder, TransportConfig};

#[cfg(feature = "kcp")]
pub use layer::KcpStreamLayer;
