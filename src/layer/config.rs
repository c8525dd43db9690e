//! Stream layer configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::core::constants::{DEFAULT_DIAL_TIMEOUT, DEFAULT_MAX_POOL};
use crate::mux::MuxConfig;

/// Stream layer configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Local address the listener binds to.
    pub bind_addr: SocketAddr,

    /// Address peers are told to dial. Defaults to the bound address.
    pub advertise: Option<SocketAddr>,

    /// Idle connections kept per remote address by a [`ConnPool`](super::ConnPool).
    pub max_pool: usize,

    /// Dial deadline used by a [`ConnPool`](super::ConnPool).
    pub timeout: Duration,

    /// Session settings shared by every accepted and dialed connection.
    pub mux: MuxConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            advertise: None,
            max_pool: DEFAULT_MAX_POOL,
            timeout: DEFAULT_DIAL_TIMEOUT,
            mux: MuxConfig::stream_layer(),
        }
    }
}

/// Builder for a [`TransportConfig`].
#[derive(Debug)]
pub struct TransportBuilder {
    config: TransportConfig,
}

impl TransportBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: TransportConfig::default(),
        }
    }

    /// Set the bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the advertised address.
    pub fn advertise(mut self, addr: SocketAddr) -> Self {
        self.config.advertise = Some(addr);
        self
    }

    /// Set how many idle connections are pooled per remote address.
    pub fn max_pool(mut self, max: usize) -> Self {
        self.config.max_pool = max;
        self
    }

    /// Set the dial timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Replace the session settings.
    pub fn mux(mut self, mux: MuxConfig) -> Self {
        self.config.mux = mux;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TransportConfig {
        self.config
    }
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
