//! Multiplexer session configuration.

use std::num::NonZeroU64;
use std::time::Duration;

use tracing::warn;

use crate::core::constants::{
    DEFAULT_KEEP_ALIVE_INTERVAL, DEFAULT_KEEP_ALIVE_TIMEOUT, STREAM_LAYER_KEEP_ALIVE_INTERVAL,
    STREAM_LAYER_KEEP_ALIVE_TIMEOUT,
};
use crate::core::{MuxError, MuxResult};

/// Keep-alive tuning applied to a multiplexed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxConfig {
    /// How often a keep-alive NOP is sent. Whole seconds.
    pub keep_alive_interval: Duration,
    /// How long the session survives without receiving any frame. Whole
    /// seconds.
    pub keep_alive_timeout: Duration,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            keep_alive_timeout: DEFAULT_KEEP_ALIVE_TIMEOUT,
        }
    }
}

impl MuxConfig {
    /// The configuration every stream layer session uses, accept and dial
    /// side alike.
    pub fn stream_layer() -> Self {
        Self {
            keep_alive_interval: STREAM_LAYER_KEEP_ALIVE_INTERVAL,
            keep_alive_timeout: STREAM_LAYER_KEEP_ALIVE_TIMEOUT,
        }
    }

    /// Check the configuration before a session starts.
    pub fn validate(&self) -> MuxResult<()> {
        self.keep_alive_secs().map(|_| ())
    }

    /// Interval and timeout in the whole seconds the multiplexer takes.
    pub(crate) fn keep_alive_secs(&self) -> MuxResult<(NonZeroU64, NonZeroU64)> {
        let interval = whole_secs("keep-alive interval", self.keep_alive_interval)?;
        let timeout = whole_secs("keep-alive timeout", self.keep_alive_timeout)?;
        if timeout <= interval {
            return Err(MuxError::InvalidConfig(
                "keep-alive interval must be smaller than keep-alive timeout".into(),
            ));
        }
        if self.keep_alive_timeout < self.keep_alive_interval * 2 {
            warn!(
                interval = ?self.keep_alive_interval,
                timeout = ?self.keep_alive_timeout,
                "keep-alive timeout tolerates less than one missed heartbeat"
            );
        }
        Ok((interval, timeout))
    }
}

fn whole_secs(name: &str, value: Duration) -> MuxResult<NonZeroU64> {
    if value.subsec_nanos() != 0 {
        return Err(MuxError::InvalidConfig(format!(
            "{name} must be whole seconds, got {value:?}"
        )));
    }
    NonZeroU64::new(value.as_secs())
        .ok_or_else(|| MuxError::InvalidConfig(format!("{name} must be positive")))
}
