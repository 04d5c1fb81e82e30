//! Engine configuration.
//!
//! Configuration can be loaded from environment variables or constructed
//! programmatically.

use scheduler::{Timestamp, millis};
use std::env;

/// Largest accepted slice budget in milliseconds.
pub const MAX_FRAME_YIELD_MS: u64 = 60_000;

/// Runtime configuration for the reconciler engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Length of one scheduler slice in milliseconds (1ms to [`MAX_FRAME_YIELD_MS`])
    pub frame_yield_ms: u64,
    /// Flush still-pending passive effects before starting a new render
    pub eager_passive_flush: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_yield_ms: 5,
            eager_passive_flush: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `RECONCILER_FRAME_YIELD_MS`: slice budget in milliseconds (default: 5,
    ///   clamped to 1..=[`MAX_FRAME_YIELD_MS`])
    /// - `RECONCILER_EAGER_PASSIVE_FLUSH`: set to "0" to stop flushing passive
    ///   effects before a render (default: enabled)
    #[inline]
    #[must_use]
    pub fn from_env() -> Self {
        let frame_yield_ms = env::var("RECONCILER_FRAME_YIELD_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(5)
            .clamp(1, MAX_FRAME_YIELD_MS);
        let eager_passive_flush =
            env::var("RECONCILER_EAGER_PASSIVE_FLUSH").ok().as_deref() != Some("0");
        Self {
            frame_yield_ms,
            eager_passive_flush,
        }
    }

    /// Set the slice budget, clamped like the environment value.
    #[inline]
    #[must_use]
    pub const fn with_frame_yield_ms(mut self, frame_yield_ms: u64) -> Self {
        self.frame_yield_ms = if frame_yield_ms < 1 {
            1
        } else if frame_yield_ms > MAX_FRAME_YIELD_MS {
            MAX_FRAME_YIELD_MS
        } else {
            frame_yield_ms
        };
        self
    }

    /// Toggle flushing pending passive effects before each render.
    #[inline]
    #[must_use]
    pub const fn with_eager_passive_flush(mut self, enabled: bool) -> Self {
        self.eager_passive_flush = enabled;
        self
    }

    /// The slice budget as a scheduler timestamp span.
    #[inline]
    #[must_use]
    pub const fn frame_interval(&self) -> Timestamp {
        millis(self.frame_yield_ms as i64)
    }
}
