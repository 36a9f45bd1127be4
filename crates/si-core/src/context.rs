//! The explicit per-run context passed through every pipeline stage.

use crate::{Config, RunStats};

/// Configuration and counters for one pipeline run.
///
/// Created by the caller and borrowed by each stage; nothing in the
/// workspace keeps process-wide mutable state.
///
/// # Examples
///
/// ```
/// use si_core::{Config, RunContext};
///
/// let ctx = RunContext::new(Config::default());
/// ctx.stats().file_seen();
/// assert_eq!(ctx.stats().snapshot().files_seen, 1);
/// ```
#[derive(Debug, Default)]
pub struct RunContext {
    config: Config,
    stats: RunStats,
}

impl RunContext {
    /// Creates a context with zeroed statistics.
    #[inline]
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stats: RunStats::new(),
        }
    }

    /// Returns the run configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the run statistics.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &RunStats {
        &self.stats
    }
}
