//! Loader configuration

use std::time::Duration;

use crate::error::{LoadError, Result};

const DEFAULT_TTL_SECS: u64 = 300; // 5 minutes
const DEFAULT_FLUSH_YIELDS: usize = 1;

/// Configuration for a [`Loader`](crate::Loader)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Lifetime of every cached entry
    pub ttl: Duration,
    /// Cache not-found outcomes alongside values
    pub cache_negative_results: bool,
    /// Flush a window early once it holds this many keys
    pub max_batch_size: Option<usize>,
    /// Times the deferred flush yields to the runtime before draining the window
    pub flush_yields: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            cache_negative_results: false,
            max_batch_size: None,
            flush_yields: DEFAULT_FLUSH_YIELDS,
        }
    }
}

impl LoaderConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_ttl_ms(self, ttl_ms: u64) -> Self {
        self.with_ttl(Duration::from_millis(ttl_ms))
    }

    pub fn with_cache_negative_results(mut self, enabled: bool) -> Self {
        self.cache_negative_results = enabled;
        self
    }

    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = Some(max);
        self
    }

    pub fn with_flush_yields(mut self, yields: usize) -> Self {
        self.flush_yields = yields;
        self
    }

    /// Reject configurations the loader cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(LoadError::InvalidConfiguration(
                "ttl must be positive".to_string(),
            ));
        }
        if self.max_batch_size == Some(0) {
            return Err(LoadError::InvalidConfiguration(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
