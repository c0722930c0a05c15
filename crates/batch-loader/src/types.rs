//! Shared loader types

use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Bounds required of a loader key
pub trait Key: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> Key for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Bounds required of a loaded value. Values are cloned once per waiter,
/// so large resources are best wrapped in an `Arc`.
pub trait Value: Clone + Send + Sync + 'static {}

impl<T> Value for T where T: Clone + Send + Sync + 'static {}

/// Counters for one loader instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderStats {
    /// Loads answered from the cache
    pub hits: u64,
    /// Loads that had to wait on a batch
    pub misses: u64,
    /// Misses that attached to an already pending key
    pub joined: u64,
    /// Bulk fetch invocations
    pub batches: u64,
    /// Keys sent to the bulk fetch, summed over all batches
    pub keys_fetched: u64,
    /// Bulk fetch invocations that failed as a whole
    pub failed_batches: u64,
}
