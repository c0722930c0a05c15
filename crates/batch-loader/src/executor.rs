//! Runs one bulk fetch per flushed window and settles its keys

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, trace, warn};

use crate::error::LoadError;
use crate::loader::Shared;
use crate::types::{Key, Value};

pub(crate) struct BatchExecutor<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K: Key, V: Value> BatchExecutor<K, V> {
    pub(crate) fn new(shared: Arc<Shared<K, V>>) -> Self {
        Self { shared }
    }

    /// Execute a window in its own task so it completes even if every
    /// requester stops listening
    pub(crate) fn spawn(self, window: u64, keys: Vec<K>) {
        tokio::spawn(async move { self.execute(window, keys).await });
    }

    /// Fetch the keys of batch window `window` and settle their waiters.
    ///
    /// Outcomes are cached only for keys not invalidated since the window
    /// was filled.
    pub(crate) async fn execute(&self, window: u64, keys: Vec<K>) {
        debug!(window, keys = keys.len(), "Dispatching batch");

        let result = AssertUnwindSafe(self.shared.fetch.fetch(&keys))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(LoadError::backend("batch fetch panicked")));

        let config = &self.shared.config;
        let mut state = self.shared.lock();
        state.stats.batches += 1;
        state.stats.keys_fetched += keys.len() as u64;

        match result {
            Ok(mut outcomes) => {
                let mut delivered = 0;
                for key in keys {
                    let outcome = outcomes
                        .remove(&key)
                        .unwrap_or_else(|| Err(LoadError::not_found(&key)));

                    let cacheable = match &outcome {
                        Ok(_) => true,
                        Err(err) => err.is_not_found() && config.cache_negative_results,
                    };
                    let settled = state.inflight.settle(&key, window, &outcome);
                    delivered += settled.delivered;

                    if !settled.current {
                        trace!(?key, "Key invalidated in flight, not caching");
                    } else if cacheable {
                        if let Err(e) = state.cache.set(key, outcome, config.ttl) {
                            warn!(error = %e, "Failed to cache loaded value");
                        }
                    }
                }
                debug!(waiters = delivered, "Batch settled");
            }
            Err(err) => {
                state.stats.failed_batches += 1;
                warn!(keys = keys.len(), error = %err, "Batch fetch failed");
                let outcome = Err(err);
                for key in &keys {
                    state.inflight.settle(key, window, &outcome);
                }
            }
        }
    }
}
