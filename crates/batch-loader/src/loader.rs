//! The loader facade

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tracing::trace;

use crate::cache::CacheStore;
use crate::config::LoaderConfig;
use crate::error::Result;
use crate::executor::BatchExecutor;
use crate::fetch::BatchFetch;
use crate::inflight::{InFlightRegistry, Waiter};
use crate::scheduler::{schedule_flush, BatchScheduler, Enqueued};
use crate::types::{Key, LoaderStats, Value};

/// Everything guarded by the loader's single lock
pub(crate) struct LoaderState<K, V> {
    pub(crate) cache: CacheStore<K, V>,
    pub(crate) inflight: InFlightRegistry<K, V>,
    pub(crate) scheduler: BatchScheduler<K>,
    pub(crate) stats: LoaderStats,
}

pub(crate) struct Shared<K, V> {
    pub(crate) config: LoaderConfig,
    pub(crate) fetch: Box<dyn BatchFetch<K, V>>,
    state: Mutex<LoaderState<K, V>>,
}

impl<K, V> Shared<K, V> {
    /// The lock is never held across an `.await`, and a panic while holding
    /// it cannot leave the maps half-updated, so poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, LoaderState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Batching, deduplicating, caching loader for one resource type.
///
/// Cloning yields another handle to the same loader. Loads must be issued
/// from within a Tokio runtime.
pub struct Loader<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for Loader<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// A registered load: answered from the cache, or waiting on a batch
enum Slot<V> {
    Ready(Result<V>),
    Waiting(Waiter<V>),
}

impl<V> Slot<V> {
    async fn resolve(self) -> Result<V> {
        match self {
            Slot::Ready(outcome) => outcome,
            Slot::Waiting(waiter) => waiter.wait().await,
        }
    }
}

impl<K: Key, V: Value> Loader<K, V> {
    /// Create a loader around a bulk fetch
    pub fn new(fetch: impl BatchFetch<K, V>, config: LoaderConfig) -> Result<Self> {
        config.validate()?;
        let state = LoaderState {
            cache: CacheStore::new(),
            inflight: InFlightRegistry::new(),
            scheduler: BatchScheduler::new(config.max_batch_size),
            stats: LoaderStats::default(),
        };
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                fetch: Box::new(fetch),
                state: Mutex::new(state),
            }),
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.shared.config
    }

    /// Load the value for `key`.
    ///
    /// Cached values resolve without yielding. Otherwise the call joins the
    /// pending load for the key, or opens one in the current batch window.
    pub async fn load(&self, key: K) -> Result<V> {
        let slot = {
            let mut state = self.shared.lock();
            self.register(&mut state, key)
        };
        slot.resolve().await
    }

    /// Load several keys through the same batch window.
    ///
    /// Every key is registered before any is awaited, so the keys share one
    /// bulk fetch (split only by `max_batch_size`) on any runtime flavour.
    /// Results are returned in input order, one per key.
    pub async fn load_many<I>(&self, keys: I) -> Vec<Result<V>>
    where
        I: IntoIterator<Item = K>,
    {
        let slots: Vec<Slot<V>> = {
            let mut state = self.shared.lock();
            keys.into_iter()
                .map(|key| self.register(&mut state, key))
                .collect()
        };
        join_all(slots.into_iter().map(Slot::resolve)).await
    }

    fn register(&self, state: &mut LoaderState<K, V>, key: K) -> Slot<V> {
        if let Some(cached) = state.cache.get(&key) {
            state.stats.hits += 1;
            trace!(?key, "Cache hit");
            return Slot::Ready(cached);
        }
        state.stats.misses += 1;

        let window = state.scheduler.generation();
        let (waiter, is_new) = state.inflight.get_or_create(key.clone(), window);
        if is_new {
            match state.scheduler.enqueue(key) {
                Enqueued::Arm(generation) => schedule_flush(Arc::clone(&self.shared), generation),
                Enqueued::Full(keys) => {
                    BatchExecutor::new(Arc::clone(&self.shared)).spawn(window, keys)
                }
                Enqueued::Queued => {}
            }
        } else {
            state.stats.joined += 1;
            trace!(?key, "Joined pending load");
        }
        Slot::Waiting(waiter)
    }

    /// Seed the cache for `key` unless a live entry already exists.
    ///
    /// Returns whether the value was stored.
    pub fn prime(&self, key: K, value: V) -> bool {
        let ttl = self.shared.config.ttl;
        let mut state = self.shared.lock();
        if state.cache.contains(&key) {
            return false;
        }
        state.cache.set(key, Ok(value), ttl).is_ok()
    }

    /// Forget `key`: drop its cached entry and detach any pending load.
    ///
    /// Callers already waiting still get the pending outcome, but it is not
    /// cached, and the next load fetches again. Returns whether anything was
    /// dropped.
    pub fn invalidate(&self, key: &K) -> bool {
        let mut state = self.shared.lock();
        let cached = state.cache.invalidate(key);
        let pending = state.inflight.detach(key);
        cached || pending
    }

    /// Forget every key, cached or pending
    pub fn clear(&self) {
        let mut state = self.shared.lock();
        state.cache.clear();
        state.inflight.detach_all();
    }

    pub fn stats(&self) -> LoaderStats {
        self.shared.lock().stats.clone()
    }

    /// Number of keys currently awaiting a batch, detached ones included
    pub fn pending_count(&self) -> usize {
        let state = self.shared.lock();
        state.inflight.len() + state.inflight.detached_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::fetch::{fetch_fn, BatchOutcome};
    use futures::FutureExt;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Calls = Arc<Mutex<Vec<Vec<String>>>>;

    /// Loader over "exists unless the key starts with `missing`", recording
    /// every key set it is asked for
    fn recording_loader(config: LoaderConfig) -> (Loader<String, Arc<String>>, Calls) {
        let calls: Calls = Arc::default();
        let recorded = calls.clone();
        let fetch = fetch_fn(move |keys: Vec<String>| {
            let mut sorted = keys.clone();
            sorted.sort();
            recorded.lock().unwrap().push(sorted);
            async move {
                let outcome: BatchOutcome<String, Arc<String>> = keys
                    .into_iter()
                    .filter(|k| !k.starts_with("missing"))
                    .map(|k| {
                        let value = Arc::new(format!("value-{k}"));
                        (k, Ok(value))
                    })
                    .collect();
                Ok::<_, LoadError>(outcome)
            }
        });
        (Loader::new(fetch, config).unwrap(), calls)
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    fn call_count(calls: &Calls) -> usize {
        calls.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let fetch = fetch_fn(|_keys: Vec<String>| async {
            Ok::<_, LoadError>(HashMap::<String, Result<i32>>::new())
        });
        let result = Loader::new(fetch, LoaderConfig::default().with_ttl_ms(0));
        assert!(matches!(result, Err(LoadError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() {
        let (loader, calls) = recording_loader(LoaderConfig::default().with_ttl_ms(5000));

        let (a, b, c, d) = tokio::join!(
            loader.load(key("r1")),
            loader.load(key("r1")),
            loader.load(key("r1")),
            loader.load(key("r2")),
        );

        assert_eq!(*calls.lock().unwrap(), vec![vec![key("r1"), key("r2")]]);

        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(*a, "value-r1");
        assert_eq!(*d.unwrap(), "value-r2");

        let stats = loader.stats();
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.keys_fetched, 2);
        assert_eq!(stats.joined, 2);
        assert_eq!(loader.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_load_many_is_one_batch_in_input_order() {
        let (loader, calls) = recording_loader(LoaderConfig::default());

        let results = loader
            .load_many(vec![key("r3"), key("r1"), key("r2"), key("r1")])
            .await;

        assert_eq!(call_count(&calls), 1);
        assert_eq!(calls.lock().unwrap()[0], vec![key("r1"), key("r2"), key("r3")]);
        let values: Vec<String> = results.into_iter().map(|r| (*r.unwrap()).clone()).collect();
        assert_eq!(values, vec!["value-r3", "value-r1", "value-r2", "value-r1"]);
    }

    #[tokio::test]
    async fn test_load_many_reports_per_key_errors() {
        let (loader, _calls) = recording_loader(LoaderConfig::default());

        let results = loader.load_many(vec![key("r1"), key("missing-1")]).await;

        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_within_ttl() {
        let (loader, calls) = recording_loader(LoaderConfig::default().with_ttl_ms(5000));

        let first = loader.load(key("r1")).await.unwrap();
        tokio::time::advance(Duration::from_millis(4999)).await;
        let second = loader.load(key("r1")).await.unwrap();

        assert_eq!(call_count(&calls), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_after_ttl() {
        let (loader, calls) = recording_loader(LoaderConfig::default().with_ttl_ms(5000));

        loader.load(key("r1")).await.unwrap();
        tokio::time::advance(Duration::from_millis(5000)).await;
        loader.load(key("r1")).await.unwrap();

        assert_eq!(call_count(&calls), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let (loader, calls) = recording_loader(LoaderConfig::default());

        loader.load(key("r1")).await.unwrap();
        assert!(loader.invalidate(&key("r1")));
        loader.load(key("r1")).await.unwrap();

        assert_eq!(call_count(&calls), 2);
        assert!(!loader.invalidate(&key("unknown")));
    }

    #[tokio::test]
    async fn test_clear_forces_refetch() {
        let (loader, calls) = recording_loader(LoaderConfig::default());

        loader.load_many(vec![key("r1"), key("r2")]).await;
        loader.clear();
        loader.load_many(vec![key("r1"), key("r2")]).await;

        assert_eq!(call_count(&calls), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached_by_default() {
        let (loader, calls) = recording_loader(LoaderConfig::default());

        let err = loader.load(key("missing-r1")).await.unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));

        let err = loader.load(key("missing-r1")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(call_count(&calls), 2);
    }

    #[tokio::test]
    async fn test_not_found_cached_when_configured() {
        let (loader, calls) =
            recording_loader(LoaderConfig::default().with_cache_negative_results(true));

        assert!(loader.load(key("missing-r1")).await.is_err());
        assert!(loader.load(key("missing-r1")).await.unwrap_err().is_not_found());
        assert_eq!(call_count(&calls), 1);
    }

    #[tokio::test]
    async fn test_window_failure_reaches_every_waiter_then_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let fetch = fetch_fn(move |keys: Vec<String>| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    return Err(LoadError::backend("connection reset"));
                }
                let outcome: BatchOutcome<String, String> =
                    keys.into_iter().map(|k| (k.clone(), Ok(k))).collect();
                Ok(outcome)
            }
        });
        let loader = Loader::new(fetch, LoaderConfig::default()).unwrap();

        let (a, b, c) = tokio::join!(
            loader.load(key("r1")),
            loader.load(key("r1")),
            loader.load(key("r2")),
        );

        let errors: Vec<_> = [a, b, c]
            .into_iter()
            .map(|r| match r {
                Err(LoadError::Backend(e)) => e,
                other => panic!("expected backend error, got {other:?}"),
            })
            .collect();
        assert!(Arc::ptr_eq(&errors[0], &errors[1]));
        assert!(Arc::ptr_eq(&errors[0], &errors[2]));
        assert_eq!(loader.pending_count(), 0);
        assert_eq!(loader.stats().failed_batches, 1);

        // No poisoned entry: the next load starts a fresh cycle
        assert_eq!(loader.load(key("r1")).await.unwrap(), "r1");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_fetch_settles_window() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let fetch = fetch_fn(move |keys: Vec<String>| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    panic!("driver bug");
                }
                let outcome: BatchOutcome<String, u32> =
                    keys.into_iter().map(|k| (k, Ok(1))).collect();
                Ok(outcome)
            }
        });
        let loader = Loader::new(fetch, LoaderConfig::default()).unwrap();

        let err = loader.load(key("r1")).await.unwrap_err();
        assert!(err.is_backend());
        assert_eq!(loader.pending_count(), 0);

        assert_eq!(loader.load(key("r1")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_max_batch_size_splits_windows() {
        let (loader, calls) = recording_loader(LoaderConfig::default().with_max_batch_size(2));

        let keys: Vec<String> = (1..=5).map(|i| format!("r{i}")).collect();
        let results = loader.load_many(keys).await;

        assert!(results.iter().all(|r| r.is_ok()));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|batch| batch.len() <= 2));
        assert_eq!(calls.iter().map(Vec::len).sum::<usize>(), 5);
    }

    #[tokio::test]
    async fn test_prime_seeds_cache_without_overwriting() {
        let (loader, calls) = recording_loader(LoaderConfig::default());

        assert!(loader.prime(key("r1"), Arc::new("primed".to_string())));
        assert!(!loader.prime(key("r1"), Arc::new("again".to_string())));

        assert_eq!(*loader.load(key("r1")).await.unwrap(), "primed");
        assert_eq!(call_count(&calls), 0);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_batch() {
        let (loader, calls) = recording_loader(LoaderConfig::default());

        let abandoned = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load(key("r1")).await }
        });
        tokio::task::yield_now().await;
        abandoned.abort();

        // The window still runs and fills the cache
        let value = loader.load(key("r1")).await.unwrap();
        assert_eq!(*value, "value-r1");
        assert_eq!(call_count(&calls), 1);
        assert_eq!(loader.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_separate_loaders_share_nothing() {
        let (first, first_calls) = recording_loader(LoaderConfig::default());
        let (second, second_calls) = recording_loader(LoaderConfig::default());

        let (a, b) = tokio::join!(first.load(key("r1")), second.load(key("r1")));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(call_count(&first_calls), 1);
        assert_eq!(call_count(&second_calls), 1);

        first.invalidate(&key("r1"));
        second.load(key("r1")).await.unwrap();
        assert_eq!(call_count(&second_calls), 1);
    }

    /// Loader whose every fetch sleeps, then answers each key with the
    /// number of the fetch call
    fn slow_loader(delay: Duration) -> (Loader<String, usize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetch = fetch_fn(move |keys: Vec<String>| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(delay).await;
                let outcome: BatchOutcome<String, usize> =
                    keys.into_iter().map(|k| (k, Ok(call))).collect();
                Ok::<_, LoadError>(outcome)
            }
        });
        (Loader::new(fetch, LoaderConfig::default()).unwrap(), calls)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_load_many_is_one_batch_on_multi_thread_runtime() {
        let (loader, calls) = recording_loader(LoaderConfig::default());

        let results = loader
            .load_many((0..5000).map(|i| format!("r{i}")))
            .await;

        assert_eq!(results.len(), 5000);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(call_count(&calls), 1);
        assert_eq!(calls.lock().unwrap()[0].len(), 5000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_load_many_respects_cap_on_multi_thread_runtime() {
        let (loader, calls) = recording_loader(LoaderConfig::default().with_max_batch_size(100));

        let results = loader
            .load_many((0..1000).map(|i| format!("r{i}")))
            .await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(call_count(&calls), 10);
    }

    #[tokio::test]
    async fn test_invalidate_during_fetch_forces_fresh_fetch() {
        let (loader, calls) = slow_loader(Duration::from_millis(50));

        let in_flight = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load(key("r1")).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(loader.invalidate(&key("r1")));
        let fresh = loader.load(key("r1")).await.unwrap();

        assert_eq!(in_flight.await.unwrap().unwrap(), 0);
        assert_eq!(fresh, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Only the fetch issued after the invalidation was cached
        assert_eq!(loader.load(key("r1")).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(loader.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_invalidated_in_flight_result_is_not_cached() {
        let (loader, calls) = slow_loader(Duration::from_millis(20));

        let in_flight = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load(key("r1")).await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        loader.invalidate(&key("r1"));

        // Waiters of the detached load still get its outcome
        assert_eq!(in_flight.await.unwrap().unwrap(), 0);
        assert_eq!(loader.load(key("r1")).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear_during_fetch_forces_fresh_fetch() {
        let (loader, calls) = slow_loader(Duration::from_millis(50));

        let in_flight = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load_many(vec![key("r1"), key("r2")]).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        loader.clear();
        let fresh = loader.load_many(vec![key("r1"), key("r2")]).await;

        let stale = in_flight.await.unwrap();
        assert!(stale.iter().all(|r| *r.as_ref().unwrap() == 0));
        assert!(fresh.iter().all(|r| *r.as_ref().unwrap() == 1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(loader.load(key("r2")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_resolves_without_yielding() {
        let (loader, calls) = recording_loader(LoaderConfig::default());
        loader.prime(key("r1"), Arc::new("primed".to_string()));

        let value = loader
            .load(key("r1"))
            .now_or_never()
            .expect("cache hit must resolve on first poll")
            .unwrap();
        assert_eq!(*value, "primed");

        // A miss has to wait for its window
        assert!(loader.load(key("r2")).now_or_never().is_none());
        assert_eq!(call_count(&calls), 0);
    }
}
