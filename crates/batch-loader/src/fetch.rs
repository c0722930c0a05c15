//! The backend seam: one bulk fetch per flushed window

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::error::Result;

/// Per-key outcomes of one bulk fetch.
///
/// A key missing from the map is treated as not found.
pub type BatchOutcome<K, V> = HashMap<K, Result<V>>;

/// Caller-supplied bulk fetch.
///
/// Receives the deduplicated keys of one window. An `Err` return fails every
/// key of the window with that same error.
#[async_trait]
pub trait BatchFetch<K, V>: Send + Sync + 'static {
    async fn fetch(&self, keys: &[K]) -> Result<BatchOutcome<K, V>>;
}

/// [`BatchFetch`] backed by an async closure, see [`fetch_fn`]
pub struct FetchFn<F, K, V> {
    f: F,
    _marker: PhantomData<fn(Vec<K>) -> V>,
}

/// Build a [`BatchFetch`] from a closure taking the window's keys
pub fn fetch_fn<F, Fut, K, V>(f: F) -> FetchFn<F, K, V>
where
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<BatchOutcome<K, V>>> + Send + 'static,
{
    FetchFn {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, K, V> BatchFetch<K, V> for FetchFn<F, K, V>
where
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<BatchOutcome<K, V>>> + Send + 'static,
    K: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    async fn fetch(&self, keys: &[K]) -> Result<BatchOutcome<K, V>> {
        (self.f)(keys.to_vec()).await
    }
}
