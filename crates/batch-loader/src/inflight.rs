//! Registry of pending loads
//!
//! One pending handle per key. Every concurrent requester of the key holds a
//! [`Waiter`] attached to that handle; settlement resolves them all with the
//! same outcome and removes the handle.
//!
//! Invalidating a key detaches its handle: the waiters already attached are
//! still settled by the batch that was carrying them, but the next load opens
//! a fresh handle, and the detached outcome is never cached.

use std::collections::HashMap;
use std::hash::Hash;

use tokio::sync::oneshot;

use crate::error::{LoadError, Result};

/// Completion handles of everyone waiting on one key
#[derive(Debug)]
pub struct PendingHandle<V> {
    window: u64,
    waiters: Vec<oneshot::Sender<Result<V>>>,
}

impl<V: Clone> PendingHandle<V> {
    fn new(window: u64) -> Self {
        Self {
            window,
            waiters: Vec::new(),
        }
    }

    fn attach(&mut self) -> Waiter<V> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        Waiter { rx }
    }

    fn resolve(self, outcome: &Result<V>) -> usize {
        self.waiters
            .into_iter()
            .map(|tx| tx.send(outcome.clone()).is_ok())
            .filter(|delivered| *delivered)
            .count()
    }

    /// Batch window the handle's key was enqueued in
    pub fn window(&self) -> u64 {
        self.window
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}

/// Receiving side of a pending load
#[derive(Debug)]
pub struct Waiter<V> {
    rx: oneshot::Receiver<Result<V>>,
}

impl<V> Waiter<V> {
    /// Wait for the key to settle
    pub async fn wait(self) -> Result<V> {
        match self.rx.await {
            Ok(outcome) => outcome,
            // Handle dropped unsettled: the runtime shut down mid-batch.
            Err(_) => Err(LoadError::backend("pending load dropped before settling")),
        }
    }
}

/// What [`InFlightRegistry::settle`] did for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settled {
    /// Waiters that were still listening
    pub delivered: usize,
    /// Whether the key's live handle belonged to the settled window. When
    /// false the outcome predates an invalidation and must not be cached.
    pub current: bool,
}

/// Key -> pending handle map
#[derive(Debug)]
pub struct InFlightRegistry<K, V> {
    pending: HashMap<K, PendingHandle<V>>,
    detached: HashMap<K, Vec<PendingHandle<V>>>,
}

impl<K, V> InFlightRegistry<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            detached: HashMap::new(),
        }
    }

    /// Attach to the pending handle for `key`, creating it in batch window
    /// `window` if needed.
    ///
    /// Returns `true` alongside the waiter when the handle was created by
    /// this call; only then must the caller enqueue the key.
    pub fn get_or_create(&mut self, key: K, window: u64) -> (Waiter<V>, bool) {
        let mut is_new = false;
        let handle = self.pending.entry(key).or_insert_with(|| {
            is_new = true;
            PendingHandle::new(window)
        });
        (handle.attach(), is_new)
    }

    /// Detach the live handle of `key` so the next load starts over.
    ///
    /// Its waiters stay attached and are settled with their window.
    pub fn detach(&mut self, key: &K) -> bool
    where
        K: Clone,
    {
        match self.pending.remove(key) {
            Some(handle) => {
                self.detached.entry(key.clone()).or_default().push(handle);
                true
            }
            None => false,
        }
    }

    /// Detach every live handle
    pub fn detach_all(&mut self) {
        for (key, handle) in self.pending.drain() {
            self.detached.entry(key).or_default().push(handle);
        }
    }

    /// Resolve every waiter of `key` enqueued in batch window `window`
    /// with `outcome` and drop their handles.
    pub fn settle(&mut self, key: &K, window: u64, outcome: &Result<V>) -> Settled {
        let current = self
            .pending
            .get(key)
            .is_some_and(|handle| handle.window == window);

        let mut delivered = 0;
        if current {
            if let Some(handle) = self.pending.remove(key) {
                delivered += handle.resolve(outcome);
            }
        }

        if let Some(handles) = self.detached.get_mut(key) {
            let (settled, kept): (Vec<_>, Vec<_>) = handles
                .drain(..)
                .partition(|handle| handle.window == window);
            *handles = kept;
            if handles.is_empty() {
                self.detached.remove(key);
            }
            delivered += settled
                .into_iter()
                .map(|handle| handle.resolve(outcome))
                .sum::<usize>();
        }

        Settled { delivered, current }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    /// Live handles; detached ones are counted by [`Self::detached_len`]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn detached_len(&self) -> usize {
        self.detached.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.detached.is_empty()
    }
}

impl<K, V> Default for InFlightRegistry<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
