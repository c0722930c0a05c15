//! Batch window and its deferred flush
//!
//! Keys requested while a window is open are collected here. The first key
//! of a window arms one flush task; that task yields to the runtime so every
//! load issued in the same synchronous segment lands in the window before it
//! is drained. Windows are numbered so a flush armed for a window that was
//! already drained early (size cap) does nothing.
//!
//! On a multi-thread runtime the flush task may be picked up by another
//! worker straight away, so separate `load` calls only coalesce reliably on
//! a current-thread runtime. Keys registered together by `load_many` always
//! share a window: they are enqueued under one lock acquisition.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use tracing::trace;

use crate::executor::BatchExecutor;
use crate::loader::Shared;
use crate::types::{Key, Value};

/// What the caller of [`BatchScheduler::enqueue`] must do next
#[derive(Debug, PartialEq, Eq)]
pub enum Enqueued<K> {
    /// First key of a window: arm a deferred flush for this generation
    Arm(u64),
    /// The window is already armed
    Queued,
    /// The window reached its size cap and was drained; execute it now
    Full(Vec<K>),
}

/// Keys accumulated since the last flush
#[derive(Debug)]
pub struct BatchScheduler<K> {
    window: Vec<K>,
    queued: HashSet<K>,
    generation: u64,
    armed: bool,
    max_batch_size: Option<usize>,
}

impl<K> BatchScheduler<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(max_batch_size: Option<usize>) -> Self {
        Self {
            window: Vec::new(),
            queued: HashSet::new(),
            generation: 0,
            armed: false,
            max_batch_size,
        }
    }

    /// Add a key to the current window
    pub fn enqueue(&mut self, key: K) -> Enqueued<K> {
        if !self.queued.insert(key.clone()) {
            return Enqueued::Queued;
        }
        self.window.push(key);

        if self
            .max_batch_size
            .is_some_and(|max| self.window.len() >= max)
        {
            return Enqueued::Full(self.drain());
        }

        if self.armed {
            Enqueued::Queued
        } else {
            self.armed = true;
            Enqueued::Arm(self.generation)
        }
    }

    /// Snapshot and clear the window armed as `generation`.
    ///
    /// Returns `None` when that window was already drained.
    pub fn flush(&mut self, generation: u64) -> Option<Vec<K>> {
        if generation != self.generation {
            return None;
        }
        let keys = self.drain();
        (!keys.is_empty()).then_some(keys)
    }

    fn drain(&mut self) -> Vec<K> {
        self.queued.clear();
        self.generation += 1;
        self.armed = false;
        std::mem::take(&mut self.window)
    }

    /// Number of the window the next enqueued key lands in
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// Spawn the deferred flush for window `generation`
pub(crate) fn schedule_flush<K: Key, V: Value>(shared: Arc<Shared<K, V>>, generation: u64) {
    let yields = shared.config.flush_yields;
    tokio::spawn(async move {
        for _ in 0..yields {
            tokio::task::yield_now().await;
        }
        let keys = shared.lock().scheduler.flush(generation);
        match keys {
            Some(keys) => BatchExecutor::new(shared).execute(generation, keys).await,
            None => trace!(generation, "Window already flushed"),
        }
    });
}
