//! Batch Loader
//!
//! A per-key request loader for avoiding N+1 query storms:
//! concurrent loads of the same key share one pending result, loads issued
//! in the same scheduling tick are coalesced into a single bulk fetch, and
//! resolved values are cached for a bounded time.
//!
//! The backend is whatever [`BatchFetch`] the caller supplies.

mod cache;
mod config;
mod error;
mod executor;
mod fetch;
mod inflight;
mod loader;
mod scheduler;
mod types;

pub use cache::{CacheEntry, CacheStore, Cached};
pub use config::LoaderConfig;
pub use error::{BoxError, LoadError, Result};
pub use fetch::{fetch_fn, BatchFetch, BatchOutcome, FetchFn};
pub use inflight::{InFlightRegistry, PendingHandle, Settled, Waiter};
pub use loader::Loader;
pub use scheduler::{BatchScheduler, Enqueued};
pub use types::{Key, LoaderStats, Value};
