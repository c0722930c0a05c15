//! Material Request Loader
//!
//! Serves the material request detail query through two batching, caching
//! loaders (requests by id, items by request id) so that many concurrent
//! detail lookups cost one query per resource type.

pub mod config;
pub mod error;
pub mod fetchers;
pub mod service;
pub mod store;

pub use config::Config;
pub use error::{Result, ServiceError};
pub use service::{DataLoaderService, ItemsLoader, RequestLoader, ServiceStats};
pub use store::{MaterialStore, PgMaterialStore};
