//! Loaders for the material request detail query
//!
//! One loader per resource type: requests by id, and item lists by request
//! id. Both share nothing, so invalidation touches each explicitly.

use std::sync::Arc;

use batch_loader::{Loader, LoaderConfig, LoaderStats, Result};
use material_db::{MaterialItem, MaterialRequest, RequestDetail};
use serde::Serialize;
use tracing::debug;

use crate::fetchers::{ItemsFetcher, RequestFetcher};
use crate::store::MaterialStore;

pub type RequestLoader = Loader<String, Arc<MaterialRequest>>;
pub type ItemsLoader = Loader<String, Arc<Vec<MaterialItem>>>;

/// Stats of both loaders
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceStats {
    pub requests: LoaderStats,
    pub items: LoaderStats,
}

/// Batched, cached access to material requests and their items.
///
/// Construct one per process and share it (it is cheap to clone).
#[derive(Clone)]
pub struct DataLoaderService {
    requests: RequestLoader,
    items: ItemsLoader,
}

impl DataLoaderService {
    pub fn new<S: MaterialStore>(store: S, config: LoaderConfig) -> Result<Self> {
        let store = Arc::new(store);
        Ok(Self {
            requests: Loader::new(RequestFetcher::new(store.clone()), config.clone())?,
            items: Loader::new(ItemsFetcher::new(store), config)?,
        })
    }

    /// Load one material request; `NotFound` when it does not exist
    pub async fn load_material_request(&self, request_id: &str) -> Result<Arc<MaterialRequest>> {
        self.requests.load(request_id.to_string()).await
    }

    /// Load the items of one request; empty when it has none
    pub async fn load_material_items(&self, request_id: &str) -> Result<Arc<Vec<MaterialItem>>> {
        self.items.load(request_id.to_string()).await
    }

    /// Load several requests in one batch, failing on the first missing one
    pub async fn load_material_requests_batch(
        &self,
        request_ids: &[String],
    ) -> Result<Vec<Arc<MaterialRequest>>> {
        self.requests
            .load_many(request_ids.iter().cloned())
            .await
            .into_iter()
            .collect()
    }

    /// Load the items of several requests in one batch
    pub async fn load_material_items_batch(
        &self,
        request_ids: &[String],
    ) -> Result<Vec<Arc<Vec<MaterialItem>>>> {
        self.items
            .load_many(request_ids.iter().cloned())
            .await
            .into_iter()
            .collect()
    }

    /// Load a request and its items in parallel.
    ///
    /// Both loads join the current batch windows, so concurrent detail
    /// queries cost one request query and one items query in total.
    pub async fn load_request_detail(&self, request_id: &str) -> Result<RequestDetail> {
        let (request, items) = tokio::join!(
            self.load_material_request(request_id),
            self.load_material_items(request_id),
        );
        let request = request?;
        let items = items?;
        debug!(request_id, items = items.len(), "Loaded request detail");

        Ok(RequestDetail {
            request: MaterialRequest::clone(&request),
            items: items.to_vec(),
        })
    }

    /// Forget everything cached for one request, e.g. after it was edited
    pub fn invalidate_request(&self, request_id: &str) {
        let key = request_id.to_string();
        self.requests.invalidate(&key);
        self.items.invalidate(&key);
    }

    /// Forget everything cached by both loaders
    pub fn clear_cache(&self) {
        self.requests.clear();
        self.items.clear();
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            requests: self.requests.stats(),
            items: self.items.stats(),
        }
    }
}
