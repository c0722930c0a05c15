//! Bulk fetches backing the two loaders

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use batch_loader::{BatchFetch, BatchOutcome, LoadError};
use material_db::{MaterialItem, MaterialRequest};

use crate::store::MaterialStore;

/// One query for all requests of a window. Ids without a row come back as
/// not found.
pub struct RequestFetcher<S> {
    store: Arc<S>,
}

impl<S> RequestFetcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: MaterialStore> BatchFetch<String, Arc<MaterialRequest>> for RequestFetcher<S> {
    async fn fetch(
        &self,
        keys: &[String],
    ) -> batch_loader::Result<BatchOutcome<String, Arc<MaterialRequest>>> {
        let rows = self
            .store
            .requests_by_ids(keys)
            .await
            .map_err(LoadError::backend)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.request_id.clone(), Ok(Arc::new(row))))
            .collect())
    }
}

/// One query for the items of all requests of a window, grouped per
/// request. A request without items resolves to an empty list.
pub struct ItemsFetcher<S> {
    store: Arc<S>,
}

impl<S> ItemsFetcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: MaterialStore> BatchFetch<String, Arc<Vec<MaterialItem>>> for ItemsFetcher<S> {
    async fn fetch(
        &self,
        keys: &[String],
    ) -> batch_loader::Result<BatchOutcome<String, Arc<Vec<MaterialItem>>>> {
        let rows = self
            .store
            .items_by_request_ids(keys)
            .await
            .map_err(LoadError::backend)?;

        let mut grouped: HashMap<String, Vec<MaterialItem>> =
            keys.iter().map(|key| (key.clone(), Vec::new())).collect();
        for item in rows {
            if let Some(items) = grouped.get_mut(&item.request_id) {
                items.push(item);
            }
        }

        Ok(grouped
            .into_iter()
            .map(|(key, items)| (key, Ok(Arc::new(items))))
            .collect())
    }
}
