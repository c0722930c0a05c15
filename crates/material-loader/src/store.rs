//! Backend access for the loaders

use async_trait::async_trait;
use material_db::{MaterialItem, MaterialRequest};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

/// Bulk reads the loaders batch into. Each call is one backend round-trip.
#[async_trait]
pub trait MaterialStore: Send + Sync + 'static {
    /// Requests whose id is in `request_ids`; unknown ids are omitted
    async fn requests_by_ids(
        &self,
        request_ids: &[String],
    ) -> Result<Vec<MaterialRequest>, sqlx::Error>;

    /// Items belonging to any request in `request_ids`
    async fn items_by_request_ids(
        &self,
        request_ids: &[String],
    ) -> Result<Vec<MaterialItem>, sqlx::Error>;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgMaterialStore {
    pool: PgPool,
}

impl PgMaterialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("Database connection established");
        Ok(Self { pool })
    }
}

#[async_trait]
impl MaterialStore for PgMaterialStore {
    async fn requests_by_ids(
        &self,
        request_ids: &[String],
    ) -> Result<Vec<MaterialRequest>, sqlx::Error> {
        material_db::requests::get_by_request_ids(&self.pool, request_ids).await
    }

    async fn items_by_request_ids(
        &self,
        request_ids: &[String],
    ) -> Result<Vec<MaterialItem>, sqlx::Error> {
        material_db::items::get_for_request_ids(&self.pool, request_ids).await
    }
}
