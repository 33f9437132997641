pub mod agents;
pub mod analysis;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod image_fetch;
pub mod json_extract;
pub mod llm;
pub mod models;
pub mod routes;

pub use analysis::{FraudAnalyzer, PersistenceHandle};
pub use config::Settings;
pub use db::pool::create_pool;
pub use models::*;

use std::sync::Arc;

use sqlx::PgPool;

use crate::{agents::DescriptionEmbedder, db::nft_store::NftRecordStore};

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<FraudAnalyzer>,
    pub descriptions: Arc<DescriptionEmbedder>,
    pub records: Arc<dyn NftRecordStore>,
    pub settings: Arc<Settings>,
    /// `None` when running on the in-memory stores.
    pub pool: Option<PgPool>,
}

impl AppState {
    /// Closes the database pool, if any.
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
            tracing::info!("-->Database pool closed");
        }
    }
}
