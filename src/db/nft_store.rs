use async_trait::async_trait;
use sqlx::{PgPool, types::Json};
use uuid::Uuid;

use crate::{
    embedding::embedding_to_pgvector,
    error::StoreError,
    models::{NftRecord, ResultEnvelope},
};

/// What the orchestrator writes back onto an analysed NFT.
#[derive(Debug, Clone)]
pub struct AnalysisWriteback {
    /// `analysis_details` blob including status, timestamps and verdict fields.
    pub analysis_details: serde_json::Value,
    /// Only present when the image stage produced a non-empty embedding.
    pub embedding: Option<Vec<f32>>,
}

impl AnalysisWriteback {
    pub fn from_envelope(
        envelope: &ResultEnvelope,
        analyzed_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            analysis_details: envelope.persisted_details(analyzed_at)?,
            embedding: envelope.embedding().map(<[f32]>::to_vec),
        })
    }
}

/// Read/write access to NFT records.
#[async_trait]
pub trait NftRecordStore: Send + Sync {
    async fn fetch_nft(&self, id: Uuid) -> Result<Option<NftRecord>, StoreError>;

    async fn insert_nft(&self, record: &NftRecord) -> Result<(), StoreError>;

    /// Overwrites any previous analysis. Errors with `NotFound` if the record is missing.
    async fn save_analysis(&self, id: Uuid, writeback: &AnalysisWriteback) -> Result<(), StoreError>;

    async fn load_analysis(&self, id: Uuid) -> Result<Option<serde_json::Value>, StoreError>;
}

#[derive(Clone)]
pub struct PgNftStore {
    pool: PgPool,
}

impl PgNftStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NftRecordStore for PgNftStore {
    async fn fetch_nft(&self, id: Uuid) -> Result<Option<NftRecord>, StoreError> {
        let record = sqlx::query_as::<_, NftRecord>(
            r#"
            SELECT
                id,
                creator_wallet_address,
                owner_wallet_address,
                title,
                description,
                image_url,
                category,
                initial_price::float8 as initial_price
            FROM nfts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn insert_nft(&self, record: &NftRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO nfts (
                id, creator_wallet_address, owner_wallet_address, title,
                description, image_url, category, initial_price
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8::numeric)
            "#,
        )
        .bind(record.id)
        .bind(&record.creator_wallet_address)
        .bind(&record.owner_wallet_address)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.image_url)
        .bind(&record.category)
        .bind(record.initial_price)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_analysis(&self, id: Uuid, writeback: &AnalysisWriteback) -> Result<(), StoreError> {
        let embedding_str = writeback.embedding.as_deref().map(embedding_to_pgvector);

        let result = sqlx::query(
            r#"
            UPDATE nfts
            SET analysis_details = $2,
                embedding_vector = COALESCE($3::vector, embedding_vector),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(&writeback.analysis_details))
        .bind(embedding_str)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn load_analysis(&self, id: Uuid) -> Result<Option<serde_json::Value>, StoreError> {
        let details = sqlx::query_scalar::<_, Option<Json<serde_json::Value>>>(
            "SELECT analysis_details FROM nfts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(details.flatten().map(|Json(value)| value))
    }
}
