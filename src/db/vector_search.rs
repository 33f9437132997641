use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{embedding::embedding_to_pgvector, error::StoreError, models::StoredNftMetadata};

/// A stored NFT near a query vector.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: Uuid,
    pub title: String,
    pub creator: Option<String>,
    pub image_url: String,
    /// Cosine distance to the query vector.
    pub distance: f64,
}

/// Persisted collection of NFT embeddings searchable by cosine distance.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(
        &self,
        id: Uuid,
        embedding: &[f32],
        metadata: &StoredNftMetadata,
    ) -> Result<(), StoreError>;

    /// Up to `limit` stored embeddings ordered by ascending distance,
    /// never including `exclude`.
    async fn nearest(
        &self,
        embedding: &[f32],
        limit: usize,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Neighbor>, StoreError>;
}

/// pgvector-backed store over the `nfts` table.
#[derive(Clone)]
pub struct PgVectorStore {
    pool: PgPool,
}

impl PgVectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn upsert(
        &self,
        id: Uuid,
        embedding: &[f32],
        metadata: &StoredNftMetadata,
    ) -> Result<(), StoreError> {
        let embedding_str = embedding_to_pgvector(embedding);
        let creator = metadata.creator.clone().unwrap_or_else(|| "unknown".to_string());

        sqlx::query(
            r#"
            INSERT INTO nfts (
                id, creator_wallet_address, owner_wallet_address,
                title, image_url, embedding_vector
            )
            VALUES ($1, $2, $2, $3, $4, $5::vector)
            ON CONFLICT (id) DO UPDATE
            SET embedding_vector = EXCLUDED.embedding_vector,
                updated_at = NOW()
            "#,
        )
        .bind(id)
        .bind(creator)
        .bind(&metadata.name)
        .bind(&metadata.image_url)
        .bind(embedding_str)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn nearest(
        &self,
        embedding: &[f32],
        limit: usize,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Neighbor>, StoreError> {
        let embedding_str = embedding_to_pgvector(embedding);

        let rows = sqlx::query_as::<_, Neighbor>(
            r#"
            SELECT
                id,
                title,
                creator_wallet_address as creator,
                image_url,
                (embedding_vector <=> $1::vector)::float8 as distance
            FROM nfts
            WHERE embedding_vector IS NOT NULL
            AND ($2::uuid IS NULL OR id <> $2)
            ORDER BY embedding_vector <=> $1::vector
            LIMIT $3
            "#,
        )
        .bind(embedding_str)
        .bind(exclude)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
