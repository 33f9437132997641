use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::StoreError;

const MAX_CONNECTIONS: u32 = 20;

/// Connects to the NFT database. `acquire_timeout` bounds how long a query
/// waits for a free connection.
pub async fn create_pool(database_url: &str, acquire_timeout: Duration) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
        .context("connecting to NFT database")?;

    tracing::info!("-->Connected to NFT database (max {} connections)", MAX_CONNECTIONS);
    Ok(pool)
}

/// Round-trips a query and reports whether the pgvector extension is installed.
pub async fn test_connection(pool: &PgPool) -> Result<bool> {
    let vector_installed: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'vector')")
            .fetch_one(pool)
            .await
            .context("database connection test")?;

    if vector_installed {
        tracing::info!("-->Database connection test successful, pgvector available");
    } else {
        tracing::warn!("Database reachable but pgvector is not installed yet");
    }
    Ok(vector_installed)
}

/// Applies the bundled schema migrations (pgvector extension, `nfts` table).
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("-->Database migrations applied");
    Ok(())
}

/// Declared dimension of `nfts.embedding_vector`, `None` when the column is
/// missing or declared without one.
pub async fn embedding_column_dimension(pool: &PgPool) -> Result<Option<usize>> {
    // pgvector stores the declared dimension as the column's type modifier
    let typmod: Option<i32> = sqlx::query_scalar(
        "SELECT atttypmod FROM pg_attribute \
         WHERE attrelid = to_regclass('nfts') AND attname = 'embedding_vector' AND NOT attisdropped",
    )
    .fetch_optional(pool)
    .await
    .context("reading embedding column dimension")?;
    Ok(typmod.and_then(|m| usize::try_from(m).ok()).filter(|d| *d > 0))
}

/// Fails when the schema's vector column cannot hold embeddings of the
/// configured dimension.
pub fn check_embedding_dimension(column: Option<usize>, configured: usize) -> Result<()> {
    match column {
        Some(dimension) if dimension != configured => anyhow::bail!(
            "EMBEDDING_DIMENSION is {configured} but nfts.embedding_vector is vector({dimension}); \
             update the migration or the setting so they agree"
        ),
        Some(_) => Ok(()),
        None => {
            tracing::warn!("Could not determine nfts.embedding_vector dimension; skipping check");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_dimension_passes() {
        assert!(check_embedding_dimension(Some(768), 768).is_ok());
        assert!(check_embedding_dimension(None, 384).is_ok());
    }

    #[test]
    fn mismatched_dimension_is_a_startup_error() {
        let err = check_embedding_dimension(Some(768), 384).unwrap_err();
        assert!(err.to_string().contains("vector(768)"));
    }
}
