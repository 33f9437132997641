use std::{sync::Arc, time::Duration};

use uuid::Uuid;

use crate::{
    config::SimilaritySettings,
    db::vector_search::{Neighbor, VectorStore},
    models::{SimilarNft, SimilarNftMetadata, SimilarityResult, clamp_unit},
};

/// Upper bound on neighbours requested from the store in one query.
pub const MAX_RESULTS: usize = 100;

/// Nearest-neighbour lookup of an NFT embedding against stored NFTs.
#[derive(Clone)]
pub struct SimilaritySearch {
    store: Option<Arc<dyn VectorStore>>,
    settings: SimilaritySettings,
    timeout: Duration,
}

impl SimilaritySearch {
    pub fn new(store: Option<Arc<dyn VectorStore>>, settings: SimilaritySettings, timeout: Duration) -> Self {
        Self {
            store,
            settings,
            timeout,
        }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    pub fn store(&self) -> Option<&Arc<dyn VectorStore>> {
        self.store.as_ref()
    }

    /// Search with the configured threshold and limit.
    pub async fn search(&self, embedding: &[f32], exclude: Option<Uuid>) -> SimilarityResult {
        self.search_with(embedding, self.settings.report_threshold, self.settings.limit, exclude)
            .await
    }

    /// Advisory: any missing input or store failure yields the empty result.
    /// `limit` is clamped to `1..=MAX_RESULTS`.
    pub async fn search_with(
        &self,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
        exclude: Option<Uuid>,
    ) -> SimilarityResult {
        if embedding.is_empty() {
            tracing::info!("No embedding supplied, skipping similarity search");
            return SimilarityResult::empty();
        }
        let Some(store) = &self.store else {
            tracing::warn!("Vector store not configured, skipping similarity search");
            return SimilarityResult::empty();
        };

        let limit = limit.clamp(1, MAX_RESULTS);
        tracing::info!("🔎 Similarity Search querying {} nearest neighbours", limit);

        let neighbors = match tokio::time::timeout(self.timeout, store.nearest(embedding, limit, exclude)).await {
            Ok(Ok(neighbors)) => neighbors,
            Ok(Err(e)) => {
                tracing::error!("Similarity query failed: {}", e);
                return SimilarityResult::failed(e.to_string());
            }
            Err(_) => {
                tracing::error!("Similarity query timed out after {:?}", self.timeout);
                return SimilarityResult::failed(format!("similarity query timed out after {:?}", self.timeout));
            }
        };

        let result = rank(neighbors, threshold, limit, self.settings.duplicate_threshold, exclude);
        tracing::info!(
            "Found {} similar NFTs (max similarity {:.3}, duplicate: {})",
            result.similarity_count,
            result.max_similarity,
            result.is_duplicate
        );
        result
    }
}

/// Sorts by ascending distance, converts to similarity, and applies the
/// threshold and limit.
pub fn rank(
    mut neighbors: Vec<Neighbor>,
    threshold: f64,
    limit: usize,
    duplicate_threshold: f64,
    exclude: Option<Uuid>,
) -> SimilarityResult {
    neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    let similar_nfts: Vec<SimilarNft> = neighbors
        .into_iter()
        .filter(|n| Some(n.id) != exclude)
        .map(|n| SimilarNft {
            nft_id: n.id.to_string(),
            similarity: clamp_unit(1.0 - n.distance),
            metadata: SimilarNftMetadata {
                name: n.title,
                creator: n.creator,
                image_url: n.image_url,
            },
        })
        .filter(|s| s.similarity >= threshold)
        .take(limit)
        .collect();

    let max_similarity = similar_nfts.iter().map(|s| s.similarity).fold(0.0, f64::max);

    SimilarityResult {
        max_similarity,
        is_duplicate: max_similarity > duplicate_threshold,
        similarity_count: similar_nfts.len(),
        evidence_urls: similar_nfts.iter().map(|s| s.metadata.image_url.clone()).collect(),
        similar_nfts,
        error: None,
    }
}
