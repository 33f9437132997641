use std::{sync::Arc, time::Duration, time::Instant};

use chrono::Utc;
use futures::{StreamExt, stream};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::{
    agents::{DecisionMaker, DescriptionEmbedder, ImageAnalyzer, MetadataAnalyzer, SimilaritySearch},
    config::Settings,
    db::{
        nft_store::{AnalysisWriteback, NftRecordStore},
        vector_search::VectorStore,
    },
    embedding::{EmbeddingChain, HashingEmbedder, LocalEmbedder, TextEmbedder},
    error::StoreError,
    image_fetch::{HttpImageSource, ImageSource},
    llm::{GeminiClient, LanguageModel},
    models::{NftInput, ResultEnvelope},
};

/// Where to write an analysis back once it completes.
#[derive(Clone)]
pub struct PersistenceHandle {
    pub store: Arc<dyn NftRecordStore>,
    pub nft_id: Uuid,
}

/// Orchestrates the image, similarity, metadata and decision stages.
pub struct FraudAnalyzer {
    image_analyzer: ImageAnalyzer,
    similarity_search: SimilaritySearch,
    metadata_analyzer: MetadataAnalyzer,
    decision_maker: DecisionMaker,
    persistence_timeout: Duration,
    max_concurrency: usize,
    /// Shared by every caller, so HTTP requests and batches respect one limit.
    permits: Semaphore,
}

/// Every stage plus the standalone description service, built from one configuration.
pub struct Components {
    pub analyzer: FraudAnalyzer,
    pub descriptions: DescriptionEmbedder,
}

impl FraudAnalyzer {
    pub fn new(
        image_analyzer: ImageAnalyzer,
        similarity_search: SimilaritySearch,
        metadata_analyzer: MetadataAnalyzer,
        decision_maker: DecisionMaker,
        persistence_timeout: Duration,
        max_concurrency: usize,
    ) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            image_analyzer,
            similarity_search,
            metadata_analyzer,
            decision_maker,
            persistence_timeout,
            max_concurrency,
            permits: Semaphore::new(max_concurrency),
        }
    }

    /// Builds every stage from `settings`, degrading each collaborator that
    /// is not configured.
    pub fn initialize(settings: &Settings, vector_store: Option<Arc<dyn VectorStore>>) -> Components {
        let gemini = settings.gemini.clone().map(|gemini| Arc::new(GeminiClient::new(gemini)));
        match &gemini {
            Some(client) => tracing::info!("-->Gemini model {} initialized", client.model()),
            None => tracing::warn!("GOOGLE_API_KEY not set; using heuristic fallbacks"),
        }
        let model: Option<Arc<dyn LanguageModel>> = gemini.clone().map(|c| c as Arc<dyn LanguageModel>);
        let primary: Option<Arc<dyn TextEmbedder>> = gemini.map(|c| c as Arc<dyn TextEmbedder>);

        let fallback: Arc<dyn TextEmbedder> = match &settings.embedding_model_dir {
            Some(dir) => match LocalEmbedder::load(dir) {
                Ok(local) => Arc::new(local),
                Err(e) => {
                    tracing::warn!("Local embedding model unavailable ({}), using hashing embedder", e);
                    Arc::new(HashingEmbedder::new(settings.embedding_dimension))
                }
            },
            None => Arc::new(HashingEmbedder::new(settings.embedding_dimension)),
        };
        tracing::info!("-->Fallback embedder: {}", fallback.name());

        let embeddings = EmbeddingChain::new(
            primary,
            fallback,
            settings.embedding_dimension,
            settings.timeouts.embedding,
        );
        let images: Arc<dyn ImageSource> = Arc::new(HttpImageSource::new(
            settings.timeouts.image_fetch,
            settings.max_image_bytes,
        ));

        if vector_store.is_none() {
            tracing::warn!("Vector store not configured; similarity search disabled");
        }

        let analyzer = FraudAnalyzer::new(
            ImageAnalyzer::new(
                model.clone(),
                images.clone(),
                embeddings.clone(),
                settings.timeouts.model,
            ),
            SimilaritySearch::new(vector_store.clone(), settings.similarity, settings.timeouts.vector_query),
            MetadataAnalyzer::new(model.clone(), settings.timeouts.model),
            DecisionMaker::new(model.clone(), settings.timeouts.model, settings.fallback_fraud_threshold),
            settings.timeouts.persistence,
            settings.max_concurrent_analyses,
        );
        let descriptions = DescriptionEmbedder::new(
            model,
            images,
            embeddings,
            vector_store,
            settings.timeouts.model,
            settings.max_concurrent_analyses,
        );

        Components { analyzer, descriptions }
    }

    pub fn is_model_configured(&self) -> bool {
        self.image_analyzer.is_available()
    }

    pub fn similarity(&self) -> &SimilaritySearch {
        &self.similarity_search
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Runs the full pipeline. Always returns a complete envelope; stage
    /// failures degrade to their fallback results.
    ///
    /// Waits for a free slot when `max_concurrency` analyses are already running.
    pub async fn analyze_nft_for_fraud(
        &self,
        nft: &NftInput,
        persistence: Option<&PersistenceHandle>,
    ) -> ResultEnvelope {
        // never closed, so a permit is always granted eventually
        let _permit = self.permits.acquire().await.ok();
        let start = Instant::now();
        let exclude = persistence.map(|p| p.nft_id);

        tracing::info!("🔍 Analyzing NFT '{}' ({})", nft.title, nft.image_url);

        // metadata has no dependency on the image stage
        let metadata = nft.metadata();
        let (image_and_similarity, metadata_analysis) = tokio::join!(
            async {
                let image = self.image_analyzer.analyze(&nft.image_url, &metadata).await;
                let similarity = self.similarity_search.search(&image.embedding, exclude).await;
                (image, similarity)
            },
            self.metadata_analyzer.analyze(nft),
        );
        let (image_analysis, similarity_results) = image_and_similarity;

        tracing::info!(
            "📊 Stage scores - Image: {:.2}, Similarity: {:.2}, Metadata: {:.2}",
            image_analysis.overall_fraud_score,
            similarity_results.max_similarity,
            metadata_analysis.metadata_risk
        );

        let decision = self
            .decision_maker
            .decide(nft, &image_analysis, &similarity_results, &metadata_analysis)
            .await;

        let envelope = ResultEnvelope::assemble(
            image_analysis,
            similarity_results,
            metadata_analysis,
            decision,
            Utc::now(),
        );

        if let Some(handle) = persistence {
            match self.persist(handle, &envelope).await {
                Ok(()) => tracing::info!("Saved fraud analysis for NFT {}", handle.nft_id),
                Err(e) => tracing::error!("Failed to save fraud analysis for NFT {}: {}", handle.nft_id, e),
            }
        }

        tracing::info!(
            "✅ Analysis complete in {}ms - is_fraud: {} (confidence: {:.0}%)",
            start.elapsed().as_millis(),
            envelope.is_fraud,
            envelope.confidence_score * 100.0
        );
        if envelope.analysis_details.similarity_results.is_duplicate {
            tracing::warn!("⚠️ Potential duplicate of an existing NFT");
        }

        envelope
    }

    async fn persist(&self, handle: &PersistenceHandle, envelope: &ResultEnvelope) -> Result<(), StoreError> {
        let writeback = AnalysisWriteback::from_envelope(envelope, Utc::now())?;
        match tokio::time::timeout(
            self.persistence_timeout,
            handle.store.save_analysis(handle.nft_id, &writeback),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.persistence_timeout)),
        }
    }

    /// Analyzes independent NFTs with bounded concurrency. Output order
    /// matches input order.
    pub async fn analyze_many(&self, items: Vec<(NftInput, Option<PersistenceHandle>)>) -> Vec<ResultEnvelope> {
        tracing::info!(
            "Analyzing {} NFTs with concurrency {}",
            items.len(),
            self.max_concurrency
        );
        stream::iter(items)
            .map(|(nft, handle)| async move { self.analyze_nft_for_fraud(&nft, handle.as_ref()).await })
            .buffered(self.max_concurrency)
            .collect()
            .await
    }
}
