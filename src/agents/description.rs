use std::{sync::Arc, time::Duration};

use futures::{StreamExt, stream};
use uuid::Uuid;

use crate::{
    db::vector_search::VectorStore,
    embedding::EmbeddingChain,
    error::{EmbeddingError, LlmError, PipelineError},
    image_fetch::ImageSource,
    llm::{LanguageModel, generate_with_timeout},
    models::StoredNftMetadata,
};

const MIN_DESCRIPTION_CHARS: usize = 10;

const DESCRIPTION_PROMPT: &str = "Please provide a detailed visual description of this image. Focus on:
- What you see in the image
- Colors and visual elements
- Style and composition
- Any text or symbols visible

Provide a clear, descriptive response in plain text (no JSON formatting).";

/// Image description and embedding primitives used outside the full
/// fraud pipeline.
pub struct DescriptionEmbedder {
    model: Option<Arc<dyn LanguageModel>>,
    images: Arc<dyn ImageSource>,
    embeddings: EmbeddingChain,
    store: Option<Arc<dyn VectorStore>>,
    model_timeout: Duration,
    concurrency: usize,
}

impl DescriptionEmbedder {
    pub fn new(
        model: Option<Arc<dyn LanguageModel>>,
        images: Arc<dyn ImageSource>,
        embeddings: EmbeddingChain,
        store: Option<Arc<dyn VectorStore>>,
        model_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            model,
            images,
            embeddings,
            store,
            model_timeout,
            concurrency: concurrency.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.embeddings.dimension()
    }

    /// Plain-text description of the image at `image_url`.
    pub async fn extract_image_description(&self, image_url: &str) -> Result<String, EmbeddingError> {
        let model = self.model.as_ref().ok_or(LlmError::NotConfigured)?;
        let image = self.images.fetch(image_url).await?;
        let description = generate_with_timeout(model, DESCRIPTION_PROMPT, Some(&image), self.model_timeout)
            .await?
            .trim()
            .to_string();
        tracing::debug!("Raw description response: {}", description);

        if description.chars().count() <= MIN_DESCRIPTION_CHARS {
            return Err(EmbeddingError::DescriptionTooShort(description));
        }
        let preview: String = description.chars().take(100).collect();
        tracing::info!("Successfully extracted description: {}...", preview);
        Ok(description)
    }

    /// Embeds with the configured embedding service; no fallback.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyText);
        }
        self.embeddings.embed_primary(text).await
    }

    pub async fn get_image_embedding(&self, image_url: &str) -> Result<Vec<f32>, EmbeddingError> {
        let description = self.extract_image_description(image_url).await?;
        self.embed(&description).await
    }

    /// Embeds the image's description and upserts it into the vector store.
    pub async fn embed_and_store(
        &self,
        image_url: &str,
        nft_id: Uuid,
        metadata: &StoredNftMetadata,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| EmbeddingError::Unavailable("vector store not configured".into()))?;
        let embedding = self.get_image_embedding(image_url).await?;

        let metadata = StoredNftMetadata {
            image_url: if metadata.image_url.is_empty() {
                image_url.to_string()
            } else {
                metadata.image_url.clone()
            },
            ..metadata.clone()
        };
        store.upsert(nft_id, &embedding, &metadata).await?;
        tracing::info!("Stored {}-dimensional embedding for NFT {}", embedding.len(), nft_id);
        Ok(embedding)
    }

    /// Embeds and stores every item, `true` per item that succeeded.
    ///
    /// All three inputs must have the same length.
    pub async fn batch_embed_and_store(
        &self,
        image_urls: &[String],
        nft_ids: &[Uuid],
        metadata: &[StoredNftMetadata],
    ) -> Result<Vec<bool>, PipelineError> {
        if image_urls.len() != nft_ids.len() || image_urls.len() != metadata.len() {
            return Err(PipelineError::LengthMismatch {
                image_urls: image_urls.len(),
                nft_ids: nft_ids.len(),
                metadata: metadata.len(),
            });
        }

        let items: Vec<(String, Uuid, StoredNftMetadata)> = image_urls
            .iter()
            .zip(nft_ids)
            .zip(metadata)
            .map(|((url, id), meta)| (url.clone(), *id, meta.clone()))
            .collect();

        let outcomes = stream::iter(items)
            .map(move |(url, id, meta)| async move {
                match self.embed_and_store(&url, id, &meta).await {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!("Failed to embed NFT {}: {}", id, e);
                        false
                    }
                }
            })
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        tracing::info!(
            "Batch embedding stored {}/{} NFTs",
            outcomes.iter().filter(|ok| **ok).count(),
            outcomes.len()
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{memory::InMemoryNftStore, nft_store::NftRecordStore},
        embedding::{HashingEmbedder, TextEmbedder},
        error::ImageError, image_fetch::EncodedImage,
    };
    use async_trait::async_trait;

    struct Images;

    #[async_trait]
    impl ImageSource for Images {
        async fn fetch(&self, url: &str) -> Result<EncodedImage, ImageError> {
            if url.contains("missing") {
                return Err(ImageError::Status(404));
            }
            Ok(EncodedImage {
                mime_type: "image/jpeg",
                base64_data: url.to_string(),
                width: 1,
                height: 1,
            })
        }
    }

    struct Describer;

    #[async_trait]
    impl LanguageModel for Describer {
        async fn generate(&self, _prompt: &str, image: Option<&EncodedImage>) -> Result<String, LlmError> {
            let url = image.map(|i| i.base64_data.as_str()).unwrap_or_default();
            if url.contains("terse") {
                Ok("a cat".to_string())
            } else {
                Ok(format!("A detailed painting of a lighthouse at dusk ({url})"))
            }
        }
    }

    fn embedder(store: Option<Arc<dyn VectorStore>>) -> DescriptionEmbedder {
        let primary: Arc<dyn TextEmbedder> = Arc::new(HashingEmbedder::new(16));
        let chain = EmbeddingChain::new(
            Some(primary),
            Arc::new(HashingEmbedder::new(16)),
            16,
            Duration::from_secs(1),
        );
        DescriptionEmbedder::new(
            Some(Arc::new(Describer)),
            Arc::new(Images),
            chain,
            store,
            Duration::from_secs(1),
            2,
        )
    }

    #[tokio::test]
    async fn short_descriptions_are_rejected() {
        let err = embedder(None)
            .extract_image_description("https://img.example/terse.png")
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::DescriptionTooShort(_)));
    }

    #[tokio::test]
    async fn image_embedding_has_configured_dimension() {
        let embedding = embedder(None)
            .get_image_embedding("https://img.example/lighthouse.png")
            .await
            .unwrap();
        assert_eq!(embedding.len(), 16);
    }

    #[tokio::test]
    async fn batch_rejects_mismatched_lengths() {
        let err = embedder(None)
            .batch_embed_and_store(&["a".into(), "b".into()], &[Uuid::new_v4()], &[StoredNftMetadata::default()])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::LengthMismatch {
                image_urls: 2,
                nft_ids: 1,
                metadata: 1
            }
        );
    }

    #[tokio::test]
    async fn batch_reports_per_item_outcome_in_order() {
        let store = Arc::new(InMemoryNftStore::new());
        let service = embedder(Some(store.clone()));
        let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let urls = [
            "https://img.example/one.png".to_string(),
            "https://img.example/missing.png".to_string(),
            "https://img.example/three.png".to_string(),
        ];
        let meta = vec![StoredNftMetadata::default(); 3];

        let outcomes = service.batch_embed_and_store(&urls, &ids, &meta).await.unwrap();
        assert_eq!(outcomes, vec![true, false, true]);
        assert!(store.embedding_of(ids[0]).await.is_some());
        assert!(store.embedding_of(ids[1]).await.is_none());
        assert_eq!(
            store.fetch_nft(ids[2]).await.unwrap().unwrap().image_url,
            "https://img.example/three.png"
        );
    }

    #[tokio::test]
    async fn embed_without_service_is_an_explicit_error() {
        let chain = EmbeddingChain::new(None, Arc::new(HashingEmbedder::new(16)), 16, Duration::from_secs(1));
        let service = DescriptionEmbedder::new(None, Arc::new(Images), chain, None, Duration::from_secs(1), 1);
        assert!(matches!(service.embed("hello world").await, Err(EmbeddingError::Unavailable(_))));
        assert!(matches!(
            service.extract_image_description("https://img.example/x.png").await,
            Err(EmbeddingError::Llm(LlmError::NotConfigured))
        ));
    }
}
