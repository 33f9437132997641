use std::{collections::HashMap, path::Path, sync::Arc};

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor, safetensors};
use tokenizers::Tokenizer;

use crate::error::EmbeddingError;

/// Turns text into a fixed-dimension vector for similarity search.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    fn name(&self) -> &'static str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

struct LocalModel {
    tensors: HashMap<String, Tensor>,
    tokenizer: Tokenizer,
    device: Device,
}

/// EmbeddingGemma token-table embeddings computed on CPU with candle.
///
/// Mean-pools the input-embedding rows of the tokens; no transformer layers
/// are run, so this is a cheap stand-in for the remote embedding service.
#[derive(Clone)]
pub struct LocalEmbedder {
    model: Arc<LocalModel>,
}

impl LocalEmbedder {
    /// Load `model.safetensors` and a tokenizer from `model_dir`.
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        //declare device to use cpu
        let device = Device::Cpu;

        let tokenizer_file = model_dir.join("tokenizer.json");
        let tokenizer = match Tokenizer::from_file(&tokenizer_file) {
            Ok(tok) => tok,
            Err(e) => {
                tracing::warn!("Failed to load tokenizer.json: {}, trying tokenizer.model", e);
                let model_tokenizer_file = model_dir.join("tokenizer.model");
                if !model_tokenizer_file.exists() {
                    anyhow::bail!("Could not load any tokenizer file: {}", e);
                }
                Tokenizer::from_file(&model_tokenizer_file)
                    .map_err(|e| anyhow::anyhow!("Failed to load tokenizer.model: {}", e))?
            }
        };

        let model_file = model_dir.join("model.safetensors");
        if !model_file.exists() {
            anyhow::bail!("Model file not found: {:?}", model_file);
        }
        let tensors = safetensors::load(model_file, &device)?;
        if embed_weights(&tensors).is_none() {
            anyhow::bail!("embed_tokens.weight not found in model");
        }

        tracing::info!("Loaded {:?} tensors for local embedding", tensors.len());

        Ok(Self {
            model: Arc::new(LocalModel {
                tensors,
                tokenizer,
                device,
            }),
        })
    }
}

fn embed_weights(tensors: &HashMap<String, Tensor>) -> Option<&Tensor> {
    tensors
        .get("embed_tokens.weight")
        .or_else(|| tensors.get("model.embed_tokens.weight"))
}

impl LocalModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Model(format!("Tokenization error: {}", e)))?
            .get_ids()
            .to_vec();
        if tokens.is_empty() {
            return Err(EmbeddingError::EmptyText);
        }

        let weights = embed_weights(&self.tensors)
            .ok_or_else(|| EmbeddingError::Model("embed_tokens.weight not found in model".into()))?;

        // one row per token, then mean pooling across tokens
        let ids = Tensor::new(tokens.as_slice(), &self.device)?;
        let pooled = weights
            .index_select(&ids, 0)?
            .to_dtype(DType::F32)?
            .mean(0)?;
        let embedding: Vec<f32> = pooled.to_vec1::<f32>()?;

        l2_normalize(embedding)
    }
}

#[async_trait]
impl TextEmbedder for LocalEmbedder {
    fn name(&self) -> &'static str {
        "local-embeddinggemma"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || model.embed(&text))
            .await
            .map_err(|e| EmbeddingError::Model(format!("embedding task failed: {}", e)))?
    }
}

/// Deterministic hashed bag-of-words vectorizer.
///
/// Unigrams and bigrams are hashed into `dimension` signed buckets. Needs no
/// model or network, so it is the last-resort embedding strategy.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn vectorize(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 2)
            .collect();
        if tokens.is_empty() {
            return Err(EmbeddingError::EmptyText);
        }

        let mut vector = vec![0.0f32; self.dimension];
        let bigrams = tokens.windows(2).map(|w| format!("{} {}", w[0], w[1]));
        for feature in tokens.iter().map(|t| t.to_string()).chain(bigrams) {
            let hash = blake3::hash(feature.as_bytes());
            let bytes = hash.as_bytes();
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        l2_normalize(vector)
    }
}

#[async_trait]
impl TextEmbedder for HashingEmbedder {
    fn name(&self) -> &'static str {
        "hashing"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.vectorize(text)
    }
}

/// Primary embedding service with a deterministic local fallback.
#[derive(Clone)]
pub struct EmbeddingChain {
    primary: Option<Arc<dyn TextEmbedder>>,
    fallback: Arc<dyn TextEmbedder>,
    dimension: usize,
    timeout: std::time::Duration,
}

impl EmbeddingChain {
    pub fn new(
        primary: Option<Arc<dyn TextEmbedder>>,
        fallback: Arc<dyn TextEmbedder>,
        dimension: usize,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            dimension,
            timeout,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    async fn run(
        &self,
        embedder: &Arc<dyn TextEmbedder>,
        text: &str,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let embedding = match tokio::time::timeout(self.timeout, embedder.embed(text)).await {
            Ok(result) => result?,
            Err(_) => return Err(EmbeddingError::Timeout(self.timeout)),
        };
        ensure_dimension(embedding, self.dimension)
    }

    /// Embeds with the primary service only; errors when it is absent.
    pub async fn embed_primary(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let primary = self
            .primary
            .as_ref()
            .ok_or_else(|| EmbeddingError::Unavailable("no embedding service configured".into()))?;
        self.run(primary, text).await
    }

    /// Primary first, then the fallback. Never fails: an empty vector means
    /// no strategy produced an embedding.
    pub async fn embed_or_empty(&self, text: &str) -> Vec<f32> {
        if let Some(primary) = &self.primary {
            match self.run(primary, text).await {
                Ok(embedding) => return embedding,
                Err(e) => tracing::warn!("{} embedding failed, using fallback: {}", primary.name(), e),
            }
        }
        match self.run(&self.fallback, text).await {
            Ok(embedding) => {
                tracing::info!(
                    "Generated {} embedding with dimension: {}",
                    self.fallback.name(),
                    embedding.len()
                );
                embedding
            }
            Err(e) => {
                tracing::error!("Fallback embedding generation failed: {}", e);
                Vec::new()
            }
        }
    }
}

// Normalize to unit vector (important for cosine similarity!)
pub fn l2_normalize(mut vector: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
    let length: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if length == 0.0 || !length.is_finite() {
        return Err(EmbeddingError::Model("embedding has zero or non-finite norm".into()));
    }
    vector.iter_mut().for_each(|x| *x /= length);
    Ok(vector)
}

pub fn ensure_dimension(embedding: Vec<f32>, expected: usize) -> Result<Vec<f32>, EmbeddingError> {
    if embedding.len() != expected {
        return Err(EmbeddingError::Dimension {
            expected,
            actual: embedding.len(),
        });
    }
    Ok(embedding)
}

pub fn embedding_to_pgvector(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Cosine distance in [0, 2]; 2.0 when either vector has no magnitude.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 2.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 2.0;
    }
    1.0 - dot / (na.sqrt() * nb.sqrt())
}
