use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Failures talking to the vision/language model service.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("language model not configured")]
    NotConfigured,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("model returned no text candidates")]
    NoCandidates,
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("failed to download image: {0}")]
    Download(#[from] reqwest::Error),
    #[error("image host returned {0}")]
    Status(u16),
    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("unsupported or corrupt image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image processing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("image download timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding service unavailable: {0}")]
    Unavailable(String),
    #[error("language model error: {0}")]
    Llm(#[from] LlmError),
    #[error("image error: {0}")]
    Image(#[from] ImageError),
    #[error("expected {expected}-dimensional embedding, got {actual}")]
    Dimension { expected: usize, actual: usize },
    #[error("embedding model error: {0}")]
    Model(String),
    #[error("cannot embed empty text")]
    EmptyText,
    #[error("empty or too short description from model: '{0}'")]
    DescriptionTooShort(String),
    #[error("embedding timed out after {0:?}")]
    Timeout(Duration),
    #[error("vector store error: {0}")]
    Store(#[from] StoreError),
}

impl From<candle_core::Error> for EmbeddingError {
    fn from(e: candle_core::Error) -> Self {
        EmbeddingError::Model(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("nft {0} not found")]
    NotFound(Uuid),
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Caller misuse of a batch operation. Surfaced, never swallowed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PipelineError {
    #[error(
        "all input lists must have the same length (image_urls={image_urls}, nft_ids={nft_ids}, metadata={metadata})"
    )]
    LengthMismatch {
        image_urls: usize,
        nft_ids: usize,
        metadata: usize,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}
