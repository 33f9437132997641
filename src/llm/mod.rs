pub mod gemini;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{error::LlmError, image_fetch::EncodedImage};

pub use gemini::GeminiClient;

/// A vision-capable language model: prompt text plus optional image in, free text out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str, image: Option<&EncodedImage>) -> Result<String, LlmError>;
}

/// Calls `model` with a hard deadline.
pub async fn generate_with_timeout(
    model: &Arc<dyn LanguageModel>,
    prompt: &str,
    image: Option<&EncodedImage>,
    timeout: Duration,
) -> Result<String, LlmError> {
    match tokio::time::timeout(timeout, model.generate(prompt, image)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(timeout)),
    }
}
