//! REST client for the Gemini `generateContent` and embedding endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    config::GeminiSettings,
    embedding::TextEmbedder,
    error::{EmbeddingError, LlmError},
    image_fetch::EncodedImage,
    llm::LanguageModel,
};

#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    settings: GeminiSettings,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    content: serde_json::Value,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn url(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:{}", self.settings.base_url, model, method)
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, LlmError> {
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }

    fn embed_request<'a>(&'a self, text: &str) -> EmbedRequest<'a> {
        EmbedRequest {
            model: &self.settings.embedding_model,
            content: json!({ "parts": [{ "text": text }] }),
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str, image: Option<&EncodedImage>) -> Result<String, LlmError> {
        let mut parts = vec![json!({ "text": prompt })];
        if let Some(image) = image {
            parts.push(json!({
                "inline_data": {
                    "mime_type": image.mime_type,
                    "data": image.base64_data,
                }
            }));
        }
        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "temperature": self.settings.temperature,
                "maxOutputTokens": self.settings.max_output_tokens,
            }
        });

        let url = self.url(&self.settings.model, "generateContent");
        let response: GenerateResponse = self.post(&url, &body).await?;

        let text = response
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(LlmError::NoCandidates);
        }
        Ok(text)
    }
}

#[async_trait]
impl TextEmbedder for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyText);
        }
        let url = self.url(&self.settings.embedding_model, "embedContent");
        let body = serde_json::to_value(self.embed_request(text)).map_err(LlmError::from)?;
        let response: EmbedResponse = self.post(&url, &body).await?;
        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url(&self.settings.embedding_model, "batchEmbedContents");
        let requests = texts
            .iter()
            .map(|t| serde_json::to_value(self.embed_request(t)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(LlmError::from)?;
        let body = json!({ "requests": requests });
        let response: BatchEmbedResponse = self.post(&url, &body).await?;
        if response.embeddings.len() != texts.len() {
            return Err(EmbeddingError::Model(format!(
                "batch returned {} embeddings for {} texts",
                response.embeddings.len(),
                texts.len()
            )));
        }
        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GeminiClient {
        GeminiClient::new(GeminiSettings {
            api_key: "k".into(),
            model: "gemini-2.5-flash-lite".into(),
            embedding_model: "models/embedding-001".into(),
            temperature: 0.1,
            max_output_tokens: 2048,
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
        })
    }

    #[test]
    fn url_strips_models_prefix() {
        let c = client();
        assert_eq!(
            c.url("models/embedding-001", "embedContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/embedding-001:embedContent"
        );
        assert_eq!(
            c.url(c.model(), "generateContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-lite:generateContent"
        );
    }

    #[test]
    fn generate_response_joins_text_parts() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect();
        assert_eq!(text, "{\"a\":1}");
    }

    #[test]
    fn embed_request_shape() {
        let c = client();
        let value = serde_json::to_value(c.embed_request("hello")).unwrap();
        assert_eq!(value["model"], "models/embedding-001");
        assert_eq!(value["content"]["parts"][0]["text"], "hello");
    }
}
