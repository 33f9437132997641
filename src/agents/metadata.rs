use std::{sync::Arc, time::Duration};

use crate::{
    json_extract,
    llm::{LanguageModel, generate_with_timeout},
    models::{MetadataAnalysisResult, NftInput, clamp_unit},
};

/// Language-model review of an NFT's textual metadata.
pub struct MetadataAnalyzer {
    model: Option<Arc<dyn LanguageModel>>,
    timeout: Duration,
}

impl MetadataAnalyzer {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub async fn analyze(&self, nft: &NftInput) -> MetadataAnalysisResult {
        let Some(model) = &self.model else {
            return MetadataAnalysisResult::unconfigured();
        };

        tracing::info!("📝 Metadata Analyzer analyzing '{}'", nft.title);

        let response = match generate_with_timeout(model, &metadata_prompt(nft), None, self.timeout).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Error in metadata analysis: {}", e);
                return MetadataAnalysisResult::errored(&e.to_string());
            }
        };

        let result = parse_response(&response);
        tracing::info!(
            "Metadata analysis: quality={:.2} risk={:.2} indicators={}",
            result.quality_score,
            result.metadata_risk,
            result.suspicious_indicators.len()
        );
        result
    }
}

fn metadata_prompt(nft: &NftInput) -> String {
    format!(
        r#"Analyze this NFT metadata for fraud indicators:

Name: {title}
Description: {description}
Category: {category}
Price: {price}

Look for:
1. Low-quality or generic descriptions
2. Suspicious keywords indicating fraud
3. Price anomalies
4. Inconsistencies in naming and description
5. Reduce strictness for new or unverified creators

Respond in JSON format:
{{
    "quality_score": 0.0-1.0,
    "suspicious_indicators": ["list of concerns"],
    "metadata_risk": 0.0-1.0,
    "analysis": "brief explanation"
}}"#,
        title = nft.title,
        description = nft.description,
        category = nft.category,
        price = nft.price,
    )
}

/// Type-guarded metadata result from raw model output.
pub fn parse_response(response: &str) -> MetadataAnalysisResult {
    if response.trim().is_empty() {
        tracing::warn!("LLM returned empty response for metadata analysis");
        return MetadataAnalysisResult::fallback(
            "Empty LLM response",
            "Fallback analysis used due to empty response",
        );
    }

    let Some((_, object)) = json_extract::extract_object(response) else {
        let preview: String = response.chars().take(200).collect();
        tracing::warn!("Failed to parse LLM metadata response: {}", preview);
        return MetadataAnalysisResult::fallback(
            "LLM response parsing failed",
            "Fallback analysis used due to parsing error",
        );
    };

    MetadataAnalysisResult {
        quality_score: clamp_unit(json_extract::number(&object, "quality_score").unwrap_or(0.5)),
        suspicious_indicators: json_extract::string_list(&object, "suspicious_indicators").unwrap_or_default(),
        metadata_risk: clamp_unit(json_extract::number(&object, "metadata_risk").unwrap_or(0.1)),
        analysis: json_extract::text(&object, "analysis").unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::LlmError, image_fetch::EncodedImage};
    use async_trait::async_trait;

    struct Canned(Result<&'static str, ()>);

    #[async_trait]
    impl LanguageModel for Canned {
        async fn generate(&self, prompt: &str, image: Option<&EncodedImage>) -> Result<String, LlmError> {
            assert!(image.is_none());
            assert!(prompt.contains("Reduce strictness for new or unverified creators"));
            self.0.map(str::to_string).map_err(|_| LlmError::NoCandidates)
        }
    }

    fn nft() -> NftInput {
        NftInput {
            title: "Cosmic Cat #12".into(),
            description: "A cat in space".into(),
            image_url: "https://img.example/cat.png".into(),
            category: "Art".into(),
            price: 0.5,
            creator: None,
        }
    }

    async fn run(reply: Result<&'static str, ()>) -> MetadataAnalysisResult {
        MetadataAnalyzer::new(Some(Arc::new(Canned(reply))), Duration::from_secs(1))
            .analyze(&nft())
            .await
    }

    #[tokio::test]
    async fn unconfigured_returns_static_default() {
        let result = MetadataAnalyzer::new(None, Duration::from_secs(1)).analyze(&nft()).await;
        assert_eq!(result.quality_score, 0.7);
        assert_eq!(result.metadata_risk, 0.1);
        assert!(result.suspicious_indicators.is_empty());
    }

    #[tokio::test]
    async fn fenced_json_is_parsed() {
        let result = run(Ok(
            "```json\n{\"quality_score\": 0.9, \"suspicious_indicators\": [\"generic title\"], \"metadata_risk\": 0.15, \"analysis\": \"fine\"}\n```",
        ))
        .await;
        assert_eq!(result.quality_score, 0.9);
        assert_eq!(result.metadata_risk, 0.15);
        assert_eq!(result.suspicious_indicators, vec!["generic title".to_string()]);
    }

    #[tokio::test]
    async fn wrong_types_get_defaults() {
        let result = run(Ok(r#"{"quality_score": "good", "metadata_risk": null, "suspicious_indicators": "none"}"#)).await;
        assert_eq!(result.quality_score, 0.5);
        assert_eq!(result.metadata_risk, 0.1);
        assert!(result.suspicious_indicators.is_empty());
    }

    #[tokio::test]
    async fn empty_and_garbage_responses_fall_back() {
        let empty = run(Ok("   ")).await;
        assert_eq!(empty.suspicious_indicators, vec!["Empty LLM response".to_string()]);
        assert_eq!(empty.metadata_risk, 0.2);

        let garbage = run(Ok("looks fine to me")).await;
        assert_eq!(garbage.suspicious_indicators, vec!["LLM response parsing failed".to_string()]);
        assert_eq!(garbage.quality_score, 0.5);
    }

    #[tokio::test]
    async fn call_failure_is_neutral() {
        let result = run(Err(())).await;
        assert_eq!(result.metadata_risk, 0.1);
        assert!(result.suspicious_indicators[0].starts_with("Analysis error:"));
    }
}
