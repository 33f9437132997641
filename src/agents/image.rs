use std::{sync::Arc, time::Duration};

use serde_json::Value;

use crate::{
    agents::heuristic::{self, recommendation_for},
    embedding::EmbeddingChain,
    image_fetch::ImageSource,
    json_extract::{self, JsonObject},
    llm::{LanguageModel, generate_with_timeout},
    models::{
        AnalysisSource, FraudIndicator, FraudIndicators, ImageAnalysisResult, IndicatorKind,
        NftMetadata, RiskLevel, clamp_unit,
    },
};

const ANALYSIS_COMPLETED: &str = "Analysis completed";

/// Vision-model fraud analysis of an NFT image.
pub struct ImageAnalyzer {
    model: Option<Arc<dyn LanguageModel>>,
    images: Arc<dyn ImageSource>,
    embeddings: EmbeddingChain,
    model_timeout: Duration,
}

impl ImageAnalyzer {
    pub fn new(
        model: Option<Arc<dyn LanguageModel>>,
        images: Arc<dyn ImageSource>,
        embeddings: EmbeddingChain,
        model_timeout: Duration,
    ) -> Self {
        Self {
            model,
            images,
            embeddings,
            model_timeout,
        }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    /// Analyze an NFT image. Never fails: errors become a schema-complete
    /// result with `analysis_source = Failed`.
    pub async fn analyze(&self, image_url: &str, metadata: &NftMetadata<'_>) -> ImageAnalysisResult {
        let Some(model) = &self.model else {
            tracing::warn!("Gemini chat model not available, returning placeholder analysis");
            return ImageAnalysisResult::unavailable(metadata.title);
        };

        tracing::info!("🖼️ Image Analyzer analyzing {}", image_url);

        let image = match self.images.fetch(image_url).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!("Failed to download or process image {}: {}", image_url, e);
                return ImageAnalysisResult::failed(format!(
                    "Failed to download or process image: {e}"
                ));
            }
        };

        let prompt = analysis_prompt(metadata);
        let response = match generate_with_timeout(model, &prompt, Some(&image), self.model_timeout).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Error in Gemini image analysis: {}", e);
                return ImageAnalysisResult::failed(e.to_string());
            }
        };

        let mut result = parse_response(&response);
        self.attach_embedding(&mut result).await;

        tracing::info!(
            "✅ Image analysis complete: score={:.2} risk={} source={:?} embedding_dim={}",
            result.overall_fraud_score,
            result.risk_level.as_str(),
            result.analysis_source,
            result.embedding_dimension
        );
        result
    }

    /// Embeds the description when one was genuinely extracted.
    async fn attach_embedding(&self, result: &mut ImageAnalysisResult) {
        if !has_real_description(result) {
            tracing::warn!("No usable description to embed; leaving embedding empty");
            return;
        }
        let preview: String = result.description.chars().take(100).collect();
        tracing::info!("Generating embedding for description: {}...", preview);
        let embedding = self.embeddings.embed_or_empty(&result.description).await;
        result.set_embedding(embedding);
    }
}

fn has_real_description(result: &ImageAnalysisResult) -> bool {
    !result.description.trim().is_empty() && result.description != heuristic::NO_DESCRIPTION
}

fn analysis_prompt(metadata: &NftMetadata<'_>) -> String {
    let indicators = IndicatorKind::ALL
        .iter()
        .map(|kind| {
            format!(
                "    \"{}\": {{\"detected\": false, \"confidence\": 0.0, \"evidence\": \"{}\"}}",
                kind.as_str(),
                indicator_hint(*kind)
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");

    let description = if metadata.description.trim().is_empty() {
        "No description provided"
    } else {
        metadata.description
    };
    let category = if metadata.category.trim().is_empty() {
        "Unknown"
    } else {
        metadata.category
    };

    format!(
        r#"You are an expert NFT fraud detection analyst. Analyze this NFT image and respond with ONLY a valid JSON object.

NFT Metadata:
- Title: {title}
- Creator: {creator}
- Description: {description}
- Category: {category}

CRITICAL: Respond with ONLY valid JSON. No text before or after. No markdown formatting.

Required JSON structure:
{{
  "description": "Detailed visual description of the image (200+ words): visual elements, colors, composition, style, textures, lighting, text, symbols",
  "artistic_style": "Art style classification (e.g. pixel art, 3D render, photography, digital art, oil painting)",
  "quality_assessment": "Image quality rating (1-10) with technical analysis",
  "fraud_indicators": {{
{indicators}
  }},
  "overall_fraud_score": 0.0,
  "risk_level": "low",
  "key_visual_elements": ["important", "visual", "elements"],
  "color_palette": ["dominant", "colors"],
  "composition_analysis": "Layout, focal points, balance",
  "uniqueness_score": 0.0,
  "artistic_merit": "Artistic value, creativity, skill level",
  "technical_quality": "Resolution, compression, production standards",
  "market_value_assessment": "Fair market value estimate",
  "recommendation": "ALLOW, FLAG, or BLOCK",
  "confidence_in_analysis": 0.0,
  "additional_notes": "Additional observations"
}}

ANALYSIS REQUIREMENTS:
1. Examine the image for plagiarism, AI generation, low effort and stolen content
2. Check whether the image matches the claimed title, description and category
3. Provide specific evidence for each fraud indicator
4. Risk level: low (0.0-0.3), medium (0.3-0.7), high (0.7-1.0)
5. Use numbers for scores and true/false for booleans"#,
        title = metadata.title,
        creator = metadata.creator,
    )
}

fn indicator_hint(kind: IndicatorKind) -> &'static str {
    match kind {
        IndicatorKind::LowEffortGeneration => "Effort level, complexity, originality",
        IndicatorKind::StolenArtwork => "Watermarks, signatures, style inconsistencies, plagiarism signs",
        IndicatorKind::AiGenerated => "AI generation artifacts, unnatural patterns",
        IndicatorKind::TemplateUsage => "Generic templates, mass-produced elements",
        IndicatorKind::MetadataMismatch => "Whether content matches title, description, category",
        IndicatorKind::CopyrightViolation => "Copyrighted characters, logos, brands, protected IP",
        IndicatorKind::InappropriateContent => "NSFW content, violence, hate speech",
    }
}

/// Turns raw model output into a complete analysis, falling back to keyword
/// heuristics when no JSON object can be recovered.
pub fn parse_response(response: &str) -> ImageAnalysisResult {
    match json_extract::extract_object(response) {
        Some((strategy, object)) => {
            tracing::info!("Parsed image analysis using {} extraction", strategy.name());
            from_object(&object, response)
        }
        None => {
            tracing::warn!("Could not parse JSON from Gemini response, attempting text extraction");
            heuristic::analyze_text(response)
        }
    }
}

fn indicator_from(value: Option<&Value>) -> FraudIndicator {
    let Some(value) = value else {
        return FraudIndicator::not_detected("Not analyzed");
    };
    let Some(fields) = value.as_object() else {
        return FraudIndicator::not_detected("Malformed data");
    };
    FraudIndicator::new(
        fields.get("detected").and_then(Value::as_bool).unwrap_or(false),
        json_extract::number(fields, "confidence").unwrap_or(0.0),
        json_extract::text(fields, "evidence").unwrap_or_default(),
    )
}

fn from_object(object: &JsonObject, raw: &str) -> ImageAnalysisResult {
    let indicators = object.get("fraud_indicators").and_then(Value::as_object);
    let fraud_indicators =
        FraudIndicators::from_fn(|kind| indicator_from(indicators.and_then(|map| map.get(kind.as_str()))));

    let description = json_extract::text(object, "description")
        .or_else(|| heuristic::extract_description(raw))
        .unwrap_or_else(|| heuristic::NO_DESCRIPTION.to_string());
    let field = |key: &str| json_extract::text(object, key).unwrap_or_else(|| ANALYSIS_COMPLETED.to_string());

    let mut result = ImageAnalysisResult {
        description,
        artistic_style: json_extract::text(object, "artistic_style").unwrap_or_else(|| "unknown".to_string()),
        quality_assessment: field("quality_assessment"),
        fraud_indicators,
        overall_fraud_score: 0.0,
        risk_level: RiskLevel::Low,
        key_visual_elements: json_extract::string_list(object, "key_visual_elements").unwrap_or_default(),
        color_palette: json_extract::string_list(object, "color_palette").unwrap_or_default(),
        composition_analysis: field("composition_analysis"),
        uniqueness_score: clamp_unit(json_extract::number(object, "uniqueness_score").unwrap_or(0.0)),
        artistic_merit: field("artistic_merit"),
        technical_quality: field("technical_quality"),
        market_value_assessment: field("market_value_assessment"),
        recommendation: String::new(),
        confidence_in_analysis: clamp_unit(
            json_extract::number(object, "confidence_in_analysis").unwrap_or(0.8),
        ),
        additional_notes: json_extract::text(object, "additional_notes")
            .unwrap_or_else(|| "Analysis completed successfully".to_string()),
        embedding: Vec::new(),
        embedding_dimension: 0,
        analysis_source: AnalysisSource::Model,
        error: None,
    };

    // model-supplied score and risk level are ignored
    result.recompute_scores();
    result.recommendation = json_extract::text(object, "recommendation")
        .unwrap_or_else(|| recommendation_for(result.overall_fraud_score).to_string());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        embedding::HashingEmbedder,
        error::{ImageError, LlmError},
        image_fetch::EncodedImage,
    };
    use async_trait::async_trait;

    struct StaticImage;

    #[async_trait]
    impl ImageSource for StaticImage {
        async fn fetch(&self, _url: &str) -> Result<EncodedImage, ImageError> {
            Ok(EncodedImage {
                mime_type: "image/jpeg",
                base64_data: "AAAA".into(),
                width: 1,
                height: 1,
            })
        }
    }

    struct MissingImage;

    #[async_trait]
    impl ImageSource for MissingImage {
        async fn fetch(&self, _url: &str) -> Result<EncodedImage, ImageError> {
            Err(ImageError::Status(404))
        }
    }

    struct Canned(&'static str);

    #[async_trait]
    impl LanguageModel for Canned {
        async fn generate(&self, _prompt: &str, image: Option<&EncodedImage>) -> Result<String, LlmError> {
            assert!(image.is_some());
            Ok(self.0.to_string())
        }
    }

    struct Hangs;

    #[async_trait]
    impl LanguageModel for Hangs {
        async fn generate(&self, _prompt: &str, _image: Option<&EncodedImage>) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }
    }

    fn analyzer(model: Option<Arc<dyn LanguageModel>>, images: Arc<dyn ImageSource>) -> ImageAnalyzer {
        let embeddings = EmbeddingChain::new(
            None,
            Arc::new(HashingEmbedder::new(32)),
            32,
            Duration::from_secs(5),
        );
        ImageAnalyzer::new(model, images, embeddings, Duration::from_millis(200))
    }

    fn metadata() -> NftMetadata<'static> {
        NftMetadata {
            title: "Sunset",
            description: "Oil painting of a sunset",
            category: "Art",
            creator: "0xabc",
        }
    }

    #[test]
    fn missing_and_malformed_indicators_are_backfilled() {
        let result = parse_response(
            r#"{"description": "A bright orange sunset over a calm sea with a lone sailboat",
                "fraud_indicators": {
                    "ai_generated": {"detected": true, "confidence": 0.45, "evidence": "smooth gradients"},
                    "stolen_artwork": "no",
                    "template_usage": {"detected": true, "confidence": "high"}
                },
                "uniqueness_score": "very",
                "key_visual_elements": "sun",
                "overall_fraud_score": 0.99,
                "risk_level": "high"}"#,
        );
        assert_eq!(result.analysis_source, AnalysisSource::Model);
        assert_eq!(result.fraud_indicators.low_effort_generation.evidence, "Not analyzed");
        assert_eq!(result.fraud_indicators.stolen_artwork.evidence, "Malformed data");
        assert_eq!(result.fraud_indicators.template_usage.confidence, 0.0);
        assert_eq!(result.overall_fraud_score, 0.45);
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert_eq!(result.uniqueness_score, 0.0);
        assert!(result.key_visual_elements.is_empty());
        assert_eq!(result.confidence_in_analysis, 0.8);
        assert_eq!(result.recommendation, "FLAG");
    }

    #[test]
    fn unparseable_response_uses_keyword_heuristics() {
        let result = parse_response("This artwork appears to be plagiarized from a known artist's portfolio.");
        assert_eq!(result.analysis_source, AnalysisSource::TextHeuristic);
        assert!(result.fraud_indicators.stolen_artwork.detected);
    }

    #[tokio::test]
    async fn unconfigured_model_skips_download() {
        let result = analyzer(None, Arc::new(MissingImage)).analyze("https://x/y.png", &metadata()).await;
        assert_eq!(result.analysis_source, AnalysisSource::Unavailable);
        assert!(result.description.contains("Gemini analyzer not available"));
        assert!(result.embedding.is_empty());
    }

    #[tokio::test]
    async fn download_failure_is_a_failed_result() {
        let model: Arc<dyn LanguageModel> = Arc::new(Canned("{}"));
        let result = analyzer(Some(model), Arc::new(MissingImage)).analyze("https://x/y.png", &metadata()).await;
        assert_eq!(result.analysis_source, AnalysisSource::Failed);
        assert!(result.recommendation.starts_with("Manual review required"));
        assert_eq!(result.fraud_indicators.iter().count(), 7);
    }

    #[tokio::test]
    async fn model_timeout_is_a_failed_result() {
        let model: Arc<dyn LanguageModel> = Arc::new(Hangs);
        let result = analyzer(Some(model), Arc::new(StaticImage)).analyze("https://x/y.png", &metadata()).await;
        assert_eq!(result.analysis_source, AnalysisSource::Failed);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn parsed_description_is_embedded() {
        let model: Arc<dyn LanguageModel> = Arc::new(Canned(
            r#"{"description": "A bright orange sunset over a calm sea with a lone sailboat", "fraud_indicators": {}}"#,
        ));
        let result = analyzer(Some(model), Arc::new(StaticImage)).analyze("https://x/y.png", &metadata()).await;
        assert_eq!(result.embedding_dimension, 32);
        assert_eq!(result.embedding.len(), 32);
        assert_eq!(result.overall_fraud_score, 0.0);
        assert_eq!(result.recommendation, "ALLOW");
    }

    #[tokio::test]
    async fn placeholder_description_is_not_embedded() {
        let model: Arc<dyn LanguageModel> = Arc::new(Canned("{ not json"));
        let result = analyzer(Some(model), Arc::new(StaticImage)).analyze("https://x/y.png", &metadata()).await;
        assert_eq!(result.analysis_source, AnalysisSource::TextHeuristic);
        assert_eq!(result.description, heuristic::NO_DESCRIPTION);
        assert!(result.embedding.is_empty());
    }
}
