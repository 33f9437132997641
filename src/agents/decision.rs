use std::{sync::Arc, time::Duration};

use serde_json::Value;

use crate::{
    json_extract::{self, JsonObject},
    llm::{LanguageModel, generate_with_timeout},
    models::{
        FlagType, FraudDecision, ImageAnalysisResult, MetadataAnalysisResult, NftInput, Recommendation,
        RiskBreakdown, SimilarityResult, clamp_unit,
    },
};

const IMAGE_WEIGHT: f64 = 0.5;
const SIMILARITY_WEIGHT: f64 = 0.3;
const METADATA_WEIGHT: f64 = 0.2;
const FALLBACK_CONFIDENCE_CAP: f64 = 0.8;

/// Final fraud verdict from the three upstream analyses.
pub struct DecisionMaker {
    model: Option<Arc<dyn LanguageModel>>,
    timeout: Duration,
    fraud_threshold: f64,
}

impl DecisionMaker {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, timeout: Duration, fraud_threshold: f64) -> Self {
        Self {
            model,
            timeout,
            fraud_threshold,
        }
    }

    pub async fn decide(
        &self,
        nft: &NftInput,
        image: &ImageAnalysisResult,
        similarity: &SimilarityResult,
        metadata: &MetadataAnalysisResult,
    ) -> FraudDecision {
        let Some(model) = &self.model else {
            tracing::info!("Language model not configured, using fallback decision");
            return fallback_decision(
                image,
                similarity,
                metadata,
                self.fraud_threshold,
                "language model not configured",
            );
        };

        tracing::info!("⚖️ Decision Maker evaluating '{}'", nft.title);

        let prompt = decision_prompt(nft, image, similarity, metadata);
        let response = match generate_with_timeout(model, &prompt, None, self.timeout).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Error in LLM fraud decision: {}", e);
                return FraudDecision::safe_default(&e.to_string());
            }
        };

        if response.trim().is_empty() {
            tracing::warn!("LLM returned empty response");
            return fallback_decision(image, similarity, metadata, self.fraud_threshold, "empty response");
        }

        let Some((_, object)) = json_extract::extract_object(&response) else {
            let preview: String = response.chars().take(200).collect();
            tracing::warn!("Failed to parse LLM decision: {}", preview);
            return fallback_decision(image, similarity, metadata, self.fraud_threshold, "unparsable response");
        };

        let mut decision = from_object(&object);
        if decision.enforce_consistency() {
            tracing::info!(
                "Fixed logical inconsistency: confidence={:.2}, recommendation={:?} -> is_fraud={}",
                decision.confidence_score,
                decision.recommendation,
                decision.is_fraud
            );
        }
        tracing::info!(
            "Decision: is_fraud={} confidence={:.2} flag={:?}",
            decision.is_fraud,
            decision.confidence_score,
            decision.flag_type
        );
        decision
    }
}

fn decision_prompt(
    nft: &NftInput,
    image: &ImageAnalysisResult,
    similarity: &SimilarityResult,
    metadata: &MetadataAnalysisResult,
) -> String {
    let detected = image
        .fraud_indicators
        .iter()
        .map(|(kind, i)| format!("{kind}: detected={} confidence={:.2} ({})", i.detected, i.confidence, i.evidence))
        .collect::<Vec<_>>()
        .join("; ");

    format!(
        r#"You are an expert NFT fraud detection AI. Based on comprehensive analysis, determine if this NFT is fraudulent.
Consider the following guidelines:
1. Be lenient with image-based fraud indicators unless there's strong evidence
2. AI-generated art should not automatically be considered fraudulent
3. Consider artistic interpretation and stylistic choices
4. Focus more on exact duplicates rather than similar styles
5. Give benefit of doubt to new creators

NFT Information:
Name: {title}
Description: {description}
Category: {category}
Price: {price}

Image Analysis:
- Fraud Score: {fraud_score:.2}
- Risk Level: {risk_level}
- Fraud Indicators: {detected}

Similarity Analysis:
- Max Similarity: {max_similarity:.3}
- Similar NFTs Found: {similar_count}
- Is Duplicate: {is_duplicate}

Metadata Analysis:
- Quality Score: {quality:.2}
- Suspicious Indicators: {suspicious:?}
- Metadata Risk: {metadata_risk:.2}

Make a balanced fraud determination, being especially careful not to over-flag based on image analysis alone.

Respond in JSON format:
{{
    "is_fraud": true/false,
    "confidence_score": 0.0-1.0,
    "flag_type": 1-4 (1=plagiarism, 2=suspicious_activity, 3=fake_metadata, 4=ai_generated) or null,
    "reason": "clear explanation of decision",
    "primary_concerns": ["list of main issues"],
    "recommendation": "ALLOW/FLAG/BLOCK"
}}"#,
        title = nft.title,
        description = nft.description,
        category = nft.category,
        price = nft.price,
        fraud_score = image.overall_fraud_score,
        risk_level = image.risk_level.as_str(),
        max_similarity = similarity.max_similarity,
        similar_count = similarity.similar_nfts.len(),
        is_duplicate = similarity.is_duplicate,
        quality = metadata.quality_score,
        suspicious = metadata.suspicious_indicators,
        metadata_risk = metadata.metadata_risk,
    )
}

fn from_object(object: &JsonObject) -> FraudDecision {
    let flag_type = object
        .get("flag_type")
        .and_then(Value::as_u64)
        .and_then(|code| u8::try_from(code).ok())
        .and_then(|code| FlagType::try_from(code).ok());

    FraudDecision {
        is_fraud: object.get("is_fraud").and_then(Value::as_bool).unwrap_or(false),
        confidence_score: clamp_unit(json_extract::number(object, "confidence_score").unwrap_or(0.0)),
        flag_type,
        reason: json_extract::text(object, "reason").unwrap_or_else(|| "No reason provided".to_string()),
        primary_concerns: json_extract::string_list(object, "primary_concerns").unwrap_or_default(),
        recommendation: json_extract::text(object, "recommendation")
            .as_deref()
            .and_then(Recommendation::parse),
        risk_breakdown: None,
        fallback_used: false,
        error: None,
    }
}

/// Weighted blend of the three upstream risk signals.
pub fn combined_risk(
    image: &ImageAnalysisResult,
    similarity: &SimilarityResult,
    metadata: &MetadataAnalysisResult,
) -> RiskBreakdown {
    let image_risk = clamp_unit(image.overall_fraud_score);
    let similarity_risk = clamp_unit(similarity.max_similarity);
    let metadata_risk = clamp_unit(metadata.metadata_risk);
    RiskBreakdown {
        image: image_risk,
        similarity: similarity_risk,
        metadata: metadata_risk,
        combined: IMAGE_WEIGHT * image_risk + SIMILARITY_WEIGHT * similarity_risk + METADATA_WEIGHT * metadata_risk,
    }
}

/// Heuristic verdict used when the model is unavailable or its answer unusable.
pub fn fallback_decision(
    image: &ImageAnalysisResult,
    similarity: &SimilarityResult,
    metadata: &MetadataAnalysisResult,
    fraud_threshold: f64,
    cause: &str,
) -> FraudDecision {
    let breakdown = combined_risk(image, similarity, metadata);
    let combined = breakdown.combined;

    let flag_type = if combined > 0.8 {
        Some(FlagType::Plagiarism)
    } else if combined > 0.6 {
        Some(FlagType::SuspiciousActivity)
    } else {
        None
    };

    let mut reason = format!("Fallback analysis ({cause}) - Combined risk: {combined:.2}");
    if similarity.is_duplicate {
        reason.push_str(" - Potential duplicate detected");
    }

    let mut decision = FraudDecision {
        is_fraud: combined > fraud_threshold,
        confidence_score: combined.min(FALLBACK_CONFIDENCE_CAP),
        flag_type,
        reason,
        primary_concerns: Vec::new(),
        recommendation: Some(if combined > 0.5 {
            Recommendation::ManualReview
        } else {
            Recommendation::Allow
        }),
        risk_breakdown: Some(breakdown),
        fallback_used: true,
        error: None,
    };
    // a low configured threshold must not yield a fraud verdict on a confident ALLOW
    if decision.enforce_consistency() {
        tracing::info!(
            "Fallback verdict repaired to is_fraud={} (threshold {:.2}, combined {:.2})",
            decision.is_fraud,
            fraud_threshold,
            combined
        );
    }
    decision
}
