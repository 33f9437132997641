use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The seven named suspicion categories scored by the image analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    LowEffortGeneration,
    StolenArtwork,
    AiGenerated,
    TemplateUsage,
    MetadataMismatch,
    CopyrightViolation,
    InappropriateContent,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 7] = [
        IndicatorKind::LowEffortGeneration,
        IndicatorKind::StolenArtwork,
        IndicatorKind::AiGenerated,
        IndicatorKind::TemplateUsage,
        IndicatorKind::MetadataMismatch,
        IndicatorKind::CopyrightViolation,
        IndicatorKind::InappropriateContent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IndicatorKind::LowEffortGeneration => "low_effort_generation",
            IndicatorKind::StolenArtwork => "stolen_artwork",
            IndicatorKind::AiGenerated => "ai_generated",
            IndicatorKind::TemplateUsage => "template_usage",
            IndicatorKind::MetadataMismatch => "metadata_mismatch",
            IndicatorKind::CopyrightViolation => "copyright_violation",
            IndicatorKind::InappropriateContent => "inappropriate_content",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudIndicator {
    pub detected: bool,
    pub confidence: f64,
    pub evidence: String,
}

impl FraudIndicator {
    /// Builds an indicator with confidence clamped to [0, 1] and non-empty evidence.
    pub fn new(detected: bool, confidence: f64, evidence: impl Into<String>) -> Self {
        let evidence = evidence.into();
        Self {
            detected,
            confidence: clamp_unit(confidence),
            evidence: if evidence.trim().is_empty() {
                "No evidence provided".to_string()
            } else {
                evidence
            },
        }
    }

    pub fn not_detected(evidence: &str) -> Self {
        Self::new(false, 0.0, evidence)
    }
}

/// One slot per [`IndicatorKind`], so every key is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudIndicators {
    pub low_effort_generation: FraudIndicator,
    pub stolen_artwork: FraudIndicator,
    pub ai_generated: FraudIndicator,
    pub template_usage: FraudIndicator,
    pub metadata_mismatch: FraudIndicator,
    pub copyright_violation: FraudIndicator,
    pub inappropriate_content: FraudIndicator,
}

impl FraudIndicators {
    /// Every indicator not detected, zero confidence, with the same evidence text.
    pub fn uniform(evidence: &str) -> Self {
        Self::from_fn(|_| FraudIndicator::not_detected(evidence))
    }

    pub fn from_fn(mut f: impl FnMut(IndicatorKind) -> FraudIndicator) -> Self {
        Self {
            low_effort_generation: f(IndicatorKind::LowEffortGeneration),
            stolen_artwork: f(IndicatorKind::StolenArtwork),
            ai_generated: f(IndicatorKind::AiGenerated),
            template_usage: f(IndicatorKind::TemplateUsage),
            metadata_mismatch: f(IndicatorKind::MetadataMismatch),
            copyright_violation: f(IndicatorKind::CopyrightViolation),
            inappropriate_content: f(IndicatorKind::InappropriateContent),
        }
    }

    pub fn get(&self, kind: IndicatorKind) -> &FraudIndicator {
        match kind {
            IndicatorKind::LowEffortGeneration => &self.low_effort_generation,
            IndicatorKind::StolenArtwork => &self.stolen_artwork,
            IndicatorKind::AiGenerated => &self.ai_generated,
            IndicatorKind::TemplateUsage => &self.template_usage,
            IndicatorKind::MetadataMismatch => &self.metadata_mismatch,
            IndicatorKind::CopyrightViolation => &self.copyright_violation,
            IndicatorKind::InappropriateContent => &self.inappropriate_content,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (IndicatorKind, &FraudIndicator)> {
        IndicatorKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    /// Max confidence among detected indicators, 0.0 when none are detected.
    pub fn overall_score(&self) -> f64 {
        self.iter()
            .filter(|(_, indicator)| indicator.detected)
            .map(|(_, indicator)| indicator.confidence)
            .fold(0.0, f64::max)
    }

    pub fn detected(&self) -> Vec<IndicatorKind> {
        self.iter()
            .filter(|(_, indicator)| indicator.detected)
            .map(|(kind, _)| kind)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            RiskLevel::High
        } else if score >= 0.3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// How an image analysis result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    Model,
    TextHeuristic,
    Unavailable,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysisResult {
    pub description: String,
    pub artistic_style: String,
    pub quality_assessment: String,
    pub fraud_indicators: FraudIndicators,
    pub overall_fraud_score: f64,
    pub risk_level: RiskLevel,
    pub key_visual_elements: Vec<String>,
    pub color_palette: Vec<String>,
    pub composition_analysis: String,
    pub uniqueness_score: f64,
    pub artistic_merit: String,
    pub technical_quality: String,
    pub market_value_assessment: String,
    pub recommendation: String,
    pub confidence_in_analysis: f64,
    pub additional_notes: String,
    pub embedding: Vec<f32>,
    pub embedding_dimension: usize,
    pub analysis_source: AnalysisSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageAnalysisResult {
    /// Schema-complete result with every descriptive field set to `placeholder`.
    fn placeholder(
        description: String,
        placeholder: &str,
        recommendation: String,
        additional_notes: String,
        source: AnalysisSource,
    ) -> Self {
        Self {
            description,
            artistic_style: "unknown".to_string(),
            quality_assessment: placeholder.to_string(),
            fraud_indicators: FraudIndicators::uniform(placeholder),
            overall_fraud_score: 0.0,
            risk_level: RiskLevel::Low,
            key_visual_elements: Vec::new(),
            color_palette: Vec::new(),
            composition_analysis: placeholder.to_string(),
            uniqueness_score: 0.0,
            artistic_merit: placeholder.to_string(),
            technical_quality: placeholder.to_string(),
            market_value_assessment: placeholder.to_string(),
            recommendation,
            confidence_in_analysis: 0.0,
            additional_notes,
            embedding: Vec::new(),
            embedding_dimension: 0,
            analysis_source: source,
            error: None,
        }
    }

    /// Result used when no vision model is configured.
    pub fn unavailable(title: &str) -> Self {
        Self::placeholder(
            format!("Image analysis for {title} - Gemini analyzer not available"),
            "Analysis not available",
            "Manual review required - Gemini analyzer not available".to_string(),
            "Gemini analyzer not available for detailed image analysis".to_string(),
            AnalysisSource::Unavailable,
        )
    }

    /// Result used when any step of the analysis failed.
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        let mut result = Self::placeholder(
            format!("Analysis failed: {message}"),
            "Analysis failed",
            "Manual review required - Analysis failed".to_string(),
            format!("Error: {message}"),
            AnalysisSource::Failed,
        );
        result.error = Some(message);
        result
    }

    /// Re-derives `overall_fraud_score` and `risk_level` from the indicators.
    pub fn recompute_scores(&mut self) {
        self.overall_fraud_score = self.fraud_indicators.overall_score();
        self.risk_level = RiskLevel::from_score(self.overall_fraud_score);
    }

    pub fn set_embedding(&mut self, embedding: Vec<f32>) {
        self.embedding_dimension = embedding.len();
        self.embedding = embedding;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarNftMetadata {
    pub name: String,
    pub creator: Option<String>,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarNft {
    pub nft_id: String,
    pub similarity: f64,
    pub metadata: SimilarNftMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub similar_nfts: Vec<SimilarNft>,
    pub max_similarity: f64,
    pub is_duplicate: bool,
    pub similarity_count: usize,
    pub evidence_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SimilarityResult {
    pub fn empty() -> Self {
        Self {
            similar_nfts: Vec::new(),
            max_similarity: 0.0,
            is_duplicate: false,
            similarity_count: 0,
            evidence_urls: Vec::new(),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::empty()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataAnalysisResult {
    pub quality_score: f64,
    pub suspicious_indicators: Vec<String>,
    pub metadata_risk: f64,
    pub analysis: String,
}

impl MetadataAnalysisResult {
    /// Static neutral result when no language model is configured.
    pub fn unconfigured() -> Self {
        Self {
            quality_score: 0.7,
            suspicious_indicators: Vec::new(),
            metadata_risk: 0.1,
            analysis: "Language model not configured; neutral metadata score applied".to_string(),
        }
    }

    /// Neutral result when the model answered with nothing usable.
    pub fn fallback(indicator: &str, analysis: &str) -> Self {
        Self {
            quality_score: 0.5,
            suspicious_indicators: vec![indicator.to_string()],
            metadata_risk: 0.2,
            analysis: analysis.to_string(),
        }
    }

    pub fn errored(message: &str) -> Self {
        Self {
            quality_score: 0.5,
            suspicious_indicators: vec![format!("Analysis error: {message}")],
            metadata_risk: 0.1,
            analysis: "Metadata analysis failed; neutral score applied".to_string(),
        }
    }
}

/// Fraud category attached to a flagged NFT. Serialized as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FlagType {
    Plagiarism = 1,
    SuspiciousActivity = 2,
    FakeMetadata = 3,
    AiGenerated = 4,
}

impl TryFrom<u8> for FlagType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(FlagType::Plagiarism),
            2 => Ok(FlagType::SuspiciousActivity),
            3 => Ok(FlagType::FakeMetadata),
            4 => Ok(FlagType::AiGenerated),
            other => Err(format!("unknown flag type {other}")),
        }
    }
}

impl From<FlagType> for u8 {
    fn from(flag: FlagType) -> u8 {
        flag as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Allow,
    Flag,
    Block,
    ManualReview,
}

impl Recommendation {
    /// Lenient parse of a model-supplied recommendation string.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_uppercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "ALLOW" | "APPROVE" => Some(Recommendation::Allow),
            "FLAG" => Some(Recommendation::Flag),
            "BLOCK" | "REJECT" => Some(Recommendation::Block),
            "MANUAL_REVIEW" | "REVIEW" => Some(Recommendation::ManualReview),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskBreakdown {
    pub image: f64,
    pub similarity: f64,
    pub metadata: f64,
    pub combined: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudDecision {
    pub is_fraud: bool,
    pub confidence_score: f64,
    pub flag_type: Option<FlagType>,
    pub reason: String,
    #[serde(default)]
    pub primary_concerns: Vec<String>,
    pub recommendation: Option<Recommendation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_breakdown: Option<RiskBreakdown>,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FraudDecision {
    /// Minimal decision returned when decision-making itself failed.
    pub fn safe_default(error: &str) -> Self {
        Self {
            is_fraud: false,
            confidence_score: 0.0,
            flag_type: None,
            reason: format!("Decision analysis error: {error}"),
            primary_concerns: Vec::new(),
            recommendation: None,
            risk_breakdown: None,
            fallback_used: false,
            error: Some(error.to_string()),
        }
    }

    /// Forces `is_fraud` to agree with a confident recommendation.
    ///
    /// Returns `true` when the verdict was changed.
    pub fn enforce_consistency(&mut self) -> bool {
        let before = self.is_fraud;
        match self.recommendation {
            Some(Recommendation::Flag | Recommendation::Block) if self.confidence_score >= 0.7 => {
                self.is_fraud = true;
            }
            Some(Recommendation::Allow) if self.confidence_score < 0.3 => {
                self.is_fraud = false;
            }
            _ => {}
        }
        before != self.is_fraud
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDetails {
    pub image_analysis: ImageAnalysisResult,
    pub similarity_results: SimilarityResult,
    pub metadata_analysis: MetadataAnalysisResult,
    pub llm_decision: FraudDecision,
    pub analysis_timestamp: DateTime<Utc>,
}

/// Complete output of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub is_fraud: bool,
    pub confidence_score: f64,
    pub flag_type: Option<FlagType>,
    pub reason: String,
    pub analysis_details: AnalysisDetails,
}

impl ResultEnvelope {
    pub fn assemble(
        image_analysis: ImageAnalysisResult,
        similarity_results: SimilarityResult,
        metadata_analysis: MetadataAnalysisResult,
        llm_decision: FraudDecision,
        analysis_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            is_fraud: llm_decision.is_fraud,
            confidence_score: llm_decision.confidence_score,
            flag_type: llm_decision.flag_type,
            reason: llm_decision.reason.clone(),
            analysis_details: AnalysisDetails {
                image_analysis,
                similarity_results,
                metadata_analysis,
                llm_decision,
                analysis_timestamp,
            },
        }
    }

    /// The embedding to write back, if the image stage produced one.
    pub fn embedding(&self) -> Option<&[f32]> {
        let embedding = &self.analysis_details.image_analysis.embedding;
        (!embedding.is_empty()).then_some(embedding.as_slice())
    }

    /// `analysis_details` blob with the verdict fields merged in at top level.
    pub fn persisted_details(
        &self,
        analyzed_at: DateTime<Utc>,
    ) -> Result<serde_json::Value, serde_json::Error> {
        let mut details = serde_json::to_value(&self.analysis_details)?;
        if let Some(map) = details.as_object_mut() {
            map.insert("status".into(), "completed".into());
            map.insert("analyzed_at".into(), analyzed_at.to_rfc3339().into());
            map.insert("is_fraud".into(), self.is_fraud.into());
            map.insert("confidence_score".into(), self.confidence_score.into());
            map.insert("flag_type".into(), serde_json::to_value(self.flag_type)?);
            map.insert("reason".into(), self.reason.clone().into());
        }
        Ok(details)
    }
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}
