//! Keyword-based recovery of an image analysis from free text, used when the
//! vision model's answer contains no parseable JSON object.

use crate::models::{AnalysisSource, FraudIndicator, FraudIndicators, ImageAnalysisResult, IndicatorKind, RiskLevel};

const DESCRIPTION_LIMIT: usize = 500;
const MIN_DESCRIPTION_LINE: usize = 20;
const TEXT_EXTRACTION: &str = "Analysis completed via text extraction";

/// Description used when nothing prose-like could be recovered. Never embedded.
pub const NO_DESCRIPTION: &str = "Could not extract detailed description from response";

struct KeywordSet {
    negative: &'static [&'static str],
    positive: &'static [&'static str],
}

fn keywords(kind: IndicatorKind) -> KeywordSet {
    match kind {
        IndicatorKind::LowEffortGeneration => KeywordSet {
            negative: &["low effort", "simple", "basic", "minimal", "lazy", "quick", "rushed", "poor quality"],
            positive: &["detailed", "complex", "intricate", "careful", "professional"],
        },
        IndicatorKind::StolenArtwork => KeywordSet {
            negative: &["stolen", "plagiarized", "copied", "watermark", "signature", "copyright", "trademark"],
            positive: &["original", "unique", "authentic", "genuine"],
        },
        IndicatorKind::AiGenerated => KeywordSet {
            negative: &["ai generated", "artificial", "generated", "synthetic", "computer", "algorithm", "machine"],
            positive: &["hand-drawn", "painted", "photographed", "scanned"],
        },
        IndicatorKind::TemplateUsage => KeywordSet {
            negative: &["template", "generic", "common", "standard", "mass-produced", "cookie cutter"],
            positive: &["unique", "original", "custom", "one-of-a-kind"],
        },
        IndicatorKind::MetadataMismatch => KeywordSet {
            negative: &["mismatch", "inconsistent", "doesn't match", "wrong", "incorrect"],
            positive: &["matches", "consistent", "accurate", "correct"],
        },
        IndicatorKind::CopyrightViolation => KeywordSet {
            negative: &["copyright", "trademark", "brand", "logo", "disney", "marvel", "nintendo"],
            positive: &["original", "public domain", "creative commons"],
        },
        IndicatorKind::InappropriateContent => KeywordSet {
            negative: &["inappropriate", "nsfw", "violent", "hate", "offensive", "explicit"],
            positive: &["appropriate", "family-friendly", "safe", "clean"],
        },
    }
}

fn matched<'a>(text: &str, words: &[&'a str]) -> Vec<&'a str> {
    words.iter().copied().filter(|w| text.contains(w)).collect()
}

/// Scores one indicator from keyword hits in lowercased `text`.
pub fn score_indicator(kind: IndicatorKind, text: &str) -> FraudIndicator {
    let set = keywords(kind);
    let negative = matched(text, set.negative);
    let positive = matched(text, set.positive);

    match (negative.is_empty(), positive.is_empty()) {
        (false, true) => FraudIndicator::new(
            true,
            0.6,
            format!("Detected negative indicators: {}", negative.join(", ")),
        ),
        (true, false) => FraudIndicator::new(
            false,
            0.8,
            format!("Detected positive indicators: {}", positive.join(", ")),
        ),
        (false, false) => FraudIndicator::new(
            false,
            0.4,
            "Mixed indicators detected - positive indicators suggest legitimate content",
        ),
        (true, true) => FraudIndicator::new(
            false,
            0.2,
            "No clear indicators detected - requires manual review",
        ),
    }
}

fn artistic_style(text: &str) -> &'static str {
    let any = |words: &[&str]| words.iter().any(|w| text.contains(w));
    if any(&["pixel", "8-bit", "retro"]) {
        "pixel art"
    } else if any(&["3d", "render", "blender", "maya"]) {
        "3D render"
    } else if any(&["photo", "photograph", "camera"]) {
        "photography"
    } else if any(&["painting", "oil", "watercolor", "acrylic"]) {
        "painting"
    } else if any(&["digital", "photoshop", "illustrator"]) {
        "digital art"
    } else {
        "unknown"
    }
}

/// Joins prose-looking lines of the response into a description.
///
/// Returns `None` when no line qualifies.
pub fn extract_description(text: &str) -> Option<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.starts_with('{')
                && !line.starts_with('"')
                && !line.starts_with("```")
                && line.chars().count() > MIN_DESCRIPTION_LINE
        })
        .collect();
    if lines.is_empty() {
        return None;
    }

    let full = lines.join(" ");
    if full.chars().count() <= DESCRIPTION_LIMIT {
        return Some(full);
    }

    let sentences: Vec<&str> = full.split(". ").collect();
    if sentences.len() > 2 {
        let mut joined = sentences[..3].join(". ");
        if !joined.ends_with('.') {
            joined.push('.');
        }
        Some(joined)
    } else {
        let cut: String = full.chars().take(DESCRIPTION_LIMIT).collect();
        Some(format!("{cut}..."))
    }
}

/// Builds a complete analysis from unstructured model output.
pub fn analyze_text(text: &str) -> ImageAnalysisResult {
    let lowered = text.to_lowercase();
    let fraud_indicators = FraudIndicators::from_fn(|kind| score_indicator(kind, &lowered));

    let mut result = ImageAnalysisResult {
        description: extract_description(text).unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        artistic_style: artistic_style(&lowered).to_string(),
        quality_assessment: TEXT_EXTRACTION.to_string(),
        fraud_indicators,
        overall_fraud_score: 0.0,
        risk_level: RiskLevel::Low,
        key_visual_elements: vec!["extracted from text analysis".to_string()],
        color_palette: vec!["extracted from text analysis".to_string()],
        composition_analysis: TEXT_EXTRACTION.to_string(),
        uniqueness_score: 0.5,
        artistic_merit: TEXT_EXTRACTION.to_string(),
        technical_quality: TEXT_EXTRACTION.to_string(),
        market_value_assessment: TEXT_EXTRACTION.to_string(),
        recommendation: String::new(),
        confidence_in_analysis: 0.4,
        additional_notes: "Analysis completed using text extraction due to JSON parsing failure. \
                           Manual review recommended for higher accuracy."
            .to_string(),
        embedding: Vec::new(),
        embedding_dimension: 0,
        analysis_source: AnalysisSource::TextHeuristic,
        error: None,
    };
    result.recompute_scores();
    result.recommendation = recommendation_for(result.overall_fraud_score).to_string();
    result
}

/// ALLOW / FLAG / BLOCK by fraud score band.
pub fn recommendation_for(score: f64) -> &'static str {
    if score < 0.3 {
        "ALLOW"
    } else if score < 0.7 {
        "FLAG"
    } else {
        "BLOCK"
    }
}
