#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use fraudguard::{
    FraudAnalyzer, NftInput,
    agents::{DecisionMaker, DescriptionEmbedder, ImageAnalyzer, MetadataAnalyzer, SimilaritySearch},
    config::SimilaritySettings,
    db::VectorStore,
    embedding::{EmbeddingChain, HashingEmbedder, TextEmbedder},
    error::{EmbeddingError, ImageError, LlmError},
    image_fetch::{EncodedImage, ImageSource},
    llm::LanguageModel,
};

pub const DIMENSION: usize = 8;

/// Canned answer for one kind of prompt.
#[derive(Clone)]
pub enum Reply {
    Text(String),
    Fail,
    Hang,
}

impl Reply {
    pub fn text(s: &str) -> Self {
        Reply::Text(s.to_string())
    }
}

/// Language model that answers by prompt kind and records what it was asked.
pub struct ScriptedModel {
    pub image: Reply,
    pub metadata: Reply,
    pub decision: Reply,
    pub description: Reply,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(image: Reply, metadata: Reply, decision: Reply) -> Self {
        Self {
            image,
            metadata,
            decision,
            description: Reply::text("A lighthouse on a rocky cliff painted at dusk with warm light"),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn all_failing() -> Self {
        Self::new(Reply::Fail, Reply::Fail, Reply::Fail)
    }

    pub fn decision_prompt(&self) -> Option<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.contains("fraud detection AI"))
            .cloned()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str, _image: Option<&EncodedImage>) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = if prompt.contains("fraud detection analyst") {
            &self.image
        } else if prompt.contains("NFT metadata") {
            &self.metadata
        } else if prompt.contains("fraud detection AI") {
            &self.decision
        } else {
            &self.description
        };
        match reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail => Err(LlmError::Server {
                status: 503,
                body: "unavailable".into(),
            }),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(String::new())
            }
        }
    }
}

pub struct StaticImages;

#[async_trait]
impl ImageSource for StaticImages {
    async fn fetch(&self, _url: &str) -> Result<EncodedImage, ImageError> {
        Ok(EncodedImage {
            mime_type: "image/jpeg",
            base64_data: "/9j/4AAQ".into(),
            width: 64,
            height: 64,
        })
    }
}

pub struct UnreachableImages;

#[async_trait]
impl ImageSource for UnreachableImages {
    async fn fetch(&self, _url: &str) -> Result<EncodedImage, ImageError> {
        Err(ImageError::Timeout(Duration::from_millis(1)))
    }
}

/// Embeds every text to the same unit vector.
pub struct ConstantEmbedder(pub Vec<f32>);

#[async_trait]
impl TextEmbedder for ConstantEmbedder {
    fn name(&self) -> &'static str {
        "constant"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.0.clone())
    }
}

pub fn unit_vector(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIMENSION];
    v[axis] = 1.0;
    v
}

pub fn embeddings(primary: Option<Arc<dyn TextEmbedder>>) -> EmbeddingChain {
    EmbeddingChain::new(
        primary,
        Arc::new(HashingEmbedder::new(DIMENSION)),
        DIMENSION,
        Duration::from_millis(500),
    )
}

pub struct Harness {
    pub model: Option<Arc<dyn LanguageModel>>,
    pub images: Arc<dyn ImageSource>,
    pub embedder: Option<Arc<dyn TextEmbedder>>,
    pub store: Option<Arc<dyn VectorStore>>,
}

impl Harness {
    pub fn analyzer(&self) -> FraudAnalyzer {
        let timeout = Duration::from_millis(500);
        FraudAnalyzer::new(
            ImageAnalyzer::new(
                self.model.clone(),
                self.images.clone(),
                embeddings(self.embedder.clone()),
                timeout,
            ),
            SimilaritySearch::new(self.store.clone(), SimilaritySettings::default(), timeout),
            MetadataAnalyzer::new(self.model.clone(), timeout),
            DecisionMaker::new(self.model.clone(), timeout, 0.7),
            timeout,
            2,
        )
    }

    pub fn descriptions(&self) -> DescriptionEmbedder {
        DescriptionEmbedder::new(
            self.model.clone(),
            self.images.clone(),
            embeddings(self.embedder.clone()),
            self.store.clone(),
            Duration::from_millis(500),
            2,
        )
    }
}

pub fn sunset_painting() -> NftInput {
    NftInput {
        title: "Sunset Painting".into(),
        description: "An original oil painting of a sunset over a quiet harbour. ".repeat(30),
        image_url: "https://img.example/sunset.png".into(),
        category: "Art".into(),
        price: 5.0,
        creator: Some("0xartist".into()),
    }
}

pub const CLEAN_IMAGE_JSON: &str = r#"{
  "description": "A warm orange sunset over a quiet harbour, painted in thick oil strokes with fishing boats silhouetted against the sky.",
  "artistic_style": "oil painting",
  "quality_assessment": "8/10",
  "fraud_indicators": {
    "low_effort_generation": {"detected": false, "confidence": 0.1, "evidence": "Careful brushwork"},
    "stolen_artwork": {"detected": false, "confidence": 0.05, "evidence": "No watermark"},
    "ai_generated": {"detected": false, "confidence": 0.1, "evidence": "Natural texture"},
    "template_usage": {"detected": false, "confidence": 0.0, "evidence": "Unique composition"},
    "metadata_mismatch": {"detected": false, "confidence": 0.0, "evidence": "Matches title"},
    "copyright_violation": {"detected": false, "confidence": 0.0, "evidence": "No brands"},
    "inappropriate_content": {"detected": false, "confidence": 0.0, "evidence": "Safe"}
  },
  "overall_fraud_score": 0.0,
  "risk_level": "low",
  "key_visual_elements": ["sun", "boats", "harbour"],
  "color_palette": ["orange", "purple"],
  "uniqueness_score": 0.85,
  "recommendation": "ALLOW",
  "confidence_in_analysis": 0.9
}"#;

pub const CLEAN_METADATA_JSON: &str =
    r#"{"quality_score": 0.8, "suspicious_indicators": [], "metadata_risk": 0.05, "analysis": "Descriptive and consistent"}"#;

pub const CLEAN_DECISION_JSON: &str = r#"{"is_fraud": false, "confidence_score": 0.1, "flag_type": null, "reason": "Original artwork with consistent metadata", "primary_concerns": [], "recommendation": "ALLOW"}"#;
