use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::error::ConfigError;

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Credentials and tuning for the Gemini model service.
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub base_url: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SimilaritySettings {
    /// Minimum similarity for a neighbour to be reported.
    pub report_threshold: f64,
    /// Similarity strictly above this marks a duplicate.
    pub duplicate_threshold: f64,
    pub limit: usize,
}

impl Default for SimilaritySettings {
    fn default() -> Self {
        Self {
            report_threshold: 0.7,
            duplicate_threshold: 0.95,
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub image_fetch: Duration,
    pub model: Duration,
    pub embedding: Duration,
    pub vector_query: Duration,
    pub persistence: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            image_fetch: Duration::from_secs(30),
            model: Duration::from_secs(60),
            embedding: Duration::from_secs(30),
            vector_query: Duration::from_secs(10),
            persistence: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub database_url: Option<String>,
    pub run_migrations: bool,
    /// `None` when no API key is present; every model call site degrades.
    pub gemini: Option<GeminiSettings>,
    pub embedding_dimension: usize,
    pub embedding_model_dir: Option<PathBuf>,
    pub similarity: SimilaritySettings,
    pub fallback_fraud_threshold: f64,
    pub timeouts: Timeouts,
    pub max_image_bytes: usize,
    pub max_concurrent_analyses: usize,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 2008,
            database_url: None,
            run_migrations: true,
            gemini: None,
            embedding_dimension: 768,
            embedding_model_dir: None,
            similarity: SimilaritySettings::default(),
            fallback_fraud_threshold: 0.7,
            timeouts: Timeouts::default(),
            max_image_bytes: 10 * 1024 * 1024,
            max_concurrent_analyses: 4,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let gemini = match get("GOOGLE_API_KEY") {
            Some(api_key) => Some(GeminiSettings {
                api_key,
                model: get("GOOGLE_MODEL").unwrap_or_else(|| "gemini-2.5-flash-lite".to_string()),
                embedding_model: get("GEMINI_EMBEDDING_MODEL")
                    .unwrap_or_else(|| "models/embedding-001".to_string()),
                temperature: parse(&lookup, "GEMINI_TEMPERATURE", 0.1)?,
                max_output_tokens: parse(&lookup, "GEMINI_MAX_TOKENS", 2048)?,
                base_url: get("GEMINI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            }),
            None => None,
        };

        let similarity = SimilaritySettings {
            report_threshold: parse_unit(&lookup, "SIMILARITY_REPORT_THRESHOLD", 0.7)?,
            duplicate_threshold: parse_unit(&lookup, "SIMILARITY_DUPLICATE_THRESHOLD", 0.95)?,
            limit: parse(&lookup, "SIMILARITY_LIMIT", defaults.similarity.limit)?,
        };

        let timeouts = Timeouts {
            image_fetch: secs(&lookup, "IMAGE_FETCH_TIMEOUT_SECS", defaults.timeouts.image_fetch)?,
            model: secs(&lookup, "MODEL_TIMEOUT_SECS", defaults.timeouts.model)?,
            embedding: secs(&lookup, "EMBEDDING_TIMEOUT_SECS", defaults.timeouts.embedding)?,
            vector_query: secs(&lookup, "VECTOR_QUERY_TIMEOUT_SECS", defaults.timeouts.vector_query)?,
            persistence: secs(&lookup, "PERSISTENCE_TIMEOUT_SECS", defaults.timeouts.persistence)?,
        };

        let max_image_mb: usize = parse(&lookup, "MAX_IMAGE_SIZE_MB", 10)?;
        let max_concurrent_analyses: usize =
            parse(&lookup, "MAX_CONCURRENT_ANALYSES", defaults.max_concurrent_analyses)?;
        if max_concurrent_analyses == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_CONCURRENT_ANALYSES",
                value: "0".to_string(),
            });
        }

        Ok(Settings {
            port: parse(&lookup, "PORT", defaults.port)?,
            database_url: get("DATABASE_URL"),
            run_migrations: parse(&lookup, "RUN_MIGRATIONS", defaults.run_migrations)?,
            gemini,
            embedding_dimension: parse(&lookup, "EMBEDDING_DIMENSION", defaults.embedding_dimension)?,
            embedding_model_dir: get("EMBEDDING_MODEL_DIR").map(PathBuf::from),
            similarity,
            fallback_fraud_threshold: parse_unit(
                &lookup,
                "FALLBACK_FRAUD_THRESHOLD",
                defaults.fallback_fraud_threshold,
            )?,
            timeouts,
            max_image_bytes: max_image_mb * 1024 * 1024,
            max_concurrent_analyses,
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        Some(value) if !value.is_empty() => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        _ => Ok(default),
    }
}

// thresholds live in [0, 1]
fn parse_unit<F>(lookup: &F, key: &'static str, default: f64) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value: f64 = parse(lookup, key, default)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn secs<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value: u64 = parse(lookup, key, default.as_secs())?;
    Ok(Duration::from_secs(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let settings = settings_from(&[]).unwrap();
        assert_eq!(settings.port, 2008);
        assert!(settings.gemini.is_none());
        assert!(settings.database_url.is_none());
        assert_eq!(settings.embedding_dimension, 768);
        assert_eq!(settings.similarity.report_threshold, 0.7);
        assert_eq!(settings.similarity.duplicate_threshold, 0.95);
        assert_eq!(settings.fallback_fraud_threshold, 0.7);
        assert_eq!(settings.max_image_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn api_key_enables_gemini_with_defaults() {
        let settings = settings_from(&[
            ("GOOGLE_API_KEY", "secret"),
            ("GEMINI_BASE_URL", "http://localhost:9000/"),
        ])
        .unwrap();
        let gemini = settings.gemini.unwrap();
        assert_eq!(gemini.api_key, "secret");
        assert_eq!(gemini.model, "gemini-2.5-flash-lite");
        assert_eq!(gemini.embedding_model, "models/embedding-001");
        assert_eq!(gemini.base_url, "http://localhost:9000");
    }

    #[test]
    fn blank_api_key_counts_as_unconfigured() {
        let settings = settings_from(&[("GOOGLE_API_KEY", "   ")]).unwrap();
        assert!(settings.gemini.is_none());
    }

    #[test]
    fn malformed_number_is_an_error() {
        let err = settings_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        let err = settings_from(&[("SIMILARITY_DUPLICATE_THRESHOLD", "1.5")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "SIMILARITY_DUPLICATE_THRESHOLD",
                ..
            }
        ));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        assert!(settings_from(&[("MAX_CONCURRENT_ANALYSES", "0")]).is_err());
    }
}
