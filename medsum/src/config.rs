use serde::Deserialize;
use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_list(var: &str, default: &[&str]) -> Vec<String> {
    match env::var(var) {
        Ok(val) if !val.trim().is_empty() => val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ocr: OcrConfig,
    pub dicta: DictaConfig,
    pub abbyy: Option<AbbyyConfig>,
    pub vision: Option<VisionConfig>,
    pub llm: Option<LlmConfig>,
    pub reconciler: ReconcilerConfig,
    pub processing: ProcessingConfig,
}

/// Shared OCR settings: engine selection plus the local Tesseract backend
/// and image preprocessing limits.
#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    /// Engine ids to construct, in invocation order.
    pub engines: Vec<String>,
    /// Tesseract language string (ISO 639-2 codes joined with '+').
    pub languages: String,
    pub timeout_secs: u64,
    pub max_image_dimension: u32,
    pub min_image_dimension: u32,
}

/// Hebrew-specialized remote OCR service.
#[derive(Debug, Clone, Deserialize)]
pub struct DictaConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Commercial OCR gateway. Only built when a base URL is configured.
#[derive(Debug, Clone, Deserialize)]
pub struct AbbyyConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

/// Cloud Vision OCR plus the bucket it stages documents through.
/// Only built when both an access token and a bucket are configured.
#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    pub access_token: String,
    pub bucket: String,
    pub vision_base_url: String,
    pub storage_base_url: String,
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub poll_attempts: u32,
}

/// LLM configuration for the summarization model.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Generation budget per chunk, in tokens.
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Stop sequences passed to the completion call.
    pub stop: Vec<String>,
    /// Combined prompt + chunk + expected output must stay under this
    /// character budget (the model's context window, in characters).
    pub context_budget_chars: usize,
}

/// Thresholds driving the reconciliation policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    /// Minimum non-whitespace characters for a result to count as real text.
    pub min_text_chars: usize,
    /// Secondary-tier engines run only when the best primary result has
    /// fewer non-whitespace characters than this.
    pub escalation_threshold: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    pub max_chunk_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ocr: OcrConfig {
                engines: parse_env_list("OCR_ENGINES", &["tesseract", "dicta"]),
                languages: env::var("OCR_LANGUAGES").unwrap_or_else(|_| "heb+eng".to_string()),
                timeout_secs: parse_env_or("OCR_TIMEOUT", 30),
                max_image_dimension: parse_env_or("OCR_MAX_DIMENSION", 4096),
                min_image_dimension: parse_env_or("OCR_MIN_DIMENSION", 50),
            },
            dicta: DictaConfig {
                base_url: env::var("DICTA_BASE_URL")
                    .unwrap_or_else(|_| "https://dicta.org.il/api/ocr/heb".to_string()),
                timeout_secs: parse_env_or("DICTA_TIMEOUT", 30),
            },
            abbyy: env::var("ABBYY_BASE_URL").ok().map(|base_url| AbbyyConfig {
                base_url,
                api_key: env::var("ABBYY_API_KEY").ok(),
                timeout_secs: parse_env_or("ABBYY_TIMEOUT", 30),
            }),
            vision: match (env::var("VISION_ACCESS_TOKEN"), env::var("GCS_BUCKET_NAME")) {
                (Ok(access_token), Ok(bucket)) => Some(VisionConfig {
                    access_token,
                    bucket,
                    vision_base_url: env::var("VISION_BASE_URL")
                        .unwrap_or_else(|_| "https://vision.googleapis.com".to_string()),
                    storage_base_url: env::var("GCS_BASE_URL")
                        .unwrap_or_else(|_| "https://storage.googleapis.com".to_string()),
                    timeout_secs: parse_env_or("VISION_TIMEOUT", 30),
                    poll_interval_ms: parse_env_or("VISION_POLL_INTERVAL_MS", 2000),
                    poll_attempts: parse_env_or("VISION_POLL_ATTEMPTS", 150),
                }),
                _ => None,
            },
            llm: env::var("LLM_MODEL").ok().map(|model| LlmConfig {
                model,
                api_key: env::var("LLM_API_KEY").ok(),
                base_url: env::var("LLM_BASE_URL").ok(),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 120),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 3),
                max_tokens: parse_env_or("SUMMARY_MAX_TOKENS", 512),
                temperature: parse_env_or("SUMMARY_TEMPERATURE", 0.7),
                top_p: parse_env_or("SUMMARY_TOP_P", 0.95),
                stop: parse_env_list("SUMMARY_STOP", &["Text to summarize:"]),
                context_budget_chars: parse_env_or("LLM_CONTEXT_BUDGET_CHARS", 32768),
            }),
            reconciler: ReconcilerConfig {
                min_text_chars: parse_env_or("RECONCILER_MIN_TEXT_CHARS", 10),
                escalation_threshold: parse_env_or("RECONCILER_ESCALATION_THRESHOLD", 100),
            },
            processing: ProcessingConfig {
                max_chunk_chars: parse_env_or("MAX_CHUNK_CHARS", 4000),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Parse an LLM model name into (provider, model) tuple.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    // Default to treating the whole string as a local model
    ("local", model)
}
