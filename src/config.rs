use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub recommendation: RecommendationConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub tagger: TaggerConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Embedding dimensionality; every stored vector must have this length.
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Candidate labels handed to the keyword tagger.
    #[serde(default = "default_candidate_labels")]
    pub candidate_labels: Vec<String>,
    #[serde(default = "default_keyword_top_k")]
    pub keyword_top_k: usize,
    /// Minimum biased-class score before an article is marked BIASED.
    #[serde(default = "default_bias_threshold")]
    pub bias_threshold: f64,
    /// The bias classifier only sees this many leading characters of the body.
    #[serde(default = "default_bias_excerpt_chars")]
    pub bias_excerpt_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            dims: default_dims(),
            candidate_labels: default_candidate_labels(),
            keyword_top_k: default_keyword_top_k(),
            bias_threshold: default_bias_threshold(),
            bias_excerpt_chars: default_bias_excerpt_chars(),
        }
    }
}

fn default_dims() -> usize {
    768
}
fn default_candidate_labels() -> Vec<String> {
    [
        "economy",
        "politics",
        "technology",
        "sports",
        "entertainment",
        "lifestyle",
        "shopping",
        "world",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_keyword_top_k() -> usize {
    3
}
fn default_bias_threshold() -> f64 {
    0.85
}
fn default_bias_excerpt_chars() -> usize {
    512
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecommendationConfig {
    /// Maximum age (in days) of an article eligible for similarity-based
    /// recommendation.
    #[serde(default = "default_freshness_days")]
    pub freshness_days: i64,
    /// At or below this many read-history rows the cold-start strategy is used.
    #[serde(default = "default_cold_start_history_max")]
    pub cold_start_history_max: usize,
    /// Profile searches fetch `k × factor + history_len` candidates so that
    /// read/stale removal still leaves k results.
    #[serde(default = "default_profile_candidate_factor")]
    pub profile_candidate_factor: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            freshness_days: default_freshness_days(),
            cold_start_history_max: default_cold_start_history_max(),
            profile_candidate_factor: default_profile_candidate_factor(),
            default_limit: default_limit(),
        }
    }
}

fn default_freshness_days() -> i64 {
    3
}
fn default_cold_start_history_max() -> usize {
    10
}
fn default_profile_candidate_factor() -> usize {
    3
}
fn default_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClusteringConfig {
    /// Cosine similarity at or above which two biased articles are treated
    /// as covering the same event.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_recency_window_hours")]
    pub recency_window_hours: i64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            recency_window_hours: default_recency_window_hours(),
        }
    }
}

fn default_similarity_threshold() -> f32 {
    0.85
}
fn default_recency_window_hours() -> i64 {
    24
}

#[derive(Debug, Deserialize, Clone)]
pub struct EncoderConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_neutral_label")]
    pub neutral_label: String,
    #[serde(default = "default_biased_label")]
    pub biased_label: String,
    #[serde(default)]
    pub hypothesis_template: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            neutral_label: default_neutral_label(),
            biased_label: default_biased_label(),
            hypothesis_template: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_neutral_label() -> String {
    "factual news reporting".to_string()
}
fn default_biased_label() -> String {
    "strongly opinionated personal argument".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TaggerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub hypothesis_template: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            hypothesis_template: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.analysis.dims == 0 {
        anyhow::bail!("analysis.dims must be > 0");
    }
    if config.analysis.keyword_top_k == 0 {
        anyhow::bail!("analysis.keyword_top_k must be > 0");
    }
    if !(0.0..=1.0).contains(&config.analysis.bias_threshold) {
        anyhow::bail!("analysis.bias_threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.clustering.similarity_threshold) {
        anyhow::bail!("clustering.similarity_threshold must be in [0.0, 1.0]");
    }
    if config.clustering.recency_window_hours < 1 {
        anyhow::bail!("clustering.recency_window_hours must be >= 1");
    }
    if config.recommendation.freshness_days < 1 {
        anyhow::bail!("recommendation.freshness_days must be >= 1");
    }
    if config.recommendation.profile_candidate_factor == 0 {
        anyhow::bail!("recommendation.profile_candidate_factor must be > 0");
    }
    if config.recommendation.default_limit == 0 {
        anyhow::bail!("recommendation.default_limit must be > 0");
    }

    match config.encoder.provider.as_str() {
        "disabled" | "openai" | "tei" => {}
        other => anyhow::bail!(
            "Unknown encoder provider: '{}'. Must be disabled, openai, or tei.",
            other
        ),
    }
    for (section, provider) in [
        ("classifier", config.classifier.provider.as_str()),
        ("tagger", config.tagger.provider.as_str()),
    ] {
        match provider {
            "disabled" | "zero-shot" => {}
            other => anyhow::bail!(
                "Unknown {} provider: '{}'. Must be disabled or zero-shot.",
                section,
                other
            ),
        }
    }

    Ok(config)
}
