//! Embedding encoder abstraction and implementations.
//!
//! Defines the [`EmbeddingEncoder`] trait and concrete implementations:
//! - **[`DisabledEncoder`]** — returns errors; used when no encoder is configured.
//! - **[`OpenAiEncoder`]** — calls the OpenAI embeddings API with retry and backoff.
//! - **[`TeiEncoder`]** — calls a text-embeddings-inference server's `/embed` endpoint.
//!
//! Also provides vector utilities shared by the store and index layers:
//! - [`cosine_similarity`] — compute similarity between two embedding vectors
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`] — decode a SQLite BLOB back into a `Vec<f32>`
//!
//! # Retry Strategy
//!
//! The HTTP encoders use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EncoderConfig;
use crate::error::{EngineError, EngineResult};

/// Trait for the external embedding collaborator: text in, fixed-length
/// vector out.
///
/// Encode failures propagate as [`EngineError::Compute`] and fail the
/// pipeline run that requested them.
#[async_trait]
pub trait EmbeddingEncoder: Send + Sync {
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;

    /// Encode a single text into a vector of length [`dims`](Self::dims).
    async fn encode(&self, text: &str) -> EngineResult<Vec<f32>>;
}

/// A no-op encoder that always returns errors.
///
/// Used when `encoder.provider = "disabled"` in the configuration; any
/// pipeline run that reaches the compute stage will end FAILED.
pub struct DisabledEncoder {
    dims: usize,
}

#[async_trait]
impl EmbeddingEncoder for DisabledEncoder {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, _text: &str) -> EngineResult<Vec<f32>> {
        Err(EngineError::compute(anyhow!("embedding encoder is disabled")))
    }
}

/// Encoder backed by the OpenAI embeddings API.
///
/// Calls `POST /v1/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable.
pub struct OpenAiEncoder {
    model: String,
    dims: usize,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiEncoder {
    pub fn new(config: &EncoderConfig, dims: usize) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("encoder.model required for OpenAI encoder"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingEncoder for OpenAiEncoder {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, text: &str) -> EngineResult<Vec<f32>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| EngineError::compute(anyhow!("OPENAI_API_KEY not set")))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value =
                            response.json().await.map_err(EngineError::compute)?;
                        let vector = parse_openai_response(&json).map_err(EngineError::Compute)?;
                        return check_dims(vector, self.dims);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(EngineError::compute(anyhow!(
                        "OpenAI API error {}: {}",
                        status,
                        body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(EngineError::Compute(
            last_err.unwrap_or_else(|| anyhow!("embedding failed after retries")),
        ))
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let embedding = data
        .first()
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Encoder backed by a text-embeddings-inference server.
///
/// Calls `POST {url}/embed` with `{"inputs": [text]}`; the server responds
/// with one vector per input.
pub struct TeiEncoder {
    url: String,
    dims: usize,
    client: reqwest::Client,
    max_retries: u32,
}

impl TeiEncoder {
    pub fn new(config: &EncoderConfig, dims: usize) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow!("encoder.url required for TEI encoder"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            url,
            dims,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingEncoder for TeiEncoder {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, text: &str) -> EngineResult<Vec<f32>> {
        let body = serde_json::json!({ "inputs": [text] });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/embed", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value =
                            response.json().await.map_err(EngineError::compute)?;
                        let vector = parse_tei_response(&json).map_err(EngineError::Compute)?;
                        return check_dims(vector, self.dims);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow!("TEI error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(EngineError::compute(anyhow!(
                        "TEI error {}: {}",
                        status,
                        body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(anyhow!(
                        "TEI connection error (is the server running at {}?): {}",
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(EngineError::Compute(
            last_err.unwrap_or_else(|| anyhow!("embedding failed after retries")),
        ))
    }
}

fn parse_tei_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let vectors = json
        .as_array()
        .ok_or_else(|| anyhow!("Invalid TEI response: expected an array of vectors"))?;

    let first = vectors
        .first()
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("Invalid TEI response: empty embedding array"))?;

    Ok(first
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

fn check_dims(vector: Vec<f32>, dims: usize) -> EngineResult<Vec<f32>> {
    if vector.len() != dims {
        return Err(EngineError::validation(format!(
            "encoder returned {} dims, expected {}",
            vector.len(),
            dims
        )));
    }
    Ok(vector)
}

/// Create the appropriate [`EmbeddingEncoder`] based on configuration.
///
/// | Config Value | Encoder |
/// |-------------|---------|
/// | `"disabled"` | [`DisabledEncoder`] |
/// | `"openai"` | [`OpenAiEncoder`] |
/// | `"tei"` | [`TeiEncoder`] |
pub fn create_encoder(
    config: &EncoderConfig,
    dims: usize,
) -> Result<std::sync::Arc<dyn EmbeddingEncoder>> {
    match config.provider.as_str() {
        "disabled" => Ok(std::sync::Arc::new(DisabledEncoder { dims })),
        "openai" => Ok(std::sync::Arc::new(OpenAiEncoder::new(config, dims)?)),
        "tei" => Ok(std::sync::Arc::new(TeiEncoder::new(config, dims)?)),
        other => bail!("Unknown encoder provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// a BLOB of `vec.len() × 4` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values
/// from the byte slice.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
