//! Bias classifier and keyword tagger backed by zero-shot classification.
//!
//! Both collaborators speak the same wire protocol — a Hugging Face style
//! zero-shot inference endpoint that ranks candidate labels against a text:
//!
//! ```json
//! POST {url}
//! {"inputs": "...", "parameters": {"candidate_labels": ["a", "b"],
//!  "multi_label": false, "hypothesis_template": "This text is {}."}}
//! ```
//!
//! responding with parallel `labels` / `scores` arrays in rank order.
//! [`HttpBiasClassifier`] runs a two-label NLI comparison and maps the
//! scores to a [`BiasVerdict`]; [`HttpKeywordTagger`] ranks the configured
//! candidate labels multi-label and keeps the top k.
//!
//! Retry/backoff policy matches the embedding encoders: 429/5xx and
//! network errors retry with exponential backoff, other 4xx fail fast.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ClassifierConfig, TaggerConfig};
use crate::error::{EngineError, EngineResult};
use crate::models::{BiasLabel, BiasVerdict};

/// External collaborator that labels a text as neutral or biased.
#[async_trait]
pub trait BiasClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> EngineResult<BiasVerdict>;
}

/// External collaborator that ranks candidate labels against a text and
/// returns the best-matching subset in rank order.
#[async_trait]
pub trait KeywordTagger: Send + Sync {
    async fn tag(&self, text: &str, candidates: &[String]) -> EngineResult<Vec<String>>;
}

/// Shared HTTP client for zero-shot classification endpoints.
struct ZeroShotClient {
    url: String,
    hypothesis_template: Option<String>,
    client: reqwest::Client,
    max_retries: u32,
}

impl ZeroShotClient {
    fn new(
        url: String,
        hypothesis_template: Option<String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            url,
            hypothesis_template,
            client,
            max_retries,
        })
    }

    /// Rank `labels` against `text`, returning `(label, score)` pairs in
    /// descending score order as produced by the model.
    async fn rank(
        &self,
        text: &str,
        labels: &[String],
        multi_label: bool,
    ) -> EngineResult<Vec<(String, f64)>> {
        let mut parameters = serde_json::json!({
            "candidate_labels": labels,
            "multi_label": multi_label,
        });
        if let Some(template) = &self.hypothesis_template {
            parameters["hypothesis_template"] = serde_json::json!(template);
        }
        let body = serde_json::json!({
            "inputs": text,
            "parameters": parameters,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.url)
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
                        return parse_zero_shot_response(&json).map_err(EngineError::Compute);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow!("zero-shot API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(EngineError::compute(anyhow!(
                        "zero-shot API error {}: {}",
                        status,
                        body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(anyhow!(
                        "zero-shot connection error (is the server running at {}?): {}",
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(EngineError::Compute(
            last_err.unwrap_or_else(|| anyhow!("classification failed after retries")),
        ))
    }
}

fn parse_zero_shot_response(json: &serde_json::Value) -> Result<Vec<(String, f64)>> {
    let labels = json
        .get("labels")
        .and_then(|l| l.as_array())
        .ok_or_else(|| anyhow!("Invalid zero-shot response: missing labels array"))?;
    let scores = json
        .get("scores")
        .and_then(|s| s.as_array())
        .ok_or_else(|| anyhow!("Invalid zero-shot response: missing scores array"))?;

    if labels.len() != scores.len() {
        bail!("Invalid zero-shot response: labels/scores length mismatch");
    }

    labels
        .iter()
        .zip(scores.iter())
        .map(|(l, s)| {
            let label = l
                .as_str()
                .ok_or_else(|| anyhow!("Invalid zero-shot response: non-string label"))?;
            let score = s
                .as_f64()
                .ok_or_else(|| anyhow!("Invalid zero-shot response: non-numeric score"))?;
            Ok((label.to_string(), score))
        })
        .collect()
}

/// Map the two-label NLI scores to a verdict.
///
/// BIASED only when the biased-class score clears `threshold`; everything
/// else passes as NEUTRAL with the stronger of the neutral score and the
/// biased-score complement.
fn verdict_from_scores(neutral: f64, biased: f64, threshold: f64) -> BiasVerdict {
    if biased >= threshold {
        BiasVerdict {
            label: BiasLabel::Biased,
            score: biased,
        }
    } else {
        BiasVerdict {
            label: BiasLabel::Neutral,
            score: if neutral > biased { neutral } else { 1.0 - biased },
        }
    }
}

/// Bias classifier over a zero-shot endpoint, comparing a neutral against
/// a biased hypothesis label.
pub struct HttpBiasClassifier {
    zero_shot: ZeroShotClient,
    neutral_label: String,
    biased_label: String,
    threshold: f64,
}

impl HttpBiasClassifier {
    pub fn new(config: &ClassifierConfig, threshold: f64) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow!("classifier.url required for zero-shot classifier"))?;
        Ok(Self {
            zero_shot: ZeroShotClient::new(
                url,
                config.hypothesis_template.clone(),
                config.timeout_secs,
                config.max_retries,
            )?,
            neutral_label: config.neutral_label.clone(),
            biased_label: config.biased_label.clone(),
            threshold,
        })
    }
}

#[async_trait]
impl BiasClassifier for HttpBiasClassifier {
    async fn classify(&self, text: &str) -> EngineResult<BiasVerdict> {
        if text.trim().is_empty() {
            return Ok(BiasVerdict {
                label: BiasLabel::Unknown,
                score: 0.0,
            });
        }

        let labels = vec![self.neutral_label.clone(), self.biased_label.clone()];
        let ranked = self.zero_shot.rank(text, &labels, false).await?;

        let mut neutral = 0.0;
        let mut biased = 0.0;
        for (label, score) in &ranked {
            if *label == self.neutral_label {
                neutral = *score;
            } else if *label == self.biased_label {
                biased = *score;
            }
        }

        Ok(verdict_from_scores(neutral, biased, self.threshold))
    }
}

/// Keyword tagger over a zero-shot endpoint: multi-label ranking of the
/// candidate categories, truncated to the top k.
pub struct HttpKeywordTagger {
    zero_shot: ZeroShotClient,
    top_k: usize,
}

impl HttpKeywordTagger {
    pub fn new(config: &TaggerConfig, top_k: usize) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow!("tagger.url required for zero-shot tagger"))?;
        Ok(Self {
            zero_shot: ZeroShotClient::new(
                url,
                config.hypothesis_template.clone(),
                config.timeout_secs,
                config.max_retries,
            )?,
            top_k,
        })
    }
}

#[async_trait]
impl KeywordTagger for HttpKeywordTagger {
    async fn tag(&self, text: &str, candidates: &[String]) -> EngineResult<Vec<String>> {
        if text.trim().is_empty() || candidates.is_empty() {
            return Ok(Vec::new());
        }

        let ranked = self.zero_shot.rank(text, candidates, true).await?;

        Ok(ranked
            .into_iter()
            .take(self.top_k)
            .map(|(label, _)| label)
            .collect())
    }
}

/// A no-op classifier that always returns errors, for deployments without
/// a configured inference endpoint.
pub struct DisabledBiasClassifier;

#[async_trait]
impl BiasClassifier for DisabledBiasClassifier {
    async fn classify(&self, _text: &str) -> EngineResult<BiasVerdict> {
        Err(EngineError::compute(anyhow!("bias classifier is disabled")))
    }
}

/// A no-op tagger that always returns errors.
pub struct DisabledKeywordTagger;

#[async_trait]
impl KeywordTagger for DisabledKeywordTagger {
    async fn tag(&self, _text: &str, _candidates: &[String]) -> EngineResult<Vec<String>> {
        Err(EngineError::compute(anyhow!("keyword tagger is disabled")))
    }
}

/// Create a [`BiasClassifier`] from configuration.
pub fn create_bias_classifier(
    config: &ClassifierConfig,
    threshold: f64,
) -> Result<Arc<dyn BiasClassifier>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledBiasClassifier)),
        "zero-shot" => Ok(Arc::new(HttpBiasClassifier::new(config, threshold)?)),
        other => bail!("Unknown classifier provider: {}", other),
    }
}

/// Create a [`KeywordTagger`] from configuration.
pub fn create_keyword_tagger(config: &TaggerConfig, top_k: usize) -> Result<Arc<dyn KeywordTagger>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledKeywordTagger)),
        "zero-shot" => Ok(Arc::new(HttpKeywordTagger::new(config, top_k)?)),
        other => bail!("Unknown tagger provider: {}", other),
    }
}
