//! Core data models for the analysis and recommendation engine.
//!
//! These types represent the articles, per-article analysis records, and
//! intermediate results that flow through the processing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable article record, owned by the upstream ingester. The engine
/// only reads it.
#[derive(Debug, Clone)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of an article's analysis.
///
/// Transitions are monotonic along
/// `PENDING → PROCESSING → {COMPLETED, FILTERED, FAILED}`.
/// `FAILED` may be re-entered into `PROCESSING` by a later trigger;
/// `COMPLETED` and `FILTERED` are reached once and never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Filtered,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "PENDING",
            AnalysisStatus::Processing => "PROCESSING",
            AnalysisStatus::Completed => "COMPLETED",
            AnalysisStatus::Filtered => "FILTERED",
            AnalysisStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(AnalysisStatus::Pending),
            "PROCESSING" => Some(AnalysisStatus::Processing),
            "COMPLETED" => Some(AnalysisStatus::Completed),
            "FILTERED" => Some(AnalysisStatus::Filtered),
            "FAILED" => Some(AnalysisStatus::Failed),
            _ => None,
        }
    }

    /// True for states from which a new analysis run may start.
    pub fn is_runnable(&self) -> bool {
        matches!(self, AnalysisStatus::Pending | AnalysisStatus::Failed)
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier-assigned tag distinguishing neutral reporting from
/// opinionated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BiasLabel {
    Neutral,
    Biased,
    Unknown,
}

impl BiasLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BiasLabel::Neutral => "NEUTRAL",
            BiasLabel::Biased => "BIASED",
            BiasLabel::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEUTRAL" => Some(BiasLabel::Neutral),
            "BIASED" => Some(BiasLabel::Biased),
            "UNKNOWN" => Some(BiasLabel::Unknown),
            _ => None,
        }
    }
}

/// Bias classifier output: a label plus the confidence behind it.
#[derive(Debug, Clone)]
pub struct BiasVerdict {
    pub label: BiasLabel,
    pub score: f64,
}

/// Per-article analysis state, exactly one per article. Created in
/// `PENDING` by the ingester; mutated exclusively by the pipeline.
#[derive(Debug, Clone)]
pub struct AnalysisRecord {
    pub article_id: i64,
    pub status: AnalysisStatus,
    pub bias_label: Option<BiasLabel>,
    pub bias_score: Option<f64>,
    pub cluster_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Everything the compute stage produced for one article, handed to the
/// persist stage as a single unit so there are no partial writes.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub keywords: Vec<String>,
    pub embedding: Vec<f32>,
    pub bias: BiasVerdict,
    /// Terminal status for this run: `FILTERED` when biased, else `COMPLETED`.
    pub status: AnalysisStatus,
}

/// A recent biased article eligible as a grouping target: it already
/// carries a cluster id and a stored embedding.
#[derive(Debug, Clone)]
pub struct ClusterCandidate {
    pub article_id: i64,
    pub cluster_id: i64,
    pub vector: Vec<f32>,
}
