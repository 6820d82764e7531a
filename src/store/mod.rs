//! Storage abstraction for the analysis and recommendation engine.
//!
//! The [`Store`] trait defines every persistent-store operation the
//! pipeline, index, clustering, and recommendation layers need, enabling
//! pluggable backends (SQLite, in-memory for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{AnalysisOutcome, AnalysisRecord, AnalysisStatus, Article, ClusterCandidate};

/// Abstract storage backend.
///
/// All operations are async (via `async-trait`); the in-memory
/// implementation returns immediately-ready futures. Methods return
/// `anyhow::Result` — callers classify failures into the engine error
/// taxonomy at their own boundary.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_article`](Store::get_article) | Read an article (ingester-owned) |
/// | [`get_record`](Store::get_record) | Read an analysis record |
/// | [`set_status`](Store::set_status) | Write only the lifecycle status |
/// | [`persist_analysis`](Store::persist_analysis) | Atomically write one run's results |
/// | [`set_cluster_id`](Store::set_cluster_id) | Assign a biased article's group |
/// | [`load_embedding`](Store::load_embedding) | Read one stored vector |
/// | [`completed_embeddings`](Store::completed_embeddings) | Bulk-load vectors for index build |
/// | [`cluster_candidates`](Store::cluster_candidates) | Recent grouped biased articles |
/// | [`read_history`](Store::read_history) | Article ids a user has read |
/// | [`category_preferences`](Store::category_preferences) | Cold-start categories |
/// | [`completed_by_categories`](Store::completed_by_categories) | Category-ranked article ids |
/// | [`filter_recommendable`](Store::filter_recommendable) | Order-preserving result filter |
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch an article by id.
    async fn get_article(&self, article_id: i64) -> Result<Option<Article>>;

    /// Fetch the analysis record for an article.
    async fn get_record(&self, article_id: i64) -> Result<Option<AnalysisRecord>>;

    /// Overwrite the record's status. Used for the PROCESSING claim and for
    /// the best-effort FAILED marking; both are deliberately single-column
    /// writes in their own short transaction.
    async fn set_status(&self, article_id: i64, status: AnalysisStatus) -> Result<()>;

    /// Atomically persist one successful run: replace the keyword set,
    /// upsert the embedding, and write bias label/score plus the terminal
    /// status. Either everything commits or nothing does.
    async fn persist_analysis(&self, article_id: i64, outcome: &AnalysisOutcome) -> Result<()>;

    /// Write the record's cluster id.
    async fn set_cluster_id(&self, article_id: i64, cluster_id: i64) -> Result<()>;

    /// Load the stored embedding for an article, if any.
    async fn load_embedding(&self, article_id: i64) -> Result<Option<Vec<f32>>>;

    /// Load `(article_id, vector)` for every COMPLETED record. Source of
    /// truth for index rebuilds.
    async fn completed_embeddings(&self) -> Result<Vec<(i64, Vec<f32>)>>;

    /// FILTERED articles created at or after `since` that already carry a
    /// cluster id, excluding `exclude_id`.
    async fn cluster_candidates(
        &self,
        exclude_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClusterCandidate>>;

    /// Article ids in the user's read history, most recent first.
    async fn read_history(&self, user_id: i64) -> Result<Vec<i64>>;

    /// The user's preferred categories (cold start only).
    async fn category_preferences(&self, user_id: i64) -> Result<Vec<String>>;

    /// COMPLETED articles whose keyword set intersects `categories`, ranked
    /// by (match count desc, article recency desc), truncated to `limit`.
    async fn completed_by_categories(&self, categories: &[String], limit: i64)
        -> Result<Vec<i64>>;

    /// Filter `ids` down to articles that are safe to recommend: record
    /// COMPLETED, bias label not BIASED, and — when `since` is given —
    /// article created at or after it. Input order is preserved.
    async fn filter_recommendable(
        &self,
        ids: &[i64],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<i64>>;
}
