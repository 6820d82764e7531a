//! Greedy similarity grouping for biased articles.
//!
//! FILTERED articles believed to cover the same event get a shared cluster
//! id. The heuristic is deliberately simple — brute-force cosine
//! comparison against recent, already-grouped biased articles, independent
//! of the vector index:
//!
//! 1. Candidates: FILTERED articles inside the recency window that already
//!    carry a cluster id, excluding the article itself.
//! 2. Track the maximum cosine similarity and its cluster id.
//! 3. At or above the threshold: join that cluster.
//! 4. Otherwise: the article's own id becomes its cluster id, lazily
//!    starting a singleton group that later arrivals may join.
//!
//! Absorption is one-directional only: two groups that start out separate
//! are never merged retroactively, even if later articles sit between
//! them. Downstream consumers rely on cluster ids staying stable, so this
//! is a documented property rather than something to correct here.

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::config::ClusteringConfig;
use crate::embedding::cosine_similarity;
use crate::error::{EngineError, EngineResult};
use crate::store::Store;

/// Assigns biased articles to similarity groups.
pub struct ClusteringEngine {
    similarity_threshold: f32,
    recency_window: Duration,
}

impl ClusteringEngine {
    pub fn new(config: &ClusteringConfig) -> Self {
        Self {
            similarity_threshold: config.similarity_threshold,
            recency_window: Duration::hours(config.recency_window_hours),
        }
    }

    /// Assign `article_id` to a cluster and return the cluster id.
    ///
    /// A record that already carries a cluster id keeps it — once set, a
    /// cluster id is never reassigned.
    pub async fn assign(
        &self,
        store: &dyn Store,
        article_id: i64,
        vector: &[f32],
    ) -> EngineResult<i64> {
        let record = store
            .get_record(article_id)
            .await
            .map_err(EngineError::persistence)?
            .ok_or_else(|| {
                EngineError::not_found(format!("no analysis record for article {}", article_id))
            })?;
        if let Some(existing) = record.cluster_id {
            debug!(article_id, cluster_id = existing, "cluster id already set");
            return Ok(existing);
        }

        let since = Utc::now() - self.recency_window;
        let candidates = store
            .cluster_candidates(article_id, since)
            .await
            .map_err(EngineError::persistence)?;

        let mut best_similarity = -1.0f32;
        let mut target_cluster = None;
        for candidate in &candidates {
            let similarity = cosine_similarity(vector, &candidate.vector);
            if similarity > best_similarity {
                best_similarity = similarity;
                target_cluster = Some(candidate.cluster_id);
            }
        }

        let cluster_id = match target_cluster {
            Some(cluster_id) if best_similarity >= self.similarity_threshold => {
                info!(
                    article_id,
                    cluster_id,
                    similarity = best_similarity,
                    "joining existing cluster"
                );
                cluster_id
            }
            _ => {
                // No similar group nearby: the article's own id doubles as
                // a unique id for a fresh singleton group.
                info!(article_id, "starting new cluster");
                article_id
            }
        };

        store
            .set_cluster_id(article_id, cluster_id)
            .await
            .map_err(EngineError::persistence)?;
        Ok(cluster_id)
    }
}
