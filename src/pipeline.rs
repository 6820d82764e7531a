//! Per-article analysis state machine.
//!
//! [`AnalysisPipeline::process`] drives one article through
//! `PENDING → PROCESSING → {COMPLETED, FILTERED, FAILED}` in three stages:
//!
//! 1. **Fetch/guard** — load the record and article, bail out on missing
//!    data or a non-runnable status, then persist PROCESSING before any AI
//!    work so concurrent duplicate triggers observe the claim.
//! 2. **Compute** — keyword tagging, bias classification, and embedding
//!    encoding. The embedding is always computed, independent of the bias
//!    outcome, because clustering needs it for biased articles too. Any
//!    failure here terminalizes the record as FAILED with no partial
//!    writes.
//! 3. **Persist** — one transaction replaces the keyword set, upserts the
//!    embedding, and writes bias label/score plus the terminal status.
//!    Biased articles end FILTERED and are handed to the clustering
//!    engine; everything else ends COMPLETED and lands in the vector
//!    index. A persist failure rolls back and attempts a best-effort
//!    FAILED marking in a separate short transaction.
//!
//! The status guard spans two store round-trips and is not linearizable:
//! two triggers racing on a PENDING record may both start computing. The
//! final status write is always the last, fully-formed transaction, so
//! the race wastes AI work but never corrupts state. Exactly-once
//! semantics would need a store-level claim (row lock or conditional
//! update), which a single-writer deployment does not justify.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classifier::{BiasClassifier, KeywordTagger};
use crate::cluster::ClusteringEngine;
use crate::config::AnalysisConfig;
use crate::embedding::EmbeddingEncoder;
use crate::error::{EngineError, EngineResult};
use crate::index::VectorIndex;
use crate::models::{AnalysisOutcome, AnalysisStatus, Article, BiasLabel};
use crate::store::Store;

/// Drives per-article AI processing and feeds the index and clustering
/// engine.
pub struct AnalysisPipeline {
    store: Arc<dyn Store>,
    encoder: Arc<dyn EmbeddingEncoder>,
    classifier: Arc<dyn BiasClassifier>,
    tagger: Arc<dyn KeywordTagger>,
    index: Arc<VectorIndex>,
    clustering: ClusteringEngine,
    candidate_labels: Vec<String>,
    bias_excerpt_chars: usize,
}

impl AnalysisPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        encoder: Arc<dyn EmbeddingEncoder>,
        classifier: Arc<dyn BiasClassifier>,
        tagger: Arc<dyn KeywordTagger>,
        index: Arc<VectorIndex>,
        clustering: ClusteringEngine,
        config: &AnalysisConfig,
    ) -> Self {
        Self {
            store,
            encoder,
            classifier,
            tagger,
            index,
            clustering,
            candidate_labels: config.candidate_labels.clone(),
            bias_excerpt_chars: config.bias_excerpt_chars,
        }
    }

    /// Run the full analysis for one article and return its final status.
    ///
    /// Idempotent against duplicate triggers: a record that is already
    /// PROCESSING, COMPLETED, or FILTERED is left untouched and its
    /// current status returned. FAILED records are retried.
    pub async fn process(&self, article_id: i64) -> EngineResult<AnalysisStatus> {
        // ---- Stage 1: fetch and claim ----
        let record = self
            .store
            .get_record(article_id)
            .await
            .map_err(EngineError::persistence)?
            .ok_or_else(|| {
                EngineError::not_found(format!("no analysis record for article {}", article_id))
            })?;

        match record.status {
            AnalysisStatus::Processing => {
                // Duplicate trigger while a run is underway.
                debug!(article_id, "{}", EngineError::Conflict(article_id));
                return Ok(AnalysisStatus::Processing);
            }
            AnalysisStatus::Completed | AnalysisStatus::Filtered => {
                debug!(article_id, status = %record.status, "already analyzed");
                return Ok(record.status);
            }
            AnalysisStatus::Pending | AnalysisStatus::Failed => {}
        }

        let article = self
            .store
            .get_article(article_id)
            .await
            .map_err(EngineError::persistence)?
            .ok_or_else(|| EngineError::not_found(format!("no article {}", article_id)))?;

        // Persist the claim before any AI work so concurrent duplicate
        // triggers observe the guard.
        self.store
            .set_status(article_id, AnalysisStatus::Processing)
            .await
            .map_err(EngineError::persistence)?;
        info!(article_id, "analysis started");

        // ---- Stage 2: compute ----
        let outcome = match self.compute(&article).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(article_id, error = %err, "compute stage failed");
                self.mark_failed(article_id).await;
                return Err(err);
            }
        };

        // ---- Stage 3: persist ----
        if let Err(err) = self.store.persist_analysis(article_id, &outcome).await {
            let err = EngineError::persistence(err);
            warn!(article_id, error = %err, "persist stage failed");
            self.mark_failed(article_id).await;
            return Err(err);
        }

        if outcome.bias.label == BiasLabel::Biased {
            info!(
                article_id,
                score = outcome.bias.score,
                "article filtered as biased"
            );
            match self
                .clustering
                .assign(self.store.as_ref(), article_id, &outcome.embedding)
                .await
            {
                Ok(cluster_id) => debug!(article_id, cluster_id, "cluster assigned"),
                // The record is already FILTERED; a missing cluster id is
                // recoverable and must not fail the run.
                Err(err) => warn!(article_id, error = %err, "cluster assignment failed"),
            }
        } else {
            // The index is a cache: if the add fails the vector is still
            // in the store and returns at the next rebuild.
            match self.index.add(article_id, &outcome.embedding) {
                Ok(()) => info!(article_id, "analysis completed and indexed"),
                Err(err) => warn!(article_id, error = %err, "index add failed"),
            }
        }

        Ok(outcome.status)
    }

    /// Run the three AI collaborators over an article's body.
    async fn compute(&self, article: &Article) -> EngineResult<AnalysisOutcome> {
        let keywords = self
            .tagger
            .tag(&article.body, &self.candidate_labels)
            .await?;

        // The bias model has a short context; it only sees the lede.
        let excerpt: String = article.body.chars().take(self.bias_excerpt_chars).collect();
        let bias = self.classifier.classify(&excerpt).await?;

        let embedding = self.encoder.encode(&article.body).await?;
        if embedding.len() != self.index.dims() {
            return Err(EngineError::validation(format!(
                "embedding for article {} has {} dims, expected {}",
                article.id,
                embedding.len(),
                self.index.dims()
            )));
        }

        let status = if bias.label == BiasLabel::Biased {
            AnalysisStatus::Filtered
        } else {
            AnalysisStatus::Completed
        };

        Ok(AnalysisOutcome {
            keywords,
            embedding,
            bias,
            status,
        })
    }

    /// Best-effort FAILED marking in its own short transaction. A
    /// secondary failure here is logged, never escalated.
    async fn mark_failed(&self, article_id: i64) {
        if let Err(err) = self
            .store
            .set_status(article_id, AnalysisStatus::Failed)
            .await
        {
            warn!(article_id, error = %err, "could not mark analysis as failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusteringConfig;
    use crate::models::BiasVerdict;
    use crate::store::memory::MemoryStore;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;

    const DIMS: usize = 4;

    /// Encoder stub: looks vectors up by article body.
    struct StubEncoder {
        by_body: HashMap<String, Vec<f32>>,
    }

    #[async_trait]
    impl EmbeddingEncoder for StubEncoder {
        fn dims(&self) -> usize {
            DIMS
        }

        async fn encode(&self, text: &str) -> EngineResult<Vec<f32>> {
            self.by_body
                .get(text)
                .cloned()
                .ok_or_else(|| EngineError::compute(anyhow!("no stub vector for '{}'", text)))
        }
    }

    /// Classifier stub: bodies containing "slanted" are biased.
    struct StubClassifier;

    #[async_trait]
    impl BiasClassifier for StubClassifier {
        async fn classify(&self, text: &str) -> EngineResult<BiasVerdict> {
            if text.contains("slanted") {
                Ok(BiasVerdict {
                    label: BiasLabel::Biased,
                    score: 0.92,
                })
            } else {
                Ok(BiasVerdict {
                    label: BiasLabel::Neutral,
                    score: 0.95,
                })
            }
        }
    }

    struct StubTagger;

    #[async_trait]
    impl KeywordTagger for StubTagger {
        async fn tag(&self, _text: &str, candidates: &[String]) -> EngineResult<Vec<String>> {
            Ok(candidates.iter().take(3).cloned().collect())
        }
    }

    /// Tagger stub that always fails, to drive the compute stage into
    /// FAILED.
    struct FailingTagger;

    #[async_trait]
    impl KeywordTagger for FailingTagger {
        async fn tag(&self, _text: &str, _candidates: &[String]) -> EngineResult<Vec<String>> {
            Err(EngineError::compute(anyhow!("tagger offline")))
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        index: Arc<VectorIndex>,
        pipeline: AnalysisPipeline,
    }

    fn fixture(vectors: &[(&str, Vec<f32>)]) -> Fixture {
        fixture_with_tagger(vectors, Arc::new(StubTagger))
    }

    fn fixture_with_tagger(
        vectors: &[(&str, Vec<f32>)],
        tagger: Arc<dyn KeywordTagger>,
    ) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(VectorIndex::new(DIMS));
        let encoder = Arc::new(StubEncoder {
            by_body: vectors
                .iter()
                .map(|(body, v)| (body.to_string(), v.clone()))
                .collect(),
        });
        let config = AnalysisConfig {
            dims: DIMS,
            ..AnalysisConfig::default()
        };
        let pipeline = AnalysisPipeline::new(
            store.clone(),
            encoder,
            Arc::new(StubClassifier),
            tagger,
            index.clone(),
            ClusteringEngine::new(&ClusteringConfig::default()),
            &config,
        );
        Fixture {
            store,
            index,
            pipeline,
        }
    }

    fn article(id: i64, body: &str) -> Article {
        Article {
            id,
            title: format!("article {}", id),
            body: body.to_string(),
            source_url: format!("https://news.example/{}", id),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_neutral_article_completes_and_is_indexed() {
        let f = fixture(&[("calm report", vec![1.0, 0.0, 0.0, 0.0])]);
        f.store.insert_article(article(1, "calm report"));

        let status = f.pipeline.process(1).await.unwrap();
        assert_eq!(status, AnalysisStatus::Completed);

        let record = f.store.get_record(1).await.unwrap().unwrap();
        assert_eq!(record.status, AnalysisStatus::Completed);
        assert_eq!(record.bias_label, Some(BiasLabel::Neutral));
        assert_eq!(record.cluster_id, None);
        assert_eq!(f.index.len(), 1);
        assert_eq!(f.store.keywords_of(1).len(), 3);
    }

    #[tokio::test]
    async fn test_biased_article_is_filtered_and_clustered_not_indexed() {
        let f = fixture(&[("slanted rant", vec![0.0, 1.0, 0.0, 0.0])]);
        f.store.insert_article(article(1, "slanted rant"));

        let status = f.pipeline.process(1).await.unwrap();
        assert_eq!(status, AnalysisStatus::Filtered);

        let record = f.store.get_record(1).await.unwrap().unwrap();
        assert_eq!(record.status, AnalysisStatus::Filtered);
        assert_eq!(record.bias_label, Some(BiasLabel::Biased));
        assert_eq!(record.cluster_id, Some(1));
        assert!(f.index.is_empty());
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let f = fixture(&[]);
        let err = f.pipeline.process(99).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_processing_twice_is_idempotent() {
        let f = fixture(&[("calm report", vec![1.0, 0.0, 0.0, 0.0])]);
        f.store.insert_article(article(1, "calm report"));

        let first = f.pipeline.process(1).await.unwrap();
        let keywords_after_first = f.store.keywords_of(1);
        let second = f.pipeline.process(1).await.unwrap();

        assert_eq!(first, second);
        // No additional writes: the index holds one vector, keywords are
        // untouched.
        assert_eq!(f.index.len(), 1);
        assert_eq!(f.store.keywords_of(1), keywords_after_first);
    }

    #[tokio::test]
    async fn test_processing_status_blocks_duplicate_trigger() {
        let f = fixture(&[("calm report", vec![1.0, 0.0, 0.0, 0.0])]);
        f.store.insert_article(article(1, "calm report"));
        f.store
            .set_status(1, AnalysisStatus::Processing)
            .await
            .unwrap();

        let status = f.pipeline.process(1).await.unwrap();
        assert_eq!(status, AnalysisStatus::Processing);
        assert!(f.index.is_empty());
    }

    #[tokio::test]
    async fn test_compute_failure_marks_failed() {
        let f = fixture_with_tagger(
            &[("calm report", vec![1.0, 0.0, 0.0, 0.0])],
            Arc::new(FailingTagger),
        );
        f.store.insert_article(article(1, "calm report"));

        let err = f.pipeline.process(1).await.unwrap_err();
        assert!(matches!(err, EngineError::Compute(_)));

        let record = f.store.get_record(1).await.unwrap().unwrap();
        assert_eq!(record.status, AnalysisStatus::Failed);
        // No partial writes.
        assert!(f.store.keywords_of(1).is_empty());
        assert!(f.index.is_empty());
    }

    #[tokio::test]
    async fn test_failed_record_is_retryable() {
        let f = fixture(&[("calm report", vec![1.0, 0.0, 0.0, 0.0])]);
        f.store.insert_article(article(1, "calm report"));
        f.store.set_status(1, AnalysisStatus::Failed).await.unwrap();

        let status = f.pipeline.process(1).await.unwrap();
        assert_eq!(status, AnalysisStatus::Completed);
    }

    #[tokio::test]
    async fn test_wrong_dimension_embedding_fails_the_run() {
        let f = fixture(&[("calm report", vec![1.0, 0.0])]);
        f.store.insert_article(article(1, "calm report"));

        let err = f.pipeline.process(1).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        let record = f.store.get_record(1).await.unwrap().unwrap();
        assert_eq!(record.status, AnalysisStatus::Failed);
    }

    /// The scenario from the design review: two biased articles whose
    /// vectors sit at cosine 0.90 share a cluster; the neutral third is
    /// the only one indexed.
    #[tokio::test]
    async fn test_three_article_scenario() {
        let f = fixture(&[
            ("slanted take one", vec![1.0, 0.0, 0.0, 0.0]),
            ("slanted take two", vec![0.9, 0.43589, 0.0, 0.0]),
            ("calm report", vec![0.0, 0.0, 1.0, 0.0]),
        ]);
        f.store.insert_article(article(1, "slanted take one"));
        f.store.insert_article(article(2, "slanted take two"));
        f.store.insert_article(article(3, "calm report"));

        assert_eq!(
            f.pipeline.process(1).await.unwrap(),
            AnalysisStatus::Filtered
        );
        assert_eq!(
            f.pipeline.process(2).await.unwrap(),
            AnalysisStatus::Filtered
        );
        assert_eq!(
            f.pipeline.process(3).await.unwrap(),
            AnalysisStatus::Completed
        );

        let a = f.store.get_record(1).await.unwrap().unwrap();
        let b = f.store.get_record(2).await.unwrap().unwrap();
        let c = f.store.get_record(3).await.unwrap().unwrap();

        assert_eq!(a.cluster_id, Some(1));
        assert_eq!(b.cluster_id, a.cluster_id);
        assert_eq!(c.status, AnalysisStatus::Completed);
        assert_eq!(c.cluster_id, None);

        assert_eq!(f.index.len(), 1);
        let hits = f.index.search(&[0.0, 0.0, 1.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, 3);
    }
}
