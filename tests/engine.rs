//! End-to-end engine tests over the in-memory store with stub AI
//! collaborators: trigger articles through the pipeline, then query the
//! recommendation surface.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use newslens::classifier::{BiasClassifier, KeywordTagger};
use newslens::config::{AnalysisConfig, Config, DbConfig, ServerConfig};
use newslens::embedding::EmbeddingEncoder;
use newslens::engine::Engine;
use newslens::error::{EngineError, EngineResult};
use newslens::index::VectorIndex;
use newslens::models::{AnalysisStatus, Article, BiasLabel, BiasVerdict};
use newslens::store::memory::MemoryStore;
use newslens::store::Store;

const DIMS: usize = 4;

/// Encoder stub: vectors are looked up by article body.
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

/// Classifier stub: bodies containing "slanted" are biased with the score
/// encoded after the marker, e.g. "slanted:0.92".
struct StubClassifier;

#[async_trait]
impl BiasClassifier for StubClassifier {
    async fn classify(&self, text: &str) -> EngineResult<BiasVerdict> {
        if let Some(pos) = text.find("slanted:") {
            let score: f64 = text[pos + 8..]
                .split_whitespace()
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.9);
            Ok(BiasVerdict {
                label: BiasLabel::Biased,
                score,
            })
        } else {
            Ok(BiasVerdict {
                label: BiasLabel::Neutral,
                score: 0.95,
            })
        }
    }
}

/// Tagger stub: a candidate label matches when it appears in the body.
struct StubTagger;

#[async_trait]
impl KeywordTagger for StubTagger {
    async fn tag(&self, text: &str, candidates: &[String]) -> EngineResult<Vec<String>> {
        Ok(candidates
            .iter()
            .filter(|c| text.contains(c.as_str()))
            .take(3)
            .cloned()
            .collect())
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    index: Arc<VectorIndex>,
    engine: Engine,
}

fn harness(vectors: &[(&str, Vec<f32>)]) -> Harness {
    let config = Config {
        db: DbConfig {
            path: ":memory:".into(),
        },
        analysis: AnalysisConfig {
            dims: DIMS,
            ..AnalysisConfig::default()
        },
        recommendation: Default::default(),
        clustering: Default::default(),
        encoder: Default::default(),
        classifier: Default::default(),
        tagger: Default::default(),
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
    };

    let store = Arc::new(MemoryStore::new());
    let index = Arc::new(VectorIndex::new(DIMS));
    let encoder = Arc::new(StubEncoder {
        by_body: vectors
            .iter()
            .map(|(body, v)| (body.to_string(), v.clone()))
            .collect(),
    });
    let engine = Engine::assemble(
        store.clone(),
        encoder,
        Arc::new(StubClassifier),
        Arc::new(StubTagger),
        index.clone(),
        &config,
    );
    Harness {
        store,
        index,
        engine,
    }
}

fn article(id: i64, body: &str, created_at: DateTime<Utc>) -> Article {
    Article {
        id,
        title: format!("article {}", id),
        body: body.to_string(),
        source_url: format!("https://news.example/{}", id),
        created_at,
    }
}

#[tokio::test]
async fn test_scenario_biased_pair_clusters_neutral_is_indexed() {
    let now = Utc::now();
    let h = harness(&[
        ("economy piece slanted:0.90", vec![1.0, 0.0, 0.0, 0.0]),
        // cos with the first vector ≈ 0.90, at the clustering threshold.
        ("economy piece slanted:0.92 redux", vec![0.9, 0.43589, 0.0, 0.0]),
        ("calm economy report", vec![0.0, 0.0, 1.0, 0.0]),
    ]);

    h.store
        .insert_article(article(1, "economy piece slanted:0.90", now));
    h.store
        .insert_article(article(2, "economy piece slanted:0.92 redux", now));
    h.store.insert_article(article(3, "calm economy report", now));

    assert_eq!(
        h.engine.pipeline.process(1).await.unwrap(),
        AnalysisStatus::Filtered
    );
    assert_eq!(
        h.engine.pipeline.process(2).await.unwrap(),
        AnalysisStatus::Filtered
    );
    assert_eq!(
        h.engine.pipeline.process(3).await.unwrap(),
        AnalysisStatus::Completed
    );

    let a = h.store.get_record(1).await.unwrap().unwrap();
    let b = h.store.get_record(2).await.unwrap().unwrap();
    let c = h.store.get_record(3).await.unwrap().unwrap();

    // The two biased articles share one cluster id.
    assert!(a.cluster_id.is_some());
    assert_eq!(a.cluster_id, b.cluster_id);

    // The neutral article completed, has no cluster id, and is the only
    // vector in the similarity index.
    assert_eq!(c.status, AnalysisStatus::Completed);
    assert_eq!(c.cluster_id, None);
    assert_eq!(h.index.len(), 1);
}

#[tokio::test]
async fn test_terminal_record_reprocessing_is_a_no_op() {
    let now = Utc::now();
    let h = harness(&[("calm economy report", vec![1.0, 0.0, 0.0, 0.0])]);
    h.store.insert_article(article(1, "calm economy report", now));

    let first = h.engine.pipeline.process(1).await.unwrap();
    let second = h.engine.pipeline.process(1).await.unwrap();
    assert_eq!(first, AnalysisStatus::Completed);
    assert_eq!(first, second);
    assert_eq!(h.index.len(), 1);
}

#[tokio::test]
async fn test_similar_recommendations_are_fresh_and_unbiased() {
    let now = Utc::now();
    let h = harness(&[
        ("calm economy report", vec![1.0, 0.0, 0.0, 0.0]),
        ("calm economy report two", vec![0.95, 0.05, 0.0, 0.0]),
        ("stale economy report", vec![0.99, 0.01, 0.0, 0.0]),
        ("economy rant slanted:0.95", vec![0.97, 0.03, 0.0, 0.0]),
    ]);

    h.store.insert_article(article(1, "calm economy report", now));
    h.store
        .insert_article(article(2, "calm economy report two", now));
    // Highly similar but older than the freshness window.
    h.store.insert_article(article(
        3,
        "stale economy report",
        now - Duration::days(10),
    ));
    // Highly similar but biased.
    h.store
        .insert_article(article(4, "economy rant slanted:0.95", now));

    for id in 1..=4 {
        h.engine.pipeline.process(id).await.unwrap();
    }

    let ids = h.engine.recommender.recommend_similar(1, 5).await.unwrap();
    assert_eq!(ids, vec![2]);
}

#[tokio::test]
async fn test_user_feed_switches_from_categories_to_profile() {
    let now = Utc::now();
    let mut bodies: Vec<(String, Vec<f32>)> = Vec::new();
    for i in 0..14 {
        bodies.push((
            format!("calm economy report {}", i),
            vec![1.0, 0.01 * i as f32, 0.0, 0.0],
        ));
    }
    bodies.push((
        "calm sports report".to_string(),
        vec![0.0, 0.0, 1.0, 0.0],
    ));
    let refs: Vec<(&str, Vec<f32>)> = bodies
        .iter()
        .map(|(b, v)| (b.as_str(), v.clone()))
        .collect();
    let h = harness(&refs);

    for (i, (body, _)) in bodies.iter().enumerate() {
        let id = i as i64 + 1;
        h.store.insert_article(article(id, body, now));
        h.engine.pipeline.process(id).await.unwrap();
    }

    let user = 7;
    h.store.set_preferences(user, vec!["sports".to_string()]);

    // Cold start: no read history, so the sports preference drives the
    // feed even though every economy vector dominates the index.
    let ids = h.engine.recommender.recommend_for_user(user, 5).await.unwrap();
    assert_eq!(ids, vec![15]);

    // Eleven reads of economy articles flip the user to warm start: the
    // profile now points at economy, and read articles are excluded.
    for id in 1..=11 {
        h.store.add_read(user, id, now);
    }
    let ids = h.engine.recommender.recommend_for_user(user, 5).await.unwrap();
    assert!(!ids.is_empty());
    for id in 1..=11 {
        assert!(!ids.contains(&id), "read article {} leaked through", id);
    }
    // Economy articles outrank the orthogonal sports article.
    assert!(ids.contains(&12) || ids.contains(&13) || ids.contains(&14));
    assert_ne!(ids[0], 15);
}

#[tokio::test]
async fn test_keywords_come_from_candidate_labels() {
    let now = Utc::now();
    let h = harness(&[(
        "economy and politics coverage",
        vec![1.0, 0.0, 0.0, 0.0],
    )]);
    h.store
        .insert_article(article(1, "economy and politics coverage", now));
    h.engine.pipeline.process(1).await.unwrap();

    let ids = h
        .engine
        .recommender
        .recommend_by_category(&["economy".to_string()], 5)
        .await
        .unwrap();
    assert_eq!(ids, vec![1]);

    let ids = h
        .engine
        .recommender
        .recommend_by_category(&["sports".to_string()], 5)
        .await
        .unwrap();
    assert!(ids.is_empty());
}
