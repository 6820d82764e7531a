//! In-memory vector similarity index.
//!
//! [`VectorIndex`] holds the L2-normalized embedding of every COMPLETED
//! article and answers k-nearest-neighbor queries by inner product (equal
//! to cosine similarity once everything is unit length). It is a cache
//! with no independent durability: [`build`](VectorIndex::build) replaces
//! the whole thing from the persistent store at process start, and
//! [`add`](VectorIndex::add) keeps it current as the pipeline completes
//! articles.
//!
//! # Concurrency
//!
//! One exclusive `Mutex` guards all index state and is shared by `build`,
//! `add`, and `search` — no reader/writer distinction. Writes are rare
//! compared to reads, and the brute-force scan is short, so the coarse
//! lock stays uncontended in practice.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::store::Store;

struct IndexInner {
    /// Unit-length vectors in insertion order.
    vectors: Vec<Vec<f32>>,
    /// Dense position → article id mapping, parallel to `vectors`.
    ids: Vec<i64>,
}

/// Brute-force cosine similarity index over article embeddings.
pub struct VectorIndex {
    dims: usize,
    inner: Mutex<IndexInner>,
}

impl VectorIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            inner: Mutex::new(IndexInner {
                vectors: Vec::new(),
                ids: Vec::new(),
            }),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bulk initialization from the persistent store at startup.
    ///
    /// A full, exclusive replace: readers block until it finishes. Every
    /// vector is validated and normalized; the store is the source of
    /// truth, so a malformed row is an error rather than a skip.
    pub fn build(&self, entries: Vec<(i64, Vec<f32>)>) -> EngineResult<()> {
        let mut vectors = Vec::with_capacity(entries.len());
        let mut ids = Vec::with_capacity(entries.len());

        for (id, vector) in entries {
            let normalized = self.normalize(id, vector)?;
            vectors.push(normalized);
            ids.push(id);
        }

        let count = ids.len();
        let mut inner = self.inner.lock().unwrap();
        inner.vectors = vectors;
        inner.ids = ids;
        drop(inner);

        info!(count, dims = self.dims, "vector index built");
        Ok(())
    }

    /// Append one article's embedding.
    ///
    /// Rejects dimension mismatches and zero-magnitude vectors with
    /// [`EngineError::Validation`], leaving the index unchanged.
    pub fn add(&self, id: i64, vector: &[f32]) -> EngineResult<()> {
        let normalized = self.normalize(id, vector.to_vec())?;

        let mut inner = self.inner.lock().unwrap();
        inner.vectors.push(normalized);
        inner.ids.push(id);
        let count = inner.ids.len();
        drop(inner);

        debug!(article_id = id, count, "vector added to index");
        Ok(())
    }

    /// Top-k most similar articles to `query`.
    ///
    /// Returns `(score, article_id)` pairs in strictly descending score
    /// order; ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> EngineResult<Vec<(f32, i64)>> {
        let normalized = self.normalize(-1, query.to_vec())?;

        let inner = self.inner.lock().unwrap();
        let mut scored: Vec<(f32, i64)> = inner
            .vectors
            .iter()
            .zip(inner.ids.iter())
            .map(|(vector, id)| (dot(&normalized, vector), *id))
            .collect();
        drop(inner);

        // Stable sort: equal scores stay in insertion order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Articles similar to an existing one.
    ///
    /// The query embedding comes from the persistent store, not the cached
    /// copy; the queried article never appears in its own results.
    pub async fn search_by_article(
        &self,
        store: &dyn Store,
        article_id: i64,
        k: usize,
    ) -> EngineResult<Vec<(f32, i64)>> {
        let vector = store
            .load_embedding(article_id)
            .await
            .map_err(EngineError::persistence)?
            .ok_or_else(|| {
                EngineError::not_found(format!("no embedding for article {}", article_id))
            })?;

        let mut hits = self.search(&vector, k + 1)?;
        hits.retain(|(_, id)| *id != article_id);
        hits.truncate(k);
        Ok(hits)
    }

    /// Articles matching a user's taste profile.
    ///
    /// The profile is the unweighted arithmetic mean of the embeddings of
    /// everything the user has read. The candidate count is inflated so
    /// that removing already-read and stale articles still leaves k
    /// results; descending-similarity order is preserved throughout.
    pub async fn search_by_user_profile(
        &self,
        store: &dyn Store,
        user_id: i64,
        k: usize,
        freshness: Duration,
        candidate_factor: usize,
    ) -> EngineResult<Vec<(f32, i64)>> {
        let history = store
            .read_history(user_id)
            .await
            .map_err(EngineError::persistence)?;
        if history.is_empty() {
            return Err(EngineError::not_found(format!(
                "no read history for user {}",
                user_id
            )));
        }

        let mut profile = vec![0.0f32; self.dims];
        let mut used = 0usize;
        for article_id in &history {
            let vector = store
                .load_embedding(*article_id)
                .await
                .map_err(EngineError::persistence)?;
            if let Some(vector) = vector {
                if vector.len() != self.dims {
                    return Err(EngineError::validation(format!(
                        "stored embedding for article {} has {} dims, expected {}",
                        article_id,
                        vector.len(),
                        self.dims
                    )));
                }
                for (acc, v) in profile.iter_mut().zip(vector.iter()) {
                    *acc += v;
                }
                used += 1;
            }
        }
        if used == 0 {
            return Err(EngineError::not_found(format!(
                "no usable embeddings in read history for user {}",
                user_id
            )));
        }
        for v in profile.iter_mut() {
            *v /= used as f32;
        }

        let candidate_k = k * candidate_factor + history.len();
        let hits = self.search(&profile, candidate_k)?;

        let read: HashSet<i64> = history.into_iter().collect();
        let unread: Vec<(f32, i64)> = hits
            .into_iter()
            .filter(|(_, id)| !read.contains(id))
            .collect();

        let since = Utc::now() - freshness;
        let candidate_ids: Vec<i64> = unread.iter().map(|(_, id)| *id).collect();
        let fresh = store
            .filter_recommendable(&candidate_ids, Some(since))
            .await
            .map_err(EngineError::persistence)?;
        let fresh: HashSet<i64> = fresh.into_iter().collect();

        let mut results: Vec<(f32, i64)> = unread
            .into_iter()
            .filter(|(_, id)| fresh.contains(id))
            .collect();
        results.truncate(k);
        Ok(results)
    }

    /// Validate and L2-normalize a vector. `id` only feeds the error text
    /// (negative for query vectors).
    fn normalize(&self, id: i64, mut vector: Vec<f32>) -> EngineResult<Vec<f32>> {
        if vector.len() != self.dims {
            return Err(EngineError::validation(format!(
                "vector for {} has {} dims, expected {}",
                describe(id),
                vector.len(),
                self.dims
            )));
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm < f32::EPSILON {
            return Err(EngineError::validation(format!(
                "zero-magnitude vector for {}",
                describe(id)
            )));
        }

        for v in vector.iter_mut() {
            *v /= norm;
        }
        Ok(vector)
    }
}

fn describe(id: i64) -> String {
    if id < 0 {
        "query".to_string()
    } else {
        format!("article {}", id)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
