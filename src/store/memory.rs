//! In-memory [`Store`] implementation for tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! The non-trait helpers (`insert_article`, `add_read`, `set_preferences`)
//! stand in for the upstream ingester, which owns those writes in a real
//! deployment.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    AnalysisOutcome, AnalysisRecord, AnalysisStatus, Article, BiasLabel, ClusterCandidate,
};

use super::Store;

/// In-memory store for tests.
pub struct MemoryStore {
    articles: RwLock<HashMap<i64, Article>>,
    records: RwLock<HashMap<i64, AnalysisRecord>>,
    keywords: RwLock<HashMap<i64, Vec<String>>>,
    vectors: RwLock<HashMap<i64, Vec<f32>>>,
    reads: RwLock<Vec<(i64, i64, DateTime<Utc>)>>,
    preferences: RwLock<HashMap<i64, Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            articles: RwLock::new(HashMap::new()),
            records: RwLock::new(HashMap::new()),
            keywords: RwLock::new(HashMap::new()),
            vectors: RwLock::new(HashMap::new()),
            reads: RwLock::new(Vec::new()),
            preferences: RwLock::new(HashMap::new()),
        }
    }

    /// Insert an article together with its PENDING analysis record, the
    /// way the upstream ingester does. The record inherits the article's
    /// creation timestamp.
    pub fn insert_article(&self, article: Article) {
        let record = AnalysisRecord {
            article_id: article.id,
            status: AnalysisStatus::Pending,
            bias_label: None,
            bias_score: None,
            cluster_id: None,
            created_at: article.created_at,
        };
        self.records.write().unwrap().insert(article.id, record);
        self.articles.write().unwrap().insert(article.id, article);
    }

    /// Append a read-history row for a user.
    pub fn add_read(&self, user_id: i64, article_id: i64, read_at: DateTime<Utc>) {
        self.reads.write().unwrap().push((user_id, article_id, read_at));
    }

    /// Replace a user's preferred categories.
    pub fn set_preferences(&self, user_id: i64, categories: Vec<String>) {
        self.preferences.write().unwrap().insert(user_id, categories);
    }

    /// Stored keywords for a record (test inspection).
    pub fn keywords_of(&self, article_id: i64) -> Vec<String> {
        self.keywords
            .read()
            .unwrap()
            .get(&article_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_article(&self, article_id: i64) -> Result<Option<Article>> {
        Ok(self.articles.read().unwrap().get(&article_id).cloned())
    }

    async fn get_record(&self, article_id: i64) -> Result<Option<AnalysisRecord>> {
        Ok(self.records.read().unwrap().get(&article_id).cloned())
    }

    async fn set_status(&self, article_id: i64, status: AnalysisStatus) -> Result<()> {
        let mut records = self.records.write().unwrap();
        match records.get_mut(&article_id) {
            Some(record) => {
                record.status = status;
                Ok(())
            }
            None => bail!("no analysis record for article {}", article_id),
        }
    }

    async fn persist_analysis(&self, article_id: i64, outcome: &AnalysisOutcome) -> Result<()> {
        let mut records = self.records.write().unwrap();
        let record = match records.get_mut(&article_id) {
            Some(record) => record,
            None => bail!("no analysis record for article {}", article_id),
        };

        self.keywords
            .write()
            .unwrap()
            .insert(article_id, outcome.keywords.clone());
        self.vectors
            .write()
            .unwrap()
            .insert(article_id, outcome.embedding.clone());

        record.bias_label = Some(outcome.bias.label);
        record.bias_score = Some(outcome.bias.score);
        record.status = outcome.status;
        Ok(())
    }

    async fn set_cluster_id(&self, article_id: i64, cluster_id: i64) -> Result<()> {
        let mut records = self.records.write().unwrap();
        match records.get_mut(&article_id) {
            Some(record) => {
                record.cluster_id = Some(cluster_id);
                Ok(())
            }
            None => bail!("no analysis record for article {}", article_id),
        }
    }

    async fn load_embedding(&self, article_id: i64) -> Result<Option<Vec<f32>>> {
        Ok(self.vectors.read().unwrap().get(&article_id).cloned())
    }

    async fn completed_embeddings(&self) -> Result<Vec<(i64, Vec<f32>)>> {
        let records = self.records.read().unwrap();
        let vectors = self.vectors.read().unwrap();
        let mut out: Vec<(i64, Vec<f32>)> = records
            .values()
            .filter(|r| r.status == AnalysisStatus::Completed)
            .filter_map(|r| {
                vectors
                    .get(&r.article_id)
                    .map(|v| (r.article_id, v.clone()))
            })
            .collect();
        out.sort_by_key(|(id, _)| *id);
        Ok(out)
    }

    async fn cluster_candidates(
        &self,
        exclude_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClusterCandidate>> {
        let records = self.records.read().unwrap();
        let vectors = self.vectors.read().unwrap();
        let mut out: Vec<ClusterCandidate> = records
            .values()
            .filter(|r| {
                r.status == AnalysisStatus::Filtered
                    && r.article_id != exclude_id
                    && r.cluster_id.is_some()
                    && r.created_at >= since
            })
            .filter_map(|r| {
                vectors.get(&r.article_id).map(|v| ClusterCandidate {
                    article_id: r.article_id,
                    cluster_id: r.cluster_id.unwrap(),
                    vector: v.clone(),
                })
            })
            .collect();
        out.sort_by_key(|c| c.article_id);
        Ok(out)
    }

    async fn read_history(&self, user_id: i64) -> Result<Vec<i64>> {
        let reads = self.reads.read().unwrap();
        let mut rows: Vec<(i64, DateTime<Utc>)> = reads
            .iter()
            .filter(|(u, _, _)| *u == user_id)
            .map(|(_, article_id, read_at)| (*article_id, *read_at))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(rows.into_iter().map(|(id, _)| id).collect())
    }

    async fn category_preferences(&self, user_id: i64) -> Result<Vec<String>> {
        Ok(self
            .preferences
            .read()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn completed_by_categories(
        &self,
        categories: &[String],
        limit: i64,
    ) -> Result<Vec<i64>> {
        let wanted: HashSet<&str> = categories.iter().map(|c| c.as_str()).collect();
        let records = self.records.read().unwrap();
        let keywords = self.keywords.read().unwrap();
        let articles = self.articles.read().unwrap();

        let mut scored: Vec<(i64, usize, DateTime<Utc>)> = records
            .values()
            .filter(|r| r.status == AnalysisStatus::Completed)
            .filter_map(|r| {
                let matches = keywords
                    .get(&r.article_id)?
                    .iter()
                    .filter(|k| wanted.contains(k.as_str()))
                    .count();
                if matches == 0 {
                    return None;
                }
                let created_at = articles.get(&r.article_id)?.created_at;
                Some((r.article_id, matches, created_at))
            })
            .collect();

        scored.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));
        scored.truncate(limit as usize);
        Ok(scored.into_iter().map(|(id, _, _)| id).collect())
    }

    async fn filter_recommendable(
        &self,
        ids: &[i64],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<i64>> {
        let records = self.records.read().unwrap();
        let articles = self.articles.read().unwrap();
        Ok(ids
            .iter()
            .copied()
            .filter(|id| {
                let record = match records.get(id) {
                    Some(r) => r,
                    None => return false,
                };
                if record.status != AnalysisStatus::Completed {
                    return false;
                }
                if record.bias_label == Some(BiasLabel::Biased) {
                    return false;
                }
                match since {
                    Some(cutoff) => articles
                        .get(id)
                        .map(|a| a.created_at >= cutoff)
                        .unwrap_or(false),
                    None => true,
                }
            })
            .collect())
    }
}
