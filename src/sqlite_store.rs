//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation to SQL against the schema created by
//! [`crate::migrate`]. Timestamps are stored as Unix epoch seconds;
//! embedding vectors as little-endian f32 BLOBs.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{
    AnalysisOutcome, AnalysisRecord, AnalysisStatus, Article, BiasLabel, ClusterCandidate,
};
use crate::store::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

fn parse_status(raw: &str) -> Result<AnalysisStatus> {
    match AnalysisStatus::parse(raw) {
        Some(status) => Ok(status),
        None => bail!("unknown analysis status in store: {}", raw),
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AnalysisRecord> {
    let status_raw: String = row.get("status");
    let bias_raw: Option<String> = row.get("bias_label");
    let bias_label = match bias_raw {
        Some(raw) => match BiasLabel::parse(&raw) {
            Some(label) => Some(label),
            None => bail!("unknown bias label in store: {}", raw),
        },
        None => None,
    };
    Ok(AnalysisRecord {
        article_id: row.get("article_id"),
        status: parse_status(&status_raw)?,
        bias_label,
        bias_score: row.get("bias_score"),
        cluster_id: row.get("cluster_id"),
        created_at: ts_to_datetime(row.get("created_at")),
    })
}

/// Build a `?, ?, ?` placeholder list for a dynamic `IN` clause.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_article(&self, article_id: i64) -> Result<Option<Article>> {
        let row = sqlx::query(
            "SELECT id, title, body, source_url, created_at FROM articles WHERE id = ?",
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Article {
            id: r.get("id"),
            title: r.get("title"),
            body: r.get("body"),
            source_url: r.get("source_url"),
            created_at: ts_to_datetime(r.get("created_at")),
        }))
    }

    async fn get_record(&self, article_id: i64) -> Result<Option<AnalysisRecord>> {
        let row = sqlx::query(
            "SELECT article_id, status, bias_label, bias_score, cluster_id, created_at
             FROM analysis_records WHERE article_id = ?",
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(record_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn set_status(&self, article_id: i64, status: AnalysisStatus) -> Result<()> {
        let result = sqlx::query("UPDATE analysis_records SET status = ? WHERE article_id = ?")
            .bind(status.as_str())
            .bind(article_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            bail!("no analysis record for article {}", article_id);
        }
        Ok(())
    }

    async fn persist_analysis(&self, article_id: i64, outcome: &AnalysisOutcome) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Keywords are replaced wholesale, never partially updated.
        sqlx::query("DELETE FROM keywords WHERE record_id = ?")
            .bind(article_id)
            .execute(&mut *tx)
            .await?;
        for keyword in &outcome.keywords {
            sqlx::query("INSERT INTO keywords (record_id, value) VALUES (?, ?)")
                .bind(article_id)
                .bind(keyword)
                .execute(&mut *tx)
                .await?;
        }

        let blob = vec_to_blob(&outcome.embedding);
        sqlx::query(
            r#"
            INSERT INTO embedding_vectors (record_id, vector) VALUES (?, ?)
            ON CONFLICT(record_id) DO UPDATE SET vector = excluded.vector
            "#,
        )
        .bind(article_id)
        .bind(&blob)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "UPDATE analysis_records SET status = ?, bias_label = ?, bias_score = ?
             WHERE article_id = ?",
        )
        .bind(outcome.status.as_str())
        .bind(outcome.bias.label.as_str())
        .bind(outcome.bias.score)
        .bind(article_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            bail!("no analysis record for article {}", article_id);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_cluster_id(&self, article_id: i64, cluster_id: i64) -> Result<()> {
        let result =
            sqlx::query("UPDATE analysis_records SET cluster_id = ? WHERE article_id = ?")
                .bind(cluster_id)
                .bind(article_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            bail!("no analysis record for article {}", article_id);
        }
        Ok(())
    }

    async fn load_embedding(&self, article_id: i64) -> Result<Option<Vec<f32>>> {
        let row = sqlx::query("SELECT vector FROM embedding_vectors WHERE record_id = ?")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| {
            let blob: Vec<u8> = r.get("vector");
            blob_to_vec(&blob)
        }))
    }

    async fn completed_embeddings(&self) -> Result<Vec<(i64, Vec<f32>)>> {
        let rows = sqlx::query(
            r#"
            SELECT r.article_id, v.vector
            FROM analysis_records r
            JOIN embedding_vectors v ON v.record_id = r.article_id
            WHERE r.status = 'COMPLETED'
            ORDER BY r.article_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                (row.get("article_id"), blob_to_vec(&blob))
            })
            .collect())
    }

    async fn cluster_candidates(
        &self,
        exclude_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClusterCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT r.article_id, r.cluster_id, v.vector
            FROM analysis_records r
            JOIN embedding_vectors v ON v.record_id = r.article_id
            WHERE r.status = 'FILTERED'
              AND r.article_id != ?
              AND r.cluster_id IS NOT NULL
              AND r.created_at >= ?
            ORDER BY r.article_id ASC
            "#,
        )
        .bind(exclude_id)
        .bind(since.timestamp())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                ClusterCandidate {
                    article_id: row.get("article_id"),
                    cluster_id: row.get("cluster_id"),
                    vector: blob_to_vec(&blob),
                }
            })
            .collect())
    }

    async fn read_history(&self, user_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT article_id FROM user_read_history WHERE user_id = ? ORDER BY read_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("article_id")).collect())
    }

    async fn category_preferences(&self, user_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT category FROM user_category_preferences WHERE user_id = ? ORDER BY category",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("category")).collect())
    }

    async fn completed_by_categories(
        &self,
        categories: &[String],
        limit: i64,
    ) -> Result<Vec<i64>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT k.record_id, COUNT(DISTINCT k.value) AS matches, a.created_at
            FROM keywords k
            JOIN analysis_records r ON r.article_id = k.record_id
            JOIN articles a ON a.id = k.record_id
            WHERE r.status = 'COMPLETED' AND k.value IN ({})
            GROUP BY k.record_id
            ORDER BY matches DESC, a.created_at DESC, k.record_id ASC
            LIMIT ?
            "#,
            placeholders(categories.len())
        );

        let mut query = sqlx::query(&sql);
        for category in categories {
            query = query.bind(category);
        }
        let rows = query.bind(limit).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(|row| row.get("record_id")).collect())
    }

    async fn filter_recommendable(
        &self,
        ids: &[i64],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT r.article_id
            FROM analysis_records r
            JOIN articles a ON a.id = r.article_id
            WHERE r.article_id IN ({})
              AND r.status = 'COMPLETED'
              AND (r.bias_label IS NULL OR r.bias_label != 'BIASED')
              AND (? IS NULL OR a.created_at >= ?)
            "#,
            placeholders(ids.len())
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let since_ts = since.map(|s| s.timestamp());
        let rows = query
            .bind(since_ts)
            .bind(since_ts)
            .fetch_all(&self.pool)
            .await?;

        let kept: std::collections::HashSet<i64> =
            rows.iter().map(|row| row.get("article_id")).collect();

        // The query returns rows in storage order; reproject onto the
        // caller's ordering.
        Ok(ids.iter().copied().filter(|id| kept.contains(id)).collect())
    }
}
