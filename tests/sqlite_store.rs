//! SQLite store behaviors against a real database file.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;

use newslens::config::{Config, DbConfig, ServerConfig};
use newslens::db;
use newslens::migrate;
use newslens::models::{AnalysisOutcome, AnalysisStatus, BiasLabel, BiasVerdict};
use newslens::sqlite_store::SqliteStore;
use newslens::store::Store;

fn test_config(tmp: &TempDir) -> Config {
    Config {
        db: DbConfig {
            path: tmp.path().join("data").join("test.sqlite"),
        },
        analysis: Default::default(),
        recommendation: Default::default(),
        clustering: Default::default(),
        encoder: Default::default(),
        classifier: Default::default(),
        tagger: Default::default(),
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
    }
}

async fn setup() -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    (tmp, SqliteStore::new(pool))
}

async fn seed_article(pool: &SqlitePool, id: i64, created_at: DateTime<Utc>) {
    sqlx::query("INSERT INTO articles (id, title, body, source_url, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(id)
        .bind(format!("article {}", id))
        .bind(format!("body of article {}", id))
        .bind(format!("https://news.example/{}", id))
        .bind(created_at.timestamp())
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO analysis_records (article_id, status, created_at) VALUES (?, 'PENDING', ?)",
    )
    .bind(id)
    .bind(created_at.timestamp())
    .execute(pool)
    .await
    .unwrap();
}

fn outcome(
    keywords: &[&str],
    embedding: Vec<f32>,
    label: BiasLabel,
    status: AnalysisStatus,
) -> AnalysisOutcome {
    AnalysisOutcome {
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        embedding,
        bias: BiasVerdict { label, score: 0.9 },
        status,
    }
}

#[tokio::test]
async fn test_record_lifecycle_roundtrip() {
    let (_tmp, store) = setup().await;
    let now = Utc::now();
    seed_article(store.pool(), 1, now).await;

    let record = store.get_record(1).await.unwrap().unwrap();
    assert_eq!(record.status, AnalysisStatus::Pending);
    assert_eq!(record.bias_label, None);
    assert_eq!(record.cluster_id, None);

    store
        .set_status(1, AnalysisStatus::Processing)
        .await
        .unwrap();
    let record = store.get_record(1).await.unwrap().unwrap();
    assert_eq!(record.status, AnalysisStatus::Processing);

    store
        .persist_analysis(
            1,
            &outcome(
                &["economy"],
                vec![1.0, 0.5],
                BiasLabel::Neutral,
                AnalysisStatus::Completed,
            ),
        )
        .await
        .unwrap();

    let record = store.get_record(1).await.unwrap().unwrap();
    assert_eq!(record.status, AnalysisStatus::Completed);
    assert_eq!(record.bias_label, Some(BiasLabel::Neutral));
    assert!(record.bias_score.is_some());

    let vector = store.load_embedding(1).await.unwrap().unwrap();
    assert_eq!(vector, vec![1.0, 0.5]);
}

#[tokio::test]
async fn test_set_status_on_missing_record_fails() {
    let (_tmp, store) = setup().await;
    assert!(store
        .set_status(42, AnalysisStatus::Processing)
        .await
        .is_err());
}

#[tokio::test]
async fn test_keywords_are_replaced_wholesale() {
    let (_tmp, store) = setup().await;
    seed_article(store.pool(), 1, Utc::now()).await;

    store
        .persist_analysis(
            1,
            &outcome(
                &["economy", "politics"],
                vec![1.0, 0.0],
                BiasLabel::Neutral,
                AnalysisStatus::Completed,
            ),
        )
        .await
        .unwrap();
    store
        .persist_analysis(
            1,
            &outcome(
                &["sports"],
                vec![0.0, 1.0],
                BiasLabel::Neutral,
                AnalysisStatus::Completed,
            ),
        )
        .await
        .unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM keywords WHERE record_id = 1")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);

    // The embedding was replaced, not duplicated.
    let vector = store.load_embedding(1).await.unwrap().unwrap();
    assert_eq!(vector, vec![0.0, 1.0]);
}

#[tokio::test]
async fn test_completed_embeddings_skips_other_statuses() {
    let (_tmp, store) = setup().await;
    let now = Utc::now();
    seed_article(store.pool(), 1, now).await;
    seed_article(store.pool(), 2, now).await;
    seed_article(store.pool(), 3, now).await;

    store
        .persist_analysis(
            1,
            &outcome(
                &[],
                vec![1.0, 0.0],
                BiasLabel::Neutral,
                AnalysisStatus::Completed,
            ),
        )
        .await
        .unwrap();
    store
        .persist_analysis(
            2,
            &outcome(
                &[],
                vec![0.0, 1.0],
                BiasLabel::Biased,
                AnalysisStatus::Filtered,
            ),
        )
        .await
        .unwrap();
    // Article 3 stays PENDING with no vector.

    let entries = store.completed_embeddings().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, 1);
    assert_eq!(entries[0].1, vec![1.0, 0.0]);
}

#[tokio::test]
async fn test_cluster_candidates_filters() {
    let (_tmp, store) = setup().await;
    let now = Utc::now();
    for id in 1..=5 {
        seed_article(store.pool(), id, now).await;
    }
    // Candidate: filtered, grouped, recent.
    store
        .persist_analysis(
            1,
            &outcome(
                &[],
                vec![1.0, 0.0],
                BiasLabel::Biased,
                AnalysisStatus::Filtered,
            ),
        )
        .await
        .unwrap();
    store.set_cluster_id(1, 1).await.unwrap();
    // Filtered but never grouped.
    store
        .persist_analysis(
            2,
            &outcome(
                &[],
                vec![1.0, 0.0],
                BiasLabel::Biased,
                AnalysisStatus::Filtered,
            ),
        )
        .await
        .unwrap();
    // Completed, not a clustering target.
    store
        .persist_analysis(
            3,
            &outcome(
                &[],
                vec![1.0, 0.0],
                BiasLabel::Neutral,
                AnalysisStatus::Completed,
            ),
        )
        .await
        .unwrap();
    // Filtered and grouped but stale.
    sqlx::query("UPDATE analysis_records SET created_at = ? WHERE article_id = 4")
        .bind((now - Duration::hours(48)).timestamp())
        .execute(store.pool())
        .await
        .unwrap();
    store
        .persist_analysis(
            4,
            &outcome(
                &[],
                vec![1.0, 0.0],
                BiasLabel::Biased,
                AnalysisStatus::Filtered,
            ),
        )
        .await
        .unwrap();
    store.set_cluster_id(4, 4).await.unwrap();

    let since = now - Duration::hours(24);
    let candidates = store.cluster_candidates(5, since).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].article_id, 1);
    assert_eq!(candidates[0].cluster_id, 1);

    // The queried article never appears among its own candidates.
    let candidates = store.cluster_candidates(1, since).await.unwrap();
    assert!(candidates.is_empty());
}

#[tokio::test]
async fn test_completed_by_categories_ranking() {
    let (_tmp, store) = setup().await;
    let now = Utc::now();
    seed_article(store.pool(), 1, now - Duration::days(1)).await;
    seed_article(store.pool(), 2, now).await;
    seed_article(store.pool(), 3, now).await;

    // Two matches, older.
    store
        .persist_analysis(
            1,
            &outcome(
                &["economy", "politics"],
                vec![1.0, 0.0],
                BiasLabel::Neutral,
                AnalysisStatus::Completed,
            ),
        )
        .await
        .unwrap();
    // One match, newer.
    store
        .persist_analysis(
            2,
            &outcome(
                &["economy"],
                vec![1.0, 0.0],
                BiasLabel::Neutral,
                AnalysisStatus::Completed,
            ),
        )
        .await
        .unwrap();
    // Matching keywords but not COMPLETED.
    store
        .persist_analysis(
            3,
            &outcome(
                &["economy", "politics"],
                vec![1.0, 0.0],
                BiasLabel::Biased,
                AnalysisStatus::Filtered,
            ),
        )
        .await
        .unwrap();

    let categories = vec!["economy".to_string(), "politics".to_string()];
    let ids = store.completed_by_categories(&categories, 10).await.unwrap();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_filter_recommendable_preserves_order() {
    let (_tmp, store) = setup().await;
    let now = Utc::now();
    seed_article(store.pool(), 1, now).await;
    seed_article(store.pool(), 2, now - Duration::days(10)).await;
    seed_article(store.pool(), 3, now).await;

    for id in [1, 2, 3] {
        store
            .persist_analysis(
                id,
                &outcome(
                    &[],
                    vec![1.0, 0.0],
                    BiasLabel::Neutral,
                    AnalysisStatus::Completed,
                ),
            )
            .await
            .unwrap();
    }

    let since = now - Duration::days(3);
    let kept = store
        .filter_recommendable(&[3, 2, 1], Some(since))
        .await
        .unwrap();
    assert_eq!(kept, vec![3, 1]);

    let kept = store.filter_recommendable(&[3, 2, 1], None).await.unwrap();
    assert_eq!(kept, vec![3, 2, 1]);
}

#[tokio::test]
async fn test_read_history_and_preferences() {
    let (_tmp, store) = setup().await;
    let now = Utc::now();

    for (article_id, read_at) in [(10, now - Duration::hours(2)), (11, now)] {
        sqlx::query("INSERT INTO user_read_history (user_id, article_id, read_at) VALUES (?, ?, ?)")
            .bind(7)
            .bind(article_id)
            .bind(read_at.timestamp())
            .execute(store.pool())
            .await
            .unwrap();
    }
    sqlx::query("INSERT INTO user_category_preferences (user_id, category) VALUES (7, 'economy')")
        .execute(store.pool())
        .await
        .unwrap();

    let history = store.read_history(7).await.unwrap();
    assert_eq!(history, vec![11, 10]); // most recent first

    let prefs = store.category_preferences(7).await.unwrap();
    assert_eq!(prefs, vec!["economy".to_string()]);

    assert!(store.read_history(8).await.unwrap().is_empty());
    assert!(store.category_preferences(8).await.unwrap().is_empty());
}
