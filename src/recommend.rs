//! Cold/warm-start recommendation service.
//!
//! Answers three kinds of queries by composing the persistent store and
//! the vector index:
//!
//! - **similar to article X** — delegates to the index's by-article search.
//! - **for user U** — cold start (category matching) until the user has
//!   enough read history for a meaningful embedding profile, then warm
//!   start (profile search). The switch point is
//!   `recommendation.cold_start_history_max`.
//! - **by category** — COMPLETED articles matching any given category,
//!   ranked by match count then recency.
//!
//! Every path post-filters its id list through the store, dropping
//! anything biased or not COMPLETED even though such vectors should never
//! be in the index in the first place. Similarity-based paths additionally
//! drop articles older than the freshness window.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::debug;

use crate::config::RecommendationConfig;
use crate::error::{EngineError, EngineResult};
use crate::index::VectorIndex;
use crate::store::Store;

/// Serves personalized and similarity-based article recommendations.
pub struct RecommendationService {
    store: Arc<dyn Store>,
    index: Arc<VectorIndex>,
    freshness: Duration,
    cold_start_history_max: usize,
    profile_candidate_factor: usize,
}

impl RecommendationService {
    pub fn new(
        store: Arc<dyn Store>,
        index: Arc<VectorIndex>,
        config: &RecommendationConfig,
    ) -> Self {
        Self {
            store,
            index,
            freshness: Duration::days(config.freshness_days),
            cold_start_history_max: config.cold_start_history_max,
            profile_candidate_factor: config.profile_candidate_factor,
        }
    }

    /// Personalized recommendations for one user.
    ///
    /// Users with little read history get category-matched articles (cold
    /// start, no index search); everyone else gets a profile similarity
    /// search (warm start). Articles the user has already read are never
    /// returned.
    pub async fn recommend_for_user(&self, user_id: i64, k: usize) -> EngineResult<Vec<i64>> {
        let history = self
            .store
            .read_history(user_id)
            .await
            .map_err(EngineError::persistence)?;

        if history.len() <= self.cold_start_history_max {
            debug!(user_id, history = history.len(), "cold start");
            return self.cold_start(user_id, &history, k).await;
        }

        debug!(user_id, history = history.len(), "warm start");
        let hits = self
            .index
            .search_by_user_profile(
                self.store.as_ref(),
                user_id,
                k,
                self.freshness,
                self.profile_candidate_factor,
            )
            .await?;
        Ok(hits.into_iter().map(|(_, id)| id).collect())
    }

    /// Category-preference matching for users without enough history.
    async fn cold_start(&self, user_id: i64, history: &[i64], k: usize) -> EngineResult<Vec<i64>> {
        let categories = self
            .store
            .category_preferences(user_id)
            .await
            .map_err(EngineError::persistence)?;
        if categories.is_empty() {
            return Ok(Vec::new());
        }

        // Over-fetch so read-history and defense filtering still leaves k.
        let fetch = (k + history.len()) as i64;
        let candidates = self
            .store
            .completed_by_categories(&categories, fetch)
            .await
            .map_err(EngineError::persistence)?;

        let read: HashSet<i64> = history.iter().copied().collect();
        let unread: Vec<i64> = candidates
            .into_iter()
            .filter(|id| !read.contains(id))
            .collect();

        let since = Utc::now() - self.freshness;
        let mut ids = self
            .store
            .filter_recommendable(&unread, Some(since))
            .await
            .map_err(EngineError::persistence)?;
        ids.truncate(k);
        Ok(ids)
    }

    /// COMPLETED articles matching any of the given categories,
    /// most-relevant (match count) then most-recent first.
    pub async fn recommend_by_category(
        &self,
        categories: &[String],
        k: usize,
    ) -> EngineResult<Vec<i64>> {
        if categories.is_empty() {
            return Err(EngineError::validation("no categories given"));
        }

        let candidates = self
            .store
            .completed_by_categories(categories, k as i64)
            .await
            .map_err(EngineError::persistence)?;

        let mut ids = self
            .store
            .filter_recommendable(&candidates, None)
            .await
            .map_err(EngineError::persistence)?;
        ids.truncate(k);
        Ok(ids)
    }

    /// Articles similar to a given one, freshest-window only.
    pub async fn recommend_similar(&self, article_id: i64, k: usize) -> EngineResult<Vec<i64>> {
        let hits = self
            .index
            .search_by_article(self.store.as_ref(), article_id, k)
            .await?;

        let candidate_ids: Vec<i64> = hits.into_iter().map(|(_, id)| id).collect();
        let since = Utc::now() - self.freshness;
        let mut ids = self
            .store
            .filter_recommendable(&candidate_ids, Some(since))
            .await
            .map_err(EngineError::persistence)?;
        ids.truncate(k);
        Ok(ids)
    }
}
