//! Engine assembly.
//!
//! [`Engine`] wires the store, AI collaborators, vector index, pipeline,
//! and recommendation service together. It is constructed once at process
//! start and passed by handle into whatever needs it (CLI commands, HTTP
//! handlers) — there is no global shared instance.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::classifier::{create_bias_classifier, create_keyword_tagger};
use crate::cluster::ClusteringEngine;
use crate::config::Config;
use crate::db;
use crate::embedding::create_encoder;
use crate::index::VectorIndex;
use crate::pipeline::AnalysisPipeline;
use crate::recommend::RecommendationService;
use crate::sqlite_store::SqliteStore;
use crate::store::Store;

/// The engine's service objects, shared by reference.
pub struct Engine {
    pub store: Arc<dyn Store>,
    pub index: Arc<VectorIndex>,
    pub pipeline: Arc<AnalysisPipeline>,
    pub recommender: Arc<RecommendationService>,
}

impl Engine {
    /// Build a SQLite-backed engine from configuration and rebuild the
    /// vector index from the store.
    ///
    /// The rebuild is a blocking initialization step: nothing serves
    /// reads until the index holds every COMPLETED vector.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

        let encoder = create_encoder(&config.encoder, config.analysis.dims)?;
        let classifier =
            create_bias_classifier(&config.classifier, config.analysis.bias_threshold)?;
        let tagger = create_keyword_tagger(&config.tagger, config.analysis.keyword_top_k)?;

        let index = Arc::new(VectorIndex::new(config.analysis.dims));
        let entries = store.completed_embeddings().await?;
        info!(count = entries.len(), "rebuilding vector index from store");
        index.build(entries)?;

        Ok(Self::assemble(
            store, encoder, classifier, tagger, index, config,
        ))
    }

    /// Wire an engine from pre-built parts. Lets tests inject the
    /// in-memory store and stub collaborators.
    pub fn assemble(
        store: Arc<dyn Store>,
        encoder: Arc<dyn crate::embedding::EmbeddingEncoder>,
        classifier: Arc<dyn crate::classifier::BiasClassifier>,
        tagger: Arc<dyn crate::classifier::KeywordTagger>,
        index: Arc<VectorIndex>,
        config: &Config,
    ) -> Self {
        let clustering = ClusteringEngine::new(&config.clustering);
        let pipeline = Arc::new(AnalysisPipeline::new(
            store.clone(),
            encoder,
            classifier,
            tagger,
            index.clone(),
            clustering,
            &config.analysis,
        ));
        let recommender = Arc::new(RecommendationService::new(
            store.clone(),
            index.clone(),
            &config.recommendation,
        ));

        Self {
            store,
            index,
            pipeline,
            recommender,
        }
    }
}
