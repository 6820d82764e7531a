//! # Newslens
//!
//! An article analysis and recommendation engine.
//!
//! Newslens drives per-article AI processing in the background (keyword
//! tagging, bias classification, embedding encoding), keeps an in-memory
//! cosine-similarity index consistent with the persistent store, serves
//! cold/warm-start personalized recommendations, and groups biased
//! articles covering the same event with a greedy similarity heuristic.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │ Ingester │──▶│   Pipeline   │──▶│  SQLite  │
//! │ (extern) │   │ Tag+Bias+Enc │   │ records  │
//! └──────────┘   └──────┬───────┘   └────┬─────┘
//!                       │                │
//!              biased ▼ │ ▼ neutral      │ rebuild
//!              ┌────────┴───┐      ┌─────┴─────┐
//!              │ Clustering │      │  Vector   │
//!              │  (greedy)  │      │  Index    │
//!              └────────────┘      └─────┬─────┘
//!                                        ▼
//!                                ┌─────────────┐
//!                                │ Recommender │──▶ CLI / HTTP
//!                                └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! nlens init                          # create database
//! nlens serve                         # rebuild index, start HTTP server
//! nlens process 42                    # run one analysis synchronously
//! nlens recommend similar 42          # similar articles
//! nlens recommend user 7              # personalized feed
//! nlens recommend category economy    # category browsing
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Engine error taxonomy |
//! | [`store`] | Storage abstraction + in-memory backend |
//! | [`sqlite_store`] | SQLite storage backend |
//! | [`embedding`] | Embedding encoder abstraction |
//! | [`classifier`] | Bias classifier and keyword tagger |
//! | [`index`] | In-memory vector similarity index |
//! | [`pipeline`] | Per-article analysis state machine |
//! | [`cluster`] | Biased-content grouping |
//! | [`recommend`] | Cold/warm-start recommendation service |
//! | [`engine`] | Service assembly (dependency injection) |
//! | [`server`] | HTTP surface |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod classifier;
pub mod cluster;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod recommend;
pub mod server;
pub mod sqlite_store;
pub mod store;
