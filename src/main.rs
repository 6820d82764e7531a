//! # Newslens CLI (`nlens`)
//!
//! The `nlens` binary is the operational interface for the engine. It
//! provides commands for database initialization, running a single
//! analysis synchronously, querying recommendations, and starting the
//! HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! nlens --config ./config/nlens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nlens init` | Create the SQLite database and run schema migrations |
//! | `nlens serve` | Rebuild the vector index and start the HTTP server |
//! | `nlens process <article_id>` | Run one article's analysis to completion |
//! | `nlens recommend similar <article_id>` | Articles similar to one article |
//! | `nlens recommend user <user_id>` | Personalized recommendations |
//! | `nlens recommend category <categories>...` | Category-matched articles |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use newslens::config;
use newslens::engine::Engine;
use newslens::migrate;
use newslens::server;

/// Newslens CLI — an article analysis and recommendation engine.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/nlens.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "nlens",
    about = "Newslens — article analysis and recommendation engine",
    version,
    long_about = "Newslens drives per-article AI processing (keyword tagging, bias \
    classification, embedding encoding) in the background, serves similarity-based and \
    personalized recommendations from an in-memory vector index, and groups biased \
    articles covering the same event."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/nlens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Start the HTTP server.
    ///
    /// Rebuilds the vector index from the store (blocking), then serves
    /// the trigger and recommendation endpoints.
    Serve,

    /// Run one article's analysis synchronously and print its final status.
    ///
    /// The HTTP trigger endpoint runs the same pipeline in the background;
    /// this command exists for operations and backfills.
    Process {
        /// Article id to analyze.
        article_id: i64,
    },

    /// Query recommendations.
    Recommend {
        #[command(subcommand)]
        action: RecommendAction,
    },
}

/// Recommendation subcommands.
#[derive(Subcommand)]
enum RecommendAction {
    /// Articles similar to the given one.
    Similar {
        /// Query article id.
        article_id: i64,

        /// Maximum number of results.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Personalized recommendations for a user (cold or warm start,
    /// depending on read-history size).
    User {
        /// User id.
        user_id: i64,

        /// Maximum number of results.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Articles matching any of the given categories.
    Category {
        /// One or more category labels.
        #[arg(required = true)]
        categories: Vec<String>,

        /// Maximum number of results.
        #[arg(long)]
        k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            let engine = Arc::new(Engine::from_config(&cfg).await?);
            server::run_server(&cfg, engine).await?;
        }
        Commands::Process { article_id } => {
            let engine = Engine::from_config(&cfg).await?;
            let status = engine.pipeline.process(article_id).await?;
            println!("article {}: {}", article_id, status);
        }
        Commands::Recommend { action } => {
            let engine = Engine::from_config(&cfg).await?;
            let limit = cfg.recommendation.default_limit;
            let ids = match action {
                RecommendAction::Similar { article_id, k } => {
                    engine
                        .recommender
                        .recommend_similar(article_id, k.unwrap_or(limit))
                        .await?
                }
                RecommendAction::User { user_id, k } => {
                    engine
                        .recommender
                        .recommend_for_user(user_id, k.unwrap_or(limit))
                        .await?
                }
                RecommendAction::Category { categories, k } => {
                    engine
                        .recommender
                        .recommend_by_category(&categories, k.unwrap_or(limit))
                        .await?
                }
            };
            if ids.is_empty() {
                println!("no recommendations");
            } else {
                for id in ids {
                    println!("{}", id);
                }
            }
        }
    }

    Ok(())
}
