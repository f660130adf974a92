//! Srcent Ingestion CLI
//!
//! Offline jobs that populate and maintain the content store:
//! 1. `products`: crawl product pages, analyze them, insert drafts
//! 2. `deep-dive`: synthesize podcast deep dives from reference articles
//! 3. `migrate-categories`: map stored categories onto the taxonomy
//! 4. `schema`: apply database migrations

mod analyzer;
mod crawler;
mod errors;
mod migrate;
mod podcast;
mod processor;
mod tasks;
mod tts;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use srcent_common::{
    config::AppConfig,
    db::{ContentStore, DbPool, Repository},
    llm::{ChatCompletionsClient, LanguageModel},
    metrics, telemetry, VERSION,
};
use tracing::info;

use crate::crawler::CrawlerChain;
use crate::processor::Pipeline;

#[derive(Parser, Debug)]
#[command(name = "ingest", version, about = "Srcent content ingestion")]
struct Cli {
    /// Directory holding pending.json, urls.txt and deep-dive-tasks.json
    #[arg(long, global = true, default_value = ".", env = "INGEST_DIR")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl and analyze product pages into draft products
    Products {
        /// Task file to use instead of pending.json / urls.txt
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Generate podcast deep dives
    DeepDive {
        /// Task file to use instead of deep-dive-tasks.json
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Map stored categories onto the site taxonomy
    MigrateCategories {
        /// Report changes without writing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Apply database migrations
    Schema,
}

impl Command {
    fn uses_language_model(&self) -> bool {
        matches!(self, Command::Products { .. } | Command::DeepDive { .. })
    }
}

/// Reject a run whose command needs credentials that are not configured
fn preflight(command: &Command, config: &AppConfig) -> anyhow::Result<()> {
    if command.uses_language_model() {
        config
            .llm
            .require_api_key()
            .context("a language model API key is required for ingestion")?;
    }
    Ok(())
}

fn build_pipeline(config: &AppConfig, store: Arc<dyn ContentStore>) -> anyhow::Result<Pipeline> {
    let model: Arc<dyn LanguageModel> = Arc::new(
        ChatCompletionsClient::from_config(&config.llm)
            .context("a language model API key is required for ingestion")?,
    );
    info!(model = model.model_name(), "Language model ready");

    let crawler = Arc::new(CrawlerChain::from_config(&config.crawler)?);
    let audio = tts::synthesizer_from_config(&config.tts)?;
    info!(tts = audio.mode(), "Audio synthesizer ready");

    Ok(Pipeline::new(store, crawler, model, audio))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load().context("failed to load configuration")?;

    // Initialize tracing
    telemetry::init_tracing(&config.observability);
    metrics::register_metrics();

    info!("Starting Srcent ingestion v{}", VERSION);
    preflight(&cli.command, &config)?;

    // Initialize database connection
    let pool = DbPool::new(&config.database).await?;

    match cli.command {
        Command::Schema => {
            pool.migrate().await?;
            info!("Schema is up to date");
        }
        Command::MigrateCategories { dry_run } => {
            let store = Repository::new(pool);
            migrate::migrate_categories(&store, dry_run).await?;
        }
        Command::Products { file } => {
            let tasks = tasks::load_ingest_tasks(&cli.dir, file.as_deref())?;
            if tasks.is_empty() {
                info!("No product tasks; add pending.json or urls.txt");
                return Ok(());
            }

            let store: Arc<dyn ContentStore> = Arc::new(Repository::new(pool));
            build_pipeline(&config, store)?.run_products(&tasks).await;
        }
        Command::DeepDive { file } => {
            let tasks = tasks::load_deep_dive_tasks(&cli.dir, file.as_deref())?;
            if tasks.is_empty() {
                info!("No deep-dive tasks; add deep-dive-tasks.json");
                return Ok(());
            }

            let store: Arc<dyn ContentStore> = Arc::new(Repository::new(pool));
            build_pipeline(&config, store)?.run_deep_dives(&tasks).await;
        }
    }

    Ok(())
}
