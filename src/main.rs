//! CLI entry point: run the extraction pipeline for one search query and
//! print the run report as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use nissei_catalog::infrastructure::config::AiProvider;
use nissei_catalog::infrastructure::logging;
use nissei_catalog::{AppConfig, Pipeline, RunRequest, SqliteCatalogStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AiMode {
    /// Use the AI capability when configured.
    Auto,
    /// Disable the AI tier and the relevance filter for this run.
    None,
}

#[derive(Debug, Parser)]
#[command(name = "nissei-catalog", about = "Crawl product listings and details into the catalog")]
struct Cli {
    /// Search query, e.g. "iphone 16"
    query: String,

    /// Maximum products discovered from the listing page.
    #[arg(long, default_value_t = 10)]
    max_results: usize,

    /// Maximum products that get full detail extraction.
    #[arg(long, default_value_t = 5)]
    max_detailed: usize,

    /// Maximum images extracted and downloaded per product.
    #[arg(long)]
    max_images: Option<usize>,

    /// Path to a TOML config file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the rendered tier (no headless browser).
    #[arg(long)]
    no_browser: bool,

    /// AI capability usage.
    #[arg(long, value_enum, default_value_t = AiMode::Auto)]
    ai: AiMode,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path).await?,
        None => AppConfig::default(),
    };
    if cli.no_browser {
        config.browser.enabled = false;
    }
    if cli.ai == AiMode::None {
        config.ai.provider = AiProvider::None;
    }

    let store = SqliteCatalogStore::connect(&config.database.url)
        .await
        .context("failed to open the catalog database")?;

    let request = RunRequest {
        query: cli.query.clone(),
        max_results: cli.max_results,
        max_detailed: cli.max_detailed,
        max_images_per_product: cli.max_images.unwrap_or(config.images.max_per_product),
    };

    let pipeline = Pipeline::new(config, Arc::new(store)).context("failed to build pipeline")?;
    let report = pipeline.run(&request).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
