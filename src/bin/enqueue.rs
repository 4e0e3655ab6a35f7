//! Queue product URLs for the worker: `pricewatch-enqueue <url>...`
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::error;

use pricewatch::config;
use pricewatch::db::Database;
use pricewatch::intake;
use pricewatch::scrapers::default_registry;

#[derive(Debug, Parser)]
#[command(author, version, about = "Queue product URLs for scraping")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Product page URLs
    #[arg(required = true)]
    urls: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("loading {}", args.config.display()))?;
    let db = Database::connect(&cfg.app.database_url).await?;
    db.run_migrations().await?;
    let registry = default_registry(&cfg.scraper)?;

    let mut rejected = 0usize;
    for url in &args.urls {
        match intake::submit(&db, &registry, url).await {
            Ok(id) => println!("{id}\t{url}"),
            Err(err) => {
                error!(%url, error = %err, "request rejected");
                rejected += 1;
            }
        }
    }
    if rejected > 0 {
        anyhow::bail!("{rejected} of {} urls rejected", args.urls.len());
    }
    Ok(())
}
