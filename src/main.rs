use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use pricewatch::config;
use pricewatch::db::Database;
use pricewatch::scrapers::default_registry;
use pricewatch::worker::{Supervisor, SupervisorExit, Worker};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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

    let db = Database::connect(&cfg.app.database_url)
        .await
        .context("connecting to database")?;
    db.run_migrations().await.context("running migrations")?;

    let registry = default_registry(&cfg.scraper).context("building scrapers")?;
    let mut hosts: Vec<&str> = registry.hosts().collect();
    hosts.sort_unstable();
    info!(?hosts, "scrapers registered");

    let worker = Worker::new(Arc::new(db), Arc::new(registry));
    let cancel = CancellationToken::new();
    let on_fatal = cancel.clone();
    let supervisor = Supervisor::new(
        worker,
        cfg.worker.poll_interval(),
        cfg.worker.failure_tolerance,
    )
    .on_fatal(move || on_fatal.cancel());

    tokio::spawn(shutdown_on_signal(cancel.clone()));

    match supervisor.run(cancel).await {
        SupervisorExit::Cancelled => {
            info!("worker stopped");
            Ok(())
        }
        SupervisorExit::Fatal { failures } => {
            error!(failures, "worker gave up");
            bail!("worker stopped after {failures} consecutive failures")
        }
    }
}

async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                error!(?err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown requested");
    cancel.cancel();
}
