//! Request submission: the only path that creates scrape requests.

use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::{Database, StoreError};
use crate::scrapers::{RegistryError, ScraperRegistry};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Queue `url` for scraping and return the new request id.
///
/// URLs no registered scraper accepts are refused here, before a row exists.
#[instrument(skip(db, registry))]
pub async fn submit(
    db: &Database,
    registry: &ScraperRegistry,
    url: &str,
) -> Result<Uuid, IntakeError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(IntakeError::InvalidInput("url must be non-empty"));
    }
    registry.validate_url(url)?;
    let id = db.insert_request(url).await?;
    info!(%id, "scrape request queued");
    Ok(id)
}
