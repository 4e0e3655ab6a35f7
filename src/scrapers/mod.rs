//! Store scrapers and the host → scraper registry.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::ProductRecord;

pub mod registry;
pub mod zara;

pub use registry::{default_registry, RegistryError, ScraperFactory, ScraperRegistry};
pub use zara::ZaraScraper;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    UnexpectedStatus(reqwest::StatusCode),
    #[error("no ld+json product found")]
    NoStructuredData,
    #[error("malformed structured data: {0}")]
    MalformedData(String),
    #[error("invalid price '{0}'")]
    InvalidPrice(String),
}

/// Fetches a product page and turns it into a snapshot plus its offers.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError>;

    fn parse_product(&self, page: &str) -> Result<ProductRecord, ScrapeError>;

    /// Fetch and parse; the snapshot's URL is the one that was requested.
    async fn scrape(&self, url: &str) -> Result<ProductRecord, ScrapeError> {
        let page = self.fetch(url).await?;
        let mut record = self.parse_product(&page)?;
        record.product.url = url.to_string();
        Ok(record)
    }
}
