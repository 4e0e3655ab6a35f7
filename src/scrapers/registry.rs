use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use super::{ScrapeError, Scraper, ZaraScraper};
use crate::config::ScraperSettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("no scraper available for host {0}")]
    NoScraper(String),
}

/// Produces a fresh scraper per call.
pub type ScraperFactory = Arc<dyn Fn() -> Box<dyn Scraper> + Send + Sync>;

/// Maps store hosts to scraper factories.
///
/// A URL matches a registered host when its host equals it or ends with
/// `.<host>`; when several registered hosts match, the longest one wins.
#[derive(Clone, Default)]
pub struct ScraperRegistry {
    by_host: HashMap<String, ScraperFactory>,
}

impl fmt::Debug for ScraperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hosts: Vec<&String> = self.by_host.keys().collect();
        hosts.sort();
        f.debug_struct("ScraperRegistry")
            .field("hosts", &hosts)
            .finish()
    }
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, host: &str, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Scraper> + Send + Sync + 'static,
    {
        self.by_host
            .insert(host.trim().to_ascii_lowercase(), Arc::new(factory));
        self
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.by_host.keys().map(String::as_str)
    }

    pub fn validate_url(&self, raw_url: &str) -> Result<(), RegistryError> {
        self.match_host(raw_url).map(|_| ())
    }

    pub fn new_scraper_for(&self, raw_url: &str) -> Result<Box<dyn Scraper>, RegistryError> {
        let factory = self.match_host(raw_url)?;
        Ok(factory())
    }

    fn match_host(&self, raw_url: &str) -> Result<&ScraperFactory, RegistryError> {
        let parsed =
            Url::parse(raw_url).map_err(|_| RegistryError::InvalidUrl(raw_url.to_string()))?;
        let host = match parsed.host_str() {
            Some(h) if !h.is_empty() => h.to_ascii_lowercase(),
            _ => return Err(RegistryError::InvalidUrl(raw_url.to_string())),
        };

        self.by_host
            .iter()
            .filter(|(key, _)| host == **key || host.ends_with(&format!(".{key}")))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, factory)| factory)
            .ok_or(RegistryError::NoScraper(host))
    }
}

/// The production store set, built once at process entry and passed down.
pub fn default_registry(settings: &ScraperSettings) -> Result<ScraperRegistry, ScrapeError> {
    let client = ZaraScraper::build_client(
        Duration::from_secs(settings.timeout_secs),
        &settings.user_agent,
    )?;
    Ok(ScraperRegistry::new().register("zara.com", move || {
        Box::new(ZaraScraper::with_client(client.clone()))
    }))
}
