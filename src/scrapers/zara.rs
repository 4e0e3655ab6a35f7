use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{ScrapeError, Scraper};
use crate::model::{Offer, ProductRecord, ProductSnapshot};

const STORE: &str = "zara";

/// Reads the `application/ld+json` product blocks Zara embeds in product pages.
#[derive(Debug, Clone)]
pub struct ZaraScraper {
    client: Client,
}

#[derive(Debug, Deserialize)]
struct LdProduct {
    #[serde(default)]
    name: String,
    #[serde(default)]
    sku: Value,
    #[serde(default)]
    image: Value,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    offers: Value,
}

#[derive(Debug, Deserialize)]
struct LdOffer {
    #[serde(default)]
    price: Value,
    #[serde(default, rename = "priceCurrency")]
    currency: String,
    #[serde(default)]
    availability: String,
}

impl ZaraScraper {
    pub fn build_client(timeout: Duration, user_agent: &str) -> Result<Client, ScrapeError> {
        Ok(Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?)
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Scraper for ZaraScraper {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(ScrapeError::UnexpectedStatus(status));
        }
        Ok(resp.text().await?)
    }

    fn parse_product(&self, page: &str) -> Result<ProductRecord, ScrapeError> {
        let entries = extract_product_entries(page)?;
        let first = entries.first().ok_or(ScrapeError::NoStructuredData)?;

        let product = ProductSnapshot {
            id: Uuid::new_v4(),
            store: STORE.to_string(),
            sku: value_text(&first.sku)
                .ok_or_else(|| ScrapeError::MalformedData("product entry has no sku".into()))?,
            name: first.name.trim().to_string(),
            image_url: first_image(&first.image).unwrap_or_default(),
            url: String::new(),
        };

        let observed_at = Utc::now();
        let mut offers = Vec::new();
        for entry in &entries {
            for offer in entry_offers(&entry.offers)? {
                offers.push(Offer {
                    id: Uuid::new_v4(),
                    product_id: product.id,
                    price: parse_price(&offer.price)?,
                    currency: offer.currency,
                    size: entry.size.clone().filter(|s| !s.is_empty()),
                    color: entry.color.clone().filter(|c| !c.is_empty()),
                    availability: strip_schema_prefix(&offer.availability).to_string(),
                    observed_at,
                });
            }
        }
        debug!(sku = %product.sku, offers = offers.len(), "parsed product page");

        Ok(ProductRecord { product, offers })
    }
}

/// Every `@type: Product` entry across all ld+json blocks on the page, in
/// document order.
fn extract_product_entries(page: &str) -> Result<Vec<LdProduct>, ScrapeError> {
    let document = Html::parse_document(page);
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#)
        .map_err(|e| ScrapeError::MalformedData(e.to_string()))?;

    let mut raw = Vec::new();
    let mut last_error = None;
    for script in document.select(&selector) {
        let text = script.text().collect::<String>();
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => collect_products(value, &mut raw),
            Err(err) => last_error = Some(err.to_string()),
        }
    }

    if raw.is_empty() {
        return Err(match last_error {
            Some(msg) => ScrapeError::MalformedData(msg),
            None => ScrapeError::NoStructuredData,
        });
    }

    raw.into_iter()
        .map(|v| serde_json::from_value(v).map_err(|e| ScrapeError::MalformedData(e.to_string())))
        .collect()
}

fn collect_products(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| collect_products(v, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                collect_products(graph, out);
            }
            if is_product(map.get("@type")) {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

fn is_product(kind: Option<&Value>) -> bool {
    match kind {
        Some(Value::String(s)) => s == "Product",
        Some(Value::Array(kinds)) => kinds.iter().any(|k| k.as_str() == Some("Product")),
        _ => false,
    }
}

fn entry_offers(offers: &Value) -> Result<Vec<LdOffer>, ScrapeError> {
    let parse = |v: &Value| {
        serde_json::from_value::<LdOffer>(v.clone())
            .map_err(|e| ScrapeError::MalformedData(e.to_string()))
    };
    match offers {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.iter().map(parse).collect(),
        other => Ok(vec![parse(other)?]),
    }
}

fn parse_price(price: &Value) -> Result<f64, ScrapeError> {
    let parsed = match price {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|p| p.is_finite() && *p >= 0.0)
        .ok_or_else(|| ScrapeError::InvalidPrice(price.to_string()))
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_image(image: &Value) -> Option<String> {
    match image {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_image),
        Value::Object(map) => map.get("url").and_then(first_image),
        _ => None,
    }
}

fn strip_schema_prefix(availability: &str) -> &str {
    availability
        .strip_prefix("https://schema.org/")
        .or_else(|| availability.strip_prefix("http://schema.org/"))
        .unwrap_or(availability)
}
