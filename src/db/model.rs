//! Raw rows returned by queries.
//!
//! Both backends decode into the same structs; conversion into domain types
//! happens here so the session code stays focused on SQL.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::StoreError;
use crate::model::{JobStatus, Offer, ProductSnapshot, ScrapeRequest};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RequestRow {
    pub id: Uuid,
    pub url: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for ScrapeRequest {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let status = JobStatus::parse_status(&row.status)
            .ok_or_else(|| StoreError::UnknownStatus(row.status.clone()))?;
        Ok(ScrapeRequest {
            id: row.id,
            url: row.url,
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub store: String,
    pub store_product_id: String,
    pub name: String,
    pub image_url: String,
    pub url: String,
}

impl From<ProductRow> for ProductSnapshot {
    fn from(row: ProductRow) -> Self {
        ProductSnapshot {
            id: row.id,
            store: row.store,
            sku: row.store_product_id,
            name: row.name,
            image_url: row.image_url,
            url: row.url,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OfferRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub price: f64,
    pub currency: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub availability: String,
    pub scraped_at: DateTime<Utc>,
}

impl From<OfferRow> for Offer {
    fn from(row: OfferRow) -> Self {
        Offer {
            id: row.id,
            product_id: row.product_id,
            price: row.price,
            currency: row.currency,
            size: row.size,
            color: row.color,
            availability: row.availability,
            observed_at: row.scraped_at,
        }
    }
}
