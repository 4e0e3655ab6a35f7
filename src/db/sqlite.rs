use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Connection, Sqlite, Transaction};
use tracing::instrument;
use uuid::Uuid;

use super::model::RequestRow;
use super::{Session, StoreError};
use crate::model::{JobStatus, Offer, ProductSnapshot, ScrapeRequest};

/// SQLite-backed session.
///
/// SQLite serializes writers, so the claim is a single `UPDATE … RETURNING`
/// whose sub-select picks the oldest pending row; two pollers can never both
/// flip the same row.
pub struct SqliteSession {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteSession {
    pub fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    async fn set_status(&mut self, id: Uuid, status: JobStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE scrape_requests SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Session for SqliteSession {
    #[instrument(skip_all)]
    async fn dequeue(&mut self) -> Result<Option<ScrapeRequest>, StoreError> {
        let row = sqlx::query_as::<_, RequestRow>(
            "UPDATE scrape_requests SET status = 'processing' \
             WHERE status = 'pending' AND id = ( \
                 SELECT id FROM scrape_requests \
                 WHERE status = 'pending' \
                 ORDER BY created_at ASC \
                 LIMIT 1 \
             ) \
             RETURNING id, url, status, created_at",
        )
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(ScrapeRequest::try_from).transpose()
    }

    #[instrument(skip_all, fields(job_id = %id))]
    async fn mark_done(&mut self, id: Uuid) -> Result<(), StoreError> {
        self.set_status(id, JobStatus::Done).await
    }

    #[instrument(skip_all, fields(job_id = %id))]
    async fn mark_failed(&mut self, id: Uuid) -> Result<(), StoreError> {
        self.set_status(id, JobStatus::Failed).await
    }

    #[instrument(skip_all, fields(store = %product.store, sku = %product.sku))]
    async fn upsert_product(&mut self, product: &ProductSnapshot) -> Result<Uuid, StoreError> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO products (id, store, store_product_id, name, image_url, url, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (store, store_product_id) DO UPDATE SET \
                 name = excluded.name, \
                 image_url = excluded.image_url, \
                 url = excluded.url, \
                 updated_at = excluded.updated_at \
             RETURNING id",
        )
        .bind(product.id)
        .bind(&product.store)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.image_url)
        .bind(&product.url)
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    #[instrument(skip_all, fields(product_id = %product_id, count = offers.len()))]
    async fn insert_prices(
        &mut self,
        product_id: Uuid,
        offers: &[Offer],
    ) -> Result<(), StoreError> {
        if offers.is_empty() {
            return Ok(());
        }
        // Savepoint: a failure part-way through drops it and undoes the batch.
        let mut batch = Connection::begin(&mut *self.tx).await?;
        for offer in offers {
            sqlx::query(
                "INSERT INTO prices (id, product_id, price, currency, size, color, availability, scraped_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(offer.id)
            .bind(product_id)
            .bind(offer.price)
            .bind(&offer.currency)
            .bind(offer.size.as_deref())
            .bind(offer.color.as_deref())
            .bind(&offer.availability)
            .bind(offer.observed_at)
            .execute(&mut *batch)
            .await?;
        }
        batch.commit().await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
