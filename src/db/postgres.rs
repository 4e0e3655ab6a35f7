use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

use super::model::RequestRow;
use super::{Session, StoreError};
use crate::model::{JobStatus, Offer, ProductSnapshot, ScrapeRequest};

/// PostgreSQL-backed session.
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

impl PgSession {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }

    async fn set_status(&mut self, id: Uuid, status: JobStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE scrape_requests SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Session for PgSession {
    /// Row lock with `SKIP LOCKED` so concurrent pollers never select the same
    /// row; the status flip happens in the same transaction.
    #[instrument(skip_all)]
    async fn dequeue(&mut self) -> Result<Option<ScrapeRequest>, StoreError> {
        let row = sqlx::query_as::<_, RequestRow>(
            r#"
            SELECT id, url, status, created_at
            FROM scrape_requests
            WHERE status = 'pending'
            ORDER BY created_at
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("UPDATE scrape_requests SET status = 'processing' WHERE id = $1")
            .bind(row.id)
            .execute(&mut *self.tx)
            .await?;

        let mut job = ScrapeRequest::try_from(row)?;
        job.status = JobStatus::Processing;
        Ok(Some(job))
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
            r#"
            INSERT INTO products (id, store, store_product_id, name, image_url, url)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (store, store_product_id)
            DO UPDATE SET
                name = EXCLUDED.name,
                image_url = EXCLUDED.image_url,
                url = EXCLUDED.url,
                updated_at = now()
            RETURNING id
            "#,
        )
        .bind(product.id)
        .bind(&product.store)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.image_url)
        .bind(&product.url)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    /// Single `UNNEST` insert, so the batch is one statement.
    #[instrument(skip_all, fields(product_id = %product_id, count = offers.len()))]
    async fn insert_prices(
        &mut self,
        product_id: Uuid,
        offers: &[Offer],
    ) -> Result<(), StoreError> {
        if offers.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = offers.iter().map(|o| o.id).collect();
        let product_ids: Vec<Uuid> = vec![product_id; offers.len()];
        let prices: Vec<f64> = offers.iter().map(|o| o.price).collect();
        let currencies: Vec<String> = offers.iter().map(|o| o.currency.clone()).collect();
        let sizes: Vec<Option<String>> = offers.iter().map(|o| o.size.clone()).collect();
        let colors: Vec<Option<String>> = offers.iter().map(|o| o.color.clone()).collect();
        let availability: Vec<String> = offers.iter().map(|o| o.availability.clone()).collect();
        let observed: Vec<DateTime<Utc>> = offers.iter().map(|o| o.observed_at).collect();

        sqlx::query(
            r#"
            INSERT INTO prices (id, product_id, price, currency, size, color, availability, scraped_at)
            SELECT * FROM UNNEST(
                $1::uuid[], $2::uuid[], $3::float8[], $4::text[],
                $5::text[], $6::text[], $7::text[], $8::timestamptz[]
            )
            "#,
        )
        .bind(ids)
        .bind(product_ids)
        .bind(prices)
        .bind(currencies)
        .bind(sizes)
        .bind(colors)
        .bind(availability)
        .bind(observed)
        .execute(&mut *self.tx)
        .await?;
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
