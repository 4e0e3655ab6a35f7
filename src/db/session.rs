use async_trait::async_trait;
use uuid::Uuid;

use super::StoreError;
use crate::model::{Offer, ProductSnapshot, ScrapeRequest};

/// One database transaction plus the job-store and product-store operations
/// scoped to it.
///
/// A session is opened per phase and finished by exactly one of `commit` or
/// `rollback`. Both consume the session, so it cannot outlive its transaction
/// or be carried into the next phase. When `commit` fails the transaction has
/// already been discarded and its connection released; every write made
/// through the session is undone.
#[async_trait]
pub trait Session: Send {
    /// Claim the oldest pending request and flip it to `processing`.
    /// Returns `Ok(None)` when nothing is pending.
    async fn dequeue(&mut self) -> Result<Option<ScrapeRequest>, StoreError>;

    /// Unconditional; calling it again on a finished row is not an error.
    async fn mark_done(&mut self, id: Uuid) -> Result<(), StoreError>;

    /// Unconditional; calling it again on a finished row is not an error.
    async fn mark_failed(&mut self, id: Uuid) -> Result<(), StoreError>;

    /// Insert or update keyed by `(store, sku)`. Returns the id of the stored
    /// row, which is the pre-existing id when the product was seen before.
    async fn upsert_product(&mut self, product: &ProductSnapshot) -> Result<Uuid, StoreError>;

    /// Append offers for `product_id`. Either every offer is written or none.
    async fn insert_prices(&mut self, product_id: Uuid, offers: &[Offer])
        -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Opens sessions. Implemented by [`super::Database`] and by test doubles.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Session>, StoreError>;
}
