//! Recording test doubles for the worker and supervisor tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use uuid::Uuid;

use crate::db::{Session, SessionFactory, StoreError};
use crate::model::{JobStatus, Offer, ProductRecord, ProductSnapshot, ScrapeRequest};
use crate::scrapers::{ScrapeError, Scraper};

/// Shared, ordered log of calls made against the doubles.
#[derive(Clone, Default)]
pub(crate) struct Recorder(Arc<Mutex<Vec<&'static str>>>);

impl Recorder {
    pub(crate) fn record(&self, call: &'static str) {
        self.0.lock().unwrap().push(call);
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }

    fn count(&self, call: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| **c == call).count()
    }
}

#[derive(Default)]
pub(crate) struct FakeState {
    status: Option<JobStatus>,
    offers: usize,
}

/// A one-job store whose sessions stage writes until commit.
#[derive(Clone)]
pub(crate) struct FakeStore {
    pub(crate) calls: Recorder,
    pub(crate) job_id: Uuid,
    pub(crate) job_url: String,
    pub(crate) dequeue_empty: bool,
    pub(crate) fail_begin: bool,
    pub(crate) fail_dequeue: bool,
    pub(crate) fail_upsert: bool,
    /// 1-based index of the commit that fails.
    pub(crate) fail_commit_at: Option<usize>,
    pub(crate) state: Arc<Mutex<FakeState>>,
}

impl Default for FakeStore {
    fn default() -> Self {
        Self::with_url("http://store.com/item")
    }
}

impl FakeStore {
    pub(crate) fn with_url(url: &str) -> Self {
        Self {
            calls: Recorder::default(),
            job_id: Uuid::new_v4(),
            job_url: url.to_string(),
            dequeue_empty: false,
            fail_begin: false,
            fail_dequeue: false,
            fail_upsert: false,
            fail_commit_at: None,
            state: Arc::new(Mutex::new(FakeState {
                status: Some(JobStatus::Pending),
                offers: 0,
            })),
        }
    }

    pub(crate) fn status(&self) -> Option<JobStatus> {
        self.state.lock().unwrap().status
    }

    pub(crate) fn saved_offers(&self) -> usize {
        self.state.lock().unwrap().offers
    }
}

fn store_failure(what: &str) -> StoreError {
    StoreError::Database(sqlx::Error::Protocol(format!("{what} failed")))
}

#[async_trait]
impl SessionFactory for FakeStore {
    async fn begin(&self) -> Result<Box<dyn Session>, StoreError> {
        self.calls.record("Begin");
        if self.fail_begin {
            return Err(store_failure("begin"));
        }
        Ok(Box::new(FakeSession {
            store: self.clone(),
            staged: FakeState::default(),
        }))
    }
}

struct FakeSession {
    store: FakeStore,
    staged: FakeState,
}

#[async_trait]
impl Session for FakeSession {
    async fn dequeue(&mut self) -> Result<Option<ScrapeRequest>, StoreError> {
        self.store.calls.record("Dequeue");
        if self.store.fail_dequeue {
            return Err(store_failure("dequeue"));
        }
        if self.store.dequeue_empty {
            return Ok(None);
        }
        self.staged.status = Some(JobStatus::Processing);
        Ok(Some(ScrapeRequest {
            id: self.store.job_id,
            url: self.store.job_url.clone(),
            status: JobStatus::Processing,
            created_at: Utc::now(),
        }))
    }

    async fn mark_done(&mut self, _id: Uuid) -> Result<(), StoreError> {
        self.store.calls.record("MarkDone");
        self.staged.status = Some(JobStatus::Done);
        Ok(())
    }

    async fn mark_failed(&mut self, _id: Uuid) -> Result<(), StoreError> {
        self.store.calls.record("MarkFailed");
        self.staged.status = Some(JobStatus::Failed);
        Ok(())
    }

    async fn upsert_product(&mut self, product: &ProductSnapshot) -> Result<Uuid, StoreError> {
        self.store.calls.record("UpsertProduct");
        if self.store.fail_upsert {
            return Err(store_failure("upsert"));
        }
        Ok(product.id)
    }

    async fn insert_prices(
        &mut self,
        _product_id: Uuid,
        offers: &[Offer],
    ) -> Result<(), StoreError> {
        self.store.calls.record("InsertPrice");
        self.staged.offers += offers.len();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.store.calls.record("Commit");
        if self.store.fail_commit_at == Some(self.store.calls.count("Commit")) {
            return Err(store_failure("commit"));
        }
        let mut state = self.store.state.lock().unwrap();
        if let Some(status) = self.staged.status {
            state.status = Some(status);
        }
        state.offers += self.staged.offers;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.store.calls.record("Rollback");
        Ok(())
    }
}

/// Scraper double that records `Scrape` and returns one product with two offers.
#[derive(Clone)]
pub(crate) struct FakeScraper {
    calls: Recorder,
    fail: bool,
}

impl FakeScraper {
    pub(crate) fn new(calls: Recorder) -> Self {
        Self { calls, fail: false }
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Scraper for FakeScraper {
    async fn fetch(&self, _url: &str) -> Result<String, ScrapeError> {
        self.calls.record("Scrape");
        if self.fail {
            return Err(ScrapeError::UnexpectedStatus(StatusCode::BAD_GATEWAY));
        }
        Ok("<html></html>".to_string())
    }

    fn parse_product(&self, _page: &str) -> Result<ProductRecord, ScrapeError> {
        let product_id = Uuid::new_v4();
        let offer = |size: &str, price: f64| Offer {
            id: Uuid::new_v4(),
            product_id,
            price,
            currency: "EUR".into(),
            size: Some(size.into()),
            color: None,
            availability: "InStock".into(),
            observed_at: Utc::now(),
        };
        Ok(ProductRecord {
            product: ProductSnapshot {
                id: product_id,
                store: "store".into(),
                sku: "sku-1".into(),
                name: "Test product".into(),
                image_url: String::new(),
                url: String::new(),
            },
            offers: vec![offer("S", 10.0), offer("M", 12.5)],
        })
    }
}

/// In-memory queue with row-claim semantics: a dequeue takes the oldest
/// pending row away from every other session until rollback hands it back.
#[derive(Clone, Default)]
pub(crate) struct MemoryQueue {
    rows: Arc<Mutex<Vec<(Uuid, JobStatus)>>>,
}

impl MemoryQueue {
    pub(crate) fn with_jobs(n: usize) -> Self {
        let rows = (0..n).map(|_| (Uuid::new_v4(), JobStatus::Pending)).collect();
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    pub(crate) fn count(&self, status: JobStatus) -> usize {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| *s == status)
            .count()
    }
}

#[async_trait]
impl SessionFactory for MemoryQueue {
    async fn begin(&self) -> Result<Box<dyn Session>, StoreError> {
        Ok(Box::new(MemorySession {
            queue: self.clone(),
            claimed: None,
        }))
    }
}

struct MemorySession {
    queue: MemoryQueue,
    claimed: Option<Uuid>,
}

#[async_trait]
impl Session for MemorySession {
    async fn dequeue(&mut self) -> Result<Option<ScrapeRequest>, StoreError> {
        tokio::task::yield_now().await;
        let mut rows = self.queue.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|(_, s)| *s == JobStatus::Pending) else {
            return Ok(None);
        };
        row.1 = JobStatus::Processing;
        self.claimed = Some(row.0);
        Ok(Some(ScrapeRequest {
            id: row.0,
            url: "http://store.com/item".into(),
            status: JobStatus::Processing,
            created_at: Utc::now(),
        }))
    }

    async fn mark_done(&mut self, _id: Uuid) -> Result<(), StoreError> {
        Ok(())
    }

    async fn mark_failed(&mut self, _id: Uuid) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_product(&mut self, product: &ProductSnapshot) -> Result<Uuid, StoreError> {
        Ok(product.id)
    }

    async fn insert_prices(
        &mut self,
        _product_id: Uuid,
        _offers: &[Offer],
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        if let Some(id) = self.claimed {
            let mut rows = self.queue.rows.lock().unwrap();
            if let Some(row) = rows.iter_mut().find(|(rid, _)| *rid == id) {
                row.1 = JobStatus::Pending;
            }
        }
        Ok(())
    }
}
