//! Scrape-job worker.
//!
//! One iteration runs two phases, each in its own session:
//! 1. claim: dequeue the oldest pending request and commit the flip to
//!    `processing` straight away, so the row lock is never held across the
//!    network call;
//! 2. process: resolve a scraper for the URL, scrape, then open a fresh
//!    session to persist the product and offers and mark the job `done`.
//!    Unsupported stores and failed scrapes are dead-lettered (`failed`).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::{Session, SessionFactory, StoreError};
use crate::error::{JobError, JobErrorKind, RunOutcome, WorkerError};
use crate::model::{ProductRecord, ScrapeRequest};
use crate::scrapers::ScraperRegistry;

pub mod supervisor;

#[cfg(test)]
pub(crate) mod fakes;

pub use supervisor::{Supervisor, SupervisorExit};

/// Anything the supervisor can drive one iteration at a time.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_once(&self) -> Result<RunOutcome, WorkerError>;
}

pub struct Worker {
    sessions: Arc<dyn SessionFactory>,
    registry: Arc<ScraperRegistry>,
}

impl Worker {
    pub fn new(sessions: Arc<dyn SessionFactory>, registry: Arc<ScraperRegistry>) -> Self {
        Self { sessions, registry }
    }

    /// Claim phase. `Ok(None)` means nothing was pending.
    #[instrument(skip_all)]
    pub async fn claim_job(&self) -> Result<Option<ScrapeRequest>, WorkerError> {
        let mut session = self.sessions.begin().await.map_err(WorkerError::Claim)?;

        let job = match session.dequeue().await {
            Ok(job) => job,
            Err(err) => {
                rollback_quietly(session).await;
                return Err(WorkerError::Claim(err));
            }
        };

        let Some(job) = job else {
            rollback_quietly(session).await;
            return Ok(None);
        };

        // A failed commit here leaves the row's fate unknown to us; the caller
        // treats it as a system error, never as a job error.
        session.commit().await.map_err(WorkerError::Claim)?;
        info!(job_id = %job.id, url = %job.url, "claimed job");
        Ok(Some(job))
    }

    /// Process phase for a job this worker has already claimed.
    #[instrument(skip_all, fields(job_id = %job.id, url = %job.url))]
    pub async fn process_job(&self, job: &ScrapeRequest) -> Result<(), WorkerError> {
        let scraped = match self.registry.new_scraper_for(&job.url) {
            Ok(scraper) => scraper
                .scrape(&job.url)
                .await
                .map_err(|e| JobError::new(job.id, JobErrorKind::ScrapeFailed, e)),
            Err(e) => Err(JobError::new(job.id, JobErrorKind::UnsupportedStore, e)),
        };

        let mut session = self
            .sessions
            .begin()
            .await
            .map_err(|source| process_error(job.id, source))?;

        match scraped {
            Err(job_err) => {
                warn!(kind = %job_err.kind, error = %job_err.source, "dead-lettering job");
                if let Err(source) = session.mark_failed(job.id).await {
                    rollback_quietly(session).await;
                    return Err(process_error(job.id, source));
                }
                session
                    .commit()
                    .await
                    .map_err(|source| process_error(job.id, source))?;
                Err(job_err.into())
            }
            Ok(record) => {
                if let Err(source) = persist(session.as_mut(), job.id, &record).await {
                    // The job stays in `processing`; nothing marks it failed.
                    rollback_quietly(session).await;
                    return Err(process_error(job.id, source));
                }
                session
                    .commit()
                    .await
                    .map_err(|source| process_error(job.id, source))?;
                info!(
                    sku = %record.product.sku,
                    offers = record.offers.len(),
                    "job done"
                );
                Ok(())
            }
        }
    }

    pub async fn run_once(&self) -> Result<RunOutcome, WorkerError> {
        let Some(job) = self.claim_job().await? else {
            return Ok(RunOutcome::Idle);
        };
        self.process_job(&job).await?;
        Ok(RunOutcome::Completed(job.id))
    }
}

#[async_trait]
impl JobRunner for Worker {
    async fn run_once(&self) -> Result<RunOutcome, WorkerError> {
        Worker::run_once(self).await
    }
}

async fn persist(
    session: &mut dyn Session,
    job_id: Uuid,
    record: &ProductRecord,
) -> Result<(), StoreError> {
    let product_id = session.upsert_product(&record.product).await?;
    session.insert_prices(product_id, &record.offers).await?;
    session.mark_done(job_id).await
}

async fn rollback_quietly(session: Box<dyn Session>) {
    if let Err(err) = session.rollback().await {
        warn!(?err, "rollback failed");
    }
}

fn process_error(job_id: Uuid, source: StoreError) -> WorkerError {
    WorkerError::Process { job_id, source }
}
