//! Outcome and error taxonomy for one worker iteration.
//!
//! `Idle` is a successful outcome. A [`JobError`] means the job was handled and
//! dead-lettered while the worker stayed healthy. Every other [`WorkerError`]
//! is a system failure that counts against the supervisor's tolerance.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::db::StoreError;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobErrorKind {
    UnsupportedStore,
    ScrapeFailed,
}

impl JobErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobErrorKind::UnsupportedStore => "unsupported_store",
            JobErrorKind::ScrapeFailed => "scrape_failed",
        }
    }
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job that could not be completed because of its input or its target.
#[derive(Debug, Error)]
#[error("job {job_id} ({kind}): {source}")]
pub struct JobError {
    pub job_id: Uuid,
    pub kind: JobErrorKind,
    #[source]
    pub source: BoxError,
}

impl JobError {
    pub fn new(job_id: Uuid, kind: JobErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            job_id,
            kind,
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("claim job: {0}")]
    Claim(#[source] StoreError),
    #[error("process job {job_id}: {source}")]
    Process {
        job_id: Uuid,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Job(#[from] JobError),
}

impl WorkerError {
    /// The store failure underneath a system error, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            WorkerError::Claim(source) | WorkerError::Process { source, .. } => Some(source),
            WorkerError::Job(_) => None,
        }
    }
}

/// Successful result of one worker iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(Uuid),
    Idle,
}
