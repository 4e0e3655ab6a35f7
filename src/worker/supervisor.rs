use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::JobRunner;
use crate::error::{RunOutcome, WorkerError};

type FatalHook = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    Cancelled,
    /// Consecutive system failures reached the tolerance.
    Fatal { failures: u32 },
}

/// Drives a [`JobRunner`] in a loop, sleeping `poll_interval` between
/// iterations and giving up after `failure_tolerance` consecutive system
/// failures. Job errors and successes reset the count; idle iterations leave
/// it untouched.
pub struct Supervisor<W> {
    worker: W,
    poll_interval: Duration,
    failure_tolerance: u32,
    on_fatal: FatalHook,
}

impl<W: JobRunner> Supervisor<W> {
    pub fn new(worker: W, poll_interval: Duration, failure_tolerance: u32) -> Self {
        Self {
            worker,
            poll_interval,
            failure_tolerance: failure_tolerance.max(1),
            on_fatal: Box::new(|| {}),
        }
    }

    /// Invoked once, right before `run` returns [`SupervisorExit::Fatal`].
    pub fn on_fatal<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_fatal = Box::new(hook);
        self
    }

    pub async fn run(&self, cancel: CancellationToken) -> SupervisorExit {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            failure_tolerance = self.failure_tolerance,
            "worker loop started"
        );
        let mut failures: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                info!("worker loop cancelled");
                return SupervisorExit::Cancelled;
            }

            match self.worker.run_once().await {
                Ok(RunOutcome::Completed(job_id)) => {
                    debug!(%job_id, "job completed");
                    failures = 0;
                }
                Ok(RunOutcome::Idle) => {}
                Err(WorkerError::Job(err)) => {
                    warn!(
                        job_id = %err.job_id,
                        kind = %err.kind,
                        error = %err.source,
                        "job failed"
                    );
                    failures = 0;
                }
                Err(err @ (WorkerError::Claim(_) | WorkerError::Process { .. })) => {
                    failures += 1;
                    error!(error = %err, failures, "worker iteration failed");
                    if failures >= self.failure_tolerance {
                        error!(failures, "failure tolerance reached, stopping worker");
                        (self.on_fatal)();
                        return SupervisorExit::Fatal { failures };
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("worker loop cancelled");
                    return SupervisorExit::Cancelled;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
