// src/core/orchestrator.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::aggregator::summarize;
use crate::core::models::{Escalation, InvocationOutcome, JobStatus, ScanJob};
use crate::core::notifier::ModerationNotifier;
use crate::core::scanner::UrlScanner;
use crate::core::store::{JobStore, StoreError};

/// Infrastructure failures that abort an invocation. Per-URL problems never
/// end up here; they become unsafe `ScanResult`s instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("job store failure: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Pause between two provider calls of the same job.
    pub url_delay: Duration,
    /// A `processing` job untouched for this long may be claimed again.
    pub stale_after: chrono::Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            url_delay: Duration::from_millis(100),
            stale_after: chrono::Duration::minutes(5),
        }
    }
}

/// Claims queued scan jobs and drives them to a terminal verdict.
pub struct ScanOrchestrator {
    store: Arc<dyn JobStore>,
    scanner: UrlScanner,
    notifier: Arc<dyn ModerationNotifier>,
    config: OrchestratorConfig,
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        scanner: UrlScanner,
        notifier: Arc<dyn ModerationNotifier>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { store, scanner, notifier, config }
    }

    /// Oldest pending (or stale) job, already switched to `processing`.
    /// `None` just means the queue is empty.
    pub async fn claim_next_job(&self) -> Result<Option<ScanJob>, PipelineError> {
        let job = self.store.claim_next(Utc::now(), self.config.stale_after).await?;
        match &job {
            Some(job) => info!(
                scan_id = %job.id,
                urls = job.urls.len(),
                attempt = job.attempts,
                "Claimed scan job."
            ),
            None => debug!("No pending scan jobs."),
        }
        Ok(job)
    }

    /// Scans every URL of a claimed job in order, persists the verdict and
    /// escalates unsafe content.
    ///
    /// Each per-URL verdict is recorded as soon as it exists, so a crash
    /// mid-job leaves the partial findings of the current claim in the store.
    ///
    /// # Arguments
    ///
    /// * `job` - A job returned by [`Self::claim_next_job`]; its `claim_id`
    ///   must still be the current owner token.
    ///
    /// # Returns
    ///
    /// The job as stored after completion, with status `safe` or `unsafe`.
    /// Fails with [`StoreError::ClaimLost`] if the job was never claimed or
    /// has since been reclaimed by another worker.
    pub async fn process_job(&self, job: ScanJob) -> Result<ScanJob, PipelineError> {
        let claim_id = job.claim_id.ok_or(StoreError::ClaimLost(job.id))?;
        let mut results = Vec::with_capacity(job.urls.len());

        for (index, url) in job.urls.iter().enumerate() {
            if index > 0 && !self.config.url_delay.is_zero() {
                tokio::time::sleep(self.config.url_delay).await;
            }
            let result = self.scanner.scan(url).await;
            self.store.record_result(job.id, claim_id, &result).await?;
            results.push(result);
        }

        let now = Utc::now();
        let (status, findings) = summarize(results, now);
        let completed = self.store.complete(job.id, claim_id, status, findings, now).await?;
        info!(
            scan_id = %completed.id,
            status = %completed.status,
            total_urls = completed.urls.len(),
            unsafe_count = completed.findings.unsafe_urls.len(),
            "Scan job finished."
        );

        if completed.status == JobStatus::Unsafe {
            self.escalate(&completed).await;
        }
        Ok(completed)
    }

    /// One scheduler tick: at most one job.
    pub async fn run_once(&self) -> Result<InvocationOutcome, PipelineError> {
        let Some(job) = self.claim_next_job().await? else {
            return Ok(InvocationOutcome::idle());
        };
        let scan_id = job.id;
        let completed = self.process_job(job).await.inspect_err(|e| {
            error!(
                scan_id = %scan_id,
                error = %e,
                "Scan job aborted; it stays processing until reclaimed."
            );
        })?;
        Ok(InvocationOutcome::from_job(&completed))
    }

    /// Delivery failures are logged only; the stored verdict stands.
    async fn escalate(&self, job: &ScanJob) {
        let escalation = Escalation::for_job(job);
        if let Err(e) = self.notifier.notify(&escalation).await {
            warn!(
                scan_id = %job.id,
                error = %e,
                "Failed to escalate unsafe scan to moderation."
            );
        }
    }
}
