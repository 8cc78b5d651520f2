use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{AdmissionError, StagingError, StoreError};
use crate::job::{Event, Job, JobId, NewJob, StateMachine, TransitionError};
use crate::pool::{PoolError, WorkerPool};
use crate::render::{RenderEngine, RenderError, RenderRequest, RenderResult};
use crate::stager::{AudioUpload, FileStager, ImageUpload, Uploads};
use crate::store::JobStore;

pub const MAX_IMAGES: usize = 10;

/// Retry policy for transient engine failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// delay = base_delay_ms * 2^(attempt - 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.base_delay_ms * 2u64.pow(attempt.saturating_sub(1))
    }
}

/// One admission request, as handed over by the web boundary.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub owner_id: String,
    pub images: Vec<ImageUpload>,
    pub audio: Option<AudioUpload>,
    pub format: Option<String>,
    pub transition_seconds: Option<u32>,
    /// An id the client tried to set; any value rejects the submission.
    pub client_id: Option<String>,
}

// Why a continuation gave up on a job.
#[derive(Debug, Error)]
enum ProcessError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Drives render jobs from admission to a terminal state.
///
/// A continuation owns its `Job` value for the whole run and writes it back
/// at every transition, guarded by the state it expects the store to hold.
pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    stager: FileStager,
    engine: Arc<dyn RenderEngine>,
    pool: WorkerPool,
    retry: RetryConfig,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        stager: FileStager,
        engine: Arc<dyn RenderEngine>,
        pool: WorkerPool,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            stager,
            engine,
            pool,
            retry,
        }
    }

    pub fn stager(&self) -> &FileStager {
        &self.stager
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Validates and persists a new job, then schedules its continuation.
    ///
    /// Returns as soon as the CREATED record is stored; staging may not have
    /// started yet. Fails without creating anything when the input is invalid
    /// or the worker pool has no room.
    pub async fn submit(self: &Arc<Self>, submission: Submission) -> Result<Job, AdmissionError> {
        validate(&submission)?;

        let reservation = self.pool.try_reserve().map_err(|e| {
            warn!(owner = %submission.owner_id, error = %e, "rejecting submission");
            match e {
                PoolError::Saturated | PoolError::ShutDown => AdmissionError::Saturated,
            }
        })?;

        let Submission {
            owner_id,
            images,
            audio,
            format,
            transition_seconds,
            ..
        } = submission;

        let new = NewJob::new(
            owner_id,
            images.len(),
            audio.as_ref().map(|a| a.filename.clone()),
            format,
            transition_seconds,
        );
        // On error the reservation drops here and its slot is released.
        let job = self.store.insert(new).await?;
        info!(
            job_id = job.id,
            owner = %job.owner_id,
            images = job.image_count,
            has_audio = job.has_audio,
            format = %job.format,
            "job admitted"
        );

        let this = Arc::clone(self);
        let job_id = job.id;
        let uploads = Uploads { images, audio };
        reservation.dispatch(async move {
            if let Err(e) = this.process(job_id, uploads).await {
                error!(job_id, error = %e, "could not load job for processing");
            }
        });

        Ok(job)
    }

    /// Runs one job to a terminal state. A job that is already terminal is
    /// returned untouched.
    pub async fn process(&self, job_id: JobId, uploads: Uploads) -> Result<Job, StoreError> {
        let mut job = self
            .store
            .get(job_id)
            .await?
            .ok_or(StoreError::NotFound(job_id))?;

        if job.is_terminal() {
            debug!(job_id, state = %job.state, "job already terminal, skipping");
            return Ok(job);
        }

        info!(job_id, "processing job");
        match self.execute(&mut job, &uploads).await {
            Ok(result) => {
                let output = result.into_output();
                if self
                    .persist_terminal(&mut job, Event::Rendered(output))
                    .await
                    .is_ok()
                {
                    info!(
                        job_id,
                        output = job.output_path.as_deref().unwrap_or_default(),
                        duration = job.duration_seconds.unwrap_or_default(),
                        "job completed"
                    );
                }
            }
            Err(cause) => self.fail(&mut job, &cause).await,
        }

        Ok(job)
    }

    /// Read-through to the store for polling clients.
    pub async fn get_status(&self, job_id: JobId) -> Result<Job, StoreError> {
        self.store
            .get(job_id)
            .await?
            .ok_or(StoreError::NotFound(job_id))
    }

    /// Stops accepting submissions and waits for in-flight jobs.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    async fn execute(&self, job: &mut Job, uploads: &Uploads) -> Result<RenderResult, ProcessError> {
        self.advance(job, Event::BeginStaging).await?;
        let assets = self.stager.stage(job.id, uploads).await?;

        self.advance(job, Event::BeginRendering).await?;
        let request = RenderRequest::for_job(job, &assets);
        let result = self.render_with_retry(job.id, &request).await?;
        Ok(result)
    }

    // Applies a non-terminal transition; the in-memory job only changes once
    // the store accepted it.
    async fn advance(&self, job: &mut Job, event: Event) -> Result<(), ProcessError> {
        let mut next = job.clone();
        let expected = StateMachine::apply(&mut next, event)?;
        self.store.update(&next, expected).await?;
        debug!(job_id = job.id, from = %expected, to = %next.state, "job advanced");
        *job = next;
        Ok(())
    }

    // Terminal writes get one synchronous retry. A second failure leaves the
    // stored record non-terminal and needs an operator.
    async fn persist_terminal(&self, job: &mut Job, event: Event) -> Result<(), StoreError> {
        let mut next = job.clone();
        let expected = match StateMachine::apply(&mut next, event) {
            Ok(expected) => expected,
            Err(e) => {
                warn!(job_id = job.id, error = %e, "terminal transition not applicable");
                return Ok(());
            }
        };

        let result = match self.store.update(&next, expected).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(job_id = job.id, error = %first, "terminal write failed, retrying once");
                self.store.update(&next, expected).await
            }
        };

        match result {
            Ok(()) => {
                *job = next;
                Ok(())
            }
            Err(e) => {
                error!(
                    job_id = job.id,
                    stored_state = %expected,
                    target_state = %next.state,
                    error = %e,
                    "CRITICAL: terminal state could not be persisted, job is stuck and needs operator intervention"
                );
                Err(e)
            }
        }
    }

    async fn fail(&self, job: &mut Job, cause: &ProcessError) {
        error!(job_id = job.id, state = %job.state, error = %cause, "job failed");

        // Already logged inside on failure; cleanup runs regardless.
        let _ = self.persist_terminal(job, Event::Fail).await;

        let report = self.stager.purge(job.id).await;
        if !report.is_clean() {
            warn!(
                job_id = job.id,
                failures = report.failures.len(),
                "staged files were only partially purged"
            );
        }
    }

    async fn render_with_retry(
        &self,
        job_id: JobId,
        request: &RenderRequest,
    ) -> Result<RenderResult, RenderError> {
        let mut attempt = 0;
        loop {
            match self.engine.invoke(request).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay_ms = self.retry.delay_for_attempt(attempt);
                    warn!(
                        job_id,
                        attempt,
                        max = self.retry.max_retries,
                        delay_ms,
                        error = %e,
                        "render failed, retrying"
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn validate(submission: &Submission) -> Result<(), AdmissionError> {
    let client_id = submission.client_id.as_deref().map(str::trim);
    if let Some(id) = client_id.filter(|id| !id.is_empty()) {
        return Err(AdmissionError::ClientSuppliedId(id.to_string()));
    }

    let count = submission.images.len();
    if count == 0 {
        return Err(AdmissionError::NoImages);
    }
    if count > MAX_IMAGES {
        return Err(AdmissionError::TooManyImages {
            count,
            max: MAX_IMAGES,
        });
    }

    let mut seen = HashSet::with_capacity(count);
    for image in &submission.images {
        if image.order >= MAX_IMAGES {
            return Err(AdmissionError::OrderOutOfRange {
                order: image.order,
                max: MAX_IMAGES - 1,
            });
        }
        if !seen.insert(image.order) {
            return Err(AdmissionError::DuplicateOrder(image.order));
        }
    }
    Ok(())
}
