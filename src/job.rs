//! Background ingestion job monitor.
//!
//! Owns the lifecycle of at most one ingestion job: the start request, the
//! status polling loop, terminal success or failure, and reset.
//!
//! ```text
//! Idle ──submit──▶ Submitting ──accepted──▶ Polling ──success──▶ Succeeded
//!                      │                      │  ▲                  │
//!                      │ rejected             │  └─ still running   │ dismiss /
//!                      ▼                      ▼                     │ auto-clear
//!                    Failed ◀────── job error / transport limit     ▼
//!                      └──────────── dismiss ─────────────────▶  Idle
//!
//! any state ──cancel──▶ Idle
//! ```
//!
//! # Staleness
//!
//! The job and a generation counter live together in one watch channel.
//! Every user action that invalidates the current job (`submit`, `dismiss`,
//! `cancel`) bumps the generation, and every asynchronous write checks it
//! inside the same atomic update. A status response that arrives after
//! `cancel()` therefore finds a newer generation and is dropped; it can
//! never move the job out of `Idle`.
//!
//! The polling task is also aborted on cancellation, and checks the
//! generation before each request, so no new status request is issued
//! once a job is cancelled.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::error::{ServiceError, ValidationError};
use crate::models::{is_http_url, IngestDocument, IngestStatus, SubmitAccepted};
use crate::remote::IngestionService;

const STARTING_STEP: &str = "Starting upload...";
const DEFAULT_ACCEPT_MESSAGE: &str = "Upload started in background.";
const REJECTED_MESSAGE: &str = "Failed to start upload. Please try again.";
const NETWORK_MESSAGE: &str = "Network error. Please check your connection and try again.";
const PROCESSING_FAILED_MESSAGE: &str = "An error occurred during processing.";
const LOST_CONTACT_MESSAGE: &str = "Lost contact with the ingestion service.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Idle,
    Submitting,
    Polling,
    Succeeded,
    Failed,
}

/// Snapshot of the current ingestion job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionJob {
    pub state: JobState,
    /// 0..=100
    pub progress_percent: u8,
    pub current_step_label: String,
    pub error_message: Option<String>,
    /// Message the service returned when it accepted the job.
    pub status_message: Option<String>,
}

impl IngestionJob {
    fn idle() -> Self {
        Self {
            state: JobState::Idle,
            progress_percent: 0,
            current_step_label: String::new(),
            error_message: None,
            status_message: None,
        }
    }

    fn submitting() -> Self {
        Self {
            state: JobState::Submitting,
            ..Self::idle()
        }
    }

    /// Submitting or polling.
    pub fn is_live(&self) -> bool {
        matches!(self.state, JobState::Submitting | JobState::Polling)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Succeeded | JobState::Failed)
    }
}

/// Timing and tolerance of the polling protocol.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub poll_interval: Duration,
    /// Delay before a succeeded job clears itself back to `Idle`.
    pub success_clear_delay: Duration,
    /// Consecutive transport failures tolerated while polling.
    pub max_poll_failures: u32,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for JobSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            success_clear_delay: config.success_clear_delay(),
            max_poll_failures: config.max_poll_failures.max(1),
        }
    }
}

#[derive(Debug)]
struct Slot {
    job: IngestionJob,
    generation: u64,
}

type SlotSender = Arc<watch::Sender<Slot>>;

/// Apply `f` to the job if `generation` is still current. Returns whether
/// the write happened.
fn apply(slot: &watch::Sender<Slot>, generation: u64, f: impl FnOnce(&mut IngestionJob)) -> bool {
    slot.send_if_modified(|s| {
        if s.generation != generation {
            return false;
        }
        f(&mut s.job);
        true
    })
}

/// Handle to a running poll loop. Cancelling it aborts the task; the
/// generation check makes any response already in flight inert.
#[derive(Debug)]
struct PollHandle {
    generation: u64,
    abort: AbortHandle,
}

impl PollHandle {
    fn cancel(self) {
        debug!(generation = self.generation, "stopping poll task");
        self.abort.abort();
    }
}

enum Submission {
    Url(String),
    Document(Box<IngestDocument>),
}

/// Receives job snapshots as they change.
pub struct JobUpdates {
    rx: watch::Receiver<Slot>,
}

impl JobUpdates {
    /// Wait for the next change. `None` once the monitor is gone.
    pub async fn changed(&mut self) -> Option<IngestionJob> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().job.clone())
    }

    /// Wait until the job satisfies `pred` (checked against the current
    /// value first).
    pub async fn wait_for(
        &mut self,
        mut pred: impl FnMut(&IngestionJob) -> bool,
    ) -> Option<IngestionJob> {
        let slot = self.rx.wait_for(|s| pred(&s.job)).await.ok()?;
        Some(slot.job.clone())
    }
}

pub struct JobMonitor {
    service: Arc<dyn IngestionService>,
    settings: JobSettings,
    slot: SlotSender,
    poller: Mutex<Option<PollHandle>>,
}

impl JobMonitor {
    pub fn new(service: Arc<dyn IngestionService>, settings: JobSettings) -> Self {
        let (tx, _rx) = watch::channel(Slot {
            job: IngestionJob::idle(),
            generation: 0,
        });
        Self {
            service,
            settings,
            slot: Arc::new(tx),
            poller: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> IngestionJob {
        self.slot.borrow().job.clone()
    }

    pub fn subscribe(&self) -> JobUpdates {
        JobUpdates {
            rx: self.slot.subscribe(),
        }
    }

    /// Start ingesting the article at `url`.
    ///
    /// Returns `Err` only for local validation failures, in which case no
    /// request is sent and the job is unchanged. A rejection or transport
    /// failure from the service is reported as a `Failed` job.
    pub async fn submit(&self, url: &str) -> Result<IngestionJob, ValidationError> {
        let url = url.trim();
        if !is_http_url(url) {
            return Err(ValidationError::InvalidUrl(url.to_string()));
        }
        self.start(Submission::Url(url.to_string())).await
    }

    /// Start ingesting a structured document. Same lifecycle as [`submit`](Self::submit).
    pub async fn submit_document(
        &self,
        doc: IngestDocument,
    ) -> Result<IngestionJob, ValidationError> {
        self.start(Submission::Document(Box::new(doc))).await
    }

    /// Clear a finished job. No-op (returns `false`) unless the job is
    /// `Succeeded` or `Failed`; a pending auto-clear is cancelled.
    pub async fn dismiss(&self) -> bool {
        let mut dismissed = false;
        self.slot.send_if_modified(|s| {
            if !s.job.is_terminal() {
                return false;
            }
            s.generation += 1;
            s.job = IngestionJob::idle();
            dismissed = true;
            true
        });
        if dismissed {
            self.stop_poller().await;
            debug!("ingestion job dismissed");
        }
        dismissed
    }

    /// Hard stop from any state: back to `Idle`, no further status requests,
    /// and late responses are discarded.
    pub async fn cancel(&self) {
        let mut was = JobState::Idle;
        self.slot.send_modify(|s| {
            was = s.job.state;
            s.generation += 1;
            s.job = IngestionJob::idle();
        });
        self.stop_poller().await;
        if was != JobState::Idle {
            info!(from = ?was, "ingestion job cancelled");
        }
    }

    async fn stop_poller(&self) {
        if let Some(handle) = self.poller.lock().await.take() {
            handle.cancel();
        }
    }

    async fn start(&self, submission: Submission) -> Result<IngestionJob, ValidationError> {
        let mut generation = None;
        self.slot.send_if_modified(|s| {
            if s.job.is_live() {
                return false;
            }
            s.generation += 1;
            s.job = IngestionJob::submitting();
            generation = Some(s.generation);
            true
        });
        let generation = generation.ok_or(ValidationError::JobInProgress)?;
        // A finished job may still have its auto-clear pending.
        self.stop_poller().await;

        let outcome = match &submission {
            Submission::Url(url) => {
                info!(url = %url, "submitting article for ingestion");
                self.service.submit_url(url).await
            }
            Submission::Document(doc) => {
                info!(title = %doc.title, "submitting document for ingestion");
                self.service.submit_document(doc).await
            }
        };

        match outcome {
            Ok(accepted) => self.begin_polling(generation, accepted).await,
            Err(e) => {
                warn!(error = %e, "ingestion submit failed");
                let message = match &e {
                    ServiceError::Rejected { .. } => {
                        e.remote_message().unwrap_or(REJECTED_MESSAGE).to_string()
                    }
                    _ => NETWORK_MESSAGE.to_string(),
                };
                let applied = apply(&self.slot, generation, |job| {
                    job.state = JobState::Failed;
                    job.error_message = Some(message);
                });
                if !applied {
                    debug!(generation, "discarding stale submit rejection");
                }
            }
        }

        Ok(self.snapshot())
    }

    async fn begin_polling(&self, generation: u64, accepted: SubmitAccepted) {
        let applied = apply(&self.slot, generation, |job| {
            job.state = JobState::Polling;
            job.progress_percent = 0;
            job.current_step_label = STARTING_STEP.to_string();
            job.status_message = Some(
                accepted
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_ACCEPT_MESSAGE.to_string()),
            );
        });
        if !applied {
            debug!(generation, "job cancelled before acceptance arrived");
            return;
        }

        let task = tokio::spawn(poll_loop(
            self.service.clone(),
            self.slot.clone(),
            self.settings.clone(),
            generation,
        ));
        let mut poller = self.poller.lock().await;
        if let Some(previous) = poller.replace(PollHandle {
            generation,
            abort: task.abort_handle(),
        }) {
            previous.cancel();
        }
    }
}

impl Drop for JobMonitor {
    fn drop(&mut self) {
        if let Ok(mut poller) = self.poller.try_lock() {
            if let Some(handle) = poller.take() {
                handle.cancel();
            }
        }
    }
}

/// Poll the status endpoint until the job reaches a terminal state.
///
/// One request at a time: the next tick is only awaited after the previous
/// response has been handled, and missed ticks are skipped.
async fn poll_loop(
    service: Arc<dyn IngestionService>,
    slot: SlotSender,
    settings: JobSettings,
    generation: u64,
) {
    let mut ticker = tokio::time::interval(settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut consecutive_failures = 0u32;

    loop {
        ticker.tick().await;
        if slot.borrow().generation != generation {
            debug!(generation, "poll loop superseded");
            return;
        }

        match service.status().await {
            Ok(status) if status.is_uploading => {
                consecutive_failures = 0;
                let applied = apply(&slot, generation, |job| {
                    job.progress_percent = clamp_progress(status.progress);
                    if !status.current_step.is_empty() {
                        job.current_step_label = status.current_step.clone();
                    }
                });
                if !applied {
                    debug!(generation, "discarding stale status response");
                    return;
                }
                debug!(
                    progress = status.progress,
                    step = %status.current_step,
                    "ingestion in progress"
                );
            }
            Ok(status) => {
                finish(&slot, &settings, generation, status).await;
                return;
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(
                    error = %e,
                    attempt = consecutive_failures,
                    limit = settings.max_poll_failures,
                    "status poll failed"
                );
                if consecutive_failures >= settings.max_poll_failures {
                    apply(&slot, generation, |job| {
                        job.state = JobState::Failed;
                        job.error_message = Some(LOST_CONTACT_MESSAGE.to_string());
                    });
                    return;
                }
            }
        }
    }
}

/// Record a terminal status, then run the auto-clear window on success.
async fn finish(slot: &watch::Sender<Slot>, settings: &JobSettings, generation: u64, status: IngestStatus) {
    let succeeded = status.success;
    let applied = apply(slot, generation, |job| {
        if succeeded {
            job.state = JobState::Succeeded;
            job.progress_percent = 100;
            job.error_message = None;
        } else {
            job.state = JobState::Failed;
            job.progress_percent = clamp_progress(status.progress);
            job.error_message = Some(
                status
                    .error
                    .clone()
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| PROCESSING_FAILED_MESSAGE.to_string()),
            );
        }
        if !status.current_step.is_empty() {
            job.current_step_label = status.current_step.clone();
        }
    });
    if !applied {
        debug!(generation, "discarding stale terminal status");
        return;
    }

    if !succeeded {
        info!(error = ?status.error, "ingestion job failed");
        return;
    }

    info!("ingestion job succeeded");
    tokio::time::sleep(settings.success_clear_delay).await;
    let cleared = apply(slot, generation, |job| {
        if job.state == JobState::Succeeded {
            *job = IngestionJob::idle();
        }
    });
    if cleared {
        debug!(generation, "succeeded job auto-cleared");
    }
}

fn clamp_progress(progress: i64) -> u8 {
    progress.clamp(0, 100) as u8
}
