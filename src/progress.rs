//! Ingestion progress reporting.
//!
//! Renders ingestion job snapshots during `spill ingest` so users see the
//! current step and percentage while the job is polled. Progress goes to
//! **stderr** so stdout stays parseable for scripts.

use std::io::Write;

use crate::job::{IngestionJob, JobState};

/// Reports ingestion job progress. Implementations write to stderr (human or JSON).
pub trait JobProgressReporter: Send + Sync {
    /// Emit one job snapshot. Called on every observed change.
    fn report(&self, job: &IngestionJob);
}

/// Human-friendly progress on stderr: `ingest  [######--------------]  30%  Scraping`.
pub struct StderrProgress;

impl JobProgressReporter for StderrProgress {
    fn report(&self, job: &IngestionJob) {
        let line = match job.state {
            JobState::Idle => return,
            JobState::Submitting => "ingest  submitting...\n".to_string(),
            JobState::Polling => format!(
                "ingest  {}  {:>3}%  {}\n",
                progress_bar(job.progress_percent, 20),
                job.progress_percent,
                job.current_step_label
            ),
            JobState::Succeeded => format!(
                "ingest  done  {}\n",
                job.status_message.as_deref().unwrap_or("Article added.")
            ),
            JobState::Failed => format!(
                "ingest  failed  {}\n",
                job.error_message.as_deref().unwrap_or("unknown error")
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JobProgressReporter for JsonProgress {
    fn report(&self, job: &IngestionJob) {
        let obj = serde_json::json!({
            "event": "progress",
            "job": job,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl JobProgressReporter for NoProgress {
    fn report(&self, _job: &IngestionJob) {}
}

fn progress_bar(percent: u8, width: usize) -> String {
    let filled = (usize::from(percent.min(100)) * width) / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn JobProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
