//! One-shot CLI commands: `spill search`, `spill ingest`, `spill ingest-file`,
//! and `spill summarize`.
//!
//! Each command builds its own HTTP-backed components from the config, runs
//! to completion, and prints to stdout. Errors surface as `anyhow` errors so
//! the binary exits non-zero.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::enrich::{EnrichmentState, EnrichmentTracker};
use crate::http::HttpServices;
use crate::job::{IngestionJob, JobMonitor, JobSettings, JobState, JobUpdates};
use crate::models::{IngestDocument, SortMode, ALL_TAG};
use crate::progress::JobProgressReporter;
use crate::session::{SearchOutcome, SessionController, SessionView};

/// Search, then apply tag, sort, and page before printing.
pub async fn run_search(
    config: &Config,
    query: &str,
    tag: Option<String>,
    sort: SortMode,
    page: usize,
    json: bool,
) -> Result<()> {
    let session = SessionController::from_config(config)?;

    match session.search(query).await? {
        SearchOutcome::Applied { .. } => {}
        SearchOutcome::Failed { status } => bail!("{}", status),
        SearchOutcome::Superseded => bail!("search was superseded"),
    }

    if let Some(tag) = tag {
        if !session.set_active_tag(&tag).await {
            let view = session.view().await;
            let available: Vec<&str> = view.facets.iter().map(|f| f.name.as_str()).collect();
            bail!("Unknown tag: {}. Available: {}", tag, available.join(", "));
        }
    }
    session.set_sort_mode(sort).await;
    session.set_page(page).await;

    let view = session.view().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_view(&session, &view);
    }
    Ok(())
}

/// Render the results area the way the shell and `spill search` show it.
pub fn print_view(session: &SessionController, view: &SessionView) {
    println!("{}", view.status);
    if view.page.filtered_count == 0 {
        if view.query.is_some() {
            println!("No results.");
        }
        return;
    }

    let facets: Vec<String> = view
        .facets
        .iter()
        .map(|f| {
            let marker = if f.name == view.active_tag { "*" } else { "" };
            format!("{}{} ({})", marker, f.name, f.count)
        })
        .collect();
    println!("tags: {}", facets.join("  "));
    println!(
        "sort: {}  page {}/{}",
        view.sort_mode.label(),
        view.page.page,
        view.page.total_pages
    );
    println!();

    for record in &view.page.records {
        let link = session.view_link(record);
        println!("[{}] {}", record.id, record.title);
        if !record.authors.is_empty() {
            println!("    by: {}", record.authors.join(", "));
        }
        if let Some(published) = record.published_at {
            println!("    published: {}", published.format("%Y-%m-%d"));
        }
        let tags: Vec<&str> = record
            .tags
            .iter()
            .map(String::as_str)
            .filter(|t| *t != ALL_TAG)
            .collect();
        if !tags.is_empty() {
            println!("    tags: {}", tags.join(", "));
        }
        if let Some(badge) = link.badge {
            println!("    {}", badge);
        }
        println!("    {}: {}", link.label, link.url);
        if !record.description.trim().is_empty() {
            println!("    \"{}\"", record.description.replace('\n', " ").trim());
        }
        println!();
    }
}

/// Submit an article URL and follow the job to a terminal state.
pub async fn run_ingest(
    config: &Config,
    url: &str,
    reporter: Box<dyn JobProgressReporter>,
) -> Result<()> {
    let monitor = job_monitor(config)?;
    let mut updates = monitor.subscribe();
    let job = monitor.submit(url).await?;
    let job = follow_job(job, &mut updates, reporter.as_ref()).await?;
    finish_ingest(job)
}

/// Read a JSON document from `path`, check it, and ingest it.
pub async fn run_ingest_file(
    config: &Config,
    path: &Path,
    reporter: Box<dyn JobProgressReporter>,
) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))?;
    let doc = IngestDocument::from_json_str(&raw)?;

    let monitor = job_monitor(config)?;
    let mut updates = monitor.subscribe();
    let job = monitor.submit_document(doc).await?;
    let job = follow_job(job, &mut updates, reporter.as_ref()).await?;
    finish_ingest(job)
}

fn job_monitor(config: &Config) -> Result<JobMonitor> {
    let services = Arc::new(HttpServices::new(&config.services)?);
    Ok(JobMonitor::new(services, JobSettings::from(&config.ingest)))
}

/// Report every change until the job is terminal or has gone back to idle.
pub async fn follow_job(
    mut job: IngestionJob,
    updates: &mut JobUpdates,
    reporter: &dyn JobProgressReporter,
) -> Result<IngestionJob> {
    reporter.report(&job);
    while job.is_live() {
        match updates.changed().await {
            Some(next) => {
                if next != job {
                    reporter.report(&next);
                }
                job = next;
            }
            None => bail!("ingestion monitor stopped"),
        }
    }
    Ok(job)
}

fn finish_ingest(job: IngestionJob) -> Result<()> {
    match job.state {
        JobState::Succeeded => {
            println!(
                "{}",
                job.status_message.as_deref().unwrap_or("Article added.")
            );
            Ok(())
        }
        JobState::Failed => bail!(
            "{}",
            job.error_message
                .as_deref()
                .unwrap_or("Ingestion failed.")
        ),
        state => bail!("ingestion ended in unexpected state {:?}", state),
    }
}

/// Summarize each URL concurrently and print the summaries in argument order.
pub async fn run_summarize(config: &Config, urls: &[String]) -> Result<()> {
    if urls.is_empty() {
        bail!("No URLs given.");
    }
    let services = Arc::new(HttpServices::new(&config.services)?);
    let tracker = EnrichmentTracker::new(services, config.enrich.summary_length);
    let mut updates = tracker.subscribe();

    for url in urls {
        tracker.request_summary(url, url);
    }

    let mut failed = 0usize;
    for url in urls {
        let entry = updates
            .wait_for(url, |e| {
                matches!(e.state, EnrichmentState::Ready | EnrichmentState::Error)
            })
            .await
            .context("summary tracker stopped")?;
        println!("--- {} ---", url);
        match entry.state {
            EnrichmentState::Ready => println!("{}", entry.text.unwrap_or_default()),
            _ => {
                failed += 1;
                println!(
                    "Error: {}",
                    entry.error_message.as_deref().unwrap_or("summary failed")
                );
            }
        }
        println!();
    }

    if failed > 0 {
        bail!("{} of {} summaries failed", failed, urls.len());
    }
    Ok(())
}
