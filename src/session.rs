//! Session controller.
//!
//! Glue between user actions and the three session components:
//!
//! | Action | Component |
//! |--------|-----------|
//! | search, tag, sort, page | [`ResultPipeline`] (after a [`RankingService`] call for search) |
//! | open/close ingest dialog, submit URL | [`JobMonitor`] |
//! | summarize / dismiss an item | [`EnrichmentTracker`] |
//!
//! Searches are last-request-wins by issuance order: each call takes the next
//! value of a search generation counter, and a response is applied only if
//! no newer search has been issued since. An older response that arrives
//! late is dropped.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::enrich::{EnrichmentEntry, EnrichmentTracker, RequestOutcome};
use crate::error::{ServiceError, ValidationError};
use crate::http::HttpServices;
use crate::job::{IngestionJob, JobMonitor, JobSettings, JobState};
use crate::models::{Facet, IngestDocument, ResultRecord, SortMode, ViewLink};
use crate::pipeline::{PresentedPage, ResultPipeline};
use crate::remote::{EnrichmentService, IngestionService, RankingService};

const SEARCH_FAILED_STATUS: &str = "Error fetching results";
const NO_RESULTS_STATUS: &str = "No results found";

/// What happened to a search by the time its response arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Results replaced the previous set.
    Applied { status: String },
    /// The service failed; previous results are kept, unfiltered, on page 1.
    Failed { status: String },
    /// A newer search was issued first; this response was dropped.
    Superseded,
}

/// Dialog-local input for adding an article.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestDialog {
    pub open: bool,
    pub url_input: String,
}

/// Everything a front end needs to render the results area.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub query: Option<String>,
    pub status: String,
    pub total_count: u64,
    pub elapsed_seconds: f64,
    pub facets: Vec<Facet>,
    pub active_tag: String,
    pub sort_mode: SortMode,
    pub page: PresentedPage,
}

struct Results {
    pipeline: ResultPipeline,
    query: Option<String>,
    status: String,
}

pub struct SessionController {
    ranking: Arc<dyn RankingService>,
    results: RwLock<Results>,
    search_generation: AtomicU64,
    jobs: JobMonitor,
    summaries: EnrichmentTracker,
    dialog: Arc<Mutex<IngestDialog>>,
    mirror_host: String,
}

impl SessionController {
    pub fn new(
        ranking: Arc<dyn RankingService>,
        ingestion: Arc<dyn IngestionService>,
        enrichment: Arc<dyn EnrichmentService>,
        config: &Config,
    ) -> Self {
        Self {
            ranking,
            results: RwLock::new(Results {
                pipeline: ResultPipeline::new(config.results.page_size, config.results.top_tags),
                query: None,
                status: String::new(),
            }),
            search_generation: AtomicU64::new(0),
            jobs: JobMonitor::new(ingestion, JobSettings::from(&config.ingest)),
            summaries: EnrichmentTracker::new(enrichment, config.enrich.summary_length),
            dialog: Arc::new(Mutex::new(IngestDialog::default())),
            mirror_host: config.links.mirror_host.clone(),
        }
    }

    /// Controller talking HTTP to `config.services.base_url`.
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let services = Arc::new(HttpServices::new(&config.services)?);
        Ok(Self::new(
            services.clone(),
            services.clone(),
            services,
            config,
        ))
    }

    // ============ Search ============

    /// Run `query` against the ranking service and load the results.
    ///
    /// Blank queries fail with [`ValidationError::EmptyQuery`] without a
    /// request. Service failures do not error; they produce
    /// [`SearchOutcome::Failed`], keep the previous results, and reset the
    /// tag filter and page.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome, ValidationError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery);
        }

        let generation = self.search_generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(query = %query, generation, "searching");
        {
            let mut results = self.results.write().await;
            if self.is_current_search(generation) {
                results.status = "Searching...".to_string();
            }
        }

        let response = self.ranking.search(query).await;

        let mut results = self.results.write().await;
        if !self.is_current_search(generation) {
            debug!(query = %query, generation, "discarding superseded search response");
            return Ok(SearchOutcome::Superseded);
        }

        match response {
            Ok(response) => {
                let status = if response.results.is_empty() {
                    NO_RESULTS_STATUS.to_string()
                } else {
                    format!(
                        "Found {} results in {:.3} seconds",
                        response.count, response.time
                    )
                };
                info!(
                    query = %query,
                    returned = response.results.len(),
                    count = response.count,
                    "search complete"
                );
                results
                    .pipeline
                    .set_raw_results(response.results, response.count, response.time);
                results.query = Some(query.to_string());
                results.status = status.clone();
                Ok(SearchOutcome::Applied { status })
            }
            Err(e) => {
                warn!(query = %query, error = %e, "search failed");
                results.pipeline.reset_filter();
                results.status = SEARCH_FAILED_STATUS.to_string();
                Ok(SearchOutcome::Failed {
                    status: SEARCH_FAILED_STATUS.to_string(),
                })
            }
        }
    }

    fn is_current_search(&self, generation: u64) -> bool {
        self.search_generation.load(Ordering::SeqCst) == generation
    }

    pub async fn set_active_tag(&self, tag: &str) -> bool {
        self.results.write().await.pipeline.set_active_tag(tag)
    }

    pub async fn set_sort_mode(&self, mode: SortMode) {
        self.results.write().await.pipeline.set_sort_mode(mode);
    }

    pub async fn set_page(&self, page: usize) -> bool {
        self.results.write().await.pipeline.set_page(page)
    }

    pub async fn presented_page(&self) -> PresentedPage {
        self.results.read().await.pipeline.presented_page()
    }

    pub async fn status(&self) -> String {
        self.results.read().await.status.clone()
    }

    pub async fn view(&self) -> SessionView {
        let results = self.results.read().await;
        let pipeline = &results.pipeline;
        SessionView {
            query: results.query.clone(),
            status: results.status.clone(),
            total_count: pipeline.total_count(),
            elapsed_seconds: pipeline.elapsed_seconds(),
            facets: pipeline.facets().to_vec(),
            active_tag: pipeline.active_tag().to_string(),
            sort_mode: pipeline.sort_mode(),
            page: pipeline.presented_page(),
        }
    }

    /// Outbound link for a record, honouring the configured mirror host.
    pub fn view_link(&self, record: &ResultRecord) -> ViewLink {
        record.view_link(&self.mirror_host)
    }

    // ============ Ingest dialog ============

    pub async fn open_ingest_dialog(&self) {
        self.dialog.lock().await.open = true;
    }

    /// Close the dialog: cancel any job, even mid-poll, and clear the input.
    pub async fn close_ingest_dialog(&self) {
        self.jobs.cancel().await;
        *self.dialog.lock().await = IngestDialog::default();
    }

    pub async fn set_ingest_url(&self, url: &str) {
        self.dialog.lock().await.url_input = url.to_string();
    }

    pub async fn ingest_dialog(&self) -> IngestDialog {
        self.dialog.lock().await.clone()
    }

    /// Submit the dialog's URL. The input is cleared once that job succeeds.
    pub async fn submit_ingest(&self) -> Result<IngestionJob, ValidationError> {
        let url = self.dialog.lock().await.url_input.trim().to_string();
        let job = self.jobs.submit(&url).await?;

        if job.state != JobState::Failed {
            let mut updates = self.jobs.subscribe();
            let dialog = self.dialog.clone();
            tokio::spawn(async move {
                let finished = updates.wait_for(|j| !j.is_live()).await;
                if matches!(finished, Some(ref j) if j.state == JobState::Succeeded) {
                    let mut dialog = dialog.lock().await;
                    if dialog.url_input.trim() == url {
                        dialog.url_input.clear();
                    }
                }
            });
        }
        Ok(job)
    }

    pub async fn submit_document(&self, doc: IngestDocument) -> Result<IngestionJob, ValidationError> {
        self.jobs.submit_document(doc).await
    }

    pub fn job(&self) -> IngestionJob {
        self.jobs.snapshot()
    }

    pub fn jobs(&self) -> &JobMonitor {
        &self.jobs
    }

    // ============ Summaries ============

    /// Request a summary for a record of the current result set.
    pub async fn summarize(&self, item_id: &str) -> Result<RequestOutcome, ValidationError> {
        let url = {
            let results = self.results.read().await;
            results.pipeline.get(item_id).map(|r| r.url.clone())
        }
        .ok_or_else(|| ValidationError::UnknownItem(item_id.to_string()))?;
        Ok(self.summaries.request_summary(item_id, &url))
    }

    pub fn dismiss_summary(&self, item_id: &str) -> bool {
        self.summaries.dismiss(item_id)
    }

    pub fn summary(&self, item_id: &str) -> EnrichmentEntry {
        self.summaries.entry(item_id)
    }

    pub fn summaries(&self) -> &EnrichmentTracker {
        &self.summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::EnrichmentState;
    use crate::models::{IngestStatus, SearchResponse, SubmitAccepted, SummaryLength};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn record(id: &str, tags: &[&str]) -> ResultRecord {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": format!("About {}", id),
            "url": format!("https://medium.com/p/{}", id),
            "tags": tags,
            "date": "2024-01-01",
        }))
        .unwrap()
    }

    /// In-memory stand-in for all three services.
    struct StubServices {
        results: HashMap<String, Vec<ResultRecord>>,
        held: std::sync::Mutex<HashMap<String, Arc<Semaphore>>>,
        entered: Semaphore,
        search_calls: AtomicUsize,
        ingest_succeeds: bool,
    }

    impl StubServices {
        fn new() -> Self {
            let mut results = HashMap::new();
            results.insert(
                "a".to_string(),
                vec![record("a1", &["Ceramics"]), record("a2", &["Glass"])],
            );
            results.insert("b".to_string(), vec![record("b1", &["Ming"])]);
            Self {
                results,
                held: std::sync::Mutex::new(HashMap::new()),
                entered: Semaphore::new(0),
                search_calls: AtomicUsize::new(0),
                ingest_succeeds: false,
            }
        }

        fn hold(&self, query: &str) -> Arc<Semaphore> {
            let gate = Arc::new(Semaphore::new(0));
            self.held
                .lock()
                .unwrap()
                .insert(query.to_string(), gate.clone());
            gate
        }

        async fn wait_entered(&self) {
            timeout(WAIT, self.entered.acquire())
                .await
                .unwrap()
                .unwrap()
                .forget();
        }
    }

    #[async_trait]
    impl RankingService for StubServices {
        async fn search(&self, query: &str) -> Result<SearchResponse, ServiceError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            self.entered.add_permits(1);
            let gate = self.held.lock().unwrap().get(query).cloned();
            if let Some(gate) = gate {
                gate.acquire().await.unwrap().forget();
            }
            if query == "offline" {
                return Err(ServiceError::Transport("connection refused".into()));
            }
            let results = self.results.get(query).cloned().unwrap_or_default();
            Ok(SearchResponse {
                count: results.len() as u64,
                time: 0.0421,
                results,
            })
        }
    }

    #[async_trait]
    impl IngestionService for StubServices {
        async fn submit_url(&self, _url: &str) -> Result<SubmitAccepted, ServiceError> {
            Ok(SubmitAccepted::default())
        }

        async fn submit_document(&self, _doc: &IngestDocument) -> Result<SubmitAccepted, ServiceError> {
            Ok(SubmitAccepted::default())
        }

        async fn status(&self) -> Result<IngestStatus, ServiceError> {
            Ok(IngestStatus {
                is_uploading: !self.ingest_succeeds,
                current_step: "Scraping".into(),
                progress: 20,
                error: None,
                success: self.ingest_succeeds,
            })
        }
    }

    #[async_trait]
    impl EnrichmentService for StubServices {
        async fn summarize(&self, url: &str, _length: SummaryLength) -> Result<String, ServiceError> {
            Ok(format!("summary of {}", url))
        }
    }

    fn test_config() -> Config {
        let mut cfg = Config::minimal();
        cfg.ingest.poll_interval_ms = 10;
        cfg.ingest.success_clear_ms = 1000;
        cfg
    }

    fn controller(stub: Arc<StubServices>) -> SessionController {
        SessionController::new(stub.clone(), stub.clone(), stub, &test_config())
    }

    fn page_ids(page: &PresentedPage) -> Vec<&str> {
        page.records.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn blank_query_is_rejected_without_request() {
        let stub = Arc::new(StubServices::new());
        let session = controller(stub.clone());

        assert_eq!(session.search("   ").await, Err(ValidationError::EmptyQuery));
        assert_eq!(stub.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn search_loads_results_and_status() {
        let stub = Arc::new(StubServices::new());
        let session = controller(stub);

        let outcome = session.search("a").await.unwrap();
        assert_eq!(
            outcome,
            SearchOutcome::Applied {
                status: "Found 2 results in 0.042 seconds".into()
            }
        );
        let view = session.view().await;
        assert_eq!(view.query.as_deref(), Some("a"));
        assert_eq!(page_ids(&view.page), vec!["a1", "a2"]);
        assert_eq!(view.facets.len(), 3);

        let outcome = session.search("nothing").await.unwrap();
        assert_eq!(
            outcome,
            SearchOutcome::Applied {
                status: NO_RESULTS_STATUS.into()
            }
        );
        assert!(session.presented_page().await.records.is_empty());
    }

    #[tokio::test]
    async fn failed_search_keeps_results_and_clears_filter() {
        let stub = Arc::new(StubServices::new());
        let session = controller(stub);

        session.search("a").await.unwrap();
        assert!(session.set_active_tag("Glass").await);
        assert_eq!(page_ids(&session.presented_page().await), vec!["a2"]);

        let outcome = session.search("offline").await.unwrap();
        assert_eq!(
            outcome,
            SearchOutcome::Failed {
                status: SEARCH_FAILED_STATUS.into()
            }
        );
        assert_eq!(session.status().await, SEARCH_FAILED_STATUS);
        let view = session.view().await;
        assert_eq!(view.active_tag, "All");
        assert_eq!(view.page.page, 1);
        assert_eq!(page_ids(&view.page), vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn newer_search_wins_over_late_response() {
        let stub = Arc::new(StubServices::new());
        let gate_a = stub.hold("a");
        let gate_b = stub.hold("b");
        let session = Arc::new(controller(stub.clone()));

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.search("a").await }
        });
        stub.wait_entered().await;
        let second = tokio::spawn({
            let session = session.clone();
            async move { session.search("b").await }
        });
        stub.wait_entered().await;

        gate_b.add_permits(1);
        let second = timeout(WAIT, second).await.unwrap().unwrap().unwrap();
        assert!(matches!(second, SearchOutcome::Applied { .. }));

        gate_a.add_permits(1);
        let first = timeout(WAIT, first).await.unwrap().unwrap().unwrap();
        assert_eq!(first, SearchOutcome::Superseded);

        let view = session.view().await;
        assert_eq!(view.query.as_deref(), Some("b"));
        assert_eq!(page_ids(&view.page), vec!["b1"]);
    }

    #[tokio::test]
    async fn tag_sort_and_page_pass_through() {
        let stub = Arc::new(StubServices::new());
        let session = controller(stub);
        session.search("a").await.unwrap();

        assert!(!session.set_active_tag("Ming").await);
        assert!(session.set_active_tag("Glass").await);
        assert_eq!(page_ids(&session.presented_page().await), vec!["a2"]);

        session.set_sort_mode(SortMode::DateOldest).await;
        assert_eq!(session.view().await.sort_mode, SortMode::DateOldest);
        assert!(!session.set_page(5).await);
    }

    #[tokio::test]
    async fn closing_dialog_cancels_polling_job() {
        let stub = Arc::new(StubServices::new());
        let session = controller(stub);

        session.open_ingest_dialog().await;
        session.set_ingest_url("https://medium.com/@a/post").await;
        let job = session.submit_ingest().await.unwrap();
        assert_eq!(job.state, JobState::Polling);

        session.close_ingest_dialog().await;
        assert_eq!(session.job().state, JobState::Idle);
        assert_eq!(session.ingest_dialog().await, IngestDialog::default());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.job().state, JobState::Idle);
    }

    #[tokio::test]
    async fn invalid_dialog_url_is_a_validation_error() {
        let stub = Arc::new(StubServices::new());
        let session = controller(stub);

        session.open_ingest_dialog().await;
        session.set_ingest_url("not-a-url").await;
        let err = session.submit_ingest().await.unwrap_err();
        assert_eq!(err, ValidationError::InvalidUrl("not-a-url".into()));
        assert_eq!(session.job().state, JobState::Idle);
        assert_eq!(session.ingest_dialog().await.url_input, "not-a-url");
    }

    #[tokio::test]
    async fn successful_job_clears_dialog_input() {
        let mut stub = StubServices::new();
        stub.ingest_succeeds = true;
        let session = controller(Arc::new(stub));
        let mut updates = session.jobs().subscribe();

        session.open_ingest_dialog().await;
        session.set_ingest_url("https://medium.com/@a/post").await;
        session.submit_ingest().await.unwrap();
        timeout(WAIT, updates.wait_for(|j| j.state == JobState::Succeeded))
            .await
            .unwrap()
            .unwrap();

        let mut cleared = false;
        for _ in 0..50 {
            if session.ingest_dialog().await.url_input.is_empty() {
                cleared = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(cleared, "dialog input should clear after success");
        assert!(session.ingest_dialog().await.open);
    }

    #[tokio::test]
    async fn summaries_are_keyed_by_result_id() {
        let stub = Arc::new(StubServices::new());
        let session = controller(stub);
        session.search("a").await.unwrap();

        assert_eq!(
            session.summarize("zz").await,
            Err(ValidationError::UnknownItem("zz".into()))
        );

        let mut updates = session.summaries().subscribe();
        assert_eq!(session.summarize("a1").await, Ok(RequestOutcome::Started));
        let entry = timeout(WAIT, updates.wait_for("a1", |e| e.state == EnrichmentState::Ready))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.text.as_deref(), Some("summary of https://medium.com/p/a1"));

        assert!(session.dismiss_summary("a1"));
        assert_eq!(session.summary("a1").state, EnrichmentState::Idle);
    }
}
