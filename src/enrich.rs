//! Per-item summary tracker.
//!
//! Keeps one independent request lifecycle per result id. Any number of
//! items can be loading at once; the only constraint is single-flight per
//! item: asking again for an item that is already loading does nothing.
//!
//! Each request is stamped with a token. When a response arrives it is
//! applied only if the item's entry still carries that token, so a response
//! for a dismissed (or dismissed and re-requested) item is dropped.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::models::SummaryLength;
use crate::remote::EnrichmentService;

const SUMMARY_FAILED_MESSAGE: &str = "Error generating summary.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnrichmentState {
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichmentEntry {
    pub state: EnrichmentState,
    pub text: Option<String>,
    pub error_message: Option<String>,
}

impl EnrichmentEntry {
    fn idle() -> Self {
        Self {
            state: EnrichmentState::Idle,
            text: None,
            error_message: None,
        }
    }
}

/// What [`EnrichmentTracker::request_summary`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Started,
    /// A request for this item is already in flight.
    AlreadyLoading,
}

#[derive(Debug, Clone)]
struct Tracked {
    entry: EnrichmentEntry,
    token: u64,
}

#[derive(Debug, Default)]
struct TrackerState {
    entries: HashMap<String, Tracked>,
    next_token: u64,
}

/// Receives tracker changes.
pub struct EnrichmentUpdates {
    rx: watch::Receiver<TrackerState>,
}

impl EnrichmentUpdates {
    /// Wait until the entry for `item_id` satisfies `pred`. A missing entry
    /// is presented as `Idle`.
    pub async fn wait_for(
        &mut self,
        item_id: &str,
        mut pred: impl FnMut(&EnrichmentEntry) -> bool,
    ) -> Option<EnrichmentEntry> {
        let idle = EnrichmentEntry::idle();
        let state = self
            .rx
            .wait_for(|s| pred(s.entries.get(item_id).map(|t| &t.entry).unwrap_or(&idle)))
            .await
            .ok()?;
        Some(
            state
                .entries
                .get(item_id)
                .map(|t| t.entry.clone())
                .unwrap_or_else(EnrichmentEntry::idle),
        )
    }
}

pub struct EnrichmentTracker {
    service: Arc<dyn EnrichmentService>,
    length: SummaryLength,
    state: Arc<watch::Sender<TrackerState>>,
}

impl EnrichmentTracker {
    pub fn new(service: Arc<dyn EnrichmentService>, length: SummaryLength) -> Self {
        let (tx, _rx) = watch::channel(TrackerState::default());
        Self {
            service,
            length,
            state: Arc::new(tx),
        }
    }

    /// Ask for a summary of `item_reference` on behalf of `item_id`.
    ///
    /// The remote call runs on its own task; this returns as soon as the
    /// entry is marked `Loading`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since the request is
    /// spawned with [`tokio::spawn`].
    pub fn request_summary(&self, item_id: &str, item_reference: &str) -> RequestOutcome {
        let mut token = None;
        self.state.send_if_modified(|s| {
            if let Some(existing) = s.entries.get(item_id) {
                if existing.entry.state == EnrichmentState::Loading {
                    return false;
                }
            }
            s.next_token += 1;
            s.entries.insert(
                item_id.to_string(),
                Tracked {
                    entry: EnrichmentEntry {
                        state: EnrichmentState::Loading,
                        text: None,
                        error_message: None,
                    },
                    token: s.next_token,
                },
            );
            token = Some(s.next_token);
            true
        });

        let Some(token) = token else {
            debug!(item = %item_id, "summary already loading");
            return RequestOutcome::AlreadyLoading;
        };

        let service = self.service.clone();
        let state = self.state.clone();
        let item_id = item_id.to_string();
        let reference = item_reference.to_string();
        let length = self.length;
        tokio::spawn(async move {
            let result = service.summarize(&reference, length).await;
            if let Err(e) = &result {
                warn!(item = %item_id, error = %e, "summary request failed");
            }
            let applied = state.send_if_modified(|s| match s.entries.get_mut(&item_id) {
                Some(tracked) if tracked.token == token => {
                    tracked.entry = match result {
                        Ok(text) => EnrichmentEntry {
                            state: EnrichmentState::Ready,
                            text: Some(text),
                            error_message: None,
                        },
                        Err(_) => EnrichmentEntry {
                            state: EnrichmentState::Error,
                            text: None,
                            error_message: Some(SUMMARY_FAILED_MESSAGE.to_string()),
                        },
                    };
                    true
                }
                _ => false,
            });
            if !applied {
                debug!(item = %item_id, token, "discarding stale summary response");
            }
        });

        RequestOutcome::Started
    }

    /// Remove the entry for `item_id`, whatever its state. Returns whether an
    /// entry existed.
    pub fn dismiss(&self, item_id: &str) -> bool {
        let mut removed = false;
        self.state.send_if_modified(|s| {
            removed = s.entries.remove(item_id).is_some();
            removed
        });
        removed
    }

    /// Current entry for `item_id`; `Idle` if there is none.
    pub fn entry(&self, item_id: &str) -> EnrichmentEntry {
        self.state
            .borrow()
            .entries
            .get(item_id)
            .map(|t| t.entry.clone())
            .unwrap_or_else(EnrichmentEntry::idle)
    }

    /// All tracked entries, keyed by item id.
    pub fn entries(&self) -> HashMap<String, EnrichmentEntry> {
        self.state
            .borrow()
            .entries
            .iter()
            .map(|(id, t)| (id.clone(), t.entry.clone()))
            .collect()
    }

    pub fn subscribe(&self) -> EnrichmentUpdates {
        EnrichmentUpdates {
            rx: self.state.subscribe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    /// Summaries of `url` are held until the test releases a permit on that
    /// url's gate. Urls containing "broken" fail.
    struct GatedSummaries {
        gates: std::sync::Mutex<HashMap<String, Arc<Semaphore>>>,
        per_url_calls: std::sync::Mutex<HashMap<String, usize>>,
        calls: AtomicUsize,
        entered: Semaphore,
    }

    impl GatedSummaries {
        fn new() -> Self {
            Self {
                gates: std::sync::Mutex::new(HashMap::new()),
                per_url_calls: std::sync::Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
                entered: Semaphore::new(0),
            }
        }

        fn hold(&self, url: &str) -> Arc<Semaphore> {
            self.gates
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(0)))
                .clone()
        }

        async fn wait_entered(&self, n: u32) {
            timeout(WAIT, self.entered.acquire_many(n))
                .await
                .unwrap()
                .unwrap()
                .forget();
        }
    }

    #[async_trait]
    impl EnrichmentService for GatedSummaries {
        async fn summarize(&self, url: &str, length: SummaryLength) -> Result<String, ServiceError> {
            assert_eq!(length, SummaryLength::Short);
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n = {
                let mut per_url = self.per_url_calls.lock().unwrap();
                let n = per_url.entry(url.to_string()).or_insert(0);
                *n += 1;
                *n
            };
            self.entered.add_permits(1);

            let gate = self.gates.lock().unwrap().get(url).cloned();
            if let Some(gate) = gate {
                gate.acquire().await.unwrap().forget();
            }
            if url.contains("broken") {
                return Err(ServiceError::Transport("connection reset".into()));
            }
            Ok(format!("summary of {} #{}", url, n))
        }
    }

    fn tracker(service: &Arc<GatedSummaries>) -> EnrichmentTracker {
        EnrichmentTracker::new(service.clone(), SummaryLength::Short)
    }

    async fn wait_state(
        updates: &mut EnrichmentUpdates,
        id: &str,
        state: EnrichmentState,
    ) -> EnrichmentEntry {
        timeout(WAIT, updates.wait_for(id, |e| e.state == state))
            .await
            .expect("timed out waiting for entry")
            .expect("tracker dropped")
    }

    #[tokio::test]
    async fn independent_items_resolve_in_any_order() {
        let service = Arc::new(GatedSummaries::new());
        let gate_a = service.hold("https://medium.com/a");
        let gate_b = service.hold("https://medium.com/b");
        let summaries = tracker(&service);
        let mut updates = summaries.subscribe();

        assert_eq!(
            summaries.request_summary("a", "https://medium.com/a"),
            RequestOutcome::Started
        );
        assert_eq!(
            summaries.request_summary("b", "https://medium.com/b"),
            RequestOutcome::Started
        );
        service.wait_entered(2).await;
        assert_eq!(summaries.entry("a").state, EnrichmentState::Loading);
        assert_eq!(summaries.entry("b").state, EnrichmentState::Loading);

        // b answers first while a is still held.
        gate_b.add_permits(1);
        let b = wait_state(&mut updates, "b", EnrichmentState::Ready).await;
        assert_eq!(b.text.as_deref(), Some("summary of https://medium.com/b #1"));
        assert_eq!(summaries.entry("a").state, EnrichmentState::Loading);

        gate_a.add_permits(1);
        let a = wait_state(&mut updates, "a", EnrichmentState::Ready).await;
        assert_eq!(a.text.as_deref(), Some("summary of https://medium.com/a #1"));
    }

    #[tokio::test]
    async fn repeat_request_while_loading_is_a_no_op() {
        let service = Arc::new(GatedSummaries::new());
        let gate = service.hold("https://medium.com/a");
        let summaries = tracker(&service);
        let mut updates = summaries.subscribe();

        assert_eq!(
            summaries.request_summary("a", "https://medium.com/a"),
            RequestOutcome::Started
        );
        assert_eq!(
            summaries.request_summary("a", "https://medium.com/a"),
            RequestOutcome::AlreadyLoading
        );
        gate.add_permits(5);
        wait_state(&mut updates, "a", EnrichmentState::Ready).await;
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);

        // Once settled, asking again starts a fresh request.
        assert_eq!(
            summaries.request_summary("a", "https://medium.com/a"),
            RequestOutcome::Started
        );
        let again = wait_state(&mut updates, "a", EnrichmentState::Ready).await;
        assert_eq!(again.text.as_deref(), Some("summary of https://medium.com/a #2"));
    }

    #[tokio::test]
    async fn failure_sets_error_and_clears_text() {
        let service = Arc::new(GatedSummaries::new());
        let summaries = tracker(&service);
        let mut updates = summaries.subscribe();

        summaries.request_summary("x", "https://medium.com/broken");
        let entry = wait_state(&mut updates, "x", EnrichmentState::Error).await;
        assert_eq!(entry.text, None);
        assert_eq!(entry.error_message.as_deref(), Some(SUMMARY_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn dismissed_entry_ignores_late_response() {
        let service = Arc::new(GatedSummaries::new());
        let gate = service.hold("https://medium.com/a");
        let summaries = tracker(&service);
        let mut updates = summaries.subscribe();

        summaries.request_summary("a", "https://medium.com/a");
        service.wait_entered(1).await;
        assert!(summaries.dismiss("a"));
        assert_eq!(summaries.entry("a").state, EnrichmentState::Idle);

        // Re-request; the first response must not land on the new entry.
        summaries.request_summary("a", "https://medium.com/a");
        service.wait_entered(1).await;

        gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(summaries.entry("a").state, EnrichmentState::Loading);

        gate.add_permits(1);
        let entry = wait_state(&mut updates, "a", EnrichmentState::Ready).await;
        assert_eq!(entry.text.as_deref(), Some("summary of https://medium.com/a #2"));
    }

    #[tokio::test]
    async fn dismiss_leaves_other_entries_alone() {
        let service = Arc::new(GatedSummaries::new());
        let summaries = tracker(&service);
        let mut updates = summaries.subscribe();

        summaries.request_summary("a", "https://medium.com/a");
        summaries.request_summary("b", "https://medium.com/b");
        wait_state(&mut updates, "a", EnrichmentState::Ready).await;
        wait_state(&mut updates, "b", EnrichmentState::Ready).await;

        assert!(summaries.dismiss("a"));
        assert!(!summaries.dismiss("a"));
        let entries = summaries.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries["b"].state, EnrichmentState::Ready);
    }
}
