//! Remote service contracts.
//!
//! The session core talks to three services through these traits so the
//! transport can be swapped: [`HttpServices`](crate::http::HttpServices)
//! implements all three over HTTP, tests use in-memory doubles.
//!
//! ```text
//! ┌────────────────────┐   search()            ┌──────────────────┐
//! │  SessionController │──────────────────────▶│  RankingService  │
//! │                    │                       └──────────────────┘
//! │   ┌────────────┐   │   submit_url()        ┌──────────────────┐
//! │   │ JobMonitor │───┼──────────────────────▶│ IngestionService │
//! │   └────────────┘   │   status() (polled)   └──────────────────┘
//! │   ┌────────────┐   │   summarize()         ┌──────────────────┐
//! │   │ Enrichment │───┼──────────────────────▶│ EnrichmentService│
//! │   └────────────┘   │                       └──────────────────┘
//! └────────────────────┘
//! ```
//!
//! Implementations return [`ServiceError`] and never panic on bad input; the
//! components decide what a failure means for their state.

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::models::{IngestDocument, IngestStatus, SearchResponse, SubmitAccepted, SummaryLength};

/// Ranked full-text search. Result order is the relevancy baseline.
#[async_trait]
pub trait RankingService: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResponse, ServiceError>;
}

/// Background content ingestion with a session-scoped status endpoint.
#[async_trait]
pub trait IngestionService: Send + Sync {
    /// Start ingesting the article at `url`.
    async fn submit_url(&self, url: &str) -> Result<SubmitAccepted, ServiceError>;

    /// Start ingesting a structured document.
    async fn submit_document(&self, doc: &IngestDocument) -> Result<SubmitAccepted, ServiceError>;

    /// Progress of the current job.
    async fn status(&self) -> Result<IngestStatus, ServiceError>;
}

/// Stateless per-item summary generation.
#[async_trait]
pub trait EnrichmentService: Send + Sync {
    async fn summarize(&self, url: &str, length: SummaryLength) -> Result<String, ServiceError>;
}
