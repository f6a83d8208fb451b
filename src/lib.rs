//! # Spillage Client
//!
//! Client-side orchestration for an article search and ingestion service.
//!
//! A session talks to three remote services (ranking, ingestion, and
//! summarization) and keeps the state a front end renders: a faceted,
//! sortable, paginated view of search results, one background ingestion
//! job, and per-result summaries.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌────────────────────┐
//!   user actions ─▶│ SessionController  │
//!                  └─┬────────┬───────┬─┘
//!                    ▼        ▼       ▼
//!           ┌──────────┐ ┌─────────┐ ┌──────────────────┐
//!           │ Result   │ │  Job    │ │  Enrichment      │
//!           │ Pipeline │ │ Monitor │ │  Tracker         │
//!           └────▲─────┘ └────┬────┘ └────────┬─────────┘
//!                │ search     │ submit/poll   │ summarize
//!           ┌────┴────────────▼───────────────▼────┐
//!           │          HttpServices (reqwest)      │
//!           └──────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Wire records and shared value types |
//! | [`error`] | Validation and service error types |
//! | [`remote`] | Service traits |
//! | [`http`] | reqwest implementation of the service traits |
//! | [`pipeline`] | Facets, filter, sort, and pagination over a result set |
//! | [`job`] | Background ingestion job and status polling |
//! | [`enrich`] | Per-result summary requests |
//! | [`session`] | Routes user actions to the components |
//! | [`progress`] | Ingestion progress reporting on stderr |
//! | [`commands`] | One-shot CLI commands |
//! | [`shell`] | Interactive session |

pub mod commands;
pub mod config;
pub mod enrich;
pub mod error;
pub mod http;
pub mod job;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod remote;
pub mod session;
pub mod shell;
