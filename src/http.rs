//! HTTP transport for the remote services.
//!
//! One [`HttpServices`] value implements [`RankingService`],
//! [`IngestionService`], and [`EnrichmentService`] against a single base URL:
//!
//! | Method | Path | Used by |
//! |--------|------|---------|
//! | `POST` | `/search` | search |
//! | `POST` | `/upload-url` | ingest by URL |
//! | `POST` | `/upload` | ingest a JSON document (multipart `file`) |
//! | `GET`  | `/upload-status` | job polling |
//! | `POST` | `/summarize-article` | per-item summary |
//!
//! # Error mapping
//!
//! - Network errors and timeouts → [`ServiceError::Transport`]
//! - Non-2xx responses → [`ServiceError::Rejected`], carrying the body's
//!   `detail` field when the service sent one
//! - Bodies that do not decode → [`ServiceError::Decode`]
//!
//! No call is retried here. Polling tolerance lives in the job monitor.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::ServicesConfig;
use crate::error::ServiceError;
use crate::models::{IngestDocument, IngestStatus, SearchResponse, SubmitAccepted, SummaryLength};
use crate::remote::{EnrichmentService, IngestionService, RankingService};

/// reqwest-backed client for all three services.
#[derive(Clone)]
pub struct HttpServices {
    client: reqwest::Client,
    base_url: String,
}

impl HttpServices {
    /// Build a client from the `[services]` config section.
    pub fn new(config: &ServicesConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn a response into `T`, or a rejection carrying the service's `detail`.
async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()));
    }

    let body_text = response.text().await.unwrap_or_default();
    Err(ServiceError::Rejected {
        status: status.as_u16(),
        message: parse_detail(&body_text),
    })
}

/// Extract a human-readable reason from an error body.
///
/// FastAPI-style `{"detail": "..."}` is preferred; `{"error": "..."}` and
/// `{"message": "..."}` are accepted as fallbacks.
fn parse_detail(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "error", "message"]
        .iter()
        .find_map(|key| json.get(*key).and_then(|v| v.as_str()))
        .map(|s| s.to_string())
        .filter(|s| !s.trim().is_empty())
}

#[async_trait]
impl RankingService for HttpServices {
    async fn search(&self, query: &str) -> Result<SearchResponse, ServiceError> {
        let response = self
            .client
            .post(self.endpoint("/search"))
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await?;
        read_json(response).await
    }
}

#[async_trait]
impl IngestionService for HttpServices {
    async fn submit_url(&self, url: &str) -> Result<SubmitAccepted, ServiceError> {
        let response = self
            .client
            .post(self.endpoint("/upload-url"))
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await?;
        read_json(response).await
    }

    async fn submit_document(&self, doc: &IngestDocument) -> Result<SubmitAccepted, ServiceError> {
        let bytes = serde_json::to_vec(doc).map_err(|e| ServiceError::Decode(e.to_string()))?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("document.json")
            .mime_str("application/json")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint("/upload"))
            .multipart(form)
            .send()
            .await?;
        read_json(response).await
    }

    async fn status(&self) -> Result<IngestStatus, ServiceError> {
        let response = self
            .client
            .get(self.endpoint("/upload-status"))
            .send()
            .await?;
        read_json(response).await
    }
}

#[derive(serde::Deserialize)]
struct SummaryBody {
    summary: String,
}

#[async_trait]
impl EnrichmentService for HttpServices {
    async fn summarize(&self, url: &str, length: SummaryLength) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(self.endpoint("/summarize-article"))
            .json(&serde_json::json!({ "url": url, "summary_length": length }))
            .send()
            .await?;
        let body: SummaryBody = read_json(response).await?;
        Ok(body.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_extraction() {
        assert_eq!(
            parse_detail(r#"{"detail": "Invalid URL"}"#).as_deref(),
            Some("Invalid URL")
        );
        assert_eq!(
            parse_detail(r#"{"error": "busy"}"#).as_deref(),
            Some("busy")
        );
        assert_eq!(parse_detail(r#"{"detail": ""}"#), None);
        assert_eq!(parse_detail("<html>502</html>"), None);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let cfg = ServicesConfig {
            base_url: "http://localhost:8000/".to_string(),
            timeout_secs: 5,
        };
        let services = HttpServices::new(&cfg).unwrap();
        assert_eq!(services.endpoint("/search"), "http://localhost:8000/search");
    }
}
