//! Core data models shared by the session components.
//!
//! These types represent the records returned by the ranking service, the
//! payloads exchanged with the ingestion and summary services, and the small
//! enums that drive result presentation.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Name of the synthetic facet that matches every record.
pub const ALL_TAG: &str = "All";

/// A single ranked search result. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireRecord")]
pub struct ResultRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub authors: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    /// Member-only article; gates the outbound view link and badge.
    pub is_restricted: bool,
}

/// Where a result should be opened, and how the link is labelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewLink {
    pub url: String,
    pub label: &'static str,
    pub badge: Option<&'static str>,
}

impl ResultRecord {
    /// Build the outbound link. Restricted records are opened through
    /// `mirror_host`, which takes the full article URL as its path.
    pub fn view_link(&self, mirror_host: &str) -> ViewLink {
        if self.is_restricted {
            ViewLink {
                url: format!("https://{}/{}", mirror_host, self.url),
                label: "View on Freedium",
                badge: Some("Member-only"),
            }
        } else {
            ViewLink {
                url: self.url.clone(),
                label: "View on Medium",
                badge: None,
            }
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Record as the ranking service serializes it.
#[derive(Debug, Deserialize)]
struct WireRecord {
    id: WireId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    member: Option<String>,
    #[serde(default)]
    is_restricted: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(i64),
    Text(String),
}

impl From<WireRecord> for ResultRecord {
    fn from(w: WireRecord) -> Self {
        let id = match w.id {
            WireId::Number(n) => n.to_string(),
            WireId::Text(s) => s,
        };
        let thumbnail_url = w
            .thumbnail_url
            .or(w.thumbnail)
            .filter(|t| is_http_url(t));
        let published_at = w
            .published_at
            .or_else(|| w.date.as_deref().and_then(parse_published_at));
        let is_restricted = w
            .is_restricted
            .unwrap_or_else(|| w.member.as_deref() == Some("Yes"));

        ResultRecord {
            id,
            title: w.title,
            description: w.description,
            url: w.url,
            thumbnail_url,
            authors: w.authors,
            published_at,
            tags: w.tags,
            is_restricted,
        }
    }
}

/// Parse the ranking service's `date` field.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f][offset]`, and bare dates.
/// Naive timestamps are taken as UTC.
pub fn parse_published_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Syntactic check: absolute URL with an http(s) scheme and a host.
pub fn is_http_url(raw: &str) -> bool {
    match reqwest::Url::parse(raw.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Response body of `POST /search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<ResultRecord>,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub time: f64,
}

/// Presentation order of the filtered result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SortMode {
    /// Server order. Always restored from the raw result set.
    #[default]
    Relevancy,
    DateNewest,
    DateOldest,
}

impl SortMode {
    pub fn label(&self) -> &'static str {
        match self {
            SortMode::Relevancy => "Relevancy",
            SortMode::DateNewest => "Date (New)",
            SortMode::DateOldest => "Date (Old)",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relevancy" | "relevance" => Ok(SortMode::Relevancy),
            "newest" | "date-new" | "date (new)" => Ok(SortMode::DateNewest),
            "oldest" | "date-old" | "date (old)" => Ok(SortMode::DateOldest),
            other => Err(format!(
                "Unknown sort mode: '{}'. Use relevancy, newest, or oldest.",
                other
            )),
        }
    }
}

/// A tag and how many records in the raw result set carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facet {
    pub name: String,
    pub count: usize,
}

/// Response body of `POST /upload-url` and `POST /upload` on acceptance.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitAccepted {
    #[serde(default)]
    pub message: Option<String>,
}

/// Response body of `GET /upload-status`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IngestStatus {
    #[serde(default)]
    pub is_uploading: bool,
    #[serde(default)]
    pub current_step: String,
    #[serde(default)]
    pub progress: i64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub success: bool,
}

/// Requested length of a generated summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    #[default]
    Short,
    Medium,
    Long,
}

/// A structured article uploaded directly instead of by URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestDocument {
    pub title: String,
    pub text: String,
    pub url: String,
    pub authors: Vec<String>,
    pub timestamp: String,
    pub tags: Vec<String>,
}

impl IngestDocument {
    pub const REQUIRED_KEYS: [&'static str; 6] =
        ["title", "text", "url", "authors", "timestamp", "tags"];

    /// Validate and decode a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ValidationError> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| ValidationError::InvalidDocument(format!("not valid JSON: {}", e)))?;

        let obj = value.as_object().ok_or_else(|| {
            ValidationError::InvalidDocument("expected a JSON object".to_string())
        })?;
        let missing: Vec<&str> = Self::REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|k| !obj.contains_key(*k))
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::InvalidDocument(format!(
                "missing required keys: {}",
                missing.join(", ")
            )));
        }

        serde_json::from_value(value).map_err(|e| ValidationError::InvalidDocument(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn wire_record_normalises_fields() {
        let json = r#"{
            "id": 42,
            "title": "Ming vases",
            "description": "Blue and white",
            "thumbnail": "Placeholder thumbnail",
            "url": "https://medium.com/@potter/ming-vases",
            "tags": ["Ceramics", "Ming"],
            "authors": ["A. Potter"],
            "date": "2021-03-04 10:20:30.123+00:00",
            "member": "Yes"
        }"#;
        let record: ResultRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "42");
        assert_eq!(record.thumbnail_url, None);
        assert!(record.is_restricted);
        let published = record.published_at.unwrap();
        assert_eq!((published.year(), published.month(), published.day()), (2021, 3, 4));
        assert_eq!(published.hour(), 10);
    }

    #[test]
    fn string_ids_and_real_thumbnails_are_kept() {
        let json = r#"{"id": "a-1", "thumbnail": "https://img.example.com/a.png", "member": "No"}"#;
        let record: ResultRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "a-1");
        assert_eq!(record.thumbnail_url.as_deref(), Some("https://img.example.com/a.png"));
        assert!(!record.is_restricted);
        assert_eq!(record.published_at, None);
    }

    #[test]
    fn parse_date_formats() {
        assert!(parse_published_at("2020-01-02T03:04:05Z").is_some());
        assert!(parse_published_at("2020-01-02 03:04:05").is_some());
        assert!(parse_published_at("2020-01-02").is_some());
        assert!(parse_published_at("last tuesday").is_none());
    }

    #[test]
    fn restricted_records_link_through_mirror() {
        let mut record: ResultRecord =
            serde_json::from_str(r#"{"id": 1, "url": "https://medium.com/p/abc"}"#).unwrap();
        let open = record.view_link("freedium.cfd");
        assert_eq!(open.url, "https://medium.com/p/abc");
        assert_eq!(open.label, "View on Medium");
        assert_eq!(open.badge, None);

        record.is_restricted = true;
        let gated = record.view_link("freedium.cfd");
        assert_eq!(gated.url, "https://freedium.cfd/https://medium.com/p/abc");
        assert_eq!(gated.label, "View on Freedium");
        assert!(gated.badge.is_some());

        record.url = "https://author.medium.com/some-member-post-123".into();
        assert_eq!(
            record.view_link("freedium.cfd").url,
            "https://freedium.cfd/https://author.medium.com/some-member-post-123"
        );

        record.url = "https://towardsdatascience.com/some-member-post-123".into();
        let custom = record.view_link("freedium.cfd");
        assert_eq!(
            custom.url,
            "https://freedium.cfd/https://towardsdatascience.com/some-member-post-123"
        );
        assert_eq!(custom.label, "View on Freedium");
    }

    #[test]
    fn url_shape_check() {
        assert!(is_http_url("https://medium.com/@a/b"));
        assert!(is_http_url("http://localhost:8000/x"));
        assert!(!is_http_url("not-a-url"));
        assert!(!is_http_url("ftp://example.com/file"));
        assert!(!is_http_url("mailto:someone@example.com"));
    }

    #[test]
    fn sort_mode_names() {
        assert_eq!("newest".parse::<SortMode>().unwrap(), SortMode::DateNewest);
        assert_eq!("Date (Old)".parse::<SortMode>().unwrap(), SortMode::DateOldest);
        assert_eq!("relevancy".parse::<SortMode>().unwrap(), SortMode::Relevancy);
        assert!("random".parse::<SortMode>().is_err());
    }

    #[test]
    fn document_requires_all_keys() {
        let err = IngestDocument::from_json_str(r#"{"title": "t", "text": "x"}"#).unwrap_err();
        match err {
            ValidationError::InvalidDocument(msg) => {
                assert!(msg.contains("url"));
                assert!(msg.contains("timestamp"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(IngestDocument::from_json_str("[1, 2]").is_err());
        assert!(IngestDocument::from_json_str("{oops").is_err());

        let ok = IngestDocument::from_json_str(
            r#"{"title": "t", "text": "body", "url": "https://medium.com/p/1",
                "authors": ["a"], "timestamp": "2024-01-01", "tags": ["x"]}"#,
        )
        .unwrap();
        assert_eq!(ok.authors, vec!["a".to_string()]);
    }
}
