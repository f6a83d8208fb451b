use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::models::SummaryLength;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub results: ResultsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub enrich: EnrichConfig,
    #[serde(default)]
    pub links: LinksConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    /// Base URL shared by the search, upload, and summary endpoints.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResultsConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Number of tag facets shown next to "All".
    #[serde(default = "default_top_tags")]
    pub top_tags: usize,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            top_tags: default_top_tags(),
        }
    }
}

fn default_page_size() -> usize {
    9
}
fn default_top_tags() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_success_clear_ms")]
    pub success_clear_ms: u64,
    #[serde(default = "default_max_poll_failures")]
    pub max_poll_failures: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            success_clear_ms: default_success_clear_ms(),
            max_poll_failures: default_max_poll_failures(),
        }
    }
}

impl IngestConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn success_clear_delay(&self) -> Duration {
        Duration::from_millis(self.success_clear_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_success_clear_ms() -> u64 {
    3000
}
fn default_max_poll_failures() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EnrichConfig {
    #[serde(default)]
    pub summary_length: SummaryLength,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LinksConfig {
    /// Host substituted for `medium.com` on member-only results.
    #[serde(default = "default_mirror_host")]
    pub mirror_host: String,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            mirror_host: default_mirror_host(),
        }
    }
}

fn default_mirror_host() -> String {
    "freedium.cfd".to_string()
}

impl Config {
    /// All defaults; used when no config file is present.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

fn validate(config: &Config) -> Result<()> {
    // Validate services
    if !crate::models::is_http_url(&config.services.base_url) {
        anyhow::bail!(
            "services.base_url must be an http(s) URL, got '{}'",
            config.services.base_url
        );
    }
    if config.services.timeout_secs == 0 {
        anyhow::bail!("services.timeout_secs must be > 0");
    }

    // Validate results
    if config.results.page_size == 0 {
        anyhow::bail!("results.page_size must be > 0");
    }

    // Validate ingest
    if config.ingest.poll_interval_ms == 0 {
        anyhow::bail!("ingest.poll_interval_ms must be > 0");
    }
    if config.ingest.max_poll_failures == 0 {
        anyhow::bail!("ingest.max_poll_failures must be >= 1");
    }

    if config.links.mirror_host.trim().is_empty() {
        anyhow::bail!("links.mirror_host must not be empty");
    }

    Ok(())
}
