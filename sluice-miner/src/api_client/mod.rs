//! HTTP client for the device API.

pub mod poller;
pub mod types;

use async_trait::async_trait;

pub use poller::{InfoPoller, PollerConfig};
pub use types::{DeviceInfo, HistoryChunk, HistoryPoint};

/// Used when `SLUICE_API_URL` is not set.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7785";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("device returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Source of periodic device snapshots, the seam the poller runs
/// against. `history_from_ms` anchors the embedded history window; zero
/// asks for the most recent window.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch_info(
        &self,
        history_from_ms: i64,
        history_count: usize,
    ) -> crate::error::Result<DeviceInfo>;
}

/// Thin reqwest wrapper over the two device endpoints.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Base URL from `SLUICE_API_URL`, falling back to the default.
    pub fn from_env() -> Self {
        let base = std::env::var("SLUICE_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /api/v0/info`, optionally asking for an embedded history
    /// window starting at `history_from_ms`.
    pub async fn get_info(
        &self,
        history_from_ms: Option<i64>,
        history_count: usize,
    ) -> Result<DeviceInfo, ClientError> {
        let url = match history_from_ms {
            Some(from) => format!(
                "{}/api/v0/info?historyFrom={from}&count={history_count}",
                self.base_url
            ),
            None => format!("{}/api/v0/info", self.base_url),
        };
        self.get_json(&url).await
    }

    /// `GET /api/v0/history`, one chunk of backlog from `from_ms` on.
    pub async fn get_history(
        &self,
        from_ms: i64,
        count: usize,
    ) -> Result<HistoryChunk, ClientError> {
        let url = format!("{}/api/v0/history?from={from_ms}&count={count}", self.base_url);
        self.get_json(&url).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ClientError> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TelemetrySource for Client {
    async fn fetch_info(
        &self,
        history_from_ms: i64,
        history_count: usize,
    ) -> crate::error::Result<DeviceInfo> {
        let from = (history_from_ms > 0).then_some(history_from_ms);
        Ok(self.get_info(from, history_count).await?)
    }
}

#[async_trait]
impl crate::chart::drain::HistoryFetcher for Client {
    async fn fetch_history(&self, from_ms: i64, count: usize) -> crate::error::Result<HistoryChunk> {
        Ok(self.get_history(from_ms, count).await?)
    }
}
