//! HTTP client wrapper for the download service.
//!
//! [`ApiClient`] issues the individual HTTP operations (country, pollutant
//! and city listings, download summaries, URL manifests, binary file
//! fetches) against the remote service. Binary fetches share a semaphore
//! so that at most `max_concurrent` transfers are in flight at once.
//!
//! The client is a scoped resource: the connection pool and the semaphore
//! exist only between [`ApiClient::open`] and [`ApiClient::close`]. Any
//! request outside that window fails with
//! [`DownloadError::InactiveClient`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use super::error::DownloadError;
use crate::request::RequestPayload;

/// Base URL of the download service.
pub const API_BASE_URL: &str = "https://eeadmz1-downloads-api-appservice.azurewebsites.net";

/// URL of the station metadata extract.
pub const METADATA_URL: &str = "https://discomap.eea.europa.eu/App/AQViewer/download?fqn=Airquality_Dissem.b2g.measurements&f=csv";

/// Default bound on simultaneous binary transfers.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// One entry of the `/Country` response.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CountryRecord {
    #[serde(rename = "countryCode")]
    pub country_code: String,
}

/// One entry of the `/Property` response.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PollutantRecord {
    pub notation: String,
    /// Pollutant vocabulary URI.
    pub id: String,
}

/// One entry of the `/City` response.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CityRecord {
    #[serde(rename = "countryCode")]
    pub country_code: String,
    #[serde(rename = "cityName")]
    pub city_name: String,
}

/// The `/DownloadSummary` response: file count and size estimate in MB.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DownloadSummary {
    #[serde(rename = "numberFiles")]
    pub number_files: u64,
    /// Estimated size in MB.
    pub size: u64,
}

/// Pool and semaphore, allocated on `open()` and released on `close()`.
#[derive(Debug)]
struct ClientState {
    http: Client,
    semaphore: Arc<Semaphore>,
}

/// Handle for requests to the download service.
///
/// Construct once, `open()`, issue requests, `close()`. The base URL is a
/// constructor parameter so tests can point the client at a mock server;
/// there is no process-wide default instance.
#[derive(Debug)]
pub struct ApiClient {
    base_url: String,
    metadata_url: String,
    timeout: Duration,
    max_concurrent: usize,
    state: Option<ClientState>,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClient {
    /// Creates a client for the production service endpoints.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(API_BASE_URL)
    }

    /// Creates a client for an alternative service base URL.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            metadata_url: METADATA_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            state: None,
        }
    }

    /// Overrides the station metadata URL.
    #[must_use]
    pub fn metadata_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_url = url.into();
        self
    }

    /// Overrides the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the bound on simultaneous binary transfers.
    #[must_use]
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Returns the configured transfer bound.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.max_concurrent
    }

    /// Allocates the connection pool and the transfer semaphore.
    ///
    /// Idempotent: opening an already open client keeps the existing pool.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration, which should never happen in practice.
    #[allow(clippy::expect_used)]
    pub fn open(&mut self) {
        if self.state.is_some() {
            return;
        }
        let http = Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(self.max_concurrent)
            .gzip(true)
            .user_agent(concat!("airdata/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client with static configuration");
        debug!(
            base_url = %self.base_url,
            max_concurrent = self.max_concurrent,
            "client opened"
        );
        self.state = Some(ClientState {
            http,
            semaphore: Arc::new(Semaphore::new(self.max_concurrent)),
        });
    }

    /// Releases the connection pool and the transfer semaphore.
    pub fn close(&mut self) {
        self.state = None;
    }

    /// Returns true while the client is inside its open/close window.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn state(&self) -> Result<&ClientState, DownloadError> {
        self.state.as_ref().ok_or(DownloadError::InactiveClient)
    }

    /// GET request to `/Country`.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on transport failure, non-2xx status, or if
    /// the client is not open.
    pub async fn countries(&self) -> Result<Vec<CountryRecord>, DownloadError> {
        let url = format!("{}/Country", self.base_url);
        let response = self.get(&url).await?;
        response
            .json()
            .await
            .map_err(|e| DownloadError::request(url, e))
    }

    /// GET request to `/Property`.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on transport failure, non-2xx status, or if
    /// the client is not open.
    pub async fn pollutants(&self) -> Result<Vec<PollutantRecord>, DownloadError> {
        let url = format!("{}/Property", self.base_url);
        let response = self.get(&url).await?;
        response
            .json()
            .await
            .map_err(|e| DownloadError::request(url, e))
    }

    /// POST request to `/City` with a list of country codes.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on transport failure, non-2xx status, or if
    /// the client is not open.
    pub async fn cities(&self, countries: &[String]) -> Result<Vec<CityRecord>, DownloadError> {
        let url = format!("{}/City", self.base_url);
        let response = self.post_json(&url, &countries).await?;
        response
            .json()
            .await
            .map_err(|e| DownloadError::request(url, e))
    }

    /// POST request to `/DownloadSummary`: file count and size estimate
    /// for one descriptor, without resolving individual URLs.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on transport failure, non-2xx status, or if
    /// the client is not open.
    pub async fn download_summary(
        &self,
        payload: &RequestPayload,
    ) -> Result<DownloadSummary, DownloadError> {
        let url = format!("{}/DownloadSummary", self.base_url);
        let response = self.post_json(&url, payload).await?;
        response
            .json()
            .await
            .map_err(|e| DownloadError::request(url, e))
    }

    /// POST request to `/ParquetFile/urls`: newline-delimited manifest
    /// text for one descriptor. Lines are file URLs or header rows; the
    /// caller keeps only lines starting with `http://` or `https://`.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on transport failure, non-2xx status, or if
    /// the client is not open.
    pub async fn download_urls(&self, payload: &RequestPayload) -> Result<String, DownloadError> {
        let url = format!("{}/ParquetFile/urls", self.base_url);
        let response = self.post_json(&url, payload).await?;
        response
            .text()
            .await
            .map_err(|e| DownloadError::request(url, e))
    }

    /// GET request to `url`, writing the full response body to `path` and
    /// returning `path` unchanged.
    ///
    /// This is the only operation gated by the transfer semaphore; the
    /// permit is held across the request and the file write.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on transport failure, non-2xx status, IO
    /// failure, or if the client is not open.
    #[instrument(level = "debug", skip(self, path), fields(url = %url))]
    pub async fn download_binary(
        &self,
        url: &str,
        path: PathBuf,
    ) -> Result<PathBuf, DownloadError> {
        let state = self.state()?;
        let _permit = state
            .semaphore
            .acquire()
            .await
            .map_err(|_| DownloadError::InactiveClient)?;

        let response = self.get(url).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| DownloadError::request(url, e))?;
        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| DownloadError::io(path.clone(), e))?;

        debug!(path = %path.display(), bytes = body.len(), "file written");
        Ok(path)
    }

    /// Fetches the station metadata extract to `path`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`download_binary`](Self::download_binary).
    pub async fn download_metadata(&self, path: &Path) -> Result<PathBuf, DownloadError> {
        let url = self.metadata_url.clone();
        self.download_binary(&url, path.to_path_buf()).await
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let state = self.state()?;
        let response = state
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::request(url, e))?;
        check_status(url, response)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response, DownloadError> {
        let state = self.state()?;
        let response = state
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| DownloadError::request(url, e))?;
        check_status(url, response)
    }
}

/// Maps non-2xx responses to [`DownloadError::HttpStatus`].
fn check_status(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, DownloadError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(DownloadError::http_status(url, status.as_u16()))
    }
}
