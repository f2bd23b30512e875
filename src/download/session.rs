//! Download session: the concurrent URL-resolution and retrieval engine.
//!
//! A [`DownloadSession`] turns a batch of [`DownloadRequest`] descriptors
//! into aggregate size estimates ([`DownloadSession::summary`]), a
//! deduplicated set of file URLs ([`DownloadSession::url_to_files`]) and a
//! populated directory tree ([`DownloadSession::download_to_directory`]).
//!
//! Requests for a batch are fanned out concurrently and consumed in
//! completion order; all aggregation (running totals, URL set union) is
//! commutative so arrival order does not matter. Binary fetches are bounded
//! by the client's semaphore. Per-unit failures follow the session's
//! `raise_for_status` policy: propagate the first error, or log a warning
//! and leave that unit's contribution out.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use futures_util::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use super::client::{ApiClient, DownloadSummary};
use super::error::DownloadError;
use crate::catalog::{Catalog, pollutant_id_from_url};
use crate::request::DownloadRequest;

const MB: u64 = 1_048_576;

/// Orchestrates batches of summary, manifest and file-fetch requests.
///
/// State accumulated by one batch (`expected_files`, `expected_bytes`,
/// `urls_to_download`) is cleared on [`DownloadSession::close`], so one
/// session instance can be reused for unrelated batches.
#[derive(Debug)]
pub struct DownloadSession {
    client: ApiClient,
    progress: bool,
    raise_for_status: bool,
    expected_files: u64,
    expected_bytes: u64,
    urls_to_download: HashSet<String>,
}

impl DownloadSession {
    /// Creates a session over `client` with progress bars disabled and
    /// strict failure policy (errors propagate).
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            progress: false,
            raise_for_status: true,
            expected_files: 0,
            expected_bytes: 0,
            urls_to_download: HashSet::new(),
        }
    }

    /// Enables or disables progress bars.
    #[must_use]
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Sets the per-unit failure policy: `true` propagates the first
    /// failed request and aborts the batch, `false` logs a warning and
    /// skips that unit of work.
    #[must_use]
    pub fn raise_for_status(mut self, raise_for_status: bool) -> Self {
        self.raise_for_status = raise_for_status;
        self
    }

    /// Opens the underlying client (allocates pool and semaphore).
    pub fn open(&mut self) {
        self.client.open();
    }

    /// Closes the underlying client and unconditionally clears session
    /// state, so no URLs or totals leak into a subsequent batch.
    pub fn close(&mut self) {
        self.client.close();
        self.urls_to_download.clear();
        self.expected_files = 0;
        self.expected_bytes = 0;
    }

    /// Number of unique URLs pending download.
    #[must_use]
    pub fn number_of_urls(&self) -> usize {
        self.urls_to_download.len()
    }

    /// Unique URLs pending download.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.urls_to_download.iter().map(String::as_str)
    }

    /// Running total of files expected from accumulated summaries.
    #[must_use]
    pub fn expected_files(&self) -> u64 {
        self.expected_files
    }

    /// Running total of bytes expected from accumulated summaries.
    #[must_use]
    pub fn expected_bytes(&self) -> u64 {
        self.expected_bytes
    }

    /// Adds URLs to the pending set. Entries are trimmed and anything not
    /// starting with `http://` or `https://` (header rows, blank lines)
    /// is dropped. Duplicates collapse via the set.
    pub fn add_urls<I, S>(&mut self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for url in urls {
            insert_url(&mut self.urls_to_download, url.as_ref());
        }
    }

    /// Removes one URL from the pending set.
    pub fn remove_url(&mut self, url: &str) {
        self.urls_to_download.remove(url);
    }

    /// Aggregated file-count/size estimate for a batch of descriptors.
    ///
    /// The input is deduplicated and one summary request per unique
    /// descriptor is issued concurrently; responses accumulate into the
    /// session's running totals as they arrive.
    ///
    /// # Errors
    ///
    /// With `raise_for_status`, the first failed request aborts the batch.
    pub async fn summary(
        &mut self,
        requests: &[DownloadRequest],
    ) -> Result<DownloadSummary, DownloadError> {
        let unique: HashSet<&DownloadRequest> = requests.iter().collect();
        let bar = count_bar(self.progress, unique.len() as u64, "summary");

        let client = &self.client;
        let mut jobs: FuturesUnordered<_> = unique
            .iter()
            .map(|request| {
                let payload = request.payload();
                async move { client.download_summary(&payload).await }
            })
            .collect();

        let mut total = DownloadSummary::default();
        while let Some(result) = jobs.next().await {
            bar.inc(1);
            match result {
                Ok(summary) => {
                    total.number_files += summary.number_files;
                    total.size += summary.size;
                }
                Err(e) => {
                    if self.raise_for_status {
                        return Err(e);
                    }
                    warn!(error = %e, "summary request failed, skip");
                }
            }
        }
        drop(jobs);
        bar.finish_and_clear();

        self.expected_files += total.number_files;
        self.expected_bytes += total.size * MB;
        Ok(total)
    }

    /// Resolves a batch of descriptors into unique file URLs.
    ///
    /// The input is deduplicated and one manifest request per unique
    /// descriptor is issued concurrently. Each response is split into
    /// lines; http(s) lines are merged into the pending URL set.
    ///
    /// Returns the number of unique URLs now pending download.
    ///
    /// # Errors
    ///
    /// With `raise_for_status`, the first failed request aborts the batch.
    pub async fn url_to_files(
        &mut self,
        requests: &[DownloadRequest],
    ) -> Result<usize, DownloadError> {
        let unique: HashSet<&DownloadRequest> = requests.iter().collect();
        let bar = count_bar(self.progress, unique.len() as u64, "URLs");

        let client = &self.client;
        let mut jobs: FuturesUnordered<_> = unique
            .iter()
            .map(|request| {
                let payload = request.payload();
                async move { client.download_urls(&payload).await }
            })
            .collect();

        while let Some(result) = jobs.next().await {
            bar.inc(1);
            match result {
                Ok(text) => {
                    for line in text.lines() {
                        insert_url(&mut self.urls_to_download, line);
                    }
                }
                Err(e) => {
                    if self.raise_for_status {
                        return Err(e);
                    }
                    warn!(error = %e, "manifest request failed, skip");
                }
            }
        }
        drop(jobs);
        bar.finish_and_clear();

        Ok(self.urls_to_download.len())
    }

    /// Drains the pending URL set into a directory tree under `root`.
    ///
    /// Each URL maps to `root/<country>/<filename>` (the URL's last two
    /// path segments) when `country_subdir` is true, else to
    /// `root/<filename>`. With `skip_existing`, URLs whose target already
    /// exists non-empty are dropped and their size subtracted from the
    /// running totals; zero-byte files count as failed earlier downloads
    /// and are fetched again. Remaining URLs are fetched with the client's
    /// bounded concurrency and removed from the pending set as each file
    /// completes. When distinct URLs map to the same target (possible
    /// without country subdirectories), one is fetched and the others stay
    /// pending with a warning.
    ///
    /// On full success the pending set and the running totals are empty.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NotADirectory`] if `root` does not exist;
    /// per-file transport failures follow the `raise_for_status` policy.
    pub async fn download_to_directory(
        &mut self,
        root: &Path,
        country_subdir: bool,
        skip_existing: bool,
    ) -> Result<(), DownloadError> {
        if !root.is_dir() {
            return Err(DownloadError::not_a_directory(root));
        }
        if self.urls_to_download.is_empty() {
            warn!("no URLs to download, call url_to_files or add_urls before this method");
            return Ok(());
        }

        let mut targets: HashMap<String, PathBuf> = HashMap::new();
        let mut claimed: HashSet<PathBuf> = HashSet::new();
        for url in &self.urls_to_download {
            let path = target_path(root, url, country_subdir)?;
            if !claimed.insert(path.clone()) {
                // distinct URLs can share a filename in flat mode; only one
                // may write the target, the rest stay pending
                warn!(url = %url, path = %path.display(), "target path collision, skip");
                continue;
            }
            targets.insert(url.clone(), path);
        }

        if skip_existing {
            let existing: Vec<String> = targets
                .iter()
                .filter(|(_, path)| file_size(path).is_some_and(|size| size > 0))
                .map(|(url, _)| url.clone())
                .collect();
            for url in existing {
                if let Some(path) = targets.remove(&url) {
                    let size = file_size(&path).unwrap_or(0);
                    self.expected_files = self.expected_files.saturating_sub(1);
                    self.expected_bytes = self.expected_bytes.saturating_sub(size);
                    self.urls_to_download.remove(&url);
                }
            }
        }

        let parents: HashSet<PathBuf> = targets
            .values()
            .filter_map(|path| path.parent().map(Path::to_path_buf))
            .collect();
        for parent in parents {
            tokio::fs::create_dir_all(&parent)
                .await
                .map_err(|e| DownloadError::io(parent.clone(), e))?;
        }

        let bar = bytes_bar(self.progress, self.expected_bytes);

        let client = &self.client;
        let mut jobs: FuturesUnordered<_> = targets
            .into_iter()
            .map(|(url, path)| async move {
                let result = client.download_binary(&url, path).await;
                (url, result)
            })
            .collect();

        let mut failures = 0usize;
        while let Some((url, result)) = jobs.next().await {
            match result {
                Ok(path) => {
                    bar.inc(file_size(&path).unwrap_or(0));
                    self.urls_to_download.remove(&url);
                }
                Err(e) => {
                    if self.raise_for_status {
                        return Err(e);
                    }
                    warn!(url = %url, error = %e, "file download failed, skip");
                    failures += 1;
                }
            }
        }
        drop(jobs);
        bar.finish_and_clear();

        if self.urls_to_download.is_empty() {
            self.expected_files = 0;
            self.expected_bytes = 0;
        } else {
            info!(
                failed = failures,
                pending = self.urls_to_download.len(),
                "batch finished with URLs still pending"
            );
        }
        Ok(())
    }

    /// Fetches the station metadata file to `path`.
    ///
    /// Skipped entirely when `skip_existing` and `path` already exists;
    /// unlike directory downloads there is no zero-byte exception here.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NotADirectory`] if the parent directory
    /// does not exist, or any client error from the fetch.
    pub async fn download_metadata(
        &self,
        path: &Path,
        skip_existing: bool,
    ) -> Result<(), DownloadError> {
        let parent = path.parent().unwrap_or(Path::new("."));
        if !parent.is_dir() {
            return Err(DownloadError::not_a_directory(parent));
        }
        if skip_existing && path.exists() {
            return Ok(());
        }
        info!(path = %path.display(), "downloading station metadata");
        self.client.download_metadata(path).await?;
        Ok(())
    }

    /// Country codes as reported by the service.
    ///
    /// # Errors
    ///
    /// Returns any client error from the listing request.
    pub async fn countries(&self) -> Result<Vec<String>, DownloadError> {
        let records = self.client.countries().await?;
        Ok(records
            .into_iter()
            .map(|record| record.country_code)
            .collect())
    }

    /// Pollutant notation to numeric id(s), as reported by the service.
    ///
    /// # Errors
    ///
    /// Returns any client error from the listing request.
    pub async fn pollutants(&self) -> Result<BTreeMap<String, BTreeSet<u32>>, DownloadError> {
        let records = self.client.pollutants().await?;
        let mut ids: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();
        for record in records {
            let Some(id) = pollutant_id_from_url(&record.id) else {
                warn!(uri = %record.id, "unparseable pollutant id, skip");
                continue;
            };
            ids.entry(record.notation).or_default().insert(id);
        }
        Ok(ids)
    }

    /// City names per country, as reported by the service. Unknown country
    /// codes are reported with a warning before the request is made.
    ///
    /// # Errors
    ///
    /// Returns any client error from the listing request.
    pub async fn cities(
        &self,
        countries: &[String],
    ) -> Result<BTreeMap<String, BTreeSet<String>>, DownloadError> {
        let catalog = Catalog::get();
        let unknown: Vec<&str> = countries
            .iter()
            .filter(|country| !catalog.has_country(country))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            warn!(countries = unknown.join(", "), "unknown country code(s)");
        }

        let records = self.client.cities(countries).await?;
        let mut cities: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for record in records {
            cities
                .entry(record.country_code)
                .or_default()
                .insert(record.city_name);
        }
        Ok(cities)
    }
}

/// Inserts a manifest line into the URL set if it looks like a file URL.
fn insert_url(urls: &mut HashSet<String>, line: &str) {
    let line = line.trim();
    if line.starts_with("http://") || line.starts_with("https://") {
        urls.insert(line.to_string());
    }
}

/// Size of the file at `path`, or `None` if it does not exist or is not a
/// regular file.
fn file_size(path: &Path) -> Option<u64> {
    let metadata = std::fs::metadata(path).ok()?;
    metadata.is_file().then(|| metadata.len())
}

/// Local target path for `url`: the last two path segments under `root`
/// (country subdirectory mode) or just the filename.
fn target_path(root: &Path, url: &str, country_subdir: bool) -> Result<PathBuf, DownloadError> {
    let parsed = url::Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|segments| segments.filter(|segment| !segment.is_empty()).collect())
        .unwrap_or_default();
    if segments.is_empty() {
        return Err(DownloadError::invalid_url(url));
    }
    let take = if country_subdir { 2 } else { 1 };
    let tail = &segments[segments.len().saturating_sub(take)..];
    let mut path = root.to_path_buf();
    for segment in tail {
        path.push(segment);
    }
    Ok(path)
}

fn count_bar(enabled: bool, total: u64, prefix: &str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{prefix:<8} {bar:30} {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_prefix(prefix.to_string());
    bar
}

fn bytes_bar(enabled: bool, total: u64) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{prefix:<8} {bar:30} {bytes}/{total_bytes}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_prefix("download");
    bar
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session() -> DownloadSession {
        DownloadSession::new(ApiClient::new())
    }

    #[test]
    fn test_add_urls_filters_and_deduplicates() {
        let mut session = session();
        session.add_urls([
            "ParquetFileUrl",
            "https://data.example/MT/a.parquet",
            "  https://data.example/MT/a.parquet  ",
            "http://data.example/MT/b.parquet",
            "",
            "ftp://data.example/MT/c.parquet",
        ]);
        assert_eq!(session.number_of_urls(), 2);
    }

    #[test]
    fn test_remove_url() {
        let mut session = session();
        session.add_urls(["https://data.example/MT/a.parquet"]);
        session.remove_url("https://data.example/MT/a.parquet");
        assert_eq!(session.number_of_urls(), 0);
    }

    #[test]
    fn test_close_clears_state() {
        let mut session = session();
        session.add_urls(["https://data.example/MT/a.parquet"]);
        session.expected_files = 5;
        session.expected_bytes = 123;
        session.close();
        assert_eq!(session.number_of_urls(), 0);
        assert_eq!(session.expected_files(), 0);
        assert_eq!(session.expected_bytes(), 0);
    }

    #[test]
    fn test_target_path_with_country_subdir() {
        let path = target_path(
            Path::new("/data"),
            "https://data.example/files/MT/a.parquet",
            true,
        )
        .unwrap();
        assert_eq!(path, Path::new("/data/MT/a.parquet"));
    }

    #[test]
    fn test_target_path_flat() {
        let path = target_path(
            Path::new("/data"),
            "https://data.example/files/MT/a.parquet",
            false,
        )
        .unwrap();
        assert_eq!(path, Path::new("/data/a.parquet"));
    }

    #[test]
    fn test_target_path_single_segment() {
        let path = target_path(Path::new("/data"), "https://data.example/a.parquet", true)
            .unwrap();
        assert_eq!(path, Path::new("/data/a.parquet"));
    }

    #[test]
    fn test_target_path_invalid_url() {
        let result = target_path(Path::new("/data"), "not-a-url", true);
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_download_to_directory_requires_directory() {
        let mut session = session();
        session.add_urls(["https://data.example/MT/a.parquet"]);
        let result = session
            .download_to_directory(Path::new("/no/such/dir"), true, true)
            .await;
        assert!(matches!(result, Err(DownloadError::NotADirectory { .. })));
    }

    #[tokio::test]
    async fn test_download_to_directory_empty_set_is_noop() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut session = session();
        // warns and returns without touching the network
        session
            .download_to_directory(temp_dir.path(), true, true)
            .await
            .unwrap();
    }

    #[test]
    fn test_file_size_missing_file() {
        assert_eq!(file_size(Path::new("/no/such/file")), None);
    }
}
