//! Expansion of user-level filters into request descriptors and the
//! summary/resolve/fetch sequence over one session.

use std::path::Path;

use tracing::warn;

use super::error::DownloadError;
use super::session::DownloadSession;
use crate::request::{Dataset, pollutants_filter, requests_by_city, requests_by_country};

/// User-level filter and mode selection for one download run.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Country codes; empty means every known country. Ignored when
    /// `cities` is non-empty.
    pub countries: Vec<String>,
    /// Pollutant notations; empty means all pollutants.
    pub pollutants: Vec<String>,
    /// City names; non-empty switches to one request per city.
    pub cities: Vec<String>,
    /// Fetch the station metadata file before the data files.
    pub metadata: bool,
    /// Only report the aggregate file count and size estimate.
    pub summary_only: bool,
    /// Re-download data files that already exist locally. Does not apply
    /// to the metadata extract, which is kept once present.
    pub overwrite: bool,
    /// Keep files for different countries in different subdirectories.
    pub country_subdir: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            countries: Vec::new(),
            pollutants: Vec::new(),
            cities: Vec::new(),
            metadata: false,
            summary_only: false,
            overwrite: false,
            country_subdir: true,
        }
    }
}

/// Expands the filters in `options` into request descriptors and drives
/// `session` through summary-only or full-download mode.
///
/// The session is opened on entry and closed on every exit path, so its
/// state never leaks into a later run.
///
/// # Errors
///
/// Returns [`DownloadError::NotADirectory`] if `root` does not exist, and
/// any transport error the session's failure policy propagates.
pub async fn download(
    session: &mut DownloadSession,
    dataset: Dataset,
    root: &Path,
    options: &DownloadOptions,
) -> Result<(), DownloadError> {
    let pollutants = pollutants_filter(options.pollutants.iter().cloned());
    let requests = if options.cities.is_empty() {
        requests_by_country(dataset, &options.countries, pollutants)
    } else {
        // one request per city; the countries filter does not apply
        requests_by_city(dataset, &options.cities, pollutants)
    };

    if requests.is_empty() {
        warn!("nothing to download, check the selected countries/cities");
        return Ok(());
    }

    session.open();
    let result = run(session, root, options, &requests).await;
    session.close();
    result
}

async fn run(
    session: &mut DownloadSession,
    root: &Path,
    options: &DownloadOptions,
    requests: &[crate::request::DownloadRequest],
) -> Result<(), DownloadError> {
    if options.summary_only {
        let summary = session.summary(requests).await?;
        eprintln!(
            "found {} file(s), ~{} MB in total",
            summary.number_files, summary.size
        );
        return Ok(());
    }

    if options.metadata {
        // an existing metadata extract is always kept; `overwrite` applies
        // to data files only
        session
            .download_metadata(&root.join("metadata.csv"), true)
            .await?;
    }

    let resolved = session.url_to_files(requests).await?;
    if resolved == 0 {
        warn!("found no data matching your selection, try different countries|cities/pollutants");
        return Ok(());
    }

    session
        .download_to_directory(root, options.country_subdir, !options.overwrite)
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::ApiClient;

    #[tokio::test]
    async fn test_unknown_cities_yield_empty_batch_and_no_network() {
        // the client points at an unroutable address; an early return on
        // the empty descriptor set means no request is ever attempted
        let client = ApiClient::with_base_url("http://127.0.0.1:1");
        let mut session = DownloadSession::new(client);
        let options = DownloadOptions {
            cities: vec!["Atlantis".to_string()],
            ..DownloadOptions::default()
        };
        download(
            &mut session,
            Dataset::Historical,
            Path::new("/tmp"),
            &options,
        )
        .await
        .unwrap();
        assert_eq!(session.number_of_urls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_countries_yield_empty_batch() {
        let client = ApiClient::with_base_url("http://127.0.0.1:1");
        let mut session = DownloadSession::new(client);
        let options = DownloadOptions {
            countries: vec!["ZZ".to_string()],
            ..DownloadOptions::default()
        };
        download(
            &mut session,
            Dataset::Verified,
            Path::new("/tmp"),
            &options,
        )
        .await
        .unwrap();
        assert_eq!(session.number_of_urls(), 0);
    }

    #[test]
    fn test_default_options() {
        let options = DownloadOptions::default();
        assert!(options.country_subdir);
        assert!(!options.overwrite);
        assert!(!options.summary_only);
        assert!(options.countries.is_empty());
    }
}
