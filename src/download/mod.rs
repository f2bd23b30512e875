//! Access to the air quality download service.
//!
//! This module provides the concurrent URL-resolution and file-retrieval
//! engine:
//!
//! - [`ApiClient`]: scoped HTTP operations with a bounded-concurrency
//!   guard around binary transfers
//! - [`DownloadSession`]: deduplication, fan-out/fan-in and the local
//!   skip/overwrite policy for whole batches
//! - [`download`]: expansion of user filters into request descriptors and
//!   the summary/resolve/fetch sequence
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use airdata::download::{ApiClient, DownloadOptions, DownloadSession, download};
//! use airdata::request::Dataset;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = DownloadSession::new(ApiClient::new()).progress(true);
//! let options = DownloadOptions {
//!     countries: vec!["MT".to_string()],
//!     ..DownloadOptions::default()
//! };
//! download(&mut session, Dataset::Historical, Path::new("data"), &options).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod orchestrator;
mod session;

pub use client::{
    API_BASE_URL, ApiClient, CityRecord, CountryRecord, DEFAULT_MAX_CONCURRENT, DownloadSummary,
    METADATA_URL, PollutantRecord,
};
pub use error::DownloadError;
pub use orchestrator::{DownloadOptions, download};
pub use session::DownloadSession;
