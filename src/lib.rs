//! Bulk download client for European air quality monitoring data.
//!
//! This library discovers available countries, pollutants and cities,
//! turns user filters into deduplicated server queries, and downloads the
//! resulting data files concurrently with bounded parallelism, skipping
//! files that are already present locally.
//!
//! # Architecture
//!
//! - [`catalog`] - embedded lookup tables for countries, pollutants, cities
//! - [`request`] - request descriptors and filter expansion
//! - [`download`] - API client, download session and orchestration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod download;
pub mod request;

// Re-export commonly used types
pub use catalog::Catalog;
pub use download::{
    ApiClient, DEFAULT_MAX_CONCURRENT, DownloadError, DownloadOptions, DownloadSession,
    DownloadSummary, download,
};
pub use request::{Dataset, DownloadRequest, requests_by_city, requests_by_country};
