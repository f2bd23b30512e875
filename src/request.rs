//! Request descriptors: one unit of server query.
//!
//! A [`DownloadRequest`] identifies the scope of a single manifest or
//! summary request (country, dataset, optional pollutant set, optional
//! city). Descriptors are value types: two descriptors with identical
//! fields are the same unit of work, and batches are deduplicated on that
//! basis before any network call.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Serializer};
use tracing::warn;

use crate::catalog::Catalog;

/// Identifies this client to the download service.
const SOURCE: &str = "API";

/// The three data deliveries offered by the download service.
///
/// - `Historical`: legacy data delivered between 2002 and 2012, before the
///   Air Quality Directive 2008/50/EC entered into force.
/// - `Verified`: data verified and reported annually by countries.
/// - `Unverified`: up-to-date data transmitted continuously, covering the
///   most recent period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Dataset {
    Unverified = 1,
    Verified = 2,
    Historical = 3,
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unverified => "Unverified",
            Self::Verified => "Verified",
            Self::Historical => "Historical",
        };
        f.write_str(name)
    }
}

/// One unit of server query: a country and dataset, optionally restricted
/// to a pollutant set and/or a single city.
///
/// Equal by value and hashable, so a `HashSet<DownloadRequest>` collapses
/// duplicate units of work. Not mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DownloadRequest {
    pub country: String,
    pub dataset: Dataset,
    /// `None` means all pollutants for this country.
    pub pollutants: Option<BTreeSet<String>>,
    /// Restricts the request to a single station-bearing city.
    pub city: Option<String>,
}

/// JSON body posted to the summary and manifest endpoints.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RequestPayload {
    pub countries: Vec<String>,
    pub cities: Vec<String>,
    /// Pollutant vocabulary URIs, sorted.
    pub properties: Vec<String>,
    pub datasets: Vec<Dataset>,
    pub source: String,
}

impl DownloadRequest {
    #[must_use]
    pub fn new(country: impl Into<String>, dataset: Dataset) -> Self {
        Self {
            country: country.into(),
            dataset,
            pollutants: None,
            city: None,
        }
    }

    #[must_use]
    pub fn with_pollutants(mut self, pollutants: BTreeSet<String>) -> Self {
        self.pollutants = Some(pollutants);
        self
    }

    #[must_use]
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Server-form payload for this descriptor. Pollutant notations are
    /// resolved to vocabulary URIs through the catalog.
    #[must_use]
    pub fn payload(&self) -> RequestPayload {
        let properties = match &self.pollutants {
            None => Vec::new(),
            Some(pollutants) => {
                Catalog::get().properties(pollutants.iter().map(String::as_str))
            }
        };
        RequestPayload {
            countries: vec![self.country.clone()],
            cities: self.city.iter().cloned().collect(),
            properties,
            datasets: vec![self.dataset],
            source: SOURCE.to_string(),
        }
    }
}

fn pollutant_set<I, S>(pollutants: I) -> Option<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let set: BTreeSet<String> = pollutants.into_iter().map(Into::into).collect();
    (!set.is_empty()).then_some(set)
}

/// One descriptor per known city. The country is resolved from the city
/// through the catalog; unknown cities are dropped with a warning.
pub fn requests_by_city<I, S>(
    dataset: Dataset,
    cities: I,
    pollutants: Option<BTreeSet<String>>,
) -> Vec<DownloadRequest>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let catalog = Catalog::get();
    let mut requests = Vec::new();
    for city in cities {
        let city = city.as_ref();
        let Some(country) = catalog.search_city(city) else {
            warn!(city, "unknown city, skip");
            continue;
        };
        let mut request = DownloadRequest::new(country, dataset).with_city(city);
        request.pollutants = pollutants.clone();
        requests.push(request);
    }
    requests
}

/// One descriptor per known country; an empty `countries` iterator means
/// every country in the catalog. Unknown codes are dropped with a warning.
pub fn requests_by_country<I, S>(
    dataset: Dataset,
    countries: I,
    pollutants: Option<BTreeSet<String>>,
) -> Vec<DownloadRequest>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let catalog = Catalog::get();
    let countries: Vec<String> = countries
        .into_iter()
        .map(|country| country.as_ref().to_string())
        .collect();
    let countries = if countries.is_empty() {
        catalog.countries().to_vec()
    } else {
        countries
    };

    let mut requests = Vec::new();
    for country in countries {
        if !catalog.has_country(&country) {
            warn!(country, "unknown country, skip");
            continue;
        }
        let mut request = DownloadRequest::new(country, dataset);
        request.pollutants = pollutants.clone();
        requests.push(request);
    }
    requests
}

/// Builds the optional pollutant set shared by all descriptors of a batch.
#[must_use]
pub fn pollutants_filter<I, S>(pollutants: I) -> Option<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    pollutant_set(pollutants)
}
