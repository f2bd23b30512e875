//! Reference catalog of country codes, pollutant notations and city names.
//!
//! The catalog is a read-only lookup service backed by a JSON resource
//! embedded at compile time. It maps the identifiers users type on the
//! command line (country codes, pollutant notations, city names) to the
//! identifiers the download service expects (pollutant vocabulary URIs,
//! the country a city belongs to).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use serde::Deserialize;
use tracing::warn;

/// Base URI of the pollutant vocabulary.
const VOCABULARY_URI: &str = "http://dd.eionet.europa.eu/vocabulary/aq/pollutant";

/// Raw shape of the embedded `catalog.json` resource.
#[derive(Debug, Deserialize)]
struct CatalogData {
    countries: Vec<String>,
    pollutants: BTreeMap<String, BTreeSet<u32>>,
    cities: BTreeMap<String, BTreeSet<String>>,
}

/// Read-only lookup tables for countries, pollutants and cities.
#[derive(Debug)]
pub struct Catalog {
    data: CatalogData,
}

static CATALOG: OnceLock<Catalog> = OnceLock::new();

impl Catalog {
    /// Returns the process-wide catalog, parsing the embedded resource on
    /// first use.
    ///
    /// # Panics
    ///
    /// Panics if the embedded resource is malformed, which would be a
    /// packaging defect caught by the unit tests below.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn get() -> &'static Catalog {
        CATALOG.get_or_init(|| {
            let data: CatalogData = serde_json::from_str(include_str!("catalog.json"))
                .expect("embedded catalog.json is well formed");
            Catalog { data }
        })
    }

    /// All known country codes, sorted.
    #[must_use]
    pub fn countries(&self) -> &[String] {
        &self.data.countries
    }

    /// Returns true if `country` is a known country code.
    #[must_use]
    pub fn has_country(&self, country: &str) -> bool {
        self.data.countries.iter().any(|code| code == country)
    }

    /// Pollutant notation to vocabulary id(s). Most notations map to a
    /// single id; a few legacy pollutants carry more than one.
    #[must_use]
    pub fn pollutants(&self) -> &BTreeMap<String, BTreeSet<u32>> {
        &self.data.pollutants
    }

    /// City names with air quality stations in `country`, if any.
    #[must_use]
    pub fn cities(&self, country: &str) -> Option<&BTreeSet<String>> {
        self.data.cities.get(country)
    }

    /// Country code for a known city name.
    #[must_use]
    pub fn search_city(&self, city: &str) -> Option<&str> {
        self.data
            .cities
            .iter()
            .find(|(_, cities)| cities.contains(city))
            .map(|(country, _)| country.as_str())
    }

    /// Pollutant notations matching `query`, case insensitive.
    #[must_use]
    pub fn search_pollutant(&self, query: &str) -> Vec<&str> {
        let query = query.to_lowercase();
        self.data
            .pollutants
            .keys()
            .filter(|notation| notation.to_lowercase().contains(&query))
            .map(String::as_str)
            .collect()
    }

    /// Vocabulary URIs for the given pollutant notations, sorted.
    ///
    /// Unknown notations are dropped with a warning, matching the policy
    /// for unknown countries and cities.
    #[must_use]
    pub fn properties<'a, I>(&self, notations: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut uris = BTreeSet::new();
        for notation in notations {
            let Some(ids) = self.data.pollutants.get(notation) else {
                warn!(pollutant = notation, "unknown pollutant, skip");
                continue;
            };
            uris.extend(ids.iter().map(|id| format!("{VOCABULARY_URI}/{id}")));
        }
        uris.into_iter().collect()
    }
}

/// Numeric pollutant id from vocabulary URIs such as
/// `http://dd.eionet.europa.eu/vocabulary/aq/pollutant/1` or
/// `http://dd.eionet.europa.eu/vocabularyconcept/aq/pollutant/44/view`.
#[must_use]
pub fn pollutant_id_from_url(url: &str) -> Option<u32> {
    let mut segments = url.trim_end_matches('/').rsplit('/');
    let last = segments.next()?;
    if last == "view" {
        segments.next()?.parse().ok()
    } else {
        last.parse().ok()
    }
}
