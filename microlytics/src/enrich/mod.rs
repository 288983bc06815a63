//! Request enrichment: derive platform, referer domain and country
//! code for incoming events.

pub mod platform;

use std::sync::Arc;

use url::Url;

pub use platform::platform;

/// IP to ISO country code resolution. The service runs degraded
/// without one: events simply carry an empty country code.
pub trait CountryLookup: Send + Sync {
    /// Lowercase two-letter code, or `None` when unresolvable.
    fn country_code(&self, ip: &str) -> Option<String>;
}

/// Enrichment applied to posted events.
#[derive(Clone, Default)]
pub struct Enricher {
    country: Option<Arc<dyn CountryLookup>>,
}

impl std::fmt::Debug for Enricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher")
            .field("country", &self.country.is_some())
            .finish()
    }
}

impl Enricher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_country(lookup: Arc<dyn CountryLookup>) -> Self {
        Self {
            country: Some(lookup),
        }
    }

    /// Platform label for a user agent.
    pub fn platform(&self, user_agent: &str) -> String {
        platform(user_agent)
    }

    /// Host part of a referer, or empty for unparseable values.
    pub fn referer_domain(&self, referer: &str) -> String {
        Url::parse(referer)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned))
            .unwrap_or_default()
    }

    /// Lowercase country code for an IP, empty when lookups are
    /// disabled or fail.
    pub fn country_code(&self, ip: &str) -> String {
        self.country
            .as_ref()
            .and_then(|lookup| lookup.country_code(ip))
            .unwrap_or_default()
    }
}
