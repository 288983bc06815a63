//! Visit event row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One visit event. Immutable once written; duplicates are allowed
/// and counted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Analytic {
    /// Event instant, second precision. Stored on disk as seconds
    /// since epoch.
    pub time: DateTime<Utc>,
    pub event: String,
    pub path: String,
    pub ip: String,
    #[serde(default)]
    pub platform: String,
    #[serde(rename = "refererDomain", default)]
    pub referer_domain: String,
    #[serde(rename = "countryCode", default)]
    pub country_code: String,
}

impl Analytic {
    #[cfg(test)]
    pub fn test(time: &str, event: &str, ip: &str) -> Self {
        Self {
            time: DateTime::parse_from_rfc3339(time)
                .unwrap()
                .with_timezone(&Utc),
            event: event.into(),
            path: "/".into(),
            ip: ip.into(),
            platform: String::new(),
            referer_domain: String::new(),
            country_code: String::new(),
        }
    }
}
