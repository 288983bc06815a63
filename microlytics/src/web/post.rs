//! POST body structures.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::database::Analytic;
use crate::enrich::Enricher;

use super::error::RequestError;

/// Event time as posted: epoch seconds or an RFC 3339 stamp. Absent
/// means "now".
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum PostTime {
    Seconds(i64),
    Stamp(String),
}

/// One posted event. `platform`, `refererDomain` and `countryCode`
/// may be supplied directly (bulk imports do); otherwise they are
/// derived from `headers` and the client IP.
#[derive(Deserialize, Debug, Clone)]
pub struct PostAnalytic {
    #[serde(default)]
    pub time: Option<PostTime>,
    pub event: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(rename = "refererDomain", default)]
    pub referer_domain: Option<String>,
    #[serde(rename = "countryCode", default)]
    pub country_code: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PostAnalytics {
    pub list: Vec<PostAnalytic>,
}

impl PostAnalytic {
    /// Resolve the posted fields into a storable event.
    pub fn into_analytic(self, enricher: &Enricher) -> Result<Analytic, RequestError> {
        let time = match self.time {
            None => Utc::now(),
            Some(PostTime::Seconds(secs)) => {
                DateTime::from_timestamp(secs, 0).ok_or(RequestError::InvalidTimeFormat)?
            }
            Some(PostTime::Stamp(stamp)) => DateTime::parse_from_rfc3339(&stamp)
                .map(|time| time.with_timezone(&Utc))
                .map_err(|_| RequestError::InvalidTimeFormat)?,
        };

        let user_agent = header(&self.headers, "user-agent");
        let platform = match self.platform {
            Some(platform) => platform,
            // No user agent at all stays empty; only a present one is
            // classified (possibly as "unknown").
            None if user_agent.is_empty() => String::new(),
            None => enricher.platform(user_agent),
        };

        let referer_domain = match self.referer_domain {
            Some(domain) => domain,
            None => enricher.referer_domain(header(&self.headers, "referer")),
        };

        let country_code = match self.country_code {
            Some(code) => code,
            None => enricher.country_code(&self.ip),
        };

        Ok(Analytic {
            time,
            event: self.event,
            path: self.path,
            ip: self.ip,
            platform,
            referer_domain,
            country_code,
        })
    }
}

fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> &'a str {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
        .unwrap_or_default()
}
