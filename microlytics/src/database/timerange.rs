//! Optional time window on queries.

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("unparseable time value: {0}")]
    Format(String),

    #[error("start must be before end")]
    Inverted,
}

/// Half-open-ended time window. Both bounds are inclusive and carry
/// second precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Build a range from raw `start`/`end` request parameters. Returns
    /// `None` when neither side is present. Each side accepts RFC 3339
    /// with an RFC 1123 fallback.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Option<Self>, Error> {
        if start.is_none() && end.is_none() {
            return Ok(None);
        }

        let range = TimeRange {
            start: start.map(parse_instant).transpose()?,
            end: end.map(parse_instant).transpose()?,
        };

        if let (Some(start), Some(end)) = (range.start, range.end) {
            if end < start {
                return Err(Error::Inverted);
            }
        }

        Ok(Some(range))
    }

    /// Month bounds as `YYYYMM` integers, defaulting to `(0, 999999)`
    /// for absent sides. Used to select the shards a range touches:
    /// comparing at month granularity keeps boundary months in, the
    /// per-shard predicate then narrows to exact seconds.
    pub fn month_bounds(range: &Option<TimeRange>) -> (i32, i32) {
        let range = match range {
            Some(range) => range,
            None => return (0, 999999),
        };

        let start = range.start.map(|t| month_int(&t)).unwrap_or(0);
        let end = range.end.map(|t| month_int(&t)).unwrap_or(999999);

        (start, end)
    }
}

/// `YYYYMM` integer for an instant's UTC month.
pub fn month_int(time: &DateTime<Utc>) -> i32 {
    time.year() * 100 + time.month() as i32
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .map(|time| time.with_timezone(&Utc))
        .map_err(|_| Error::Format(value.into()))
}
