//! Tenant and shard addressing.
//!
//! A shard holds one UTC calendar month of events and is named
//! `YYYY-MM`. Shards only exist as directories on disk; there is no
//! registry to keep in sync.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Datelike, Utc};

use super::timerange::TimeRange;

/// Shard name for an event instant, e.g. `2024-03`.
pub fn shard_for(time: &DateTime<Utc>) -> String {
    format!("{:04}-{:02}", time.year(), time.month())
}

/// Shard name as a `YYYYMM` integer. `None` for anything that is not
/// a well-formed month directory.
pub fn name_to_int(name: &str) -> Option<i32> {
    let (year, month) = name.split_once('-')?;
    if year.len() != 4 || month.len() != 2 {
        return None;
    }

    let year: i32 = year.parse().ok()?;
    let month: i32 = month.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }

    Some(year * 100 + month)
}

/// Shard directories of a tenant, sorted by name. A missing tenant
/// directory yields an empty list; plain files are ignored.
pub fn list_shards(tenant_dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(tenant_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut shards: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();

    shards.sort();
    shards
}

/// Month-granular range check, inclusive on both sides.
pub fn in_range(shard: i32, range: &Option<TimeRange>) -> bool {
    let (start, end) = TimeRange::month_bounds(range);
    shard >= start && shard <= end
}
