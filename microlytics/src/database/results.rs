//! Query result types and the merge rules for combining per-shard
//! partial results into one answer.
//!
//! Every merge lives here as a single `merged` constructor applied
//! once over all collected partials. The serde encoding doubles as
//! the HTTP response body and the cache entry format.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::analytic::Analytic;

/// Total and distinct-IP visit counts.
///
/// `unique` is distinct within each shard and summed across shards:
/// an IP active in two months counts twice. Exact cross-month
/// deduplication would need a raw-IP pass over every shard.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Count {
    pub total: i64,
    pub unique: i64,
}

impl Count {
    pub fn merged(parts: Vec<Count>) -> Count {
        let mut count = Count::default();
        for part in parts {
            count.total += part.total;
            count.unique += part.unique;
        }
        count
    }
}

/// Per-value counts for one grouped property.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub id: String,
    pub label: String,
    pub total: i64,
    pub unique: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregates {
    pub list: Vec<Aggregate>,
}

impl Aggregates {
    /// Merge by id, summing counts. The first label seen for an id
    /// wins. Sorted by total descending, once, after accumulation.
    pub fn merged(parts: Vec<Aggregates>) -> Aggregates {
        let mut map: HashMap<String, Aggregate> = HashMap::new();

        for part in parts {
            for aggregate in part.list {
                match map.get_mut(&aggregate.id) {
                    Some(entry) => {
                        entry.total += aggregate.total;
                        entry.unique += aggregate.unique;
                    }
                    None => {
                        map.insert(aggregate.id.clone(), aggregate);
                    }
                }
            }
        }

        let mut list: Vec<Aggregate> = map.into_values().collect();
        list.sort_unstable_by(|a, b| b.total.cmp(&a.total));

        Aggregates { list }
    }
}

/// One time bucket. `start` and `end` are RFC 3339 UTC.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Interval {
    pub start: String,
    pub end: String,
    pub total: i64,
    pub unique: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Intervals {
    pub list: Vec<Interval>,
}

impl Intervals {
    /// Concatenate, then collapse buckets sharing `(start, end)` by
    /// summing their counts. Buckets are unique within a shard;
    /// collisions only happen where a bucket straddles a month
    /// boundary and both adjacent shards emit it. Sorted by start.
    pub fn merged(parts: Vec<Intervals>) -> Intervals {
        let mut list: Vec<Interval> = Vec::new();
        let mut index: HashMap<(String, String), usize> = HashMap::new();

        for part in parts {
            for interval in part.list {
                let key = (interval.start.clone(), interval.end.clone());
                match index.get(&key) {
                    Some(&at) => {
                        list[at].total += interval.total;
                        list[at].unique += interval.unique;
                    }
                    None => {
                        index.insert(key, list.len());
                        list.push(interval);
                    }
                }
            }
        }

        // RFC 3339 UTC sorts lexicographically in time order.
        list.sort_unstable_by(|a, b| a.start.cmp(&b.start));

        Intervals { list }
    }
}

/// Raw event listing.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Analytics {
    pub list: Vec<Analytic>,
}

impl Analytics {
    pub fn merged(parts: Vec<Analytics>) -> Analytics {
        let mut analytics = Analytics::default();
        for part in parts {
            analytics.list.extend(part.list);
        }
        analytics
    }
}
