//! Request fingerprints.
//!
//! A cache key identifies one shard's partial result for one logical
//! request. Bounds that do not constrain the shard are dropped before
//! encoding, so requests that differ only outside the shard's month
//! land on the same entry.

use chrono::{DateTime, TimeZone, Utc};
use url::form_urlencoded;
use url::Url;

use crate::database::timerange::{month_int, TimeRange};

/// Normalized fingerprint for `(request, shard)`. Pure and
/// deterministic: query parameter order never affects the result.
pub fn normalize(url: &Url, range: &Option<TimeRange>, shard_month: i32, now_month: i32) -> String {
    let range = range.unwrap_or_default();

    // A start before the shard, or exactly at its first second,
    // doesn't narrow it.
    let drop_start = match range.start {
        Some(start) => month_int(&start) < shard_month || Some(start) == month_start(shard_month),
        None => false,
    };

    // Same for an end in a later month.
    let drop_end = match range.end {
        Some(end) => month_int(&end) > shard_month,
        None => false,
    };

    // Historical shards cache unconditionally, so the opt-in flag
    // must not split their keyspace.
    let drop_cache = shard_month < now_month;

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| match name.as_ref() {
            "start" => !drop_start,
            "end" => !drop_end,
            "cache" => !drop_cache,
            _ => true,
        })
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    pairs.push(("shard".into(), shard_month.to_string()));
    pairs.sort();

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();

    format!("{}?{}", url.path(), query)
}

fn month_start(month: i32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(month / 100, (month % 100) as u32, 1, 0, 0, 0)
        .single()
}

#[cfg(test)]
mod test {
    use super::*;

    fn key(url: &str, shard_month: i32, now_month: i32) -> String {
        let url = Url::parse(url).unwrap();
        let start = url
            .query_pairs()
            .find(|(name, _)| name == "start")
            .map(|(_, value)| value.into_owned());
        let end = url
            .query_pairs()
            .find(|(name, _)| name == "end")
            .map(|(_, value)| value.into_owned());
        let range = TimeRange::parse(start.as_deref(), end.as_deref()).unwrap();

        normalize(&url, &range, shard_month, now_month)
    }

    #[test]
    fn test_start_variants_share_historical_keys() {
        // Both requests fully cover every shard from 2023-01 on: the
        // first start lies years earlier, the second sits exactly on
        // the month boundary.
        let wide = "http://x/acme/count?start=2020-01-01T00:00:00Z&end=2024-12-31T23:59:59Z&cache=1";
        let narrow =
            "http://x/acme/count?start=2023-01-01T00:00:00Z&end=2024-12-31T23:59:59Z&cache=1";

        let mut month = 202301;
        while month <= 202412 {
            assert_eq!(key(wide, month, 202508), key(narrow, month, 202508));
            month = if month % 100 == 12 {
                month + 100 - 11
            } else {
                month + 1
            };
        }
    }

    #[test]
    fn test_inner_start_stays_in_key() {
        let url = "http://x/acme/count?start=2023-01-15T00:00:00Z";
        assert_ne!(key(url, 202301, 202508), key("http://x/acme/count", 202301, 202508));
    }

    #[test]
    fn test_end_dropped_for_earlier_shards() {
        let url = "http://x/acme/count?end=2024-06-30T23:59:59Z";

        // Shard before the end month: bound dropped.
        assert_eq!(
            key(url, 202401, 202508),
            key("http://x/acme/count", 202401, 202508)
        );
        // Shard of the end month: bound kept.
        assert_ne!(
            key(url, 202406, 202508),
            key("http://x/acme/count", 202406, 202508)
        );
    }

    #[test]
    fn test_cache_param_dropped_for_historical_shards() {
        let with = "http://x/acme/count?cache=1";
        let without = "http://x/acme/count";

        assert_eq!(key(with, 202401, 202508), key(without, 202401, 202508));
        // Current month keeps the opt-in flag in the key.
        assert_ne!(key(with, 202508, 202508), key(without, 202508, 202508));
    }

    #[test]
    fn test_param_order_is_irrelevant() {
        let one = "http://x/acme/time?interval=3600&unique=true";
        let two = "http://x/acme/time?unique=true&interval=3600";

        assert_eq!(key(one, 202401, 202508), key(two, 202401, 202508));
    }

    #[test]
    fn test_shard_month_is_part_of_key() {
        let url = "http://x/acme/count";
        assert_ne!(key(url, 202401, 202508), key(url, 202402, 202508));
    }
}
