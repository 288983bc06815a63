//! Sharded driver.
//!
//! Fans a request out over the monthly shards it touches: filter by
//! month, consult the cache, check the store out of the pool, run the
//! shard operation, cache the partial, merge. Writes route each event
//! to its month's shard and never touch the cache.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::spawn_blocking;
use tracing::warn;
use url::Url;

use super::analytic::Analytic;
use super::cache::{key, Diskache};
use super::dbpath::DBPath;
use super::error::Error;
use super::pool::{Pool, Request};
use super::results::{Aggregates, Analytics, Count, Intervals};
use super::shards;
use super::store::{self, Property, Store};
use super::timerange::{month_int, TimeRange};

/// One request's resolved parameters.
#[derive(Debug, Clone)]
pub struct Params {
    pub db_name: String,
    pub time_range: Option<TimeRange>,
    /// Series bucket width in seconds.
    pub interval: i64,
    pub property: Option<Property>,
    pub unique: bool,
    /// Caller opted into caching the current shard.
    pub cache: bool,
    /// Original request URL; the cache fingerprint derives from it.
    pub url: Url,
}

/// Driver over all tenants under one root directory.
pub struct Sharded {
    pool: Pool,
    cache: Diskache,
    root: PathBuf,
}

impl std::fmt::Debug for Sharded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sharded").field("root", &self.root).finish()
    }
}

impl Sharded {
    pub fn new(pool: Pool, cache: Diskache, root: PathBuf) -> Self {
        Self { pool, cache, root }
    }

    /// Raw events in range, concatenated across shards.
    pub async fn query(&self, params: &Params) -> Result<Analytics, Error> {
        let parts = self
            .partials(params, |store: &mut Store, range| store.query(range))
            .await?;

        Ok(Analytics::merged(parts))
    }

    /// Total and per-shard-distinct visitor counts.
    pub async fn count(&self, params: &Params) -> Result<Count, Error> {
        let parts = self
            .partials(params, |store: &mut Store, range| store.count(range))
            .await?;

        Ok(Count::merged(parts))
    }

    /// Counts grouped by a whitelisted property, sorted by total.
    pub async fn group_by(&self, params: &Params) -> Result<Aggregates, Error> {
        let property = params.property.ok_or(Error::Internal)?;
        let unique = params.unique;

        let parts = self
            .partials(params, move |store: &mut Store, range| {
                if unique {
                    store.group_by_uniq(property, range)
                } else {
                    store.group_by(property, range)
                }
            })
            .await?;

        Ok(Aggregates::merged(parts))
    }

    /// Interval-bucketed counts; buckets straddling a month boundary
    /// are combined in the merge.
    pub async fn series(&self, params: &Params) -> Result<Intervals, Error> {
        let interval = params.interval;
        let unique = params.unique;

        let parts = self
            .partials(params, move |store: &mut Store, range| {
                if unique {
                    store.series_uniq(interval, range)
                } else {
                    store.series(interval, range)
                }
            })
            .await?;

        Ok(Intervals::merged(parts))
    }

    /// Append one event to its month's shard. The tenant and shard
    /// are created on first use.
    pub async fn insert(&self, db_name: &str, analytic: Analytic) -> Result<(), Error> {
        let db = self.db_path(db_name);
        let shard = shards::shard_for(&analytic.time);
        let file = DBPath::new(db.dir(), shard).file_name();

        match self.exec(file, move |store| store.insert(&analytic)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::InsertFailed),
            Err(err) => Err(err),
        }
    }

    /// Append a batch, one pool checkout per shard touched. Failed
    /// shards don't stop the rest; the most severe failure is
    /// reported at the end.
    pub async fn bulk_insert(&self, db_name: &str, analytics: Vec<Analytic>) -> Result<(), Error> {
        let db = self.db_path(db_name);

        let mut by_shard: HashMap<String, Vec<Analytic>> = HashMap::new();
        for analytic in analytics {
            by_shard
                .entry(shards::shard_for(&analytic.time))
                .or_default()
                .push(analytic);
        }

        let mut worst: Option<Error> = None;
        for (shard, rows) in by_shard {
            let file = DBPath::new(db.dir(), shard).file_name();

            let err = match self.exec(file, move |store| store.bulk_insert(&rows)).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => Error::InsertFailed,
                Err(err) => err,
            };

            worst = Some(match worst {
                Some(prev) if prev.severity() >= err.severity() => prev,
                _ => err,
            });
        }

        match worst {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Remove a tenant and everything under it. Open handles below
    /// the tenant directory are expired from the pool.
    pub async fn delete(&self, db_name: &str) -> Result<(), Error> {
        let db = self.db_path(db_name);
        if !db.exists() {
            return Err(Error::InvalidDatabaseName);
        }

        self.pool.expire_prefix(&db.dir());

        tokio::fs::remove_dir_all(db.dir()).await.map_err(|err| {
            warn!("error deleting tenant {}: {}", db, err);
            Error::Internal
        })
    }

    pub fn db_exists(&self, db_name: &str) -> bool {
        self.db_path(db_name).exists()
    }

    /// Drain the pool.
    pub async fn shutdown(&self, deadline: Duration) {
        self.pool.shutdown(deadline).await;
    }

    fn db_path(&self, db_name: &str) -> DBPath {
        DBPath::new(&self.root, db_name)
    }

    /// Collect one partial per shard the range touches, going to the
    /// store only on cache miss.
    async fn partials<T, F>(&self, params: &Params, op: F) -> Result<Vec<T>, Error>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(&mut Store, Option<TimeRange>) -> Result<T, store::Error>
            + Clone
            + Send
            + 'static,
    {
        let db = self.db_path(&params.db_name);
        if !db.exists() {
            return Err(Error::InvalidDatabaseName);
        }

        let now_month = month_int(&Utc::now());
        let mut parts = Vec::new();

        for (shard, month) in self.shards_for(&db, &params.time_range) {
            let cache_key = key::normalize(&params.url, &params.time_range, month, now_month);

            if let Some(part) = self.cache_get::<T>(&cache_key) {
                parts.push(part);
                continue;
            }

            let file = DBPath::new(db.dir(), &shard).file_name();
            let range = params.time_range;
            let op = op.clone();

            let part = self
                .exec(file, move |store| op(store, range))
                .await?
                .map_err(|_| Error::Internal)?;

            if params.cache || month < now_month {
                self.cache_put(&cache_key, &part);
            }

            parts.push(part);
        }

        Ok(parts)
    }

    /// Shards of a tenant intersecting the range, with their month
    /// integers. Directories that don't parse as months are skipped.
    fn shards_for(&self, db: &DBPath, range: &Option<TimeRange>) -> Vec<(String, i32)> {
        shards::list_shards(&db.dir())
            .into_iter()
            .filter_map(|name| match shards::name_to_int(&name) {
                Some(month) => Some((name, month)),
                None => {
                    warn!("skipping shard directory with unparseable name: {}", name);
                    None
                }
            })
            .filter(|(_, month)| shards::in_range(*month, range))
            .collect()
    }

    /// Check the shard's store out of the pool and run `op` on it off
    /// the async runtime. The outer error is pool trouble, the inner
    /// one comes from the store itself.
    async fn exec<T, F>(&self, path: PathBuf, op: F) -> Result<Result<T, store::Error>, Error>
    where
        T: Send + 'static,
        F: FnOnce(&mut Store) -> Result<T, store::Error> + Send + 'static,
    {
        let mut guard = self.pool.get(&Request::new(path)).await.map_err(|err| {
            warn!("shard store checkout failed: {}", err);
            Error::Internal
        })?;

        let result = spawn_blocking(move || {
            let result = op(&mut guard);
            (guard, result)
        })
        .await;

        match result {
            Ok((guard, result)) => {
                drop(guard);
                if let Err(err) = &result {
                    warn!("shard operation failed: {}", err);
                }
                Ok(result)
            }
            Err(err) => {
                warn!("shard task failed: {}", err);
                Err(Error::Internal)
            }
        }
    }

    fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.cache.get(key)?;

        match serde_json::from_slice(&bytes) {
            Ok(part) => Some(part),
            Err(err) => {
                warn!("discarding undecodable cache entry: {}", err);
                self.cache.delete(key);
                None
            }
        }
    }

    fn cache_put<T: Serialize>(&self, key: &str, part: &T) {
        match serde_json::to_vec(part) {
            Ok(bytes) => self.cache.put(key, &bytes),
            Err(err) => warn!("cache encode failed: {}", err),
        }
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use crate::database::pool;

    use super::*;

    fn driver(dir: &TempDir) -> Sharded {
        let pool = Pool::new(pool::Config::default());
        pool.launch();

        let cache = Diskache::new(&dir.path().join("cache")).unwrap();
        Sharded::new(pool, cache, dir.path().join("dbs"))
    }

    fn params(db_name: &str, query: &str) -> Params {
        let url = Url::parse(&format!("http://localhost/{}?{}", db_name, query)).unwrap();

        let get = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };

        Params {
            db_name: db_name.into(),
            time_range: TimeRange::parse(get("start").as_deref(), get("end").as_deref()).unwrap(),
            interval: get("interval").map(|i| i.parse().unwrap()).unwrap_or(86400),
            property: None,
            unique: false,
            cache: get("cache").is_some(),
            url,
        }
    }

    #[tokio::test]
    async fn test_insert_then_query_round_trip() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        let analytic = Analytic::test("2024-03-15T10:00:00Z", "view", "1.2.3.4");
        driver.insert("acme", analytic.clone()).await.unwrap();

        assert!(dir
            .path()
            .join("dbs/acme/2024-03/analytics.db")
            .exists());

        let analytics = driver.query(&params("acme", "")).await.unwrap();
        assert_eq!(analytics.list, vec![analytic]);
    }

    #[tokio::test]
    async fn test_missing_tenant_read_fails() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        let err = driver.count(&params("ghost", "")).await.unwrap_err();
        assert_eq!(err, Error::InvalidDatabaseName);
    }

    #[tokio::test]
    async fn test_cross_shard_count() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        for i in 0..10 {
            let mut analytic = Analytic::test("2024-01-10T00:00:00Z", "view", "A");
            analytic.path = format!("/page-{}", i);
            driver.insert("acme", analytic).await.unwrap();
        }
        for _ in 0..5 {
            driver
                .insert("acme", Analytic::test("2024-02-10T00:00:00Z", "view", "B"))
                .await
                .unwrap();
        }

        let count = driver.count(&params("acme", "")).await.unwrap();
        assert_eq!(count.total, 15);
        // Distinct per shard, summed across shards.
        assert_eq!(count.unique, 2);
    }

    #[tokio::test]
    async fn test_group_by_sorted_by_total() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        for (platform, hits) in [("Linux", 3), ("Mac", 5), ("Windows", 2)] {
            for i in 0..hits {
                let mut analytic =
                    Analytic::test("2024-03-15T10:00:00Z", "view", &format!("ip-{}", i));
                analytic.platform = platform.into();
                driver.insert("acme", analytic).await.unwrap();
            }
        }

        let mut request = params("acme", "");
        request.property = Some(Property::Platform);

        let aggregates = driver.group_by(&request).await.unwrap();
        let ids: Vec<&str> = aggregates.list.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["Mac", "Linux", "Windows"]);
        assert_eq!(aggregates.list[0].label, "Mac");
        assert_eq!(aggregates.list[0].total, 5);
    }

    #[tokio::test]
    async fn test_series_merges_boundary_bucket() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        // A bucket width that doesn't divide the day produces a
        // bucket straddling the January/February boundary; each shard
        // emits it and the merge must combine the two.
        driver
            .insert("acme", Analytic::test("2023-01-31T23:59:59Z", "view", "a"))
            .await
            .unwrap();
        driver
            .insert("acme", Analytic::test("2023-02-01T00:00:01Z", "view", "b"))
            .await
            .unwrap();

        let mut request = params("acme", "interval=100000");
        request.interval = 100000;

        let intervals = driver.series(&request).await.unwrap();
        assert_eq!(intervals.list.len(), 1);
        assert_eq!(intervals.list[0].start, "2023-01-31T21:20:00Z");
        assert_eq!(intervals.list[0].total, 2);
    }

    #[tokio::test]
    async fn test_series_separate_buckets_across_shards() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        driver
            .insert("acme", Analytic::test("2024-01-31T23:30:00Z", "view", "a"))
            .await
            .unwrap();
        driver
            .insert("acme", Analytic::test("2024-02-01T00:30:00Z", "view", "a"))
            .await
            .unwrap();

        let mut request = params("acme", "interval=7200");
        request.interval = 7200;

        let intervals = driver.series(&request).await.unwrap();
        assert_eq!(intervals.list.len(), 2);
        assert_eq!(intervals.list[0].start, "2024-01-31T22:00:00Z");
        assert_eq!(intervals.list[0].end, "2024-02-01T00:00:00Z");
        assert_eq!(intervals.list[0].total, 1);
        assert_eq!(intervals.list[1].start, "2024-02-01T00:00:00Z");
        assert_eq!(intervals.list[1].end, "2024-02-01T02:00:00Z");
        assert_eq!(intervals.list[1].total, 1);
    }

    #[tokio::test]
    async fn test_range_filters_shards() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        driver
            .insert("acme", Analytic::test("2024-01-10T00:00:00Z", "view", "a"))
            .await
            .unwrap();
        driver
            .insert("acme", Analytic::test("2024-03-10T00:00:00Z", "view", "a"))
            .await
            .unwrap();

        let count = driver
            .count(&params(
                "acme",
                "start=2024-03-01T00:00:00Z&end=2024-03-31T23:59:59Z",
            ))
            .await
            .unwrap();
        assert_eq!(count.total, 1);
    }

    #[tokio::test]
    async fn test_historical_shards_cache_unconditionally() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        driver
            .insert("acme", Analytic::test("2024-01-10T00:00:00Z", "view", "a"))
            .await
            .unwrap();

        let request = params("acme", "");
        assert_eq!(driver.count(&request).await.unwrap().total, 1);

        // The second insert is invisible through the cached partial.
        driver
            .insert("acme", Analytic::test("2024-01-10T01:00:00Z", "view", "b"))
            .await
            .unwrap();
        assert_eq!(driver.count(&request).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_equivalent_urls_share_cache_entries() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        driver
            .insert("acme", Analytic::test("2024-01-10T00:00:00Z", "view", "a"))
            .await
            .unwrap();

        // Prime the cache with a start bound far before the shard.
        let wide = params("acme", "start=2020-01-01T00:00:00Z&cache=1");
        assert_eq!(driver.count(&wide).await.unwrap().total, 1);

        driver
            .insert("acme", Analytic::test("2024-01-10T01:00:00Z", "view", "b"))
            .await
            .unwrap();

        // A start bound on the shard's own month boundary normalizes
        // to the same fingerprint and must hit the primed entry.
        let aligned = params("acme", "start=2024-01-01T00:00:00Z&cache=1");
        assert_eq!(driver.count(&aligned).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_current_shard_not_cached_without_opt_in() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        let mut analytic = Analytic::test("2024-01-10T00:00:00Z", "view", "a");
        analytic.time = Utc::now();
        driver.insert("acme", analytic.clone()).await.unwrap();

        let request = params("acme", "");
        assert_eq!(driver.count(&request).await.unwrap().total, 1);

        analytic.ip = "b".into();
        driver.insert("acme", analytic).await.unwrap();

        // No opt-in: the current shard is re-scanned.
        assert_eq!(driver.count(&request).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_bulk_insert_spans_shards() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        driver
            .bulk_insert(
                "acme",
                vec![
                    Analytic::test("2024-01-10T00:00:00Z", "view", "a"),
                    Analytic::test("2024-01-11T00:00:00Z", "view", "b"),
                    Analytic::test("2024-02-10T00:00:00Z", "view", "c"),
                ],
            )
            .await
            .unwrap();

        assert!(dir.path().join("dbs/acme/2024-01/analytics.db").exists());
        assert!(dir.path().join("dbs/acme/2024-02/analytics.db").exists());

        let count = driver.count(&params("acme", "")).await.unwrap();
        assert_eq!(count.total, 3);
    }

    #[tokio::test]
    async fn test_delete_tenant() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        driver
            .insert("acme", Analytic::test("2024-01-10T00:00:00Z", "view", "a"))
            .await
            .unwrap();
        assert!(driver.db_exists("acme"));

        driver.delete("acme").await.unwrap();
        assert!(!driver.db_exists("acme"));

        let err = driver.query(&params("acme", "")).await.unwrap_err();
        assert_eq!(err, Error::InvalidDatabaseName);

        // Deleting again is an error: the tenant is gone.
        let err = driver.delete("acme").await.unwrap_err();
        assert_eq!(err, Error::InvalidDatabaseName);
    }

    #[tokio::test]
    async fn test_corrupt_shard_directory_is_skipped() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        driver
            .insert("acme", Analytic::test("2024-01-10T00:00:00Z", "view", "a"))
            .await
            .unwrap();
        std::fs::create_dir(dir.path().join("dbs/acme/lost+found")).unwrap();

        let count = driver.count(&params("acme", "")).await.unwrap();
        assert_eq!(count.total, 1);
    }
}
