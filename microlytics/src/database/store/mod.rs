//! Per-shard SQLite store.
//!
//! One store wraps one `analytics.db` file holding a single month of
//! events in the `visits` table. All operations are synchronous;
//! callers dispatch through `spawn_blocking`. Time predicates are
//! inclusive on both sides and compare stored epoch seconds.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;

use super::analytic::Analytic;
use super::results::{Aggregate, Aggregates, Analytics, Count, Interval, Intervals};
use super::timerange::TimeRange;

const SCHEMA: &str = "CREATE TABLE visits (
    time          INTEGER,
    event         TEXT,
    path          TEXT,
    ip            TEXT,
    platform      TEXT,
    refererDomain TEXT,
    countryCode   TEXT
)";

#[derive(Debug, Error)]
pub enum Error {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Columns a group-by may target. The HTTP layer maps friendly names
/// onto these; nothing else ever reaches a SQL string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    CountryCode,
    Platform,
    RefererDomain,
    Event,
}

impl Property {
    pub fn column(&self) -> &'static str {
        match self {
            Property::CountryCode => "countryCode",
            Property::Platform => "platform",
            Property::RefererDomain => "refererDomain",
            Property::Event => "event",
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        match name {
            "countryCode" => Some(Property::CountryCode),
            "platform" => Some(Property::Platform),
            "refererDomain" => Some(Property::RefererDomain),
            "event" => Some(Property::Event),
            _ => None,
        }
    }
}

impl std::fmt::Display for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// Open handle to one shard file.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl Store {
    /// Open the shard file, creating it if absent. The schema is not
    /// touched here; see [`Store::init_schema`].
    pub fn open(path: &Path) -> Result<Self, Error> {
        let conn = Connection::open(path)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Create the `visits` table when the file is fresh; validate its
    /// presence otherwise.
    pub fn init_schema(&self) -> Result<(), Error> {
        if !self.table_exists()? {
            self.conn.execute_batch(SCHEMA)?;
        }

        Ok(())
    }

    fn table_exists(&self) -> Result<bool, Error> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'visits'",
            [],
            |row| row.get(0),
        )?;

        Ok(count == 1)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event.
    pub fn insert(&self, analytic: &Analytic) -> Result<(), Error> {
        self.conn.execute(
            "INSERT INTO visits (time, event, path, ip, platform, refererDomain, countryCode)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                analytic.time.timestamp(),
                analytic.event,
                analytic.path,
                analytic.ip,
                analytic.platform,
                analytic.referer_domain,
                analytic.country_code,
            ],
        )?;

        Ok(())
    }

    /// Append a batch of events in one transaction.
    pub fn bulk_insert(&mut self, rows: &[Analytic]) -> Result<(), Error> {
        let tx = self.conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO visits (time, event, path, ip, platform, refererDomain, countryCode)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for analytic in rows {
                stmt.execute(params![
                    analytic.time.timestamp(),
                    analytic.event,
                    analytic.path,
                    analytic.ip,
                    analytic.platform,
                    analytic.referer_domain,
                    analytic.country_code,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Total and distinct-IP counts inside the range.
    pub fn count(&self, range: Option<TimeRange>) -> Result<Count, Error> {
        let sql = format!(
            "SELECT COUNT(*), COUNT(DISTINCT ip) FROM visits{}",
            time_clause(&range)
        );

        let count = self.conn.query_row(&sql, [], |row| {
            Ok(Count {
                total: row.get(0)?,
                unique: row.get(1)?,
            })
        })?;

        Ok(count)
    }

    /// Row counts per distinct value of `property`. Row order within
    /// a shard is unspecified; callers sort after merging.
    pub fn group_by(&self, property: Property, range: Option<TimeRange>) -> Result<Aggregates, Error> {
        let column = property.column();
        let sql = format!(
            "SELECT {column}, COUNT(*) FROM visits{} GROUP BY {column}",
            time_clause(&range)
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            Ok(Aggregate {
                label: id.clone(),
                id,
                total: row.get(1)?,
                unique: 0,
            })
        })?;

        let mut list = Vec::new();
        for aggregate in rows {
            list.push(aggregate?);
        }

        Ok(Aggregates { list })
    }

    /// As [`Store::group_by`], with distinct IPs per value. The
    /// distinct-ip subquery is joined back against the per-value
    /// totals.
    pub fn group_by_uniq(
        &self,
        property: Property,
        range: Option<TimeRange>,
    ) -> Result<Aggregates, Error> {
        let column = property.column();
        let clause = time_clause(&range);
        let sql = format!(
            "SELECT visits.{column}, COUNT(*) AS total, uniqueCount
             FROM visits
             JOIN (SELECT {column}, COUNT(DISTINCT ip) AS uniqueCount
                   FROM visits{clause} GROUP BY {column}) AS subquery
               ON visits.{column} = subquery.{column}
             {clause}
             GROUP BY visits.{column}"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            Ok(Aggregate {
                label: id.clone(),
                id,
                total: row.get(1)?,
                unique: row.get(2)?,
            })
        })?;

        let mut list = Vec::new();
        for aggregate in rows {
            list.push(aggregate?);
        }

        Ok(Aggregates { list })
    }

    /// Visit counts bucketed on `interval` seconds. Bucket starts are
    /// multiples of the interval; empty buckets are not emitted.
    pub fn series(&self, interval: i64, range: Option<TimeRange>) -> Result<Intervals, Error> {
        let sql = format!(
            "SELECT (time / {interval}) * {interval} AS startTime, COUNT(*)
             FROM visits{} GROUP BY startTime",
            time_clause(&range)
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let start: i64 = row.get(0)?;
            Ok(Interval {
                start: fmt_instant(start),
                end: fmt_instant(start + interval),
                total: row.get(1)?,
                unique: 0,
            })
        })?;

        let mut list = Vec::new();
        for interval in rows {
            list.push(interval?);
        }

        Ok(Intervals { list })
    }

    /// As [`Store::series`], with distinct IPs per bucket.
    pub fn series_uniq(&self, interval: i64, range: Option<TimeRange>) -> Result<Intervals, Error> {
        let clause = time_clause(&range);
        let sql = format!(
            "SELECT (time / {interval}) * {interval} AS startTime, COUNT(*) AS total, uniqueCount
             FROM visits
             JOIN (SELECT (time / {interval}) * {interval} AS sqStartTime,
                          COUNT(DISTINCT ip) AS uniqueCount
                   FROM visits{clause} GROUP BY sqStartTime) AS subquery
               ON sqStartTime = (time / {interval}) * {interval}
             {clause}
             GROUP BY startTime"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let start: i64 = row.get(0)?;
            Ok(Interval {
                start: fmt_instant(start),
                end: fmt_instant(start + interval),
                total: row.get(1)?,
                unique: row.get(2)?,
            })
        })?;

        let mut list = Vec::new();
        for interval in rows {
            list.push(interval?);
        }

        Ok(Intervals { list })
    }

    /// Raw events inside the range, in insertion order.
    pub fn query(&self, range: Option<TimeRange>) -> Result<Analytics, Error> {
        let sql = format!(
            "SELECT time, event, path, ip, platform, refererDomain, countryCode
             FROM visits{}",
            time_clause(&range)
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let time: i64 = row.get(0)?;
            Ok(Analytic {
                time: DateTime::from_timestamp(time, 0).unwrap_or_default(),
                event: row.get(1)?,
                path: row.get(2)?,
                ip: row.get(3)?,
                platform: row.get(4)?,
                referer_domain: row.get(5)?,
                country_code: row.get(6)?,
            })
        })?;

        let mut list = Vec::new();
        for analytic in rows {
            list.push(analytic?);
        }

        Ok(Analytics { list })
    }
}

fn time_clause(range: &Option<TimeRange>) -> String {
    let mut conditions = Vec::new();

    if let Some(range) = range {
        if let Some(start) = range.start {
            conditions.push(format!("time >= {}", start.timestamp()));
        }
        if let Some(end) = range.end {
            conditions.push(format!("time <= {}", end.timestamp()));
        }
    }

    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

fn fmt_instant(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    fn store(dir: &TempDir) -> Store {
        let store = Store::open(&dir.path().join("analytics.db")).unwrap();
        store.init_schema().unwrap();
        store
    }

    fn range(start: &str, end: &str) -> Option<TimeRange> {
        TimeRange::parse(Some(start), Some(end)).unwrap()
    }

    #[test]
    fn test_insert_query_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let analytic = Analytic::test("2024-03-15T10:00:00Z", "view", "1.2.3.4");
        store.insert(&analytic).unwrap();

        let analytics = store.query(None).unwrap();
        assert_eq!(analytics.list, vec![analytic]);
    }

    #[test]
    fn test_schema_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("analytics.db");

        {
            let store = Store::open(&path).unwrap();
            store.init_schema().unwrap();
            store
                .insert(&Analytic::test("2024-03-15T10:00:00Z", "view", "a"))
                .unwrap();
        }

        let store = Store::open(&path).unwrap();
        store.init_schema().unwrap();
        assert_eq!(store.count(None).unwrap().total, 1);
    }

    #[test]
    fn test_count_distinct_ips() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store
            .insert(&Analytic::test("2024-03-15T10:00:00Z", "view", "a"))
            .unwrap();
        store
            .insert(&Analytic::test("2024-03-15T11:00:00Z", "view", "a"))
            .unwrap();
        store
            .insert(&Analytic::test("2024-03-15T12:00:00Z", "view", "b"))
            .unwrap();

        let count = store.count(None).unwrap();
        assert_eq!(count.total, 3);
        assert_eq!(count.unique, 2);
    }

    #[test]
    fn test_count_range_is_inclusive() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store
            .insert(&Analytic::test("2024-03-15T10:00:00Z", "view", "a"))
            .unwrap();
        store
            .insert(&Analytic::test("2024-03-15T10:00:01Z", "view", "a"))
            .unwrap();

        // start == end matches rows at exactly that second.
        let count = store
            .count(range("2024-03-15T10:00:00Z", "2024-03-15T10:00:00Z"))
            .unwrap();
        assert_eq!(count.total, 1);
    }

    #[test]
    fn test_bulk_insert() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);

        let rows: Vec<Analytic> = (0..10)
            .map(|i| Analytic::test("2024-03-15T10:00:00Z", "view", &format!("ip-{}", i)))
            .collect();
        store.bulk_insert(&rows).unwrap();

        let count = store.count(None).unwrap();
        assert_eq!(count.total, 10);
        assert_eq!(count.unique, 10);
    }

    #[test]
    fn test_group_by() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        for (platform, hits) in [("Mac", 5), ("Linux", 3), ("Windows", 2)] {
            for i in 0..hits {
                let mut analytic =
                    Analytic::test("2024-03-15T10:00:00Z", "view", &format!("ip-{}", i));
                analytic.platform = platform.into();
                store.insert(&analytic).unwrap();
            }
        }

        let aggregates = store.group_by(Property::Platform, None).unwrap();
        let mut totals: Vec<(String, i64)> = aggregates
            .list
            .into_iter()
            .map(|a| (a.id, a.total))
            .collect();
        totals.sort();

        assert_eq!(
            totals,
            vec![
                ("Linux".into(), 3),
                ("Mac".into(), 5),
                ("Windows".into(), 2)
            ]
        );
    }

    #[test]
    fn test_group_by_uniq() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        // Three hits from two IPs on Mac, one hit on Linux.
        for (platform, ip) in [("Mac", "a"), ("Mac", "a"), ("Mac", "b"), ("Linux", "c")] {
            let mut analytic = Analytic::test("2024-03-15T10:00:00Z", "view", ip);
            analytic.platform = platform.into();
            store.insert(&analytic).unwrap();
        }

        let aggregates = store.group_by_uniq(Property::Platform, None).unwrap();
        for aggregate in &aggregates.list {
            assert!(aggregate.unique <= aggregate.total);
            match aggregate.id.as_str() {
                "Mac" => {
                    assert_eq!(aggregate.total, 3);
                    assert_eq!(aggregate.unique, 2);
                }
                "Linux" => {
                    assert_eq!(aggregate.total, 1);
                    assert_eq!(aggregate.unique, 1);
                }
                other => panic!("unexpected id {}", other),
            }
        }
    }

    #[test]
    fn test_series_bucket_alignment() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store
            .insert(&Analytic::test("2024-01-31T23:30:00Z", "view", "a"))
            .unwrap();

        let intervals = store.series(7200, None).unwrap();
        assert_eq!(intervals.list.len(), 1);
        assert_eq!(intervals.list[0].start, "2024-01-31T22:00:00Z");
        assert_eq!(intervals.list[0].end, "2024-02-01T00:00:00Z");
        assert_eq!(intervals.list[0].total, 1);
    }

    #[test]
    fn test_series_one_second_interval() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store
            .insert(&Analytic::test("2024-03-15T10:00:00Z", "view", "a"))
            .unwrap();
        store
            .insert(&Analytic::test("2024-03-15T10:00:01Z", "view", "a"))
            .unwrap();

        let intervals = store.series(1, None).unwrap();
        assert_eq!(intervals.list.len(), 2);
        for interval in &intervals.list {
            assert_eq!(interval.total, 1);
        }
    }

    #[test]
    fn test_series_uniq() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        for ip in ["a", "a", "b"] {
            store
                .insert(&Analytic::test("2024-03-15T10:00:00Z", "view", ip))
                .unwrap();
        }

        let intervals = store.series_uniq(86400, None).unwrap();
        assert_eq!(intervals.list.len(), 1);
        assert_eq!(intervals.list[0].total, 3);
        assert_eq!(intervals.list[0].unique, 2);
    }

    #[test]
    fn test_property_whitelist() {
        assert_eq!(Property::from_column("platform"), Some(Property::Platform));
        assert_eq!(Property::from_column("ip"), None);
        assert_eq!(Property::from_column("time"), None);
    }
}
