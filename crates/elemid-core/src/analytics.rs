//! Usage analytics
//!
//! Writes are cheap upserts on the `analytics` row plus one event row.
//! Every query runs directly against the store; nothing here touches the
//! in-memory entity index.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RegistryError, Result};
use crate::storage::Store;
use crate::types::{self, LifecycleState, Timestamp};

/// Aggregates kept per element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub id: String,
    pub total_accesses: u64,
    pub first_access: Option<Timestamp>,
    pub last_access: Option<Timestamp>,
    /// Highest access count seen inside one trailing window
    pub peak_hourly_accesses: u64,
    pub avg_execution_ms: f64,
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub lifecycle: LifecycleState,
    /// Set once the element is deleted
    pub lifetime_ms: Option<i64>,
}

impl AnalyticsRecord {
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.success_count + self.failure_count;
        (total > 0).then(|| self.success_count as f64 / total as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub id: String,
    pub accesses: u64,
}

/// Timing of one action on one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStats {
    pub id: String,
    pub action: String,
    pub executions: u64,
    pub avg_duration_ms: f64,
    pub max_duration_ms: f64,
}

/// Half-open `[start, end)` window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// The `window` leading up to now
    pub fn last(window: Duration) -> Self {
        let end = types::now();
        let start = end - chrono::Duration::milliseconds(window.as_millis() as i64);
        Self { start, end }
    }

    fn bounds_ms(range: Option<&TimeRange>) -> (i64, i64) {
        match range {
            Some(r) => (r.start.timestamp_millis(), r.end.timestamp_millis()),
            None => (i64::MIN, i64::MAX),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub range: Option<TimeRange>,
    pub generated_at: Timestamp,
    /// Elements with any recorded activity in range
    pub active_elements: u64,
    pub total_accesses: u64,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub success_rate: Option<f64>,
    pub avg_execution_ms: Option<f64>,
    pub most_used: Vec<UsageEntry>,
    pub slowest_actions: Vec<ActionStats>,
    pub deleted_elements: u64,
    pub average_lifetime_ms: Option<f64>,
}

const REPORT_TOP_N: usize = 10;

pub struct AnalyticsTracker {
    store: Arc<Store>,
    enabled: bool,
    peak_window_ms: i64,
}

impl std::fmt::Debug for AnalyticsTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsTracker")
            .field("enabled", &self.enabled)
            .field("peak_window_ms", &self.peak_window_ms)
            .finish()
    }
}

impl AnalyticsTracker {
    pub fn new(store: Arc<Store>, enabled: bool, peak_window: Duration) -> Self {
        Self {
            store,
            enabled,
            peak_window_ms: (peak_window.as_millis() as i64).max(1),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Count one access and refresh the trailing-window peak
    pub fn track_access(&self, id: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let now = types::now().timestamp_millis();
        let window_start = now - self.peak_window_ms;

        self.store.write("track access", |tx| {
            tx.execute(
                "INSERT INTO access_events (id, timestamp_ms) VALUES (?1, ?2)",
                params![id, now],
            )?;
            tx.execute(
                "INSERT INTO analytics (id, total_accesses, first_access_ms, last_access_ms)
                 VALUES (?1, 1, ?2, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                     total_accesses = total_accesses + 1,
                     first_access_ms = COALESCE(first_access_ms, excluded.first_access_ms),
                     last_access_ms = excluded.last_access_ms",
                params![id, now],
            )?;

            let in_window: i64 = tx.query_row(
                "SELECT COUNT(*) FROM access_events WHERE id = ?1 AND timestamp_ms > ?2",
                params![id, window_start],
                |row| row.get(0),
            )?;
            tx.execute(
                "UPDATE analytics SET peak_hourly_accesses = MAX(peak_hourly_accesses, ?2) WHERE id = ?1",
                params![id, in_window],
            )?;
            Ok(())
        })
    }

    /// Drop access events older than `retention`.
    ///
    /// Aggregates in `analytics` are untouched; only the per-access rows used
    /// for the peak window and ranged reports go. Retention shorter than the
    /// peak window is raised to it.
    pub fn prune_access_events(&self, retention: Duration) -> Result<usize> {
        let retention_ms = (retention.as_millis() as i64).max(self.peak_window_ms);
        let cutoff = types::now().timestamp_millis() - retention_ms;
        let removed = self
            .store
            .write("prune access events", |tx| prune_access_events_before(tx, cutoff))?;
        if removed > 0 {
            tracing::debug!(removed, "pruned access events");
        }
        Ok(removed)
    }

    /// Fold one execution into the running mean and outcome counters
    pub fn track_execution(&self, id: &str, action: &str, duration: Duration, success: bool) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let now = types::now().timestamp_millis();
        let duration_ms = duration.as_secs_f64() * 1_000.0;

        self.store.write("track execution", |tx| {
            ensure_row(tx, id)?;
            let (old_avg, n): (f64, i64) = tx.query_row(
                "SELECT avg_execution_ms, execution_count FROM analytics WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let new_avg = running_mean(old_avg, n.max(0) as u64, duration_ms);

            tx.execute(
                "UPDATE analytics SET
                     avg_execution_ms = ?2,
                     execution_count = execution_count + 1,
                     success_count = success_count + ?3,
                     failure_count = failure_count + ?4
                 WHERE id = ?1",
                params![id, new_avg, success as i64, (!success) as i64],
            )?;
            tx.execute(
                "INSERT INTO execution_events (id, action, duration_ms, success, timestamp_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, action, duration_ms, success, now],
            )?;
            Ok(())
        })
    }

    /// Record a lifecycle change; `Deleted` finalizes the lifetime
    pub fn track_lifecycle(&self, id: &str, state: LifecycleState) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let now = types::now().timestamp_millis();

        self.store.write("track lifecycle", |tx| {
            ensure_row(tx, id)?;
            if state == LifecycleState::Deleted {
                tx.execute(
                    "UPDATE analytics SET lifecycle = ?2, lifetime_ms = ?3 - COALESCE(first_access_ms, ?3)
                     WHERE id = ?1",
                    params![id, state.as_str(), now],
                )?;
            } else {
                tx.execute(
                    "UPDATE analytics SET lifecycle = ?2 WHERE id = ?1",
                    params![id, state.as_str()],
                )?;
            }
            Ok(())
        })
    }

    pub fn record(&self, id: &str) -> Result<Option<AnalyticsRecord>> {
        self.store.snapshot("analytics record", |conn| {
            let record = conn
                .query_row(
                    &format!("SELECT {} FROM analytics WHERE id = ?1", RECORD_COLUMNS),
                    params![id],
                    record_from_row,
                )
                .optional()?;
            record.transpose()
        })
    }

    /// Live elements with the most accesses
    pub fn most_used(&self, limit: usize) -> Result<Vec<UsageEntry>> {
        self.ranked("DESC", limit)
    }

    /// Live elements with the fewest accesses
    pub fn least_used(&self, limit: usize) -> Result<Vec<UsageEntry>> {
        self.ranked("ASC", limit)
    }

    fn ranked(&self, order: &str, limit: usize) -> Result<Vec<UsageEntry>> {
        let sql = format!(
            "SELECT id, total_accesses FROM analytics WHERE lifecycle != 'deleted'
             ORDER BY total_accesses {}, id LIMIT ?1",
            order
        );
        self.store.snapshot("rank usage", |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok(UsageEntry {
                        id: row.get(0)?,
                        accesses: row.get::<_, i64>(1)?.max(0) as u64,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// (element, action) pairs by mean duration, slowest first
    pub fn slowest_actions(&self, limit: usize) -> Result<Vec<ActionStats>> {
        self.slowest_in(None, limit)
    }

    fn slowest_in(&self, range: Option<&TimeRange>, limit: usize) -> Result<Vec<ActionStats>> {
        let (start, end) = TimeRange::bounds_ms(range);
        self.store.snapshot("slowest actions", |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, action, COUNT(*), AVG(duration_ms), MAX(duration_ms) FROM execution_events
                 WHERE timestamp_ms >= ?1 AND timestamp_ms < ?2
                 GROUP BY id, action
                 ORDER BY AVG(duration_ms) DESC, id, action
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(params![start, end, limit as i64], |row| {
                    Ok(ActionStats {
                        id: row.get(0)?,
                        action: row.get(1)?,
                        executions: row.get::<_, i64>(2)?.max(0) as u64,
                        avg_duration_ms: row.get(3)?,
                        max_duration_ms: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Fraction of successful executions, `None` before the first one
    pub fn success_rate(&self, id: &str) -> Result<Option<f64>> {
        Ok(self.record(id)?.and_then(|r| r.success_rate()))
    }

    /// Mean lifetime of deleted elements
    pub fn average_lifetime(&self) -> Result<Option<Duration>> {
        let avg: Option<f64> = self.store.snapshot("average lifetime", |conn| {
            Ok(conn.query_row(
                "SELECT AVG(lifetime_ms) FROM analytics WHERE lifetime_ms IS NOT NULL",
                [],
                |row| row.get(0),
            )?)
        })?;
        Ok(avg.map(|ms| Duration::from_millis(ms.max(0.0) as u64)))
    }

    /// Aggregate activity, optionally restricted to a time range
    pub fn usage_report(&self, range: Option<TimeRange>) -> Result<UsageReport> {
        if let Some(r) = &range {
            if r.end < r.start {
                return Err(RegistryError::Config(format!(
                    "report range ends before it starts: {} < {}",
                    r.end, r.start
                )));
            }
        }
        let (start, end) = TimeRange::bounds_ms(range.as_ref());

        let mut report = self.store.snapshot("usage report", |conn| {
            let total_accesses: i64 = conn.query_row(
                "SELECT COUNT(*) FROM access_events WHERE timestamp_ms >= ?1 AND timestamp_ms < ?2",
                params![start, end],
                |row| row.get(0),
            )?;
            let (total_executions, successes, avg_ms): (i64, Option<i64>, Option<f64>) = conn.query_row(
                "SELECT COUNT(*), SUM(success), AVG(duration_ms) FROM execution_events
                 WHERE timestamp_ms >= ?1 AND timestamp_ms < ?2",
                params![start, end],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            let active: i64 = conn.query_row(
                "SELECT COUNT(*) FROM (
                     SELECT id FROM access_events WHERE timestamp_ms >= ?1 AND timestamp_ms < ?2
                     UNION
                     SELECT id FROM execution_events WHERE timestamp_ms >= ?1 AND timestamp_ms < ?2
                 )",
                params![start, end],
                |row| row.get(0),
            )?;
            let (deleted, avg_lifetime): (i64, Option<f64>) = conn.query_row(
                "SELECT COUNT(*), AVG(lifetime_ms) FROM analytics WHERE lifetime_ms IS NOT NULL",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let mut stmt = conn.prepare(
                "SELECT id, COUNT(*) AS n FROM access_events
                 WHERE timestamp_ms >= ?1 AND timestamp_ms < ?2
                 GROUP BY id ORDER BY n DESC, id LIMIT ?3",
            )?;
            let most_used = stmt
                .query_map(params![start, end, REPORT_TOP_N as i64], |row| {
                    Ok(UsageEntry {
                        id: row.get(0)?,
                        accesses: row.get::<_, i64>(1)?.max(0) as u64,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let successes = successes.unwrap_or(0);
            Ok(UsageReport {
                range,
                generated_at: types::now(),
                active_elements: active.max(0) as u64,
                total_accesses: total_accesses.max(0) as u64,
                total_executions: total_executions.max(0) as u64,
                successful_executions: successes.max(0) as u64,
                success_rate: (total_executions > 0).then(|| successes as f64 / total_executions as f64),
                avg_execution_ms: avg_ms,
                most_used,
                slowest_actions: Vec::new(),
                deleted_elements: deleted.max(0) as u64,
                average_lifetime_ms: avg_lifetime,
            })
        })?;

        report.slowest_actions = self.slowest_in(range.as_ref(), REPORT_TOP_N)?;
        Ok(report)
    }
}

/// `(old_avg * n + sample) / (n + 1)`
pub fn running_mean(old_avg: f64, n: u64, sample: f64) -> f64 {
    (old_avg * n as f64 + sample) / (n as f64 + 1.0)
}

const RECORD_COLUMNS: &str = "id, total_accesses, first_access_ms, last_access_ms, peak_hourly_accesses,
     avg_execution_ms, execution_count, success_count, failure_count, lifecycle, lifetime_ms";

/// Delete access events at or before `cutoff_ms`
pub(crate) fn prune_access_events_before(conn: &Connection, cutoff_ms: i64) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM access_events WHERE timestamp_ms <= ?1",
        params![cutoff_ms],
    )?)
}

fn ensure_row(tx: &Transaction<'_>, id: &str) -> Result<()> {
    tx.execute(
        "INSERT INTO analytics (id) VALUES (?1) ON CONFLICT(id) DO NOTHING",
        params![id],
    )?;
    Ok(())
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<AnalyticsRecord>> {
    let count = |idx: usize| -> rusqlite::Result<u64> { Ok(row.get::<_, i64>(idx)?.max(0) as u64) };
    let lifecycle: String = row.get(9)?;

    let record = AnalyticsRecord {
        id: row.get(0)?,
        total_accesses: count(1)?,
        first_access: row.get::<_, Option<i64>>(2)?.map(types::from_millis),
        last_access: row.get::<_, Option<i64>>(3)?.map(types::from_millis),
        peak_hourly_accesses: count(4)?,
        avg_execution_ms: row.get(5)?,
        execution_count: count(6)?,
        success_count: count(7)?,
        failure_count: count(8)?,
        lifecycle: LifecycleState::Created,
        lifetime_ms: row.get(10)?,
    };

    Ok(match LifecycleState::parse(&lifecycle) {
        Some(state) => Ok(AnalyticsRecord {
            lifecycle: state,
            ..record
        }),
        None => Err(RegistryError::CorruptRow {
            table: "analytics",
            key: record.id,
            reason: format!("unknown lifecycle '{}'", lifecycle),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> AnalyticsTracker {
        let store = Arc::new(Store::open_in_memory().unwrap());
        AnalyticsTracker::new(store, true, Duration::from_secs(3600))
    }

    #[test]
    fn test_prune_keeps_recent_events_and_aggregates() {
        let tracker = tracker();
        tracker.track_access("a").unwrap();
        tracker
            .store
            .write("backdate", |tx| {
                tx.execute(
                    "INSERT INTO access_events (id, timestamp_ms) VALUES ('a', 0), ('a', 1)",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        assert_eq!(tracker.store.stats().unwrap()["access_events"], 3);

        assert_eq!(tracker.prune_access_events(Duration::from_secs(3600)).unwrap(), 2);
        assert_eq!(tracker.store.stats().unwrap()["access_events"], 1);
        assert_eq!(tracker.record("a").unwrap().unwrap().total_accesses, 1);
    }

    #[test]
    fn test_prune_never_cuts_into_peak_window() {
        let tracker = tracker();
        tracker.track_access("a").unwrap();
        assert_eq!(tracker.prune_access_events(Duration::ZERO).unwrap(), 0);
    }

    #[test]
    fn test_running_mean() {
        assert_eq!(running_mean(0.0, 0, 10.0), 10.0);
        assert_eq!(running_mean(10.0, 1, 20.0), 15.0);
        assert_eq!(running_mean(15.0, 2, 30.0), 20.0);
    }

    #[test]
    fn test_access_counts_and_peak() {
        let tracker = tracker();
        for _ in 0..3 {
            tracker.track_access("a").unwrap();
        }
        tracker.track_access("b").unwrap();

        let a = tracker.record("a").unwrap().unwrap();
        assert_eq!(a.total_accesses, 3);
        assert_eq!(a.peak_hourly_accesses, 3);
        assert!(a.first_access.unwrap() <= a.last_access.unwrap());

        let most = tracker.most_used(10).unwrap();
        assert_eq!(most[0], UsageEntry { id: "a".into(), accesses: 3 });
        assert_eq!(tracker.least_used(1).unwrap()[0].id, "b");
    }

    #[test]
    fn test_execution_mean_and_success_rate() {
        let tracker = tracker();
        tracker.track_execution("a", "click", Duration::from_millis(10), true).unwrap();
        tracker.track_execution("a", "click", Duration::from_millis(20), true).unwrap();
        tracker.track_execution("a", "click", Duration::from_millis(30), false).unwrap();

        let record = tracker.record("a").unwrap().unwrap();
        assert_eq!(record.execution_count, 3);
        assert!((record.avg_execution_ms - 20.0).abs() < 1e-9);
        assert_eq!(record.success_count, 2);
        assert_eq!(record.failure_count, 1);

        let rate = tracker.success_rate("a").unwrap().unwrap();
        assert!((rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(tracker.success_rate("nobody").unwrap(), None);
    }

    #[test]
    fn test_slowest_actions_group_by_element_and_action() {
        let tracker = tracker();
        tracker.track_execution("a", "click", Duration::from_millis(5), true).unwrap();
        tracker.track_execution("a", "scroll", Duration::from_millis(50), true).unwrap();
        tracker.track_execution("b", "click", Duration::from_millis(20), true).unwrap();
        tracker.track_execution("b", "click", Duration::from_millis(40), true).unwrap();

        let slowest = tracker.slowest_actions(2).unwrap();
        assert_eq!(slowest.len(), 2);
        assert_eq!((slowest[0].id.as_str(), slowest[0].action.as_str()), ("a", "scroll"));
        assert_eq!((slowest[1].id.as_str(), slowest[1].action.as_str()), ("b", "click"));
        assert_eq!(slowest[1].executions, 2);
        assert!((slowest[1].avg_duration_ms - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_deletion_finalizes_lifetime() {
        let tracker = tracker();
        tracker.track_access("a").unwrap();
        tracker.track_lifecycle("a", LifecycleState::Active).unwrap();
        assert_eq!(tracker.record("a").unwrap().unwrap().lifetime_ms, None);

        tracker.track_lifecycle("a", LifecycleState::Deleted).unwrap();
        let record = tracker.record("a").unwrap().unwrap();
        assert_eq!(record.lifecycle, LifecycleState::Deleted);
        assert!(record.lifetime_ms.unwrap() >= 0);
        assert!(tracker.average_lifetime().unwrap().is_some());
        assert!(tracker.most_used(10).unwrap().is_empty());
    }

    #[test]
    fn test_usage_report_respects_range() {
        let tracker = tracker();
        tracker.track_access("a").unwrap();
        tracker.track_access("a").unwrap();
        tracker.track_execution("b", "click", Duration::from_millis(8), false).unwrap();

        let all = tracker.usage_report(None).unwrap();
        assert_eq!(all.total_accesses, 2);
        assert_eq!(all.total_executions, 1);
        assert_eq!(all.active_elements, 2);
        assert_eq!(all.success_rate, Some(0.0));
        assert_eq!(all.most_used[0].id, "a");
        assert_eq!(all.slowest_actions.len(), 1);

        let past = TimeRange::new(
            types::now() - chrono::Duration::days(2),
            types::now() - chrono::Duration::days(1),
        );
        let empty = tracker.usage_report(Some(past)).unwrap();
        assert_eq!(empty.total_accesses, 0);
        assert_eq!(empty.success_rate, None);
        assert!(empty.slowest_actions.is_empty());
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let tracker = tracker();
        let now = types::now();
        let inverted = TimeRange::new(now, now - chrono::Duration::hours(1));
        assert!(tracker.usage_report(Some(inverted)).is_err());
    }

    #[test]
    fn test_disabled_tracker_records_nothing() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let tracker = AnalyticsTracker::new(store, false, Duration::from_secs(3600));
        tracker.track_access("a").unwrap();
        tracker.track_execution("a", "click", Duration::from_millis(1), true).unwrap();
        assert!(tracker.record("a").unwrap().is_none());
    }
}
