//! Collision detection and background consistency scanning
//!
//! Two halves:
//!
//! - **Inline**: `check_before_insert` runs on the register path when the
//!   generated id is already owned. Every genuine detection is appended to
//!   `collision_log` together with the suggested strategy.
//! - **Background**: `periodic_scan` runs three independent read-only sweeps
//!   (duplicate keys, orphaned edges, malformed ids). A failing sweep is
//!   reported as [`MonitorEvent::MonitoringError`] and the other sweeps still
//!   run. [`CollisionMonitor::spawn`] drives the scan on a tokio interval
//!   until its [`CancellationToken`] fires.

use futures::Stream;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::analytics;
use crate::error::{RegistryError, Result};
use crate::hierarchy::{self, HierarchyEdge};
use crate::identity::FormatEncoder;
use crate::storage::Store;
use crate::types::{self, ElementDescriptor, Entity, Timestamp};

/// Suggested handling of a detected collision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionStrategy {
    /// Same name and type: treat the attempt as the existing element
    Skip,
    /// Different element behind the same id: a new id is needed
    RegenerateId,
}

impl CollisionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::RegenerateId => "regenerate_id",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "skip" => Some(Self::Skip),
            "regenerate_id" | "regenerate" => Some(Self::RegenerateId),
            _ => None,
        }
    }
}

impl std::fmt::Display for CollisionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the append-only collision audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionLogEntry {
    pub seq: i64,
    pub id: String,
    pub timestamp: Timestamp,
    pub existing: serde_json::Value,
    pub attempted: serde_json::Value,
    pub strategy: CollisionStrategy,
    pub resolved: bool,
}

/// The three background sweeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sweep {
    DuplicateIds,
    OrphanedEdges,
    MalformedIds,
}

impl std::fmt::Display for Sweep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::DuplicateIds => "duplicate_ids",
            Self::OrphanedEdges => "orphaned_edges",
            Self::MalformedIds => "malformed_ids",
        })
    }
}

/// Findings emitted by the monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    DuplicateId { id: String, count: u64 },
    OrphanedEdge { edge: HierarchyEdge },
    MalformedId { id: String, reason: String },
    MonitoringError { sweep: Option<Sweep>, message: String },
    ScanCompleted { findings: usize, elapsed_ms: u64 },
}

impl MonitorEvent {
    /// True for events that describe damage in the store
    pub fn is_finding(&self) -> bool {
        matches!(
            self,
            Self::DuplicateId { .. } | Self::OrphanedEdge { .. } | Self::MalformedId { .. }
        )
    }
}

/// Collision checks plus the periodic scan
pub struct CollisionMonitor {
    store: Arc<Store>,
    events: broadcast::Sender<MonitorEvent>,
    event_retention: Option<Duration>,
}

impl std::fmt::Debug for CollisionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionMonitor")
            .field("subscribers", &self.events.receiver_count())
            .field("event_retention", &self.event_retention)
            .finish()
    }
}

impl CollisionMonitor {
    pub fn new(store: Arc<Store>, channel_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(channel_capacity.max(1));
        Self { store, events, event_retention: None }
    }

    /// Prune access events older than `retention` on every scheduled pass
    pub fn with_event_retention(mut self, retention: Duration) -> Self {
        self.event_retention = Some(retention);
        self
    }

    /// Delete expired access events; a no-op without a retention.
    pub fn prune_expired_events(&self) -> Result<usize> {
        let Some(retention) = self.event_retention else {
            return Ok(0);
        };
        let cutoff = types::now().timestamp_millis() - retention.as_millis() as i64;
        let removed = self.store.write("prune access events", |tx| {
            analytics::prune_access_events_before(tx, cutoff)
        })?;
        if removed > 0 {
            tracing::debug!(removed, "pruned expired access events");
        }
        Ok(removed)
    }

    /// Retention pass followed by a full scan, as run by [`CollisionMonitor::spawn`]
    fn scheduled_pass(&self) -> Vec<MonitorEvent> {
        let mut events = Vec::new();
        if let Err(e) = self.prune_expired_events() {
            tracing::warn!(error = %e, "access event pruning failed");
            events.push(MonitorEvent::MonitoringError {
                sweep: None,
                message: e.to_string(),
            });
        }
        events.extend(self.collect_scan());
        events
    }

    /// Classify an attempt to register `attempted` under an id `existing` already owns.
    ///
    /// Returns `None` when the attempt is the same element as the stored
    /// one. Otherwise the detection is logged and a strategy suggested; the
    /// caller decides what to apply.
    pub fn check_before_insert(
        &self,
        existing: &Entity,
        attempted: &ElementDescriptor,
    ) -> Result<Option<CollisionStrategy>> {
        let stored = existing.descriptor().ok();
        if stored.as_ref() == Some(attempted) {
            return Ok(None);
        }

        let strategy = if existing.signature() == attempted.signature() {
            CollisionStrategy::Skip
        } else {
            CollisionStrategy::RegenerateId
        };

        let existing_json = serde_json::to_string(existing)?;
        let attempted_json = serde_json::to_string(attempted)?;
        self.store.write("log collision", |tx| {
            tx.execute(
                "INSERT INTO collision_log (id, timestamp_ms, existing_json, attempted_json, strategy, resolved)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                params![
                    existing.id,
                    types::now().timestamp_millis(),
                    existing_json,
                    attempted_json,
                    strategy.as_str()
                ],
            )?;
            Ok(())
        })?;

        tracing::warn!(
            id = %existing.id,
            existing = %existing.signature(),
            attempted = %attempted.signature(),
            %strategy,
            "id collision detected"
        );
        Ok(Some(strategy))
    }

    /// Most recent collision log entries first
    pub fn collision_log(&self, limit: usize) -> Result<Vec<CollisionLogEntry>> {
        self.store.snapshot("collision log", |conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, id, timestamp_ms, existing_json, attempted_json, strategy, resolved
                 FROM collision_log ORDER BY seq DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, bool>(6)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(seq, id, ts, existing, attempted, strategy, resolved)| -> Result<CollisionLogEntry> {
                    Ok(CollisionLogEntry {
                        seq,
                        id,
                        timestamp: types::from_millis(ts),
                        existing: serde_json::from_str(&existing)?,
                        attempted: serde_json::from_str(&attempted)?,
                        strategy: CollisionStrategy::parse(&strategy).ok_or_else(|| RegistryError::CorruptRow {
                            table: "collision_log",
                            key: seq.to_string(),
                            reason: format!("unknown strategy '{}'", strategy),
                        })?,
                        resolved,
                    })
                })
                .collect()
        })
    }

    /// Mark a log entry resolved with the strategy actually applied
    pub fn resolve_collision(&self, seq: i64, strategy: CollisionStrategy) -> Result<()> {
        let updated = self.store.write("resolve collision", |tx| {
            Ok(tx.execute(
                "UPDATE collision_log SET resolved = 1, strategy = ?2 WHERE seq = ?1",
                params![seq, strategy.as_str()],
            )?)
        })?;
        if updated == 0 {
            return Err(RegistryError::NotFound(format!("collision log entry {}", seq)));
        }
        Ok(())
    }

    /// Subscribe to monitor events as a stream.
    ///
    /// Only events sent after subscription are observed. A slow consumer
    /// that falls behind the channel capacity skips the missed events.
    pub fn subscribe(&self) -> impl Stream<Item = MonitorEvent> + Send + 'static {
        let rx = self.events.subscribe();
        futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "monitor subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }

    /// Run every sweep once, publish the findings and return them.
    ///
    /// Read-only against the store.
    pub fn periodic_scan(&self) -> Vec<MonitorEvent> {
        let events = self.collect_scan();
        self.publish(&events);
        events
    }

    fn collect_scan(&self) -> Vec<MonitorEvent> {
        let started = Instant::now();
        let mut events = Vec::new();

        for sweep in [Sweep::DuplicateIds, Sweep::OrphanedEdges, Sweep::MalformedIds] {
            match self.run_sweep(sweep) {
                Ok(found) => events.extend(found),
                Err(e) => {
                    tracing::warn!(%sweep, error = %e, "monitor sweep failed");
                    events.push(MonitorEvent::MonitoringError {
                        sweep: Some(sweep),
                        message: e.to_string(),
                    });
                }
            }
        }

        let findings = events.iter().filter(|e| e.is_finding()).count();
        if findings > 0 {
            tracing::warn!(findings, "monitor scan found inconsistencies");
        }
        events.push(MonitorEvent::ScanCompleted {
            findings,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        events
    }

    fn publish(&self, events: &[MonitorEvent]) {
        for event in events {
            // No subscribers is fine
            let _ = self.events.send(event.clone());
        }
    }

    fn run_sweep(&self, sweep: Sweep) -> Result<Vec<MonitorEvent>> {
        match sweep {
            Sweep::DuplicateIds => self.sweep_duplicate_ids(),
            Sweep::OrphanedEdges => self.sweep_orphaned_edges(),
            Sweep::MalformedIds => self.sweep_malformed_ids(),
        }
    }

    fn sweep_duplicate_ids(&self) -> Result<Vec<MonitorEvent>> {
        self.store.snapshot("scan duplicate ids", |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, COUNT(*) FROM entities GROUP BY id HAVING COUNT(*) > 1",
            )?;
            let events = stmt
                .query_map([], |row| {
                    Ok(MonitorEvent::DuplicateId {
                        id: row.get(0)?,
                        count: row.get::<_, i64>(1)?.max(0) as u64,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(events)
        })
    }

    fn sweep_orphaned_edges(&self) -> Result<Vec<MonitorEvent>> {
        let edges = self
            .store
            .snapshot("scan orphaned edges", hierarchy::orphaned_edges)?;
        Ok(edges
            .into_iter()
            .map(|edge| MonitorEvent::OrphanedEdge { edge })
            .collect())
    }

    fn sweep_malformed_ids(&self) -> Result<Vec<MonitorEvent>> {
        let ids: Vec<String> = self.store.snapshot("scan malformed ids", |conn| {
            let mut stmt = conn.prepare("SELECT id FROM entities")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids)
        })?;

        Ok(ids
            .into_iter()
            .filter_map(|id| {
                FormatEncoder::parse(&id)
                    .err()
                    .map(|e| MonitorEvent::MalformedId { id, reason: e.to_string() })
            })
            .collect())
    }

    /// Start the periodic scan on the current tokio runtime.
    ///
    /// The first scan runs immediately. Each scan runs on the blocking pool
    /// and its findings are published only once the whole scan finished, so
    /// a cancelled scan publishes nothing.
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> Result<MonitorHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| RegistryError::Config(format!("monitor needs a tokio runtime: {}", e)))?;
        let interval = interval.max(Duration::from_millis(10));
        let token = CancellationToken::new();

        let monitor = Arc::clone(self);
        let cancelled = token.clone();
        let task = runtime.spawn(async move {
            tracing::info!(interval_ms = interval.as_millis() as u64, "collision monitor started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let scanner = Arc::clone(&monitor);
                let scan = tokio::task::spawn_blocking(move || scanner.scheduled_pass());
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    joined = scan => match joined {
                        Ok(events) => monitor.publish(&events),
                        Err(e) => {
                            tracing::warn!(error = %e, "monitor scan aborted");
                            monitor.publish(&[MonitorEvent::MonitoringError {
                                sweep: None,
                                message: e.to_string(),
                            }]);
                        }
                    }
                }
            }
            tracing::info!("collision monitor stopped");
        });

        Ok(MonitorHandle {
            monitor: Arc::clone(self),
            token,
            task: Some(task),
        })
    }
}

/// Control surface of a running monitor
#[derive(Debug)]
pub struct MonitorHandle {
    monitor: Arc<CollisionMonitor>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Events from now on; the stream ends when the monitor is shut down
    pub fn events(&self) -> impl Stream<Item = MonitorEvent> + Send + 'static {
        use futures::StreamExt;
        self.monitor
            .subscribe()
            .take_until(self.token.clone().cancelled_owned())
    }

    /// Run one scan immediately on the blocking pool
    pub async fn scan_now(&self) -> Vec<MonitorEvent> {
        let monitor = Arc::clone(&self.monitor);
        match tokio::task::spawn_blocking(move || monitor.periodic_scan()).await {
            Ok(events) => events,
            Err(e) => {
                let event = MonitorEvent::MonitoringError {
                    sweep: None,
                    message: e.to_string(),
                };
                self.monitor.publish(std::slice::from_ref(&event));
                vec![event]
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel the loop and wait for it to stop
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "collision monitor task ended abnormally");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ElementDescriptor;
    use futures::StreamExt;

    fn monitor() -> (CollisionMonitor, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        (CollisionMonitor::new(store.clone(), 16), store)
    }

    fn stored(descriptor: &ElementDescriptor) -> Entity {
        Entity::from_descriptor("app1.v1.0.button-0123456789ab", None, descriptor).unwrap()
    }

    fn insert_raw_entity(store: &Store, id: &str) {
        store
            .write("raw insert", |tx| {
                tx.execute(
                    "INSERT INTO entities (id, namespace, name, element_type, attributes_json,
                        created_at_ms, last_accessed_at_ms, access_count, lifecycle)
                     VALUES (?1, 'app1', 'x', 'button', '{}', 0, 0, 1, 'created')",
                    params![id],
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_same_descriptor_is_not_a_collision() {
        let (monitor, _) = monitor();
        let d = ElementDescriptor::new("app1", "1.0", "button").with_text("Submit");
        assert_eq!(monitor.check_before_insert(&stored(&d), &d).unwrap(), None);
        assert!(monitor.collision_log(10).unwrap().is_empty());
    }

    #[test]
    fn test_matching_signature_suggests_skip() {
        let (monitor, _) = monitor();
        let existing = ElementDescriptor::new("app1", "1.0", "button")
            .with_primary_id("submit")
            .with_text("Submit");
        let attempted = existing.clone().with_text("Submit now");

        let strategy = monitor.check_before_insert(&stored(&existing), &attempted).unwrap();
        assert_eq!(strategy, Some(CollisionStrategy::Skip));

        let log = monitor.collision_log(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].strategy, CollisionStrategy::Skip);
        assert!(!log[0].resolved);
    }

    #[test]
    fn test_differing_signature_suggests_regenerate() {
        let (monitor, _) = monitor();
        let existing = ElementDescriptor::new("app1", "1.0", "button").with_text("Submit");
        let attempted = ElementDescriptor::new("app1", "1.0", "checkbox").with_text("Remember me");

        let strategy = monitor.check_before_insert(&stored(&existing), &attempted).unwrap();
        assert_eq!(strategy, Some(CollisionStrategy::RegenerateId));
        assert_eq!(monitor.collision_log(10).unwrap()[0].attempted["element_type"], "checkbox");
    }

    #[test]
    fn test_resolve_collision_marks_entry() {
        let (monitor, _) = monitor();
        let existing = ElementDescriptor::new("app1", "1.0", "button").with_text("A");
        let attempted = ElementDescriptor::new("app1", "1.0", "button").with_text("B");
        monitor.check_before_insert(&stored(&existing), &attempted).unwrap();

        let seq = monitor.collision_log(1).unwrap()[0].seq;
        monitor.resolve_collision(seq, CollisionStrategy::Skip).unwrap();
        assert!(monitor.collision_log(1).unwrap()[0].resolved);
        assert!(monitor
            .resolve_collision(seq + 100, CollisionStrategy::Skip)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_clean_store_scans_clean() {
        let (monitor, store) = monitor();
        insert_raw_entity(&store, "app1.v1.button-0123456789ab");

        let events = monitor.periodic_scan();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MonitorEvent::ScanCompleted { findings: 0, .. }));
    }

    #[test]
    fn test_scan_reports_malformed_and_orphaned() {
        let (monitor, store) = monitor();
        insert_raw_entity(&store, "app1.v1.button-0123456789ab");
        insert_raw_entity(&store, "Not An Id!");
        store
            .read("orphan edge", |conn| {
                conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
                conn.execute(
                    "INSERT INTO hierarchy_edges (child_id, parent_id, position, depth)
                     VALUES ('app1.v1.button-0123456789ab', 'gone', 0, 1)",
                    [],
                )?;
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                Ok(())
            })
            .unwrap();

        let events = monitor.periodic_scan();
        assert!(events
            .iter()
            .any(|e| matches!(e, MonitorEvent::MalformedId { id, .. } if id == "Not An Id!")));
        assert!(events
            .iter()
            .any(|e| matches!(e, MonitorEvent::OrphanedEdge { edge } if edge.parent_id == "gone")));
        assert!(matches!(
            events.last(),
            Some(MonitorEvent::ScanCompleted { findings: 2, .. })
        ));
    }

    #[test]
    fn test_failing_sweep_does_not_stop_the_others() {
        let (monitor, store) = monitor();
        insert_raw_entity(&store, "Bad Id");
        store
            .read("drop edges", |conn| {
                conn.execute_batch("DROP TABLE hierarchy_edges;")?;
                Ok(())
            })
            .unwrap();

        let events = monitor.periodic_scan();
        assert!(events.iter().any(|e| matches!(
            e,
            MonitorEvent::MonitoringError { sweep: Some(Sweep::OrphanedEdges), .. }
        )));
        assert!(events.iter().any(|e| matches!(e, MonitorEvent::MalformedId { .. })));
    }

    #[tokio::test]
    async fn test_spawned_monitor_streams_and_shuts_down() {
        let (monitor, store) = monitor();
        insert_raw_entity(&store, "Bad Id");
        let monitor = Arc::new(monitor);

        let handle = monitor.spawn(Duration::from_secs(3600)).unwrap();
        let mut events = Box::pin(handle.events());
        let scanned = handle.scan_now().await;
        assert!(scanned.iter().any(|e| matches!(e, MonitorEvent::MalformedId { .. })));

        let first = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events.next().await {
                    Some(event @ MonitorEvent::MalformedId { .. }) => return Some(event),
                    Some(_) => continue,
                    None => return None,
                }
            }
        })
        .await
        .unwrap();
        assert!(first.is_some());

        assert!(handle.is_running());
        handle.shutdown().await;
        assert!(tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_subscribers_see_manual_scans() {
        let (monitor, store) = monitor();
        insert_raw_entity(&store, "Bad Id");
        let mut events = Box::pin(monitor.subscribe());

        monitor.periodic_scan();
        let received: Vec<MonitorEvent> = tokio_test::block_on(events.as_mut().take(2).collect());
        assert!(matches!(received[0], MonitorEvent::MalformedId { .. }));
        assert!(matches!(received[1], MonitorEvent::ScanCompleted { findings: 1, .. }));
    }

    fn insert_access_events(store: &Store, timestamps: &[i64]) {
        store
            .write("raw access events", |tx| {
                for ts in timestamps {
                    tx.execute(
                        "INSERT INTO access_events (id, timestamp_ms) VALUES ('a', ?1)",
                        params![ts],
                    )?;
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_prune_without_retention_keeps_everything() {
        let (monitor, store) = monitor();
        insert_access_events(&store, &[0, 1]);
        assert_eq!(monitor.prune_expired_events().unwrap(), 0);
        assert_eq!(store.stats().unwrap()["access_events"], 2);
    }

    #[tokio::test]
    async fn test_scheduled_pass_prunes_expired_access_events() {
        let (monitor, store) = monitor();
        let now = types::now().timestamp_millis();
        insert_access_events(&store, &[0, 1, now]);

        let monitor = Arc::new(monitor.with_event_retention(Duration::from_secs(3600)));
        let mut events = Box::pin(monitor.subscribe());
        let handle = monitor.spawn(Duration::from_secs(3600)).unwrap();

        let completed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events.next().await {
                    Some(MonitorEvent::ScanCompleted { .. }) => return true,
                    Some(_) => continue,
                    None => return false,
                }
            }
        })
        .await;
        assert_eq!(completed.ok(), Some(true));
        assert_eq!(store.stats().unwrap()["access_events"], 1);

        handle.shutdown().await;
    }

    #[test]
    fn test_spawn_without_runtime_fails() {
        let (monitor, _) = monitor();
        let err = Arc::new(monitor).spawn(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
    }
}
