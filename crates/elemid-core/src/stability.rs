//! Cross-version identity remapping
//!
//! When an application updates, deterministic ids change with the version
//! segment and often with the content. `remap` pairs old descriptors with
//! new ones in three passes of decreasing confidence:
//!
//! | pass | key                      | confidence |
//! |------|--------------------------|------------|
//! | 1    | primary identifier       | 1.0        |
//! | 2    | type + text              | 0.8        |
//! | 3    | hierarchy path           | 0.6        |
//!
//! A pass only considers descriptors no earlier pass consumed, and each new
//! descriptor is claimed at most once. Old ids left over are recorded as
//! orphaned (no target, confidence 0) and never deleted.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{RegistryError, Result};
use crate::identity::IdentityHasher;
use crate::storage::Store;
use crate::types::{self, ElementDescriptor, Timestamp};

/// Longest mapping chain `remapped_id` will follow
const MAX_CHAIN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    PrimaryId,
    TypeText,
    HierarchyPath,
    Orphaned,
}

impl MatchSource {
    pub fn confidence(self) -> f64 {
        match self {
            Self::PrimaryId => 1.0,
            Self::TypeText => 0.8,
            Self::HierarchyPath => 0.6,
            Self::Orphaned => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrimaryId => "primary_id",
            Self::TypeText => "type_text",
            Self::HierarchyPath => "hierarchy_path",
            Self::Orphaned => "orphaned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "primary_id" => Some(Self::PrimaryId),
            "type_text" => Some(Self::TypeText),
            "hierarchy_path" => Some(Self::HierarchyPath),
            "orphaned" => Some(Self::Orphaned),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityMapping {
    pub old_id: String,
    /// `None` when the old element found no counterpart
    pub new_id: Option<String>,
    pub confidence: f64,
    pub source: MatchSource,
    pub namespace: String,
    pub old_version: String,
    pub new_version: String,
    pub created_at: Timestamp,
}

impl StabilityMapping {
    pub fn is_orphaned(&self) -> bool {
        self.new_id.is_none()
    }
}

/// Last recorded version against the current one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionChange {
    pub namespace: String,
    pub previous: Option<String>,
    pub current: String,
}

impl VersionChange {
    /// A first sighting is not a change
    pub fn is_changed(&self) -> bool {
        self.previous.as_deref().is_some_and(|p| p != self.current)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemapReport {
    pub namespace: String,
    pub old_version: String,
    pub new_version: String,
    /// Every old id, matched or orphaned
    pub mappings: Vec<StabilityMapping>,
    /// New ids no old descriptor claimed
    pub unmatched_new: Vec<String>,
}

impl RemapReport {
    pub fn matched(&self) -> impl Iterator<Item = &StabilityMapping> {
        self.mappings.iter().filter(|m| !m.is_orphaned())
    }

    pub fn orphaned(&self) -> impl Iterator<Item = &StabilityMapping> {
        self.mappings.iter().filter(|m| m.is_orphaned())
    }
}

pub struct StabilityTracker {
    store: Arc<Store>,
    hasher: IdentityHasher,
}

impl std::fmt::Debug for StabilityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StabilityTracker").finish_non_exhaustive()
    }
}

impl StabilityTracker {
    pub fn new(store: Arc<Store>, hasher: IdentityHasher) -> Self {
        Self { store, hasher }
    }

    pub fn last_version(&self, namespace: &str) -> Result<Option<String>> {
        self.store.read("last version", |conn| last_version_in(conn, namespace))
    }

    pub fn detect_version_change(&self, namespace: &str, current: &str) -> Result<VersionChange> {
        Ok(VersionChange {
            namespace: namespace.to_string(),
            previous: self.last_version(namespace)?,
            current: current.to_string(),
        })
    }

    pub fn record_version(&self, namespace: &str, version: &str) -> Result<()> {
        self.store.write("record version", |tx| {
            upsert_version(tx, namespace, version)?;
            Ok(())
        })?;
        tracing::info!(namespace, version, "version marker recorded");
        Ok(())
    }

    /// Pair old and new descriptors and persist the mappings.
    ///
    /// The version marker for `namespace` moves to `new_version` in the same
    /// transaction.
    pub fn remap(
        &self,
        namespace: &str,
        old_version: &str,
        new_version: &str,
        old: &[ElementDescriptor],
        new: &[ElementDescriptor],
    ) -> Result<RemapReport> {
        if old_version == new_version {
            return Err(RegistryError::Config(format!(
                "remap of {} needs two different versions, got {} twice",
                namespace, old_version
            )));
        }

        let pairs = match_descriptors(old, new);
        let created_at = types::now();
        let new_ids: Vec<String> = new.iter().map(|d| self.hasher.deterministic_id(d)).collect();

        let mut claimed = HashSet::new();
        let mappings: Vec<StabilityMapping> = old
            .iter()
            .zip(pairs)
            .map(|(descriptor, pair)| {
                let (new_id, source) = match pair {
                    Some((idx, source)) => {
                        claimed.insert(idx);
                        (Some(new_ids[idx].clone()), source)
                    }
                    None => (None, MatchSource::Orphaned),
                };
                StabilityMapping {
                    old_id: self.hasher.deterministic_id(descriptor),
                    new_id,
                    confidence: source.confidence(),
                    source,
                    namespace: namespace.to_string(),
                    old_version: old_version.to_string(),
                    new_version: new_version.to_string(),
                    created_at,
                }
            })
            .collect();

        let unmatched_new = new_ids
            .iter()
            .enumerate()
            .filter(|(idx, _)| !claimed.contains(idx))
            .map(|(_, id)| id.clone())
            .collect();

        self.store.write("record remap", |tx| {
            let mut stmt = tx.prepare(
                "INSERT INTO stability_mappings
                    (old_id, new_id, confidence, match_source, namespace, old_version, new_version, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for m in &mappings {
                stmt.execute(params![
                    m.old_id,
                    m.new_id,
                    m.confidence,
                    m.source.as_str(),
                    m.namespace,
                    m.old_version,
                    m.new_version,
                    m.created_at.timestamp_millis()
                ])?;
            }
            upsert_version(tx, namespace, new_version)?;
            Ok(())
        })?;

        let report = RemapReport {
            namespace: namespace.to_string(),
            old_version: old_version.to_string(),
            new_version: new_version.to_string(),
            mappings,
            unmatched_new,
        };
        let orphaned = report.orphaned().count();
        if orphaned > 0 {
            tracing::warn!(namespace, orphaned, "remap left orphaned ids");
        }
        tracing::info!(
            namespace,
            old_version,
            new_version,
            matched = report.matched().count(),
            "remap recorded"
        );
        Ok(report)
    }

    /// Follow recorded mappings from `old_id` to its newest id.
    ///
    /// `None` if the chain ends in an orphan or no mapping exists.
    pub fn remapped_id(&self, old_id: &str) -> Result<Option<String>> {
        self.store.read("remapped id", |conn| {
            let mut current = old_id.to_string();
            let mut seen = HashSet::from([current.clone()]);
            let mut moved = false;

            for _ in 0..MAX_CHAIN {
                match latest_mapping(conn, &current)? {
                    None => break,
                    Some(None) => return Ok(None),
                    Some(Some(next)) => {
                        if next == current || !seen.insert(next.clone()) {
                            break;
                        }
                        current = next;
                        moved = true;
                    }
                }
            }
            Ok(moved.then_some(current))
        })
    }

    /// Recorded mappings of one namespace, newest first
    pub fn mappings(&self, namespace: &str, limit: usize) -> Result<Vec<StabilityMapping>> {
        self.store.read("list mappings", |conn| {
            let mut stmt = conn.prepare(
                "SELECT old_id, new_id, confidence, match_source, namespace, old_version, new_version, created_at_ms
                 FROM stability_mappings WHERE namespace = ?1 ORDER BY seq DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![namespace, limit as i64], |row| {
                    Ok((
                        StabilityMapping {
                            old_id: row.get(0)?,
                            new_id: row.get(1)?,
                            confidence: row.get(2)?,
                            source: MatchSource::Orphaned,
                            namespace: row.get(4)?,
                            old_version: row.get(5)?,
                            new_version: row.get(6)?,
                            created_at: types::from_millis(row.get(7)?),
                        },
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(mapping, source)| -> Result<StabilityMapping> {
                    let source = MatchSource::parse(&source).ok_or_else(|| RegistryError::CorruptRow {
                        table: "stability_mappings",
                        key: mapping.old_id.clone(),
                        reason: format!("unknown match source '{}'", source),
                    })?;
                    Ok(StabilityMapping { source, ..mapping })
                })
                .collect()
        })
    }
}

fn last_version_in(conn: &Connection, namespace: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT version FROM version_markers WHERE namespace = ?1",
            params![namespace],
            |row| row.get(0),
        )
        .optional()?)
}

fn upsert_version(conn: &Connection, namespace: &str, version: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO version_markers (namespace, version, recorded_at_ms) VALUES (?1, ?2, ?3)
         ON CONFLICT(namespace) DO UPDATE SET version = excluded.version, recorded_at_ms = excluded.recorded_at_ms",
        params![namespace, version, types::now().timestamp_millis()],
    )?;
    Ok(())
}

/// `Some(Some(id))` mapped, `Some(None)` orphaned, `None` never remapped
fn latest_mapping(conn: &Connection, old_id: &str) -> Result<Option<Option<String>>> {
    Ok(conn
        .query_row(
            "SELECT new_id FROM stability_mappings WHERE old_id = ?1 ORDER BY seq DESC LIMIT 1",
            params![old_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?)
}

type MatchKey = fn(&ElementDescriptor) -> Option<String>;

fn primary_key(d: &ElementDescriptor) -> Option<String> {
    d.primary().map(str::to_string)
}

fn type_text_key(d: &ElementDescriptor) -> Option<String> {
    d.text_value()
        .map(|text| format!("{}\u{1f}{}", d.element_type.trim().to_lowercase(), text))
}

fn path_key(d: &ElementDescriptor) -> Option<String> {
    d.path().map(str::to_string)
}

/// For each old descriptor, the index of its new counterpart and how it matched
pub fn match_descriptors(
    old: &[ElementDescriptor],
    new: &[ElementDescriptor],
) -> Vec<Option<(usize, MatchSource)>> {
    let passes: [(MatchSource, MatchKey); 3] = [
        (MatchSource::PrimaryId, primary_key),
        (MatchSource::TypeText, type_text_key),
        (MatchSource::HierarchyPath, path_key),
    ];

    let mut result: Vec<Option<(usize, MatchSource)>> = vec![None; old.len()];
    let mut consumed = vec![false; new.len()];

    for (source, key) in passes {
        // First unconsumed new descriptor per key, in input order
        let mut candidates: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, d) in new.iter().enumerate() {
            if consumed[idx] {
                continue;
            }
            if let Some(k) = key(d) {
                candidates.entry(k).or_default().push(idx);
            }
        }
        for list in candidates.values_mut() {
            list.reverse();
        }

        for (slot, d) in result.iter_mut().zip(old) {
            if slot.is_some() {
                continue;
            }
            let Some(k) = key(d) else { continue };
            if let Some(idx) = candidates.get_mut(&k).and_then(Vec::pop) {
                consumed[idx] = true;
                *slot = Some((idx, source));
            }
        }
    }
    result
}
