//! Registry - the facade over every component
//!
//! One `Registry` is constructed explicitly by the owning application and
//! shared (usually behind an `Arc`). All components share one [`Store`] and
//! one set of striped locks.
//!
//! ```text
//!                         Registry
//!   ┌───────────┬───────────┼────────────┬───────────┬───────────┐
//!   │           │           │            │           │           │
//! Hybrid    Hierarchy     Alias      Collision   Analytics   Stability
//! Store      Index      Resolver     Monitor     Tracker     Tracker
//!   └───────────┴───────────┴─────┬──────┴───────────┴───────────┘
//!                               Store (SQLite WAL)
//! ```
//!
//! # Example
//!
//! ```
//! use elemid_core::{ElementDescriptor, Registry, RegistryConfig};
//!
//! # fn main() -> elemid_core::Result<()> {
//! let registry = Registry::open(RegistryConfig::default())?;
//!
//! let submit = ElementDescriptor::new("app1", "1.0", "button")
//!     .with_text("Submit")
//!     .with_path("/0/1");
//! let id = registry.register(&submit)?;
//! assert_eq!(registry.register(&submit)?, id);
//! assert_eq!(registry.find_by_id(&id)?.unwrap().access_count, 2);
//!
//! let alias = registry.create_auto_alias(&id)?;
//! assert_eq!(registry.resolve(&alias.alias)?, Some(id));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::alias::{Alias, AliasResolver};
use crate::analytics::{AnalyticsTracker, UsageReport, TimeRange};
use crate::collision::{CollisionLogEntry, CollisionMonitor, CollisionStrategy, MonitorEvent, MonitorHandle};
use crate::config::RegistryConfig;
use crate::entity_store::{HybridStore, RegisterOutcome};
use crate::error::{RegistryError, Result, ResultExt};
use crate::hierarchy::{CascadeOutcome, HierarchyEdge, HierarchyIndex, IntegrityReport};
use crate::identity::{IdStrategy, IdentityHasher};
use crate::stability::{RemapReport, StabilityTracker, VersionChange};
use crate::storage::{Store, StripedLocks};
use crate::types::{ElementDescriptor, Entity, LifecycleState};

/// Stable-identifier registry
#[derive(Debug)]
pub struct Registry {
    /// Configuration the registry was opened with
    config: RegistryConfig,

    /// Shared persistent store
    store: Arc<Store>,

    /// Entities and their secondary indexes
    entities: Arc<HybridStore>,

    /// Parent/child forest
    hierarchy: HierarchyIndex,

    /// Alias table
    aliases: AliasResolver,

    /// Inline collision checks and the background scan
    monitor: Arc<CollisionMonitor>,

    /// Usage aggregates
    analytics: AnalyticsTracker,

    /// Cross-version remapping
    stability: StabilityTracker,
}

impl Registry {
    /// Open (or create) the registry described by `config`
    pub fn open(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(
            Store::open(&config.database_path, config.store_timeout())
                .with_context(|| format!("Failed to open store at {}", config.database_path.display()))?,
        );

        let hasher = IdentityHasher::new(config.digest_hex_len, config.text_truncate_len);
        let locks = Arc::new(StripedLocks::new(config.lock_stripes));
        let entities = Arc::new(HybridStore::new(store.clone(), locks, hasher));

        let mut monitor = CollisionMonitor::new(store.clone(), config.monitor.channel_capacity);
        if config.analytics.event_retention_secs > 0 {
            monitor = monitor.with_event_retention(Duration::from_secs(config.analytics.event_retention_secs));
        }

        let registry = Self {
            hierarchy: HierarchyIndex::new(
                store.clone(),
                entities.clone(),
                config.max_hierarchy_depth,
                config.max_descendants,
            ),
            aliases: AliasResolver::new(store.clone(), entities.clone()),
            monitor: Arc::new(monitor),
            analytics: AnalyticsTracker::new(
                store.clone(),
                config.analytics.enabled,
                Duration::from_secs(config.analytics.peak_window_secs.max(1) as u64),
            ),
            stability: StabilityTracker::new(store.clone(), hasher),
            entities,
            store,
            config,
        };

        tracing::info!(path = %registry.store.path().display(), "registry opened");
        Ok(registry)
    }

    /// Throwaway registry backed by an in-memory store
    pub fn in_memory() -> Result<Self> {
        Self::open(RegistryConfig::default())
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn entities(&self) -> &HybridStore {
        &self.entities
    }

    pub fn hierarchy(&self) -> &HierarchyIndex {
        &self.hierarchy
    }

    pub fn aliases(&self) -> &AliasResolver {
        &self.aliases
    }

    pub fn monitor(&self) -> &Arc<CollisionMonitor> {
        &self.monitor
    }

    pub fn analytics(&self) -> &AnalyticsTracker {
        &self.analytics
    }

    pub fn stability(&self) -> &StabilityTracker {
        &self.stability
    }

    /// Fill every in-memory index now instead of on first use
    pub fn warm_up(&self) -> Result<()> {
        self.entities.ensure_loaded()?;
        self.hierarchy.ensure_loaded()?;
        self.aliases.ensure_loaded()
    }

    // ----- registration -----

    /// Register under the deterministic id and return it.
    ///
    /// Re-registering a known descriptor only bumps its access metadata.
    pub fn register(&self, descriptor: &ElementDescriptor) -> Result<String> {
        Ok(self.register_detailed(descriptor)?.entity.id)
    }

    /// Like [`Registry::register`], returning the entity and whether it was created
    pub fn register_detailed(&self, descriptor: &ElementDescriptor) -> Result<RegisterOutcome> {
        self.register_as(descriptor, &IdStrategy::Deterministic)
    }

    /// Register with an explicit id strategy
    pub fn register_as(&self, descriptor: &ElementDescriptor, strategy: &IdStrategy) -> Result<RegisterOutcome> {
        let generated = self.entities.hasher().generate(descriptor, strategy)?;
        let outcome = self.entities.register_with_id(generated, descriptor, |existing| {
            match self.monitor.check_before_insert(existing, descriptor)? {
                None | Some(CollisionStrategy::Skip) => Ok(()),
                Some(CollisionStrategy::RegenerateId) => Err(RegistryError::Collision {
                    id: existing.id.clone(),
                    existing: existing.signature(),
                    attempted: descriptor.signature(),
                }),
            }
        })?;

        if outcome.created {
            self.analytics.track_lifecycle(outcome.id(), LifecycleState::Created)?;
        }
        self.analytics.track_access(outcome.id())?;
        Ok(outcome)
    }

    /// Register and attach under `parent` in one call
    pub fn register_under(
        &self,
        parent: &str,
        descriptor: &ElementDescriptor,
        position: Option<i64>,
    ) -> Result<RegisterOutcome> {
        let outcome = self.register_detailed(descriptor)?;
        match self.hierarchy.get_parent(outcome.id())? {
            Some(current) if current == parent => {}
            Some(_) => {
                self.hierarchy.move_element(outcome.id(), Some(parent), position)?;
            }
            None => {
                self.hierarchy.add_child(parent, outcome.id(), position)?;
            }
        }
        let entity = self
            .entities
            .find_by_id(outcome.id())?
            .ok_or_else(|| RegistryError::NotFound(outcome.id().to_string()))?;
        Ok(RegisterOutcome { entity, ..outcome })
    }

    // ----- lookups -----

    pub fn find_by_id(&self, id: &str) -> Result<Option<Entity>> {
        self.entities.find_by_id(id)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Vec<Entity>> {
        self.entities.find_by_name(name)
    }

    pub fn find_by_type(&self, element_type: &str) -> Result<Vec<Entity>> {
        self.entities.find_by_type(element_type)
    }

    pub fn find_by_namespace(&self, namespace: &str) -> Result<Vec<Entity>> {
        self.entities.find_by_namespace(namespace)
    }

    /// Resolve an alias or id to its entity
    pub fn lookup(&self, alias_or_id: &str) -> Result<Option<Entity>> {
        if let Some(entity) = self.entities.find_by_id(alias_or_id)? {
            return Ok(Some(entity));
        }
        match self.aliases.resolve(alias_or_id)? {
            Some(id) => self.entities.find_by_id(&id),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> Result<usize> {
        self.entities.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.entities.is_empty()
    }

    // ----- mutation -----

    /// Replace a stored entity.
    ///
    /// `parent_id` is owned by the hierarchy and cannot change here.
    pub fn update(&self, entity: &Entity) -> Result<()> {
        let current = self
            .entities
            .find_by_id(&entity.id)?
            .ok_or_else(|| RegistryError::NotFound(entity.id.clone()))?;
        if current.parent_id != entity.parent_id {
            return Err(RegistryError::ParentImmutable(entity.id.clone()));
        }
        self.entities.update(entity)
    }

    /// Record one access without re-registering
    pub fn access(&self, id: &str) -> Result<Entity> {
        let entity = self.entities.touch(id)?;
        self.analytics.track_access(id)?;
        Ok(entity)
    }

    /// Record one action performed on an element
    pub fn record_execution(&self, id: &str, action: &str, duration: Duration, success: bool) -> Result<()> {
        if !self.entities.contains(id)? {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        self.analytics.track_execution(id, action, duration, success)
    }

    pub fn activate(&self, id: &str) -> Result<Entity> {
        self.transition(id, LifecycleState::Active)
    }

    pub fn deactivate(&self, id: &str) -> Result<Entity> {
        self.transition(id, LifecycleState::Inactive)
    }

    fn transition(&self, id: &str, state: LifecycleState) -> Result<Entity> {
        let entity = self.entities.set_lifecycle(id, state)?;
        self.analytics.track_lifecycle(id, state)?;
        Ok(entity)
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<Entity> {
        self.entities.modify(id, |entity| {
            entity.enabled = enabled;
            Ok(())
        })
    }

    pub fn set_priority(&self, id: &str, priority: i32) -> Result<Entity> {
        self.entities.modify(id, |entity| {
            entity.priority = priority;
            Ok(())
        })
    }

    /// Delete `id` with its subtree and aliases; returns rows removed
    pub fn delete(&self, id: &str) -> Result<usize> {
        Ok(self.delete_detailed(id)?.rows)
    }

    /// Like [`Registry::delete`], also listing the removed ids (leaves first).
    ///
    /// Cache and alias eviction happens inside the cascade while the
    /// structure lock and every affected stripe are held, in the same
    /// leaves-first order. A reader that finds an element gone will
    /// therefore never find one of its descendants still cached.
    pub fn delete_detailed(&self, id: &str) -> Result<CascadeOutcome> {
        self.aliases.ensure_loaded()?;
        let outcome = self.hierarchy.delete_with_descendants(
            id,
            |tx, element| crate::alias::delete_rows_for(tx, element),
            |removed| {
                for element in removed {
                    self.aliases.evict_for(element);
                    self.entities.evict(element);
                }
            },
        )?;

        for element in &outcome.removed {
            self.analytics.track_lifecycle(element, LifecycleState::Deleted)?;
        }
        tracing::info!(id, removed = outcome.removed.len(), rows = outcome.rows, "element deleted");
        Ok(outcome)
    }

    // ----- aliases -----

    /// Derive and bind an alias from the element's name and type
    pub fn create_auto_alias(&self, id: &str) -> Result<Alias> {
        let entity = self
            .entities
            .find_by_id(id)?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        self.aliases
            .create_auto_alias(id, &entity.name, &entity.element_type)
    }

    pub fn set_alias(&self, id: &str, alias: &str) -> Result<Alias> {
        self.aliases.set_alias(id, alias)
    }

    pub fn resolve(&self, alias: &str) -> Result<Option<String>> {
        self.aliases.resolve(alias)
    }

    pub fn remove_alias(&self, alias: &str) -> Result<bool> {
        self.aliases.remove_alias(alias)
    }

    pub fn aliases_for(&self, id: &str) -> Result<Vec<Alias>> {
        self.aliases.aliases_for(id)
    }

    pub fn primary_alias(&self, id: &str) -> Result<Option<Alias>> {
        self.aliases.primary_alias(id)
    }

    // ----- hierarchy -----

    pub fn add_child(&self, parent: &str, child: &str, position: Option<i64>) -> Result<HierarchyEdge> {
        self.hierarchy.add_child(parent, child, position)
    }

    pub fn move_element(&self, id: &str, new_parent: Option<&str>, position: Option<i64>) -> Result<Option<HierarchyEdge>> {
        self.hierarchy.move_element(id, new_parent, position)
    }

    pub fn remove_child(&self, parent: &str, child: &str) -> Result<()> {
        self.hierarchy.remove_child(parent, child)
    }

    pub fn get_parent(&self, id: &str) -> Result<Option<String>> {
        self.hierarchy.get_parent(id)
    }

    pub fn get_children(&self, parent: &str) -> Result<Vec<HierarchyEdge>> {
        self.hierarchy.get_children(parent)
    }

    pub fn get_ancestors(&self, id: &str) -> Result<Vec<String>> {
        self.hierarchy.get_ancestors(id)
    }

    pub fn get_descendants(&self, id: &str) -> Result<Vec<String>> {
        self.hierarchy.get_descendants(id)
    }

    pub fn validate_integrity(&self) -> Result<IntegrityReport> {
        let report = self.hierarchy.validate_integrity()?;
        if !report.is_clean() {
            tracing::warn!(
                orphaned = report.orphaned_edges.len(),
                cycles = report.cycles.len(),
                depth = report.depth_mismatches.len(),
                parents = report.parent_mismatches.len(),
                "hierarchy integrity issues found"
            );
        }
        Ok(report)
    }

    // ----- collisions and monitoring -----

    pub fn collision_log(&self, limit: usize) -> Result<Vec<CollisionLogEntry>> {
        self.monitor.collision_log(limit)
    }

    pub fn resolve_collision(&self, seq: i64, strategy: CollisionStrategy) -> Result<()> {
        self.monitor.resolve_collision(seq, strategy)
    }

    /// Run the background sweeps once on the calling thread
    pub fn scan_now(&self) -> Vec<MonitorEvent> {
        self.monitor.periodic_scan()
    }

    /// Start the periodic scan on the current tokio runtime
    pub fn start_monitor(&self) -> Result<MonitorHandle> {
        if !self.config.monitor.enabled {
            return Err(RegistryError::Config("collision monitor is disabled".into()));
        }
        self.monitor
            .spawn(Duration::from_secs(self.config.monitor.interval_secs))
    }

    // ----- analytics -----

    pub fn usage_report(&self, range: Option<TimeRange>) -> Result<UsageReport> {
        self.analytics.usage_report(range)
    }

    // ----- stability -----

    pub fn detect_version_change(&self, namespace: &str, current: &str) -> Result<VersionChange> {
        self.stability.detect_version_change(namespace, current)
    }

    pub fn record_version(&self, namespace: &str, version: &str) -> Result<()> {
        self.stability.record_version(namespace, version)
    }

    /// Remap ids across versions and deactivate registered orphans
    pub fn remap(
        &self,
        namespace: &str,
        old_version: &str,
        new_version: &str,
        old: &[ElementDescriptor],
        new: &[ElementDescriptor],
    ) -> Result<RemapReport> {
        let report = self
            .stability
            .remap(namespace, old_version, new_version, old, new)?;

        for orphan in report.orphaned() {
            let Some(entity) = self.entities.find_by_id(&orphan.old_id)? else {
                continue;
            };
            if entity.lifecycle != LifecycleState::Inactive {
                self.deactivate(&entity.id)?;
            }
        }
        Ok(report)
    }

    pub fn remapped_id(&self, old_id: &str) -> Result<Option<String>> {
        self.stability.remapped_id(old_id)
    }

    /// Store row counts plus cache sizes
    pub fn stats(&self) -> Result<serde_json::Value> {
        let mut stats = self.store.stats()?;
        if let Some(map) = stats.as_object_mut() {
            map.insert("cached_entities".into(), serde_json::json!(self.entities.len()?));
            map.insert(
                "lock_stripes".into(),
                serde_json::json!(self.entities.locks().stripe_count()),
            );
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::in_memory().unwrap()
    }

    fn submit() -> ElementDescriptor {
        ElementDescriptor::new("app1", "1.0", "button")
            .with_text("Submit")
            .with_path("/0/1")
    }

    #[test]
    fn test_register_twice_same_id() {
        let registry = registry();
        let first = registry.register(&submit()).unwrap();
        let second = registry.register(&submit()).unwrap();
        assert_eq!(first, second);

        let entity = registry.find_by_id(&first).unwrap().unwrap();
        assert_eq!(entity.access_count, 2);
        assert_eq!(registry.analytics().record(&first).unwrap().unwrap().total_accesses, 2);
    }

    #[test]
    fn test_collision_with_different_element_is_surfaced() {
        let registry = registry();
        let original = ElementDescriptor::new("app1", "1.0", "button").with_primary_id("submit");
        let id = registry.register(&original).unwrap();

        // Same canonical id, different text: same signature, so it is skipped
        let retitled = original.clone().with_text("Send");
        assert_eq!(registry.register(&retitled).unwrap(), id);

        // Force an id owner with another signature
        let mut entity = registry.find_by_id(&id).unwrap().unwrap();
        let other = ElementDescriptor::new("app1", "1.0", "button").with_primary_id("cancel");
        entity.name = other.display_name();
        entity.attributes = serde_json::to_value(&other).unwrap();
        registry.update(&entity).unwrap();

        let err = registry.register(&original).unwrap_err();
        assert!(matches!(err, RegistryError::Collision { .. }));

        let log = registry.collision_log(10).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].strategy, CollisionStrategy::RegenerateId);
        assert_eq!(log[1].strategy, CollisionStrategy::Skip);
    }

    #[test]
    fn test_register_as_prefixed() {
        let registry = registry();
        let strategy = IdStrategy::Prefixed {
            prefix: "btn".into(),
            namespace: Some("com.app".into()),
        };
        let outcome = registry.register_as(&submit(), &strategy).unwrap();
        assert!(outcome.created);
        assert!(outcome.id().starts_with("com.app.btn-"));
        assert_eq!(outcome.entity.prefix.as_deref(), Some("btn"));
    }

    #[test]
    fn test_register_under_attaches() {
        let registry = registry();
        let screen = registry
            .register(&ElementDescriptor::new("app1", "1.0", "screen").with_primary_id("home"))
            .unwrap();
        let child = registry.register_under(&screen, &submit(), None).unwrap();

        assert_eq!(child.entity.parent_id.as_deref(), Some(screen.as_str()));
        assert_eq!(registry.get_parent(child.id()).unwrap(), Some(screen.clone()));

        // Second call is a no-op on the hierarchy
        registry.register_under(&screen, &submit(), None).unwrap();
        assert_eq!(registry.get_children(&screen).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_cascades() {
        let registry = registry();
        let parent = registry
            .register(&ElementDescriptor::new("app1", "1.0", "list").with_path("/0"))
            .unwrap();
        let children: Vec<String> = (0..3)
            .map(|i| {
                let d = ElementDescriptor::new("app1", "1.0", "row").with_path(format!("/0/{}", i));
                registry.register_under(&parent, &d, None).unwrap().entity.id
            })
            .collect();
        registry.set_alias(&children[0], "first_row").unwrap();
        registry.set_alias(&parent, "the_list").unwrap();

        let outcome = registry.delete_detailed(&parent).unwrap();
        assert_eq!(outcome.removed.len(), 4);
        assert_eq!(outcome.removed.last(), Some(&parent));

        for id in children.iter().chain([&parent]) {
            assert!(registry.find_by_id(id).unwrap().is_none());
        }
        assert!(registry.resolve("first_row").unwrap().is_none());
        assert!(registry.get_children(&parent).unwrap().is_empty());
        assert!(registry.validate_integrity().unwrap().is_clean());

        let record = registry.analytics().record(&parent).unwrap().unwrap();
        assert_eq!(record.lifecycle, LifecycleState::Deleted);
        assert!(record.lifetime_ms.is_some());
    }

    #[test]
    fn test_delete_clears_every_index() {
        let registry = registry();
        let screen = registry
            .register(&ElementDescriptor::new("app1", "1.0", "screen").with_primary_id("home"))
            .unwrap();
        let panel = registry
            .register_under(&screen, &ElementDescriptor::new("app1", "1.0", "panel").with_path("/0"), None)
            .unwrap()
            .entity
            .id;
        registry.register_under(&panel, &submit(), None).unwrap();

        registry.delete(&screen).unwrap();
        assert!(registry.find_by_name("Submit").unwrap().is_empty());
        for element_type in ["screen", "panel", "button"] {
            assert!(registry.find_by_type(element_type).unwrap().is_empty());
        }
        assert!(registry.find_by_namespace("app1").unwrap().is_empty());
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn test_readers_never_see_descendants_outlive_ancestors() {
        let registry = Arc::new(registry());
        let mut chain = vec![registry
            .register(&ElementDescriptor::new("app1", "1.0", "screen").with_primary_id("home"))
            .unwrap()];
        for depth in 0..6 {
            let d = ElementDescriptor::new("app1", "1.0", "panel").with_path(format!("/{}", depth));
            let parent = chain[chain.len() - 1].clone();
            chain.push(registry.register_under(&parent, &d, None).unwrap().entity.id);
        }

        let reader = {
            let registry = registry.clone();
            let chain = chain.clone();
            std::thread::spawn(move || loop {
                let present: Vec<bool> = chain
                    .iter()
                    .map(|id| registry.find_by_id(id).unwrap().is_some())
                    .collect();
                // Once an ancestor is gone, nothing below it may be found
                if let Some(gone) = present.iter().position(|p| !p) {
                    assert!(present[gone..].iter().all(|p| !p), "{:?}", present);
                }
                if !present[0] {
                    break;
                }
            })
        };

        registry.delete(&chain[0]).unwrap();
        reader.join().unwrap();
    }

    #[test]
    fn test_delete_unknown_is_not_found() {
        assert!(registry().delete("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_lifecycle_and_flags() {
        let registry = registry();
        let id = registry.register(&submit()).unwrap();

        assert_eq!(registry.deactivate(&id).unwrap().lifecycle, LifecycleState::Inactive);
        assert_eq!(registry.activate(&id).unwrap().lifecycle, LifecycleState::Active);
        assert!(!registry.set_enabled(&id, false).unwrap().enabled);
        assert_eq!(registry.set_priority(&id, 7).unwrap().priority, 7);
        assert_eq!(
            registry.analytics().record(&id).unwrap().unwrap().lifecycle,
            LifecycleState::Active
        );
    }

    #[test]
    fn test_update_cannot_reparent() {
        let registry = registry();
        let id = registry.register(&submit()).unwrap();
        let mut entity = registry.find_by_id(&id).unwrap().unwrap();
        entity.parent_id = Some("elsewhere".into());
        let err = registry.update(&entity).unwrap_err();
        assert!(matches!(err, RegistryError::ParentImmutable(ref e) if *e == id));
    }

    #[test]
    fn test_lookup_by_alias_or_id() {
        let registry = registry();
        let id = registry.register(&submit()).unwrap();
        let alias = registry.create_auto_alias(&id).unwrap();
        assert_eq!(alias.alias, "submit_btn");
        assert!(alias.is_primary);

        assert_eq!(registry.lookup(&id).unwrap().unwrap().id, id);
        assert_eq!(registry.lookup("submit_btn").unwrap().unwrap().id, id);
        assert!(registry.lookup("unknown_alias").unwrap().is_none());
    }

    #[test]
    fn test_access_and_executions() {
        let registry = registry();
        let id = registry.register(&submit()).unwrap();
        registry.access(&id).unwrap();
        registry
            .record_execution(&id, "click", Duration::from_millis(12), true)
            .unwrap();

        assert_eq!(registry.find_by_id(&id).unwrap().unwrap().access_count, 2);
        assert_eq!(registry.analytics().success_rate(&id).unwrap(), Some(1.0));
        assert!(registry
            .record_execution("ghost", "click", Duration::from_millis(1), true)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_remap_deactivates_orphans() {
        let registry = registry();
        let keep = ElementDescriptor::new("app1", "1.0", "button").with_primary_id("login");
        let drop = ElementDescriptor::new("app1", "1.0", "button").with_text("Legacy");
        registry.register(&keep).unwrap();
        let dropped_id = registry.register(&drop).unwrap();

        let new = vec![ElementDescriptor::new("app1", "2.0", "button").with_primary_id("login")];
        let report = registry
            .remap("app1", "1.0", "2.0", &[keep.clone(), drop.clone()], &new)
            .unwrap();
        assert_eq!(report.matched().count(), 1);

        let dropped = registry.find_by_id(&dropped_id).unwrap().unwrap();
        assert_eq!(dropped.lifecycle, LifecycleState::Inactive);
        assert!(registry.detect_version_change("app1", "3.0").unwrap().is_changed());
    }

    #[test]
    fn test_stats_include_tables() {
        let registry = registry();
        registry.register(&submit()).unwrap();
        let stats = registry.stats().unwrap();
        assert_eq!(stats["entities"], 1);
        assert_eq!(stats["cached_entities"], 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RegistryConfig::default().with_lock_stripes(0);
        assert!(Registry::open(config).is_err());
    }
}
