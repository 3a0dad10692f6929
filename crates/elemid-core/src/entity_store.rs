//! HybridStore - entity table plus a lazily loaded in-memory index
//!
//! SQLite is the source of truth. The `DashMap` index is filled once on
//! first access through a [`LoadGate`] and then kept in step with every
//! write: store first, cache second, both under the id's stripe lock.
//! Reads never take a stripe lock.

use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{RegistryError, Result};
use crate::identity::{GeneratedId, IdStrategy, IdentityHasher};
use crate::storage::{LoadGate, Store, StripedLocks};
use crate::types::{self, ElementDescriptor, Entity, LifecycleState};

const ENTITY_COLUMNS: &str = "id, prefix, namespace, parent_id, name, element_type, attributes_json,
     created_at_ms, last_accessed_at_ms, access_count, lifecycle, enabled, priority";

/// What `register` did
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub entity: Entity,
    /// False when the id was already known and only access metadata moved
    pub created: bool,
}

impl RegisterOutcome {
    pub fn id(&self) -> &str {
        &self.entity.id
    }
}

/// Entity storage with O(1) cached lookups
pub struct HybridStore {
    store: Arc<Store>,
    locks: Arc<StripedLocks>,
    hasher: IdentityHasher,
    gate: LoadGate,
    entities: DashMap<String, Entity>,
    by_name: DashMap<String, HashSet<String>>,
    by_type: DashMap<String, HashSet<String>>,
    by_namespace: DashMap<String, HashSet<String>>,
}

impl std::fmt::Debug for HybridStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridStore")
            .field("loaded", &self.gate.is_loaded())
            .field("entities", &self.entities.len())
            .finish()
    }
}

impl HybridStore {
    pub fn new(store: Arc<Store>, locks: Arc<StripedLocks>, hasher: IdentityHasher) -> Self {
        Self {
            store,
            locks,
            hasher,
            gate: LoadGate::new(),
            entities: DashMap::new(),
            by_name: DashMap::new(),
            by_type: DashMap::new(),
            by_namespace: DashMap::new(),
        }
    }

    pub fn hasher(&self) -> &IdentityHasher {
        &self.hasher
    }

    pub(crate) fn locks(&self) -> &StripedLocks {
        &self.locks
    }

    pub fn is_loaded(&self) -> bool {
        self.gate.is_loaded()
    }

    /// Fill the index from the store, once
    pub fn ensure_loaded(&self) -> Result<()> {
        self.gate.ensure(|| self.load_all())
    }

    fn load_all(&self) -> Result<()> {
        let rows = self.store.read("load entities", |conn| {
            let mut stmt = conn.prepare(&format!("SELECT {} FROM entities", ENTITY_COLUMNS))?;
            let rows = stmt
                .query_map([], EntityRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        self.entities.clear();
        self.by_name.clear();
        self.by_type.clear();
        self.by_namespace.clear();

        for row in rows {
            let entity = row.into_entity()?;
            self.index(&entity);
            self.entities.insert(entity.id.clone(), entity);
        }
        tracing::info!(count = self.entities.len(), "entity index loaded");
        Ok(())
    }

    /// Register under the deterministic id.
    ///
    /// Known ids only get their access metadata updated.
    pub fn register(&self, descriptor: &ElementDescriptor) -> Result<RegisterOutcome> {
        let generated = self.hasher.generate(descriptor, &IdStrategy::Deterministic)?;
        self.register_with_id(generated, descriptor, |_| Ok(()))
    }

    /// Register under a pre-generated id.
    ///
    /// `on_existing` runs under the id's stripe lock when the id is already
    /// taken; an error from it aborts the registration untouched.
    pub fn register_with_id(
        &self,
        generated: GeneratedId,
        descriptor: &ElementDescriptor,
        on_existing: impl FnOnce(&Entity) -> Result<()>,
    ) -> Result<RegisterOutcome> {
        self.ensure_loaded()?;
        let _stripe = self.locks.lock(&generated.id);

        let existing = self.entities.get(&generated.id).map(|e| e.clone());
        if let Some(existing) = existing {
            on_existing(&existing)?;
            let entity = self.touch_locked(existing)?;
            return Ok(RegisterOutcome {
                entity,
                created: false,
            });
        }

        let entity = Entity::from_descriptor(generated.id, generated.prefix, descriptor)?;
        self.store
            .write("insert entity", |tx| insert_row(tx, &entity))?;
        self.index(&entity);
        self.entities.insert(entity.id.clone(), entity.clone());
        tracing::debug!(id = %entity.id, "entity created");

        Ok(RegisterOutcome {
            entity,
            created: true,
        })
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<Entity>> {
        self.ensure_loaded()?;
        Ok(self.entities.get(id).map(|e| e.clone()))
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        self.ensure_loaded()?;
        Ok(self.entities.contains_key(id))
    }

    pub fn find_by_name(&self, name: &str) -> Result<Vec<Entity>> {
        self.lookup(&self.by_name, &name_key(name))
    }

    pub fn find_by_type(&self, element_type: &str) -> Result<Vec<Entity>> {
        self.lookup(&self.by_type, &type_key(element_type))
    }

    pub fn find_by_namespace(&self, namespace: &str) -> Result<Vec<Entity>> {
        self.lookup(&self.by_namespace, namespace)
    }

    fn lookup(&self, index: &DashMap<String, HashSet<String>>, key: &str) -> Result<Vec<Entity>> {
        self.ensure_loaded()?;
        let ids: Vec<String> = index
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        let mut found: Vec<Entity> = ids
            .iter()
            .filter_map(|id| self.entities.get(id).map(|e| e.clone()))
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    /// Number of cached entities
    pub fn len(&self) -> Result<usize> {
        self.ensure_loaded()?;
        Ok(self.entities.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Replace one entity, store then cache.
    ///
    /// A lifecycle change must be a legal transition.
    pub fn update(&self, entity: &Entity) -> Result<()> {
        self.ensure_loaded()?;
        let _stripe = self.locks.lock(&entity.id);
        let previous = self
            .entities
            .get(&entity.id)
            .map(|e| e.clone())
            .ok_or_else(|| RegistryError::NotFound(entity.id.clone()))?;
        if previous.lifecycle != entity.lifecycle && !previous.lifecycle.can_transition_to(entity.lifecycle) {
            return Err(RegistryError::InvalidTransition {
                id: entity.id.clone(),
                from: previous.lifecycle.to_string(),
                to: entity.lifecycle.to_string(),
            });
        }

        self.store.write("update entity", |tx| update_row(tx, entity))?;
        self.unindex(&previous);
        self.index(entity);
        self.entities.insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    /// Record one more access
    pub fn touch(&self, id: &str) -> Result<Entity> {
        self.ensure_loaded()?;
        let _stripe = self.locks.lock(id);
        let current = self
            .entities
            .get(id)
            .map(|e| e.clone())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        self.touch_locked(current)
    }

    fn touch_locked(&self, mut entity: Entity) -> Result<Entity> {
        entity.access_count += 1;
        entity.last_accessed_at = types::now();
        if entity.lifecycle == LifecycleState::Created {
            entity.lifecycle = LifecycleState::Active;
        }
        self.store.write("touch entity", |tx| update_row(tx, &entity))?;
        self.entities.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    /// Read-modify-write one entity under its stripe lock
    pub fn modify(&self, id: &str, f: impl FnOnce(&mut Entity) -> Result<()>) -> Result<Entity> {
        self.ensure_loaded()?;
        let _stripe = self.locks.lock(id);
        let previous = self
            .entities
            .get(id)
            .map(|e| e.clone())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        let mut entity = previous.clone();
        f(&mut entity)?;
        self.store.write("modify entity", |tx| update_row(tx, &entity))?;
        self.unindex(&previous);
        self.index(&entity);
        self.entities.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    pub fn set_lifecycle(&self, id: &str, state: LifecycleState) -> Result<Entity> {
        self.modify(id, |entity| {
            if !entity.lifecycle.can_transition_to(state) {
                return Err(RegistryError::InvalidTransition {
                    id: entity.id.clone(),
                    from: entity.lifecycle.to_string(),
                    to: state.to_string(),
                });
            }
            entity.lifecycle = state;
            Ok(())
        })
    }

    /// Cache-side parent update; the row is written by the hierarchy transaction
    pub(crate) fn set_cached_parent(&self, id: &str, parent: Option<&str>) {
        if let Some(mut entity) = self.entities.get_mut(id) {
            entity.parent_id = parent.map(str::to_string);
        }
    }

    /// Drop an entity from the cache and indexes (row already deleted)
    pub(crate) fn evict(&self, id: &str) {
        if let Some((_, entity)) = self.entities.remove(id) {
            self.unindex(&entity);
        }
    }

    /// All cached ids
    pub fn ids(&self) -> Result<Vec<String>> {
        self.ensure_loaded()?;
        Ok(self.entities.iter().map(|e| e.key().clone()).collect())
    }

    fn index(&self, entity: &Entity) {
        add_to(&self.by_name, name_key(&entity.name), &entity.id);
        add_to(&self.by_type, type_key(&entity.element_type), &entity.id);
        add_to(&self.by_namespace, entity.namespace.clone(), &entity.id);
    }

    fn unindex(&self, entity: &Entity) {
        remove_from(&self.by_name, &name_key(&entity.name), &entity.id);
        remove_from(&self.by_type, &type_key(&entity.element_type), &entity.id);
        remove_from(&self.by_namespace, &entity.namespace, &entity.id);
    }
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn type_key(element_type: &str) -> String {
    element_type.trim().to_lowercase()
}

fn add_to(index: &DashMap<String, HashSet<String>>, key: String, id: &str) {
    index.entry(key).or_default().insert(id.to_string());
}

fn remove_from(index: &DashMap<String, HashSet<String>>, key: &str, id: &str) {
    let now_empty = match index.get_mut(key) {
        Some(mut set) => {
            set.remove(id);
            set.is_empty()
        }
        None => false,
    };
    if now_empty {
        index.remove_if(key, |_, set| set.is_empty());
    }
}

/// Raw `entities` row before JSON decoding
struct EntityRow {
    id: String,
    prefix: Option<String>,
    namespace: String,
    parent_id: Option<String>,
    name: String,
    element_type: String,
    attributes_json: String,
    created_at_ms: i64,
    last_accessed_at_ms: i64,
    access_count: i64,
    lifecycle: String,
    enabled: bool,
    priority: i32,
}

impl EntityRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            prefix: row.get(1)?,
            namespace: row.get(2)?,
            parent_id: row.get(3)?,
            name: row.get(4)?,
            element_type: row.get(5)?,
            attributes_json: row.get(6)?,
            created_at_ms: row.get(7)?,
            last_accessed_at_ms: row.get(8)?,
            access_count: row.get(9)?,
            lifecycle: row.get(10)?,
            enabled: row.get(11)?,
            priority: row.get(12)?,
        })
    }

    fn into_entity(self) -> Result<Entity> {
        let lifecycle = LifecycleState::parse(&self.lifecycle).ok_or_else(|| RegistryError::CorruptRow {
            table: "entities",
            key: self.id.clone(),
            reason: format!("unknown lifecycle '{}'", self.lifecycle),
        })?;
        Ok(Entity {
            lifecycle,
            attributes: serde_json::from_str(&self.attributes_json)?,
            id: self.id,
            prefix: self.prefix,
            namespace: self.namespace,
            parent_id: self.parent_id,
            name: self.name,
            element_type: self.element_type,
            created_at: types::from_millis(self.created_at_ms),
            last_accessed_at: types::from_millis(self.last_accessed_at_ms),
            access_count: self.access_count.max(0) as u64,
            enabled: self.enabled,
            priority: self.priority,
        })
    }
}

/// Fetch one row straight from the store
pub(crate) fn select_row(conn: &Connection, id: &str) -> Result<Option<Entity>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM entities WHERE id = ?1", ENTITY_COLUMNS),
            params![id],
            EntityRow::from_row,
        )
        .optional()?;
    row.map(EntityRow::into_entity).transpose()
}

fn insert_row(conn: &Connection, entity: &Entity) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO entities ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            ENTITY_COLUMNS
        ),
        params![
            entity.id,
            entity.prefix,
            entity.namespace,
            entity.parent_id,
            entity.name,
            entity.element_type,
            serde_json::to_string(&entity.attributes)?,
            entity.created_at.timestamp_millis(),
            entity.last_accessed_at.timestamp_millis(),
            entity.access_count as i64,
            entity.lifecycle.as_str(),
            entity.enabled,
            entity.priority,
        ],
    )?;
    Ok(())
}

fn update_row(conn: &Connection, entity: &Entity) -> Result<()> {
    let changed = conn.execute(
        "UPDATE entities SET prefix = ?2, namespace = ?3, parent_id = ?4, name = ?5,
             element_type = ?6, attributes_json = ?7, last_accessed_at_ms = ?8,
             access_count = ?9, lifecycle = ?10, enabled = ?11, priority = ?12
         WHERE id = ?1",
        params![
            entity.id,
            entity.prefix,
            entity.namespace,
            entity.parent_id,
            entity.name,
            entity.element_type,
            serde_json::to_string(&entity.attributes)?,
            entity.last_accessed_at.timestamp_millis(),
            entity.access_count as i64,
            entity.lifecycle.as_str(),
            entity.enabled,
            entity.priority,
        ],
    )?;
    if changed == 0 {
        return Err(RegistryError::NotFound(entity.id.clone()));
    }
    Ok(())
}

pub(crate) fn update_parent_row(conn: &Connection, id: &str, parent: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE entities SET parent_id = ?2 WHERE id = ?1",
        params![id, parent],
    )?;
    Ok(())
}

pub(crate) fn delete_row(conn: &Connection, id: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM entities WHERE id = ?1", params![id])?)
}
