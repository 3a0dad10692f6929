//! Parent/child forest over registered elements
//!
//! # Invariants
//!
//! - Every element has at most one parent (`hierarchy_edges.child_id` is the key)
//! - No cycles: an edge is rejected if the child is already an ancestor of the parent
//! - `depth` of an edge is the depth of its child; roots sit at depth 0
//! - Traversals use explicit stacks and are bounded by the depth and
//!   descendant guards, so corrupted data surfaces as `IntegrityError`
//!   instead of runaway recursion
//!
//! Structural mutations are serialized by one mutex and applied to the
//! in-memory adjacency under a single write lock, so readers see either the
//! old or the new parent of a moved element, never both or neither.

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::entity_store::{self, HybridStore};
use crate::error::{IntegrityError, RegistryError, Result};
use crate::storage::{LoadGate, Store};

/// One parent → child link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyEdge {
    pub parent_id: String,
    pub child_id: String,
    pub position: i64,
    pub depth: usize,
}

/// A stored depth that disagrees with the parent chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthMismatch {
    pub id: String,
    pub recorded: usize,
    pub expected: usize,
}

/// Findings of a non-destructive integrity sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub orphaned_edges: Vec<HierarchyEdge>,
    pub cycles: Vec<Vec<String>>,
    pub depth_mismatches: Vec<DepthMismatch>,
    /// Entities whose `parent_id` column disagrees with their edge
    pub parent_mismatches: Vec<String>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_edges.is_empty()
            && self.cycles.is_empty()
            && self.depth_mismatches.is_empty()
            && self.parent_mismatches.is_empty()
    }
}

/// Result of a cascading delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeOutcome {
    /// Removed element ids, leaves first
    pub removed: Vec<String>,
    /// Total rows deleted across all tables
    pub rows: usize,
}

#[derive(Debug, Default)]
struct Adjacency {
    parent_of: HashMap<String, HierarchyEdge>,
    children_of: HashMap<String, Vec<(i64, String)>>,
}

impl Adjacency {
    fn depth_of(&self, id: &str) -> usize {
        self.parent_of.get(id).map(|e| e.depth).unwrap_or(0)
    }

    fn attach(&mut self, edge: HierarchyEdge) {
        let siblings = self.children_of.entry(edge.parent_id.clone()).or_default();
        let slot = (edge.position, edge.child_id.clone());
        let at = siblings.partition_point(|s| s < &slot);
        siblings.insert(at, slot);
        self.parent_of.insert(edge.child_id.clone(), edge);
    }

    fn detach(&mut self, child: &str) -> Option<HierarchyEdge> {
        let edge = self.parent_of.remove(child)?;
        if let Some(siblings) = self.children_of.get_mut(&edge.parent_id) {
            siblings.retain(|(_, id)| id != child);
            if siblings.is_empty() {
                self.children_of.remove(&edge.parent_id);
            }
        }
        Some(edge)
    }
}

pub struct HierarchyIndex {
    store: Arc<Store>,
    entities: Arc<HybridStore>,
    gate: LoadGate,
    adjacency: RwLock<Adjacency>,
    structure: Mutex<()>,
    max_depth: usize,
    max_descendants: usize,
}

impl std::fmt::Debug for HierarchyIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyIndex")
            .field("loaded", &self.gate.is_loaded())
            .field("max_depth", &self.max_depth)
            .field("max_descendants", &self.max_descendants)
            .finish()
    }
}

impl HierarchyIndex {
    pub fn new(
        store: Arc<Store>,
        entities: Arc<HybridStore>,
        max_depth: usize,
        max_descendants: usize,
    ) -> Self {
        Self {
            store,
            entities,
            gate: LoadGate::new(),
            adjacency: RwLock::new(Adjacency::default()),
            structure: Mutex::new(()),
            max_depth,
            max_descendants,
        }
    }

    pub fn ensure_loaded(&self) -> Result<()> {
        self.entities.ensure_loaded()?;
        self.gate.ensure(|| {
            let edges = self.store.read("load hierarchy", |conn| all_edges(conn))?;
            let mut adjacency = Adjacency::default();
            for edge in edges {
                adjacency.attach(edge);
            }
            tracing::info!(edges = adjacency.parent_of.len(), "hierarchy loaded");
            *self.adjacency.write() = adjacency;
            Ok(())
        })
    }

    fn require(&self, id: &str) -> Result<()> {
        if self.entities.contains(id)? {
            Ok(())
        } else {
            Err(RegistryError::NotFound(id.to_string()))
        }
    }

    /// Attach `child` under `parent`; `position` defaults to after the last sibling
    pub fn add_child(&self, parent: &str, child: &str, position: Option<i64>) -> Result<HierarchyEdge> {
        self.ensure_loaded()?;
        if parent == child {
            return Err(IntegrityError::SelfParent(child.to_string()).into());
        }
        let _structure = self.structure.lock();
        let _stripes = self.entities.locks().lock_many([parent, child]);
        self.require(parent)?;
        self.require(child)?;

        if let Some(existing) = self.adjacency.read().parent_of.get(child) {
            return Err(IntegrityError::AlreadyParented {
                child: child.to_string(),
                parent: existing.parent_id.clone(),
            }
            .into());
        }

        self.relink(child, Some(parent), position)?
            .ok_or_else(|| RegistryError::NotFound(format!("edge {} -> {}", parent, child)))
    }

    /// Move `id` under `new_parent` (or to the root when `None`)
    pub fn move_element(&self, id: &str, new_parent: Option<&str>, position: Option<i64>) -> Result<Option<HierarchyEdge>> {
        self.ensure_loaded()?;
        if new_parent == Some(id) {
            return Err(IntegrityError::SelfParent(id.to_string()).into());
        }

        let _structure = self.structure.lock();
        let old_parent = self.adjacency.read().parent_of.get(id).map(|e| e.parent_id.clone());
        let mut keys: Vec<&str> = vec![id];
        keys.extend(new_parent);
        keys.extend(old_parent.as_deref());
        let _stripes = self.entities.locks().lock_many(keys);
        self.require(id)?;
        if let Some(parent) = new_parent {
            self.require(parent)?;
        }

        self.relink(id, new_parent, position)
    }

    /// Detach `child` from `parent`, making it a root
    pub fn remove_child(&self, parent: &str, child: &str) -> Result<()> {
        self.ensure_loaded()?;
        let current = self.get_parent(child)?;
        if current.as_deref() != Some(parent) {
            return Err(RegistryError::NotFound(format!("edge {} -> {}", parent, child)));
        }
        self.move_element(child, None, None).map(|_| ())
    }

    /// Rewrite the edge of `id`. Caller holds the structure lock and stripes.
    fn relink(&self, id: &str, new_parent: Option<&str>, position: Option<i64>) -> Result<Option<HierarchyEdge>> {
        let (new_depth, subtree, position) = {
            let adjacency = self.adjacency.read();

            let new_depth = match new_parent {
                Some(parent) => {
                    let ancestors = self.walk_ancestors(&adjacency, parent)?;
                    if ancestors.iter().any(|a| a == id) {
                        return Err(IntegrityError::CycleDetected {
                            parent: parent.to_string(),
                            child: id.to_string(),
                        }
                        .into());
                    }
                    ancestors.len() + 1
                }
                None => 0,
            };

            let subtree = self.walk_descendants(&adjacency, id)?;
            let old_depth = adjacency.depth_of(id);
            let deepest = subtree
                .iter()
                .map(|d| adjacency.depth_of(d).saturating_sub(old_depth))
                .max()
                .unwrap_or(0);
            if new_depth + deepest > self.max_depth {
                return Err(IntegrityError::DepthExceeded {
                    id: id.to_string(),
                    limit: self.max_depth,
                }
                .into());
            }

            let position = position.unwrap_or_else(|| {
                new_parent
                    .and_then(|p| adjacency.children_of.get(p))
                    .and_then(|siblings| siblings.iter().filter(|(_, c)| c != id).map(|(pos, _)| *pos).max())
                    .map(|max| max + 1)
                    .unwrap_or(0)
            });

            let subtree: Vec<(String, usize)> = subtree
                .into_iter()
                .map(|d| {
                    let depth = adjacency.depth_of(&d).saturating_sub(old_depth) + new_depth;
                    (d, depth)
                })
                .collect();
            (new_depth, subtree, position)
        };

        let edge = new_parent.map(|parent| HierarchyEdge {
            parent_id: parent.to_string(),
            child_id: id.to_string(),
            position,
            depth: new_depth,
        });

        self.store.write("relink element", |tx| {
            tx.execute("DELETE FROM hierarchy_edges WHERE child_id = ?1", params![id])?;
            if let Some(edge) = &edge {
                insert_edge(tx, edge)?;
            }
            for (descendant, depth) in &subtree {
                tx.execute(
                    "UPDATE hierarchy_edges SET depth = ?2 WHERE child_id = ?1",
                    params![descendant, *depth as i64],
                )?;
            }
            entity_store::update_parent_row(tx, id, new_parent)
        })?;

        {
            let mut adjacency = self.adjacency.write();
            adjacency.detach(id);
            if let Some(edge) = &edge {
                adjacency.attach(edge.clone());
            }
            for (descendant, depth) in &subtree {
                if let Some(e) = adjacency.parent_of.get_mut(descendant) {
                    e.depth = *depth;
                }
            }
        }
        self.entities.set_cached_parent(id, new_parent);
        tracing::debug!(id, parent = ?new_parent, depth = new_depth, "element relinked");

        Ok(edge)
    }

    pub fn get_parent(&self, id: &str) -> Result<Option<String>> {
        self.ensure_loaded()?;
        Ok(self.adjacency.read().parent_of.get(id).map(|e| e.parent_id.clone()))
    }

    pub fn get_edge(&self, id: &str) -> Result<Option<HierarchyEdge>> {
        self.ensure_loaded()?;
        Ok(self.adjacency.read().parent_of.get(id).cloned())
    }

    pub fn depth(&self, id: &str) -> Result<usize> {
        self.ensure_loaded()?;
        Ok(self.adjacency.read().depth_of(id))
    }

    /// Direct children ordered by position
    pub fn get_children(&self, parent: &str) -> Result<Vec<HierarchyEdge>> {
        self.ensure_loaded()?;
        let adjacency = self.adjacency.read();
        Ok(adjacency
            .children_of
            .get(parent)
            .map(|siblings| {
                siblings
                    .iter()
                    .filter_map(|(_, child)| adjacency.parent_of.get(child).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Ancestors nearest first
    pub fn get_ancestors(&self, id: &str) -> Result<Vec<String>> {
        self.ensure_loaded()?;
        let adjacency = self.adjacency.read();
        self.walk_ancestors(&adjacency, id)
    }

    /// Descendants in pre-order (parents before their children)
    pub fn get_descendants(&self, id: &str) -> Result<Vec<String>> {
        self.ensure_loaded()?;
        let adjacency = self.adjacency.read();
        self.walk_descendants(&adjacency, id)
    }

    fn walk_ancestors(&self, adjacency: &Adjacency, id: &str) -> Result<Vec<String>> {
        let mut ancestors = Vec::new();
        let mut current = id;
        while let Some(edge) = adjacency.parent_of.get(current) {
            if ancestors.len() >= self.max_depth {
                return Err(IntegrityError::DepthExceeded {
                    id: id.to_string(),
                    limit: self.max_depth,
                }
                .into());
            }
            ancestors.push(edge.parent_id.clone());
            current = &edge.parent_id;
        }
        Ok(ancestors)
    }

    fn walk_descendants(&self, adjacency: &Adjacency, id: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut seen: HashSet<&str> = HashSet::from([id]);
        let mut stack: Vec<&str> = Vec::new();
        if let Some(children) = adjacency.children_of.get(id) {
            stack.extend(children.iter().rev().map(|(_, c)| c.as_str()));
        }

        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            if out.len() >= self.max_descendants {
                return Err(IntegrityError::SubtreeTooLarge {
                    id: id.to_string(),
                    limit: self.max_descendants,
                }
                .into());
            }
            out.push(node.to_string());
            if let Some(children) = adjacency.children_of.get(node) {
                stack.extend(children.iter().rev().map(|(_, c)| c.as_str()));
            }
        }
        Ok(out)
    }

    /// Delete `id` and its whole subtree in one transaction, leaves first.
    ///
    /// `in_tx` removes the rows of other tables for each element (it runs
    /// before that element's entity row is deleted) and returns how many
    /// rows it removed. `after_commit` runs with every lock still held and
    /// receives the removed ids, leaves first. Nothing is evicted from the
    /// adjacency if the transaction fails.
    pub fn delete_with_descendants(
        &self,
        id: &str,
        mut in_tx: impl FnMut(&Transaction<'_>, &str) -> Result<usize>,
        after_commit: impl FnOnce(&[String]),
    ) -> Result<CascadeOutcome> {
        self.ensure_loaded()?;
        let structure = self.structure.lock();
        self.require(id)?;

        let mut order = {
            let adjacency = self.adjacency.read();
            let mut order = vec![id.to_string()];
            order.extend(self.walk_descendants(&adjacency, id)?);
            order
        };
        order.reverse();

        let stripes = self.entities.locks().lock_many(order.iter().map(String::as_str));

        let rows = self.store.write("cascade delete", |tx| {
            let mut rows = 0;
            for element in &order {
                rows += tx.execute("DELETE FROM hierarchy_edges WHERE child_id = ?1", params![element])?;
                rows += in_tx(tx, element)?;
                rows += entity_store::delete_row(tx, element)?;
            }
            Ok(rows)
        })?;

        {
            let mut adjacency = self.adjacency.write();
            for element in &order {
                adjacency.detach(element);
                adjacency.children_of.remove(element);
            }
        }
        after_commit(&order);
        drop(stripes);
        drop(structure);
        tracing::debug!(id, removed = order.len(), rows, "subtree deleted");

        Ok(CascadeOutcome { removed: order, rows })
    }

    /// Report orphaned edges, cycles and depth drift straight from the store.
    ///
    /// Never repairs anything.
    pub fn validate_integrity(&self) -> Result<IntegrityReport> {
        self.store.read("validate hierarchy", |conn| {
            let edges = all_edges(conn)?;
            let entity_parents = entity_parent_columns(conn)?;
            Ok(build_report(edges, &entity_parents, self.max_depth))
        })
    }
}

fn build_report(
    edges: Vec<HierarchyEdge>,
    entity_parents: &HashMap<String, Option<String>>,
    max_depth: usize,
) -> IntegrityReport {
    let mut report = IntegrityReport::default();
    let parent_of: HashMap<&str, &HierarchyEdge> =
        edges.iter().map(|e| (e.child_id.as_str(), e)).collect();

    for edge in &edges {
        if !entity_parents.contains_key(&edge.parent_id) || !entity_parents.contains_key(&edge.child_id) {
            report.orphaned_edges.push(edge.clone());
        }
    }

    let mut seen_cycles: HashSet<Vec<String>> = HashSet::new();
    for edge in &edges {
        let mut chain: Vec<&str> = vec![edge.child_id.as_str()];
        let mut current = edge.child_id.as_str();
        let mut cyclic = false;

        while let Some(up) = parent_of.get(current) {
            let next = up.parent_id.as_str();
            if let Some(at) = chain.iter().position(|c| *c == next) {
                let mut cycle: Vec<String> = chain[at..].iter().map(|s| s.to_string()).collect();
                let min = cycle.iter().enumerate().min_by(|a, b| a.1.cmp(b.1)).map(|(i, _)| i).unwrap_or(0);
                cycle.rotate_left(min);
                if seen_cycles.insert(cycle.clone()) {
                    report.cycles.push(cycle);
                }
                cyclic = true;
                break;
            }
            if chain.len() > max_depth + 1 {
                break;
            }
            chain.push(next);
            current = next;
        }

        if !cyclic {
            let expected = chain.len() - 1;
            if expected != edge.depth {
                report.depth_mismatches.push(DepthMismatch {
                    id: edge.child_id.clone(),
                    recorded: edge.depth,
                    expected,
                });
            }
        }
    }

    for (id, column) in entity_parents {
        let edge_parent = parent_of.get(id.as_str()).map(|e| e.parent_id.as_str());
        if column.as_deref() != edge_parent {
            report.parent_mismatches.push(id.clone());
        }
    }
    report.parent_mismatches.sort();
    report
}

fn insert_edge(conn: &Connection, edge: &HierarchyEdge) -> Result<()> {
    conn.execute(
        "INSERT INTO hierarchy_edges (child_id, parent_id, position, depth) VALUES (?1, ?2, ?3, ?4)",
        params![edge.child_id, edge.parent_id, edge.position, edge.depth as i64],
    )?;
    Ok(())
}

fn edge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HierarchyEdge> {
    let depth: i64 = row.get(3)?;
    Ok(HierarchyEdge {
        child_id: row.get(0)?,
        parent_id: row.get(1)?,
        position: row.get(2)?,
        depth: depth.max(0) as usize,
    })
}

pub(crate) fn all_edges(conn: &Connection) -> Result<Vec<HierarchyEdge>> {
    let mut stmt = conn.prepare(
        "SELECT child_id, parent_id, position, depth FROM hierarchy_edges ORDER BY parent_id, position, child_id",
    )?;
    let edges = stmt
        .query_map([], edge_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

/// Edges whose parent or child row is missing
pub(crate) fn orphaned_edges(conn: &Connection) -> Result<Vec<HierarchyEdge>> {
    let mut stmt = conn.prepare(
        "SELECT e.child_id, e.parent_id, e.position, e.depth FROM hierarchy_edges e
         WHERE NOT EXISTS (SELECT 1 FROM entities p WHERE p.id = e.parent_id)
            OR NOT EXISTS (SELECT 1 FROM entities c WHERE c.id = e.child_id)",
    )?;
    let edges = stmt
        .query_map([], edge_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

fn entity_parent_columns(conn: &Connection) -> Result<HashMap<String, Option<String>>> {
    let mut stmt = conn.prepare("SELECT id, parent_id FROM entities")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)))?
        .collect::<rusqlite::Result<HashMap<_, _>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityHasher;
    use crate::storage::StripedLocks;
    use crate::types::ElementDescriptor;

    struct Fixture {
        store: Arc<Store>,
        entities: Arc<HybridStore>,
        hierarchy: HierarchyIndex,
    }

    fn fixture_with_limits(max_depth: usize, max_descendants: usize) -> Fixture {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let entities = Arc::new(HybridStore::new(
            store.clone(),
            Arc::new(StripedLocks::new(8)),
            IdentityHasher::default(),
        ));
        let hierarchy = HierarchyIndex::new(store.clone(), entities.clone(), max_depth, max_descendants);
        Fixture {
            store,
            entities,
            hierarchy,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_limits(100, 10_000)
    }

    fn element(f: &Fixture, path: &str) -> String {
        let d = ElementDescriptor::new("app1", "1.0", "view").with_path(path);
        f.entities.register(&d).unwrap().entity.id
    }

    #[test]
    fn test_children_ordered_by_position() {
        let f = fixture();
        let root = element(&f, "/0");
        let a = element(&f, "/0/0");
        let b = element(&f, "/0/1");
        let c = element(&f, "/0/2");

        f.hierarchy.add_child(&root, &b, Some(5)).unwrap();
        f.hierarchy.add_child(&root, &a, Some(1)).unwrap();
        f.hierarchy.add_child(&root, &c, None).unwrap();

        let children: Vec<String> = f
            .hierarchy
            .get_children(&root)
            .unwrap()
            .into_iter()
            .map(|e| e.child_id)
            .collect();
        assert_eq!(children, vec![a, b, c.clone()]);
        assert_eq!(f.hierarchy.get_edge(&c).unwrap().unwrap().position, 6);
    }

    #[test]
    fn test_cycle_rejected() {
        let f = fixture();
        let a = element(&f, "/a");
        let b = element(&f, "/b");

        f.hierarchy.add_child(&a, &b, None).unwrap();
        let err = f.hierarchy.move_element(&a, Some(&b), None).unwrap_err();
        assert!(err.is_integrity());
        assert!(f.hierarchy.add_child(&a, &a, None).unwrap_err().is_integrity());
        assert!(f.hierarchy.add_child(&b, &a, None).unwrap_err().is_integrity());
    }

    #[test]
    fn test_second_parent_rejected() {
        let f = fixture();
        let a = element(&f, "/a");
        let b = element(&f, "/b");
        let c = element(&f, "/c");

        f.hierarchy.add_child(&a, &c, None).unwrap();
        let err = f.hierarchy.add_child(&b, &c, None).unwrap_err();
        assert!(matches!(
            err.root(),
            RegistryError::Integrity(IntegrityError::AlreadyParented { .. })
        ));
    }

    #[test]
    fn test_ancestors_and_descendants() {
        let f = fixture();
        let root = element(&f, "/0");
        let mid = element(&f, "/0/0");
        let leaf1 = element(&f, "/0/0/0");
        let leaf2 = element(&f, "/0/0/1");

        f.hierarchy.add_child(&root, &mid, None).unwrap();
        f.hierarchy.add_child(&mid, &leaf1, None).unwrap();
        f.hierarchy.add_child(&mid, &leaf2, None).unwrap();

        assert_eq!(f.hierarchy.get_ancestors(&leaf2).unwrap(), vec![mid.clone(), root.clone()]);
        assert_eq!(
            f.hierarchy.get_descendants(&root).unwrap(),
            vec![mid.clone(), leaf1.clone(), leaf2.clone()]
        );
        assert_eq!(f.hierarchy.depth(&leaf1).unwrap(), 2);
        assert_eq!(
            f.entities.find_by_id(&leaf1).unwrap().unwrap().parent_id.as_deref(),
            Some(mid.as_str())
        );
    }

    #[test]
    fn test_depth_guard() {
        let f = fixture_with_limits(3, 100);
        let ids: Vec<String> = (0..5).map(|i| element(&f, &format!("/{}", i))).collect();

        f.hierarchy.add_child(&ids[0], &ids[1], None).unwrap();
        f.hierarchy.add_child(&ids[1], &ids[2], None).unwrap();
        f.hierarchy.add_child(&ids[2], &ids[3], None).unwrap();
        let err = f.hierarchy.add_child(&ids[3], &ids[4], None).unwrap_err();
        assert!(matches!(
            err.root(),
            RegistryError::Integrity(IntegrityError::DepthExceeded { .. })
        ));
    }

    #[test]
    fn test_descendant_guard() {
        let f = fixture_with_limits(100, 2);
        let root = element(&f, "/r");
        for i in 0..3 {
            let child = element(&f, &format!("/r/{}", i));
            f.hierarchy.add_child(&root, &child, None).unwrap();
        }
        let err = f.hierarchy.get_descendants(&root).unwrap_err();
        assert!(matches!(
            err.root(),
            RegistryError::Integrity(IntegrityError::SubtreeTooLarge { .. })
        ));
    }

    #[test]
    fn test_move_updates_subtree_depths() {
        let f = fixture();
        let a = element(&f, "/a");
        let b = element(&f, "/b");
        let b1 = element(&f, "/b/1");
        let b2 = element(&f, "/b/1/2");

        f.hierarchy.add_child(&b, &b1, None).unwrap();
        f.hierarchy.add_child(&b1, &b2, None).unwrap();
        f.hierarchy.move_element(&b, Some(&a), None).unwrap();

        assert_eq!(f.hierarchy.get_parent(&b).unwrap().as_deref(), Some(a.as_str()));
        assert_eq!(f.hierarchy.depth(&b).unwrap(), 1);
        assert_eq!(f.hierarchy.depth(&b2).unwrap(), 3);
        assert!(f.hierarchy.validate_integrity().unwrap().is_clean());

        f.hierarchy.move_element(&b, None, None).unwrap();
        assert_eq!(f.hierarchy.get_parent(&b).unwrap(), None);
        assert_eq!(f.hierarchy.depth(&b2).unwrap(), 2);
        assert!(f.hierarchy.get_children(&a).unwrap().is_empty());
        assert!(f.hierarchy.validate_integrity().unwrap().is_clean());
    }

    #[test]
    fn test_remove_child_requires_matching_edge() {
        let f = fixture();
        let a = element(&f, "/a");
        let b = element(&f, "/b");
        let c = element(&f, "/c");
        f.hierarchy.add_child(&a, &b, None).unwrap();

        assert!(f.hierarchy.remove_child(&c, &b).unwrap_err().is_not_found());
        f.hierarchy.remove_child(&a, &b).unwrap();
        assert_eq!(f.hierarchy.get_parent(&b).unwrap(), None);
    }

    #[test]
    fn test_delete_with_descendants_is_leaf_first() {
        let f = fixture();
        let root = element(&f, "/0");
        let child = element(&f, "/0/0");
        let grandchild = element(&f, "/0/0/0");
        f.hierarchy.add_child(&root, &child, None).unwrap();
        f.hierarchy.add_child(&child, &grandchild, None).unwrap();

        let mut visited = Vec::new();
        let outcome = f
            .hierarchy
            .delete_with_descendants(
                &root,
                |_, id| {
                    visited.push(id.to_string());
                    Ok(0)
                },
                |_| {},
            )
            .unwrap();

        assert_eq!(outcome.removed, vec![grandchild.clone(), child.clone(), root.clone()]);
        assert_eq!(visited, outcome.removed);
        // 3 entity rows + 2 edges
        assert_eq!(outcome.rows, 5);
        assert!(f.hierarchy.get_children(&root).unwrap().is_empty());
        assert_eq!(f.store.stats().unwrap()["hierarchy_edges"], 0);
    }

    #[test]
    fn test_failed_cascade_leaves_everything() {
        let f = fixture();
        let root = element(&f, "/0");
        let child = element(&f, "/0/0");
        f.hierarchy.add_child(&root, &child, None).unwrap();

        let result = f.hierarchy.delete_with_descendants(
            &root,
            |_, id| {
                if id == root {
                    Err(RegistryError::NotFound("forced".into()))
                } else {
                    Ok(0)
                }
            },
            |_| panic!("must not run after a failed transaction"),
        );
        assert!(result.is_err());
        assert_eq!(f.store.stats().unwrap()["entities"], 2);
        assert_eq!(f.hierarchy.get_parent(&child).unwrap().as_deref(), Some(root.as_str()));
    }

    #[test]
    fn test_validate_reports_without_repairing() {
        let f = fixture();
        let a = element(&f, "/a");
        let b = element(&f, "/b");
        let c = element(&f, "/c");
        f.hierarchy.add_child(&a, &b, None).unwrap();
        f.hierarchy.add_child(&b, &c, None).unwrap();

        f.store
            .with_conn("corrupt", f.store.default_timeout(), |conn| {
                conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
                conn.execute(
                    "UPDATE hierarchy_edges SET depth = 7 WHERE child_id = ?1",
                    params![c],
                )?;
                conn.execute(
                    "INSERT INTO hierarchy_edges (child_id, parent_id, position, depth) VALUES ('ghost', ?1, 0, 2)",
                    params![b],
                )?;
                conn.execute(
                    "INSERT INTO hierarchy_edges (child_id, parent_id, position, depth) VALUES (?1, ?2, 0, 3)",
                    params![a, c],
                )?;
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                Ok(())
            })
            .unwrap();

        let report = f.hierarchy.validate_integrity().unwrap();
        assert_eq!(report.orphaned_edges.len(), 1);
        assert_eq!(report.orphaned_edges[0].child_id, "ghost");
        assert_eq!(report.cycles.len(), 1);
        assert_eq!(report.cycles[0].len(), 3);
        assert!(report.parent_mismatches.contains(&a));

        // nothing was repaired
        let again = f.hierarchy.validate_integrity().unwrap();
        assert_eq!(report, again);
    }

    #[test]
    fn test_validate_detects_depth_drift() {
        let f = fixture();
        let a = element(&f, "/a");
        let b = element(&f, "/b");
        f.hierarchy.add_child(&a, &b, None).unwrap();

        f.store
            .with_conn("corrupt", f.store.default_timeout(), |conn| {
                conn.execute("UPDATE hierarchy_edges SET depth = 4 WHERE child_id = ?1", params![b])?;
                Ok(())
            })
            .unwrap();

        let report = f.hierarchy.validate_integrity().unwrap();
        assert_eq!(
            report.depth_mismatches,
            vec![DepthMismatch {
                id: b,
                recorded: 4,
                expected: 1
            }]
        );
    }
}
