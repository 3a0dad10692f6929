//! Bidirectional alias ↔ id table
//!
//! Aliases are opaque with respect to the id grammar: the resolver never
//! looks inside the target id. The first alias bound to an id is its
//! primary alias.

use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::entity_store::HybridStore;
use crate::error::{RegistryError, Result};
use crate::identity::FormatEncoder;
use crate::storage::{LoadGate, Store};
use crate::types::{self, Timestamp};

/// Longest legal alias
pub const MAX_ALIAS_LEN: usize = 50;

/// Upper bound on numeric suffixes tried by `create_auto_alias`
const MAX_SUFFIX: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub alias: String,
    pub target_id: String,
    pub is_primary: bool,
    pub created_at: Timestamp,
}

pub struct AliasResolver {
    store: Arc<Store>,
    entities: Arc<HybridStore>,
    gate: LoadGate,
    by_alias: DashMap<String, Alias>,
    by_target: DashMap<String, Vec<String>>,
}

impl std::fmt::Debug for AliasResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasResolver")
            .field("loaded", &self.gate.is_loaded())
            .field("aliases", &self.by_alias.len())
            .finish()
    }
}

impl AliasResolver {
    pub fn new(store: Arc<Store>, entities: Arc<HybridStore>) -> Self {
        Self {
            store,
            entities,
            gate: LoadGate::new(),
            by_alias: DashMap::new(),
            by_target: DashMap::new(),
        }
    }

    pub fn ensure_loaded(&self) -> Result<()> {
        self.gate.ensure(|| {
            let aliases = self.store.read("load aliases", |conn| {
                let mut stmt = conn.prepare(
                    "SELECT alias, target_id, is_primary, created_at_ms FROM aliases ORDER BY created_at_ms, alias",
                )?;
                let rows = stmt
                    .query_map([], alias_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })?;

            self.by_alias.clear();
            self.by_target.clear();
            for alias in aliases {
                self.cache(alias);
            }
            tracing::info!(count = self.by_alias.len(), "alias table loaded");
            Ok(())
        })
    }

    /// Derive `normalize(name)_abbrev(type)`, adding `_2`, `_3`, ... until free
    pub fn create_auto_alias(&self, id: &str, name: &str, element_type: &str) -> Result<Alias> {
        let base = auto_alias_base(name, element_type);

        for attempt in 1..=MAX_SUFFIX {
            let candidate = if attempt == 1 {
                base.clone()
            } else {
                let suffix = format!("_{}", attempt);
                let mut stem = base.clone();
                stem.truncate(MAX_ALIAS_LEN - suffix.len());
                format!("{}{}", stem.trim_end_matches('_'), suffix)
            };

            match self.bind(id, &candidate) {
                Ok(alias) => return Ok(alias),
                Err(RegistryError::AliasExists { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(RegistryError::AliasExists {
            alias: base,
            target: format!("{} suffixes exhausted", MAX_SUFFIX),
        })
    }

    /// Bind an explicit alias; never overwrites an existing binding
    pub fn set_alias(&self, id: &str, alias: &str) -> Result<Alias> {
        FormatEncoder::validate_alias(alias)?;
        self.bind(id, alias)
    }

    fn bind(&self, id: &str, alias: &str) -> Result<Alias> {
        FormatEncoder::validate_alias(alias)?;
        self.ensure_loaded()?;

        let alias_key = format!("alias:{}", alias);
        let _stripes = self.entities.locks().lock_many([alias_key.as_str(), id]);

        if !self.entities.contains(id)? {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        if let Some(existing) = self.by_alias.get(alias) {
            return Err(RegistryError::AliasExists {
                alias: alias.to_string(),
                target: existing.target_id.clone(),
            });
        }

        let record = Alias {
            alias: alias.to_string(),
            target_id: id.to_string(),
            is_primary: self.by_target.get(id).map_or(true, |list| list.is_empty()),
            created_at: types::now(),
        };

        self.store.write("insert alias", |tx| {
            let taken: Option<String> = tx
                .query_row(
                    "SELECT target_id FROM aliases WHERE alias = ?1",
                    params![record.alias],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(target) = taken {
                return Err(RegistryError::AliasExists {
                    alias: record.alias.clone(),
                    target,
                });
            }
            tx.execute(
                "INSERT INTO aliases (alias, target_id, is_primary, created_at_ms) VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.alias,
                    record.target_id,
                    record.is_primary,
                    record.created_at.timestamp_millis()
                ],
            )?;
            Ok(())
        })?;

        self.cache(record.clone());
        tracing::debug!(alias, id, primary = record.is_primary, "alias bound");
        Ok(record)
    }

    pub fn resolve(&self, alias: &str) -> Result<Option<String>> {
        self.ensure_loaded()?;
        Ok(self.by_alias.get(alias).map(|a| a.target_id.clone()))
    }

    pub fn get(&self, alias: &str) -> Result<Option<Alias>> {
        self.ensure_loaded()?;
        Ok(self.by_alias.get(alias).map(|a| a.clone()))
    }

    /// Aliases of `id`, primary first
    pub fn aliases_for(&self, id: &str) -> Result<Vec<Alias>> {
        self.ensure_loaded()?;
        let names = self.by_target.get(id).map(|l| l.clone()).unwrap_or_default();
        let mut aliases: Vec<Alias> = names
            .iter()
            .filter_map(|name| self.by_alias.get(name).map(|a| a.clone()))
            .collect();
        aliases.sort_by(|a, b| b.is_primary.cmp(&a.is_primary).then(a.created_at.cmp(&b.created_at)));
        Ok(aliases)
    }

    pub fn primary_alias(&self, id: &str) -> Result<Option<Alias>> {
        Ok(self.aliases_for(id)?.into_iter().find(|a| a.is_primary))
    }

    /// Unbind one alias; returns false if it was not bound
    pub fn remove_alias(&self, alias: &str) -> Result<bool> {
        self.ensure_loaded()?;
        let Some(target) = self.resolve(alias)? else {
            return Ok(false);
        };
        let alias_key = format!("alias:{}", alias);
        let _stripes = self.entities.locks().lock_many([alias_key.as_str(), target.as_str()]);

        let removed = self.store.write("delete alias", |tx| {
            Ok(tx.execute("DELETE FROM aliases WHERE alias = ?1", params![alias])?)
        })?;
        self.uncache(alias);
        Ok(removed > 0)
    }

    /// Unbind every alias of `id`
    pub fn remove_all_for(&self, id: &str) -> Result<usize> {
        self.ensure_loaded()?;
        let removed = self
            .store
            .write("delete aliases", |tx| delete_rows_for(tx, id))?;
        self.evict_for(id);
        Ok(removed)
    }

    /// Cache-side removal after the rows are gone
    pub(crate) fn evict_for(&self, id: &str) {
        if let Some((_, names)) = self.by_target.remove(id) {
            for name in names {
                self.by_alias.remove(&name);
            }
        }
    }

    fn cache(&self, alias: Alias) {
        self.by_target
            .entry(alias.target_id.clone())
            .or_default()
            .push(alias.alias.clone());
        self.by_alias.insert(alias.alias.clone(), alias);
    }

    fn uncache(&self, alias: &str) {
        if let Some((_, record)) = self.by_alias.remove(alias) {
            let now_empty = match self.by_target.get_mut(&record.target_id) {
                Some(mut names) => {
                    names.retain(|n| n != alias);
                    names.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.by_target.remove_if(&record.target_id, |_, names| names.is_empty());
            }
        }
    }
}

pub(crate) fn delete_rows_for(conn: &Connection, id: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM aliases WHERE target_id = ?1", params![id])?)
}

fn alias_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Alias> {
    Ok(Alias {
        alias: row.get(0)?,
        target_id: row.get(1)?,
        is_primary: row.get(2)?,
        created_at: types::from_millis(row.get(3)?),
    })
}

/// Lowercase, `_`-separated, starting with a letter
pub fn normalize_alias_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_matches('_').to_string();
    match out.chars().next() {
        None => "element".to_string(),
        Some(c) if c.is_ascii_lowercase() => out,
        Some(_) => format!("n{}", out),
    }
}

/// Short tag for an element type
pub fn abbreviate_type(element_type: &str) -> String {
    let compact: String = element_type
        .trim()
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();

    let known = match compact.as_str() {
        "button" | "imagebutton" | "materialbutton" => Some("btn"),
        "text" | "textview" | "label" => Some("txt"),
        "edittext" | "input" | "textfield" | "textinput" => Some("input"),
        "image" | "imageview" | "icon" => Some("img"),
        "checkbox" | "check" => Some("chk"),
        "switch" | "toggle" | "togglebutton" => Some("sw"),
        "radiobutton" | "radio" => Some("radio"),
        "recyclerview" | "listview" | "list" => Some("list"),
        "scrollview" | "scroll" => Some("scroll"),
        "tab" | "tabitem" => Some("tab"),
        "menuitem" | "menu" => Some("menu"),
        "link" | "hyperlink" => Some("link"),
        "linearlayout" | "framelayout" | "relativelayout" | "constraintlayout" | "layout" | "view" => {
            Some("view")
        }
        _ => None,
    };

    match known {
        Some(abbrev) => abbrev.to_string(),
        None if compact.is_empty() => "el".to_string(),
        None => compact.chars().take(4).collect(),
    }
}

fn auto_alias_base(name: &str, element_type: &str) -> String {
    let abbrev = abbreviate_type(element_type);
    let mut stem = normalize_alias_name(name);
    stem.truncate(MAX_ALIAS_LEN - abbrev.len() - 1);
    format!("{}_{}", stem.trim_end_matches('_'), abbrev)
}
