//! Core types for elemid
//!
//! This module defines the fundamental types used across the registry:
//! - Element descriptors (input from the UI scraping collaborator)
//! - Entities (the persisted form of a registered element)
//! - Lifecycle states
//! - Timestamps

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type alias
pub type Timestamp = DateTime<Utc>;

/// Create a timestamp for the current moment
pub fn now() -> Timestamp {
    Utc::now()
}

/// Convert a stored millisecond value back into a timestamp
pub fn from_millis(ms: i64) -> Timestamp {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// Boolean capability flags captured with an element.
///
/// Field order is the canonical order used when hashing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub clickable: bool,
    pub long_clickable: bool,
    pub editable: bool,
    pub scrollable: bool,
    pub checkable: bool,
    pub focusable: bool,
}

impl Capabilities {
    /// Canonical `name=0|1` pairs in declaration order
    pub fn canonical_pairs(&self) -> [(&'static str, bool); 6] {
        [
            ("clickable", self.clickable),
            ("long_clickable", self.long_clickable),
            ("editable", self.editable),
            ("scrollable", self.scrollable),
            ("checkable", self.checkable),
            ("focusable", self.focusable),
        ]
    }
}

/// Structured description of one UI element.
///
/// Produced by the scraping collaborator; the registry never captures
/// these itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementDescriptor {
    pub namespace: String,
    pub version: String,
    pub element_type: String,
    /// Stable platform identifier (e.g. a resource id)
    pub primary_id: Option<String>,
    pub text: Option<String>,
    pub description: Option<String>,
    /// Position in the live tree, e.g. `/0/1/3`
    pub hierarchy_path: Option<String>,
    pub capabilities: Capabilities,
}

impl ElementDescriptor {
    /// Start a descriptor for `namespace`/`version`/`element_type`
    pub fn new(
        namespace: impl Into<String>,
        version: impl Into<String>,
        element_type: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            version: version.into(),
            element_type: element_type.into(),
            ..Self::default()
        }
    }

    pub fn with_primary_id(mut self, id: impl Into<String>) -> Self {
        self.primary_id = Some(id.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.hierarchy_path = Some(path.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Trimmed primary id, `None` when absent or blank
    pub fn primary(&self) -> Option<&str> {
        non_blank(self.primary_id.as_deref())
    }

    pub fn text_value(&self) -> Option<&str> {
        non_blank(self.text.as_deref())
    }

    pub fn description_value(&self) -> Option<&str> {
        non_blank(self.description.as_deref())
    }

    pub fn path(&self) -> Option<&str> {
        non_blank(self.hierarchy_path.as_deref())
    }

    /// Human-facing name: primary id, else text, else description, else type
    pub fn display_name(&self) -> String {
        self.primary()
            .or_else(|| self.text_value())
            .or_else(|| self.description_value())
            .unwrap_or(self.element_type.trim())
            .to_string()
    }

    /// Name+type signature used to classify collisions
    pub fn signature(&self) -> String {
        format!(
            "{}:{}",
            self.element_type.trim().to_lowercase(),
            self.display_name().to_lowercase()
        )
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Entity lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Created,
    Active,
    Inactive,
    Deleted,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Active => "active",
            LifecycleState::Inactive => "inactive",
            LifecycleState::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(LifecycleState::Created),
            "active" => Some(LifecycleState::Active),
            "inactive" => Some(LifecycleState::Inactive),
            "deleted" => Some(LifecycleState::Deleted),
            _ => None,
        }
    }

    /// Deleted is terminal; every other state may move freely
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Deleted, _) => false,
            (_, Created) => false,
            _ => true,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub prefix: Option<String>,
    pub namespace: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub element_type: String,
    /// The descriptor this entity was registered from, as JSON
    pub attributes: serde_json::Value,
    pub created_at: Timestamp,
    pub last_accessed_at: Timestamp,
    pub access_count: u64,
    pub lifecycle: LifecycleState,
    pub enabled: bool,
    pub priority: i32,
}

impl Entity {
    /// Build a fresh entity for `descriptor` under `id`
    pub fn from_descriptor(
        id: impl Into<String>,
        prefix: Option<String>,
        descriptor: &ElementDescriptor,
    ) -> crate::Result<Self> {
        let now = now();
        Ok(Self {
            id: id.into(),
            prefix,
            namespace: descriptor.namespace.clone(),
            parent_id: None,
            name: descriptor.display_name(),
            element_type: descriptor.element_type.trim().to_string(),
            attributes: serde_json::to_value(descriptor)?,
            created_at: now,
            last_accessed_at: now,
            access_count: 1,
            lifecycle: LifecycleState::Created,
            enabled: true,
            priority: 0,
        })
    }

    /// The descriptor stored in the attribute blob
    pub fn descriptor(&self) -> crate::Result<ElementDescriptor> {
        Ok(serde_json::from_value(self.attributes.clone())?)
    }

    /// Name+type signature, matching [`ElementDescriptor::signature`]
    pub fn signature(&self) -> String {
        format!(
            "{}:{}",
            self.element_type.to_lowercase(),
            self.name.to_lowercase()
        )
    }
}
