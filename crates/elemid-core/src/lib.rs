//! elemid Core - stable identifiers for UI elements
//!
//! elemid assigns deterministic, collision-resistant ids to elements of a
//! live interface tree, persists them in SQLite and layers hierarchy,
//! aliasing, collision auditing, usage analytics and cross-version
//! remapping on top.
//!
//! # Architecture
//!
//! Components, leaves first:
//!
//! 1. **Identity** (`identity`): pure descriptor → id functions and id grammars
//! 2. **Storage** (`storage`): SQLite WAL store, lazy-load gate, striped locks
//! 3. **HybridStore** (`entity_store`): persisted entities with O(1) cached lookups
//! 4. **HierarchyIndex** (`hierarchy`): parent/child forest with cascading deletes
//! 5. **AliasResolver** (`alias`): human-readable names bound to ids
//! 6. **CollisionMonitor** (`collision`): inline checks and a background scan
//! 7. **AnalyticsTracker** (`analytics`): usage aggregates served from the store
//! 8. **StabilityTracker** (`stability`): id remapping across app versions
//! 9. **Registry** (`registry`): the facade external callers use
//!
//! # Quick Start
//!
//! ```
//! use elemid_core::{ElementDescriptor, Registry};
//!
//! # fn main() -> elemid_core::Result<()> {
//! let registry = Registry::in_memory()?;
//!
//! let list = registry.register(&ElementDescriptor::new("app1", "1.0", "list").with_path("/0"))?;
//! let row = ElementDescriptor::new("app1", "1.0", "button")
//!     .with_text("Submit")
//!     .with_path("/0/1");
//! let row = registry.register_under(&list, &row, None)?;
//!
//! assert_eq!(registry.get_parent(row.id())?, Some(list.clone()));
//!
//! // Deleting the list removes the row with it
//! registry.delete(&list)?;
//! assert!(registry.find_by_id(row.id())?.is_none());
//! # Ok(())
//! # }
//! ```
//!
//! # Design Principles
//!
//! 1. **SQLite is the source of truth**: caches are filled from it once and
//!    written after it
//! 2. **No silent reassignment**: integrity and collision errors surface to
//!    the caller instead of being auto-resolved
//! 3. **Bounded traversals**: depth and subtree guards turn corrupted data
//!    into errors, never into unbounded loops

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod alias;
pub mod analytics;
pub mod collision;
pub mod config;
pub mod entity_store;
pub mod error;
pub mod hierarchy;
pub mod identity;
pub mod registry;
pub mod stability;
pub mod storage;
pub mod types;

// Re-export commonly used types for convenience
pub use alias::Alias;
pub use analytics::{AnalyticsRecord, AnalyticsTracker, TimeRange, UsageReport};
pub use collision::{CollisionLogEntry, CollisionStrategy, MonitorEvent, MonitorHandle};
pub use config::RegistryConfig;
pub use entity_store::RegisterOutcome;
pub use error::{FormatError, IntegrityError, RegistryError, Result, ResultExt};
pub use hierarchy::{CascadeOutcome, HierarchyEdge, IntegrityReport};
pub use identity::{FormatEncoder, IdStrategy, IdentityHasher, ParsedId};
pub use registry::Registry;
pub use stability::{MatchSource, RemapReport, StabilityMapping, VersionChange};
pub use types::{Capabilities, ElementDescriptor, Entity, LifecycleState, Timestamp};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
