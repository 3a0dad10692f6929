//! Persistent Storage Layer - SQLite WAL
//!
//! Provides concurrency-safe persistence for the registry:
//! - WAL mode: scans run on a separate read-only connection and never hold
//!   the writer
//! - Caller-supplied timeouts on every operation
//! - Idempotent migrations on open
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                             Store                             │
//! ├───────────────────────────────────────────────────────────────┤
//! │ entities │ hierarchy_edges │ aliases │ analytics │ audit logs │
//! └───────────────────────────────────────────────────────────────┘
//!        ↑ LoadGate: in-memory indexes fill from here once
//!        ↑ StripedLocks: per-id write serialization
//! ```
//!
//! # Example
//!
//! ```no_run
//! use elemid_core::storage::Store;
//! use std::time::Duration;
//!
//! # fn example() -> elemid_core::Result<()> {
//! let store = Store::open(".elemid/elemid.db", Duration::from_secs(5))?;
//! println!("{}", store.stats()?);
//! # Ok(())
//! # }
//! ```

pub mod gate;
pub mod locks;
pub(crate) mod schema;
pub mod store;

pub use gate::LoadGate;
pub use locks::{StripeGuards, StripedLocks};
pub use store::Store;
