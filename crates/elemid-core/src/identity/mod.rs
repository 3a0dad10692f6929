//! Identity generation
//!
//! - [`IdentityHasher`]: pure descriptor → digest → id
//! - [`FormatEncoder`]: the three id grammars and their validators
//! - [`stability_score`]: heuristic trust signal for long-lived bindings

pub mod format;
pub mod hasher;
pub mod score;

pub use format::{FormatEncoder, IdStrategy, ParsedId};
pub use hasher::{GeneratedId, IdentityHasher, COMPONENT_DELIMITER};
pub use score::{is_stable, stability_score, STABLE_THRESHOLD};
