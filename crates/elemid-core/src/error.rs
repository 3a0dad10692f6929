//! Error types for elemid core
//!
//! This module defines all error types used throughout the registry.
//! We use `thiserror` for ergonomic error definitions with automatic Display/Error implementations.

use thiserror::Error;

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Main error type for registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Grammar violations (prefix, namespace, alias, id)
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Structural violations of the hierarchy
    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    /// Alias is already bound to an element
    #[error("Alias '{alias}' already bound to {target}")]
    AliasExists { alias: String, target: String },

    /// Two registrations map to the same id with differing content
    #[error("Collision on id {id}: existing '{existing}' differs from attempted '{attempted}'")]
    Collision {
        id: String,
        existing: String,
        attempted: String,
    },

    /// The persistent store did not answer within the caller's timeout
    #[error("Store timeout after {timeout_ms}ms during {operation}")]
    StoreTimeout { operation: String, timeout_ms: u64 },

    /// Lifecycle move not allowed from the current state
    #[error("Invalid lifecycle transition for {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    /// Parent links only change through the hierarchy
    #[error("Parent of {0} changes through move_element, not update")]
    ParentImmutable(String),

    /// A stored row holds a value no current type accepts
    #[error("Corrupt {table} row {key}: {reason}")]
    CorruptRow {
        table: &'static str,
        key: String,
        reason: String,
    },

    /// Referenced element or alias does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// SQLite errors
    #[error("Storage error: {0}")]
    Storage(rusqlite::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<RegistryError>,
    },
}

/// Errors related to identifier and alias grammars
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Invalid prefix '{0}': expected 1-20 alphanumeric chars with internal hyphens")]
    InvalidPrefix(String),

    #[error("Invalid namespace '{0}': expected lowercase dotted segments")]
    InvalidNamespace(String),

    #[error("Invalid alias '{0}': expected ^[a-z][a-z0-9_]{{2,49}}$")]
    InvalidAlias(String),

    #[error("Malformed id '{0}'")]
    MalformedId(String),
}

/// Errors related to the parent/child graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Adding {child} under {parent} would create a cycle")]
    CycleDetected { parent: String, child: String },

    #[error("Element {0} cannot be its own parent")]
    SelfParent(String),

    #[error("Element {child} already has parent {parent}")]
    AlreadyParented { child: String, parent: String },

    #[error("Depth guard exceeded at {id}: limit {limit}")]
    DepthExceeded { id: String, limit: usize },

    #[error("Subtree of {id} exceeds {limit} nodes")]
    SubtreeTooLarge { id: String, limit: usize },
}

impl From<rusqlite::Error> for RegistryError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                RegistryError::StoreTimeout {
                    operation: e.to_string(),
                    timeout_ms: 0,
                }
            }
            _ => RegistryError::Storage(e),
        }
    }
}

impl RegistryError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strip any context wrappers and return the underlying error
    pub fn root(&self) -> &RegistryError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for alias grammar violations
    pub fn is_alias_format(&self) -> bool {
        matches!(self.root(), Self::Format(FormatError::InvalidAlias(_)))
    }

    /// True when an alias was already taken
    pub fn is_alias_exists(&self) -> bool {
        matches!(self.root(), Self::AliasExists { .. })
    }

    /// True for any hierarchy integrity violation
    pub fn is_integrity(&self) -> bool {
        matches!(self.root(), Self::Integrity(_))
    }

    /// True when the store timed out
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Self::StoreTimeout { .. })
    }

    /// True when a stored row failed to decode
    pub fn is_corrupt(&self) -> bool {
        matches!(self.root(), Self::CorruptRow { .. })
    }

    /// True when the referenced item does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound(_))
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let err = RegistryError::NotFound("app1.v1.button-abc".to_string());
        let err = err.context("Failed to resolve element");

        assert!(err.to_string().contains("Failed to resolve element"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(FormatError::InvalidAlias("X".into()).into());
        let result = result.context("Alias validation failed");

        let err = result.unwrap_err();
        assert!(err.to_string().contains("Alias validation failed"));
        assert!(err.is_alias_format());
    }

    #[test]
    fn test_corrupt_row_survives_context() {
        let err = RegistryError::CorruptRow {
            table: "entities",
            key: "app1.v1.0.button-0123456789ab".into(),
            reason: "unknown lifecycle 'zombie'".into(),
        }
        .context("Failed to load entities");
        assert!(err.is_corrupt());
        assert!(err.to_string().contains("zombie"));
    }

    #[test]
    fn test_busy_maps_to_timeout() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(RegistryError::from(busy).is_timeout());
    }
}
