//! Descriptor → digest
//!
//! Canonical component order:
//!
//! 1. namespace
//! 2. version
//! 3. primary id, or the fallback chain `type`, `text` (truncated), `description`
//! 4. hierarchy path
//! 5. capability flags
//!
//! Each component is written as `{tag}={byte_len}:{value}` and the components
//! are joined with `|` before hashing with BLAKE3. The length prefix keeps
//! values containing `|` or `=` from bleeding into the next component. The hex digest is truncated to the configured length
//! (12 chars = 48 bits by default).

use crate::identity::format::{FormatEncoder, IdStrategy};
use crate::types::ElementDescriptor;
use crate::Result;

/// Separator between canonical components
pub const COMPONENT_DELIMITER: &str = "|";

fn tagged(tag: &str, value: &str) -> String {
    format!("{}={}:{}", tag, value.len(), value)
}

/// A freshly generated id plus the prefix it was generated with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedId {
    pub id: String,
    pub prefix: Option<String>,
}

/// Pure descriptor → id function
#[derive(Debug, Clone, Copy)]
pub struct IdentityHasher {
    digest_hex_len: usize,
    text_truncate_len: usize,
}

impl Default for IdentityHasher {
    fn default() -> Self {
        Self::new(12, 50)
    }
}

impl IdentityHasher {
    pub fn new(digest_hex_len: usize, text_truncate_len: usize) -> Self {
        Self {
            digest_hex_len: digest_hex_len.clamp(8, 64),
            text_truncate_len,
        }
    }

    /// Ordered, tagged components that feed the digest
    pub fn canonical_components(&self, descriptor: &ElementDescriptor) -> Vec<String> {
        let mut components = vec![
            tagged("ns", descriptor.namespace.trim()),
            tagged("ver", descriptor.version.trim()),
        ];

        match descriptor.primary() {
            Some(primary) => components.push(tagged("rid", primary)),
            None => {
                components.push(tagged("type", &descriptor.element_type.trim().to_lowercase()));
                if let Some(text) = descriptor.text_value() {
                    let truncated: String = text.chars().take(self.text_truncate_len).collect();
                    components.push(tagged("text", &truncated));
                }
                if let Some(desc) = descriptor.description_value() {
                    components.push(tagged("desc", desc));
                }
            }
        }

        if let Some(path) = descriptor.path() {
            components.push(tagged("path", path));
        }

        let flags = descriptor
            .capabilities
            .canonical_pairs()
            .iter()
            .map(|(name, on)| format!("{}:{}", name, u8::from(*on)))
            .collect::<Vec<_>>()
            .join(",");
        components.push(tagged("flags", &flags));

        components
    }

    pub fn canonical_string(&self, descriptor: &ElementDescriptor) -> String {
        self.canonical_components(descriptor).join(COMPONENT_DELIMITER)
    }

    /// Truncated hex BLAKE3 digest of the canonical string
    pub fn digest(&self, descriptor: &ElementDescriptor) -> String {
        let hash = blake3::hash(self.canonical_string(descriptor).as_bytes());
        let mut hex = hex::encode(hash.as_bytes());
        hex.truncate(self.digest_hex_len);
        hex
    }

    /// `{namespace}.v{version}.{type}-{digest}`
    pub fn deterministic_id(&self, descriptor: &ElementDescriptor) -> String {
        FormatEncoder::deterministic(
            &descriptor.namespace,
            &descriptor.version,
            &descriptor.element_type,
            &self.digest(descriptor),
        )
    }

    /// Produce an id under the requested strategy
    pub fn generate(&self, descriptor: &ElementDescriptor, strategy: &IdStrategy) -> Result<GeneratedId> {
        let generated = match strategy {
            IdStrategy::Standard => GeneratedId {
                id: FormatEncoder::standard(),
                prefix: None,
            },
            IdStrategy::Prefixed { prefix, namespace } => GeneratedId {
                id: FormatEncoder::prefixed(prefix, namespace.as_deref())?,
                prefix: Some(prefix.clone()),
            },
            IdStrategy::Deterministic => GeneratedId {
                id: self.deterministic_id(descriptor),
                prefix: None,
            },
        };
        Ok(generated)
    }
}
