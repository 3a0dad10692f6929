//! Identifier grammars
//!
//! Three grammars share the id space:
//!
//! ```text
//! standard       550e8400-e29b-41d4-a716-446655440000
//! prefixed       btn-550e8400-...            com.app.btn-550e8400-...
//! deterministic  app1.v1.0.button-3fa1c09e27bd
//! ```
//!
//! Prefix and type tags are open strings validated by grammar rather than
//! closed enums, so new element kinds need no recompilation.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FormatError;

lazy_static! {
    static ref PREFIX_RE: Regex =
        Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,18}[A-Za-z0-9])?$").unwrap();
    static ref NAMESPACE_RE: Regex = Regex::new(r"^[a-z][a-z0-9_]*(?:\.[a-z][a-z0-9_]*)*$").unwrap();
    static ref ALIAS_RE: Regex = Regex::new(r"^[a-z][a-z0-9_]{2,49}$").unwrap();
    static ref DETERMINISTIC_RE: Regex = Regex::new(
        r"^(?P<ns>[a-z][a-z0-9_]*(?:\.[a-z][a-z0-9_]*)*)\.v(?P<ver>[0-9a-z][0-9a-z._]*)\.(?P<ty>[a-z][a-z0-9_]*)-(?P<digest>[0-9a-f]{8,64})$"
    )
    .unwrap();
    static ref PREFIXED_RE: Regex = Regex::new(
        r"^(?:(?P<ns>[a-z][a-z0-9_]*(?:\.[a-z][a-z0-9_]*)*)\.)?(?P<prefix>[A-Za-z0-9](?:[A-Za-z0-9-]{0,18}[A-Za-z0-9])?)-(?P<uuid>[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})$"
    )
    .unwrap();
}

/// How a new id should be produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdStrategy {
    /// Random 128-bit id
    Standard,
    /// `{prefix}-{uuid}` or `{namespace}.{prefix}-{uuid}`
    Prefixed {
        prefix: String,
        namespace: Option<String>,
    },
    /// Content-addressed from the descriptor
    Deterministic,
}

/// An id broken back into its grammar components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedId {
    Standard {
        uuid: Uuid,
    },
    Prefixed {
        namespace: Option<String>,
        prefix: String,
        uuid: Uuid,
    },
    Deterministic {
        namespace: String,
        version: String,
        element_type: String,
        digest: String,
    },
}

impl ParsedId {
    /// Short grammar name
    pub fn kind(&self) -> &'static str {
        match self {
            ParsedId::Standard { .. } => "standard",
            ParsedId::Prefixed { .. } => "prefixed",
            ParsedId::Deterministic { .. } => "deterministic",
        }
    }
}

/// Wraps digests and random ids into the three grammars and validates them
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatEncoder;

impl FormatEncoder {
    /// A fresh random id
    pub fn standard() -> String {
        Uuid::new_v4().to_string()
    }

    /// A random id behind a validated prefix and optional namespace
    pub fn prefixed(prefix: &str, namespace: Option<&str>) -> Result<String, FormatError> {
        Self::validate_prefix(prefix)?;
        let standard = Self::standard();
        match namespace {
            Some(ns) => {
                Self::validate_namespace(ns)?;
                Ok(format!("{}.{}-{}", ns, prefix, standard))
            }
            None => Ok(format!("{}-{}", prefix, standard)),
        }
    }

    /// `{namespace}.v{version}.{type}-{digest}` with each segment normalized
    pub fn deterministic(namespace: &str, version: &str, element_type: &str, digest: &str) -> String {
        format!(
            "{}.v{}.{}-{}",
            normalize_namespace(namespace),
            normalize_version(version),
            normalize_type(element_type),
            digest
        )
    }

    pub fn validate_prefix(prefix: &str) -> Result<(), FormatError> {
        if PREFIX_RE.is_match(prefix) {
            Ok(())
        } else {
            Err(FormatError::InvalidPrefix(prefix.to_string()))
        }
    }

    pub fn validate_namespace(namespace: &str) -> Result<(), FormatError> {
        if NAMESPACE_RE.is_match(namespace) {
            Ok(())
        } else {
            Err(FormatError::InvalidNamespace(namespace.to_string()))
        }
    }

    pub fn validate_alias(alias: &str) -> Result<(), FormatError> {
        if ALIAS_RE.is_match(alias) {
            Ok(())
        } else {
            Err(FormatError::InvalidAlias(alias.to_string()))
        }
    }

    /// Recognise which grammar produced `id`
    pub fn parse(id: &str) -> Result<ParsedId, FormatError> {
        if let Some(caps) = DETERMINISTIC_RE.captures(id) {
            return Ok(ParsedId::Deterministic {
                namespace: caps["ns"].to_string(),
                version: caps["ver"].to_string(),
                element_type: caps["ty"].to_string(),
                digest: caps["digest"].to_string(),
            });
        }

        if let Some(caps) = PREFIXED_RE.captures(id) {
            let uuid = Uuid::parse_str(&caps["uuid"])
                .map_err(|_| FormatError::MalformedId(id.to_string()))?;
            return Ok(ParsedId::Prefixed {
                namespace: caps.name("ns").map(|m| m.as_str().to_string()),
                prefix: caps["prefix"].to_string(),
                uuid,
            });
        }

        // Only the canonical lowercase hyphenated form is accepted
        match Uuid::parse_str(id) {
            Ok(uuid) if uuid.hyphenated().to_string() == id => Ok(ParsedId::Standard { uuid }),
            _ => Err(FormatError::MalformedId(id.to_string())),
        }
    }

    pub fn is_valid(id: &str) -> bool {
        Self::parse(id).is_ok()
    }
}

/// Lowercase dotted segments; anything else becomes `_`
pub(crate) fn normalize_namespace(namespace: &str) -> String {
    let segments: Vec<String> = namespace
        .trim()
        .split('.')
        .map(normalize_segment)
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        "default".to_string()
    } else {
        segments.join(".")
    }
}

pub(crate) fn normalize_version(version: &str) -> String {
    let version = version.trim();
    let version = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);

    let normalized: String = version
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('0'..='9' | 'a'..='z' | '.' | '_') => c,
            _ => '_',
        })
        .collect();

    match normalized.chars().next() {
        None => "0".to_string(),
        Some(c) if c.is_ascii_alphanumeric() => normalized,
        Some(_) => format!("0{}", normalized),
    }
}

pub(crate) fn normalize_type(element_type: &str) -> String {
    let normalized = normalize_segment(element_type);
    if normalized.is_empty() {
        "element".to_string()
    } else {
        normalized
    }
}

fn normalize_segment(segment: &str) -> String {
    let mut out: String = segment
        .trim()
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('0'..='9' | 'a'..='z') => c,
            _ => '_',
        })
        .collect();

    if out.chars().all(|c| c == '_') {
        return String::new();
    }
    if !out.starts_with(|c: char| c.is_ascii_lowercase()) {
        out.insert(0, 'e');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_parses_back() {
        let id = FormatEncoder::standard();
        assert!(matches!(FormatEncoder::parse(&id), Ok(ParsedId::Standard { .. })));
    }

    #[test]
    fn test_prefixed_with_and_without_namespace() {
        let id = FormatEncoder::prefixed("btn", None).unwrap();
        assert!(id.starts_with("btn-"));
        match FormatEncoder::parse(&id).unwrap() {
            ParsedId::Prefixed { namespace, prefix, .. } => {
                assert_eq!(namespace, None);
                assert_eq!(prefix, "btn");
            }
            other => panic!("unexpected {:?}", other),
        }

        let id = FormatEncoder::prefixed("Nav-Item2", Some("com.example")).unwrap();
        match FormatEncoder::parse(&id).unwrap() {
            ParsedId::Prefixed { namespace, prefix, .. } => {
                assert_eq!(namespace.as_deref(), Some("com.example"));
                assert_eq!(prefix, "Nav-Item2");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_prefix_grammar() {
        assert!(FormatEncoder::validate_prefix("a").is_ok());
        assert!(FormatEncoder::validate_prefix("abcdefghij0123456789").is_ok());
        assert!(FormatEncoder::validate_prefix("abcdefghij01234567890").is_err());
        assert!(FormatEncoder::validate_prefix("-btn").is_err());
        assert!(FormatEncoder::validate_prefix("btn-").is_err());
        assert!(FormatEncoder::validate_prefix("b_n").is_err());
        assert!(FormatEncoder::validate_prefix("").is_err());
    }

    #[test]
    fn test_namespace_grammar() {
        assert!(FormatEncoder::validate_namespace("com.example.app").is_ok());
        assert!(FormatEncoder::validate_namespace("Com.Example").is_err());
        assert!(FormatEncoder::validate_namespace("com..app").is_err());
        assert!(FormatEncoder::prefixed("btn", Some("Bad NS")).is_err());
    }

    #[test]
    fn test_alias_grammar() {
        assert!(FormatEncoder::validate_alias("submit_btn").is_ok());
        assert!(FormatEncoder::validate_alias("ab").is_err());
        assert!(FormatEncoder::validate_alias("1abc").is_err());
        assert!(FormatEncoder::validate_alias("Submit").is_err());
        assert!(FormatEncoder::validate_alias(&"a".repeat(51)).is_err());
        assert!(FormatEncoder::validate_alias(&"a".repeat(50)).is_ok());
    }

    #[test]
    fn test_deterministic_format_and_parse() {
        let id = FormatEncoder::deterministic("app1", "1.0", "button", "0123456789ab");
        assert_eq!(id, "app1.v1.0.button-0123456789ab");

        match FormatEncoder::parse(&id).unwrap() {
            ParsedId::Deterministic {
                namespace,
                version,
                element_type,
                digest,
            } => {
                assert_eq!(namespace, "app1");
                assert_eq!(version, "1.0");
                assert_eq!(element_type, "button");
                assert_eq!(digest, "0123456789ab");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_deterministic_normalizes_segments() {
        let id = FormatEncoder::deterministic("Com.Example App", "V2.1-beta", "Image View", "deadbeefcafe");
        assert_eq!(id, "com.example_app.v2.1_beta.image_view-deadbeefcafe");
        assert!(FormatEncoder::is_valid(&id));

        let id = FormatEncoder::deterministic("", "", "", "deadbeefcafe");
        assert_eq!(id, "default.v0.element-deadbeefcafe");
        assert!(FormatEncoder::is_valid(&id));
    }

    #[test]
    fn test_malformed_ids() {
        assert!(FormatEncoder::parse("").is_err());
        assert!(FormatEncoder::parse("not an id").is_err());
        assert!(FormatEncoder::parse("app1.v1.button-XYZ").is_err());
        assert!(FormatEncoder::parse("550E8400-E29B-41D4-A716-446655440000").is_err());
    }
}
