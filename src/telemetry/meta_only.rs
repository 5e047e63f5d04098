//! Meta-only contract for anything that leaves the process as telemetry.
//!
//! A record must be a shallow JSON object of scalars: no arrays (candidate
//! lists), no long strings (document text), no identifier-bearing or
//! secret-bearing keys. The check runs on the serialized form, so it covers
//! whatever a future field addition would actually emit.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::core::errors::{GuardError, Result};

/// Keys that may never appear at any depth.
pub const BANNED_KEYS: &[&str] = &[
    "raw_text",
    "prompt",
    "messages",
    "document_body",
    "input_text",
    "output_text",
    "database_url",
    "private_key",
    "signing_key",
    "seed",
    "routing_seed",
    "doc_id",
    "query",
];

static KEY_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").ok());

/// Structural limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaOnlyLimits {
    /// Deepest allowed nesting.
    pub max_depth: usize,
    /// Longest allowed string value, in bytes.
    pub max_string_bytes: usize,
    /// Most keys allowed in one object.
    pub max_keys: usize,
}

impl Default for MetaOnlyLimits {
    fn default() -> Self {
        Self {
            max_depth: 4,
            max_string_bytes: 512,
            max_keys: 64,
        }
    }
}

/// First rule a value broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Root is not a JSON object.
    Root,
    Depth { path: String },
    StringTooLong { path: String, bytes: usize },
    ArrayForbidden { path: String },
    TooManyKeys { path: String, keys: usize },
    BannedKey { path: String },
    InvalidKey { path: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "META_ONLY_ROOT"),
            Self::Depth { path } => write!(f, "META_ONLY_DEPTH at {path}"),
            Self::StringTooLong { path, bytes } => {
                write!(f, "META_ONLY_STRING_TOO_LONG at {path} ({bytes} bytes)")
            }
            Self::ArrayForbidden { path } => write!(f, "META_ONLY_ARRAY_FORBIDDEN at {path}"),
            Self::TooManyKeys { path, keys } => {
                write!(f, "META_ONLY_TOO_MANY_KEYS at {path} ({keys} keys)")
            }
            Self::BannedKey { path } => write!(f, "META_ONLY_BANNED_KEY at {path}"),
            Self::InvalidKey { path } => write!(f, "META_ONLY_INVALID_KEY at {path}"),
        }
    }
}

/// Check a JSON value against the default limits.
pub fn assert_meta_only(value: &Value) -> Result<()> {
    check(value, MetaOnlyLimits::default()).map_err(|violation| GuardError::MetaOnlyViolation {
        violation: violation.to_string(),
    })
}

/// Serialize `record` and check it. Returns the checked value.
pub fn to_meta_only_value<T: Serialize>(record: &T) -> Result<Value> {
    let value = serde_json::to_value(record)?;
    assert_meta_only(&value)?;
    Ok(value)
}

/// Check a JSON value against explicit limits.
pub fn check(value: &Value, limits: MetaOnlyLimits) -> std::result::Result<(), Violation> {
    if !value.is_object() {
        return Err(Violation::Root);
    }
    walk(value, 0, "$", limits)
}

fn walk(value: &Value, depth: usize, path: &str, limits: MetaOnlyLimits) -> std::result::Result<(), Violation> {
    if depth > limits.max_depth {
        return Err(Violation::Depth {
            path: path.to_string(),
        });
    }
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
        Value::String(s) => {
            if s.len() > limits.max_string_bytes {
                Err(Violation::StringTooLong {
                    path: path.to_string(),
                    bytes: s.len(),
                })
            } else {
                Ok(())
            }
        }
        Value::Array(_) => Err(Violation::ArrayForbidden {
            path: path.to_string(),
        }),
        Value::Object(map) => {
            if map.len() > limits.max_keys {
                return Err(Violation::TooManyKeys {
                    path: path.to_string(),
                    keys: map.len(),
                });
            }
            for (key, child) in map {
                let child_path = format!("{path}.{key}");
                if BANNED_KEYS.contains(&key.as_str()) {
                    return Err(Violation::BannedKey { path: child_path });
                }
                let key_ok = KEY_PATTERN
                    .as_ref()
                    .is_some_and(|pattern| pattern.is_match(key));
                if !key_ok {
                    return Err(Violation::InvalidKey { path: child_path });
                }
                walk(child, depth + 1, &child_path, limits)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn violation(value: &Value) -> Violation {
        check(value, MetaOnlyLimits::default()).expect_err("expected violation")
    }

    #[test]
    fn flat_scalar_object_passes() {
        let value = json!({"mode": "enforce", "k": 20, "gate_allow": true, "x": null, "ratio": 0.25});
        assert!(assert_meta_only(&value).is_ok());
    }

    #[test]
    fn root_must_be_object() {
        assert_eq!(violation(&json!([1, 2])), Violation::Root);
        assert_eq!(violation(&json!("text")), Violation::Root);
        assert_eq!(violation(&Value::Null), Violation::Root);
    }

    #[test]
    fn arrays_are_forbidden_anywhere() {
        assert!(matches!(
            violation(&json!({"canary": {"ids": []}})),
            Violation::ArrayForbidden { .. }
        ));
    }

    #[test]
    fn banned_keys_are_rejected_at_any_depth() {
        for key in ["doc_id", "query", "seed", "raw_text", "prompt"] {
            let nested = json!({"outer": {key: 1}});
            assert!(
                matches!(violation(&nested), Violation::BannedKey { .. }),
                "{key}"
            );
        }
    }

    #[test]
    fn key_shape_is_enforced() {
        for key in ["DocId", "1st", "has-dash", "", "with space"] {
            assert!(
                matches!(violation(&json!({key: 1})), Violation::InvalidKey { .. }),
                "{key:?}"
            );
        }
    }

    #[test]
    fn long_strings_are_rejected() {
        let long = "x".repeat(513);
        assert!(matches!(
            violation(&json!({"details": long})),
            Violation::StringTooLong { bytes: 513, .. }
        ));
        assert!(assert_meta_only(&json!({"details": "x".repeat(512)})).is_ok());
    }

    #[test]
    fn depth_limit() {
        // Values at depth 4 pass, depth 5 fails.
        let ok = json!({"a": {"b": {"c": {"d": 1}}}});
        assert!(assert_meta_only(&ok).is_ok());
        let deep = json!({"a": {"b": {"c": {"d": {"e": 1}}}}});
        assert!(matches!(violation(&deep), Violation::Depth { .. }));
    }

    #[test]
    fn key_count_limit() {
        let map: serde_json::Map<String, Value> =
            (0..65).map(|i| (format!("k{i}"), Value::from(i))).collect();
        assert!(matches!(
            violation(&Value::Object(map)),
            Violation::TooManyKeys { keys: 65, .. }
        ));
    }

    #[test]
    fn error_carries_gtb_code() {
        let err = assert_meta_only(&json!({"doc_id": "d1"})).unwrap_err();
        assert_eq!(err.code(), "GTB-2201");
        assert!(err.to_string().contains("META_ONLY_BANNED_KEY"));
    }
}
