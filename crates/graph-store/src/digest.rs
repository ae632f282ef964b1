//! Canonical JSON and content digests.
//!
//! Records arrive with keys in whatever order the upstream API produced them.
//! Digests are computed over a canonical form so that two records with the same
//! fields always hash identically:
//! - object keys sorted by UTF-16 code units
//! - integer-valued floats written as integers
//! - compact output, SHA-256 hex encoded

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::storage_traits::StorageResult;

/// Content digest (SHA-256 hex string).
///
/// The inner field is private so the string is always 64 lowercase hex
/// characters produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Compute the digest of a JSON value's canonical form.
    pub fn of_json(value: &serde_json::Value) -> StorageResult<Self> {
        let canonical = canonical_json(value)?;
        Ok(Self::from_bytes(canonical.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StoreError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn sort_keys_utf16(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.to_string(), sort_keys_utf16(v));
                }
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(sort_keys_utf16).collect())
        }
        other => other.clone(),
    }
}

fn normalize_numbers(value: &serde_json::Value) -> StorageResult<serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => {
            let mut normalized = serde_json::Map::new();
            for (k, v) in map {
                normalized.insert(k.clone(), normalize_numbers(v)?);
            }
            Ok(serde_json::Value::Object(normalized))
        }
        serde_json::Value::Array(arr) => Ok(serde_json::Value::Array(
            arr.iter()
                .map(normalize_numbers)
                .collect::<StorageResult<Vec<_>>>()?,
        )),
        serde_json::Value::Number(n) if !(n.is_i64() || n.is_u64()) => {
            let Some(f) = n.as_f64() else {
                return Ok(value.clone());
            };
            if !f.is_finite() {
                return Err(StoreError::Canonicalization(
                    "NaN/Infinity not permitted in canonical JSON".to_string(),
                ));
            }
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Ok(serde_json::Value::Number(serde_json::Number::from(f as i64)))
            } else {
                Ok(value.clone())
            }
        }
        other => Ok(other.clone()),
    }
}

/// Convert a JSON value to canonical form: normalize numbers, sort keys, compact.
pub fn canonical_json(value: &serde_json::Value) -> StorageResult<String> {
    let normalized = normalize_numbers(value)?;
    let sorted = sort_keys_utf16(&normalized);
    Ok(serde_json::to_string(&sorted)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_is_key_order_independent() {
        let a = json!({ "login": "octocat", "id": "U_1", "bio": null });
        let b = json!({ "bio": null, "id": "U_1", "login": "octocat" });
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }

    #[test]
    fn test_canonical_json_integer_float() {
        let input = json!({ "stars": 12.0 });
        assert_eq!(canonical_json(&input).unwrap(), r#"{"stars":12}"#);
    }

    #[test]
    fn test_canonical_json_keeps_fractional_float() {
        let input = json!({ "score": 1.5 });
        assert_eq!(canonical_json(&input).unwrap(), r#"{"score":1.5}"#);
    }

    #[test]
    fn test_nested_objects_are_sorted() {
        let input = json!({ "author": { "login": "a", "id": "U_1" }, "body": "x" });
        assert_eq!(
            canonical_json(&input).unwrap(),
            r#"{"author":{"id":"U_1","login":"a"},"body":"x"}"#
        );
    }

    #[test]
    fn test_of_json_differs_when_fields_change() {
        let d1 = ContentDigest::of_json(&json!({ "id": "R_1", "name": "a" })).unwrap();
        let d2 = ContentDigest::of_json(&json!({ "id": "R_1", "name": "b" })).unwrap();
        assert_ne!(d1, d2);
        assert_eq!(d1.as_str().len(), 64);
        assert_eq!(d1.short().len(), 12);
    }

    #[test]
    fn test_try_from_rejects_non_hex() {
        let err = ContentDigest::try_from("not-a-digest".to_string()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDigest { .. }));
    }
}
