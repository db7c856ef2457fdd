// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! Canonical JSON serialization (ADR-0101): object keys in lexicographic
//! order, no floating-point numbers, no whitespace, no duplicate keys.
//!
//! Two entry points, because duplicate keys can only be detected while
//! parsing raw bytes (by the time a document is a [`serde_json::Value`],
//! any duplicates have already been silently collapsed by the parser):
//!
//! - [`canonicalize_value`] / [`hash_value`] — for values this workspace
//!   already built from typed Rust structs, where duplicate keys cannot
//!   occur.
//! - [`parse_canonical_bytes`] / [`hash_canonical_bytes`] — for untrusted
//!   JSON text read from disk (contracts, sidecar files), which does
//!   reject duplicate keys.

mod raw;

use sappp_error::{CoreError, CoreResult, ErrorCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A `sha256:`-prefixed content hash, as used for every addressable object
/// in the store (NIR units, POs, certificates, contracts).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(transparent)]
pub struct CertHash(String);

impl CertHash {
    const PREFIX: &'static str = "sha256:";

    /// Build a [`CertHash`] from a raw 32-byte SHA-256 digest.
    #[must_use]
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(format!("{}{}", Self::PREFIX, hex_encode(digest)))
    }

    /// The full `sha256:<hex>` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex digest with the `sha256:` prefix stripped, if present.
    #[must_use]
    pub fn hex(&self) -> &str {
        self.0.strip_prefix(Self::PREFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for CertHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CertHash {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix(Self::PREFIX).unwrap_or(s);
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoreError::new(
                ErrorCode::ParseError,
                "not a valid sha256 hash",
            )
            .with_context("value", s));
        }
        Ok(Self(format!("{}{}", Self::PREFIX, hex.to_ascii_lowercase())))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Recursively validate that `value` contains no floating-point numbers,
/// returning [`ErrorCode::FloatInCanonical`] with a JSON-pointer-style
/// `path` context entry on the first violation found.
fn validate_no_float(value: &serde_json::Value, path: &str) -> CoreResult<()> {
    match value {
        serde_json::Value::Number(n) if n.is_f64() => Err(CoreError::new(
            ErrorCode::FloatInCanonical,
            "floating point numbers are not allowed in canonical JSON",
        )
        .with_context("path", path)),
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                validate_no_float(v, &format!("{path}.{k}"))?;
            }
            Ok(())
        }
        serde_json::Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                validate_no_float(v, &format!("{path}[{i}]"))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Serialize `value` to its canonical byte form: validated against floats,
/// with object keys in lexicographic order (guaranteed by `serde_json`'s
/// default `BTreeMap`-backed `Map`) and no whitespace.
///
/// # Errors
///
/// Returns [`ErrorCode::FloatInCanonical`] if any number in `value` is a
/// float, or [`ErrorCode::InternalError`] if serialization itself fails
/// (which should not happen for a value already constructed in memory).
pub fn canonicalize_value(value: &serde_json::Value) -> CoreResult<Vec<u8>> {
    validate_no_float(value, "$")?;
    serde_json::to_vec(value)
        .map_err(|e| CoreError::new(ErrorCode::InternalError, "failed to serialize canonical value").with_source(e))
}

/// Like [`canonicalize_value`] but returns a `String`.
///
/// # Errors
///
/// See [`canonicalize_value`].
pub fn canonicalize_to_string(value: &serde_json::Value) -> CoreResult<String> {
    let bytes = canonicalize_value(value)?;
    String::from_utf8(bytes)
        .map_err(|e| CoreError::new(ErrorCode::InternalError, "canonical bytes were not valid utf-8").with_source(e))
}

/// Hash a value already known to be duplicate-key-free (built from a typed
/// Rust struct via `serde_json::to_value`).
///
/// # Errors
///
/// See [`canonicalize_value`].
pub fn hash_value(value: &serde_json::Value) -> CoreResult<CertHash> {
    let bytes = canonicalize_value(value)?;
    Ok(CertHash::from_digest(&Sha256::digest(&bytes)))
}

/// Parse raw JSON bytes into a canonical [`serde_json::Value`], rejecting
/// duplicate object keys and floating-point numbers.
///
/// Use this for any JSON read from outside this workspace's own
/// serialization (contract sidecar files, inline annotation bodies,
/// specdb snapshots) where duplicate keys are a real possibility.
///
/// # Errors
///
/// Returns [`ErrorCode::ParseError`] if `bytes` is not valid JSON,
/// [`ErrorCode::DuplicateKey`] if any object repeats a key, and
/// [`ErrorCode::FloatInCanonical`] if any number is a float.
pub fn parse_canonical_bytes(bytes: &[u8]) -> CoreResult<serde_json::Value> {
    let raw: raw::RawValue = serde_json::from_slice(bytes)
        .map_err(|e| CoreError::new(ErrorCode::ParseError, "invalid JSON").with_source(e))?;
    raw::into_canonical(raw, "$")
}

/// Parse and hash raw JSON bytes in one step. See [`parse_canonical_bytes`].
///
/// # Errors
///
/// See [`parse_canonical_bytes`].
pub fn hash_canonical_bytes(bytes: &[u8]) -> CoreResult<CertHash> {
    let value = parse_canonical_bytes(bytes)?;
    hash_value(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_in_output() {
        let v = json!({"b": 1, "a": 2, "c": {"z": 1, "y": 2}});
        let s = canonicalize_to_string(&v).unwrap();
        assert_eq!(s, r#"{"a":2,"b":1,"c":{"y":2,"z":1}}"#);
    }

    #[test]
    fn floats_are_rejected() {
        let v = json!({"a": 1.5});
        let err = canonicalize_value(&v).unwrap_err();
        assert_eq!(err.code, ErrorCode::FloatInCanonical);
    }

    #[test]
    fn integral_floats_in_json_number_form_are_still_rejected() {
        // serde_json parses "1.0" as an f64-backed Number even though it is integral.
        let v: serde_json::Value = serde_json::from_str(r#"{"a": 1.0}"#).unwrap();
        let err = canonicalize_value(&v).unwrap_err();
        assert_eq!(err.code, ErrorCode::FloatInCanonical);
    }

    #[test]
    fn duplicate_keys_are_rejected_from_raw_bytes() {
        let bytes = br#"{"a": 1, "a": 2}"#;
        let err = parse_canonical_bytes(bytes).unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateKey);
    }

    #[test]
    fn nested_duplicate_keys_are_rejected() {
        let bytes = br#"{"outer": {"a": 1, "b": 2, "a": 3}}"#;
        let err = parse_canonical_bytes(bytes).unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateKey);
    }

    #[test]
    fn hash_is_deterministic_and_order_independent() {
        let v1 = json!({"a": 1, "b": 2});
        let v2 = json!({"b": 2, "a": 1});
        assert_eq!(hash_value(&v1).unwrap(), hash_value(&v2).unwrap());
    }

    #[test]
    fn cert_hash_roundtrips_through_string() {
        let h = hash_value(&json!({"x": 1})).unwrap();
        let parsed: CertHash = h.as_str().parse().unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn cert_hash_rejects_malformed_input() {
        assert!("sha256:not-hex".parse::<CertHash>().is_err());
        assert!("sha256:deadbeef".parse::<CertHash>().is_err());
    }

    proptest::proptest! {
        #[test]
        fn canonicalization_is_idempotent(s in "[a-z]{1,8}", n in 0i64..1000) {
            let v = json!({ s.clone(): n });
            let once = canonicalize_to_string(&v).unwrap();
            let reparsed: serde_json::Value = serde_json::from_str(&once).unwrap();
            let twice = canonicalize_to_string(&reparsed).unwrap();
            proptest::prop_assert_eq!(once, twice);
        }
    }
}
