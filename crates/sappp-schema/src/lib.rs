// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! Runtime JSON Schema registry, keyed by the `schema_version` strings
//! every persisted document carries.
//!
//! Schemas are derived from the workspace's own Rust types via
//! `schemars::schema_for!`, so there is never a hand-maintained schema
//! file to drift out of sync with what actually gets serialized.
//! Validation compiles each schema once (cached behind a [`OnceLock`]
//! per name) via [`jsonschema::validator_for`] and reports every
//! violation as a `"/path: description"` line.

use sappp_error::{CoreError, CoreResult, ErrorCode};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Every `schema_version` tag this registry knows how to validate.
///
/// Closed: an unrecognized name is [`ErrorCode::SchemaInvalid`], not a
/// silently-skipped check. Grows as the remaining data-model crates
/// (`sappp-config`, `sappp-validator`, `sappp-diff`) land; for now this
/// covers every document kind already defined in the workspace.
pub const KNOWN_SCHEMAS: &[&str] = &[
    "nir.v1",
    "po.v1",
    "cert.v1",
    "cert_index.v1",
    "specdb_snapshot.v1",
    "unknown.v1",
    "analysis_config.v1",
];

fn schema_value_for(name: &str) -> Option<serde_json::Value> {
    let schema = match name {
        "nir.v1" => schemars::schema_for!(sappp_nir::Nir),
        "po.v1" => schemars::schema_for!(sappp_po::PoList),
        "cert.v1" => schemars::schema_for!(sappp_cert::Certificate),
        "cert_index.v1" => schemars::schema_for!(sappp_cert::IndexEntry),
        "specdb_snapshot.v1" => schemars::schema_for!(sappp_specdb::SpecdbSnapshot),
        "unknown.v1" => schemars::schema_for!(sappp_unknown::UnknownLedger),
        "analysis_config.v1" => schemars::schema_for!(sappp_config::AnalysisConfig),
        _ => return None,
    };
    Some(serde_json::to_value(schema).expect("schemars output always serializes"))
}

/// Look up the JSON Schema document for a known `schema_version` name.
///
/// Returns `None` for a name not in [`KNOWN_SCHEMAS`].
#[must_use]
pub fn schema_for_name(name: &str) -> Option<serde_json::Value> {
    schema_value_for(name)
}

fn cache() -> &'static Mutex<BTreeMap<&'static str, Arc<jsonschema::Validator>>> {
    static CACHE: OnceLock<Mutex<BTreeMap<&'static str, Arc<jsonschema::Validator>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(BTreeMap::new()))
}

fn compiled_validator(name: &'static str) -> CoreResult<Arc<jsonschema::Validator>> {
    let mut guard = cache().lock().expect("schema cache mutex poisoned");
    if let Some(validator) = guard.get(name) {
        return Ok(Arc::clone(validator));
    }
    let schema = schema_value_for(name)
        .ok_or_else(|| CoreError::new(ErrorCode::SchemaInvalid, format!("unknown schema name '{name}'")))?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| CoreError::new(ErrorCode::SchemaInvalid, format!("failed to compile schema '{name}'")).with_context("detail", e.to_string()))?;
    let validator = Arc::new(validator);
    guard.insert(name, Arc::clone(&validator));
    Ok(validator)
}

/// Format every violation of `value` against `validator` as one
/// `"/path: description"` line per error, newline-joined.
fn format_errors(validator: &jsonschema::Validator, value: &serde_json::Value) -> String {
    validator
        .iter_errors(value)
        .map(|e| {
            let path = e.instance_path.to_string();
            let path = if path.is_empty() { "/".to_string() } else { path };
            format!("{path}: {e}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Validate `value` against the named schema.
///
/// # Errors
///
/// [`ErrorCode::SchemaInvalid`] if `name` is not in [`KNOWN_SCHEMAS`], if
/// the schema itself fails to compile, or if `value` violates the
/// schema (the violation list is attached as the `details` context key).
pub fn validate(value: &serde_json::Value, name: &str) -> CoreResult<()> {
    let name = KNOWN_SCHEMAS
        .iter()
        .find(|&&k| k == name)
        .copied()
        .ok_or_else(|| CoreError::new(ErrorCode::SchemaInvalid, format!("unknown schema name '{name}'")))?;
    let validator = compiled_validator(name)?;
    if validator.is_valid(value) {
        return Ok(());
    }
    let details = format_errors(&validator, value);
    Err(CoreError::new(ErrorCode::SchemaInvalid, format!("value does not conform to schema '{name}'"))
        .with_context("schema", name)
        .with_context("details", details))
}

/// Validate `value` against a JSON Schema document the caller already
/// derived with its own `schemars::schema_for!`.
///
/// This is the escape hatch for document kinds whose defining type lives
/// in a crate downstream of this one in the dependency graph
/// (`sappp-validator`'s `validated_results.v1`, `sappp-diff`'s `diff.v1`,
/// `sappp-cli`'s `build_snapshot.v1`) — putting them in [`KNOWN_SCHEMAS`]
/// would mean this crate depending on theirs, which already depend on
/// this one (`sappp-validator` re-validates `cert_index.v1` entries
/// through [`validate`] during its own 8-step check). The schema is still
/// derived from the one real Rust type, just not compiled or cached by
/// this crate.
///
/// # Errors
///
/// [`ErrorCode::SchemaInvalid`] if `schema` itself fails to compile, or
/// if `value` violates it (the violation list is attached as the
/// `details` context key).
pub fn validate_value(value: &serde_json::Value, name: &str, schema: &serde_json::Value) -> CoreResult<()> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| CoreError::new(ErrorCode::SchemaInvalid, format!("failed to compile schema '{name}'")).with_context("detail", e.to_string()))?;
    if validator.is_valid(value) {
        return Ok(());
    }
    let details = format_errors(&validator, value);
    Err(CoreError::new(ErrorCode::SchemaInvalid, format!("value does not conform to schema '{name}'"))
        .with_context("schema", name)
        .with_context("details", details))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_schemas_are_all_resolvable() {
        for name in KNOWN_SCHEMAS {
            assert!(schema_for_name(name).is_some(), "missing schema for {name}");
        }
    }

    #[test]
    fn unknown_schema_name_is_rejected() {
        let err = validate(&json!({}), "not_a_real_schema").unwrap_err();
        assert_eq!(err.code, ErrorCode::SchemaInvalid);
    }

    #[test]
    fn valid_cert_index_entry_passes() {
        let entry = json!({
            "schema_version": "cert_index.v1",
            "po_id": "sha256:aa",
            "root": "sha256:bb",
        });
        assert!(validate(&entry, "cert_index.v1").is_ok());
    }

    #[test]
    fn invalid_cert_index_entry_fails_with_details() {
        let entry = json!({"schema_version": "cert_index.v1"});
        let err = validate(&entry, "cert_index.v1").unwrap_err();
        assert_eq!(err.code, ErrorCode::SchemaInvalid);
        assert!(err.context.contains_key("details"));
        assert!(!err.context["details"].is_empty());
    }

    #[test]
    fn validate_value_checks_against_a_caller_supplied_schema() {
        #[derive(schemars::JsonSchema)]
        struct Widget {
            #[allow(dead_code)]
            name: String,
        }
        let schema = serde_json::to_value(schemars::schema_for!(Widget)).unwrap();
        assert!(validate_value(&json!({"name": "a"}), "widget.v1", &schema).is_ok());
        let err = validate_value(&json!({}), "widget.v1", &schema).unwrap_err();
        assert_eq!(err.code, ErrorCode::SchemaInvalid);
        assert!(err.context.contains_key("details"));
    }

    #[test]
    fn compiled_validator_is_reused_across_calls() {
        let entry = json!({
            "schema_version": "cert_index.v1",
            "po_id": "sha256:aa",
            "root": "sha256:bb",
        });
        assert!(validate(&entry, "cert_index.v1").is_ok());
        assert!(validate(&entry, "cert_index.v1").is_ok());
    }
}
