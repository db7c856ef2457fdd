// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! SpecDB: external-code behavior contracts merged from sidecar JSON files
//! and inline `//@sappp contract {...}` source annotations.

use sappp_canon::CertHash;
use sappp_error::{CoreError, CoreResult, ErrorCode};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

const ANNOTATION_PREFIX: &str = "//@sappp";
const ANNOTATION_CONTRACT: &str = "contract";

/// A contract's applicability scope: which library version and build
/// conditions it was written against, plus a tie-break priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VersionScope {
    /// ABI identifier the contract was written against, if constrained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi: Option<String>,
    /// Library version the contract was written against, if constrained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_version: Option<String>,
    /// Manual tie-break priority; higher wins among otherwise-equal matches.
    #[serde(default)]
    pub priority: i64,
    /// Build conditions that must all be active for this contract to
    /// apply (e.g. feature flags), sorted for deterministic comparison.
    #[serde(default)]
    pub conditions: Vec<String>,
}

impl Default for VersionScope {
    fn default() -> Self {
        Self {
            abi: None,
            library_version: None,
            priority: 0,
            conditions: Vec::new(),
        }
    }
}

/// The external call target a contract describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Target {
    /// Stable unique identifier (USR) of the target function.
    pub usr: String,
}

/// A single normalized external-code behavior contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Contract {
    /// Contract schema version (`"contract_ir.v1"`).
    pub schema_version: String,
    /// Content-addressed identifier, computed from every other field.
    pub contract_id: CertHash,
    /// The call target this contract describes.
    pub target: Target,
    /// Specificity tier (`"exact"`, `"family"`, `"pattern"`, ...), used as
    /// the primary sort key ahead of `version_scope`.
    pub tier: String,
    /// Applicability scope.
    pub version_scope: VersionScope,
    /// The contract body itself (pre/post conditions), opaque to this crate.
    pub contract: serde_json::Value,
}

fn normalize_version_scope(value: Option<serde_json::Value>) -> CoreResult<VersionScope> {
    let Some(value) = value else {
        return Ok(VersionScope::default());
    };
    if !value.is_object() {
        return Err(CoreError::new(
            ErrorCode::InvalidContract,
            "version_scope must be an object",
        ));
    }
    let mut scope: VersionScope = serde_json::from_value(value)
        .map_err(|e| CoreError::new(ErrorCode::InvalidContract, "invalid version_scope shape").with_source(e))?;
    scope.conditions.sort();
    Ok(scope)
}

/// Normalize one raw contract document (from a sidecar file entry or an
/// inline annotation body) into a validated, content-addressed [`Contract`].
///
/// Fills in `schema_version` and `version_scope` defaults and computes
/// `contract_id` if absent, as the hash of
/// `{schema_version: "contract_ir.v1", target, tier, version_scope, contract}`.
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidContract`] if `input` is not an object, is
/// missing `target`/`tier`/`contract`, or has a malformed `version_scope`.
pub fn normalize_contract_ir(input: serde_json::Value) -> CoreResult<Contract> {
    let serde_json::Value::Object(mut map) = input else {
        return Err(CoreError::new(
            ErrorCode::InvalidContract,
            "contract_ir entry must be an object",
        ));
    };

    let schema_version = map
        .remove("schema_version")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "contract_ir.v1".to_string());

    let version_scope = normalize_version_scope(map.remove("version_scope"))?;

    let target_value = map
        .remove("target")
        .ok_or_else(|| CoreError::new(ErrorCode::InvalidContract, "contract is missing 'target'"))?;
    let target: Target = serde_json::from_value(target_value)
        .map_err(|e| CoreError::new(ErrorCode::InvalidContract, "invalid target shape").with_source(e))?;

    let tier = map
        .remove("tier")
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| CoreError::new(ErrorCode::InvalidContract, "contract is missing 'tier'"))?;

    let contract_body = map
        .remove("contract")
        .ok_or_else(|| CoreError::new(ErrorCode::InvalidContract, "contract is missing 'contract'"))?;

    let contract_id = match map.remove("contract_id") {
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| CoreError::new(ErrorCode::InvalidContract, "contract_id must be a string"))?;
            s.parse()?
        }
        None => {
            let hash_input = serde_json::json!({
                "schema_version": "contract_ir.v1",
                "target": target,
                "tier": tier,
                "version_scope": version_scope,
                "contract": contract_body,
            });
            sappp_canon::hash_value(&hash_input)?
        }
    };

    Ok(Contract {
        schema_version,
        contract_id,
        target,
        tier,
        version_scope,
        contract: contract_body,
    })
}

/// Normalize a whole SpecDB document, which may be a single contract
/// object, a bare array of contracts, or a `{"schema_version":
/// "specdb_snapshot.v1", "contracts": [...]}` wrapper, or a
/// `{"contracts": [...]}` wrapper without the snapshot tag.
///
/// # Errors
///
/// See [`normalize_contract_ir`].
pub fn normalize_contract_document(input: serde_json::Value) -> CoreResult<Vec<Contract>> {
    match input {
        serde_json::Value::Array(items) => items.into_iter().map(normalize_contract_ir).collect(),
        serde_json::Value::Object(map) => {
            if let Some(contracts) = map.get("contracts") {
                let contracts = contracts.clone();
                let serde_json::Value::Array(items) = contracts else {
                    return Err(CoreError::new(ErrorCode::InvalidContract, "'contracts' must be an array"));
                };
                items.into_iter().map(normalize_contract_ir).collect()
            } else {
                Ok(vec![normalize_contract_ir(serde_json::Value::Object(map))?])
            }
        }
        _ => Err(CoreError::new(
            ErrorCode::InvalidContract,
            "SpecDB entry must be an object or array",
        )),
    }
}

/// Load every sidecar contract file from `spec_dir`: every `*.json` file
/// except `snapshot.json`, in sorted path order.
///
/// # Errors
///
/// Returns [`ErrorCode::IoError`] if `spec_dir` cannot be read, or
/// [`ErrorCode::ParseError`]/[`ErrorCode::InvalidContract`] if any file's
/// contents are malformed.
pub fn load_sidecar_contracts(spec_dir: &Path) -> CoreResult<Vec<Contract>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(spec_dir)
        .map_err(|e| CoreError::new(ErrorCode::IoError, "failed to read SpecDB directory").with_source(e))?
    {
        let entry = entry.map_err(|e| CoreError::new(ErrorCode::IoError, "failed to read directory entry").with_source(e))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if path.file_name().and_then(|n| n.to_str()) == Some("snapshot.json") {
            continue;
        }
        paths.push(path);
    }
    paths.sort();

    let mut contracts = Vec::new();
    for path in paths {
        let bytes = std::fs::read(&path)
            .map_err(|e| CoreError::new(ErrorCode::IoError, "failed to read SpecDB sidecar file").with_source(e))?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::new(ErrorCode::ParseError, "invalid JSON in SpecDB sidecar file").with_source(e))?;
        contracts.extend(normalize_contract_document(value)?);
    }
    Ok(contracts)
}

/// Scan one source file for `//@sappp contract {...}` annotations and
/// return every contract found, line by line, in file order.
///
/// # Errors
///
/// Returns [`ErrorCode::IoError`] if `path` cannot be read, and
/// [`ErrorCode::InvalidContract`] if an annotation's payload is empty.
pub fn scan_annotations(path: &Path) -> CoreResult<Vec<Contract>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CoreError::new(ErrorCode::IoError, "failed to read annotated source file").with_source(e))?;
    let mut contracts = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let Some(pos) = line.find(ANNOTATION_PREFIX) else {
            continue;
        };
        let tail = line[pos + ANNOTATION_PREFIX.len()..].trim_start();
        let Some(rest) = tail.strip_prefix(ANNOTATION_CONTRACT) else {
            continue;
        };
        let payload = rest.trim();
        if payload.is_empty() {
            return Err(CoreError::new(ErrorCode::InvalidContract, "empty contract annotation")
                .with_context("file", path.display().to_string())
                .with_context("line", (line_no + 1).to_string()));
        }
        let value = sappp_canon::parse_canonical_bytes(payload.as_bytes())
            .or_else(|_| {
                serde_json::from_str::<serde_json::Value>(payload)
                    .map_err(|e| CoreError::new(ErrorCode::ParseError, "invalid contract annotation JSON").with_source(e))
            })?;
        if !value.is_object() {
            return Err(CoreError::new(ErrorCode::InvalidContract, "contract annotation must be a JSON object"));
        }
        contracts.push(normalize_contract_ir(value)?);
    }
    Ok(contracts)
}

fn dedupe(contracts: Vec<Contract>) -> Vec<Contract> {
    let mut seen = BTreeSet::new();
    contracts
        .into_iter()
        .filter(|c| seen.insert(c.contract_id.clone()))
        .collect()
}

fn sort_contracts(contracts: &mut [Contract]) {
    contracts.sort_by(|a, b| {
        a.target
            .usr
            .cmp(&b.target.usr)
            .then_with(|| a.version_scope.abi.cmp(&b.version_scope.abi))
            .then_with(|| a.version_scope.library_version.cmp(&b.version_scope.library_version))
            .then_with(|| a.version_scope.conditions.join("|").cmp(&b.version_scope.conditions.join("|")))
            .then_with(|| b.version_scope.priority.cmp(&a.version_scope.priority))
            .then_with(|| a.contract_id.cmp(&b.contract_id))
    });
}

/// Build the merged, deduplicated, stably-sorted SpecDB: every sidecar
/// contract in `spec_dir` (if given) followed by every annotation found in
/// `annotated_sources`, deduplicated by `contract_id`, then sorted by
/// `(target.usr, abi, library_version, conditions, priority desc, contract_id)`.
///
/// # Errors
///
/// See [`load_sidecar_contracts`] and [`scan_annotations`].
pub fn build_specdb(spec_dir: Option<&Path>, annotated_sources: &[std::path::PathBuf]) -> CoreResult<Vec<Contract>> {
    let mut contracts = Vec::new();
    if let Some(dir) = spec_dir {
        contracts.extend(load_sidecar_contracts(dir)?);
    }
    for source in annotated_sources {
        contracts.extend(scan_annotations(source)?);
    }
    let mut unique = dedupe(contracts);
    sort_contracts(&mut unique);
    Ok(unique)
}

/// The persisted SpecDB document: the sorted contract list plus a digest
/// over it, so downstream consumers can detect a changed SpecDB without
/// re-hashing every contract individually.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SpecdbSnapshot {
    /// Always `"specdb_snapshot.v1"`.
    pub schema_version: String,
    /// Opaque tool identity block, copied through from the caller.
    pub tool: serde_json::Value,
    /// RFC 3339 timestamp of snapshot construction.
    pub generated_at: String,
    /// The deduplicated, sorted contract list (see [`build_specdb`]).
    pub contracts: Vec<Contract>,
    /// `hash(sorted_contracts_array)`, over the `contracts` field as
    /// serialized to canonical JSON.
    pub specdb_digest: CertHash,
}

/// Build a [`SpecdbSnapshot`]: run [`build_specdb`], then hash the
/// resulting contract array to produce `specdb_digest`.
///
/// # Errors
///
/// See [`build_specdb`], plus [`CoreError`] if the contract list cannot be
/// serialized for hashing.
pub fn build_snapshot(
    spec_dir: Option<&Path>,
    annotated_sources: &[std::path::PathBuf],
    tool: serde_json::Value,
    generated_at: impl Into<String>,
) -> CoreResult<SpecdbSnapshot> {
    let contracts = build_specdb(spec_dir, annotated_sources)?;
    let contracts_value = serde_json::to_value(&contracts)
        .map_err(|e| CoreError::new(ErrorCode::InvalidContract, "failed to serialize contracts for digest").with_source(e))?;
    let specdb_digest = sappp_canon::hash_value(&contracts_value)?;
    Ok(SpecdbSnapshot {
        schema_version: "specdb_snapshot.v1".to_string(),
        tool,
        generated_at: generated_at.into(),
        contracts,
        specdb_digest,
    })
}

/// The external build context a contract is matched against: the actual
/// ABI, library version, and active build conditions of the code under
/// analysis, supplied by the caller (not derived from the NIR itself).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ContractMatchContext {
    /// The ABI in effect, if known.
    pub abi: Option<String>,
    /// The library version in effect, if known.
    pub library_version: Option<String>,
    /// Every condition token currently active (feature flags, platform
    /// tags, ...).
    pub conditions: BTreeSet<String>,
}

/// A contract matches a [`ContractMatchContext`] iff its `abi` is empty or
/// equals the context's, its `library_version` is empty or equals the
/// context's, and every one of its `conditions` is present in the
/// context's conditions.
#[must_use]
fn matches(contract: &Contract, ctx: &ContractMatchContext) -> bool {
    let scope = &contract.version_scope;
    let abi_ok = scope.abi.is_none() || scope.abi == ctx.abi;
    let version_ok = scope.library_version.is_none() || scope.library_version == ctx.library_version;
    let conditions_ok = scope.conditions.iter().all(|c| ctx.conditions.contains(c));
    abi_ok && version_ok && conditions_ok
}

/// Every contract in `specdb` applicable to `target_usr` under `ctx`,
/// ranked most-specific first: non-empty `abi` beats empty, then
/// non-empty `library_version` beats empty, then more required
/// `conditions` wins, then higher `priority` wins, then `contract_id`
/// (lexicographic) as the final deterministic tiebreak.
#[must_use]
pub fn match_contracts<'a>(specdb: &'a [Contract], target_usr: &str, ctx: &ContractMatchContext) -> Vec<&'a Contract> {
    let mut matched: Vec<&Contract> = specdb
        .iter()
        .filter(|c| c.target.usr == target_usr)
        .filter(|c| matches(c, ctx))
        .collect();
    matched.sort_by(|a, b| {
        b.version_scope
            .abi
            .is_some()
            .cmp(&a.version_scope.abi.is_some())
            .then_with(|| b.version_scope.library_version.is_some().cmp(&a.version_scope.library_version.is_some()))
            .then_with(|| b.version_scope.conditions.len().cmp(&a.version_scope.conditions.len()))
            .then_with(|| b.version_scope.priority.cmp(&a.version_scope.priority))
            .then_with(|| a.contract_id.cmp(&b.contract_id))
    });
    matched
}

/// The single top-ranked contract applicable to `target_usr` under `ctx`,
/// if any. All matches (not just the winner) should still be recorded as
/// `depends_on.contracts[]` by the caller — this function only picks which
/// one governs the classification.
#[must_use]
pub fn select_contract<'a>(specdb: &'a [Contract], target_usr: &str, ctx: &ContractMatchContext) -> Option<&'a Contract> {
    match_contracts(specdb, target_usr, ctx).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_contract(usr: &str, tier: &str, priority: i64) -> serde_json::Value {
        json!({
            "target": {"usr": usr},
            "tier": tier,
            "version_scope": {"priority": priority},
            "contract": {"ensures": "return != null"},
        })
    }

    #[test]
    fn normalize_computes_contract_id_when_absent() {
        let c = normalize_contract_ir(raw_contract("malloc", "exact", 0)).unwrap();
        assert_eq!(c.schema_version, "contract_ir.v1");
        assert!(c.contract_id.as_str().starts_with("sha256:"));
    }

    #[test]
    fn normalize_is_deterministic() {
        let a = normalize_contract_ir(raw_contract("malloc", "exact", 0)).unwrap();
        let b = normalize_contract_ir(raw_contract("malloc", "exact", 0)).unwrap();
        assert_eq!(a.contract_id, b.contract_id);
    }

    #[test]
    fn normalize_rejects_missing_target() {
        let mut raw = raw_contract("malloc", "exact", 0);
        raw.as_object_mut().unwrap().remove("target");
        let err = normalize_contract_ir(raw).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidContract);
    }

    #[test]
    fn document_wrapper_forms_all_normalize() {
        let array_doc = json!([raw_contract("a", "exact", 0), raw_contract("b", "exact", 0)]);
        assert_eq!(normalize_contract_document(array_doc).unwrap().len(), 2);

        let snapshot_doc = json!({
            "schema_version": "specdb_snapshot.v1",
            "contracts": [raw_contract("a", "exact", 0)],
        });
        assert_eq!(normalize_contract_document(snapshot_doc).unwrap().len(), 1);

        let plain_doc = raw_contract("a", "exact", 0);
        assert_eq!(normalize_contract_document(plain_doc).unwrap().len(), 1);
    }

    #[test]
    fn dedupe_drops_repeated_contract_ids() {
        let contracts = vec![
            normalize_contract_ir(raw_contract("a", "exact", 0)).unwrap(),
            normalize_contract_ir(raw_contract("a", "exact", 0)).unwrap(),
        ];
        assert_eq!(dedupe(contracts).len(), 1);
    }

    #[test]
    fn sort_prefers_higher_priority_within_same_target() {
        let mut contracts = vec![
            normalize_contract_ir(raw_contract("a", "exact", 0)).unwrap(),
            normalize_contract_ir(raw_contract("a", "exact", 5)).unwrap(),
        ];
        sort_contracts(&mut contracts);
        assert_eq!(contracts[0].version_scope.priority, 5);
    }

    #[test]
    fn select_contract_filters_by_unmet_conditions() {
        let mut raw = raw_contract("a", "exact", 0);
        raw["version_scope"]["conditions"] = json!(["feature_x"]);
        let specdb = vec![normalize_contract_ir(raw).unwrap()];

        let empty_ctx = ContractMatchContext::default();
        assert!(select_contract(&specdb, "a", &empty_ctx).is_none());

        let mut ctx = ContractMatchContext::default();
        ctx.conditions.insert("feature_x".to_string());
        assert!(select_contract(&specdb, "a", &ctx).is_some());
    }

    #[test]
    fn match_contracts_ranks_specificity_over_priority() {
        let mut narrow = raw_contract("a", "exact", 0);
        narrow["version_scope"]["abi"] = json!("itanium");
        let mut wide = raw_contract("a", "exact", 100);

        let specdb = vec![
            normalize_contract_ir(wide.take()).unwrap(),
            normalize_contract_ir(narrow).unwrap(),
        ];
        let mut ctx = ContractMatchContext::default();
        ctx.abi = Some("itanium".to_string());
        let ranked = match_contracts(&specdb, "a", &ctx);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].version_scope.abi.as_deref(), Some("itanium"));
    }

    #[test]
    fn scan_annotations_extracts_inline_contract() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.cpp");
        std::fs::write(
            &path,
            "int foo();\n//@sappp contract {\"target\":{\"usr\":\"foo\"},\"tier\":\"exact\",\"contract\":{}}\n",
        )
        .unwrap();
        let contracts = scan_annotations(&path).unwrap();
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].target.usr, "foo");
    }

    #[test]
    fn scan_annotations_rejects_empty_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.cpp");
        std::fs::write(&path, "//@sappp contract\n").unwrap();
        let err = scan_annotations(&path).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidContract);
    }

    #[test]
    fn build_snapshot_computes_digest_over_sorted_contracts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("malloc.json"), raw_contract("malloc", "exact", 0).to_string()).unwrap();
        let snapshot = build_snapshot(Some(dir.path()), &[], json!({"name": "sappp"}), "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(snapshot.schema_version, "specdb_snapshot.v1");
        assert_eq!(snapshot.contracts.len(), 1);
        assert!(snapshot.specdb_digest.as_str().starts_with("sha256:"));
    }

    #[test]
    fn build_snapshot_digest_is_sensitive_to_contract_set() {
        let dir_a = tempfile::tempdir().unwrap();
        std::fs::write(dir_a.path().join("malloc.json"), raw_contract("malloc", "exact", 0).to_string()).unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        std::fs::write(dir_b.path().join("free.json"), raw_contract("free", "exact", 0).to_string()).unwrap();

        let snapshot_a = build_snapshot(Some(dir_a.path()), &[], json!({}), "t").unwrap();
        let snapshot_b = build_snapshot(Some(dir_b.path()), &[], json!({}), "t").unwrap();
        assert_ne!(snapshot_a.specdb_digest, snapshot_b.specdb_digest);
    }
}
