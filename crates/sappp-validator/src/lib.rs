// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! Independent re-validation of a certificate store.
//!
//! [`validate`] walks `certstore/index/*.json` in sorted filename order
//! and, for every entry, re-derives a [`ValidatedResult`] by loading and
//! cross-checking the certificate DAG it points at. It never reads the
//! analyzer's in-memory state, so the result is meaningful even when the
//! store came from a different run or a different machine.

use sappp_canon::CertHash;
use sappp_cert::{CasStore, Certificate, IndexEntry, Verdict as CertVerdict};
use sappp_error::{CoreError, CoreResult, ErrorCode};
use sappp_nir::version;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// A cooperative cancellation flag checked once per index entry.
///
/// Mirrors `sappp-analyzer`'s token of the same name and purpose; kept as
/// its own tiny copy here rather than a shared dependency, since the two
/// crates otherwise have no reason to depend on one another and the type
/// is three fields of glue.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that starts out not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether [`CancellationToken::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Document shapes
// ---------------------------------------------------------------------------

/// A validated result's classification. Distinct from [`sappp_cert::Verdict`]
/// because the validator can conclude `UNKNOWN` where the analyzer could not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    /// Re-checked and confirmed free of the obligation's violation.
    Safe,
    /// Re-checked and confirmed to violate the obligation.
    Bug,
    /// Could not be re-checked to a conclusive verdict.
    Unknown,
}

/// One proof obligation's independently re-checked outcome (spec `§4.9`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidatedResult {
    /// The PO this result is about.
    pub po_id: String,
    /// The re-checked classification.
    pub category: Category,
    /// `"Validated"` on success, or the failing check's name.
    pub validator_status: String,
    /// Hash of the `ProofRoot` this result was validated against, when one
    /// was successfully loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_root: Option<CertHash>,
    /// The same failing check's name, duplicated for callers that only
    /// look at `downgrade_reason_code` (spec wire shape keeps both).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downgrade_reason_code: Option<String>,
    /// Free-form detail about why validation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// The `validated_results.v1` document: every index entry's re-checked
/// outcome for one translation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidatedResults {
    /// Always `"validated_results.v1"`.
    pub schema_version: String,
    /// Tool identity block.
    pub tool: serde_json::Value,
    /// RFC 3339 generation timestamp. Never participates in hashing.
    pub generated_at: String,
    /// Translation unit these results cover, recovered from the first
    /// successfully loaded `IrRef`.
    pub tu_id: String,
    /// Every index entry's re-checked result, stable-sorted by `po_id`.
    pub results: Vec<ValidatedResult>,
    /// Semantics version this validator run checked against.
    pub semantics_version: String,
    /// Proof-system version this validator run checked against.
    pub proof_system_version: String,
    /// Profile version this validator run checked against.
    pub profile_version: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fallback_po_id(path: &Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown");
    stem.parse::<CertHash>()
        .unwrap_or_else(|_| CertHash::from_digest(&Sha256::digest(stem.as_bytes())))
        .to_string()
}

fn load_cert(cas: &CasStore, hash: &CertHash, po_id: &str) -> CoreResult<Certificate> {
    cas.get(hash)?.ok_or_else(|| {
        CoreError::new(ErrorCode::MissingDependency, "referenced certificate not found in store")
            .with_context("hash", hash.as_str())
            .with_context("po_id", po_id)
    })
}

fn unknown_from_error(po_id: String, err: &CoreError) -> ValidatedResult {
    let status = err.code.validator_status().to_string();
    ValidatedResult {
        po_id,
        category: Category::Unknown,
        validator_status: status.clone(),
        certificate_root: None,
        downgrade_reason_code: Some(status),
        notes: if err.message.is_empty() { None } else { Some(err.message.clone()) },
    }
}

fn cancelled_result(po_id: String) -> ValidatedResult {
    let status = ErrorCode::Cancelled.validator_status().to_string();
    ValidatedResult {
        po_id,
        category: Category::Unknown,
        validator_status: status.clone(),
        certificate_root: None,
        downgrade_reason_code: Some(status),
        notes: None,
    }
}

/// Re-check one index entry against the 8-step list (spec `§4.9`).
///
/// `tu_id` is filled in from the first `IrRef` successfully loaded by any
/// call, matching the original's "first one found wins" behavior.
fn validate_one(cas: &CasStore, path: &Path, tu_id: &mut String) -> CoreResult<ValidatedResult> {
    let fallback = fallback_po_id(path);

    // Step 1: schema-validate the index entry.
    let bytes = std::fs::read(path)
        .map_err(|e| CoreError::new(ErrorCode::IoError, "failed to read index entry").with_source(e).with_context("po_id", fallback.as_str()))?;
    let index_value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| CoreError::new(ErrorCode::ParseError, "index entry is not valid JSON").with_source(e).with_context("po_id", fallback.as_str()))?;
    sappp_schema::validate(&index_value, "cert_index.v1").map_err(|e| e.with_context("po_id", fallback.as_str()))?;
    let index_entry: IndexEntry = serde_json::from_value(index_value)
        .map_err(|e| CoreError::new(ErrorCode::ParseError, "index entry does not match cert_index.v1 shape").with_source(e).with_context("po_id", fallback.as_str()))?;
    let po_id = index_entry.po_id;

    // Steps 2-3: load the ProofRoot by hash (`CasStore::get` re-verifies
    // the object's content hash against the hash used to fetch it, which
    // is step 3 for every object loaded below).
    let root = load_cert(cas, &index_entry.root, &po_id)?;
    let Certificate::ProofRoot {
        po: po_ref,
        ir: ir_ref,
        evidence: evidence_ref,
        result,
        depends,
        ..
    } = root
    else {
        return Err(CoreError::new(ErrorCode::UnsupportedProofFeature, "root certificate is not a ProofRoot").with_context("po_id", po_id.as_str()));
    };

    // Step 4: version triple.
    if depends.semantics_version != version::SEMANTICS_VERSION
        || depends.proof_system_version != version::PROOF_SYSTEM_VERSION
        || depends.profile_version != version::PROFILE_VERSION
    {
        return Err(CoreError::new(ErrorCode::VersionMismatch, "ProofRoot version triple mismatch").with_context("po_id", po_id.as_str()));
    }

    // Step 5 + 6: PoDef ref.
    let po_cert = load_cert(cas, &po_ref, &po_id)?;
    let Certificate::PoDef { po } = po_cert else {
        return Err(CoreError::new(ErrorCode::RuleViolation, "po reference is not a PoDef").with_context("po_id", po_id.as_str()));
    };
    if po.po_id.to_string() != po_id {
        return Err(CoreError::new(ErrorCode::RuleViolation, "PoDef po_id does not match index entry").with_context("po_id", po_id.as_str()));
    }

    // Step 5: IrRef.
    let ir_cert = load_cert(cas, &ir_ref, &po_id)?;
    let Certificate::IrRef { location } = ir_cert else {
        return Err(CoreError::new(ErrorCode::RuleViolation, "ir reference is not an IrRef").with_context("po_id", po_id.as_str()));
    };
    if tu_id.is_empty() {
        *tu_id = location.tu_id;
    }

    // Step 5: evidence ref, then step 7/8 per result kind.
    let evidence_cert = load_cert(cas, &evidence_ref, &po_id)?;
    match result {
        CertVerdict::Bug => {
            let Certificate::BugTrace { violation, .. } = evidence_cert else {
                return Err(CoreError::new(ErrorCode::UnsupportedProofFeature, "BUG evidence is not a BugTrace").with_context("po_id", po_id.as_str()));
            };
            if violation.po_id.to_string() != po_id {
                return Err(CoreError::new(ErrorCode::RuleViolation, "BugTrace violation po_id does not match").with_context("po_id", po_id.as_str()));
            }
            if violation.predicate_holds {
                return Err(CoreError::new(ErrorCode::ProofCheckFailed, "BugTrace predicate holds at the violation state").with_context("po_id", po_id.as_str()));
            }
            Ok(ValidatedResult {
                po_id,
                category: Category::Bug,
                validator_status: "Validated".to_string(),
                certificate_root: Some(index_entry.root),
                downgrade_reason_code: None,
                notes: None,
            })
        }
        // No symbolic evaluator exists to check a `SafetyProof`'s abstract
        // state against its predicate expression (spec §4.9 step 8, §9
        // Open Question — this mirrors the original, which always
        // downgrades SAFE at validation time).
        CertVerdict::Safe => Err(CoreError::new(ErrorCode::UnsupportedProofFeature, "SAFE validation is not implemented").with_context("po_id", po_id.as_str())),
    }
}

/// Run the validator over every index entry under `input_dir/certstore`.
///
/// In non-strict mode every failing check becomes an `UNKNOWN`
/// [`ValidatedResult`] carrying that check's name as both
/// `validator_status` and `downgrade_reason_code`; in strict mode the
/// first failure is returned as `Err` (matching the CLI's exit-code-3
/// contract).
///
/// # Errors
///
/// Returns an error if the index directory is missing, if no index
/// entries are found, if `tu_id` could not be recovered from any `IrRef`,
/// or (strict mode only) on the first failing check.
pub fn validate(input_dir: &Path, strict: bool, cancel: &CancellationToken, generated_at: impl Into<String>) -> CoreResult<ValidatedResults> {
    let index_dir = input_dir.join("certstore").join("index");
    if !index_dir.exists() {
        return Err(CoreError::new(ErrorCode::IoError, "certstore index directory not found").with_context("path", index_dir.display().to_string()));
    }
    let cas = CasStore::new(input_dir.join("certstore"));

    let mut index_files: Vec<PathBuf> = std::fs::read_dir(&index_dir)
        .map_err(|e| CoreError::new(ErrorCode::IoError, "failed to read certstore index directory").with_source(e))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    index_files.sort();

    let mut results = Vec::with_capacity(index_files.len());
    let mut tu_id = String::new();

    for path in &index_files {
        if cancel.is_cancelled() {
            results.push(cancelled_result(fallback_po_id(path)));
            continue;
        }
        match validate_one(&cas, path, &mut tu_id) {
            Ok(result) => results.push(result),
            Err(e) => {
                if strict {
                    return Err(e);
                }
                let po_id = e.context.get("po_id").cloned().unwrap_or_else(|| fallback_po_id(path));
                tracing::warn!(po_id = %po_id, code = %e.code, "downgrading index entry to UNKNOWN");
                results.push(unknown_from_error(po_id, &e));
            }
        }
    }

    if results.is_empty() {
        return Err(CoreError::new(ErrorCode::InvalidSnapshot, "no certificate index entries found"));
    }
    // `Vec::sort_by` is a stable sort, matching `std::ranges::stable_sort`.
    results.sort_by(|a, b| a.po_id.cmp(&b.po_id));

    if tu_id.is_empty() {
        return Err(CoreError::new(ErrorCode::InvalidSnapshot, "failed to determine tu_id from any IrRef"));
    }

    Ok(ValidatedResults {
        schema_version: "validated_results.v1".to_string(),
        tool: serde_json::json!({ "name": "sappp", "version": version::VERSION }),
        generated_at: generated_at.into(),
        tu_id,
        results,
        semantics_version: version::SEMANTICS_VERSION.to_string(),
        proof_system_version: version::PROOF_SYSTEM_VERSION.to_string(),
        profile_version: version::PROFILE_VERSION.to_string(),
    })
}
