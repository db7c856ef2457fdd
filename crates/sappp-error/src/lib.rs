// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! Comprehensive error catalog for the sappp analyzer core.
//!
//! Every error code follows the pattern `SAPPP-X###` where `X` is the
//! category letter and `###` is a three-digit number:
//!
//! - **N** — Canonicalization errors
//! - **D** — Schema / parse errors
//! - **M** — Model / semantic errors
//! - **A** — CAS (content-addressed store) errors
//! - **P** — Proof / validation errors
//! - **C** — Control (budget/cancellation) signals
//! - **S** — System errors

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCode enum
// ---------------------------------------------------------------------------

/// Enumeration of all sappp error codes, organized by category.
///
/// This is the closed taxonomy from the core's error handling design: every
/// failure the pipeline can produce maps to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // ── Canonicalization (N) ──────────────────────────────────────────
    /// A floating-point number was found somewhere in a to-be-canonicalized value.
    FloatInCanonical,
    /// A duplicate object key was found while assembling a canonical value.
    DuplicateKey,

    // ── Schema / parse (D) ────────────────────────────────────────────
    /// A file could not be parsed as valid JSON.
    ParseError,
    /// A value failed schema validation.
    SchemaInvalid,

    // ── Model / semantic (M) ──────────────────────────────────────────
    /// PO enumeration produced an empty or otherwise invalid PO list.
    InvalidPoList,
    /// A contract failed semantic validation.
    InvalidContract,
    /// A build snapshot or NIR value failed semantic validation.
    InvalidSnapshot,

    // ── CAS (A) ────────────────────────────────────────────────────────
    /// A stored object's recomputed hash does not match its claimed hash.
    HashMismatch,
    /// A referenced object does not exist in the store.
    MissingDependency,

    // ── Proof / validation (P) ─────────────────────────────────────────
    /// A version triple on a dependent artifact does not match.
    VersionMismatch,
    /// The validator encountered a certificate kind or predicate form it cannot check.
    UnsupportedProofFeature,
    /// Evidence does not establish the claim it was attached to.
    ProofCheckFailed,
    /// A structural cross-reference between certificates is inconsistent.
    RuleViolation,

    // ── Control (C) ─────────────────────────────────────────────────────
    /// A fixpoint or wall-time budget was exceeded.
    BudgetExceeded,
    /// The operation was cooperatively cancelled.
    Cancelled,

    // ── System (S) ──────────────────────────────────────────────────────
    /// An I/O operation failed.
    IoError,
    /// An unexpected internal error occurred.
    InternalError,
}

impl ErrorCode {
    /// Machine-readable code string (e.g. `"SAPPP-N001"`).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::FloatInCanonical => "SAPPP-N001",
            Self::DuplicateKey => "SAPPP-N002",

            Self::ParseError => "SAPPP-D001",
            Self::SchemaInvalid => "SAPPP-D002",

            Self::InvalidPoList => "SAPPP-M001",
            Self::InvalidContract => "SAPPP-M002",
            Self::InvalidSnapshot => "SAPPP-M003",

            Self::HashMismatch => "SAPPP-A001",
            Self::MissingDependency => "SAPPP-A002",

            Self::VersionMismatch => "SAPPP-P001",
            Self::UnsupportedProofFeature => "SAPPP-P002",
            Self::ProofCheckFailed => "SAPPP-P003",
            Self::RuleViolation => "SAPPP-P004",

            Self::BudgetExceeded => "SAPPP-C001",
            Self::Cancelled => "SAPPP-C002",

            Self::IoError => "SAPPP-S001",
            Self::InternalError => "SAPPP-S002",
        }
    }

    /// Human-readable category label.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::FloatInCanonical | Self::DuplicateKey => "canon",
            Self::ParseError | Self::SchemaInvalid => "schema",
            Self::InvalidPoList | Self::InvalidContract | Self::InvalidSnapshot => "model",
            Self::HashMismatch | Self::MissingDependency => "cas",
            Self::VersionMismatch
            | Self::UnsupportedProofFeature
            | Self::ProofCheckFailed
            | Self::RuleViolation => "proof",
            Self::BudgetExceeded | Self::Cancelled => "control",
            Self::IoError | Self::InternalError => "system",
        }
    }

    /// Short human-readable description of this error code.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::FloatInCanonical => "a floating-point number was found in a canonical value",
            Self::DuplicateKey => "a duplicate object key was found while building a canonical value",
            Self::ParseError => "a file could not be parsed as valid JSON",
            Self::SchemaInvalid => "a value failed schema validation",
            Self::InvalidPoList => "PO enumeration produced an empty or invalid PO list",
            Self::InvalidContract => "a contract failed semantic validation",
            Self::InvalidSnapshot => "a build snapshot or NIR value failed semantic validation",
            Self::HashMismatch => "a stored object's recomputed hash does not match its claimed hash",
            Self::MissingDependency => "a referenced object does not exist in the store",
            Self::VersionMismatch => "a version triple on a dependent artifact does not match",
            Self::UnsupportedProofFeature => {
                "the validator cannot check this certificate kind or predicate form"
            }
            Self::ProofCheckFailed => "evidence does not establish the claim it was attached to",
            Self::RuleViolation => "a structural cross-reference between certificates is inconsistent",
            Self::BudgetExceeded => "a fixpoint or wall-time budget was exceeded",
            Self::Cancelled => "the operation was cooperatively cancelled",
            Self::IoError => "an I/O operation failed",
            Self::InternalError => "an unexpected internal error occurred",
        }
    }

    /// The `validator_status` string this code maps to when surfaced from
    /// [`crate::CoreError`] during validation (spec §4.9/§7). This is simply
    /// this variant's own name, matching the convention that validator
    /// statuses and error kinds share one vocabulary.
    #[must_use]
    pub fn validator_status(&self) -> &'static str {
        match self {
            Self::FloatInCanonical => "FloatInCanonical",
            Self::DuplicateKey => "DuplicateKey",
            Self::ParseError => "ParseError",
            Self::SchemaInvalid => "SchemaInvalid",
            Self::InvalidPoList => "InvalidPoList",
            Self::InvalidContract => "InvalidContract",
            Self::InvalidSnapshot => "InvalidSnapshot",
            Self::HashMismatch => "HashMismatch",
            Self::MissingDependency => "MissingDependency",
            Self::VersionMismatch => "VersionMismatch",
            Self::UnsupportedProofFeature => "UnsupportedProofFeature",
            Self::ProofCheckFailed => "ProofCheckFailed",
            Self::RuleViolation => "RuleViolation",
            Self::BudgetExceeded => "BudgetExceeded",
            Self::Cancelled => "Cancelled",
            Self::IoError => "IoError",
            Self::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::error::Error for ErrorCode {}

// ---------------------------------------------------------------------------
// Complete list for catalog operations
// ---------------------------------------------------------------------------

const ALL_CODES: &[ErrorCode] = &[
    ErrorCode::FloatInCanonical,
    ErrorCode::DuplicateKey,
    ErrorCode::ParseError,
    ErrorCode::SchemaInvalid,
    ErrorCode::InvalidPoList,
    ErrorCode::InvalidContract,
    ErrorCode::InvalidSnapshot,
    ErrorCode::HashMismatch,
    ErrorCode::MissingDependency,
    ErrorCode::VersionMismatch,
    ErrorCode::UnsupportedProofFeature,
    ErrorCode::ProofCheckFailed,
    ErrorCode::RuleViolation,
    ErrorCode::BudgetExceeded,
    ErrorCode::Cancelled,
    ErrorCode::IoError,
    ErrorCode::InternalError,
];

/// Static catalog providing lookup and enumeration of [`ErrorCode`]s.
pub struct ErrorCatalog;

impl ErrorCatalog {
    /// Look up an [`ErrorCode`] by its code string (e.g. `"SAPPP-N001"`).
    #[must_use]
    pub fn lookup(code: &str) -> Option<ErrorCode> {
        ALL_CODES.iter().find(|c| c.code() == code).copied()
    }

    /// Return every defined [`ErrorCode`].
    #[must_use]
    pub fn all() -> Vec<ErrorCode> {
        ALL_CODES.to_vec()
    }

    /// Return all codes belonging to `category` (e.g. `"cas"`).
    #[must_use]
    pub fn by_category(category: &str) -> Vec<ErrorCode> {
        ALL_CODES
            .iter()
            .filter(|c| c.category() == category)
            .copied()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// CoreError
// ---------------------------------------------------------------------------

/// The common error type threaded through every crate in the workspace.
///
/// Carries a catalog [`ErrorCode`], a human message, optional structured
/// context (deterministically ordered), and an optional source error.
#[derive(thiserror::Error)]
pub struct CoreError {
    /// The catalog error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Arbitrary key-value context, in deterministic (sorted) order.
    pub context: BTreeMap<String, String>,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CoreError {
    /// Start building a [`CoreError`] for the given code.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
            source: None,
        }
    }

    /// Add a key-value context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attach an underlying source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)?;
        if !self.context.is_empty() {
            write!(f, " (")?;
            let mut first = true;
            for (k, v) in &self.context {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{k}={v}")?;
                first = false;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreError")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("context", &self.context)
            .field("source", &self.source.as_ref().map(|e| e.to_string()))
            .finish()
    }
}

/// Convenience result type for operations across the workspace.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_has_a_unique_code_string() {
        let mut seen = std::collections::HashSet::new();
        for c in ErrorCatalog::all() {
            assert!(seen.insert(c.code()), "duplicate code: {}", c.code());
        }
    }

    #[test]
    fn lookup_roundtrips() {
        for c in ErrorCatalog::all() {
            assert_eq!(ErrorCatalog::lookup(c.code()), Some(c));
        }
        assert_eq!(ErrorCatalog::lookup("SAPPP-Z999"), None);
    }

    #[test]
    fn by_category_is_consistent() {
        for c in ErrorCatalog::all() {
            assert!(ErrorCatalog::by_category(c.category()).contains(&c));
        }
    }

    #[test]
    fn core_error_display_includes_code_and_context() {
        let err = CoreError::new(ErrorCode::HashMismatch, "bad object")
            .with_context("hash", "sha256:deadbeef");
        let s = err.to_string();
        assert!(s.contains("SAPPP-A001"));
        assert!(s.contains("bad object"));
        assert!(s.contains("hash=sha256:deadbeef"));
    }

    #[test]
    fn validator_status_matches_variant_name() {
        assert_eq!(ErrorCode::HashMismatch.validator_status(), "HashMismatch");
        assert_eq!(ErrorCode::Cancelled.validator_status(), "Cancelled");
    }
}
