// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! The UNKNOWN ledger emitted alongside certificates for every proof
//! obligation the analyzer could not classify as SAFE or BUG.

use sappp_canon::CertHash;
use sappp_error::CoreResult;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Closed taxonomy of reasons the analyzer could not resolve a proof
/// obligation to SAFE or BUG, each with a standard refinement action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum UnknownCode {
    /// The interval domain was too coarse to decide the predicate.
    #[serde(rename = "DomainTooWeak.Numeric")]
    DomainTooWeakNumeric,
    /// No contract matched an external-call target the predicate depends on.
    #[serde(rename = "MissingContract.Pre")]
    MissingContractPre,
    /// The fixpoint hit its `max_iterations` budget before converging.
    BudgetExceeded,
    /// A `vcall` site has no `tables.vcall_candidates` entry.
    #[serde(rename = "VirtualCall.CandidateSetMissing")]
    VirtualCallCandidateSetMissing,
    /// A `vcall` candidate set is present but no contract covers any candidate.
    #[serde(rename = "VirtualCall.MissingContract.Pre")]
    VirtualCallMissingContractPre,
    /// Candidates and contracts are both present but dispatch is unresolved.
    VirtualDispatchUnknown,
    /// An exception edge has no model.
    ExceptionFlowConservative,
    /// An `atomic.*` instruction has no ordering model.
    AtomicOrderUnknown,
    /// `thread.spawn` or shared mutation with no concurrency model.
    ConcurrencyUnsupported,
    /// A `sync.event` has no matching concurrency contract.
    SyncContractMissing,
    /// The lifetime domain's join yielded `⊤` on the object of interest.
    LifetimeStateUnknown,
}

impl UnknownCode {
    /// The wire token for this code (e.g. `"VirtualCall.CandidateSetMissing"`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DomainTooWeakNumeric => "DomainTooWeak.Numeric",
            Self::MissingContractPre => "MissingContract.Pre",
            Self::BudgetExceeded => "BudgetExceeded",
            Self::VirtualCallCandidateSetMissing => "VirtualCall.CandidateSetMissing",
            Self::VirtualCallMissingContractPre => "VirtualCall.MissingContract.Pre",
            Self::VirtualDispatchUnknown => "VirtualDispatchUnknown",
            Self::ExceptionFlowConservative => "ExceptionFlowConservative",
            Self::AtomicOrderUnknown => "AtomicOrderUnknown",
            Self::ConcurrencyUnsupported => "ConcurrencyUnsupported",
            Self::SyncContractMissing => "SyncContractMissing",
            Self::LifetimeStateUnknown => "LifetimeStateUnknown",
        }
    }

    /// The standard refinement action recommended for this code.
    #[must_use]
    pub fn refinement_action(&self) -> &'static str {
        match self {
            Self::DomainTooWeakNumeric => "refine.numeric-domain",
            Self::MissingContractPre | Self::SyncContractMissing => "add-contract",
            Self::BudgetExceeded => "increase-budget",
            Self::VirtualCallCandidateSetMissing => "refine-vcall",
            Self::VirtualCallMissingContractPre => "add-vcall-contract",
            Self::VirtualDispatchUnknown => "resolve-vcall",
            Self::ExceptionFlowConservative => "refine-exception",
            Self::AtomicOrderUnknown => "refine-atomic-order",
            Self::ConcurrencyUnsupported => "refine-concurrency",
            Self::LifetimeStateUnknown => "refine-lifetime",
        }
    }

    /// A short human-readable summary of what produces this code, suitable
    /// as a `refinement_plan.message`.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::DomainTooWeakNumeric => "Refine the numeric domain or add invariants.",
            Self::MissingContractPre => "Add a SpecDB contract covering this call target's precondition.",
            Self::BudgetExceeded => "Increase the fixpoint iteration budget for this function.",
            Self::VirtualCallCandidateSetMissing => "Supply a vcall_candidates table for this call site.",
            Self::VirtualCallMissingContractPre => "Add a contract covering at least one vcall candidate.",
            Self::VirtualDispatchUnknown => "Resolve which vcall candidate is actually reached.",
            Self::ExceptionFlowConservative => "Model this exception edge explicitly.",
            Self::AtomicOrderUnknown => "Supply a memory-ordering model for this atomic operation.",
            Self::ConcurrencyUnsupported => "Refine the concurrency model for this thread spawn or shared mutation.",
            Self::SyncContractMissing => "Add a concurrency contract covering this synchronization event.",
            Self::LifetimeStateUnknown => "Refine the lifetime domain for the object of interest.",
        }
    }
}

/// A symbolic record of the predicate the analyzer could not prove or
/// refute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MissingLemma {
    /// The unproved predicate, as a `{op, args}` expression tree.
    pub expr: serde_json::Value,
    /// Human-readable rendering of `expr`.
    pub pretty: String,
    /// Symbols (function USRs, PO ids, ...) this lemma references.
    pub symbols: Vec<String>,
}

/// One recommended refinement, with whatever parameters a follow-up pass
/// needs to act on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RefinementAction {
    /// The action token (e.g. `"refine.numeric-domain"`).
    pub action: String,
    /// Action-specific parameters.
    pub params: serde_json::Value,
}

/// An ordered set of recommended next steps to resolve an UNKNOWN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RefinementPlan {
    /// Human-readable summary of the plan.
    pub message: String,
    /// Recommended actions, in priority order.
    pub actions: Vec<RefinementAction>,
}

/// One entry in the UNKNOWN ledger: a PO the analyzer could not classify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UnknownRecord {
    /// Deterministic id for this ledger entry, hashed from
    /// `{po_id, unknown_code, semantics_version, proof_system_version, profile_version}`.
    pub unknown_stable_id: CertHash,
    /// The PO this entry is about.
    pub po_id: CertHash,
    /// Why the analyzer could not resolve this PO.
    pub unknown_code: UnknownCode,
    /// The unresolved predicate.
    pub missing_lemma: MissingLemma,
    /// Recommended next steps.
    pub refinement_plan: RefinementPlan,
}

/// Compute `unknown_stable_id` for a `(po_id, unknown_code)` pair under the
/// three version strings in effect.
///
/// # Errors
///
/// Propagates canonicalization errors from [`sappp_canon::hash_value`].
pub fn compute_unknown_stable_id(
    po_id: &CertHash,
    unknown_code: UnknownCode,
    semantics_version: &str,
    proof_system_version: &str,
    profile_version: &str,
) -> CoreResult<CertHash> {
    let input = serde_json::json!({
        "po_id": po_id,
        "unknown_code": unknown_code.as_str(),
        "semantics_version": semantics_version,
        "proof_system_version": proof_system_version,
        "profile_version": profile_version,
    });
    sappp_canon::hash_value(&input)
}

/// Build the standard [`MissingLemma`] for a PO that needs proof: `expr =
/// {op: "needs_proof", args: [po_kind, po_id]}`.
#[must_use]
pub fn build_missing_lemma(po_kind: &str, po_id: &CertHash, function_uid: &str) -> MissingLemma {
    MissingLemma {
        expr: serde_json::json!({
            "op": "needs_proof",
            "args": [po_kind, po_id.as_str()],
        }),
        pretty: format!("Need proof for {po_kind} at {function_uid}"),
        symbols: vec![function_uid.to_string(), po_id.as_str().to_string()],
    }
}

/// Build the standard single-action [`RefinementPlan`] for `code`.
#[must_use]
pub fn build_refinement_plan(code: UnknownCode, po_id: &CertHash) -> RefinementPlan {
    RefinementPlan {
        message: code.message().to_string(),
        actions: vec![RefinementAction {
            action: code.refinement_action().to_string(),
            params: serde_json::json!({ "po_id": po_id }),
        }],
    }
}

/// Assemble a complete [`UnknownRecord`] for one non-SAFE/non-BUG PO.
///
/// # Errors
///
/// Propagates canonicalization errors from [`compute_unknown_stable_id`].
pub fn build_unknown_record(
    po_id: &CertHash,
    po_kind: &str,
    function_uid: &str,
    code: UnknownCode,
    semantics_version: &str,
    proof_system_version: &str,
    profile_version: &str,
) -> CoreResult<UnknownRecord> {
    let unknown_stable_id =
        compute_unknown_stable_id(po_id, code, semantics_version, proof_system_version, profile_version)?;
    Ok(UnknownRecord {
        unknown_stable_id,
        po_id: po_id.clone(),
        unknown_code: code,
        missing_lemma: build_missing_lemma(po_kind, po_id, function_uid),
        refinement_plan: build_refinement_plan(code, po_id),
    })
}

/// The full UNKNOWN ledger document written alongside one translation
/// unit's certificates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UnknownLedger {
    /// Ledger schema version (`"unknown.v1"`).
    pub schema_version: String,
    /// Producer tool identity.
    pub tool: serde_json::Value,
    /// RFC 3339 generation timestamp.
    pub generated_at: String,
    /// The translation unit this ledger covers.
    pub tu_id: String,
    /// Ledger entries, sorted by `unknown_stable_id`.
    pub unknowns: Vec<UnknownRecord>,
    /// The semantics version every entry was produced under.
    pub semantics_version: String,
    /// The proof-system version every entry was produced under.
    pub proof_system_version: String,
    /// The profile version every entry was produced under.
    pub profile_version: String,
    /// Digest of the NIR this ledger was derived from, if tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_digest: Option<String>,
}

impl UnknownLedger {
    /// Sort `unknowns` by `unknown_stable_id`, matching the analyzer's own
    /// deterministic ordering.
    pub fn sort(&mut self) {
        self.unknowns.sort_by(|a, b| a.unknown_stable_id.cmp(&b.unknown_stable_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_hash(fill: char) -> CertHash {
        format!("sha256:{}", fill.to_string().repeat(64)).parse().unwrap()
    }

    #[test]
    fn every_code_has_a_unique_wire_token() {
        let codes = [
            UnknownCode::DomainTooWeakNumeric,
            UnknownCode::MissingContractPre,
            UnknownCode::BudgetExceeded,
            UnknownCode::VirtualCallCandidateSetMissing,
            UnknownCode::VirtualCallMissingContractPre,
            UnknownCode::VirtualDispatchUnknown,
            UnknownCode::ExceptionFlowConservative,
            UnknownCode::AtomicOrderUnknown,
            UnknownCode::ConcurrencyUnsupported,
            UnknownCode::SyncContractMissing,
            UnknownCode::LifetimeStateUnknown,
        ];
        let mut seen = std::collections::HashSet::new();
        for c in codes {
            assert!(seen.insert(c.as_str()), "duplicate token: {}", c.as_str());
        }
    }

    #[test]
    fn refinement_actions_match_known_tokens() {
        assert_eq!(UnknownCode::DomainTooWeakNumeric.refinement_action(), "refine.numeric-domain");
        assert_eq!(UnknownCode::VirtualCallCandidateSetMissing.refinement_action(), "refine-vcall");
        assert_eq!(UnknownCode::VirtualDispatchUnknown.refinement_action(), "resolve-vcall");
        assert_eq!(UnknownCode::ExceptionFlowConservative.refinement_action(), "refine-exception");
        assert_eq!(UnknownCode::AtomicOrderUnknown.refinement_action(), "refine-atomic-order");
        assert_eq!(UnknownCode::ConcurrencyUnsupported.refinement_action(), "refine-concurrency");
        assert_eq!(UnknownCode::SyncContractMissing.refinement_action(), "add-contract");
    }

    #[test]
    fn stable_id_is_deterministic_and_code_sensitive() {
        let po_id = zero_hash('b');
        let a = compute_unknown_stable_id(&po_id, UnknownCode::BudgetExceeded, "sem.v1", "proof.v1", "safety.core.v1").unwrap();
        let b = compute_unknown_stable_id(&po_id, UnknownCode::BudgetExceeded, "sem.v1", "proof.v1", "safety.core.v1").unwrap();
        assert_eq!(a, b);
        let c = compute_unknown_stable_id(&po_id, UnknownCode::LifetimeStateUnknown, "sem.v1", "proof.v1", "safety.core.v1").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn build_unknown_record_roundtrips_through_json() {
        let po_id = zero_hash('b');
        let record = build_unknown_record(
            &po_id,
            "UB.DivZero",
            "usr::foo",
            UnknownCode::DomainTooWeakNumeric,
            "sem.v1",
            "proof.v1",
            "safety.core.v1",
        )
        .unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["unknown_code"], "DomainTooWeak.Numeric");
        let back: UnknownRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn ledger_sort_orders_by_stable_id() {
        let mut ledger = UnknownLedger {
            schema_version: "unknown.v1".to_string(),
            tool: serde_json::json!({"name": "sappp", "version": "0.1.0"}),
            generated_at: "1970-01-01T00:00:00Z".to_string(),
            tu_id: zero_hash('a').as_str().to_string(),
            unknowns: vec![
                build_unknown_record(&zero_hash('3'), "UB.DivZero", "f", UnknownCode::BudgetExceeded, "sem.v1", "proof.v1", "safety.core.v1").unwrap(),
                build_unknown_record(&zero_hash('1'), "UB.DivZero", "f", UnknownCode::BudgetExceeded, "sem.v1", "proof.v1", "safety.core.v1").unwrap(),
            ],
            semantics_version: "sem.v1".to_string(),
            proof_system_version: "proof.v1".to_string(),
            profile_version: "safety.core.v1".to_string(),
            input_digest: None,
        };
        ledger.sort();
        assert!(ledger.unknowns[0].unknown_stable_id <= ledger.unknowns[1].unknown_stable_id);
    }
}
