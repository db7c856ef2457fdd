// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! Pure comparison functions over two `validated_results.v1` snapshots
//! and over one `unknown.v1` ledger.
//!
//! Nothing here touches a filesystem or a certificate store; both
//! [`diff`] and [`filter_unknowns`] operate entirely on the typed
//! in-memory values the caller already has.

use sappp_canon::CertHash;
use sappp_unknown::UnknownRecord;
use sappp_validator::{Category, ValidatedResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The classification side (`from` or `to`) of one [`DiffEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EndpointState {
    /// The PO's category on this side of the comparison.
    pub category: Category,
    /// Certificate root hash, when this side classified the PO as BUG.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_root: Option<CertHash>,
}

impl From<&ValidatedResult> for EndpointState {
    fn from(result: &ValidatedResult) -> Self {
        Self {
            category: result.category,
            certificate_root: result.certificate_root.clone(),
        }
    }
}

/// How a PO's classification moved between two snapshots (spec `§4.10`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ChangeKind {
    /// Present only in `after`.
    New,
    /// Present only in `before`, or moved off UNKNOWN to a conclusive category.
    Resolved,
    /// Present on both sides with the same category.
    Unchanged,
    /// Moved away from SAFE, or from BUG down to UNKNOWN.
    Regressed,
    /// Present on both sides, categories differ, and neither Regressed nor
    /// Resolved applies.
    Reclassified,
}

/// One PO's change between a `before` and an `after` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DiffEntry {
    /// The PO this entry is about.
    pub po_id: String,
    /// State before, absent if the PO was not in the `before` snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<EndpointState>,
    /// State after, absent if the PO was not in the `after` snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<EndpointState>,
    /// The computed change classification.
    pub change_kind: ChangeKind,
    /// Free-form caller-supplied context for this comparison run, copied
    /// onto every entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn classify(before: Option<&ValidatedResult>, after: Option<&ValidatedResult>) -> ChangeKind {
    match (before, after) {
        (None, Some(_)) => ChangeKind::New,
        (Some(_), None) => ChangeKind::Resolved,
        (Some(b), Some(a)) => {
            if b.category == a.category {
                ChangeKind::Unchanged
            } else if b.category == Category::Safe {
                ChangeKind::Regressed
            } else if b.category == Category::Bug && a.category == Category::Unknown {
                ChangeKind::Regressed
            } else if b.category == Category::Unknown && a.category != Category::Unknown {
                ChangeKind::Resolved
            } else {
                ChangeKind::Reclassified
            }
        }
        (None, None) => unreachable!("diff only visits po_ids present on at least one side"),
    }
}

/// Compare two `validated_results.v1` snapshots PO-by-PO.
///
/// Unions the `po_id`s of both sides and emits one [`DiffEntry`] per id,
/// classified per spec.md §4.10's table. `reason` is copied onto every
/// entry as free-form context (e.g. "after nightly re-run with updated
/// SpecDB"). The result is stable-sorted by `po_id`.
#[must_use]
pub fn diff(before: &[ValidatedResult], after: &[ValidatedResult], reason: Option<&str>) -> Vec<DiffEntry> {
    let mut by_po_id: BTreeMap<&str, (Option<&ValidatedResult>, Option<&ValidatedResult>)> = BTreeMap::new();
    for result in before {
        by_po_id.entry(result.po_id.as_str()).or_default().0 = Some(result);
    }
    for result in after {
        by_po_id.entry(result.po_id.as_str()).or_default().1 = Some(result);
    }

    let mut entries: Vec<DiffEntry> = by_po_id
        .into_iter()
        .map(|(po_id, (b, a))| DiffEntry {
            po_id: po_id.to_string(),
            from: b.map(EndpointState::from),
            to: a.map(EndpointState::from),
            change_kind: classify(b, a),
            reason: reason.map(str::to_string),
        })
        .collect();
    // `BTreeMap` iteration is already po_id-sorted; sort_by is stable and
    // makes that invariant explicit rather than implicit in the map choice.
    entries.sort_by(|x, y| x.po_id.cmp(&y.po_id));
    entries
}

/// The `diff.v1` document: one comparison run's full entry list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DiffDocument {
    /// Always `"diff.v1"`.
    pub schema_version: String,
    /// Tool identity block.
    pub tool: serde_json::Value,
    /// RFC 3339 generation timestamp.
    pub generated_at: String,
    /// Every PO's change, stable-sorted by `po_id`.
    pub changes: Vec<DiffEntry>,
}

/// Build the `diff.v1` document for one comparison run.
#[must_use]
pub fn build_diff(
    before: &[ValidatedResult],
    after: &[ValidatedResult],
    reason: Option<&str>,
    tool: serde_json::Value,
    generated_at: impl Into<String>,
) -> DiffDocument {
    DiffDocument {
        schema_version: "diff.v1".to_string(),
        tool,
        generated_at: generated_at.into(),
        changes: diff(before, after, reason),
    }
}

/// Narrow an UNKNOWN ledger by the three optional predicates (spec `§4.10`).
///
/// `po_id` and `unknown_id` match exactly. `validated`, when given, keeps
/// only entries whose `po_id` has `category == UNKNOWN` in that
/// validator snapshot. The result is stable-sorted by
/// `(unknown_stable_id, po_id)`.
#[must_use]
pub fn filter_unknowns(
    ledger: &[UnknownRecord],
    validated: Option<&[ValidatedResult]>,
    po_id: Option<&str>,
    unknown_id: Option<&str>,
) -> Vec<UnknownRecord> {
    let mut filtered: Vec<UnknownRecord> = ledger
        .iter()
        .filter(|record| {
            if let Some(pid) = po_id {
                if record.po_id.as_str() != pid {
                    return false;
                }
            }
            if let Some(uid) = unknown_id {
                if record.unknown_stable_id.as_str() != uid {
                    return false;
                }
            }
            if let Some(results) = validated {
                let po_id_str = record.po_id.as_str();
                let is_unknown = results
                    .iter()
                    .any(|v| v.po_id == po_id_str && v.category == Category::Unknown);
                if !is_unknown {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect();
    filtered.sort_by(|a, b| {
        (a.unknown_stable_id.as_str(), a.po_id.as_str()).cmp(&(b.unknown_stable_id.as_str(), b.po_id.as_str()))
    });
    filtered
}
