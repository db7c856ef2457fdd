// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! The certificate DAG and its content-addressed store.
//!
//! Polymorphic certificates are represented as one tagged [`Certificate`]
//! enum rather than per-kind logic: canonicalization, hashing, and storage
//! all go through the shared [`sappp_canon`] serializer regardless of
//! variant.

use sappp_canon::CertHash;
use sappp_error::{CoreError, CoreResult, ErrorCode};
use sappp_po::Po;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A reference to a specific instruction inside a NIR document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IrLocation {
    /// Translation unit id.
    pub tu_id: String,
    /// Function id.
    pub function_uid: String,
    /// Block id.
    pub block_id: String,
    /// Instruction id.
    pub inst_id: String,
}

/// One point in an abstract-interpretation trace: the state pinned at a
/// specific instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AbstractPoint {
    /// Hash of the [`Certificate::IrRef`] this point pins state at.
    pub ir_ref: CertHash,
    /// Serialized abstract state (domain-specific shape, opaque here).
    pub state: serde_json::Value,
}

/// The violation a [`Certificate::BugTrace`] establishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Violation {
    /// The PO this trace is evidence for.
    pub po_id: CertHash,
    /// Must be `false` for the trace to count as BUG evidence.
    pub predicate_holds: bool,
}

/// A reference to a matched SpecDB contract, recorded for provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContractDependency {
    /// Hash of the matched contract.
    #[serde(rename = "ref")]
    pub contract_ref: CertHash,
}

/// The classification a [`Certificate::ProofRoot`] witnesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Proved free of the obligation's violation.
    Safe,
    /// Proved to violate the obligation.
    Bug,
}

/// Version triple and matched contracts a [`Certificate::ProofRoot`] depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Depends {
    /// Semantics version in force when the root was produced.
    pub semantics_version: String,
    /// Proof-system version in force when the root was produced.
    pub proof_system_version: String,
    /// Profile version in force when the root was produced.
    pub profile_version: String,
    /// Every matched contract, ranked or not — all are recorded, even
    /// those that lost the specificity ranking to another match.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contracts: Vec<ContractDependency>,
}

/// One node in the certificate DAG.
///
/// Tagged by `kind`; dispatch (in the validator, in `explain`) must match
/// exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind")]
pub enum Certificate {
    /// Reifies a proof obligation.
    PoDef {
        /// The PO this certificate reifies.
        po: Box<Po>,
    },
    /// Identifies a single instruction in NIR.
    IrRef {
        /// The location identified.
        #[serde(flatten)]
        location: IrLocation,
    },
    /// Evidence of BUG: a trace witnessing a predicate violation.
    BugTrace {
        /// Free-form classification of how this trace was constructed
        /// (e.g. `"fixpoint-witness"`).
        trace_kind: String,
        /// Ordered references to [`Certificate::IrRef`] hashes, entry to anchor.
        steps: Vec<CertHash>,
        /// The violation this trace establishes.
        violation: Violation,
    },
    /// A pinned abstract-state invariant, not necessarily SAFE evidence on
    /// its own (used for intermediate fixpoint checkpoints).
    Invariant {
        /// Which abstract domain this invariant was computed in.
        domain: String,
        /// Pinned points.
        points: Vec<AbstractPoint>,
    },
    /// Evidence of SAFE: the abstract state at the PO's anchor, proven to
    /// imply the PO's predicate along every reaching path.
    SafetyProof {
        /// Which abstract domain this proof was computed in.
        domain: String,
        /// Pinned points, ending at the PO's anchor.
        points: Vec<AbstractPoint>,
    },
    /// Pins a matched SpecDB contract.
    ContractRef {
        /// Hash of the contract document this certificate pins.
        contract_id: CertHash,
        /// Target USR the contract applies to.
        target: String,
        /// Specificity tier the contract was matched at.
        tier: String,
    },
    /// The single root certificate for one PO, tying together its
    /// definition, location, and evidence.
    ProofRoot {
        /// Reference to the [`Certificate::PoDef`].
        po: CertHash,
        /// Reference to the [`Certificate::IrRef`] of the PO's anchor.
        ir: CertHash,
        /// Reference to the evidence ([`Certificate::BugTrace`],
        /// [`Certificate::SafetyProof`]).
        evidence: CertHash,
        /// The verdict this root witnesses.
        result: Verdict,
        /// What this root depends on.
        depends: Depends,
        /// Hash scope tag, carried through for audit (always `"core"` today).
        hash_scope: String,
    },
}

impl Certificate {
    /// The `kind` discriminant string for this certificate.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PoDef { .. } => "PoDef",
            Self::IrRef { .. } => "IrRef",
            Self::BugTrace { .. } => "BugTrace",
            Self::Invariant { .. } => "Invariant",
            Self::SafetyProof { .. } => "SafetyProof",
            Self::ContractRef { .. } => "ContractRef",
            Self::ProofRoot { .. } => "ProofRoot",
        }
    }
}

/// The `index/<po_id>.json` entry binding a PO to its [`Certificate::ProofRoot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IndexEntry {
    /// Index schema version (`"cert_index.v1"`).
    pub schema_version: String,
    /// The PO this entry binds.
    pub po_id: String,
    /// Hash of the bound [`Certificate::ProofRoot`].
    pub root: CertHash,
}

/// Two-layer content-addressed certificate store:
/// `<base>/objects/<shard>/<hash>.json` for immutable objects, and
/// `<base>/index/<po_id>.json` binding a PO to its `ProofRoot` hash.
pub struct CasStore {
    base_dir: PathBuf,
}

impl CasStore {
    /// Open a store rooted at `base_dir`. Does not require the directory
    /// to exist yet; it is created lazily on first write.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn object_path_for_hash(&self, hash: &CertHash) -> PathBuf {
        let hex = hash.hex();
        let shard = &hex[..2];
        self.base_dir.join("objects").join(shard).join(format!("{}.json", hash.as_str()))
    }

    fn index_path_for_po(&self, po_id: &CertHash) -> PathBuf {
        self.base_dir.join("index").join(format!("{}.json", po_id.hex()))
    }

    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> CoreResult<()> {
        let parent = path.parent().ok_or_else(|| {
            CoreError::new(ErrorCode::InternalError, "object path has no parent directory")
        })?;
        std::fs::create_dir_all(parent)
            .map_err(|e| CoreError::new(ErrorCode::IoError, "failed to create store directory").with_source(e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| CoreError::new(ErrorCode::IoError, "failed to create temp file").with_source(e))?;
        std::io::Write::write_all(&mut tmp, bytes)
            .map_err(|e| CoreError::new(ErrorCode::IoError, "failed to write temp file").with_source(e))?;
        tmp.persist(path)
            .map_err(|e| CoreError::new(ErrorCode::IoError, "failed to persist temp file").with_source(e.error))?;
        Ok(())
    }

    /// Store `cert`, returning its content hash. Idempotent: storing the
    /// same logical certificate twice is a no-op after the first write.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InternalError`] if `cert` cannot be
    /// canonicalized, or [`ErrorCode::IoError`] on any filesystem failure.
    pub fn put(&self, cert: &Certificate) -> CoreResult<CertHash> {
        let value = serde_json::to_value(cert)
            .map_err(|e| CoreError::new(ErrorCode::InternalError, "failed to serialize certificate").with_source(e))?;
        let hash = sappp_canon::hash_value(&value)?;
        let path = self.object_path_for_hash(&hash);
        if path.exists() {
            return Ok(hash);
        }
        let bytes = sappp_canon::canonicalize_value(&value)?;
        self.write_atomically(&path, &bytes)?;
        Ok(hash)
    }

    /// Load the certificate stored under `hash`, re-verifying its content
    /// hash on every read.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ParseError`] if the stored bytes are not a
    /// valid [`Certificate`], and [`ErrorCode::HashMismatch`] if the
    /// recomputed hash does not match `hash`.
    pub fn get(&self, hash: &CertHash) -> CoreResult<Option<Certificate>> {
        let path = self.object_path_for_hash(hash);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)
            .map_err(|e| CoreError::new(ErrorCode::IoError, "failed to read certificate object").with_source(e))?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::new(ErrorCode::ParseError, "stored certificate is not valid JSON").with_source(e))?;
        let recomputed = sappp_canon::hash_value(&value)?;
        if &recomputed != hash {
            return Err(CoreError::new(ErrorCode::HashMismatch, "stored certificate hash does not match its object path")
                .with_context("expected", hash.as_str())
                .with_context("actual", recomputed.as_str()));
        }
        let cert: Certificate = serde_json::from_value(value)
            .map_err(|e| CoreError::new(ErrorCode::ParseError, "stored certificate has an invalid shape").with_source(e))?;
        Ok(Some(cert))
    }

    /// Check whether an object is present under `hash`, without fully
    /// loading and re-validating it. Used by [`CasStore::bind_po`] and by
    /// dependency-existence checks that don't need the parsed value.
    #[must_use]
    pub fn contains(&self, hash: &CertHash) -> bool {
        self.object_path_for_hash(hash).exists()
    }

    /// Bind `po_id` to the `ProofRoot` at `cert_hash`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::MissingDependency`] if no object exists at
    /// `cert_hash`.
    pub fn bind_po(&self, po_id: &CertHash, cert_hash: &CertHash) -> CoreResult<()> {
        if !self.contains(cert_hash) {
            return Err(CoreError::new(ErrorCode::MissingDependency, "certificate hash not found in store")
                .with_context("hash", cert_hash.as_str()));
        }
        let entry = IndexEntry {
            schema_version: "cert_index.v1".to_string(),
            po_id: po_id.to_string(),
            root: cert_hash.clone(),
        };
        let value = serde_json::to_value(&entry)
            .map_err(|e| CoreError::new(ErrorCode::InternalError, "failed to serialize index entry").with_source(e))?;
        let bytes = sappp_canon::canonicalize_value(&value)?;
        self.write_atomically(&self.index_path_for_po(po_id), &bytes)
    }

    /// Load the index entry for `po_id`, if one has been bound.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ParseError`] if the stored entry is malformed.
    pub fn index_entry(&self, po_id: &CertHash) -> CoreResult<Option<IndexEntry>> {
        let path = self.index_path_for_po(po_id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)
            .map_err(|e| CoreError::new(ErrorCode::IoError, "failed to read index entry").with_source(e))?;
        let entry: IndexEntry = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::new(ErrorCode::ParseError, "stored index entry is malformed").with_source(e))?;
        Ok(Some(entry))
    }

    /// List every `po_id` with a bound index entry, sorted for
    /// deterministic iteration (used by the validator, which walks the
    /// index directory in sorted order).
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::IoError`] if the index directory cannot be read.
    pub fn list_index(&self) -> CoreResult<Vec<String>> {
        let dir = self.base_dir.join("index");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .map_err(|e| CoreError::new(ErrorCode::IoError, "failed to read index directory").with_source(e))?
        {
            let entry = entry
                .map_err(|e| CoreError::new(ErrorCode::IoError, "failed to read index directory entry").with_source(e))?;
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                entries.push(name.to_string());
            }
        }
        entries.sort();
        Ok(entries)
    }
}
