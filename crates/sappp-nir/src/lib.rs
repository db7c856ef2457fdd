// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! Normalized IR (NIR): the CFG-shaped representation every downstream
//! stage (PO enumeration, abstract interpretation, certificate
//! construction) consumes and never mutates.

use sappp_canon::CertHash;
use sappp_error::{CoreError, CoreResult, ErrorCode};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Compile-time version triple embedded in every NIR, PO, and certificate
/// this workspace produces, and checked by the validator against whatever
/// triple is recorded in a certificate under review.
pub mod version {
    /// Crate release version.
    pub const VERSION: &str = "0.1.0";
    /// Abstract-semantics version: changes when instruction or domain
    /// semantics change in a way that could alter a previously emitted
    /// verdict.
    pub const SEMANTICS_VERSION: &str = "sem.v1";
    /// Proof-system version: changes when the certificate schema or the
    /// validator's check list changes.
    pub const PROOF_SYSTEM_VERSION: &str = "proof.v1";
    /// Active analysis profile version (which obligation kinds are in scope).
    pub const PROFILE_VERSION: &str = "safety.core.v1";
}

/// A source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Location {
    /// Source file path, normalized to a workspace-relative form.
    pub file: String,
    /// 1-based line number.
    pub line: i64,
    /// 0-based column number.
    pub col: i64,
}

/// The closed set of instruction opcodes a frontend may emit.
///
/// `Other` is an escape hatch for forward compatibility with frontend
/// emitters: callers matching on [`Op`] must always include a default
/// arm rather than assume this list is exhaustive in practice.
///
/// Serializes as the bare opcode string (`"ub.check"`, `"lifetime.begin"`,
/// ...) rather than through a derived representation, since the wire form
/// mixes dotted tokens with a forward-compatible fallback that a standard
/// enum tagging mode cannot express.
#[derive(Debug, Clone, PartialEq, Eq, JsonSchema)]
pub enum Op {
    /// `ub.check(kind, ...)` — an explicit proof obligation marker.
    UbCheck,
    /// Memory load.
    Load,
    /// Memory store.
    Store,
    /// Direct call.
    Call,
    /// Virtual call through a vtable/candidate set.
    Vcall,
    /// Call with exception-unwind edges.
    Invoke,
    /// Function return.
    Ret,
    /// Conditional or unconditional branch.
    Branch,
    /// Assignment of a value to a variable.
    Assign,
    /// Move of an owning value.
    Move,
    /// Heap allocation.
    Alloc,
    /// Heap deallocation.
    Free,
    /// Destructor invocation.
    Dtor,
    /// Start of an object's lifetime.
    LifetimeBegin,
    /// End of an object's lifetime.
    LifetimeEnd,
    /// Atomic read.
    AtomicRead,
    /// Atomic write.
    AtomicWrite,
    /// Thread spawn.
    ThreadSpawn,
    /// Synchronization event (lock, join, fence).
    SyncEvent,
    /// `sink.marker(kind, ...)` — litmus/test-only PO injection point.
    SinkMarker,
    /// Any opcode not in the closed set above.
    Other(String),
}

impl Op {
    /// The wire opcode string for this variant.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::UbCheck => "ub.check",
            Self::Load => "load",
            Self::Store => "store",
            Self::Call => "call",
            Self::Vcall => "vcall",
            Self::Invoke => "invoke",
            Self::Ret => "ret",
            Self::Branch => "branch",
            Self::Assign => "assign",
            Self::Move => "move",
            Self::Alloc => "alloc",
            Self::Free => "free",
            Self::Dtor => "dtor",
            Self::LifetimeBegin => "lifetime.begin",
            Self::LifetimeEnd => "lifetime.end",
            Self::AtomicRead => "atomic.r",
            Self::AtomicWrite => "atomic.w",
            Self::ThreadSpawn => "thread.spawn",
            Self::SyncEvent => "sync.event",
            Self::SinkMarker => "sink.marker",
            Self::Other(s) => s,
        }
    }

    fn from_str_token(s: &str) -> Self {
        match s {
            "ub.check" => Self::UbCheck,
            "load" => Self::Load,
            "store" => Self::Store,
            "call" => Self::Call,
            "vcall" => Self::Vcall,
            "invoke" => Self::Invoke,
            "ret" => Self::Ret,
            "branch" => Self::Branch,
            "assign" => Self::Assign,
            "move" => Self::Move,
            "alloc" => Self::Alloc,
            "free" => Self::Free,
            "dtor" => Self::Dtor,
            "lifetime.begin" => Self::LifetimeBegin,
            "lifetime.end" => Self::LifetimeEnd,
            "atomic.r" => Self::AtomicRead,
            "atomic.w" => Self::AtomicWrite,
            "thread.spawn" => Self::ThreadSpawn,
            "sync.event" => Self::SyncEvent,
            "sink.marker" => Self::SinkMarker,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for Op {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Op {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_str_token(&s))
    }
}

/// A single NIR instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Instruction {
    /// Instruction id, unique within its containing block.
    pub id: String,
    /// Opcode.
    pub op: Op,
    /// Opcode-specific arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<serde_json::Value>,
    /// Originating source location, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<Location>,
}

/// A basic block: a straight-line sequence of instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BasicBlock {
    /// Block id, unique within its containing CFG.
    pub id: String,
    /// Ordered instructions.
    pub insts: Vec<Instruction>,
}

/// A control-flow edge between two blocks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct Edge {
    /// Source block id.
    pub from: String,
    /// Destination block id.
    pub to: String,
    /// Edge kind (`"fallthrough"`, `"true"`, `"false"`, `"unwind"`, ...).
    pub kind: String,
}

/// A function's control-flow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Cfg {
    /// Id of the entry block.
    pub entry: String,
    /// All blocks in the function.
    pub blocks: Vec<BasicBlock>,
    /// All edges in the function.
    pub edges: Vec<Edge>,
}

/// The set of candidate target methods for one virtual call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VcallCandidateSet {
    /// Identifier correlating this set with a `vcall` instruction.
    pub id: String,
    /// Mangled names of every method the call could dispatch to.
    pub methods: Vec<String>,
}

/// Per-function auxiliary tables that are not part of the CFG proper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FunctionTables {
    /// Virtual-call candidate sets, one per `vcall` site in the function.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vcall_candidates: Vec<VcallCandidateSet>,
}

/// A single formal parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FunctionParam {
    /// Parameter name.
    pub name: String,
    /// Parameter type, as rendered by the frontend.
    #[serde(rename = "type")]
    pub ty: String,
}

/// A function's type signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FunctionSignature {
    /// Return type, as rendered by the frontend.
    pub return_type: String,
    /// Ordered formal parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<FunctionParam>,
    /// Whether the function is declared `noexcept`.
    #[serde(default)]
    pub is_noexcept: bool,
    /// Whether the function is variadic.
    #[serde(default)]
    pub variadic: bool,
}

/// A single function definition in a translation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FunctionDef {
    /// Stable unique identifier for this function (USR-style).
    pub function_uid: String,
    /// Linker-visible mangled name.
    pub mangled_name: String,
    /// Type signature.
    pub signature: FunctionSignature,
    /// Control-flow graph.
    pub cfg: Cfg,
    /// Optional auxiliary per-function tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<FunctionTables>,
}

/// A complete normalized translation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Nir {
    /// NIR schema version (e.g. `"nir.v1"`).
    pub schema_version: String,
    /// Frontend tool identification, opaque to this crate.
    pub tool: serde_json::Value,
    /// RFC 3339 generation timestamp. Never participates in hashing.
    pub generated_at: String,
    /// Translation-unit identifier.
    pub tu_id: String,
    /// Semantics version this NIR was produced against.
    pub semantics_version: String,
    /// Proof-system version this NIR was produced against.
    pub proof_system_version: String,
    /// Profile version this NIR was produced against.
    pub profile_version: String,
    /// Content hash of the original source input, if the frontend recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_digest: Option<String>,
    /// Every function defined in this translation unit.
    pub functions: Vec<FunctionDef>,
}

impl Nir {
    /// Defensively re-sort this NIR in place: functions by `function_uid`,
    /// blocks by `id`, instructions by `id`, edges by `(from, to, kind)`.
    ///
    /// Frontends are required to emit already-sorted NIR; this is run
    /// unconditionally on load anyway so that two semantically identical
    /// NIR documents always iterate in the same order regardless of
    /// frontend emission order.
    pub fn normalize(&mut self) {
        self.functions.sort_by(|a, b| a.function_uid.cmp(&b.function_uid));
        for func in &mut self.functions {
            func.cfg.blocks.sort_by(|a, b| a.id.cmp(&b.id));
            for block in &mut func.cfg.blocks {
                block.insts.sort_by(|a, b| a.id.cmp(&b.id));
            }
            func.cfg.edges.sort();
            if let Some(tables) = &mut func.tables {
                tables.vcall_candidates.sort_by(|a, b| a.id.cmp(&b.id));
            }
        }
    }

    /// Parse and normalize a NIR document from raw JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ParseError`] if `bytes` is not a valid NIR
    /// document, or [`ErrorCode::InvalidSnapshot`] if it is well-formed
    /// JSON but violates a NIR-level invariant (e.g. an empty function list).
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut nir: Nir = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::new(ErrorCode::ParseError, "invalid NIR document").with_source(e))?;
        if nir.functions.is_empty() {
            return Err(CoreError::new(
                ErrorCode::InvalidSnapshot,
                "NIR document defines no functions",
            ));
        }
        nir.normalize();
        Ok(nir)
    }

    /// Compute the `tu_id` to use when several translation units are
    /// analyzed together: the hash of the sorted array of their individual
    /// `tu_id` hashes. Lossless (every contributing id is preserved in the
    /// hash input) and order-independent.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InternalError`] only if canonicalization of the
    /// (already-plain) input somehow fails.
    pub fn combined_tu_id(tu_ids: &[String]) -> CoreResult<CertHash> {
        let mut sorted: Vec<&String> = tu_ids.iter().collect();
        sorted.sort();
        let value = serde_json::to_value(&sorted)
            .map_err(|e| CoreError::new(ErrorCode::InternalError, "failed to serialize tu_id list").with_source(e))?;
        sappp_canon::hash_value(&value)
    }

    /// Look up a function by its `function_uid`.
    #[must_use]
    pub fn function(&self, function_uid: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.function_uid == function_uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_function(uid: &str) -> FunctionDef {
        FunctionDef {
            function_uid: uid.to_string(),
            mangled_name: format!("_Z{uid}"),
            signature: FunctionSignature {
                return_type: "int".to_string(),
                params: vec![],
                is_noexcept: false,
                variadic: false,
            },
            cfg: Cfg {
                entry: "bb1".to_string(),
                blocks: vec![
                    BasicBlock {
                        id: "bb2".to_string(),
                        insts: vec![Instruction {
                            id: "i2".to_string(),
                            op: Op::Ret,
                            args: vec![],
                            src: None,
                        }],
                    },
                    BasicBlock {
                        id: "bb1".to_string(),
                        insts: vec![],
                    },
                ],
                edges: vec![Edge {
                    from: "bb1".to_string(),
                    to: "bb2".to_string(),
                    kind: "fallthrough".to_string(),
                }],
            },
            tables: None,
        }
    }

    #[test]
    fn normalize_sorts_blocks_by_id() {
        let mut nir = Nir {
            schema_version: "nir.v1".to_string(),
            tool: json!({"name": "test"}),
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            tu_id: "tu1".to_string(),
            semantics_version: "1".to_string(),
            proof_system_version: "1".to_string(),
            profile_version: "1".to_string(),
            input_digest: None,
            functions: vec![sample_function("f2"), sample_function("f1")],
        };
        nir.normalize();
        assert_eq!(nir.functions[0].function_uid, "f1");
        assert_eq!(nir.functions[1].function_uid, "f2");
        assert_eq!(nir.functions[0].cfg.blocks[0].id, "bb1");
        assert_eq!(nir.functions[0].cfg.blocks[1].id, "bb2");
    }

    #[test]
    fn from_bytes_rejects_empty_function_list() {
        let bytes = br#"{
            "schema_version": "nir.v1", "tool": {}, "generated_at": "t",
            "tu_id": "x", "semantics_version": "1", "proof_system_version": "1",
            "profile_version": "1", "functions": []
        }"#;
        let err = Nir::from_bytes(bytes).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSnapshot);
    }

    #[test]
    fn op_roundtrips_known_variants() {
        let v = serde_json::to_value(Op::UbCheck).unwrap();
        assert_eq!(v, json!("ub.check"));
        let back: Op = serde_json::from_value(v).unwrap();
        assert_eq!(back, Op::UbCheck);
    }

    #[test]
    fn op_accepts_unknown_opcode_as_other() {
        let op: Op = serde_json::from_value(json!("frobnicate")).unwrap();
        assert_eq!(op, Op::Other("frobnicate".to_string()));
    }

    #[test]
    fn combined_tu_id_is_order_independent() {
        let a = Nir::combined_tu_id(&["tu_a".to_string(), "tu_b".to_string()]).unwrap();
        let b = Nir::combined_tu_id(&["tu_b".to_string(), "tu_a".to_string()]).unwrap();
        assert_eq!(a, b);
    }
}
