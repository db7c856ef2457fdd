// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! Proof obligation (PO) types and the enumerator that walks a
//! [`sappp_nir::Nir`] document and produces one PO per recognized
//! safety-relevant instruction pattern.

use sappp_canon::CertHash;
use sappp_error::{CoreError, CoreResult, ErrorCode};
use sappp_nir::{version, FunctionDef, Location, Nir, Op};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::collections::HashMap;

/// The closed taxonomy of proof-obligation kinds, with an `Other` escape
/// hatch for kinds this workspace does not yet have a named variant for
/// (e.g. a profile-specific kind introduced by a newer frontend).
#[derive(Debug, Clone, PartialEq, Eq, Hash, JsonSchema)]
pub enum PoKind {
    /// Division or modulo by zero.
    DivZero,
    /// Dereference of a null pointer.
    NullDeref,
    /// Access past the bounds of an array or buffer.
    OutOfBounds,
    /// Shift amount exceeds the operand's bit width.
    Shift,
    /// Use of an object after its lifetime has ended.
    UseAfterLifetime,
    /// Deallocation of an already-deallocated object.
    DoubleFree,
    /// Deallocation of a pointer that was never allocated by this allocator.
    InvalidFree,
    /// Read of a value before it was initialized.
    UninitRead,
    /// A PO kind that could not be determined from the available tokens.
    Unknown,
    /// Any kind not in the closed set above.
    Other(String),
}

impl PoKind {
    /// The wire string for this kind (e.g. `"UB.DivZero"`).
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::DivZero => "UB.DivZero",
            Self::NullDeref => "UB.NullDeref",
            Self::OutOfBounds => "UB.OutOfBounds",
            Self::Shift => "UB.Shift",
            Self::UseAfterLifetime => "UseAfterLifetime",
            Self::DoubleFree => "DoubleFree",
            Self::InvalidFree => "InvalidFree",
            Self::UninitRead => "UninitRead",
            Self::Unknown => "UB.Unknown",
            Self::Other(s) => s,
        }
    }

    /// Normalize a free-form token (`"div0"`, `"null-deref"`, `"oob"`, an
    /// already-canonical `"UB.DivZero"`, ...) to a [`PoKind`], per the
    /// alias table used during PO inference.
    #[must_use]
    pub fn normalize(token: &str) -> Self {
        let lower = token.to_ascii_lowercase();
        let stripped = lower.strip_prefix("ub.").unwrap_or(&lower);
        match stripped {
            "div0" | "divzero" | "div_zero" | "div-by-zero" => Self::DivZero,
            "null" | "null_deref" | "null-deref" | "nullderef" => Self::NullDeref,
            "oob" | "out_of_bounds" | "out-of-bounds" | "outofbounds" => Self::OutOfBounds,
            "shift" => Self::Shift,
            "useafterlifetime" | "use_after_lifetime" | "use-after-lifetime" => Self::UseAfterLifetime,
            "doublefree" | "double_free" | "double-free" => Self::DoubleFree,
            "invalidfree" | "invalid_free" | "invalid-free" => Self::InvalidFree,
            "uninitread" | "uninit_read" | "uninit-read" => Self::UninitRead,
            "unknown" => Self::Unknown,
            _ => Self::Other(token.to_string()),
        }
    }
}

impl Serialize for PoKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PoKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::normalize(&s))
    }
}

/// Identity of the repository file a PO's anchor instruction came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RepoIdentity {
    /// Workspace-relative (or `"unknown"`) source file path.
    pub path: String,
    /// `sha256:`-prefixed content hash of that file at analysis time.
    pub content_sha256: String,
}

/// Function identity carried alongside a PO for display purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FunctionRef {
    /// Stable function identifier (`function_uid`).
    pub usr: String,
    /// Linker-visible mangled name.
    pub mangled: String,
}

/// Precise location of the instruction that gave rise to a PO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Anchor {
    /// Containing basic block id.
    pub block_id: String,
    /// Instruction id within that block.
    pub inst_id: String,
    /// Source location, if the instruction carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<Location>,
}

/// The logical predicate a PO asserts must hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Predicate {
    /// Structured predicate expression, e.g. `{"op":"ub.check","args":["UB.DivZero"]}`.
    pub expr: serde_json::Value,
    /// Human-readable rendering, e.g. `"ub.check(UB.DivZero)"`.
    pub pretty: String,
}

/// A single proof obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Po {
    /// Content-addressed, stable identifier for this PO.
    pub po_id: CertHash,
    /// The kind of undefined behavior or safety property at stake.
    pub po_kind: PoKind,
    /// Identity of the source file this PO's anchor belongs to.
    pub repo_identity: RepoIdentity,
    /// The function this PO was found in.
    pub function: FunctionRef,
    /// Where in the CFG this PO was found.
    pub anchor: Anchor,
    /// The predicate this PO asserts.
    pub predicate: Predicate,
    /// Semantics version this PO was generated against.
    pub semantics_version: String,
    /// Proof-system version this PO was generated against.
    pub proof_system_version: String,
    /// Profile version this PO was generated against.
    pub profile_version: String,
}

fn arg_str(args: &[serde_json::Value], index: usize) -> Option<&str> {
    args.get(index).and_then(serde_json::Value::as_str)
}

fn predicate_for(kind: &PoKind) -> Predicate {
    let kind_str = kind.as_str();
    Predicate {
        expr: serde_json::json!({ "op": "ub.check", "args": [kind_str] }),
        pretty: format!("ub.check({kind_str})"),
    }
}

fn repo_identity_for(
    src: Option<&Location>,
    file_hashes: &mut HashMap<String, String>,
) -> CoreResult<RepoIdentity> {
    let Some(loc) = src else {
        let empty_hash = sappp_canon::hash_value(&serde_json::json!(""))?;
        return Ok(RepoIdentity {
            path: "unknown".to_string(),
            content_sha256: empty_hash.to_string(),
        });
    };
    if let Some(hash) = file_hashes.get(&loc.file) {
        return Ok(RepoIdentity {
            path: loc.file.clone(),
            content_sha256: hash.clone(),
        });
    }
    let contents = std::fs::read(&loc.file)
        .map_err(|e| CoreError::new(ErrorCode::IoError, "failed to read source file for PO identity")
            .with_context("file", &loc.file)
            .with_source(e))?;
    let hash = CertHash::from_digest(&sha2::Sha256::digest(&contents));
    let hash_str = hash.to_string();
    file_hashes.insert(loc.file.clone(), hash_str.clone());
    Ok(RepoIdentity {
        path: loc.file.clone(),
        content_sha256: hash_str,
    })
}

fn compute_po_id(
    repo_identity: &RepoIdentity,
    function_uid: &str,
    anchor: &Anchor,
    po_kind: &PoKind,
) -> CoreResult<CertHash> {
    let input = serde_json::json!({
        "repo_identity": repo_identity,
        "function_uid": function_uid,
        "block_id": anchor.block_id,
        "inst_id": anchor.inst_id,
        "po_kind": po_kind.as_str(),
        "semantics_version": version::SEMANTICS_VERSION,
        "proof_system_version": version::PROOF_SYSTEM_VERSION,
        "profile_version": version::PROFILE_VERSION,
    });
    sappp_canon::hash_value(&input)
}

fn build_po(
    func: &FunctionDef,
    block_id: &str,
    inst_id: &str,
    src: Option<&Location>,
    kind: PoKind,
    file_hashes: &mut HashMap<String, String>,
) -> CoreResult<Po> {
    let repo_identity = repo_identity_for(src, file_hashes)?;
    let anchor = Anchor {
        block_id: block_id.to_string(),
        inst_id: inst_id.to_string(),
        src: src.cloned(),
    };
    let po_id = compute_po_id(&repo_identity, &func.function_uid, &anchor, &kind)?;
    Ok(Po {
        po_id,
        po_kind: kind.clone(),
        repo_identity,
        function: FunctionRef {
            usr: func.function_uid.clone(),
            mangled: func.mangled_name.clone(),
        },
        anchor,
        predicate: predicate_for(&kind),
        semantics_version: version::SEMANTICS_VERSION.to_string(),
        proof_system_version: version::PROOF_SYSTEM_VERSION.to_string(),
        profile_version: version::PROFILE_VERSION.to_string(),
    })
}

/// Walk every function in `nir` and enumerate one PO per recognized
/// safety-relevant instruction pattern:
///
/// - `ub.check(K, ...)` reflects `K`.
/// - `load` whose first argument is the string `"ptr"` → `UB.NullDeref`.
/// - `store` whose first argument is the string `"indexed"` → `UB.OutOfBounds`.
///   Arguments 2 and 3 (after the marker and the dest operand), when
///   present, carry the index and the declared bound — each either a
///   literal number or the name of a variable the interval domain tracks —
///   so the analyzer can compare them directly.
/// - `free` of a symbol (its first argument) already freed earlier in the
///   same function, in block/instruction order → `DoubleFree`.
/// - `sink.marker(kind, ...)` (litmus/test fixtures only) → a PO of `kind`.
///
/// Output is stable-sorted by `po_id`.
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidPoList`] if no PO was found anywhere in
/// `nir`, and [`ErrorCode::IoError`] if a source file referenced by an
/// anchor could not be read while computing its `repo_identity`.
pub fn enumerate_pos(nir: &Nir) -> CoreResult<Vec<Po>> {
    let mut pos = Vec::new();
    let mut file_hashes: HashMap<String, String> = HashMap::new();

    for func in &nir.functions {
        let mut freed_symbols: std::collections::HashSet<String> = std::collections::HashSet::new();
        for block in &func.cfg.blocks {
            for inst in &block.insts {
                let src = inst.src.as_ref();
                match &inst.op {
                    Op::UbCheck => {
                        let kind = arg_str(&inst.args, 0)
                            .map(PoKind::normalize)
                            .unwrap_or(PoKind::Unknown);
                        pos.push(build_po(func, &block.id, &inst.id, src, kind, &mut file_hashes)?);
                    }
                    Op::Load => {
                        if arg_str(&inst.args, 0) == Some("ptr") {
                            pos.push(build_po(
                                func,
                                &block.id,
                                &inst.id,
                                src,
                                PoKind::NullDeref,
                                &mut file_hashes,
                            )?);
                        }
                    }
                    Op::Store => {
                        if arg_str(&inst.args, 0) == Some("indexed") {
                            pos.push(build_po(
                                func,
                                &block.id,
                                &inst.id,
                                src,
                                PoKind::OutOfBounds,
                                &mut file_hashes,
                            )?);
                        }
                    }
                    Op::Free => {
                        if let Some(symbol) = arg_str(&inst.args, 0) {
                            if !freed_symbols.insert(symbol.to_string()) {
                                pos.push(build_po(
                                    func,
                                    &block.id,
                                    &inst.id,
                                    src,
                                    PoKind::DoubleFree,
                                    &mut file_hashes,
                                )?);
                            }
                        }
                    }
                    Op::SinkMarker => {
                        let kind = arg_str(&inst.args, 0)
                            .map(PoKind::normalize)
                            .unwrap_or(PoKind::Unknown);
                        pos.push(build_po(func, &block.id, &inst.id, src, kind, &mut file_hashes)?);
                    }
                    _ => {}
                }
            }
        }
    }

    if pos.is_empty() {
        return Err(CoreError::new(
            ErrorCode::InvalidPoList,
            "no proof obligations found during PO enumeration",
        ));
    }

    pos.sort_by(|a, b| a.po_id.cmp(&b.po_id));
    Ok(pos)
}

/// The `po/po_list.json` document: every PO enumerated from one
/// translation unit, wrapped with provenance and version metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PoList {
    /// Document schema version (`"po.v1"`).
    pub schema_version: String,
    /// Producer tool identity, copied from the source NIR.
    pub tool: serde_json::Value,
    /// RFC 3339 generation timestamp.
    pub generated_at: String,
    /// The translation unit this PO list covers.
    pub tu_id: String,
    /// Semantics version every PO in this list was generated against.
    pub semantics_version: String,
    /// Proof-system version every PO in this list was generated against.
    pub proof_system_version: String,
    /// Profile version every PO in this list was generated against.
    pub profile_version: String,
    /// The enumerated, `po_id`-sorted proof obligations.
    pub pos: Vec<Po>,
}

/// Build the `po/po_list.json` document for `nir`, copying `tool`/`tu_id`
/// from it and stamping `generated_at`.
///
/// # Errors
///
/// See [`enumerate_pos`].
pub fn build_po_list(nir: &Nir, generated_at: impl Into<String>) -> CoreResult<PoList> {
    let pos = enumerate_pos(nir)?;
    Ok(PoList {
        schema_version: "po.v1".to_string(),
        tool: nir.tool.clone(),
        generated_at: generated_at.into(),
        tu_id: nir.tu_id.clone(),
        semantics_version: version::SEMANTICS_VERSION.to_string(),
        proof_system_version: version::PROOF_SYSTEM_VERSION.to_string(),
        profile_version: version::PROFILE_VERSION.to_string(),
        pos,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sappp_nir::{BasicBlock, Cfg, FunctionSignature, Instruction};
    use std::io::Write;

    fn nir_with_ub_check(kind_token: &str) -> Nir {
        Nir {
            schema_version: "nir.v1".to_string(),
            tool: serde_json::json!({}),
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            tu_id: "tu1".to_string(),
            semantics_version: version::SEMANTICS_VERSION.to_string(),
            proof_system_version: version::PROOF_SYSTEM_VERSION.to_string(),
            profile_version: version::PROFILE_VERSION.to_string(),
            input_digest: None,
            functions: vec![FunctionDef {
                function_uid: "f1".to_string(),
                mangled_name: "_Zf1".to_string(),
                signature: FunctionSignature {
                    return_type: "int".to_string(),
                    params: vec![],
                    is_noexcept: false,
                    variadic: false,
                },
                cfg: Cfg {
                    entry: "bb1".to_string(),
                    blocks: vec![BasicBlock {
                        id: "bb1".to_string(),
                        insts: vec![Instruction {
                            id: "i1".to_string(),
                            op: Op::UbCheck,
                            args: vec![serde_json::json!(kind_token)],
                            src: None,
                        }],
                    }],
                    edges: vec![],
                },
                tables: None,
            }],
        }
    }

    #[test]
    fn enumerates_one_po_per_ub_check() {
        let nir = nir_with_ub_check("div0");
        let pos = enumerate_pos(&nir).unwrap();
        assert_eq!(pos.len(), 1);
        assert_eq!(pos[0].po_kind, PoKind::DivZero);
    }

    #[test]
    fn po_list_copies_tu_id_and_tool_from_nir() {
        let nir = nir_with_ub_check("div0");
        let list = build_po_list(&nir, "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(list.schema_version, "po.v1");
        assert_eq!(list.tu_id, nir.tu_id);
        assert_eq!(list.tool, nir.tool);
        assert_eq!(list.pos.len(), 1);
    }

    #[test]
    fn empty_nir_yields_invalid_po_list() {
        let mut nir = nir_with_ub_check("div0");
        nir.functions[0].cfg.blocks[0].insts.clear();
        let err = enumerate_pos(&nir).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPoList);
    }

    #[test]
    fn po_id_is_deterministic() {
        let nir = nir_with_ub_check("null");
        let a = enumerate_pos(&nir).unwrap();
        let b = enumerate_pos(&nir).unwrap();
        assert_eq!(a[0].po_id, b[0].po_id);
    }

    #[test]
    fn double_free_detected_on_repeated_symbol() {
        let mut nir = nir_with_ub_check("div0");
        nir.functions[0].cfg.blocks[0].insts = vec![
            Instruction {
                id: "i1".to_string(),
                op: Op::Free,
                args: vec![serde_json::json!("p")],
                src: None,
            },
            Instruction {
                id: "i2".to_string(),
                op: Op::Free,
                args: vec![serde_json::json!("p")],
                src: None,
            },
        ];
        let pos = enumerate_pos(&nir).unwrap();
        assert_eq!(pos.len(), 1);
        assert_eq!(pos[0].po_kind, PoKind::DoubleFree);
        assert_eq!(pos[0].anchor.inst_id, "i2");
    }

    #[test]
    fn repo_identity_hashes_actual_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"int main() {}").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let mut nir = nir_with_ub_check("oob");
        nir.functions[0].cfg.blocks[0].insts[0].src = Some(Location {
            file: path,
            line: 1,
            col: 1,
        });
        let pos = enumerate_pos(&nir).unwrap();
        assert_eq!(pos[0].po_kind, PoKind::OutOfBounds);
        assert!(pos[0].repo_identity.content_sha256.starts_with("sha256:"));
    }

    #[test]
    fn po_kind_normalizes_known_aliases() {
        assert_eq!(PoKind::normalize("UB.DivZero"), PoKind::DivZero);
        assert_eq!(PoKind::normalize("out-of-bounds"), PoKind::OutOfBounds);
        assert_eq!(PoKind::normalize("totally-unknown"), PoKind::Other("totally-unknown".to_string()));
    }
}
