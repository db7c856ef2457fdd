// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end scenario tests: NIR in, `sappp analyze` + `sappp validate`
//! out, one test per litmus scenario this workspace commits to covering.
//!
//! Each test builds a minimal NIR document by hand (no frontend involved),
//! writes it plus an `AnalyzeManifest` to a temp directory, runs `analyze`
//! then `validate` against that same directory (the two commands share the
//! `<dir>/certstore` convention), and asserts on the resulting category or
//! unknown code.

use sappp_cli::commands::{analyze, validate};
use sappp_nir::{BasicBlock, Cfg, FunctionDef, FunctionSignature, Instruction, Nir, Op};
use sappp_unknown::UnknownCode;
use sappp_validator::Category;
use std::path::Path;

fn inst(id: &str, op: Op, args: Vec<serde_json::Value>) -> Instruction {
    Instruction { id: id.to_string(), op, args, src: None }
}

fn function(uid: &str, insts: Vec<Instruction>) -> FunctionDef {
    FunctionDef {
        function_uid: uid.to_string(),
        mangled_name: format!("_Z{uid}"),
        signature: FunctionSignature { return_type: "int".to_string(), params: vec![], is_noexcept: false, variadic: false },
        tables: None,
        cfg: Cfg { entry: "bb0".to_string(), blocks: vec![BasicBlock { id: "bb0".to_string(), insts }], edges: vec![] },
    }
}

fn nir_with(func: FunctionDef) -> Nir {
    Nir {
        schema_version: "nir.v1".to_string(),
        tool: serde_json::json!({"name": "sappp", "version": sappp_nir::version::VERSION}),
        generated_at: "2026-01-01T00:00:00Z".to_string(),
        tu_id: "tu-end-to-end".to_string(),
        semantics_version: sappp_nir::version::SEMANTICS_VERSION.to_string(),
        proof_system_version: sappp_nir::version::PROOF_SYSTEM_VERSION.to_string(),
        profile_version: sappp_nir::version::PROFILE_VERSION.to_string(),
        input_digest: None,
        functions: vec![func],
    }
}

/// Write `nir` and a manifest referencing it under `dir`, returning the
/// manifest path `analyze` expects as its `build` argument.
fn write_build(dir: &Path, nir: &Nir) -> std::path::PathBuf {
    let nir_path = dir.join("nir.json");
    std::fs::write(&nir_path, serde_json::to_string(nir).unwrap()).unwrap();
    let manifest_path = dir.join("build.json");
    std::fs::write(&manifest_path, serde_json::to_string(&serde_json::json!({"nir": nir_path})).unwrap()).unwrap();
    manifest_path
}

// ---------------------------------------------------------------------------
// S1: division by zero
// ---------------------------------------------------------------------------

#[test]
fn s1_div_zero_is_confirmed_bug_by_the_validator() {
    let dir = tempfile::tempdir().unwrap();
    let func = function(
        "usr::div",
        vec![
            inst("i0", Op::Assign, vec![serde_json::json!("x"), serde_json::json!(0)]),
            inst("i1", Op::UbCheck, vec![serde_json::json!("UB.DivZero")]),
        ],
    );
    let manifest = write_build(dir.path(), &nir_with(func));
    let out = dir.path().join("out");
    let outcome = analyze(&manifest, &out, Some(1), None, "2026-01-01T00:00:00Z").unwrap();
    assert_eq!(outcome.cert_index.len(), 1);
    assert!(outcome.unknowns.is_empty());

    let results = validate(&out, None, false, None, "2026-01-01T00:00:00Z").unwrap();
    assert_eq!(results.results.len(), 1);
    assert_eq!(results.results[0].category, Category::Bug);
}

// ---------------------------------------------------------------------------
// S2: null dereference
// ---------------------------------------------------------------------------

#[test]
fn s2_null_deref_is_confirmed_bug_by_the_validator() {
    let dir = tempfile::tempdir().unwrap();
    let func = function(
        "usr::deref",
        vec![
            inst("i0", Op::Assign, vec![serde_json::json!("p"), serde_json::Value::Null]),
            inst("i1", Op::UbCheck, vec![serde_json::json!("UB.NullDeref")]),
        ],
    );
    let manifest = write_build(dir.path(), &nir_with(func));
    let out = dir.path().join("out");
    let outcome = analyze(&manifest, &out, Some(1), None, "2026-01-01T00:00:00Z").unwrap();
    assert_eq!(outcome.cert_index.len(), 1);

    let results = validate(&out, None, false, None, "2026-01-01T00:00:00Z").unwrap();
    assert_eq!(results.results[0].category, Category::Bug);
}

// ---------------------------------------------------------------------------
// S3: out-of-bounds access
// ---------------------------------------------------------------------------

#[test]
fn s3_out_of_bounds_index_past_a_constant_size_is_confirmed_bug() {
    let dir = tempfile::tempdir().unwrap();
    let func = function(
        "usr::index",
        vec![inst(
            "i0",
            Op::Store,
            vec![serde_json::json!("indexed"), serde_json::json!("arr"), serde_json::json!(10), serde_json::json!(5)],
        )],
    );
    let manifest = write_build(dir.path(), &nir_with(func));
    let out = dir.path().join("out");
    let outcome = analyze(&manifest, &out, Some(1), None, "2026-01-01T00:00:00Z").unwrap();
    assert_eq!(outcome.cert_index.len(), 1);

    let results = validate(&out, None, false, None, "2026-01-01T00:00:00Z").unwrap();
    assert_eq!(results.results[0].category, Category::Bug);
}

// ---------------------------------------------------------------------------
// S4: use-after-lifetime, direct end vs. move
// ---------------------------------------------------------------------------

#[test]
fn s4_use_after_lifetime_end_is_confirmed_bug() {
    let dir = tempfile::tempdir().unwrap();
    let func = function(
        "usr::use_after_end",
        vec![
            inst("i0", Op::Alloc, vec![serde_json::json!("x")]),
            inst("i1", Op::LifetimeEnd, vec![serde_json::json!("x")]),
            inst("i2", Op::UbCheck, vec![serde_json::json!("UseAfterLifetime")]),
        ],
    );
    let manifest = write_build(dir.path(), &nir_with(func));
    let out = dir.path().join("out");
    let outcome = analyze(&manifest, &out, Some(1), None, "2026-01-01T00:00:00Z").unwrap();
    assert_eq!(outcome.cert_index.len(), 1);

    let results = validate(&out, None, false, None, "2026-01-01T00:00:00Z").unwrap();
    assert_eq!(results.results[0].category, Category::Bug);
}

#[test]
fn s4_use_after_move_is_unknown_not_bug() {
    let dir = tempfile::tempdir().unwrap();
    let func = function(
        "usr::use_after_move",
        vec![
            inst("i0", Op::Alloc, vec![serde_json::json!("x")]),
            // Moving into "_" leaves the moved-from binding's lifetime
            // state untracked rather than proving it dead: the analyzer
            // only updates a move destination's own lifetime, and "_"
            // isn't a real binding.
            inst("i1", Op::Move, vec![serde_json::json!("_"), serde_json::json!("x")]),
            inst("i2", Op::UbCheck, vec![serde_json::json!("UseAfterLifetime")]),
        ],
    );
    let manifest = write_build(dir.path(), &nir_with(func));
    let out = dir.path().join("out");
    let outcome = analyze(&manifest, &out, Some(1), None, "2026-01-01T00:00:00Z").unwrap();
    assert!(outcome.cert_index.is_empty());
    assert_eq!(outcome.unknowns.len(), 1);
    assert_eq!(outcome.unknowns[0].unknown_code, UnknownCode::LifetimeStateUnknown);
}

// ---------------------------------------------------------------------------
// S5: missing contract
// ---------------------------------------------------------------------------

#[test]
fn s5_uncontracted_call_downgrades_an_otherwise_safe_check_to_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let func = function(
        "usr::calls_out",
        vec![
            inst("i0", Op::Alloc, vec![serde_json::json!("p")]),
            // Dest "ptr" is one of nearest_definition's marker exclusions,
            // so the null-check below resolves its subject past this call
            // to "p" rather than to the call's own result.
            inst("i1", Op::Call, vec![serde_json::json!("ptr"), serde_json::json!("external_fn")]),
            inst("i2", Op::UbCheck, vec![serde_json::json!("UB.NullDeref")]),
        ],
    );
    let manifest = write_build(dir.path(), &nir_with(func));
    let out = dir.path().join("out");
    let outcome = analyze(&manifest, &out, Some(1), None, "2026-01-01T00:00:00Z").unwrap();
    assert!(outcome.cert_index.is_empty());
    assert_eq!(outcome.unknowns.len(), 1);
    assert_eq!(outcome.unknowns[0].unknown_code, UnknownCode::MissingContractPre);
}
