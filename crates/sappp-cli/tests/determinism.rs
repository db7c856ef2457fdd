// SPDX-License-Identifier: MIT OR Apache-2.0
//! S6: worker-count independence. Runs `analyze` + `validate` twice over
//! the same NIR with `jobs=1` and `jobs=8`, stamped with the same
//! `generated_at`, and byte-compares every persisted document spec.md §8
//! names: `po/po_list.json`, `analyzer/unknown_ledger.json`, and
//! `results/validated_results.json`.

use sappp_cli::commands::{analyze, validate};
use sappp_nir::{BasicBlock, Cfg, FunctionDef, FunctionSignature, Instruction, Nir, Op};
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

/// A handful of functions covering BUG, SAFE, and UNKNOWN outcomes across
/// several PO kinds, so the byte-compare exercises more than one worker
/// touching more than one certificate.
fn mixed_nir() -> Nir {
    let functions = vec![
        function(
            "usr::div",
            vec![
                inst("i0", Op::Assign, vec![serde_json::json!("x"), serde_json::json!(0)]),
                inst("i1", Op::UbCheck, vec![serde_json::json!("UB.DivZero")]),
            ],
        ),
        function(
            "usr::deref_safe",
            vec![
                inst("i0", Op::Alloc, vec![serde_json::json!("p")]),
                inst("i1", Op::UbCheck, vec![serde_json::json!("UB.NullDeref")]),
            ],
        ),
        function(
            "usr::index",
            vec![inst(
                "i0",
                Op::Store,
                vec![serde_json::json!("indexed"), serde_json::json!("arr"), serde_json::json!(10), serde_json::json!(5)],
            )],
        ),
        function(
            "usr::calls_out",
            vec![
                inst("i0", Op::Alloc, vec![serde_json::json!("p")]),
                inst("i1", Op::Call, vec![serde_json::json!("ptr"), serde_json::json!("external_fn")]),
                inst("i2", Op::UbCheck, vec![serde_json::json!("UB.NullDeref")]),
            ],
        ),
    ];
    Nir {
        schema_version: "nir.v1".to_string(),
        tool: serde_json::json!({"name": "sappp", "version": sappp_nir::version::VERSION}),
        generated_at: "2026-01-01T00:00:00Z".to_string(),
        tu_id: "tu-determinism".to_string(),
        semantics_version: sappp_nir::version::SEMANTICS_VERSION.to_string(),
        proof_system_version: sappp_nir::version::PROOF_SYSTEM_VERSION.to_string(),
        profile_version: sappp_nir::version::PROFILE_VERSION.to_string(),
        input_digest: None,
        functions,
    }
}

fn write_build(dir: &Path, nir: &Nir) -> std::path::PathBuf {
    let nir_path = dir.join("nir.json");
    std::fs::write(&nir_path, serde_json::to_string(nir).unwrap()).unwrap();
    let manifest_path = dir.join("build.json");
    std::fs::write(&manifest_path, serde_json::to_string(&serde_json::json!({"nir": nir_path})).unwrap()).unwrap();
    manifest_path
}

fn run_pipeline(root: &Path, jobs: usize) -> std::path::PathBuf {
    let dir = root.join(format!("jobs-{jobs}"));
    std::fs::create_dir_all(&dir).unwrap();
    let manifest = write_build(&dir, &mixed_nir());
    let out = dir.join("out");
    analyze(&manifest, &out, Some(jobs), None, "2026-01-01T00:00:00Z").unwrap();
    validate(&out, None, false, None, "2026-01-01T00:00:00Z").unwrap();
    out
}

#[test]
fn jobs_one_and_jobs_eight_produce_byte_identical_artifacts() {
    let root = tempfile::tempdir().unwrap();
    let out1 = run_pipeline(root.path(), 1);
    let out8 = run_pipeline(root.path(), 8);

    for rel in ["po/po_list.json", "analyzer/unknown_ledger.json", "results/validated_results.json"] {
        let a = std::fs::read(out1.join(rel)).unwrap();
        let b = std::fs::read(out8.join(rel)).unwrap();
        assert_eq!(a, b, "{rel} differed between jobs=1 and jobs=8");
    }
}
