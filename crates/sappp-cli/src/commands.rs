// SPDX-License-Identifier: MIT OR Apache-2.0
//! Library-level implementations of the `sappp` subcommands, kept
//! separate from `main.rs` so they can be exercised without spawning the
//! binary.

use crate::BuildSnapshot;
use anyhow::{Context, Result};
use sappp_analyzer::{AnalysisOutcome, CancellationToken as AnalyzeCancellationToken};
use sappp_cert::CasStore;
use sappp_config::AnalysisConfig;
use sappp_diff::{build_diff, filter_unknowns, DiffDocument};
use sappp_nir::{version, Nir};
use sappp_po::{build_po_list, PoList};
use sappp_specdb::SpecdbSnapshot;
use sappp_unknown::UnknownLedger;
use sappp_validator::{CancellationToken as ValidateCancellationToken, ValidatedResults};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

fn tool_identity() -> serde_json::Value {
    serde_json::json!({"name": "sappp", "version": version::VERSION})
}

// ---------------------------------------------------------------------------
// Exit-code-carrying error
// ---------------------------------------------------------------------------

/// The exit code bucket spec.md §6 assigns to a command failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Bad arguments or missing/unreadable input paths.
    Usage,
    /// Parse/schema/semantic validation failure.
    Processing,
    /// A `validate --strict` run surfaced a soundness-critical failure.
    Soundness,
}

impl Severity {
    /// The process exit code for this bucket (spec.md §6: 1/2/3).
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Usage => 1,
            Self::Processing => 2,
            Self::Soundness => 3,
        }
    }
}

/// A command failure paired with the exit code it should produce.
///
/// Library crates downstream of this one stay on [`sappp_error::CoreError`];
/// this wrapper exists only at the command layer, where every one of those
/// typed errors collapses into "what should the process exit with".
#[derive(Debug)]
pub struct CommandError {
    severity: Severity,
    error: anyhow::Error,
}

impl CommandError {
    /// Wrap an error as a usage failure (exit code 1).
    pub fn usage(error: impl Into<anyhow::Error>) -> Self {
        Self { severity: Severity::Usage, error: error.into() }
    }

    /// Wrap an error as a schema/validation failure (exit code 2).
    pub fn processing(error: impl Into<anyhow::Error>) -> Self {
        Self { severity: Severity::Processing, error: error.into() }
    }

    /// Wrap an error as a strict-mode soundness failure (exit code 3).
    pub fn soundness(error: impl Into<anyhow::Error>) -> Self {
        Self { severity: Severity::Soundness, error: error.into() }
    }

    /// The exit code this failure should produce.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.severity.exit_code()
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

impl From<sappp_error::CoreError> for CommandError {
    fn from(e: sappp_error::CoreError) -> Self {
        Self::processing(anyhow::anyhow!(e))
    }
}

impl From<sappp_config::ConfigError> for CommandError {
    fn from(e: sappp_config::ConfigError) -> Self {
        Self::processing(anyhow::anyhow!(e.to_string()))
    }
}

type CommandResult<T> = Result<T, CommandError>;

fn write_json_atomically<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create directory '{}'", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(value).context("serialize output document")?;
    std::fs::write(path, body).with_context(|| format!("write '{}'", path.display()))?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read '{}'", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse '{}' as JSON", path.display()))
}

// ---------------------------------------------------------------------------
// capture
// ---------------------------------------------------------------------------

/// Read an already-captured `build_snapshot.v1` fixture at `compile_commands`,
/// schema-check its shape, and re-emit it canonicalized to
/// `<out>/build_snapshot.json`.
///
/// This binary does not parse real compiler invocations: frontend
/// extraction is out of scope (spec.md §1). `compile_commands` is expected
/// to already be a `build_snapshot.v1` document, not a raw
/// `compile_commands.json`.
pub fn capture(compile_commands: &Path, out: &Path, repo_root: Option<&Path>) -> CommandResult<BuildSnapshot> {
    let build_snapshot_schema = serde_json::to_value(schemars::schema_for!(BuildSnapshot)).expect("schemars output always serializes");

    let value: serde_json::Value = {
        let content = std::fs::read_to_string(compile_commands)
            .map_err(|e| CommandError::usage(anyhow::anyhow!("read '{}': {e}", compile_commands.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| CommandError::processing(anyhow::anyhow!("parse '{}': {e}", compile_commands.display())))?
    };
    sappp_schema::validate_value(&value, "build_snapshot.v1", &build_snapshot_schema)?;
    let snapshot: BuildSnapshot = serde_json::from_value(value)
        .map_err(|e| CommandError::processing(anyhow::anyhow!("'{}' is not a valid build_snapshot.v1 document: {e}", compile_commands.display())))?;

    if let Some(root) = repo_root {
        tracing::debug!(repo_root = %root.display(), "repo_root recorded for reference, not interpreted");
    }

    let out_value = serde_json::to_value(&snapshot).context("serialize build snapshot").map_err(CommandError::usage)?;
    sappp_schema::validate_value(&out_value, "build_snapshot.v1", &build_snapshot_schema)?;
    write_json_atomically(&out.join("build_snapshot.json"), &snapshot).map_err(CommandError::usage)?;
    Ok(snapshot)
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

/// The set of artifact paths one `analyze` run needs: a NIR document, and
/// optionally an already-generated PO list and SpecDB snapshot. Generated
/// in-process when absent, mirroring spec.md §4's "C4 generates POs
/// in-process" allowance.
///
/// The CLI surface of spec.md §6 gives `analyze` a single `--build F` flag
/// standing in for three distinct artifact kinds (NIR/PO/SpecDB); this
/// manifest is the resolution chosen for that ambiguity (see DESIGN.md).
#[derive(Debug, Deserialize)]
struct AnalyzeManifest {
    nir: PathBuf,
    #[serde(default)]
    po_list: Option<PathBuf>,
    #[serde(default)]
    specdb: Option<PathBuf>,
}

/// Run `analyze`: loads the NIR/PO/SpecDB inputs `build` references, runs
/// the analyzer pipeline, and writes `po/po_list.json`,
/// `analyzer/unknown_ledger.json`, and the CAS objects/index under `out`
/// (spec.md §6's persisted state layout; certificate objects are written
/// directly by the analyzer as it classifies each PO).
pub fn analyze(
    build: &Path,
    out: &Path,
    jobs: Option<usize>,
    config: Option<&Path>,
    generated_at: impl Into<String> + Clone,
) -> CommandResult<AnalysisOutcome> {
    let manifest: AnalyzeManifest = read_json(build).map_err(CommandError::usage)?;

    let nir_bytes = std::fs::read(&manifest.nir)
        .map_err(|e| CommandError::usage(anyhow::anyhow!("read '{}': {e}", manifest.nir.display())))?;
    let nir_value: serde_json::Value = serde_json::from_slice(&nir_bytes)
        .map_err(|e| CommandError::processing(anyhow::anyhow!("parse '{}' as JSON: {e}", manifest.nir.display())))?;
    sappp_schema::validate(&nir_value, "nir.v1")?;
    let nir = Nir::from_bytes(&nir_bytes)?;

    let po_list: PoList = match &manifest.po_list {
        Some(path) => {
            let value: serde_json::Value = read_json(path).map_err(CommandError::usage)?;
            sappp_schema::validate(&value, "po.v1")?;
            serde_json::from_value(value).map_err(|e| CommandError::processing(anyhow::anyhow!("'{}' is not a valid po.v1 document: {e}", path.display())))?
        }
        None => build_po_list(&nir, generated_at.clone().into())?,
    };

    let specdb: SpecdbSnapshot = match &manifest.specdb {
        Some(path) => {
            let value: serde_json::Value = read_json(path).map_err(CommandError::usage)?;
            sappp_schema::validate(&value, "specdb_snapshot.v1")?;
            serde_json::from_value(value)
                .map_err(|e| CommandError::processing(anyhow::anyhow!("'{}' is not a valid specdb_snapshot.v1 document: {e}", path.display())))?
        }
        None => sappp_specdb::build_snapshot(None, &[], tool_identity(), generated_at.clone().into())?,
    };

    let mut analysis_config = match config {
        Some(path) => sappp_config::load_config(Some(path))?,
        None => AnalysisConfig::default(),
    };
    if let Some(n) = jobs {
        analysis_config.jobs = Some(n);
    }
    sappp_config::validate_config(&analysis_config)?;

    let cas = CasStore::new(out.join("certstore"));
    let cancel = AnalyzeCancellationToken::new();

    let outcome = sappp_analyzer::analyze(&nir, &po_list, &specdb, &cas, &analysis_config, &cancel)?;

    let po_list_value = serde_json::to_value(&po_list).context("serialize po list").map_err(CommandError::usage)?;
    sappp_schema::validate(&po_list_value, "po.v1")?;
    write_json_atomically(&out.join("po").join("po_list.json"), &po_list).map_err(CommandError::usage)?;

    let mut ledger = UnknownLedger {
        schema_version: "unknown.v1".to_string(),
        tool: tool_identity(),
        generated_at: generated_at.into(),
        tu_id: nir.tu_id.clone(),
        unknowns: outcome.unknowns.clone(),
        semantics_version: version::SEMANTICS_VERSION.to_string(),
        proof_system_version: version::PROOF_SYSTEM_VERSION.to_string(),
        profile_version: version::PROFILE_VERSION.to_string(),
        input_digest: nir.input_digest.clone(),
    };
    ledger.sort();
    let ledger_value = serde_json::to_value(&ledger).context("serialize unknown ledger").map_err(CommandError::usage)?;
    sappp_schema::validate(&ledger_value, "unknown.v1")?;
    write_json_atomically(&out.join("analyzer").join("unknown_ledger.json"), &ledger).map_err(CommandError::usage)?;

    Ok(outcome)
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

/// Run `validate`: re-checks every `cert_index.v1` entry under
/// `<input_dir>/certstore/index` and writes `validated_results.json`
/// (default `<input_dir>/results/validated_results.json`, or `out` when
/// given).
///
/// `schema_dir` is accepted for CLI-surface conformance with spec.md §6
/// but has no effect: schemas here are derived from the workspace's own
/// types (`sappp-schema`), not loaded from a directory of sidecar files.
pub fn validate(
    input_dir: &Path,
    out: Option<&Path>,
    strict: bool,
    schema_dir: Option<&Path>,
    generated_at: impl Into<String>,
) -> CommandResult<ValidatedResults> {
    if let Some(dir) = schema_dir {
        tracing::warn!(schema_dir = %dir.display(), "schema-dir is accepted but ignored: schemas are derived from Rust types");
    }

    let cancel = ValidateCancellationToken::new();
    let results = sappp_validator::validate(input_dir, strict, &cancel, generated_at)
        .map_err(|e| if strict { CommandError::soundness(anyhow::anyhow!(e)) } else { CommandError::from(e) })?;

    let results_value = serde_json::to_value(&results).context("serialize validated results").map_err(CommandError::usage)?;
    let results_schema = serde_json::to_value(schemars::schema_for!(ValidatedResults)).expect("schemars output always serializes");
    sappp_schema::validate_value(&results_value, "validated_results.v1", &results_schema)?;

    let out_path = out.map(PathBuf::from).unwrap_or_else(|| input_dir.join("results").join("validated_results.json"));
    write_json_atomically(&out_path, &results).map_err(CommandError::usage)?;
    Ok(results)
}

// ---------------------------------------------------------------------------
// diff
// ---------------------------------------------------------------------------

/// Run `diff`: compares two `validated_results.v1` snapshots and writes a
/// `diff.v1` document to `out`.
pub fn diff(before: &Path, after: &Path, out: &Path, generated_at: impl Into<String>) -> CommandResult<DiffDocument> {
    let results_schema = serde_json::to_value(schemars::schema_for!(ValidatedResults)).expect("schemars output always serializes");

    let before_value: serde_json::Value = read_json(before).map_err(CommandError::usage)?;
    sappp_schema::validate_value(&before_value, "validated_results.v1", &results_schema)?;
    let before: ValidatedResults = serde_json::from_value(before_value)
        .map_err(|e| CommandError::processing(anyhow::anyhow!("'{}' is not a valid validated_results.v1 document: {e}", before.display())))?;

    let after_value: serde_json::Value = read_json(after).map_err(CommandError::usage)?;
    sappp_schema::validate_value(&after_value, "validated_results.v1", &results_schema)?;
    let after: ValidatedResults = serde_json::from_value(after_value)
        .map_err(|e| CommandError::processing(anyhow::anyhow!("'{}' is not a valid validated_results.v1 document: {e}", after.display())))?;

    let doc = build_diff(&before.results, &after.results, None, tool_identity(), generated_at);
    let doc_value = serde_json::to_value(&doc).context("serialize diff document").map_err(CommandError::usage)?;
    let diff_schema = serde_json::to_value(schemars::schema_for!(DiffDocument)).expect("schemars output always serializes");
    sappp_schema::validate_value(&doc_value, "diff.v1", &diff_schema)?;
    write_json_atomically(out, &doc).map_err(CommandError::usage)?;
    Ok(doc)
}

// ---------------------------------------------------------------------------
// explain
// ---------------------------------------------------------------------------

/// Rendering format for `explain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplainFormat {
    /// Human-readable, one entry per line.
    Text,
    /// Pretty-printed JSON array.
    Json,
}

/// Run `explain`: filter an UNKNOWN ledger by PO id, unknown id, and/or
/// co-occurrence with a validated-results set, and render the matches.
///
/// This is the only command allowed to `println!`: every other command's
/// user-visible output is the document it writes to disk.
pub fn explain(
    unknown: &Path,
    validated: Option<&Path>,
    po_id: Option<&str>,
    unknown_id: Option<&str>,
    out: Option<&Path>,
    format: ExplainFormat,
) -> CommandResult<()> {
    let ledger_value: serde_json::Value = read_json(unknown).map_err(CommandError::usage)?;
    sappp_schema::validate(&ledger_value, "unknown.v1")?;
    let ledger: UnknownLedger = serde_json::from_value(ledger_value)
        .map_err(|e| CommandError::processing(anyhow::anyhow!("'{}' is not a valid unknown.v1 document: {e}", unknown.display())))?;

    let validated_schema = serde_json::to_value(schemars::schema_for!(ValidatedResults)).expect("schemars output always serializes");
    let validated_results: Option<ValidatedResults> = match validated {
        Some(path) => {
            let value: serde_json::Value = read_json(path).map_err(CommandError::usage)?;
            sappp_schema::validate_value(&value, "validated_results.v1", &validated_schema)?;
            Some(serde_json::from_value(value).map_err(|e| {
                CommandError::processing(anyhow::anyhow!("'{}' is not a valid validated_results.v1 document: {e}", path.display()))
            })?)
        }
        None => None,
    };
    let validated_slice = validated_results.as_ref().map(|v| v.results.as_slice());

    let matches = filter_unknowns(&ledger.unknowns, validated_slice, po_id, unknown_id);

    let rendered = match format {
        ExplainFormat::Json => serde_json::to_string_pretty(&matches).context("serialize explain output").map_err(CommandError::usage)?,
        ExplainFormat::Text => matches
            .iter()
            .map(|r| {
                format!(
                    "{} po={} code={} — {}",
                    r.unknown_stable_id.as_str(),
                    r.po_id.as_str(),
                    r.unknown_code.as_str(),
                    r.refinement_plan.message
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    };

    match out {
        Some(path) => std::fs::write(path, &rendered).with_context(|| format!("write '{}'", path.display())).map_err(CommandError::usage)?,
        None => println!("{rendered}"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// version
// ---------------------------------------------------------------------------

/// The version line printed by `sappp version`: the binary's Cargo version
/// plus the three semantic versions every artifact carries.
#[must_use]
pub fn version_line() -> String {
    format!(
        "sappp {} (semantics={}, proof_system={}, profile={})",
        env!("CARGO_PKG_VERSION"),
        version::SEMANTICS_VERSION,
        version::PROOF_SYSTEM_VERSION,
        version::PROFILE_VERSION
    )
}
