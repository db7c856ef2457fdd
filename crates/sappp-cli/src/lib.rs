// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! Library half of the `sappp` binary: everything `main.rs` needs is a
//! thin `clap` shell around [`commands`].

/// Library-level implementations of the `sappp` subcommands.
pub mod commands;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One compiled translation unit as recorded by a build capture.
///
/// Mirrors the frontend's own compile-command bookkeeping; `sappp-cli`
/// never parses a real `compile_commands.json` (that stays the external
/// frontend's job), so this type exists only to give the `capture`
/// fixture-replay path something typed to deserialize into and
/// re-serialize canonically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CompileUnit {
    /// Translation-unit identifier, already computed by the frontend.
    pub tu_id: String,
    /// Working directory the compiler was invoked from.
    pub cwd: String,
    /// Full compiler invocation, already split into argv entries.
    pub argv: Vec<String>,
    /// Source language (`"c"` or `"cpp"`).
    pub lang: String,
    /// Language standard (e.g. `"c++20"`).
    pub std: String,
    /// Target triple.
    pub target: String,
    /// Compiler frontend kind (e.g. `"clang"`, `"gcc"`, `"msvc"`).
    pub frontend: String,
    /// Environment variables that differ from the capturing process's
    /// own environment, sorted by key.
    #[serde(default)]
    pub env_delta: Vec<(String, String)>,
    /// Response files referenced by `argv`, if any.
    #[serde(default)]
    pub response_files: Vec<String>,
}

/// Build host description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BuildHost {
    /// Host operating system (e.g. `"linux"`).
    pub os: String,
    /// Host CPU architecture (e.g. `"x86_64"`).
    pub arch: String,
}

/// The `build_snapshot.v1` document.
///
/// Not in `sappp-schema`'s closed [`sappp_schema::KNOWN_SCHEMAS`] registry:
/// that crate can't depend on this one without a cycle (this crate already
/// depends on `sappp-schema`). `capture` still schema-gates every snapshot
/// it reads and writes, through `sappp_schema::validate_value` with a
/// schema derived from this very type via `schemars::schema_for!`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BuildSnapshot {
    /// Always `"build_snapshot.v1"`.
    pub schema_version: String,
    /// Producer tool identity block.
    pub tool: serde_json::Value,
    /// RFC 3339 generation timestamp. Never participates in hashing.
    pub generated_at: String,
    /// The host the capture ran on.
    pub host: BuildHost,
    /// Every compile unit captured from `compile_commands.json`.
    pub compile_units: Vec<CompileUnit>,
    /// Digest of the raw `compile_commands.json` this snapshot was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_digest: Option<String>,
}
