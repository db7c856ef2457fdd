// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! The `sappp` binary: a thin `clap` shell dispatching to
//! [`sappp_cli::commands`]. Every library crate downstream stays on
//! [`sappp_error::CoreError`]; only this file deals in process exit codes.

use clap::{Parser, Subcommand, ValueEnum};
use sappp_cli::commands::{self, CommandError, ExplainFormat};
use std::path::PathBuf;
use std::process::ExitCode;

/// spec.md §6: usage error.
const EXIT_USAGE_ERROR: u8 = 1;

#[derive(Parser)]
#[command(name = "sappp", version, about = "Static absence-proving analyzer for C/C++")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug-level tracing on stderr.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read an already-captured build snapshot fixture and re-emit it canonicalized.
    Capture {
        /// Path to a `build_snapshot.v1`-shaped JSON fixture.
        #[arg(long = "compile-commands")]
        compile_commands: PathBuf,
        /// Output directory.
        #[arg(long)]
        out: PathBuf,
        /// Repository root, recorded but not interpreted.
        #[arg(long = "repo-root")]
        repo_root: Option<PathBuf>,
    },
    /// Run the analyzer pipeline over a translation unit.
    Analyze {
        /// Path to an analysis manifest naming the NIR/PO/SpecDB inputs.
        #[arg(long)]
        build: PathBuf,
        /// Output directory.
        #[arg(long)]
        out: PathBuf,
        /// Worker thread count. Defaults to available parallelism.
        #[arg(long)]
        jobs: Option<usize>,
        /// Path to an `analysis_config.v1` file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Re-check every certificate in a CAS against the core proof rules.
    Validate {
        /// Directory containing `certstore/`.
        #[arg(long = "in")]
        input: PathBuf,
        /// Output path for `validated_results.json`. Defaults to `<in>/results/validated_results.json`.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Surface the first failure instead of downgrading to UNKNOWN.
        #[arg(long)]
        strict: bool,
        /// Accepted for CLI-surface conformance; has no effect.
        #[arg(long = "schema-dir")]
        schema_dir: Option<PathBuf>,
    },
    /// Compare two `validated_results.v1` snapshots.
    Diff {
        /// Earlier `validated_results.v1` snapshot.
        #[arg(long)]
        before: PathBuf,
        /// Later `validated_results.v1` snapshot.
        #[arg(long)]
        after: PathBuf,
        /// Output path for the `diff.v1` document.
        #[arg(long)]
        out: PathBuf,
    },
    /// Render UNKNOWN ledger entries, filtered and formatted for a human.
    Explain {
        /// Path to `unknown.v1` ledger.
        #[arg(long)]
        unknown: PathBuf,
        /// Optional `validated_results.v1` snapshot to intersect against.
        #[arg(long)]
        validated: Option<PathBuf>,
        /// Restrict to one PO id.
        #[arg(long = "po-id")]
        po_id: Option<String>,
        /// Restrict to one unknown-ledger entry id.
        #[arg(long = "unknown-id")]
        unknown_id: Option<String>,
        /// Write to a file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Output rendering.
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,
    },
    /// Print the tool version and the three semantic versions.
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for ExplainFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => ExplainFormat::Text,
            FormatArg::Json => ExplainFormat::Json,
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn run(cli: Cli) -> Result<(), CommandError> {
    match cli.command {
        Commands::Capture { compile_commands, out, repo_root } => {
            commands::capture(&compile_commands, &out, repo_root.as_deref())?;
            Ok(())
        }
        Commands::Analyze { build, out, jobs, config } => {
            commands::analyze(&build, &out, jobs, config.as_deref(), now_rfc3339())?;
            Ok(())
        }
        Commands::Validate { input, out, strict, schema_dir } => {
            commands::validate(&input, out.as_deref(), strict, schema_dir.as_deref(), now_rfc3339())?;
            Ok(())
        }
        Commands::Diff { before, after, out } => {
            commands::diff(&before, &after, &out, now_rfc3339())?;
            Ok(())
        }
        Commands::Explain { unknown, validated, po_id, unknown_id, out, format } => {
            commands::explain(
                &unknown,
                validated.as_deref(),
                po_id.as_deref(),
                unknown_id.as_deref(),
                out.as_deref(),
                format.into(),
            )?;
            Ok(())
        }
        Commands::Version => {
            println!("{}", commands::version_line());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_USAGE_ERROR);
        }
    };

    init_tracing(cli.debug);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_capture_with_all_flags() {
        let cli = Cli::try_parse_from([
            "sappp",
            "capture",
            "--compile-commands",
            "build_snapshot.json",
            "--out",
            "out",
            "--repo-root",
            ".",
        ])
        .unwrap();
        match cli.command {
            Commands::Capture { compile_commands, out, repo_root } => {
                assert_eq!(compile_commands, PathBuf::from("build_snapshot.json"));
                assert_eq!(out, PathBuf::from("out"));
                assert_eq!(repo_root, Some(PathBuf::from(".")));
            }
            _ => panic!("expected Capture"),
        }
    }

    #[test]
    fn cli_rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["sappp", "pack", "--in", "x", "--out", "y"]).is_err());
    }

    #[test]
    fn cli_parses_validate_with_strict_flag() {
        let cli = Cli::try_parse_from(["sappp", "validate", "--in", "d", "--strict"]).unwrap();
        match cli.command {
            Commands::Validate { strict, .. } => assert!(strict),
            _ => panic!("expected Validate"),
        }
    }
}
