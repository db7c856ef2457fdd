// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! Loading, validation, and defaults for the `analysis_config.v1` document.

use sappp_specdb::ContractMatchContext;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default per-function fixpoint iteration budget.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Default interval-widening threshold (loop-head visits before a
/// still-growing bound snaps to infinity).
pub const DEFAULT_WIDENING_THRESHOLD: usize = 4;

/// Fixpoint and wall-clock limits for one `analyze` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BudgetConfig {
    /// Per-function fixpoint iteration cap. Hitting this makes every
    /// still-open PO in the function `UNKNOWN` with `BudgetExceeded`.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Optional overall wall-clock budget for the whole run, in
    /// milliseconds. `None` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_time_ms: Option<u64>,
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            wall_time_ms: None,
        }
    }
}

/// Tuning knobs for the abstract-interpretation product domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MemoryDomainConfig {
    /// Loop-head revisit count after which a still-growing `Interval`
    /// bound is widened to infinity.
    #[serde(default = "default_widening_threshold")]
    pub widening_threshold: usize,
}

fn default_widening_threshold() -> usize {
    DEFAULT_WIDENING_THRESHOLD
}

impl Default for MemoryDomainConfig {
    fn default() -> Self {
        Self {
            widening_threshold: DEFAULT_WIDENING_THRESHOLD,
        }
    }
}

/// The `analysis_config.v1` document: every tunable input to one
/// `analyze` run besides the build/NIR/SpecDB artifacts themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisConfig {
    /// Always `"analysis_config.v1"`.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Fixpoint and wall-clock limits.
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Abstract-domain tuning.
    #[serde(default)]
    pub memory_domain: MemoryDomainConfig,
    /// The ABI/library-version/conditions a contract must match to apply.
    #[serde(default)]
    pub match_context: ContractMatchContext,
    /// Worker thread count for the bounded pool. `None` defers to the
    /// number of available CPUs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
}

fn default_schema_version() -> String {
    "analysis_config.v1".to_string()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            budget: BudgetConfig::default(),
            memory_domain: MemoryDomainConfig::default(),
            match_context: ContractMatchContext::default(),
            jobs: None,
        }
    }
}

/// Errors that can occur while loading or validating an [`AnalysisConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found (or unreadable).
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },
    /// The file could not be parsed as valid JSON.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },
    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

/// Load an [`AnalysisConfig`] from an optional JSON file path, then
/// validate it.
///
/// `path` of `None` yields [`AnalysisConfig::default`] (also validated,
/// though the default is always valid).
///
/// # Errors
///
/// [`ConfigError::FileNotFound`], [`ConfigError::ParseError`], or
/// [`ConfigError::ValidationError`].
pub fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, ConfigError> {
    let config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_json(&content)?
        }
        None => AnalysisConfig::default(),
    };
    validate_config(&config)?;
    Ok(config)
}

/// Parse a JSON string into an [`AnalysisConfig`].
///
/// # Errors
///
/// [`ConfigError::ParseError`] if `content` is not valid JSON or does
/// not match the document shape.
pub fn parse_json(content: &str) -> Result<AnalysisConfig, ConfigError> {
    serde_json::from_str(content).map_err(|e| ConfigError::ParseError { reason: e.to_string() })
}

/// Validate an [`AnalysisConfig`]'s semantic invariants.
///
/// # Errors
///
/// [`ConfigError::ValidationError`] listing every problem found (not
/// just the first), so a caller can report them all at once.
pub fn validate_config(config: &AnalysisConfig) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.schema_version != "analysis_config.v1" {
        errors.push(format!(
            "unsupported schema_version '{}', expected 'analysis_config.v1'",
            config.schema_version
        ));
    }
    if config.budget.max_iterations == 0 {
        errors.push("budget.max_iterations must be greater than zero".to_string());
    }
    if config.memory_domain.widening_threshold == 0 {
        errors.push("memory_domain.widening_threshold must be greater than zero".to_string());
    }
    if let Some(0) = config.jobs {
        errors.push("jobs must be greater than zero when specified".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}
