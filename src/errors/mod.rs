// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Error types
//!
//! Every failure halts the pipeline. Errors carry enough context (step name,
//! URL, archive path) for the operator to fix the cause and rerun.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for crossflow operations
pub type CrossflowResult<T> = Result<T, CrossflowError>;

/// Main error type for crossflow
#[derive(Error, Debug, Diagnostic)]
pub enum CrossflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Artifact Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to download '{url}': {reason}")]
    #[diagnostic(
        code(crossflow::download_failed),
        help("The destination was left absent; rerun 'crossflow run' to retry from zero")
    )]
    DownloadFailed { url: String, reason: String },

    #[error("Failed to extract '{archive}': {reason}")]
    #[diagnostic(code(crossflow::extraction_failed))]
    ExtractionFailed {
        archive: PathBuf,
        reason: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Step Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Step '{step}' failed{}", .exit_code.map(|c| format!(" with exit code {}", c)).unwrap_or_default())]
    #[diagnostic(
        code(crossflow::step_failed),
        help("Fix the cause and rerun 'crossflow run'; completed steps will be skipped")
    )]
    StepFailed {
        step: String,
        exit_code: Option<i32>,
        #[source]
        source: Option<Box<CrossflowError>>,
    },

    #[error("Step '{step}' was interrupted")]
    #[diagnostic(
        code(crossflow::interrupted),
        help("No completion marker was written; the step will run again next time")
    )]
    Interrupted { step: String },

    #[error("Tool '{tool}' execution failed: {error}")]
    #[diagnostic(code(crossflow::tool_execution_failed))]
    ToolExecutionFailed {
        tool: String,
        error: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline file not found: {path}")]
    #[diagnostic(
        code(crossflow::pipeline_not_found),
        help("Create a pipeline with 'crossflow init' or write .crossflow.yaml manually")
    )]
    PipelineNotFound { path: PathBuf },

    #[error("Invalid pipeline configuration: {reason}")]
    #[diagnostic(code(crossflow::invalid_pipeline))]
    InvalidPipeline {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Stage '{stage}' is invalid: {reason}")]
    #[diagnostic(code(crossflow::invalid_stage))]
    InvalidStage { stage: String, reason: String },

    #[error("Step '{step}' is declared more than once")]
    #[diagnostic(
        code(crossflow::duplicate_step),
        help("Step names key the completion markers and must be unique")
    )]
    DuplicateStep { step: String },

    #[error("Circular dependency detected: {}", .stages.join(" → "))]
    #[diagnostic(
        code(crossflow::circular_dependency),
        help("Review your stage dependencies to remove the cycle")
    )]
    CircularDependency { stages: Vec<String> },

    #[error("Stage '{stage}' depends on unknown stage '{dependency}'")]
    #[diagnostic(
        code(crossflow::unknown_dependency),
        help("Check that '{dependency}' is defined in your pipeline")
    )]
    UnknownDependency { stage: String, dependency: String },

    #[error("Step '{step}' not found in pipeline")]
    #[diagnostic(code(crossflow::step_not_found))]
    StepNotFound { step: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Marker Store Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Marker store error: {message}")]
    #[diagnostic(code(crossflow::marker_store))]
    MarkerStore { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(crossflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Failed to write file '{path}': {error}")]
    #[diagnostic(code(crossflow::file_write_error))]
    FileWriteError { path: PathBuf, error: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(crossflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(crossflow::yaml_error))]
    Yaml { message: String },
}

impl From<std::io::Error> for CrossflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for CrossflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl CrossflowError {
    /// Create a download failure for `url`
    pub fn download(url: &str, reason: impl ToString) -> Self {
        Self::DownloadFailed {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an extraction failure with a hint derived from the reason
    pub fn extraction(archive: &std::path::Path, reason: impl ToString) -> Self {
        let reason = reason.to_string();
        let help = Self::generate_help_for_extraction(&reason);
        Self::ExtractionFailed {
            archive: archive.to_path_buf(),
            reason,
            help,
        }
    }

    /// Name of the step this error is attributed to, if any
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::StepFailed { step, .. } | Self::Interrupted { step } => Some(step),
            _ => None,
        }
    }

    fn generate_help_for_extraction(reason: &str) -> Option<String> {
        if reason.contains("top-level") {
            Some("The archive must unpack into a single top-level directory".into())
        } else if reason.contains("compression") {
            Some("Supported archives: .tar, .tar.gz, .tgz, .tar.bz2, .tbz2, .tar.xz, .txz".into())
        } else if reason.contains("No such file") {
            Some("Check that the fetch step producing this archive ran first".into())
        } else {
            None
        }
    }
}
