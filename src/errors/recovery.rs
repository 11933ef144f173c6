// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Operator recovery suggestions
//!
//! Nothing is ever rolled back or unmarked automatically, so after a failure
//! the operator decides what to fix and what to invalidate. These
//! suggestions spell out the concrete next commands.

use super::CrossflowError;

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Build the suggestion that fits an error, if there is one
    pub fn for_error(error: &CrossflowError) -> Option<Self> {
        match error {
            CrossflowError::StepFailed { step, .. } => Some(Self::fix_failed_step(step)),
            CrossflowError::Interrupted { step } => Some(Self::resume_interrupted(step)),
            CrossflowError::CircularDependency { stages } => {
                Some(Self::fix_circular_dependency(stages))
            }
            CrossflowError::DownloadFailed { url, .. } => Some(Self::retry_download(url)),
            CrossflowError::PipelineNotFound { .. } => Some(Self::create_pipeline()),
            _ => None,
        }
    }

    /// Suggest fixing and resuming after a failed step
    pub fn fix_failed_step(step: &str) -> Self {
        Self {
            action: format!("Fix step '{}' and resume", step),
            steps: vec![
                format!("Step '{}' was not marked complete", step),
                "Steps that already completed keep their markers and will be skipped".into(),
                "If the fix changes an earlier step's output, reset that step and its dependents"
                    .into(),
            ],
            commands: vec![
                "# Resume from the failed step:".into(),
                "crossflow run".into(),
                "".into(),
                "# Rebuild an earlier step and everything after it:".into(),
                "crossflow reset <step> --cascade".into(),
            ],
        }
    }

    /// Suggest resuming after an interrupt
    pub fn resume_interrupted(step: &str) -> Self {
        Self {
            action: "Resume the pipeline".into(),
            steps: vec![format!(
                "Step '{}' was interrupted before it completed and will run again",
                step
            )],
            commands: vec!["crossflow run".into()],
        }
    }

    /// Suggest retrying a failed download
    pub fn retry_download(url: &str) -> Self {
        Self {
            action: "Retry the download".into(),
            steps: vec![
                format!("Check that {} is reachable", url),
                "Partial transfers are discarded; the next attempt starts from zero".into(),
            ],
            commands: vec!["crossflow run".into()],
        }
    }

    /// Suggest fixing a circular dependency
    pub fn fix_circular_dependency(stages: &[String]) -> Self {
        Self {
            action: "Remove circular dependency".into(),
            steps: vec![
                format!("Detected cycle: {}", stages.join(" → ")),
                "Review your stage dependencies".into(),
                "Ensure stages form a directed acyclic graph (DAG)".into(),
            ],
            commands: vec![
                "# Visualize your pipeline:".into(),
                "crossflow graph --format mermaid".into(),
            ],
        }
    }

    /// Suggest creating a pipeline file
    pub fn create_pipeline() -> Self {
        Self {
            action: "Create a pipeline configuration".into(),
            steps: vec!["No .crossflow.yaml found in current directory".into()],
            commands: vec![
                "# Write the toolchain template:".into(),
                "crossflow init --target aarch64-linux-gnu".into(),
            ],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}
