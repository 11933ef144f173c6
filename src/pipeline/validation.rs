// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Pipeline validation
//!
//! Validates pipeline configuration before execution.

use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

use crate::errors::CrossflowError;
use crate::pipeline::plan::{resolve_stages, ResolvedAction, ResolvedStage};
use crate::pipeline::{Action, DagBuilder, Pipeline, Stage};

/// Step names key marker files, so they are restricted to a portable set
const STEP_NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]*$";

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a pipeline rooted at `root`
    pub fn validate(pipeline: &Pipeline, root: &Path) -> Result<ValidationResult, CrossflowError> {
        let mut result = ValidationResult::new();
        let name_pattern = Regex::new(STEP_NAME_PATTERN).map_err(|e| CrossflowError::InvalidPipeline {
            reason: format!("Invalid step name pattern: {}", e),
            help: None,
        })?;

        if pipeline.stages.is_empty() {
            result.add_error("Pipeline has no stages defined");
        }

        let mut seen_names = HashSet::new();
        for stage in &pipeline.stages {
            if !seen_names.insert(&stage.name) {
                result.add_error(&format!("Duplicate stage name: '{}'", stage.name));
            }
            if !name_pattern.is_match(&stage.name) {
                result.add_error(&format!(
                    "Invalid stage name '{}': use letters, digits, '.', '_' or '-', \
                     starting with a letter or digit",
                    stage.name
                ));
            }
            Self::validate_stage(stage, &mut result);
        }

        let layout = pipeline.layout.resolve(root);
        let resolved = match resolve_stages(pipeline, &layout, root) {
            Ok(resolved) => resolved,
            Err(e) => {
                result.add_error(&e.to_string());
                return Ok(result);
            }
        };

        if seen_names.len() == pipeline.stages.len() {
            match DagBuilder::build(resolved.iter().map(|s| (s.name.as_str(), s.depends_on.as_slice()))) {
                Ok(_) => {}
                Err(CrossflowError::CircularDependency { stages }) => {
                    result.add_error(&format!("Circular dependency: {}", stages.join(" → ")));
                }
                Err(CrossflowError::UnknownDependency { stage, dependency }) => {
                    result.add_error(&format!(
                        "Stage '{}' depends on unknown stage '{}'",
                        stage, dependency
                    ));
                }
                Err(e) => {
                    result.add_error(&format!("DAG validation error: {}", e));
                }
            }
        }

        Self::check_declaration_order(pipeline, &mut result);
        Self::check_runtime(&resolved, &mut result);

        Ok(result)
    }

    /// Validate a single stage's own fields
    fn validate_stage(stage: &Stage, result: &mut ValidationResult) {
        match &stage.action {
            Action::Fetch { url, blake3, .. } => {
                if url.trim().is_empty() {
                    result.add_error(&format!("Stage '{}': Fetch URL is empty", stage.name));
                } else if let Err(e) = reqwest::Url::parse(url) {
                    result.add_error(&format!("Stage '{}': Invalid URL '{}': {}", stage.name, url, e));
                }

                if let Some(digest) = blake3 {
                    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                        result.add_error(&format!(
                            "Stage '{}': blake3 digest must be 64 hex characters",
                            stage.name
                        ));
                    }
                }
            }
            Action::Extract { archive, .. } => {
                if archive.as_os_str().is_empty() {
                    result.add_error(&format!("Stage '{}': Archive path is empty", stage.name));
                }
            }
            Action::Shell { command, .. } => {
                if command.trim().is_empty() {
                    result.add_error(&format!("Stage '{}': Shell command is empty", stage.name));
                }
            }
        }

        if stage.depends_on.contains(&stage.name) {
            result.add_error(&format!("Stage '{}' depends on itself", stage.name));
        }
    }

    /// Warn about stages declared before something they depend on.
    /// Execution order still follows the graph.
    fn check_declaration_order(pipeline: &Pipeline, result: &mut ValidationResult) {
        for (idx, stage) in pipeline.stages.iter().enumerate() {
            for dep in &stage.depends_on {
                let declared_later = pipeline
                    .stages
                    .iter()
                    .position(|s| &s.name == dep)
                    .is_some_and(|dep_idx| dep_idx > idx);
                if declared_later {
                    result.add_warning(&format!(
                        "Stage '{}' is declared before its dependency '{}'; \
                         it will still run after it",
                        stage.name, dep
                    ));
                }
            }
        }
    }

    /// Checks against the machine the pipeline will run on
    fn check_runtime(resolved: &[ResolvedStage], result: &mut ValidationResult) {
        let fetched: HashSet<&Path> = resolved
            .iter()
            .filter_map(|s| match &s.action {
                ResolvedAction::Fetch { dest, .. } => Some(dest.as_path()),
                _ => None,
            })
            .collect();

        let mut missing_shells = HashSet::new();
        for stage in resolved {
            match &stage.action {
                ResolvedAction::Shell { shell, .. } => {
                    if which::which(shell).is_err() && missing_shells.insert(shell.as_str()) {
                        result.add_warning(&format!(
                            "Stage '{}': Shell '{}' not found on PATH",
                            stage.name, shell
                        ));
                    }
                }
                ResolvedAction::Extract { archive, .. } => {
                    if !fetched.contains(archive.as_path()) && !archive.exists() {
                        result.add_warning(&format!(
                            "Stage '{}': Archive {} is not fetched by any stage and does not exist yet",
                            stage.name,
                            archive.display()
                        ));
                    }
                }
                ResolvedAction::Fetch { .. } => {}
            }
        }
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(yaml: &str) -> ValidationResult {
        let pipeline = Pipeline::from_yaml(yaml).unwrap();
        PipelineValidator::validate(&pipeline, Path::new("/nonexistent-root")).unwrap()
    }

    #[test]
    fn test_validate_empty_pipeline() {
        let result = validate("name: empty\nstages: []\n");
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no stages"));
    }

    #[test]
    fn test_validate_duplicate_names() {
        let result = validate(
            r#"
name: t
stages:
  - name: dup
    action: { type: shell, command: "true", shell: sh }
  - name: dup
    action: { type: shell, command: "true", shell: sh }
"#,
        );
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("Duplicate")));
    }

    #[test]
    fn test_validate_bad_names_and_fields() {
        let result = validate(
            r#"
name: t
stages:
  - name: "../escape"
    action: { type: shell, command: "  ", shell: sh }
  - name: fetch
    action:
      type: fetch
      url: https://example.org/a.tar.gz
      blake3: "xyz"
"#,
        );
        assert!(result.errors.iter().any(|e| e.contains("Invalid stage name")));
        assert!(result.errors.iter().any(|e| e.contains("command is empty")));
        assert!(result.errors.iter().any(|e| e.contains("blake3")));
    }

    #[test]
    fn test_validate_cycle_and_unknown() {
        let cycle = validate(
            r#"
name: t
stages:
  - name: a
    depends_on: [b]
    action: { type: shell, command: "true", shell: sh }
  - name: b
    depends_on: [a]
    action: { type: shell, command: "true", shell: sh }
"#,
        );
        assert!(cycle.errors.iter().any(|e| e.contains("Circular")));

        let unknown = validate(
            r#"
name: t
stages:
  - name: a
    depends_on: [ghost]
    action: { type: shell, command: "true", shell: sh }
"#,
        );
        assert!(unknown.errors.iter().any(|e| e.contains("unknown stage 'ghost'")));
    }

    #[test]
    fn test_validate_warnings() {
        let result = validate(
            r#"
name: t
stages:
  - name: build
    depends_on: [prepare]
    action: { type: shell, command: "make", shell: no-such-shell-crossflow }
  - name: prepare
    action:
      type: extract
      archive: archives/never-fetched.tar.gz
"#,
        );
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("declared before")));
        assert!(result.warnings.iter().any(|w| w.contains("not found on PATH")));
        assert!(result.warnings.iter().any(|w| w.contains("not fetched")));
    }

    #[test]
    fn test_fetched_archive_needs_no_warning() {
        let result = validate(
            r#"
name: t
stages:
  - name: fetch-gcc
    action:
      type: fetch
      url: https://ftp.gnu.org/gnu/gcc/gcc-13.2.0/gcc-13.2.0.tar.xz
  - name: gcc-src
    action:
      type: extract
      archive: archives/gcc-13.2.0.tar.xz
      component: gcc
"#,
        );
        assert!(result.is_valid());
        assert!(!result.has_warnings());
    }
}
