// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Step runner
//!
//! Runs a single step: announce it, skip it if its marker exists, otherwise
//! run its body against a private copy of the context and record the marker
//! only if the body succeeded.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::errors::{CrossflowError, CrossflowResult};
use crate::executors::{StepBody, StepContext};
use crate::markers::{MarkerRecord, MarkerStore};
use crate::utils;

/// A named unit of work
pub struct Step {
    name: String,
    depends_on: Vec<String>,
    env: BTreeMap<String, String>,
    body: Box<dyn StepBody>,
}

impl Step {
    /// Create a step with no dependencies
    pub fn new(name: impl Into<String>, body: impl StepBody + 'static) -> Self {
        Self::boxed(name, Box::new(body))
    }

    /// Create a step from an already boxed body
    pub fn boxed(name: impl Into<String>, body: Box<dyn StepBody>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            env: BTreeMap::new(),
            body,
        }
    }

    /// Declare steps that must complete before this one
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.depends_on.contains(&dep) {
                self.depends_on.push(dep);
            }
        }
        self
    }

    /// Set a variable visible only to this step
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Step name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared dependencies
    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    /// Body kind label
    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

/// What happened to a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Marker already present; body not invoked
    Skipped {
        completed_at: Option<DateTime<Utc>>,
    },
    /// Body ran and succeeded; marker recorded
    Completed { duration: Duration },
}

impl StepOutcome {
    /// Whether the body actually ran
    pub fn executed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Runs steps against a marker store
pub struct StepRunner<'a> {
    markers: &'a dyn MarkerStore,
}

impl<'a> StepRunner<'a> {
    /// Create a runner recording completions in `markers`
    pub fn new(markers: &'a dyn MarkerStore) -> Self {
        Self { markers }
    }

    /// Run one step.
    ///
    /// `position` is the 1-based index and total used in the banner. On
    /// failure no marker is written and the returned error names the step.
    pub async fn run(
        &self,
        step: &Step,
        base: &StepContext,
        position: (usize, usize),
    ) -> CrossflowResult<StepOutcome> {
        utils::print_banner(position.0, position.1, step.name());

        if self.markers.is_complete(step.name()).await? {
            let completed_at = self
                .markers
                .get(step.name())
                .await
                .ok()
                .flatten()
                .map(|r| r.completed_at);
            tracing::debug!(step = step.name(), "marker present, skipping");
            utils::print_skipped(step.name(), completed_at);
            return Ok(StepOutcome::Skipped { completed_at });
        }

        let mut context = base.clone();
        context.set_var("CROSSFLOW_STEP", step.name());
        context.extend(step.env.clone());

        tracing::info!(step = step.name(), kind = step.kind(), "running step");
        let started = Instant::now();
        let result = step.body.execute(context).await;
        let duration = started.elapsed();

        match result {
            Ok(result) if result.success => {
                self.markers
                    .mark_complete(&MarkerRecord::now(step.name(), duration))
                    .await?;
                utils::print_completed(step.name(), duration);
                Ok(StepOutcome::Completed { duration })
            }
            Ok(result) => {
                utils::print_failed(step.name());
                Err(CrossflowError::StepFailed {
                    step: step.name().to_string(),
                    exit_code: result.exit_code,
                    source: None,
                })
            }
            Err(e) => {
                tracing::error!(step = step.name(), error = %e, "step body failed");
                utils::print_failed(step.name());
                Err(CrossflowError::StepFailed {
                    step: step.name().to_string(),
                    exit_code: None,
                    source: Some(Box::new(e)),
                })
            }
        }
    }
}
