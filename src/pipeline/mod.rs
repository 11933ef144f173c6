// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Pipeline definitions and orchestration
//!
//! This module defines the `.crossflow.yaml` schema and turns it into an
//! ordered list of resumable steps.

mod dag;
mod definition;
mod executor;
pub mod plan;
pub(crate) mod runner;
mod validation;

pub use dag::DagBuilder;
pub use definition::*;
pub use executor::{ExecutionOptions, PipelineExecutor, PipelineResult};
pub use plan::PipelinePlan;
pub use runner::{Step, StepOutcome, StepRunner};
pub use validation::{PipelineValidator, ValidationResult};
