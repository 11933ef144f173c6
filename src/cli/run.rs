// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Run command - execute the pipeline

use colored::Colorize;
use miette::Result;
use std::path::Path;
use std::sync::Arc;

use super::load_pipeline;
use crate::errors::RecoverySuggestion;
use crate::executors::ArtifactFetcher;
use crate::pipeline::{ExecutionOptions, PipelineExecutor, PipelineValidator};
use crate::utils;

/// Run the pipeline
pub async fn run(pipeline_path: &Path, dry_run: bool, verbose: bool) -> Result<()> {
    let loaded = load_pipeline(pipeline_path)?;

    // Validate pipeline
    let validation = PipelineValidator::validate(&loaded.pipeline, &loaded.root)?;

    if !validation.is_valid() {
        eprintln!("{}", "Pipeline validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(miette::miette!("Pipeline configuration is invalid"));
    }

    if validation.has_warnings() {
        eprintln!("{}", "Pipeline warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    let fetcher = ArtifactFetcher::new().with_progress(utils::progress_enabled());
    let plan = loaded.plan(fetcher)?;

    if verbose {
        println!("  Root:    {}", plan.root.display());
        println!("  State:   {}", plan.layout.state.display());
        println!("  Prefix:  {}", plan.layout.prefix.display());
    }

    let executor = PipelineExecutor::new(Arc::new(plan.markers())).with_title(&loaded.pipeline.name);
    let options = ExecutionOptions {
        dry_run,
        interruptible: true,
    };

    match executor.run_all(&plan.steps, &plan.base, &options).await {
        Ok(_) => Ok(()),
        Err(e) => {
            if let Some(suggestion) = RecoverySuggestion::for_error(&e) {
                eprintln!();
                eprintln!("{}", suggestion);
            }
            Err(e.into())
        }
    }
}
