// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Validate command - check pipeline configuration

use colored::Colorize;
use miette::Result;
use std::path::Path;

use super::load_pipeline;
use crate::pipeline::PipelineValidator;

/// Run the validate command
pub async fn run(pipeline_path: &Path, verbose: bool) -> Result<()> {
    println!("{}", "Validating pipeline...".bold());
    println!();

    let loaded = match load_pipeline(pipeline_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("  {} Failed to load pipeline", "✗".red());
            eprintln!();
            return Err(e);
        }
    };
    let pipeline = &loaded.pipeline;

    println!("  {} Pipeline file is valid YAML", "✓".green());

    let validation = PipelineValidator::validate(pipeline, &loaded.root)?;

    if !validation.errors.is_empty() {
        println!();
        println!("{}:", "Errors".red().bold());
        for error in &validation.errors {
            println!("  {} {}", "✗".red(), error);
        }
    }

    if !validation.warnings.is_empty() {
        println!();
        println!("{}:", "Warnings".yellow().bold());
        for warning in &validation.warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }
    }

    if verbose {
        println!();
        println!("{}:", "Pipeline summary".bold());
        println!("  Name: {}", pipeline.name);
        println!("  Root: {}", loaded.root.display());
        println!("  Stages: {}", pipeline.stages.len());
        for stage in &pipeline.stages {
            let deps = if stage.depends_on.is_empty() {
                String::new()
            } else {
                format!(" [depends: {}]", stage.depends_on.join(", "))
            };
            println!("    - {} ({}){}", stage.name, stage.action_name(), deps.dimmed());
        }
    }

    println!();

    if !validation.is_valid() {
        Err(miette::miette!("Pipeline validation failed"))
    } else if validation.has_warnings() {
        println!("{}", "Pipeline is valid but has warnings.".yellow().bold());
        Ok(())
    } else {
        println!("{}", "Pipeline is valid!".green().bold());
        Ok(())
    }
}
