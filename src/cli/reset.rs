// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Reset command - delete completion markers
//!
//! Markers are never removed automatically; this is the only way to make a
//! completed stage run again.

use colored::Colorize;
use miette::Result;
use std::io::{self, Write};
use std::path::Path;

use super::load_pipeline;
use crate::errors::{CrossflowError, CrossflowResult};
use crate::executors::ArtifactFetcher;
use crate::markers::MarkerStore;
use crate::pipeline::PipelinePlan;

/// Names whose markers a reset of `steps` removes, in execution order
pub fn targets(plan: &PipelinePlan, steps: &[String], cascade: bool) -> CrossflowResult<Vec<String>> {
    let dag = plan.dag()?;

    if cascade {
        return dag.with_transitive_dependents(steps);
    }

    for step in steps {
        if dag.dependencies(step).is_none() {
            return Err(CrossflowError::StepNotFound { step: step.clone() });
        }
    }

    let order = dag.execution_order_names()?;
    Ok(order.into_iter().filter(|name| steps.contains(name)).collect())
}

/// Delete the markers of `names`. Returns the names that had one.
pub async fn remove_markers(markers: &dyn MarkerStore, names: &[String]) -> CrossflowResult<Vec<String>> {
    let mut removed = Vec::new();
    for name in names {
        if markers.remove(name).await? {
            tracing::info!(step = %name, "marker removed");
            removed.push(name.clone());
        }
    }
    Ok(removed)
}

/// Run the reset command
pub async fn run(
    pipeline_path: &Path,
    steps: Vec<String>,
    cascade: bool,
    all: bool,
    yes: bool,
) -> Result<()> {
    let loaded = load_pipeline(pipeline_path)?;
    let plan = loaded.plan(ArtifactFetcher::new())?;
    let markers = plan.markers();

    if all {
        let existing = markers.list().await?;
        if existing.is_empty() && !markers.dir().exists() {
            println!("{}", "No stages are marked complete.".dimmed());
            return Ok(());
        }

        if !yes && !confirm(&format!("Reset all stages of '{}'?", loaded.pipeline.name)) {
            println!("{}", "Cancelled.".dimmed());
            return Ok(());
        }

        let removed = markers.clear().await?;
        println!(
            "{}",
            format!("Reset {} stage{}.", removed, if removed == 1 { "" } else { "s" }).green()
        );
        return Ok(());
    }

    let targets = targets(&plan, &steps, cascade)?;
    let removed = remove_markers(&markers, &targets).await?;

    for name in &targets {
        if removed.contains(name) {
            println!("  {} {} reset", "✓".green(), name.bold());
        } else {
            println!("  {} {} was not complete", "○".dimmed(), name.dimmed());
        }
    }

    Ok(())
}

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    io::stdout().flush().ok();

    let mut input = String::new();
    io::stdin().read_line(&mut input).ok();

    input.trim().eq_ignore_ascii_case("y")
}
