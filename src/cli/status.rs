// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Status command - show which stages are complete

use chrono::{DateTime, Utc};
use colored::Colorize;
use miette::Result;
use serde::Serialize;
use std::path::Path;

use super::{load_pipeline, OutputFormat};
use crate::errors::CrossflowResult;
use crate::executors::ArtifactFetcher;
use crate::markers::MarkerStore;
use crate::pipeline::PipelinePlan;
use crate::utils;

/// State of one stage
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StepStatus {
    pub name: String,
    pub kind: String,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Collect the state of every planned step, in execution order
pub async fn collect(plan: &PipelinePlan, markers: &dyn MarkerStore) -> CrossflowResult<Vec<StepStatus>> {
    let order = plan.dag()?.execution_order()?;
    let mut statuses = Vec::with_capacity(order.len());

    for idx in order {
        let step = &plan.steps[idx];
        let completed = markers.is_complete(step.name()).await?;
        // A marker that exists but cannot be parsed still counts as complete.
        let record = if completed {
            markers.get(step.name()).await.ok().flatten()
        } else {
            None
        };

        statuses.push(StepStatus {
            name: step.name().to_string(),
            kind: step.kind().to_string(),
            completed,
            completed_at: record.as_ref().map(|r| r.completed_at),
            duration_ms: record.as_ref().map(|r| r.duration_ms),
        });
    }

    Ok(statuses)
}

/// Run the status command
pub async fn run(pipeline_path: &Path, format: OutputFormat, verbose: bool) -> Result<()> {
    let loaded = load_pipeline(pipeline_path)?;
    let plan = loaded.plan(ArtifactFetcher::new())?;
    let markers = plan.markers();
    let statuses = collect(&plan, &markers).await?;

    if format == OutputFormat::Json {
        let json = serde_json::to_string_pretty(&statuses)
            .map_err(|e| miette::miette!("Failed to serialize status: {}", e))?;
        println!("{}", json);
        return Ok(());
    }

    utils::print_header(&format!("Pipeline: {}", loaded.pipeline.name));
    if verbose {
        println!("  State: {}", markers.dir().display());
    }

    let done = statuses.iter().filter(|s| s.completed).count();
    for (i, status) in statuses.iter().enumerate() {
        let (icon, state) = if status.completed {
            ("✓".green(), "complete".green())
        } else {
            ("○".dimmed(), "pending".yellow())
        };

        print!(
            "  {} {:>2}. {} ({}) {}",
            icon,
            i + 1,
            status.name.bold(),
            status.kind,
            state
        );
        if let Some(at) = &status.completed_at {
            print!(" {}", utils::format_timestamp(at).dimmed());
        }
        println!();
    }

    println!();
    if statuses.is_empty() {
        println!("{}", "No stages defined.".dimmed());
    } else if done == statuses.len() {
        println!("{}", format!("All {} stages complete.", done).green().bold());
    } else {
        let next = statuses.iter().find(|s| !s.completed).map(|s| s.name.as_str()).unwrap_or_default();
        println!(
            "{} of {} stages complete; next: {}",
            done,
            statuses.len(),
            next.cyan()
        );
    }

    Ok(())
}
