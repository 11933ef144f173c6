// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Graph command - visualize pipeline as a graph

use miette::Result;
use std::path::Path;

use super::{load_pipeline, GraphFormat};
use crate::executors::ArtifactFetcher;

/// Run the graph command
pub async fn run(pipeline_path: &Path, format: GraphFormat, _verbose: bool) -> Result<()> {
    let loaded = load_pipeline(pipeline_path)?;
    let plan = loaded.plan(ArtifactFetcher::new())?;

    // Build DAG
    let dag = plan.dag()?;

    // Output in requested format
    let output = match format {
        GraphFormat::Text => dag.to_text(&plan.steps)?,
        GraphFormat::Dot => dag.to_dot(),
        GraphFormat::Mermaid => dag.to_mermaid(),
    };

    println!("{}", output);

    Ok(())
}
