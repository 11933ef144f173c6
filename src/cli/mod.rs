// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for crossflow.

pub mod graph;
pub mod init;
pub mod reset;
pub mod run;
pub mod status;
pub mod validate;

use clap::{Parser, Subcommand, ValueEnum};
use miette::Result;
use std::path::{Path, PathBuf};

use crate::errors::RecoverySuggestion;
use crate::executors::ArtifactFetcher;
use crate::pipeline::{Pipeline, PipelinePlan, DEFAULT_PIPELINE_FILE};

/// Resumable cross-toolchain bootstrap runner
///
/// Runs the stages of a toolchain build in dependency order, recording each
/// completed stage so an interrupted build resumes where it stopped.
#[derive(Parser, Debug)]
#[clap(
    name = "crossflow",
    version,
    about = "Resumable staged builds for cross-compilation toolchains",
    long_about = None,
    after_help = "Examples:\n\
        crossflow init --target aarch64-linux-gnu   Write a toolchain pipeline\n\
        crossflow run                               Run (or resume) the pipeline\n\
        crossflow status                            Show which stages are complete\n\
        crossflow reset gcc-final                   Force a stage to run again\n\n\
        See 'crossflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Resolve the pipeline file relative to DIR
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Pipeline file
    #[clap(
        short,
        long,
        global = true,
        env = "CROSSFLOW_PIPELINE",
        default_value = DEFAULT_PIPELINE_FILE,
        value_name = "FILE"
    )]
    pub pipeline: PathBuf,
}

impl Cli {
    /// Pipeline path after applying `-C`
    pub fn pipeline_path(&self) -> PathBuf {
        match &self.directory {
            Some(dir) if self.pipeline.is_relative() => dir.join(&self.pipeline),
            _ => self.pipeline.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a cross-toolchain pipeline
    Init {
        /// Target triple the toolchain builds for
        #[clap(short, long, default_value = "aarch64-linux-gnu")]
        target: String,

        /// Overwrite an existing pipeline file
        #[clap(long)]
        force: bool,
    },

    /// Run the pipeline, skipping stages that already completed
    Run {
        /// Dry run (show the plan without executing)
        #[clap(long)]
        dry_run: bool,
    },

    /// Show which stages are complete
    Status {
        /// Output format
        #[clap(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Validate pipeline configuration
    Validate,

    /// Show pipeline as a graph
    Graph {
        /// Output format
        #[clap(short, long, value_enum, default_value = "text")]
        format: GraphFormat,
    },

    /// Forget completed stages so the next run executes them again
    Reset {
        /// Stages to reset
        #[clap(required_unless_present = "all", conflicts_with = "all")]
        steps: Vec<String>,

        /// Also reset every stage that depends on the named ones
        #[clap(long)]
        cascade: bool,

        /// Reset every stage
        #[clap(long)]
        all: bool,

        /// Skip confirmation
        #[clap(short, long)]
        yes: bool,
    },
}

/// Output format for the status command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

/// A pipeline file together with the directory its paths resolve against
pub struct LoadedPipeline {
    pub pipeline: Pipeline,
    pub path: PathBuf,
    pub root: PathBuf,
}

impl LoadedPipeline {
    /// Build the execution plan
    pub fn plan(&self, fetcher: ArtifactFetcher) -> Result<PipelinePlan> {
        Ok(PipelinePlan::from_pipeline(&self.pipeline, &self.root, fetcher)?)
    }
}

/// Load the pipeline at `path`; its parent directory becomes the root
pub fn load_pipeline(path: &Path) -> Result<LoadedPipeline> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| miette::miette!("Failed to get current directory: {}", e))?
            .join(path)
    };

    let pipeline = match Pipeline::from_file(&path) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            if let Some(suggestion) = RecoverySuggestion::for_error(&e) {
                eprintln!("{}", suggestion);
            }
            return Err(e.into());
        }
    };

    let root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));

    tracing::debug!(path = %path.display(), root = %root.display(), "pipeline loaded");

    Ok(LoadedPipeline {
        pipeline,
        path,
        root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_directory_applies_to_relative_pipeline() {
        let cli = Cli::parse_from(["crossflow", "-C", "/work", "status"]);
        assert_eq!(cli.pipeline_path(), PathBuf::from("/work/.crossflow.yaml"));

        let cli = Cli::parse_from(["crossflow", "-C", "/work", "-p", "/abs/p.yaml", "run"]);
        assert_eq!(cli.pipeline_path(), PathBuf::from("/abs/p.yaml"));
    }

    #[test]
    fn test_reset_requires_steps_or_all() {
        assert!(Cli::try_parse_from(["crossflow", "reset"]).is_err());
        assert!(Cli::try_parse_from(["crossflow", "reset", "gcc", "--all"]).is_err());

        let cli = Cli::parse_from(["crossflow", "reset", "libc", "--cascade"]);
        match cli.command {
            Commands::Reset { steps, cascade, all, .. } => {
                assert_eq!(steps, vec!["libc"]);
                assert!(cascade);
                assert!(!all);
            }
            _ => panic!("Expected Reset"),
        }
    }

    #[test]
    fn test_load_pipeline_root_is_parent_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tc.yaml");
        std::fs::write(&path, "name: t\nstages: []\n").unwrap();

        let loaded = load_pipeline(&path).unwrap();
        assert_eq!(loaded.root, dir.path());
        assert_eq!(loaded.pipeline.name, "t");
    }
}
