// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! crossflow - resumable cross-toolchain bootstrap runner

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crossflow::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crossflow=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if !crossflow::utils::should_use_colors() {
        colored::control::set_override(false);
    }

    let cli = Cli::parse();
    let pipeline = cli.pipeline_path();

    // Dispatch to command handlers
    match cli.command {
        Commands::Init { target, force } => {
            crossflow::cli::init::run(&pipeline, target, force, cli.verbose).await
        }
        Commands::Run { dry_run } => crossflow::cli::run::run(&pipeline, dry_run, cli.verbose).await,
        Commands::Status { format } => {
            crossflow::cli::status::run(&pipeline, format, cli.verbose).await
        }
        Commands::Validate => crossflow::cli::validate::run(&pipeline, cli.verbose).await,
        Commands::Graph { format } => {
            crossflow::cli::graph::run(&pipeline, format, cli.verbose).await
        }
        Commands::Reset {
            steps,
            cascade,
            all,
            yes,
        } => crossflow::cli::reset::run(&pipeline, steps, cascade, all, yes).await,
    }
}
