// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! # crossflow - resumable staged builds
//!
//! `crossflow` bootstraps cross-compilation toolchains as a sequence of
//! named stages: fetch sources, unpack them, then build and install
//! binutils, kernel headers, a first-stage compiler, the C library and the
//! final compiler.
//!
//! ## Features
//!
//! - **Resumable** - every completed stage leaves a durable marker; reruns
//!   skip marked stages and continue at the first unmarked one
//! - **Atomic artifacts** - downloads land via a `.part` file and rename;
//!   archives unpack into a fresh canonical directory per component
//! - **Isolated steps** - each stage gets its own copy of the environment
//!   and working directory
//! - **Explicit ordering** - stages declare `depends_on`; execution follows
//!   a stable topological order, one stage at a time
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a pipeline for an aarch64 toolchain
//! crossflow init --target aarch64-linux-gnu
//!
//! # Run it; rerun after a failure to resume
//! crossflow run
//!
//! # Rebuild the C library and everything after it
//! crossflow reset libc --cascade
//! ```

pub mod cli;
pub mod errors;
pub mod executors;
pub mod markers;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types
pub use errors::{CrossflowError, CrossflowResult};
pub use markers::{FilesystemMarkerStore, MarkerRecord, MarkerStore};
pub use pipeline::{Pipeline, PipelineExecutor, Stage, Step, StepOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
