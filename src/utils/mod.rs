// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Utility modules
//!
//! Terminal output shared by the runner and the CLI.

pub mod colors;
pub mod progress;

pub use colors::*;
pub use progress::*;
