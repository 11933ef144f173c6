// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Completion markers
//!
//! A marker is the persistent fact "step X completed successfully". It is
//! written once, after the step's body succeeded, and never expires. The
//! record content is informational; only its presence decides whether a
//! step is skipped.

mod filesystem;

pub use filesystem::FilesystemMarkerStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::CrossflowError;

/// Trait for marker store implementations
#[async_trait]
pub trait MarkerStore: Send + Sync {
    /// Whether a marker exists for `step`
    async fn is_complete(&self, step: &str) -> Result<bool, CrossflowError>;

    /// Read the marker for `step`, if any
    async fn get(&self, step: &str) -> Result<Option<MarkerRecord>, CrossflowError>;

    /// Durably record completion. Returns only after the record is persisted.
    async fn mark_complete(&self, record: &MarkerRecord) -> Result<(), CrossflowError>;

    /// Delete the marker for `step`. Returns whether one existed.
    async fn remove(&self, step: &str) -> Result<bool, CrossflowError>;

    /// All readable markers
    async fn list(&self) -> Result<Vec<MarkerRecord>, CrossflowError>;

    /// Delete every marker. Returns how many were removed.
    async fn clear(&self) -> Result<usize, CrossflowError>;
}

/// Persisted completion record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRecord {
    /// Step name
    pub step: String,
    /// When the step completed
    pub completed_at: DateTime<Utc>,
    /// How long the body ran
    pub duration_ms: u64,
    /// crossflow version that wrote the record
    pub version: String,
}

impl MarkerRecord {
    /// Record a completion happening now
    pub fn now(step: impl Into<String>, duration: Duration) -> Self {
        Self {
            step: step.into(),
            completed_at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            version: crate::VERSION.to_string(),
        }
    }

    /// Body duration
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}
