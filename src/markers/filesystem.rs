// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Filesystem-based marker store
//!
//! One `<step>.json` file per completed step. Records are written to a
//! hidden temporary file, synced, then renamed into place, so a marker is
//! either absent or complete.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::{MarkerRecord, MarkerStore};
use crate::errors::CrossflowError;

/// Filesystem-based marker store
#[derive(Debug, Clone)]
pub struct FilesystemMarkerStore {
    dir: PathBuf,
}

impl FilesystemMarkerStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the marker file for `step`
    pub fn marker_path(&self, step: &str) -> Result<PathBuf, CrossflowError> {
        if step.is_empty()
            || step.starts_with('.')
            || step.contains(['/', '\\', '\0'])
        {
            return Err(CrossflowError::MarkerStore {
                message: format!("'{}' cannot be used as a marker name", step),
            });
        }
        Ok(self.dir.join(format!("{}.json", step)))
    }

    fn store_error(action: &str, path: &Path, e: impl std::fmt::Display) -> CrossflowError {
        CrossflowError::MarkerStore {
            message: format!("Failed to {} {}: {}", action, path.display(), e),
        }
    }
}

#[async_trait]
impl MarkerStore for FilesystemMarkerStore {
    async fn is_complete(&self, step: &str) -> Result<bool, CrossflowError> {
        let path = self.marker_path(step)?;
        match tokio::fs::metadata(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::store_error("inspect", &path, e)),
        }
    }

    async fn get(&self, step: &str) -> Result<Option<MarkerRecord>, CrossflowError> {
        let path = self.marker_path(step)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::store_error("read", &path, e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| Self::store_error("parse", &path, e))
    }

    async fn mark_complete(&self, record: &MarkerRecord) -> Result<(), CrossflowError> {
        let path = self.marker_path(&record.step)?;
        let tmp = self.dir.join(format!(".{}.json.tmp", record.step));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::store_error("create", &self.dir, e))?;

        let json = serde_json::to_string_pretty(record).map_err(|e| CrossflowError::MarkerStore {
            message: format!("Failed to serialize marker: {}", e),
        })?;

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| Self::store_error("create", &tmp, e))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| Self::store_error("write", &tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| Self::store_error("sync", &tmp, e))?;
        drop(file);

        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Self::store_error("write", &path, e))?;

        // Persist the rename itself. Not every platform can open directories.
        if let Ok(dir) = tokio::fs::File::open(&self.dir).await {
            let _ = dir.sync_all().await;
        }

        tracing::debug!(step = %record.step, "marker recorded");
        Ok(())
    }

    async fn remove(&self, step: &str) -> Result<bool, CrossflowError> {
        let path = self.marker_path(step)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::store_error("remove", &path, e)),
        }
    }

    async fn list(&self) -> Result<Vec<MarkerRecord>, CrossflowError> {
        let mut records = Vec::new();

        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(Self::store_error("read", &self.dir, e)),
        };

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| Self::store_error("read", &self.dir, e))?
        {
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match tokio::fs::read_to_string(&path)
                .await
                .ok()
                .and_then(|c| serde_json::from_str::<MarkerRecord>(&c).ok())
            {
                Some(record) => records.push(record),
                None => tracing::warn!(path = %path.display(), "unreadable marker record"),
            }
        }

        records.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        Ok(records)
    }

    async fn clear(&self) -> Result<usize, CrossflowError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Self::store_error("read", &self.dir, e)),
        };

        // Unreadable records count too: presence is what marks a step.
        let mut removed = 0;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| Self::store_error("read", &self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| Self::store_error("remove", &path, e))?;
            if !hidden {
                removed += 1;
            }
        }

        Ok(removed)
    }
}
