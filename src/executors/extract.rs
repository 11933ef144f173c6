// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Archive extractor
//!
//! Unpacks a source tarball into a canonical directory whose name does not
//! depend on the upstream version. Steps, in this order:
//!
//! 1. read the manifest to learn the single top-level directory name
//! 2. unpack into a staging directory beside the canonical path
//! 3. remove whatever is at the canonical path
//! 4. rename the fresh top-level directory onto the canonical path
//!
//! An interruption between 3 and 4 leaves the canonical path absent, which
//! later build steps notice immediately.

use async_trait::async_trait;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use super::{ExecutionResult, StepBody, StepContext};
use crate::errors::{CrossflowError, CrossflowResult};

/// Compression wrapped around a tar container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    /// Pick the compression from the archive's file name
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::Gzip)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
            Some(Self::Bzip2)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::Xz)
        } else if name.ends_with(".tar") {
            Some(Self::None)
        } else {
            None
        }
    }
}

/// A freshly extracted source tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTree {
    /// Canonical directory now holding the payload
    pub path: PathBuf,
    /// Top-level directory name recorded in the archive
    pub top_level: String,
}

/// Extracts tarballs into canonical directories
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    /// Determine the single top-level directory the archive unpacks into
    pub fn manifest_root(archive: &Path) -> CrossflowResult<String> {
        let mut tar = open_archive(archive)?;
        let entries = tar
            .entries()
            .map_err(|e| CrossflowError::extraction(archive, e))?;

        let mut root: Option<String> = None;
        for entry in entries {
            let entry = entry.map_err(|e| CrossflowError::extraction(archive, e))?;
            if entry.header().entry_type().is_pax_global_extensions() {
                continue;
            }
            let path = entry
                .path()
                .map_err(|e| CrossflowError::extraction(archive, e))?;
            let Some(first) = first_segment(&path) else {
                continue;
            };

            match &root {
                None => root = Some(first),
                Some(existing) if *existing == first => {}
                Some(existing) => {
                    return Err(CrossflowError::extraction(
                        archive,
                        format!(
                            "archive has more than one top-level entry ('{}' and '{}')",
                            existing, first
                        ),
                    ))
                }
            }
        }

        root.ok_or_else(|| CrossflowError::extraction(archive, "archive is empty: no top-level directory"))
    }

    /// Extract `archive` so that `canonical` holds exactly its payload
    pub fn extract_to(archive: &Path, canonical: &Path) -> CrossflowResult<ExtractedTree> {
        let top_level = Self::manifest_root(archive)?;
        tracing::debug!(archive = %archive.display(), top_level = %top_level, "manifest read");

        let parent = match canonical.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|e| CrossflowError::extraction(archive, e))?;

        let staging = tempfile::Builder::new()
            .prefix(".crossflow-extract-")
            .tempdir_in(&parent)
            .map_err(|e| CrossflowError::extraction(archive, e))?;

        let mut tar = open_archive(archive)?;
        tar.set_preserve_permissions(true);
        tar.set_preserve_mtime(true);
        tar.unpack(staging.path())
            .map_err(|e| CrossflowError::extraction(archive, e))?;

        let extracted = staging.path().join(&top_level);
        if !extracted.is_dir() {
            return Err(CrossflowError::extraction(
                archive,
                format!("top-level entry '{}' is not a directory", top_level),
            ));
        }

        purge(canonical).map_err(|e| CrossflowError::extraction(archive, e))?;
        std::fs::rename(&extracted, canonical).map_err(|e| CrossflowError::extraction(archive, e))?;

        tracing::info!(
            archive = %archive.display(),
            dest = %canonical.display(),
            "extracted {}",
            top_level
        );

        Ok(ExtractedTree {
            path: canonical.to_path_buf(),
            top_level,
        })
    }
}

fn open_archive(archive: &Path) -> CrossflowResult<tar::Archive<Box<dyn Read>>> {
    let compression = Compression::detect(archive).ok_or_else(|| {
        CrossflowError::extraction(
            archive,
            format!("unsupported compression for {}", archive.display()),
        )
    })?;
    let file = File::open(archive).map_err(|e| CrossflowError::extraction(archive, e))?;
    let reader = BufReader::new(file);

    let stream: Box<dyn Read> = match compression {
        Compression::None => Box::new(reader),
        Compression::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
        Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(reader)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
    };

    Ok(tar::Archive::new(stream))
}

fn first_segment(path: &Path) -> Option<String> {
    path.components().find_map(|c| match c {
        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    })
}

fn purge(path: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Step body that extracts one archive
#[derive(Debug, Clone)]
pub struct ExtractExecutor {
    archive: PathBuf,
    dest: PathBuf,
}

impl ExtractExecutor {
    /// Extract `archive` into `dest`; relative paths resolve against the
    /// step's working directory
    pub fn new(archive: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            dest: dest.into(),
        }
    }
}

#[async_trait]
impl StepBody for ExtractExecutor {
    async fn execute(&self, context: StepContext) -> Result<ExecutionResult, CrossflowError> {
        let start = Instant::now();
        let archive = context.resolve(&self.archive);
        let dest = context.resolve(&self.dest);

        let join_archive = archive.clone();
        tokio::task::spawn_blocking(move || ArchiveExtractor::extract_to(&join_archive, &dest))
            .await
            .map_err(|e| CrossflowError::extraction(&archive, e))??;

        Ok(ExecutionResult::success(start.elapsed()))
    }

    fn kind(&self) -> &'static str {
        "extract"
    }
}
