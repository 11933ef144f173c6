// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Pipeline definition structures
//!
//! Defines the schema for .crossflow.yaml files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::CrossflowError;

/// Default pipeline file name
pub const DEFAULT_PIPELINE_FILE: &str = ".crossflow.yaml";

/// Pipeline definition from .crossflow.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline version (for future compatibility)
    #[serde(default = "default_version")]
    pub version: String,

    /// Pipeline name
    pub name: String,

    /// Pipeline description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Directory layout
    #[serde(default)]
    pub layout: Layout,

    /// Environment variables for every step
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Stages, in declaration order
    pub stages: Vec<Stage>,
}

fn default_version() -> String {
    "1".to_string()
}

impl Pipeline {
    /// Load pipeline from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, CrossflowError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CrossflowError::PipelineNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                CrossflowError::FileReadError {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                }
            }
        })?;

        Self::from_yaml(&content)
    }

    /// Parse pipeline from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, CrossflowError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Get all stage names
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }
}

/// A single pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Stage name (unique; also names the completion marker)
    pub name: String,

    /// Stage description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// What the stage does
    pub action: Action,

    /// Stages that must complete first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Environment variables for this stage (override pipeline-level ones)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Stage {
    /// Get the action name for this stage
    pub fn action_name(&self) -> &str {
        match &self.action {
            Action::Fetch { .. } => "fetch",
            Action::Extract { .. } => "extract",
            Action::Shell { .. } => "shell",
        }
    }
}

/// Stage action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Download an artifact into the archive cache
    Fetch {
        /// Source URL (http, https or file)
        url: String,

        /// Destination (default: `<archives>/<last URL segment>`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dest: Option<PathBuf>,

        /// Expected blake3 digest, hex encoded
        #[serde(default, skip_serializing_if = "Option::is_none")]
        blake3: Option<String>,
    },

    /// Unpack an archive into a canonical source directory
    Extract {
        /// Archive path
        archive: PathBuf,

        /// Component name (default: the stage name)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component: Option<String>,

        /// Canonical directory (default: `<sources>/<component>`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dest: Option<PathBuf>,
    },

    /// Run a build command
    Shell {
        /// Shell command to run
        command: String,

        /// Shell to use (bash, sh, etc.)
        #[serde(default = "default_shell")]
        shell: String,

        /// Component whose build directory (`<build>/<component>`) is the
        /// working directory
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component: Option<String>,

        /// Explicit working directory (overrides `component`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workdir: Option<PathBuf>,
    },
}

fn default_shell() -> String {
    "bash".to_string()
}

/// Filesystem layout shared by all stages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Layout {
    /// Downloaded archives
    #[serde(default = "default_archives")]
    pub archives: PathBuf,

    /// Canonical source trees
    #[serde(default = "default_sources")]
    pub sources: PathBuf,

    /// Per-component build directories
    #[serde(default = "default_build")]
    pub build: PathBuf,

    /// Toolchain install prefix
    #[serde(default = "default_prefix")]
    pub prefix: PathBuf,

    /// Completion markers
    #[serde(default = "default_state")]
    pub state: PathBuf,

    /// Prepend `<prefix>/bin` to PATH for every step
    #[serde(default = "default_true")]
    pub prefix_on_path: bool,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            archives: default_archives(),
            sources: default_sources(),
            build: default_build(),
            prefix: default_prefix(),
            state: default_state(),
            prefix_on_path: true,
        }
    }
}

fn default_archives() -> PathBuf {
    PathBuf::from("archives")
}

fn default_sources() -> PathBuf {
    PathBuf::from("src")
}

fn default_build() -> PathBuf {
    PathBuf::from("build")
}

fn default_prefix() -> PathBuf {
    PathBuf::from("install")
}

fn default_state() -> PathBuf {
    PathBuf::from(".crossflow/state")
}

fn default_true() -> bool {
    true
}

impl Layout {
    /// Copy of this layout with relative paths joined onto `root`
    pub fn resolve(&self, root: &Path) -> Self {
        let join = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                root.join(p)
            }
        };

        Self {
            archives: join(&self.archives),
            sources: join(&self.sources),
            build: join(&self.build),
            prefix: join(&self.prefix),
            state: join(&self.state),
            prefix_on_path: self.prefix_on_path,
        }
    }

    /// Variables exported to every step
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        vec![
            ("CROSSFLOW_ARCHIVES", self.archives.display().to_string()),
            ("CROSSFLOW_SOURCES", self.sources.display().to_string()),
            ("CROSSFLOW_BUILD", self.build.display().to_string()),
            ("CROSSFLOW_PREFIX", self.prefix.display().to_string()),
        ]
    }
}
