// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Step bodies
//!
//! A step body is the opaque unit of work behind a pipeline step: a
//! download, an archive extraction, or an external build command. Bodies
//! receive an owned [`StepContext`] snapshot and report success or failure.

mod extract;
pub(crate) mod fetch;
mod shell;

pub use extract::{ArchiveExtractor, ExtractExecutor, ExtractedTree};
pub use fetch::{ArtifactFetcher, FetchExecutor, FetchOutcome};
pub use shell::ShellExecutor;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::CrossflowError;

/// Result of running a step body
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether the body succeeded
    pub success: bool,

    /// Exit code, for bodies backed by a process
    pub exit_code: Option<i32>,

    /// Execution duration
    pub duration: Duration,
}

impl ExecutionResult {
    /// Create a successful result
    pub fn success(duration: Duration) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            duration,
        }
    }

    /// Create a failed result
    pub fn failure(exit_code: Option<i32>, duration: Duration) -> Self {
        Self {
            success: false,
            exit_code,
            duration,
        }
    }
}

/// Isolated execution context handed to a step body.
///
/// The context is an owned snapshot of environment variables and working
/// directory. A body may mutate its copy freely; the copy is dropped when the
/// body returns, so nothing leaks to the runner or to later steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    env: BTreeMap<String, String>,
    cwd: PathBuf,
}

impl StepContext {
    /// Create an empty context rooted at `cwd`
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            env: BTreeMap::new(),
            cwd: cwd.into(),
        }
    }

    /// Snapshot the current process environment, rooted at `cwd`
    pub fn inherit(cwd: impl Into<PathBuf>) -> Self {
        Self::from_os_vars(std::env::vars_os(), cwd)
    }

    /// Build a snapshot from raw variables. Pairs that are not valid
    /// Unicode are left out of the snapshot.
    pub fn from_os_vars<I>(vars: I, cwd: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let env = vars
            .into_iter()
            .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (key, _) => {
                    let key = match key {
                        Ok(key) => key,
                        Err(raw) => raw.to_string_lossy().into_owned(),
                    };
                    tracing::warn!(variable = %key, "skipping non-Unicode environment variable");
                    None
                }
            })
            .collect();

        Self { env, cwd: cwd.into() }
    }

    /// Set a variable
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    /// Builder form of [`StepContext::set_var`]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_var(key, value);
        self
    }

    /// Remove a variable
    pub fn remove_var(&mut self, key: &str) {
        self.env.remove(key);
    }

    /// Look up a variable
    pub fn var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Overlay variables, later values winning
    pub fn extend<K, V, I>(&mut self, vars: I)
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in vars {
            self.set_var(k, v);
        }
    }

    /// Prepend a directory to `PATH`
    pub fn prepend_path(&mut self, dir: &Path) {
        let dir = dir.to_string_lossy();
        let path = match self.env.get("PATH") {
            Some(existing) if !existing.is_empty() => format!("{}:{}", dir, existing),
            _ => dir.into_owned(),
        };
        self.env.insert("PATH".to_string(), path);
    }

    /// All variables
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Working directory
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Change the working directory of this snapshot
    pub fn set_cwd(&mut self, cwd: impl Into<PathBuf>) {
        self.cwd = cwd.into();
    }

    /// Resolve `path` against the working directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

/// Trait for step bodies
#[async_trait]
pub trait StepBody: Send + Sync {
    /// Run the body to completion
    ///
    /// `Ok` with an unsuccessful [`ExecutionResult`] and `Err` are both step
    /// failures; the distinction only affects what gets reported.
    async fn execute(&self, context: StepContext) -> Result<ExecutionResult, CrossflowError>;

    /// Short label for plans and graphs
    fn kind(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_is_independent() {
        let base = StepContext::new("/work").with_var("A", "1");
        let mut copy = base.clone();
        copy.set_var("A", "2");
        copy.set_var("B", "3");
        copy.set_cwd("/elsewhere");

        assert_eq!(base.var("A"), Some("1"));
        assert_eq!(base.var("B"), None);
        assert_eq!(base.cwd(), Path::new("/work"));
    }

    #[test]
    fn test_prepend_path() {
        let mut ctx = StepContext::new("/").with_var("PATH", "/usr/bin");
        ctx.prepend_path(Path::new("/opt/cross/bin"));
        assert_eq!(ctx.var("PATH"), Some("/opt/cross/bin:/usr/bin"));

        let mut empty = StepContext::new("/");
        empty.prepend_path(Path::new("/opt/cross/bin"));
        assert_eq!(empty.var("PATH"), Some("/opt/cross/bin"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_unicode_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let vars = vec![
            (OsString::from("PATH"), OsString::from("/usr/bin")),
            (OsString::from("BROKEN"), OsString::from_vec(vec![0xff, 0xfe])),
            (OsString::from_vec(vec![b'K', 0xff]), OsString::from("value")),
        ];

        let ctx = StepContext::from_os_vars(vars, "/work");
        assert_eq!(ctx.var("PATH"), Some("/usr/bin"));
        assert_eq!(ctx.var("BROKEN"), None);
        assert_eq!(ctx.vars().len(), 1);
    }

    #[test]
    fn test_inherit_snapshots_process_environment() {
        let ctx = StepContext::inherit("/work");
        assert_eq!(ctx.var("PATH"), std::env::var("PATH").ok().as_deref());
        assert_eq!(ctx.cwd(), Path::new("/work"));
    }

    #[test]
    fn test_resolve_relative() {
        let ctx = StepContext::new("/work");
        assert_eq!(ctx.resolve(Path::new("src/a")), PathBuf::from("/work/src/a"));
        assert_eq!(ctx.resolve(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
