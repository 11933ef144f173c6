// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Shell executor
//!
//! Runs an external build command in its own process. The child's
//! environment is cleared and replaced with the step's snapshot, and its
//! working directory is set explicitly, so whatever the command exports or
//! `cd`s into dies with the process.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

use super::{ExecutionResult, StepBody, StepContext};
use crate::errors::CrossflowError;

/// Shell executor
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    command: String,
    shell: String,
    workdir: Option<PathBuf>,
}

impl ShellExecutor {
    /// Create a shell executor running `command` with `bash`
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shell: "bash".to_string(),
            workdir: None,
        }
    }

    /// Use a different shell interpreter
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Run in `dir` (relative paths resolve against the context) instead of
    /// the context's working directory. The directory is created if missing.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }
}

#[async_trait]
impl StepBody for ShellExecutor {
    async fn execute(&self, context: StepContext) -> Result<ExecutionResult, CrossflowError> {
        let start = Instant::now();

        let cwd = match &self.workdir {
            Some(dir) => context.resolve(dir),
            None => context.cwd().to_path_buf(),
        };
        tokio::fs::create_dir_all(&cwd)
            .await
            .map_err(|e| CrossflowError::FileWriteError {
                path: cwd.clone(),
                error: e.to_string(),
            })?;

        tracing::debug!(shell = %self.shell, cwd = %cwd.display(), "spawning: {}", self.command);

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(&self.command);
        cmd.current_dir(&cwd);
        cmd.env_clear();
        cmd.envs(context.vars());
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);

        let status = cmd
            .status()
            .await
            .map_err(|e| CrossflowError::ToolExecutionFailed {
                tool: self.shell.clone(),
                error: e.to_string(),
                help: Some(format!("Shell '{}' may not be available", self.shell)),
            })?;

        let duration = start.elapsed();

        if status.success() {
            Ok(ExecutionResult::success(duration))
        } else {
            Ok(ExecutionResult::failure(status.code(), duration))
        }
    }

    fn kind(&self) -> &'static str {
        "shell"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> StepContext {
        StepContext::inherit(dir.path())
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let dir = TempDir::new().unwrap();
        let executor = ShellExecutor::new("echo hello > out.txt");

        let result = executor.execute(context(&dir)).await.unwrap();

        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        let out = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let dir = TempDir::new().unwrap();
        let executor = ShellExecutor::new("exit 3");

        let result = executor.execute(context(&dir)).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_env_is_exactly_the_snapshot() {
        let dir = TempDir::new().unwrap();
        let ctx = StepContext::new(dir.path())
            .with_var("PATH", std::env::var("PATH").unwrap_or_default())
            .with_var("ONLY_IN_SNAPSHOT", "yes");
        std::env::set_var("CROSSFLOW_SHELL_TEST_LEAK", "1");

        let executor = ShellExecutor::new(
            "test \"$ONLY_IN_SNAPSHOT\" = yes && test -z \"$CROSSFLOW_SHELL_TEST_LEAK\"",
        );
        let result = executor.execute(ctx).await.unwrap();

        assert!(result.success);
    }

    #[tokio::test]
    async fn test_workdir_is_created() {
        let dir = TempDir::new().unwrap();
        let executor = ShellExecutor::new("pwd > where.txt").in_dir("build/binutils");

        let result = executor.execute(context(&dir)).await.unwrap();

        assert!(result.success);
        let expected = dir.path().join("build/binutils");
        let recorded = std::fs::read_to_string(expected.join("where.txt")).unwrap();
        assert_eq!(
            std::fs::canonicalize(recorded.trim()).unwrap(),
            std::fs::canonicalize(&expected).unwrap()
        );
    }

    #[tokio::test]
    async fn test_missing_shell_is_tool_error() {
        let dir = TempDir::new().unwrap();
        let executor = ShellExecutor::new("true").with_shell("/nonexistent/shell");

        let result = executor.execute(context(&dir)).await;

        assert!(matches!(
            result,
            Err(CrossflowError::ToolExecutionFailed { .. })
        ));
    }
}
