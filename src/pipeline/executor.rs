// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Pipeline executor
//!
//! Orchestrates the execution of pipeline steps in dependency order, one at
//! a time, stopping at the first failure.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;

use crate::errors::{CrossflowError, CrossflowResult};
use crate::executors::StepContext;
use crate::markers::MarkerStore;
use crate::pipeline::{DagBuilder, Step, StepOutcome, StepRunner};

/// Pipeline execution options
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Only show what would be done
    pub dry_run: bool,
    /// Abort the running step on Ctrl-C
    pub interruptible: bool,
}

/// Result of executing a pipeline
#[derive(Debug)]
pub struct PipelineResult {
    /// Outcome for each step, in execution order
    pub outcomes: Vec<(String, StepOutcome)>,
    /// Total execution time
    pub duration: Duration,
}

impl PipelineResult {
    /// Steps whose body ran
    pub fn executed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.executed()).count()
    }

    /// Steps skipped because they were already complete
    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.executed()
    }
}

/// Pipeline executor
pub struct PipelineExecutor {
    markers: Arc<dyn MarkerStore>,
    title: Option<String>,
}

impl PipelineExecutor {
    /// Create an executor recording completions in `markers`
    pub fn new(markers: Arc<dyn MarkerStore>) -> Self {
        Self {
            markers,
            title: None,
        }
    }

    /// Name shown above the execution plan
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Run every step in dependency order.
    ///
    /// Steps with a marker are skipped without invoking their body. The first
    /// failing step aborts the run; markers of earlier steps are kept.
    pub async fn run_all(
        &self,
        steps: &[Step],
        base: &StepContext,
        options: &ExecutionOptions,
    ) -> CrossflowResult<PipelineResult> {
        if options.interruptible {
            self.run_all_until(steps, base, options, interrupt_signal()).await
        } else {
            self.run_all_until(steps, base, options, std::future::pending()).await
        }
    }

    /// Like [`PipelineExecutor::run_all`], aborting the running step when
    /// `interrupt` resolves. The aborted step is reported as interrupted and
    /// left without a marker.
    pub async fn run_all_until<F>(
        &self,
        steps: &[Step],
        base: &StepContext,
        options: &ExecutionOptions,
        interrupt: F,
    ) -> CrossflowResult<PipelineResult>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        let start = Instant::now();

        let dag = DagBuilder::from_steps(steps)?;
        let order = dag.execution_order()?;

        self.print_execution_plan(steps, &order, &dag).await?;

        if options.dry_run {
            return Ok(PipelineResult {
                outcomes: Vec::new(),
                duration: start.elapsed(),
            });
        }

        let runner = StepRunner::new(self.markers.as_ref());
        let total = order.len();
        let mut outcomes = Vec::with_capacity(total);

        for (i, &idx) in order.iter().enumerate() {
            let step = &steps[idx];
            let position = (i + 1, total);

            let result = tokio::select! {
                result = runner.run(step, base, position) => result,
                _ = &mut interrupt => {
                    tracing::warn!(step = step.name(), "interrupted");
                    Err(CrossflowError::Interrupted {
                        step: step.name().to_string(),
                    })
                }
            };

            match result {
                Ok(outcome) => outcomes.push((step.name().to_string(), outcome)),
                Err(e) => {
                    println!();
                    println!(
                        "{}",
                        format!(
                            "Pipeline stopped at '{}' after {:.2}s",
                            step.name(),
                            start.elapsed().as_secs_f64()
                        )
                        .red()
                    );
                    return Err(e);
                }
            }
        }

        let result = PipelineResult {
            outcomes,
            duration: start.elapsed(),
        };

        println!();
        println!(
            "{}",
            format!(
                "Pipeline completed in {:.2}s ({} run, {} already complete)",
                result.duration.as_secs_f64(),
                result.executed(),
                result.skipped()
            )
            .green()
        );

        Ok(result)
    }

    /// Print the execution plan with each step's current state
    async fn print_execution_plan(
        &self,
        steps: &[Step],
        order: &[usize],
        dag: &DagBuilder,
    ) -> CrossflowResult<()> {
        println!();
        if let Some(title) = &self.title {
            println!("{}: {}", "Pipeline".bold(), title);
            println!("{}", "═".repeat(50));
        }
        println!(
            "Execution plan ({} step{}):",
            order.len(),
            if order.len() == 1 { "" } else { "s" }
        );
        println!();

        for (i, &idx) in order.iter().enumerate() {
            let step = &steps[idx];
            let deps = dag.dependencies(step.name()).unwrap_or_default();
            let state = if self.markers.is_complete(step.name()).await? {
                "complete".green()
            } else {
                "pending".yellow()
            };

            print!("  {}. {} ({}) {}", i + 1, step.name().bold(), step.kind(), state);

            if !deps.is_empty() {
                print!(" {}", format!("[depends: {}]", deps.join(", ")).dimmed());
            }

            println!();
        }

        println!();

        Ok(())
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupt_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::ShellExecutor;
    use crate::markers::FilesystemMarkerStore;
    use crate::pipeline::runner::test_support::CountingBody;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn executor(dir: &TempDir) -> (PipelineExecutor, Arc<FilesystemMarkerStore>) {
        let store = Arc::new(FilesystemMarkerStore::new(dir.path().join("state")));
        (PipelineExecutor::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_resumes_at_first_unmarked_step() {
        let dir = TempDir::new().unwrap();
        let (executor, store) = executor(&dir);
        for name in ["a", "b"] {
            store
                .mark_complete(&crate::markers::MarkerRecord::now(name, Duration::ZERO))
                .await
                .unwrap();
        }

        let bodies = [CountingBody::ok(), CountingBody::ok(), CountingBody::ok()];
        let steps = vec![
            Step::new("a", bodies[0].clone()),
            Step::new("b", bodies[1].clone()).depends_on(["a"]),
            Step::new("c", bodies[2].clone()).depends_on(["b"]),
        ];

        let result = executor
            .run_all(&steps, &StepContext::new(dir.path()), &ExecutionOptions::default())
            .await
            .unwrap();

        assert_eq!(bodies[0].calls(), 0);
        assert_eq!(bodies[1].calls(), 0);
        assert_eq!(bodies[2].calls(), 1);
        assert_eq!(result.executed(), 1);
        assert_eq!(result.skipped(), 2);
    }

    #[tokio::test]
    async fn test_failure_stops_pipeline() {
        let dir = TempDir::new().unwrap();
        let (executor, store) = executor(&dir);

        let after = CountingBody::ok();
        let steps = vec![
            Step::new("a", CountingBody::ok()),
            Step::new("b", CountingBody::failing()),
            Step::new("c", after.clone()),
        ];

        let err = executor
            .run_all(&steps, &StepContext::new(dir.path()), &ExecutionOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.step(), Some("b"));
        assert_eq!(after.calls(), 0);
        assert!(store.is_complete("a").await.unwrap());
        assert!(!store.is_complete("b").await.unwrap());
        assert!(!store.is_complete("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_runs_in_stable_dependency_order() {
        let dir = TempDir::new().unwrap();
        let (executor, _) = executor(&dir);
        let log = Arc::new(Mutex::new(Vec::new()));

        let steps = vec![
            Step::new("gcc", CountingBody::logging(&log, "gcc")).depends_on(["binutils"]),
            Step::new("fetch-a", CountingBody::logging(&log, "fetch-a")),
            Step::new("fetch-b", CountingBody::logging(&log, "fetch-b")),
            Step::new("binutils", CountingBody::logging(&log, "binutils")).depends_on(["fetch-a"]),
        ];

        executor
            .run_all(&steps, &StepContext::new(dir.path()), &ExecutionOptions::default())
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["fetch-a", "fetch-b", "binutils", "gcc"]
        );
    }

    #[tokio::test]
    async fn test_dry_run_executes_nothing() {
        let dir = TempDir::new().unwrap();
        let (executor, store) = executor(&dir);
        let body = CountingBody::ok();
        let steps = vec![Step::new("a", body.clone())];

        let options = ExecutionOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = executor
            .run_all(&steps, &StepContext::new(dir.path()), &options)
            .await
            .unwrap();

        assert!(result.outcomes.is_empty());
        assert_eq!(body.calls(), 0);
        assert!(!store.is_complete("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_cycle_is_rejected_before_running() {
        let dir = TempDir::new().unwrap();
        let (executor, _) = executor(&dir);
        let body = CountingBody::ok();
        let steps = vec![
            Step::new("a", body.clone()).depends_on(["b"]),
            Step::new("b", body.clone()).depends_on(["a"]),
        ];

        let result = executor
            .run_all(&steps, &StepContext::new(dir.path()), &ExecutionOptions::default())
            .await;

        assert!(matches!(result, Err(CrossflowError::CircularDependency { .. })));
        assert_eq!(body.calls(), 0);
    }

    #[tokio::test]
    async fn test_shell_steps_do_not_share_environment() {
        let dir = TempDir::new().unwrap();
        let (executor, _) = executor(&dir);
        let out = dir.path().join("seen.txt");
        let base = StepContext::new(dir.path())
            .with_var("PATH", std::env::var("PATH").unwrap_or_default())
            .with_var("OUT", out.display().to_string());

        let steps = vec![
            Step::new(
                "mutate",
                ShellExecutor::new("export LEAK=1; mkdir -p sub; cd sub").with_shell("sh"),
            ),
            Step::new(
                "observe",
                ShellExecutor::new("echo \"leak=${LEAK:-none} cwd=$(pwd)\" > \"$OUT\"").with_shell("sh"),
            )
            .depends_on(["mutate"]),
        ];

        executor
            .run_all(&steps, &base, &ExecutionOptions::default())
            .await
            .unwrap();

        let seen = std::fs::read_to_string(&out).unwrap();
        let cwd = dir.path().canonicalize().unwrap();
        assert_eq!(seen.trim(), format!("leak=none cwd={}", cwd.display()));
        assert!(std::env::var("LEAK").is_err());
    }

    #[tokio::test]
    async fn test_interrupt_aborts_running_step_without_marker() {
        let dir = TempDir::new().unwrap();
        let (executor, store) = executor(&dir);
        let base = StepContext::new(dir.path())
            .with_var("PATH", std::env::var("PATH").unwrap_or_default());

        let before = CountingBody::ok();
        let after = CountingBody::ok();
        let steps = vec![
            Step::new("configure", before.clone()),
            Step::new("slow", ShellExecutor::new("sleep 5").with_shell("sh")).depends_on(["configure"]),
            Step::new("install", after.clone()).depends_on(["slow"]),
        ];

        let started = Instant::now();
        let result = executor
            .run_all_until(
                &steps,
                &base,
                &ExecutionOptions::default(),
                tokio::time::sleep(Duration::from_millis(300)),
            )
            .await;

        match result {
            Err(CrossflowError::Interrupted { step }) => assert_eq!(step, "slow"),
            other => panic!("Expected Interrupted, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(before.calls(), 1);
        assert_eq!(after.calls(), 0);
        assert!(store.is_complete("configure").await.unwrap());
        assert!(!store.is_complete("slow").await.unwrap());
        assert!(!store.is_complete("install").await.unwrap());
    }

    fn toolchain_archive() -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let script = "#!/bin/sh\necho built > \"$1\"\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(script.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, "hello-1.0/build.sh", script.as_bytes())
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[tokio::test]
    async fn test_fetch_extract_build_end_to_end() {
        use crate::executors::fetch::test_server::{spawn, Reply};
        use crate::executors::{ArtifactFetcher, ExtractExecutor, FetchExecutor};

        let server = spawn(Reply::Full(toolchain_archive())).await;
        let dir = TempDir::new().unwrap();
        let (executor, store) = executor(&dir);
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let fetcher = ArtifactFetcher::with_client(client);
        let base = StepContext::new(dir.path())
            .with_var("PATH", std::env::var("PATH").unwrap_or_default());

        let steps = vec![
            Step::new(
                "fetch-hello",
                FetchExecutor::new(
                    fetcher,
                    format!("{}/hello-1.0.tar.gz", server.base_url),
                    "archives/hello-1.0.tar.gz",
                ),
            ),
            Step::new(
                "hello-src",
                ExtractExecutor::new("archives/hello-1.0.tar.gz", "src/hello"),
            )
            .depends_on(["fetch-hello"]),
            Step::new(
                "hello",
                ShellExecutor::new("sh ../../src/hello/build.sh artifact")
                    .with_shell("sh")
                    .in_dir("build/hello"),
            )
            .depends_on(["hello-src"]),
        ];

        let first = executor
            .run_all(&steps, &base, &ExecutionOptions::default())
            .await
            .unwrap();
        assert_eq!(first.executed(), 3);
        assert_eq!(server.hits(), 1);
        assert!(dir.path().join("build/hello/artifact").exists());

        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|r| r.step).collect();
        assert_eq!(names, vec!["fetch-hello", "hello-src", "hello"]);

        std::fs::remove_file(dir.path().join("build/hello/artifact")).unwrap();

        let second = executor
            .run_all(&steps, &base, &ExecutionOptions::default())
            .await
            .unwrap();
        assert_eq!(second.executed(), 0);
        assert_eq!(second.skipped(), 3);
        assert_eq!(server.hits(), 1);
        assert!(!dir.path().join("build/hello/artifact").exists());
    }
}
