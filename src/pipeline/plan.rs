// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Execution plan
//!
//! Turns a [`Pipeline`] definition into runnable [`Step`]s: resolves every
//! path against the pipeline root and the layout, adds implicit
//! fetch → extract edges, and prepares the base context each step copies.

use std::path::{Path, PathBuf};

use crate::errors::{CrossflowError, CrossflowResult};
use crate::executors::{ArtifactFetcher, ExtractExecutor, FetchExecutor, ShellExecutor, StepBody, StepContext};
use crate::markers::FilesystemMarkerStore;
use crate::pipeline::{Action, DagBuilder, Layout, Pipeline, Stage, Step};

/// A stage with every path made absolute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedAction {
    Fetch {
        url: String,
        dest: PathBuf,
        blake3: Option<String>,
    },
    Extract {
        archive: PathBuf,
        dest: PathBuf,
    },
    Shell {
        command: String,
        shell: String,
        workdir: PathBuf,
    },
}

/// Stage after path resolution and dependency completion
#[derive(Debug, Clone)]
pub struct ResolvedStage {
    pub name: String,
    pub action: ResolvedAction,
    /// Declared dependencies followed by implicit ones
    pub depends_on: Vec<String>,
}

/// Last non-empty path segment of a URL
pub fn url_file_name(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

fn join(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Resolve one stage's paths. `layout` must already be resolved.
pub fn resolve_action(stage: &Stage, layout: &Layout, root: &Path) -> CrossflowResult<ResolvedAction> {
    Ok(match &stage.action {
        Action::Fetch { url, dest, blake3 } => {
            let dest = match dest {
                Some(dest) => join(root, dest),
                None => {
                    let file = url_file_name(url).ok_or_else(|| CrossflowError::InvalidStage {
                        stage: stage.name.clone(),
                        reason: format!("cannot derive a file name from '{}'; set `dest`", url),
                    })?;
                    layout.archives.join(file)
                }
            };
            ResolvedAction::Fetch {
                url: url.clone(),
                dest,
                blake3: blake3.clone(),
            }
        }
        Action::Extract {
            archive,
            component,
            dest,
        } => {
            let dest = match dest {
                Some(dest) => join(root, dest),
                None => layout
                    .sources
                    .join(component.as_deref().unwrap_or(&stage.name)),
            };
            ResolvedAction::Extract {
                archive: join(root, archive),
                dest,
            }
        }
        Action::Shell {
            command,
            shell,
            component,
            workdir,
        } => {
            let workdir = match (workdir, component) {
                (Some(dir), _) => join(root, dir),
                (None, Some(component)) => layout.build.join(component),
                (None, None) => root.to_path_buf(),
            };
            ResolvedAction::Shell {
                command: command.clone(),
                shell: shell.clone(),
                workdir,
            }
        }
    })
}

/// Resolve every stage, adding an edge from each extract stage to the fetch
/// stage whose destination is its archive.
pub fn resolve_stages(pipeline: &Pipeline, layout: &Layout, root: &Path) -> CrossflowResult<Vec<ResolvedStage>> {
    let actions = pipeline
        .stages
        .iter()
        .map(|stage| resolve_action(stage, layout, root))
        .collect::<CrossflowResult<Vec<_>>>()?;

    let producers: Vec<(String, PathBuf)> = pipeline
        .stages
        .iter()
        .zip(&actions)
        .filter_map(|(stage, action)| match action {
            ResolvedAction::Fetch { dest, .. } => Some((stage.name.clone(), dest.clone())),
            _ => None,
        })
        .collect();

    Ok(pipeline
        .stages
        .iter()
        .zip(actions)
        .map(|(stage, action)| {
            let mut depends_on = stage.depends_on.clone();
            if let ResolvedAction::Extract { archive, .. } = &action {
                for (producer, dest) in &producers {
                    if dest.as_path() == archive.as_path() && !depends_on.contains(producer) {
                        tracing::debug!(stage = %stage.name, fetch = %producer, "implicit dependency");
                        depends_on.push(producer.clone());
                    }
                }
            }
            ResolvedStage {
                name: stage.name.clone(),
                action,
                depends_on,
            }
        })
        .collect())
}

/// Everything needed to run a pipeline
pub struct PipelinePlan {
    /// Directory the pipeline file lives in
    pub root: PathBuf,
    /// Layout with absolute paths
    pub layout: Layout,
    /// Steps in declaration order
    pub steps: Vec<Step>,
    /// Context every step starts from
    pub base: StepContext,
}

impl PipelinePlan {
    /// Build the plan for `pipeline` rooted at `root`
    pub fn from_pipeline(pipeline: &Pipeline, root: &Path, fetcher: ArtifactFetcher) -> CrossflowResult<Self> {
        let layout = pipeline.layout.resolve(root);
        let resolved = resolve_stages(pipeline, &layout, root)?;

        let steps = pipeline
            .stages
            .iter()
            .zip(resolved)
            .map(|(stage, resolved)| {
                let body: Box<dyn StepBody> = match resolved.action {
                    ResolvedAction::Fetch { url, dest, blake3 } => {
                        Box::new(FetchExecutor::new(fetcher.clone(), url, dest).with_blake3(blake3))
                    }
                    ResolvedAction::Extract { archive, dest } => {
                        Box::new(ExtractExecutor::new(archive, dest))
                    }
                    ResolvedAction::Shell {
                        command,
                        shell,
                        workdir,
                    } => Box::new(ShellExecutor::new(command).with_shell(shell).in_dir(workdir)),
                };

                stage
                    .env
                    .iter()
                    .fold(Step::boxed(&stage.name, body).depends_on(resolved.depends_on), |step, (k, v)| {
                        step.with_env(k, v)
                    })
            })
            .collect();

        let base = Self::base_context(pipeline, &layout, root);

        Ok(Self {
            root: root.to_path_buf(),
            layout,
            steps,
            base,
        })
    }

    /// Process environment overlaid with layout variables and pipeline `env`
    fn base_context(pipeline: &Pipeline, layout: &Layout, root: &Path) -> StepContext {
        let mut base = StepContext::inherit(root);

        if layout.prefix_on_path {
            base.prepend_path(&layout.prefix.join("bin"));
        }
        base.extend(layout.env_vars());

        let jobs = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        base.set_var("CROSSFLOW_JOBS", jobs.to_string());

        base.extend(pipeline.env.clone());
        base
    }

    /// Marker store for this pipeline
    pub fn markers(&self) -> FilesystemMarkerStore {
        FilesystemMarkerStore::new(&self.layout.state)
    }

    /// Dependency graph over the planned steps
    pub fn dag(&self) -> CrossflowResult<DagBuilder> {
        DagBuilder::from_steps(&self.steps)
    }
}
