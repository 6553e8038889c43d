//! Build graph plumbing shared by projects and workspaces.
//!
//! - [`BuildContext`] carries the scheduler and process runner that every
//!   compile and link job uses.
//! - [`graph`] orders projects by their library references.
//! - [`compdb`] writes `compile_commands.json` for editor tooling.
//! - [`BuildEvents`] is how a finished build is reported.

pub mod compdb;
pub mod graph;

use crate::jobs::{JobHandle, Scheduler, SchedulerError};
use crate::toolchain::{ProcessRunner, SystemRunner};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use graph::DependencyGraph;

/// Everything a job needs to reach the outside world.
#[derive(Clone)]
pub struct BuildContext {
    pub scheduler: Scheduler,
    pub runner: Arc<dyn ProcessRunner>,
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl BuildContext {
    pub fn new(scheduler: Scheduler, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { scheduler, runner }
    }

    /// A context that spawns real toolchain processes on `workers` threads
    /// (one per CPU when `0`).
    pub fn system(workers: usize) -> Result<Self, SchedulerError> {
        Ok(Self::new(Scheduler::new(workers)?, Arc::new(SystemRunner)))
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("dependency cycle between projects: {}", projects.join(", "))]
    Cycle { projects: Vec<String> },

    #[error("duplicate project name '{0}'")]
    DuplicateProject(String),
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Raised once per build, after every link job has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFinished {
    pub workspace: String,
    /// The final linked artifact, if one was produced.
    pub output: Option<PathBuf>,
    pub success: bool,
}

/// Receiver of build notifications. Called from a worker thread.
pub trait BuildEvents: Send + Sync {
    fn build_finished(&self, event: &BuildFinished);
}

impl<F> BuildEvents for F
where
    F: Fn(&BuildFinished) + Send + Sync,
{
    fn build_finished(&self, event: &BuildFinished) {
        self(event)
    }
}

/// An in-flight (or finished) workspace build.
#[derive(Debug, Clone)]
pub struct BuildHandle {
    job: JobHandle,
    scheduler: Scheduler,
}

impl BuildHandle {
    pub(crate) fn new(job: JobHandle, scheduler: Scheduler) -> Self {
        Self { job, scheduler }
    }

    /// The terminal aggregation job.
    pub fn job(&self) -> JobHandle {
        self.job
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_complete(self.job)
    }

    /// Blocks until the build finishes; returns the final artifact.
    pub fn wait(&self) -> Option<PathBuf> {
        self.scheduler.wait(self.job).flatten()
    }

    /// Final artifact if the build already finished.
    pub fn output(&self) -> Option<PathBuf> {
        self.scheduler.result(self.job).flatten()
    }
}
