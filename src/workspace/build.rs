//! Workspace graph construction: compile jobs per project, one link job per
//! project, one aggregation job for the whole build.

use super::Workspace;
use crate::build::{
    BuildContext, BuildError, BuildEvents, BuildFinished, BuildHandle, DependencyGraph,
};
use crate::config::Configuration;
use crate::jobs::{JobHandle, JobInputs, JobOutput, SchedulerError};
use crate::project::{Project, ProjectKind};
use crate::toolchain::{self, ProcessRunner};
use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// A project this link step depends on, by name and link job.
#[derive(Debug, Clone)]
struct LinkedProject {
    name: String,
    job: JobHandle,
}

impl Workspace {
    /// Submits the whole build and returns immediately.
    ///
    /// Projects are visited in dependency order. Each project is compiled
    /// against the matrix configuration with its own local settings on top.
    /// A project's link job waits for its compile jobs and for the link
    /// jobs of every project named in its library list (and, for
    /// executables and shared libraries, of the static libraries those pull
    /// in). The aggregation job waits for every link job and reports
    /// through `events`; the build succeeds only if every project linked.
    pub fn build(
        &mut self,
        ctx: &BuildContext,
        events: Arc<dyn BuildEvents>,
    ) -> Result<BuildHandle, BuildError> {
        let base = self.current_configuration();
        let configs: Vec<Configuration> = self
            .projects
            .iter()
            .map(|p| p.resolve_configuration(&base))
            .collect();
        let graph = self.dependency_graph(&configs)?;
        let order = graph.topological_order()?;

        let kinds: Vec<ProjectKind> = self.projects.iter().map(|p| p.kind).collect();
        let mut position = vec![0; order.len()];
        for (pos, &index) in order.iter().enumerate() {
            position[index] = pos;
        }

        let mut link_jobs: Vec<Option<JobHandle>> = vec![None; self.projects.len()];
        let mut ordered_links = Vec::with_capacity(order.len());

        for &index in &order {
            let project = &mut self.projects[index];
            let mut config = project.build(ctx, &base)?;

            let closure = link_closure(&graph, &kinds, &position, index);
            config.libraries = external_libraries(&graph, &configs, &kinds, index, &closure);

            let mut linked = Vec::with_capacity(closure.len());
            for dep in closure {
                if let Some(job) = link_jobs[dep] {
                    project.add_linker_dependency(job);
                    linked.push(LinkedProject {
                        name: graph.name(dep).to_string(),
                        job,
                    });
                }
            }

            let job = submit_link(ctx, project, config, linked)?;
            link_jobs[index] = Some(job);
            ordered_links.push(job);
        }

        let links = ordered_links.clone();
        let workspace = self.name.clone();
        let job = ctx.scheduler.submit(&ordered_links, move |inputs| {
            let output = links
                .last()
                .and_then(|job| inputs.output(*job).map(Path::to_path_buf));
            let success =
                !links.is_empty() && links.iter().all(|job| inputs.output(*job).is_some());
            if success {
                info!(workspace = %workspace, "Done building workspace");
            } else {
                error!(workspace = %workspace, "Failed to build workspace");
            }
            events.build_finished(&BuildFinished {
                workspace,
                output: output.clone(),
                success,
            });
            output
        })?;

        debug!(
            workspace = %self.name,
            projects = order.len(),
            "workspace graph constructed"
        );
        Ok(BuildHandle::new(job, ctx.scheduler.clone()))
    }
}

/// Projects whose artifacts the project at `index` links against, ordered
/// dependents first.
///
/// Archives do not carry their own dependencies, so an executable or shared
/// library also links everything reachable through static libraries. A
/// static library waits only on its direct dependencies.
fn link_closure(
    graph: &DependencyGraph,
    kinds: &[ProjectKind],
    position: &[usize],
    index: usize,
) -> Vec<usize> {
    let mut closure = graph.dependencies(index).to_vec();
    if kinds[index] == ProjectKind::StaticLibrary {
        return closure;
    }

    let mut next = 0;
    while next < closure.len() {
        let dep = closure[next];
        next += 1;
        if kinds[dep] != ProjectKind::StaticLibrary {
            continue;
        }
        for &transitive in graph.dependencies(dep) {
            if !closure.contains(&transitive) {
                closure.push(transitive);
            }
        }
    }
    closure.sort_by_key(|&dep| Reverse(position[dep]));
    closure
}

/// Library names passed to the linker as flags: the project's own non-project
/// libraries, then those of every static library it pulls in.
fn external_libraries(
    graph: &DependencyGraph,
    configs: &[Configuration],
    kinds: &[ProjectKind],
    index: usize,
    closure: &[usize],
) -> Vec<String> {
    let mut libraries: Vec<String> = Vec::new();
    let archiving = kinds[index] == ProjectKind::StaticLibrary;
    let forwarded = closure
        .iter()
        .filter(|&&dep| !archiving && kinds[dep] == ProjectKind::StaticLibrary);
    for source in std::iter::once(&index).chain(forwarded) {
        for lib in &configs[*source].libraries {
            if graph.index_of(lib).is_none() && !libraries.contains(lib) {
                libraries.push(lib.clone());
            }
        }
    }
    libraries
}

fn submit_link(
    ctx: &BuildContext,
    project: &Project,
    config: Configuration,
    linked: Vec<LinkedProject>,
) -> Result<JobHandle, SchedulerError> {
    let runner = Arc::clone(&ctx.runner);
    let objects = project.compiler_outputs().to_vec();
    let name = project.name().to_string();
    let kind = project.kind;

    ctx.scheduler
        .submit(project.linker_dependencies(), move |inputs| {
            link_project(runner.as_ref(), &config, &name, kind, &objects, &linked, inputs)
        })
}

/// Body of a link job. Any missing input fails the link.
fn link_project(
    runner: &dyn ProcessRunner,
    config: &Configuration,
    name: &str,
    kind: ProjectKind,
    objects: &[JobHandle],
    linked: &[LinkedProject],
    inputs: &JobInputs,
) -> JobOutput {
    let mut link_inputs: Vec<PathBuf> = Vec::with_capacity(objects.len() + linked.len());

    for job in objects {
        match inputs.output(*job) {
            Some(object) => link_inputs.push(object.to_path_buf()),
            None => {
                error!(project = name, "Failed to link: a source file did not compile");
                return None;
            }
        }
    }

    // Archives hold only their own objects.
    if kind != ProjectKind::StaticLibrary {
        for dep in linked {
            match inputs.output(dep.job) {
                Some(artifact) => link_inputs.push(artifact.to_path_buf()),
                None => {
                    error!(
                        project = name,
                        dependency = %dep.name,
                        "Failed to link: dependency was not built"
                    );
                    return None;
                }
            }
        }
    }

    if link_inputs.is_empty() {
        error!(project = name, "Failed to link: nothing to link");
        return None;
    }

    toolchain::link(runner, config, &link_inputs, name, kind)
}
