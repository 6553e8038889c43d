//! Workspaces: a named set of projects plus the build matrix they are
//! configured from.
//!
//! A workspace persists itself to `<location>/<name>.gwks`. It stores its
//! projects as paths to their project files relative to its own location,
//! and writes every project file alongside its own.
//!
//! ```toml
//! Name = "demo"
//! Projects = ["liba/liba.gprj", "app/app.gprj"]
//!
//! [Matrix.Compiler.GCC]
//! Compiler = "GCC"
//!
//! [Matrix.Target.Release]
//! Optimization = "Release"
//! ```

mod build;
mod matrix;

pub use matrix::{BuildMatrix, Column};

use crate::build::{DependencyGraph, GraphError};
use crate::config::Configuration;
use crate::persist::{self, Deserializer, Serializer, Table, Value};
use crate::project::{self, Project};
use crate::toolchain::{Architecture, Backend, Optimization};
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct Workspace {
    pub(crate) name: String,
    pub(crate) location: PathBuf,
    projects: Vec<Project>,
    pub matrix: BuildMatrix,
}

impl Workspace {
    pub const EXTENSION: &'static str = "gwks";

    pub fn new(location: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            projects: Vec::new(),
            matrix: BuildMatrix::with_defaults(),
        }
    }

    /// Reads a workspace file and every project it lists.
    pub fn load(path: &Path) -> Result<Workspace> {
        let path = persist::normalize(path);
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .context("Workspace path has no file name")?;
        let location = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut workspace = Workspace::new(location, name);
        workspace.deserialize()?;
        Ok(workspace)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn file_path(&self) -> PathBuf {
        self.location
            .join(format!("{}.{}", self.name, Self::EXTENSION))
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn project_by_name(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    pub fn project_by_name_mut(&mut self, name: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.name == name)
    }

    /// Creates a project in `location` (relative paths are anchored at the
    /// workspace) and persists both the project and the workspace.
    pub fn new_project(&mut self, location: &Path, name: &str) -> Result<&mut Project> {
        if self.project_by_name(name).is_some() {
            return Err(GraphError::DuplicateProject(name.to_string()).into());
        }
        let location = persist::anchor(location, &self.location);
        let project = Project::new(location, name);
        project.serialize()?;
        self.projects.push(project);
        self.serialize()?;

        let index = self.projects.len() - 1;
        Ok(&mut self.projects[index])
    }

    /// Adds an existing project file. Returns `false` if a project with the
    /// same name is already part of the workspace.
    pub fn add_project(&mut self, path: &Path) -> Result<bool> {
        let path = persist::anchor(path, &self.location);
        let project = Project::load(&path)?;
        if self.project_by_name(project.name()).is_some() {
            warn!(project = project.name(), "project already in workspace");
            return Ok(false);
        }
        self.projects.push(project);
        self.serialize()?;
        Ok(true)
    }

    /// Drops the project from the workspace. Its files stay on disk.
    pub fn remove_project(&mut self, name: &str) -> Result<bool> {
        let Some(index) = self.projects.iter().position(|p| p.name == name) else {
            return Ok(false);
        };
        self.projects.remove(index);
        self.serialize()?;
        Ok(true)
    }

    /// Renames a project and its project file.
    pub fn rename_project(&mut self, name: &str, new_name: &str) -> Result<bool> {
        if new_name.is_empty() || self.project_by_name(new_name).is_some() {
            return Ok(false);
        }
        let Some(project) = self.project_by_name_mut(name) else {
            return Ok(false);
        };

        let old_path = project.file_path();
        let new_path = project::file_path_for(project.location(), new_name);
        if old_path.exists() {
            fs::rename(&old_path, &new_path).with_context(|| {
                format!("Failed to rename {} to {}", old_path.display(), new_path.display())
            })?;
        }
        project.name = new_name.to_string();
        project.serialize()?;
        self.serialize()?;
        Ok(true)
    }

    /// Renames the workspace and its workspace file.
    pub fn rename(&mut self, new_name: &str) -> Result<()> {
        if new_name.is_empty() {
            bail!("Workspace name cannot be empty");
        }
        let old_path = self.file_path();
        self.name = new_name.to_string();
        let new_path = self.file_path();
        if old_path.exists() {
            fs::rename(&old_path, &new_path).with_context(|| {
                format!("Failed to rename {} to {}", old_path.display(), new_path.display())
            })?;
        }
        self.serialize()
    }

    /// The configuration a build starts from.
    pub fn current_configuration(&self) -> Configuration {
        self.matrix.current_configuration()
    }

    /// Projects ordered so each comes after every project it links.
    pub fn build_order(&self) -> Result<Vec<&Project>, GraphError> {
        let base = self.current_configuration();
        let configs: Vec<Configuration> = self
            .projects
            .iter()
            .map(|p| p.resolve_configuration(&base))
            .collect();
        let graph = self.dependency_graph(&configs)?;
        Ok(graph
            .topological_order()?
            .into_iter()
            .map(|i| &self.projects[i])
            .collect())
    }

    /// Graph over projects, indexed like `self.projects`. `configs[i]` is
    /// the resolved configuration of project `i`.
    pub(crate) fn dependency_graph(
        &self,
        configs: &[Configuration],
    ) -> Result<DependencyGraph, GraphError> {
        DependencyGraph::new(
            self.projects
                .iter()
                .zip(configs)
                .map(|(p, c)| (p.name.as_str(), c.libraries.as_slice())),
        )
    }

    // --- Persistence ---

    pub fn serialize(&self) -> Result<()> {
        if self.location.as_os_str().is_empty() {
            error!(workspace = %self.name, "Failed to serialize workspace: location not specified");
            bail!("Cannot serialize workspace '{}': location not specified", self.name);
        }

        let mut ser = Serializer::new(self.file_path());
        ser.write_object("Name", self.name.as_str());
        ser.write_object("Matrix", matrix_to_table(&self.matrix));

        let project_paths: Vec<PathBuf> = self.projects.iter().map(Project::file_path).collect();
        if !project_paths.is_empty() {
            ser.write_object(
                "Projects",
                persist::relative_list(&project_paths, &self.location),
            );
        }
        ser.finish()?;

        for project in &self.projects {
            project.serialize()?;
        }
        Ok(())
    }

    /// Replaces in-memory state with the workspace file and the project
    /// files it lists. On error the workspace is left untouched.
    pub fn deserialize(&mut self) -> Result<()> {
        if self.location.as_os_str().is_empty() {
            error!(workspace = %self.name, "Failed to deserialize workspace: location not specified");
            bail!("Cannot deserialize workspace '{}': location not specified", self.name);
        }

        let de = Deserializer::open(&self.file_path())?;
        let mut loaded = Workspace {
            name: self.name.clone(),
            location: self.location.clone(),
            projects: Vec::new(),
            matrix: BuildMatrix::default(),
        };
        let mut saw_matrix = false;

        de.objects(|name, value| {
            match name {
                "Name" => loaded.name = persist::expect_str(name, value)?.to_string(),
                "Matrix" => {
                    loaded.matrix = matrix_from_table(persist::expect_table(name, value)?)?;
                    saw_matrix = true;
                }
                "Projects" => {
                    for path in persist::anchored_list(name, value, &loaded.location)? {
                        let project = Project::load(&path).with_context(|| {
                            format!("Failed to load project {}", path.display())
                        })?;
                        if loaded.project_by_name(project.name()).is_some() {
                            return Err(GraphError::DuplicateProject(project.name).into());
                        }
                        loaded.projects.push(project);
                    }
                }
                other => debug!(key = other, "ignoring unknown workspace key"),
            }
            Ok(())
        })?;

        if !saw_matrix {
            loaded.matrix = BuildMatrix::with_defaults();
        }
        *self = loaded;
        Ok(())
    }
}

fn matrix_to_table(matrix: &BuildMatrix) -> Table {
    let mut columns = Table::new();
    for column in matrix.columns() {
        let mut presets = Table::new();
        for (name, config) in column.configurations() {
            let mut preset = Table::new();
            if let Some(compiler) = config.compiler {
                preset.insert("Compiler".into(), Value::from(compiler.name()));
            }
            if let Some(arch) = config.architecture {
                preset.insert("Architecture".into(), Value::from(arch.name()));
            }
            if let Some(opt) = config.optimization {
                preset.insert("Optimization".into(), Value::from(opt.name()));
            }
            presets.insert(name.clone(), Value::Table(preset));
        }
        columns.insert(column.name.clone(), Value::Table(presets));
    }
    columns
}

fn matrix_from_table(table: &Table) -> Result<BuildMatrix> {
    let mut matrix = BuildMatrix::default();
    for (column_name, presets) in table {
        let presets = persist::expect_table(column_name, presets)?;
        let column = matrix.new_column(column_name);
        for (preset_name, body) in presets {
            let body = persist::expect_table(preset_name, body)?;
            let mut config = Configuration::default();
            if let Some(value) = body.get("Compiler") {
                let name = persist::expect_str("Compiler", value)?;
                config.compiler = Backend::from_name(name);
                if config.compiler.is_none() {
                    warn!(preset = %preset_name, compiler = name, "compiler not available on this platform");
                }
            }
            if let Some(value) = body.get("Architecture") {
                config.architecture = Some(
                    persist::expect_str("Architecture", value)?
                        .parse::<Architecture>()
                        .map_err(anyhow::Error::msg)?,
                );
            }
            if let Some(value) = body.get("Optimization") {
                config.optimization = Some(
                    persist::expect_str("Optimization", value)?
                        .parse::<Optimization>()
                        .map_err(anyhow::Error::msg)?,
                );
            }
            column.add_configuration(preset_name.as_str(), config);
        }
    }
    Ok(matrix)
}
