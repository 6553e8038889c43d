//! Projects: named collections of source files that build into one artifact.
//!
//! A project lives in a directory (`location`) and persists itself to
//! `<location>/<name>.gprj`. File paths are absolute in memory and stored
//! relative to the location on disk.

mod filter;

pub use filter::{FileFilter, alphabetic_cmp};

use crate::build::BuildContext;
use crate::config::Configuration;
use crate::jobs::{JobHandle, SchedulerError};
use crate::persist::{self, Deserializer, Serializer, Table, Value};
use crate::toolchain::{self, is_compilable, is_header};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error};

/// What a project links into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProjectKind {
    Application,
    StaticLibrary,
    DynamicLibrary,
    #[default]
    Unspecified,
}

impl ProjectKind {
    pub const ALL: [ProjectKind; 4] = [
        ProjectKind::Application,
        ProjectKind::StaticLibrary,
        ProjectKind::DynamicLibrary,
        ProjectKind::Unspecified,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProjectKind::Application => "Application",
            ProjectKind::StaticLibrary => "StaticLibrary",
            ProjectKind::DynamicLibrary => "DynamicLibrary",
            ProjectKind::Unspecified => "Unspecified",
        }
    }

    /// Unrecognized names map to `Unspecified`.
    pub fn from_name(name: &str) -> ProjectKind {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == name)
            .unwrap_or_default()
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct Project {
    pub(crate) name: String,
    pub(crate) location: PathBuf,
    pub kind: ProjectKind,
    pub local_configuration: Configuration,
    file_filters: Vec<FileFilter>,
    compiler_outputs: Vec<JobHandle>,
    linker_dependencies: Vec<JobHandle>,
}

impl Project {
    pub const EXTENSION: &'static str = "gprj";

    pub fn new(location: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            kind: ProjectKind::Unspecified,
            local_configuration: Configuration::default(),
            file_filters: vec![FileFilter::new("")],
            compiler_outputs: Vec::new(),
            linker_dependencies: Vec::new(),
        }
    }

    /// Reads `<dir>/<name>.gprj` given the path to that file.
    pub fn load(path: &Path) -> Result<Project> {
        let path = persist::normalize(path);
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .context("Project path has no file name")?;
        let location = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut project = Project::new(location, name);
        project.deserialize()?;
        Ok(project)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Path of the project file.
    pub fn file_path(&self) -> PathBuf {
        file_path_for(&self.location, &self.name)
    }

    pub fn file_filters(&self) -> &[FileFilter] {
        &self.file_filters
    }

    /// Every file across every filter, in filter order.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.file_filters
            .iter()
            .flat_map(|f| f.files.iter().map(PathBuf::as_path))
    }

    /// Compile jobs from the last [`Project::build`], in file order.
    pub fn compiler_outputs(&self) -> &[JobHandle] {
        &self.compiler_outputs
    }

    /// Jobs the project's link job must wait for.
    pub fn linker_dependencies(&self) -> &[JobHandle] {
        &self.linker_dependencies
    }

    pub fn add_linker_dependency(&mut self, job: JobHandle) {
        if !self.linker_dependencies.contains(&job) {
            self.linker_dependencies.push(job);
        }
    }

    /// `inherited` with this project's local settings layered on top. The
    /// output directory defaults to the project location.
    pub fn resolve_configuration(&self, inherited: &Configuration) -> Configuration {
        let mut config = inherited.overridden_by(&self.local_configuration);
        if config.output_dir.is_none() {
            config.output_dir = Some(self.location.clone());
        }
        config
    }

    /// Submits one compile job per compilable file and returns the
    /// configuration the jobs captured. Headers and other assets are skipped.
    ///
    /// Each job owns a copy of the configuration, so later changes to this
    /// project never reach jobs already submitted.
    pub fn build(
        &mut self,
        ctx: &BuildContext,
        inherited: &Configuration,
    ) -> Result<Configuration, SchedulerError> {
        let config = self.resolve_configuration(inherited);
        self.compiler_outputs.clear();
        self.linker_dependencies.clear();

        let sources: Vec<PathBuf> = self
            .files()
            .filter(|f| is_compilable(f))
            .map(Path::to_path_buf)
            .collect();

        for source in sources {
            let runner = Arc::clone(&ctx.runner);
            let job_config = config.clone();
            let job = ctx.scheduler.submit(&[], move |_| {
                toolchain::compile(runner.as_ref(), &job_config, &source)
            })?;
            self.compiler_outputs.push(job);
            self.linker_dependencies.push(job);
        }

        debug!(
            project = %self.name,
            compile_jobs = self.compiler_outputs.len(),
            "project graph constructed"
        );
        Ok(config)
    }

    // --- File filters ---

    pub fn file_filter_by_name(&self, name: &str) -> Option<&FileFilter> {
        self.file_filters.iter().find(|f| f.name == name)
    }

    fn file_filter_by_name_mut(&mut self, name: &str) -> Option<&mut FileFilter> {
        self.file_filters.iter_mut().find(|f| f.name == name)
    }

    /// Returns `false` if a filter with this name already exists.
    pub fn new_file_filter(&mut self, name: &str) -> Result<bool> {
        if self.file_filter_by_name(name).is_some() {
            return Ok(false);
        }
        self.file_filters.push(FileFilter::new(name));
        self.commit()?;
        Ok(true)
    }

    /// The anonymous filter cannot be removed.
    pub fn remove_file_filter(&mut self, name: &str) -> Result<bool> {
        if name.is_empty() {
            return Ok(false);
        }
        let before = self.file_filters.len();
        self.file_filters.retain(|f| f.name != name);
        if self.file_filters.len() == before {
            return Ok(false);
        }
        self.commit()?;
        Ok(true)
    }

    pub fn rename_file_filter(&mut self, name: &str, new_name: &str) -> Result<bool> {
        if name.is_empty() || new_name.is_empty() || self.file_filter_by_name(new_name).is_some() {
            return Ok(false);
        }
        let Some(filter) = self.file_filter_by_name_mut(name) else {
            return Ok(false);
        };
        filter.name = new_name.to_string();
        self.commit()?;
        Ok(true)
    }

    /// The stored path if `file` belongs to `filter`.
    pub fn file_in_file_filter(&self, file: &Path, filter: &str) -> Option<&Path> {
        self.file_filter_by_name(filter)?
            .files
            .iter()
            .find(|f| f.as_path() == file)
            .map(PathBuf::as_path)
    }

    // --- Files ---

    /// Adds an existing file to `filter`. Relative paths are anchored at the
    /// project location.
    pub fn add_file(&mut self, path: &Path, filter: &str) -> Result<bool> {
        let path = persist::anchor(path, &self.location);
        if self.file_in_file_filter(&path, filter).is_some() {
            return Ok(false);
        }
        let Some(target) = self.file_filter_by_name_mut(filter) else {
            return Ok(false);
        };
        target.files.push(path);
        self.commit()?;
        Ok(true)
    }

    /// Creates (or truncates) the file on disk, then adds it to `filter`.
    pub fn new_file(&mut self, path: &Path, filter: &str) -> Result<bool> {
        let path = persist::anchor(path, &self.location);
        if self.file_filter_by_name(filter).is_none()
            || self.file_in_file_filter(&path, filter).is_some()
        {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        self.add_file(&path, filter)
    }

    pub fn remove_file(&mut self, path: &Path, filter: &str) -> Result<bool> {
        let path = persist::anchor(path, &self.location);
        let Some(target) = self.file_filter_by_name_mut(filter) else {
            return Ok(false);
        };
        let Some(index) = target.files.iter().position(|f| *f == path) else {
            return Ok(false);
        };
        target.files.remove(index);
        self.commit()?;
        Ok(true)
    }

    /// Renames a file in place (same directory), on disk too when it exists.
    pub fn rename_file(&mut self, path: &Path, filter: &str, new_name: &str) -> Result<bool> {
        let path = persist::anchor(path, &self.location);
        let Some(target) = self.file_filter_by_name_mut(filter) else {
            return Ok(false);
        };
        let Some(entry) = target.files.iter_mut().find(|f| **f == path) else {
            return Ok(false);
        };

        let new_path = path
            .parent()
            .map(|p| p.join(new_name))
            .unwrap_or_else(|| PathBuf::from(new_name));
        if path.exists() {
            fs::rename(&path, &new_path).with_context(|| {
                format!("Failed to rename {} to {}", path.display(), new_path.display())
            })?;
        }
        *entry = new_path;
        self.commit()?;
        Ok(true)
    }

    /// Distinct directories containing C/C++ sources or headers.
    pub fn find_source_folders(&self) -> Vec<PathBuf> {
        let mut folders: Vec<PathBuf> = Vec::new();
        for file in self.files() {
            if !(is_compilable(file) || is_header(file)) {
                continue;
            }
            if let Some(parent) = file.parent()
                && !folders.iter().any(|f| f == parent)
            {
                folders.push(parent.to_path_buf());
            }
        }
        folders
    }

    pub fn sort_file_filters(&mut self) {
        for filter in &mut self.file_filters {
            filter.sort_files();
        }
        self.file_filters.sort_by(filter::filter_cmp);
    }

    fn commit(&mut self) -> Result<()> {
        self.sort_file_filters();
        self.serialize()
    }

    // --- Persistence ---

    pub fn serialize(&self) -> Result<()> {
        if self.location.as_os_str().is_empty() {
            error!(project = %self.name, "Failed to serialize project: location not specified");
            bail!("Cannot serialize project '{}': location not specified", self.name);
        }

        let mut ser = Serializer::new(self.file_path());
        ser.write_object("Name", self.name.as_str());
        ser.write_object("Kind", self.kind.name());

        let mut filters = Table::new();
        for filter in self.file_filters.iter().filter(|f| !f.is_anonymous()) {
            let mut entry = Table::new();
            if !filter.path.as_os_str().is_empty() {
                entry.insert(
                    "Path".into(),
                    Value::from(filter.path.to_string_lossy().replace('\\', "/")),
                );
            }
            if !filter.files.is_empty() {
                entry.insert(
                    "Files".into(),
                    Value::from(persist::relative_list(&filter.files, &self.location)),
                );
            }
            filters.insert(filter.name.clone(), Value::Table(entry));
        }
        if !filters.is_empty() {
            ser.write_object("FileFilters", filters);
        }

        if let Some(anonymous) = self.file_filter_by_name("")
            && !anonymous.files.is_empty()
        {
            ser.write_object(
                "Files",
                persist::relative_list(&anonymous.files, &self.location),
            );
        }

        let config = &self.local_configuration;
        if !config.include_dirs.is_empty() {
            ser.write_object(
                "IncludeDirs",
                persist::relative_list(&config.include_dirs, &self.location),
            );
        }
        if !config.library_dirs.is_empty() {
            ser.write_object(
                "LibraryDirs",
                persist::relative_list(&config.library_dirs, &self.location),
            );
        }
        if !config.defines.is_empty() {
            ser.write_object("Defines", config.defines.clone());
        }
        if !config.libraries.is_empty() {
            ser.write_object("Libraries", config.libraries.clone());
        }

        ser.finish()
    }

    /// Replaces in-memory state with the project file's contents. On error
    /// the project is left untouched.
    pub fn deserialize(&mut self) -> Result<()> {
        if self.location.as_os_str().is_empty() {
            error!(project = %self.name, "Failed to deserialize project: location not specified");
            bail!("Cannot deserialize project '{}': location not specified", self.name);
        }

        let de = Deserializer::open(&self.file_path())?;
        let mut loaded = Project::new(self.location.clone(), self.name.clone());
        let location = self.location.clone();

        de.objects(|name, value| {
            match name {
                "Name" => loaded.name = persist::expect_str(name, value)?.to_string(),
                "Kind" => loaded.kind = ProjectKind::from_name(persist::expect_str(name, value)?),
                "FileFilters" => {
                    for (filter_name, body) in persist::expect_table(name, value)? {
                        let body = persist::expect_table(filter_name, body)?;
                        let mut filter = FileFilter::new(filter_name.as_str());
                        if let Some(path) = body.get("Path") {
                            filter.path = PathBuf::from(persist::expect_str("Path", path)?);
                        }
                        if let Some(files) = body.get("Files") {
                            filter.files = persist::anchored_list("Files", files, &location)?;
                        }
                        loaded.file_filters.retain(|f| f.name != filter.name);
                        loaded.file_filters.push(filter);
                    }
                }
                "Files" => {
                    let files = persist::anchored_list(name, value, &location)?;
                    if let Some(anonymous) = loaded.file_filter_by_name_mut("") {
                        anonymous.files.extend(files);
                    }
                }
                "IncludeDirs" => {
                    loaded.local_configuration.include_dirs =
                        persist::anchored_list(name, value, &location)?
                }
                "LibraryDirs" => {
                    loaded.local_configuration.library_dirs =
                        persist::anchored_list(name, value, &location)?
                }
                "Defines" => loaded.local_configuration.defines = persist::string_list(name, value)?,
                "Libraries" => {
                    loaded.local_configuration.libraries = persist::string_list(name, value)?
                }
                other => debug!(key = other, "ignoring unknown project key"),
            }
            Ok(())
        })?;

        // Files claimed by a named filter leave the anonymous one.
        let claimed: Vec<PathBuf> = loaded
            .file_filters
            .iter()
            .filter(|f| !f.is_anonymous())
            .flat_map(|f| f.files.iter().cloned())
            .collect();
        if let Some(anonymous) = loaded.file_filter_by_name_mut("") {
            anonymous.files.retain(|f| !claimed.contains(f));
        }
        loaded.sort_file_filters();

        *self = loaded;
        Ok(())
    }
}

pub(crate) fn file_path_for(location: &Path, name: &str) -> PathBuf {
    location.join(format!("{name}.{}", Project::EXTENSION))
}
