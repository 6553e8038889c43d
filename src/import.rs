//! Bootstraps a workspace from an existing source tree.

use crate::persist;
use crate::project::ProjectKind;
use crate::toolchain::{is_compilable, is_header};
use crate::workspace::Workspace;
use anyhow::{Context, Result};
use colored::*;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Directories that hold build output or tooling state, never sources.
const SKIPPED_DIRS: &[&str] = &[".git", "build", "obj", "target", "out"];

/// Scans `dir` for C/C++ sources and headers and writes a workspace with
/// one application project containing them. Returns `None` if the tree
/// has no compilable sources.
pub fn scan_directory(dir: &Path, name: Option<&str>) -> Result<Option<Workspace>> {
    println!("{} Scanning {}...", "⚡".yellow(), dir.display());
    let dir = persist::normalize(
        &std::path::absolute(dir)
            .with_context(|| format!("Failed to resolve {}", dir.display()))?,
    );

    let files = collect_files(&dir);
    if !files.iter().any(|f| is_compilable(f)) {
        println!("{} No C/C++ source files found.", "x".red());
        return Ok(None);
    }

    let name = match name {
        Some(name) => name.to_string(),
        None => dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "app".to_string()),
    };

    let mut workspace = Workspace::new(&dir, name.as_str());
    let project = workspace.new_project(&dir, &name)?;
    project.kind = ProjectKind::Application;
    if dir.join("include").is_dir() {
        project.local_configuration.include_dirs = vec![dir.join("include")];
    }
    for file in &files {
        project.add_file(file, "")?;
    }
    workspace.serialize()?;

    debug!(workspace = %name, files = files.len(), "imported source tree");
    Ok(Some(workspace))
}

fn collect_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(DirEntry::into_path)
        .filter(|p| is_compilable(p) || is_header(p))
        .collect();
    files.sort();
    files
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|n| SKIPPED_DIRS.contains(&n))
}
