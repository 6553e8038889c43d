use super::GraphError;
use crate::toolchain::is_compilable;
use crate::workspace::Workspace;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// One `compile_commands.json` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileCommand {
    pub directory: String,
    pub command: String,
    pub file: String,
}

/// The compile command of every source in the workspace, in build order,
/// under the workspace's current configuration.
pub fn compile_commands(workspace: &Workspace) -> Result<Vec<CompileCommand>, GraphError> {
    let base = workspace.current_configuration();
    let mut entries = Vec::new();

    for project in workspace.build_order()? {
        let config = project.resolve_configuration(&base);
        let Some(backend) = config.compiler else {
            debug!(project = project.name(), "no compiler bound, skipping");
            continue;
        };
        for source in project.files().filter(|f| is_compilable(f)) {
            entries.push(CompileCommand {
                directory: project.location().to_string_lossy().into_owned(),
                command: backend.compile_command(&config, source).to_string(),
                file: source.to_string_lossy().into_owned(),
            });
        }
    }
    Ok(entries)
}

pub fn write(path: &Path, entries: &[CompileCommand]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
