//! Object-tree persistence for project and workspace files.
//!
//! Files are TOML documents: a flat set of named objects at the root whose
//! values are strings, string lists or nested tables. Owners write objects
//! one by one and read them back through a callback, so each owner decides
//! how to interpret its own keys.
//!
//! ```toml
//! Name = "app"
//! Kind = "Application"
//! Files = ["src/main.cpp"]
//! Libraries = ["core"]
//! ```

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Component, Path, PathBuf};

pub use toml::{Table, Value};

/// Collects named objects and writes them as one document.
pub struct Serializer {
    path: PathBuf,
    root: Table,
}

impl Serializer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            root: Table::new(),
        }
    }

    pub fn write_object(&mut self, name: &str, value: impl Into<Value>) {
        self.root.insert(name.to_string(), value.into());
    }

    /// Writes the document, creating the parent directory if needed.
    pub fn finish(self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(&self.root)?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// A parsed document whose objects are handed to a callback.
pub struct Deserializer {
    root: Table,
}

impl Deserializer {
    pub fn open(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let root: Table = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Self { root })
    }

    /// Calls `callback` once per root object. Stops at the first error.
    pub fn objects<F>(&self, mut callback: F) -> Result<()>
    where
        F: FnMut(&str, &Value) -> Result<()>,
    {
        for (name, value) in &self.root {
            callback(name, value)?;
        }
        Ok(())
    }
}

pub fn expect_str<'a>(name: &str, value: &'a Value) -> Result<&'a str> {
    match value.as_str() {
        Some(s) => Ok(s),
        None => bail!("'{name}' must be a string"),
    }
}

pub fn expect_table<'a>(name: &str, value: &'a Value) -> Result<&'a Table> {
    match value.as_table() {
        Some(t) => Ok(t),
        None => bail!("'{name}' must be a table"),
    }
}

pub fn string_list(name: &str, value: &Value) -> Result<Vec<String>> {
    let Some(items) = value.as_array() else {
        bail!("'{name}' must be a list of strings");
    };
    items
        .iter()
        .map(|item| expect_str(name, item).map(str::to_string))
        .collect()
}

/// Converts paths to strings relative to `base` for storage.
pub fn relative_list<'a, I>(paths: I, base: &Path) -> Vec<String>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    paths
        .into_iter()
        .map(|p| relative_to(p, base).to_string_lossy().replace('\\', "/"))
        .collect()
}

/// Re-anchors stored paths to absolute form under `base`.
pub fn anchored_list(name: &str, value: &Value, base: &Path) -> Result<Vec<PathBuf>> {
    Ok(string_list(name, value)?
        .into_iter()
        .map(|p| anchor(Path::new(&p), base))
        .collect())
}

/// `path` made absolute against `base` and lexically normalized.
pub fn anchor(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

/// Resolves `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `path` expressed relative to `base`, walking up with `..` where needed.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path = normalize(path);
    let base = normalize(base);
    if let Ok(stripped) = path.strip_prefix(&base) {
        return stripped.to_path_buf();
    }
    if path.has_root() != base.has_root() {
        return path;
    }

    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &path_parts[common..] {
        out.push(part.as_os_str());
    }
    out
}
