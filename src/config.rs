use crate::toolchain::{Architecture, Backend, Optimization};
use std::path::PathBuf;

/// Resolved compiler and linker options for a build.
///
/// Configurations layer: a workspace preset, then a project's local
/// settings on top. [`Configuration::override_with`] merges sparsely, so a
/// layer only replaces what it actually sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    /// Active backend. `None` means nothing can be compiled.
    pub compiler: Option<Backend>,
    pub architecture: Option<Architecture>,
    pub optimization: Option<Optimization>,
    pub defines: Vec<String>,
    pub include_dirs: Vec<PathBuf>,
    pub library_dirs: Vec<PathBuf>,
    /// External library names and names of other projects to link against.
    pub libraries: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub verbose: bool,
}

impl Configuration {
    /// Copies every field that `other` sets into `self`. Fields `other`
    /// leaves unset (`None`, empty lists, `verbose == false`) keep their
    /// current value in `self`.
    pub fn override_with(&mut self, other: &Configuration) {
        if other.compiler.is_some() {
            self.compiler = other.compiler;
        }
        if other.architecture.is_some() {
            self.architecture = other.architecture;
        }
        if other.optimization.is_some() {
            self.optimization = other.optimization;
        }
        if !other.defines.is_empty() {
            self.defines = other.defines.clone();
        }
        if !other.include_dirs.is_empty() {
            self.include_dirs = other.include_dirs.clone();
        }
        if !other.library_dirs.is_empty() {
            self.library_dirs = other.library_dirs.clone();
        }
        if !other.libraries.is_empty() {
            self.libraries = other.libraries.clone();
        }
        if other.output_dir.is_some() {
            self.output_dir = other.output_dir.clone();
        }
        if other.verbose {
            self.verbose = true;
        }
    }

    /// `self` with `other` layered on top.
    pub fn overridden_by(&self, other: &Configuration) -> Configuration {
        let mut merged = self.clone();
        merged.override_with(other);
        merged
    }
}
