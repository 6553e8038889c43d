//! Compiler backends.
//!
//! A [`Backend`] turns a [`Configuration`] plus inputs into compiler, linker
//! and archiver command lines, and knows where each command writes its
//! output. The set of backends is closed; `Configuration` stores the active
//! one as a plain tag so it serializes by name.
//!
//! Output paths are pure functions of their inputs. The build graph computes
//! them before any external command runs.

mod feedback;
mod gcc;
mod msvc;
pub mod process;
pub mod types;

pub use feedback::FeedbackAnalyzer;
pub use process::{CommandLine, ProcessOutput, ProcessRunner, SystemRunner};
pub use types::{Architecture, Language, Optimization, is_compilable, is_header};

use crate::config::Configuration;
use crate::project::ProjectKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Supported toolchains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// GNU Compiler Collection (g++ / ar)
    #[serde(rename = "GCC")]
    Gcc,
    /// Clang/LLVM (clang++ / ar)
    Clang,
    /// Microsoft Visual C++ (cl.exe / link.exe / lib.exe)
    #[serde(rename = "MSVC")]
    Msvc,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Gcc, Backend::Clang, Backend::Msvc];

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Gcc => "GCC",
            Backend::Clang => "Clang",
            Backend::Msvc => "MSVC",
        }
    }

    /// Whether this backend can run on the current platform.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Msvc => cfg!(windows),
            Backend::Gcc | Backend::Clang => true,
        }
    }

    /// Backends selectable on this platform, in preference order.
    pub fn available() -> Vec<Backend> {
        Self::ALL.into_iter().filter(Backend::is_available).collect()
    }

    /// Resolves a backend by name. Backends missing from this platform are
    /// never returned.
    pub fn from_name(name: &str) -> Option<Backend> {
        Self::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(name))
            .filter(Backend::is_available)
    }

    /// Extension of the object files the compiler writes.
    pub fn object_extension(&self) -> &'static str {
        match self {
            Backend::Gcc | Backend::Clang => "o",
            Backend::Msvc => "obj",
        }
    }

    /// Deterministic object-file path for `source` under `config`.
    pub fn compiler_output_path(&self, config: &Configuration, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string());

        // Same-named sources in different directories must not collide.
        let digest = Sha256::digest(source.to_string_lossy().as_bytes());
        let tag: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();

        output_dir(config)
            .join("obj")
            .join(format!("{stem}-{tag}.{}", self.object_extension()))
    }

    /// Deterministic artifact path for a project named `output_name`.
    pub fn linker_output_path(
        &self,
        config: &Configuration,
        output_name: &str,
        kind: ProjectKind,
    ) -> PathBuf {
        let file_name = match self {
            Backend::Gcc | Backend::Clang => gcc::artifact_file_name(output_name, kind),
            Backend::Msvc => msvc::artifact_file_name(output_name, kind),
        };
        output_dir(config).join(file_name)
    }

    pub fn compile_command(&self, config: &Configuration, source: &Path) -> CommandLine {
        let output = self.compiler_output_path(config, source);
        match self {
            Backend::Gcc => gcc::GCC.compile_command(config, source, &output),
            Backend::Clang => gcc::CLANG.compile_command(config, source, &output),
            Backend::Msvc => msvc::compile_command(config, source, &output),
        }
    }

    /// `None` for [`ProjectKind::Unspecified`], which has nothing to link.
    pub fn link_command(
        &self,
        config: &Configuration,
        inputs: &[PathBuf],
        output_name: &str,
        kind: ProjectKind,
    ) -> Option<CommandLine> {
        let output = self.linker_output_path(config, output_name, kind);
        match self {
            Backend::Gcc => gcc::GCC.link_command(config, inputs, &output, kind),
            Backend::Clang => gcc::CLANG.link_command(config, inputs, &output, kind),
            Backend::Msvc => msvc::link_command(config, inputs, &output, kind),
        }
    }

    /// Compiles one source file. Returns the object path on success.
    pub fn compile(
        &self,
        runner: &dyn ProcessRunner,
        config: &Configuration,
        source: &Path,
    ) -> Option<PathBuf> {
        let output = self.compiler_output_path(config, source);
        let command = self.compile_command(config, source);

        if !prepare_output_dir(&output) {
            return None;
        }
        run_tool(runner, &command, source).then_some(output)
    }

    /// Links (or archives) `inputs` into the artifact for `output_name`.
    pub fn link(
        &self,
        runner: &dyn ProcessRunner,
        config: &Configuration,
        inputs: &[PathBuf],
        output_name: &str,
        kind: ProjectKind,
    ) -> Option<PathBuf> {
        let Some(command) = self.link_command(config, inputs, output_name, kind) else {
            error!(project = output_name, "Cannot link: project kind is unspecified");
            return None;
        };
        let output = self.linker_output_path(config, output_name, kind);

        if !prepare_output_dir(&output) {
            return None;
        }
        run_tool(runner, &command, Path::new(output_name)).then_some(output)
    }
}

/// Compiles with whatever backend `config` has bound. Logs and returns `None`
/// when no backend is bound or the compiler fails.
pub fn compile(
    runner: &dyn ProcessRunner,
    config: &Configuration,
    source: &Path,
) -> Option<PathBuf> {
    match config.compiler {
        Some(backend) => backend.compile(runner, config, source),
        None => {
            error!(file = %source.display(), "Failed to compile: no compiler active");
            None
        }
    }
}

/// Links with whatever backend `config` has bound.
pub fn link(
    runner: &dyn ProcessRunner,
    config: &Configuration,
    inputs: &[PathBuf],
    output_name: &str,
    kind: ProjectKind,
) -> Option<PathBuf> {
    match config.compiler {
        Some(backend) => backend.link(runner, config, inputs, output_name, kind),
        None => {
            error!(project = output_name, "Failed to link: no compiler active");
            None
        }
    }
}

fn output_dir(config: &Configuration) -> PathBuf {
    config
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
}

fn prepare_output_dir(output: &Path) -> bool {
    let Some(parent) = output.parent() else {
        return true;
    };
    if parent.as_os_str().is_empty() {
        return true;
    }
    match fs::create_dir_all(parent) {
        Ok(()) => true,
        Err(e) => {
            error!(dir = %parent.display(), "Failed to create output directory: {e}");
            false
        }
    }
}

fn run_tool(runner: &dyn ProcessRunner, command: &CommandLine, subject: &Path) -> bool {
    debug!(command = %command, "running");

    match runner.run(command) {
        Ok(out) if out.success() => {
            if !out.stderr.trim().is_empty() {
                warn!(subject = %subject.display(), "{}", out.stderr.trim_end());
            }
            true
        }
        Ok(out) => {
            error!(
                subject = %subject.display(),
                exit_code = ?out.exit_code,
                "{} failed:\n{}",
                command.program,
                out.stderr.trim_end()
            );
            let diagnostics = format!("{}{}", out.stdout, out.stderr);
            if let Some(hint) = FeedbackAnalyzer::analyze(&diagnostics) {
                warn!(subject = %subject.display(), "{hint}");
            }
            false
        }
        Err(e) => {
            error!(subject = %subject.display(), "{e:#}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        commands: Mutex<Vec<CommandLine>>,
        exit_code: i32,
    }

    impl Recorder {
        fn new(exit_code: i32) -> Self {
            Self {
                commands: Mutex::new(Vec::new()),
                exit_code,
            }
        }
    }

    impl ProcessRunner for Recorder {
        fn run(&self, command: &CommandLine) -> anyhow::Result<ProcessOutput> {
            self.commands.lock().unwrap().push(command.clone());
            Ok(ProcessOutput {
                exit_code: Some(self.exit_code),
                ..Default::default()
            })
        }
    }

    fn config_in(dir: &Path, backend: Option<Backend>) -> Configuration {
        Configuration {
            compiler: backend,
            output_dir: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn test_output_paths_are_deterministic() {
        let config = config_in(Path::new("/out"), Some(Backend::Gcc));
        let src = Path::new("/proj/src/main.cpp");
        for backend in Backend::ALL {
            assert_eq!(
                backend.compiler_output_path(&config, src),
                backend.compiler_output_path(&config, src)
            );
            for kind in ProjectKind::ALL {
                assert_eq!(
                    backend.linker_output_path(&config, "app", kind),
                    backend.linker_output_path(&config, "app", kind)
                );
            }
        }
    }

    #[test]
    fn test_same_stem_in_different_dirs_does_not_collide() {
        let config = config_in(Path::new("/out"), Some(Backend::Gcc));
        let a = Backend::Gcc.compiler_output_path(&config, Path::new("/p/a/util.cpp"));
        let b = Backend::Gcc.compiler_output_path(&config, Path::new("/p/b/util.cpp"));
        assert_ne!(a, b);
        assert!(a.starts_with("/out/obj"));
        assert_eq!(a.extension().unwrap(), "o");
    }

    #[test]
    fn test_object_extension_per_backend() {
        let config = config_in(Path::new("/out"), None);
        let src = Path::new("/p/main.c");
        for (backend, ext) in [(Backend::Gcc, "o"), (Backend::Clang, "o"), (Backend::Msvc, "obj")] {
            assert_eq!(backend.object_extension(), ext);
            assert_eq!(backend.compiler_output_path(&config, src).extension().unwrap(), ext);
        }
    }

    #[test]
    fn test_msvc_is_only_selectable_on_windows() {
        assert_eq!(Backend::from_name("gcc"), Some(Backend::Gcc));
        assert_eq!(Backend::from_name("Clang"), Some(Backend::Clang));
        assert_eq!(Backend::from_name("MSVC").is_some(), cfg!(windows));
        assert_eq!(Backend::available().contains(&Backend::Msvc), cfg!(windows));
        assert_eq!(Backend::from_name("tcc"), None);
    }

    #[test]
    fn test_compile_without_backend_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Recorder::new(0);
        let config = config_in(dir.path(), None);
        assert!(compile(&runner, &config, Path::new("main.cpp")).is_none());
        assert!(runner.commands.lock().unwrap().is_empty());
    }

    #[test]
    fn test_compile_writes_to_compiler_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Recorder::new(0);
        let config = config_in(dir.path(), Some(Backend::Gcc));
        let src = dir.path().join("main.cpp");

        let out = compile(&runner, &config, &src).unwrap();
        assert_eq!(out, Backend::Gcc.compiler_output_path(&config, &src));
        assert!(out.parent().unwrap().is_dir());

        let commands = runner.commands.lock().unwrap();
        let args = &commands[0].args;
        let o = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[o + 1], out.to_string_lossy());
    }

    #[test]
    fn test_failed_process_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Recorder::new(1);
        let config = config_in(dir.path(), Some(Backend::Clang));
        assert!(compile(&runner, &config, &dir.path().join("a.c")).is_none());
        assert!(
            link(
                &runner,
                &config,
                &[dir.path().join("a.o")],
                "a",
                ProjectKind::Application
            )
            .is_none()
        );
    }

    #[test]
    fn test_link_unspecified_kind_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Recorder::new(0);
        let config = config_in(dir.path(), Some(Backend::Gcc));
        let out = link(
            &runner,
            &config,
            &[dir.path().join("a.o")],
            "a",
            ProjectKind::Unspecified,
        );
        assert!(out.is_none());
        assert!(runner.commands.lock().unwrap().is_empty());
    }
}
