//! GCC-family command synthesis (g++, clang++).

use super::process::CommandLine;
use super::types::{Architecture, Language, Optimization};
use crate::config::Configuration;
use crate::project::ProjectKind;
use std::path::{Path, PathBuf};

pub(super) struct GccFamily {
    compiler: &'static str,
    archiver: &'static str,
}

pub(super) const GCC: GccFamily = GccFamily {
    compiler: "g++",
    archiver: "ar",
};

pub(super) const CLANG: GccFamily = GccFamily {
    compiler: "clang++",
    archiver: "ar",
};

fn language_flag(source: &Path) -> &'static str {
    match Language::from_path(source) {
        Some(Language::C) => "c",
        Some(Language::Cpp) => "c++",
        Some(Language::Assembly) => "assembler",
        None => "none",
    }
}

fn optimization_flags(opt: Optimization) -> &'static [&'static str] {
    match opt {
        Optimization::Debug => &["-O0", "-g"],
        Optimization::Release => &["-O2", "-DNDEBUG"],
        Optimization::Size => &["-Os"],
        Optimization::Speed => &["-O3"],
    }
}

fn architecture_flag(arch: Architecture) -> Option<&'static str> {
    // ARM targets need a cross front-end rather than a flag.
    match arch {
        Architecture::X86 => Some("-m32"),
        Architecture::X86_64 => Some("-m64"),
        Architecture::Arm | Architecture::Arm64 => None,
    }
}

pub(super) fn artifact_file_name(name: &str, kind: ProjectKind) -> String {
    match kind {
        ProjectKind::StaticLibrary => format!("lib{name}.a"),
        ProjectKind::DynamicLibrary if cfg!(windows) => format!("{name}.dll"),
        ProjectKind::DynamicLibrary if cfg!(target_os = "macos") => format!("lib{name}.dylib"),
        ProjectKind::DynamicLibrary => format!("lib{name}.so"),
        ProjectKind::Application if cfg!(windows) => format!("{name}.exe"),
        ProjectKind::Application | ProjectKind::Unspecified => name.to_string(),
    }
}

impl GccFamily {
    pub(super) fn compile_command(
        &self,
        config: &Configuration,
        source: &Path,
        output: &Path,
    ) -> CommandLine {
        let mut cmd = CommandLine::new(self.compiler);

        // Compile only, no link
        cmd.arg("-c");
        cmd.arg("-x").arg(language_flag(source));

        for define in &config.defines {
            cmd.arg(format!("-D{define}"));
        }
        for dir in &config.include_dirs {
            cmd.arg(format!("-I{}", dir.display()));
        }

        if let Some(arch) = config.architecture.and_then(architecture_flag) {
            cmd.arg(arch);
        }
        if let Some(opt) = config.optimization {
            cmd.args(optimization_flags(opt).iter().copied());
        }
        if config.verbose {
            // Time each subprocess and echo the driver's commands
            cmd.args(["-time", "-v"]);
        }

        cmd.arg("-o").arg(output.to_string_lossy());
        cmd.arg(source.to_string_lossy());
        cmd
    }

    pub(super) fn link_command(
        &self,
        config: &Configuration,
        inputs: &[PathBuf],
        output: &Path,
        kind: ProjectKind,
    ) -> Option<CommandLine> {
        match kind {
            ProjectKind::Application | ProjectKind::DynamicLibrary => {
                let mut cmd = CommandLine::new(self.compiler);

                if kind == ProjectKind::DynamicLibrary {
                    cmd.arg("-shared");
                }
                if let Some(arch) = config.architecture.and_then(architecture_flag) {
                    cmd.arg(arch);
                }
                if config.verbose {
                    cmd.arg("-v");
                }
                for dir in &config.library_dirs {
                    cmd.arg(format!("-L{}", dir.display()));
                }

                cmd.arg("-o").arg(output.to_string_lossy());
                cmd.args(inputs.iter().map(|p| p.to_string_lossy().into_owned()));

                // Libraries after objects so the linker resolves them in order
                for lib in &config.libraries {
                    cmd.arg(format!("-l{lib}"));
                }
                Some(cmd)
            }
            ProjectKind::StaticLibrary => {
                let mut cmd = CommandLine::new(self.archiver);

                // r: insert or replace members
                // P: match members by full path
                // u: only replace members older than the input
                // c: don't warn when creating the archive
                // s: write an archive index
                cmd.arg("rPucs");
                cmd.arg(output.to_string_lossy());
                cmd.args(inputs.iter().map(|p| p.to_string_lossy().into_owned()));
                Some(cmd)
            }
            ProjectKind::Unspecified => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Configuration {
        Configuration {
            defines: vec!["DEBUG".into(), "GREETING=hello world".into()],
            include_dirs: vec![PathBuf::from("/inc/a"), PathBuf::from("/inc b")],
            library_dirs: vec![PathBuf::from("/lib/x")],
            libraries: vec!["m".into(), "pthread".into()],
            optimization: Some(Optimization::Release),
            architecture: Some(Architecture::X86_64),
            ..Default::default()
        }
    }

    #[test]
    fn test_compile_command_shape() {
        let cmd = GCC.compile_command(
            &sample_config(),
            Path::new("/p/main.cpp"),
            Path::new("/out/main.o"),
        );
        assert_eq!(cmd.program, "g++");
        assert_eq!(
            cmd.args,
            vec![
                "-c",
                "-x",
                "c++",
                "-DDEBUG",
                "-DGREETING=hello world",
                "-I/inc/a",
                "-I/inc b",
                "-m64",
                "-O2",
                "-DNDEBUG",
                "-o",
                "/out/main.o",
                "/p/main.cpp",
            ]
        );
    }

    #[test]
    fn test_language_flags() {
        let config = Configuration::default();
        let out = Path::new("x.o");
        let lang_of = |src: &str| GCC.compile_command(&config, Path::new(src), out).args[2].clone();
        assert_eq!(lang_of("a.c"), "c");
        assert_eq!(lang_of("a.cc"), "c++");
        assert_eq!(lang_of("a.cxx"), "c++");
        assert_eq!(lang_of("start.s"), "assembler");
        assert_eq!(lang_of("data.bin"), "none");
    }

    #[test]
    fn test_verbose_adds_timing() {
        let config = Configuration {
            verbose: true,
            ..Default::default()
        };
        let cmd = CLANG.compile_command(&config, Path::new("a.c"), Path::new("a.o"));
        assert_eq!(cmd.program, "clang++");
        assert!(cmd.args.contains(&"-time".to_string()));
        assert!(cmd.args.contains(&"-v".to_string()));
    }

    #[test]
    fn test_link_application() {
        let inputs = vec![PathBuf::from("a.o"), PathBuf::from("b.o")];
        let cmd = GCC
            .link_command(&sample_config(), &inputs, Path::new("/out/app"), ProjectKind::Application)
            .unwrap();
        assert_eq!(
            cmd.args,
            vec!["-m64", "-L/lib/x", "-o", "/out/app", "a.o", "b.o", "-lm", "-lpthread"]
        );
    }

    #[test]
    fn test_link_dynamic_library_is_shared() {
        let inputs = vec![PathBuf::from("a.o")];
        let cmd = GCC
            .link_command(
                &Configuration::default(),
                &inputs,
                Path::new("libx.so"),
                ProjectKind::DynamicLibrary,
            )
            .unwrap();
        assert_eq!(cmd.args[0], "-shared");
    }

    #[test]
    fn test_static_library_uses_archiver_without_linker_flags() {
        let inputs = vec![PathBuf::from("a.o")];
        let cmd = GCC
            .link_command(&sample_config(), &inputs, Path::new("/out/liba.a"), ProjectKind::StaticLibrary)
            .unwrap();
        assert_eq!(cmd.program, "ar");
        assert_eq!(cmd.args, vec!["rPucs", "/out/liba.a", "a.o"]);
    }

    #[test]
    fn test_artifact_names() {
        assert_eq!(artifact_file_name("a", ProjectKind::StaticLibrary), "liba.a");
        if cfg!(target_os = "linux") {
            assert_eq!(artifact_file_name("a", ProjectKind::DynamicLibrary), "liba.so");
            assert_eq!(artifact_file_name("a", ProjectKind::Application), "a");
        }
    }
}
