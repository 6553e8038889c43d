//! MSVC command synthesis (cl.exe, link.exe, lib.exe, and the MASM/ARM
//! assemblers for assembly sources).
//!
//! Synthesis is platform independent so it can be tested anywhere; the
//! backend itself is only selectable on Windows.

use super::process::CommandLine;
use super::types::{Architecture, Language, Optimization};
use crate::config::Configuration;
use crate::project::ProjectKind;
use std::path::{Path, PathBuf};

fn language_flag(source: &Path) -> Option<&'static str> {
    match Language::from_path(source) {
        Some(Language::C) => Some("/TC"),
        Some(Language::Cpp) => Some("/TP"),
        Some(Language::Assembly) | None => None,
    }
}

fn optimization_flags(opt: Optimization) -> &'static [&'static str] {
    match opt {
        Optimization::Debug => &["/Od", "/Zi"],
        Optimization::Release => &["/O2", "/DNDEBUG"],
        Optimization::Size => &["/O1"],
        Optimization::Speed => &["/Ox"],
    }
}

fn machine_flag(arch: Architecture) -> &'static str {
    match arch {
        Architecture::X86 => "/MACHINE:X86",
        Architecture::X86_64 => "/MACHINE:X64",
        Architecture::Arm => "/MACHINE:ARM",
        Architecture::Arm64 => "/MACHINE:ARM64",
    }
}

pub(super) fn artifact_file_name(name: &str, kind: ProjectKind) -> String {
    match kind {
        ProjectKind::StaticLibrary => format!("{name}.lib"),
        ProjectKind::DynamicLibrary => format!("{name}.dll"),
        ProjectKind::Application | ProjectKind::Unspecified => format!("{name}.exe"),
    }
}

/// cl.exe cannot assemble, so `.asm`/`.s` sources go to the assembler for
/// the target architecture.
fn assemble_command(config: &Configuration, source: &Path, output: &Path) -> CommandLine {
    match config.architecture {
        Some(arch @ (Architecture::Arm | Architecture::Arm64)) => {
            let program = if arch == Architecture::Arm {
                "armasm.exe"
            } else {
                "armasm64.exe"
            };
            let mut cmd = CommandLine::new(program);
            cmd.arg("-nologo");
            for dir in &config.include_dirs {
                cmd.arg("-i").arg(dir.to_string_lossy());
            }
            if config.optimization == Some(Optimization::Debug) {
                cmd.arg("-g");
            }
            cmd.arg("-o").arg(output.to_string_lossy());
            cmd.arg(source.to_string_lossy());
            cmd
        }
        arch => {
            let program = if arch == Some(Architecture::X86) {
                "ml.exe"
            } else {
                "ml64.exe"
            };
            let mut cmd = CommandLine::new(program);
            cmd.args(["/nologo", "/c"]);
            for define in &config.defines {
                cmd.arg(format!("/D{define}"));
            }
            for dir in &config.include_dirs {
                cmd.arg(format!("/I{}", dir.display()));
            }
            if config.optimization == Some(Optimization::Debug) {
                cmd.arg("/Zi");
            }
            cmd.arg(format!("/Fo{}", output.display()));
            cmd.arg(source.to_string_lossy());
            cmd
        }
    }
}

pub(super) fn compile_command(config: &Configuration, source: &Path, output: &Path) -> CommandLine {
    if Language::from_path(source) == Some(Language::Assembly) {
        return assemble_command(config, source, output);
    }

    let mut cmd = CommandLine::new("cl.exe");
    cmd.args(["/nologo", "/c"]);

    if let Some(lang) = language_flag(source) {
        cmd.arg(lang);
    }
    if Language::from_path(source) == Some(Language::Cpp) {
        cmd.arg("/EHsc");
    }

    for define in &config.defines {
        cmd.arg(format!("/D{define}"));
    }
    for dir in &config.include_dirs {
        cmd.arg(format!("/I{}", dir.display()));
    }
    if let Some(opt) = config.optimization {
        cmd.args(optimization_flags(opt).iter().copied());
    }
    if config.verbose {
        cmd.arg("/Bt+");
    }

    cmd.arg(format!("/Fo{}", output.display()));
    cmd.arg(source.to_string_lossy());
    cmd
}

pub(super) fn link_command(
    config: &Configuration,
    inputs: &[PathBuf],
    output: &Path,
    kind: ProjectKind,
) -> Option<CommandLine> {
    let mut cmd = match kind {
        ProjectKind::Application | ProjectKind::DynamicLibrary => {
            let mut cmd = CommandLine::new("link.exe");
            cmd.arg("/NOLOGO");
            if kind == ProjectKind::DynamicLibrary {
                cmd.arg("/DLL");
            }
            if config.verbose {
                cmd.arg("/VERBOSE");
            }
            for dir in &config.library_dirs {
                cmd.arg(format!("/LIBPATH:{}", dir.display()));
            }
            cmd
        }
        ProjectKind::StaticLibrary => {
            let mut cmd = CommandLine::new("lib.exe");
            cmd.arg("/NOLOGO");
            cmd
        }
        ProjectKind::Unspecified => return None,
    };

    if let Some(arch) = config.architecture {
        cmd.arg(machine_flag(arch));
    }
    cmd.arg(format!("/OUT:{}", output.display()));
    cmd.args(inputs.iter().map(|p| p.to_string_lossy().into_owned()));

    if kind != ProjectKind::StaticLibrary {
        for lib in &config.libraries {
            cmd.arg(format!("{lib}.lib"));
        }
    }
    Some(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_command_shape() {
        let config = Configuration {
            defines: vec!["NAME=two words".into()],
            include_dirs: vec![PathBuf::from("inc")],
            optimization: Some(Optimization::Debug),
            ..Default::default()
        };
        let cmd = compile_command(&config, Path::new("main.cpp"), Path::new("out\\main.obj"));
        assert_eq!(cmd.program, "cl.exe");
        assert_eq!(
            cmd.args,
            vec![
                "/nologo",
                "/c",
                "/TP",
                "/EHsc",
                "/DNAME=two words",
                "/Iinc",
                "/Od",
                "/Zi",
                "/Foout\\main.obj",
                "main.cpp",
            ]
        );
    }

    #[test]
    fn test_assembly_goes_to_the_assembler() {
        let mut config = Configuration {
            defines: vec!["FAST".into()],
            optimization: Some(Optimization::Debug),
            ..Default::default()
        };
        let cmd = compile_command(&config, Path::new("start.asm"), Path::new("start.obj"));
        assert_eq!(cmd.program, "ml64.exe");
        assert_eq!(
            cmd.args,
            vec!["/nologo", "/c", "/DFAST", "/Zi", "/Fostart.obj", "start.asm"]
        );

        config.architecture = Some(Architecture::X86);
        assert_eq!(
            compile_command(&config, Path::new("start.asm"), Path::new("start.obj")).program,
            "ml.exe"
        );

        config.architecture = Some(Architecture::Arm64);
        let cmd = compile_command(&config, Path::new("start.s"), Path::new("start.obj"));
        assert_eq!(cmd.program, "armasm64.exe");
        assert_eq!(cmd.args, vec!["-nologo", "-g", "-o", "start.obj", "start.s"]);
    }

    #[test]
    fn test_static_library_ignores_libraries() {
        let config = Configuration {
            libraries: vec!["user32".into()],
            library_dirs: vec![PathBuf::from("C:\\libs")],
            ..Default::default()
        };
        let cmd = link_command(
            &config,
            &[PathBuf::from("a.obj")],
            Path::new("a.lib"),
            ProjectKind::StaticLibrary,
        )
        .unwrap();
        assert_eq!(cmd.program, "lib.exe");
        assert_eq!(cmd.args, vec!["/NOLOGO", "/OUT:a.lib", "a.obj"]);
    }

    #[test]
    fn test_dll_link() {
        let config = Configuration {
            libraries: vec!["user32".into()],
            architecture: Some(Architecture::X86_64),
            ..Default::default()
        };
        let cmd = link_command(
            &config,
            &[PathBuf::from("a.obj")],
            Path::new("a.dll"),
            ProjectKind::DynamicLibrary,
        )
        .unwrap();
        assert_eq!(cmd.program, "link.exe");
        assert_eq!(
            cmd.args,
            vec!["/NOLOGO", "/DLL", "/MACHINE:X64", "/OUT:a.dll", "a.obj", "user32.lib"]
        );
    }

    #[test]
    fn test_artifact_names() {
        assert_eq!(artifact_file_name("app", ProjectKind::Application), "app.exe");
        assert_eq!(artifact_file_name("core", ProjectKind::StaticLibrary), "core.lib");
    }
}
