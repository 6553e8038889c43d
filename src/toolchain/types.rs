use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Target instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    #[serde(rename = "x86")]
    X86,
    #[serde(rename = "x86_64")]
    X86_64,
    Arm,
    Arm64,
}

impl Architecture {
    pub const ALL: [Architecture; 4] = [
        Architecture::X86,
        Architecture::X86_64,
        Architecture::Arm,
        Architecture::Arm64,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Architecture::X86 => "x86",
            Architecture::X86_64 => "x86_64",
            Architecture::Arm => "Arm",
            Architecture::Arm64 => "Arm64",
        }
    }
}

/// Optimization preset applied to every compile command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Optimization {
    /// No optimization, full debug info.
    Debug,
    Release,
    /// Optimize for binary size.
    Size,
    /// Aggressive optimization.
    Speed,
}

impl Optimization {
    pub const ALL: [Optimization; 4] = [
        Optimization::Debug,
        Optimization::Release,
        Optimization::Size,
        Optimization::Speed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Optimization::Debug => "Debug",
            Optimization::Release => "Release",
            Optimization::Size => "Size",
            Optimization::Speed => "Speed",
        }
    }
}

macro_rules! name_parsing {
    ($ty:ident) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::ALL
                    .into_iter()
                    .find(|v| v.name().eq_ignore_ascii_case(s))
                    .ok_or_else(|| format!("unknown {} '{}'", stringify!($ty).to_lowercase(), s))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

name_parsing!(Architecture);
name_parsing!(Optimization);

/// Source language inferred from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    C,
    Cpp,
    Assembly,
}

impl Language {
    pub fn from_path(path: &Path) -> Option<Language> {
        let ext = path.extension()?.to_str()?;
        match ext {
            "c" => Some(Language::C),
            "cc" | "cpp" | "cxx" | "c++" => Some(Language::Cpp),
            "s" | "S" | "asm" => Some(Language::Assembly),
            _ => None,
        }
    }
}

/// Whether a file is something the build compiles (as opposed to headers
/// and other assets that only live in a project for organization).
pub fn is_compilable(path: &Path) -> bool {
    Language::from_path(path).is_some()
}

/// Whether a file is a C/C++ header.
pub fn is_header(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("h" | "hh" | "hpp" | "hxx" | "h++")
    )
}
