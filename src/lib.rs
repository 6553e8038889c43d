//! # geno - Workspace builds for C/C++
//!
//! geno turns a workspace of C/C++ projects into a graph of compile and link
//! jobs and runs it in parallel. Projects reference each other by name in
//! their library lists; geno orders them, links each project against the
//! artifacts of the projects it names, and reports one finished event per
//! build.
//!
//! ## Features
//!
//! - **Dependency-aware scheduling**: jobs start only after every job they
//!   depend on has finished, on a fixed worker pool
//! - **Build matrix**: named configuration presets (compiler, target, ...)
//!   merged column by column
//! - **GCC, Clang and MSVC** command synthesis from one configuration model
//! - **Plain-text persistence**: `.gwks` and `.gprj` TOML files with paths
//!   relative to their owner
//!
//! ## Quick Start
//!
//! ```bash
//! # Create a workspace from an existing source tree
//! geno init path/to/sources
//!
//! # Build it in release mode
//! geno build path/to/sources/sources.gwks --select Target=Release
//! ```
//!
//! ## Module Organization
//!
//! - [`jobs`] - Dependency-aware job scheduler
//! - [`toolchain`] - Compiler backends and process launching
//! - [`project`] - Projects, file filters and per-project compile jobs
//! - [`workspace`] - Workspaces, the build matrix and the full build graph
//! - [`build`] - Build context, ordering and notifications

/// Build context, project ordering, notifications and `compile_commands.json`.
pub mod build;

/// Layered compiler and linker settings.
pub mod config;

/// Workspace bootstrap from an existing source tree.
pub mod import;

/// Dependency-aware parallel job scheduler.
pub mod jobs;

/// Object-tree persistence (`.gprj`, `.gwks`).
pub mod persist;

/// Projects and their file filters.
pub mod project;

/// Compiler backends and process launching.
pub mod toolchain;

/// Terminal UI utilities (tables).
pub mod ui;

/// Workspaces and the build matrix.
pub mod workspace;
