//! # geno CLI Entry Point
//!
//! Parses arguments with clap and routes each command to its handler:
//! - `init`: create a workspace from an existing source tree
//! - `build`: build a workspace under a chosen matrix selection
//! - `info`: show the projects of a workspace in build order
//! - `add-file`: add a file to one project of a workspace

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use geno::build::{BuildContext, BuildEvents, BuildFinished, compdb};
use geno::config::Configuration;
use geno::import;
use geno::ui::Table;
use geno::workspace::Workspace;

#[cfg(windows)]
#[link(name = "kernel32")]
unsafe extern "system" {
    fn SetConsoleOutputCP(wCodePageID: u32) -> i32;
}

#[cfg(windows)]
fn enable_windows_utf8_console() {
    unsafe {
        SetConsoleOutputCP(65001);
    }
}

#[cfg(not(windows))]
fn enable_windows_utf8_console() {}

#[derive(Parser)]
#[command(name = "geno")]
#[command(about = "Parallel workspace builds for C/C++ projects", version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a workspace from the C/C++ sources under a directory
    Init {
        /// Directory to scan
        dir: PathBuf,
        /// Workspace and project name [default: directory name]
        #[arg(long)]
        name: Option<String>,
    },
    /// Build every project of a workspace
    Build {
        /// Path to the .gwks file
        workspace: PathBuf,
        /// Matrix selection, e.g. --select Target=Release (repeatable)
        #[arg(long = "select", value_name = "COLUMN=PRESET", value_parser = parse_selection)]
        selections: Vec<(String, String)>,
        /// Worker threads [default: one per CPU]
        #[arg(short, long, default_value_t = 0)]
        jobs: usize,
        /// Log every synthesized command
        #[arg(short, long)]
        verbose: bool,
        /// Also write compile_commands.json next to the workspace
        #[arg(long)]
        compdb: bool,
    },
    /// Show the projects of a workspace in build order
    Info {
        /// Path to the .gwks file
        workspace: PathBuf,
    },
    /// Add a file to a project
    AddFile {
        /// Path to the .gwks file
        workspace: PathBuf,
        /// Project name
        project: String,
        /// File to add (relative paths are taken from the project directory)
        file: PathBuf,
        /// Filter to add it to [default: none]
        #[arg(long, default_value = "")]
        filter: String,
    },
}

fn main() -> Result<()> {
    enable_windows_utf8_console();

    let cli = Cli::parse();
    let verbose = matches!(cli.command, Commands::Build { verbose: true, .. });
    init_tracing(verbose);

    match cli.command {
        Commands::Init { dir, name } => init_workspace(&dir, name.as_deref()),
        Commands::Build {
            workspace,
            selections,
            jobs,
            compdb,
            ..
        } => {
            if !build_workspace(&workspace, &selections, jobs, compdb)? {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Info { workspace } => print_info(&workspace),
        Commands::AddFile {
            workspace,
            project,
            file,
            filter,
        } => add_file(&workspace, &project, &file, &filter),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("GENO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_selection(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((column, preset)) if !column.is_empty() && !preset.is_empty() => {
            Ok((column.to_string(), preset.to_string()))
        }
        _ => Err(format!("expected COLUMN=PRESET, got '{s}'")),
    }
}

fn init_workspace(dir: &Path, name: Option<&str>) -> Result<()> {
    let Some(workspace) = import::scan_directory(dir, name)? else {
        bail!("Nothing to import from {}", dir.display());
    };
    let project_files = workspace
        .projects()
        .first()
        .map(|p| p.files().count())
        .unwrap_or(0);
    println!(
        "{} Created workspace {} with {} files",
        "✓".green(),
        workspace.name().bold(),
        project_files
    );
    println!("  {} {}", "→".blue(), workspace.file_path().display());
    Ok(())
}

fn build_workspace(
    path: &Path,
    selections: &[(String, String)],
    jobs: usize,
    write_compdb: bool,
) -> Result<bool> {
    let mut workspace = Workspace::load(path)?;
    for (column, preset) in selections {
        if !workspace.matrix.select(column, preset) {
            bail!("Unknown matrix selection '{column}={preset}'");
        }
    }

    println!(
        "{} Building {} ({})",
        "⚡".yellow(),
        workspace.name().bold(),
        describe(&workspace.current_configuration())
    );

    if write_compdb {
        let entries = compdb::compile_commands(&workspace)?;
        let out = workspace.location().join("compile_commands.json");
        compdb::write(&out, &entries)?;
        println!("{} Wrote {}", "✓".green(), out.display());
    }

    let ctx = BuildContext::system(jobs)?;
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let events: Arc<dyn BuildEvents> = Arc::new(move |event: &BuildFinished| {
        if let Ok(tx) = tx.lock() {
            let _ = tx.send(event.clone());
        }
    });

    let start = Instant::now();
    workspace.build(&ctx, events)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(format!(
        "Building {} projects on {} workers...",
        workspace.projects().len(),
        ctx.scheduler.worker_count()
    ));
    pb.enable_steady_tick(Duration::from_millis(100));

    let finished = rx
        .recv()
        .context("Build ended without reporting a result")?;
    pb.finish_and_clear();

    let elapsed = start.elapsed().as_secs_f64();
    match &finished.output {
        Some(output) if finished.success => {
            println!(
                "{} Built {} in {:.2}s",
                "✓".green(),
                finished.workspace.bold(),
                elapsed
            );
            println!("  {} {}", "→".blue(), output.display());
        }
        _ => println!(
            "{} Failed to build {} after {:.2}s",
            "x".red(),
            finished.workspace.bold(),
            elapsed
        ),
    }
    Ok(finished.success)
}

fn describe(config: &Configuration) -> String {
    let mut parts = Vec::new();
    match config.compiler {
        Some(backend) => parts.push(backend.name().to_string()),
        None => parts.push("no compiler".to_string()),
    }
    if let Some(arch) = config.architecture {
        parts.push(arch.name().to_string());
    }
    if let Some(opt) = config.optimization {
        parts.push(opt.name().to_string());
    }
    parts.join(", ")
}

fn print_info(path: &Path) -> Result<()> {
    let workspace = Workspace::load(path)?;
    let base = workspace.current_configuration();

    println!("{} {}", "Workspace".bold(), workspace.name().cyan());
    println!("{}: {}", "Location".bold(), workspace.location().display());
    for column in workspace.matrix.columns() {
        let presets: Vec<String> = column
            .configurations()
            .iter()
            .map(|(name, _)| match column.current() {
                Some((current, _)) if current == name => format!("[{name}]"),
                _ => name.clone(),
            })
            .collect();
        println!("{}: {}", column.name.bold(), presets.join(" "));
    }
    println!();

    if workspace.projects().is_empty() {
        println!("{} No projects in this workspace.", "!".yellow());
        return Ok(());
    }

    let mut table = Table::new(&["#", "Project", "Kind", "Files", "Libraries"]);
    for (i, project) in workspace.build_order()?.into_iter().enumerate() {
        let config = project.resolve_configuration(&base);
        table.add_row(vec![
            (i + 1).to_string(),
            project.name().to_string(),
            project.kind.name().to_string(),
            project.files().count().to_string(),
            config.libraries.join(", "),
        ]);
    }
    table.print();
    Ok(())
}

fn add_file(path: &Path, project: &str, file: &Path, filter: &str) -> Result<()> {
    let mut workspace = Workspace::load(path)?;
    let Some(target) = workspace.project_by_name_mut(project) else {
        bail!("No project named '{project}' in {}", path.display());
    };
    if target.file_filter_by_name(filter).is_none() {
        target.new_file_filter(filter)?;
    }

    if target.add_file(file, filter)? {
        println!("{} Added {} to {}", "✓".green(), file.display(), project.bold());
    } else {
        println!("{} {} is already in {}", "!".yellow(), file.display(), project.bold());
    }
    Ok(())
}
