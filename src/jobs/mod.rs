//! Dependency-aware job scheduling.
//!
//! A [`Scheduler`] owns a worker pool and every job submitted to it. A job
//! runs once all of its prerequisites have completed, and its result is kept
//! in a store keyed by [`JobHandle`] so dependents read their inputs by handle
//! instead of sharing mutable cells.
//!
//! ```no_run
//! use geno::jobs::Scheduler;
//! use std::path::PathBuf;
//!
//! let scheduler = Scheduler::new(0)?;
//! let compile = scheduler.submit(&[], |_| Some(PathBuf::from("main.o")))?;
//! let link = scheduler.submit(&[compile], move |inputs| {
//!     inputs.output(compile).map(|obj| obj.with_extension("exe"))
//! })?;
//! assert!(scheduler.wait(link).flatten().is_some());
//! # Ok::<(), geno::jobs::SchedulerError>(())
//! ```

mod scheduler;

pub use scheduler::{JobHandle, JobInputs, JobOutput, Scheduler, SchedulerError};
