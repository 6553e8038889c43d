use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, error};

/// Result slot of a job. `None` means the job ran but produced nothing.
pub type JobOutput = Option<PathBuf>;

type Work = Box<dyn FnOnce(&JobInputs) -> JobOutput + Send + 'static>;

// Handles are unique across every scheduler in the process, so a handle
// issued elsewhere can never alias a local job.
static NEXT_JOB: AtomicU64 = AtomicU64::new(1);

/// Opaque reference to a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobHandle(u64);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("{0} was not submitted to this scheduler")]
    UnknownDependency(JobHandle),

    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Outputs of a job's prerequisites, captured right before the job starts.
#[derive(Debug, Default, Clone)]
pub struct JobInputs {
    /// Sorted by handle.
    outputs: Vec<(JobHandle, JobOutput)>,
}

impl JobInputs {
    /// Output path of a prerequisite, if it produced one.
    pub fn output(&self, handle: JobHandle) -> Option<&Path> {
        self.get(handle).and_then(|output| output.as_deref())
    }

    /// Full result slot of a prerequisite. `None` if `handle` is not one.
    pub fn get(&self, handle: JobHandle) -> Option<&JobOutput> {
        self.outputs
            .binary_search_by_key(&handle, |(h, _)| *h)
            .ok()
            .map(|at| &self.outputs[at].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (JobHandle, Option<&Path>)> {
        self.outputs.iter().map(|(h, o)| (*h, o.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

struct JobSlot {
    work: Option<Work>,
    dependencies: Vec<JobHandle>,
    /// Prerequisites that have not completed yet.
    unfinished: usize,
    dependents: Vec<JobHandle>,
    /// Written exactly once, when the job completes.
    result: Option<JobOutput>,
}

#[derive(Default)]
struct State {
    jobs: HashMap<JobHandle, JobSlot>,
    outstanding: usize,
}

struct Shared {
    pool: ThreadPool,
    state: Mutex<State>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Job bodies never run under the lock, so a poisoned guard still
        // holds consistent bookkeeping.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(self: &Arc<Self>, handle: JobHandle) {
        let shared = Arc::clone(self);
        self.pool.spawn(move || shared.execute(handle));
    }

    fn execute(self: &Arc<Self>, handle: JobHandle) {
        let (work, inputs) = {
            let mut state = self.lock();
            let Some(slot) = state.jobs.get_mut(&handle) else {
                return;
            };
            let work = slot.work.take();
            let dependencies = slot.dependencies.clone();

            let outputs = dependencies
                .into_iter()
                .map(|dep| {
                    let output = state
                        .jobs
                        .get(&dep)
                        .and_then(|slot| slot.result.clone())
                        .flatten();
                    (dep, output)
                })
                .collect();

            (work, JobInputs { outputs })
        };

        debug!(job = %handle, inputs = inputs.len(), "job started");

        let output = match work {
            Some(work) => match panic::catch_unwind(AssertUnwindSafe(|| work(&inputs))) {
                Ok(output) => output,
                Err(_) => {
                    error!(job = %handle, "job panicked; recording an empty result");
                    None
                }
            },
            None => None,
        };

        let ready = {
            let mut state = self.lock();
            let dependents = match state.jobs.get_mut(&handle) {
                Some(slot) => {
                    slot.result = Some(output);
                    std::mem::take(&mut slot.dependents)
                }
                None => Vec::new(),
            };
            state.outstanding = state.outstanding.saturating_sub(1);

            let mut ready = Vec::new();
            for dependent in dependents {
                if let Some(slot) = state.jobs.get_mut(&dependent) {
                    slot.unfinished -= 1;
                    if slot.unfinished == 0 {
                        ready.push(dependent);
                    }
                }
            }
            ready
        };

        debug!(job = %handle, unblocked = ready.len(), "job finished");
        self.changed.notify_all();

        for dependent in ready {
            self.dispatch(dependent);
        }
    }
}

/// Runs jobs on a worker pool as soon as their prerequisites complete.
///
/// Cloning a `Scheduler` yields another handle to the same pool and job set.
/// Jobs with no dependency relation run in no particular order. A failing
/// job never cancels anything: it just leaves an empty result for its
/// dependents to inspect.
///
/// Completed results are kept until [`Scheduler::prune`] drops them, so a
/// scheduler reused across many builds should be pruned between them.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("workers", &self.worker_count())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl Scheduler {
    /// Creates a scheduler with `workers` threads, or one per CPU when `0`.
    pub fn new(workers: usize) -> Result<Self, SchedulerError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("geno-worker-{i}"))
            .build()?;

        Ok(Self {
            shared: Arc::new(Shared {
                pool,
                state: Mutex::new(State::default()),
                changed: Condvar::new(),
            }),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.shared.pool.current_num_threads()
    }

    /// Registers a job that runs once every job in `dependencies` has
    /// completed. Returns immediately.
    pub fn submit<F>(&self, dependencies: &[JobHandle], work: F) -> Result<JobHandle, SchedulerError>
    where
        F: FnOnce(&JobInputs) -> JobOutput + Send + 'static,
    {
        let mut dependencies = dependencies.to_vec();
        dependencies.sort_unstable();
        dependencies.dedup();

        let handle = JobHandle(NEXT_JOB.fetch_add(1, Ordering::Relaxed));
        let ready = {
            let mut state = self.shared.lock();

            if let Some(unknown) = dependencies.iter().find(|d| !state.jobs.contains_key(d)) {
                return Err(SchedulerError::UnknownDependency(*unknown));
            }

            let mut unfinished = 0;
            for dep in &dependencies {
                if let Some(slot) = state.jobs.get_mut(dep)
                    && slot.result.is_none()
                {
                    slot.dependents.push(handle);
                    unfinished += 1;
                }
            }

            state.jobs.insert(
                handle,
                JobSlot {
                    work: Some(Box::new(work)),
                    dependencies,
                    unfinished,
                    dependents: Vec::new(),
                    result: None,
                },
            );
            state.outstanding += 1;
            unfinished == 0
        };

        debug!(job = %handle, ready, "job submitted");
        if ready {
            self.shared.dispatch(handle);
        }
        Ok(handle)
    }

    /// True once the job's result slot has been written.
    pub fn is_complete(&self, handle: JobHandle) -> bool {
        self.shared
            .lock()
            .jobs
            .get(&handle)
            .is_some_and(|slot| slot.result.is_some())
    }

    /// Result of a completed job; `None` while it is pending or unknown.
    pub fn result(&self, handle: JobHandle) -> Option<JobOutput> {
        self.shared
            .lock()
            .jobs
            .get(&handle)
            .and_then(|slot| slot.result.clone())
    }

    /// Number of submitted jobs that have not completed.
    pub fn outstanding(&self) -> usize {
        self.shared.lock().outstanding
    }

    /// Blocks until `handle` completes and returns its result. Returns `None`
    /// for a handle this scheduler never issued.
    ///
    /// Must not be called from inside a job body.
    pub fn wait(&self, handle: JobHandle) -> Option<JobOutput> {
        let mut state = self.shared.lock();
        loop {
            match state.jobs.get(&handle) {
                None => return None,
                Some(slot) => {
                    if let Some(result) = &slot.result {
                        return Some(result.clone());
                    }
                }
            }
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Forgets completed jobs that no pending job still depends on and
    /// returns how many were dropped.
    ///
    /// A pruned handle becomes unknown: `wait` and `result` return `None` for
    /// it, and it can no longer be named as a dependency.
    pub fn prune(&self) -> usize {
        let mut state = self.shared.lock();
        let pinned: HashSet<JobHandle> = state
            .jobs
            .values()
            .filter(|slot| slot.result.is_none())
            .flat_map(|slot| slot.dependencies.iter().copied())
            .collect();

        let before = state.jobs.len();
        state
            .jobs
            .retain(|handle, slot| slot.result.is_none() || pinned.contains(handle));
        let pruned = before - state.jobs.len();
        debug!(pruned, kept = state.jobs.len(), "pruned completed jobs");
        pruned
    }

    /// Blocks until every submitted job has completed.
    pub fn wait_idle(&self) {
        let mut state = self.shared.lock();
        while state.outstanding > 0 {
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn path(s: &str) -> JobOutput {
        Some(PathBuf::from(s))
    }

    #[test]
    fn test_job_without_dependencies_runs() {
        let scheduler = Scheduler::new(2).unwrap();
        let job = scheduler.submit(&[], |_| path("a.o")).unwrap();
        assert_eq!(scheduler.wait(job), Some(path("a.o")));
        assert!(scheduler.is_complete(job));
        assert_eq!(scheduler.outstanding(), 0);
    }

    #[test]
    fn test_dependent_reads_prerequisite_outputs() {
        let scheduler = Scheduler::new(4).unwrap();
        let a = scheduler.submit(&[], |_| path("a.o")).unwrap();
        let b = scheduler.submit(&[], |_| None).unwrap();
        let link = scheduler
            .submit(&[a, b], move |inputs| {
                assert_eq!(inputs.len(), 2);
                assert_eq!(inputs.output(a), Some(Path::new("a.o")));
                assert_eq!(inputs.get(b), Some(&None));
                path("app")
            })
            .unwrap();
        assert_eq!(scheduler.wait(link), Some(path("app")));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let other = Scheduler::new(1).unwrap();
        let foreign = other.submit(&[], |_| None).unwrap();

        let scheduler = Scheduler::new(1).unwrap();
        let err = scheduler.submit(&[foreign], |_| None).unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownDependency(h) if h == foreign));
        assert_eq!(scheduler.outstanding(), 0);
    }

    #[test]
    fn test_duplicate_dependencies_count_once() {
        let scheduler = Scheduler::new(2).unwrap();
        let a = scheduler.submit(&[], |_| path("a.o")).unwrap();
        let b = scheduler
            .submit(&[a, a, a], |inputs| {
                assert_eq!(inputs.len(), 1);
                path("b")
            })
            .unwrap();
        assert_eq!(scheduler.wait(b), Some(path("b")));
    }

    #[test]
    fn test_panicking_job_leaves_empty_result_and_dependents_still_run() {
        let scheduler = Scheduler::new(2).unwrap();
        let bad = scheduler
            .submit(&[], |_| -> JobOutput { panic!("compiler exploded") })
            .unwrap();
        let after = scheduler
            .submit(&[bad], move |inputs| {
                if inputs.output(bad).is_none() {
                    path("saw-failure")
                } else {
                    None
                }
            })
            .unwrap();

        assert_eq!(scheduler.wait(after), Some(path("saw-failure")));
        assert_eq!(scheduler.result(bad), Some(None));
    }

    #[test]
    fn test_submit_does_not_block_on_running_prerequisite() {
        let scheduler = Scheduler::new(2).unwrap();
        let slow = scheduler
            .submit(&[], |_| {
                std::thread::sleep(Duration::from_millis(100));
                path("slow")
            })
            .unwrap();

        let start = Instant::now();
        let next = scheduler.submit(&[slow], |_| path("next")).unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(!scheduler.is_complete(next));

        scheduler.wait_idle();
        assert_eq!(scheduler.result(next), Some(path("next")));
    }

    #[test]
    fn test_wait_idle_drains_everything() {
        let scheduler = Scheduler::new(3).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut previous = Vec::new();
        for _ in 0..32 {
            let counter = Arc::clone(&counter);
            let job = scheduler
                .submit(&previous, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    None
                })
                .unwrap();
            previous = vec![job];
        }
        scheduler.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn test_wait_on_foreign_handle_returns_none() {
        let other = Scheduler::new(1).unwrap();
        let foreign = other.submit(&[], |_| None).unwrap();
        let scheduler = Scheduler::new(1).unwrap();
        assert_eq!(scheduler.wait(foreign), None);
    }

    #[test]
    fn test_inputs_are_found_among_many_prerequisites() {
        let scheduler = Scheduler::new(4).unwrap();
        let leaves: Vec<JobHandle> = (0..100)
            .map(|i| scheduler.submit(&[], move |_| path(&format!("{i}.o"))).unwrap())
            .collect();

        // Submitted out of order; lookups must not depend on it.
        let mut shuffled = leaves.clone();
        shuffled.reverse();
        let expected = leaves.clone();
        let sink = scheduler
            .submit(&shuffled, move |inputs| {
                assert_eq!(inputs.len(), 100);
                for (i, leaf) in expected.iter().enumerate() {
                    let name = format!("{i}.o");
                    assert_eq!(inputs.output(*leaf), Some(Path::new(&name)));
                }
                path("all")
            })
            .unwrap();

        assert_eq!(scheduler.wait(sink), Some(path("all")));
        assert_eq!(JobInputs::default().get(leaves[0]), None);
    }

    #[test]
    fn test_prune_forgets_completed_jobs() {
        let scheduler = Scheduler::new(2).unwrap();
        let a = scheduler.submit(&[], |_| path("a.o")).unwrap();
        let b = scheduler.submit(&[a], |_| path("b")).unwrap();
        scheduler.wait_idle();

        assert_eq!(scheduler.prune(), 2);
        assert_eq!(scheduler.prune(), 0);
        assert_eq!(scheduler.wait(a), None);
        assert_eq!(scheduler.result(b), None);
        assert!(matches!(
            scheduler.submit(&[a], |_| None),
            Err(SchedulerError::UnknownDependency(h)) if h == a
        ));
    }

    #[test]
    fn test_prune_keeps_inputs_of_pending_jobs() {
        let scheduler = Scheduler::new(2).unwrap();
        let a = scheduler.submit(&[], |_| path("a.o")).unwrap();
        scheduler.wait(a);

        let (release, gate) = std::sync::mpsc::channel::<()>();
        let blocker = scheduler
            .submit(&[], move |_| {
                let _ = gate.recv();
                None
            })
            .unwrap();
        let link = scheduler
            .submit(&[a, blocker], move |inputs| inputs.output(a).map(|o| o.with_extension("exe")))
            .unwrap();

        assert_eq!(scheduler.prune(), 0);
        release.send(()).unwrap();
        assert_eq!(scheduler.wait(link), Some(path("a.exe")));

        scheduler.wait_idle();
        assert_eq!(scheduler.prune(), 3);
    }

    #[derive(Default)]
    struct Timeline {
        started: HashMap<usize, Instant>,
        finished: HashMap<usize, Instant>,
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_no_job_starts_before_its_prerequisites_finish(
            edges in proptest::collection::vec(proptest::collection::vec(any::<prop::sample::Index>(), 0..4), 1..24),
            workers in 1usize..6,
        ) {
            let scheduler = Scheduler::new(workers).unwrap();
            let timeline = Arc::new(Mutex::new(Timeline::default()));
            let mut handles: Vec<JobHandle> = Vec::new();
            let mut prerequisites: Vec<Vec<usize>> = Vec::new();

            for (node, picks) in edges.iter().enumerate() {
                let mut deps: Vec<usize> = if node == 0 {
                    Vec::new()
                } else {
                    picks.iter().map(|i| i.index(node)).collect()
                };
                deps.sort_unstable();
                deps.dedup();

                let dep_handles: Vec<JobHandle> = deps.iter().map(|&d| handles[d]).collect();
                let timeline = Arc::clone(&timeline);
                let handle = scheduler.submit(&dep_handles, move |_| {
                    timeline.lock().unwrap().started.insert(node, Instant::now());
                    std::thread::sleep(Duration::from_micros(200));
                    timeline.lock().unwrap().finished.insert(node, Instant::now());
                    None
                }).unwrap();

                handles.push(handle);
                prerequisites.push(deps);
            }

            scheduler.wait_idle();
            let timeline = timeline.lock().unwrap();
            prop_assert_eq!(timeline.started.len(), edges.len());
            for (node, deps) in prerequisites.iter().enumerate() {
                for dep in deps {
                    prop_assert!(timeline.started[&node] >= timeline.finished[dep]);
                }
            }
        }
    }
}
