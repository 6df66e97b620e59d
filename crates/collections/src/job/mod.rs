//! Deferred job boundary
//!
//! The containers do not run a scheduler of their own. Deferred disposal
//! hands a unit of work plus a prerequisite [`JobHandle`] to any
//! [`JobScheduler`] and gets back a handle representing its completion.
//!
//! Two schedulers are bundled:
//! - [`InlineScheduler`] runs a job on whichever thread completes its last
//!   prerequisite (immediately if it already completed)
//! - [`WorkerPool`] runs ready jobs on a fixed set of worker threads

use core::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

#[cfg(feature = "logging")]
use tracing::error;

mod pool;

pub use pool::{WorkerPool, WorkerPoolConfig};

/// A unit of work accepted by a [`JobScheduler`]
pub type Job = Box<dyn FnOnce() + Send + 'static>;

type Continuation = Box<dyn FnOnce() + Send + 'static>;

struct JobState {
    inner: Mutex<StateInner>,
    done: Condvar,
}

struct StateInner {
    completed: bool,
    continuations: Vec<Continuation>,
}

/// Completion token for scheduled work
///
/// Cloning is cheap; every clone observes the same completion. The default
/// handle is already complete.
#[derive(Clone, Default)]
pub struct JobHandle {
    state: Option<Arc<JobState>>,
}

impl JobHandle {
    /// A handle with nothing left to wait for
    #[must_use]
    pub fn completed() -> Self {
        Self { state: None }
    }

    /// A handle that completes when the returned [`JobCompleter`] fires
    #[must_use]
    pub fn pending() -> (Self, JobCompleter) {
        let state = Arc::new(JobState {
            inner: Mutex::new(StateInner {
                completed: false,
                continuations: Vec::new(),
            }),
            done: Condvar::new(),
        });
        (
            Self {
                state: Some(Arc::clone(&state)),
            },
            JobCompleter { state: Some(state) },
        )
    }

    /// Whether the work behind this handle has finished
    pub fn is_completed(&self) -> bool {
        self.state
            .as_ref()
            .is_none_or(|state| state.inner.lock().completed)
    }

    /// Blocks the calling thread until the work behind this handle has finished
    pub fn wait(&self) {
        if let Some(state) = &self.state {
            let mut inner = state.inner.lock();
            while !inner.completed {
                state.done.wait(&mut inner);
            }
        }
    }

    /// A handle that completes once every handle in `handles` has completed
    #[must_use]
    pub fn combine(handles: &[JobHandle]) -> Self {
        let pending: Vec<&JobHandle> = handles.iter().filter(|h| !h.is_completed()).collect();
        match pending.as_slice() {
            [] => Self::completed(),
            [single] => (*single).clone(),
            _ => {
                let (combined, completer) = Self::pending();
                let remaining = Arc::new(AtomicUsize::new(pending.len()));
                let completer = Arc::new(Mutex::new(Some(completer)));
                for handle in pending {
                    let remaining = Arc::clone(&remaining);
                    let completer = Arc::clone(&completer);
                    handle.on_complete(move || {
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1
                            && let Some(completer) = completer.lock().take()
                        {
                            completer.complete();
                        }
                    });
                }
                combined
            }
        }
    }

    /// Runs `f` once this handle completes; immediately if it already has
    ///
    /// `f` runs on the thread that completes the handle.
    pub fn on_complete(&self, f: impl FnOnce() + Send + 'static) {
        let Some(state) = &self.state else {
            f();
            return;
        };
        let mut inner = state.inner.lock();
        if inner.completed {
            drop(inner);
            f();
        } else {
            inner.continuations.push(Box::new(f));
        }
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// One-shot trigger that completes a pending [`JobHandle`]
///
/// Dropping an unfired completer completes its handle, so a job that
/// unwinds never leaves waiters blocked.
#[must_use = "a completer completes its handle when fired or dropped"]
pub struct JobCompleter {
    state: Option<Arc<JobState>>,
}

impl JobCompleter {
    /// Marks the handle complete, wakes waiters and runs continuations
    pub fn complete(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };
        let continuations = {
            let mut inner = state.inner.lock();
            inner.completed = true;
            std::mem::take(&mut inner.continuations)
        };
        state.done.notify_all();
        for continuation in continuations {
            continuation();
        }
    }
}

impl Drop for JobCompleter {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for JobCompleter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobCompleter")
            .field("fired", &self.state.is_none())
            .finish()
    }
}

/// External facility that runs work after its prerequisites complete
pub trait JobScheduler: Send + Sync {
    /// Schedules `job` to run once `prerequisites` has completed
    ///
    /// Never blocks; the returned handle completes after `job` has run.
    fn schedule_after(&self, prerequisites: &JobHandle, job: Job) -> JobHandle;

    /// Blocks until `handle` has completed
    fn complete(&self, handle: &JobHandle) {
        handle.wait();
    }
}

/// Scheduler that runs each job on the thread completing its prerequisites
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineScheduler;

impl JobScheduler for InlineScheduler {
    fn schedule_after(&self, prerequisites: &JobHandle, job: Job) -> JobHandle {
        let (handle, completer) = JobHandle::pending();
        prerequisites.on_complete(move || {
            run_guarded(job);
            completer.complete();
        });
        handle
    }
}

/// Runs a job, containing a panic so the job's handle still completes
pub(crate) fn run_guarded(job: Job) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        #[cfg(feature = "logging")]
        error!("scheduled job panicked");
    }
}
