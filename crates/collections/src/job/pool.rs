//! Fixed-size worker pool
//!
//! Jobs become ready when their prerequisites complete; ready jobs go into a
//! lock-free queue that worker threads drain. Idle workers park on a condvar.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

use super::{Job, JobCompleter, JobHandle, JobScheduler, run_guarded};

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of worker threads (at least one)
    pub threads: usize,
    /// Name prefix for worker threads
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            threads: thread::available_parallelism().map_or(1, NonZeroUsize::get),
            thread_name: "nebula-job".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    /// Sets the worker count, clamped to at least one
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Sets the worker thread name prefix
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

struct Task {
    job: Job,
    completer: JobCompleter,
}

impl Task {
    fn run(self) {
        run_guarded(self.job);
        self.completer.complete();
    }
}

struct Shared {
    ready: SegQueue<Task>,
    // Guards the shutdown/empty check against concurrent enqueues.
    park: Mutex<()>,
    wake: Condvar,
    shutdown: AtomicBool,
}

impl Shared {
    fn enqueue(&self, task: Task) {
        let guard = self.park.lock();
        if self.shutdown.load(Ordering::Acquire) {
            drop(guard);
            #[cfg(feature = "logging")]
            trace!("worker pool stopped, running job inline");
            task.run();
            return;
        }
        self.ready.push(task);
        self.wake.notify_one();
    }

    fn worker_loop(&self) {
        loop {
            if let Some(task) = self.ready.pop() {
                task.run();
                continue;
            }

            let mut guard = self.park.lock();
            if !self.ready.is_empty() {
                continue;
            }
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            self.wake.wait(&mut guard);
        }
    }
}

/// [`JobScheduler`] backed by a fixed set of worker threads
///
/// Dropping the pool runs every job that is already ready, then joins the
/// workers. Jobs whose prerequisites complete after that run inline on the
/// completing thread.
///
/// Waiting on a handle from inside a pool job can deadlock when every
/// worker is blocked the same way.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns the worker threads
    ///
    /// # Errors
    /// Returns the OS error if a worker thread cannot be spawned.
    pub fn new(config: WorkerPoolConfig) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            ready: SegQueue::new(),
            park: Mutex::new(()),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let threads = config.threads.max(1);
        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(threads),
        };
        for index in 0..threads {
            let shared = Arc::clone(&pool.shared);
            let worker = thread::Builder::new()
                .name(format!("{}-{index}", config.thread_name))
                .spawn(move || shared.worker_loop())?;
            pool.workers.push(worker);
        }

        #[cfg(feature = "logging")]
        debug!(threads, name = %config.thread_name, "worker pool started");
        Ok(pool)
    }

    /// Pool with `threads` workers and default naming
    ///
    /// # Errors
    /// Returns the OS error if a worker thread cannot be spawned.
    pub fn with_threads(threads: usize) -> std::io::Result<Self> {
        Self::new(WorkerPoolConfig::default().with_threads(threads))
    }

    /// Number of worker threads
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Number of jobs ready to run but not yet picked up
    pub fn queued(&self) -> usize {
        self.shared.ready.len()
    }
}

impl JobScheduler for WorkerPool {
    fn schedule_after(&self, prerequisites: &JobHandle, job: Job) -> JobHandle {
        let (handle, completer) = JobHandle::pending();
        let shared = Arc::clone(&self.shared);
        prerequisites.on_complete(move || shared.enqueue(Task { job, completer }));
        handle
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        {
            let _guard = self.shared.park.lock();
            self.shared.shutdown.store(true, Ordering::Release);
            self.shared.wake.notify_all();
        }
        for worker in self.workers.drain(..) {
            // Jobs run under catch_unwind, so a worker only fails on a
            // panic in the pool itself.
            let _ = worker.join();
        }

        #[cfg(feature = "logging")]
        debug!("worker pool stopped");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.workers.len())
            .field("queued", &self.shared.ready.len())
            .field("shutdown", &self.shared.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}
