//! Immediate and deferred disposal shared by every container
//!
//! Each container owns its [`RawBuffer`] through an [`OwnedBuffer`], which
//! carries the `Live -> DisposeRequested -> Freed` state machine:
//!
//! - [`Dispose::dispose`] frees the memory right away (`Live -> Freed`)
//! - [`Dispose::dispose_deferred`] makes the container unusable at once and
//!   hands a [`DisposeJob`] to a [`JobScheduler`], which frees the memory
//!   after the prerequisite handle completes
//!
//! After either call every operation fails with `UseAfterFree` and a second
//! dispose fails with `DoubleFree`.

use core::fmt;
use core::ptr::NonNull;

#[cfg(feature = "logging")]
use tracing::{debug, warn};

use crate::buffer::RawBuffer;
use crate::error::{CollectionError, CollectionResult};
use crate::job::{JobHandle, JobScheduler};
use crate::safety::SafetyHandle;

/// Where a container is in its disposal lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisposeState {
    /// Memory is allocated and the container is usable
    Live,
    /// A deferred free was scheduled but has not run yet
    DisposeRequested,
    /// Memory was returned to the allocator
    Freed,
}

/// Explicit disposal protocol implemented by every container
pub trait Dispose {
    /// Frees the backing memory synchronously
    ///
    /// # Errors
    /// `DoubleFree` if the container was already disposed, `ConcurrentAccess`
    /// while parallel writers are still registered (safety-checked builds).
    fn dispose(&mut self) -> CollectionResult<()>;

    /// Schedules the free to run after `prerequisites` completes
    ///
    /// The container is unusable as soon as this returns. The returned handle
    /// completes once the memory has been freed.
    ///
    /// # Errors
    /// `DoubleFree` if the container was already disposed.
    fn dispose_deferred(
        &mut self,
        prerequisites: &JobHandle,
        scheduler: &dyn JobScheduler,
    ) -> CollectionResult<JobHandle>;

    /// Whether the container still owns live memory
    ///
    /// Never fails, so it can be used to probe a disposed instance.
    fn is_created(&self) -> bool;

    /// Current lifecycle state
    fn state(&self) -> DisposeState;
}

/// Unit of work that releases a container's memory
///
/// Produced by deferred disposal. Running it consumes the job, so the same
/// memory can never be freed twice. A job that is dropped without running
/// leaks its buffer.
pub struct DisposeJob {
    buffer: NonNull<RawBuffer>,
    safety: SafetyHandle,
    container: &'static str,
}

// SAFETY: The job is the sole owner of the boxed RawBuffer once the container
// moved to DisposeRequested, and RawBuffer itself is Send.
unsafe impl Send for DisposeJob {}

impl DisposeJob {
    /// Releases the safety token and returns the memory to its allocator
    pub fn run(self) {
        if self.safety.release().is_err() {
            // The token was already released; freeing again would be a double free.
            return;
        }
        // SAFETY: buffer came from Box::leak in OwnedBuffer::new and
        // ownership moved into this job, which is consumed here.
        let buffer = unsafe { Box::from_raw(self.buffer.as_ptr()) };

        #[cfg(feature = "logging")]
        debug!(
            container = self.container,
            tag = %buffer.tag(),
            capacity = buffer.capacity(),
            "container disposed"
        );
        buffer.free();
    }
}

impl fmt::Debug for DisposeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposeJob")
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

enum Lifecycle {
    Live(NonNull<RawBuffer>),
    DisposeRequested(JobHandle),
    Freed,
}

/// Owning core embedded in every container
///
/// The buffer lives in its own heap allocation so that parallel writer
/// views keep a stable address while the container value moves.
pub(crate) struct OwnedBuffer {
    lifecycle: Lifecycle,
    safety: SafetyHandle,
    container: &'static str,
}

// SAFETY: OwnedBuffer uniquely owns the boxed RawBuffer (Send + Sync); shared
// access only hands out `&RawBuffer`.
unsafe impl Send for OwnedBuffer {}
// SAFETY: see above.
unsafe impl Sync for OwnedBuffer {}

impl OwnedBuffer {
    pub(crate) fn new(container: &'static str, buffer: RawBuffer) -> Self {
        let buffer = NonNull::from(Box::leak(Box::new(buffer)));
        Self {
            lifecycle: Lifecycle::Live(buffer),
            safety: SafetyHandle::create(container),
            container,
        }
    }

    pub(crate) fn safety(&self) -> &SafetyHandle {
        &self.safety
    }

    /// Buffer for an owner read
    pub(crate) fn buffer(&self) -> CollectionResult<&RawBuffer> {
        let ptr = self.live()?;
        self.safety.check_read()?;
        // SAFETY: the buffer is live and only mutated through `&mut self`.
        Ok(unsafe { ptr.as_ref() })
    }

    /// Buffer for an owner write
    pub(crate) fn buffer_mut(&mut self) -> CollectionResult<&mut RawBuffer> {
        let mut ptr = self.live()?;
        self.safety.check_write()?;
        // SAFETY: the buffer is live and `&mut self` makes this the only owner access.
        Ok(unsafe { ptr.as_mut() })
    }

    /// Raw pointer to the live buffer for parallel writer views
    pub(crate) fn buffer_ptr(&self) -> CollectionResult<NonNull<RawBuffer>> {
        self.live()
    }

    fn live(&self) -> CollectionResult<NonNull<RawBuffer>> {
        match self.lifecycle {
            Lifecycle::Live(ptr) => Ok(ptr),
            Lifecycle::DisposeRequested(_) | Lifecycle::Freed => {
                Err(CollectionError::use_after_free(self.container))
            }
        }
    }

    fn take_job(&mut self) -> CollectionResult<DisposeJob> {
        let Lifecycle::Live(buffer) = self.lifecycle else {
            return Err(CollectionError::double_free(self.container));
        };
        self.lifecycle = Lifecycle::Freed;
        Ok(DisposeJob {
            buffer,
            safety: self.safety.clone(),
            container: self.container,
        })
    }
}

impl Dispose for OwnedBuffer {
    fn dispose(&mut self) -> CollectionResult<()> {
        if matches!(self.lifecycle, Lifecycle::Live(_)) {
            self.safety.check_write()?;
        }
        self.take_job()?.run();
        Ok(())
    }

    fn dispose_deferred(
        &mut self,
        prerequisites: &JobHandle,
        scheduler: &dyn JobScheduler,
    ) -> CollectionResult<JobHandle> {
        let job = self.take_job()?;

        #[cfg(feature = "logging")]
        debug!(container = self.container, "deferred dispose scheduled");

        let handle = scheduler.schedule_after(prerequisites, Box::new(move || job.run()));
        self.lifecycle = Lifecycle::DisposeRequested(handle.clone());
        Ok(handle)
    }

    fn is_created(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Live(_))
    }

    fn state(&self) -> DisposeState {
        match &self.lifecycle {
            Lifecycle::Live(_) => DisposeState::Live,
            Lifecycle::DisposeRequested(handle) if handle.is_completed() => DisposeState::Freed,
            Lifecycle::DisposeRequested(_) => DisposeState::DisposeRequested,
            Lifecycle::Freed => DisposeState::Freed,
        }
    }
}

impl Drop for OwnedBuffer {
    fn drop(&mut self) {
        if !self.is_created() {
            return;
        }
        #[cfg(feature = "logging")]
        warn!(container = self.container, "container dropped without dispose");
        if let Ok(job) = self.take_job() {
            job.run();
        }
    }
}

impl fmt::Debug for OwnedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.container);
        s.field("state", &self.state());
        if let Ok(buffer) = self.live() {
            // SAFETY: the buffer is live; only its atomic length and header are read.
            let buffer = unsafe { buffer.as_ref() };
            s.field("len", &buffer.len())
                .field("capacity", &buffer.capacity())
                .field("tag", &buffer.tag());
        }
        s.finish()
    }
}
