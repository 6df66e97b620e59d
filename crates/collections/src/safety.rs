//! Version-token checks for detecting misuse of shared container views
//!
//! Every container owns a [`SafetyHandle`]; views handed to other threads
//! (parallel writers) carry a clone. Releasing the handle bumps a shared
//! version, so every clone taken before the release starts failing with
//! `UseAfterFree`. Registered parallel writers make owner reads and writes
//! fail with `ConcurrentAccess` until they are dropped.
//!
//! The checks are compiled when `debug_assertions` is on or the
//! `safety-checks` feature is enabled. Otherwise [`SafetyHandle`] is a
//! zero-sized stand-in whose checks always pass, so functional results are
//! the same in both builds.

#[cfg(any(debug_assertions, feature = "safety-checks"))]
mod checked {
    use core::fmt;
    use core::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::error::{CollectionError, CollectionResult};

    struct SafetyNode {
        version: AtomicU32,
        parallel_writers: AtomicU32,
    }

    /// Shared version token for one container allocation
    #[derive(Clone)]
    pub struct SafetyHandle {
        node: Arc<SafetyNode>,
        version: u32,
        container: &'static str,
    }

    impl SafetyHandle {
        /// Whether checks are compiled into this build
        pub const ENABLED: bool = true;

        /// Creates a fresh token for a newly allocated container
        pub fn create(container: &'static str) -> Self {
            Self {
                node: Arc::new(SafetyNode {
                    version: AtomicU32::new(0),
                    parallel_writers: AtomicU32::new(0),
                }),
                version: 0,
                container,
            }
        }

        /// Fails with `UseAfterFree` once the token was released
        #[inline]
        pub fn check_exists(&self) -> CollectionResult<()> {
            if self.node.version.load(Ordering::Acquire) == self.version {
                Ok(())
            } else {
                Err(CollectionError::use_after_free(self.container))
            }
        }

        /// Owner read: the allocation must exist and have no parallel writers
        #[inline]
        pub fn check_read(&self) -> CollectionResult<()> {
            self.check_exists()?;
            if self.node.parallel_writers.load(Ordering::Acquire) > 0 {
                return Err(CollectionError::concurrent_access(
                    self.container,
                    "read while parallel writers are active",
                ));
            }
            Ok(())
        }

        /// Owner write: same rules as a read
        #[inline]
        pub fn check_write(&self) -> CollectionResult<()> {
            self.check_exists()?;
            if self.node.parallel_writers.load(Ordering::Acquire) > 0 {
                return Err(CollectionError::concurrent_access(
                    self.container,
                    "write while parallel writers are active",
                ));
            }
            Ok(())
        }

        /// Invalidates every clone of this token
        pub fn release(&self) -> CollectionResult<()> {
            self.node
                .version
                .compare_exchange(
                    self.version,
                    self.version.wrapping_add(1),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .map(|_| ())
                .map_err(|_| CollectionError::double_free(self.container))
        }

        /// Registers a parallel writer view
        pub fn enter_parallel_writer(&self) -> CollectionResult<()> {
            self.check_exists()?;
            self.node.parallel_writers.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }

        /// Deregisters a parallel writer view
        pub fn exit_parallel_writer(&self) {
            self.node.parallel_writers.fetch_sub(1, Ordering::AcqRel);
        }

        /// Number of registered parallel writers
        pub fn parallel_writers(&self) -> u32 {
            self.node.parallel_writers.load(Ordering::Acquire)
        }
    }

    impl fmt::Debug for SafetyHandle {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("SafetyHandle")
                .field("container", &self.container)
                .field("version", &self.version)
                .field("current", &self.node.version.load(Ordering::Relaxed))
                .field("parallel_writers", &self.parallel_writers())
                .finish()
        }
    }
}

#[cfg(not(any(debug_assertions, feature = "safety-checks")))]
mod unchecked {
    use crate::error::CollectionResult;

    /// Zero-sized stand-in used when safety checks are compiled out
    #[derive(Clone, Copy, Debug)]
    pub struct SafetyHandle;

    impl SafetyHandle {
        /// Whether checks are compiled into this build
        pub const ENABLED: bool = false;

        #[inline(always)]
        pub fn create(_container: &'static str) -> Self {
            Self
        }

        #[inline(always)]
        pub fn check_exists(&self) -> CollectionResult<()> {
            Ok(())
        }

        #[inline(always)]
        pub fn check_read(&self) -> CollectionResult<()> {
            Ok(())
        }

        #[inline(always)]
        pub fn check_write(&self) -> CollectionResult<()> {
            Ok(())
        }

        #[inline(always)]
        pub fn release(&self) -> CollectionResult<()> {
            Ok(())
        }

        #[inline(always)]
        pub fn enter_parallel_writer(&self) -> CollectionResult<()> {
            Ok(())
        }

        #[inline(always)]
        pub fn exit_parallel_writer(&self) {}

        #[inline(always)]
        pub fn parallel_writers(&self) -> u32 {
            0
        }
    }
}

#[cfg(any(debug_assertions, feature = "safety-checks"))]
pub use checked::SafetyHandle;
#[cfg(not(any(debug_assertions, feature = "safety-checks")))]
pub use unchecked::SafetyHandle;
