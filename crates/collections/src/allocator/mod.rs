//! Tagged allocator boundary
//!
//! Containers never talk to the global allocator directly. They go through a
//! [`TaggedAllocator`], passing an [`AllocatorTag`] that selects the pool or
//! lifetime policy the memory belongs to. [`SystemArena`] is the bundled
//! implementation; any other arena can be plugged in with the `new_in`
//! constructors of the containers.
//!
//! # Safety
//!
//! [`TaggedAllocator`] is an `unsafe` trait: implementors promise that
//! returned pointers are valid, aligned for the requested layout and not
//! aliased by any other live allocation.

use core::alloc::Layout;
use core::fmt;
use core::ptr::{self, NonNull};
use std::sync::{Arc, OnceLock};

use crate::error::{CollectionError, CollectionResult};

mod system;

pub use system::{SystemArena, TagStats};

/// Identifies which memory pool / lifetime policy an allocation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocatorTag {
    /// Short-lived memory, freed within the same frame of work
    Temp,
    /// Memory handed to scheduled jobs, freed within a few frames
    TempJob,
    /// Long-lived memory with no lifetime limit
    Persistent,
    /// Caller-defined pool
    Custom(u16),
}

impl fmt::Display for AllocatorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temp => write!(f, "Temp"),
            Self::TempJob => write!(f, "TempJob"),
            Self::Persistent => write!(f, "Persistent"),
            Self::Custom(id) => write!(f, "Custom({id})"),
        }
    }
}

/// Allocator that serves raw memory keyed by an [`AllocatorTag`]
///
/// # Safety
///
/// Implementors must ensure that:
/// - Returned pointers are valid for reads and writes of `layout.size()` bytes
/// - Returned pointers are aligned to `layout.align()`
/// - A pointer is only invalidated by `deallocate` or `reallocate`
pub unsafe trait TaggedAllocator: Send + Sync {
    /// Allocates uninitialized memory for `layout`
    ///
    /// # Safety
    /// - `layout.size()` must be non-zero
    /// - The memory must be released with the same `layout` and `tag`
    unsafe fn allocate(&self, layout: Layout, tag: AllocatorTag) -> CollectionResult<NonNull<u8>>;

    /// Releases memory previously returned by this allocator
    ///
    /// # Safety
    /// - `ptr` must have been allocated by this allocator with `layout` and `tag`
    /// - `ptr` must not be used afterwards; freeing twice is undefined behavior
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout, tag: AllocatorTag);

    /// Resizes an allocation, preserving `min(old, new)` bytes of content
    ///
    /// The default implementation allocates, copies and frees.
    ///
    /// # Safety
    /// - Same requirements as `deallocate` for `ptr`, `old_layout` and `tag`
    /// - `new_size` must be non-zero
    /// - On success `ptr` is invalid and the returned pointer replaces it
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
        tag: AllocatorTag,
    ) -> CollectionResult<NonNull<u8>> {
        let new_layout = Layout::from_size_align(new_size, old_layout.align())
            .map_err(|_| CollectionError::invalid_argument("reallocation size overflows layout"))?;

        // SAFETY: new_layout has non-zero size (caller contract).
        let new_ptr = unsafe { self.allocate(new_layout, tag)? };

        // SAFETY: Copying between two distinct live allocations.
        // - ptr is valid for old_layout.size() bytes (caller contract)
        // - new_ptr is valid for new_size bytes (just allocated)
        // - Only the overlapping prefix is copied
        unsafe {
            ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_ptr.as_ptr(),
                old_layout.size().min(new_size),
            );
            self.deallocate(ptr, old_layout, tag);
        }
        Ok(new_ptr)
    }

    /// Allocator name for diagnostics
    fn name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

/// Allocator handle shared between a container and its dispose job
pub type SharedAllocator = Arc<dyn TaggedAllocator>;

static SYSTEM: OnceLock<Arc<SystemArena>> = OnceLock::new();

/// Process-wide [`SystemArena`] with its per-tag statistics
pub fn system_arena() -> &'static Arc<SystemArena> {
    SYSTEM.get_or_init(|| Arc::new(SystemArena::new()))
}

/// Process-wide default allocator used by the plain `new` constructors
pub fn system() -> SharedAllocator {
    system_arena().clone()
}
