//! System-backed tagged arena
//!
//! Delegates to the global allocator and keeps live/total counters per
//! [`AllocatorTag`], which is what leak checks in tests and diagnostics read.

use core::alloc::Layout;
use core::ptr::NonNull;
use std::alloc::{alloc, dealloc, realloc};

use dashmap::DashMap;

#[cfg(feature = "logging")]
use tracing::trace;

use super::{AllocatorTag, TaggedAllocator};
use crate::error::{CollectionError, CollectionResult};

/// Allocation counters for one tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagStats {
    /// Bytes currently allocated under the tag
    pub live_bytes: usize,
    /// Allocations currently outstanding under the tag
    pub live_allocations: usize,
    /// Allocations ever made under the tag (reallocations not counted)
    pub total_allocations: u64,
}

/// Tagged arena over the global allocator
#[derive(Debug, Default)]
pub struct SystemArena {
    stats: DashMap<AllocatorTag, TagStats>,
}

impl SystemArena {
    /// Creates an arena with empty statistics
    #[must_use]
    pub fn new() -> Self {
        Self {
            stats: DashMap::new(),
        }
    }

    /// Counters for `tag` (all zero if the tag was never used)
    pub fn stats(&self, tag: AllocatorTag) -> TagStats {
        self.stats.get(&tag).map(|s| *s).unwrap_or_default()
    }

    /// Bytes currently allocated across every tag
    pub fn total_live_bytes(&self) -> usize {
        self.stats.iter().map(|entry| entry.value().live_bytes).sum()
    }

    /// Whether every allocation made through this arena was released
    pub fn is_quiescent(&self) -> bool {
        self.stats.iter().all(|entry| entry.value().live_allocations == 0)
    }

    fn record_alloc(&self, tag: AllocatorTag, size: usize) {
        let mut entry = self.stats.entry(tag).or_default();
        entry.live_bytes += size;
        entry.live_allocations += 1;
        entry.total_allocations += 1;
    }

    fn record_free(&self, tag: AllocatorTag, size: usize) {
        let mut entry = self.stats.entry(tag).or_default();
        entry.live_bytes = entry.live_bytes.saturating_sub(size);
        entry.live_allocations = entry.live_allocations.saturating_sub(1);
    }

    fn record_resize(&self, tag: AllocatorTag, old_size: usize, new_size: usize) {
        let mut entry = self.stats.entry(tag).or_default();
        entry.live_bytes = entry.live_bytes.saturating_sub(old_size) + new_size;
    }
}

// SAFETY: Every block comes from the global allocator with the caller's
// layout and goes back to it with the same layout. The stats map is a
// DashMap, so the arena is Send + Sync.
unsafe impl TaggedAllocator for SystemArena {
    unsafe fn allocate(&self, layout: Layout, tag: AllocatorTag) -> CollectionResult<NonNull<u8>> {
        debug_assert!(layout.size() > 0, "zero-sized allocations are never requested");

        // SAFETY: layout has non-zero size (caller contract) and a valid alignment
        // (guaranteed by Layout).
        let ptr = unsafe { alloc(layout) };
        let ptr = NonNull::new(ptr)
            .ok_or_else(|| CollectionError::allocation_failed(layout.size(), layout.align()))?;

        self.record_alloc(tag, layout.size());
        #[cfg(feature = "logging")]
        trace!(%tag, size = layout.size(), align = layout.align(), "arena allocate");
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout, tag: AllocatorTag) {
        // SAFETY: ptr was returned by `alloc`/`realloc` with this layout (caller contract).
        unsafe { dealloc(ptr.as_ptr(), layout) };
        self.record_free(tag, layout.size());
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
        tag: AllocatorTag,
    ) -> CollectionResult<NonNull<u8>> {
        // SAFETY: Forwarding to the global realloc.
        // - ptr was allocated by the global allocator with old_layout (caller contract)
        // - new_size is non-zero (caller contract)
        // - On failure the old block is left untouched, as realloc specifies
        let new_ptr = unsafe { realloc(ptr.as_ptr(), old_layout, new_size) };
        let new_ptr = NonNull::new(new_ptr)
            .ok_or_else(|| CollectionError::allocation_failed(new_size, old_layout.align()))?;

        self.record_resize(tag, old_layout.size(), new_size);
        #[cfg(feature = "logging")]
        trace!(%tag, old = old_layout.size(), new = new_size, "arena reallocate");
        Ok(new_ptr)
    }

    fn name(&self) -> &'static str {
        "SystemArena"
    }
}
