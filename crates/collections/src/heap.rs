//! Binary min-heap with decoupled values and priorities
//!
//! Entries are `(value, priority)` pairs kept in one [`RawBuffer`] in array
//! form: the children of index `i` live at `2i + 1` and `2i + 2`, and every
//! parent's priority is `<=` both children's. The root therefore holds the
//! smallest priority. Ties between equal priorities are not ordered.
//!
//! Lookups by value (`contains`, `update_priority`) are linear scans that
//! ignore the priority.

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;

#[cfg(feature = "logging")]
use tracing::trace;

use crate::allocator::{self, AllocatorTag, SharedAllocator};
use crate::array::NdArray;
use crate::buffer::RawBuffer;
use crate::config::ContainerConfig;
use crate::dispose::{Dispose, DisposeState, OwnedBuffer};
use crate::error::{CollectionError, CollectionResult};
use crate::job::{JobHandle, JobScheduler};

const NAME: &str = "Heap";

/// A value and the priority it is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapEntry<T, P> {
    pub value: T,
    pub priority: P,
}

impl<T, P> HeapEntry<T, P> {
    pub const fn new(value: T, priority: P) -> Self {
        Self { value, priority }
    }
}

impl<T, P> From<(T, P)> for HeapEntry<T, P> {
    fn from((value, priority): (T, P)) -> Self {
        Self { value, priority }
    }
}

/// Growable binary min-heap in manually managed memory
pub struct Heap<T: Copy + PartialEq, P: Copy + Ord> {
    core: OwnedBuffer,
    _marker: PhantomData<HeapEntry<T, P>>,
}

impl<T: Copy + PartialEq, P: Copy + Ord> Heap<T, P> {
    /// Creates a heap on the system arena with the default memory policy
    pub fn new(initial_capacity: usize, tag: AllocatorTag) -> CollectionResult<Self> {
        Self::new_in(initial_capacity, tag, allocator::system(), &ContainerConfig::default())
    }

    /// Creates a heap on the system arena with an explicit memory policy
    pub fn with_config(
        initial_capacity: usize,
        tag: AllocatorTag,
        config: &ContainerConfig,
    ) -> CollectionResult<Self> {
        Self::new_in(initial_capacity, tag, allocator::system(), config)
    }

    /// Creates a heap on an explicit allocator
    pub fn new_in(
        initial_capacity: usize,
        tag: AllocatorTag,
        allocator: SharedAllocator,
        config: &ContainerConfig,
    ) -> CollectionResult<Self> {
        let buffer = RawBuffer::allocate(
            Layout::new::<HeapEntry<T, P>>(),
            initial_capacity,
            tag,
            allocator,
            config,
        )?;
        Ok(Self {
            core: OwnedBuffer::new(NAME, buffer),
            _marker: PhantomData,
        })
    }

    /// Builds a heap from existing entries in O(n)
    ///
    /// Entries are copied in, then every internal node is sifted down from
    /// the last parent to the root.
    pub fn from_entries(entries: &[HeapEntry<T, P>], tag: AllocatorTag) -> CollectionResult<Self> {
        Self::from_entries_in(entries, tag, allocator::system(), &ContainerConfig::default())
    }

    /// Builds a heap from existing entries on an explicit allocator
    pub fn from_entries_in(
        entries: &[HeapEntry<T, P>],
        tag: AllocatorTag,
        allocator: SharedAllocator,
        config: &ContainerConfig,
    ) -> CollectionResult<Self> {
        let mut heap = Self::new_in(entries.len(), tag, allocator, config)?;
        {
            let buffer = heap.core.buffer_mut()?;
            for entry in entries {
                // SAFETY: the buffer holds HeapEntry<T, P> with room for every entry.
                unsafe { buffer.add_no_grow(*entry)? };
            }
        }
        let slice = heap.entries_mut()?;
        for i in (0..slice.len() / 2).rev() {
            sift_down(slice, i);
        }

        #[cfg(feature = "logging")]
        trace!(len = entries.len(), "heap built from entries");
        Ok(heap)
    }

    /// Inserts an entry, growing the buffer when full
    pub fn push(&mut self, value: T, priority: P) -> CollectionResult<()> {
        let buffer = self.core.buffer_mut()?;
        // SAFETY: the buffer holds HeapEntry<T, P>.
        let len = unsafe { buffer.add(HeapEntry::new(value, priority))? };
        sift_up(self.entries_mut()?, len - 1);
        Ok(())
    }

    /// Inserts an entry into already reserved capacity
    ///
    /// # Errors
    /// `CapacityExceeded` when the heap is full; the heap is left unchanged.
    pub fn push_no_grow(&mut self, value: T, priority: P) -> CollectionResult<()> {
        let buffer = self.core.buffer_mut()?;
        // SAFETY: the buffer holds HeapEntry<T, P>.
        let len = unsafe { buffer.add_no_grow(HeapEntry::new(value, priority))? };
        sift_up(self.entries_mut()?, len - 1);
        Ok(())
    }

    /// Removes and returns the entry with the smallest priority
    ///
    /// # Errors
    /// `EmptyContainer` when the heap holds nothing.
    pub fn pop(&mut self) -> CollectionResult<HeapEntry<T, P>> {
        self.try_pop()?
            .ok_or_else(|| CollectionError::empty(NAME, "pop"))
    }

    /// Removes and returns the root, or `None` when empty
    pub fn try_pop(&mut self) -> CollectionResult<Option<HeapEntry<T, P>>> {
        let buffer = self.core.buffer_mut()?;
        if buffer.is_empty() {
            return Ok(None);
        }
        // SAFETY: index 0 is initialized because the heap is not empty.
        let root = unsafe { buffer.read::<HeapEntry<T, P>>(0) };
        buffer.remove_at_swap_back(0)?;
        let slice = self.entries_mut()?;
        if !slice.is_empty() {
            sift_down(slice, 0);
        }
        Ok(Some(root))
    }

    /// Returns the root without removing it
    ///
    /// # Errors
    /// `EmptyContainer` when the heap holds nothing.
    pub fn peek(&self) -> CollectionResult<HeapEntry<T, P>> {
        self.try_peek()?
            .ok_or_else(|| CollectionError::empty(NAME, "peek"))
    }

    /// Returns the root, or `None` when empty
    pub fn try_peek(&self) -> CollectionResult<Option<HeapEntry<T, P>>> {
        Ok(self.entries()?.first().copied())
    }

    /// Pushes an entry and pops the smallest one in a single pass
    ///
    /// Same result as `push` followed by `pop`. When the heap is empty or
    /// `priority` does not exceed the root's, the new entry is the smallest
    /// and comes straight back without being inserted; otherwise it takes
    /// the root's place and the old root is returned.
    pub fn push_pop(&mut self, value: T, priority: P) -> CollectionResult<HeapEntry<T, P>> {
        let incoming = HeapEntry::new(value, priority);
        let slice = self.entries_mut()?;
        match slice.first().copied() {
            Some(root) if root.priority < priority => {
                slice[0] = incoming;
                sift_down(slice, 0);
                Ok(root)
            }
            _ => Ok(incoming),
        }
    }

    /// Overwrites the root with a new entry and returns the old root's value
    ///
    /// # Errors
    /// `IndexOutOfRange` on an empty heap, which has no root to replace.
    pub fn replace(&mut self, value: T, priority: P) -> CollectionResult<T> {
        let slice = self.entries_mut()?;
        let Some(root) = slice.first().copied() else {
            return Err(CollectionError::index_out_of_range(0, 0));
        };
        slice[0] = HeapEntry::new(value, priority);
        sift_down(slice, 0);
        Ok(root.value)
    }

    /// Whether any entry holds `value`
    pub fn contains(&self, value: &T) -> CollectionResult<bool> {
        Ok(self.entries()?.iter().any(|entry| entry.value == *value))
    }

    /// Changes the priority of the first entry holding `value`
    ///
    /// Only the first match in internal order is adjusted. Returns whether a
    /// matching entry was found.
    pub fn update_priority(&mut self, value: &T, priority: P) -> CollectionResult<bool> {
        let slice = self.entries_mut()?;
        let Some(index) = slice.iter().position(|entry| entry.value == *value) else {
            return Ok(false);
        };
        let previous = slice[index].priority;
        slice[index].priority = priority;
        if priority < previous {
            sift_up(slice, index);
        } else {
            sift_down(slice, index);
        }
        Ok(true)
    }

    /// Removes every entry, keeping the capacity
    pub fn clear(&mut self) -> CollectionResult<()> {
        self.core.buffer_mut()?.clear();
        Ok(())
    }

    pub fn len(&self) -> CollectionResult<usize> {
        Ok(self.core.buffer()?.len())
    }

    pub fn is_empty(&self) -> CollectionResult<bool> {
        Ok(self.core.buffer()?.is_empty())
    }

    pub fn capacity(&self) -> CollectionResult<usize> {
        Ok(self.core.buffer()?.capacity())
    }

    /// Reallocates to exactly `capacity` entries
    ///
    /// # Errors
    /// `InvalidArgument` when `capacity` is below the current length.
    pub fn set_capacity(&mut self, capacity: usize) -> CollectionResult<()> {
        self.core.buffer_mut()?.set_capacity(capacity)
    }

    /// Makes room for `additional` more entries
    pub fn reserve(&mut self, additional: usize) -> CollectionResult<()> {
        self.core.buffer_mut()?.reserve(additional)
    }

    /// Copy of every entry in internal (heap, not sorted) order
    pub fn to_vec(&self) -> CollectionResult<Vec<HeapEntry<T, P>>> {
        Ok(self.entries()?.to_vec())
    }

    /// Copies every entry, in internal order, into a new array under `tag`
    pub fn to_array(&self, tag: AllocatorTag) -> CollectionResult<NdArray<HeapEntry<T, P>, 1>> {
        let buffer = self.core.buffer()?;
        // SAFETY: the buffer holds HeapEntry<T, P>.
        let entries = unsafe { buffer.as_slice::<HeapEntry<T, P>>() };
        NdArray::from_slice_in(entries, tag, buffer.allocator().clone(), buffer.config())
    }

    fn entries(&self) -> CollectionResult<&[HeapEntry<T, P>]> {
        let buffer = self.core.buffer()?;
        // SAFETY: the buffer holds HeapEntry<T, P>.
        Ok(unsafe { buffer.as_slice() })
    }

    fn entries_mut(&mut self) -> CollectionResult<&mut [HeapEntry<T, P>]> {
        let buffer = self.core.buffer_mut()?;
        // SAFETY: the buffer holds HeapEntry<T, P>.
        Ok(unsafe { buffer.as_mut_slice() })
    }
}

impl<T: Copy + PartialEq, P: Copy + Ord> Dispose for Heap<T, P> {
    fn dispose(&mut self) -> CollectionResult<()> {
        self.core.dispose()
    }

    fn dispose_deferred(
        &mut self,
        prerequisites: &JobHandle,
        scheduler: &dyn JobScheduler,
    ) -> CollectionResult<JobHandle> {
        self.core.dispose_deferred(prerequisites, scheduler)
    }

    fn is_created(&self) -> bool {
        self.core.is_created()
    }

    fn state(&self) -> DisposeState {
        self.core.state()
    }
}

impl<T: Copy + PartialEq, P: Copy + Ord> fmt::Debug for Heap<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.core, f)
    }
}

#[inline]
const fn parent(i: usize) -> usize {
    (i - 1) / 2
}

/// Moves the entry at `i` toward the root while it beats its parent
fn sift_up<T, P: Ord>(entries: &mut [HeapEntry<T, P>], mut i: usize) {
    while i > 0 {
        let p = parent(i);
        if entries[i].priority >= entries[p].priority {
            break;
        }
        entries.swap(i, p);
        i = p;
    }
}

/// Moves the entry at `i` toward the leaves while a child beats it
///
/// The smaller child is chosen; on a tie the left child wins.
fn sift_down<T, P: Ord>(entries: &mut [HeapEntry<T, P>], mut i: usize) {
    let len = entries.len();
    loop {
        let left = 2 * i + 1;
        if left >= len {
            break;
        }
        let right = left + 1;
        let child = if right < len && entries[right].priority < entries[left].priority {
            right
        } else {
            left
        };
        if entries[child].priority >= entries[i].priority {
            break;
        }
        entries.swap(i, child);
        i = child;
    }
}
