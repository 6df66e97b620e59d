//! Untyped growable buffer shared by every container
//!
//! A [`RawBuffer`] is a contiguous block of `capacity` elements of one
//! declared [`Layout`], plus a logical length. It knows nothing about the
//! element type: typed access goes through `unsafe` methods whose caller
//! guarantees the type matches the declared layout. The containers in this
//! crate are thin typed views that uphold that contract.
//!
//! # Safety
//!
//! - `ptr` is null iff `capacity == 0`; otherwise it points to a block of
//!   `capacity * element.size()` bytes obtained from `allocator` under `tag`
//! - `0 <= len <= capacity` at every point observable by the owner
//! - Slots `[0, len)` are initialized; slots `[len, capacity)` may not be
//! - The length is atomic so that [`RawBuffer::claim_slot`] can hand out
//!   unique indices to concurrent producers without a lock

use core::alloc::Layout;
use core::fmt;
use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

use crate::allocator::{AllocatorTag, SharedAllocator};
use crate::config::ContainerConfig;
use crate::error::{CollectionError, CollectionResult};

/// Largest block a buffer may span, kept at the 32-bit signed limit
pub const MAX_BUFFER_BYTES: usize = i32::MAX as usize;

/// Manually sized, manually freed memory region with a logical length
pub struct RawBuffer {
    ptr: *mut u8,
    len: AtomicUsize,
    capacity: usize,
    element: Layout,
    tag: AllocatorTag,
    allocator: SharedAllocator,
    config: ContainerConfig,
}

// SAFETY: RawBuffer exclusively owns its block; moving it to another thread
// moves that ownership. The allocator handle is Send + Sync by trait bound.
unsafe impl Send for RawBuffer {}

// SAFETY: Through a shared reference only the atomic length and the immutable
// header fields are read. The one write path available on `&self`,
// `claim_slot`, is `unsafe` and writes only to a slot index handed out by a
// unique fetch_add, so no two threads ever write the same bytes.
unsafe impl Sync for RawBuffer {}

impl RawBuffer {
    /// Allocates a buffer able to hold `initial_capacity` elements of `element`
    ///
    /// The memory is uninitialized unless `config.clear_memory` is set; the
    /// logical length always starts at zero.
    pub fn allocate(
        element: Layout,
        initial_capacity: usize,
        tag: AllocatorTag,
        allocator: SharedAllocator,
        config: &ContainerConfig,
    ) -> CollectionResult<Self> {
        validate_element(element)?;
        let bytes = byte_len(element, initial_capacity)?;

        let mut buffer = Self {
            ptr: ptr::null_mut(),
            len: AtomicUsize::new(0),
            capacity: 0,
            element,
            tag,
            allocator,
            config: config.clone(),
        };

        if bytes > 0 {
            let layout = block_layout(element, bytes)?;
            // SAFETY: layout has non-zero size; it is released in `release` with
            // the same layout and tag.
            let block = unsafe { buffer.allocator.allocate(layout, tag)? };
            buffer.ptr = block.as_ptr();
            buffer.capacity = initial_capacity;
            if buffer.config.clear_memory {
                // SAFETY: block is valid for `bytes` bytes of writes.
                unsafe { ptr::write_bytes(buffer.ptr, 0, bytes) };
            }
        }

        #[cfg(feature = "logging")]
        debug!(
            %tag,
            element_size = element.size(),
            capacity = initial_capacity,
            "raw buffer allocated"
        );
        Ok(buffer)
    }

    /// Number of initialized elements
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Whether no element is stored
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of elements the current block can hold
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Declared element layout
    #[inline]
    pub fn element_layout(&self) -> Layout {
        self.element
    }

    /// Tag the block was allocated under
    #[inline]
    pub fn tag(&self) -> AllocatorTag {
        self.tag
    }

    /// Whether the buffer currently owns a block
    #[inline]
    pub fn has_memory(&self) -> bool {
        !self.ptr.is_null()
    }

    /// Allocator the block came from
    pub fn allocator(&self) -> &SharedAllocator {
        &self.allocator
    }

    /// Memory policy applied to this buffer
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Reads the element at `index`
    ///
    /// # Safety
    /// - `T` must have exactly the declared element layout
    /// - `index < self.len()`
    #[inline]
    pub unsafe fn read<T: Copy>(&self, index: usize) -> T {
        debug_assert_eq!(Layout::new::<T>(), self.element);
        debug_assert!(index < self.len());
        // SAFETY: index is within the initialized prefix (caller contract) and
        // slots are aligned because the block is aligned to element.align() and
        // element.size() is a multiple of it.
        unsafe { ptr::read(self.slot(index).cast::<T>()) }
    }

    /// Writes `value` into slot `index` without touching the length
    ///
    /// # Safety
    /// - `T` must have exactly the declared element layout
    /// - `index < self.capacity()`
    #[inline]
    pub unsafe fn write<T: Copy>(&mut self, index: usize, value: T) {
        debug_assert_eq!(Layout::new::<T>(), self.element);
        debug_assert!(index < self.capacity);
        // SAFETY: index is within the allocated block (caller contract).
        unsafe { ptr::write(self.slot(index).cast::<T>(), value) };
    }

    /// Views the initialized prefix as a typed slice
    ///
    /// # Safety
    /// `T` must have exactly the declared element layout.
    pub unsafe fn as_slice<T: Copy>(&self) -> &[T] {
        debug_assert_eq!(Layout::new::<T>(), self.element);
        let len = self.len();
        if len == 0 {
            return &[];
        }
        // SAFETY: ptr is non-null (len > 0 implies capacity > 0), aligned, and
        // the first `len` slots are initialized.
        unsafe { core::slice::from_raw_parts(self.ptr.cast::<T>(), len) }
    }

    /// Views the initialized prefix as a mutable typed slice
    ///
    /// # Safety
    /// `T` must have exactly the declared element layout.
    pub unsafe fn as_mut_slice<T: Copy>(&mut self) -> &mut [T] {
        debug_assert_eq!(Layout::new::<T>(), self.element);
        let len = self.len();
        if len == 0 {
            return &mut [];
        }
        // SAFETY: same as `as_slice`, and `&mut self` guarantees exclusivity.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.cast::<T>(), len) }
    }

    /// Appends one element, growing the block when it is full
    ///
    /// Returns the new length.
    ///
    /// # Safety
    /// `T` must have exactly the declared element layout.
    pub unsafe fn add<T: Copy>(&mut self, value: T) -> CollectionResult<usize> {
        let len = self.len();
        if len == self.capacity {
            self.grow_for(len + 1)?;
        }
        // SAFETY: len < capacity after the growth check; layout is the caller's contract.
        unsafe { self.write(len, value) };
        self.len.store(len + 1, Ordering::Release);
        Ok(len + 1)
    }

    /// Appends one element into pre-reserved capacity
    ///
    /// Returns the new length, or `CapacityExceeded` when the block is full.
    ///
    /// # Safety
    /// `T` must have exactly the declared element layout.
    pub unsafe fn add_no_grow<T: Copy>(&mut self, value: T) -> CollectionResult<usize> {
        let len = self.len();
        if len >= self.capacity {
            return Err(CollectionError::capacity_exceeded(len + 1, self.capacity));
        }
        // SAFETY: len < capacity checked above; layout is the caller's contract.
        unsafe { self.write(len, value) };
        self.len.store(len + 1, Ordering::Release);
        Ok(len + 1)
    }

    /// Claims the next free slot with one atomic increment and writes `value` into it
    ///
    /// Returns the claimed index. Every successful claim is unique and no
    /// index below the final length is skipped. A claim that lands at or past
    /// capacity is rolled back and reported as `CapacityExceeded`.
    ///
    /// # Safety
    /// - `T` must have exactly the declared element layout
    /// - No thread may grow, shrink, free or read the buffer until every
    ///   concurrent claimer has finished
    pub unsafe fn claim_slot<T: Copy>(&self, value: T) -> CollectionResult<usize> {
        let index = self.len.fetch_add(1, Ordering::AcqRel);
        if index >= self.capacity {
            self.len.fetch_sub(1, Ordering::AcqRel);
            return Err(CollectionError::capacity_exceeded(index + 1, self.capacity));
        }
        debug_assert_eq!(Layout::new::<T>(), self.element);
        // SAFETY: index < capacity and was handed out to this caller only, so no
        // other thread writes these bytes; the block is stable per the contract.
        unsafe { ptr::write(self.slot(index).cast::<T>(), value) };
        Ok(index)
    }

    /// Removes the element at `index` in O(1) by moving the last element into its slot
    pub fn remove_at_swap_back(&mut self, index: usize) -> CollectionResult<()> {
        let len = self.len();
        if index >= len {
            return Err(CollectionError::index_out_of_range(index, len));
        }
        let last = len - 1;
        if index != last {
            // SAFETY: both slots are inside the initialized prefix and distinct,
            // so the element-sized regions do not overlap.
            unsafe {
                ptr::copy_nonoverlapping(self.slot(last), self.slot(index), self.element.size());
            }
        }
        self.len.store(last, Ordering::Release);
        Ok(())
    }

    /// Drops the last element (if any) and returns whether one was removed
    pub fn truncate_last(&mut self) -> bool {
        let len = self.len();
        if len == 0 {
            return false;
        }
        self.len.store(len - 1, Ordering::Release);
        true
    }

    /// Sets the logical length to zero without releasing memory
    pub fn clear(&mut self) {
        self.len.store(0, Ordering::Release);
    }

    /// Reallocates the block to hold exactly `new_capacity` elements
    ///
    /// Fails with `InvalidArgument` if `new_capacity` is below the current length.
    pub fn set_capacity(&mut self, new_capacity: usize) -> CollectionResult<()> {
        let len = self.len();
        if new_capacity < len {
            return Err(CollectionError::invalid_argument(format!(
                "capacity {new_capacity} is below length {len}"
            )));
        }
        if new_capacity == self.capacity {
            return Ok(());
        }

        let old_capacity = self.capacity;
        let new_bytes = byte_len(self.element, new_capacity)?;
        if new_bytes == 0 {
            self.release();
            return Ok(());
        }

        let new_layout = block_layout(self.element, new_bytes)?;
        let block = if self.ptr.is_null() {
            // SAFETY: non-zero layout, released later with the same layout and tag.
            unsafe { self.allocator.allocate(new_layout, self.tag)? }
        } else {
            let old_layout = block_layout(self.element, self.capacity * self.element.size())?;
            // SAFETY: ptr is non-null, was allocated by this allocator with
            // old_layout under self.tag, and new_bytes is non-zero.
            unsafe {
                self.allocator.reallocate(
                    ptr::NonNull::new_unchecked(self.ptr),
                    old_layout,
                    new_bytes,
                    self.tag,
                )?
            }
        };

        self.ptr = block.as_ptr();
        self.capacity = new_capacity;
        if self.config.clear_memory && new_capacity > old_capacity {
            // SAFETY: the tail [old_capacity, new_capacity) lies inside the new block.
            unsafe {
                ptr::write_bytes(
                    self.slot(old_capacity),
                    0,
                    (new_capacity - old_capacity) * self.element.size(),
                );
            }
        }

        #[cfg(feature = "logging")]
        trace!(
            tag = %self.tag,
            old_capacity,
            new_capacity,
            "raw buffer resized"
        );
        Ok(())
    }

    /// Ensures room for `additional` more elements, growing geometrically
    pub fn reserve(&mut self, additional: usize) -> CollectionResult<()> {
        let required = self
            .len()
            .checked_add(additional)
            .ok_or_else(|| CollectionError::invalid_argument("requested capacity overflows"))?;
        if required > self.capacity {
            self.grow_for(required)?;
        }
        Ok(())
    }

    /// Releases the block back to its allocator
    ///
    /// Consuming the buffer makes a second free impossible.
    pub fn free(self) {
        drop(self);
    }

    fn grow_for(&mut self, required: usize) -> CollectionResult<()> {
        let max_elements = MAX_BUFFER_BYTES / self.element.size();
        let target = self
            .config
            .grown_capacity(self.capacity, required)
            .min(max_elements)
            .max(required);
        self.set_capacity(target)
    }

    /// Pointer to slot `index`; only meaningful while `ptr` is non-null
    #[inline]
    fn slot(&self, index: usize) -> *mut u8 {
        self.ptr.wrapping_add(index * self.element.size())
    }

    fn release(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        let bytes = self.capacity * self.element.size();
        if let Some(pattern) = self.config.free_pattern {
            // SAFETY: the block is valid for `bytes` bytes of writes.
            unsafe { ptr::write_bytes(self.ptr, pattern, bytes) };
        }
        // Layout was valid when the block was allocated; recomputing it cannot fail.
        if let Ok(layout) = block_layout(self.element, bytes) {
            // SAFETY: ptr was allocated by self.allocator with this layout and tag,
            // and is nulled right after so it is never freed twice.
            unsafe {
                self.allocator
                    .deallocate(ptr::NonNull::new_unchecked(self.ptr), layout, self.tag);
            }
        }

        #[cfg(feature = "logging")]
        debug!(tag = %self.tag, bytes, "raw buffer freed");

        self.ptr = ptr::null_mut();
        self.capacity = 0;
        self.len.store(0, Ordering::Release);
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for RawBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("element_size", &self.element.size())
            .field("element_align", &self.element.align())
            .field("tag", &self.tag)
            .field("allocator", &self.allocator.name())
            .finish()
    }
}

fn validate_element(element: Layout) -> CollectionResult<()> {
    if element.size() == 0 {
        return Err(CollectionError::invalid_argument(
            "zero-sized element types are not supported",
        ));
    }
    if element.size() % element.align() != 0 {
        return Err(CollectionError::invalid_argument(format!(
            "element size {} is not a multiple of its alignment {}",
            element.size(),
            element.align()
        )));
    }
    Ok(())
}

fn byte_len(element: Layout, capacity: usize) -> CollectionResult<usize> {
    element
        .size()
        .checked_mul(capacity)
        .filter(|bytes| *bytes <= MAX_BUFFER_BYTES)
        .ok_or_else(|| {
            CollectionError::invalid_argument(format!(
                "{capacity} elements of {} bytes exceed the {MAX_BUFFER_BYTES} byte limit",
                element.size()
            ))
        })
}

fn block_layout(element: Layout, bytes: usize) -> CollectionResult<Layout> {
    Layout::from_size_align(bytes, element.align())
        .map_err(|_| CollectionError::invalid_argument("invalid buffer layout"))
}
