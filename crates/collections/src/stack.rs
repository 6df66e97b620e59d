//! LIFO stack over a [`RawBuffer`], with a lock-free append view
//!
//! The top of the stack is the element at `len - 1`. For bulk production
//! from several threads, reserve capacity on the owning thread and hand out
//! a [`ParallelWriter`]: each `push_no_resize` claims a slot with one atomic
//! increment of the shared length, so concurrent producers never collide and
//! never leave a gap. Order between producers is unspecified.

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::allocator::{self, AllocatorTag, SharedAllocator};
use crate::array::NdArray;
use crate::buffer::RawBuffer;
use crate::config::ContainerConfig;
use crate::dispose::{Dispose, DisposeState, OwnedBuffer};
use crate::error::{CollectionError, CollectionResult};
use crate::job::{JobHandle, JobScheduler};
use crate::safety::SafetyHandle;

const NAME: &str = "Stack";

/// Growable LIFO stack of `Copy` elements in manually managed memory
pub struct Stack<T: Copy> {
    core: OwnedBuffer,
    _marker: PhantomData<T>,
}

impl<T: Copy> Stack<T> {
    /// Creates a stack on the system arena with the default memory policy
    pub fn new(initial_capacity: usize, tag: AllocatorTag) -> CollectionResult<Self> {
        Self::new_in(initial_capacity, tag, allocator::system(), &ContainerConfig::default())
    }

    /// Creates a stack on the system arena with an explicit memory policy
    pub fn with_config(
        initial_capacity: usize,
        tag: AllocatorTag,
        config: &ContainerConfig,
    ) -> CollectionResult<Self> {
        Self::new_in(initial_capacity, tag, allocator::system(), config)
    }

    /// Creates a stack on an explicit allocator
    ///
    /// # Errors
    /// `InvalidArgument` for zero-sized `T` or a capacity beyond the buffer
    /// byte limit, `AllocationFailed` when the allocator runs out.
    pub fn new_in(
        initial_capacity: usize,
        tag: AllocatorTag,
        allocator: SharedAllocator,
        config: &ContainerConfig,
    ) -> CollectionResult<Self> {
        let buffer =
            RawBuffer::allocate(Layout::new::<T>(), initial_capacity, tag, allocator, config)?;
        Ok(Self {
            core: OwnedBuffer::new(NAME, buffer),
            _marker: PhantomData,
        })
    }

    /// Pushes `value` on top, growing the buffer when full
    pub fn push(&mut self, value: T) -> CollectionResult<()> {
        let buffer = self.core.buffer_mut()?;
        // SAFETY: the buffer was allocated for T.
        unsafe { buffer.add(value)? };
        Ok(())
    }

    /// Pushes `value` into already reserved capacity
    ///
    /// # Errors
    /// `CapacityExceeded` when the stack is full.
    pub fn push_no_grow(&mut self, value: T) -> CollectionResult<()> {
        let buffer = self.core.buffer_mut()?;
        // SAFETY: the buffer was allocated for T.
        unsafe { buffer.add_no_grow(value)? };
        Ok(())
    }

    /// Removes and returns the top element
    ///
    /// # Errors
    /// `EmptyContainer` when the stack holds nothing.
    pub fn pop(&mut self) -> CollectionResult<T> {
        self.try_pop()?
            .ok_or_else(|| CollectionError::empty(NAME, "pop"))
    }

    /// Removes and returns the top element, or `None` when empty
    pub fn try_pop(&mut self) -> CollectionResult<Option<T>> {
        let buffer = self.core.buffer_mut()?;
        let len = buffer.len();
        if len == 0 {
            return Ok(None);
        }
        // SAFETY: len - 1 is inside the initialized prefix.
        let top = unsafe { buffer.read::<T>(len - 1) };
        buffer.truncate_last();
        Ok(Some(top))
    }

    /// Returns the top element without removing it
    ///
    /// # Errors
    /// `EmptyContainer` when the stack holds nothing.
    pub fn peek(&self) -> CollectionResult<T> {
        self.try_peek()?
            .ok_or_else(|| CollectionError::empty(NAME, "peek"))
    }

    /// Returns the top element, or `None` when empty
    pub fn try_peek(&self) -> CollectionResult<Option<T>> {
        let slice = self.as_slice()?;
        Ok(slice.last().copied())
    }

    /// Linear scan for an element equal to `value`
    pub fn contains(&self, value: &T) -> CollectionResult<bool>
    where
        T: PartialEq,
    {
        Ok(self.as_slice()?.contains(value))
    }

    /// Removes every element, keeping the capacity
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

    /// Reallocates to exactly `capacity` elements
    ///
    /// # Errors
    /// `InvalidArgument` when `capacity` is below the current length.
    pub fn set_capacity(&mut self, capacity: usize) -> CollectionResult<()> {
        self.core.buffer_mut()?.set_capacity(capacity)
    }

    /// Makes room for `additional` more elements
    pub fn reserve(&mut self, additional: usize) -> CollectionResult<()> {
        self.core.buffer_mut()?.reserve(additional)
    }

    /// Elements from bottom to top
    pub fn to_vec(&self) -> CollectionResult<Vec<T>> {
        Ok(self.as_slice()?.to_vec())
    }

    /// Copies the elements, bottom to top, into a new array under `tag`
    pub fn to_array(&self, tag: AllocatorTag) -> CollectionResult<NdArray<T, 1>> {
        let buffer = self.core.buffer()?;
        // SAFETY: the buffer holds T.
        let values = unsafe { buffer.as_slice::<T>() };
        NdArray::from_slice_in(values, tag, buffer.allocator().clone(), buffer.config())
    }

    /// View that lets several threads append concurrently without growing
    ///
    /// The stack stays borrowed while the view lives, so it cannot be read,
    /// grown or disposed in the meantime. Reserve capacity first.
    pub fn as_parallel_writer(&mut self) -> CollectionResult<ParallelWriter<'_, T>> {
        // SAFETY: the returned writer borrows `self` mutably for its lifetime.
        unsafe { self.make_writer() }
    }

    /// Parallel writer view detached from the stack's borrow, for scheduled jobs
    ///
    /// # Safety
    /// Until every writer returned here is dropped, the stack must not be
    /// grown, shrunk, cleared, read or disposed immediately. Deferred disposal
    /// is allowed as long as its prerequisites cover every job holding a
    /// writer. Safety-checked builds report violations as `ConcurrentAccess`
    /// or `UseAfterFree`; unchecked builds have undefined behavior.
    pub unsafe fn as_parallel_writer_unchecked(
        &mut self,
    ) -> CollectionResult<ParallelWriter<'static, T>> {
        // SAFETY: forwarded to the caller.
        unsafe { self.make_writer() }
    }

    unsafe fn make_writer<'a>(&mut self) -> CollectionResult<ParallelWriter<'a, T>> {
        let buffer = self.core.buffer_ptr()?;
        let safety = self.core.safety().clone();
        safety.enter_parallel_writer()?;
        Ok(ParallelWriter {
            buffer,
            safety,
            _marker: PhantomData,
        })
    }

    fn as_slice(&self) -> CollectionResult<&[T]> {
        let buffer = self.core.buffer()?;
        // SAFETY: the buffer holds T.
        Ok(unsafe { buffer.as_slice::<T>() })
    }
}

impl<T: Copy> Dispose for Stack<T> {
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

impl<T: Copy> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.core, f)
    }
}

/// Append-only view of a [`Stack`] shared by concurrent producers
///
/// Share it by reference (for example across `std::thread::scope`) or
/// create one unchecked writer per scheduled job.
pub struct ParallelWriter<'a, T: Copy> {
    buffer: NonNull<RawBuffer>,
    safety: SafetyHandle,
    _marker: PhantomData<(&'a mut RawBuffer, T)>,
}

// SAFETY: The writer only calls `RawBuffer::claim_slot`, which hands every
// caller a unique slot through an atomic fetch_add. The owner is locked out
// by the borrow (or by the unchecked contract) while writers exist.
unsafe impl<T: Copy + Send> Send for ParallelWriter<'_, T> {}
// SAFETY: see above; `push_no_resize` takes `&self`.
unsafe impl<T: Copy + Send> Sync for ParallelWriter<'_, T> {}

impl<T: Copy> ParallelWriter<'_, T> {
    /// Appends `value` into a slot claimed with one atomic increment
    ///
    /// # Errors
    /// `CapacityExceeded` when every reserved slot is taken; the claim is
    /// rolled back so the stack length stays at its capacity.
    pub fn push_no_resize(&self, value: T) -> CollectionResult<()> {
        self.safety.check_exists()?;
        // SAFETY: the buffer is live (borrow or unchecked contract) and holds T;
        // the owner does not touch it while writers exist.
        unsafe { self.buffer.as_ref().claim_slot(value)? };
        Ok(())
    }
}

impl<T: Copy> Drop for ParallelWriter<'_, T> {
    fn drop(&mut self) {
        self.safety.exit_parallel_writer();
    }
}

impl<T: Copy> fmt::Debug for ParallelWriter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelWriter")
            .field("safety", &self.safety)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::allocator::SystemArena;

    fn stack_on(arena: &Arc<SystemArena>, capacity: usize) -> Stack<i32> {
        Stack::new_in(
            capacity,
            AllocatorTag::Temp,
            arena.clone(),
            &ContainerConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn lifo_order() {
        let mut stack = Stack::new(0, AllocatorTag::Temp).unwrap();
        for v in [5, 3, 4] {
            stack.push(v).unwrap();
        }
        assert_eq!(stack.peek(), Ok(4));
        assert_eq!(stack.pop(), Ok(4));
        assert_eq!(stack.pop(), Ok(3));
        assert_eq!(stack.pop(), Ok(5));
        assert_eq!(
            stack.pop(),
            Err(CollectionError::EmptyContainer {
                container: "Stack",
                operation: "pop"
            })
        );
        stack.dispose().unwrap();
    }

    #[test]
    fn try_variants_report_absence() {
        let mut stack = Stack::<u8>::new(2, AllocatorTag::Temp).unwrap();
        assert_eq!(stack.try_pop(), Ok(None));
        assert_eq!(stack.try_peek(), Ok(None));
        assert!(stack.peek().is_err());
        stack.push(1).unwrap();
        assert_eq!(stack.try_peek(), Ok(Some(1)));
        assert_eq!(stack.try_pop(), Ok(Some(1)));
        stack.dispose().unwrap();
    }

    #[test]
    fn push_no_grow_respects_capacity() {
        let arena = Arc::new(SystemArena::new());
        let mut stack = stack_on(&arena, 1);
        stack.push_no_grow(1).unwrap();
        let err = stack.push_no_grow(2).unwrap_err();
        assert!(err.is_retryable());
        stack.reserve(1).unwrap();
        stack.push_no_grow(2).unwrap();
        assert_eq!(stack.to_vec(), Ok(vec![1, 2]));
        stack.dispose().unwrap();
        assert!(arena.is_quiescent());
    }

    #[test]
    fn contains_and_clear() {
        let mut stack = Stack::new(4, AllocatorTag::Persistent).unwrap();
        stack.push(10).unwrap();
        stack.push(20).unwrap();
        assert_eq!(stack.contains(&20), Ok(true));
        assert_eq!(stack.contains(&30), Ok(false));
        stack.clear().unwrap();
        assert_eq!(stack.len(), Ok(0));
        assert_eq!(stack.capacity(), Ok(4));
        stack.dispose().unwrap();
    }

    #[test]
    fn set_capacity_below_len_is_rejected() {
        let mut stack = Stack::new(4, AllocatorTag::Temp).unwrap();
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        assert!(matches!(
            stack.set_capacity(1),
            Err(CollectionError::InvalidArgument { .. })
        ));
        stack.dispose().unwrap();
    }

    #[test]
    fn parallel_writer_fills_reserved_slots() {
        let arena = Arc::new(SystemArena::new());
        let mut stack = stack_on(&arena, 3);
        {
            let writer = stack.as_parallel_writer().unwrap();
            writer.push_no_resize(1).unwrap();
            writer.push_no_resize(2).unwrap();
            writer.push_no_resize(3).unwrap();
            assert_eq!(
                writer.push_no_resize(4),
                Err(CollectionError::capacity_exceeded(4, 3))
            );
        }
        assert_eq!(stack.len(), Ok(3));
        assert_eq!(stack.to_vec(), Ok(vec![1, 2, 3]));
        stack.dispose().unwrap();
    }

    #[test]
    fn to_array_copies_bottom_to_top() {
        let arena = Arc::new(SystemArena::new());
        let mut stack = stack_on(&arena, 0);
        stack.push(7).unwrap();
        stack.push(8).unwrap();
        let mut array = stack.to_array(AllocatorTag::Temp).unwrap();
        assert_eq!(array.to_vec(), Ok(vec![7, 8]));
        array.dispose().unwrap();
        stack.dispose().unwrap();
        assert!(arena.is_quiescent());
    }

    #[cfg(any(debug_assertions, feature = "safety-checks"))]
    #[test]
    fn detached_writer_blocks_owner_access() {
        let mut stack = Stack::<u32>::new(4, AllocatorTag::TempJob).unwrap();
        let writer = unsafe { stack.as_parallel_writer_unchecked() }.unwrap();
        writer.push_no_resize(1).unwrap();
        assert!(matches!(
            stack.len(),
            Err(CollectionError::ConcurrentAccess { .. })
        ));
        assert!(matches!(
            stack.dispose(),
            Err(CollectionError::ConcurrentAccess { .. })
        ));
        drop(writer);
        assert_eq!(stack.pop(), Ok(1));
        stack.dispose().unwrap();
    }
}
