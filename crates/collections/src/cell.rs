//! Single-value cell in unmanaged memory

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;

use crate::allocator::{self, AllocatorTag, SharedAllocator};
use crate::buffer::RawBuffer;
use crate::config::ContainerConfig;
use crate::dispose::{Dispose, DisposeState, OwnedBuffer};
use crate::error::CollectionResult;
use crate::job::{JobHandle, JobScheduler};

const NAME: &str = "ValueCell";

/// One `Copy` value in a one-slot buffer, with the container dispose protocol
///
/// Useful for handing a single result slot to a scheduled job and freeing it
/// once the job and its readers are done.
pub struct ValueCell<T: Copy> {
    core: OwnedBuffer,
    _marker: PhantomData<T>,
}

impl<T: Copy> ValueCell<T> {
    pub fn new(value: T, tag: AllocatorTag) -> CollectionResult<Self> {
        Self::new_in(value, tag, allocator::system(), &ContainerConfig::default())
    }

    pub fn new_in(
        value: T,
        tag: AllocatorTag,
        allocator: SharedAllocator,
        config: &ContainerConfig,
    ) -> CollectionResult<Self> {
        let mut buffer = RawBuffer::allocate(Layout::new::<T>(), 1, tag, allocator, config)?;
        // SAFETY: the buffer holds T and has one free slot.
        unsafe { buffer.add_no_grow(value)? };
        Ok(Self {
            core: OwnedBuffer::new(NAME, buffer),
            _marker: PhantomData,
        })
    }

    pub fn get(&self) -> CollectionResult<T> {
        let buffer = self.core.buffer()?;
        // SAFETY: slot 0 was initialized at construction.
        Ok(unsafe { buffer.read(0) })
    }

    pub fn set(&mut self, value: T) -> CollectionResult<()> {
        let buffer = self.core.buffer_mut()?;
        // SAFETY: capacity is one and the buffer holds T.
        unsafe { buffer.write(0, value) };
        Ok(())
    }

    /// Stores `value` and returns the previous one
    pub fn replace(&mut self, value: T) -> CollectionResult<T> {
        let buffer = self.core.buffer_mut()?;
        // SAFETY: slot 0 is initialized and the buffer holds T.
        let old = unsafe {
            let old = buffer.read(0);
            buffer.write(0, value);
            old
        };
        Ok(old)
    }
}

impl<T: Copy> Dispose for ValueCell<T> {
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

impl<T: Copy + fmt::Debug> fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCell")
            .field("value", &self.get().ok())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectionError;
    use crate::job::InlineScheduler;

    #[test]
    fn get_set_replace() {
        let mut cell = ValueCell::new(5i64, AllocatorTag::Temp).unwrap();
        assert_eq!(cell.get(), Ok(5));
        cell.set(8).unwrap();
        assert_eq!(cell.replace(13), Ok(8));
        assert_eq!(cell.get(), Ok(13));
        cell.dispose().unwrap();
    }

    #[test]
    fn deferred_dispose_blocks_further_use() {
        let mut cell = ValueCell::new(1u8, AllocatorTag::TempJob).unwrap();
        let handle = cell
            .dispose_deferred(&JobHandle::completed(), &InlineScheduler)
            .unwrap();
        assert!(handle.is_completed());
        assert_eq!(cell.state(), DisposeState::Freed);
        assert_eq!(
            cell.set(2),
            Err(CollectionError::UseAfterFree { container: NAME })
        );
    }
}
