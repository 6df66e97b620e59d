//! Fixed-shape N-dimensional array
//!
//! Elements are stored row-major in one [`RawBuffer`]; an index maps to a
//! flat offset as `sum(index[k] * stride[k])`. The shape is fixed at
//! construction and every element is initialized up front.

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;

use crate::allocator::{self, AllocatorTag, SharedAllocator};
use crate::buffer::RawBuffer;
use crate::config::ContainerConfig;
use crate::dispose::{Dispose, DisposeState, OwnedBuffer};
use crate::error::{CollectionError, CollectionResult};
use crate::job::{JobHandle, JobScheduler};

const NAME: &str = "NdArray";

/// Row-major array with `D` dimensions of `Copy` elements
pub struct NdArray<T: Copy, const D: usize> {
    core: OwnedBuffer,
    shape: [usize; D],
    strides: [usize; D],
    _marker: PhantomData<T>,
}

impl<T: Copy, const D: usize> NdArray<T, D> {
    /// Array of `shape` with every element set to `value`, on the system arena
    pub fn filled(shape: [usize; D], value: T, tag: AllocatorTag) -> CollectionResult<Self> {
        Self::filled_in(shape, value, tag, allocator::system(), &ContainerConfig::default())
    }

    /// [`NdArray::filled`] with an explicit allocator and memory policy
    pub fn filled_in(
        shape: [usize; D],
        value: T,
        tag: AllocatorTag,
        allocator: SharedAllocator,
        config: &ContainerConfig,
    ) -> CollectionResult<Self> {
        Self::build(shape, tag, allocator, config, |_| value)
    }

    /// Array of `shape` whose element at each index is `f(index)`
    pub fn from_fn(
        shape: [usize; D],
        tag: AllocatorTag,
        f: impl FnMut([usize; D]) -> T,
    ) -> CollectionResult<Self> {
        Self::build(shape, tag, allocator::system(), &ContainerConfig::default(), f)
    }

    fn build(
        shape: [usize; D],
        tag: AllocatorTag,
        allocator: SharedAllocator,
        config: &ContainerConfig,
        mut f: impl FnMut([usize; D]) -> T,
    ) -> CollectionResult<Self> {
        let (len, strides) = layout_of(&shape)?;
        let mut buffer = RawBuffer::allocate(Layout::new::<T>(), len, tag, allocator, config)?;

        let mut index = [0usize; D];
        for _ in 0..len {
            let value = f(index);
            // SAFETY: the buffer was allocated for T with room for `len` elements.
            unsafe { buffer.add_no_grow(value)? };
            advance(&mut index, &shape);
        }

        Ok(Self {
            core: OwnedBuffer::new(NAME, buffer),
            shape,
            strides,
            _marker: PhantomData,
        })
    }

    /// Extent of each dimension
    pub fn shape(&self) -> [usize; D] {
        self.shape
    }

    /// Total number of elements, fixed by the shape
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether the shape has a zero extent
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at a multi-dimensional index
    pub fn get(&self, index: [usize; D]) -> CollectionResult<T> {
        let buffer = self.core.buffer()?;
        let offset = row_major_offset(&self.shape, &self.strides, index)?;
        // SAFETY: offset < len and every slot was initialized at construction.
        Ok(unsafe { buffer.read(offset) })
    }

    /// Overwrites the element at a multi-dimensional index
    pub fn set(&mut self, index: [usize; D], value: T) -> CollectionResult<()> {
        let buffer = self.core.buffer_mut()?;
        let offset = row_major_offset(&self.shape, &self.strides, index)?;
        // SAFETY: offset < len <= capacity, element type matches the layout.
        unsafe { buffer.write(offset, value) };
        Ok(())
    }

    /// Element at a flat row-major offset
    pub fn get_flat(&self, offset: usize) -> CollectionResult<T> {
        let buffer = self.core.buffer()?;
        if offset >= buffer.len() {
            return Err(CollectionError::index_out_of_range(offset, buffer.len()));
        }
        // SAFETY: bounds checked above.
        Ok(unsafe { buffer.read(offset) })
    }

    /// Overwrites the element at a flat row-major offset
    pub fn set_flat(&mut self, offset: usize, value: T) -> CollectionResult<()> {
        let buffer = self.core.buffer_mut()?;
        if offset >= buffer.len() {
            return Err(CollectionError::index_out_of_range(offset, buffer.len()));
        }
        // SAFETY: bounds checked above.
        unsafe { buffer.write(offset, value) };
        Ok(())
    }

    /// Copy of every element in row-major order
    pub fn to_vec(&self) -> CollectionResult<Vec<T>> {
        let buffer = self.core.buffer()?;
        // SAFETY: the buffer holds T.
        Ok(unsafe { buffer.as_slice::<T>() }.to_vec())
    }
}

impl<T: Copy> NdArray<T, 1> {
    /// One-dimensional array holding a copy of `values`
    pub fn from_slice_in(
        values: &[T],
        tag: AllocatorTag,
        allocator: SharedAllocator,
        config: &ContainerConfig,
    ) -> CollectionResult<Self> {
        Self::build([values.len()], tag, allocator, config, |[i]| values[i])
    }
}

impl<T: Copy, const D: usize> Dispose for NdArray<T, D> {
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

impl<T: Copy, const D: usize> fmt::Debug for NdArray<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdArray")
            .field("shape", &self.shape)
            .field("core", &self.core)
            .finish()
    }
}

/// Element count and row-major strides for `shape`
fn row_major_offset<const D: usize>(
    shape: &[usize; D],
    strides: &[usize; D],
    index: [usize; D],
) -> CollectionResult<usize> {
    let mut offset = 0;
    for ((&i, &extent), &stride) in index.iter().zip(shape).zip(strides) {
        if i >= extent {
            return Err(CollectionError::index_out_of_range(i, extent));
        }
        offset += i * stride;
    }
    Ok(offset)
}

fn layout_of<const D: usize>(shape: &[usize; D]) -> CollectionResult<(usize, [usize; D])> {
    let mut strides = [0usize; D];
    let mut len = 1usize;
    for k in (0..D).rev() {
        strides[k] = len;
        len = len.checked_mul(shape[k]).ok_or_else(|| {
            CollectionError::invalid_argument(format!("shape {shape:?} overflows usize"))
        })?;
    }
    Ok((len, strides))
}

/// Steps a row-major multi-index to the next position
fn advance<const D: usize>(index: &mut [usize; D], shape: &[usize; D]) {
    for k in (0..D).rev() {
        index[k] += 1;
        if index[k] < shape[k] {
            return;
        }
        index[k] = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_layout() {
        let array = NdArray::from_fn([2, 3], AllocatorTag::Temp, |[r, c]| r * 10 + c).unwrap();
        assert_eq!(array.shape(), [2, 3]);
        assert_eq!(array.len(), 6);
        assert_eq!(array.to_vec().unwrap(), vec![0, 1, 2, 10, 11, 12]);
        assert_eq!(array.get([1, 2]), Ok(12));
        assert_eq!(array.get_flat(4), Ok(11));
    }

    #[test]
    fn bounds_are_checked_per_dimension() {
        let mut array = NdArray::filled([2, 2, 2], 0u8, AllocatorTag::Temp).unwrap();
        assert_eq!(
            array.get([0, 2, 0]),
            Err(CollectionError::index_out_of_range(2, 2))
        );
        assert_eq!(
            array.set_flat(8, 1),
            Err(CollectionError::index_out_of_range(8, 8))
        );
        array.set([1, 1, 1], 9).unwrap();
        assert_eq!(array.get_flat(7), Ok(9));
    }

    #[test]
    fn zero_extent_is_empty() {
        let array = NdArray::<u32, 2>::filled([3, 0], 1, AllocatorTag::Temp).unwrap();
        assert!(array.is_empty());
        assert_eq!(array.to_vec().unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn overflowing_shape_is_rejected() {
        let result = NdArray::filled([usize::MAX, 2], 0u8, AllocatorTag::Temp);
        assert!(matches!(result, Err(CollectionError::InvalidArgument { .. })));
    }

    #[test]
    fn disposed_array_rejects_access() {
        let mut array = NdArray::filled([4], 1u16, AllocatorTag::Persistent).unwrap();
        array.dispose().unwrap();
        assert_eq!(
            array.get([0]),
            Err(CollectionError::UseAfterFree { container: NAME })
        );
        assert_eq!(
            array.dispose(),
            Err(CollectionError::DoubleFree { container: NAME })
        );
    }

    #[test]
    fn disposed_array_reports_use_after_free_before_bounds() {
        let mut array = NdArray::filled([2], 1u8, AllocatorTag::Temp).unwrap();
        array.dispose().unwrap();
        let uaf = CollectionError::UseAfterFree { container: NAME };
        assert_eq!(array.get([5]), Err(uaf.clone()));
        assert_eq!(array.set([5], 0), Err(uaf.clone()));
        assert_eq!(array.get_flat(5), Err(uaf));
    }
}
