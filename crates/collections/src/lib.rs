//! # nebula-collections
//!
//! Manually allocated containers for Nebula's job-scheduled execution model.
//!
//! Every container keeps its elements in a [`RawBuffer`] obtained from a
//! [`TaggedAllocator`] and is released explicitly, either right away or as a
//! scheduled job that runs once the work still using the memory completes.
//!
//! - [`Stack`]: LIFO stack with a lock-free [`ParallelWriter`] append view
//! - [`Heap`]: binary min-heap of `(value, priority)` entries
//! - [`NdArray`]: fixed-shape row-major N-dimensional array
//! - [`ValueCell`]: a single value
//!
//! ## Quick Start
//!
//! ```rust
//! use nebula_collections::prelude::*;
//!
//! fn main() -> CollectionResult<()> {
//!     let mut heap = Heap::new(8, AllocatorTag::TempJob)?;
//!     for priority in [6, 1, 4, 2, 5] {
//!         heap.push(priority, priority)?;
//!     }
//!     assert_eq!(heap.pop()?.priority, 1);
//!
//!     // Free the memory once everything scheduled before it has finished
//!     let done = heap.dispose_deferred(&JobHandle::completed(), &InlineScheduler)?;
//!     InlineScheduler.complete(&done);
//!     assert_eq!(heap.state(), DisposeState::Freed);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured events through `tracing`
//! - `safety-checks`: keep use-after-free and concurrent-access checks in
//!   release builds (always on with `debug_assertions`)

#![cfg_attr(docsrs, feature(doc_cfg))]
// Containers manage raw memory; every unsafe block carries a SAFETY note.
#![allow(unsafe_code)]
#![warn(rust_2018_idioms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
// `len` returns a Result because it fails after disposal
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::inline_always)]
#![allow(clippy::double_must_use)]
#![allow(clippy::cast_ptr_alignment)]

// Error types
pub mod error;

// Memory
pub mod allocator;
pub mod buffer;
pub mod config;

// Lifetime management
pub mod dispose;
pub mod job;
pub mod safety;

// Containers
pub mod array;
pub mod cell;
pub mod heap;
pub mod stack;

pub use crate::allocator::{AllocatorTag, SharedAllocator, SystemArena, TaggedAllocator};
pub use crate::array::NdArray;
pub use crate::buffer::RawBuffer;
pub use crate::cell::ValueCell;
pub use crate::config::ContainerConfig;
pub use crate::dispose::{Dispose, DisposeJob, DisposeState};
pub use crate::error::{CollectionError, CollectionResult};
pub use crate::heap::{Heap, HeapEntry};
pub use crate::job::{InlineScheduler, JobHandle, JobScheduler, WorkerPool, WorkerPoolConfig};
pub use crate::stack::{ParallelWriter, Stack};

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::allocator::{AllocatorTag, SharedAllocator, TaggedAllocator};
    pub use crate::array::NdArray;
    pub use crate::cell::ValueCell;
    pub use crate::config::ContainerConfig;
    pub use crate::dispose::{Dispose, DisposeState};
    pub use crate::error::{CollectionError, CollectionResult};
    pub use crate::heap::{Heap, HeapEntry};
    pub use crate::job::{InlineScheduler, JobHandle, JobScheduler, WorkerPool};
    pub use crate::stack::{ParallelWriter, Stack};
}
