//! # Memory Allocators
//!
//! ## HeapAllocator
//! - One list of chunks partitioning a contiguous region
//! - First-fit allocation, split when the remainder can hold a chunk
//! - Immediate coalescing on free (predecessor first, then successor)
//! - O(live chunks) per call
//!
//! ## LockedHeap / ActiveHeap
//! - `LockedHeap`: a `spin::Mutex` around an optional `HeapAllocator`
//! - `ActiveHeap`: the `GlobalAlloc` front end; forwards to whichever
//!   `LockedHeap` is installed in its registry and fails cleanly before one is
//!
//! ## Core Utilities
//!
//! - `HeapError`: Allocation failure types
//! - Alignment helpers: `align_up`, `align_down`

mod core;
pub mod free_list;
pub mod global;

pub use self::core::HeapError;
pub use free_list::{ChunkInfo, HeapAllocator, HeapStats, CHUNK_ALIGN, HEADER_SIZE};
pub use global::{ActiveHeap, LockedHeap};
