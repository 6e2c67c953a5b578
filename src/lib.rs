//! # tagalloc - A Boundary-Tag Heap Allocator
//!
//! This crate implements `malloc`/`free`/`realloc`/`calloc` style allocation
//! over a single contiguous arena that only grows upward. All bookkeeping lives
//! inside the managed bytes themselves: block sizes and flags in headers and
//! footers, free-list links in the payloads of free blocks.
//!
//! ## Overview
//!
//! ```text
//!   Arena Layout:
//!
//!   ┌─────┬───────────┬──────────┬──────────┬──────────┬─────┬──────────┐
//!   │ pad │ prologue  │ block A  │ block B  │ block C  │ ... │ epilogue │
//!   │     │ (16, a)   │ (free)   │ (alloc)  │ (free)   │     │ (0, a)   │
//!   └─────┴───────────┴──────────┴──────────┴──────────┴─────┴──────────┘
//!         ▲                                                  ▲
//!         │                                                  │
//!      Sentinel: never free                     Sentinel: rewritten on growth
//!
//!   Free List (LIFO, doubly linked through the free payloads):
//!
//!   head ──► C ⇄ A ──► null
//! ```
//!
//! Allocation is first fit over the free list. A chosen block is split when
//! the leftover can stand as a block of its own; freed blocks are merged with
//! free neighbours immediately, so no two free blocks ever touch.
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment constants and macros (align!, align_to!)
//!   ├── arena      - Growable backing stores (mmap, sbrk, fixed buffer)
//!   ├── block      - Header/footer encoding and neighbour arithmetic
//!   ├── config     - HeapConfig and environment overrides
//!   ├── error      - HeapError
//!   ├── free_list  - Explicit free list
//!   ├── global     - LockedHeap, a GlobalAlloc adapter
//!   └── heap       - Heap: placement, coalescing, public operations
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tagalloc::{Heap, HeapConfig, MmapArena};
//!
//! let arena = MmapArena::new(1 << 20).unwrap();
//! let mut heap = Heap::new(arena, HeapConfig::default()).unwrap();
//!
//! let ptr = heap.allocate(64);
//! assert!(!ptr.is_null());
//!
//! unsafe {
//!     let ptr = heap.resize(ptr, 256);
//!     heap.release(ptr);
//! }
//! ```
//!
//! ## Block Encoding
//!
//! ```text
//!   Header word:
//!   ┌───────────────────────────────────────────────┬──────┬───────┐
//!   │              size (multiple of 16)            │ prev │ alloc │
//!   └───────────────────────────────────────────────┴──────┴───────┘
//!                                                     bit 1   bit 0
//! ```
//!
//! Allocated blocks carry no footer. The `prev` bit tells the coalescer whether
//! the block before is free, and only then is that block's footer read.
//!
//! ## Limitations
//!
//! - **Single caller**: [`Heap`] takes `&mut self`; share it through
//!   [`LockedHeap`]
//! - **No shrinking**: memory is never handed back to the arena
//! - **Alignment**: at most 16 bytes
//! - **Unix-only**: the `mmap` and `sbrk` arenas need `libc`
//!
//! ## Safety
//!
//! Releasing or resizing takes a raw pointer and is `unsafe`. Foreign,
//! misaligned and already-free pointers are caught on a best-effort basis and
//! reported as [`HeapError`] by the `try_` forms.

pub mod align;
pub mod arena;
mod block;
pub mod config;
pub mod error;
mod free_list;
pub mod global;
pub mod heap;

pub use arena::{Arena, BufferArena, MmapArena, SbrkArena};
pub use block::MIN_BLOCK_SIZE;
pub use config::HeapConfig;
pub use error::HeapError;
pub use global::LockedHeap;
pub use heap::{Heap, HeapStats};
