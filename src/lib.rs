//! # segfit - A Segregated-Fits Memory Allocator
//!
//! This crate provides a general-purpose heap allocator that grows a single
//! contiguous heap region, by default with the `sbrk` system call, and keeps
//! freed blocks in 60 size-class free lists.
//!
//! ## Overview
//!
//! ```text
//!   Segregated Free Lists:
//!
//!   class    heads                       heap (address order)
//!   ┌────┐                               ┌────┬────┬──────┬────┬────────┬──┐
//!   │  1 │ ──► none                      │ A  │ f  │  A   │ f  │   f    │A │
//!   │  2 │ ──► f@0x40 ──► f@0x20 ─┤end   └────┴────┴──────┴────┴────────┴──┘
//!   │  3 │ ──► none                      ▲                                  ▲
//!   │ .. │                               base                             end
//!   │ 59 │ ──► f@0x1a0 ─┤end
//!   └────┘
//!
//!   A block's class is the position of its highest set bit, counted from bit 3.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segfit
//!   ├── align      - align! macro (16-byte rounding)
//!   ├── header     - Block header codec
//!   ├── class      - Size-class index
//!   ├── free_list  - Intrusive free lists, one per class
//!   ├── split      - Block splitter
//!   ├── coalesce   - Whole-heap coalescing pass and its trigger policy
//!   ├── heap       - Heap region bookkeeping and header access
//!   ├── extend     - Heap extension primitives (sbrk, mmap arena)
//!   ├── error      - Error types
//!   └── allocator  - SegFitAllocator facade
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segfit::SegFitAllocator;
//!
//! let mut allocator = SegFitAllocator::with_capacity(1 << 20).unwrap();
//!
//! let allocation = allocator.allocate(100).unwrap();
//! allocator.payload_mut(&allocation)[..5].copy_from_slice(b"hello");
//!
//! unsafe { allocator.free(allocation) };
//! ```
//!
//! ## How It Works
//!
//! Each block carries a 16-byte header:
//!
//! ```text
//!   ┌──────────────────────────────┬──────────────────────────────────┐
//!   │        Block Header          │           Payload                │
//!   │  ┌────────────────────────┐  │                                  │
//!   │  │ size | allocated bit   │  │                                  │
//!   │  │ next free | end bit    │  │     size - 16 bytes usable       │
//!   │  └────────────────────────┘  │                                  │
//!   │          16 bytes            │                                  │
//!   └──────────────────────────────┴──────────────────────────────────┘
//!                                  ▲
//!                                  └── address handed to the caller
//! ```
//!
//! - **Allocate**: search the request's own class first-fit; otherwise split
//!   the head of the next non-empty larger class; otherwise grow the heap.
//! - **Free**: push the block onto its class list. Nothing is merged yet.
//! - **Coalesce**: once at least 50 blocks exist and one in eight is free, the
//!   next allocation walks the heap, merges adjacent free blocks and rebuilds
//!   every list.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **No realloc, no shrinking**: The heap only grows
//! - **16-byte alignment only**
//! - **No double-free detection**: Freeing is `unsafe` for a reason
//! - **Unix-only**: Requires `libc` for `sbrk` and `mmap`

pub mod align;
mod allocator;
pub mod class;
mod coalesce;
mod error;
pub mod extend;
mod free_list;
pub mod header;
mod heap;
mod split;

pub use allocator::{Allocation, BlockInfo, HeapStats, SegFitAllocator};
pub use class::{CLASS_COUNT, class_of};
pub use coalesce::CoalescePolicy;
pub use error::{ExtendError, HeapError};
pub use extend::{HeapExtend, MmapArena, Sbrk};
pub use header::{GRANULE, HEADER_SIZE, aligned_size};
