//! # hallocator - A Hybrid sbrk/mmap Memory Allocator
//!
//! This crate provides a general-purpose dynamic memory allocator that
//! manages two kernel memory sources behind one block registry: the program
//! break for small requests and anonymous mappings for large ones.
//!
//! ## Overview
//!
//! ```text
//!   Request Routing:
//!
//!                      allocate(size)
//!                            │
//!           align!(size + META_SIZE) vs 128 KiB
//!            ┌───────────────┴────────────────┐
//!      small │                                │ large
//!            ▼                                ▼
//!   ┌──────────────────────┐      ┌──────────────────────┐
//!   │    PROGRAM BREAK     │      │  ANONYMOUS MAPPING   │
//!   │                      │      │                      │
//!   │  best-fit reuse of   │      │  one mapping per     │
//!   │  freed blocks,       │      │  block, munmap'ed    │
//!   │  splitting and       │      │  wholesale on free   │
//!   │  coalescing          │      │                      │
//!   └──────────────────────┘      └──────────────────────┘
//! ```
//!
//! All blocks live in a single intrusive singly-linked registry in order of
//! acquisition. The heap side never returns memory to the kernel; freed
//! blocks become best-fit candidates instead, and the very first heap use
//! preallocates a full 128 KiB chunk.
//!
//! ## Crate Structure
//!
//! ```text
//!   hallocator
//!   ├── align    - alignment macro (align!) and the ALIGNMENT unit
//!   ├── block    - block header and status (internal)
//!   ├── os       - kernel backing: sbrk/mmap/munmap/sysconf wrappers
//!   ├── hybrid   - HybridAllocator engine
//!   └── sync     - SharedAllocator, a locked wrapper around the engine
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hallocator::HybridAllocator;
//!
//! fn main() {
//!     let mut allocator = HybridAllocator::new();
//!
//!     unsafe {
//!         let ptr = allocator.allocate(64) as *mut u64;
//!         *ptr = 42;
//!
//!         let bigger = allocator.reallocate(ptr as *mut u8, 128);
//!         allocator.free(bigger);
//!     }
//! }
//! ```
//!
//! ## The Four Operations
//!
//! | Operation                   | Behavior                                  |
//! |-----------------------------|-------------------------------------------|
//! | `allocate(size)`            | 8-aligned uninitialized memory, or null   |
//! | `zero_allocate(n, size)`    | `n * size` zero-filled bytes, or null     |
//! | `reallocate(ptr, size)`     | in-place where possible, else move + copy |
//! | `free(ptr)`                 | reuse (heap) or unmap (mapped)            |
//!
//! Degenerate requests (zero sizes, null pointers) return null or do
//! nothing; they never fail. A failing backing syscall aborts the process
//! after logging, because the registry cannot be trusted afterwards.
//!
//! ## Limitations
//!
//! - **Single-threaded engine**: use [`SharedAllocator`] to share one
//!   instance; there is no finer-grained synchronization.
//! - **Fixed 8-byte alignment**: larger alignment requirements are not
//!   supported.
//! - **The break only grows**: freed heap memory is recycled, not returned.
//! - **Unix-only**: requires `sbrk`, `mmap` and `sysconf`.
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management.
//! All allocation and deallocation operations require `unsafe` blocks.

pub mod align;
mod block;
mod hybrid;
mod os;
mod sync;

pub use align::ALIGNMENT;
pub use block::{BlockStatus, META_SIZE};
pub use hybrid::{print_alloc, HybridAllocator, LARGE_ALLOC_LIMIT};
pub use os::BackingError;
pub use sync::SharedAllocator;
