//! # Hybrid Allocator
//!
//! A general-purpose allocator that manages two kernel memory sources behind
//! one block registry: the program break for small requests and anonymous
//! mappings for large ones.
//!
//! ## Memory Layout
//!
//! Every allocation is a *block*: an 8-aligned header followed by its
//! payload. Blocks are linked into a single registry in order of
//! acquisition, regardless of which source backs them.
//!
//! ```text
//!                    Single Block
//!  ┌──────────────────┬─────────────────────────┐
//!  │   BlockHeader    │       User Data         │
//!  ├──────────────────┼─────────────────────────┤
//!  │ size: usize      │                         │
//!  │ status: enum     │  [ round8(N) bytes ]    │
//!  │ next: *mut       │                         │
//!  └──────────────────┴─────────────────────────┘
//!  ▲                  ▲
//!  │                  └── Pointer returned to the user
//!  └── header, META_SIZE bytes
//! ```
//!
//! ## Size-Class Routing
//!
//! A request of rounded total size `align!(size + META_SIZE)` goes to the
//! heap when strictly below a threshold, and to its own mapping otherwise:
//!
//! ```text
//!                         align!(size + META_SIZE)
//!                                   │
//!                    < threshold    │    >= threshold
//!              ┌────────────────────┴───────────────────┐
//!              ▼                                        ▼
//!       program break (sbrk)                 anonymous mapping (mmap)
//!       reusable, split, merged              never split, never reused,
//!                                            munmap'ed on free
//! ```
//!
//! The threshold is 128 KiB ([`LARGE_ALLOC_LIMIT`]) for `allocate` and
//! `reallocate`, and the system page size for `zero_allocate`: freshly
//! mapped pages are already zero-filled by the kernel, so routing
//! page-sized zeroed requests through mappings keeps the fill cheap.
//!
//! ## Heap Strategy
//!
//! The first heap extension ever grabs a full 128 KiB chunk and immediately
//! carves the surplus into a free block, so small programs never touch the
//! break again:
//!
//! ```text
//!   allocate(100) as the very first heap use:
//!
//!   ┌───────────────┬───────────────────────────────────────────┐
//!   │ [104] ALLOC   │ [130920] FREE                             │
//!   └───────────────┴───────────────────────────────────────────┘
//!   ◄──────────────────────── 128 KiB ──────────────────────────►
//! ```
//!
//! Freed heap blocks are reused through a best-fit scan, split when they
//! are comfortably too large, and adjacent free neighbours are merged by a
//! forward sweep. Freed heap memory is never returned to the kernel; the
//! break only ever moves up.

use std::ptr;

use crate::align;
use crate::block::{BlockHeader, BlockStatus, META_SIZE};
use crate::os::{self, OrDie};

/// Routing threshold between heap and mapped backing for `allocate` and
/// `reallocate`, and the size of the one-shot heap preallocation.
pub const LARGE_ALLOC_LIMIT: usize = 128 * 1024;

/// Smallest residue worth carving into a block of its own: a header plus at
/// least one aligned payload byte.
const MIN_SPLIT: usize = align!(1 + META_SIZE);

/// Debug helper that prints allocation information.
///
/// Outputs the request size, the returned address, and the current program
/// break position.
///
/// # Example Output
///
/// ```text
/// Allocated 64 bytes, address = 0x5555557a1040, program break = 0x5555557c1000
/// ```
pub unsafe fn print_alloc(
  size: usize,
  addr: *mut u8,
) {
  println!(
    "Allocated {} bytes, address = {:?}, program break = {:?}",
    size,
    addr,
    unsafe { os::current_break() },
  );
}

/// An allocator routing requests between the program break and anonymous
/// mappings, with best-fit reuse of freed heap blocks.
///
/// # Registry
///
/// All blocks ever obtained are tracked in a singly-linked list in
/// acquisition order. Heap blocks cycle between `Alloc` and `Free`; mapped
/// blocks stay `Mapped` until they are unlinked and unmapped.
///
/// ```text
///   ┌─────────────────────────────────────────────────────────────┐
///   │                     HybridAllocator                         │
///   │                                                             │
///   │  first_block ──► [104 ALLOC] ─► [56 FREE] ─► [200048 MAPPED]│
///   │  global_head ──► (list anchor, same block as first_block)   │
///   │  first_alloc: false (preallocation already happened)        │
///   └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
///
/// This type is **not** thread-safe; all operations take `&mut self`. Wrap
/// it in [`SharedAllocator`](crate::SharedAllocator) to share one instance.
///
/// # Safety
///
/// The allocator hands out raw pointers. Callers must not use a payload
/// after freeing it and must not free the same pointer twice.
pub struct HybridAllocator {
  /// Anchor of the registry. Cleared only when the registry empties.
  global_head: *mut BlockHeader,

  /// Head of the list used for traversal, search and coalescing.
  first_block: *mut BlockHeader,

  /// Whether the one-shot 128 KiB heap preallocation is still pending.
  first_alloc: bool,
}

impl HybridAllocator {
  /// Creates a new, empty allocator.
  ///
  /// No memory is requested from the kernel until the first allocation.
  pub const fn new() -> Self {
    Self {
      global_head: ptr::null_mut(),
      first_block: ptr::null_mut(),
      first_alloc: true,
    }
  }

  /// Allocates `size` bytes of uninitialized memory.
  ///
  /// Returns an 8-aligned pointer to `size` (actually `align!(size)`)
  /// usable bytes, or null when `size` is 0.
  ///
  /// # Allocation Strategy
  ///
  /// ```text
  ///   1. Empty registry        -> create a block (first use: preallocate)
  ///   2. Best-fit free block   -> reuse, splitting off the surplus
  ///   3. Free block at tail    -> extend the break by the deficit
  ///   4. Otherwise             -> create a block (heap or mapping)
  /// ```
  ///
  /// # Safety
  ///
  /// The returned memory is only valid until passed to [`free`] or
  /// [`reallocate`]. See the type-level safety notes.
  ///
  /// [`free`]: HybridAllocator::free
  /// [`reallocate`]: HybridAllocator::reallocate
  pub unsafe fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    if size == 0 {
      return ptr::null_mut();
    }
    unsafe { self.handle_alloc(size, LARGE_ALLOC_LIMIT) }
  }

  /// Allocates zero-filled memory for `count` objects of `size` bytes each.
  ///
  /// Returns null when either argument is 0 or when `count * size`
  /// overflows. Requests of a page or more are routed through mappings,
  /// where the kernel already guarantees zero-filled pages.
  ///
  /// # Safety
  ///
  /// Same contract as [`allocate`](HybridAllocator::allocate).
  pub unsafe fn zero_allocate(
    &mut self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    if count == 0 || size == 0 {
      return ptr::null_mut();
    }
    let Some(total) = count.checked_mul(size) else {
      return ptr::null_mut();
    };

    let page = os::page_size().or_die();
    let address = unsafe { self.handle_alloc(total, page) };

    // Reused heap blocks carry old payload bytes.
    unsafe { ptr::write_bytes(address, 0, total) };
    address
  }

  /// Resizes the allocation at `address` to `size` bytes.
  ///
  /// # Decision Table
  ///
  /// ```text
  ///   address is null                  -> allocate(size)
  ///   size == 0                        -> free(address), null
  ///   block already freed              -> null
  ///   align!(size) == current size     -> no-op
  ///   backing class would change,      -> allocate + copy + free
  ///     or the block is mapped
  ///   shrink within the block          -> split off the residue in place
  ///   block is the heap tail           -> extend the break by the deficit
  ///   next block is free and fits      -> absorb it, split back down
  ///   otherwise                        -> allocate + copy + free
  /// ```
  ///
  /// # Safety
  ///
  /// `address` must be null or a live payload pointer from this allocator.
  pub unsafe fn reallocate(
    &mut self,
    address: *mut u8,
    size: usize,
  ) -> *mut u8 {
    if address.is_null() {
      return unsafe { self.allocate(size) };
    }
    if size == 0 {
      unsafe { self.free(address) };
      return ptr::null_mut();
    }

    unsafe {
      let block = BlockHeader::from_payload(address);

      if (*block).status == BlockStatus::Free {
        log::warn!("reallocate of already freed block at {:?}", block);
        return ptr::null_mut();
      }

      let current = (*block).size;
      let rounded = align!(size);

      if rounded == current {
        return address;
      }

      // Mapped blocks are never split, merged or grown in place; any real
      // size change relocates them, as does a heap/mapped class switch.
      if self.crosses_class(block, size) || (*block).status == BlockStatus::Mapped {
        return self.relocate(block, address, size);
      }

      if current >= rounded {
        if current - rounded >= MIN_SPLIT {
          self.split_block(block, rounded);
          self.coalesce();
        }
        return address;
      }

      if (*block).next.is_null()
        && (*block).status == BlockStatus::Alloc
        && rounded < LARGE_ALLOC_LIMIT
      {
        // The block is the registry tail, so it ends at the break.
        os::heap_extend(rounded - current).or_die();
        (*block).size = rounded;
        return address;
      }

      self.coalesce();
      let next = (*block).next;
      if !next.is_null()
        && (*next).status == BlockStatus::Free
        && current + META_SIZE + (*next).size >= rounded
      {
        (*block).size = current + META_SIZE + (*next).size;
        (*block).next = (*next).next;
        if (*block).size - rounded >= MIN_SPLIT {
          self.split_block(block, rounded);
        }
        return address;
      }

      self.relocate(block, address, size)
    }
  }

  /// Releases the allocation at `address`.
  ///
  /// Heap blocks are marked free and become candidates for reuse; the
  /// registry is then re-coalesced. Mapped blocks are unlinked from the
  /// registry and returned to the kernel wholesale.
  ///
  /// A null `address` is a no-op. Double frees are undefined.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live payload pointer from this allocator.
  /// The payload must not be accessed afterwards.
  pub unsafe fn free(
    &mut self,
    address: *mut u8,
  ) {
    if address.is_null() {
      return;
    }

    unsafe {
      let block = BlockHeader::from_payload(address);

      if (*block).status == BlockStatus::Mapped {
        self.detach(block);
        let len = (*block).size + META_SIZE;
        log::debug!("unmapping {} bytes at {:?}", len, block);
        os::unmap_region(block as *mut u8, len).or_die();
        // Bridging over the mapped block can put two free heap
        // neighbours next to each other.
        self.coalesce();
      } else {
        (*block).status = BlockStatus::Free;
        self.coalesce();
      }
    }
  }

  /// Serves a request against the registry, creating backing on demand.
  unsafe fn handle_alloc(
    &mut self,
    size: usize,
    threshold: usize,
  ) -> *mut u8 {
    unsafe {
      let rounded = align!(size);

      if self.global_head.is_null() {
        let block = self.create_block(ptr::null_mut(), size, threshold);
        self.carve_surplus(block, rounded);
        self.global_head = block;
        self.first_block = block;
        return BlockHeader::payload(block);
      }

      let (found, previous) = self.seek_free_block(size);

      if !found.is_null() {
        if (*found).size - rounded >= MIN_SPLIT {
          self.split_block(found, rounded);
        }
        (*found).status = BlockStatus::Alloc;
        return BlockHeader::payload(found);
      }

      if (*previous).status == BlockStatus::Free {
        // The registry tail is a free heap block ending at the break:
        // extend the break by the deficit and take ownership.
        os::heap_extend(rounded - (*previous).size).or_die();
        (*previous).size = rounded;
        (*previous).status = BlockStatus::Alloc;
        return BlockHeader::payload(previous);
      }

      let block = self.create_block(previous, size, threshold);
      self.carve_surplus(block, rounded);
      BlockHeader::payload(block)
    }
  }

  /// Obtains backing for a new block and links it after `predecessor`.
  ///
  /// Requests whose rounded total stays below `threshold` extend the
  /// program break; everything else gets its own anonymous mapping. The
  /// very first heap extension grabs [`LARGE_ALLOC_LIMIT`] bytes at once.
  unsafe fn create_block(
    &mut self,
    predecessor: *mut BlockHeader,
    size: usize,
    threshold: usize,
  ) -> *mut BlockHeader {
    unsafe {
      let total = align!(size + META_SIZE);
      let block;

      if total < threshold {
        if self.first_alloc {
          log::debug!("first heap use: preallocating {} bytes", LARGE_ALLOC_LIMIT);
          block = os::heap_extend(LARGE_ALLOC_LIMIT).or_die() as *mut BlockHeader;
          (*block).size = LARGE_ALLOC_LIMIT - META_SIZE;
          self.first_alloc = false;
        } else {
          block = os::heap_extend(total).or_die() as *mut BlockHeader;
          (*block).size = align!(size);
        }
        (*block).status = BlockStatus::Alloc;
      } else {
        log::debug!("mapping {} bytes", total);
        block = os::map_region(total).or_die() as *mut BlockHeader;
        (*block).size = align!(size);
        (*block).status = BlockStatus::Mapped;
      }

      (*block).next = ptr::null_mut();
      if !predecessor.is_null() {
        (*predecessor).next = block;
      }
      block
    }
  }

  /// Splits the preallocation surplus off a freshly created heap block so
  /// the remainder is reusable immediately.
  unsafe fn carve_surplus(
    &mut self,
    block: *mut BlockHeader,
    rounded: usize,
  ) {
    unsafe {
      if (*block).status != BlockStatus::Alloc {
        return;
      }
      if (*block).size > rounded && (*block).size - rounded >= MIN_SPLIT {
        self.split_block(block, rounded);
      }
    }
  }

  /// Best-fit scan over the registry.
  ///
  /// Runs coalescing first, then returns the smallest free block whose size
  /// fits the rounded request (ties broken by list order) together with the
  /// last block visited, i.e. the registry tail.
  ///
  /// ```text
  ///   Looking for 100 bytes:
  ///
  ///   [64 ALLOC] ─► [128 FREE] ─► [200 FREE] ─► [50 FREE]
  ///                      ▲
  ///                      └── best fit (128 is the smallest >= 100)
  /// ```
  unsafe fn seek_free_block(
    &mut self,
    size: usize,
  ) -> (*mut BlockHeader, *mut BlockHeader) {
    unsafe {
      self.coalesce();

      let rounded = align!(size);
      let mut current = self.first_block;
      let mut previous = self.global_head;
      let mut best: *mut BlockHeader = ptr::null_mut();
      let mut best_size = usize::MAX;

      while !current.is_null() {
        if (*current).status == BlockStatus::Free
          && (*current).size >= rounded
          && (*current).size < best_size
        {
          best = current;
          best_size = (*current).size;
        }
        previous = current;
        current = (*current).next;
      }

      (best, previous)
    }
  }

  /// Forward sweep merging adjacent free heap blocks.
  ///
  /// The right-hand operand is absorbed into the left and the same position
  /// is re-examined, so runs of free blocks collapse in one pass:
  ///
  /// ```text
  ///   before: [A FREE] ─► [B FREE] ─► [C FREE] ─► [D ALLOC]
  ///   after:  [A+B+C FREE] ─► [D ALLOC]
  /// ```
  ///
  /// Free neighbours in the registry are always physically adjacent:
  /// splitting creates them that way and heap blocks are linked in break
  /// order. Mapped blocks never carry the `Free` status, so they never
  /// participate.
  unsafe fn coalesce(&mut self) {
    unsafe {
      let mut block = self.first_block;

      while !block.is_null() && !(*block).next.is_null() {
        let next = (*block).next;

        if (*block).status == BlockStatus::Free && (*next).status == BlockStatus::Free {
          (*block).size += META_SIZE + (*next).size;
          (*block).next = (*next).next;

          debug_assert!(block != (*block).next, "registry cycle after merge");
        } else {
          block = next;
        }
      }
    }
  }

  /// Carves the suffix of `block` into a new free block.
  ///
  /// ```text
  ///   before: ┌────────┬──────────────────────────────┐
  ///           │ header │  size bytes ... surplus ...  │
  ///           └────────┴──────────────────────────────┘
  ///   after:  ┌────────┬────────────┬────────┬────────┐
  ///           │ header │ size bytes │ header │ FREE   │
  ///           └────────┴────────────┴────────┴────────┘
  /// ```
  ///
  /// `size` must already be rounded and the residue must hold at least
  /// [`MIN_SPLIT`] bytes.
  unsafe fn split_block(
    &mut self,
    block: *mut BlockHeader,
    size: usize,
  ) {
    unsafe {
      let remainder = (block as *mut u8).add(align!(size + META_SIZE)) as *mut BlockHeader;

      (*remainder).size = (*block).size - size - META_SIZE;
      (*remainder).status = BlockStatus::Free;
      (*remainder).next = (*block).next;

      (*block).next = remainder;
      (*block).size = size;
    }
  }

  /// Whether resizing `block` to `size` bytes lands in the other backing
  /// class: a mapped block shrinking below the limit, or a heap block
  /// growing to it.
  unsafe fn crosses_class(
    &self,
    block: *mut BlockHeader,
    size: usize,
  ) -> bool {
    let required = align!(size + META_SIZE);
    let status = unsafe { (*block).status };

    (status == BlockStatus::Mapped && required < LARGE_ALLOC_LIMIT)
      || (status == BlockStatus::Alloc && required >= LARGE_ALLOC_LIMIT)
  }

  /// Fallback reallocation: fresh block, payload copy, free the original.
  unsafe fn relocate(
    &mut self,
    block: *mut BlockHeader,
    address: *mut u8,
    size: usize,
  ) -> *mut u8 {
    unsafe {
      // size is non-zero here and backing failures abort, so this cannot
      // return null.
      let fresh = self.allocate(size);
      let preserved = (*block).size.min(align!(size));

      ptr::copy_nonoverlapping(address, fresh, preserved);
      self.free(address);
      fresh
    }
  }

  /// Unlinks `block` from the registry.
  ///
  /// When the block is the list head, both anchors advance; otherwise its
  /// predecessor is found by walking the list and bridged over it.
  unsafe fn detach(
    &mut self,
    block: *mut BlockHeader,
  ) {
    unsafe {
      if block == self.first_block {
        self.first_block = (*block).next;
        self.global_head = self.first_block;
        return;
      }

      let mut current = self.first_block;
      while !current.is_null() && (*current).next != block {
        current = (*current).next;
      }
      if !current.is_null() {
        (*current).next = (*block).next;
      }
    }
  }
}

impl Default for HybridAllocator {
  fn default() -> Self {
    Self::new()
  }
}
