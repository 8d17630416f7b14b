use spin::Mutex;

use crate::hybrid::HybridAllocator;

/// A serialized handle around [`HybridAllocator`].
///
/// The engine itself is single-threaded and takes `&mut self`. This wrapper
/// adds the one process-wide lock so a single allocator value can be shared
/// between callers, e.g. from a `static`:
///
/// ```rust,ignore
/// use hallocator::SharedAllocator;
///
/// static ALLOCATOR: SharedAllocator = SharedAllocator::new();
///
/// unsafe {
///   let p = ALLOCATOR.allocate(64);
///   ALLOCATOR.free(p);
/// }
/// ```
///
/// Every operation holds the lock for its full duration, including
/// coalescing and any backing syscall.
pub struct SharedAllocator {
  engine: Mutex<HybridAllocator>,
}

// The raw registry pointers only ever touch memory owned by the engine, and
// the mutex serializes all access to them.
unsafe impl Send for SharedAllocator {}
unsafe impl Sync for SharedAllocator {}

impl SharedAllocator {
  /// Creates a new shared allocator; usable in `static` position.
  pub const fn new() -> Self {
    Self {
      engine: Mutex::new(HybridAllocator::new()),
    }
  }

  /// See [`HybridAllocator::allocate`].
  ///
  /// # Safety
  ///
  /// Same contract as the engine method.
  pub unsafe fn allocate(
    &self,
    size: usize,
  ) -> *mut u8 {
    unsafe { self.engine.lock().allocate(size) }
  }

  /// See [`HybridAllocator::zero_allocate`].
  ///
  /// # Safety
  ///
  /// Same contract as the engine method.
  pub unsafe fn zero_allocate(
    &self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    unsafe { self.engine.lock().zero_allocate(count, size) }
  }

  /// See [`HybridAllocator::reallocate`].
  ///
  /// # Safety
  ///
  /// Same contract as the engine method.
  pub unsafe fn reallocate(
    &self,
    address: *mut u8,
    size: usize,
  ) -> *mut u8 {
    unsafe { self.engine.lock().reallocate(address, size) }
  }

  /// See [`HybridAllocator::free`].
  ///
  /// # Safety
  ///
  /// Same contract as the engine method.
  pub unsafe fn free(
    &self,
    address: *mut u8,
  ) {
    unsafe { self.engine.lock().free(address) }
  }
}

impl Default for SharedAllocator {
  fn default() -> Self {
    Self::new()
  }
}
