//! Kernel backing for the allocator.
//!
//! Two memory sources exist: the program break, grown monotonically through
//! `sbrk(2)`, and per-block anonymous mappings obtained from `mmap(2)`.
//! Every wrapper reports failure as a [`BackingError`]. The engine treats
//! any such failure as fatal because the registry would otherwise describe
//! address space the process does not own.

use std::process;
use std::ptr;

use libc::{c_void, intptr_t};
use thiserror::Error;

/// Failure of one of the consumed kernel interfaces.
#[derive(Debug, Error)]
pub enum BackingError {
  #[error("program break extension by {requested} bytes failed")]
  BreakExhausted { requested: usize },
  #[error("anonymous mapping of {requested} bytes failed")]
  MapFailed { requested: usize },
  #[error("unmapping {len} bytes at {addr:#x} failed")]
  UnmapFailed { addr: usize, len: usize },
  #[error("page size query failed")]
  PageSizeUnavailable,
}

/// Extends the program break by `delta` bytes.
///
/// Returns the old break, i.e. the start of the newly usable region. Only
/// positive deltas are ever requested; freed heap memory stays with the
/// process.
pub unsafe fn heap_extend(delta: usize) -> Result<*mut u8, BackingError> {
  let old_break = unsafe { libc::sbrk(delta as intptr_t) };
  if old_break == usize::MAX as *mut c_void {
    return Err(BackingError::BreakExhausted { requested: delta });
  }
  Ok(old_break as *mut u8)
}

/// Current program break (`sbrk(0)`).
pub unsafe fn current_break() -> *mut u8 {
  unsafe { libc::sbrk(0) as *mut u8 }
}

/// Obtains a fresh private, anonymous, read-write mapping of `len` bytes.
pub unsafe fn map_region(len: usize) -> Result<*mut u8, BackingError> {
  let addr = unsafe {
    libc::mmap(
      ptr::null_mut(),
      len,
      libc::PROT_READ | libc::PROT_WRITE,
      libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
      -1,
      0,
    )
  };

  if addr == libc::MAP_FAILED {
    return Err(BackingError::MapFailed { requested: len });
  }
  Ok(addr as *mut u8)
}

/// Releases a mapping previously obtained from [`map_region`].
pub unsafe fn unmap_region(
  addr: *mut u8,
  len: usize,
) -> Result<(), BackingError> {
  let result = unsafe { libc::munmap(addr as *mut c_void, len) };
  if result == -1 {
    return Err(BackingError::UnmapFailed {
      addr: addr as usize,
      len,
    });
  }
  Ok(())
}

/// System page size, the routing threshold for zero-filled allocations.
pub fn page_size() -> Result<usize, BackingError> {
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
  if size < 0 {
    return Err(BackingError::PageSizeUnavailable);
  }
  Ok(size as usize)
}

/// Escalates a backing failure to process death.
///
/// The failure is logged before aborting so the diagnostic survives the
/// process.
pub(crate) trait OrDie<T> {
  fn or_die(self) -> T;
}

impl<T> OrDie<T> for Result<T, BackingError> {
  #[track_caller]
  fn or_die(self) -> T {
    match self {
      Ok(value) => value,
      Err(err) => {
        let location = std::panic::Location::caller();
        log::error!("{} @ {}", err, location);
        process::abort();
      }
    }
  }
}
