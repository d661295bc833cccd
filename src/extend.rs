//! Heap extension primitives.
//!
//! The allocator only ever asks for one thing from the outside world: "move the
//! break forward by N bytes and tell me where it was". [`Sbrk`] answers with the
//! real process break, [`MmapArena`] with a private reservation.

use std::{marker::PhantomData, ptr::NonNull};

use libc::{c_void, intptr_t, sbrk};

use crate::error::ExtendError;

/// A monotonic heap extension primitive.
///
/// `extend(0)` queries the current end without growing.
///
/// # Safety
///
/// On success, `extend(n)` must return the previous end `p` such that
/// `p..p + n` is readable, writable, exclusively handed to the caller, and
/// stays valid for as long as the implementor lives. Consecutive successful
/// calls must return contiguous ranges unless something outside the caller
/// moved the break.
pub unsafe trait HeapExtend {
  fn extend(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, ExtendError>;
}

/// The process break, grown with `sbrk(2)`.
#[derive(Debug)]
pub struct Sbrk {
  _not_send: PhantomData<*mut ()>,
}

impl Sbrk {
  /// # Safety
  ///
  /// At most one `Sbrk` may be in use per process, and no other thread may
  /// move the break while it is. Other single-threaded break users (the
  /// platform `malloc`) are tolerated: the allocator detects the gap and
  /// refuses to grow across it.
  pub unsafe fn new() -> Self {
    Self {
      _not_send: PhantomData,
    }
  }
}

unsafe impl HeapExtend for Sbrk {
  fn extend(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, ExtendError> {
    let delta = intptr_t::try_from(increment).map_err(|_| ExtendError::new(increment))?;

    let address = unsafe { sbrk(delta) };

    if address == usize::MAX as *mut c_void {
      return Err(ExtendError::new(increment));
    }

    NonNull::new(address.cast::<u8>()).ok_or(ExtendError::new(increment))
  }
}

/// A private anonymous mapping used as a heap with its own break.
///
/// The whole capacity is reserved up front with `MAP_NORESERVE`, so untouched
/// pages cost nothing. Growth past the capacity fails like an exhausted break.
#[derive(Debug)]
pub struct MmapArena {
  start: NonNull<u8>,
  capacity: usize,
  brk: usize,
}

impl MmapArena {
  pub fn reserve(capacity: usize) -> std::io::Result<Self> {
    let address = unsafe {
      libc::mmap(
        std::ptr::null_mut(),
        capacity.max(1),
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
        -1,
        0,
      )
    };

    if address == libc::MAP_FAILED {
      return Err(std::io::Error::last_os_error());
    }

    let start = NonNull::new(address.cast::<u8>()).ok_or_else(std::io::Error::last_os_error)?;

    Ok(Self {
      start,
      capacity,
      brk: 0,
    })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.brk
  }
}

unsafe impl HeapExtend for MmapArena {
  fn extend(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, ExtendError> {
    if increment > self.capacity - self.brk {
      return Err(ExtendError::new(increment));
    }

    let previous = unsafe { self.start.add(self.brk) };
    self.brk += increment;

    Ok(previous)
  }
}

impl Drop for MmapArena {
  fn drop(&mut self) {
    unsafe {
      libc::munmap(self.start.as_ptr().cast::<c_void>(), self.capacity.max(1));
    }
  }
}
