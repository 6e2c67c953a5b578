//! Backing stores the heap grows into.

use std::{alloc, ptr::NonNull};

use libc::{c_void, intptr_t, sbrk};

use crate::{
  align::ALIGNMENT,
  error::{HeapError, Result},
};

/// A contiguous region that only grows upward.
///
/// # Safety
///
/// Implementors must hand out `ALIGNMENT`-aligned, writable space, and every
/// successful `grow` must start exactly where the previous one ended.
pub unsafe trait Arena {
  /// Extends the region by `bytes` and returns the old end.
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>>;

  /// First valid byte.
  fn lowest_address(&self) -> *const u8;

  /// Last valid byte. Below `lowest_address` while the region is empty.
  fn highest_address(&self) -> *const u8;

  fn len(&self) -> usize {
    (self.highest_address() as usize).wrapping_add(1) - self.lowest_address() as usize
  }

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Bump pointer over a fixed buffer taken from the global allocator.
pub struct BufferArena {
  start: NonNull<u8>,
  capacity: usize,
  used: usize,
}

impl BufferArena {
  pub fn new(capacity: usize) -> Result<Self> {
    let capacity = crate::align!(capacity.max(ALIGNMENT));
    let layout = alloc::Layout::from_size_align(capacity, ALIGNMENT)
      .map_err(|_| HeapError::OutOfMemory { requested: capacity })?;
    let start = NonNull::new(unsafe { alloc::alloc(layout) })
      .ok_or(HeapError::OutOfMemory { requested: capacity })?;

    Ok(Self {
      start,
      capacity,
      used: 0,
    })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }
}

unsafe impl Arena for BufferArena {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>> {
    if bytes > self.capacity - self.used {
      return Err(HeapError::OutOfMemory { requested: bytes });
    }

    let base = unsafe { self.start.add(self.used) };
    self.used += bytes;
    Ok(base)
  }

  fn lowest_address(&self) -> *const u8 {
    self.start.as_ptr()
  }

  fn highest_address(&self) -> *const u8 {
    self.start.as_ptr().wrapping_add(self.used).wrapping_sub(1)
  }
}

impl Drop for BufferArena {
  fn drop(&mut self) {
    unsafe {
      alloc::dealloc(
        self.start.as_ptr(),
        alloc::Layout::from_size_align_unchecked(self.capacity, ALIGNMENT),
      );
    }
  }
}

/// Anonymous private mapping reserved up front and committed lazily by the
/// kernel as pages are touched.
pub struct MmapArena {
  start: NonNull<u8>,
  reserved: usize,
  used: usize,
}

impl MmapArena {
  /// Virtual range reserved by [`Self::with_default_reserve`].
  pub const DEFAULT_RESERVE: usize = 1 << 30;

  pub fn with_default_reserve() -> Result<Self> {
    Self::new(Self::DEFAULT_RESERVE)
  }

  pub fn new(reserve: usize) -> Result<Self> {
    let reserved = crate::align_to!(reserve.max(ALIGNMENT), page_size());

    let addr = unsafe {
      libc::mmap(
        std::ptr::null_mut(),
        reserved,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
        -1,
        0,
      )
    };

    if addr == libc::MAP_FAILED {
      return Err(HeapError::OutOfMemory { requested: reserved });
    }

    log::debug!("mmap arena reserved {} bytes at {:p}", reserved, addr);

    let start = NonNull::new(addr as *mut u8)
      .ok_or(HeapError::OutOfMemory { requested: reserved })?;

    Ok(Self {
      start,
      reserved,
      used: 0,
    })
  }

  pub fn reserved(&self) -> usize {
    self.reserved
  }
}

unsafe impl Arena for MmapArena {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>> {
    if bytes > self.reserved - self.used {
      return Err(HeapError::OutOfMemory { requested: bytes });
    }

    let base = unsafe { self.start.add(self.used) };
    self.used += bytes;
    Ok(base)
  }

  fn lowest_address(&self) -> *const u8 {
    self.start.as_ptr()
  }

  fn highest_address(&self) -> *const u8 {
    self.start.as_ptr().wrapping_add(self.used).wrapping_sub(1)
  }
}

impl Drop for MmapArena {
  fn drop(&mut self) {
    unsafe {
      libc::munmap(self.start.as_ptr() as *mut c_void, self.reserved);
    }
  }
}

unsafe impl Send for BufferArena {}
unsafe impl Send for MmapArena {}

/// The process data segment, grown with `sbrk(2)`.
///
/// Nothing else in the process may move the break while this arena is in use;
/// a foreign move is detected on the next `grow` and reported as
/// [`HeapError::NonContiguous`].
pub struct SbrkArena {
  start: *mut u8,
  end: *mut u8,
}

impl SbrkArena {
  pub fn new() -> Self {
    Self {
      start: std::ptr::null_mut(),
      end: std::ptr::null_mut(),
    }
  }

  unsafe fn bump(bytes: usize) -> Result<*mut u8> {
    let increment = intptr_t::try_from(bytes)
      .map_err(|_| HeapError::OutOfMemory { requested: bytes })?;
    let address = unsafe { sbrk(increment) };

    if address == usize::MAX as *mut c_void {
      return Err(HeapError::OutOfMemory { requested: bytes });
    }

    Ok(address as *mut u8)
  }
}

impl Default for SbrkArena {
  fn default() -> Self {
    Self::new()
  }
}

unsafe impl Arena for SbrkArena {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>> {
    unsafe {
      if self.start.is_null() {
        let brk = Self::bump(0)?;
        let padding = crate::align!(brk as usize) - brk as usize;
        Self::bump(padding)?;
        self.start = brk.add(padding);
        self.end = self.start;
      }

      let address = Self::bump(bytes)?;

      if address != self.end {
        return Err(HeapError::NonContiguous {
          expected: self.end as usize,
          actual: address as usize,
        });
      }

      self.end = address.add(bytes);
      NonNull::new(address).ok_or(HeapError::OutOfMemory { requested: bytes })
    }
  }

  fn lowest_address(&self) -> *const u8 {
    self.start
  }

  fn highest_address(&self) -> *const u8 {
    self.end.wrapping_sub(1)
  }
}

fn page_size() -> usize {
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
  if size <= 0 { 4096 } else { size as usize }
}
