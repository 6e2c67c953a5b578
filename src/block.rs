//! In-place block encoding.
//!
//! ```text
//!   allocated block                    free block
//!   ┌──────────┬──────────────────┐    ┌──────────┬──────┬──────┬─────────┬──────────┐
//!   │  header  │     payload      │    │  header  │ pred │ succ │  ...    │  footer  │
//!   └──────────┴──────────────────┘    └──────────┴──────┴──────┴─────────┴──────────┘
//!              ▲                                  ▲
//!              └── bp                             └── bp
//! ```
//!
//! `size` counts everything from the header up to the next block's header.

use std::ptr::{self, NonNull};

use crate::align::{ALIGNMENT, WORD};

/// This block is allocated.
pub const ALLOCATED: usize = 0b01;
/// The block physically before this one is allocated.
pub const PREV_ALLOCATED: usize = 0b10;

/// Smallest block that can hold a header, both free-list links and a footer.
pub const MIN_BLOCK_SIZE: usize = 2 * ALIGNMENT;

pub const fn pack(
  size: usize,
  allocated: bool,
) -> usize {
  size | if allocated { ALLOCATED } else { 0 }
}

pub const fn size_of_word(word: usize) -> usize {
  word & !(ALIGNMENT - 1)
}

pub const fn is_allocated(word: usize) -> bool {
  word & ALLOCATED != 0
}

pub const fn is_prev_allocated(word: usize) -> bool {
  word & PREV_ALLOCATED != 0
}

const fn prev_bit(prev_allocated: bool) -> usize {
  if prev_allocated { PREV_ALLOCATED } else { 0 }
}

/// Block size needed to hand out `size` usable bytes, or `None` on overflow.
pub fn adjusted_size(size: usize) -> Option<usize> {
  let needed = crate::align::checked_align(size.checked_add(WORD)?)?;
  Some(needed.max(MIN_BLOCK_SIZE))
}

/// Handle to a block, addressed by its payload pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Block(NonNull<u8>);

impl Block {
  pub const fn new(payload: NonNull<u8>) -> Self {
    Self(payload)
  }

  pub fn from_payload(ptr: *mut u8) -> Option<Self> {
    NonNull::new(ptr).map(Self)
  }

  pub const fn as_non_null(self) -> NonNull<u8> {
    self.0
  }

  pub fn payload(self) -> *mut u8 {
    self.0.as_ptr()
  }

  pub fn addr(self) -> usize {
    self.0.as_ptr() as usize
  }

  pub fn header(self) -> *mut usize {
    self.payload().wrapping_sub(WORD) as *mut usize
  }

  /// # Safety
  ///
  /// `self` must point at a block inside an initialized heap.
  pub unsafe fn header_word(self) -> usize {
    unsafe { self.header().read() }
  }

  pub unsafe fn size(self) -> usize {
    unsafe { size_of_word(self.header_word()) }
  }

  pub unsafe fn is_allocated(self) -> bool {
    unsafe { is_allocated(self.header_word()) }
  }

  pub unsafe fn is_prev_allocated(self) -> bool {
    unsafe { is_prev_allocated(self.header_word()) }
  }

  /// Footer location. Only meaningful while the block is free.
  pub unsafe fn footer(self) -> *mut usize {
    unsafe {
      self
        .payload()
        .wrapping_add(self.size())
        .wrapping_sub(2 * WORD) as *mut usize
    }
  }

  pub unsafe fn next(self) -> Block {
    unsafe { Block(self.0.add(self.size())) }
  }

  /// Physically previous block, located through its footer.
  ///
  /// # Safety
  ///
  /// The previous block must be free (or the prologue), otherwise the word
  /// read is payload.
  pub unsafe fn prev(self) -> Block {
    unsafe {
      let footer = self.payload().sub(2 * WORD) as *const usize;
      Block(self.0.sub(size_of_word(footer.read())))
    }
  }

  /// The previous block if, and only if, it is free.
  pub unsafe fn prev_free_neighbor(self) -> Option<Block> {
    unsafe {
      if self.is_prev_allocated() {
        None
      } else {
        Some(self.prev())
      }
    }
  }

  /// Marks the block allocated. Allocated blocks carry no footer.
  pub unsafe fn write_allocated(
    self,
    size: usize,
    prev_allocated: bool,
  ) {
    unsafe {
      self
        .header()
        .write(pack(size, true) | prev_bit(prev_allocated));
    }
  }

  /// Marks the block free, writing matching header and footer.
  pub unsafe fn write_free(
    self,
    size: usize,
    prev_allocated: bool,
  ) {
    unsafe {
      let word = pack(size, false) | prev_bit(prev_allocated);
      self.header().write(word);
      self.footer().write(word);
    }
  }

  pub unsafe fn set_prev_allocated(
    self,
    prev_allocated: bool,
  ) {
    unsafe {
      let word = (self.header_word() & !PREV_ALLOCATED) | prev_bit(prev_allocated);
      self.header().write(word);
      if !is_allocated(word) && size_of_word(word) != 0 {
        self.footer().write(word);
      }
    }
  }

  /// Free-list predecessor. Never call on an allocated block.
  pub unsafe fn pred(self) -> Option<Block> {
    unsafe { Self::from_payload((self.payload() as *const *mut u8).read()) }
  }

  pub unsafe fn succ(self) -> Option<Block> {
    unsafe { Self::from_payload((self.payload().add(WORD) as *const *mut u8).read()) }
  }

  pub unsafe fn set_pred(
    self,
    pred: Option<Block>,
  ) {
    unsafe {
      (self.payload() as *mut *mut u8).write(pred.map_or(ptr::null_mut(), Block::payload));
    }
  }

  pub unsafe fn set_succ(
    self,
    succ: Option<Block>,
  ) {
    unsafe {
      (self.payload().add(WORD) as *mut *mut u8)
        .write(succ.map_or(ptr::null_mut(), Block::payload));
    }
  }
}
