use std::env;

use crate::{
  align::{ALIGNMENT, checked_align},
  block::MIN_BLOCK_SIZE,
  error::{HeapError, Result},
};

/// Default growth increment, in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

pub const CHUNK_SIZE_VAR: &str = "TAGALLOC_CHUNK_SIZE";
pub const CHECK_HEAP_VAR: &str = "TAGALLOC_CHECK_HEAP";

/// Tunables for a [`Heap`](crate::Heap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
  /// Minimum number of bytes requested from the arena per growth.
  pub chunk_size: usize,
  /// Run [`Heap::validate`](crate::Heap::validate) after every mutating call.
  pub check_heap: bool,
}

impl HeapConfig {
  pub const fn new() -> Self {
    Self {
      chunk_size: DEFAULT_CHUNK_SIZE,
      check_heap: false,
    }
  }

  /// Rounded up to the alignment granularity and to at least one minimum
  /// block; zero keeps the default.
  pub const fn chunk_size(
    mut self,
    chunk_size: usize,
  ) -> Self {
    self.chunk_size = chunk_size;
    self.normalized()
  }

  pub const fn check_heap(
    mut self,
    check_heap: bool,
  ) -> Self {
    self.check_heap = check_heap;
    self
  }

  /// The config with `chunk_size` brought into range, whatever was written
  /// to the public field.
  pub const fn normalized(mut self) -> Self {
    self.chunk_size = match self.chunk_size {
      0 => DEFAULT_CHUNK_SIZE,
      size if size > usize::MAX - ALIGNMENT => usize::MAX & !(ALIGNMENT - 1),
      size if size < MIN_BLOCK_SIZE => MIN_BLOCK_SIZE,
      size => crate::align!(size),
    };
    self
  }

  /// Defaults overridden by `TAGALLOC_CHUNK_SIZE` and `TAGALLOC_CHECK_HEAP`.
  pub fn from_env() -> Result<Self> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let mut config = Self::new();

    if let Some(value) = lookup(CHUNK_SIZE_VAR) {
      let chunk_size = value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|&size| size >= MIN_BLOCK_SIZE && checked_align(size).is_some())
        .ok_or(HeapError::Config {
          key: CHUNK_SIZE_VAR,
          value: value.clone(),
        })?;
      config = config.chunk_size(chunk_size);
    }

    if let Some(value) = lookup(CHECK_HEAP_VAR) {
      let check_heap = match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        _ => {
          return Err(HeapError::Config {
            key: CHECK_HEAP_VAR,
            value,
          });
        }
      };
      config = config.check_heap(check_heap);
    }

    Ok(config)
  }
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self::new()
  }
}
