use thiserror::Error;

/// Everything that can go wrong inside the heap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
  #[error("zero-sized request")]
  ZeroSize,

  #[error("out of memory: arena cannot grow by {requested} bytes")]
  OutOfMemory { requested: usize },

  #[error("arena growth is not contiguous: expected {expected:#x}, got {actual:#x}")]
  NonContiguous { expected: usize, actual: usize },

  #[error("arithmetic overflow computing {count} * {size}")]
  Overflow { count: usize, size: usize },

  #[error("pointer {addr:#x} was not returned by this heap")]
  InvalidPointer { addr: usize },

  #[error("pointer {addr:#x} is already free")]
  DoubleFree { addr: usize },

  #[error("heap check failed at `{context}`: {reason} (block {addr:#x})")]
  Corrupt {
    context: &'static str,
    addr: usize,
    reason: &'static str,
  },

  #[error("invalid value `{value}` for {key}")]
  Config { key: &'static str, value: String },

  #[error("heap is not initialized")]
  Uninitialized,
}

pub type Result<T> = std::result::Result<T, HeapError>;
