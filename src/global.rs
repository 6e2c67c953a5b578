use std::{
  alloc::{GlobalAlloc, Layout},
  ptr,
};

use spin::Mutex;

use crate::{
  align::ALIGNMENT,
  arena::Arena,
  config::HeapConfig,
  error::{HeapError, Result},
  heap::{Heap, HeapStats},
};

/// Builds the arena on first use. A plain `fn` so that it can sit in a
/// `static`.
pub type ArenaFactory<A> = fn() -> Result<A>;

/// A [`Heap`] behind a spin lock, usable as `#[global_allocator]`.
///
/// Every request is served under one lock, since fit search, placement and
/// coalescing all read then write shared boundary tags. The heap is built on
/// the first request from the arena factory and config given to
/// [`new`](LockedHeap::new). Layouts aligned above [`ALIGNMENT`] fail.
///
/// ```rust,no_run
/// use tagalloc::{HeapConfig, LockedHeap, MmapArena};
///
/// #[global_allocator]
/// static HEAP: LockedHeap<MmapArena> =
///   LockedHeap::new(MmapArena::with_default_reserve, HeapConfig::new());
/// ```
///
/// The factory must not allocate through this heap, so a [`BufferArena`]
/// cannot back a global instance.
///
/// [`BufferArena`]: crate::BufferArena
pub struct LockedHeap<A: Arena> {
  inner: Mutex<Option<Heap<A>>>,
  arena: ArenaFactory<A>,
  config: HeapConfig,
}

impl<A: Arena> LockedHeap<A> {
  pub const fn new(
    arena: ArenaFactory<A>,
    config: HeapConfig,
  ) -> Self {
    Self {
      inner: Mutex::new(None),
      arena,
      config,
    }
  }

  /// Runs `f` on the heap, building it first if needed. `None` when the
  /// heap cannot be built.
  fn with_heap<R>(
    &self,
    f: impl FnOnce(&mut Heap<A>) -> R,
  ) -> Option<R> {
    let mut inner = self.inner.lock();

    if inner.is_none() {
      match (self.arena)().and_then(|arena| Heap::new(arena, self.config)) {
        Ok(heap) => *inner = Some(heap),
        Err(err) => {
          log::error!("heap initialization failed: {}", err);
          return None;
        }
      }
    }

    inner.as_mut().map(f)
  }

  pub fn is_initialized(&self) -> bool {
    self.inner.lock().is_some()
  }

  pub fn stats(&self) -> Result<HeapStats> {
    self
      .inner
      .lock()
      .as_ref()
      .map(Heap::stats)
      .ok_or(HeapError::Uninitialized)
  }

  /// See [`Heap::validate`]; holds the lock for the whole walk.
  pub fn validate(
    &self,
    context: &'static str,
  ) -> Result<()> {
    self
      .inner
      .lock()
      .as_ref()
      .ok_or(HeapError::Uninitialized)?
      .validate(context)
  }
}

unsafe impl<A: Arena + Send> GlobalAlloc for LockedHeap<A> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > ALIGNMENT {
      return ptr::null_mut();
    }

    self
      .with_heap(|heap| heap.allocate(layout.size()))
      .unwrap_or(ptr::null_mut())
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
  ) {
    self.with_heap(|heap| unsafe { heap.release(ptr) });
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > ALIGNMENT {
      return ptr::null_mut();
    }

    self
      .with_heap(|heap| heap.zeroed_allocate(1, layout.size()))
      .unwrap_or(ptr::null_mut())
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    if layout.align() > ALIGNMENT {
      return ptr::null_mut();
    }

    self
      .with_heap(|heap| unsafe { heap.resize(ptr, new_size) })
      .unwrap_or(ptr::null_mut())
  }
}
