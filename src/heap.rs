//! Boundary-tag heap with an explicit free list.

use std::ptr::{self, NonNull};

use crate::{
  align::{ALIGNMENT, WORD},
  arena::Arena,
  block::{self, Block, MIN_BLOCK_SIZE, PREV_ALLOCATED},
  config::HeapConfig,
  error::{HeapError, Result},
  free_list::FreeList,
};

/// Span of the permanently allocated prologue: header and footer, no payload.
const PROLOGUE_SIZE: usize = 2 * WORD;

/// Padding, prologue and epilogue header.
const INITIAL_SIZE: usize = 2 * ALIGNMENT;

/// Snapshot of the block population, from a full walk of the arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub arena_bytes: usize,
  pub allocated_blocks: usize,
  pub allocated_bytes: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
}

pub struct Heap<A: Arena> {
  arena: A,
  prologue: Block,
  free_list: FreeList,
  config: HeapConfig,
}

unsafe impl<A: Arena + Send> Send for Heap<A> {}

impl<A: Arena> Heap<A> {
  /// Lays down the sentinels and grows the arena by one chunk.
  pub fn new(
    mut arena: A,
    config: HeapConfig,
  ) -> Result<Self> {
    let base = arena.grow(INITIAL_SIZE)?;

    let prologue = unsafe {
      base.as_ptr().write_bytes(0, INITIAL_SIZE);

      let sentinel = block::pack(PROLOGUE_SIZE, true) | PREV_ALLOCATED;
      let prologue = Block::new(base.add(ALIGNMENT));
      prologue.header().write(sentinel);
      prologue.footer().write(sentinel);
      prologue.next().header().write(block::pack(0, true) | PREV_ALLOCATED);
      prologue
    };

    let mut heap = Self {
      arena,
      prologue,
      free_list: FreeList::new(),
      config: config.normalized(),
    };

    log::debug!(
      "heap initialized at {:p}, chunk size {}",
      heap.arena.lowest_address(),
      heap.config.chunk_size
    );

    unsafe {
      heap.extend(heap.config.chunk_size)?;
    }
    heap.check("init");

    Ok(heap)
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn arena(&self) -> &A {
    &self.arena
  }

  /// Allocates at least `size` bytes, aligned to [`ALIGNMENT`].
  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    if size == 0 {
      return Err(HeapError::ZeroSize);
    }

    let asize = block::adjusted_size(size).ok_or(HeapError::OutOfMemory { requested: size })?;

    let block = unsafe {
      let fit = match self.free_list.first_fit(asize) {
        Some(block) => block,
        None => self.extend(asize.max(self.config.chunk_size))?,
      };
      self.place(fit, asize)
    };

    log::trace!("allocate({}) -> {:p}", size, block.payload());
    self.check("allocate");

    Ok(block.as_non_null())
  }

  /// Null on failure.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    match self.try_allocate(size) {
      Ok(ptr) => ptr.as_ptr(),
      Err(err) => {
        report("allocate", &err);
        ptr::null_mut()
      }
    }
  }

  /// Returns a block to the heap. Null is ignored.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this heap. Foreign,
  /// misaligned and already-free pointers are detected on a best-effort basis.
  pub unsafe fn try_release(
    &mut self,
    ptr: *mut u8,
  ) -> Result<()> {
    let Some(block) = Block::from_payload(ptr) else {
      return Ok(());
    };

    self.owned(block)?;

    unsafe {
      self.release_block(block);
    }

    log::trace!("release({:p})", ptr);
    self.check("release");

    Ok(())
  }

  /// # Safety
  ///
  /// See [`Heap::try_release`]. Rejected pointers are logged and ignored.
  pub unsafe fn release(
    &mut self,
    ptr: *mut u8,
  ) {
    if let Err(err) = unsafe { self.try_release(ptr) } {
      report("release", &err);
    }
  }

  /// Resizes a block, keeping the first `min(old, new_size)` bytes.
  ///
  /// Null `ptr` allocates; zero `new_size` releases and yields `None`. On
  /// failure the original block is left untouched.
  ///
  /// # Safety
  ///
  /// See [`Heap::try_release`].
  pub unsafe fn try_resize(
    &mut self,
    ptr: *mut u8,
    new_size: usize,
  ) -> Result<Option<NonNull<u8>>> {
    let Some(block) = Block::from_payload(ptr) else {
      return self.try_allocate(new_size).map(Some);
    };

    if new_size == 0 {
      unsafe { self.try_release(ptr)? };
      return Ok(None);
    }

    self.owned(block)?;

    let asize = block::adjusted_size(new_size)
      .ok_or(HeapError::OutOfMemory { requested: new_size })?;

    unsafe {
      if self.resize_in_place(block, asize) {
        log::trace!("resize({:p}, {}) -> in place", ptr, new_size);
        self.check("resize");
        return Ok(Some(NonNull::new_unchecked(ptr)));
      }

      let usable = block.size() - WORD;
      let moved = self.try_allocate(new_size)?;
      ptr::copy_nonoverlapping(ptr, moved.as_ptr(), usable.min(new_size));
      self.release_block(block);

      log::trace!("resize({:p}, {}) -> moved to {:p}", ptr, new_size, moved);
      self.check("resize");

      Ok(Some(moved))
    }
  }

  /// # Safety
  ///
  /// See [`Heap::try_release`].
  pub unsafe fn resize(
    &mut self,
    ptr: *mut u8,
    new_size: usize,
  ) -> *mut u8 {
    match unsafe { self.try_resize(ptr, new_size) } {
      Ok(moved) => moved.map_or(ptr::null_mut(), NonNull::as_ptr),
      Err(err) => {
        report("resize", &err);
        ptr::null_mut()
      }
    }
  }

  /// Allocates `count * size` zeroed bytes, failing on overflow.
  pub fn try_zeroed_allocate(
    &mut self,
    count: usize,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let total = count
      .checked_mul(size)
      .ok_or(HeapError::Overflow { count, size })?;

    let ptr = self.try_allocate(total)?;
    unsafe {
      ptr.as_ptr().write_bytes(0, total);
    }

    Ok(ptr)
  }

  pub fn zeroed_allocate(
    &mut self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    match self.try_zeroed_allocate(count, size) {
      Ok(ptr) => ptr.as_ptr(),
      Err(err) => {
        report("zeroed_allocate", &err);
        ptr::null_mut()
      }
    }
  }

  /// Bytes the caller may use behind `ptr`.
  ///
  /// # Safety
  ///
  /// See [`Heap::try_release`].
  pub unsafe fn usable_size(
    &self,
    ptr: *mut u8,
  ) -> Result<usize> {
    let block = Block::from_payload(ptr).ok_or(HeapError::InvalidPointer { addr: 0 })?;
    self.owned(block)?;
    Ok(unsafe { block.size() } - WORD)
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      arena_bytes: self.arena.len(),
      ..HeapStats::default()
    };

    unsafe {
      let mut block = self.prologue.next();

      while block.size() != 0 {
        let size = block.size();

        if block.is_allocated() {
          stats.allocated_blocks += 1;
          stats.allocated_bytes += size;
        } else {
          stats.free_blocks += 1;
          stats.free_bytes += size;
          stats.largest_free = stats.largest_free.max(size);
        }

        block = block.next();
      }
    }

    stats
  }

  /// Walks the arena and the free list checking every structural invariant.
  /// Does nothing in builds without `debug_assertions`.
  ///
  /// Never allocates, so it is safe to call on a heap serving as the global
  /// allocator.
  pub fn validate(
    &self,
    context: &'static str,
  ) -> Result<()> {
    if !cfg!(debug_assertions) {
      return Ok(());
    }

    let corrupt = |addr: usize, reason: &'static str| {
      Err(HeapError::Corrupt {
        context,
        addr,
        reason,
      })
    };

    let end = (self.arena.highest_address() as usize).wrapping_add(1);
    let mut free_blocks = 0;

    unsafe {
      let sentinel = block::pack(PROLOGUE_SIZE, true) | PREV_ALLOCATED;
      if self.prologue.header_word() != sentinel || self.prologue.footer().read() != sentinel {
        return corrupt(self.prologue.addr(), "prologue overwritten");
      }

      let mut block = self.prologue.next();
      let mut prev_allocated = true;

      loop {
        let addr = block.addr();

        if addr % ALIGNMENT != 0 || addr > end {
          return corrupt(addr, "misaligned or past the arena end");
        }
        if block.is_prev_allocated() != prev_allocated {
          return corrupt(addr, "stale previous-allocated bit");
        }

        let size = block.size();

        if size == 0 {
          if !block.is_allocated() || addr != end {
            return corrupt(addr, "epilogue is not an allocated terminator at the arena end");
          }
          break;
        }

        if size < MIN_BLOCK_SIZE || size > end - addr {
          return corrupt(addr, "impossible block size");
        }

        if !block.is_allocated() {
          if block.header_word() != block.footer().read() {
            return corrupt(addr, "free block header and footer disagree");
          }
          if !prev_allocated {
            return corrupt(addr, "free block follows another free block");
          }
          free_blocks += 1;
        }

        prev_allocated = block.is_allocated();
        block = block.next();
      }

      let mut listed = 0;
      let mut pred = None;

      for block in self.free_list.iter() {
        listed += 1;

        if listed > free_blocks {
          return corrupt(block.addr(), "free list longer than the arena's free blocks");
        }
        if !self.is_free_block(block) {
          return corrupt(block.addr(), "free list entry is not a free block");
        }
        if block.pred() != pred {
          return corrupt(block.addr(), "free list entry has a broken back link");
        }

        pred = Some(block);
      }

      if listed != free_blocks || listed != self.free_list.len() {
        return corrupt(self.prologue.addr(), "free list and arena disagree on free block count");
      }
    }

    Ok(())
  }

  /// Whether `candidate` is the start of a free block, found by walking the
  /// arena from the prologue.
  unsafe fn is_free_block(
    &self,
    candidate: Block,
  ) -> bool {
    unsafe {
      let mut block = self.prologue.next();

      while block.size() != 0 && block < candidate {
        block = block.next();
      }

      block == candidate && block.size() != 0 && !block.is_allocated()
    }
  }

  fn check(
    &self,
    context: &'static str,
  ) {
    if !self.config.check_heap {
      return;
    }

    if let Err(err) = self.validate(context) {
      log::error!("{}", err);
      panic!("{}", err);
    }
  }

  /// Rejects pointers that cannot be the payload of a live block.
  fn owned(
    &self,
    block: Block,
  ) -> Result<()> {
    let addr = block.addr();
    let end = (self.arena.highest_address() as usize).wrapping_add(1);

    if addr % ALIGNMENT != 0 || addr <= self.prologue.addr() || addr >= end {
      return Err(HeapError::InvalidPointer { addr });
    }

    let word = unsafe { block.header_word() };
    let size = block::size_of_word(word);

    if !block::is_allocated(word) {
      return Err(HeapError::DoubleFree { addr });
    }
    if size < MIN_BLOCK_SIZE || size > end - addr {
      return Err(HeapError::InvalidPointer { addr });
    }

    Ok(())
  }

  /// Grows the arena by `bytes` and hands the new space to the coalescer.
  unsafe fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<Block> {
    let size = crate::align::checked_align(bytes)
      .ok_or(HeapError::OutOfMemory { requested: bytes })?;
    let base = self.arena.grow(size)?;

    log::debug!("arena grew by {} bytes at {:p}", size, base);

    unsafe {
      // The old epilogue header becomes the new block's header.
      let block = Block::new(base);
      block.write_free(size, block.is_prev_allocated());
      block.next().header().write(block::pack(0, true));

      Ok(self.coalesce(block))
    }
  }

  /// Carves `asize` bytes off the front of a free block.
  unsafe fn place(
    &mut self,
    block: Block,
    asize: usize,
  ) -> Block {
    unsafe {
      self.free_list.remove(block);
      block.write_allocated(block.size(), block.is_prev_allocated());
      block.next().set_prev_allocated(true);
      self.split(block, asize);
    }

    block
  }

  /// Returns the tail of an allocated block past `asize` to the free pool,
  /// when the tail is big enough to stand alone.
  unsafe fn split(
    &mut self,
    block: Block,
    asize: usize,
  ) {
    unsafe {
      let size = block.size();
      if size - asize < MIN_BLOCK_SIZE {
        return;
      }

      block.write_allocated(asize, block.is_prev_allocated());
      let rest = block.next();
      rest.write_free(size - asize, true);
      self.coalesce(rest);
    }
  }

  /// Merges a free, unlinked block with its free neighbours and links the
  /// result.
  unsafe fn coalesce(
    &mut self,
    block: Block,
  ) -> Block {
    unsafe {
      let next = block.next();
      let next_free = !next.is_allocated();
      let mut size = block.size();

      let merged = match (block.prev_free_neighbor(), next_free) {
        (None, false) => block,
        (None, true) => {
          self.free_list.remove(next);
          size += next.size();
          block
        }
        (Some(prev), false) => {
          self.free_list.remove(prev);
          size += prev.size();
          prev
        }
        (Some(prev), true) => {
          self.free_list.remove(prev);
          self.free_list.remove(next);
          size += prev.size() + next.size();
          prev
        }
      };

      merged.write_free(size, merged.is_prev_allocated());
      merged.next().set_prev_allocated(false);
      self.free_list.insert(merged);

      merged
    }
  }

  unsafe fn release_block(
    &mut self,
    block: Block,
  ) {
    unsafe {
      block.write_free(block.size(), block.is_prev_allocated());
      self.coalesce(block);
    }
  }

  /// Shrinks in place, or grows into a free successor. False if neither fits.
  unsafe fn resize_in_place(
    &mut self,
    block: Block,
    asize: usize,
  ) -> bool {
    unsafe {
      let size = block.size();

      if asize <= size {
        self.split(block, asize);
        return true;
      }

      let next = block.next();
      if next.is_allocated() || size + next.size() < asize {
        return false;
      }

      self.free_list.remove(next);
      block.write_allocated(size + next.size(), block.is_prev_allocated());
      block.next().set_prev_allocated(true);
      self.split(block, asize);

      true
    }
  }
}

fn report(
  operation: &str,
  err: &HeapError,
) {
  match err {
    HeapError::ZeroSize => log::trace!("{}: {}", operation, err),
    HeapError::OutOfMemory { .. }
    | HeapError::NonContiguous { .. }
    | HeapError::Overflow { .. } => log::warn!("{}: {}", operation, err),
    _ => log::error!("{}: {}", operation, err),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arena::BufferArena;

  fn heap() -> Heap<BufferArena> {
    Heap::new(BufferArena::new(1 << 16).unwrap(), HeapConfig::new().check_heap(true)).unwrap()
  }

  #[test]
  fn test_init_layout() {
    let heap = heap();
    let stats = heap.stats();

    assert_eq!(stats.arena_bytes, INITIAL_SIZE + 4096);
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.free_bytes, 4096);
    assert_eq!(stats.allocated_blocks, 0);
    assert_eq!(heap.free_list.len(), 1);

    // One padding word, then a two-word prologue.
    let base = heap.arena.lowest_address() as usize;
    assert_eq!(heap.prologue.addr(), base + ALIGNMENT);
    assert_eq!(unsafe { heap.prologue.size() }, PROLOGUE_SIZE);
    assert_eq!(PROLOGUE_SIZE, 2 * WORD);
    heap.validate("init").unwrap();
  }

  #[test]
  fn test_tiny_chunk_size_still_builds_a_sound_heap() {
    let built = Heap::new(BufferArena::new(1 << 16).unwrap(), HeapConfig::new().chunk_size(16));
    let written = Heap::new(
      BufferArena::new(1 << 16).unwrap(),
      HeapConfig {
        chunk_size: 0,
        check_heap: true,
      },
    );
    let mut tiny = Heap::new(
      BufferArena::new(1 << 16).unwrap(),
      HeapConfig {
        chunk_size: 16,
        check_heap: true,
      },
    )
    .unwrap();

    assert_eq!(built.unwrap().stats().free_bytes, MIN_BLOCK_SIZE);
    assert_eq!(written.unwrap().config().chunk_size, 4096);
    assert_eq!(tiny.config().chunk_size, MIN_BLOCK_SIZE);
    tiny.validate("tiny chunk").unwrap();

    let ptr = tiny.allocate(8);
    assert!(!ptr.is_null());
    unsafe { tiny.release(ptr) };
    assert!(!tiny.allocate(200).is_null());
    tiny.validate("tiny chunk growth").unwrap();
  }

  #[test]
  fn test_init_fails_without_room() {
    assert!(matches!(
      Heap::new(BufferArena::new(64).unwrap(), HeapConfig::new()),
      Err(HeapError::OutOfMemory { .. })
    ));
    assert!(matches!(
      Heap::new(BufferArena::new(16).unwrap(), HeapConfig::new()),
      Err(HeapError::OutOfMemory { .. })
    ));
  }

  #[test]
  fn test_scenario_reuse_and_merge() {
    let mut heap = heap();

    unsafe {
      let a = heap.allocate(8);
      let b = heap.allocate(24);
      assert!(!a.is_null() && !b.is_null());
      assert!(b > a);

      heap.release(a);
      assert_eq!(heap.allocate(8), a);

      heap.release(b);
      heap.release(a);
      assert_eq!(heap.stats().free_blocks, 1);

      assert_eq!(heap.allocate(32), a);
    }
  }

  #[test]
  fn test_alignment_and_split() {
    let mut heap = heap();

    let ptrs: Vec<*mut u8> = (1..40).map(|n| heap.allocate(n * 3)).collect();

    for (i, &ptr) in ptrs.iter().enumerate() {
      assert_eq!(ptr as usize % ALIGNMENT, 0);
      let usable = unsafe { heap.usable_size(ptr) }.unwrap();
      assert!(usable >= (i + 1) * 3);
    }

    let stats = heap.stats();
    assert_eq!(stats.allocated_blocks, ptrs.len());
    assert_eq!(stats.free_blocks, 1);
  }

  #[test]
  fn test_no_split_for_tiny_remainder() {
    let arena = BufferArena::new(1 << 16).unwrap();
    let mut heap = Heap::new(arena, HeapConfig::new().chunk_size(64)).unwrap();

    // Adjusted size 48 leaves 16 bytes, too small for a free block.
    let ptr = heap.allocate(40);
    assert!(!ptr.is_null());
    assert_eq!(unsafe { heap.usable_size(ptr) }.unwrap(), 64 - WORD);
    assert_eq!(heap.stats().free_blocks, 0);
    assert_eq!(heap.free_list.len(), 0);
    heap.validate("no split").unwrap();
  }

  #[test]
  fn test_zero_size_and_null() {
    let mut heap = heap();
    let before = heap.stats();

    assert!(heap.allocate(0).is_null());
    assert_eq!(heap.try_allocate(0), Err(HeapError::ZeroSize));
    unsafe {
      heap.release(ptr::null_mut());
      assert_eq!(heap.try_release(ptr::null_mut()), Ok(()));
    }

    assert_eq!(heap.stats(), before);
  }

  #[test]
  fn test_grows_past_chunk() {
    let mut heap = heap();

    let big = heap.allocate(10_000);
    assert!(!big.is_null());
    assert!(heap.stats().arena_bytes > INITIAL_SIZE + 4096);

    unsafe {
      big.write_bytes(0x5A, 10_000);
      heap.release(big);
    }

    // The initial chunk and the growth merged into one span.
    assert_eq!(heap.stats().free_blocks, 1);
  }

  #[test]
  fn test_out_of_memory_leaves_heap_intact() {
    let mut heap = Heap::new(
      BufferArena::new(INITIAL_SIZE + 4096).unwrap(),
      HeapConfig::new().check_heap(true),
    )
    .unwrap();

    assert!(heap.allocate(8192).is_null());
    assert_eq!(
      heap.try_allocate(8192),
      Err(HeapError::OutOfMemory {
        requested: 8192 + ALIGNMENT
      })
    );
    assert_eq!(
      heap.try_allocate(usize::MAX),
      Err(HeapError::OutOfMemory { requested: usize::MAX })
    );

    assert!(!heap.allocate(4000).is_null());
    heap.validate("after oom").unwrap();
  }

  #[test]
  fn test_coalesce_cases() {
    let mut heap = heap();

    unsafe {
      let a = heap.allocate(24);
      let b = heap.allocate(24);
      let c = heap.allocate(24);
      let _guard = heap.allocate(24);
      let head_size = |heap: &Heap<BufferArena>| heap.free_list.head().unwrap().size();

      // Both neighbours allocated.
      heap.release(b);
      assert_eq!(heap.stats().free_blocks, 2);
      assert_eq!(heap.free_list.head().map(Block::payload), Some(b));

      // Predecessor free.
      heap.release(c);
      assert_eq!(heap.stats().free_blocks, 2);
      assert_eq!(heap.free_list.head().map(Block::payload), Some(b));
      assert_eq!(head_size(&heap), 2 * MIN_BLOCK_SIZE);

      // Successor free.
      heap.release(a);
      assert_eq!(heap.stats().free_blocks, 2);
      assert_eq!(heap.free_list.head().map(Block::payload), Some(a));
      assert_eq!(head_size(&heap), 3 * MIN_BLOCK_SIZE);

      // Both free.
      let x = heap.allocate(24);
      let y = heap.allocate(24);
      assert_eq!((x, y), (a, b));
      heap.release(x);
      assert_eq!(heap.stats().free_blocks, 3);
      heap.release(y);
      assert_eq!(heap.stats().free_blocks, 2);
      assert_eq!(heap.free_list.head().map(Block::payload), Some(a));
      assert_eq!(head_size(&heap), 3 * MIN_BLOCK_SIZE);
    }
  }

  #[test]
  fn test_release_order_is_irrelevant() {
    let run = |order: [usize; 2]| {
      let mut heap = heap();
      let blocks = [heap.allocate(24), heap.allocate(24), heap.allocate(24)];
      unsafe {
        heap.release(blocks[order[0]]);
        heap.release(blocks[order[1]]);
      }
      heap.stats()
    };

    let single = {
      let mut heap = heap();
      let joined = heap.allocate(2 * MIN_BLOCK_SIZE - WORD);
      heap.allocate(24);
      unsafe { heap.release(joined) };
      heap.stats()
    };

    assert_eq!(run([0, 1]), run([1, 0]));
    assert_eq!(run([0, 1]), single);
  }

  #[test]
  fn test_lifo_reuse() {
    let mut heap = heap();

    unsafe {
      let a = heap.allocate(100);
      let _x = heap.allocate(8);
      let b = heap.allocate(100);
      let _y = heap.allocate(8);

      heap.release(a);
      heap.release(b);

      assert_eq!(heap.allocate(100), b);
      assert_eq!(heap.allocate(100), a);
    }
  }

  #[test]
  fn test_resize_preserves_content() {
    let mut heap = heap();

    unsafe {
      let ptr = heap.allocate(40);
      for i in 0..40 {
        ptr.add(i).write(i as u8);
      }
      let _fence = heap.allocate(8);

      let grown = heap.resize(ptr, 400);
      assert_ne!(grown, ptr);
      for i in 0..40 {
        assert_eq!(grown.add(i).read(), i as u8);
      }

      let shrunk = heap.resize(grown, 10);
      assert_eq!(shrunk, grown);
      for i in 0..10 {
        assert_eq!(shrunk.add(i).read(), i as u8);
      }
    }
  }

  #[test]
  fn test_resize_absorbs_free_successor() {
    let mut heap = heap();

    unsafe {
      let a = heap.allocate(24);
      let b = heap.allocate(24);
      let _c = heap.allocate(24);
      a.write_bytes(0x11, 24);

      heap.release(b);
      let grown = heap.resize(a, 56);

      assert_eq!(grown, a);
      assert_eq!(heap.usable_size(a).unwrap(), 2 * MIN_BLOCK_SIZE - WORD);
      assert_eq!(a.add(23).read(), 0x11);
    }
  }

  #[test]
  fn test_resize_null_and_zero() {
    let mut heap = heap();

    unsafe {
      let ptr = heap.resize(ptr::null_mut(), 64);
      assert!(!ptr.is_null());
      assert_eq!(heap.stats().allocated_blocks, 1);

      assert!(heap.resize(ptr, 0).is_null());
      assert_eq!(heap.stats().allocated_blocks, 0);
    }
  }

  #[test]
  fn test_resize_failure_keeps_original() {
    let arena = BufferArena::new(INITIAL_SIZE + 4096).unwrap();
    let mut heap = Heap::new(arena, HeapConfig::new()).unwrap();

    unsafe {
      let ptr = heap.allocate(64);
      let _fence = heap.allocate(8);
      ptr.write_bytes(0x77, 64);

      assert!(heap.resize(ptr, 1 << 20).is_null());
      assert_eq!(ptr.add(63).read(), 0x77);
      assert!(heap.usable_size(ptr).is_ok());
    }
  }

  #[test]
  fn test_zeroed_allocate() {
    let mut heap = heap();

    unsafe {
      let dirty = heap.allocate(256);
      dirty.write_bytes(0xFF, 256);
      heap.release(dirty);

      let clean = heap.zeroed_allocate(16, 16);
      assert_eq!(clean, dirty);
      assert!((0..256).all(|i| clean.add(i).read() == 0));
    }

    assert!(heap.zeroed_allocate(0, 8).is_null());
    assert_eq!(
      heap.try_zeroed_allocate(usize::MAX, 2),
      Err(HeapError::Overflow {
        count: usize::MAX,
        size: 2
      })
    );
  }

  #[test]
  fn test_misuse_is_detected() {
    let mut heap = heap();

    unsafe {
      let a = heap.allocate(32);
      let _b = heap.allocate(32);

      assert_eq!(
        heap.try_release(a.add(8)),
        Err(HeapError::InvalidPointer {
          addr: a as usize + 8
        })
      );

      let mut local = [0u8; 64];
      assert!(matches!(
        heap.try_release(local.as_mut_ptr()),
        Err(HeapError::InvalidPointer { .. })
      ));

      heap.try_release(a).unwrap();
      assert_eq!(heap.try_release(a), Err(HeapError::DoubleFree { addr: a as usize }));
      assert!(heap.try_resize(a, 8).is_err());

      heap.validate("misuse").unwrap();
    }
  }

  #[test]
  #[cfg(debug_assertions)]
  fn test_validate_detects_corruption() {
    let mut heap = Heap::new(BufferArena::new(1 << 16).unwrap(), HeapConfig::new()).unwrap();

    unsafe {
      let a = heap.allocate(24);
      let b = heap.allocate(24);
      heap.release(a);

      // Clobber the allocated bit of `b` so two free blocks touch.
      let header = Block::from_payload(b).unwrap().header();
      header.write(header.read() & !block::ALLOCATED);
    }

    assert!(matches!(heap.validate("clobbered"), Err(HeapError::Corrupt { .. })));
  }
}
