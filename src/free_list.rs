use crate::block::Block;

/// Explicit doubly linked list threaded through the payloads of free blocks.
///
/// Insertion is at the head, so a scan from the head sees the most recently
/// freed blocks first.
#[derive(Debug, Default)]
pub struct FreeList {
  head: Option<Block>,
  len: usize,
}

impl FreeList {
  pub const fn new() -> Self {
    Self { head: None, len: 0 }
  }

  pub fn head(&self) -> Option<Block> {
    self.head
  }

  pub fn len(&self) -> usize {
    self.len
  }

  /// # Safety
  ///
  /// `block` must be free, not already linked, and large enough for links.
  pub unsafe fn insert(
    &mut self,
    block: Block,
  ) {
    unsafe {
      block.set_pred(None);
      block.set_succ(self.head);

      if let Some(head) = self.head {
        head.set_pred(Some(block));
      }
    }

    self.head = Some(block);
    self.len += 1;
  }

  /// # Safety
  ///
  /// `block` must currently be linked into this list.
  pub unsafe fn remove(
    &mut self,
    block: Block,
  ) {
    unsafe {
      let pred = block.pred();
      let succ = block.succ();

      match pred {
        Some(pred) => pred.set_succ(succ),
        None => self.head = succ,
      }

      if let Some(succ) = succ {
        succ.set_pred(pred);
      }
    }

    self.len -= 1;
  }

  /// First block in list order with at least `size` bytes.
  ///
  /// # Safety
  ///
  /// The list must be well formed.
  pub unsafe fn first_fit(
    &self,
    size: usize,
  ) -> Option<Block> {
    unsafe { self.iter().find(|block| block.size() >= size) }
  }

  /// # Safety
  ///
  /// The list must be well formed for as long as the iterator lives.
  pub unsafe fn iter(&self) -> Iter {
    Iter { current: self.head() }
  }
}

pub struct Iter {
  current: Option<Block>,
}

impl Iterator for Iter {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    let block = self.current?;
    self.current = unsafe { block.succ() };
    Some(block)
  }
}
