//! Runs a whole std program on top of the heap. Built with `harness = false`
//! so that the test runner's own allocations go through it too.

use std::{collections::HashMap, thread};

use tagalloc::{HeapConfig, LockedHeap, MmapArena};

#[global_allocator]
static HEAP: LockedHeap<MmapArena> =
  LockedHeap::new(MmapArena::with_default_reserve, HeapConfig::new());

fn main() {
  let mut numbers: Vec<u64> = (0..10_000).collect();
  assert!(HEAP.is_initialized());
  numbers.retain(|n| n % 3 == 0);
  assert_eq!(numbers.len(), 3334);

  let mut words = HashMap::new();
  for i in 0..1000 {
    words.insert(format!("key-{}", i), i.to_string().repeat(i % 7 + 1));
  }
  assert_eq!(words["key-10"], "1010101010");

  let boxed = Box::new([7u8; 300]);
  assert!(boxed.iter().all(|&b| b == 7));

  let workers: Vec<_> = (0..4)
    .map(|t| {
      thread::spawn(move || {
        let mut text = String::new();
        for i in 0..200 {
          text.push_str(&format!("{}:{};", t, i));
        }
        text.len()
      })
    })
    .collect();
  let total: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
  assert!(total > 0);

  drop(words);
  drop(numbers);

  HEAP.validate("global allocator").unwrap();
  assert!(HEAP.stats().unwrap().allocated_blocks > 0);

  println!("global allocator: ok");
}
