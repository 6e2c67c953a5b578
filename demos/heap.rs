use std::{env, io::Read};

use tagalloc::{Arena, Heap, HeapConfig, MmapArena, SbrkArena};

/// Waits until the user presses ENTER.
/// Handy for watching the arena with `pmap` or `gdb` between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_heap<A: Arena>(
  label: &str,
  heap: &Heap<A>,
) {
  let stats = heap.stats();
  println!(
    "[{}] arena = {:p}..={:p}, {} allocated ({} bytes), {} free ({} bytes, largest {})",
    label,
    heap.arena().lowest_address(),
    heap.arena().highest_address(),
    stats.allocated_blocks,
    stats.allocated_bytes,
    stats.free_blocks,
    stats.free_bytes,
    stats.largest_free,
  );
}

fn run<A: Arena>(arena: A) -> Result<(), tagalloc::HeapError> {
  let config = HeapConfig::from_env()?;
  let mut heap = Heap::new(arena, config)?;

  println!(
    "chunk size {} bytes, heap checks {}",
    heap.config().chunk_size,
    if heap.config().check_heap { "on" } else { "off" }
  );
  print_heap("start", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Two small allocations land back to back.
  // --------------------------------------------------------------------
  let a = heap.try_allocate(8)?.as_ptr();
  let b = heap.try_allocate(24)?.as_ptr();
  println!("\n[1] allocate(8) = {:?}, allocate(24) = {:?}", a, b);
  unsafe {
    (a as *mut u64).write(0xDEADBEEF);
    println!("[1] Value written to a = 0x{:X}", (a as *mut u64).read());
  }
  print_heap("1", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Freeing `a` and asking again hands the same block back.
  // --------------------------------------------------------------------
  unsafe { heap.try_release(a)? };
  let again = heap.try_allocate(8)?.as_ptr();
  println!(
    "\n[2] release(a), allocate(8) = {:?}: {}",
    again,
    if again == a { "reused the freed block" } else { "allocated somewhere else" }
  );
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Freeing both neighbours merges them into one block big enough
  //    for a request neither could serve alone.
  // --------------------------------------------------------------------
  unsafe {
    heap.try_release(b)?;
    heap.try_release(again)?;
  }
  let merged = heap.try_allocate(32)?.as_ptr();
  println!("\n[3] allocate(32) after releasing both = {:?} (a = {:?})", merged, a);
  print_heap("3", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Resize keeps the contents.
  // --------------------------------------------------------------------
  unsafe {
    merged.write_bytes(0xAB, 32);
    let grown = heap.try_resize(merged, 1024)?.map_or(std::ptr::null_mut(), |p| p.as_ptr());
    println!("\n[4] resize(32 -> 1024) = {:?}, first byte = 0x{:X}", grown, grown.read());
    heap.try_release(grown)?;
  }
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) A large request grows the arena.
  // --------------------------------------------------------------------
  print_heap("before large alloc", &heap);
  let big = heap.try_zeroed_allocate(64, 1024)?;
  println!("\n[5] zeroed_allocate(64, 1024) = {:?}", big);
  print_heap("after large alloc", &heap);

  heap.validate("demo")?;
  println!("\n[6] Heap is consistent. End of example.");

  Ok(())
}

fn main() {
  let result = if env::args().any(|arg| arg == "--sbrk") {
    run(SbrkArena::new())
  } else {
    MmapArena::new(1 << 30).and_then(run)
  };

  if let Err(err) = result {
    eprintln!("error: {}", err);
    std::process::exit(1);
  }
}
