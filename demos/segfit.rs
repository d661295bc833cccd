use std::io::Read;

use libc::sbrk;
use segfit::{Allocation, SegFitAllocator, Sbrk};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn print_alloc(
  allocator: &SegFitAllocator<Sbrk>,
  requested: usize,
  allocation: &Allocation,
) {
  println!(
    "Allocated {} bytes ({} usable), address = {:?}, program break = {:?}",
    requested,
    allocator.usable_size(allocation),
    allocation.as_ptr(),
    unsafe { sbrk(0) }
  );
}

fn print_heap(allocator: &SegFitAllocator<Sbrk>) {
  for block in allocator.blocks() {
    println!(
      "  +{:#07x}  {:>6} bytes  {}",
      block.offset,
      block.size,
      if block.allocated { "allocated" } else { "free" }
    );
  }
  println!("  {:?}", allocator.stats());
}

fn main() -> Result<(), segfit::HeapError> {
  // If stdio's malloc moves the break between our calls, growth fails with
  // HeapError::ForeignBreak instead of overwriting its memory.
  let mut allocator = unsafe { SegFitAllocator::with_sbrk() };

  unsafe { print_program_break("start") };
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) A u64 worth of payload: 8 bytes + 16-byte header, rounded to 32.
  // --------------------------------------------------------------------
  let first = allocator.allocate(8)?;
  println!("\n[1] Allocate 8 bytes");
  print_alloc(&allocator, 8, &first);
  allocator.payload_mut(&first)[..8].copy_from_slice(&0xDEAD_BEEFu64.to_ne_bytes());

  // --------------------------------------------------------------------
  // 2) An odd-sized request.
  // --------------------------------------------------------------------
  let second = allocator.allocate(12)?;
  println!("\n[2] Allocate 12 bytes");
  print_alloc(&allocator, 12, &second);
  allocator.payload_mut(&second).fill(0xAB);
  println!("[2] Initialized second block with 0xAB");

  // --------------------------------------------------------------------
  // 3) Every payload address is 16-byte aligned.
  // --------------------------------------------------------------------
  let third = allocator.allocate(1000)?;
  println!("\n[3] Allocate 1000 bytes (observe alignment)");
  print_alloc(&allocator, 1000, &third);
  println!("[3] Address % 16 = {}", third.addr() % segfit::GRANULE);
  print_heap(&allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Free the big block. It goes onto its size-class list, nothing merges.
  // --------------------------------------------------------------------
  let third_addr = third.addr();
  unsafe { allocator.free(third) };
  println!("\n[4] Freed the 1000-byte block at {third_addr:#x}");
  print_heap(&allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) A small request is served by splitting the freed block.
  // --------------------------------------------------------------------
  let fourth = allocator.allocate(40)?;
  println!("\n[5] Allocate 40 bytes (check reuse of freed block)");
  print_alloc(&allocator, 40, &fourth);
  println!(
    "[5] fourth == freed block? {}",
    if fourth.addr() == third_addr {
      "Yes, it split the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );
  print_heap(&allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 6) A large request grows the heap.
  // --------------------------------------------------------------------
  unsafe { print_program_break("before large alloc") };
  let big = allocator.allocate(64 * 1024)?;
  println!("\n[6] Allocate large 64 KiB block");
  print_alloc(&allocator, 64 * 1024, &big);
  unsafe { print_program_break("after large alloc") };
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 7) Free everything and coalesce by hand.
  // --------------------------------------------------------------------
  unsafe {
    allocator.free(first);
    allocator.free(second);
    allocator.free(fourth);
    allocator.free(big);
  }
  allocator.coalesce();
  println!("\n[7] Freed everything and coalesced");
  print_heap(&allocator);

  println!("\n[8] End of example. The heap never shrinks; the OS reclaims it at exit.");

  Ok(())
}
