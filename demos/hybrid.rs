use std::io::Read;

use hallocator::{print_alloc, HybridAllocator, LARGE_ALLOC_LIMIT};
use libc::sbrk;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `htop`, `gdb`, or just visually track how allocations change the
/// program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  let mut allocator = HybridAllocator::new();

  unsafe {
    // Initial heap state
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) First small allocation.
    //    Watch the break jump by a full 128 KiB: the allocator grabs its
    //    preallocation chunk up front and carves this request out of it.
    // --------------------------------------------------------------------
    let first = allocator.allocate(100);
    println!("\n[1] allocate(100) - triggers the 128 KiB preallocation");
    print_alloc(100, first);
    first.write(0xAB);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Second small allocation.
    //    The break does not move: the request is served from the
    //    preallocation surplus.
    // --------------------------------------------------------------------
    let second = allocator.allocate(1024);
    println!("\n[2] allocate(1024) - served from the preallocated chunk");
    print_alloc(1024, second);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Free the first block and allocate something that fits in it.
    //    Best-fit hands the freed block back.
    // --------------------------------------------------------------------
    allocator.free(first);
    let third = allocator.allocate(80);
    println!("\n[3] free + allocate(80) - best-fit reuse");
    print_alloc(80, third);
    println!(
      "[3] third == first? {}",
      if third == first {
        "Yes, the freed block was reused"
      } else {
        "No, it went somewhere else"
      }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Shrink the second block in place.
    //    The pointer does not change; the surplus becomes a free block.
    // --------------------------------------------------------------------
    let shrunk = allocator.reallocate(second, 200);
    println!("\n[4] reallocate(second, 200) - shrink in place");
    print_alloc(200, shrunk);
    println!(
      "[4] shrunk == second? {}",
      if shrunk == second { "Yes, no copy happened" } else { "No" }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Allocate past the routing limit.
    //    This does not move the break at all: the block gets its own
    //    anonymous mapping (visible as a separate region in pmap).
    // --------------------------------------------------------------------
    print_program_break("before large alloc");

    let large = allocator.allocate(2 * LARGE_ALLOC_LIMIT);
    println!("\n[5] allocate(256 KiB) - served by mmap, break untouched");
    print_alloc(2 * LARGE_ALLOC_LIMIT, large);

    print_program_break("after large alloc");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Free the mapped block.
    //    The whole region goes back to the kernel immediately; heap blocks
    //    on the other hand are kept for reuse until the process exits.
    // --------------------------------------------------------------------
    allocator.free(large);
    println!("\n[6] free(large) - region unmapped, heap blocks retained");
    print_program_break("end");
  }
}
