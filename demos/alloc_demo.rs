use std::io::Read;
use std::ptr;

use coheap::{allocate, free, resize, zero_alloc};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `htop`, `gdb`, or just visually track how mappings grow as allocations
/// come in.
fn block_until_enter_pressed() {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
}

fn print_alloc(label: &str, p: *mut u8, size: usize) {
    println!("[{label}] address = {p:?}, size = {size} bytes");
}

fn main() {
    unsafe {
        println!("PID = {}", std::process::id());
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 1) Allocate space for a u32.
        // --------------------------------------------------------------
        let first = allocate(4) as *mut u32;
        println!("\n[1] Allocate 4 bytes");
        print_alloc("1", first as *mut u8, 4);
        first.write(0xDEADBEEF);
        println!("[1] Value written = 0x{:X}", first.read());
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 2) Allocate 12 "odd-sized" bytes.
        // --------------------------------------------------------------
        let second = allocate(12);
        println!("\n[2] Allocate 12 bytes");
        print_alloc("2", second, 12);
        ptr::write_bytes(second, 0xAB, 12);
        println!("[2] Initialized second block with 0xAB");
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 3) zero_alloc an array of 16 u16s; confirm it starts zeroed.
        // --------------------------------------------------------------
        let third = zero_alloc(16, std::mem::size_of::<u16>()) as *mut u16;
        println!("\n[3] zero_alloc 16 u16s");
        print_alloc("3", third as *mut u8, 32);
        for i in 0..16 {
            assert_eq!(third.add(i).read(), 0);
            third.add(i).write(i as u16);
        }
        println!("[3] Confirmed zeroed, then wrote 0..15");
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 4) Free the first block, then allocate a small one to see
        //    whether the allocator reuses the freed record.
        // --------------------------------------------------------------
        free(first as *mut u8);
        println!("\n[4] Freed block 1 at {:?}", first);
        block_until_enter_pressed();

        let fourth = allocate(2);
        println!("\n[5] Allocate 2 bytes (check reuse of freed record)");
        print_alloc("5", fourth, 2);
        println!(
            "[5] fourth == first? {}",
            if fourth as *mut u32 == first {
                "yes, the freed record was reused"
            } else {
                "no, it landed somewhere else"
            }
        );
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 5) Grow block 2 past its current record, forcing either an
        //    in-place absorb of a neighboring free record or a fresh
        //    allocate-copy-free.
        // --------------------------------------------------------------
        let grown = resize(second, 4096);
        println!("\n[6] Resize block 2 from 12 to 4096 bytes");
        print_alloc("6", grown, 4096);
        println!(
            "[6] grown == second? {}",
            if grown == second { "yes, grew in place" } else { "no, moved and copied" }
        );
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 6) Allocate something far larger than a single mapping's
        //    default floor, forcing a new mapping to be mmap'd.
        // --------------------------------------------------------------
        let big = allocate(2 * 1024 * 1024);
        println!("\n[7] Allocate 2 MiB (forces a new mapping)");
        print_alloc("7", big, 2 * 1024 * 1024);
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 7) Clean up.
        // --------------------------------------------------------------
        free(fourth);
        free(third as *mut u8);
        free(grown);
        free(big);
        println!("\n[8] Freed every remaining block. Process will exit and the OS will reclaim all mappings.");
    }
}
