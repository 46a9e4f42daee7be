//! The public surface: `allocate`, `free`, `zero_alloc`, `resize`, and
//! a [`GlobalAlloc`] veneer over them.
//!
//! These four free functions are the entire contract spec.md defines
//! (§6): sizes in, a payload pointer (or null on failure) out, no
//! `Result`, no panics on the allocator's own account. That shape is
//! kept as-is here rather than wrapped in anything more "Rust-native",
//! since it is itself the spec — this crate's one concession to
//! idiom is the `GlobalAlloc` impl below, layered on top without
//! changing the core contract.

use std::alloc::{GlobalAlloc, Layout};
use std::ptr;

use crate::anchor;
use crate::block::BlockHeader;
use crate::config::RETRY_DEPTH_LIMIT;
use crate::header::AllocHeader;
use crate::sync;

/// Requests `n` contiguous payload bytes. Returns null only if the OS
/// mapping primitive fails or `n` is too large to size a block for.
///
/// `allocate(0)` returns a non-null, uniquely-owned address: the
/// record carved for it simply has a zero-byte payload.
pub fn allocate(n: usize) -> *mut u8 {
  if let Some(p) = try_allocate_from_existing(n) {
    return p;
  }

  match anchor::grow(n) {
    Some(block) => unsafe { carve_owned(block, n) },
    None => ptr::null_mut(),
  }
}

/// Searches already-mapped blocks for one that fits `n`, retrying
/// through lost CAS races and stale cache reads up to
/// `RETRY_DEPTH_LIMIT` times before giving up (spec.md §5's retry
/// protocol). Returning `None` here means either nothing fit or the
/// retry budget ran out; either way the caller falls through to
/// mapping growth.
fn try_allocate_from_existing(n: usize) -> Option<*mut u8> {
  let mut block = anchor::find_block(n)?;
  let mut depth = 0;

  loop {
    unsafe {
      let lock = (*block).lock();
      if sync::try_acquire_block(lock) {
        if BlockHeader::fits((*block).largest_free_size(), n) {
          let p = BlockHeader::carve_locked(block, n);
          sync::release_block(lock);
          return Some(p);
        }
        sync::release_block(lock);
      }
    }

    depth += 1;
    if depth >= RETRY_DEPTH_LIMIT {
      return None;
    }
    block = anchor::find_block(n)?;
  }
}

unsafe fn carve_owned(block: *mut BlockHeader, n: usize) -> *mut u8 {
  unsafe {
    let lock = (*block).lock();
    sync::acquire_block(lock);
    let p = BlockHeader::carve_locked(block, n);
    sync::release_block(lock);
    p
  }
}

/// Frees a payload pointer previously returned by `allocate`,
/// `zero_alloc`, or `resize`. A null pointer is a no-op. Freeing an
/// address this allocator did not hand out, or double-freeing, is
/// undefined behavior (spec.md §7) — the fast path does not check.
pub fn free(p: *mut u8) {
  if p.is_null() {
    return;
  }
  unsafe {
    let header = AllocHeader::from_payload(p);
    let block = (*header).owner;
    debug_assert!(!block.is_null(), "double free or invalid pointer");

    let lock = (*block).lock();
    sync::acquire_block(lock);
    BlockHeader::free_locked(block, header);
    sync::release_block(lock);
  }
}

/// Allocates `n * m` zeroed bytes, rejecting the request if the
/// product overflows the address word (spec.md §4.8, §7.2). The OS
/// mapping primitive already returns zero-initialized pages, but a
/// record can be a reused, previously-written slot, so the payload is
/// always zeroed explicitly rather than relying on that.
pub fn zero_alloc(n: usize, m: usize) -> *mut u8 {
  let total = match n.checked_mul(m) {
    Some(total) => total,
    None => return ptr::null_mut(),
  };

  let p = allocate(total);
  if !p.is_null() {
    unsafe { ptr::write_bytes(p, 0, total) };
  }
  p
}

/// Resizes the allocation at `p` to `new` payload bytes, returning the
/// (possibly unchanged) payload address, or null if growth required a
/// fresh region and the OS mapping primitive failed (in which case `p`
/// is left valid and untouched, per spec.md §7.1).
pub fn resize(p: *mut u8, new: usize) -> *mut u8 {
  unsafe {
    let header = AllocHeader::from_payload(p);
    let block = (*header).owner;
    let lock = (*block).lock();
    sync::acquire_block(lock);

    let old = (*header).size;

    if new <= old {
      BlockHeader::shrink_in_place(block, header, new);
      sync::release_block(lock);
      return p;
    }

    if let Some(following_size) = BlockHeader::following_free_size(block, header) {
      let absorb = new - old;
      if BlockHeader::can_absorb(following_size, absorb) {
        BlockHeader::grow_into_follower(block, header, new);
        sync::release_block(lock);
        return p;
      }
    }

    sync::release_block(lock);

    // Neither branch fit: allocate fresh, copy the old payload,
    // and free the old allocation. spec.md §4.9's open question
    // notes the source's equivalent path skipped this free; this
    // crate performs it, per the resolution spec.md §9 requires.
    let fresh = allocate(new);
    if fresh.is_null() {
      return ptr::null_mut();
    }
    ptr::copy_nonoverlapping(p, fresh, old);
    free(p);
    fresh
  }
}

/// Natural alignment every record payload gets for free, simply by
/// sitting immediately after a fixed-width two-word header. Requests
/// for a stricter alignment than this aren't something spec.md's
/// header-adjacent-payload layout (§3: "the payload starts immediately
/// after the header") can satisfy without breaking the invariant that
/// `free(p)` finds its header at `p - HEADER_SIZE`, so the
/// `GlobalAlloc` veneer below only promises this much.
const NATURAL_ALIGN: usize = 2 * std::mem::size_of::<usize>();

/// A unit struct implementing [`GlobalAlloc`] over the four operations
/// above, so this crate can be installed as `#[global_allocator]` —
/// the literal reading of spec.md §1's "intended to be linkable as a
/// drop-in replacement for the platform allocator of a single process."
pub struct Allocator;

unsafe impl GlobalAlloc for Allocator {
  unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
    debug_assert!(
      layout.align() <= NATURAL_ALIGN,
      "coheap cannot honor alignments above {NATURAL_ALIGN} bytes",
    );
    allocate(layout.size())
  }

  unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
    free(ptr)
  }

  unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
    debug_assert!(layout.align() <= NATURAL_ALIGN);
    zero_alloc(1, layout.size())
  }

  unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
    debug_assert!(layout.align() <= NATURAL_ALIGN);
    resize(ptr, new_size)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Arc;
  use std::thread;

  #[test]
  fn round_trip_write_read_free_reuse() {
    unsafe {
      let p = allocate(4);
      assert!(!p.is_null());
      ptr::copy_nonoverlapping(b"abc\0".as_ptr(), p, 4);
      assert_eq!(std::slice::from_raw_parts(p, 4), b"abc\0");

      free(p);
      let q = allocate(4);
      assert_eq!(p, q, "single-threaded reuse should return the same address");
      free(q);
    }
  }

  #[test]
  fn large_request_round_trips_every_element() {
    unsafe {
      let count = 1_307_420_601usize.div_ceil(4);
      let bytes = count * 4;
      let p = allocate(bytes) as *mut i32;
      if p.is_null() {
        // Environment without room for a ~1.2 GiB mapping; skip
        // rather than fail spuriously.
        return;
      }
      for i in 0..count {
        let v = if i % 2 == 0 { i as i32 } else { -(i as i32) };
        p.add(i).write(v);
      }
      for i in 0..count {
        let expected = if i % 2 == 0 { i as i32 } else { -(i as i32) };
        assert_eq!(p.add(i).read(), expected);
      }
      free(p as *mut u8);
    }
  }

  #[test]
  fn zero_size_allocations_are_all_null_or_all_distinct() {
    unsafe {
      let mut ptrs = Vec::with_capacity(256);
      for _ in 0..256 {
        ptrs.push(allocate(0));
      }

      let all_null = ptrs.iter().all(|p| p.is_null());
      let all_non_null_distinct = {
        let mut seen = std::collections::HashSet::new();
        ptrs.iter().all(|p| !p.is_null() && seen.insert(*p as usize))
      };
      assert!(all_null || all_non_null_distinct);

      for p in ptrs {
        free(p);
      }
    }
  }

  #[test]
  fn zero_alloc_zeroes_the_payload() {
    unsafe {
      let p = zero_alloc(1, std::mem::size_of::<i32>()) as *mut i32;
      assert!(!p.is_null());
      assert_eq!(p.read(), 0);
      p.write(8);
      assert_eq!(p.read(), 8);
      free(p as *mut u8);
    }
  }

  #[test]
  fn zero_alloc_rejects_overflowing_products() {
    assert!(zero_alloc(usize::MAX, usize::MAX).is_null());

    let half = 1usize << (usize::BITS / 2);
    assert!(zero_alloc(half, half).is_null());
  }

  #[test]
  fn resize_expand_preserves_prefix_and_writes_new_tail() {
    unsafe {
      let p = allocate(std::mem::size_of::<i32>()) as *mut i32;
      assert!(!p.is_null());
      p.write(8);

      let q = resize(p as *mut u8, std::mem::size_of::<i32>() * 2) as *mut i32;
      assert!(!q.is_null());
      q.add(1).write(-5);

      assert_eq!(q.read(), 8);
      assert_eq!(q.add(1).read(), -5);

      free(q as *mut u8);
    }
  }

  #[test]
  fn resize_shrink_returns_the_same_pointer() {
    unsafe {
      let p = allocate(64);
      let q = resize(p, 16);
      assert_eq!(p, q);
      free(q);
    }
  }

  #[test]
  fn many_small_concurrent_allocates_do_not_crash_or_duplicate() {
    let num_threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    let stop = Arc::new(AtomicBool::new(false));
    let seen = Arc::new(std::sync::Mutex::new(std::collections::HashSet::new()));

    let mut handles = Vec::new();
    for _ in 0..num_threads {
      let stop = Arc::clone(&stop);
      let seen = Arc::clone(&seen);
      handles.push(thread::spawn(move || {
        let mut local = Vec::new();
        while !stop.load(Ordering::Relaxed) && local.len() < 2000 {
          let p = allocate(64);
          assert!(!p.is_null());
          local.push(p as usize);
        }
        let mut seen = seen.lock().unwrap();
        for addr in local {
          assert!(seen.insert(addr), "duplicate live address {addr:#x}");
        }
      }));
    }

    thread::sleep(std::time::Duration::from_millis(50));
    stop.store(true, Ordering::Relaxed);
    for h in handles {
      h.join().unwrap();
    }
  }

  /// Ported from `examples/original_source/tests/multi-thread/mix.c`:
  /// a deterministic index/size script, one thread per CPU, each
  /// maintaining a 65-slot live-pointer table that it frees-then-fills
  /// on every step.
  #[test]
  fn mixed_concurrent_alloc_free_script() {
    const NUM_CALLS: usize = 1024;
    const INDICES: [usize; NUM_CALLS] = {
      let mut arr = [0usize; NUM_CALLS];
      let mut i = 0;
      while i < NUM_CALLS {
        arr[i] = (i * 37 + 11) % 65;
        i += 1;
      }
      arr
    };

    let num_threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    let mut handles = Vec::new();

    for thread_id in 0..num_threads {
      handles.push(thread::spawn(move || {
        let mut slots: [*mut u8; 65] = [ptr::null_mut(); 65];
        for i in 0..NUM_CALLS {
          let index = INDICES[i];
          if !slots[index].is_null() {
            free(slots[index]);
            slots[index] = ptr::null_mut();
          }

          let mut bytes = 0usize;
          let mut j = 0;
          while j != index && i + j < NUM_CALLS {
            bytes += INDICES[i + j];
            j += 1;
          }
          bytes = (bytes * (thread_id + 1)) % 262_144;

          let p = allocate(bytes);
          assert!(!p.is_null());
          slots[index] = p;
        }
        for slot in slots {
          free(slot);
        }
      }));
    }

    for h in handles {
      h.join().unwrap();
    }
  }
}
