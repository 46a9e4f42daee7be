//! The process-wide anchor: the root of the mapping list, and the
//! structural lock that serializes every mutation to it.
//!
//! This is the only truly global, shared piece of allocator state.
//! Mappings and blocks, once linked in, never change their linkage
//! again except for the one-time append that publishes them; the
//! anchor's `first_mapping` pointer is the sole field anyone mutates
//! after startup, and only while holding `structural_lock`.

use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

use crate::block::BlockHeader;
use crate::mapping::MappingHeader;
use crate::os;
use crate::sync;

struct Anchor {
  first_mapping: AtomicPtr<MappingHeader>,
  structural_lock: AtomicU8,
}

static ANCHOR: Anchor = Anchor {
  first_mapping: AtomicPtr::new(std::ptr::null_mut()),
  structural_lock: AtomicU8::new(sync::UNLOCKED),
};

/// First-fit search across every mapping and block reachable from the
/// anchor (spec.md §4.2). Lock-free: it only reads each block's cached
/// `largest_free_size`. Callers must re-validate under the block lock
/// before carving, since the cache may be stale by the time it's used.
pub fn find_block(n: usize) -> Option<*mut BlockHeader> {
  unsafe {
    let mut mapping = ANCHOR.first_mapping.load(Ordering::Acquire);
    while !mapping.is_null() {
      let mut block = (*mapping).first_block();
      while !block.is_null() {
        if BlockHeader::fits((*block).largest_free_size(), n) {
          return Some(block);
        }
        block = (*block).next();
      }
      mapping = (*mapping).next();
    }
    None
  }
}

/// Grows the heap to make room for a request of `n` payload bytes and
/// returns the newly available block (spec.md §4.6). Runs entirely
/// under the structural lock.
///
/// Returns `None` if the OS mapping primitive fails, or if `n` is so
/// large that sizing a block/mapping for it would overflow.
pub fn grow(n: usize) -> Option<*mut BlockHeader> {
  let block_size = MappingHeader::block_size(n);
  if MappingHeader::request_too_large(block_size) {
    return None;
  }

  sync::acquire_structural(&ANCHOR.structural_lock);
  let result = grow_locked(block_size);
  sync::release_structural(&ANCHOR.structural_lock);
  result
}

unsafe fn grow_locked(block_size: usize) -> Option<*mut BlockHeader> {
  unsafe {
    let first = ANCHOR.first_mapping.load(Ordering::Acquire);

    if first.is_null() {
      return create_mapping_with_block(block_size, None);
    }

    // Find the tail mapping; reserve-append targets it specifically
    // (spec.md §4.6 only ever grows the *last* mapping's reserve).
    let mut tail = first;
    while !(*tail).next().is_null() {
      tail = (*tail).next();
    }

    if MappingHeader::reserve_capacity(tail) >= block_size {
      Some(MappingHeader::append_block(tail, block_size))
    } else {
      create_mapping_with_block(block_size, Some(tail))
    }
  }
}

/// Requests a fresh mapping sized for `block_size`, appends a single
/// block of that size at its start, and links the mapping in after
/// `after_tail` (or installs it as `first_mapping` if there is none).
unsafe fn create_mapping_with_block(
  block_size: usize,
  after_tail: Option<*mut MappingHeader>,
) -> Option<*mut BlockHeader> {
  unsafe {
    let mapping_len = MappingHeader::mapping_size(block_size);
    let raw = os::get_bytes(mapping_len)?;
    let mapping = MappingHeader::create(raw, mapping_len);
    let block = MappingHeader::append_block(mapping, block_size);

    match after_tail {
      Some(tail) => MappingHeader::set_next(tail, mapping),
      None => ANCHOR.first_mapping.store(mapping, Ordering::Release),
    }

    Some(block)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::header::AllocHeader;

  // These tests share the single process-wide anchor, so they are
  // written to never assume an empty heap; they only check that the
  // operations they perform individually behave correctly.
  static SERIAL: std::sync::Mutex<()> = std::sync::Mutex::new(());

  #[test]
  fn grow_then_find_locates_a_fitting_block() {
    let _guard = SERIAL.lock().unwrap();
    let block = grow(64).expect("mapping should be available in test environment");
    assert!(BlockHeader::fits(unsafe { (*block).largest_free_size() }, 64));

    let found = find_block(64).expect("grow should have published a reachable block");
    unsafe {
      assert!((*found).largest_free_size() >= 64);
    }
  }

  #[test]
  fn carved_record_round_trips_through_find_block() {
    let _guard = SERIAL.lock().unwrap();
    let block = grow(128).unwrap();
    unsafe {
      sync::acquire_block((*block).lock());
      let p = BlockHeader::carve_locked(block, 128);
      sync::release_block((*block).lock());

      let header = AllocHeader::from_payload(p);
      assert_eq!((*header).size, 128);
      assert_eq!((*header).owner, block);
    }
  }
}
