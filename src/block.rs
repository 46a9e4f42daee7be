//! Block headers, block creation, carving, and compaction.
//!
//! A block is a contiguous run of allocation records headed by a
//! `BlockHeader` that caches the size and location of the block's
//! largest free record, plus a lock byte guarding mutation of the
//! record sequence.
//!
//! ```text
//!   ┌───────────────┬────────┬────────┬───────┬────────┐
//!   │  BlockHeader  │ rec 0  │ rec 1  │  ...  │ rec N  │
//!   └───────────────┴────────┴────────┴───────┴────────┘
//!   block ptr        ▲
//!                     first_record(block)
//! ```
//!
//! This module owns the invariants I1-I4 from the design: every record
//! walk terminates exactly at `total_size`, at most one free record is
//! cached as "largest", adjacent frees never coexist after compaction
//! runs, and a block always has at least one record.

use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU8, AtomicUsize, Ordering};

use crate::header::{AllocHeader, HEADER_SIZE};
use crate::sync;

pub const BLOCK_HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

#[repr(C)]
pub struct BlockHeader {
  largest_free_size: AtomicUsize,
  largest_free_ptr: AtomicPtr<AllocHeader>,
  total_size: usize,
  next: AtomicPtr<BlockHeader>,
  lock: AtomicU8,
}

impl BlockHeader {
  /// Writes a fresh block header at `at` sized `total_size` bytes
  /// (header through last record's payload, inclusive), with a
  /// single trailing free record occupying the remainder. No locking
  /// is required: the destination is either freshly mapped or
  /// reserve space already guarded by the structural lock, so it is
  /// unreachable to other threads until this block is published.
  pub unsafe fn create(at: *mut u8, total_size: usize) -> *mut BlockHeader {
    unsafe {
      debug_assert!(total_size >= BLOCK_HEADER_SIZE + HEADER_SIZE);

      let block = at as *mut BlockHeader;
      let record_at = at.add(BLOCK_HEADER_SIZE);
      let record_size = total_size - BLOCK_HEADER_SIZE - HEADER_SIZE;
      let record = AllocHeader::write_free(record_at, record_size);

      ptr::write(
        block,
        BlockHeader {
          largest_free_size: AtomicUsize::new(record_size),
          largest_free_ptr: AtomicPtr::new(record),
          total_size,
          next: AtomicPtr::new(ptr::null_mut()),
          lock: AtomicU8::new(sync::UNLOCKED),
        },
      );
      block
    }
  }

  pub fn total_size(&self) -> usize {
    self.total_size
  }

  pub fn next(&self) -> *mut BlockHeader {
    self.next.load(Ordering::Acquire)
  }

  /// Publishes `next` as the successor of this block. Called exactly
  /// once, by the structural-lock holder appending a new block.
  pub unsafe fn set_next(this: *mut BlockHeader, next: *mut BlockHeader) {
    unsafe { (*this).next.store(next, Ordering::Release) };
  }

  /// Lock-free read of the cached largest-free size. Used by the
  /// block search; callers must re-validate after taking the lock.
  pub fn largest_free_size(&self) -> usize {
    self.largest_free_size.load(Ordering::Acquire)
  }

  pub fn lock(&self) -> &AtomicU8 {
    &self.lock
  }

  unsafe fn first_record(this: *mut BlockHeader) -> *mut AllocHeader {
    unsafe { (this as *mut u8).add(BLOCK_HEADER_SIZE) as *mut AllocHeader }
  }

  /// One-past-the-end address of this block's record sequence.
  unsafe fn end(this: *mut BlockHeader) -> *mut u8 {
    unsafe { (this as *mut u8).add((*this).total_size) }
  }

  /// Whether a request of `n` payload bytes can be carved from this
  /// block's cached largest-free record without leaving a remainder
  /// too small to hold its own trailing header. spec.md's carve
  /// formula (`remaining = largest_free_size - n - HEADER_SIZE`)
  /// is silent on the case where that remainder would be positive
  /// but smaller than a header; this predicate is the fit criterion
  /// that keeps the split formula exact for every accepted request
  /// (see DESIGN.md).
  pub fn fits(largest_free_size: usize, n: usize) -> bool {
    largest_free_size > 0 && (n == largest_free_size || n + HEADER_SIZE <= largest_free_size)
  }

  /// Carves `n` payload bytes out of this block's largest free
  /// record. Caller must hold the block lock and must have already
  /// confirmed `Self::fits(self.largest_free_size(), n)`.
  ///
  /// Returns the payload address of the new in-use record.
  pub unsafe fn carve_locked(this: *mut BlockHeader, n: usize) -> *mut u8 {
    unsafe {
      let largest = (*this).largest_free_size.load(Ordering::Relaxed);
      let slot = (*this).largest_free_ptr.load(Ordering::Relaxed);
      debug_assert!(!slot.is_null());
      debug_assert!(Self::fits(largest, n));

      let slot_payload = AllocHeader::payload(slot);
      (*slot).size = n;
      (*slot).owner = this;

      if largest != n {
        let remaining = largest - n - HEADER_SIZE;
        let next_at = slot_payload.add(n);
        AllocHeader::write_free(next_at, remaining);
      }

      Self::update_meta(this);
      slot_payload
    }
  }

  /// Marks the record at `header` free and restores block invariants.
  /// Caller must hold the block lock.
  pub unsafe fn free_locked(this: *mut BlockHeader, header: *mut AllocHeader) {
    unsafe {
      (*header).owner = ptr::null_mut();
      Self::update_meta(this);
    }
  }

  /// Recomputes `largest_free_size`/`largest_free_ptr` and coalesces
  /// adjacent free records. Runs after every carve and every free;
  /// restores invariants I1-I4.
  ///
  /// Algorithm (spec.md §4.4): walk the record list once. The first
  /// free record found seeds both the running `prev` (used to detect
  /// free-free adjacency) and the running `max` (the largest free
  /// record seen so far). Adjacent frees are merged into `prev`; a
  /// merge may absorb one further record (at most three consecutive
  /// frees are possible, since the list was valid before the single
  /// mutation that triggered this call).
  unsafe fn update_meta(this: *mut BlockHeader) {
    unsafe {
      let block_end = Self::end(this);
      let mut cursor = Self::first_record(this);

      while cursor != block_end && !(*cursor).is_free() {
        cursor = AllocHeader::next(cursor);
      }

      if cursor == block_end {
        (*this).largest_free_size.store(0, Ordering::Release);
        (*this).largest_free_ptr.store(ptr::null_mut(), Ordering::Release);
        return;
      }

      let mut prev: *mut AllocHeader = cursor;
      let mut max: *mut AllocHeader = prev;
      let mut curr: *mut AllocHeader = AllocHeader::next(prev);

      while curr != block_end {
        let prev_is_free = !prev.is_null() && (*prev).is_free();

        if prev_is_free && (*curr).is_free() {
          (*prev).size += HEADER_SIZE + (*curr).size;

          let after = AllocHeader::next(prev);
          if after != block_end && (*after).is_free() {
            (*prev).size += HEADER_SIZE + (*after).size;
          }

          if (*prev).size > (*max).size {
            max = prev;
          }

          curr = prev;
          prev = ptr::null_mut();
          curr = AllocHeader::next(curr);
        } else {
          if (*curr).is_free() && (*curr).size > (*max).size {
            max = curr;
          }
          prev = curr;
          curr = AllocHeader::next(curr);
        }
      }

      (*this).largest_free_size.store((*max).size, Ordering::Release);
      (*this).largest_free_ptr.store(max, Ordering::Release);
    }
  }

  /// Shrinks the record at `header` to `new` payload bytes, growing
  /// the record immediately following it by the difference (spec.md
  /// §4.9, shrink branch). Caller holds the block lock.
  pub unsafe fn shrink_in_place(this: *mut BlockHeader, header: *mut AllocHeader, new: usize) {
    unsafe {
      let old = (*header).size;
      debug_assert!(new <= old);
      let delta = old - new;

      // `following` must be located using `old` (this record's
      // current size) before `header.size` is overwritten: the
      // following record's header physically sits at
      // `header + HEADER_SIZE + old`, not `+ new`. Its size and
      // owner are read out here, then it is rewritten at the new,
      // closer boundary `header.payload + new` so the record
      // chain stays contiguous (mirrors `grow_into_follower`,
      // which relocates the same way on the grow path).
      let following = AllocHeader::next(header);
      if following as *mut u8 != Self::end(this) {
        let following_size = (*following).size;
        let following_owner = (*following).owner;

        (*header).size = new;
        let new_following_at = AllocHeader::payload(header).add(new);
        if following_owner.is_null() {
          AllocHeader::write_free(new_following_at, following_size + delta);
        } else {
          AllocHeader::write_in_use(new_following_at, following_size + delta, following_owner);
        }
      } else {
        // This was the block's last record; invariant I4 means
        // that cannot happen for a live allocation, but shrink
        // the header regardless rather than leave it stale.
        (*header).size = new;
      }

      Self::update_meta(this);
    }
  }

  /// Whether growing a record by `absorb` bytes into a following
  /// free record of `following_size` payload bytes leaves either no
  /// remainder (the follower's header is absorbed too) or a
  /// remainder wide enough to hold a fresh trailing header. Mirrors
  /// `fits`'s resolution of the same "remainder smaller than a
  /// header" edge case, this time on the grow path.
  pub fn can_absorb(following_size: usize, absorb: usize) -> bool {
    absorb == following_size + HEADER_SIZE || absorb + HEADER_SIZE <= following_size
  }

  /// Absorbs enough of the free record immediately following
  /// `header` to grow it to `new` payload bytes (spec.md §4.9,
  /// in-place-grow branch). Caller must have already checked the
  /// follower is free and large enough (`Self::can_absorb`), and
  /// holds the block lock.
  pub unsafe fn grow_into_follower(this: *mut BlockHeader, header: *mut AllocHeader, new: usize) {
    unsafe {
      let old = (*header).size;
      let following = AllocHeader::next(header);
      debug_assert!((*following).is_free());
      let absorb = new - old;
      debug_assert!(Self::can_absorb((*following).size, absorb));

      (*header).size = new;
      if absorb != (*following).size + HEADER_SIZE {
        let remaining = (*following).size - absorb;
        let new_follower_at = AllocHeader::payload(header).add(new);
        AllocHeader::write_free(new_follower_at, remaining);
      }
      Self::update_meta(this);
    }
  }

  /// Payload size available in the record immediately following
  /// `header`, if that record is free; `None` otherwise or if
  /// `header` is the block's last record.
  pub unsafe fn following_free_size(this: *mut BlockHeader, header: *mut AllocHeader) -> Option<usize> {
    unsafe {
      let following = AllocHeader::next(header);
      if following as *mut u8 == Self::end(this) {
        return None;
      }
      if (*following).is_free() {
        Some((*following).size)
      } else {
        None
      }
    }
  }
}
