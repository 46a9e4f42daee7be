//! Mapping headers and the sizing policy that decides how big a block
//! or mapping should be for a given request.
//!
//! A mapping is one coarse OS-provided byte range. It starts with a
//! header, then holds a chain of blocks in a prefix of its bytes; the
//! remainder ("reserve") lets new blocks be appended without calling
//! back into the OS.
//!
//! ```text
//!   ┌────────────────┬─────────┬─────────┬───────────────────────┐
//!   │ MappingHeader   │ Block 0 │ Block 1 │        reserve        │
//!   └────────────────┴─────────┴─────────┴───────────────────────┘
//!   start                                                       end
//! ```

use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::align::{self, next_pow2_at_least};
use crate::block::{BlockHeader, BLOCK_HEADER_SIZE};
use crate::config::MIN_MAPPING_BYTES;
use crate::header::HEADER_SIZE;

pub const MAPPING_HEADER_SIZE: usize = mem::size_of::<MappingHeader>();

#[repr(C)]
pub struct MappingHeader {
  start: usize,
  end: usize,
  first_block: AtomicPtr<BlockHeader>,
  /// Guarded entirely by the structural lock; never read without it.
  last_block: *mut BlockHeader,
  next: AtomicPtr<MappingHeader>,
}

impl MappingHeader {
  /// spec.md §4.1: a block is floored at 1024 payload bytes (the
  /// `| 1024` form guarantees bit 10 is set, leaving slack above
  /// whatever was requested), word-aligned, plus room for the
  /// block's own header and its one mandatory trailing record header.
  ///
  /// `n` is checked against the half-address-space threshold before
  /// any of that arithmetic runs: for `n` near `usize::MAX` the
  /// `| 1024`/`align!`/header-size additions would otherwise overflow
  /// (panicking in debug, wrapping to a tiny value in release) and
  /// slip straight past `request_too_large`. Short-circuiting to
  /// `usize::MAX` here keeps this function overflow-free and still
  /// trips `request_too_large` downstream, matching spec.md §4.1/§7's
  /// "too large" rejection instead of corrupting the heap.
  pub fn block_size(n: usize) -> usize {
    if n >= 1usize << (align::WORD_BITS - 1) {
      return usize::MAX;
    }
    let floored = n.max(1024) | 1024;
    let rounded = crate::align!(floored);
    rounded + BLOCK_HEADER_SIZE + HEADER_SIZE
  }

  /// spec.md §4.1: smallest power of two `>= block_size +
  /// mapping_header_size`, floored at `MIN_MAPPING_BYTES`.
  pub fn mapping_size(block_size: usize) -> usize {
    next_pow2_at_least(block_size + MAPPING_HEADER_SIZE, MIN_MAPPING_BYTES)
  }

  /// A `block_size` this large would make `mapping_size`'s
  /// power-of-two rounding overflow the address word; spec.md §4.1
  /// requires rejecting the request outright instead.
  pub fn request_too_large(block_size: usize) -> bool {
    block_size >= 1usize << (align::WORD_BITS - 1)
  }

  /// Writes a mapping header at the start of `mapping_len` freshly
  /// mapped bytes at `raw`. The mapping has no blocks yet.
  pub unsafe fn create(raw: *mut u8, mapping_len: usize) -> *mut MappingHeader {
    unsafe {
      let header = raw as *mut MappingHeader;
      ptr::write(
        header,
        MappingHeader {
          start: raw as usize,
          end: raw as usize + mapping_len,
          first_block: AtomicPtr::new(ptr::null_mut()),
          last_block: ptr::null_mut(),
          next: AtomicPtr::new(ptr::null_mut()),
        },
      );
      header
    }
  }

  pub fn first_block(&self) -> *mut BlockHeader {
    self.first_block.load(Ordering::Acquire)
  }

  pub fn next(&self) -> *mut MappingHeader {
    self.next.load(Ordering::Acquire)
  }

  /// Publishes `next` as the successor of this mapping. Called
  /// exactly once, by the structural-lock holder appending a new
  /// mapping.
  pub unsafe fn set_next(this: *mut MappingHeader, next: *mut MappingHeader) {
    unsafe { (*this).next.store(next, Ordering::Release) };
  }

  fn blocks_start(&self) -> usize {
    self.start + MAPPING_HEADER_SIZE
  }

  /// Bytes available in this mapping's reserve beyond its last block
  /// (or beyond the header, if it has no blocks yet). Caller holds
  /// the structural lock.
  pub unsafe fn reserve_capacity(this: *mut MappingHeader) -> usize {
    unsafe {
      let last = (*this).last_block;
      let used_end = if last.is_null() {
        (*this).blocks_start()
      } else {
        last as usize + (*last).total_size()
      };
      (*this).end - used_end
    }
  }

  /// Appends a block of `block_size` bytes into this mapping's
  /// reserve and links it after the current last block (or installs
  /// it as the first block, if the mapping is empty). Caller holds
  /// the structural lock; the new block is unreachable to other
  /// threads until this call publishes it.
  pub unsafe fn append_block(this: *mut MappingHeader, block_size: usize) -> *mut BlockHeader {
    unsafe {
      let last = (*this).last_block;
      let at = if last.is_null() {
        (*this).blocks_start()
      } else {
        last as usize + (*last).total_size()
      };

      let block = BlockHeader::create(at as *mut u8, block_size);

      if last.is_null() {
        (*this).first_block.store(block, Ordering::Release);
      } else {
        BlockHeader::set_next(last, block);
      }
      (*this).last_block = block;

      block
    }
  }
}
