//! Lock primitives: the per-block spinlock and the process-wide
//! structural lock, plus the two back-off hooks spec.md treats as
//! abstract collaborators ("short wait", "long wait").
//!
//! Both locks are a single atomic byte toggled with compare-and-swap.
//! A block-scoped critical section is a single record walk, short
//! enough that a raw spinlock beats the syscall overhead of an OS
//! mutex; the structural lock guards a little more work (mapping/block
//! list appends) but is taken rarely enough that the same reasoning
//! still applies.

use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;

use crate::config::{LONG_WAIT, SHORT_WAIT_SPINS};

pub const UNLOCKED: u8 = 0;
pub const LOCKED: u8 = 1;

/// CPU pause-equivalent short wait, issued `SHORT_WAIT_SPINS` times per
/// contended attempt on the block lock.
#[inline]
fn short_wait() {
  for _ in 0..SHORT_WAIT_SPINS {
    std::hint::spin_loop();
  }
}

/// Coarse sleep used while backing off from the structural lock.
#[inline]
fn long_wait() {
  thread::sleep(LONG_WAIT);
}

/// Spins until `lock` transitions from `UNLOCKED` to `LOCKED`, issuing
/// a short wait between attempts. Used for the per-block lock, whose
/// critical sections are always a single record walk.
pub fn acquire_block(lock: &AtomicU8) {
  loop {
    if lock
      .compare_exchange_weak(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
      .is_ok()
    {
      return;
    }
    short_wait();
  }
}

/// Non-blocking attempt to take the block lock; used by the retry path
/// so a loser can re-validate `largest_free_size` instead of spinning
/// blindly on a block that may no longer fit the request.
pub fn try_acquire_block(lock: &AtomicU8) -> bool {
  lock.compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
    .is_ok()
}

pub fn release_block(lock: &AtomicU8) {
  lock.store(UNLOCKED, Ordering::Release);
}

/// Spins until `lock` transitions from `UNLOCKED` to `LOCKED`, backing
/// off with a long wait between attempts. Used for the structural
/// lock, which guards mapping-list and reserve-append mutations.
pub fn acquire_structural(lock: &AtomicU8) {
  loop {
    if lock
      .compare_exchange_weak(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
      .is_ok()
    {
      return;
    }
    long_wait();
  }
}

pub fn release_structural(lock: &AtomicU8) {
  lock.store(UNLOCKED, Ordering::Release);
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  #[test]
  fn block_lock_excludes_concurrent_holders() {
    let lock = Arc::new(AtomicU8::new(UNLOCKED));
    // `inside` tracks how many threads are currently between
    // acquire and release; if the lock ever let two threads in at
    // once this would observe a count above 1, unlike a tautology
    // on an atomic counter that's always going to pass regardless.
    let inside = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let total = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
      let lock = Arc::clone(&lock);
      let inside = Arc::clone(&inside);
      let total = Arc::clone(&total);
      handles.push(thread::spawn(move || {
        for _ in 0..1000 {
          acquire_block(&lock);
          let concurrent = inside.fetch_add(1, Ordering::SeqCst);
          assert_eq!(concurrent, 0, "block lock let in a concurrent holder");
          total.fetch_add(1, Ordering::Relaxed);
          inside.fetch_sub(1, Ordering::SeqCst);
          release_block(&lock);
        }
      }));
    }
    for h in handles {
      h.join().unwrap();
    }
    assert_eq!(total.load(Ordering::Relaxed), 8000);
  }
}
