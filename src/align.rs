/// Calculates the machine word alignment for the given size.
///
/// # Examples
///
/// ```rust
/// use std::mem;
/// use coheap::align;
///
/// match mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + mem::size_of::<usize>() - 1) & !(mem::size_of::<usize>() - 1)
  };
}

/// Bit width of the target's address word. Derived as a compile-time
/// constant rather than via preprocessor `SIZE_MAX` tests (spec.md's
/// design notes call this out explicitly as something no target
/// language under consideration needs conditional compilation for).
pub const WORD_BITS: u32 = usize::BITS;

/// Smallest power of two that is `>= n` and `>= floor`. Used to size
/// mappings (spec.md §4.1: "the smallest power of two ... but never
/// less than a configurable minimum").
pub fn next_pow2_at_least(n: usize, floor: usize) -> usize {
  n.max(floor).next_power_of_two()
}
