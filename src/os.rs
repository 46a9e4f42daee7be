//! The operating-system mapping primitive. spec.md treats this as an
//! opaque collaborator ("returns a page-aligned, zero-initialized byte
//! range or signals failure"); this module is the one and only place
//! that turns that contract into a syscall.

use std::ptr;

/// Requests `len` bytes of fresh, page-aligned, zero-initialized,
/// read/write address space from the kernel. Returns `None` if the
/// kernel refuses (out of memory, `RLIMIT_AS`, etc).
///
/// Never called while any allocator lock other than the structural
/// lock is held.
pub fn get_bytes(len: usize) -> Option<*mut u8> {
  unsafe {
    let addr = libc::mmap(
      ptr::null_mut(),
      len,
      libc::PROT_READ | libc::PROT_WRITE,
      libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
      -1,
      0,
    );
    if addr == libc::MAP_FAILED {
      None
    } else {
      Some(addr as *mut u8)
    }
  }
}
