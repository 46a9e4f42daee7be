//! Build-time configuration knobs.
//!
//! These mirror the "Recognized configuration knobs" table in the
//! design: both are static, compiled-in constants rather than runtime
//! parameters, since the allocator has no config-file or CLI surface.

use std::time::Duration;

/// Lower bound on the byte size of a single OS mapping. A mapping is
/// never requested smaller than this, even for a single tiny allocation,
/// so that the common case amortizes one `mmap` call over many requests.
pub const MIN_MAPPING_BYTES: usize = 1 << 20; // 1 MiB

/// Sleep duration used by the structural-lock back-off path when a
/// thread loses the race to mutate the mapping list.
pub const LONG_WAIT: Duration = Duration::from_micros(2);

/// Number of CPU pause hints issued per spin attempt before a thread
/// contending for a block lock re-checks and retries.
pub const SHORT_WAIT_SPINS: u32 = 32;

/// Bound on how many times the allocate path will retry a losing block
/// CAS (or restart the block search) before falling through to mapping
/// growth. Spec.md calls for an implementation-defined finite depth
/// limiter here; this is that limiter.
pub const RETRY_DEPTH_LIMIT: u32 = 64;
