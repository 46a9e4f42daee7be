//! # coheap — a concurrent, mmap-backed first-fit heap allocator
//!
//! This crate implements the general-purpose allocator quartet —
//! [`allocate`], [`free`], [`zero_alloc`], [`resize`] — on top of
//! three concentric structures, each discovered leaves-first on every
//! request:
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ Mapping (one mmap call)                                      │
//!   │  ┌───────────────┬─────────┬─────────┬──────────────────┐    │
//!   │  │ MappingHeader │ Block 0 │ Block 1 │  unused reserve  │    │
//!   │  └───────────────┴─────────┴─────────┴──────────────────┘    │
//!   │                   ▲                                           │
//!   │                   │  ┌──────────┬────────┬────────┬────────┐  │
//!   │                   └─►│BlockHeader│ rec 0  │ rec 1  │ ...   │  │
//!   │                      └──────────┴────────┴────────┴────────┘  │
//!   │                                  ▲                             │
//!   │                                  │  ┌────────┬────────────┐    │
//!   │                                  └─►│ size   │ owner/null │    │
//!   │                                     └────────┴────────────┘    │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A **mapping** is one coarse OS-provided byte range; it hosts a
//! chain of **blocks** plus an unused reserve that lets new blocks be
//! appended without another OS call. A **block** caches the size and
//! location of its largest free record, so a search across the whole
//! heap only ever reads that one cached number per block — splitting
//! and coalescing (the actual record-list surgery) only happen once a
//! block has been locked. Concurrency is two-level: a spinlock per
//! block serializes mutation of that block's records, and a single
//! process-wide structural lock serializes mutation of the mapping
//! list itself. The two never nest the same way twice: a thread never
//! holds a block lock while requesting the structural lock.
//!
//! ## Crate structure
//!
//! ```text
//!   coheap
//!   ├── align    - word-size alignment, power-of-two rounding
//!   ├── config   - build-time knobs (min mapping size, back-off timings)
//!   ├── header   - allocation record header + pointer arithmetic
//!   ├── block    - block header, carving, compaction/coalescing
//!   ├── mapping  - mapping header, block/mapping sizing policy
//!   ├── os       - the OS mapping primitive (mmap)
//!   ├── sync     - block lock, structural lock, back-off hooks
//!   ├── anchor   - the process-wide mapping list + first-fit search
//!   └── api      - allocate/free/zero_alloc/resize + GlobalAlloc
//! ```
//!
//! ## What this crate is not
//!
//! No size classes, no thread-local cache, no buddy allocator, no
//! arena/bump API, no memory sanitization, and mapped address space is
//! never returned to the OS. See `DESIGN.md` for the full rationale.
//!
//! ## Safety
//!
//! Every operation in this crate is built from raw pointer arithmetic
//! over OS-provided address space. The pointer math itself is
//! isolated to [`header`] and [`block`]; everything above that works
//! in terms of block/record handles rather than bare addresses.

mod align;
mod anchor;
mod api;
mod block;
mod config;
mod header;
mod mapping;
mod os;
mod sync;

pub use api::{allocate, free, resize, zero_alloc, Allocator};
