//! # fieldalloc - a growable region allocator with size-classed free-lists
//!
//! `Arena` hands out bump-allocated memory from a chain of page-mapped
//! "fields" and lets individual blocks be freed back into a set of
//! size-segregated free-lists, without ever freeing the whole region.
//!
//! ## Overview
//!
//! ```text
//!   Arena
//!   ┌─────────────────────────────────────────────────────────────┐
//!   │  head ──► Field(newest) ──► Field ──► Field ──► null         │
//!   │                ▲                                             │
//!   │                top (bump cursor, only this field is bumped)  │
//!   │                                                               │
//!   │  buckets[0..17] ── size-classed free-lists (LIFO, first-fit) │
//!   └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every allocation is preceded by a small [`header::Header`] whose `size`
//! field is immediately followed, toward the user's pointer, by a run of
//! zero bytes (the "zero-fill gap"). `free` has no size argument: given
//! only the payload pointer, [`freelist::header_start`] walks backward
//! through that gap to recover the header. This is the crux of the
//! design — it is why `free` needs nothing but a single pointer.
//!
//! ## Quick start
//!
//! ```
//! use fieldalloc::Arena;
//!
//! let mut arena = Arena::with_minimum_field_size(4096);
//! let block = arena.alloc(64, 8).expect("allocation failed");
//!
//! unsafe {
//!     let ptr = block.as_ptr() as *mut u8;
//!     ptr.write_bytes(0x5a, 64);
//!     arena.free(ptr);
//! }
//!
//! arena.reset();
//! ```
//!
//! ## Crate structure
//!
//! ```text
//!   fieldalloc
//!   ├── align     - align_up / align_down
//!   ├── header    - the block header and the zero-fill gap it relies on
//!   ├── field     - one page-mapped backing region and its bump cursor
//!   ├── page      - the PageSource trait (mmap/munmap) and a test double
//!   ├── freelist  - size classes, first-fit search, header recovery
//!   ├── stats     - ArenaStats observability snapshot
//!   ├── error     - ArenaError
//!   └── arena     - Arena: alloc / free / reset / Drop
//! ```
//!
//! ## Concurrency
//!
//! An `Arena` is single-threaded: all operations assume exclusive access,
//! there are no locks or atomics, and two calls into the same arena from
//! different threads at once are undefined. `Arena` is `Send` (moving an
//! idle arena to another thread is fine) but not `Sync`. Share one across
//! threads behind a `Mutex`, or use one arena per thread.
//!
//! ## Safety
//!
//! This crate manages memory manually: using a pointer after `free`,
//! `reset`, or dropping its arena is undefined behavior, as is a
//! double-free or passing `free` a pointer this arena did not return.

pub mod align;
mod arena;
mod error;
mod field;
mod freelist;
mod header;
mod page;
mod stats;
mod trace;

pub use arena::Arena;
pub use error::ArenaError;
pub use field::DEFAULT_MINIMUM_FIELD_SIZE;
pub use freelist::NUM_BUCKETS;
pub use page::{MmapPageSource, PageSource};
pub use stats::ArenaStats;
