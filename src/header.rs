//! The block header placed at the start of every allocation, live or free.
//!
//! ```text
//!   ┌──────────┬──────────┬ ─ ─ ─ ─ ─ ─ ─ ┬───────────────────┐
//!   │ size      │ next(*)  │  zero-fill gap │      payload      │
//!   └──────────┴──────────┴ ─ ─ ─ ─ ─ ─ ─ ┴───────────────────┘
//!   ▲ H-aligned             ▲ raw           ▲ aligned (returned)
//! ```
//!
//! `next` only carries meaning while the block sits on a free-list bucket
//! (see [`crate::freelist`]); while live it is never read.

use std::mem;
use std::ptr::NonNull;

/// The natural alignment of [`Header`] — every header sits at a multiple of
/// this address ("H-align" in the design notes).
pub const HEADER_ALIGN: usize = mem::align_of::<Header>();

/// `size_of::<Header>()`, i.e. the total footprint of the header record.
pub const HEADER_SIZE: usize = mem::size_of::<Header>();

/// `size_of::<usize>()` — the width of the `size` field alone. This is the
/// distance from a header's address to the start of its zero-fill gap.
pub const SIZE_FIELD_WIDTH: usize = mem::size_of::<usize>();

/// A block header: `size` is always meaningful, `next` only while free.
#[repr(C)]
pub struct Header {
  /// Bytes of user-usable payload following this header (excludes the
  /// header itself). Immutable for the life of the allocation.
  pub size: usize,
  /// Free-list link. Undefined while the block is live.
  pub next: *mut Header,
}

impl Header {
  /// Address of the first byte after the `size` field — where the
  /// zero-fill gap (if any) begins and where an unaligned payload would
  /// start.
  #[inline]
  pub fn raw_payload_addr(this: NonNull<Header>) -> usize {
    this.as_ptr() as usize + SIZE_FIELD_WIDTH
  }

  /// Address one past the last payload byte of this block, derived from
  /// its recorded `size`.
  ///
  /// # Safety
  ///
  /// `this` must point at a live, readable `Header`.
  #[inline]
  pub unsafe fn payload_end_addr(this: NonNull<Header>) -> usize {
    let size = unsafe { (*this.as_ptr()).size };
    Self::raw_payload_addr(this) + size
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn header_align_is_at_least_pointer_width() {
    assert!(HEADER_ALIGN >= mem::align_of::<usize>());
  }

  #[test]
  fn size_field_is_first_machine_word() {
    assert_eq!(SIZE_FIELD_WIDTH, mem::size_of::<usize>());
    assert_eq!(std::mem::offset_of!(Header, size), 0);
  }
}
