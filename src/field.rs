//! A single contiguous backing region with a bump cursor, chained into a
//! LIFO stack of fields as the arena grows.

use std::mem;
use std::ptr::NonNull;

use crate::page::PageSource;
use crate::trace::field_debug;

/// A field's own header sits at the very start of its mapping; the payload
/// (what `top` bumps through) follows immediately after.
#[repr(C)]
pub struct FieldHeader {
  /// Usable payload capacity, excluding this header.
  pub size: usize,
  /// Link to the previously active field (older in the LIFO chain).
  pub next: Option<NonNull<FieldHeader>>,
  /// Bump cursor: next byte available for a new allocation's header.
  /// Monotonically non-decreasing; invariant `base <= top <= base + size`.
  pub top: NonNull<u8>,
  /// Start of payload bytes (`self + size_of::<FieldHeader>()`).
  pub base: NonNull<u8>,
}

const FIELD_HEADER_SIZE: usize = mem::size_of::<FieldHeader>();

/// Default floor for newly created fields, per the spec (§3): 256 MiB.
pub const DEFAULT_MINIMUM_FIELD_SIZE: usize = 256 * 1024 * 1024;

impl FieldHeader {
  /// Maps a fresh field whose payload can satisfy `requested` bytes,
  /// growing geometrically from `minimum_field_size`.
  ///
  /// Rounds `requested` up to the smallest `minimum_field_size * 2^k`
  /// (`k >= 0`) such that `requested <= size / 2`, then reserves
  /// `size + size_of::<FieldHeader>()` bytes from `page_source`.
  pub fn new(
    requested: usize,
    minimum_field_size: usize,
    page_source: &dyn PageSource,
  ) -> Option<NonNull<FieldHeader>> {
    let mut size = minimum_field_size;
    while requested > size / 2 {
      size = size.checked_mul(2)?;
    }
    let total = FIELD_HEADER_SIZE.checked_add(size)?;

    let mapped = page_source.map(total)?;
    field_debug!(requested, size, total, "mapped new field");

    let field_ptr = mapped.cast::<FieldHeader>();
    let base = unsafe { NonNull::new_unchecked(mapped.as_ptr().add(FIELD_HEADER_SIZE)) };
    unsafe {
      field_ptr.as_ptr().write(FieldHeader { size, next: None, top: base, base });
    }
    Some(field_ptr)
  }

  /// Total bytes this field's mapping occupies, header included — the
  /// exact span to hand back to the page source on deletion.
  #[inline]
  pub fn mapped_len(&self) -> usize {
    FIELD_HEADER_SIZE + self.size
  }

  /// Releases this field's mapping back to `page_source`.
  ///
  /// # Safety
  ///
  /// `field` must point at a field produced by [`FieldHeader::new`] on the
  /// same `page_source`, and must not be used (directly or via any header
  /// recovered from it) afterward.
  pub unsafe fn delete(field: NonNull<FieldHeader>, page_source: &dyn PageSource) {
    let len = unsafe { (*field.as_ptr()).mapped_len() };
    let addr = field.cast::<u8>();
    field_debug!(addr = ?addr.as_ptr(), len, "unmapping field");
    unsafe { page_source.unmap(addr, len) };
  }
}
