//! The arena: owns the field chain and the free-list index, and implements
//! the allocator's public contract (`alloc`, `free`, `reset`, teardown).

use std::ptr::NonNull;

use crate::align::align_up;
use crate::error::ArenaError;
use crate::field::{FieldHeader, DEFAULT_MINIMUM_FIELD_SIZE};
use crate::freelist::{header_start, FreeLists};
use crate::header::{Header, HEADER_ALIGN, HEADER_SIZE, SIZE_FIELD_WIDTH};
use crate::page::{MmapPageSource, PageSource};
use crate::stats::ArenaStats;
use crate::trace::{field_debug, field_trace};

/// A growable, page-mapped region allocator with size-classed free-lists.
///
/// Single-threaded per instance (see the crate-level docs for the
/// concurrency model). Construction never maps memory: the first field is
/// created lazily by the first `alloc` that needs one.
pub struct Arena {
  head: Option<NonNull<FieldHeader>>,
  minimum_field_size: usize,
  free_lists: FreeLists,
  stats: ArenaStats,
  page_source: Box<dyn PageSource>,
  destroyed: bool,
  last_error: Option<ArenaError>,
}

// Safety: `Arena` owns its mappings outright and contains no shared
// mutable state; moving one to another thread (without concurrent access
// from the original thread) is sound. It is deliberately not `Sync` — the
// allocator assumes single-threaded, exclusive access per the spec.
unsafe impl Send for Arena {}

impl Arena {
  /// Creates an empty arena with the default `minimum_field_size` (256 MiB).
  pub fn new() -> Self {
    Self::with_source(DEFAULT_MINIMUM_FIELD_SIZE, Box::new(MmapPageSource))
  }

  /// Creates an empty arena with a custom `minimum_field_size`.
  ///
  /// # Panics
  ///
  /// Panics if `minimum_field_size` is zero. Use
  /// [`Arena::try_with_minimum_field_size`] to handle that without a panic.
  pub fn with_minimum_field_size(minimum_field_size: usize) -> Self {
    match Self::try_with_minimum_field_size(minimum_field_size) {
      Ok(arena) => arena,
      Err(err) => panic!("{err}"),
    }
  }

  /// Fallible form of [`Arena::with_minimum_field_size`].
  pub fn try_with_minimum_field_size(minimum_field_size: usize) -> Result<Self, ArenaError> {
    if minimum_field_size == 0 {
      return Err(ArenaError::InvalidArgument("minimum_field_size must be non-zero"));
    }
    Ok(Self::with_source(minimum_field_size, Box::new(MmapPageSource)))
  }

  fn with_source(minimum_field_size: usize, page_source: Box<dyn PageSource>) -> Self {
    Self {
      head: None,
      minimum_field_size,
      free_lists: FreeLists::new(),
      stats: ArenaStats::new(),
      page_source,
      destroyed: false,
      last_error: None,
    }
  }

  #[cfg(test)]
  pub(crate) fn with_source_for_test(
    minimum_field_size: usize,
    page_source: Box<dyn PageSource>,
  ) -> Self {
    Self::with_source(minimum_field_size, page_source)
  }

  /// The configured field-growth floor.
  pub fn minimum_field_size(&self) -> usize {
    self.minimum_field_size
  }

  /// Changes the field-growth floor.
  ///
  /// # Errors
  ///
  /// Returns [`ArenaError::AlreadyAllocated`] if the arena has already
  /// pushed its first field (the spec only promises this knob is
  /// meaningful before first use), or [`ArenaError::InvalidArgument`] for
  /// a zero value.
  pub fn set_minimum_field_size(&mut self, bytes: usize) -> Result<(), ArenaError> {
    if bytes == 0 {
      return Err(ArenaError::InvalidArgument("minimum_field_size must be non-zero"));
    }
    if self.head.is_some() {
      return Err(ArenaError::AlreadyAllocated);
    }
    self.minimum_field_size = bytes;
    Ok(())
  }

  /// Whether this arena is still usable, i.e. has not been placed in the
  /// destroyed state by a failed field push (see the `alloc` docs).
  pub fn is_usable(&self) -> bool {
    !self.destroyed
  }

  /// The typed reason the arena was destroyed, if it was.
  ///
  /// `alloc` itself keeps returning a plain `None` on the hot path (see the
  /// crate docs), but the cause is also recorded here as
  /// [`ArenaError::MapFailed`] so a caller that wants to tell "this one
  /// allocation didn't fit" apart from "the arena is gone" can.
  pub fn last_error(&self) -> Option<ArenaError> {
    self.last_error
  }

  /// A point-in-time snapshot of the allocation counters.
  pub fn stats(&self) -> ArenaStats {
    self.stats
  }

  /// Allocates `size` bytes aligned to `align`.
  ///
  /// Returns `None` if the arena is invalid or destroyed, `size == 0`,
  /// `align` is not a power of two, or `align > size`. Returns `None` if
  /// the page source cannot satisfy a required field growth — in that
  /// case the arena is also placed in the destroyed state (every field is
  /// released and every outstanding pointer is thereby invalidated); see
  /// [`Arena::is_usable`].
  pub fn alloc(&mut self, size: usize, align: usize) -> Option<NonNull<[u8]>> {
    if self.destroyed || size == 0 || !align.is_power_of_two() || align > size {
      return None;
    }

    if let Some(block) = self.free_lists.search(size, align) {
      return Some(self.serve_from_block(block, size, align));
    }

    self.bump_alloc(size, align)
  }

  fn serve_from_block(&mut self, block: NonNull<Header>, size: usize, align: usize) -> NonNull<[u8]> {
    let raw = Header::raw_payload_addr(block);
    let aligned = align_up(raw, align);
    unsafe { zero_range(raw as *mut u8, aligned - raw) };

    let block_size = unsafe { block.as_ref().size };
    self.stats.record_alloc(block_size as u64);
    field_trace!(block_size, requested = size, align, "served from free-list");

    let ptr = unsafe { NonNull::new_unchecked(aligned as *mut u8) };
    NonNull::slice_from_raw_parts(ptr, size)
  }

  fn bump_alloc(&mut self, size: usize, align: usize) -> Option<NonNull<[u8]>> {
    // A reused slot must later host a full header (`size` + `next`), so
    // the bump path never hands out less than that, even for a tiny
    // request.
    let min_for_reuse = HEADER_SIZE - SIZE_FIELD_WIDTH;
    let bump_size = size.max(min_for_reuse);

    if self.head.is_none() {
      self.push_field(bump_size)?;
    }

    loop {
      let mut field = self.head?;
      let field_ref = unsafe { field.as_ref() };
      let top_addr = field_ref.top.as_ptr() as usize;
      let raw = top_addr + SIZE_FIELD_WIDTH;
      let aligned = align_up(raw, align.max(HEADER_ALIGN));
      let new_top = align_up(aligned + bump_size, HEADER_ALIGN);
      let field_end = field_ref.base.as_ptr() as usize + field_ref.size;

      if new_top > field_end {
        self.push_field(bump_size)?;
        continue;
      }

      unsafe { zero_range(top_addr as *mut u8, aligned - top_addr) };

      let header_size = new_top - raw;
      let header_ptr = top_addr as *mut Header;
      unsafe {
        (*header_ptr).size = header_size;
        (*header_ptr).next = std::ptr::null_mut();
        field.as_mut().top = NonNull::new_unchecked(new_top as *mut u8);
      }

      self.stats.record_alloc(header_size as u64);
      self.stats.record_bump(size as u64);
      field_trace!(header_size, requested = size, align, "bump-allocated");

      let ptr = unsafe { NonNull::new_unchecked(aligned as *mut u8) };
      return Some(NonNull::slice_from_raw_parts(ptr, size));
    }
  }

  fn push_field(&mut self, requested: usize) -> Option<()> {
    match FieldHeader::new(requested, self.minimum_field_size, self.page_source.as_ref()) {
      Some(mut new_field) => {
        unsafe { new_field.as_mut().next = self.head };
        self.head = Some(new_field);
        self.last_error = None;
        Some(())
      }
      None => {
        field_debug!(requested, "field push failed, destroying arena");
        self.release_all_fields();
        self.destroyed = true;
        self.last_error = Some(ArenaError::MapFailed);
        None
      }
    }
  }

  /// Frees a block previously returned by [`Arena::alloc`] on this arena.
  ///
  /// `ptr` may be null (a no-op, matching `free(NULL)`). Passing a pointer
  /// that was not returned by this arena, was already freed, or has been
  /// invalidated by `reset`/destruction, is undefined behavior.
  ///
  /// # Safety
  ///
  /// See above: `ptr` must be a live payload pointer from this arena.
  pub unsafe fn free(&mut self, ptr: *mut u8) {
    if self.destroyed {
      return;
    }
    let Some(ptr) = NonNull::new(ptr) else { return };
    let block = unsafe { header_start(ptr) };
    let size = unsafe { block.as_ref().size };
    unsafe { self.free_lists.insert(block) };
    self.stats.record_free(size as u64);
  }

  /// Retains the newest field (rewinding its bump cursor to its base),
  /// releases every older field, and empties every free-list bucket.
  ///
  /// `minimum_field_size` and the cumulative stats counters survive a
  /// reset; `memory_inuse` is zeroed.
  pub fn reset(&mut self) {
    if let Some(mut head) = self.head {
      let mut current = unsafe { head.as_ref().next };
      while let Some(field) = current {
        let next = unsafe { field.as_ref().next };
        unsafe { FieldHeader::delete(field, self.page_source.as_ref()) };
        current = next;
      }
      unsafe {
        head.as_mut().next = None;
        let base = head.as_ref().base;
        head.as_mut().top = base;
      }
    }
    self.free_lists.clear();
    self.stats.reset_live();
    field_debug!("arena reset");
  }

  fn release_all_fields(&mut self) {
    let mut current = self.head.take();
    while let Some(field) = current {
      let next = unsafe { field.as_ref().next };
      unsafe { FieldHeader::delete(field, self.page_source.as_ref()) };
      current = next;
    }
  }

  #[cfg(test)]
  pub(crate) fn field_count(&self) -> usize {
    let mut count = 0;
    let mut current = self.head;
    while let Some(field) = current {
      count += 1;
      current = unsafe { field.as_ref().next };
    }
    count
  }

  #[cfg(test)]
  pub(crate) fn head_top_addr(&self) -> Option<usize> {
    self.head.map(|f| unsafe { f.as_ref().top.as_ptr() as usize })
  }

  #[cfg(test)]
  pub(crate) fn head_base_addr(&self) -> Option<usize> {
    self.head.map(|f| unsafe { f.as_ref().base.as_ptr() as usize })
  }

  #[cfg(test)]
  pub(crate) fn free_lists_are_empty(&self) -> bool {
    self.free_lists.is_empty()
  }
}

impl Default for Arena {
  fn default() -> Self {
    Self::new()
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    self.release_all_fields();
  }
}

#[inline]
unsafe fn zero_range(start: *mut u8, len: usize) {
  if len > 0 {
    unsafe { std::ptr::write_bytes(start, 0, len) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::page::test_double::TrackingPageSource;

  fn test_arena(minimum_field_size: usize) -> Arena {
    Arena::with_source_for_test(minimum_field_size, Box::new(TrackingPageSource::new()))
  }

  fn is_aligned(addr: usize, align: usize) -> bool {
    addr % align == 0
  }

  #[test]
  fn s1_small_round_trip() {
    let mut arena = test_arena(4096);
    let p = arena.alloc(64, 8).unwrap();
    let p_addr = p.as_ptr() as *mut u8 as usize;
    unsafe { std::ptr::write_bytes(p.as_ptr() as *mut u8, 0x5a, 64) };
    unsafe { arena.free(p.as_ptr() as *mut u8) };

    let q = arena.alloc(64, 8).unwrap();
    let q_addr = q.as_ptr() as *mut u8 as usize;
    assert_eq!(p_addr, q_addr);
    assert!(arena.free_lists_are_empty());
  }

  #[test]
  fn s2_alignment_ladder() {
    let mut arena = test_arena(1024);
    let mut ptrs = Vec::new();
    for k in 0..7u32 {
      let sz = 1usize << k;
      let p = arena.alloc(sz, sz).unwrap();
      let addr = p.as_ptr() as *mut u8 as usize;
      assert!(is_aligned(addr, sz), "alloc({sz},{sz}) returned unaligned pointer {addr:#x}");
      ptrs.push(p.as_ptr() as *mut u8);
    }
    for p in ptrs.into_iter().rev() {
      unsafe { arena.free(p) };
    }
  }

  #[test]
  fn s3_field_growth() {
    let mut arena = test_arena(4096);
    arena.alloc(2000, 1).unwrap();
    assert_eq!(arena.field_count(), 1);

    let p2 = arena.alloc(4000, 1).unwrap();
    assert_eq!(arena.field_count(), 2, "second allocation should have pushed a new field");

    let base = arena.head_base_addr().unwrap();
    let top = arena.head_top_addr().unwrap();
    let p2_addr = p2.as_ptr() as *mut u8 as usize;
    assert!(p2_addr >= base && p2_addr < top, "second payload should live in the new head field");
  }

  #[test]
  fn s4_large_over_minimum() {
    let mut arena = test_arena(4096);
    let p = arena.alloc(10240, 16).unwrap();
    let addr = p.as_ptr() as *mut u8 as usize;
    assert!(is_aligned(addr, 16));

    let base = arena.head_base_addr().unwrap();
    let top = arena.head_top_addr().unwrap();
    assert!(top - base >= 10240);
  }

  #[test]
  fn s5_segregated_reuse() {
    let mut arena = test_arena(65536);
    let p1 = arena.alloc(16, 4).unwrap();
    let p2 = arena.alloc(32, 4).unwrap();
    unsafe {
      arena.free(p1.as_ptr() as *mut u8);
      arena.free(p2.as_ptr() as *mut u8);
    }

    let top_before = arena.head_top_addr().unwrap();
    let q1 = arena.alloc(16, 4).unwrap();
    let q2 = arena.alloc(32, 4).unwrap();
    let top_after = arena.head_top_addr().unwrap();

    assert_eq!(top_before, top_after, "reuse must not move the bump cursor");
    assert_eq!(q1.as_ptr() as *mut u8 as usize, p1.as_ptr() as *mut u8 as usize);
    assert_eq!(q2.as_ptr() as *mut u8 as usize, p2.as_ptr() as *mut u8 as usize);
  }

  #[test]
  fn s6_reset_preserves_capacity() {
    let mut arena = test_arena(4096);
    arena.alloc(2000, 1).unwrap();
    arena.alloc(4000, 1).unwrap();
    arena.alloc(9000, 1).unwrap();
    assert!(arena.field_count() >= 2);

    arena.reset();
    assert_eq!(arena.field_count(), 1);
    assert_eq!(arena.head_base_addr(), arena.head_top_addr());
    assert!(arena.free_lists_are_empty());

    let before = arena.stats();
    let p = arena.alloc(100, 1);
    assert!(p.is_some());
    assert_eq!(arena.field_count(), 1, "reset field had room; no new mapping should occur");
    assert_eq!(arena.stats().allocs, before.allocs + 1);
  }

  #[test]
  fn b1_invalid_alignment_returns_none() {
    let mut arena = test_arena(4096);
    assert!(arena.alloc(16, 3).is_none(), "non power of two alignment");
    assert!(arena.alloc(4, 8).is_none(), "align > size");
    assert!(arena.alloc(0, 1).is_none(), "zero size");
  }

  #[test]
  fn r2_free_null_is_noop() {
    let mut arena = test_arena(4096);
    unsafe { arena.free(std::ptr::null_mut()) };
    assert_eq!(arena.stats().frees, 0);
  }

  #[test]
  fn r3_repeated_reset_is_idempotent() {
    let mut arena = test_arena(4096);
    arena.alloc(100, 1).unwrap();
    arena.reset();
    let top1 = arena.head_top_addr();
    arena.reset();
    let top2 = arena.head_top_addr();
    assert_eq!(top1, top2);
    assert!(arena.free_lists_are_empty());
  }

  #[test]
  fn set_minimum_field_size_rejects_after_first_field() {
    let mut arena = test_arena(4096);
    arena.alloc(16, 1).unwrap();
    assert_eq!(arena.set_minimum_field_size(8192), Err(ArenaError::AlreadyAllocated));
  }

  #[test]
  fn set_minimum_field_size_rejects_zero() {
    let mut arena = test_arena(4096);
    assert_eq!(
      arena.set_minimum_field_size(0),
      Err(ArenaError::InvalidArgument("minimum_field_size must be non-zero"))
    );
  }

  #[test]
  fn try_with_minimum_field_size_rejects_zero() {
    assert!(Arena::try_with_minimum_field_size(0).is_err());
    assert!(Arena::try_with_minimum_field_size(4096).is_ok());
  }

  #[test]
  fn failed_field_push_destroys_arena_and_records_map_failed() {
    struct NeverMaps;
    unsafe impl PageSource for NeverMaps {
      fn map(&self, _bytes: usize) -> Option<NonNull<u8>> {
        None
      }
      unsafe fn unmap(&self, _addr: NonNull<u8>, _bytes: usize) {
        unreachable!("NeverMaps never successfully maps, so nothing is ever unmapped");
      }
    }

    let mut arena = Arena::with_source_for_test(4096, Box::new(NeverMaps));
    assert_eq!(arena.last_error(), None);

    assert!(arena.alloc(64, 8).is_none());
    assert!(!arena.is_usable());
    assert_eq!(arena.last_error(), Some(ArenaError::MapFailed));
  }

  #[test]
  fn dropping_the_arena_releases_every_field() {
    let tracker = std::sync::Arc::new(std::sync::Mutex::new(0usize));
    struct CountingSource(std::sync::Arc<std::sync::Mutex<usize>>);
    unsafe impl PageSource for CountingSource {
      fn map(&self, bytes: usize) -> Option<NonNull<u8>> {
        *self.0.lock().unwrap() += 1;
        let layout = std::alloc::Layout::from_size_align(bytes, 4096).ok()?;
        NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) })
      }
      unsafe fn unmap(&self, addr: NonNull<u8>, bytes: usize) {
        *self.0.lock().unwrap() -= 1;
        let layout = std::alloc::Layout::from_size_align(bytes, 4096).unwrap();
        unsafe { std::alloc::dealloc(addr.as_ptr(), layout) };
      }
    }

    {
      let mut arena = Arena::with_source_for_test(4096, Box::new(CountingSource(tracker.clone())));
      arena.alloc(2000, 1).unwrap();
      arena.alloc(4000, 1).unwrap();
      assert!(*tracker.lock().unwrap() >= 2);
    }
    assert_eq!(*tracker.lock().unwrap(), 0, "Drop must release every field");
  }
}
