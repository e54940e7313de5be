use std::fmt;

/// Typed failures on the arena's fallible, non-hot-path surface.
///
/// `alloc`/`free` stay in the spec's C-shaped null/`None`-returning contract
/// (see the crate docs); `ArenaError` only covers construction and
/// reconfiguration, where a caller benefits from knowing *why* something
/// didn't work rather than discovering it later as a silently null
/// allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaError {
  /// A supplied argument violates a documented precondition: a zero
  /// `minimum_field_size`, a non-power-of-two alignment, or an alignment
  /// that exceeds the requested size.
  InvalidArgument(&'static str),
  /// The page source refused to produce a mapping for a new field.
  MapFailed,
  /// `minimum_field_size` was changed after the arena had already pushed
  /// its first field; the spec only promises this knob is meaningful
  /// before first use.
  AlreadyAllocated,
}

impl fmt::Display for ArenaError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::InvalidArgument(why) => write!(f, "invalid argument: {why}"),
      Self::MapFailed => write!(f, "page source failed to map a new field"),
      Self::AlreadyAllocated => {
        write!(f, "minimum_field_size can only be changed before the first allocation")
      }
    }
  }
}

impl std::error::Error for ArenaError {}
