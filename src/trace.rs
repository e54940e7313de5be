//! Thin wrappers around `tracing` that compile to nothing unless the
//! `logging` feature is enabled, matching the "no diagnostics in release
//! mode" requirement without scattering `#[cfg]` through the allocator core.

macro_rules! field_trace {
  ($($arg:tt)*) => {
    #[cfg(feature = "logging")]
    ::tracing::trace!($($arg)*);
  };
}

macro_rules! field_debug {
  ($($arg:tt)*) => {
    #[cfg(feature = "logging")]
    ::tracing::debug!($($arg)*);
  };
}

pub(crate) use field_debug;
pub(crate) use field_trace;
