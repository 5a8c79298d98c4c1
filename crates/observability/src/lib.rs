//! Process-wide tracing setup shared by SiteBook binaries.

pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize tracing with the format named by `LOG_FORMAT` (JSON unless
/// set to `pretty`).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init_with(LogFormat::from_env());
}
