//! Tracing and logging (shared setup).

/// Initialize process-wide tracing with the default (JSON) format.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init(LogFormat::Json);
}

pub use self::tracing::{LogFormat, UnknownLogFormat, init as init_with};

/// Tracing configuration (filters, layers).
pub mod tracing;
