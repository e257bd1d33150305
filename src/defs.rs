//! Shared defaults and limits.

/// Default TCP port the server listens on.
pub const DEFAULT_PORT: u16 = 12345;

/// Default number of historical days retained on disk (`D`).
///
/// Day files older than `current_day_id - D` are deleted during day
/// rotation.
pub const DEFAULT_MAX_DAYS: usize = 30;

/// Default number of completed days kept in memory (`S`).
///
/// Also bounds the aggregation cache: at most `S` entries are retained
/// before least-recently-used eviction kicks in.
/// Must not exceed [`DEFAULT_MAX_DAYS`].
pub const DEFAULT_MEMORY_DAYS: usize = 7;

/// Default number of worker threads processing client requests.
pub const DEFAULT_WORKERS: usize = 8;

/// Default directory for persisted state (users, day files).
pub const DEFAULT_DATA_DIR: &str = "data";

/// Upper bound on a single frame body, in bytes.
///
/// Frames advertising a larger (or negative) length are rejected before
/// any buffer is allocated.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;
