//! Shared crate-wide constants.

/// Upper bound on simultaneously live overlay instances.
pub const MAX_INSTANCES: usize = 4;

/// Minimum Manhattan pointer displacement (in surface units) before a press
/// on a window body turns into a window drag.
pub const DRAG_SLOP: u16 = 2;

/// Minimum number of units a restored window must keep within the screen so
/// the user can grab it again.
pub const MIN_VISIBLE_MARGIN: u16 = 4;

/// Offset applied to each newly added window so freshly created overlays do
/// not stack exactly on top of one another.
pub const CASCADE_STEP: i32 = 3;

/// Persisted sentinel meaning "size this dimension from the content".
pub const AUTO_SIZE: i64 = -1;

/// Name of the background thread that applies store writes.
pub const PERSIST_THREAD_NAME: &str = "overlay-persist";
