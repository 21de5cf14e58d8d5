//! Error types for the RoomSync capture boundary.

use thiserror::Error;

/// Errors that can occur while publishing scan batches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// The consuming side of the feed was dropped
    #[error("Scan feed closed")]
    FeedClosed,

    /// The feed is at capacity and the publisher chose not to wait
    #[error("Scan feed full (capacity {0})")]
    FeedFull(usize),
}
