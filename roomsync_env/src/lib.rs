//! RoomSync Capture Boundary
//!
//! This crate holds the vocabulary a room scanner speaks (identities,
//! categories, detections) and the feed that carries scan updates from a
//! background capture task to the single task that owns reconciliation.
//!
//! # Example
//!
//! ```ignore
//! use roomsync_env::{scan_feed, FeedConfig, ScanSource};
//!
//! let (publisher, feed) = scan_feed(FeedConfig::default());
//! tokio::spawn(async move {
//!     publisher.publish(scanner.capture()).await.ok();
//! });
//! while let Some(batch) = feed.next_batch().await {
//!     reconcile(batch);
//! }
//! ```

mod error;
mod feed;
mod tokio_impl;
mod types;

pub use error::EnvError;
pub use feed::ScanSource;
pub use tokio_impl::{scan_feed, FeedConfig, ScanPublisher, TokioScanFeed};
pub use types::{
    translation_of, Category, CategoryVariant, DetectedElement, Dimensions, ElementIdentity,
    ObjectCategory, ScanBatch, SurfaceCategory, Transform,
};
