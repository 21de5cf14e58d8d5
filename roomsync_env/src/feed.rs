//! Scan source abstraction for the capture collaborator.

use async_trait::async_trait;
use crate::types::ScanBatch;

/// Abstraction over whatever produces scan updates.
///
/// # Implementations
///
/// - **Production**: `TokioScanFeed` - single-consumer queue fed by a
///   background capture task through `ScanPublisher`
/// - **Simulation**: the oracle in `roomsync_sim` publishes into the same feed
///
/// # Batch Flow
///
/// ```text
/// Capture task              Feed                     Reconciling task
///   |                         |                              |
///   |-- publish(elements) --->|                              |
///   |                         |-- next_batch() -> batch ---->|
///   |                         |                              |-- reconcile
/// ```
///
/// Batches come out in the order they were accepted, one at a time; the
/// consumer is never handed two batches concurrently.
#[async_trait]
pub trait ScanSource: Send + Sync + 'static {
    /// Receives the next scan batch.
    ///
    /// # Returns
    /// * `Some(batch)` - A scan update is ready
    /// * `None` - Every publisher has been dropped (capture ended)
    async fn next_batch(&self) -> Option<ScanBatch>;
}
