//! Production scan feed backed by a bounded Tokio channel.

use crate::error::EnvError;
use crate::feed::ScanSource;
use crate::types::{DetectedElement, ScanBatch};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Configuration for a scan feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Maximum number of batches queued before publishers wait (default: 8)
    pub capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { capacity: 8 }
    }
}

impl FeedConfig {
    /// Sets the queue capacity. Zero is raised to one.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

/// Creates a connected publisher / consumer pair.
pub fn scan_feed(config: FeedConfig) -> (ScanPublisher, TokioScanFeed) {
    let capacity = config.capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);

    let publisher = ScanPublisher {
        tx,
        next_sequence: Arc::new(AtomicU64::new(1)),
        capacity,
    };
    let feed = TokioScanFeed {
        rx: Mutex::new(rx),
    };

    (publisher, feed)
}

/// Producer half of the feed.
///
/// Cheap to clone; every clone shares the same sequence counter, so
/// sequence numbers stay unique across producers. With more than one
/// producer the consumer may still observe them out of order.
#[derive(Debug, Clone)]
pub struct ScanPublisher {
    tx: mpsc::Sender<ScanBatch>,
    next_sequence: Arc<AtomicU64>,
    capacity: usize,
}

impl ScanPublisher {
    /// Publishes a scan update, waiting for queue space.
    ///
    /// Returns the sequence number assigned to the batch. A sequence number
    /// is only taken once queue space is reserved, so a rejected publish
    /// leaves no gap.
    pub async fn publish(&self, elements: Vec<DetectedElement>) -> Result<u64, EnvError> {
        let permit = self.tx.reserve().await.map_err(|_| EnvError::FeedClosed)?;
        let batch = self.stamp(elements);
        let sequence = batch.sequence;
        permit.send(batch);
        Ok(sequence)
    }

    /// Publishes a scan update without waiting.
    pub fn try_publish(&self, elements: Vec<DetectedElement>) -> Result<u64, EnvError> {
        let permit = self.tx.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => EnvError::FeedFull(self.capacity),
            mpsc::error::TrySendError::Closed(()) => EnvError::FeedClosed,
        })?;
        let batch = self.stamp(elements);
        let sequence = batch.sequence;
        permit.send(batch);
        Ok(sequence)
    }

    /// Returns true once the consumer has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn stamp(&self, elements: Vec<DetectedElement>) -> ScanBatch {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        ScanBatch::new(sequence, elements)
    }
}

/// Consumer half of the feed.
///
/// There is exactly one per feed; `next_batch` hands out batches one at a
/// time in acceptance order.
#[derive(Debug)]
pub struct TokioScanFeed {
    rx: Mutex<mpsc::Receiver<ScanBatch>>,
}

#[async_trait]
impl ScanSource for TokioScanFeed {
    async fn next_batch(&self) -> Option<ScanBatch> {
        self.rx.lock().await.recv().await
    }
}
