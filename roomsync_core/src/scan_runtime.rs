//! Scan Runtime - drives reconciliation from a scan feed.
//!
//! This module is the integration layer between the capture boundary
//! (`ScanSource`), the reconcile engine and the session adapter.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        ScanDriver                          │
//! │                                                            │
//! │  ScanSource ──next_batch()──► Reconciler ──result──┐       │
//! │  (single consumer)            (owns records)       │       │
//! │                                                    ▼       │
//! │                                   SessionAdapter ──► TrackingSession
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every method that reconciles takes `&mut self`, so at most one cycle is
//! ever in flight.
//!
//! # Usage
//!
//! ```ignore
//! use roomsync_core::{AnchorSession, ScanDriver};
//! use roomsync_env::{scan_feed, FeedConfig};
//!
//! let (publisher, feed) = scan_feed(FeedConfig::default());
//! let mut driver = ScanDriver::new(feed, AnchorSession::new());
//! let stats = driver.run().await;
//! ```

use crate::roomsync_reconcile::{ReconciliationResult, Reconciler};
use crate::roomsync_session::{ApplyReport, SessionAdapter, TrackingSession};
use roomsync_env::{ScanBatch, ScanSource};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Outcome of one processed batch.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Sequence number of the batch
    pub sequence: u64,

    /// Reconcile decisions
    pub result: ReconciliationResult,

    /// What the session accepted
    pub apply: ApplyReport,
}

/// Running totals for a driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriverStats {
    pub batches: u64,
    pub stale_batches: u64,
    pub created: u64,
    pub updated: u64,
    pub retracted: u64,
    pub session_failures: u64,
}

/// Pulls scan batches from a source and applies them to a session.
pub struct ScanDriver<Src, S>
where
    Src: ScanSource,
    S: TrackingSession,
{
    source: Src,
    reconciler: Reconciler,
    adapter: SessionAdapter<S>,

    /// Sequence of the last batch processed
    last_sequence: Option<u64>,

    stats: DriverStats,
}

impl<Src, S> ScanDriver<Src, S>
where
    Src: ScanSource,
    S: TrackingSession,
{
    pub fn new(source: Src, session: S) -> Self {
        Self {
            source,
            reconciler: Reconciler::new(),
            adapter: SessionAdapter::new(session),
            last_sequence: None,
            stats: DriverStats::default(),
        }
    }

    /// Reconcile one batch and apply it to the session.
    ///
    /// Returns None if the batch is not newer than the last one processed;
    /// such a batch is discarded without touching the tracked collection.
    pub fn process_batch(&mut self, batch: &ScanBatch) -> Option<CycleReport> {
        if let Some(last) = self.last_sequence {
            if batch.sequence <= last {
                warn!(
                    "Discarding stale scan batch {} (last processed {})",
                    batch.sequence, last
                );
                self.stats.stale_batches += 1;
                return None;
            }
        }
        self.last_sequence = Some(batch.sequence);

        let result = self.reconciler.reconcile(&batch.elements);
        let apply = self.adapter.apply(&result);

        self.stats.batches += 1;
        self.stats.created += result.created.len() as u64;
        self.stats.updated += result.updated.len() as u64;
        self.stats.retracted += result.retracted.len() as u64;
        self.stats.session_failures += apply.failures.len() as u64;

        debug!(
            sequence = batch.sequence,
            detections = batch.len(),
            tracked = self.reconciler.tracked_count(),
            "processed scan batch"
        );

        Some(CycleReport {
            sequence: batch.sequence,
            result,
            apply,
        })
    }

    /// Drain the source until every publisher is gone.
    pub async fn run(&mut self) -> DriverStats {
        while let Some(batch) = self.source.next_batch().await {
            self.process_batch(&batch);
        }

        info!(
            "Scan feed closed after {} batches ({} stale), {} elements tracked",
            self.stats.batches,
            self.stats.stale_batches,
            self.reconciler.tracked_count()
        );
        self.stats.clone()
    }

    /// Retract everything and tell the session.
    pub fn shutdown(&mut self) -> ApplyReport {
        let result = self.reconciler.reset();
        self.stats.retracted += result.retracted.len() as u64;
        let apply = self.adapter.apply(&result);
        self.stats.session_failures += apply.failures.len() as u64;
        apply
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn session(&self) -> &S {
        self.adapter.session()
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }
}
