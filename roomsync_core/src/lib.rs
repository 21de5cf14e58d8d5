//! RoomSync Core - Incremental Reconciliation of Scanned Room Elements
//!
//! Keeps one persistent tracked record per physical element a room scan
//! reports, across successive scan updates:
//! 1. **Element**: immutable identity plus the latest pose, extent and category
//! 2. **Reconcile**: confirm-or-retract bookkeeping over identity sets
//! 3. **Session**: ordered forwarding of create / update / retract to a tracking session

pub mod roomsync_element;
pub mod roomsync_reconcile;
pub mod roomsync_session;
pub mod scan_runtime;

// Re-export key types for convenience
pub use roomsync_element::ElementRecord;
pub use roomsync_reconcile::{plan_cycle, CyclePlan, ReconciliationResult, Reconciler, TrackedStats};
pub use roomsync_session::{
    AnchorSession, ApplyReport, SessionAdapter, SessionError, SessionFailure, SessionOp,
    TrackingSession, UpdateObserver,
};
pub use scan_runtime::{CycleReport, DriverStats, ScanDriver};
