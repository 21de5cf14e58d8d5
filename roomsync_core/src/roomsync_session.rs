//! The "SESSION" Boundary - applying reconcile decisions to a tracking session
//!
//! The tracking session (whatever anchors elements in the host scene) is an
//! external collaborator reached through `TrackingSession`. `SessionAdapter`
//! forwards one `ReconciliationResult` at a time:
//!
//! 1. `add_tracked` for every created record
//! 2. `notify_updated` for every updated record
//! 3. `remove_tracked` for every retracted identity
//!
//! Retractions always go last, so no continuing element has a gap in
//! tracking and no retraction overtakes a create from the same cycle.

use crate::roomsync_element::ElementRecord;
use crate::roomsync_reconcile::ReconciliationResult;
use roomsync_env::ElementIdentity;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

// ============================================================================
// COLLABORATOR CONTRACT
// ============================================================================

/// The external tracking session.
///
/// Calls are synchronous from the adapter's point of view. An
/// implementation that does real work asynchronously must accept the call
/// and complete it on its own.
pub trait TrackingSession {
    /// Start tracking a newly created record.
    fn add_tracked(&mut self, record: &ElementRecord) -> Result<(), SessionError>;

    /// Tell update observers that a record's snapshot changed.
    fn notify_updated(&mut self, record: &ElementRecord) -> Result<(), SessionError>;

    /// Stop tracking a retracted identity.
    fn remove_tracked(&mut self, identity: ElementIdentity) -> Result<(), SessionError>;
}

/// Receives update notifications from a session.
pub trait UpdateObserver {
    fn on_updated(&mut self, record: &ElementRecord);
}

impl<F> UpdateObserver for F
where
    F: FnMut(&ElementRecord),
{
    fn on_updated(&mut self, record: &ElementRecord) {
        self(record)
    }
}

/// Errors a tracking session may report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Element already anchored: {0}")]
    AlreadyAnchored(ElementIdentity),

    #[error("Element not anchored: {0}")]
    NotAnchored(ElementIdentity),

    #[error("Session rejected {identity}: {reason}")]
    Rejected {
        identity: ElementIdentity,
        reason: String,
    },
}

// ============================================================================
// ADAPTER
// ============================================================================

/// Which session call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOp {
    Add,
    Notify,
    Remove,
}

/// One session call that returned an error.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFailure {
    pub identity: ElementIdentity,
    pub op: SessionOp,
    pub error: SessionError,
}

/// What the adapter did with one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub cycle: u64,
    pub anchored: usize,
    pub notified: usize,
    pub removed: usize,
    pub failures: Vec<SessionFailure>,
}

impl ApplyReport {
    /// True if every session call succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Forwards reconcile decisions to a `TrackingSession`.
///
/// Holds no records of its own; the reconciler stays the single source of
/// truth and the session only ever sees snapshots.
#[derive(Debug)]
pub struct SessionAdapter<S: TrackingSession> {
    session: S,
}

impl<S: TrackingSession> SessionAdapter<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    /// Apply one cycle's decisions. Session errors are logged, collected
    /// in the report, and do not stop the rest of the cycle.
    pub fn apply(&mut self, result: &ReconciliationResult) -> ApplyReport {
        let mut report = ApplyReport {
            cycle: result.cycle,
            ..Default::default()
        };

        for record in &result.created {
            match self.session.add_tracked(record) {
                Ok(()) => report.anchored += 1,
                Err(e) => Self::record_failure(&mut report, record.identity(), SessionOp::Add, e),
            }
        }

        for record in &result.updated {
            match self.session.notify_updated(record) {
                Ok(()) => report.notified += 1,
                Err(e) => Self::record_failure(&mut report, record.identity(), SessionOp::Notify, e),
            }
        }

        // Only after every create and update of this cycle
        for &identity in &result.retracted {
            match self.session.remove_tracked(identity) {
                Ok(()) => report.removed += 1,
                Err(e) => Self::record_failure(&mut report, identity, SessionOp::Remove, e),
            }
        }

        report
    }

    fn record_failure(report: &mut ApplyReport, identity: ElementIdentity, op: SessionOp, error: SessionError) {
        warn!(%identity, ?op, "session call failed in cycle {}: {}", report.cycle, error);
        report.failures.push(SessionFailure { identity, op, error });
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }
}

// ============================================================================
// IN-MEMORY SESSION
// ============================================================================

/// Reference `TrackingSession` that anchors snapshots in memory.
///
/// Enforces the session contract strictly: adding an anchored identity or
/// touching an unanchored one is an error.
#[derive(Default)]
pub struct AnchorSession {
    anchors: HashMap<ElementIdentity, ElementRecord>,
    observers: Vec<Box<dyn UpdateObserver>>,
}

impl AnchorSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for update notifications.
    pub fn observe(&mut self, observer: impl UpdateObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn anchor(&self, identity: &ElementIdentity) -> Option<&ElementRecord> {
        self.anchors.get(identity)
    }

    pub fn is_anchored(&self, identity: &ElementIdentity) -> bool {
        self.anchors.contains_key(identity)
    }

    pub fn anchored_identities(&self) -> impl Iterator<Item = &ElementIdentity> {
        self.anchors.keys()
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }
}

impl std::fmt::Debug for AnchorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorSession")
            .field("anchors", &self.anchors.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl TrackingSession for AnchorSession {
    fn add_tracked(&mut self, record: &ElementRecord) -> Result<(), SessionError> {
        let identity = record.identity();
        if self.anchors.contains_key(&identity) {
            return Err(SessionError::AlreadyAnchored(identity));
        }
        self.anchors.insert(identity, record.clone());
        Ok(())
    }

    fn notify_updated(&mut self, record: &ElementRecord) -> Result<(), SessionError> {
        let anchor = self
            .anchors
            .get_mut(&record.identity())
            .ok_or(SessionError::NotAnchored(record.identity()))?;
        *anchor = record.clone();

        for observer in &mut self.observers {
            observer.on_updated(record);
        }
        Ok(())
    }

    fn remove_tracked(&mut self, identity: ElementIdentity) -> Result<(), SessionError> {
        self.anchors
            .remove(&identity)
            .map(|_| ())
            .ok_or(SessionError::NotAnchored(identity))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roomsync_reconcile::Reconciler;
    use nalgebra::Vector3;
    use roomsync_env::{DetectedElement, ObjectCategory, SurfaceCategory, Transform};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records the order of session calls.
    #[derive(Default)]
    struct CallLog {
        calls: Vec<(SessionOp, ElementIdentity)>,
        reject_adds: bool,
    }

    impl TrackingSession for CallLog {
        fn add_tracked(&mut self, record: &ElementRecord) -> Result<(), SessionError> {
            if self.reject_adds {
                return Err(SessionError::Rejected {
                    identity: record.identity(),
                    reason: "no anchor budget".to_string(),
                });
            }
            self.calls.push((SessionOp::Add, record.identity()));
            Ok(())
        }

        fn notify_updated(&mut self, record: &ElementRecord) -> Result<(), SessionError> {
            self.calls.push((SessionOp::Notify, record.identity()));
            Ok(())
        }

        fn remove_tracked(&mut self, identity: ElementIdentity) -> Result<(), SessionError> {
            self.calls.push((SessionOp::Remove, identity));
            Ok(())
        }
    }

    fn chair(seed: u64, width: f32) -> DetectedElement {
        DetectedElement::object(
            ElementIdentity::from_seed(seed),
            Transform::identity(),
            Vector3::new(width, 1.0, 0.5),
            ObjectCategory::Chair,
        )
    }

    fn wall(seed: u64) -> DetectedElement {
        DetectedElement::surface(
            ElementIdentity::from_seed(seed),
            Transform::identity(),
            Vector3::new(4.0, 2.5, 0.1),
            SurfaceCategory::Wall,
        )
    }

    #[test]
    fn test_retractions_issued_last() {
        let mut reconciler = Reconciler::new();
        let mut adapter = SessionAdapter::new(CallLog::default());

        adapter.apply(&reconciler.reconcile(&[chair(1, 0.5), chair(2, 0.5)]));
        adapter.session_mut().calls.clear();

        let result = reconciler.reconcile(&[wall(3), chair(1, 0.6)]);
        let report = adapter.apply(&result);

        let ops: Vec<SessionOp> = adapter.session().calls.iter().map(|(op, _)| *op).collect();
        assert_eq!(ops, vec![SessionOp::Add, SessionOp::Notify, SessionOp::Remove]);
        assert_eq!(adapter.session().calls[2].1, ElementIdentity::from_seed(2));
        assert_eq!((report.anchored, report.notified, report.removed), (1, 1, 1));
        assert!(report.is_clean());
    }

    #[test]
    fn test_failure_does_not_stop_cycle() {
        let mut reconciler = Reconciler::new();
        let mut adapter = SessionAdapter::new(CallLog {
            reject_adds: true,
            ..Default::default()
        });

        let report = adapter.apply(&reconciler.reconcile(&[chair(1, 0.5), wall(2)]));

        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].op, SessionOp::Add);
        assert_eq!(report.failures[0].identity, ElementIdentity::from_seed(1));
        assert!(!report.is_clean());
        // The reconciler is still the source of truth
        assert_eq!(reconciler.tracked_count(), 2);
    }

    #[test]
    fn test_anchor_session_mirrors_reconciler() {
        let mut reconciler = Reconciler::new();
        let mut adapter = SessionAdapter::new(AnchorSession::new());

        for batch in [
            vec![chair(1, 0.5), wall(2)],
            vec![chair(1, 0.7), wall(3)],
            vec![wall(3)],
            vec![],
        ] {
            let report = adapter.apply(&reconciler.reconcile(&batch));
            assert!(report.is_clean());

            let session = adapter.session();
            assert_eq!(session.anchor_count(), reconciler.tracked_count());
            for record in reconciler.records() {
                assert_eq!(session.anchor(&record.identity()), Some(record));
            }
        }
    }

    #[test]
    fn test_observers_see_fresh_state() {
        let seen: Rc<RefCell<Vec<f32>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let mut session = AnchorSession::new();
        session.observe(move |record: &ElementRecord| sink.borrow_mut().push(record.dimensions().x));

        let mut reconciler = Reconciler::new();
        let mut adapter = SessionAdapter::new(session);
        adapter.apply(&reconciler.reconcile(&[chair(1, 0.5)]));
        adapter.apply(&reconciler.reconcile(&[chair(1, 0.8)]));

        assert_eq!(*seen.borrow(), vec![0.8]);
    }

    #[test]
    fn test_anchor_session_contract_errors() {
        let mut reconciler = Reconciler::new();
        let result = reconciler.reconcile(&[chair(1, 0.5)]);
        let record = &result.created[0];

        let mut session = AnchorSession::new();
        session.add_tracked(record).unwrap();
        assert_eq!(
            session.add_tracked(record),
            Err(SessionError::AlreadyAnchored(record.identity()))
        );

        let stranger = ElementIdentity::from_seed(99);
        assert_eq!(session.remove_tracked(stranger), Err(SessionError::NotAnchored(stranger)));
    }
}
