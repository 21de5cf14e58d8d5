//! Simulated tracking session.
//!
//! Wraps the in-memory `AnchorSession` and records every call, so the
//! runner can check call ordering within a cycle and count what observers
//! were told.

use roomsync_core::{AnchorSession, ElementRecord, SessionError, SessionOp, TrackingSession};
use roomsync_env::ElementIdentity;
use std::cell::Cell;
use std::rc::Rc;

/// Tracking session used by the simulator.
#[derive(Debug)]
pub struct SimSession {
    inner: AnchorSession,

    /// Calls made since the last `take_calls`
    calls: Vec<(SessionOp, ElementIdentity)>,

    /// Notifications delivered to the observer
    observed: Rc<Cell<u64>>,
}

impl SimSession {
    pub fn new() -> Self {
        let observed = Rc::new(Cell::new(0));
        let counter = Rc::clone(&observed);

        let mut inner = AnchorSession::new();
        inner.observe(move |_: &ElementRecord| counter.set(counter.get() + 1));

        Self {
            inner,
            calls: Vec::new(),
            observed,
        }
    }

    /// Returns and clears the calls made since the last take.
    pub fn take_calls(&mut self) -> Vec<(SessionOp, ElementIdentity)> {
        std::mem::take(&mut self.calls)
    }

    pub fn anchors(&self) -> &AnchorSession {
        &self.inner
    }

    /// Total update notifications observers have received.
    pub fn notifications(&self) -> u64 {
        self.observed.get()
    }
}

impl Default for SimSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingSession for SimSession {
    fn add_tracked(&mut self, record: &ElementRecord) -> Result<(), SessionError> {
        self.calls.push((SessionOp::Add, record.identity()));
        self.inner.add_tracked(record)
    }

    fn notify_updated(&mut self, record: &ElementRecord) -> Result<(), SessionError> {
        self.calls.push((SessionOp::Notify, record.identity()));
        self.inner.notify_updated(record)
    }

    fn remove_tracked(&mut self, identity: ElementIdentity) -> Result<(), SessionError> {
        self.calls.push((SessionOp::Remove, identity));
        self.inner.remove_tracked(identity)
    }
}

/// Checks that no add or notify follows a remove within one cycle's calls.
pub fn removes_are_last(calls: &[(SessionOp, ElementIdentity)]) -> bool {
    let first_remove = calls.iter().position(|(op, _)| *op == SessionOp::Remove);
    match first_remove {
        Some(index) => calls[index..].iter().all(|(op, _)| *op == SessionOp::Remove),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_are_last() {
        let a = ElementIdentity::from_seed(1);
        let b = ElementIdentity::from_seed(2);

        assert!(removes_are_last(&[]));
        assert!(removes_are_last(&[(SessionOp::Add, a), (SessionOp::Remove, b)]));
        assert!(!removes_are_last(&[(SessionOp::Remove, b), (SessionOp::Notify, a)]));
    }
}
