//! The "RECONCILE" Engine - confirm-or-retract bookkeeping
//!
//! Keeps exactly one `ElementRecord` per `ElementIdentity` across scan
//! updates. Each cycle takes the full batch of detections from one scan
//! and sorts every identity into one of three buckets:
//!
//! 1. **Created**: identity not tracked before this cycle
//! 2. **Updated**: identity tracked and re-confirmed; snapshot overwritten
//! 3. **Retracted**: identity tracked but absent from the batch
//!
//! There is no grace period. An identity survives a cycle only by
//! appearing in that cycle's batch, so after every cycle the tracked set
//! equals the set of identities in the batch.
//!
//! Planning (`plan_cycle`) is a pure function of the tracked collection
//! and the batch. `Reconciler::reconcile` only commits a finished plan, so
//! a panic while planning leaves the collection as it was.

use crate::roomsync_element::ElementRecord;
use roomsync_env::{CategoryVariant, DetectedElement, ElementIdentity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

// ============================================================================
// RESULT (Output)
// ============================================================================

/// Everything that changed in one reconciliation cycle.
///
/// The three lists are disjoint. `created` and `updated` follow the order
/// in which identities first appeared in the batch and hold each record's
/// state at the end of the cycle. `retracted` is in creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// Cycle number (1 for the first call to `reconcile`)
    pub cycle: u64,

    /// Records seen for the first time this cycle
    pub created: Vec<ElementRecord>,

    /// Records re-confirmed this cycle, with their fresh snapshot
    pub updated: Vec<ElementRecord>,

    /// Identities no longer tracked
    pub retracted: Vec<ElementIdentity>,
}

impl ReconciliationResult {
    pub fn created_ids(&self) -> Vec<ElementIdentity> {
        self.created.iter().map(ElementRecord::identity).collect()
    }

    pub fn updated_ids(&self) -> Vec<ElementIdentity> {
        self.updated.iter().map(ElementRecord::identity).collect()
    }

    /// True if nothing was created or retracted (updates may still have moved things).
    pub fn is_unchanged(&self) -> bool {
        self.created.is_empty() && self.retracted.is_empty()
    }

    /// Total number of decisions in this cycle.
    pub fn change_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.retracted.len()
    }
}

// ============================================================================
// PLAN (Pure)
// ============================================================================

/// Outcome of planning one cycle, before it is committed.
#[derive(Debug, Clone)]
pub struct CyclePlan {
    /// Cycle being planned
    pub cycle: u64,

    /// The tracked collection as it will be after this cycle
    pub next: HashMap<ElementIdentity, ElementRecord>,

    /// Identities created, in first-appearance order
    pub created: Vec<ElementIdentity>,

    /// Identities updated, in first-appearance order
    pub updated: Vec<ElementIdentity>,

    /// Identities retracted, in creation order
    pub retracted: Vec<ElementIdentity>,

    /// Sequence number the next created record will receive
    pub next_sequence: u64,
}

/// Plan one cycle against an immutable view of the tracked collection.
///
/// # Panics
/// If a detection changes the category variant of an identity that is
/// already tracked, or that appeared earlier in the same batch.
pub fn plan_cycle(
    tracked: &HashMap<ElementIdentity, ElementRecord>,
    batch: &[DetectedElement],
    cycle: u64,
    next_sequence: u64,
) -> CyclePlan {
    let mut next: HashMap<ElementIdentity, ElementRecord> = HashMap::with_capacity(batch.len());
    let mut created = Vec::new();
    let mut updated = Vec::new();
    let mut sequence = next_sequence;

    for detection in batch {
        let id = detection.identity;

        // Repeated within this batch: last write wins, bucket unchanged
        if let Some(record) = next.get_mut(&id) {
            trace!(%id, "repeat detection in cycle {}", cycle);
            record.confirm(detection, cycle);
            continue;
        }

        match tracked.get(&id) {
            Some(existing) => {
                let mut record = existing.clone();
                record.confirm(detection, cycle);
                trace!(%id, category = %record.category(), "update");
                next.insert(id, record);
                updated.push(id);
            }
            None => {
                let record = ElementRecord::from_detection(detection, sequence, cycle);
                sequence += 1;
                trace!(%id, category = %record.category(), "create");
                next.insert(id, record);
                created.push(id);
            }
        }
    }

    // Retracted = tracked − confirmed, where confirmed = keys(next)
    let mut stale: Vec<&ElementRecord> = tracked
        .values()
        .filter(|record| !next.contains_key(&record.identity()))
        .collect();
    stale.sort_by_key(|record| record.sequence());
    let retracted: Vec<ElementIdentity> = stale.iter().map(|record| record.identity()).collect();

    CyclePlan {
        cycle,
        next,
        created,
        updated,
        retracted,
        next_sequence: sequence,
    }
}

// ============================================================================
// RECONCILER (The Engine)
// ============================================================================

/// Owner of the authoritative tracked collection.
///
/// The collection is private; callers see it only through shared
/// references and the per-cycle `ReconciliationResult`.
#[derive(Debug, Default)]
pub struct Reconciler {
    /// All tracked records, keyed by identity
    tracked: HashMap<ElementIdentity, ElementRecord>,

    /// Number of completed cycles
    cycle: u64,

    /// Sequence number for the next created record
    next_sequence: u64,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile one scan update against the tracked collection.
    ///
    /// An empty batch retracts everything.
    ///
    /// # Panics
    /// If a detection would change the category variant of a tracked
    /// identity. The tracked collection is left untouched in that case.
    pub fn reconcile(&mut self, batch: &[DetectedElement]) -> ReconciliationResult {
        let plan = plan_cycle(&self.tracked, batch, self.cycle + 1, self.next_sequence);
        self.commit(plan)
    }

    /// Retract everything currently tracked.
    pub fn reset(&mut self) -> ReconciliationResult {
        self.reconcile(&[])
    }

    fn commit(&mut self, plan: CyclePlan) -> ReconciliationResult {
        let CyclePlan {
            cycle,
            next,
            created,
            updated,
            retracted,
            next_sequence,
        } = plan;

        let snapshot = |ids: &[ElementIdentity]| -> Vec<ElementRecord> {
            ids.iter().filter_map(|id| next.get(id).cloned()).collect()
        };
        let created = snapshot(&created);
        let updated = snapshot(&updated);

        self.tracked = next;
        self.cycle = cycle;
        self.next_sequence = next_sequence;

        debug!(
            cycle,
            created = created.len(),
            updated = updated.len(),
            retracted = retracted.len(),
            tracked = self.tracked.len(),
            "reconciled scan update"
        );

        ReconciliationResult {
            cycle,
            created,
            updated,
            retracted,
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// Get a record by identity.
    pub fn get(&self, id: &ElementIdentity) -> Option<&ElementRecord> {
        self.tracked.get(id)
    }

    pub fn contains(&self, id: &ElementIdentity) -> bool {
        self.tracked.contains_key(id)
    }

    /// Get all records as an iterator (unordered).
    pub fn records(&self) -> impl Iterator<Item = &ElementRecord> {
        self.tracked.values()
    }

    /// Tracked identities in creation order.
    pub fn identities(&self) -> Vec<ElementIdentity> {
        let mut records: Vec<&ElementRecord> = self.tracked.values().collect();
        records.sort_by_key(|record| record.sequence());
        records.iter().map(|record| record.identity()).collect()
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Number of completed cycles.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Get statistics about the tracked collection.
    pub fn stats(&self) -> TrackedStats {
        let objects = self
            .tracked
            .values()
            .filter(|record| record.variant() == CategoryVariant::Object)
            .count();
        let unrecognized = self
            .tracked
            .values()
            .filter(|record| !record.category().is_recognized())
            .count();

        TrackedStats {
            total: self.tracked.len(),
            objects,
            surfaces: self.tracked.len() - objects,
            unrecognized,
            cycles: self.cycle,
        }
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Statistics about the tracked collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedStats {
    pub total: usize,
    pub objects: usize,
    pub surfaces: usize,
    pub unrecognized: usize,
    pub cycles: u64,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use proptest::prelude::*;
    use roomsync_env::{Category, ObjectCategory, SurfaceCategory, Transform};
    use std::collections::HashSet;
    use uuid::Uuid;

    fn id(n: u128) -> ElementIdentity {
        ElementIdentity::from_uuid(Uuid::from_u128(n))
    }

    fn obj(n: u128, dims: [f32; 3], kind: ObjectCategory) -> DetectedElement {
        DetectedElement::object(
            id(n),
            Transform::identity(),
            Vector3::new(dims[0], dims[1], dims[2]),
            kind,
        )
    }

    fn surf(n: u128, dims: [f32; 3], kind: SurfaceCategory) -> DetectedElement {
        DetectedElement::surface(
            id(n),
            Transform::identity(),
            Vector3::new(dims[0], dims[1], dims[2]),
            kind,
        )
    }

    fn at(mut detection: DetectedElement, x: f32) -> DetectedElement {
        detection.transform = Transform::new_translation(&Vector3::new(x, 0.0, 0.0));
        detection
    }

    #[test]
    fn test_reconciler_creation() {
        let reconciler = Reconciler::new();
        assert_eq!(reconciler.tracked_count(), 0);
        assert_eq!(reconciler.cycle(), 0);
    }

    #[test]
    fn test_walkthrough_create_update_retract() {
        let mut reconciler = Reconciler::new();
        let a = id(0xA);
        let b = id(0xB);

        let first = reconciler.reconcile(&[obj(0xA, [1.0, 1.0, 1.0], ObjectCategory::Bed)]);
        assert_eq!(first.cycle, 1);
        assert_eq!(first.created_ids(), vec![a]);
        assert!(first.updated.is_empty());
        assert!(first.retracted.is_empty());
        assert_eq!(reconciler.identities(), vec![a]);

        let second = reconciler.reconcile(&[
            obj(0xA, [2.0, 1.0, 1.0], ObjectCategory::Bed),
            surf(0xB, [1.0, 1.0, 1.0], SurfaceCategory::Wall),
        ]);
        assert_eq!(second.created_ids(), vec![b]);
        assert_eq!(second.updated_ids(), vec![a]);
        assert!(second.retracted.is_empty());
        assert_eq!(reconciler.identities(), vec![a, b]);
        assert_relative_eq!(
            *reconciler.get(&a).unwrap().dimensions(),
            Vector3::new(2.0, 1.0, 1.0)
        );
        // The result carries the fresh state too
        assert_relative_eq!(*second.updated[0].dimensions(), Vector3::new(2.0, 1.0, 1.0));

        let third = reconciler.reconcile(&[]);
        assert!(third.created.is_empty());
        assert!(third.updated.is_empty());
        assert_eq!(third.retracted, vec![a, b]);
        assert!(reconciler.is_empty());
        assert_eq!(reconciler.cycle(), 3);
    }

    #[test]
    fn test_same_batch_twice_is_idempotent() {
        let mut reconciler = Reconciler::new();
        let batch = vec![
            obj(1, [1.0, 1.0, 1.0], ObjectCategory::Table),
            surf(2, [4.0, 2.5, 0.1], SurfaceCategory::Wall),
        ];

        reconciler.reconcile(&batch);
        let again = reconciler.reconcile(&batch);

        assert!(again.created.is_empty());
        assert!(again.retracted.is_empty());
        assert!(again.is_unchanged());
        assert_eq!(again.updated_ids(), vec![id(1), id(2)]);
    }

    #[test]
    fn test_empty_batch_retracts_everything() {
        let mut reconciler = Reconciler::new();
        let batch: Vec<DetectedElement> = (1..=5)
            .map(|n| obj(n, [1.0, 1.0, 1.0], ObjectCategory::Chair))
            .collect();
        reconciler.reconcile(&batch);
        assert_eq!(reconciler.tracked_count(), 5);

        let result = reconciler.reset();

        assert_eq!(result.retracted, (1..=5).map(id).collect::<Vec<_>>());
        assert!(reconciler.is_empty());
    }

    #[test]
    fn test_empty_batch_on_empty_tracker() {
        let mut reconciler = Reconciler::new();
        let result = reconciler.reconcile(&[]);
        assert_eq!(result.change_count(), 0);
        assert_eq!(reconciler.cycle(), 1);
    }

    #[test]
    fn test_duplicate_in_batch_last_write_wins() {
        let mut reconciler = Reconciler::new();

        let result = reconciler.reconcile(&[
            at(obj(7, [1.0, 1.0, 1.0], ObjectCategory::Sofa), 1.0),
            at(obj(7, [1.0, 1.0, 1.0], ObjectCategory::Sofa), 2.0),
        ]);

        assert_eq!(result.created_ids(), vec![id(7)]);
        assert!(result.updated.is_empty());
        assert_eq!(reconciler.tracked_count(), 1);
        let record = reconciler.get(&id(7)).unwrap();
        assert_eq!(record.transform()[(0, 3)], 2.0);
        assert_eq!(result.created[0].transform()[(0, 3)], 2.0);
    }

    #[test]
    fn test_duplicate_of_tracked_identity_updates_once() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&[obj(7, [1.0, 1.0, 1.0], ObjectCategory::Sofa)]);

        let result = reconciler.reconcile(&[
            at(obj(7, [1.0, 1.0, 1.0], ObjectCategory::Sofa), 1.0),
            obj(8, [1.0, 1.0, 1.0], ObjectCategory::Chair),
            at(obj(7, [1.0, 1.0, 1.0], ObjectCategory::Sofa), 3.0),
        ]);

        assert_eq!(result.updated_ids(), vec![id(7)]);
        assert_eq!(result.created_ids(), vec![id(8)]);
        assert_eq!(reconciler.get(&id(7)).unwrap().transform()[(0, 3)], 3.0);
    }

    #[test]
    fn test_kind_change_within_variant_is_update() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&[surf(3, [0.9, 2.1, 0.05], SurfaceCategory::DoorOpen)]);

        let result = reconciler.reconcile(&[surf(3, [0.9, 2.1, 0.05], SurfaceCategory::DoorClosed)]);

        assert_eq!(result.updated_ids(), vec![id(3)]);
        assert_eq!(
            reconciler.get(&id(3)).unwrap().category(),
            Category::Surface(SurfaceCategory::DoorClosed)
        );
    }

    #[test]
    #[should_panic(expected = "changed category variant")]
    fn test_variant_change_fails_fast() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&[obj(9, [1.0, 1.0, 1.0], ObjectCategory::Storage)]);
        reconciler.reconcile(&[surf(9, [1.0, 1.0, 1.0], SurfaceCategory::Wall)]);
    }

    #[test]
    #[should_panic(expected = "changed category variant")]
    fn test_variant_change_within_batch_fails_fast() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&[
            obj(9, [1.0, 1.0, 1.0], ObjectCategory::Storage),
            surf(9, [1.0, 1.0, 1.0], SurfaceCategory::Wall),
        ]);
    }

    #[test]
    fn test_variant_panic_leaves_collection_untouched() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&[
            obj(1, [1.0, 1.0, 1.0], ObjectCategory::Storage),
            obj(2, [1.0, 1.0, 1.0], ObjectCategory::Bed),
        ]);
        let before: Vec<ElementRecord> = reconciler
            .identities()
            .iter()
            .map(|id| reconciler.get(id).unwrap().clone())
            .collect();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            reconciler.reconcile(&[
                obj(1, [5.0, 5.0, 5.0], ObjectCategory::Storage),
                surf(2, [1.0, 1.0, 1.0], SurfaceCategory::Floor),
            ])
        }));
        assert!(outcome.is_err());

        assert_eq!(reconciler.cycle(), 1);
        for record in &before {
            assert_eq!(reconciler.get(&record.identity()), Some(record));
        }
    }

    #[test]
    fn test_reappearing_identity_is_new_record() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&[obj(4, [1.0, 1.0, 1.0], ObjectCategory::Oven)]);
        reconciler.reconcile(&[]);

        let result = reconciler.reconcile(&[obj(4, [1.0, 1.0, 1.0], ObjectCategory::Oven)]);

        assert_eq!(result.created_ids(), vec![id(4)]);
        let record = reconciler.get(&id(4)).unwrap();
        assert_eq!(record.first_seen_cycle(), 3);
        assert_eq!(record.revision(), 1);
        assert_eq!(record.sequence(), 1);
    }

    #[test]
    fn test_unrecognized_kind_is_tracked() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&[
            obj(1, [1.0, 1.0, 1.0], ObjectCategory::Unrecognized),
            surf(2, [3.0, 2.5, 0.1], SurfaceCategory::Wall),
        ]);

        let stats = reconciler.stats();
        assert_eq!(
            stats,
            TrackedStats {
                total: 2,
                objects: 1,
                surfaces: 1,
                unrecognized: 1,
                cycles: 1,
            }
        );
    }

    #[test]
    fn test_plan_cycle_is_pure() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&[obj(1, [1.0, 1.0, 1.0], ObjectCategory::Sink)]);

        let plan = plan_cycle(&reconciler.tracked, &[obj(2, [1.0, 1.0, 1.0], ObjectCategory::Sink)], 2, 1);

        assert_eq!(plan.created, vec![id(2)]);
        assert_eq!(plan.retracted, vec![id(1)]);
        assert_eq!(plan.next_sequence, 2);
        // Nothing committed
        assert!(reconciler.contains(&id(1)));
        assert!(!reconciler.contains(&id(2)));
    }

    fn detection_for(n: u64, width: f32) -> DetectedElement {
        // Even identities are objects, odd are surfaces, so no generated batch changes a variant
        let dims = [width, 1.0, 1.0];
        if n % 2 == 0 {
            obj(n as u128, dims, ObjectCategory::Storage)
        } else {
            surf(n as u128, dims, SurfaceCategory::Wall)
        }
    }

    fn batch_strategy() -> impl Strategy<Value = Vec<DetectedElement>> {
        prop::collection::vec((0u64..10, 0.1f32..5.0), 0..15)
            .prop_map(|items| items.into_iter().map(|(n, w)| detection_for(n, w)).collect())
    }

    proptest! {
        #[test]
        fn prop_tracked_equals_confirmed(batches in prop::collection::vec(batch_strategy(), 1..8)) {
            let mut reconciler = Reconciler::new();

            for batch in &batches {
                let before: HashSet<ElementIdentity> = reconciler.identities().into_iter().collect();
                let result = reconciler.reconcile(batch);

                let confirmed: HashSet<ElementIdentity> = batch.iter().map(|d| d.identity).collect();
                let after: HashSet<ElementIdentity> = reconciler.identities().into_iter().collect();
                prop_assert_eq!(&after, &confirmed);

                let created: HashSet<_> = result.created_ids().into_iter().collect();
                let updated: HashSet<_> = result.updated_ids().into_iter().collect();
                let retracted: HashSet<_> = result.retracted.iter().copied().collect();
                prop_assert_eq!(created.len(), result.created.len());
                prop_assert_eq!(updated.len(), result.updated.len());
                prop_assert_eq!(retracted.len(), result.retracted.len());

                prop_assert_eq!(&created, &confirmed.difference(&before).copied().collect::<HashSet<_>>());
                prop_assert_eq!(&updated, &confirmed.intersection(&before).copied().collect::<HashSet<_>>());
                prop_assert_eq!(&retracted, &before.difference(&confirmed).copied().collect::<HashSet<_>>());

                // Last write wins for every identity
                for identity in &confirmed {
                    let record = reconciler.get(identity).unwrap();
                    let last = batch.iter().rev().find(|d| d.identity == *identity).unwrap();
                    prop_assert_eq!(record.dimensions(), &last.dimensions);
                }
            }
        }

        #[test]
        fn prop_reconfirming_same_batch_changes_nothing(batch in batch_strategy()) {
            let mut reconciler = Reconciler::new();
            reconciler.reconcile(&batch);
            let again = reconciler.reconcile(&batch);

            prop_assert!(again.created.is_empty());
            prop_assert!(again.retracted.is_empty());
        }
    }
}
