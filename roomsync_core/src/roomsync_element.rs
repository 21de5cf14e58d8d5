//! The "ELEMENT" Record - one tracked room element
//!
//! An `ElementRecord` pairs an immutable identity with the latest spatial
//! and classification snapshot reported for it. The category *variant*
//! (object vs surface) is fixed at creation; asking a record to switch
//! variant is a programming error and panics.

use roomsync_env::{Category, CategoryVariant, DetectedElement, Dimensions, ElementIdentity, Transform};
use serde::{Deserialize, Serialize};

/// Tracked state for one detected physical element.
///
/// Only the `Reconciler` creates records. Readers get shared references or
/// clones, so every snapshot they observe is whole: `apply_snapshot` takes
/// `&mut self` and no reader can hold a reference across it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    // === Identity ===
    identity: ElementIdentity,

    // === Snapshot (replaced wholesale) ===
    transform: Transform,
    dimensions: Dimensions,
    category: Category,

    // === Bookkeeping ===

    /// Creation order across the reconciler's lifetime
    sequence: u64,

    /// Cycle in which this record was created
    first_seen_cycle: u64,

    /// Last cycle in which the identity was confirmed
    last_confirmed_cycle: u64,

    /// Number of snapshots applied (1 at creation)
    revision: u64,
}

impl ElementRecord {
    /// Create a record from a detection.
    pub(crate) fn from_detection(detection: &DetectedElement, sequence: u64, cycle: u64) -> Self {
        Self {
            identity: detection.identity,
            transform: detection.transform,
            dimensions: detection.dimensions,
            category: detection.category,
            sequence,
            first_seen_cycle: cycle,
            last_confirmed_cycle: cycle,
            revision: 1,
        }
    }

    /// Overwrite the snapshot with fresh values.
    ///
    /// # Panics
    /// If `category` is of a different variant than the record's.
    pub fn apply_snapshot(&mut self, transform: Transform, dimensions: Dimensions, category: Category) {
        assert_eq!(
            self.category.variant(),
            category.variant(),
            "element {} changed category variant ({} -> {})",
            self.identity,
            self.category,
            category,
        );

        self.transform = transform;
        self.dimensions = dimensions;
        self.category = category;
        self.revision += 1;
    }

    /// Apply a detection's snapshot and mark the identity confirmed in `cycle`.
    pub(crate) fn confirm(&mut self, detection: &DetectedElement, cycle: u64) {
        debug_assert_eq!(self.identity, detection.identity);
        self.apply_snapshot(detection.transform, detection.dimensions, detection.category);
        self.last_confirmed_cycle = cycle;
    }

    #[inline]
    pub fn identity(&self) -> ElementIdentity {
        self.identity
    }

    #[inline]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    #[inline]
    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    #[inline]
    pub fn category(&self) -> Category {
        self.category
    }

    #[inline]
    pub fn variant(&self) -> CategoryVariant {
        self.category.variant()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn first_seen_cycle(&self) -> u64 {
        self.first_seen_cycle
    }

    pub fn last_confirmed_cycle(&self) -> u64 {
        self.last_confirmed_cycle
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use roomsync_env::{ObjectCategory, SurfaceCategory};

    fn door(kind: SurfaceCategory) -> DetectedElement {
        DetectedElement::surface(
            ElementIdentity::from_seed(1),
            Transform::identity(),
            Vector3::new(0.9, 2.1, 0.05),
            kind,
        )
    }

    #[test]
    fn test_from_detection() {
        let record = ElementRecord::from_detection(&door(SurfaceCategory::DoorOpen), 4, 2);

        assert_eq!(record.identity(), ElementIdentity::from_seed(1));
        assert_eq!(record.category(), Category::Surface(SurfaceCategory::DoorOpen));
        assert_eq!(record.sequence(), 4);
        assert_eq!(record.first_seen_cycle(), 2);
        assert_eq!(record.last_confirmed_cycle(), 2);
        assert_eq!(record.revision(), 1);
    }

    #[test]
    fn test_kind_may_change_within_variant() {
        let mut record = ElementRecord::from_detection(&door(SurfaceCategory::DoorOpen), 0, 1);
        let moved = Transform::new_translation(&Vector3::new(0.0, 0.0, 1.0));

        record.apply_snapshot(
            moved,
            Vector3::new(0.9, 2.1, 0.06),
            Category::Surface(SurfaceCategory::DoorClosed),
        );

        assert_eq!(record.category(), Category::Surface(SurfaceCategory::DoorClosed));
        assert_eq!(record.transform(), &moved);
        assert_eq!(record.dimensions(), &Vector3::new(0.9, 2.1, 0.06));
        assert_eq!(record.revision(), 2);
        assert_eq!(record.identity(), ElementIdentity::from_seed(1));
    }

    #[test]
    fn test_confirm_updates_cycle() {
        let mut record = ElementRecord::from_detection(&door(SurfaceCategory::DoorOpen), 0, 1);
        record.confirm(&door(SurfaceCategory::DoorClosed), 5);

        assert_eq!(record.first_seen_cycle(), 1);
        assert_eq!(record.last_confirmed_cycle(), 5);
    }

    #[test]
    #[should_panic(expected = "changed category variant")]
    fn test_variant_change_panics() {
        let mut record = ElementRecord::from_detection(&door(SurfaceCategory::DoorOpen), 0, 1);
        record.apply_snapshot(
            Transform::identity(),
            Vector3::new(1.0, 1.0, 1.0),
            Category::Object(ObjectCategory::Storage),
        );
    }
}
