//! Ground truth oracle for simulation.
//!
//! The RoomOracle maintains the "true" room a scanner is walking through:
//! - Every element that physically exists, with its real pose and extent
//! - Room dynamics (doors swinging, furniture arriving and leaving)
//! - Scan generation (pose noise, occlusion, echoed detections, unknown kinds)

use nalgebra::Vector3;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use roomsync_env::{
    Category, DetectedElement, Dimensions, ElementIdentity, ObjectCategory, SurfaceCategory,
    Transform,
};
use uuid::Uuid;

/// An element that physically exists in the simulated room.
#[derive(Debug, Clone)]
pub struct GroundTruthElement {
    pub identity: ElementIdentity,

    /// True position [x, y, z] in meters (room frame)
    pub position: Vector3<f32>,

    pub dimensions: Dimensions,

    pub category: Category,
}

impl GroundTruthElement {
    pub fn transform(&self) -> Transform {
        Transform::new_translation(&self.position)
    }
}

/// How the scanner and the room behave from one step to the next.
///
/// All rates are per element (or per step for arrivals) probabilities.
#[derive(Debug, Clone)]
pub struct ScanBehavior {
    /// Pose noise standard deviation (meters)
    pub pose_noise_std: f32,

    /// Chance an element is missing from a scan
    pub occlusion_rate: f64,

    /// Chance a door flips open/closed each step
    pub door_toggle_rate: f64,

    /// Chance a new object appears each step
    pub arrival_rate: f64,

    /// Chance an existing object leaves each step
    pub departure_rate: f64,

    /// Chance a detection is reported twice in one scan
    pub echo_rate: f64,

    /// Chance a detection's kind comes back unrecognized
    pub unknown_rate: f64,
}

impl Default for ScanBehavior {
    fn default() -> Self {
        Self {
            pose_noise_std: 0.01, // 1cm
            occlusion_rate: 0.0,
            door_toggle_rate: 0.0,
            arrival_rate: 0.0,
            departure_rate: 0.0,
            echo_rate: 0.0,
            unknown_rate: 0.0,
        }
    }
}

/// Counters for what the oracle has done to the scans.
#[derive(Debug, Clone, Default)]
pub struct OracleCounters {
    pub occluded: u64,
    pub echoed: u64,
    pub unknown: u64,
    pub door_toggles: u64,
    pub arrivals: u64,
    pub departures: u64,
}

/// The RoomOracle - maintains ground truth and generates scans.
pub struct RoomOracle {
    /// Master seed for this room
    seed: u64,

    /// RNG for room dynamics and scan noise
    rng: ChaCha8Rng,

    /// All elements, in spawn order
    elements: Vec<GroundTruthElement>,

    behavior: ScanBehavior,

    noise: Option<Normal<f32>>,

    /// Steps taken so far
    step: u64,

    counters: OracleCounters,
}

impl RoomOracle {
    /// Creates an empty room with the given seed.
    pub fn new(seed: u64) -> Self {
        let mut oracle = Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            elements: Vec::new(),
            behavior: ScanBehavior::default(),
            noise: None,
            step: 0,
            counters: OracleCounters::default(),
        };
        oracle.set_behavior(ScanBehavior::default());
        oracle
    }

    /// Replaces the scan behavior.
    pub fn set_behavior(&mut self, behavior: ScanBehavior) {
        self.noise = if behavior.pose_noise_std > 0.0 {
            Normal::new(0.0, behavior.pose_noise_std).ok()
        } else {
            None
        };
        self.behavior = behavior;
    }

    pub fn behavior(&self) -> &ScanBehavior {
        &self.behavior
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn next_identity(&mut self) -> ElementIdentity {
        ElementIdentity::from_uuid(Uuid::from_u128(self.rng.gen::<u128>()))
    }

    /// Spawns an element and returns its identity.
    pub fn spawn(&mut self, category: Category, position: Vector3<f32>, dimensions: Dimensions) -> ElementIdentity {
        let identity = self.next_identity();
        self.elements.push(GroundTruthElement {
            identity,
            position,
            dimensions,
            category,
        });
        identity
    }

    /// Spawns a random recognized object somewhere inside the room.
    pub fn spawn_random_object(&mut self) -> ElementIdentity {
        let kind = ObjectCategory::RECOGNIZED
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(ObjectCategory::Storage);
        let position = Vector3::new(
            self.rng.gen_range(-2.0..2.0),
            0.0,
            self.rng.gen_range(-2.0..2.0),
        );
        let dimensions = Vector3::new(
            self.rng.gen_range(0.3..2.0),
            self.rng.gen_range(0.3..2.0),
            self.rng.gen_range(0.3..2.0),
        );
        self.spawn(Category::Object(kind), position, dimensions)
    }

    /// Builds a rectangular room: four walls, a floor, one door, one window
    /// and `objects` pieces of furniture.
    pub fn furnish_room(&mut self, objects: usize) {
        let walls = [
            (Vector3::new(0.0, 1.25, -2.5), Vector3::new(5.0, 2.5, 0.1)),
            (Vector3::new(0.0, 1.25, 2.5), Vector3::new(5.0, 2.5, 0.1)),
            (Vector3::new(-2.5, 1.25, 0.0), Vector3::new(0.1, 2.5, 5.0)),
            (Vector3::new(2.5, 1.25, 0.0), Vector3::new(0.1, 2.5, 5.0)),
        ];
        for (position, dimensions) in walls {
            self.spawn(Category::Surface(SurfaceCategory::Wall), position, dimensions);
        }
        self.spawn(
            Category::Surface(SurfaceCategory::Floor),
            Vector3::zeros(),
            Vector3::new(5.0, 0.0, 5.0),
        );
        self.spawn(
            Category::Surface(SurfaceCategory::DoorClosed),
            Vector3::new(1.0, 1.05, -2.5),
            Vector3::new(0.9, 2.1, 0.05),
        );
        self.spawn(
            Category::Surface(SurfaceCategory::Window),
            Vector3::new(-1.0, 1.5, 2.5),
            Vector3::new(1.2, 1.0, 0.05),
        );

        for _ in 0..objects {
            self.spawn_random_object();
        }
    }

    /// Removes an element from the room.
    pub fn remove(&mut self, identity: ElementIdentity) -> bool {
        let before = self.elements.len();
        self.elements.retain(|e| e.identity != identity);
        self.elements.len() != before
    }

    /// Removes every element (the room is gone from view).
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Advances room dynamics by one step.
    pub fn step(&mut self) {
        self.step += 1;

        // Doors swing
        let toggle_rate = self.behavior.door_toggle_rate;
        for i in 0..self.elements.len() {
            let toggled = match self.elements[i].category {
                Category::Surface(SurfaceCategory::DoorOpen) => Some(SurfaceCategory::DoorClosed),
                Category::Surface(SurfaceCategory::DoorClosed) => Some(SurfaceCategory::DoorOpen),
                _ => None,
            };
            if let Some(kind) = toggled {
                if self.rng.gen_bool(toggle_rate) {
                    self.elements[i].category = Category::Surface(kind);
                    self.counters.door_toggles += 1;
                }
            }
        }

        // Furniture leaves
        if self.rng.gen_bool(self.behavior.departure_rate) {
            let objects: Vec<ElementIdentity> = self
                .elements
                .iter()
                .filter(|e| matches!(e.category, Category::Object(_)))
                .map(|e| e.identity)
                .collect();
            if let Some(&leaving) = objects.choose(&mut self.rng) {
                self.remove(leaving);
                self.counters.departures += 1;
            }
        }

        // Furniture arrives
        if self.rng.gen_bool(self.behavior.arrival_rate) {
            self.spawn_random_object();
            self.counters.arrivals += 1;
        }
    }

    /// Produces one scan of the room as the scanner would report it.
    pub fn scan(&mut self) -> Vec<DetectedElement> {
        let mut batch = Vec::with_capacity(self.elements.len());
        let elements = self.elements.clone();

        for element in &elements {
            if self.rng.gen_bool(self.behavior.occlusion_rate) {
                self.counters.occluded += 1;
                continue;
            }

            let detection = self.observe(element);
            batch.push(detection);

            if self.rng.gen_bool(self.behavior.echo_rate) {
                let echo = self.observe(element);
                batch.push(echo);
                self.counters.echoed += 1;
            }
        }

        batch
    }

    /// One noisy observation of an element.
    fn observe(&mut self, element: &GroundTruthElement) -> DetectedElement {
        let position = match self.noise {
            Some(noise) => {
                element.position
                    + Vector3::new(
                        noise.sample(&mut self.rng),
                        noise.sample(&mut self.rng),
                        noise.sample(&mut self.rng),
                    )
            }
            None => element.position,
        };

        let category = if self.rng.gen_bool(self.behavior.unknown_rate) {
            self.counters.unknown += 1;
            match element.category {
                Category::Object(_) => Category::Object(ObjectCategory::Unrecognized),
                Category::Surface(_) => Category::Surface(SurfaceCategory::Unrecognized),
            }
        } else {
            element.category
        };

        DetectedElement::new(
            element.identity,
            Transform::new_translation(&position),
            element.dimensions,
            category,
        )
    }

    /// Returns all elements currently in the room.
    pub fn elements(&self) -> &[GroundTruthElement] {
        &self.elements
    }

    pub fn element(&self, identity: &ElementIdentity) -> Option<&GroundTruthElement> {
        self.elements.iter().find(|e| &e.identity == identity)
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn steps(&self) -> u64 {
        self.step
    }

    pub fn counters(&self) -> &OracleCounters {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_furnished_room() {
        let mut oracle = RoomOracle::new(42);
        oracle.furnish_room(5);

        // 4 walls + floor + door + window + 5 objects
        assert_eq!(oracle.element_count(), 12);

        let ids: HashSet<_> = oracle.elements().iter().map(|e| e.identity).collect();
        assert_eq!(ids.len(), 12);
    }

    #[test]
    fn test_clean_scan_reports_everything_once() {
        let mut oracle = RoomOracle::new(7);
        oracle.furnish_room(3);

        let batch = oracle.scan();

        assert_eq!(batch.len(), oracle.element_count());
        for (detection, element) in batch.iter().zip(oracle.elements()) {
            assert_eq!(detection.identity, element.identity);
            assert_eq!(detection.category, element.category);
        }
    }

    #[test]
    fn test_same_seed_same_room() {
        let mut a = RoomOracle::new(99);
        let mut b = RoomOracle::new(99);
        a.furnish_room(4);
        b.furnish_room(4);

        assert_eq!(a.scan(), b.scan());
    }

    #[test]
    fn test_doors_toggle() {
        let mut oracle = RoomOracle::new(1);
        oracle.furnish_room(0);
        oracle.set_behavior(ScanBehavior {
            door_toggle_rate: 1.0,
            ..Default::default()
        });

        oracle.step();

        let door = oracle
            .elements()
            .iter()
            .find(|e| matches!(e.category, Category::Surface(SurfaceCategory::DoorOpen)));
        assert!(door.is_some());
        assert_eq!(oracle.counters().door_toggles, 1);
    }

    #[test]
    fn test_full_occlusion_gives_empty_scan() {
        let mut oracle = RoomOracle::new(3);
        oracle.furnish_room(2);
        oracle.set_behavior(ScanBehavior {
            occlusion_rate: 1.0,
            ..Default::default()
        });

        assert!(oracle.scan().is_empty());
    }
}
