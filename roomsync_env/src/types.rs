//! Common types for the RoomSync capture boundary.
//!
//! These are the values a room scanner hands over once per scan update.
//! Poses and extents are carried as opaque nalgebra values; nothing in
//! RoomSync does coordinate math on them beyond reading the translation
//! column for presentation.

use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current 3D pose of an element (column-major 4×4, replaced wholesale on update).
pub type Transform = Matrix4<f32>;

/// 3D extent of an element in meters [width, height, depth].
pub type Dimensions = Vector3<f32>;

/// Returns the translation component of a pose.
pub fn translation_of(transform: &Transform) -> Vector3<f32> {
    transform.fixed_view::<3, 1>(0, 3).into_owned()
}

// ============================================================================
// IDENTITY
// ============================================================================

/// Stable identity of a detected element.
///
/// Assigned by the scanner at first detection and never reused, so it is
/// the only key used to match detections against tracked records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementIdentity(pub Uuid);

impl ElementIdentity {
    /// Creates a new random identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identity from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Creates a deterministic identity from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ElementIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ElementIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

// ============================================================================
// CATEGORY
// ============================================================================

/// Kinds of free-standing objects a room scan classifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectCategory {
    Storage,
    Refrigerator,
    Stove,
    Bed,
    Sink,
    WasherDryer,
    Toilet,
    Bathtub,
    Oven,
    Dishwasher,
    Table,
    Sofa,
    Chair,
    Fireplace,
    Television,
    Stairs,
    /// A kind the scanner reported that this build does not know.
    #[serde(other)]
    Unrecognized,
}

impl ObjectCategory {
    /// Every recognized object kind.
    pub const RECOGNIZED: [ObjectCategory; 16] = [
        ObjectCategory::Storage,
        ObjectCategory::Refrigerator,
        ObjectCategory::Stove,
        ObjectCategory::Bed,
        ObjectCategory::Sink,
        ObjectCategory::WasherDryer,
        ObjectCategory::Toilet,
        ObjectCategory::Bathtub,
        ObjectCategory::Oven,
        ObjectCategory::Dishwasher,
        ObjectCategory::Table,
        ObjectCategory::Sofa,
        ObjectCategory::Chair,
        ObjectCategory::Fireplace,
        ObjectCategory::Television,
        ObjectCategory::Stairs,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ObjectCategory::Storage => "storage",
            ObjectCategory::Refrigerator => "refrigerator",
            ObjectCategory::Stove => "stove",
            ObjectCategory::Bed => "bed",
            ObjectCategory::Sink => "sink",
            ObjectCategory::WasherDryer => "washer_dryer",
            ObjectCategory::Toilet => "toilet",
            ObjectCategory::Bathtub => "bathtub",
            ObjectCategory::Oven => "oven",
            ObjectCategory::Dishwasher => "dishwasher",
            ObjectCategory::Table => "table",
            ObjectCategory::Sofa => "sofa",
            ObjectCategory::Chair => "chair",
            ObjectCategory::Fireplace => "fireplace",
            ObjectCategory::Television => "television",
            ObjectCategory::Stairs => "stairs",
            ObjectCategory::Unrecognized => "unrecognized",
        }
    }

    /// Parses a scanner label. Unknown labels map to `Unrecognized`.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        Self::RECOGNIZED
            .into_iter()
            .find(|kind| kind.label() == label)
            .unwrap_or(ObjectCategory::Unrecognized)
    }
}

/// Kinds of structural surfaces a room scan classifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceCategory {
    Wall,
    Opening,
    Window,
    DoorOpen,
    DoorClosed,
    Floor,
    /// A kind the scanner reported that this build does not know.
    #[serde(other)]
    Unrecognized,
}

impl SurfaceCategory {
    /// Every recognized surface kind.
    pub const RECOGNIZED: [SurfaceCategory; 6] = [
        SurfaceCategory::Wall,
        SurfaceCategory::Opening,
        SurfaceCategory::Window,
        SurfaceCategory::DoorOpen,
        SurfaceCategory::DoorClosed,
        SurfaceCategory::Floor,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SurfaceCategory::Wall => "wall",
            SurfaceCategory::Opening => "opening",
            SurfaceCategory::Window => "window",
            SurfaceCategory::DoorOpen => "door_open",
            SurfaceCategory::DoorClosed => "door_closed",
            SurfaceCategory::Floor => "floor",
            SurfaceCategory::Unrecognized => "unrecognized",
        }
    }

    /// Parses a scanner label. Unknown labels map to `Unrecognized`.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        Self::RECOGNIZED
            .into_iter()
            .find(|kind| kind.label() == label)
            .unwrap_or(SurfaceCategory::Unrecognized)
    }
}

/// Which side of the category union a record lives on.
///
/// Fixed when a record is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryVariant {
    Object,
    Surface,
}

impl std::fmt::Display for CategoryVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CategoryVariant::Object => write!(f, "object"),
            CategoryVariant::Surface => write!(f, "surface"),
        }
    }
}

/// Classification of a detected element.
///
/// The variant is fixed for the lifetime of an identity; the kind inside
/// it may change between scans (a door swinging shut).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "variant", content = "kind", rename_all = "snake_case")]
pub enum Category {
    Object(ObjectCategory),
    Surface(SurfaceCategory),
}

impl Category {
    pub fn variant(&self) -> CategoryVariant {
        match self {
            Category::Object(_) => CategoryVariant::Object,
            Category::Surface(_) => CategoryVariant::Surface,
        }
    }

    /// Returns the kind label without the variant prefix.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Category::Object(kind) => kind.label(),
            Category::Surface(kind) => kind.label(),
        }
    }

    /// Returns false if the scanner reported a kind this build does not know.
    pub fn is_recognized(&self) -> bool {
        !matches!(
            self,
            Category::Object(ObjectCategory::Unrecognized)
                | Category::Surface(SurfaceCategory::Unrecognized)
        )
    }

    /// Parses a `variant/kind` label such as `surface/door_open`.
    ///
    /// Returns None only if the variant prefix is unknown; an unknown kind
    /// yields the `Unrecognized` member of its variant.
    pub fn from_label(label: &str) -> Option<Self> {
        let (variant, kind) = label.split_once('/')?;
        match variant.trim().to_lowercase().as_str() {
            "object" => Some(Category::Object(ObjectCategory::from_label(kind))),
            "surface" => Some(Category::Surface(SurfaceCategory::from_label(kind))),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.variant(), self.kind_label())
    }
}

// ============================================================================
// DETECTIONS
// ============================================================================

/// One element as reported by a single scan update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedElement {
    /// Scanner-assigned stable identity
    pub identity: ElementIdentity,

    /// Pose at the time of this scan
    pub transform: Transform,

    /// Extent at the time of this scan
    pub dimensions: Dimensions,

    /// Classification at the time of this scan
    pub category: Category,
}

impl DetectedElement {
    pub fn new(
        identity: ElementIdentity,
        transform: Transform,
        dimensions: Dimensions,
        category: Category,
    ) -> Self {
        Self {
            identity,
            transform,
            dimensions,
            category,
        }
    }

    /// Creates an object detection.
    pub fn object(
        identity: ElementIdentity,
        transform: Transform,
        dimensions: Dimensions,
        kind: ObjectCategory,
    ) -> Self {
        Self::new(identity, transform, dimensions, Category::Object(kind))
    }

    /// Creates a surface detection.
    pub fn surface(
        identity: ElementIdentity,
        transform: Transform,
        dimensions: Dimensions,
        kind: SurfaceCategory,
    ) -> Self {
        Self::new(identity, transform, dimensions, Category::Surface(kind))
    }
}

/// All elements detected in one scan update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanBatch {
    /// Publisher-assigned sequence number, strictly increasing from 1
    pub sequence: u64,

    /// Detected elements in scanner order
    pub elements: Vec<DetectedElement>,
}

impl ScanBatch {
    pub fn new(sequence: u64, elements: Vec<DetectedElement>) -> Self {
        Self { sequence, elements }
    }

    /// Returns the number of detections (duplicates included).
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_seed_is_deterministic() {
        assert_eq!(ElementIdentity::from_seed(7), ElementIdentity::from_seed(7));
        assert_ne!(ElementIdentity::from_seed(7), ElementIdentity::from_seed(8));
    }

    #[test]
    fn test_identity_display_is_short() {
        let id = ElementIdentity::new();
        assert_eq!(id.to_string().len(), 8);
    }

    #[test]
    fn test_unknown_kind_is_unrecognized_not_error() {
        assert_eq!(ObjectCategory::from_label("piano"), ObjectCategory::Unrecognized);
        assert_eq!(SurfaceCategory::from_label("skylight"), SurfaceCategory::Unrecognized);

        let category = Category::from_label("object/piano").unwrap();
        assert_eq!(category, Category::Object(ObjectCategory::Unrecognized));
        assert!(!category.is_recognized());
    }

    #[test]
    fn test_category_label_parses_back() {
        for kind in SurfaceCategory::RECOGNIZED {
            let category = Category::Surface(kind);
            assert_eq!(Category::from_label(&category.to_string()), Some(category));
        }
        assert_eq!(Category::from_label("furniture/bed"), None);
        assert_eq!(Category::from_label("bed"), None);
    }

    #[test]
    fn test_category_variant() {
        assert_eq!(Category::Object(ObjectCategory::Bed).variant(), CategoryVariant::Object);
        assert_eq!(Category::Surface(SurfaceCategory::Wall).variant(), CategoryVariant::Surface);
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&Category::Surface(SurfaceCategory::DoorOpen)).unwrap();
        assert_eq!(json, r#"{"variant":"surface","kind":"door_open"}"#);
    }

    #[test]
    fn test_unknown_kind_deserializes_as_unrecognized() {
        let piano: Category = serde_json::from_str(r#"{"variant":"object","kind":"piano"}"#).unwrap();
        assert_eq!(piano, Category::Object(ObjectCategory::Unrecognized));

        let skylight: Category =
            serde_json::from_str(r#"{"variant":"surface","kind":"skylight"}"#).unwrap();
        assert_eq!(skylight, Category::Surface(SurfaceCategory::Unrecognized));

        let door: Category = serde_json::from_str(r#"{"variant":"surface","kind":"door_open"}"#).unwrap();
        assert_eq!(door, Category::Surface(SurfaceCategory::DoorOpen));
    }

    #[test]
    fn test_translation_of() {
        let pose = Transform::new_translation(&Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(translation_of(&pose), Vector3::new(1.0, 2.0, 3.0));
    }
}
