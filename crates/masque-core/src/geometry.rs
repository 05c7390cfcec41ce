//! Landmark geometry: feature bounding boxes and face roll angle.

use crate::types::{Landmarks, Point, Region};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("cannot measure an angle between two identical points {0:?}")]
    CoincidentPoints(Point),
    #[error("cannot enclose an empty point set")]
    EmptyPointSet,
    #[error("expected 68 landmarks, got {actual}")]
    LandmarkCount { actual: usize },
    #[error("negative face size {width}x{height}")]
    NegativeSize { width: i32, height: i32 },
}

/// A facial feature with a fixed landmark index range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    LeftEyebrow,
    RightEyebrow,
    LeftEye,
    RightEye,
    Nose,
    /// Mouth, used for sprites sitting on the upper lip.
    MouthUpper,
    /// Mouth, used for sprites hanging below the lips. Same range as
    /// `MouthUpper`; the placement offsets differ.
    MouthLower,
}

impl Feature {
    pub const ALL: [Feature; 7] = [
        Feature::LeftEyebrow,
        Feature::RightEyebrow,
        Feature::LeftEye,
        Feature::RightEye,
        Feature::Nose,
        Feature::MouthUpper,
        Feature::MouthLower,
    ];

    /// Half-open `[start, end)` range into the landmark set.
    pub const fn range(self) -> (usize, usize) {
        match self {
            Feature::LeftEyebrow => (17, 22),
            Feature::RightEyebrow => (22, 27),
            Feature::LeftEye => (36, 42),
            Feature::RightEye => (42, 48),
            Feature::Nose => (29, 36),
            Feature::MouthUpper | Feature::MouthLower => (48, 68),
        }
    }

    /// Map the numeric feature code (1–7) to a feature.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1..=7 => Some(Self::ALL[index as usize - 1]),
            _ => None,
        }
    }
}

/// Roll angle in degrees of the line from `a` to `b`.
///
/// Computed as `atan(dy / dx)`, so the result lies in [-90, 90] and is
/// independent of the order of the two points. A vertical pair (`dx == 0`)
/// yields ±90 with the sign of `dy`. Identical points have no direction and
/// are rejected.
pub fn compute_angle(a: Point, b: Point) -> Result<f64, GeometryError> {
    let dx = (b.x - a.x) as f64;
    let dy = (b.y - a.y) as f64;

    if dx == 0.0 {
        return match dy {
            d if d > 0.0 => Ok(90.0),
            d if d < 0.0 => Ok(-90.0),
            _ => Err(GeometryError::CoincidentPoints(a)),
        };
    }

    Ok((dy / dx).atan().to_degrees())
}

/// Smallest axis-aligned box containing every point.
pub fn enclosing_box(points: &[Point]) -> Result<Region, GeometryError> {
    let first = points.first().ok_or(GeometryError::EmptyPointSet)?;

    let (mut min_x, mut min_y) = (first.x, first.y);
    let (mut max_x, mut max_y) = (first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    Ok(Region::new(
        min_x,
        min_y,
        max_x.abs_diff(min_x),
        max_y.abs_diff(min_y),
    ))
}

/// Bounding box of the feature identified by its numeric code, or `None`
/// when the code is not mapped.
pub fn feature_boundary(landmarks: &Landmarks, index: u8) -> Option<Region> {
    Feature::from_index(index).map(|feature| landmarks.region(feature))
}
