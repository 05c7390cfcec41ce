use crate::geometry::{self, Feature, GeometryError};
use serde::{Deserialize, Serialize};

/// Number of points produced by the 68-point landmark predictor.
pub const LANDMARK_COUNT: usize = 68;

/// Outer corner of the left eyebrow; first roll-angle reference.
const ROLL_LEFT_INDEX: usize = 17;
/// Outer corner of the right eyebrow; second roll-angle reference.
const ROLL_RIGHT_INDEX: usize = 26;

/// An integer pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box. Used both for detected faces and for feature regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// The 68 ordered facial landmarks of one face.
///
/// Index ranges follow the iBUG 300-W convention: jaw 0–16, eyebrows 17–26,
/// nose 27–35, eyes 36–47, mouth 48–67.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landmarks {
    points: [Point; LANDMARK_COUNT],
}

impl Landmarks {
    pub fn new(points: [Point; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point; LANDMARK_COUNT] {
        &self.points
    }

    /// Bounding box of one facial feature.
    pub fn region(&self, feature: Feature) -> Region {
        let (start, end) = feature.range();
        // Feature ranges are never empty, so the fallback is unreachable.
        geometry::enclosing_box(&self.points[start..end]).unwrap_or(Region::new(0, 0, 0, 0))
    }

    /// In-plane rotation of the face in degrees, measured between the outer
    /// eyebrow corners.
    pub fn roll_angle(&self) -> Result<f64, GeometryError> {
        geometry::compute_angle(self.points[ROLL_LEFT_INDEX], self.points[ROLL_RIGHT_INDEX])
    }
}

impl TryFrom<Vec<Point>> for Landmarks {
    type Error = GeometryError;

    fn try_from(points: Vec<Point>) -> Result<Self, Self::Error> {
        let actual = points.len();
        let points: [Point; LANDMARK_COUNT] = points
            .try_into()
            .map_err(|_| GeometryError::LandmarkCount { actual })?;
        Ok(Self { points })
    }
}

/// Wire shape of a face as delivered by the external landmark detector.
#[derive(Debug, Clone, Deserialize)]
struct RawFace {
    rect: [i32; 4],
    landmarks: Vec<[i32; 2]>,
}

/// A detected face: its bounding rectangle plus landmarks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawFace")]
pub struct Face {
    pub rect: Region,
    pub landmarks: Landmarks,
}

impl TryFrom<RawFace> for Face {
    type Error = GeometryError;

    fn try_from(raw: RawFace) -> Result<Self, Self::Error> {
        let [x, y, w, h] = raw.rect;
        if w < 0 || h < 0 {
            return Err(GeometryError::NegativeSize { width: w, height: h });
        }
        let points: Vec<Point> = raw.landmarks.into_iter().map(|[x, y]| Point::new(x, y)).collect();
        Ok(Self {
            rect: Region::new(x, y, w as u32, h as u32),
            landmarks: Landmarks::try_from(points)?,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_landmarks() -> Landmarks {
    // Synthetic frontal face: points laid out on a grid, eyebrow corners level.
    let mut pts = [Point::new(0, 0); LANDMARK_COUNT];
    for (i, p) in pts.iter_mut().enumerate() {
        *p = Point::new(100 + (i as i32 % 10) * 10, 100 + (i as i32 / 10) * 10);
    }
    pts[17] = Point::new(110, 150);
    pts[26] = Point::new(190, 150);
    Landmarks::new(pts)
}
