//! masque-core: Landmark geometry and sprite compositing.
//!
//! Turns 68-point facial landmarks into feature boxes and a roll angle,
//! then rotates, scales, clips and alpha-blends sprite assets onto RGB
//! frames in place.

pub mod catalog;
pub mod compositor;
pub mod filters;
pub mod geometry;
pub mod source;
pub mod sprite;
pub mod transform;
pub mod types;

pub use catalog::{CatalogError, FilterCatalog, FilterSpec};
pub use compositor::{apply_filter, composite_overlay, scale_and_position, Anchor, FilterError};
pub use filters::{FilterKind, FilterRenderer, FilterSet, FilterToggles, Placement};
pub use geometry::{compute_angle, enclosing_box, feature_boundary, Feature, GeometryError};
pub use source::{parse_faces, JsonLinesSource, LandmarkSource, SourceError, StaticSource};
pub use types::{Face, Landmarks, Point, Region};
