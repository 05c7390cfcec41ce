//! Per-feature sprite placement and per-frame filter rendering.

use crate::catalog::{FilterCatalog, FilterSpec};
use crate::compositor::{self, Anchor};
use crate::geometry::Feature;
use crate::types::Face;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown filter {0:?} (expected hat, mustache, beard or glasses)")]
pub struct UnknownFilter(pub String);

/// A visual filter that can be drawn on a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Hat,
    Mustache,
    Beard,
    Glasses,
}

impl FilterKind {
    /// All filters, in the order they are drawn on a face.
    pub const ALL: [FilterKind; 4] = [
        FilterKind::Hat,
        FilterKind::Mustache,
        FilterKind::Beard,
        FilterKind::Glasses,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Hat => "hat",
            FilterKind::Mustache => "mustache",
            FilterKind::Beard => "beard",
            FilterKind::Glasses => "glasses",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            FilterKind::Hat => 1 << 0,
            FilterKind::Mustache => 1 << 1,
            FilterKind::Beard => 1 << 2,
            FilterKind::Glasses => 1 << 3,
        }
    }

    /// Where the sprite for this filter goes on `face`.
    ///
    /// The reference region is fixed per filter: the face box for hats, the
    /// mouth for mustaches and beards, and the face box with the left
    /// eyebrow's top row for glasses. Offsets and scale come from `spec`.
    pub fn placement(self, face: &Face, spec: &FilterSpec) -> Placement {
        let rect = face.rect;
        let (x, y, width) = match self {
            FilterKind::Hat => (rect.x, rect.y, rect.width),
            FilterKind::Mustache => {
                let mouth = face.landmarks.region(Feature::MouthUpper);
                (mouth.x, mouth.y, mouth.width)
            }
            FilterKind::Beard => {
                let mouth = face.landmarks.region(Feature::MouthLower);
                (mouth.x, mouth.y, mouth.width)
            }
            FilterKind::Glasses => {
                let brow = face.landmarks.region(Feature::LeftEyebrow);
                (rect.x, brow.y, rect.width)
            }
        };

        Placement {
            x: x.saturating_add(spec.offset_x),
            y: y.saturating_add(spec.offset_y),
            // Truncates, so a 4× mouth of 37 px is 148 px wide.
            width: (width as f64 * spec.width_scale) as u32,
            anchor: spec.anchor,
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterKind {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        FilterKind::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| UnknownFilter(s.to_string()))
    }
}

/// Frame position, width and anchor for one sprite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub anchor: Anchor,
}

/// Snapshot of which filters are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterSet(u8);

impl FilterSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        FilterKind::ALL.into_iter().collect()
    }

    pub fn contains(self, kind: FilterKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn with(self, kind: FilterKind) -> Self {
        Self(self.0 | kind.bit())
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Enabled filters in drawing order.
    pub fn iter(self) -> impl Iterator<Item = FilterKind> {
        FilterKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl FromIterator<FilterKind> for FilterSet {
    fn from_iter<I: IntoIterator<Item = FilterKind>>(iter: I) -> Self {
        iter.into_iter().fold(FilterSet::empty(), FilterSet::with)
    }
}

impl fmt::Display for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(FilterKind::name).collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join(","))
        }
    }
}

/// Filter on/off state shared between a controlling thread and the render
/// loop. The render loop reads one [`FilterSet`] snapshot per frame.
#[derive(Debug, Default)]
pub struct FilterToggles {
    bits: AtomicU8,
}

impl FilterToggles {
    pub fn new(initial: FilterSet) -> Self {
        Self {
            bits: AtomicU8::new(initial.0),
        }
    }

    /// Flip one filter; returns whether it is now enabled.
    pub fn toggle(&self, kind: FilterKind) -> bool {
        let prev = self.bits.fetch_xor(kind.bit(), Ordering::AcqRel);
        prev & kind.bit() == 0
    }

    pub fn set(&self, kind: FilterKind, enabled: bool) {
        if enabled {
            self.bits.fetch_or(kind.bit(), Ordering::AcqRel);
        } else {
            self.bits.fetch_and(!kind.bit(), Ordering::AcqRel);
        }
    }

    pub fn snapshot(&self) -> FilterSet {
        FilterSet(self.bits.load(Ordering::Acquire))
    }
}

/// Draws catalog sprites onto frames. Holds no per-frame state.
#[derive(Debug, Clone)]
pub struct FilterRenderer {
    catalog: FilterCatalog,
    asset_dir: PathBuf,
}

impl FilterRenderer {
    pub fn new(catalog: FilterCatalog, asset_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            asset_dir: asset_dir.into(),
        }
    }

    pub fn catalog(&self) -> &FilterCatalog {
        &self.catalog
    }

    pub fn asset_dir(&self) -> &std::path::Path {
        &self.asset_dir
    }

    /// Draw every enabled filter on one face. Returns how many sprites were
    /// composited.
    ///
    /// A filter that fails (missing asset, degenerate geometry) is logged
    /// and skipped; the frame is left as it was for that filter.
    pub fn render_face(&self, frame: &mut RgbImage, face: &Face, filters: FilterSet) -> usize {
        if filters.is_empty() {
            return 0;
        }

        let angle = match face.landmarks.roll_angle() {
            Ok(angle) => angle,
            Err(e) => {
                tracing::warn!(error = %e, "cannot measure face roll; skipping face");
                return 0;
            }
        };

        let mut drawn = 0;
        for kind in filters.iter() {
            let Some(spec) = self.catalog.get(kind) else {
                tracing::warn!(filter = %kind, "no catalog entry; skipping filter");
                continue;
            };

            let placement = kind.placement(face, spec);
            let asset = self.asset_dir.join(&spec.asset);
            match compositor::apply_filter(
                frame,
                &asset,
                placement.width,
                placement.x,
                placement.y,
                angle,
                placement.anchor,
            ) {
                Ok(Some(_)) => drawn += 1,
                Ok(None) => tracing::trace!(filter = %kind, "sprite fell outside the frame"),
                Err(e) => tracing::warn!(filter = %kind, error = %e, "filter skipped"),
            }
        }
        drawn
    }

    /// Draw the enabled filters on every face, one face after another.
    pub fn render_frame(&self, frame: &mut RgbImage, faces: &[Face], filters: FilterSet) -> usize {
        faces
            .iter()
            .map(|face| self.render_face(frame, face, filters))
            .sum()
    }
}
