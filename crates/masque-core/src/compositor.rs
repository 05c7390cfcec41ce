//! Sprite scaling, clipping and alpha compositing onto RGB frames.

use crate::geometry::GeometryError;
use crate::sprite::{self, SpriteError};
use crate::transform;
use crate::types::Region;
use image::imageops::{self, FilterType};
use image::{RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Scaled sprites may be at most this many times the frame's longer side.
pub const MAX_SPRITE_FRAME_MULTIPLE: u32 = 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositeError {
    #[error("cannot scale a {width}x{height} sprite")]
    EmptySprite { width: u32, height: u32 },
    #[error("target width must be positive")]
    ZeroTargetWidth,
    #[error("rotation angle is not finite: {0}")]
    InvalidAngle(f64),
    #[error("scaled sprite {width}x{height} exceeds the {limit} px limit")]
    SpriteTooLarge { width: u64, height: u64, limit: u32 },
}

/// Everything that can stop a single sprite placement.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("geometry: {0}")]
    Geometry(#[from] GeometryError),
    #[error("sprite: {0}")]
    Sprite(#[from] SpriteError),
    #[error("composite: {0}")]
    Composite(#[from] CompositeError),
}

/// Which sprite edge is pinned to the reference row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    /// Bottom edge on the reference row; the sprite sits above it (hats).
    #[default]
    Above,
    /// Top edge on the reference row; the sprite hangs below it (glasses).
    Below,
}

/// A scaled sprite ready for compositing, with its frame row.
#[derive(Debug, Clone)]
pub struct PositionedSprite {
    pub sprite: RgbaImage,
    pub y: u32,
}

/// Scale `sprite` to `target_width` (aspect preserved) and place it against
/// `reference_y`.
///
/// When the placement would start above row 0 the overflowing rows are
/// cropped from the top and the sprite starts at row 0. A sprite entirely
/// above the frame comes back with zero height.
pub fn scale_and_position(
    sprite: &RgbaImage,
    target_width: u32,
    reference_y: i32,
    anchor: Anchor,
) -> Result<PositionedSprite, CompositeError> {
    let (w, h) = sprite.dimensions();
    if w == 0 || h == 0 {
        return Err(CompositeError::EmptySprite { width: w, height: h });
    }
    if target_width == 0 {
        return Err(CompositeError::ZeroTargetWidth);
    }

    let scaled_h = scaled_height(w, h, target_width);
    let scaled_h = u32::try_from(scaled_h).map_err(|_| CompositeError::SpriteTooLarge {
        width: target_width as u64,
        height: scaled_h,
        limit: u32::MAX,
    })?;
    let scaled = if (target_width, scaled_h) == (w, h) {
        sprite.clone()
    } else {
        imageops::resize(sprite, target_width, scaled_h, FilterType::Triangle)
    };

    let y = match anchor {
        Anchor::Above => reference_y as i64 - scaled_h as i64,
        Anchor::Below => reference_y as i64,
    };

    if y >= 0 {
        return Ok(PositionedSprite { sprite: scaled, y: y as u32 });
    }

    let cut = ((-y) as u64).min(scaled_h as u64) as u32;
    let remaining = imageops::crop_imm(&scaled, 0, cut, target_width, scaled_h - cut).to_image();
    Ok(PositionedSprite { sprite: remaining, y: 0 })
}

/// Height of a `w`x`h` sprite scaled to `target_width`, at least one row.
fn scaled_height(w: u32, h: u32, target_width: u32) -> u64 {
    let scale = target_width as f64 / w as f64;
    (h as f64 * scale).round().max(1.0) as u64
}

/// Alpha-blend `overlay` onto `frame` with its top-left corner at `(x, y)`.
///
/// The overlay is clipped against all four frame edges; only the visible
/// part is blended. Returns the frame region that was written, or `None`
/// when nothing of the overlay is visible.
pub fn composite_overlay(
    frame: &mut RgbImage,
    overlay: &RgbaImage,
    x: i32,
    y: i32,
) -> Option<Region> {
    let (fw, fh) = (frame.width() as i64, frame.height() as i64);
    let (ow, oh) = (overlay.width() as i64, overlay.height() as i64);
    let (x, y) = (x as i64, y as i64);

    let left = x.max(0);
    let top = y.max(0);
    let right = (x + ow).min(fw);
    let bottom = (y + oh).min(fh);
    if left >= right || top >= bottom {
        return None;
    }

    for fy in top..bottom {
        for fx in left..right {
            let src = overlay.get_pixel((fx - x) as u32, (fy - y) as u32).0;
            if src[3] == 0 {
                continue;
            }
            let alpha = src[3] as f32 / 255.0;
            let dst = frame.get_pixel_mut(fx as u32, fy as u32);
            for c in 0..3 {
                let val = src[c] as f32 * alpha + dst.0[c] as f32 * (1.0 - alpha);
                dst.0[c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    Some(Region::new(
        left as i32,
        top as i32,
        (right - left) as u32,
        (bottom - top) as u32,
    ))
}

/// Load, rotate, scale and blend one sprite asset onto `frame`.
///
/// `(x, y)` is the sprite's left edge and reference row; `anchor` decides
/// whether the sprite sits above or below that row. The frame is only
/// touched once every fallible step has succeeded.
///
/// Sprites whose scaled size exceeds [`MAX_SPRITE_FRAME_MULTIPLE`] times the
/// frame's longer side are rejected before any scaling. Placements that
/// cannot reach the frame return `Ok(None)` without loading the asset.
pub fn apply_filter(
    frame: &mut RgbImage,
    asset: &Path,
    target_width: u32,
    x: i32,
    y: i32,
    angle: f64,
    anchor: Anchor,
) -> Result<Option<Region>, FilterError> {
    if !angle.is_finite() {
        return Err(CompositeError::InvalidAngle(angle).into());
    }

    let limit = frame
        .width()
        .max(frame.height())
        .saturating_mul(MAX_SPRITE_FRAME_MULTIPLE);
    if target_width > limit {
        return Err(CompositeError::SpriteTooLarge {
            width: target_width as u64,
            height: 0,
            limit,
        }
        .into());
    }

    let (fw, fh) = (frame.width() as i64, frame.height() as i64);
    let misses_columns = x as i64 >= fw || x as i64 + target_width as i64 <= 0;
    let misses_rows = match anchor {
        Anchor::Above => y <= 0,
        Anchor::Below => y as i64 >= fh,
    };
    if misses_columns || misses_rows {
        return Ok(None);
    }

    let sprite = sprite::load_sprite(asset)?;
    let rotated = transform::rotate_bound(&sprite, angle);
    let (rw, rh) = rotated.dimensions();
    if rw > 0 && rh > 0 {
        let height = scaled_height(rw, rh, target_width);
        if height > limit as u64 {
            return Err(CompositeError::SpriteTooLarge {
                width: target_width as u64,
                height,
                limit,
            }
            .into());
        }
    }
    let placed = scale_and_position(&rotated, target_width, y, anchor)?;

    let written = composite_overlay(frame, &placed.sprite, x, placed.y as i32);
    tracing::debug!(
        asset = %asset.display(),
        x,
        y = placed.y,
        angle,
        ?written,
        "sprite composited"
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sprite::test_support::scratch_dir;
    use image::{Rgb, Rgba};

    const FRAME_BG: Rgb<u8> = Rgb([10, 20, 30]);

    fn frame(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, FRAME_BG)
    }

    fn opaque(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([200, 150, 100, 255]))
    }

    /// Count pixels that differ from the background.
    fn changed(frame: &RgbImage) -> usize {
        frame.pixels().filter(|p| **p != FRAME_BG).count()
    }

    #[test]
    fn test_scale_to_target_width() {
        let placed = scale_and_position(&opaque(100, 50), 200, 500, Anchor::Below).unwrap();
        assert_eq!(placed.sprite.dimensions(), (200, 100));
        assert_eq!(placed.y, 500);
    }

    #[test]
    fn test_anchor_above_aligns_bottom_edge() {
        let placed = scale_and_position(&opaque(40, 20), 80, 300, Anchor::Above).unwrap();
        assert_eq!(placed.sprite.dimensions(), (80, 40));
        assert_eq!(placed.y, 260);
    }

    #[test]
    fn test_anchor_above_crops_off_frame_top() {
        // Top half red, bottom half blue; the visible remainder is the bottom.
        let mut sprite = RgbaImage::from_pixel(100, 50, Rgba([255, 0, 0, 255]));
        for y in 25..50 {
            for x in 0..100 {
                sprite.put_pixel(x, y, Rgba([0, 0, 255, 255]));
            }
        }

        let placed = scale_and_position(&sprite, 200, 30, Anchor::Above).unwrap();
        assert_eq!(placed.y, 0);
        assert_eq!(placed.sprite.dimensions(), (200, 30));
        assert!(placed.sprite.pixels().all(|p| p.0 == [0, 0, 255, 255]));
    }

    #[test]
    fn test_sprite_entirely_above_frame_vanishes() {
        let placed = scale_and_position(&opaque(10, 10), 10, -50, Anchor::Above).unwrap();
        assert_eq!(placed.y, 0);
        assert_eq!(placed.sprite.height(), 0);
    }

    #[test]
    fn test_scale_width_within_rounding() {
        for &(w, h, target) in &[(37u32, 23u32, 91u32), (640, 480, 17), (3, 90, 30)] {
            let placed = scale_and_position(&opaque(w, h), target, 2000, Anchor::Above).unwrap();
            assert_eq!(placed.sprite.width(), target);
            let expected_h = (h as f64 * target as f64 / w as f64).round().max(1.0) as u32;
            assert_eq!(placed.sprite.height(), expected_h);
        }
    }

    #[test]
    fn test_scale_rejects_degenerate_input() {
        assert_eq!(
            scale_and_position(&opaque(10, 10), 0, 0, Anchor::Above).unwrap_err(),
            CompositeError::ZeroTargetWidth
        );
        assert!(matches!(
            scale_and_position(&RgbaImage::new(0, 5), 10, 0, Anchor::Above),
            Err(CompositeError::EmptySprite { .. })
        ));
    }

    #[test]
    fn test_composite_inside_frame() {
        let mut f = frame(20, 20);
        let written = composite_overlay(&mut f, &opaque(5, 4), 3, 6).unwrap();
        assert_eq!(written, Region::new(3, 6, 5, 4));
        assert_eq!(changed(&f), 20);
        assert_eq!(f.get_pixel(3, 6).0, [200, 150, 100]);
        assert_eq!(f.get_pixel(7, 9).0, [200, 150, 100]);
        assert_eq!(f.get_pixel(8, 9).0, FRAME_BG.0);
    }

    #[test]
    fn test_composite_clips_right_edge() {
        let mut f = frame(20, 20);
        let written = composite_overlay(&mut f, &opaque(10, 2), 15, 0).unwrap();
        assert_eq!(written, Region::new(15, 0, 5, 2));
        assert_eq!(changed(&f), 10);
    }

    #[test]
    fn test_composite_clips_bottom_edge() {
        let mut f = frame(20, 20);
        let written = composite_overlay(&mut f, &opaque(2, 10), 0, 17).unwrap();
        assert_eq!(written, Region::new(0, 17, 2, 3));
        assert_eq!(changed(&f), 6);
    }

    #[test]
    fn test_composite_clips_left_edge_drops_leading_columns() {
        let mut overlay = opaque(6, 1);
        // Leftmost visible column after a shift of -4 is overlay column 4.
        overlay.put_pixel(4, 0, Rgba([1, 2, 3, 255]));
        let mut f = frame(20, 20);
        let written = composite_overlay(&mut f, &overlay, -4, 0).unwrap();
        assert_eq!(written, Region::new(0, 0, 2, 1));
        assert_eq!(f.get_pixel(0, 0).0, [1, 2, 3]);
        assert_eq!(changed(&f), 2);
    }

    #[test]
    fn test_composite_clips_top_edge() {
        let mut f = frame(20, 20);
        let written = composite_overlay(&mut f, &opaque(3, 5), 2, -3).unwrap();
        assert_eq!(written, Region::new(2, 0, 3, 2));
        assert_eq!(changed(&f), 6);
    }

    #[test]
    fn test_composite_larger_than_remaining_space_both_axes() {
        let mut f = frame(20, 10);
        let written = composite_overlay(&mut f, &opaque(50, 50), 12, 4).unwrap();
        assert_eq!(written, Region::new(12, 4, 8, 6));
        assert_eq!(changed(&f), 48);
    }

    #[test]
    fn test_composite_larger_than_frame_from_negative_origin() {
        let mut f = frame(20, 10);
        let written = composite_overlay(&mut f, &opaque(100, 100), -30, -30).unwrap();
        assert_eq!(written, Region::new(0, 0, 20, 10));
        assert_eq!(changed(&f), 200);
    }

    #[test]
    fn test_composite_fully_outside_is_noop() {
        let mut f = frame(20, 20);
        let before = f.clone();
        assert!(composite_overlay(&mut f, &opaque(5, 5), 20, 0).is_none());
        assert!(composite_overlay(&mut f, &opaque(5, 5), 0, 25).is_none());
        assert!(composite_overlay(&mut f, &opaque(5, 5), -5, 0).is_none());
        assert!(composite_overlay(&mut f, &opaque(5, 5), 0, -9).is_none());
        assert_eq!(f, before);
    }

    #[test]
    fn test_transparent_overlay_leaves_frame_unchanged() {
        let mut f = RgbImage::from_fn(16, 16, |x, y| Rgb([x as u8 * 7, y as u8 * 11, 99]));
        let before = f.clone();
        let overlay = RgbaImage::from_pixel(16, 16, Rgba([255, 255, 255, 0]));
        composite_overlay(&mut f, &overlay, 0, 0);
        assert_eq!(f, before);
    }

    #[test]
    fn test_half_alpha_blend() {
        let mut f = RgbImage::from_pixel(1, 1, Rgb([0, 100, 200]));
        let overlay = RgbaImage::from_pixel(1, 1, Rgba([255, 100, 0, 128]));
        composite_overlay(&mut f, &overlay, 0, 0);
        // 255·128/255 = 128; 100 stays 100; 200·127/255 ≈ 99.6
        assert_eq!(f.get_pixel(0, 0).0, [128, 100, 100]);
    }

    #[test]
    fn test_apply_filter_places_sprite() {
        let dir = scratch_dir("apply-ok");
        let asset = dir.join("glasses.png");
        opaque(10, 5).save(&asset).unwrap();

        let mut f = frame(100, 100);
        let written = apply_filter(&mut f, &asset, 20, 30, 40, 0.0, Anchor::Below)
            .unwrap()
            .unwrap();
        // Top edge exactly on the reference row, no vertical cropping.
        assert_eq!(written, Region::new(30, 40, 20, 10));
        assert_eq!(changed(&f), 200);
    }

    #[test]
    fn test_apply_filter_missing_asset_leaves_frame() {
        let dir = scratch_dir("apply-missing");
        let mut f = frame(50, 50);
        let before = f.clone();
        let err = apply_filter(&mut f, &dir.join("hat.png"), 20, 0, 40, 0.0, Anchor::Above)
            .unwrap_err();
        assert!(matches!(err, FilterError::Sprite(SpriteError::NotFound(_))));
        assert_eq!(f, before);
    }

    #[test]
    fn test_apply_filter_rejects_nan_angle() {
        let dir = scratch_dir("apply-nan");
        let asset = dir.join("hat.png");
        opaque(4, 4).save(&asset).unwrap();

        let mut f = frame(50, 50);
        let before = f.clone();
        let err = apply_filter(&mut f, &asset, 20, 0, 40, f64::NAN, Anchor::Above).unwrap_err();
        assert!(matches!(err, FilterError::Composite(CompositeError::InvalidAngle(_))));
        assert_eq!(f, before);
    }

    #[test]
    fn test_apply_filter_rejects_oversized_width() {
        let dir = scratch_dir("apply-wide");
        let asset = dir.join("hat.png");
        opaque(100, 50).save(&asset).unwrap();

        let mut f = frame(64, 48);
        let before = f.clone();
        let err = apply_filter(&mut f, &asset, i32::MAX as u32, 10, 30, 0.0, Anchor::Above)
            .unwrap_err();
        assert!(matches!(
            err,
            FilterError::Composite(CompositeError::SpriteTooLarge { limit: 256, .. })
        ));
        assert_eq!(f, before);
    }

    #[test]
    fn test_apply_filter_rejects_oversized_height() {
        // A 1x100 strip scaled to 200 px wide would be 20000 rows tall.
        let dir = scratch_dir("apply-tall");
        let asset = dir.join("beard.png");
        opaque(1, 100).save(&asset).unwrap();

        let mut f = frame(64, 48);
        let before = f.clone();
        let err = apply_filter(&mut f, &asset, 200, 0, 10, 0.0, Anchor::Below).unwrap_err();
        assert!(matches!(
            err,
            FilterError::Composite(CompositeError::SpriteTooLarge { height: 20000, .. })
        ));
        assert_eq!(f, before);
    }

    #[test]
    fn test_apply_filter_off_frame_skips_asset() {
        // The asset does not exist; placements that miss the frame never load it.
        let dir = scratch_dir("apply-offframe");
        let asset = dir.join("missing.png");
        let mut f = frame(50, 50);
        let before = f.clone();

        assert!(apply_filter(&mut f, &asset, 20, 50, 10, 0.0, Anchor::Below).unwrap().is_none());
        assert!(apply_filter(&mut f, &asset, 20, -20, 10, 0.0, Anchor::Below).unwrap().is_none());
        assert!(apply_filter(&mut f, &asset, 20, 0, 50, 0.0, Anchor::Below).unwrap().is_none());
        assert!(apply_filter(&mut f, &asset, 20, 0, 0, 0.0, Anchor::Above).unwrap().is_none());
        assert_eq!(f, before);
    }
}
