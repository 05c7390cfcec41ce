//! Sprite rotation with canvas expansion ("rotate bound").
//!
//! Rotates an RGBA sprite about its center and grows the output canvas so
//! that none of the rotated corners are cut off. Uncovered output pixels are
//! fully transparent.

use image::{Rgba, RgbaImage};

/// Rotate `sprite` clockwise (as seen on screen, y pointing down) by
/// `angle_deg` degrees.
///
/// The output is `(h·|sin| + w·|cos|) × (h·|cos| + w·|sin|)` pixels, rounded.
/// Uses inverse mapping with bilinear interpolation on all four channels.
pub fn rotate_bound(sprite: &RgbaImage, angle_deg: f64) -> RgbaImage {
    if angle_deg == 0.0 || sprite.width() == 0 || sprite.height() == 0 {
        return sprite.clone();
    }

    let (w, h) = (sprite.width() as f64, sprite.height() as f64);
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let out_w = (h * sin.abs() + w * cos.abs()).round().max(1.0) as u32;
    let out_h = (h * cos.abs() + w * sin.abs()).round().max(1.0) as u32;

    let (cx, cy) = (w / 2.0, h / 2.0);
    let (ncx, ncy) = (out_w as f64 / 2.0, out_h as f64 / 2.0);

    let mut output = RgbaImage::new(out_w, out_h);

    for (ox, oy, out_px) in output.enumerate_pixels_mut() {
        // Work on pixel centers, relative to the output center.
        let dx = ox as f64 + 0.5 - ncx;
        let dy = oy as f64 + 0.5 - ncy;

        // Inverse of the clockwise rotation | cos -sin ; sin cos |.
        let sx = dx * cos + dy * sin + cx - 0.5;
        let sy = -dx * sin + dy * cos + cy - 0.5;

        *out_px = sample_bilinear(sprite, sx, sy);
    }

    output
}

/// Bilinear sample at a fractional source position. Out-of-bounds
/// neighbours contribute transparent black.
fn sample_bilinear(src: &RgbaImage, sx: f64, sy: f64) -> Rgba<u8> {
    let x0 = sx.floor() as i64;
    let y0 = sy.floor() as i64;
    let fx = sx - x0 as f64;
    let fy = sy - y0 as f64;

    let (w, h) = (src.width() as i64, src.height() as i64);
    let fetch = |x: i64, y: i64| -> [f64; 4] {
        if x >= 0 && x < w && y >= 0 && y < h {
            let p = src.get_pixel(x as u32, y as u32).0;
            [p[0] as f64, p[1] as f64, p[2] as f64, p[3] as f64]
        } else {
            [0.0; 4]
        }
    };

    let tl = fetch(x0, y0);
    let tr = fetch(x0 + 1, y0);
    let bl = fetch(x0, y0 + 1);
    let br = fetch(x0 + 1, y0 + 1);

    let mut out = [0u8; 4];
    for c in 0..4 {
        let val = tl[c] * (1.0 - fx) * (1.0 - fy)
            + tr[c] * fx * (1.0 - fy)
            + bl[c] * (1.0 - fx) * fy
            + br[c] * fx * fy;
        out[c] = val.round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}
