//! Sprite asset loading.

use image::RgbaImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Sprites must carry colour plus an alpha channel.
const SPRITE_CHANNELS: u8 = 4;

#[derive(Error, Debug)]
pub enum SpriteError {
    #[error("sprite asset not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to decode sprite {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("sprite {path} has {channels} channels, expected 4 (colour + alpha)")]
    ChannelCount { path: PathBuf, channels: u8 },
}

/// Load a sprite from disk as 8-bit RGBA.
///
/// Images without an alpha channel are rejected, not padded.
pub fn load_sprite(path: &Path) -> Result<RgbaImage, SpriteError> {
    if !path.exists() {
        return Err(SpriteError::NotFound(path.to_path_buf()));
    }

    let img = image::open(path).map_err(|source| SpriteError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let channels = img.color().channel_count();
    if channels != SPRITE_CHANNELS {
        return Err(SpriteError::ChannelCount {
            path: path.to_path_buf(),
            channels,
        });
    }

    tracing::trace!(path = %path.display(), width = img.width(), height = img.height(), "loaded sprite");
    Ok(img.to_rgba8())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    /// Fresh scratch directory under the system temp dir.
    pub fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("masque-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::scratch_dir;
    use super::*;
    use image::{Rgb, RgbImage, Rgba};

    #[test]
    fn test_load_rgba_sprite() {
        let dir = scratch_dir("sprite-rgba");
        let path = dir.join("hat.png");
        RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 4])).save(&path).unwrap();

        let sprite = load_sprite(&path).unwrap();
        assert_eq!(sprite.dimensions(), (3, 2));
        assert_eq!(sprite.get_pixel(2, 1).0, [1, 2, 3, 4]);
    }

    #[test]
    fn test_missing_sprite() {
        let dir = scratch_dir("sprite-missing");
        let err = load_sprite(&dir.join("nope.png")).unwrap_err();
        assert!(matches!(err, SpriteError::NotFound(_)));
    }

    #[test]
    fn test_rgb_sprite_rejected() {
        let dir = scratch_dir("sprite-rgb");
        let path = dir.join("flat.png");
        RgbImage::from_pixel(3, 2, Rgb([9, 9, 9])).save(&path).unwrap();

        let err = load_sprite(&path).unwrap_err();
        assert!(matches!(err, SpriteError::ChannelCount { channels: 3, .. }));
    }

    #[test]
    fn test_garbage_file_rejected() {
        let dir = scratch_dir("sprite-garbage");
        let path = dir.join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let err = load_sprite(&path).unwrap_err();
        assert!(matches!(err, SpriteError::Decode { .. }));
    }
}
