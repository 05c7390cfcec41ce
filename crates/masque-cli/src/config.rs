use masque_core::{FilterKind, FilterSet};
use std::path::PathBuf;
use std::str::FromStr;

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture width; the driver may pick another.
    pub frame_width: u32,
    /// Requested capture height.
    pub frame_height: u32,
    /// Directory holding the sprite PNGs named in the catalog.
    pub asset_dir: PathBuf,
    /// Replacement filter catalog (TOML). The embedded one is used when unset.
    pub catalog_path: Option<PathBuf>,
    /// Filters enabled at startup.
    pub filters: FilterSet,
    /// Number of frames to discard at startup (camera auto-exposure settling).
    pub warmup_frames: usize,
    /// Rendered frames buffered between the capture thread and the output.
    pub frame_queue: usize,
}

impl Config {
    /// Load configuration from `MASQUE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            camera_device: lookup("MASQUE_CAMERA_DEVICE")
                .unwrap_or_else(|| "/dev/video0".to_string()),
            frame_width: parse_or(&lookup, "MASQUE_FRAME_WIDTH", 640),
            frame_height: parse_or(&lookup, "MASQUE_FRAME_HEIGHT", 480),
            asset_dir: lookup("MASQUE_ASSET_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("filters")),
            catalog_path: lookup("MASQUE_CATALOG").map(PathBuf::from),
            filters: lookup("MASQUE_FILTERS")
                .map(|v| parse_filter_list(&v))
                .unwrap_or_default(),
            warmup_frames: parse_or(&lookup, "MASQUE_WARMUP_FRAMES", 4),
            frame_queue: parse_or(&lookup, "MASQUE_FRAME_QUEUE", 2).max(1),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse a comma-separated filter list ("hat,glasses"). Unknown names are
/// logged and ignored.
pub fn parse_filter_list(list: &str) -> FilterSet {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter_map(|name| match name.parse::<FilterKind>() {
            Ok(kind) => Some(kind),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring filter name");
                None
            }
        })
        .collect()
}
