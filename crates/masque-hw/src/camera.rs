//! Webcam capture through V4L2.
//!
//! Masque reads colour frames, so only YUYV and MJPG are accepted. YUYV is
//! requested first; many webcams answer with MJPG at larger sizes.

use crate::frame::{self, Frame};
use image::RgbImage;
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Kernel-side buffers kept in flight while streaming.
const STREAM_BUFFERS: u32 = 4;

/// errno for a device held open by someone else.
const EBUSY: i32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no video device at {0}")]
    NotFound(String),
    #[error("{0} is in use by another program")]
    Busy(String),
    #[error("cannot open {path}: {source}")]
    Open { path: String, source: io::Error },
    #[error("{0} is not a video capture device")]
    NotCapture(String),
    #[error("camera streams {0}, expected YUYV or MJPG")]
    UnsupportedFormat(String),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        source: io::Error,
    },
    #[error("frame capture failed: {0}")]
    CaptureFailed(String),
}

impl CameraError {
    fn io(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| CameraError::Io { context, source }
    }
}

/// A capture-capable node found by [`Camera::list_devices`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Colour format the camera agreed to stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion-JPEG, one JPEG image per buffer.
    Mjpeg,
}

impl PixelFormat {
    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"MJPG" => Some(PixelFormat::Mjpeg),
            _ => None,
        }
    }

    pub fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
        }
    }
}

/// An opened webcam with its negotiated frame size and format.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open `path` and ask for `width`x`height` YUYV. The driver may settle
    /// on another size or on MJPG; [`Camera::width`] and
    /// [`Camera::pixel_format`] report what was agreed.
    pub fn open(path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(path).exists() {
            return Err(CameraError::NotFound(path.to_string()));
        }

        let device = Device::with_path(path).map_err(|source| {
            if source.raw_os_error() == Some(EBUSY) {
                CameraError::Busy(path.to_string())
            } else {
                CameraError::Open {
                    path: path.to_string(),
                    source,
                }
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(CameraError::io("querying capabilities"))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotCapture(path.to_string()));
        }
        tracing::debug!(device = path, card = %caps.card, driver = %caps.driver, "capture device");

        let (width, height, pixel_format) = negotiate(&device, width, height)?;
        tracing::info!(device = path, width, height, format = ?pixel_format, "camera ready");

        Ok(Self {
            device,
            width,
            height,
            pixel_format,
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Start streaming. Frames are pulled with [`FrameStream::next_frame`].
    pub fn stream(&self) -> Result<FrameStream<'_>, CameraError> {
        let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(CameraError::io("mapping capture buffers"))?;
        Ok(FrameStream {
            camera: self,
            stream,
        })
    }

    /// Capture a single frame on a short-lived stream.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        self.stream()?.next_frame()
    }

    fn buf_to_rgb(&self, buf: &[u8]) -> Result<RgbImage, CameraError> {
        let converted = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height),
            PixelFormat::Mjpeg => frame::mjpeg_to_rgb(buf),
        };
        converted.map_err(|e| CameraError::CaptureFailed(e.to_string()))
    }

    /// Capture-capable `/dev/video*` nodes in numeric order. Nodes that
    /// cannot be opened (busy, no permission) are left out.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let Ok(entries) = std::fs::read_dir("/dev") else {
            return Vec::new();
        };

        let mut nodes: Vec<(u32, String)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let index = video_node_index(&name)?;
                Some((index, format!("/dev/{name}")))
            })
            .collect();
        nodes.sort_unstable();

        nodes
            .into_iter()
            .filter_map(|(_, path)| {
                let caps = Device::with_path(&path).and_then(|dev| dev.query_caps()).ok()?;
                caps.capabilities
                    .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card,
                        driver: caps.driver,
                        bus: caps.bus,
                    })
            })
            .collect()
    }
}

/// Request YUYV at the given size and report what the driver chose.
fn negotiate(device: &Device, width: u32, height: u32) -> Result<(u32, u32, PixelFormat), CameraError> {
    let mut fmt = device.format().map_err(CameraError::io("reading format"))?;
    fmt.fourcc = PixelFormat::Yuyv.fourcc();
    fmt.width = width;
    fmt.height = height;

    let agreed = device.set_format(&fmt).map_err(CameraError::io("setting format"))?;
    let pixel_format = PixelFormat::from_fourcc(agreed.fourcc)
        .ok_or_else(|| CameraError::UnsupportedFormat(agreed.fourcc.to_string()))?;
    Ok((agreed.width, agreed.height, pixel_format))
}

/// `3` for `video3`; `None` for anything that is not a video node.
fn video_node_index(name: &str) -> Option<u32> {
    name.strip_prefix("video")?.parse().ok()
}

/// An active memory-mapped capture stream.
pub struct FrameStream<'a> {
    camera: &'a Camera,
    stream: MmapStream<'a>,
}

impl FrameStream<'_> {
    /// Block until the next frame is available and convert it to RGB.
    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("dequeue: {e}")))?;
        let sequence = meta.sequence;

        let image = self.camera.buf_to_rgb(buf)?;
        Ok(Frame {
            image,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), None);
        assert_eq!(PixelFormat::from_fourcc(PixelFormat::Mjpeg.fourcc()), Some(PixelFormat::Mjpeg));
    }

    #[test]
    fn test_video_node_index() {
        assert_eq!(video_node_index("video0"), Some(0));
        assert_eq!(video_node_index("video12"), Some(12));
        assert_eq!(video_node_index("video"), None);
        assert_eq!(video_node_index("vbi0"), None);
        assert_eq!(video_node_index("video0-meta"), None);
    }

    #[test]
    fn test_open_missing_device() {
        let err = Camera::open("/dev/masque-no-such-camera", 640, 480).err();
        assert!(matches!(err, Some(CameraError::NotFound(_))));
    }
}
