//! masque-hw: Hardware abstraction for camera capture.
//!
//! Provides V4L2-based camera access and conversion of captured buffers
//! to RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameStream, PixelFormat};
pub use frame::{Frame, FrameError};
