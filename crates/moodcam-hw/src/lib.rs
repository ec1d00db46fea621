//! moodcam-hw: camera access for MoodCam.
//!
//! Provides V4L2 capture converted to grayscale frames, and a
//! `CaptureSession` that guarantees the device is released on every exit
//! path.

pub mod camera;
pub mod capture;
pub mod frame;

pub use camera::{Camera, CameraError, CaptureConstraints, DeviceInfo, FacingMode, PixelFormat};
pub use capture::{CaptureDevice, CaptureSession, FrameSource, V4lDevice};
pub use frame::Frame;
