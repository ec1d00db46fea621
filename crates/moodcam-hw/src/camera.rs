//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug, Clone)]
pub enum CameraError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

/// Which way the camera should face. Advisory only: V4L2 has no notion of
/// facing, so it is logged and otherwise ignored when opening a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        })
    }
}

impl FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(FacingMode::User),
            "environment" => Ok(FacingMode::Environment),
            other => Err(format!("unknown facing mode: {other}")),
        }
    }
}

/// Requested capture geometry. The driver may grant something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    pub facing: FacingMode,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            width: 720,
            height: 560,
            facing: FacingMode::User,
        }
    }
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(PixelFormat::Yuyv)
        } else if fourcc == FourCC::new(b"GREY") {
            Some(PixelFormat::Grey)
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            Some(PixelFormat::Y16)
        } else {
            None
        }
    }
}

/// Map an open/query failure to the session-level taxonomy.
fn classify_open_error(device_path: &str, err: &std::io::Error) -> CameraError {
    match err.kind() {
        ErrorKind::PermissionDenied => CameraError::PermissionDenied(format!("{device_path}: {err}")),
        _ => CameraError::DeviceUnavailable(format!("{device_path}: {err}")),
    }
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera (e.g. "/dev/video0") and negotiate a format close
    /// to `constraints`.
    pub fn open(device_path: &str, constraints: &CaptureConstraints) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceUnavailable(format!("{device_path}: no such device")));
        }

        let device = Device::with_path(device_path).map_err(|e| classify_open_error(device_path, &e))?;

        let caps = device
            .query_caps()
            .map_err(|e| classify_open_error(device_path, &e))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::DeviceUnavailable(format!(
                "{device_path}: not a video capture device"
            )));
        }

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            facing = %constraints.facing,
            "opened camera"
        );

        let current = device
            .format()
            .map_err(|e| CameraError::DeviceUnavailable(format!("{device_path}: failed to get format: {e}")))?;

        let mut wanted = current.clone();
        wanted.fourcc = FourCC::new(b"YUYV");
        wanted.width = constraints.width;
        wanted.height = constraints.height;

        // Constraints are advisory: keep the current format if the driver
        // refuses the request outright.
        let negotiated = match device.set_format(&wanted) {
            Ok(fmt) => fmt,
            Err(e) => {
                tracing::warn!(
                    device = device_path,
                    error = %e,
                    width = constraints.width,
                    height = constraints.height,
                    "requested format refused; using current format"
                );
                current
            }
        };

        let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
            CameraError::DeviceUnavailable(format!(
                "{device_path}: unsupported pixel format {:?} (need YUYV, GREY, or Y16)",
                negotiated.fourcc
            ))
        })?;

        if negotiated.width != constraints.width || negotiated.height != constraints.height {
            tracing::info!(
                requested_width = constraints.width,
                requested_height = constraints.height,
                width = negotiated.width,
                height = negotiated.height,
                "camera granted a different resolution"
            );
        }

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc: negotiated.fourcc,
            pixel_format,
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Capture a single frame, converted to grayscale.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let converted = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, self.width, self.height),
            PixelFormat::Grey => frame::grey_to_grayscale(buf, self.width, self.height),
            PixelFormat::Y16 => frame::y16_to_grayscale(buf, self.width, self.height),
        };
        let data = converted
            .map_err(|e| CameraError::CaptureFailed(format!("{:?} conversion: {e}", self.pixel_format)))?;

        Ok(Frame {
            data,
            width: self.width,
            height: self.height,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
        })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let dev = Device::with_path(&path).ok()?;
                let caps = dev.query_caps().ok()?;
                caps.capabilities
                    .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card.clone(),
                        driver: caps.driver.clone(),
                        bus: caps.bus.clone(),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constraints() {
        let c = CaptureConstraints::default();
        assert_eq!((c.width, c.height, c.facing), (720, 560, FacingMode::User));
    }

    #[test]
    fn test_facing_mode_parse() {
        assert_eq!("environment".parse::<FacingMode>().unwrap(), FacingMode::Environment);
        assert!("sideways".parse::<FacingMode>().is_err());
    }

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), Some(PixelFormat::Grey));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"Y16 ")), Some(PixelFormat::Y16));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), None);
    }

    #[test]
    fn test_permission_error_classified() {
        let err = std::io::Error::from(ErrorKind::PermissionDenied);
        assert!(matches!(
            classify_open_error("/dev/video0", &err),
            CameraError::PermissionDenied(_)
        ));
        let err = std::io::Error::from(ErrorKind::NotFound);
        assert!(matches!(
            classify_open_error("/dev/video0", &err),
            CameraError::DeviceUnavailable(_)
        ));
    }

    #[test]
    fn test_open_missing_device() {
        let err = Camera::open("/dev/video-does-not-exist", &CaptureConstraints::default());
        assert!(matches!(err, Err(CameraError::DeviceUnavailable(_))));
    }
}
