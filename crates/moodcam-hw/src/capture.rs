//! Scoped camera acquisition.

use crate::camera::{Camera, CameraError, CaptureConstraints};
use crate::frame::Frame;

/// Anything that yields grayscale frames.
pub trait FrameSource: Send {
    fn grab(&mut self) -> Result<Frame, CameraError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

impl FrameSource for Camera {
    fn grab(&mut self) -> Result<Frame, CameraError> {
        self.capture_frame()
    }

    fn describe(&self) -> String {
        format!("{} {}x{} {:?}", self.device_path, self.width, self.height, self.pixel_format())
    }
}

/// Opens frame sources. Production uses [`V4lDevice`]; tests supply fakes.
pub trait CaptureDevice: Send + Sync {
    fn open(&self, constraints: &CaptureConstraints) -> Result<Box<dyn FrameSource>, CameraError>;
}

/// A V4L2 device node such as `/dev/video0`.
#[derive(Debug, Clone)]
pub struct V4lDevice {
    path: String,
}

impl V4lDevice {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptureDevice for V4lDevice {
    fn open(&self, constraints: &CaptureConstraints) -> Result<Box<dyn FrameSource>, CameraError> {
        Ok(Box::new(Camera::open(&self.path, constraints)?))
    }
}

/// An acquired camera stream.
///
/// The underlying source is dropped (closing the device) on the first call
/// to [`release`](Self::release) or when the session is dropped, whichever
/// comes first. Further releases are no-ops.
pub struct CaptureSession {
    source: Option<Box<dyn FrameSource>>,
}

impl CaptureSession {
    pub fn acquire(
        device: &dyn CaptureDevice,
        constraints: &CaptureConstraints,
    ) -> Result<Self, CameraError> {
        let source = device.open(constraints)?;
        tracing::info!(source = %source.describe(), "capture acquired");
        Ok(Self {
            source: Some(source),
        })
    }

    pub fn grab(&mut self) -> Result<Frame, CameraError> {
        match self.source.as_mut() {
            Some(source) => source.grab(),
            None => Err(CameraError::CaptureFailed("capture session released".into())),
        }
    }

    pub fn is_active(&self) -> bool {
        self.source.is_some()
    }

    pub fn release(&mut self) {
        if let Some(source) = self.source.take() {
            tracing::info!(source = %source.describe(), "capture released");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        drops: Arc<AtomicUsize>,
    }

    impl FrameSource for CountingSource {
        fn grab(&mut self) -> Result<Frame, CameraError> {
            Ok(Frame {
                data: vec![7; 4],
                width: 2,
                height: 2,
                timestamp: std::time::Instant::now(),
                sequence: 1,
            })
        }

        fn describe(&self) -> String {
            "counting".into()
        }
    }

    impl Drop for CountingSource {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingDevice {
        drops: Arc<AtomicUsize>,
    }

    impl CaptureDevice for CountingDevice {
        fn open(&self, _: &CaptureConstraints) -> Result<Box<dyn FrameSource>, CameraError> {
            Ok(Box::new(CountingSource {
                drops: self.drops.clone(),
            }))
        }
    }

    struct DeniedDevice;

    impl CaptureDevice for DeniedDevice {
        fn open(&self, _: &CaptureConstraints) -> Result<Box<dyn FrameSource>, CameraError> {
            Err(CameraError::PermissionDenied("/dev/video0".into()))
        }
    }

    #[test]
    fn test_release_is_idempotent() {
        let drops = Arc::new(AtomicUsize::new(0));
        let device = CountingDevice { drops: drops.clone() };
        let mut session = CaptureSession::acquire(&device, &CaptureConstraints::default()).unwrap();
        assert!(session.is_active());
        assert_eq!(session.grab().unwrap().data, vec![7; 4]);

        session.release();
        session.release();
        assert!(!session.is_active());
        drop(session);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases() {
        let drops = Arc::new(AtomicUsize::new(0));
        let device = CountingDevice { drops: drops.clone() };
        {
            let _session = CaptureSession::acquire(&device, &CaptureConstraints::default()).unwrap();
            assert_eq!(drops.load(Ordering::SeqCst), 0);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_grab_after_release_fails() {
        let device = CountingDevice {
            drops: Arc::new(AtomicUsize::new(0)),
        };
        let mut session = CaptureSession::acquire(&device, &CaptureConstraints::default()).unwrap();
        session.release();
        assert!(matches!(session.grab(), Err(CameraError::CaptureFailed(_))));
    }

    #[test]
    fn test_acquire_propagates_open_error() {
        let err = CaptureSession::acquire(&DeniedDevice, &CaptureConstraints::default()).unwrap_err();
        assert!(matches!(err, CameraError::PermissionDenied(_)));
    }
}
