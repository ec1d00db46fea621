use crate::error::SessionError;
use moodcam_core::{InferenceBackend, ModelPaths, OnnxBackend};
use moodcam_hw::{CaptureConstraints, CaptureSession, V4lDevice};

/// Builds the two resources a session needs. Both calls block.
pub trait SessionBackends: Send + Sync + 'static {
    fn acquire_capture(&self, constraints: &CaptureConstraints) -> Result<CaptureSession, SessionError>;

    fn load_backend(&self) -> Result<Box<dyn InferenceBackend>, SessionError>;
}

/// A V4L2 camera plus the ONNX models.
pub struct DeviceBackends {
    device: V4lDevice,
    models: ModelPaths,
}

impl DeviceBackends {
    pub fn new(camera_device: &str, models: ModelPaths) -> Self {
        Self {
            device: V4lDevice::new(camera_device),
            models,
        }
    }
}

impl SessionBackends for DeviceBackends {
    fn acquire_capture(&self, constraints: &CaptureConstraints) -> Result<CaptureSession, SessionError> {
        Ok(CaptureSession::acquire(&self.device, constraints)?)
    }

    fn load_backend(&self) -> Result<Box<dyn InferenceBackend>, SessionError> {
        let backend = OnnxBackend::load(&self.models)?;
        tracing::info!(dir = ?self.models.detector.parent(), "ONNX backend loaded");
        Ok(Box::new(backend))
    }
}
