use crate::state::Phase;
use moodcam_core::InferenceError;
use moodcam_hw::CameraError;
use thiserror::Error;

/// Failures that end a session. Only an explicit restart leaves them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("model load failed: {0}")]
    ModelLoadFailure(String),
    #[error("inference worker crashed: {0}")]
    WorkerCrashed(String),
}

impl From<CameraError> for SessionError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::PermissionDenied(msg) => SessionError::PermissionDenied(msg),
            CameraError::DeviceUnavailable(msg) | CameraError::CaptureFailed(msg) => {
                SessionError::DeviceUnavailable(msg)
            }
        }
    }
}

impl From<InferenceError> for SessionError {
    fn from(err: InferenceError) -> Self {
        SessionError::ModelLoadFailure(err.to_string())
    }
}

/// Errors returned to control-surface callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("an inference call is already in flight")]
    Busy,
    #[error("session is not ready (phase: {0})")]
    NotReady(Phase),
    #[error("session task exited")]
    ChannelClosed,
}
