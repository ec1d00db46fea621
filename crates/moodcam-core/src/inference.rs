//! The detection backend seam.

use crate::types::{FeatureSet, RawDetection};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("model file not found: {0} (download it into the model directory)")]
    ModelNotFound(String),
    #[error("unexpected model layout: {0}")]
    InvalidModel(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("inference failed: {0}")]
    Failed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A face attribute backend: given one grayscale frame, report at most one
/// face.
///
/// Implementations may be slow and are always called from a blocking
/// context, one call at a time. Stages absent from `features` should be
/// skipped, not computed and discarded.
pub trait InferenceBackend: Send + 'static {
    fn inspect(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        features: FeatureSet,
    ) -> Result<Option<RawDetection>, InferenceError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}
