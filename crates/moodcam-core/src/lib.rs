//! moodcam-core: face attribute outcomes for a live camera feed.
//!
//! Turns per-frame face detections (expression scores, age/gender
//! estimates) into decided outcomes, and picks commentary for them.
//! Includes an ONNX Runtime backend for CPU inference.

pub mod commentary;
pub mod filter;
pub mod inference;
pub mod onnx;
pub mod rotator;
pub mod types;

pub use commentary::{CatalogError, CommentaryCatalog, CommentaryCategory};
pub use filter::StabilityFilter;
pub use inference::{InferenceBackend, InferenceError};
pub use onnx::{default_model_dir, ModelPaths, OnnxBackend};
pub use rotator::{CommentaryHistory, MessageRotator};
pub use types::{
    BoundingBox, ContractError, ExpressionLabel, Expressions, FeatureSet, Gender, Mode, Outcome,
    OutcomeCategory, RawDetection,
};
