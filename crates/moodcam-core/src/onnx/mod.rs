//! ONNX Runtime backend: SCRFD detection plus FER+ expression and
//! InsightFace gender/age heads.

mod age_gender;
mod crop;
mod detector;
mod expression;

pub use age_gender::AgeGenderEstimator;
pub use detector::FaceDetector;
pub use expression::ExpressionClassifier;

use crate::inference::{InferenceBackend, InferenceError};
use crate::types::{FeatureSet, RawDetection};
use ort::session::Session;
use std::path::{Path, PathBuf};

pub const DETECTOR_MODEL: &str = "det_10g.onnx";
pub const EXPRESSION_MODEL: &str = "emotion-ferplus-8.onnx";
pub const AGE_GENDER_MODEL: &str = "genderage.onnx";

/// `$XDG_DATA_HOME/moodcam/models`, or `~/.local/share/moodcam/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("moodcam/models")
}

/// Locations of the three model files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub expression: PathBuf,
    pub age_gender: PathBuf,
}

impl ModelPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detector: dir.join(DETECTOR_MODEL),
            expression: dir.join(EXPRESSION_MODEL),
            age_gender: dir.join(AGE_GENDER_MODEL),
        }
    }
}

fn load_session(path: &Path, model: &'static str) -> Result<Session, InferenceError> {
    if !path.exists() {
        return Err(InferenceError::ModelNotFound(path.display().to_string()));
    }

    let session = Session::builder()?
        .with_intra_threads(2)
        .map_err(ort::Error::from)?
        .commit_from_file(path)?;

    tracing::info!(
        model,
        path = %path.display(),
        inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
        outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
        "loaded ONNX model"
    );

    Ok(session)
}

/// All three models, run stage by stage according to the requested features.
pub struct OnnxBackend {
    detector: FaceDetector,
    expressions: ExpressionClassifier,
    age_gender: AgeGenderEstimator,
}

impl OnnxBackend {
    /// Load every model up front; any missing or malformed file fails the load.
    pub fn load(paths: &ModelPaths) -> Result<Self, InferenceError> {
        Ok(Self {
            detector: FaceDetector::load(&paths.detector)?,
            expressions: ExpressionClassifier::load(&paths.expression)?,
            age_gender: AgeGenderEstimator::load(&paths.age_gender)?,
        })
    }
}

impl InferenceBackend for OnnxBackend {
    fn inspect(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        features: FeatureSet,
    ) -> Result<Option<RawDetection>, InferenceError> {
        let image = crop::view(frame, width, height)?;

        // Single-face assumption: keep the most confident detection.
        let Some(mut face) = self.detector.detect(&image)?.into_iter().next() else {
            return Ok(None);
        };

        let mut detection = RawDetection::face(face.confidence);
        if features.expressions {
            detection = detection.with_expressions(self.expressions.classify(&image, &face)?);
        }
        if features.age_gender {
            let (age, gender) = self.age_gender.estimate(&image, &face)?;
            detection = detection.with_age_gender(age, gender);
        }
        if !features.landmarks {
            face.landmarks = None;
        }

        Ok(Some(detection.with_bbox(face)))
    }

    fn name(&self) -> &str {
        "onnx"
    }
}
