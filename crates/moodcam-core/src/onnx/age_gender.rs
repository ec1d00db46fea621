//! InsightFace gender/age head.

use super::crop::{face_crop, to_nchw, GrayView};
use super::load_session;
use crate::inference::InferenceError;
use crate::types::{BoundingBox, Gender};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const GENDERAGE_INPUT_SIZE: u32 = 96;
/// The model was trained on loose crops around the detector box.
const GENDERAGE_CROP_SCALE: f32 = 1.5;
const GENDERAGE_MEAN: f32 = 0.0;
const GENDERAGE_STD: f32 = 1.0;

pub struct AgeGenderEstimator {
    session: Session,
}

impl AgeGenderEstimator {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        Ok(Self {
            session: load_session(path, "genderage")?,
        })
    }

    /// Estimated age in years and gender for the face.
    pub fn estimate(
        &mut self,
        image: &GrayView<'_>,
        face: &BoundingBox,
    ) -> Result<(f32, Gender), InferenceError> {
        let crop = face_crop(image, face, GENDERAGE_CROP_SCALE, GENDERAGE_INPUT_SIZE);
        let input = to_nchw(&crop, 3, GENDERAGE_MEAN, GENDERAGE_STD);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Failed(format!("genderage output: {e}")))?;

        decode(raw)
    }
}

/// Output layout: `[female, male, age / 100]`.
fn decode(raw: &[f32]) -> Result<(f32, Gender), InferenceError> {
    let &[female, male, age] = raw else {
        return Err(InferenceError::InvalidModel(format!(
            "genderage should emit 3 values, got {}",
            raw.len()
        )));
    };
    let gender = if male > female { Gender::Male } else { Gender::Female };
    Ok((age * 100.0, gender))
}
