//! FER+ expression classifier.
//!
//! Takes a 64x64 grayscale face crop with raw 0–255 intensities and returns
//! eight logits. The eighth class (contempt) has no label in the closed
//! expression set, so its probability is folded into `disgusted`.

use super::crop::{face_crop, to_nchw, GrayView};
use super::load_session;
use crate::inference::InferenceError;
use crate::types::{BoundingBox, ExpressionLabel, Expressions};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const FERPLUS_INPUT_SIZE: u32 = 64;
const FERPLUS_CROP_SCALE: f32 = 1.0;

/// FER+ output order. `None` is contempt.
const FERPLUS_CLASSES: [Option<ExpressionLabel>; 8] = [
    Some(ExpressionLabel::Neutral),
    Some(ExpressionLabel::Happy),
    Some(ExpressionLabel::Surprised),
    Some(ExpressionLabel::Sad),
    Some(ExpressionLabel::Angry),
    Some(ExpressionLabel::Disgusted),
    Some(ExpressionLabel::Fearful),
    None,
];

pub struct ExpressionClassifier {
    session: Session,
}

impl ExpressionClassifier {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        Ok(Self {
            session: load_session(path, "ferplus")?,
        })
    }

    pub fn classify(
        &mut self,
        image: &GrayView<'_>,
        face: &BoundingBox,
    ) -> Result<Expressions, InferenceError> {
        let crop = face_crop(image, face, FERPLUS_CROP_SCALE, FERPLUS_INPUT_SIZE);
        let input = to_nchw(&crop, 1, 0.0, 1.0);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Failed(format!("FER+ logits: {e}")))?;

        if logits.len() != FERPLUS_CLASSES.len() {
            return Err(InferenceError::InvalidModel(format!(
                "FER+ should emit {} scores, got {}",
                FERPLUS_CLASSES.len(),
                logits.len()
            )));
        }

        Ok(fold_classes(&softmax(logits)))
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn fold_classes(probabilities: &[f32]) -> Expressions {
    let mut scores = [0.0f32; 7];
    for (class, p) in FERPLUS_CLASSES.iter().zip(probabilities) {
        let label = class.unwrap_or(ExpressionLabel::Disgusted);
        scores[label.index()] += p;
    }
    Expressions::new(scores)
}
