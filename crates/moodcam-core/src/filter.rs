//! Per-frame decision: raw detection + mode → outcome.
//!
//! Stateless apart from its thresholds. Temporal debouncing happens in the
//! session state machine, never here.

use crate::types::{Mode, Outcome, RawDetection};

/// Dominant expression score must exceed this to count as a mood read.
pub const DEFAULT_MOOD_THRESHOLD: f32 = 0.5;
/// Face detector score must exceed this before an age/gender read is trusted.
pub const DEFAULT_AGE_QUALITY_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityFilter {
    pub mood_threshold: f32,
    pub age_quality_threshold: f32,
}

impl Default for StabilityFilter {
    fn default() -> Self {
        Self {
            mood_threshold: DEFAULT_MOOD_THRESHOLD,
            age_quality_threshold: DEFAULT_AGE_QUALITY_THRESHOLD,
        }
    }
}

impl StabilityFilter {
    pub fn new(mood_threshold: f32, age_quality_threshold: f32) -> Self {
        Self {
            mood_threshold,
            age_quality_threshold,
        }
    }

    /// Classify the latest detection under the active mode.
    pub fn decide(&self, detection: Option<&RawDetection>, mode: Mode) -> Outcome {
        let Some(detection) = detection else {
            return Outcome::NoFace;
        };

        match mode {
            Mode::Mood => self.decide_mood(detection),
            Mode::Age => self.decide_age(detection),
        }
    }

    fn decide_mood(&self, detection: &RawDetection) -> Outcome {
        // A detection without an expression table carries nothing to classify.
        let Some(expressions) = &detection.expressions else {
            return Outcome::NoFace;
        };

        let (label, confidence) = expressions.dominant();
        if confidence > self.mood_threshold {
            Outcome::MoodResult { label, confidence }
        } else {
            Outcome::LowConfidence
        }
    }

    fn decide_age(&self, detection: &RawDetection) -> Outcome {
        match (detection.age, detection.gender) {
            (Some(age), Some(gender))
                if detection.face_score > self.age_quality_threshold
                    && age.is_finite()
                    && age > 0.0 =>
            {
                Outcome::AgeResult {
                    age: age.round() as u32,
                    gender,
                }
            }
            _ => Outcome::Rejected,
        }
    }
}
