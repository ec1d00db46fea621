use crate::commentary::CommentaryCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Violations of the detection data contract.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    #[error("unknown expression label: {0}")]
    UnknownLabel(String),
    #[error("unknown mode: {0} (expected \"mood\" or \"age\")")]
    UnknownMode(String),
    #[error("unknown gender: {0}")]
    UnknownGender(String),
}

/// The closed set of facial expression labels, in enumeration order.
///
/// The order matters: it is the tie-break order when picking the dominant
/// expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionLabel {
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
    Neutral,
}

impl ExpressionLabel {
    pub const ALL: [ExpressionLabel; 7] = [
        ExpressionLabel::Happy,
        ExpressionLabel::Sad,
        ExpressionLabel::Angry,
        ExpressionLabel::Fearful,
        ExpressionLabel::Disgusted,
        ExpressionLabel::Surprised,
        ExpressionLabel::Neutral,
    ];

    /// Position in [`ExpressionLabel::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExpressionLabel::Happy => "happy",
            ExpressionLabel::Sad => "sad",
            ExpressionLabel::Angry => "angry",
            ExpressionLabel::Fearful => "fearful",
            ExpressionLabel::Disgusted => "disgusted",
            ExpressionLabel::Surprised => "surprised",
            ExpressionLabel::Neutral => "neutral",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            ExpressionLabel::Happy => "😊",
            ExpressionLabel::Sad => "😢",
            ExpressionLabel::Angry => "😠",
            ExpressionLabel::Fearful => "😨",
            ExpressionLabel::Disgusted => "🤢",
            ExpressionLabel::Surprised => "😲",
            ExpressionLabel::Neutral => "😐",
        }
    }
}

impl fmt::Display for ExpressionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpressionLabel {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExpressionLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| ContractError::UnknownLabel(s.to_string()))
    }
}

/// Per-label expression scores. Every label always has a score.
///
/// Scores are comparable weights in [0, 1]; they need not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Expressions {
    scores: [f32; 7],
}

impl Expressions {
    /// Build from scores indexed in [`ExpressionLabel::ALL`] order.
    pub fn new(scores: [f32; 7]) -> Self {
        Self { scores }
    }

    pub fn get(&self, label: ExpressionLabel) -> f32 {
        self.scores[label.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExpressionLabel, f32)> + '_ {
        ExpressionLabel::ALL
            .into_iter()
            .map(move |label| (label, self.scores[label.index()]))
    }

    /// Highest-scoring label. Ties go to the label that comes first in
    /// enumeration order.
    pub fn dominant(&self) -> (ExpressionLabel, f32) {
        let mut best = (ExpressionLabel::Happy, self.scores[0]);
        for (label, score) in self.iter().skip(1) {
            if score > best.1 {
                best = (label, score);
            }
        }
        best
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(ContractError::UnknownGender(other.to_string())),
        }
    }
}

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-union with another box, in [0, 1].
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter_w = ((self.x + self.width).min(other.x + other.width) - self.x.max(other.x)).max(0.0);
        let inter_h =
            ((self.y + self.height).min(other.y + other.height) - self.y.max(other.y)).max(0.0);
        let inter = inter_w * inter_h;
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Which inference stages a caller wants from one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureSet {
    pub landmarks: bool,
    pub expressions: bool,
    pub age_gender: bool,
}

impl FeatureSet {
    /// Stages needed to classify under `mode`; landmarks always ride along
    /// for the overlay.
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Mood => FeatureSet {
                landmarks: true,
                expressions: true,
                age_gender: false,
            },
            Mode::Age => FeatureSet {
                landmarks: true,
                expressions: false,
                age_gender: true,
            },
        }
    }
}

/// Output of one inference call for the single tracked face.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// Face detector confidence in [0, 1]; doubles as the face quality score.
    pub face_score: f32,
    pub bbox: Option<BoundingBox>,
    pub expressions: Option<Expressions>,
    pub age: Option<f32>,
    pub gender: Option<Gender>,
}

impl RawDetection {
    /// A bare detection with only a face score.
    pub fn face(face_score: f32) -> Self {
        Self {
            face_score,
            bbox: None,
            expressions: None,
            age: None,
            gender: None,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_expressions(mut self, expressions: Expressions) -> Self {
        self.expressions = Some(expressions);
        self
    }

    pub fn with_age_gender(mut self, age: f32, gender: Gender) -> Self {
        self.age = Some(age);
        self.gender = Some(gender);
        self
    }
}

/// Classification mode. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Mood,
    Age,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Mood => "mood",
            Mode::Age => "age",
        }
    }

    pub fn features(self) -> FeatureSet {
        FeatureSet::for_mode(self)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mood" => Ok(Mode::Mood),
            "age" => Ok(Mode::Age),
            _ => Err(ContractError::UnknownMode(s.to_string())),
        }
    }
}

/// Decided, display-ready classification for one evaluated frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    NoFace,
    LowConfidence,
    MoodResult { label: ExpressionLabel, confidence: f32 },
    AgeResult { age: u32, gender: Gender },
    Rejected,
}

/// Coarse identity of an [`Outcome`], ignoring confidence and estimate values.
///
/// Two outcomes with the same category are "the same" for side-effect
/// purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeCategory {
    NoFace,
    LowConfidence,
    Mood(ExpressionLabel),
    Age,
    Rejected,
}

impl Outcome {
    pub fn category(&self) -> OutcomeCategory {
        match self {
            Outcome::NoFace => OutcomeCategory::NoFace,
            Outcome::LowConfidence => OutcomeCategory::LowConfidence,
            Outcome::MoodResult { label, .. } => OutcomeCategory::Mood(*label),
            Outcome::AgeResult { .. } => OutcomeCategory::Age,
            Outcome::Rejected => OutcomeCategory::Rejected,
        }
    }

    /// Commentary list this outcome draws from, if any.
    pub fn commentary(&self) -> Option<CommentaryCategory> {
        match self {
            Outcome::MoodResult { label, .. } => Some(CommentaryCategory::Mood(*label)),
            Outcome::AgeResult { .. } => Some(CommentaryCategory::Age),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::NoFace => f.write_str("No face detected"),
            Outcome::LowConfidence => f.write_str("Low confidence detection"),
            Outcome::MoodResult { label, confidence } => {
                write!(f, "{} {} ({:.1}%)", label.emoji(), label, confidence * 100.0)
            }
            Outcome::AgeResult { age, gender } => write!(f, "👤 {gender}, Age: {age}"),
            Outcome::Rejected => f.write_str("Face not clear enough"),
        }
    }
}
