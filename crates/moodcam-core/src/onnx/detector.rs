//! SCRFD face detector: letterboxed input, anchor-free decode per stride, NMS.

use super::crop::GrayView;
use super::load_session;
use crate::inference::InferenceError;
use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_SCORE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_IOU: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// How a frame was scaled and padded into the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    pad_x: u32,
    pad_y: u32,
    /// Size of the scaled frame inside the padded input.
    inner_w: u32,
    inner_h: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let inner_w = ((width as f32 * scale).round() as u32).clamp(1, target);
        let inner_h = ((height as f32 * scale).round() as u32).clamp(1, target);
        Self {
            scale,
            pad_x: (target - inner_w) / 2,
            pad_y: (target - inner_h) / 2,
            inner_w,
            inner_h,
        }
    }

    /// Model-input coordinates back to frame coordinates.
    fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }

    /// Input pixel → pixel of the scaled frame, or `None` in the padding.
    fn inner(&self, x: usize, y: usize) -> Option<(u32, u32)> {
        let x = (x as u32).checked_sub(self.pad_x).filter(|&x| x < self.inner_w)?;
        let y = (y as u32).checked_sub(self.pad_y).filter(|&y| y < self.inner_h)?;
        Some((x, y))
    }
}

/// Output tensor positions for one stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideHeads {
    score: usize,
    bbox: usize,
    kps: usize,
}

pub struct FaceDetector {
    session: Session,
    heads: [StrideHeads; 3],
}

impl FaceDetector {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let session = load_session(path, "scrfd")?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 9 {
            return Err(InferenceError::InvalidModel(format!(
                "SCRFD needs 9 outputs (score/bbox/kps for 3 strides), got {}",
                names.len()
            )));
        }

        let heads = locate_heads(&names);
        tracing::debug!(?heads, "SCRFD output heads");

        Ok(Self { session, heads })
    }

    /// Faces in a grayscale frame, most confident first.
    pub fn detect(&mut self, image: &GrayView<'_>) -> Result<Vec<BoundingBox>, InferenceError> {
        let (letterbox, input) = preprocess(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (heads, &stride) in self.heads.iter().zip(SCRFD_STRIDES.iter()) {
            let (_, scores) = outputs[heads.score]
                .try_extract_tensor::<f32>()
                .map_err(|e| InferenceError::Failed(format!("SCRFD scores, stride {stride}: {e}")))?;
            let (_, boxes) = outputs[heads.bbox]
                .try_extract_tensor::<f32>()
                .map_err(|e| InferenceError::Failed(format!("SCRFD boxes, stride {stride}: {e}")))?;
            let (_, kps) = outputs[heads.kps]
                .try_extract_tensor::<f32>()
                .map_err(|e| InferenceError::Failed(format!("SCRFD keypoints, stride {stride}: {e}")))?;

            candidates.extend(decode_stride(scores, boxes, kps, stride, &letterbox));
        }

        Ok(non_max_suppression(candidates, SCRFD_NMS_IOU))
    }
}

fn preprocess(image: &GrayView<'_>) -> (Letterbox, Array4<f32>) {
    let (width, height) = image.dimensions();
    let letterbox = Letterbox::fit(width, height, SCRFD_INPUT_SIZE);
    let scaled = imageops::resize(image, letterbox.inner_w, letterbox.inner_h, FilterType::Triangle);

    let size = SCRFD_INPUT_SIZE as usize;
    let tensor = Array4::from_shape_fn((1, 3, size, size), |(_, _, y, x)| {
        // Padding uses the mean so it normalizes to exactly zero.
        let pixel = letterbox
            .inner(x, y)
            .map_or(SCRFD_MEAN, |(ix, iy)| scaled.get_pixel(ix, iy)[0] as f32);
        (pixel - SCRFD_MEAN) / SCRFD_STD
    });

    (letterbox, tensor)
}

/// Map outputs to strides by name (`score_8`, `bbox_16`, `kps_32`, ...),
/// falling back to the usual export order: scores, then boxes, then
/// keypoints, each for strides 8/16/32.
fn locate_heads(names: &[String]) -> [StrideHeads; 3] {
    let position = |kind: &str, stride: usize| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let named: Option<Vec<StrideHeads>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| {
            Some(StrideHeads {
                score: position("score", stride)?,
                bbox: position("bbox", stride)?,
                kps: position("kps", stride)?,
            })
        })
        .collect();

    match named.as_deref() {
        Some(&[a, b, c]) => [a, b, c],
        _ => {
            tracing::info!(?names, "SCRFD output names not recognized, using positional heads");
            std::array::from_fn(|i| StrideHeads {
                score: i,
                bbox: i + 3,
                kps: i + 6,
            })
        }
    }
}

/// Decode one stride's anchors into frame-space boxes above the score threshold.
fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<BoundingBox> {
    let cols = SCRFD_INPUT_SIZE as usize / stride;
    let step = stride as f32;

    scores
        .iter()
        .enumerate()
        .filter(|&(_, &score)| score > SCRFD_SCORE_THRESHOLD)
        .filter_map(|(idx, &score)| {
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % cols) as f32 * step;
            let ay = (cell / cols) as f32 * step;

            let d = boxes.get(idx * 4..idx * 4 + 4)?;
            let (x1, y1) = letterbox.to_frame(ax - d[0] * step, ay - d[1] * step);
            let (x2, y2) = letterbox.to_frame(ax + d[2] * step, ay + d[3] * step);

            let landmarks = kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| letterbox.to_frame(ax + k[i * 2] * step, ay + k[i * 2 + 1] * step))
            });

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

/// Greedy NMS; the result is sorted by confidence, highest first.
fn non_max_suppression(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence, landmarks: None }
    }

    #[test]
    fn test_letterbox_landscape_frame() {
        let lb = Letterbox::fit(720, 560, 640);
        assert_eq!(lb.inner_w, 640);
        assert_eq!(lb.inner_h, 498);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 71);
        assert!(lb.inner(10, 10).is_none());
        assert_eq!(lb.inner(10, 71), Some((10, 0)));
        assert!(lb.inner(10, 71 + 498).is_none());
    }

    #[test]
    fn test_letterbox_maps_back_to_frame() {
        let lb = Letterbox::fit(320, 240, 640);
        let (orig_x, orig_y) = (100.0f32, 50.0f32);
        let input_x = orig_x * lb.scale + lb.pad_x as f32;
        let input_y = orig_y * lb.scale + lb.pad_y as f32;
        let (x, y) = lb.to_frame(input_x, input_y);
        assert!((x - orig_x).abs() < 0.01, "x: {x}");
        assert!((y - orig_y).abs() < 0.01, "y: {y}");
    }

    #[test]
    fn test_locate_heads_by_name() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let heads = locate_heads(&names);
        assert_eq!(heads[0], StrideHeads { score: 2, bbox: 0, kps: 1 });
        assert_eq!(heads[2], StrideHeads { score: 8, bbox: 6, kps: 7 });
    }

    #[test]
    fn test_locate_heads_positional() {
        let names: Vec<String> = (440..449).map(|i: usize| i.to_string()).collect();
        let heads = locate_heads(&names);
        assert_eq!(heads[0], StrideHeads { score: 0, bbox: 3, kps: 6 });
        assert_eq!(heads[1], StrideHeads { score: 1, bbox: 4, kps: 7 });
        assert_eq!(heads[2], StrideHeads { score: 2, bbox: 5, kps: 8 });
    }

    #[test]
    fn test_decode_single_anchor() {
        let stride = 32;
        let cols = 640 / stride;
        let anchors = cols * cols * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.1f32; anchors];
        let boxes = vec![1.0f32; anchors * 4];
        let kps = vec![0.0f32; anchors * 10];

        // Row 1, column 2 → anchor centre (64, 32).
        let idx = (cols + 2) * SCRFD_ANCHORS_PER_CELL;
        scores[idx] = 0.9;

        let identity = Letterbox::fit(640, 640, 640);
        let faces = decode_stride(&scores, &boxes, &kps, stride, &identity);
        assert_eq!(faces.len(), 1);
        let face = &faces[0];
        assert_eq!((face.x, face.y, face.width, face.height), (32.0, 0.0, 64.0, 64.0));
        assert_eq!(face.confidence, 0.9);
        assert_eq!(face.landmarks.unwrap()[0], (64.0, 32.0));
    }

    #[test]
    fn test_decode_skips_truncated_box_tensor() {
        let scores = vec![0.9f32; 4];
        let faces = decode_stride(&scores, &[0.0; 4], &[], 32, &Letterbox::fit(640, 640, 640));
        assert_eq!(faces.len(), 1);
        assert!(faces[0].landmarks.is_none());
    }

    #[test]
    fn test_nms_suppresses_overlap_and_sorts() {
        let kept = non_max_suppression(
            vec![
                bbox(200.0, 200.0, 50.0, 50.0, 0.7),
                bbox(5.0, 5.0, 100.0, 100.0, 0.8),
                bbox(0.0, 0.0, 100.0, 100.0, 0.9),
            ],
            0.4,
        );
        let confidences: Vec<f32> = kept.iter().map(|b| b.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
    }

    #[test]
    fn test_nms_empty() {
        assert!(non_max_suppression(Vec::new(), 0.4).is_empty());
    }
}
