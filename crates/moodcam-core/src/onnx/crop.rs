//! Frame views, face crops and tensor packing shared by the ONNX heads.

use crate::inference::InferenceError;
use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use ndarray::Array4;

/// Borrowed grayscale frame.
pub(crate) type GrayView<'a> = ImageBuffer<Luma<u8>, &'a [u8]>;

pub(crate) fn view(frame: &[u8], width: u32, height: u32) -> Result<GrayView<'_>, InferenceError> {
    if width == 0 || height == 0 {
        return Err(InferenceError::InvalidFrame(format!(
            "empty frame ({width}x{height})"
        )));
    }
    let len = frame.len();
    ImageBuffer::from_raw(width, height, frame).ok_or_else(|| {
        InferenceError::InvalidFrame(format!(
            "{width}x{height} grayscale frame needs {} bytes, got {len}",
            width as usize * height as usize
        ))
    })
}

/// Square crop centred on `face`, `scale` times its longer side, clamped to
/// the frame and resized to `size`×`size`.
pub(crate) fn face_crop(image: &GrayView<'_>, face: &BoundingBox, scale: f32, size: u32) -> GrayImage {
    let (frame_w, frame_h) = image.dimensions();
    let half = (face.width.max(face.height) * scale).max(1.0) / 2.0;
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;

    let x0 = (cx - half).clamp(0.0, (frame_w - 1) as f32) as u32;
    let y0 = (cy - half).clamp(0.0, (frame_h - 1) as f32) as u32;
    let x1 = (cx + half).clamp(0.0, frame_w as f32) as u32;
    let y1 = (cy + half).clamp(0.0, frame_h as f32) as u32;
    let w = x1.saturating_sub(x0).max(1);
    let h = y1.saturating_sub(y0).max(1);

    let crop = imageops::crop_imm(image, x0, y0, w, h);
    imageops::resize(&*crop, size, size, FilterType::Triangle)
}

/// Pack a grayscale image into a `[1, channels, H, W]` tensor, replicating
/// the single channel.
pub(crate) fn to_nchw(image: &GrayImage, channels: usize, mean: f32, std: f32) -> Array4<f32> {
    let (w, h) = image.dimensions();
    Array4::from_shape_fn((1, channels, h as usize, w as usize), |(_, _, y, x)| {
        (image.get_pixel(x as u32, y as u32)[0] as f32 - mean) / std
    })
}
