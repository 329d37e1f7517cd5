//! Face crop extraction: cut a detected box out of the photo and resize it to
//! the extractor's square input.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CropError {
    #[error("face box ({x1}, {y1}, {x2}, {y2}) lies outside the {width}x{height} image")]
    EmptyRegion {
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        width: u32,
        height: u32,
    },
}

/// Crop `face` out of `image` and resize it to `size`×`size`.
///
/// Box coordinates are truncated to whole pixels and clamped to the image.
pub fn crop_face(image: &RgbImage, face: &BoundingBox, size: u32) -> Result<RgbImage, CropError> {
    let (width, height) = image.dimensions();

    let clamp = |v: f32, max: u32| -> u32 { (v.max(0.0) as u32).min(max) };
    let x1 = clamp(face.x1, width);
    let y1 = clamp(face.y1, height);
    let x2 = clamp(face.x2, width);
    let y2 = clamp(face.y2, height);

    if x2 <= x1 || y2 <= y1 {
        return Err(CropError::EmptyRegion { x1, y1, x2, y2, width, height });
    }

    let region = imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image();
    Ok(imageops::resize(&region, size, size, FilterType::Triangle))
}
