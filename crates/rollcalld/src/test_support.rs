//! Model stubs for pipeline tests.
//!
//! Photos are painted in flat colours; the extractor embeds a crop as its
//! mean (red, green) and the gallery places Carol at pure red and Dana at
//! pure green.

use crate::engine::Models;
use image::{ImageFormat, Rgb, RgbImage};
use rollcall_core::classifier::GallerySample;
use rollcall_core::{
    BoundingBox, DetectorError, Embedding, EmbeddingExtractor, FaceLocalizer,
    NearestNeighborClassifier, RecognizerError,
};
use std::io::Cursor;
use std::time::Duration;

pub fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> BoundingBox {
    BoundingBox { x1, y1, x2, y2, confidence }
}

/// 40×20: red left half, green right half.
pub fn two_tone_image() -> RgbImage {
    RgbImage::from_fn(40, 20, |x, _| {
        if x < 20 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 255, 0])
        }
    })
}

pub fn encode_png(image: &RgbImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Returns the same boxes for every photo.
pub struct FixedLocalizer {
    faces: Vec<BoundingBox>,
    delay: Duration,
    fail: bool,
}

impl FixedLocalizer {
    pub fn new(faces: Vec<BoundingBox>) -> Self {
        Self { faces, delay: Duration::ZERO, fail: false }
    }

    /// Blocks the engine thread for `delay` per photo.
    pub fn slow(faces: Vec<BoundingBox>, delay: Duration) -> Self {
        Self { faces, delay, fail: false }
    }

    pub fn failing() -> Self {
        Self { faces: Vec::new(), delay: Duration::ZERO, fail: true }
    }
}

impl FaceLocalizer for FixedLocalizer {
    fn locate(&mut self, _image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail {
            return Err(DetectorError::InferenceFailed("stub failure".into()));
        }
        Ok(self.faces.clone())
    }
}

pub struct ColorExtractor;

impl EmbeddingExtractor for ColorExtractor {
    fn input_size(&self) -> u32 {
        8
    }

    fn embed(&mut self, crop: &RgbImage) -> Result<Embedding, RecognizerError> {
        let pixels = (crop.width() * crop.height()) as f32;
        let (red, green) = crop
            .pixels()
            .fold((0.0f32, 0.0f32), |(r, g), p| (r + p[0] as f32, g + p[1] as f32));
        Ok(Embedding::new(vec![red / pixels / 255.0, green / pixels / 255.0]))
    }
}

pub fn color_gallery(labels: [&str; 2]) -> NearestNeighborClassifier {
    let samples = vec![
        GallerySample { label: labels[0].into(), embedding: vec![1.0, 0.0] },
        GallerySample { label: labels[1].into(), embedding: vec![0.0, 1.0] },
    ];
    NearestNeighborClassifier::new(samples, 1).unwrap()
}

pub fn models_with(localizer: FixedLocalizer, labels: [&str; 2]) -> Models {
    Models {
        localizer: Box::new(localizer),
        extractor: Box::new(ColorExtractor),
        classifier: Box::new(color_gallery(labels)),
        gallery_size: 2,
    }
}

pub fn color_models(faces: Vec<BoundingBox>) -> Models {
    models_with(FixedLocalizer::new(faces), ["Carol", "Dana"])
}
