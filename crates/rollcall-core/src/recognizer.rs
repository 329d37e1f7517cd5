//! ArcFace embedding extractor via ONNX Runtime.
//!
//! Extracts 512-dimensional face embeddings from square RGB face crops,
//! using the w600k_r50 ArcFace model.

use crate::types::Embedding;
use crate::EmbeddingExtractor;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (different from SCRFD!) ---
const ARCFACE_INPUT_SIZE: u32 = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD's 128.0
const ARCFACE_EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}; download it from insightface into the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face crop is {width}x{height}, extractor expects {expected}x{expected}")]
    BadCropSize { width: u32, height: u32, expected: u32 },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based embedding extractor.
pub struct ArcFaceExtractor {
    session: Session,
}

impl ArcFaceExtractor {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Stack RGB crops into one NCHW float tensor.
    fn preprocess(faces: &[RgbImage]) -> Result<Array4<f32>, RecognizerError> {
        let size = ARCFACE_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((faces.len(), 3, size, size));

        for (n, face) in faces.iter().enumerate() {
            if face.dimensions() != (ARCFACE_INPUT_SIZE, ARCFACE_INPUT_SIZE) {
                return Err(RecognizerError::BadCropSize {
                    width: face.width(),
                    height: face.height(),
                    expected: ARCFACE_INPUT_SIZE,
                });
            }
            for (x, y, pixel) in face.enumerate_pixels() {
                for c in 0..3 {
                    tensor[[n, c, y as usize, x as usize]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
                }
            }
        }

        Ok(tensor)
    }
}

impl EmbeddingExtractor for ArcFaceExtractor {
    fn input_size(&self) -> u32 {
        ARCFACE_INPUT_SIZE
    }

    fn embed(&mut self, face: &RgbImage) -> Result<Embedding, RecognizerError> {
        let mut batch = self.embed_batch(std::slice::from_ref(face))?;
        batch
            .pop()
            .ok_or_else(|| RecognizerError::InferenceFailed("empty embedding batch".into()))
    }

    /// Embed every crop of one photo in a single inference call.
    fn embed_batch(&mut self, faces: &[RgbImage]) -> Result<Vec<Embedding>, RecognizerError> {
        if faces.is_empty() {
            return Ok(Vec::new());
        }

        let input = Self::preprocess(faces)?;
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let expected = faces.len() * ARCFACE_EMBEDDING_DIM;
        if raw_data.len() != expected {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {} x {ARCFACE_EMBEDDING_DIM}-dim embeddings, got {} values",
                faces.len(),
                raw_data.len()
            )));
        }

        Ok(raw_data
            .chunks_exact(ARCFACE_EMBEDDING_DIM)
            .map(|raw| Embedding::new(l2_normalize(raw)))
            .collect())
    }
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
