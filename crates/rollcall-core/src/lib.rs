//! rollcall-core: face localization, embedding and identity classification.
//!
//! Uses SCRFD for face localization and ArcFace for embeddings, both running
//! via ONNX Runtime for CPU inference, and a k-nearest-neighbour classifier
//! over a pre-trained gallery. Each model sits behind a trait so the
//! ingestion pipeline can run against stubs.

pub mod classifier;
pub mod crop;
pub mod detector;
pub mod recognizer;
pub mod types;

use image::RgbImage;
use std::path::PathBuf;

pub use classifier::{ClassifierError, NearestNeighborClassifier};
pub use crop::{crop_face, CropError};
pub use detector::{DetectorError, ScrfdLocalizer};
pub use recognizer::{ArcFaceExtractor, RecognizerError};
pub use types::{BoundingBox, Classification, Embedding};

/// Locates faces in a photo.
pub trait FaceLocalizer: Send {
    /// Every candidate face, most confident first. No acceptance floor is
    /// applied; an empty vector means no faces.
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Turns a square face crop into an embedding vector.
pub trait EmbeddingExtractor: Send {
    /// Side length, in pixels, of the square crops this extractor accepts.
    fn input_size(&self) -> u32;

    fn embed(&mut self, face: &RgbImage) -> Result<Embedding, RecognizerError>;

    /// Embed several crops. One embedding per crop, in input order.
    fn embed_batch(&mut self, faces: &[RgbImage]) -> Result<Vec<Embedding>, RecognizerError> {
        faces.iter().map(|face| self.embed(face)).collect()
    }
}

/// Maps an embedding to the nearest known identity label.
pub trait IdentityClassifier: Send {
    fn classify(&self, embedding: &Embedding) -> Result<Classification, ClassifierError>;
}

/// Default model directory: `$XDG_DATA_HOME/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    default_data_dir().join("models")
}

/// Default data directory: `$XDG_DATA_HOME/rollcall`, falling back to `~/.local/share/rollcall`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}
