//! k-nearest-neighbour identity classifier over a pre-trained gallery.
//!
//! The gallery is produced offline (one embedding per training face) and
//! shipped as JSON:
//!
//! ```json
//! { "neighbors": 5, "samples": [ { "label": "Alice", "embedding": [0.1, ...] } ] }
//! ```

use crate::types::{Classification, Embedding};
use crate::IdentityClassifier;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

const DEFAULT_NEIGHBORS: usize = 5;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("classifier gallery not found: {0}")]
    GalleryNotFound(String),
    #[error("failed to read classifier gallery: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed classifier gallery: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("classifier gallery is empty")]
    EmptyGallery,
    #[error("embedding has {actual} dimensions, gallery expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Deserialize)]
struct GalleryFile {
    neighbors: Option<usize>,
    samples: Vec<GallerySample>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GallerySample {
    pub label: String,
    pub embedding: Vec<f32>,
}

/// Majority-vote k-NN classifier with Euclidean distance.
#[derive(Debug)]
pub struct NearestNeighborClassifier {
    neighbors: usize,
    dim: usize,
    samples: Vec<(String, Embedding)>,
}

impl NearestNeighborClassifier {
    /// Build a classifier from in-memory samples. All embeddings must share one dimension.
    pub fn new(samples: Vec<GallerySample>, neighbors: usize) -> Result<Self, ClassifierError> {
        let dim = samples.first().ok_or(ClassifierError::EmptyGallery)?.embedding.len();
        if let Some(bad) = samples.iter().find(|s| s.embedding.len() != dim) {
            return Err(ClassifierError::DimensionMismatch {
                expected: dim,
                actual: bad.embedding.len(),
            });
        }

        Ok(Self {
            neighbors: neighbors.max(1),
            dim,
            samples: samples
                .into_iter()
                .map(|s| (s.label, Embedding::new(s.embedding)))
                .collect(),
        })
    }

    /// Load a gallery JSON file.
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        if !path.exists() {
            return Err(ClassifierError::GalleryNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let file: GalleryFile = serde_json::from_str(&raw)?;
        let classifier = Self::new(file.samples, file.neighbors.unwrap_or(DEFAULT_NEIGHBORS))?;

        tracing::info!(
            path = %path.display(),
            samples = classifier.samples.len(),
            neighbors = classifier.neighbors,
            dim = classifier.dim,
            "loaded classifier gallery"
        );

        Ok(classifier)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl IdentityClassifier for NearestNeighborClassifier {
    fn classify(&self, embedding: &Embedding) -> Result<Classification, ClassifierError> {
        if embedding.len() != self.dim {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.dim,
                actual: embedding.len(),
            });
        }

        let mut ranked: Vec<(f32, &str)> = self
            .samples
            .iter()
            .map(|(label, sample)| (embedding.euclidean_distance(sample), label.as_str()))
            .collect();
        ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.neighbors);

        // label -> (votes, nearest distance among its voters)
        let mut votes: HashMap<&str, (usize, f32)> = HashMap::new();
        for &(distance, label) in &ranked {
            votes.entry(label).or_insert((0, distance)).0 += 1;
        }

        // Most votes wins; a tie goes to the label whose nearest voter is closest.
        let (label, (_, distance)) = votes
            .into_iter()
            .max_by(|(label_a, (votes_a, dist_a)), (label_b, (votes_b, dist_b))| {
                votes_a
                    .cmp(votes_b)
                    .then_with(|| dist_b.partial_cmp(dist_a).unwrap_or(std::cmp::Ordering::Equal))
                    .then_with(|| label_b.cmp(label_a))
            })
            .ok_or(ClassifierError::EmptyGallery)?;

        Ok(Classification {
            label: label.to_string(),
            distance,
        })
    }
}
