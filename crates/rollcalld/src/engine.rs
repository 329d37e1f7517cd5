use crate::config::Config;
use image::RgbImage;
use rollcall_core::{
    crop_face, BoundingBox, EmbeddingExtractor, FaceLocalizer, IdentityClassifier,
    NearestNeighborClassifier,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Faces below this detector confidence are not identified.
pub const MIN_FACE_CONFIDENCE: f32 = 0.88;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] rollcall_core::DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] rollcall_core::RecognizerError),
    #[error("classifier error: {0}")]
    Classifier(#[from] rollcall_core::ClassifierError),
    #[error("crop error: {0}")]
    Crop(#[from] rollcall_core::CropError),
    #[error("extractor returned {actual} embeddings for {expected} faces")]
    EmbeddingCount { expected: usize, actual: usize },
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// The three models behind the identification pipeline.
pub struct Models {
    pub localizer: Box<dyn FaceLocalizer>,
    pub extractor: Box<dyn EmbeddingExtractor>,
    pub classifier: Box<dyn IdentityClassifier>,
    /// Number of labeled samples the classifier was trained on.
    pub gallery_size: usize,
}

impl Models {
    /// Load SCRFD, ArcFace and the classifier gallery. Fails fast if any is missing.
    pub fn load(config: &Config) -> Result<Self, EngineError> {
        let scrfd_path = config.scrfd_model_path();
        let localizer = rollcall_core::ScrfdLocalizer::load(&scrfd_path)?;
        tracing::info!(path = %scrfd_path, "SCRFD localizer loaded");

        let arcface_path = config.arcface_model_path();
        let extractor = rollcall_core::ArcFaceExtractor::load(&arcface_path)?;
        tracing::info!(path = %arcface_path, "ArcFace extractor loaded");

        let classifier = NearestNeighborClassifier::load(&config.gallery_path)?;
        Ok(Self {
            localizer: Box::new(localizer),
            extractor: Box::new(extractor),
            gallery_size: classifier.len(),
            classifier: Box::new(classifier),
        })
    }
}

/// Acceptance rules applied to every analyzed photo.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzePolicy {
    pub min_confidence: f32,
    pub max_match_distance: Option<f32>,
}

impl Default for AnalyzePolicy {
    fn default() -> Self {
        Self {
            min_confidence: MIN_FACE_CONFIDENCE,
            max_match_distance: None,
        }
    }
}

/// A retained face and the raw label the classifier assigned to it.
#[derive(Debug, Clone)]
pub struct FaceIdentity {
    pub face: BoundingBox,
    pub label: String,
    pub distance: f32,
}

/// Messages sent from ingestion tasks to the engine thread.
enum EngineRequest {
    Analyze {
        image: RgbImage,
        reply: oneshot::Sender<Result<Vec<FaceIdentity>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Locate, embed and classify every face in `image`.
    pub async fn analyze(&self, image: RgbImage) -> Result<Vec<FaceIdentity>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// ONNX sessions need `&mut` and are not shareable, so one thread owns all
/// models and serves requests in arrival order.
pub fn spawn_engine(mut models: Models, policy: AnalyzePolicy) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze { image, reply } => {
                        let result = analyze(&mut models, &image, &policy);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

/// Run the identification pipeline on one photo.
///
/// Candidates under `policy.min_confidence` are dropped before any embedding
/// work. Surviving faces are cropped, embedded in one batch and classified.
/// With `max_match_distance` set, faces whose nearest identity is farther
/// than the limit are treated as strangers and left out.
pub fn analyze(
    models: &mut Models,
    image: &RgbImage,
    policy: &AnalyzePolicy,
) -> Result<Vec<FaceIdentity>, EngineError> {
    let candidates = models.localizer.locate(image)?;
    let located = candidates.len();

    let faces: Vec<BoundingBox> = candidates
        .into_iter()
        .filter(|face| face.confidence >= policy.min_confidence)
        .collect();
    tracing::debug!(located, retained = faces.len(), "faces located");

    if faces.is_empty() {
        return Ok(Vec::new());
    }

    let size = models.extractor.input_size();
    let crops = faces
        .iter()
        .map(|face| crop_face(image, face, size))
        .collect::<Result<Vec<_>, _>>()?;

    let embeddings = models.extractor.embed_batch(&crops)?;
    if embeddings.len() != crops.len() {
        return Err(EngineError::EmbeddingCount {
            expected: crops.len(),
            actual: embeddings.len(),
        });
    }

    let mut identities = Vec::with_capacity(faces.len());
    for (face, embedding) in faces.into_iter().zip(&embeddings) {
        let classification = models.classifier.classify(embedding)?;

        if let Some(limit) = policy.max_match_distance {
            if classification.distance > limit {
                tracing::info!(
                    nearest = %classification.label,
                    distance = classification.distance,
                    limit,
                    "face matches no known identity; skipping"
                );
                continue;
            }
        }

        tracing::debug!(
            label = %classification.label,
            distance = classification.distance,
            confidence = face.confidence,
            "face identified"
        );
        identities.push(FaceIdentity {
            face,
            label: classification.label,
            distance: classification.distance,
        });
    }

    Ok(identities)
}
