//! Batch ingestion: store each uploaded photo, identify its faces, resolve
//! their labels and persist the record.
//!
//! Files are processed one at a time in upload order. A failing file is
//! reported in its own result entry and the batch carries on; only a storage
//! failure aborts the whole request. Whatever a failed file wrote to the
//! media directory is removed again.

use crate::engine::{EngineError, EngineHandle};
use crate::media::{self, MediaDir, MediaError};
use image::{DynamicImage, GenericImageView, ImageError};
use rollcall_store::{NewPhoto, PhotoRecord, Store, StoreError};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

/// Why one file could not be ingested. Rendered into its result entry.
#[derive(Error, Debug)]
enum FileError {
    #[error("{0}")]
    Media(#[from] MediaError),
    #[error("cannot decode image: {0}")]
    Decode(#[from] ImageError),
    #[error("decode task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("face analysis failed: {0}")]
    Engine(#[from] EngineError),
    #[error("face analysis timed out after {0:?}")]
    Timeout(Duration),
    #[error("classifier label {0:?} cannot be stored")]
    UnstorableLabel(String),
    #[error("ingestion cancelled")]
    Cancelled,
    #[error(transparent)]
    Storage(StoreError),
}

/// One uploaded file: client-supplied name and raw bytes.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Success,
}

/// Per-file entry of an ingestion response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FileOutcome {
    Success {
        filename: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        thumbnail: Option<String>,
        labels: Vec<String>,
        status: IngestStatus,
    },
    Failed {
        filename: String,
        error: String,
    },
}

impl FileOutcome {
    fn succeeded(record: PhotoRecord) -> Self {
        FileOutcome::Success {
            filename: record.file_path,
            thumbnail: record.thumbnail_path,
            labels: record.labels,
            status: IngestStatus::Success,
        }
    }

    fn failed(filename: String, error: &FileError) -> Self {
        FileOutcome::Failed {
            filename,
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub thumbnails: bool,
    pub analyze_timeout: Duration,
}

/// Decoded upload ready for analysis.
struct Decoded {
    image: image::RgbImage,
    thumbnail: Option<Vec<u8>>,
}

pub struct Ingestor {
    engine: EngineHandle,
    store: Store,
    media: MediaDir,
    options: IngestOptions,
}

impl Ingestor {
    pub fn new(engine: EngineHandle, store: Store, media: MediaDir, options: IngestOptions) -> Self {
        Self {
            engine,
            store,
            media,
            options,
        }
    }

    /// Ingest `uploads` in order. Files without a usable name or with a
    /// disallowed extension are skipped and produce no entry. Once `cancel`
    /// fires, the file in flight and every remaining file are reported as
    /// cancelled; records already written stay.
    pub async fn ingest_batch(
        &self,
        uploads: Vec<Upload>,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileOutcome>, IngestError> {
        let total = uploads.len();
        let mut outcomes = Vec::with_capacity(total);

        for upload in uploads {
            let Some(filename) = media::sanitize_filename(&upload.filename) else {
                tracing::debug!(raw = %upload.filename, "skipping upload without a usable name");
                continue;
            };
            if !media::is_allowed(&filename) {
                tracing::debug!(filename = %filename, "skipping upload with disallowed extension");
                continue;
            }

            if cancel.is_cancelled() {
                outcomes.push(FileOutcome::failed(filename, &FileError::Cancelled));
                continue;
            }

            let mut written = Vec::new();
            match self.ingest_file(&filename, upload.data, cancel, &mut written).await {
                Ok(record) => {
                    tracing::info!(
                        id = %record.id,
                        file = %record.file_path,
                        labels = ?record.labels,
                        "photo ingested"
                    );
                    outcomes.push(FileOutcome::succeeded(record));
                }
                Err(FileError::Storage(e)) => {
                    self.discard(&written).await;
                    tracing::error!(filename = %filename, error = %e, "storage failure; aborting batch");
                    return Err(IngestError::Storage(e));
                }
                Err(e) => {
                    self.discard(&written).await;
                    tracing::warn!(filename = %filename, error = %e, "photo not ingested");
                    outcomes.push(FileOutcome::failed(filename, &e));
                }
            }
        }

        tracing::info!(uploaded = total, reported = outcomes.len(), "ingest batch finished");
        Ok(outcomes)
    }

    /// Store, analyze and record one file. Names of files written to the
    /// media directory are pushed onto `written` as they are created.
    async fn ingest_file(
        &self,
        filename: &str,
        data: Vec<u8>,
        cancel: &CancellationToken,
        written: &mut Vec<String>,
    ) -> Result<PhotoRecord, FileError> {
        let stored = self.media.write_unique(filename, &data).await?;
        written.push(stored.clone());

        let thumbnails = self.options.thumbnails;
        let decoded = tokio::task::spawn_blocking(move || decode(&data, thumbnails)).await??;

        let thumbnail = match decoded.thumbnail {
            Some(jpeg) => {
                let name = self.media.write_unique(&media::thumbnail_name(&stored), &jpeg).await?;
                written.push(name.clone());
                Some(name)
            }
            None => None,
        };

        let timeout = self.options.analyze_timeout;
        let identities = tokio::select! {
            _ = cancel.cancelled() => return Err(FileError::Cancelled),
            analyzed = tokio::time::timeout(timeout, self.engine.analyze(decoded.image)) => {
                analyzed.map_err(|_| FileError::Timeout(timeout))??
            }
        };

        let mut labels = Vec::with_capacity(identities.len());
        for identity in &identities {
            if identity.label.trim().is_empty() {
                tracing::warn!(x1 = identity.face.x1, y1 = identity.face.y1, "classifier returned a blank label");
            }
            tracing::debug!(
                raw = %identity.label,
                distance = identity.distance,
                x1 = identity.face.x1,
                y1 = identity.face.y1,
                "face labeled"
            );
            labels.push(identity.label.clone());
        }

        if cancel.is_cancelled() {
            return Err(FileError::Cancelled);
        }

        let photo = NewPhoto {
            file_path: stored,
            thumbnail_path: thumbnail,
            labels,
        };
        self.store.insert_resolved(photo).await.map_err(|e| match e {
            StoreError::InvalidLabel { label, .. } => FileError::UnstorableLabel(label),
            other => FileError::Storage(other),
        })
    }

    async fn discard(&self, written: &[String]) {
        for name in written {
            self.media.remove(name).await;
        }
    }
}

fn decode(data: &[u8], thumbnail: bool) -> Result<Decoded, ImageError> {
    let image: DynamicImage = image::load_from_memory(data)?;
    let (width, height) = image.dimensions();
    tracing::debug!(width, height, "photo decoded");

    let thumbnail = if thumbnail {
        Some(media::render_thumbnail(&image)?)
    } else {
        None
    };

    Ok(Decoded {
        image: image.to_rgb8(),
        thumbnail,
    })
}
