use crate::ingest::{IngestError, Ingestor, Upload};
use crate::library::Library;
use rollcall_store::StoreError;
use serde::Serialize;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use zbus::interface;

pub const BUS_NAME: &str = "org.rollcall.Rollcall1";
pub const OBJECT_PATH: &str = "/org/rollcall/Rollcall1";

/// D-Bus interface for the Rollcall photo library daemon.
///
/// Bus name: org.rollcall.Rollcall1
/// Object path: /org/rollcall/Rollcall1
pub struct RollcallService {
    ingestor: Ingestor,
    library: Library,
    gallery_size: usize,
    /// Token shared by every ingest running right now. Replaced after each cancel.
    cancel: Mutex<CancellationToken>,
}

impl RollcallService {
    pub fn new(ingestor: Ingestor, library: Library, gallery_size: usize) -> Self {
        Self {
            ingestor,
            library,
            gallery_size,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    fn current_token(&self) -> CancellationToken {
        match self.cancel.lock() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Cancel every in-flight ingest and arm a fresh token for later ones.
    fn cancel_all(&self) {
        let mut token = match self.cancel.lock() {
            Ok(token) => token,
            Err(poisoned) => poisoned.into_inner(),
        };
        token.cancel();
        *token = CancellationToken::new();
    }
}

fn store_error(e: StoreError) -> zbus::fdo::Error {
    match e {
        StoreError::InvalidLabel { .. } | StoreError::SameLabel(_) => {
            zbus::fdo::Error::InvalidArgs(e.to_string())
        }
        other => {
            tracing::error!(error = %other, "store request failed");
            zbus::fdo::Error::Failed(other.to_string())
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.rollcall.Rollcall1")]
impl RollcallService {
    /// Ingest a batch of `(filename, bytes)` uploads. Returns a JSON array
    /// with one entry per accepted file.
    async fn ingest(&self, files: Vec<(String, Vec<u8>)>) -> zbus::fdo::Result<String> {
        tracing::info!(files = files.len(), "ingest requested");
        if files.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs("no files provided".into()));
        }

        let uploads = files
            .into_iter()
            .map(|(filename, data)| Upload { filename, data })
            .collect();
        let token = self.current_token();

        match self.ingestor.ingest_batch(uploads, &token).await {
            Ok(outcomes) => to_json(&outcomes),
            Err(IngestError::Storage(e)) => Err(store_error(e)),
        }
    }

    /// Cancel ingest requests in progress. Photos already recorded stay.
    async fn cancel_ingest(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("ingest cancellation requested");
        self.cancel_all();
        Ok(true)
    }

    /// Photos newest first, as `{"photos": [...], "count": n}`.
    async fn list_photos(&self) -> zbus::fdo::Result<String> {
        let photos = self.library.list_photos().await.map_err(store_error)?;
        Ok(serde_json::json!({
            "count": photos.len(),
            "photos": photos,
        })
        .to_string())
    }

    /// Sorted distinct labels, as `{"labels": [...]}`.
    async fn list_labels(&self) -> zbus::fdo::Result<String> {
        let labels = self.library.list_labels().await.map_err(store_error)?;
        Ok(serde_json::json!({ "labels": labels }).to_string())
    }

    /// Stored paths of photos carrying `label`, as a JSON array.
    async fn photos_by_label(&self, label: &str) -> zbus::fdo::Result<String> {
        tracing::debug!(label, "photos_by_label requested");
        let paths = self.library.photos_by_label(label).await.map_err(store_error)?;
        to_json(&paths)
    }

    /// Rename or merge `old_label` into `new_label`.
    async fn rename_label(&self, old_label: &str, new_label: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(old_label, new_label, "rename requested");
        self.library
            .rename_label(old_label, new_label)
            .await
            .map_err(store_error)?;
        Ok(true)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.library.status(self.gallery_size).await.map_err(store_error)?;
        to_json(&status)
    }
}
