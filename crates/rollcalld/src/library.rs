//! Read side of the photo library plus label renaming.

use crate::media::MediaDir;
use rollcall_store::{RenameOutcome, Store, StoreError};
use serde::Serialize;

/// A photo as listed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoEntry {
    pub id: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub labels: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryStatus {
    pub version: &'static str,
    pub photos: usize,
    pub labels: usize,
    pub gallery_size: usize,
}

#[derive(Clone)]
pub struct Library {
    store: Store,
    media: MediaDir,
}

impl Library {
    pub fn new(store: Store, media: MediaDir) -> Self {
        Self { store, media }
    }

    /// Photos newest first. Records whose image or thumbnail has gone missing
    /// from the media directory are left out.
    pub async fn list_photos(&self) -> Result<Vec<PhotoEntry>, StoreError> {
        let records = self.store.list_photos().await?;
        let mut entries = Vec::with_capacity(records.len());

        for record in records {
            if !self.media.exists(&record.file_path).await {
                tracing::debug!(id = %record.id, file = %record.file_path, "photo file missing; not listed");
                continue;
            }
            if let Some(thumb) = &record.thumbnail_path {
                if !self.media.exists(thumb).await {
                    tracing::debug!(id = %record.id, thumbnail = %thumb, "thumbnail missing; not listed");
                    continue;
                }
            }

            entries.push(PhotoEntry {
                id: record.id,
                path: record.file_path,
                thumbnail: record.thumbnail_path,
                labels: record.labels,
                timestamp: record.created_at,
            });
        }

        Ok(entries)
    }

    pub async fn list_labels(&self) -> Result<Vec<String>, StoreError> {
        self.store.list_labels().await
    }

    /// Stored paths of every photo carrying `label`. The query is resolved
    /// the same way ingested labels are, then matched as an exact token.
    pub async fn photos_by_label(&self, label: &str) -> Result<Vec<String>, StoreError> {
        let records = self.store.photos_by_label(label).await?;
        Ok(records.into_iter().map(|r| r.file_path).collect())
    }

    pub async fn rename_label(&self, old: &str, new: &str) -> Result<RenameOutcome, StoreError> {
        self.store.rename_label(old, new).await
    }

    pub async fn status(&self, gallery_size: usize) -> Result<LibraryStatus, StoreError> {
        Ok(LibraryStatus {
            version: env!("CARGO_PKG_VERSION"),
            photos: self.store.photo_count().await?,
            labels: self.store.list_labels().await?.len(),
            gallery_size,
        })
    }
}
