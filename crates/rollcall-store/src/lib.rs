//! rollcall-store: photo records, the append-only rename log and the label
//! identity registry, persisted in SQLite.
//!
//! The database runs in WAL mode behind two connections: every write goes
//! through the writer (one transaction per operation), reads use the reader
//! and never wait on a write in progress.

pub mod labels;
pub mod mappings;
pub mod photos;
pub mod registry;
mod schema;

use chrono::{SecondsFormat, Utc};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio_rusqlite::Connection;

pub use labels::{validate_label, LABEL_DELIMITER};
pub use mappings::LabelMapping;
pub use photos::{NewPhoto, PhotoRecord};
pub use registry::{normalize, LabelRegistry};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid label {label:?}: {reason}")]
    InvalidLabel { label: String, reason: &'static str },
    #[error("old and new label are both {0:?}")]
    SameLabel(String),
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("cannot create database directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of a rename/merge.
#[derive(Debug, Clone, PartialEq)]
pub struct RenameOutcome {
    pub mapping_id: i64,
    pub photos_updated: usize,
}

/// Clone-safe handle to the photo database.
#[derive(Clone)]
pub struct Store {
    writer: Connection,
    reader: Connection,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Vocabulary and rename log as seen by `conn`.
fn load_registry(conn: &rusqlite::Connection) -> rusqlite::Result<LabelRegistry> {
    let fields = photos::label_fields(conn)?;
    let log = mappings::all(conn)?;
    let photo_labels = fields.iter().flat_map(|f| labels::parse_labels(f));
    Ok(LabelRegistry::new(photo_labels, &log))
}

impl Store {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(path).await?;
        writer
            .call(|conn| {
                conn.busy_timeout(BUSY_TIMEOUT)?;
                let mode: String =
                    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
                schema::migrate(conn)?;
                tracing::debug!(journal_mode = %mode, "photo database ready");
                Ok(())
            })
            .await?;

        let reader = Connection::open(path).await?;
        reader
            .call(|conn| {
                conn.busy_timeout(BUSY_TIMEOUT)?;
                Ok(())
            })
            .await?;

        tracing::info!(path = %path.display(), "opened photo database");
        Ok(Self { writer, reader })
    }

    /// Single in-memory connection serving both roles.
    pub async fn open_in_memory() -> Result<Self> {
        let writer = Connection::open_in_memory().await?;
        writer
            .call(|conn| {
                schema::migrate(conn)?;
                Ok(())
            })
            .await?;

        Ok(Self {
            reader: writer.clone(),
            writer,
        })
    }

    /// Resolve each raw label in `photo` through the registry, then insert
    /// the record with the deduplicated canonical labels.
    ///
    /// The registry is read inside the insert's writer transaction, so the
    /// labels reflect every rename committed before the record. A label that
    /// resolves to something unstorable fails with
    /// [`StoreError::InvalidLabel`] and nothing is written.
    pub async fn insert_resolved(&self, photo: NewPhoto) -> Result<PhotoRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = now();

        let record = self
            .writer
            .call(move |conn| {
                let tx = conn.transaction()?;
                let registry = load_registry(&tx)?;

                let mut resolved = Vec::with_capacity(photo.labels.len());
                for raw in &photo.labels {
                    let label = registry.resolve(raw.trim());
                    if let Err(e) = validate_label(&label) {
                        return Ok(Err(e));
                    }
                    resolved.push(label);
                }

                let photo = NewPhoto { labels: resolved, ..photo };
                let record = photos::insert(&tx, id, photo, created_at)?;
                tx.commit()?;
                Ok(Ok(record))
            })
            .await??;

        tracing::debug!(id = %record.id, labels = ?record.labels, "photo record inserted");
        Ok(record)
    }

    /// Every photo record, newest first.
    pub async fn list_photos(&self) -> Result<Vec<PhotoRecord>> {
        Ok(self.reader.call(|conn| Ok(photos::list(conn)?)).await?)
    }

    /// Sorted, deduplicated union of labels attached to any photo.
    pub async fn list_labels(&self) -> Result<Vec<String>> {
        Ok(self.reader.call(|conn| Ok(photos::distinct_labels(conn)?)).await?)
    }

    /// Resolve `query` the way ingested labels are, then return the photos
    /// carrying the result as an exact token, newest first. Both steps read
    /// one snapshot.
    pub async fn photos_by_label(&self, query: &str) -> Result<Vec<PhotoRecord>> {
        let query = query.trim().to_string();
        Ok(self
            .reader
            .call(move |conn| {
                let tx = conn.transaction()?;
                let canonical = load_registry(&tx)?.resolve(&query);
                Ok(photos::with_label(&tx, &canonical)?)
            })
            .await?)
    }

    pub async fn photo_count(&self) -> Result<usize> {
        Ok(self.reader.call(|conn| Ok(photos::count(conn)?)).await?)
    }

    /// Most recent rename of `original`, or `original` itself. Single hop, exact match.
    pub async fn current_label(&self, original: &str) -> Result<String> {
        let original = original.to_string();
        Ok(self
            .reader
            .call(move |conn| {
                let current = mappings::current_label(conn, &original)?;
                Ok(current.unwrap_or(original))
            })
            .await?)
    }

    /// Rename/merge `old` into `new`: append the mapping and rewrite every
    /// photo carrying `old`, all in one transaction.
    pub async fn rename_label(&self, old: &str, new: &str) -> Result<RenameOutcome> {
        validate_label(old)?;
        validate_label(new)?;
        if old == new {
            return Err(StoreError::SameLabel(old.to_string()));
        }

        let (old, new, created_at) = (old.to_string(), new.to_string(), now());
        let outcome = self
            .writer
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mapping_id = mappings::append(&tx, &old, &new, &created_at)?;
                let photos_updated = photos::replace_label(&tx, &old, &new)?;
                tx.commit()?;

                tracing::info!(old = %old, new = %new, photos_updated, "label renamed");
                Ok(RenameOutcome { mapping_id, photos_updated })
            })
            .await?;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(labels: &[&str]) -> NewPhoto {
        NewPhoto {
            file_path: "photo.jpg".into(),
            thumbnail_path: Some("thumb_photo.jpg".into()),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn named(file_path: &str, labels: &[&str]) -> NewPhoto {
        NewPhoto {
            file_path: file_path.into(),
            ..photo(labels)
        }
    }

    /// Write `photo` with its labels taken as already canonical.
    async fn insert(store: &Store, photo: NewPhoto) -> PhotoRecord {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = now();
        store
            .writer
            .call(move |conn| Ok(photos::insert(conn, id, photo, created_at)?))
            .await
            .unwrap()
    }

    async fn labels_of(store: &Store, file_path: &str) -> Vec<String> {
        let records = store.list_photos().await.unwrap();
        let record = records.into_iter().find(|r| r.file_path == file_path).unwrap();
        record.labels
    }

    async fn registry(store: &Store) -> LabelRegistry {
        store.reader.call(|conn| Ok(load_registry(conn)?)).await.unwrap()
    }

    async fn mapping_count(store: &Store) -> usize {
        store.reader.call(|conn| Ok(mappings::all(conn)?.len())).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_list() {
        let store = Store::open_in_memory().await.unwrap();
        let first = insert(&store, photo(&["Carol"])).await;
        let second = insert(&store, photo(&[])).await;

        let listed = store.list_photos().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1], first);
        assert!(listed[0].labels.is_empty());
    }

    #[tokio::test]
    async fn test_rename_rewrites_photos_and_labels() {
        let store = Store::open_in_memory().await.unwrap();
        insert(&store, named("bob.jpg", &["Bob", "Carol"])).await;
        insert(&store, named("carol.jpg", &["Carol"])).await;

        let outcome = store.rename_label("Bob", "Robert").await.unwrap();
        assert_eq!(outcome.photos_updated, 1);

        let labels = store.list_labels().await.unwrap();
        assert!(labels.contains(&"Robert".to_string()));
        assert!(!labels.contains(&"Bob".to_string()));

        assert_eq!(labels_of(&store, "bob.jpg").await, vec!["Robert", "Carol"]);
        assert_eq!(labels_of(&store, "carol.jpg").await, vec!["Carol"]);

        assert_eq!(store.current_label("Bob").await.unwrap(), "Robert");
    }

    #[tokio::test]
    async fn test_rename_does_not_touch_superstrings() {
        let store = Store::open_in_memory().await.unwrap();
        insert(&store, named("anna.jpg", &["Anna"])).await;
        insert(&store, named("ann.jpg", &["Ann"])).await;

        store.rename_label("Ann", "Annie").await.unwrap();

        assert_eq!(labels_of(&store, "anna.jpg").await, vec!["Anna"]);
        assert_eq!(store.list_labels().await.unwrap(), vec!["Anna", "Annie"]);
    }

    #[tokio::test]
    async fn test_chained_rename_lookup_is_single_hop() {
        let store = Store::open_in_memory().await.unwrap();
        store.rename_label("A", "B").await.unwrap();
        store.rename_label("B", "C").await.unwrap();

        assert_eq!(store.current_label("A").await.unwrap(), "B");
        assert_eq!(registry(&store).await.resolve("A"), "C");
    }

    #[tokio::test]
    async fn test_revert_rename_resolves_to_original() {
        let store = Store::open_in_memory().await.unwrap();
        insert(&store, named("bob.jpg", &["Bob"])).await;
        store.rename_label("Bob", "Robert").await.unwrap();
        store.rename_label("Robert", "Bob").await.unwrap();

        assert_eq!(labels_of(&store, "bob.jpg").await, vec!["Bob"]);
        assert_eq!(registry(&store).await.resolve("Bob"), "Bob");

        let record = store.insert_resolved(named("new.jpg", &["Bob"])).await.unwrap();
        assert_eq!(record.labels, vec!["Bob"]);
        assert_eq!(store.list_labels().await.unwrap(), vec!["Bob"]);
        assert_eq!(store.photos_by_label("bob").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rename_rejects_bad_labels() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(matches!(store.rename_label("", "Robert").await, Err(StoreError::InvalidLabel { .. })));
        assert!(matches!(store.rename_label("Bob", "Rob,ert").await, Err(StoreError::InvalidLabel { .. })));
        assert!(matches!(store.rename_label("Bob", "Bob").await, Err(StoreError::SameLabel(_))));
        assert_eq!(mapping_count(&store).await, 0);
    }

    #[tokio::test]
    async fn test_rename_is_all_or_nothing() {
        let store = Store::open_in_memory().await.unwrap();
        insert(&store, named("bob.jpg", &["Bob"])).await;

        store
            .writer
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_updates BEFORE UPDATE ON photos
                     BEGIN SELECT RAISE(ABORT, 'photo rewrite failed'); END;",
                )?;
                Ok(())
            })
            .await
            .unwrap();

        assert!(matches!(store.rename_label("Bob", "Robert").await, Err(StoreError::Database(_))));

        // Neither the mapping nor any photo rewrite survived.
        assert_eq!(mapping_count(&store).await, 0);
        assert_eq!(store.current_label("Bob").await.unwrap(), "Bob");
        assert_eq!(labels_of(&store, "bob.jpg").await, vec!["Bob"]);
    }

    #[tokio::test]
    async fn test_registry_snapshot() {
        let store = Store::open_in_memory().await.unwrap();
        insert(&store, photo(&["Alice", "Bob"])).await;
        store.rename_label("Bob", "Robert").await.unwrap();

        let registry = registry(&store).await;
        assert_eq!(registry.vocabulary(), &["Alice".to_string(), "Robert".to_string(), "Bob".to_string()][..]);
        assert_eq!(registry.resolve("ALICE"), "Alice");
        assert_eq!(registry.resolve("bob"), "Robert");
        assert_eq!(registry.resolve("Zara"), "Zara");
    }

    #[tokio::test]
    async fn test_insert_resolved_sees_rename_after_snapshot() {
        let store = Store::open_in_memory().await.unwrap();
        insert(&store, named("bob.jpg", &["Bob"])).await;

        // A registry read before the rename would still resolve to Bob.
        let stale = registry(&store).await;
        assert_eq!(stale.resolve("Bob"), "Bob");
        store.rename_label("Bob", "Robert").await.unwrap();

        let record = store.insert_resolved(named("new.jpg", &["Bob"])).await.unwrap();
        assert_eq!(record.labels, vec!["Robert"]);
        assert_eq!(store.list_labels().await.unwrap(), vec!["Robert"]);
    }

    #[tokio::test]
    async fn test_insert_resolved_normalizes_and_dedups() {
        let store = Store::open_in_memory().await.unwrap();
        insert(&store, photo(&["Alice"])).await;

        let record = store
            .insert_resolved(named("new.jpg", &[" alice ", "ALICE", "Zara"]))
            .await
            .unwrap();
        assert_eq!(record.labels, vec!["Alice", "Zara"]);
    }

    #[tokio::test]
    async fn test_insert_resolved_rejects_unstorable_label() {
        let store = Store::open_in_memory().await.unwrap();

        for raw in ["Carol, Jr", "   "] {
            let result = store.insert_resolved(named("new.jpg", &["Dana", raw])).await;
            assert!(matches!(result, Err(StoreError::InvalidLabel { .. })), "{raw:?}");
        }
        assert_eq!(store.photo_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_photos_by_label_resolves_query() {
        let store = Store::open_in_memory().await.unwrap();
        insert(&store, named("bob.jpg", &["Bob"])).await;
        insert(&store, named("bobby.jpg", &["Bobby"])).await;
        store.rename_label("Bob", "Robert").await.unwrap();

        let paths = |records: Vec<PhotoRecord>| records.into_iter().map(|r| r.file_path).collect::<Vec<_>>();
        assert_eq!(paths(store.photos_by_label(" Bob ").await.unwrap()), vec!["bob.jpg"]);
        assert_eq!(paths(store.photos_by_label("robert").await.unwrap()), vec!["bob.jpg"]);
        assert!(store.photos_by_label("Nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_backed_reader_sees_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("nested/photos.db")).await.unwrap();
        insert(&store, photo(&["Carol"])).await;

        assert_eq!(store.photo_count().await.unwrap(), 1);
        assert_eq!(store.photos_by_label("carol").await.unwrap().len(), 1);
        assert!(store.photos_by_label("Dana").await.unwrap().is_empty());
    }
}
