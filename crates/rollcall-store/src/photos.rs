//! Photo record table.

use crate::labels::{dedup_labels, join_labels, parse_labels};
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;

/// One ingested photo and the canonical labels resolved for its faces.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    pub id: String,
    /// Stored image name inside the media directory.
    pub file_path: String,
    pub thumbnail_path: Option<String>,
    pub labels: Vec<String>,
    /// RFC 3339 UTC timestamp.
    pub created_at: String,
}

/// A photo record that has not been written yet.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub file_path: String,
    pub thumbnail_path: Option<String>,
    pub labels: Vec<String>,
}

const COLUMNS: &str = "id, file_path, thumbnail_path, labels, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<PhotoRecord> {
    let labels: String = row.get(3)?;
    Ok(PhotoRecord {
        id: row.get(0)?,
        file_path: row.get(1)?,
        thumbnail_path: row.get(2)?,
        labels: parse_labels(&labels),
        created_at: row.get(4)?,
    })
}

pub(crate) fn insert(conn: &Connection, id: String, photo: NewPhoto, created_at: String) -> rusqlite::Result<PhotoRecord> {
    let labels = dedup_labels(photo.labels);
    conn.execute(
        "INSERT INTO photos (id, file_path, thumbnail_path, labels, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, photo.file_path, photo.thumbnail_path, join_labels(&labels), created_at],
    )?;

    Ok(PhotoRecord {
        id,
        file_path: photo.file_path,
        thumbnail_path: photo.thumbnail_path,
        labels,
        created_at,
    })
}

/// Every photo record, newest first.
pub(crate) fn list(conn: &Connection) -> rusqlite::Result<Vec<PhotoRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM photos ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map([], from_row)?;
    rows.collect()
}

/// Every stored label field, in ingestion order.
pub(crate) fn label_fields(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT labels FROM photos WHERE labels != '' ORDER BY created_at, rowid")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

/// Sorted, deduplicated union of labels on all photos.
pub(crate) fn distinct_labels(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut labels = BTreeSet::new();
    for field in label_fields(conn)? {
        labels.extend(parse_labels(&field));
    }
    Ok(labels.into_iter().collect())
}

/// Photos whose label set contains `label` as a whole token.
pub(crate) fn with_label(conn: &Connection, label: &str) -> rusqlite::Result<Vec<PhotoRecord>> {
    // instr() narrows the scan; the token check drops "Ann" matching "Anna".
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM photos WHERE instr(labels, ?1) > 0 ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map([label], from_row)?;

    let mut matches = Vec::new();
    for record in rows {
        let record = record?;
        if record.labels.iter().any(|l| l == label) {
            matches.push(record);
        }
    }
    Ok(matches)
}

/// Replace the `old` token with `new` on every photo carrying it. Returns the
/// number of rewritten rows.
pub(crate) fn replace_label(conn: &Connection, old: &str, new: &str) -> rusqlite::Result<usize> {
    let affected = with_label(conn, old)?;
    let mut update = conn.prepare("UPDATE photos SET labels = ?1 WHERE id = ?2")?;

    for record in &affected {
        let relabeled = dedup_labels(
            record
                .labels
                .iter()
                .map(|l| if l == old { new.to_string() } else { l.clone() }),
        );
        update.execute(params![join_labels(&relabeled), record.id])?;
    }

    Ok(affected.len())
}

pub(crate) fn count(conn: &Connection) -> rusqlite::Result<usize> {
    conn.query_row("SELECT count(*) FROM photos", [], |row| row.get(0))
}
