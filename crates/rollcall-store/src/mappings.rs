//! Append-only rename log.

use rusqlite::{params, Connection, OptionalExtension};

/// One rename/merge event: `original_label` is henceforth `current_label`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMapping {
    pub id: i64,
    pub original_label: String,
    pub current_label: String,
    pub created_at: String,
}

pub(crate) fn append(conn: &Connection, original: &str, current: &str, created_at: &str) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO label_mappings (original_label, current_label, created_at) VALUES (?1, ?2, ?3)",
        params![original, current, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent mapping for an exact `original` label. Single hop.
pub(crate) fn current_label(conn: &Connection, original: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT current_label FROM label_mappings
         WHERE original_label = ?1
         ORDER BY created_at DESC, id DESC
         LIMIT 1",
        [original],
        |row| row.get(0),
    )
    .optional()
}

/// The whole log, oldest first.
pub(crate) fn all(conn: &Connection) -> rusqlite::Result<Vec<LabelMapping>> {
    let mut stmt = conn.prepare(
        "SELECT id, original_label, current_label, created_at FROM label_mappings ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(LabelMapping {
            id: row.get(0)?,
            original_label: row.get(1)?,
            current_label: row.get(2)?,
            created_at: row.get(3)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_unmapped_label() {
        assert_eq!(current_label(&db(), "Bob").unwrap(), None);
    }

    #[test]
    fn test_latest_mapping_wins() {
        let conn = db();
        append(&conn, "Bob", "Robert", "2026-01-01T00:00:00.000Z").unwrap();
        append(&conn, "Bob", "Bobby", "2026-01-02T00:00:00.000Z").unwrap();
        assert_eq!(current_label(&conn, "Bob").unwrap().as_deref(), Some("Bobby"));
    }

    #[test]
    fn test_same_instant_falls_back_to_insertion_order() {
        let conn = db();
        append(&conn, "Bob", "Robert", "2026-01-01T00:00:00.000Z").unwrap();
        append(&conn, "Bob", "Rob", "2026-01-01T00:00:00.000Z").unwrap();
        assert_eq!(current_label(&conn, "Bob").unwrap().as_deref(), Some("Rob"));
    }

    #[test]
    fn test_lookup_is_single_hop() {
        let conn = db();
        append(&conn, "A", "B", "2026-01-01T00:00:00.000Z").unwrap();
        append(&conn, "B", "C", "2026-01-02T00:00:00.000Z").unwrap();
        assert_eq!(current_label(&conn, "A").unwrap().as_deref(), Some("B"));
    }

    #[test]
    fn test_lookup_is_exact() {
        let conn = db();
        append(&conn, "Bob", "Robert", "2026-01-01T00:00:00.000Z").unwrap();
        assert_eq!(current_label(&conn, "bob").unwrap(), None);
    }

    #[test]
    fn test_all_in_order() {
        let conn = db();
        append(&conn, "A", "B", "2026-01-02T00:00:00.000Z").unwrap();
        append(&conn, "C", "D", "2026-01-01T00:00:00.000Z").unwrap();
        let log = all(&conn).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].original_label, "C");
        assert_eq!(log[1].original_label, "A");
    }
}
