use rusqlite::Connection;

const SCHEMA_VERSION: usize = 1;

const INITIAL: &str = "
CREATE TABLE IF NOT EXISTS photos (
    id TEXT PRIMARY KEY NOT NULL,
    file_path TEXT NOT NULL,
    thumbnail_path TEXT,
    labels TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS photos_created_at ON photos (created_at);

-- Append-only: rows are never updated or deleted.
CREATE TABLE IF NOT EXISTS label_mappings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    original_label TEXT NOT NULL,
    current_label TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS label_mappings_original ON label_mappings (original_label, created_at);
";

/// Bring the database up to the current schema version.
pub fn migrate(conn: &Connection) -> rusqlite::Result<usize> {
    let version: usize = conn.query_row("SELECT user_version FROM pragma_user_version;", [], |row| row.get(0))?;

    if version < 1 {
        conn.execute_batch(INITIAL)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION as i64)?;
        tracing::info!(from = version, to = SCHEMA_VERSION, "migrated photo database");
    }

    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(migrate(&conn).unwrap(), 0);
        assert_eq!(migrate(&conn).unwrap(), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name IN ('photos', 'label_mappings')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }
}
