//! Database schema for the crawl store.

/// SQL schema for the crawl store
pub const SCHEMA_SQL: &str = r#"
-- One row per crawl invocation
CREATE TABLE IF NOT EXISTS crawl_session (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    version TEXT,
    target TEXT,
    start_date TEXT,
    end_date TEXT,
    commandline TEXT,
    user_agent TEXT,
    random_seed TEXT,
    start_cookies TEXT,
    end_cookies TEXT
);

-- Every request ever seen, one row per dedup key
CREATE TABLE IF NOT EXISTS request (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    id_parent INTEGER,
    type TEXT,
    method TEXT,
    url TEXT,
    referer TEXT,
    redirects INTEGER NOT NULL DEFAULT 0,
    data TEXT NOT NULL DEFAULT '',
    cookies TEXT NOT NULL DEFAULT '[]',
    http_auth TEXT NOT NULL DEFAULT '',
    out_of_scope INTEGER NOT NULL DEFAULT 0,
    "trigger" TEXT NOT NULL DEFAULT '',
    crawled INTEGER NOT NULL DEFAULT 0,
    crawler_errors TEXT,
    user_output TEXT
);

CREATE INDEX IF NOT EXISTS request_dedup_index
    ON request (type, method, url, http_auth, data, "trigger");

-- Parent -> child lineage edges
CREATE TABLE IF NOT EXISTS request_child (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    id_request INTEGER NOT NULL,
    id_child INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS request_child_index
    ON request_child (id_request, id_child);

-- Downstream scanner bookkeeping
CREATE TABLE IF NOT EXISTS assessment (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scanner TEXT,
    start_date TEXT,
    end_date TEXT
);

CREATE TABLE IF NOT EXISTS vulnerability (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    id_assessment INTEGER,
    id_request INTEGER,
    type TEXT,
    description TEXT,
    error TEXT
);
"#;

/// Initializes the crawl-store schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in [
            "crawl_session",
            "request",
            "request_child",
            "assessment",
            "vulnerability",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "table {} should exist", table);
        }
    }
}
