//! SQLite crawl store
//!
//! The store is append-only from the crawler's point of view: requests are
//! inserted once per dedup key and afterwards only flagged
//! (crawled/out-of-scope) or annotated. Connections are opened per logical
//! batch and never held across a wait; every mutation inside one crawl tick
//! goes through a [`StoreBatch`] so a crash between batches loses at most
//! the in-flight tick.

use crate::config::OutputMode;
use crate::model::{Cookie, CrawlResult, Request, RequestType};
use crate::storage::schema::initialize_schema;
use crate::{Result, VantageError};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

/// Metadata recorded when a crawl session starts.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub version: String,
    pub target: String,
    pub commandline: String,
    pub user_agent: String,
    pub random_seed: String,
    pub start_cookies: Vec<Cookie>,
}

/// Seed material inherited from a previous session of the same store.
#[derive(Debug, Clone, Default)]
pub struct InheritedSession {
    pub random_seed: Option<String>,
    pub end_cookies: Option<String>,
}

/// Handle to the on-disk crawl store.
///
/// The handle itself holds no connection; see [`CrawlStore::batch`] and the
/// per-call query methods.
pub struct CrawlStore {
    path: PathBuf,
}

impl CrawlStore {
    /// Resolves the output path according to the output mode, then opens
    /// the store, initializing the schema for a new or empty file.
    pub fn prepare(outfile: &Path, mode: OutputMode) -> Result<Self> {
        let path = match mode {
            OutputMode::Rename => unique_path(outfile),
            OutputMode::Overwrite => {
                if outfile.exists() {
                    std::fs::remove_file(outfile)?;
                }
                outfile.to_path_buf()
            }
            OutputMode::Resume | OutputMode::Complete => outfile.to_path_buf(),
        };

        let store = Self { path };
        let fresh = !store.path.exists()
            || std::fs::metadata(&store.path).map(|m| m.len()).unwrap_or(0) == 0;
        if fresh {
            let conn = store.connect()?;
            initialize_schema(&conn)?;
        }
        Ok(store)
    }

    /// Opens an in-memory-backed store in a temp location (tests only).
    #[cfg(test)]
    pub fn prepare_temp(dir: &Path) -> Result<Self> {
        Self::prepare(&dir.join("crawl.db"), OutputMode::Overwrite)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Opens a connection and begins the transaction for one crawl tick.
    pub fn batch(&self) -> Result<StoreBatch> {
        let conn = self.connect()?;
        conn.execute_batch("BEGIN TRANSACTION;")?;
        Ok(StoreBatch { conn })
    }

    // ===== Session management =====

    /// Records the start of a crawl session and returns its id.
    pub fn save_session(&self, info: &SessionInfo) -> Result<i64> {
        let conn = self.connect()?;
        let start_cookies = serde_json::to_string(&info.start_cookies)
            .map_err(|e| VantageError::Store(e.to_string()))?;
        conn.execute(
            "INSERT INTO crawl_session
             (version, target, start_date, commandline, user_agent, random_seed, start_cookies)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                info.version,
                info.target,
                Utc::now().to_rfc3339(),
                info.commandline,
                info.user_agent,
                info.random_seed,
                start_cookies,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Finalizes a session with its end date, effective seed and the last
    /// cookie set observed during the crawl.
    pub fn finalize_session(
        &self,
        session_id: i64,
        random_seed: &str,
        end_cookies: &[Cookie],
    ) -> Result<()> {
        let conn = self.connect()?;
        let end_cookies =
            serde_json::to_string(end_cookies).map_err(|e| VantageError::Store(e.to_string()))?;
        conn.execute(
            "UPDATE crawl_session SET end_date = ?1, random_seed = ?2, end_cookies = ?3
             WHERE id = ?4",
            params![Utc::now().to_rfc3339(), random_seed, end_cookies, session_id],
        )?;
        Ok(())
    }

    /// Returns seed material from a previous session, for resume/complete
    /// continuity.
    pub fn inherited_session(&self, session_id: i64) -> Result<InheritedSession> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT random_seed, end_cookies FROM crawl_session WHERE id = ?1",
                params![session_id],
                |row| {
                    Ok(InheritedSession {
                        random_seed: row.get(0)?,
                        end_cookies: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row.unwrap_or_default())
    }

    // ===== Query surface =====

    /// All requests already marked crawled.
    pub fn get_crawled_requests(&self) -> Result<Vec<Request>> {
        self.select_requests("SELECT * FROM request WHERE crawled=1")
    }

    /// All in-scope requests never crawled; the resume seed set.
    pub fn get_not_crawled_requests(&self) -> Result<Vec<Request>> {
        self.select_requests("SELECT * FROM request WHERE crawled=0 AND out_of_scope=0")
    }

    /// In-scope requests of the given types, for downstream scanners.
    pub fn get_requests_by_type(&self, types: &[RequestType]) -> Result<Vec<Request>> {
        let placeholders = vec!["?"; types.len()].join(",");
        let sql = format!(
            "SELECT * FROM request WHERE out_of_scope=0 AND type IN ({placeholders})"
        );
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let params = rusqlite::params_from_iter(types.iter().map(|t| t.as_str()));
        let requests = stmt
            .query_map(params, request_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(requests)
    }

    pub fn count_requests(&self) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM request", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn select_requests(&self, sql: &str) -> Result<Vec<Request>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let requests = stmt
            .query_map([], request_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(requests)
    }

    // ===== Downstream scanner surface =====

    pub fn create_assessment(&self, scanner: &str) -> Result<i64> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO assessment (scanner, start_date) VALUES (?1, ?2)",
            params![scanner, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn complete_assessment(&self, assessment_id: i64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE assessment SET end_date = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), assessment_id],
        )?;
        Ok(())
    }

    pub fn record_vulnerability(
        &self,
        assessment_id: i64,
        request_id: i64,
        kind: &str,
        description: &str,
        error: &str,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO vulnerability (id_assessment, id_request, type, description, error)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![assessment_id, request_id, kind, description, error],
        )?;
        Ok(())
    }
}

/// One open connection wrapping the transaction for a single crawl tick.
///
/// Dropping the batch without calling [`StoreBatch::commit`] rolls the tick
/// back when the connection closes.
pub struct StoreBatch {
    conn: Connection,
}

impl StoreBatch {
    /// Idempotent request upsert keyed on
    /// `(type, method, url, http_auth, data, trigger)`.
    ///
    /// A new key is inserted and assigned its `db_id`; an existing key
    /// reuses the stored id. Either way the parent edge (if any) is
    /// recorded, so replaying a discovery is a no-op on identity while
    /// still capturing new lineage.
    pub fn save_request(&self, request: &mut Request) -> Result<()> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM request
                 WHERE type=?1 AND method=?2 AND url=?3 AND http_auth=?4 AND data=?5 AND \"trigger\"=?6",
                params![
                    request.request_type.as_str(),
                    request.method,
                    request.url,
                    request.auth_key(),
                    request.data,
                    request.trigger_json(),
                ],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => id,
            None => {
                self.conn.execute(
                    "INSERT INTO request
                     (id_parent, type, method, url, referer, redirects, data, cookies,
                      http_auth, out_of_scope, \"trigger\", user_output)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, '')",
                    params![
                        request.parent_db_id,
                        request.request_type.as_str(),
                        request.method,
                        request.url,
                        request.referer,
                        request.redirects,
                        request.data,
                        request.serialized_cookies(),
                        request.auth_key(),
                        request.out_of_scope as i64,
                        request.trigger_json(),
                    ],
                )?;
                self.conn.last_insert_rowid()
            }
        };
        request.db_id = Some(id);

        if let Some(parent_id) = request.parent_db_id {
            let edge_exists: Option<i64> = self
                .conn
                .query_row(
                    "SELECT id FROM request_child WHERE id_request=?1 AND id_child=?2",
                    params![parent_id, id],
                    |row| row.get(0),
                )
                .optional()?;
            if edge_exists.is_none() {
                self.conn.execute(
                    "INSERT INTO request_child (id_request, id_child) VALUES (?1, ?2)",
                    params![parent_id, id],
                )?;
            }
        }

        Ok(())
    }

    /// Records the outcome of one dispatch against an already-saved
    /// request; never inserts.
    pub fn save_result(&self, result: &CrawlResult, crawled: bool) -> Result<()> {
        let Some(id) = result.request.db_id else {
            return Err(VantageError::Store(format!(
                "result for unsaved request {}",
                result.request
            )));
        };
        self.conn.execute(
            "UPDATE request SET crawled=?1, crawler_errors=?2, user_output=?3 WHERE id=?4",
            params![
                crawled as i64,
                result.serialized_errors(),
                result.serialized_user_output(),
                id,
            ],
        )?;
        Ok(())
    }

    /// Resets the crawled/out-of-scope flags so a previously finished
    /// request is picked up again (resume/complete seed handling).
    pub fn make_crawlable(&self, request: &Request) -> Result<()> {
        let Some(id) = request.db_id else {
            return Err(VantageError::Store(format!(
                "cannot reopen unsaved request {request}"
            )));
        };
        self.conn.execute(
            "UPDATE request SET crawled=0, out_of_scope=0 WHERE id=?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn commit(self) -> Result<()> {
        self.conn.execute_batch("COMMIT;")?;
        Ok(())
    }
}

fn request_from_row(row: &Row) -> rusqlite::Result<Request> {
    let type_str: String = row.get("type")?;
    let http_auth: String = row.get("http_auth")?;
    let trigger_str: String = row.get("trigger")?;
    let cookies_str: String = row.get("cookies")?;
    let out_of_scope: i64 = row.get("out_of_scope")?;

    Ok(Request {
        request_type: RequestType::parse(&type_str),
        method: row.get("method")?,
        url: row.get("url")?,
        data: row.get("data")?,
        referer: row.get("referer")?,
        cookies: serde_json::from_str(&cookies_str).unwrap_or_default(),
        http_auth: (!http_auth.is_empty()).then_some(http_auth),
        trigger: serde_json::from_str(&trigger_str).ok(),
        redirects: row.get("redirects")?,
        out_of_scope: out_of_scope != 0,
        db_id: Some(row.get("id")?),
        parent_db_id: row.get("id_parent")?,
        depth: 0,
        post_depth: 0,
    })
}

/// Picks a non-existing path by suffixing the file stem (`out.db`,
/// `out-1.db`, `out-2.db`, ...).
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("crawl");
    let ext = path.extension().and_then(|s| s.to_str());
    for n in 1.. {
        let name = match ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        };
        let candidate = path.with_file_name(name);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}
