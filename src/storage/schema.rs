//! Database schema definitions
//!
//! This module contains the SQL schema of the Sumi-Crawler results database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl sessions
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per fetch attempt
CREATE TABLE IF NOT EXISTS access_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    url TEXT NOT NULL,
    parent_url TEXT,
    depth INTEGER NOT NULL,
    rule_id TEXT,
    status TEXT NOT NULL,
    http_status_code INTEGER,
    mime_type TEXT,
    content_length INTEGER,
    execution_time_ms INTEGER NOT NULL,
    last_modified TEXT,
    create_time TEXT NOT NULL,
    failure_kind TEXT,
    error_message TEXT,
    transformer_name TEXT,
    encoding TEXT,
    payload BLOB
);

CREATE INDEX IF NOT EXISTS idx_access_results_session ON access_results(session_id);
CREATE INDEX IF NOT EXISTS idx_access_results_status ON access_results(session_id, status);
CREATE INDEX IF NOT EXISTS idx_access_results_url ON access_results(url);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
