//! SQLite storage implementation
//!
//! This module provides a SQLite-backed [`DataService`] that appends access
//! results and tracks the lifecycle of crawl sessions.

use crate::state::{AccessStatus, FailureKind};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{DataService, StorageError, StorageResult};
use crate::storage::{AccessResultData, AccessResultRecord, SessionStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// Represents a crawl session in the database
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: SessionStatus,
}

/// SQLite data service
pub struct SqliteDataService {
    conn: Connection,
}

impl SqliteDataService {
    /// Opens or creates a results database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteDataService)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Gets a session by ID
    pub fn get_session(&self, session_id: &str) -> StorageResult<SessionRecord> {
        self.conn
            .query_row(
                "SELECT session_id, started_at, finished_at, config_hash, status
                 FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok(SessionRecord {
                        session_id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        status: SessionStatus::from_db_string(&row.get::<_, String>(4)?)
                            .unwrap_or(SessionStatus::Running),
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StorageError::SessionNotFound(session_id.to_string()))
    }

    /// Gets the most recently started session
    pub fn get_latest_session(&self) -> StorageResult<Option<SessionRecord>> {
        let session = self
            .conn
            .query_row(
                "SELECT session_id, started_at, finished_at, config_hash, status
                 FROM sessions ORDER BY started_at DESC LIMIT 1",
                [],
                |row| {
                    Ok(SessionRecord {
                        session_id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        status: SessionStatus::from_db_string(&row.get::<_, String>(4)?)
                            .unwrap_or(SessionStatus::Running),
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    /// Gets total result count of a session
    pub fn count_total(&self, session_id: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM access_results WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Gets failure counts of a session grouped by kind
    pub fn failure_summary(&self, session_id: &str) -> StorageResult<HashMap<FailureKind, u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT failure_kind, COUNT(*) FROM access_results
             WHERE session_id = ?1 AND failure_kind IS NOT NULL
             GROUP BY failure_kind",
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut summary = HashMap::new();
        for row in rows {
            let (kind, count) = row?;
            if let Some(kind) = FailureKind::from_db_string(&kind) {
                summary.insert(kind, count as u64);
            }
        }
        Ok(summary)
    }

    /// Gets all results of a session in insertion order
    pub fn get_results(&self, session_id: &str) -> StorageResult<Vec<AccessResultRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, url, parent_url, depth, rule_id, status, http_status_code,
                    mime_type, content_length, execution_time_ms, last_modified, create_time,
                    failure_kind, error_message, transformer_name, encoding, payload
             FROM access_results WHERE session_id = ?1 ORDER BY id",
        )?;

        let records = stmt
            .query_map(params![session_id], read_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

impl DataService for SqliteDataService {
    fn store(&mut self, record: AccessResultRecord) -> StorageResult<()> {
        let (transformer_name, encoding, payload) = match record.data {
            Some(data) => (Some(data.transformer_name), data.encoding, Some(data.payload)),
            None => (None, None, None),
        };

        self.conn.execute(
            "INSERT INTO access_results (
                session_id, url, parent_url, depth, rule_id, status, http_status_code,
                mime_type, content_length, execution_time_ms, last_modified, create_time,
                failure_kind, error_message, transformer_name, encoding, payload
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                record.session_id,
                record.url,
                record.parent_url,
                record.depth,
                record.rule_id,
                record.status.to_db_string(),
                record.http_status_code,
                record.mime_type,
                record.content_length.map(|l| l as i64),
                record.execution_time_ms as i64,
                record.last_modified.map(|t| t.to_rfc3339()),
                record.create_time.to_rfc3339(),
                record.failure_kind.map(|k| k.to_db_string()),
                record.error_message,
                transformer_name,
                encoding,
                payload,
            ],
        )?;
        Ok(())
    }

    fn begin_session(&mut self, session_id: &str, config_hash: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO sessions (session_id, started_at, config_hash, status)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                started_at = excluded.started_at,
                finished_at = NULL,
                config_hash = excluded.config_hash,
                status = excluded.status",
            params![
                session_id,
                Utc::now().to_rfc3339(),
                config_hash,
                SessionStatus::Running.to_db_string()
            ],
        )?;
        Ok(())
    }

    fn finish_session(&mut self, session_id: &str, status: SessionStatus) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE sessions SET status = ?1, finished_at = ?2 WHERE session_id = ?3",
            params![status.to_db_string(), Utc::now().to_rfc3339(), session_id],
        )?;
        if updated == 0 {
            return Err(StorageError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    fn count_by_status(&self, session_id: &str, status: AccessStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM access_results WHERE session_id = ?1 AND status = ?2",
            params![session_id, status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn parse_time(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<AccessResultRecord> {
    let transformer_name: Option<String> = row.get(14)?;
    let payload: Option<Vec<u8>> = row.get(16)?;
    let data = match (transformer_name, payload) {
        (Some(transformer_name), Some(payload)) => Some(AccessResultData {
            transformer_name,
            encoding: row.get(15)?,
            payload,
        }),
        _ => None,
    };

    Ok(AccessResultRecord {
        session_id: row.get(0)?,
        url: row.get(1)?,
        parent_url: row.get(2)?,
        depth: row.get(3)?,
        rule_id: row.get(4)?,
        status: AccessStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(AccessStatus::Failure),
        http_status_code: row.get(6)?,
        mime_type: row.get(7)?,
        content_length: row.get::<_, Option<i64>>(8)?.map(|l| l as u64),
        execution_time_ms: row.get::<_, i64>(9)? as u64,
        last_modified: parse_time(row.get(10)?),
        create_time: parse_time(row.get(11)?).unwrap_or_else(Utc::now),
        failure_kind: row
            .get::<_, Option<String>>(12)?
            .and_then(|k| FailureKind::from_db_string(&k)),
        error_message: row.get(13)?,
        data,
    })
}
