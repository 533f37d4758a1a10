//! Storage traits and error types
//!
//! This module defines the narrow interfaces through which the crawl core
//! hands queue entries and access results to persistence backends.

use crate::state::AccessStatus;
use crate::storage::{AccessResultRecord, SessionStatus, UrlQueueEntry};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Per-session FIFO of URLs waiting to be fetched
///
/// Implementations are not required to deduplicate; the
/// [`UrlQueueCoordinator`](crate::session::UrlQueueCoordinator) guards
/// insertion and serializes access.
pub trait UrlQueueService: Send {
    /// Appends an entry to its session's queue
    fn insert(&mut self, entry: UrlQueueEntry) -> StorageResult<()>;

    /// Removes and returns the oldest entry of a session
    fn poll(&mut self, session_id: &str) -> StorageResult<Option<UrlQueueEntry>>;

    /// Drops every pending entry of a session
    fn clear(&mut self, session_id: &str) -> StorageResult<()>;

    /// Number of pending entries of a session
    fn len(&self, session_id: &str) -> StorageResult<usize>;

    fn is_empty(&self, session_id: &str) -> StorageResult<bool> {
        Ok(self.len(session_id)? == 0)
    }
}

/// Write sink for access result records
pub trait DataService: Send {
    /// Appends one access result
    fn store(&mut self, record: AccessResultRecord) -> StorageResult<()>;

    /// Called once before the first result of a session is stored
    fn begin_session(&mut self, _session_id: &str, _config_hash: &str) -> StorageResult<()> {
        Ok(())
    }

    /// Called once after the last result of a session is stored
    fn finish_session(&mut self, _session_id: &str, _status: SessionStatus) -> StorageResult<()> {
        Ok(())
    }

    /// Counts the stored results of a session with the given status
    fn count_by_status(&self, session_id: &str, status: AccessStatus) -> StorageResult<u64>;
}
