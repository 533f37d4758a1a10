//! Statistics of stored crawl sessions
//!
//! Reads the access results a session left in the SQLite database and prints
//! them grouped by status and failure kind.

use crate::state::{AccessStatus, FailureKind};
use crate::storage::{SessionRecord, SqliteDataService, StorageError, StorageResult};
use crate::DataService;
use std::collections::HashMap;
use std::fmt::Write;

/// Stored statistics of one session
#[derive(Debug, Clone)]
pub struct SessionStatistics {
    pub session: SessionRecord,

    /// Number of stored access results
    pub total_results: u64,

    /// Result counts by status (statuses without results are omitted)
    pub results_by_status: HashMap<AccessStatus, u64>,

    /// Failure counts by kind
    pub failures_by_kind: HashMap<FailureKind, u64>,
}

/// Loads the statistics of a session
///
/// # Arguments
///
/// * `storage` - The results database
/// * `session_id` - Session to report on; the latest session when `None`
///
/// # Returns
///
/// * `Ok(SessionStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - No such session, or the query failed
pub fn load_statistics(
    storage: &SqliteDataService,
    session_id: Option<&str>,
) -> StorageResult<SessionStatistics> {
    let session = match session_id {
        Some(id) => storage.get_session(id)?,
        None => storage
            .get_latest_session()?
            .ok_or_else(|| StorageError::SessionNotFound("<latest>".to_string()))?,
    };

    let mut results_by_status = HashMap::new();
    for status in AccessStatus::all_statuses() {
        let count = storage.count_by_status(&session.session_id, status)?;
        if count > 0 {
            results_by_status.insert(status, count);
        }
    }

    Ok(SessionStatistics {
        total_results: storage.count_total(&session.session_id)?,
        failures_by_kind: storage.failure_summary(&session.session_id)?,
        results_by_status,
        session,
    })
}

/// Renders statistics as the text printed by [`print_statistics`]
pub fn render_statistics(stats: &SessionStatistics) -> String {
    let mut out = String::new();
    let session = &stats.session;

    let _ = writeln!(out, "=== Session {} ===\n", session.session_id);
    let _ = writeln!(out, "Status: {}", session.status.to_db_string());
    let _ = writeln!(out, "Started: {}", session.started_at);
    if let Some(finished) = &session.finished_at {
        let _ = writeln!(out, "Finished: {}", finished);
    }
    let _ = writeln!(out, "Config hash: {}\n", session.config_hash);

    let _ = writeln!(out, "Results: {}", stats.total_results);
    for status in AccessStatus::all_statuses() {
        let count = stats.results_by_status.get(&status).copied().unwrap_or(0);
        let percentage = if stats.total_results > 0 {
            (count as f64 / stats.total_results as f64) * 100.0
        } else {
            0.0
        };
        let _ = writeln!(out, "  {}: {} ({:.1}%)", status, count, percentage);
    }

    if !stats.failures_by_kind.is_empty() {
        let _ = writeln!(out, "\nFailures by kind:");
        let mut kinds: Vec<_> = stats.failures_by_kind.iter().collect();
        kinds.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.to_db_string().cmp(b.0.to_db_string())));
        for (kind, count) in kinds {
            let _ = writeln!(out, "  {}: {}", kind, count);
        }
    }
    out
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &SessionStatistics) {
    print!("{}", render_statistics(stats));
}
