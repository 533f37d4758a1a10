//! In-memory storage backends
//!
//! Used when no database is configured and by tests.

use crate::state::AccessStatus;
use crate::storage::traits::{DataService, StorageResult, UrlQueueService};
use crate::storage::{AccessResultRecord, UrlQueueEntry};
use std::collections::{HashMap, VecDeque};

/// FIFO queues keyed by session id
#[derive(Debug, Default)]
pub struct MemoryUrlQueueService {
    queues: HashMap<String, VecDeque<UrlQueueEntry>>,
}

impl MemoryUrlQueueService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the pending entries of a session, oldest first
    pub fn pending(&self, session_id: &str) -> Vec<UrlQueueEntry> {
        self.queues
            .get(session_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl UrlQueueService for MemoryUrlQueueService {
    fn insert(&mut self, entry: UrlQueueEntry) -> StorageResult<()> {
        self.queues
            .entry(entry.session_id.clone())
            .or_default()
            .push_back(entry);
        Ok(())
    }

    fn poll(&mut self, session_id: &str) -> StorageResult<Option<UrlQueueEntry>> {
        Ok(self
            .queues
            .get_mut(session_id)
            .and_then(|queue| queue.pop_front()))
    }

    fn clear(&mut self, session_id: &str) -> StorageResult<()> {
        self.queues.remove(session_id);
        Ok(())
    }

    fn len(&self, session_id: &str) -> StorageResult<usize> {
        Ok(self.queues.get(session_id).map_or(0, VecDeque::len))
    }
}

/// Keeps every stored access result in insertion order
#[derive(Debug, Default)]
pub struct MemoryDataService {
    records: Vec<AccessResultRecord>,
}

impl MemoryDataService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[AccessResultRecord] {
        &self.records
    }

    /// Returns the stored results for a URL
    pub fn records_for(&self, url: &str) -> Vec<&AccessResultRecord> {
        self.records.iter().filter(|r| r.url == url).collect()
    }
}

impl DataService for MemoryDataService {
    fn store(&mut self, record: AccessResultRecord) -> StorageResult<()> {
        self.records.push(record);
        Ok(())
    }

    fn count_by_status(&self, session_id: &str, status: AccessStatus) -> StorageResult<u64> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.session_id == session_id && r.status == status)
            .count() as u64)
    }
}
