//! URL queue coordination
//!
//! Serializes access to a [`UrlQueueService`] shared by all workers, keeps the
//! per-session dedup index, and tracks in-flight work so that an empty queue
//! can be told apart from a finished session.

use crate::storage::{StorageResult, UrlQueueEntry, UrlQueueService};
use crate::url::normalize_url;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// Result of polling the queue of a session
#[derive(Debug)]
pub enum PollResult {
    /// An entry to process; the session counts as busy until the guard drops
    Entry(UrlQueueEntry, InFlightGuard),
    /// Nothing queued right now, but other workers may still produce entries
    Wait,
    /// Nothing queued and nothing in flight: the session is done
    Empty,
}

/// Marks one entry of a session as being processed
///
/// Dropping the guard releases the in-flight slot. Workers offer discovered
/// children before dropping it so the session never looks finished early.
#[derive(Debug)]
pub struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Thread-safe enqueue/dequeue with dedup
pub struct UrlQueueCoordinator {
    queue: Mutex<Box<dyn UrlQueueService>>,
    /// (session id, normalized url) pairs ever offered
    seen: DashSet<(String, String)>,
    in_flight: DashMap<String, Arc<AtomicUsize>>,
}

impl UrlQueueCoordinator {
    pub fn new(queue: Box<dyn UrlQueueService>) -> Self {
        Self {
            queue: Mutex::new(queue),
            seen: DashSet::new(),
            in_flight: DashMap::new(),
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, Box<dyn UrlQueueService>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn counter(&self, session_id: &str) -> Arc<AtomicUsize> {
        Arc::clone(
            self.in_flight
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
                .value(),
        )
    }

    /// Enqueues an entry unless its normalized URL was already offered
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The entry was inserted
    /// * `Ok(false)` - Duplicate or unnormalizable URL; nothing changed
    /// * `Err(StorageError)` - The queue backend failed
    pub fn offer(&self, mut entry: UrlQueueEntry) -> StorageResult<bool> {
        let Some(url) = normalize_url(&entry.url) else {
            trace!("Rejected unnormalizable URL {}", entry.url);
            return Ok(false);
        };
        entry.url = url;

        let mut queue = self.lock_queue();
        if !self.seen.insert((entry.session_id.clone(), entry.url.clone())) {
            trace!("Duplicate URL {} in session {}", entry.url, entry.session_id);
            return Ok(false);
        }

        trace!("Queued {} at depth {}", entry.url, entry.depth);
        if let Err(e) = queue.insert(entry.clone()) {
            self.seen.remove(&(entry.session_id, entry.url));
            return Err(e);
        }
        Ok(true)
    }

    /// Offers several entries; returns how many were inserted
    pub fn offer_all<I>(&self, entries: I) -> StorageResult<usize>
    where
        I: IntoIterator<Item = UrlQueueEntry>,
    {
        let mut inserted = 0;
        for entry in entries {
            if self.offer(entry)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Re-enqueues an entry for another attempt, bypassing dedup
    pub fn requeue(&self, entry: UrlQueueEntry) -> StorageResult<()> {
        trace!("Requeued {} (attempt {})", entry.url, entry.retry_count + 1);
        self.lock_queue().insert(entry)
    }

    /// Takes the next entry of a session in FIFO order
    pub fn poll(&self, session_id: &str) -> StorageResult<PollResult> {
        let counter = self.counter(session_id);
        let mut queue = self.lock_queue();

        match queue.poll(session_id)? {
            Some(entry) => {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(PollResult::Entry(entry, InFlightGuard { counter }))
            }
            None if counter.load(Ordering::SeqCst) > 0 => Ok(PollResult::Wait),
            None => Ok(PollResult::Empty),
        }
    }

    /// Returns true if the URL was already offered in the session
    pub fn is_seen(&self, session_id: &str, url: &str) -> bool {
        normalize_url(url).map_or(false, |url| {
            self.seen.contains(&(session_id.to_string(), url))
        })
    }

    pub fn pending(&self, session_id: &str) -> StorageResult<usize> {
        self.lock_queue().len(session_id)
    }

    pub fn in_flight(&self, session_id: &str) -> usize {
        self.in_flight
            .get(session_id)
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }

    /// Drops the queue, dedup index and counters of a session
    pub fn clear(&self, session_id: &str) -> StorageResult<()> {
        let mut queue = self.lock_queue();
        queue.clear(session_id)?;
        self.seen.retain(|(session, _)| session != session_id);
        self.in_flight.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryUrlQueueService;

    fn create_test_coordinator() -> UrlQueueCoordinator {
        UrlQueueCoordinator::new(Box::new(MemoryUrlQueueService::new()))
    }

    #[test]
    fn test_offer_is_idempotent() {
        let coordinator = create_test_coordinator();
        let seed = UrlQueueEntry::seed("s1", "http://h/");

        assert!(coordinator.offer(seed.clone()).unwrap());
        assert!(!coordinator.offer(seed).unwrap());
        assert!(!coordinator
            .offer(UrlQueueEntry::seed("s1", "http://h/#frag"))
            .unwrap());
        assert_eq!(coordinator.pending("s1").unwrap(), 1);
    }

    #[test]
    fn test_dedup_is_per_session() {
        let coordinator = create_test_coordinator();
        assert!(coordinator.offer(UrlQueueEntry::seed("s1", "http://h/")).unwrap());
        assert!(coordinator.offer(UrlQueueEntry::seed("s2", "http://h/")).unwrap());
        assert!(coordinator.is_seen("s1", "http://h/"));
        assert!(!coordinator.is_seen("s3", "http://h/"));
    }

    #[test]
    fn test_offer_rejects_invalid() {
        let coordinator = create_test_coordinator();
        assert!(!coordinator
            .offer(UrlQueueEntry::seed("s1", "http://h/a/../b"))
            .unwrap());
        assert_eq!(coordinator.pending("s1").unwrap(), 0);
    }

    #[test]
    fn test_poll_states() {
        let coordinator = create_test_coordinator();
        assert!(matches!(coordinator.poll("s1").unwrap(), PollResult::Empty));

        coordinator.offer(UrlQueueEntry::seed("s1", "http://h/")).unwrap();
        let (entry, guard) = match coordinator.poll("s1").unwrap() {
            PollResult::Entry(entry, guard) => (entry, guard),
            other => panic!("expected entry, got {:?}", other),
        };
        assert_eq!(entry.url, "http://h/");
        assert_eq!(coordinator.in_flight("s1"), 1);

        // Queue is empty but the entry is still being processed
        assert!(matches!(coordinator.poll("s1").unwrap(), PollResult::Wait));

        coordinator.offer(entry.child("http://h/a")).unwrap();
        drop(guard);
        assert_eq!(coordinator.in_flight("s1"), 0);

        match coordinator.poll("s1").unwrap() {
            PollResult::Entry(child, _guard) => assert_eq!(child.depth, 1),
            other => panic!("expected entry, got {:?}", other),
        }
        assert!(matches!(coordinator.poll("s1").unwrap(), PollResult::Empty));
    }

    #[test]
    fn test_requeue_bypasses_dedup() {
        let coordinator = create_test_coordinator();
        let seed = UrlQueueEntry::seed("s1", "http://h/");
        coordinator.offer(seed.clone()).unwrap();
        coordinator.requeue(seed.retry()).unwrap();
        assert_eq!(coordinator.pending("s1").unwrap(), 2);
    }

    #[test]
    fn test_clear() {
        let coordinator = create_test_coordinator();
        coordinator.offer(UrlQueueEntry::seed("s1", "http://h/")).unwrap();
        coordinator.clear("s1").unwrap();
        assert_eq!(coordinator.pending("s1").unwrap(), 0);
        assert!(!coordinator.is_seen("s1", "http://h/"));
    }

    #[test]
    fn test_concurrent_offers_deliver_once() {
        let coordinator = Arc::new(create_test_coordinator());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|i| {
                            coordinator
                                .offer(UrlQueueEntry::seed("s1", &format!("http://h/{}", i)))
                                .unwrap()
                        })
                        .count()
                })
            })
            .collect();

        let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(inserted, 50);
        assert_eq!(coordinator.pending("s1").unwrap(), 50);

        let mut delivered = std::collections::HashSet::new();
        while let PollResult::Entry(entry, _guard) = coordinator.poll("s1").unwrap() {
            assert!(delivered.insert(entry.url));
        }
        assert_eq!(delivered.len(), 50);
    }
}
