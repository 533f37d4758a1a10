//! Live counters of a crawl session

use crate::state::{AccessStatus, FailureKind};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregate outcome counts, updated by every worker
#[derive(Debug, Default)]
pub struct CrawlStats {
    success: AtomicU64,
    failure: AtomicU64,
    redirect: AtomicU64,
    not_modified: AtomicU64,
    child_urls_queued: AtomicU64,
    failures_by_kind: DashMap<FailureKind, u64>,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one stored access result
    pub fn record(&self, status: AccessStatus, failure_kind: Option<FailureKind>) {
        let counter = match status {
            AccessStatus::Success => &self.success,
            AccessStatus::Failure => &self.failure,
            AccessStatus::Redirect => &self.redirect,
            AccessStatus::NotModified => &self.not_modified,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Some(kind) = failure_kind {
            *self.failures_by_kind.entry(kind).or_insert(0) += 1;
        }
    }

    pub fn record_queued(&self, count: usize) {
        self.child_urls_queued
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn count(&self, status: AccessStatus) -> u64 {
        match status {
            AccessStatus::Success => self.success.load(Ordering::Relaxed),
            AccessStatus::Failure => self.failure.load(Ordering::Relaxed),
            AccessStatus::Redirect => self.redirect.load(Ordering::Relaxed),
            AccessStatus::NotModified => self.not_modified.load(Ordering::Relaxed),
        }
    }

    pub fn total(&self) -> u64 {
        AccessStatus::all_statuses()
            .into_iter()
            .map(|s| self.count(s))
            .sum()
    }

    pub fn child_urls_queued(&self) -> u64 {
        self.child_urls_queued.load(Ordering::Relaxed)
    }

    pub fn failures_by_kind(&self) -> HashMap<FailureKind, u64> {
        self.failures_by_kind
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts() {
        let stats = CrawlStats::new();
        stats.record(AccessStatus::Success, None);
        stats.record(AccessStatus::Success, None);
        stats.record(AccessStatus::Failure, Some(FailureKind::AccessTimeout));
        stats.record(AccessStatus::Failure, Some(FailureKind::AccessTimeout));
        stats.record(AccessStatus::Redirect, None);
        stats.record_queued(3);

        assert_eq!(stats.count(AccessStatus::Success), 2);
        assert_eq!(stats.count(AccessStatus::Failure), 2);
        assert_eq!(stats.count(AccessStatus::NotModified), 0);
        assert_eq!(stats.total(), 5);
        assert_eq!(stats.child_urls_queued(), 3);
        assert_eq!(
            stats.failures_by_kind().get(&FailureKind::AccessTimeout),
            Some(&2)
        );
    }
}
