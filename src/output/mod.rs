//! Output module for end-of-session reporting
//!
//! - [`print_report`]: counts of the session that just ran
//! - [`stats`]: statistics of sessions stored in the results database

pub mod stats;

pub use stats::{load_statistics, print_statistics, render_statistics, SessionStatistics};

use crate::crawler::CrawlReport;
use crate::state::FailureKind;
use std::fmt::Write;

/// Renders a crawl report as the text printed by [`print_report`]
pub fn render_report(report: &CrawlReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Crawl Report ({}) ===\n", report.session_id);
    let _ = writeln!(out, "Elapsed: {:.1}s", report.elapsed.as_secs_f64());
    let _ = writeln!(out, "URLs accessed: {}", report.access_count);
    let _ = writeln!(out, "Child URLs queued: {}\n", report.child_urls_queued);

    let _ = writeln!(out, "Results: {}", report.total());
    let _ = writeln!(out, "  success: {}", report.success);
    let _ = writeln!(out, "  failure: {}", report.failure);
    let _ = writeln!(out, "  redirect: {}", report.redirect);
    let _ = writeln!(out, "  not_modified: {}", report.not_modified);

    if !report.failures_by_kind.is_empty() {
        let _ = writeln!(out, "\nFailures by kind:");
        for kind in FailureKind::all_kinds() {
            if let Some(count) = report.failures_by_kind.get(&kind) {
                let _ = writeln!(out, "  {}: {}", kind, count);
            }
        }
    }

    let rate = if report.total() > 0 {
        (report.success as f64 / report.total() as f64) * 100.0
    } else {
        0.0
    };
    let _ = writeln!(out, "\nSuccess rate: {:.1}%", rate);
    out
}

/// Prints a crawl report to stdout
pub fn print_report(report: &CrawlReport) {
    print!("{}", render_report(report));
}
