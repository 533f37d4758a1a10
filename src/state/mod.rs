//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UrlState`: the per-URL state machine driven by a crawl worker
//! - `AccessStatus`: the recorded outcome of one access attempt
//! - `FailureKind`: flat classification of recoverable failures

mod access_status;
mod url_state;

// Re-export main types
pub use access_status::{AccessStatus, FailureKind};
pub use url_state::UrlState;
