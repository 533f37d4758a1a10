/// Per-URL processing states of a crawl worker
///
/// This module defines the states a queue entry passes through between being
/// dequeued and having its access result stored.
use std::fmt;

/// Represents the current state of a URL inside a crawl worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlState {
    // ===== Active States =====
    /// Entry has been taken from the queue
    Dequeued,

    /// robots.txt for the entry's host has been consulted
    RobotsChecked,

    /// The HTTP exchange is in progress
    Fetching,

    /// A response body has been captured
    Fetched,

    /// The captured response is being transformed
    Transforming,

    // ===== Terminal States =====
    /// The server answered with a redirect; the target was offered instead
    Redirected,

    /// Result and child URLs have been stored
    Stored,

    /// Processing failed; a failed access result was recorded
    Failed,
}

impl UrlState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Redirected | Self::Stored | Self::Failed)
    }

    /// Returns true if the worker still owns the entry
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Checks whether a transition to `next` is permitted
    ///
    /// `Dequeued → RobotsChecked → Fetching → {Fetched | Redirected | Failed}`,
    /// then `Fetched → Transforming → {Stored | Failed}`. An unchanged resource
    /// goes straight from `Fetching` to `Stored`. Any active state may fail.
    pub fn can_transition_to(&self, next: UrlState) -> bool {
        use UrlState::*;
        match (self, next) {
            (Dequeued, RobotsChecked) => true,
            (RobotsChecked, Fetching) => true,
            (Fetching, Fetched) | (Fetching, Redirected) | (Fetching, Stored) => true,
            (Fetched, Transforming) => true,
            (Transforming, Stored) => true,
            (state, Failed) => state.is_active(),
            _ => false,
        }
    }

    /// Converts the state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Dequeued => "dequeued",
            Self::RobotsChecked => "robots_checked",
            Self::Fetching => "fetching",
            Self::Fetched => "fetched",
            Self::Transforming => "transforming",
            Self::Redirected => "redirected",
            Self::Stored => "stored",
            Self::Failed => "failed",
        }
    }

    /// Parses a state from its database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "dequeued" => Some(Self::Dequeued),
            "robots_checked" => Some(Self::RobotsChecked),
            "fetching" => Some(Self::Fetching),
            "fetched" => Some(Self::Fetched),
            "transforming" => Some(Self::Transforming),
            "redirected" => Some(Self::Redirected),
            "stored" => Some(Self::Stored),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Dequeued,
            Self::RobotsChecked,
            Self::Fetching,
            Self::Fetched,
            Self::Transforming,
            Self::Redirected,
            Self::Stored,
            Self::Failed,
        ]
    }
}

impl fmt::Display for UrlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            UrlState::Dequeued,
            UrlState::RobotsChecked,
            UrlState::Fetching,
            UrlState::Fetched,
            UrlState::Transforming,
            UrlState::Stored,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_redirect_transition() {
        assert!(UrlState::Fetching.can_transition_to(UrlState::Redirected));
        assert!(!UrlState::Fetched.can_transition_to(UrlState::Redirected));
    }

    #[test]
    fn test_not_modified_transition() {
        assert!(UrlState::Fetching.can_transition_to(UrlState::Stored));
        assert!(!UrlState::RobotsChecked.can_transition_to(UrlState::Stored));
    }

    #[test]
    fn test_any_active_state_can_fail() {
        for state in UrlState::all_states() {
            assert_eq!(
                state.can_transition_to(UrlState::Failed),
                state.is_active(),
                "{}",
                state
            );
        }
    }

    #[test]
    fn test_no_skipping() {
        assert!(!UrlState::Dequeued.can_transition_to(UrlState::Fetching));
        assert!(!UrlState::Fetching.can_transition_to(UrlState::Transforming));
        assert!(!UrlState::Stored.can_transition_to(UrlState::Dequeued));
    }

    #[test]
    fn test_db_string_roundtrip() {
        for state in UrlState::all_states() {
            assert_eq!(UrlState::from_db_string(state.to_db_string()), Some(state));
        }
        assert_eq!(UrlState::from_db_string("unknown"), None);
    }
}
