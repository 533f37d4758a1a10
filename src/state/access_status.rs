use crate::{FetchError, TransformError};
use std::fmt;

/// Outcome of one access attempt, as stored in an access result record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessStatus {
    Success,
    Failure,
    Redirect,
    NotModified,
}

impl AccessStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Redirect => "redirect",
            Self::NotModified => "not_modified",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "redirect" => Some(Self::Redirect),
            "not_modified" => Some(Self::NotModified),
            _ => None,
        }
    }

    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Success,
            Self::Failure,
            Self::Redirect,
            Self::NotModified,
        ]
    }
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Flat classification of a recoverable per-URL failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    InvalidUrl,
    UnknownHost,
    NoRoute,
    Connection,
    Socket,
    Io,
    Http,
    MaxLengthExceeded,
    AccessTimeout,
    /// The server answered with a non-success status
    HttpStatus,
    Transform,
    NoTransformer,
}

impl FailureKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::UnknownHost => "unknown_host",
            Self::NoRoute => "no_route",
            Self::Connection => "connection",
            Self::Socket => "socket",
            Self::Io => "io",
            Self::Http => "http",
            Self::MaxLengthExceeded => "max_length_exceeded",
            Self::AccessTimeout => "access_timeout",
            Self::HttpStatus => "http_status",
            Self::Transform => "transform",
            Self::NoTransformer => "no_transformer",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::all_kinds()
            .into_iter()
            .find(|kind| kind.to_db_string() == s)
    }

    pub fn all_kinds() -> Vec<Self> {
        vec![
            Self::InvalidUrl,
            Self::UnknownHost,
            Self::NoRoute,
            Self::Connection,
            Self::Socket,
            Self::Io,
            Self::Http,
            Self::MaxLengthExceeded,
            Self::AccessTimeout,
            Self::HttpStatus,
            Self::Transform,
            Self::NoTransformer,
        ]
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

impl From<&FetchError> for FailureKind {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::InvalidUrl { .. } => Self::InvalidUrl,
            FetchError::UnknownHost { .. } => Self::UnknownHost,
            FetchError::NoRoute { .. } => Self::NoRoute,
            FetchError::Connection { .. } => Self::Connection,
            FetchError::Socket { .. } => Self::Socket,
            FetchError::Io { .. } => Self::Io,
            FetchError::Http { .. } => Self::Http,
            FetchError::MaxLengthExceeded { .. } => Self::MaxLengthExceeded,
            FetchError::AccessTimeout { .. } => Self::AccessTimeout,
        }
    }
}

impl From<&TransformError> for FailureKind {
    fn from(_: &TransformError) -> Self {
        Self::Transform
    }
}
