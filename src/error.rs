//! Error types for the subpub library.

use std::fmt;
use thiserror::Error;

/// Type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for subpub
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The bus has been closed (or is closing) and rejects new work
    #[error("event bus is closed")]
    BusClosed,

    /// The deadline passed to `close` expired before every subscription drained
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The deadline passed to `close` was cancelled
    #[error("deadline cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check if this error means the bus no longer accepts work
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::BusClosed)
    }

    /// Check if this error came from a `close` deadline
    pub fn is_deadline(&self) -> bool {
        matches!(self, Error::DeadlineExceeded | Error::Cancelled)
    }

    /// Status code a transport layer should report for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Error::BusClosed => StatusCode::Unavailable,
            Error::Cancelled => StatusCode::Cancelled,
            Error::DeadlineExceeded => StatusCode::DeadlineExceeded,
            Error::Config(_) => StatusCode::Internal,
        }
    }
}

/// Wire-level status a service layer reports to its remote callers.
///
/// The bus itself never speaks a wire protocol; this is the mapping an RPC
/// front end applies when it translates bus errors for its clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// The bus is closed; the client should not retry against this instance
    Unavailable,
    /// The caller (or its stream) was cancelled
    Cancelled,
    /// A deadline expired
    DeadlineExceeded,
    /// Anything else
    Internal,
}

impl StatusCode {
    /// Stable snake_case label for logs
    pub fn as_label(&self) -> &'static str {
        match self {
            StatusCode::Unavailable => "unavailable",
            StatusCode::Cancelled => "cancelled",
            StatusCode::DeadlineExceeded => "deadline_exceeded",
            StatusCode::Internal => "internal",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
