//! Error types for dashprobe

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using dashprobe Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reading or writing session records
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Closed set of failure kinds a test step can end with.
///
/// The kind is chosen where the error is built; retry policies match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    ElementNotFound,
    StaleElement,
    DriverUnavailable,
    NotInteractable,
    /// Expected content is absent from the page
    AssertionMismatch,
    /// A log, report or screenshot write failed
    IoFailure,
}

impl ErrorKind {
    /// Kinds retried by the default policy
    pub const RECOVERABLE: [ErrorKind; 5] = [
        ErrorKind::Timeout,
        ErrorKind::ElementNotFound,
        ErrorKind::StaleElement,
        ErrorKind::DriverUnavailable,
        ErrorKind::NotInteractable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ElementNotFound => "element_not_found",
            ErrorKind::StaleElement => "stale_element",
            ErrorKind::DriverUnavailable => "driver_unavailable",
            ErrorKind::NotInteractable => "not_interactable",
            ErrorKind::AssertionMismatch => "assertion_mismatch",
            ErrorKind::IoFailure => "io_failure",
        }
    }

    pub fn is_recoverable(&self) -> bool {
        Self::RECOVERABLE.contains(self)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed browser action or check, tagged with its kind
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn element_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ElementNotFound, message)
    }

    pub fn stale_element(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StaleElement, message)
    }

    pub fn driver_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DriverUnavailable, message)
    }

    pub fn not_interactable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotInteractable, message)
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AssertionMismatch, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IoFailure, message)
    }
}

impl From<std::io::Error> for StepError {
    fn from(e: std::io::Error) -> Self {
        StepError::io(e.to_string())
    }
}
