// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Uniform write results.
//!
//! Every write path reports through [`WriteOutcome`]. Backend calls may also
//! return a [`DeliveryError`]; callers treat an `Err` exactly like a failed
//! outcome and fold it in with [`WriteOutcome::from_error`].

use thiserror::Error;

/// Errors raised while delivering log entries.
///
/// Clonable so the error that ended a write can travel inside a
/// [`WriteOutcome`] and be inspected by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("circuit breaker open, request rejected")]
    CircuitOpen,
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("bulk queue is full")]
    QueueFull,
    #[error("bulk queue is closed")]
    QueueClosed,
    #[error("fallback I/O error: {0}")]
    Io(String),
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        DeliveryError::Serialization(err.to_string())
    }
}

/// Result of a write: success flag, ordered errors, and the error that ended it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct WriteOutcome {
    pub success: bool,
    pub errors: Vec<String>,
    pub error: Option<DeliveryError>,
}

impl WriteOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![message.into()],
            error: None,
        }
    }

    /// A failure carrying the error that caused it.
    pub fn from_error(err: DeliveryError) -> Self {
        Self {
            success: false,
            errors: vec![err.to_string()],
            error: Some(err),
        }
    }

    /// Fold a fallible backend call into an outcome.
    pub fn from_result(result: Result<WriteOutcome, DeliveryError>) -> Self {
        match result {
            Ok(outcome) => outcome,
            Err(err) => Self::from_error(err),
        }
    }

    /// Append an error message, keeping earlier ones first.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.errors.push(message.into());
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.success
    }

    /// Errors joined for log output.
    #[must_use]
    pub fn error_summary(&self) -> String {
        self.errors.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_has_no_errors() {
        let outcome = WriteOutcome::success();
        assert!(outcome.is_success());
        assert!(outcome.errors.is_empty());
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_errors_keep_order() {
        let outcome = WriteOutcome::failure("first")
            .with_error("second")
            .with_error("third");

        assert!(outcome.is_failure());
        assert_eq!(outcome.errors, vec!["first", "second", "third"]);
        assert_eq!(outcome.error_summary(), "first; second; third");
    }

    #[test]
    fn test_from_result_normalizes_errors() {
        let outcome = WriteOutcome::from_result(Err(DeliveryError::CircuitOpen));
        assert!(outcome.is_failure());
        assert_eq!(outcome.error, Some(DeliveryError::CircuitOpen));
        assert_eq!(outcome.errors, vec!["circuit breaker open, request rejected"]);

        let ok = WriteOutcome::from_result(Ok(WriteOutcome::success()));
        assert!(ok.is_success());
    }

    #[test]
    fn test_serde_error_conversion() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let delivery: DeliveryError = err.into();
        assert!(matches!(delivery, DeliveryError::Serialization(_)));
    }
}
