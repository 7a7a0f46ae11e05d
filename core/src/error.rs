//! Domain error taxonomy for reader operations.

use thiserror::Error;

use crate::types::ContentLocation;

/// Failures surfaced by reader operations.
///
/// Only [`ReaderError::Load`] is fatal to a session; the rest are reported and the reading flow
/// carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReaderError {
    #[error("failed to load book: {0}")]
    Load(String),
    #[error("cannot navigate to {target}: {reason}")]
    Navigation { target: ContentLocation, reason: String },
    #[error("position {position} is outside 0..={upper}")]
    OutOfRange { position: i64, upper: i64 },
    #[error("position index is still being built")]
    IndexPending,
    #[error("positions are unavailable for this book: {0}")]
    IndexUnavailable(String),
    #[error("storage unavailable: {0}")]
    Storage(String),
    #[error("search failed: {0}")]
    Search(String),
}

impl ReaderError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReaderError::Load(_))
    }

    pub fn navigation(target: &ContentLocation, reason: impl Into<String>) -> Self {
        ReaderError::Navigation { target: target.clone(), reason: reason.into() }
    }
}

/// Error state presented to the user after a fatal failure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub title: String,
    pub info: String,
    /// Extra guidance; empty when the failure was caused by the user's input.
    pub description: String,
    pub can_retry: bool,
}

impl ErrorReport {
    pub fn new(context: &str, err: &ReaderError, users_fault: bool) -> Self {
        let description = if users_fault {
            String::new()
        } else {
            "Please try again. If the error persists, report the issue.".to_string()
        };
        Self {
            title: "Error".to_string(),
            info: format!("{context}: {err}"),
            description,
            can_retry: err.is_fatal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_load_errors_are_fatal() {
        assert!(ReaderError::Load("bad zip".into()).is_fatal());
        assert!(!ReaderError::IndexPending.is_fatal());
        assert!(!ReaderError::navigation(&ContentLocation::new("x"), "gone").is_fatal());
    }

    #[test]
    fn report_hides_guidance_for_user_faults() {
        let err = ReaderError::Load("not an epub book".into());
        let report = ErrorReport::new("invalid file", &err, true);
        assert!(report.description.is_empty());
        assert!(report.can_retry);
        assert!(report.info.starts_with("invalid file: failed to load book"));
    }
}
