//! Error taxonomy for the harvesting pipeline.
//!
//! Most fallible APIs return `anyhow::Result`. The typed errors here are
//! carried inside `anyhow::Error` so callers that need to branch on the kind
//! can `downcast_ref` them:
//!
//! - `CaptureError` is produced by frame sources and carries an `ErrorClass`
//!   the acquisition loop uses to decide between retrying and stopping.
//! - `HarvestError` tags pipeline failures with a `HarvestErrorKind`.

use std::fmt;

/// Whether a failure is worth retrying.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry after the reconnect interval.
    Transient,
    /// Give up on this source; other cameras are unaffected.
    Fatal,
}

/// Failure opening or reading a frame source.
#[derive(Debug)]
pub struct CaptureError {
    class: ErrorClass,
    message: String,
}

impl CaptureError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Fatal,
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        self.class
    }

    pub fn is_transient(&self) -> bool {
        self.class == ErrorClass::Transient
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = match self.class {
            ErrorClass::Transient => "transient",
            ErrorClass::Fatal => "fatal",
        };
        write!(f, "{} capture error: {}", class, self.message)
    }
}

impl std::error::Error for CaptureError {}

impl From<anyhow::Error> for CaptureError {
    /// Untyped errors from backend plumbing are treated as transient.
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<CaptureError>() {
            Ok(capture) => capture,
            Err(other) => CaptureError::transient(format!("{:#}", other)),
        }
    }
}

/// Pipeline failure categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HarvestErrorKind {
    /// Camera open/read failure. Retried indefinitely, never fatal.
    SourceUnavailable,
    /// Detector not initialized or declined to run. Frame skipped.
    DetectorUnready,
    /// File or catalog write failed. Sample dropped, loop continues.
    PersistenceFailure,
    /// Missing or invalid configuration. Fatal at startup.
    ConfigurationError,
}

impl HarvestErrorKind {
    pub fn is_fatal(self) -> bool {
        matches!(self, HarvestErrorKind::ConfigurationError)
    }
}

#[derive(Debug)]
pub struct HarvestError {
    pub kind: HarvestErrorKind,
    pub message: String,
}

impl HarvestError {
    pub fn new(kind: HarvestErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(HarvestErrorKind::ConfigurationError, message)
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(HarvestErrorKind::PersistenceFailure, message)
    }
}

impl fmt::Display for HarvestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for HarvestError {}

/// Classify an `anyhow::Error` produced anywhere in the pipeline.
///
/// Untagged errors default to `fallback`.
pub fn kind_of(err: &anyhow::Error, fallback: HarvestErrorKind) -> HarvestErrorKind {
    if let Some(harvest) = err.downcast_ref::<HarvestError>() {
        return harvest.kind;
    }
    if err.downcast_ref::<CaptureError>().is_some() {
        return HarvestErrorKind::SourceUnavailable;
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn untyped_errors_become_transient_capture_errors() {
        let err = CaptureError::from(anyhow!("socket reset"));
        assert!(err.is_transient());
        assert!(err.message().contains("socket reset"));
    }

    #[test]
    fn typed_capture_errors_survive_anyhow_round_trip() {
        let wrapped = anyhow::Error::new(CaptureError::fatal("unsupported scheme"));
        let err = CaptureError::from(wrapped);
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn kind_of_reads_tagged_errors() {
        let err = anyhow::Error::new(HarvestError::persistence("disk full"));
        assert_eq!(
            kind_of(&err, HarvestErrorKind::SourceUnavailable),
            HarvestErrorKind::PersistenceFailure
        );
        let err = anyhow!("plain");
        assert_eq!(
            kind_of(&err, HarvestErrorKind::DetectorUnready),
            HarvestErrorKind::DetectorUnready
        );
        assert!(HarvestErrorKind::ConfigurationError.is_fatal());
        assert!(!HarvestErrorKind::PersistenceFailure.is_fatal());
    }
}
