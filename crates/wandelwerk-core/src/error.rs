// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Wandelwerk.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{FileFormat, JobId, JobStatus, OperationKind};

/// Machine-checkable classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Malformed request: missing fields, bad batch size, out-of-bounds geometry.
    Validation,
    /// No backend handles the requested (source, target, operation).
    UnsupportedOperation,
    /// The invoked backend reported an error.
    BackendFailure,
    /// Artifact store or persistence I/O failed.
    Resource,
    /// Misuse of the engine itself (illegal transition, unknown job, config).
    Internal,
}

/// Top-level error type for all Wandelwerk operations.
#[derive(Debug, Error)]
pub enum WandelwerkError {
    // -- Request validation --
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    // -- Capability --
    #[error("unsupported operation: {operation} from {from} to {to}")]
    UnsupportedOperation {
        from: FileFormat,
        to: FileFormat,
        operation: OperationKind,
    },

    #[error("unknown file format: {0}")]
    UnknownFormat(String),

    // -- Backend errors --
    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("OCR failed: {0}")]
    OcrError(String),

    #[error("conversion engine unavailable or conversion rejected: {0}")]
    OfficeEngine(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    // -- Storage / persistence --
    #[error("artifact storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    // -- Engine misuse --
    #[error("illegal transition for job {job}: {from} -> {to}")]
    InvalidTransition {
        job: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("unknown job: {0}")]
    UnknownJob(JobId),

    #[error("job {0} is already claimed by another dispatcher")]
    JobAlreadyClaimed(JobId),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl WandelwerkError {
    /// Classify this error for callers and batch results.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidOptions(_) => ErrorKind::Validation,
            Self::UnsupportedOperation { .. } | Self::UnknownFormat(_) => {
                ErrorKind::UnsupportedOperation
            }
            Self::PdfError(_)
            | Self::ImageError(_)
            | Self::OcrError(_)
            | Self::OfficeEngine(_)
            | Self::BackendUnavailable(_) => ErrorKind::BackendFailure,
            Self::Storage(_) | Self::Database(_) | Self::Io(_) => ErrorKind::Resource,
            Self::InvalidTransition { .. }
            | Self::UnknownJob(_)
            | Self::JobAlreadyClaimed(_)
            | Self::Serialization(_)
            | Self::Config(_) => ErrorKind::Internal,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, WandelwerkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            WandelwerkError::Validation("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            WandelwerkError::UnsupportedOperation {
                from: FileFormat::Docx,
                to: FileFormat::Xlsx,
                operation: OperationKind::Convert,
            }
            .kind(),
            ErrorKind::UnsupportedOperation
        );
        assert_eq!(
            WandelwerkError::ImageError("corrupt".into()).kind(),
            ErrorKind::BackendFailure
        );
        assert_eq!(
            WandelwerkError::Storage("gone".into()).kind(),
            ErrorKind::Resource
        );
    }

    #[test]
    fn unsupported_message_names_the_triple() {
        let err = WandelwerkError::UnsupportedOperation {
            from: FileFormat::Pdf,
            to: FileFormat::Xlsx,
            operation: OperationKind::Convert,
        };
        assert_eq!(err.to_string(), "unsupported operation: convert from pdf to xlsx");
    }
}
