// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for presentation layers.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The severity drives how a UI or CLI presents it.

use crate::error::WandelwerkError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Temporary — trying again may work.
    Transient,
    /// The request itself must change (options, file choice).
    ActionRequired,
    /// Cannot be fixed by retrying or by changing the request.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether resubmitting the same request could succeed.
    pub retriable: bool,
    pub severity: Severity,
}

impl HumanError {
    fn new(message: &str, suggestion: impl Into<String>, retriable: bool, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            retriable,
            severity,
        }
    }
}

/// Convert a `WandelwerkError` into a `HumanError`.
pub fn humanize_error(err: &WandelwerkError) -> HumanError {
    match err {
        WandelwerkError::Validation(detail) | WandelwerkError::InvalidOptions(detail) => {
            HumanError::new(
                "Some of the settings for this request don't work.",
                format!("Check the values you entered and try again. ({detail})"),
                false,
                Severity::ActionRequired,
            )
        }

        WandelwerkError::UnsupportedOperation { from, to, operation } => HumanError::new(
            "That conversion isn't available.",
            format!("We can't {operation} a {from} file into {to}. Pick a different output format."),
            false,
            Severity::Permanent,
        ),

        WandelwerkError::UnknownFormat(name) => HumanError::new(
            "We don't recognise this file type.",
            format!("Try saving the file as PDF, DOCX, PNG or JPEG first. (File type: {name})"),
            false,
            Severity::Permanent,
        ),

        WandelwerkError::PdfError(_) => HumanError::new(
            "There's a problem with this PDF file.",
            "The file may be damaged or password-protected. Try opening it on a computer first to check it works.",
            false,
            Severity::Permanent,
        ),

        WandelwerkError::ImageError(_) => HumanError::new(
            "There's a problem with this image.",
            "The image may be damaged or in an unusual format. Try saving it as a JPEG or PNG first.",
            false,
            Severity::Permanent,
        ),

        WandelwerkError::OcrError(detail) => {
            if detail.contains("language") || detail.contains("model") {
                HumanError::new(
                    "Text recognition isn't available for that language.",
                    "Choose a different language, or ask an administrator to install the language model.",
                    false,
                    Severity::ActionRequired,
                )
            } else {
                HumanError::new(
                    "Text recognition didn't work on this file.",
                    "Try a clearer scan with better lighting and sharper text.",
                    true,
                    Severity::Transient,
                )
            }
        }

        WandelwerkError::OfficeEngine(detail) => {
            let lower = detail.to_ascii_lowercase();
            if lower.contains("not found") || lower.contains("timed out") {
                HumanError::new(
                    "The document converter is busy or not running.",
                    "Please try again in a few minutes.",
                    true,
                    Severity::Transient,
                )
            } else {
                HumanError::new(
                    "The document converter couldn't read this file.",
                    "The file may be damaged or use features we can't convert. Try re-saving it in its original program.",
                    false,
                    Severity::Permanent,
                )
            }
        }

        WandelwerkError::BackendUnavailable(_) => HumanError::new(
            "This kind of conversion is switched off right now.",
            "Please try again later or contact support.",
            true,
            Severity::Transient,
        ),

        WandelwerkError::Storage(_) | WandelwerkError::Database(_) => HumanError::new(
            "We couldn't save or load your file.",
            "Try again. If this keeps happening, the storage may be full.",
            true,
            Severity::Transient,
        ),

        WandelwerkError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError::new(
                    "The file couldn't be found.",
                    "It may have been moved or deleted. Try uploading it again.",
                    false,
                    Severity::ActionRequired,
                )
            } else {
                HumanError::new(
                    "There was a problem reading or writing a file.",
                    "Try again. If this keeps happening, the storage may be full.",
                    true,
                    Severity::Transient,
                )
            }
        }

        WandelwerkError::InvalidTransition { .. }
        | WandelwerkError::UnknownJob(_)
        | WandelwerkError::JobAlreadyClaimed(_)
        | WandelwerkError::Serialization(_)
        | WandelwerkError::Config(_) => HumanError::new(
            "Something went wrong on our side.",
            "Try again. If this keeps happening, please report it.",
            true,
            Severity::Transient,
        ),
    }
}
