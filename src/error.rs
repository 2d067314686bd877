//! Error types for the receiptly library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`IngestError`] — **Fatal**: the upload is rejected before any resource
//!   is acquired, or the finished receipt cannot be saved. Returned as
//!   `Err(IngestError)` from [`crate::ingest::Ingestor::ingest`].
//!
//! * [`StageError`] — **Non-fatal**: the scratch copy could not be written,
//!   OCR or categorization failed, or the categorizer answered with something
//!   unusable. The request still
//!   completes with fewer (or no) items; the reason is recorded in
//!   [`crate::output::IngestReport::degradations`] and reported to the
//!   event sink, never to the end user.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::validate::MAX_FILE_SIZE;

/// All fatal errors returned by the receiptly library.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Rejection class (pre-resource) ────────────────────────────────────
    /// The upload failed validation; nothing was written to disk.
    #[error("{0}")]
    Rejected(RejectionReason),

    // ── Scratch storage ───────────────────────────────────────────────────
    /// The scratch directory or file could not be created or written.
    ///
    /// Returned by [`crate::pipeline::scratch::ScratchStorage`]; the ingest
    /// pipeline turns it into [`StageError::ScratchUnavailable`].
    #[error("Failed to write scratch file under '{path}': {source}")]
    ScratchUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Persistence class (post-processing) ───────────────────────────────
    /// The receipt store refused or failed the write.
    #[error("Failed to save receipt record: {message}")]
    PersistenceFailed { message: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured categorization provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },
}

impl IngestError {
    /// The rejection reason, if this error is a validation rejection.
    pub fn rejection(&self) -> Option<&RejectionReason> {
        match self {
            IngestError::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<RejectionReason> for IngestError {
    fn from(reason: RejectionReason) -> Self {
        IngestError::Rejected(reason)
    }
}

/// Why an upload was refused at the door.
///
/// The display strings are shown to end users as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RejectionReason {
    #[error("No file provided")]
    NoFileProvided,

    #[error("Invalid file type. Only images (JPG, PNG) and PDFs are allowed.")]
    InvalidType { declared: String },

    #[error("File too large. Maximum size is {}MB.", MAX_FILE_SIZE / (1024 * 1024))]
    TooLarge { size: u64, limit: u64 },
}

/// A non-fatal failure inside the OCR or extraction stage.
///
/// Keeping the sub-reasons apart lets operators tell "categorizer
/// unreachable" from "categorizer returned garbage" even though the caller
/// sees the same empty item list in both cases.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StageError {
    /// The upload could not be copied to scratch storage, so OCR never ran.
    #[error("Scratch storage unavailable: {detail}")]
    ScratchUnavailable { detail: String },

    /// The OCR engine could not read the image.
    #[error("OCR failed: {detail}")]
    OcrFailed { detail: String },

    /// The OCR engine did not answer in time.
    #[error("OCR timed out after {secs}s")]
    OcrTimeout { secs: u64 },

    /// The categorization call itself failed (network, auth, provider error).
    #[error("Categorizer unavailable: {detail}")]
    CategorizerUnavailable { detail: String },

    /// The categorization call did not answer in time.
    #[error("Categorizer timed out after {secs}s")]
    CategorizerTimeout { secs: u64 },

    /// The categorizer answered with no text at all.
    #[error("Categorizer returned an empty response")]
    EmptyResponse,

    /// The categorizer's answer was not valid JSON.
    #[error("Categorizer response is not valid JSON: {detail}")]
    MalformedResponse { detail: String },

    /// The categorizer's answer was JSON, but not an array.
    #[error("Categorizer response is not an array (got {found})")]
    NotAnArray { found: String },
}

impl StageError {
    /// The stage this error belongs to.
    pub fn stage(&self) -> crate::output::Stage {
        use crate::output::Stage;
        match self {
            StageError::ScratchUnavailable { .. }
            | StageError::OcrFailed { .. }
            | StageError::OcrTimeout { .. } => Stage::Ocr,
            _ => Stage::Extraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Stage;

    #[test]
    fn rejection_messages_are_user_facing() {
        let e = IngestError::from(RejectionReason::InvalidType {
            declared: "text/plain".into(),
        });
        assert_eq!(
            e.to_string(),
            "Invalid file type. Only images (JPG, PNG) and PDFs are allowed."
        );

        let e = IngestError::from(RejectionReason::TooLarge {
            size: 11 * 1024 * 1024,
            limit: MAX_FILE_SIZE,
        });
        assert_eq!(e.to_string(), "File too large. Maximum size is 10MB.");
    }

    #[test]
    fn rejection_accessor() {
        let e = IngestError::Rejected(RejectionReason::NoFileProvided);
        assert_eq!(e.rejection(), Some(&RejectionReason::NoFileProvided));

        let e = IngestError::PersistenceFailed {
            message: "db down".into(),
        };
        assert!(e.rejection().is_none());
    }

    #[test]
    fn persistence_display_carries_store_message() {
        let e = IngestError::PersistenceFailed {
            message: "duplicate key".into(),
        };
        assert!(e.to_string().contains("duplicate key"), "got: {e}");
    }

    #[test]
    fn stage_error_maps_to_stage() {
        assert_eq!(
            StageError::OcrFailed {
                detail: "x".into()
            }
            .stage(),
            Stage::Ocr
        );
        assert_eq!(StageError::OcrTimeout { secs: 3 }.stage(), Stage::Ocr);
        assert_eq!(
            StageError::ScratchUnavailable {
                detail: "disk full".into()
            }
            .stage(),
            Stage::Ocr
        );
        assert_eq!(StageError::EmptyResponse.stage(), Stage::Extraction);
        assert_eq!(
            StageError::NotAnArray {
                found: "object".into()
            }
            .stage(),
            Stage::Extraction
        );
    }

    #[test]
    fn categorizer_timeout_display() {
        let e = StageError::CategorizerTimeout { secs: 60 };
        assert!(e.to_string().contains("60s"));
    }
}
