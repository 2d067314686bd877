//! Scratch storage: a short-lived on-disk copy of an upload for the OCR engine.
//!
//! OCR engines want a file path, not a byte buffer. Each image upload is
//! written to its own uniquely named file inside one shared scratch
//! directory and deleted again once OCR has finished with it.
//!
//! ## Lifetime
//!
//! A [`ScratchArtifact`] is released exactly once:
//!
//! - explicitly, via [`ScratchArtifact::release`], which logs (and reports)
//!   a failed delete instead of returning it; or
//! - implicitly, when it is dropped without being released, e.g. because
//!   the ingestion future was cancelled mid-flight. The backing
//!   [`tempfile::TempPath`] removes the file on drop.
//!
//! ## Naming
//!
//! `receipt_<caller>_<unix millis>_<random>.<ext>`. The random part and
//! create-new semantics keep two concurrent uploads from the same caller in
//! the same millisecond apart.

use crate::error::IngestError;
use crate::events::IngestEventSink;
use crate::pipeline::validate::MediaType;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};

/// Longest caller fragment kept in a scratch file name.
const MAX_CALLER_CHARS: usize = 64;

/// Owns the scratch directory.
#[derive(Debug, Clone)]
pub struct ScratchStorage {
    dir: PathBuf,
}

impl ScratchStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the scratch directory (and parents) if missing.
    ///
    /// Idempotent and safe to race: `create_dir_all` treats "already exists"
    /// as success.
    pub async fn ensure_dir(&self) -> Result<(), IngestError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| IngestError::ScratchUnavailable {
                path: self.dir.clone(),
                source: e,
            })
    }

    /// Write `bytes` to a fresh scratch file.
    ///
    /// # Arguments
    /// * `bytes`         — upload payload
    /// * `caller`        — identity the upload belongs to (sanitised into the name)
    /// * `original_name` — client-side file name, used for the extension
    /// * `media`         — validated media type, fallback for the extension
    pub async fn acquire(
        &self,
        bytes: &[u8],
        caller: &str,
        original_name: &str,
        media: MediaType,
    ) -> Result<ScratchArtifact, IngestError> {
        self.ensure_dir().await?;

        let prefix = format!(
            "receipt_{}_{}_",
            sanitize_caller(caller),
            chrono::Utc::now().timestamp_millis()
        );
        let suffix = format!(".{}", scratch_extension(original_name, media));

        let scratch_err = |e: std::io::Error| IngestError::ScratchUnavailable {
            path: self.dir.clone(),
            source: e,
        };

        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .rand_bytes(8)
            .tempfile_in(&self.dir)
            .map_err(scratch_err)?;
        file.write_all(bytes).map_err(scratch_err)?;
        file.flush().map_err(scratch_err)?;

        let path = file.into_temp_path();
        debug!("Scratch file written: {} ({} bytes)", path.display(), bytes.len());

        Ok(ScratchArtifact { path })
    }
}

/// A scratch copy of one upload. Deleted on release or drop, whichever
/// comes first.
#[derive(Debug)]
pub struct ScratchArtifact {
    path: TempPath,
}

impl ScratchArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the scratch file.
    ///
    /// A failed delete is logged and reported to `events`, never returned:
    /// a stray file must not fail the upload.
    pub fn release(self, events: &dyn IngestEventSink) {
        let released = self.path.to_path_buf();
        match self.path.close() {
            Ok(()) => debug!("Scratch file deleted: {}", released.display()),
            Err(e) => {
                warn!("Failed to delete scratch file {}: {}", released.display(), e);
                events.on_cleanup_failed(&released, &e.to_string());
            }
        }
    }
}

/// Reduce a caller identity to characters that are safe in a file name.
fn sanitize_caller(caller: &str) -> String {
    let cleaned: String = caller
        .chars()
        .take(MAX_CALLER_CHARS)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}

/// Extension from the original name when it looks sane, else the media
/// type's canonical one.
fn scratch_extension(original_name: &str, media: MediaType) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| media.extension().to_string())
}
