//! OCR: scratch file → raw text.
//!
//! The pipeline consumes an existing OCR capability through [`OcrEngine`].
//! Two engines ship with the crate:
//!
//! - [`TesseractCli`] runs the `tesseract` executable. No native linking,
//!   works wherever Tesseract is installed.
//! - `LeptessEngine` (feature `tesseract`) calls libtesseract in-process.
//!
//! [`recognize`] wraps an engine call with the stage timeout and turns every
//! failure into a [`StageError`]; OCR never fails a request.

use crate::error::StageError;
use crate::events::IngestEventSink;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("OCR engine not available: {0}")]
    NotAvailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstraction over an OCR backend.
///
/// Implementations read the image at `path` and return the recognised text.
/// They may report progress to `events`; those calls are advisory.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(
        &self,
        path: &Path,
        language: &str,
        events: &dyn IngestEventSink,
    ) -> Result<String, OcrError>;
}

/// Run the OCR stage for one scratch file.
pub async fn recognize(
    engine: &Arc<dyn OcrEngine>,
    path: &Path,
    language: &str,
    timeout_secs: u64,
    events: &dyn IngestEventSink,
) -> Result<String, StageError> {
    let call = engine.recognize(path, language, events);
    match tokio::time::timeout(Duration::from_secs(timeout_secs), call).await {
        Ok(Ok(text)) => {
            debug!("OCR produced {} chars", text.len());
            Ok(text)
        }
        Ok(Err(e)) => {
            warn!("OCR failed for {}: {}", path.display(), e);
            Err(StageError::OcrFailed {
                detail: e.to_string(),
            })
        }
        Err(_) => {
            warn!("OCR timed out after {}s for {}", timeout_secs, path.display());
            Err(StageError::OcrTimeout { secs: timeout_secs })
        }
    }
}

/// Check the file decodes as a PNG/JPEG header before paying for OCR.
async fn probe_image(path: &Path) -> Result<(u32, u32), OcrError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || image::image_dimensions(&path))
        .await
        .map_err(|e| OcrError::Engine(format!("image probe task failed: {e}")))?
        .map_err(|e| OcrError::ImageDecode(e.to_string()))
}

// ── Tesseract executable ──────────────────────────────────────────────────────

/// Runs `tesseract <image> stdout -l <lang>`.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
}

impl TesseractCli {
    /// Use the `tesseract` found on `PATH`.
    pub fn new() -> Self {
        Self::with_binary("tesseract")
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(
        &self,
        path: &Path,
        language: &str,
        events: &dyn IngestEventSink,
    ) -> Result<String, OcrError> {
        events.on_ocr_progress("loading image", 0.0);
        let (width, height) = probe_image(path).await?;
        debug!("OCR input {}x{} px", width, height);

        events.on_ocr_progress("recognizing text", 0.1);
        let output = tokio::process::Command::new(&self.binary)
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => OcrError::NotAvailable(format!(
                    "'{}' not found; install Tesseract or build with the `tesseract` feature",
                    self.binary.display()
                )),
                _ => OcrError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        events.on_ocr_progress("done", 1.0);
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ── libtesseract (optional, gated behind `tesseract` feature) ────────────────

#[cfg(feature = "tesseract")]
pub use leptess_backend::LeptessEngine;

#[cfg(feature = "tesseract")]
mod leptess_backend {
    use super::{probe_image, IngestEventSink, OcrEngine, OcrError};
    use async_trait::async_trait;
    use leptess::LepTess;
    use std::path::Path;

    /// In-process Tesseract via `leptess`. Runs on the blocking pool.
    #[derive(Debug, Clone, Default)]
    pub struct LeptessEngine {
        data_path: Option<String>,
    }

    impl LeptessEngine {
        pub fn new(data_path: Option<String>) -> Self {
            Self { data_path }
        }
    }

    #[async_trait]
    impl OcrEngine for LeptessEngine {
        async fn recognize(
            &self,
            path: &Path,
            language: &str,
            events: &dyn IngestEventSink,
        ) -> Result<String, OcrError> {
            events.on_ocr_progress("loading image", 0.0);
            probe_image(path).await?;

            events.on_ocr_progress("recognizing text", 0.1);
            let data_path = self.data_path.clone();
            let language = language.to_string();
            let path = path.to_path_buf();
            let text = tokio::task::spawn_blocking(move || {
                let mut lt = LepTess::new(data_path.as_deref(), &language)
                    .map_err(|e| OcrError::Engine(e.to_string()))?;
                lt.set_image(&path)
                    .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
                lt.get_utf8_text()
                    .map_err(|e| OcrError::Engine(e.to_string()))
            })
            .await
            .map_err(|e| OcrError::Engine(format!("OCR task failed: {e}")))??;

            events.on_ocr_progress("done", 1.0);
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventSink;
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
    use std::sync::Mutex;

    fn write_tiny_png(dir: &Path) -> PathBuf {
        let img: GrayImage = ImageBuffer::from_fn(4, 4, |_, _| Luma([200u8]));
        let path = dir.join("tiny.png");
        DynamicImage::ImageLuma8(img)
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        path
    }

    struct FixedText(&'static str);

    #[async_trait]
    impl OcrEngine for FixedText {
        async fn recognize(
            &self,
            _path: &Path,
            _language: &str,
            events: &dyn IngestEventSink,
        ) -> Result<String, OcrError> {
            events.on_ocr_progress("done", 1.0);
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl OcrEngine for Failing {
        async fn recognize(
            &self,
            _path: &Path,
            _language: &str,
            _events: &dyn IngestEventSink,
        ) -> Result<String, OcrError> {
            Err(OcrError::Engine("leptonica: pixRead failed".into()))
        }
    }

    struct Hanging;

    #[async_trait]
    impl OcrEngine for Hanging {
        async fn recognize(
            &self,
            _path: &Path,
            _language: &str,
            _events: &dyn IngestEventSink,
        ) -> Result<String, OcrError> {
            std::future::pending().await
        }
    }

    #[derive(Default)]
    struct ProgressLog(Mutex<Vec<(String, f32)>>);

    impl IngestEventSink for ProgressLog {
        fn on_ocr_progress(&self, status: &str, progress: f32) {
            self.0.lock().unwrap().push((status.to_string(), progress));
        }
    }

    #[tokio::test]
    async fn stage_passes_text_and_progress_through() {
        let engine: Arc<dyn OcrEngine> = Arc::new(FixedText("MILK 1.45"));
        let log = ProgressLog::default();
        let text = recognize(&engine, Path::new("/unused"), "eng", 5, &log)
            .await
            .unwrap();
        assert_eq!(text, "MILK 1.45");
        assert_eq!(log.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stage_maps_engine_error() {
        let engine: Arc<dyn OcrEngine> = Arc::new(Failing);
        let err = recognize(&engine, Path::new("/unused"), "eng", 5, &NoopEventSink)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::OcrFailed { ref detail } if detail.contains("pixRead")));
    }

    #[tokio::test(start_paused = true)]
    async fn stage_times_out() {
        let engine: Arc<dyn OcrEngine> = Arc::new(Hanging);
        let err = recognize(&engine, Path::new("/unused"), "eng", 3, &NoopEventSink)
            .await
            .unwrap_err();
        assert_eq!(err, StageError::OcrTimeout { secs: 3 });
    }

    #[tokio::test]
    async fn tesseract_cli_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let err = TesseractCli::new()
            .recognize(&path, "eng", &NoopEventSink)
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::ImageDecode(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn tesseract_cli_reports_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tiny_png(dir.path());

        let log = ProgressLog::default();
        let err = TesseractCli::with_binary(dir.path().join("no-such-tesseract"))
            .recognize(&path, "eng", &log)
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::NotAvailable(_)), "got: {err:?}");
        assert_eq!(log.0.lock().unwrap()[0].0, "loading image");
    }
}
