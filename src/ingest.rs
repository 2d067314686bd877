//! The ingestion entry point.
//!
//! [`Ingestor`] owns the three consumed capabilities (OCR engine,
//! categorizer, receipt store) plus configuration, and drives one upload at a
//! time through the pipeline:
//!
//! ```text
//! Validating ─▶ Storing ─▶ Recognizing ─▶ Extracting ─▶ CleaningUp ─▶ Assembled ─▶ store
//! ```
//!
//! Independent calls to [`Ingestor::ingest`] share nothing mutable and may run
//! concurrently. Only rejection, scratch I/O and persistence failures come
//! back as `Err`; OCR and categorization trouble degrades the result instead.

use crate::config::IngestConfig;
use crate::error::{IngestError, RejectionReason, StageError};
use crate::events::{EventSink, NoopEventSink};
use crate::output::{ExtractionResult, IngestReport, IngestState, IngestStats, UploadedFile};
use crate::pipeline::extract::{self, ExtractOptions};
use crate::pipeline::llm::{Categorizer, LlmCategorizer};
use crate::pipeline::normalize;
use crate::pipeline::ocr::{self, OcrEngine, TesseractCli};
use crate::pipeline::scratch::ScratchStorage;
use crate::pipeline::validate::{self, MediaType};
use crate::store::ReceiptStore;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

static SHARED: OnceCell<Arc<Ingestor>> = OnceCell::new();

/// Drives uploads through validation, OCR, extraction and persistence.
pub struct Ingestor {
    config: IngestConfig,
    scratch: ScratchStorage,
    ocr: Arc<dyn OcrEngine>,
    categorizer: Arc<dyn Categorizer>,
    store: Arc<dyn ReceiptStore>,
    events: EventSink,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("config", &self.config)
            .field("scratch", &self.scratch)
            .finish_non_exhaustive()
    }
}

impl Ingestor {
    /// Assemble an ingestor from explicit capabilities.
    pub fn new(
        config: IngestConfig,
        ocr: Arc<dyn OcrEngine>,
        categorizer: Arc<dyn Categorizer>,
        store: Arc<dyn ReceiptStore>,
    ) -> Self {
        let scratch = ScratchStorage::new(config.scratch_dir.clone());
        let events = config
            .event_sink
            .clone()
            .unwrap_or_else(|| Arc::new(NoopEventSink));
        Self {
            config,
            scratch,
            ocr,
            categorizer,
            store,
            events,
        }
    }

    /// Use the `tesseract` executable and an `edgequake-llm` provider
    /// resolved from `config`.
    ///
    /// # Errors
    /// [`IngestError::ProviderNotConfigured`] when no provider can be built.
    pub fn from_config(
        config: IngestConfig,
        store: Arc<dyn ReceiptStore>,
    ) -> Result<Self, IngestError> {
        let categorizer = LlmCategorizer::from_config(&config)?;
        Ok(Self::new(
            config,
            Arc::new(TesseractCli::new()),
            Arc::new(categorizer),
            store,
        ))
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Make this ingestor the process-wide handle returned by [`Ingestor::shared`].
    ///
    /// Can be done once; a second call fails with [`IngestError::InvalidConfig`].
    pub fn install(self) -> Result<Arc<Self>, IngestError> {
        let handle = Arc::new(self);
        SHARED.set(Arc::clone(&handle)).map_err(|_| {
            IngestError::InvalidConfig("a shared Ingestor is already installed".to_string())
        })?;
        info!("Shared ingestor installed");
        Ok(handle)
    }

    /// The handle stored by [`Ingestor::install`], if any.
    pub fn shared() -> Option<Arc<Self>> {
        SHARED.get().cloned()
    }

    /// Ingest one upload on behalf of `caller`.
    ///
    /// `None` stands for a request that carried no file.
    ///
    /// # Returns
    /// `Ok(IngestReport)` whenever the receipt was saved, including degraded
    /// results with no items (check [`IngestReport::is_degraded`]). An
    /// unwritable scratch area is one such degradation.
    ///
    /// # Errors
    /// - [`IngestError::Rejected`]: missing file, disallowed type or too large.
    ///   Nothing was written to disk.
    /// - [`IngestError::PersistenceFailed`]: the store refused the receipt.
    pub async fn ingest(
        &self,
        upload: Option<&UploadedFile>,
        caller: &str,
    ) -> Result<IngestReport, IngestError> {
        let file = upload.map(UploadedFile::original_name).unwrap_or("");
        let span = info_span!("ingest", caller = %caller, file = %file);
        self.run(upload, caller).instrument(span).await
    }

    async fn run(
        &self,
        upload: Option<&UploadedFile>,
        caller: &str,
    ) -> Result<IngestReport, IngestError> {
        let total_start = Instant::now();
        let events = self.events.as_ref();

        // ── Step 1: Validate ─────────────────────────────────────────────
        events.on_state(caller, IngestState::Validating);
        let (upload, media) = match admit(upload) {
            Ok(admitted) => admitted,
            Err(reason) => {
                info!("Upload rejected: {}", reason);
                events.on_state(caller, IngestState::Rejected);
                return Err(reason.into());
            }
        };
        info!(
            "Accepted {} upload ({} bytes)",
            media,
            upload.bytes().len()
        );

        // ── Step 2: Recognise + extract (images only) ────────────────────
        let mut stats = IngestStats::default();
        let mut degradations = Vec::new();
        let result = if media.is_image() {
            self.process_image(upload, media, caller, &mut stats, &mut degradations)
                .await
        } else {
            debug!("PDF upload; OCR and extraction skipped");
            ExtractionResult::empty()
        };
        events.on_state(caller, IngestState::Assembled);

        // ── Step 3: Persist ──────────────────────────────────────────────
        let record_id = self
            .store
            .save_receipt(caller, &result.items, result.raw_text.as_deref())
            .await
            .map_err(|e| {
                warn!("Receipt store failed: {}", e);
                IngestError::PersistenceFailed {
                    message: e.to_string(),
                }
            })?;

        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
        info!(
            "Receipt {} saved: {} items, {} degradations, {}ms",
            record_id,
            result.items.len(),
            degradations.len(),
            stats.total_duration_ms
        );

        Ok(IngestReport {
            record_id,
            result,
            degradations,
            stats,
        })
    }

    /// Scratch file → OCR → normalise → extract → release.
    ///
    /// The artifact is released on every path out of here: explicitly at the
    /// end, or by its `Drop` if this future is abandoned.
    async fn process_image(
        &self,
        upload: &UploadedFile,
        media: MediaType,
        caller: &str,
        stats: &mut IngestStats,
        degradations: &mut Vec<StageError>,
    ) -> ExtractionResult {
        let events = self.events.as_ref();

        events.on_state(caller, IngestState::Storing);
        let artifact = match self
            .scratch
            .acquire(upload.bytes(), caller, upload.original_name(), media)
            .await
        {
            Ok(artifact) => artifact,
            Err(e) => {
                let error = StageError::ScratchUnavailable {
                    detail: e.to_string(),
                };
                self.degrade(caller, error, degradations);
                return ExtractionResult::empty();
            }
        };

        events.on_state(caller, IngestState::Recognizing);
        let ocr_start = Instant::now();
        let recognized = ocr::recognize(
            &self.ocr,
            artifact.path(),
            &self.config.ocr_language,
            self.config.ocr_timeout_secs,
            events,
        )
        .await;
        stats.ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;

        let result = match recognized {
            Err(e) => {
                self.degrade(caller, e, degradations);
                ExtractionResult::empty()
            }
            Ok(text) => {
                let lines = normalize::normalize(&text);
                stats.candidate_lines = lines.len();
                debug!("{} candidate lines", lines.len());

                events.on_state(caller, IngestState::Extracting);
                let extract_start = Instant::now();
                let report =
                    extract::extract(&self.categorizer, &lines, self.extract_options(), events)
                        .await;
                stats.extract_duration_ms = extract_start.elapsed().as_millis() as u64;
                stats.received_items = report.received;
                stats.dropped_items = report.dropped();

                if let Some(e) = report.degradation {
                    self.degrade(caller, e, degradations);
                }
                let raw_text = if text.is_empty() {
                    None
                } else {
                    Some(text)
                };
                ExtractionResult {
                    raw_text,
                    items: report.items,
                }
            }
        };

        events.on_state(caller, IngestState::CleaningUp);
        artifact.release(events);
        result
    }

    fn extract_options(&self) -> ExtractOptions<'_> {
        ExtractOptions {
            system_prompt: self.config.system_prompt.as_deref(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            timeout_secs: self.config.categorize_timeout_secs,
        }
    }

    fn degrade(&self, caller: &str, error: StageError, degradations: &mut Vec<StageError>) {
        warn!("{} stage degraded: {}", error.stage(), error);
        self.events.on_degraded(caller, &error);
        degradations.push(error);
    }
}

/// Presence, type and size checks. No side effects.
fn admit(upload: Option<&UploadedFile>) -> Result<(&UploadedFile, MediaType), RejectionReason> {
    let upload = upload.ok_or(RejectionReason::NoFileProvided)?;
    let media = validate::validate(upload)?;
    Ok((upload, media))
}
