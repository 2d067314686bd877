//! Data model: uploads going in, receipts coming out.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StageError;

/// An uploaded file exactly as the transport layer received it.
///
/// Immutable once built; the orchestrator owns it for the length of one
/// request and never persists it as-is.
#[derive(Clone)]
pub struct UploadedFile {
    bytes: Vec<u8>,
    declared_type: String,
    declared_size: u64,
    original_name: String,
}

impl UploadedFile {
    /// Build an upload whose declared size is the payload length.
    pub fn new(
        bytes: Vec<u8>,
        declared_type: impl Into<String>,
        original_name: impl Into<String>,
    ) -> Self {
        let declared_size = bytes.len() as u64;
        Self {
            bytes,
            declared_type: declared_type.into(),
            declared_size,
            original_name: original_name.into(),
        }
    }

    /// Override the size the client claimed (multipart `Content-Length` etc.).
    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = size;
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("declared_type", &self.declared_type)
            .field("declared_size", &self.declared_size)
            .field("original_name", &self.original_name)
            .finish()
    }
}

/// One of the two legal food categories.
///
/// Serialised as the labels the categorizer is instructed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FoodCategory {
    /// Fruit, vegetables, raw meat, fish, dairy, bread, eggs.
    #[serde(rename = "fresh food")]
    Fresh,
    /// Canned goods, snacks, ready meals, packaged, frozen, cereal.
    #[serde(rename = "processed food")]
    Processed,
}

impl FoodCategory {
    pub const ALL: [FoodCategory; 2] = [FoodCategory::Fresh, FoodCategory::Processed];

    /// The exact label used on the wire.
    pub fn label(self) -> &'static str {
        match self {
            FoodCategory::Fresh => "fresh food",
            FoodCategory::Processed => "processed food",
        }
    }

    /// Parse an exact wire label. Anything else is not a category.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }
}

impl fmt::Display for FoodCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single categorized grocery item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodItem {
    pub name: String,
    pub category: FoodCategory,
}

impl FoodItem {
    pub fn new(name: impl Into<String>, category: FoodCategory) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }
}

/// The pipeline's terminal artifact, handed to the receipt store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Raw OCR output; `None` when OCR was skipped, failed, or read nothing.
    pub raw_text: Option<String>,
    pub items: Vec<FoodItem>,
}

impl ExtractionResult {
    /// No text, no items: the outcome for PDFs and failed OCR.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Identifier assigned by the receipt store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two best-effort stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ocr,
    Extraction,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Ocr => write!(f, "ocr"),
            Stage::Extraction => write!(f, "extraction"),
        }
    }
}

/// Where a single ingestion currently is.
///
/// ```text
/// Validating ─▶ Storing ─▶ Recognizing ─▶ Extracting ─▶ CleaningUp ─▶ Assembled
///     │            (images only, PDFs jump straight to Assembled)
///     └──▶ Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    Validating,
    Storing,
    Recognizing,
    Extracting,
    CleaningUp,
    Assembled,
    Rejected,
}

impl IngestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, IngestState::Assembled | IngestState::Rejected)
    }
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IngestState::Validating => "validating",
            IngestState::Storing => "storing",
            IngestState::Recognizing => "recognizing",
            IngestState::Extracting => "extracting",
            IngestState::CleaningUp => "cleaning_up",
            IngestState::Assembled => "assembled",
            IngestState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Per-ingestion counters and timings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Cleaned lines sent to the categorizer (≤ 50).
    pub candidate_lines: usize,
    /// Array elements the categorizer returned.
    pub received_items: usize,
    /// Elements dropped by validation.
    pub dropped_items: usize,
    pub ocr_duration_ms: u64,
    pub extract_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything one successful ingestion produced.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub record_id: RecordId,
    pub result: ExtractionResult,
    /// Best-effort failures along the way. Internal detail, never serialised.
    #[serde(skip)]
    pub degradations: Vec<StageError>,
    pub stats: IngestStats,
}

impl IngestReport {
    /// True when OCR or extraction fell back to a reduced result.
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    /// The body a transport layer returns to the uploader.
    pub fn response(&self) -> UploadResponse {
        UploadResponse {
            success: true,
            receipt_id: self.record_id.clone(),
            items: self.result.items.clone(),
        }
    }
}

/// User-facing success payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub receipt_id: RecordId,
    pub items: Vec<FoodItem>,
}
