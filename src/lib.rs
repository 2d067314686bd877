//! # receiptly
//!
//! Turn a photographed grocery receipt into a list of categorised food items.
//!
//! An upload is validated, written to a short-lived scratch file, read by an
//! OCR engine, cut down to a handful of candidate lines, and handed to a text
//! model that names the food items and labels each one `"fresh food"` or
//! `"processed food"`. The model's answer is untrusted: every element is
//! checked on its own and bad ones are dropped.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Validate   type (JPEG / PNG / PDF) and size (≤ 10 MiB)
//!  ├─ 2. Scratch    bytes → unique temp file (images only)
//!  ├─ 3. OCR        tesseract → raw text          ┐ best effort:
//!  ├─ 4. Normalize  trim, drop blanks, ≤ 50 lines │ failures yield
//!  ├─ 5. Extract    LLM → JSON → validated items  ┘ an empty list
//!  ├─ 6. Clean up   scratch file deleted
//!  └─ 7. Persist    (items, raw text) → receipt store
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use receiptly::{IngestConfig, Ingestor, MemoryReceiptStore, UploadedFile};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = IngestConfig::default();
//!     let ingestor = Ingestor::from_config(config, Arc::new(MemoryReceiptStore::new()))?;
//!
//!     let bytes = std::fs::read("receipt.jpg")?;
//!     let upload = UploadedFile::new(bytes, "image/jpeg", "receipt.jpg");
//!     let report = ingestor.ingest(Some(&upload), "user-42").await?;
//!
//!     for item in &report.result.items {
//!         println!("{} ({})", item.name, item.category);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature     | Default | Description |
//! |-------------|---------|-------------|
//! | `cli`       | on      | Enables the `receiptly` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `tesseract` | off     | In-process OCR via libtesseract (`LeptessEngine`) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! receiptly = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod events;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IngestConfig, IngestConfigBuilder};
pub use error::{IngestError, RejectionReason, StageError};
pub use events::{EventSink, IngestEventSink, NoopEventSink};
pub use ingest::Ingestor;
pub use output::{
    ExtractionResult, FoodCategory, FoodItem, IngestReport, IngestState, IngestStats, RecordId,
    Stage, UploadResponse, UploadedFile,
};
pub use pipeline::llm::{Categorizer, CategorizerError, LlmCategorizer};
pub use pipeline::normalize::MAX_CANDIDATE_LINES;
#[cfg(feature = "tesseract")]
pub use pipeline::ocr::LeptessEngine;
pub use pipeline::ocr::{OcrEngine, OcrError, TesseractCli};
pub use pipeline::validate::{MediaType, MAX_FILE_SIZE};
pub use store::{MemoryReceiptStore, ReceiptStore, StoreError, StoredReceipt};
