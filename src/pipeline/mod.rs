//! Pipeline stages for receipt ingestion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and backed by a different capability without touching
//! the others.
//!
//! ## Data Flow
//!
//! ```text
//! validate ──▶ scratch ──▶ ocr ──▶ normalize ──▶ extract ──▶ (store)
//! (type/size)  (temp file) (text)  (≤50 lines)   (LLM + filter)
//! ```
//!
//! 1. [`validate`]  — admit or reject the upload; touches nothing on disk
//! 2. [`scratch`]   — write image bytes to a uniquely named scratch file that
//!    is deleted on release or drop
//! 3. [`ocr`]       — run the OCR engine with a timeout; failures degrade
//! 4. [`normalize`] — trim, drop blank lines, cap at 50 candidate lines
//! 5. [`extract`]   — ask the categorizer ([`llm`]) and validate its answer
//!    element by element
//!
//! PDFs stop after step 1.

pub mod extract;
pub mod llm;
pub mod normalize;
pub mod ocr;
pub mod scratch;
pub mod validate;
