//! Event-sink trait for per-ingestion pipeline events.
//!
//! Inject an [`Arc<dyn IngestEventSink>`] via
//! [`crate::config::IngestConfigBuilder::event_sink`] to receive structured
//! events as each upload moves through the pipeline. The pipeline also logs
//! through `tracing`; the sink is for hosts that want the same facts as data
//! (metrics counters, a progress bar, an audit table) without parsing logs.
//!
//! Events are advisory. Nothing a sink does can change the outcome of an
//! ingestion.
//!
//! # Example
//!
//! ```rust
//! use receiptly::{IngestConfig, IngestEventSink, StageError};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct DegradationCounter {
//!     count: AtomicUsize,
//! }
//!
//! impl IngestEventSink for DegradationCounter {
//!     fn on_degraded(&self, _caller: &str, error: &StageError) {
//!         self.count.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("degraded: {error}");
//!     }
//! }
//!
//! let sink = Arc::new(DegradationCounter { count: AtomicUsize::new(0) });
//!
//! let config = IngestConfig::builder()
//!     .event_sink(sink as Arc<dyn IngestEventSink>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

use crate::error::StageError;
use crate::output::IngestState;

/// Receives pipeline events.
///
/// Implementations must be `Send + Sync`: independent ingestions run
/// concurrently and share one sink. All methods have default no-op
/// implementations so callers only override what they care about.
pub trait IngestEventSink: Send + Sync {
    /// Called on every state transition, including the terminal one.
    ///
    /// # Arguments
    /// * `caller` — identity the upload belongs to
    /// * `state`  — the state just entered
    fn on_state(&self, caller: &str, state: IngestState) {
        let _ = (caller, state);
    }

    /// Called by OCR engines as recognition advances.
    ///
    /// # Arguments
    /// * `status`   — engine-specific phase, e.g. `"recognizing text"`
    /// * `progress` — 0.0–1.0
    fn on_ocr_progress(&self, status: &str, progress: f32) {
        let _ = (status, progress);
    }

    /// Called when OCR or extraction falls back to a reduced result.
    fn on_degraded(&self, caller: &str, error: &StageError) {
        let _ = (caller, error);
    }

    /// Called after the categorizer's answer has been validated.
    ///
    /// # Arguments
    /// * `received` — array elements in the response
    /// * `kept`     — elements that passed field-by-field validation
    fn on_items_filtered(&self, received: usize, kept: usize) {
        let _ = (received, kept);
    }

    /// Called when a scratch file could not be deleted.
    fn on_cleanup_failed(&self, path: &Path, error: &str) {
        let _ = (path, error);
    }
}

/// A no-op implementation for callers that don't need events.
///
/// This is the default when no sink is configured.
pub struct NoopEventSink;

impl IngestEventSink for NoopEventSink {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type EventSink = Arc<dyn IngestEventSink>;
