//! Extraction: candidate lines → validated food items.
//!
//! The categorizer is a non-deterministic text model, so its answer is
//! untrusted input. It goes through three cheap, independent steps:
//!
//! 1. Strip a leading and a trailing code fence, each on its own (models add
//!    them despite being told not to, and sometimes only one of the pair).
//! 2. Parse as JSON and require a top-level array.
//! 3. Validate each element on its own: it must be an object with a string
//!    `name` and a string `category` that is exactly one of the two labels
//!    in [`FoodCategory`]. Bad elements are dropped one by one; the good ones
//!    survive.
//!
//! The stage never fails. Every problem becomes a [`StageError`] carried in
//! the [`ExtractionReport`] next to an empty (or shorter) item list.

use crate::error::StageError;
use crate::events::IngestEventSink;
use crate::output::{FoodCategory, FoodItem};
use crate::pipeline::llm::Categorizer;
use crate::prompts::{categorize_prompt, DEFAULT_SYSTEM_PROMPT};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Settings for one categorization call.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions<'a> {
    pub system_prompt: Option<&'a str>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

/// What the extraction stage produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub items: Vec<FoodItem>,
    /// Array elements the categorizer returned (0 when it returned no array).
    pub received: usize,
    /// Why the stage fell back to no items, if it did.
    pub degradation: Option<StageError>,
}

impl ExtractionReport {
    pub fn dropped(&self) -> usize {
        self.received - self.items.len()
    }

    fn degraded(error: StageError) -> Self {
        Self {
            items: Vec::new(),
            received: 0,
            degradation: Some(error),
        }
    }
}

/// Run the extraction stage over normalised lines.
///
/// Empty `lines` skips the remote call entirely.
pub async fn extract(
    categorizer: &Arc<dyn Categorizer>,
    lines: &[String],
    options: ExtractOptions<'_>,
    events: &dyn IngestEventSink,
) -> ExtractionReport {
    if lines.is_empty() {
        debug!("No candidate lines; skipping categorization");
        return ExtractionReport::default();
    }

    let system_prompt = options.system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let user_prompt = categorize_prompt(lines);

    let call = categorizer.complete(
        system_prompt,
        &user_prompt,
        options.temperature,
        options.max_tokens,
    );
    let raw = match tokio::time::timeout(Duration::from_secs(options.timeout_secs), call).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!("Categorizer call failed: {}", e);
            return ExtractionReport::degraded(StageError::CategorizerUnavailable {
                detail: e.to_string(),
            });
        }
        Err(_) => {
            warn!("Categorizer timed out after {}s", options.timeout_secs);
            return ExtractionReport::degraded(StageError::CategorizerTimeout {
                secs: options.timeout_secs,
            });
        }
    };
    debug!("Categorizer raw response: {}", raw);

    let report = match parse_response(&raw) {
        Ok((items, received)) => ExtractionReport {
            items,
            received,
            degradation: None,
        },
        Err(e) => {
            warn!("Discarding categorizer response: {}", e);
            ExtractionReport::degraded(e)
        }
    };

    if report.degradation.is_none() {
        if report.dropped() > 0 {
            info!(
                "Dropped {} of {} categorized items that failed validation",
                report.dropped(),
                report.received
            );
        }
        events.on_items_filtered(report.received, report.items.len());
    }
    info!(
        "Extracted {} food items from {} lines",
        report.items.len(),
        lines.len()
    );
    report
}

/// Parse and validate a raw categorizer answer.
///
/// Returns the kept items plus the number of array elements received.
pub fn parse_response(raw: &str) -> Result<(Vec<FoodItem>, usize), StageError> {
    let cleaned = strip_code_fence(raw);
    if cleaned.is_empty() {
        return Err(StageError::EmptyResponse);
    }

    let value: Value = serde_json::from_str(cleaned).map_err(|e| {
        StageError::MalformedResponse {
            detail: e.to_string(),
        }
    })?;

    let elements = match value {
        Value::Array(elements) => elements,
        other => {
            return Err(StageError::NotAnArray {
                found: json_kind(&other).to_string(),
            })
        }
    };

    let received = elements.len();
    let items = elements.iter().filter_map(validate_item).collect();
    Ok((items, received))
}

/// Validate one array element. `None` means "drop it".
fn validate_item(element: &Value) -> Option<FoodItem> {
    let object = element.as_object()?;
    let name = object.get("name")?.as_str()?.trim();
    let label = object.get("category")?.as_str()?;
    let category = FoodCategory::from_label(label)?;
    if name.is_empty() {
        return None;
    }
    Some(FoodItem::new(name, category))
}

// ── Code-fence stripping ──────────────────────────────────────────────────────

static RE_OPEN_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z]*[ \t]*\n?").unwrap());
static RE_CLOSE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n?[ \t]*```$").unwrap());

/// Drop a leading and a trailing fence independently; either may be missing.
fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(open) = RE_OPEN_FENCE.find(text) {
        text = &text[open.end()..];
    }
    if let Some(close) = RE_CLOSE_FENCE.find(text) {
        text = &text[..close.start()];
    }
    text.trim()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventSink;
    use crate::pipeline::llm::CategorizerError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        reply: Result<String, String>,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<String>>,
    }

    impl Scripted {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }

        fn err(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Categorizer for Scripted {
        async fn complete(
            &self,
            _system_prompt: &str,
            user_prompt: &str,
            _temperature: f32,
            _max_tokens: usize,
        ) -> Result<String, CategorizerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(user_prompt.to_string());
            self.reply.clone().map_err(CategorizerError)
        }
    }

    fn opts() -> ExtractOptions<'static> {
        ExtractOptions {
            system_prompt: None,
            temperature: 0.1,
            max_tokens: 800,
            timeout_secs: 5,
        }
    }

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    // ── parse_response ───────────────────────────────────────────────────

    #[test]
    fn invalid_category_is_dropped_individually() {
        let raw = r#"[{"name":"Bananas","category":"fresh food"},{"name":"Cola","category":"soda"}]"#;
        let (items, received) = parse_response(raw).unwrap();
        assert_eq!(received, 2);
        assert_eq!(items, vec![FoodItem::new("Bananas", FoodCategory::Fresh)]);
    }

    #[test]
    fn every_malformed_shape_is_dropped() {
        let raw = r#"[
            {"name":"Milk","category":"fresh food"},
            "Bread",
            42,
            null,
            ["Eggs", "fresh food"],
            {"name":"Crisps"},
            {"category":"processed food"},
            {"name":7,"category":"processed food"},
            {"name":"Beans","category":["processed food"]},
            {"name":"   ","category":"fresh food"},
            {"name":"Tuna","category":"Processed Food"},
            {"name":" Baked Beans ","category":"processed food","price":0.99}
        ]"#;
        let (items, received) = parse_response(raw).unwrap();
        assert_eq!(received, 12);
        assert_eq!(
            items,
            vec![
                FoodItem::new("Milk", FoodCategory::Fresh),
                FoodItem::new("Baked Beans", FoodCategory::Processed),
            ]
        );
    }

    #[test]
    fn fenced_response_is_unwrapped() {
        let raw = "```json\n[{\"name\":\"Eggs\",\"category\":\"fresh food\"}]\n```";
        let (items, _) = parse_response(raw).unwrap();
        assert_eq!(items, vec![FoodItem::new("Eggs", FoodCategory::Fresh)]);

        let raw = "  ```\n[]\n```  ";
        assert_eq!(parse_response(raw).unwrap(), (vec![], 0));
    }

    #[test]
    fn unbalanced_fences_are_stripped() {
        let milk = vec![FoodItem::new("Milk", FoodCategory::Fresh)];

        let opening_only = "```json\n[{\"name\":\"Milk\",\"category\":\"fresh food\"}]";
        assert_eq!(parse_response(opening_only).unwrap(), (milk.clone(), 1));

        let closing_only = "[{\"name\":\"Milk\",\"category\":\"fresh food\"}]\n```";
        assert_eq!(parse_response(closing_only).unwrap(), (milk, 1));
    }

    #[test]
    fn non_json_is_malformed() {
        let err = parse_response("Sure! Here are the items: Bananas, Cola").unwrap_err();
        assert!(matches!(err, StageError::MalformedResponse { .. }), "got: {err:?}");
    }

    #[test]
    fn non_array_is_rejected() {
        let err = parse_response(r#"{"items":[]}"#).unwrap_err();
        assert_eq!(
            err,
            StageError::NotAnArray {
                found: "object".into()
            }
        );
    }

    #[test]
    fn blank_response_is_empty() {
        assert_eq!(parse_response("  \n ").unwrap_err(), StageError::EmptyResponse);
        assert_eq!(parse_response("```json\n```").unwrap_err(), StageError::EmptyResponse);
    }

    #[test]
    fn order_is_preserved() {
        let raw = r#"[{"name":"C","category":"fresh food"},{"name":"A","category":"processed food"},{"name":"B","category":"fresh food"}]"#;
        let (items, _) = parse_response(raw).unwrap();
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    // ── extract ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_lines_skip_the_remote_call() {
        let scripted = Scripted::ok("[]");
        let categorizer: Arc<dyn Categorizer> = scripted.clone();
        let report = extract(&categorizer, &[], opts(), &NoopEventSink).await;
        assert_eq!(report, ExtractionReport::default());
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn call_error_degrades_to_no_items() {
        let categorizer: Arc<dyn Categorizer> = Scripted::err("connection refused");
        let report = extract(&categorizer, &lines(&["MILK"]), opts(), &NoopEventSink).await;
        assert!(report.items.is_empty());
        assert!(matches!(
            report.degradation,
            Some(StageError::CategorizerUnavailable { ref detail }) if detail == "connection refused"
        ));
    }

    #[tokio::test]
    async fn garbage_degrades_to_no_items() {
        let categorizer: Arc<dyn Categorizer> = Scripted::ok("I cannot help with that.");
        let report = extract(&categorizer, &lines(&["MILK"]), opts(), &NoopEventSink).await;
        assert!(report.items.is_empty());
        assert!(matches!(
            report.degradation,
            Some(StageError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn prompt_contains_the_lines() {
        let scripted = Scripted::ok("[]");
        let categorizer: Arc<dyn Categorizer> = scripted.clone();
        extract(
            &categorizer,
            &lines(&["BANAN4S 0.89", "COLA 1.10"]),
            opts(),
            &NoopEventSink,
        )
        .await;
        let prompt = scripted.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("BANAN4S 0.89\nCOLA 1.10"));
    }

    #[tokio::test]
    async fn filter_counts_reach_the_sink() {
        #[derive(Default)]
        struct Counts(Mutex<Option<(usize, usize)>>);
        impl IngestEventSink for Counts {
            fn on_items_filtered(&self, received: usize, kept: usize) {
                *self.0.lock().unwrap() = Some((received, kept));
            }
        }

        let categorizer: Arc<dyn Categorizer> = Scripted::ok(
            r#"[{"name":"Bananas","category":"fresh food"},{"name":"Cola","category":"soda"}]"#,
        );
        let sink = Counts::default();
        let report = extract(&categorizer, &lines(&["x"]), opts(), &sink).await;
        assert_eq!(report.dropped(), 1);
        assert_eq!(*sink.0.lock().unwrap(), Some((2, 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_categorizer_times_out() {
        struct Slow;
        #[async_trait]
        impl Categorizer for Slow {
            async fn complete(
                &self,
                _system_prompt: &str,
                _user_prompt: &str,
                _temperature: f32,
                _max_tokens: usize,
            ) -> Result<String, CategorizerError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("[]".into())
            }
        }

        let categorizer: Arc<dyn Categorizer> = Arc::new(Slow);
        let report = extract(&categorizer, &lines(&["x"]), opts(), &NoopEventSink).await;
        assert_eq!(
            report.degradation,
            Some(StageError::CategorizerTimeout { secs: 5 })
        );
    }
}
