//! Configuration types for receipt ingestion.
//!
//! All tunable behaviour is controlled through [`IngestConfig`], built via its
//! [`IngestConfigBuilder`]. The hard limits (upload size, media allow-set,
//! candidate-line cap) are constants in their stage modules, not fields
//! of this struct.

use crate::error::IngestError;
use crate::events::EventSink;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Name of the scratch directory created under the OS temp dir.
pub const SCRATCH_DIR_NAME: &str = "receiptly-uploads";

/// Model used when a provider has to be created and none was named.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Configuration for an [`crate::ingest::Ingestor`].
///
/// Built via [`IngestConfig::builder()`] or using [`IngestConfig::default()`].
///
/// # Example
/// ```rust
/// use receiptly::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .ocr_language("eng+fra")
///     .model("gpt-4.1-mini")
///     .max_tokens(1200)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Directory holding scratch copies of uploads while OCR runs.
    /// Default: `<os temp dir>/receiptly-uploads`.
    ///
    /// Created lazily on first use; never assumed to exist.
    pub scratch_dir: PathBuf,

    /// Tesseract language hint, e.g. `"eng"` or `"eng+deu"`. Default: `"eng"`.
    pub ocr_language: String,

    /// LLM model identifier. If None, [`DEFAULT_MODEL`] is used whenever a
    /// provider has to be created.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is detected from the
    /// environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for categorization. Default: 0.1.
    ///
    /// Near-zero keeps labels stable across runs for the same receipt.
    pub temperature: f32,

    /// Maximum tokens the categorizer may generate. Default: 800.
    ///
    /// Fifty short item names in JSON fit comfortably; a truncated answer is
    /// unparseable and degrades to no items.
    pub max_tokens: usize,

    /// Custom system prompt. If None, uses built-in default.
    pub system_prompt: Option<String>,

    /// Upper bound on one OCR run in seconds. Default: 120.
    pub ocr_timeout_secs: u64,

    /// Upper bound on one categorization call in seconds. Default: 60.
    pub categorize_timeout_secs: u64,

    /// Receiver for structured pipeline events. Default: none.
    pub event_sink: Option<EventSink>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join(SCRATCH_DIR_NAME),
            ocr_language: "eng".to_string(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 800,
            system_prompt: None,
            ocr_timeout_secs: 120,
            categorize_timeout_secs: 60,
            event_sink: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("scratch_dir", &self.scratch_dir)
            .field("ocr_language", &self.ocr_language)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("categorize_timeout_secs", &self.categorize_timeout_secs)
            .field("event_sink", &self.event_sink.as_ref().map(|_| "<dyn IngestEventSink>"))
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model to request when creating a provider.
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`IngestConfig`].
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn categorize_timeout_secs(mut self, secs: u64) -> Self {
        self.config.categorize_timeout_secs = secs;
        self
    }

    pub fn event_sink(mut self, sink: EventSink) -> Self {
        self.config.event_sink = Some(sink);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        if c.ocr_language.trim().is_empty() {
            return Err(IngestError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(IngestError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.ocr_timeout_secs == 0 || c.categorize_timeout_secs == 0 {
            return Err(IngestError::InvalidConfig(format!(
                "Timeouts must be ≥ 1s, got ocr={}s categorize={}s",
                c.ocr_timeout_secs, c.categorize_timeout_secs
            )));
        }
        if c.scratch_dir.as_os_str().is_empty() {
            return Err(IngestError::InvalidConfig(
                "Scratch directory must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = IngestConfig::default();
        assert!(c.scratch_dir.ends_with(SCRATCH_DIR_NAME));
        assert_eq!(c.ocr_language, "eng");
        assert_eq!(c.temperature, 0.1);
        assert_eq!(c.max_tokens, 800);
        assert_eq!(c.model_or_default(), DEFAULT_MODEL);
        assert!(c.event_sink.is_none());
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = IngestConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
        let c = IngestConfig::builder().temperature(-1.0).build().unwrap();
        assert_eq!(c.temperature, 0.0);
    }

    #[test]
    fn builder_rejects_bad_values() {
        assert!(matches!(
            IngestConfig::builder().ocr_language("  ").build(),
            Err(IngestError::InvalidConfig(_))
        ));
        assert!(matches!(
            IngestConfig::builder().max_tokens(0).build(),
            Err(IngestError::InvalidConfig(_))
        ));
        assert!(matches!(
            IngestConfig::builder().categorize_timeout_secs(0).build(),
            Err(IngestError::InvalidConfig(_))
        ));
        assert!(matches!(
            IngestConfig::builder().scratch_dir("").build(),
            Err(IngestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn debug_hides_provider_and_prompt() {
        let c = IngestConfig::builder()
            .system_prompt("secret instructions")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret instructions"), "got: {dbg}");
    }
}
