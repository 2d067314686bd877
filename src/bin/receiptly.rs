//! CLI binary for receiptly.
//!
//! A thin shim over the library crate that maps CLI flags to `IngestConfig`,
//! feeds each file through one shared `Ingestor`, and prints the results.

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use receiptly::{
    Categorizer, IngestConfig, IngestError, IngestEventSink, IngestReport, IngestState, Ingestor,
    LlmCategorizer, MediaType, MemoryReceiptStore, OcrEngine, StageError, TesseractCli,
    UploadedFile,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI event sink using indicatif ───────────────────────────────────────────

/// Terminal event sink: a progress bar over all files plus one log line per
/// degradation. Files finish out of order, so the bar is advanced by the
/// caller, not by state events.
struct CliEventSink {
    bar: ProgressBar,
    degraded: AtomicUsize,
}

impl CliEventSink {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:32.green/238}] {pos:>3}/{len} files  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Ingesting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            degraded: AtomicUsize::new(0),
        })
    }
}

impl IngestEventSink for CliEventSink {
    fn on_state(&self, _caller: &str, state: IngestState) {
        if !state.is_terminal() {
            self.bar.set_message(state.to_string());
        }
    }

    fn on_ocr_progress(&self, status: &str, _progress: f32) {
        self.bar.set_message(format!("ocr: {status}"));
    }

    fn on_degraded(&self, _caller: &str, error: &StageError) {
        self.degraded.fetch_add(1, Ordering::SeqCst);
        self.bar
            .println(format!("  {} {}", yellow("⚠"), dim(&error.to_string())));
    }

    fn on_items_filtered(&self, received: usize, kept: usize) {
        if kept < received {
            self.bar.println(format!(
                "  {} {}",
                yellow("⚠"),
                dim(&format!("dropped {} of {received} categorized items", received - kept))
            ));
        }
    }

    fn on_cleanup_failed(&self, path: &Path, error: &str) {
        self.bar.println(format!(
            "  {} could not delete {}: {}",
            red("✗"),
            path.display(),
            error
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One receipt
  receiptly --caller alice receipt.jpg

  # A folder of receipts, four at a time, JSON out
  receiptly --caller alice --concurrency 4 --json scans/*.png > items.json

  # Use a specific model
  receiptly --caller alice --provider openai --model gpt-4.1-mini receipt.jpg

ACCEPTED FILES:
  .jpg / .jpeg / .png   OCR + item extraction
  .pdf                  accepted and saved, no items extracted
  anything else         rejected
  Maximum size: 10 MB

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RECEIPTLY_*             Every flag below has a RECEIPTLY_ variable

SETUP:
  1. Install Tesseract:  apt install tesseract-ocr   (or brew install tesseract)
  2. Set API key:        export OPENAI_API_KEY=sk-...
  3. Ingest:             receiptly --caller me receipt.jpg
"#;

/// Extract categorised food items from grocery receipt photos.
#[derive(Parser, Debug)]
#[command(
    name = "receiptly",
    version,
    about = "Extract categorised food items from grocery receipt photos",
    long_about = "Run receipt images through OCR and an LLM to list the food items on them, \
each labelled \"fresh food\" or \"processed food\". Supports OpenAI, Anthropic, Google Gemini, \
Azure OpenAI, and any OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Receipt files (JPEG, PNG or PDF).
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Identity the receipts belong to.
    #[arg(long, env = "RECEIPTLY_CALLER")]
    caller: String,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Tesseract language code(s), e.g. eng or eng+deu.
    #[arg(long, env = "RECEIPTLY_LANGUAGE", default_value = "eng")]
    language: String,

    /// Path to the tesseract executable.
    #[arg(long, env = "RECEIPTLY_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Use in-process libtesseract instead of the executable.
    #[cfg(feature = "tesseract")]
    #[arg(long, env = "RECEIPTLY_IN_PROCESS")]
    in_process: bool,

    /// Directory for scratch copies of uploads.
    #[arg(long, env = "RECEIPTLY_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "RECEIPTLY_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per receipt.
    #[arg(long, env = "RECEIPTLY_MAX_TOKENS", default_value_t = 800)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "RECEIPTLY_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// OCR timeout per receipt, in seconds.
    #[arg(long, env = "RECEIPTLY_OCR_TIMEOUT", default_value_t = 120)]
    ocr_timeout: u64,

    /// LLM call timeout per receipt, in seconds.
    #[arg(long, env = "RECEIPTLY_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Number of receipts processed at once.
    #[arg(short, long, env = "RECEIPTLY_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Output one JSON document instead of a summary.
    #[arg(long, env = "RECEIPTLY_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "RECEIPTLY_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RECEIPTLY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RECEIPTLY_QUIET")]
    quiet: bool,
}

/// What happened to one input file.
enum Outcome {
    Saved(IngestReport),
    Rejected(String),
    Failed(anyhow::Error),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build the ingestor ───────────────────────────────────────────────
    let sink = show_progress.then(|| CliEventSink::new(cli.files.len()));
    let config = build_config(&cli, sink.clone()).await?;

    let categorizer: Arc<dyn Categorizer> =
        Arc::new(LlmCategorizer::from_config(&config).context("No LLM provider available")?);
    let store = Arc::new(MemoryReceiptStore::new());
    let ingestor = Ingestor::new(config, ocr_engine(&cli), categorizer, store)
        .install()
        .context("Failed to install ingestor")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let mut outcomes: Vec<(usize, Outcome)> =
        stream::iter(cli.files.iter().enumerate().map(|(idx, path)| {
            let ingestor = Arc::clone(&ingestor);
            let caller = cli.caller.as_str();
            let sink = sink.clone();
            async move {
                let outcome = ingest_file(&ingestor, path, caller).await;
                if let Some(ref sink) = sink {
                    sink.bar.inc(1);
                }
                (idx, outcome)
            }
        }))
        .buffer_unordered(cli.concurrency.max(1))
        .collect()
        .await;
    outcomes.sort_by_key(|(idx, _)| *idx);

    let degraded = match sink {
        Some(ref sink) => {
            sink.bar.finish_and_clear();
            sink.degraded.load(Ordering::SeqCst)
        }
        None => 0,
    };

    // ── Report ───────────────────────────────────────────────────────────
    let failed = outcomes
        .iter()
        .filter(|(_, o)| !matches!(o, Outcome::Saved(_)))
        .count();

    if cli.json {
        let documents = outcomes
            .iter()
            .map(|(idx, outcome)| json_outcome(&cli.files[*idx], outcome))
            .collect::<Result<Vec<_>>>()?;
        println!(
            "{}",
            serde_json::to_string_pretty(&documents).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        for (idx, outcome) in &outcomes {
            print_outcome(&cli.files[*idx], outcome);
        }
        let saved = outcomes.len() - failed;
        eprintln!(
            "{} {}/{} receipts saved{}",
            if failed == 0 { green("✔") } else { red("✘") },
            bold(&saved.to_string()),
            outcomes.len(),
            if degraded > 0 {
                format!("  ({degraded} degraded)")
            } else {
                String::new()
            }
        );
    }

    if failed > 0 {
        anyhow::bail!("{} of {} files were not ingested", failed, outcomes.len());
    }
    Ok(())
}

/// Map CLI args to `IngestConfig`.
async fn build_config(cli: &Cli, sink: Option<Arc<CliEventSink>>) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder()
        .ocr_language(cli.language.clone())
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .ocr_timeout_secs(cli.ocr_timeout)
        .categorize_timeout_secs(cli.api_timeout);

    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_dir(dir.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(sink) = sink {
        builder = builder.event_sink(sink as Arc<dyn IngestEventSink>);
    }

    builder.build().context("Invalid configuration")
}

fn ocr_engine(cli: &Cli) -> Arc<dyn OcrEngine> {
    #[cfg(feature = "tesseract")]
    if cli.in_process {
        return Arc::new(receiptly::LeptessEngine::default());
    }
    Arc::new(TesseractCli::with_binary(&cli.tesseract))
}

/// Declared media type from the file extension; unknown extensions are
/// declared as opaque bytes and rejected by the pipeline.
fn declared_type(path: &Path) -> &'static str {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(MediaType::from_extension)
        .map(MediaType::mime)
        .unwrap_or("application/octet-stream")
}

async fn ingest_file(ingestor: &Ingestor, path: &Path, caller: &str) -> Outcome {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return Outcome::Failed(
                anyhow::Error::new(e).context(format!("Failed to read {}", path.display())),
            )
        }
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let upload = UploadedFile::new(bytes, declared_type(path), name);

    match ingestor.ingest(Some(&upload), caller).await {
        Ok(report) => Outcome::Saved(report),
        Err(IngestError::Rejected(reason)) => Outcome::Rejected(reason.to_string()),
        Err(e) => Outcome::Failed(e.into()),
    }
}

fn json_outcome(path: &Path, outcome: &Outcome) -> Result<serde_json::Value> {
    let mut doc = match outcome {
        Outcome::Saved(report) => {
            serde_json::to_value(report.response()).context("Failed to serialise response")?
        }
        Outcome::Rejected(message) => serde_json::json!({ "success": false, "error": message }),
        Outcome::Failed(e) => serde_json::json!({ "success": false, "error": format!("{e:#}") }),
    };
    doc["file"] = serde_json::json!(path.display().to_string());
    Ok(doc)
}

fn print_outcome(path: &Path, outcome: &Outcome) {
    let name = path.display().to_string();
    match outcome {
        Outcome::Saved(report) => {
            let stats = &report.stats;
            println!(
                "{} {}  {}  {}",
                green("✓"),
                bold(&name),
                dim(&format!("receipt {}", report.record_id)),
                dim(&format!(
                    "{} items, {} dropped, {}ms",
                    report.result.items.len(),
                    stats.dropped_items,
                    stats.total_duration_ms
                )),
            );
            for item in &report.result.items {
                println!("    {:<32} {}", item.name, dim(item.category.label()));
            }
        }
        Outcome::Rejected(message) => println!("{} {}  {}", red("✗"), bold(&name), red(message)),
        Outcome::Failed(e) => println!("{} {}  {}", red("✗"), bold(&name), red(&format!("{e:#}"))),
    }
}
