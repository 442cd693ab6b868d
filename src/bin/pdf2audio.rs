//! CLI binary for edgequake-pdf2audio.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AudiobookConfig` / `AudiobookRequest`, draws a progress bar, and writes
//! the WAV.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2audio::pipeline::render::PdfiumPageRenderer;
use edgequake_pdf2audio::pipeline::storage::FileStorage;
use edgequake_pdf2audio::{
    load_document, AudiobookConfig, AudiobookPipeline, AudiobookRequest,
    CancellationFlag, CropMargins, Language, PageRange, PageRenderer, PipelineStage,
    ProgressCallback, ProgressEvent,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
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
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One 0–100 bar; the prefix shows the current stage.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold:>16}  [{bar:42.green/238}] {pos:>3}%  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }
}

impl ProgressCallback for CliProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        match event.stage {
            PipelineStage::Complete => self.bar.finish_and_clear(),
            PipelineStage::Failed => self.bar.abandon_with_message(red(&event.message)),
            stage => {
                self.bar.set_prefix(stage.label());
                self.bar.set_position(event.percent_complete.round() as u64);
                self.bar.set_message(dim(&event.message));
            }
        }
    }
}

/// Plain stderr lines for `--no-progress` runs without `--quiet`.
struct LogProgress;

impl ProgressCallback for LogProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        eprintln!("[{:>5.1}%] {}", event.percent_complete, event.message);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Whole book, English narration, to book.wav
  pdf2audio book.pdf

  # Chapter 2, cropped running headers/footers, translated to French
  pdf2audio book.pdf --pages 12-30 --crop-top 40 --crop-bottom 36 \
      --source-lang en --target-lang fr -o chapter2.fr.wav

  # From a URL, with a specific voice and TTS server
  pdf2audio https://example.com/paper.pdf --voice af_heart \
      --tts-url http://localhost:8880/tts

  # Machine-readable run statistics
  pdf2audio book.pdf --json > stats.json

LANGUAGES:
  en English   es Spanish   fr French    de German    it Italian
  pt Portuguese  nl Dutch   ru Russian   zh Chinese   ja Japanese
  ko Korean    hi Hindi     ar Arabic

TTS ENDPOINT:
  The synthesizer POSTs {"text": "...", "voice": "..."} as JSON and expects
  a WAV file in the response body. Every chunk must come back at the same
  sample rate.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  PDF2AUDIO_LLM_PROVIDER  Provider for OCR and translation (with PDF2AUDIO_MODEL)
  PDF2AUDIO_MODEL         Model ID for OCR and translation
  PDF2AUDIO_TTS_URL       TTS endpoint
  PDFIUM_LIB_PATH         Directory containing libpdfium
"#;

/// Turn PDF files and URLs into narrated WAV audiobooks.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2audio",
    version,
    about = "Turn PDF files and URLs into narrated WAV audiobooks",
    long_about = "Render PDF pages, crop away headers and footers, read the text with a \
Vision LLM, optionally translate it, synthesize speech chunk by chunk, and write a single \
mono 16-bit WAV.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the WAV here. Default: <input name>.wav in the current directory.
    #[arg(short, long, env = "PDF2AUDIO_OUTPUT")]
    output: Option<PathBuf>,

    /// Page range: all, 5, or 3-15 (1-indexed, inclusive).
    #[arg(long, env = "PDF2AUDIO_PAGES", default_value = "all")]
    pages: String,

    /// Pixels (PDF points) to crop from the top of every page.
    #[arg(long, env = "PDF2AUDIO_CROP_TOP", default_value_t = 0)]
    crop_top: u32,

    /// Pixels (PDF points) to crop from the bottom of every page.
    #[arg(long, env = "PDF2AUDIO_CROP_BOTTOM", default_value_t = 0)]
    crop_bottom: u32,

    /// Language the document is written in (name or ISO code).
    #[arg(long, env = "PDF2AUDIO_SOURCE_LANG", default_value = "en", value_parser = parse_language)]
    source_lang: Language,

    /// Language to narrate in. Defaults to the source language.
    #[arg(long, env = "PDF2AUDIO_TARGET_LANG", value_parser = parse_language)]
    target_lang: Option<Language>,

    /// Maximum characters per synthesized chunk.
    #[arg(long, env = "PDF2AUDIO_CHUNK_SIZE", default_value_t = 400)]
    chunk_size: usize,

    /// Voice ID passed to the TTS endpoint. Default: "<target code>-default".
    #[arg(long, env = "PDF2AUDIO_VOICE")]
    voice: Option<String>,

    /// TTS endpoint URL.
    #[arg(long, env = "PDF2AUDIO_TTS_URL", default_value = "http://localhost:8880/tts")]
    tts_url: String,

    /// Per-chunk TTS timeout in seconds.
    #[arg(long, env = "PDF2AUDIO_TTS_TIMEOUT", default_value_t = 120)]
    tts_timeout: u64,

    /// LLM model ID for OCR and translation.
    #[arg(long, env = "PDF2AUDIO_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "PDF2AUDIO_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2AUDIO_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Largest share of the page height one crop margin may remove (0.0–1.0).
    #[arg(long, env = "PDF2AUDIO_MAX_CROP_FRACTION", default_value_t = 0.5)]
    max_crop_fraction: f32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2AUDIO_PASSWORD")]
    password: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2AUDIO_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Transport retries per LLM call.
    #[arg(long, env = "PDF2AUDIO_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2AUDIO_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print run statistics as JSON on stdout.
    #[arg(long, env = "PDF2AUDIO_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2AUDIO_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2AUDIO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2AUDIO_QUIET")]
    quiet: bool,
}

fn parse_language(s: &str) -> std::result::Result<Language, String> {
    s.parse::<Language>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides all the feedback that matters, so library
    // INFO logs are suppressed while it is shown.
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

    // ── Load input and build the pipeline ────────────────────────────────
    let document: Arc<[u8]> = load_document(&cli.input, cli.download_timeout)
        .await
        .with_context(|| format!("Failed to load '{}'", cli.input))?
        .into();

    let config = build_config(&cli)?;
    let page_range = resolve_pages(&cli.pages, &config, &document).await?;
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.input));

    let pipeline = AudiobookPipeline::from_config(config, cli.tts_url.clone())
        .context("Failed to set up the pipeline")?;

    let request = AudiobookRequest::new(
        document,
        page_range,
        CropMargins::new(cli.crop_top, cli.crop_bottom),
        cli.source_lang,
        cli.target_lang.unwrap_or(cli.source_lang),
    );

    // ── Ctrl-C cancels between pages/chunks ──────────────────────────────
    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let progress: Box<dyn ProgressCallback> = if show_progress {
        Box::new(CliProgress::new())
    } else if cli.quiet || cli.json {
        Box::new(edgequake_pdf2audio::NoopProgressCallback)
    } else {
        Box::new(LogProgress)
    };

    // The WAV is persisted during assembly; a write failure fails the run.
    let (dir, name) = split_output(&output_path)?;
    let storage = FileStorage::new(dir);
    let (output, written) = pipeline
        .submit_to_storage_with(request, &storage, &name, progress.as_ref(), Some(&cancel))
        .await
        .with_context(|| format!("Conversion to {} failed", output_path.display()))?;

    if cli.json {
        let json =
            serde_json::to_string_pretty(&output.stats).context("Failed to serialise stats")?;
        println!("{json}");
    } else if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {}/{} pages  {} chunks  {:.1}s audio  {}ms  →  {}",
            green("✔"),
            stats.pages_processed,
            stats.pages_requested,
            stats.chunk_count,
            stats.audio_duration_ms as f64 / 1000.0,
            stats.total_duration_ms,
            bold(&written.display().to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `AudiobookConfig`.
fn build_config(cli: &Cli) -> Result<AudiobookConfig> {
    let mut builder = AudiobookConfig::builder()
        .max_chunk_size(cli.chunk_size)
        .max_crop_fraction(cli.max_crop_fraction)
        .dpi(cli.dpi)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout)
        .tts_timeout_secs(cli.tts_timeout);

    if let Some(ref voice) = cli.voice {
        builder = builder.voice(voice.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages`; `all` asks pdfium for the page count.
async fn resolve_pages(
    s: &str,
    config: &AudiobookConfig,
    document: &Arc<[u8]>,
) -> Result<PageRange> {
    if s.trim().eq_ignore_ascii_case("all") {
        let count = PdfiumPageRenderer::from_config(config)
            .page_count(document)
            .await
            .context("Failed to read page count")?;
        return Ok(PageRange::new(1, count.max(1)));
    }
    parse_pages(s)
}

/// Parse `5` or `3-15` into a `PageRange`.
fn parse_pages(s: &str) -> Result<PageRange> {
    let s = s.trim();
    let range = match s.split_once('-') {
        Some((start, end)) => PageRange::new(
            start.trim().parse().context("Invalid start page in range")?,
            end.trim().parse().context("Invalid end page in range")?,
        ),
        None => PageRange::single(s.parse().context("Invalid page number")?),
    };
    range.validate()?;
    Ok(range)
}

/// `<input stem>.wav` in the current directory.
fn default_output(input: &str) -> PathBuf {
    let last = input.rsplit('/').next().unwrap_or(input);
    let stem = Path::new(last)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("audiobook");
    PathBuf::from(format!("{stem}.wav"))
}

fn split_output(path: &Path) -> Result<(PathBuf, String)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Output path '{}' has no file name", path.display()))?
        .to_string();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, name))
}
