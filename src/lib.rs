//! # edgequake-pdf2audio
//!
//! Turn PDF documents into narrated audiobooks.
//!
//! ## Why this crate?
//!
//! Scanned books and complex layouts have no usable text layer, and even
//! born-digital PDFs come with headers, footers and hyphenation that make a
//! speech engine stumble. This crate rasterises each page, crops the page
//! furniture away, lets a vision model read what is left, optionally
//! translates it, and feeds speech-sized chunks to a TTS engine. The result
//! is a single mono 16-bit WAV.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Extract     page count, crop-aware render via pdfium     0 – 10 %
//!  ├─ 2. Recognize   vision OCR per page, cleanup, chunking      10 – 60 %
//!  ├─ 3. Translate   per chunk, skipped when languages match     60 – 75 %
//!  ├─ 4. Synthesize  TTS per chunk                               75 – 95 %
//!  └─ 5. Assemble    concatenate into one WAV                    95 – 100 %
//! ```
//!
//! Every external capability sits behind a trait in [`collaborators`], so
//! the [`AudiobookPipeline`] can be driven by the bundled pdfium / LLM / HTTP
//! implementations or by anything else.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2audio::{
//!     load_document, AudiobookConfig, AudiobookPipeline, AudiobookRequest, CropMargins,
//!     Language, PageRange,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = AudiobookConfig::default();
//!     let pipeline = AudiobookPipeline::from_config(config, "http://localhost:8880/tts")?;
//!
//!     let pdf = load_document("novel.pdf", 120).await?;
//!     let request = AudiobookRequest::new(
//!         pdf,
//!         PageRange::new(1, 20),
//!         CropMargins::new(36, 36),
//!         Language::German,
//!         Language::English,
//!     );
//!     let output = pipeline.submit(request).await?;
//!     std::fs::write("novel.wav", &output.audio.bytes)?;
//!     eprintln!("{} chunks, {} ms of audio", output.stats.chunk_count, output.stats.audio_duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2audio` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2audio = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod collaborators;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod request;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use collaborators::{
    AudioStorage, Collaborators, PageContent, PageRenderer, ProcessedPage, Synthesizer,
    TextRecognizer, Translator,
};
pub use config::{AudiobookConfig, AudiobookConfigBuilder};
pub use error::{AudiobookError, ServiceError};
pub use orchestrator::{AudiobookPipeline, CancellationFlag};
pub use output::{AudiobookOutput, PipelineStats};
pub use pipeline::chunk::{chunk_text, TextChunk, TextChunker};
pub use pipeline::geometry::{PageGeometry, PageGeometryMapper, RenderedCrop};
pub use pipeline::input::load_document;
pub use pipeline::wav::{decode_wav, encode_wav, AssembledAudio, AudioSegment};
pub use progress::{
    NoopProgressCallback, PipelineStage, ProgressCallback, ProgressEvent, SharedProgressCallback,
};
pub use provider::resolve_provider;
pub use request::{AudiobookRequest, CropMargins, Language, PageRange};
pub use stream::{PipelineStream, PipelineUpdate};
