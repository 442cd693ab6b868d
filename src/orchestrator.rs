//! The stage orchestrator: drives one request through every collaborator.
//!
//! ```text
//! Idle ─▶ ExtractingPages ─▶ RecognizingText ─▶ [Translating] ─▶ Synthesizing ─▶ Assembling ─▶ Complete
//! ```
//!
//! Work is strictly sequential: one collaborator call is awaited before the
//! next starts, pages and chunks are processed in order, and a single
//! [`AudiobookPipeline`] accepts one request at a time. The first error
//! aborts the run; nothing partial is returned and nothing is retried here.
//! Transport retries, where they exist, live inside the collaborators.

use crate::collaborators::{AudioStorage, Collaborators, ProcessedPage};
use crate::config::AudiobookConfig;
use crate::error::{AudiobookError, ServiceError};
use crate::output::{AudiobookOutput, PipelineStats};
use crate::pipeline::chunk::{TextChunk, TextChunker};
use crate::pipeline::cleanup::clean_text;
use crate::pipeline::geometry::PageGeometryMapper;
use crate::pipeline::wav::{encode_wav, AudioSegment};
use crate::progress::{
    NoopProgressCallback, PipelineStage, ProgressCallback, ProgressEvent, ProgressTracker,
};
use crate::request::AudiobookRequest;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Cooperative cancellation signal, checked between units of work.
///
/// Cancelling never interrupts a collaborator call already in flight; the
/// run stops before the next page or chunk and fails with
/// [`AudiobookError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Converts [`AudiobookRequest`]s into audio, one at a time.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2audio::{
///     AudiobookConfig, AudiobookPipeline, AudiobookRequest, CropMargins, Language, PageRange,
/// };
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AudiobookConfig::default();
/// let pipeline = AudiobookPipeline::from_config(config, "http://localhost:8880/tts")?;
///
/// let request = AudiobookRequest::new(
///     std::fs::read("book.pdf")?,
///     PageRange::new(1, 10),
///     CropMargins::new(40, 40),
///     Language::English,
///     Language::French,
/// );
/// let output = pipeline.submit(request).await?;
/// std::fs::write("book.wav", &output.audio.bytes)?;
/// # Ok(())
/// # }
/// ```
pub struct AudiobookPipeline {
    collaborators: Collaborators,
    config: AudiobookConfig,
    chunker: TextChunker,
    mapper: PageGeometryMapper,
    in_flight: AtomicBool,
    stage: Mutex<PipelineStage>,
}

impl std::fmt::Debug for AudiobookPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudiobookPipeline")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .field("stage", &self.current_stage())
            .finish_non_exhaustive()
    }
}

/// Releases the in-flight flag when a run ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Mirrors every event's stage into the pipeline before forwarding it.
struct StageRecorder<'a> {
    current: &'a Mutex<PipelineStage>,
    inner: &'a dyn ProgressCallback,
}

impl ProgressCallback for StageRecorder<'_> {
    fn on_progress(&self, event: &ProgressEvent) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = event.stage;
        self.inner.on_progress(event);
    }
}

/// Where finished audio goes, besides the returned output.
type Delivery<'a> = Option<(&'a dyn AudioStorage, &'a str)>;

impl AudiobookPipeline {
    pub fn new(collaborators: Collaborators, config: AudiobookConfig) -> Self {
        let chunker = TextChunker::new(config.max_chunk_size);
        let mapper = PageGeometryMapper::new(config.max_crop_fraction);
        Self {
            collaborators,
            config,
            chunker,
            mapper,
            in_flight: AtomicBool::new(false),
            stage: Mutex::new(PipelineStage::Idle),
        }
    }

    pub fn config(&self) -> &AudiobookConfig {
        &self.config
    }

    /// `true` while a request is running.
    pub fn is_processing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Stage of the current (or last) request.
    pub fn current_stage(&self) -> PipelineStage {
        *self.stage.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `request` to completion, reporting to the configured callback.
    pub async fn submit(
        &self,
        request: AudiobookRequest,
    ) -> Result<AudiobookOutput, AudiobookError> {
        match self.config.progress_callback.clone() {
            Some(cb) => self.submit_with(request, cb.as_ref(), None).await,
            None => self.submit_with(request, &NoopProgressCallback, None).await,
        }
    }

    /// Run `request` with an explicit progress sink and optional cancellation.
    ///
    /// # Errors
    /// [`AudiobookError::AlreadyProcessing`] if another request is running on
    /// this pipeline; it is returned without emitting any event. Every other
    /// error is preceded by one final `Failed` event.
    pub async fn submit_with(
        &self,
        request: AudiobookRequest,
        progress: &dyn ProgressCallback,
        cancel: Option<&CancellationFlag>,
    ) -> Result<AudiobookOutput, AudiobookError> {
        self.submit_inner(&request, progress, cancel, None)
            .await
            .map(|(output, _)| output)
    }

    /// Run `request` and hand the WAV bytes to `storage`.
    ///
    /// A storage failure fails the run in the assembly stage.
    pub async fn submit_to_storage(
        &self,
        request: AudiobookRequest,
        storage: &dyn AudioStorage,
        destination_name: &str,
    ) -> Result<PathBuf, AudiobookError> {
        let progress: &dyn ProgressCallback = match self.config.progress_callback.as_deref() {
            Some(cb) => cb,
            None => &NoopProgressCallback,
        };
        self.submit_to_storage_with(request, storage, destination_name, progress, None)
            .await
            .map(|(_, path)| path)
    }

    /// [`Self::submit_to_storage`] with an explicit progress sink and
    /// cancellation. Returns the output alongside where it was stored.
    pub async fn submit_to_storage_with(
        &self,
        request: AudiobookRequest,
        storage: &dyn AudioStorage,
        destination_name: &str,
        progress: &dyn ProgressCallback,
        cancel: Option<&CancellationFlag>,
    ) -> Result<(AudiobookOutput, PathBuf), AudiobookError> {
        let (output, stored) = self
            .submit_inner(&request, progress, cancel, Some((storage, destination_name)))
            .await?;
        let path =
            stored.ok_or_else(|| AudiobookError::Internal("storage step did not run".into()))?;
        Ok((output, path))
    }

    /// Blocking wrapper around [`Self::submit`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from inside
    /// an async context.
    pub fn submit_blocking(
        &self,
        request: AudiobookRequest,
    ) -> Result<AudiobookOutput, AudiobookError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| AudiobookError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.submit(request))
    }

    async fn submit_inner(
        &self,
        request: &AudiobookRequest,
        progress: &dyn ProgressCallback,
        cancel: Option<&CancellationFlag>,
        delivery: Delivery<'_>,
    ) -> Result<(AudiobookOutput, Option<PathBuf>), AudiobookError> {
        let _guard = self.acquire()?;

        let recorder = StageRecorder {
            current: &self.stage,
            inner: progress,
        };
        let mut tracker = ProgressTracker::new(&recorder);

        match self.run(request, &mut tracker, cancel, delivery).await {
            Ok(done) => Ok(done),
            Err(e) => {
                warn!("Pipeline failed during {}: {}", tracker.stage(), e);
                tracker.fail(e.to_string());
                Err(e)
            }
        }
    }

    fn acquire(&self) -> Result<InFlightGuard<'_>, AudiobookError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AudiobookError::AlreadyProcessing)?;
        Ok(InFlightGuard(&self.in_flight))
    }

    async fn run(
        &self,
        request: &AudiobookRequest,
        tracker: &mut ProgressTracker<'_>,
        cancel: Option<&CancellationFlag>,
        delivery: Delivery<'_>,
    ) -> Result<(AudiobookOutput, Option<PathBuf>), AudiobookError> {
        let total_start = Instant::now();
        request.validate()?;
        info!(
            "Starting audiobook: {} ({} → {}), {} bytes",
            request.page_range,
            request.source_language,
            request.target_language,
            request.document.len()
        );

        let mut stats = PipelineStats {
            pages_requested: request.page_range.len(),
            translated: request.needs_translation(),
            ..Default::default()
        };

        // ── Step 1: Extract and crop pages ───────────────────────────────────
        let started = Instant::now();
        let pages = self.extract_pages(request, tracker, cancel).await?;
        stats.extract_duration_ms = elapsed_ms(started);
        stats.pages_processed = pages.len();
        info!(
            "Extracted {}/{} pages in {}ms",
            pages.len(),
            stats.pages_requested,
            stats.extract_duration_ms
        );

        // ── Step 2: Recognize, clean and chunk ───────────────────────────────
        let started = Instant::now();
        let text = self.recognize_pages(request, &pages, tracker, cancel).await?;
        drop(pages);
        let cleaned = clean_text(&text);
        stats.source_characters = cleaned.chars().count();
        let mut chunks = self.chunker.chunk(&cleaned);
        stats.recognize_duration_ms = elapsed_ms(started);
        stats.chunk_count = chunks.len();
        info!(
            "Recognized {} characters → {} chunks (max {} chars)",
            stats.source_characters,
            chunks.len(),
            self.chunker.max_chunk_size()
        );

        // ── Step 3: Translate (skipped for identical languages) ──────────────
        if request.needs_translation() {
            let started = Instant::now();
            self.translate_chunks(request, &mut chunks, tracker, cancel)
                .await?;
            stats.translate_duration_ms = elapsed_ms(started);
            info!(
                "Translated {} chunks in {}ms",
                chunks.len(),
                stats.translate_duration_ms
            );
        } else {
            debug!(
                "Source and target are both {}; skipping translation",
                request.source_language
            );
        }

        // ── Step 4: Synthesize ───────────────────────────────────────────────
        let started = Instant::now();
        let segments = self
            .synthesize_chunks(request, &chunks, tracker, cancel)
            .await?;
        stats.synthesize_duration_ms = elapsed_ms(started);
        info!(
            "Synthesized {} segments in {}ms",
            segments.len(),
            stats.synthesize_duration_ms
        );

        // ── Step 5: Assemble ─────────────────────────────────────────────────
        check_cancelled(cancel, PipelineStage::Assembling)?;
        let started = Instant::now();
        tracker.enter(
            PipelineStage::Assembling,
            format!("Assembling {} audio segments", segments.len()),
        );
        let audio = encode_wav(&segments)?;
        drop(segments);

        let stored = match delivery {
            Some((storage, name)) => {
                let path = storage
                    .persist(&audio.bytes, name)
                    .await
                    .map_err(|e| AudiobookError::collaborator(PipelineStage::Assembling, e))?;
                info!("Stored audiobook at {}", path.display());
                Some(path)
            }
            None => None,
        };
        stats.assemble_duration_ms = elapsed_ms(started);

        stats.sample_rate = audio.sample_rate;
        stats.sample_count = audio.sample_count;
        stats.audio_duration_ms = (audio.duration_secs() * 1000.0).round() as u64;
        stats.total_duration_ms = elapsed_ms(total_start);

        info!(
            "Audiobook complete: {:.1}s of audio, {} bytes, {}ms total",
            audio.duration_secs(),
            audio.len(),
            stats.total_duration_ms
        );
        tracker.complete(format!(
            "Audiobook ready: {:.1}s of audio from {} pages",
            audio.duration_secs(),
            stats.pages_processed
        ));

        Ok((
            AudiobookOutput {
                audio,
                chunks,
                stats,
            },
            stored,
        ))
    }

    async fn extract_pages(
        &self,
        request: &AudiobookRequest,
        tracker: &mut ProgressTracker<'_>,
        cancel: Option<&CancellationFlag>,
    ) -> Result<Vec<ProcessedPage>, AudiobookError> {
        const STAGE: PipelineStage = PipelineStage::ExtractingPages;
        let renderer = &self.collaborators.renderer;
        let document = &request.document;

        tracker.enter(STAGE, format!("Opening document for {}", request.page_range));
        let page_count = renderer
            .page_count(document)
            .await
            .map_err(|e| AudiobookError::collaborator(STAGE, e))?;

        let page_nums = request.page_range.pages_within(page_count);
        let dropped = request.page_range.len().saturating_sub(page_nums.len());
        if dropped > 0 {
            warn!(
                "Dropping {} page(s) of {} outside the document ({} pages)",
                dropped, request.page_range, page_count
            );
        }

        let total = page_nums.len();
        let mut pages = Vec::with_capacity(total);
        for (i, page_num) in page_nums.into_iter().enumerate() {
            check_cancelled(cancel, STAGE)?;

            let geometry = renderer
                .page_geometry(document, page_num)
                .await
                .map_err(|e| AudiobookError::collaborator(STAGE, e))?;
            let crop = self.mapper.to_rendered(request.crop, &geometry)?;
            let page = renderer
                .render(document, page_num, crop)
                .await
                .map_err(|e| AudiobookError::collaborator(STAGE, e))?;

            debug!(
                "Page {}: {}x{} px at scale {:.3}, crop {}/{} px",
                page_num,
                geometry.rendered_width(),
                geometry.rendered_height(),
                geometry.scale,
                crop.top,
                crop.bottom
            );
            pages.push(page);
            tracker.advance(
                i + 1,
                total,
                format!("Extracted page {} ({}/{})", page_num, i + 1, total),
            );
        }

        Ok(pages)
    }

    async fn recognize_pages(
        &self,
        request: &AudiobookRequest,
        pages: &[ProcessedPage],
        tracker: &mut ProgressTracker<'_>,
        cancel: Option<&CancellationFlag>,
    ) -> Result<String, AudiobookError> {
        const STAGE: PipelineStage = PipelineStage::RecognizingText;
        let total = pages.len();

        tracker.enter(STAGE, format!("Recognizing text on {} page(s)", total));
        let mut texts = Vec::with_capacity(total);
        for (i, page) in pages.iter().enumerate() {
            check_cancelled(cancel, STAGE)?;

            let text = self
                .collaborators
                .recognizer
                .recognize(page, request.source_language)
                .await
                .map_err(|e| AudiobookError::collaborator(STAGE, e))?;
            debug!("Page {}: recognized {} chars", page.page_num, text.len());

            texts.push(text);
            tracker.advance(
                i + 1,
                total,
                format!("Recognized page {} ({}/{})", page.page_num, i + 1, total),
            );
        }

        Ok(texts.join("\n"))
    }

    async fn translate_chunks(
        &self,
        request: &AudiobookRequest,
        chunks: &mut [TextChunk],
        tracker: &mut ProgressTracker<'_>,
        cancel: Option<&CancellationFlag>,
    ) -> Result<(), AudiobookError> {
        const STAGE: PipelineStage = PipelineStage::Translating;
        let total = chunks.len();

        tracker.enter(
            STAGE,
            format!(
                "Translating {} chunk(s) from {} to {}",
                total, request.source_language, request.target_language
            ),
        );
        for (i, chunk) in chunks.iter_mut().enumerate() {
            check_cancelled(cancel, STAGE)?;

            let translated = self
                .collaborators
                .translator
                .translate(request.source_language, request.target_language, &chunk.text)
                .await
                .map_err(|e| AudiobookError::collaborator(STAGE, e))?;
            chunk.text = translated.trim().to_string();

            tracker.advance(i + 1, total, format!("Translated chunk {}/{}", i + 1, total));
        }

        Ok(())
    }

    async fn synthesize_chunks(
        &self,
        request: &AudiobookRequest,
        chunks: &[TextChunk],
        tracker: &mut ProgressTracker<'_>,
        cancel: Option<&CancellationFlag>,
    ) -> Result<Vec<AudioSegment>, AudiobookError> {
        const STAGE: PipelineStage = PipelineStage::Synthesizing;
        let total = chunks.len();
        let voice = self
            .config
            .voice
            .clone()
            .unwrap_or_else(|| request.target_language.default_voice());

        tracker.enter(
            STAGE,
            format!("Synthesizing {} chunk(s) with voice '{}'", total, voice),
        );
        let mut segments = Vec::with_capacity(total);
        for (i, chunk) in chunks.iter().enumerate() {
            check_cancelled(cancel, STAGE)?;

            let segment = self
                .collaborators
                .synthesizer
                .synthesize(&chunk.text, &voice)
                .await
                .map_err(|e| AudiobookError::collaborator(STAGE, e))?;
            if segment.is_empty() {
                return Err(AudiobookError::collaborator(
                    STAGE,
                    ServiceError::EmptyOutput(format!(
                        "synthesizer returned no samples for chunk {}",
                        chunk.index
                    )),
                ));
            }
            if segment.sample_rate == 0 {
                return Err(AudiobookError::collaborator(
                    STAGE,
                    ServiceError::Decode(format!(
                        "synthesizer reported a 0 Hz sample rate for chunk {}",
                        chunk.index
                    )),
                ));
            }
            debug!(
                "Chunk {}: {} samples @ {} Hz",
                chunk.index,
                segment.samples.len(),
                segment.sample_rate
            );

            segments.push(segment);
            tracker.advance(i + 1, total, format!("Synthesized chunk {}/{}", i + 1, total));
        }

        Ok(segments)
    }
}

fn check_cancelled(
    cancel: Option<&CancellationFlag>,
    stage: PipelineStage,
) -> Result<(), AudiobookError> {
    match cancel {
        Some(flag) if flag.is_cancelled() => Err(AudiobookError::Cancelled { stage }),
        _ => Ok(()),
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
