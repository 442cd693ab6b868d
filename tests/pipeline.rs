//! Orchestrator integration tests with in-memory collaborators.
//!
//! Nothing here touches pdfium, an LLM or the network, so these run in CI:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_pdf2audio::pipeline::storage::FileStorage;
use edgequake_pdf2audio::{
    decode_wav, AudioSegment, AudiobookConfig, AudiobookError, AudiobookOutput, AudiobookPipeline,
    AudiobookRequest, CancellationFlag, Collaborators, CropMargins, Language, PageContent,
    PageGeometry, PageRange, PageRenderer, PipelineStage, PipelineUpdate, ProcessedPage,
    ProgressEvent, RenderedCrop, ServiceError, Synthesizer, TextRecognizer, Translator,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

const RATE: u32 = 24_000;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Pages are plain strings; every page is 612×792 points rendered at `scale`.
struct FakeRenderer {
    pages: Vec<String>,
    scale: f32,
    fail_count: bool,
    fail_render_on: Option<usize>,
    crops: Mutex<Vec<(usize, RenderedCrop)>>,
}

impl FakeRenderer {
    fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            scale: 1.0,
            fail_count: false,
            fail_render_on: None,
            crops: Mutex::new(Vec::new()),
        }
    }

    fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn page_count(&self, _document: &Arc<[u8]>) -> Result<usize, ServiceError> {
        if self.fail_count {
            return Err(ServiceError::Decode("xref table is corrupt".into()));
        }
        Ok(self.pages.len())
    }

    async fn page_geometry(
        &self,
        _document: &Arc<[u8]>,
        page_num: usize,
    ) -> Result<PageGeometry, ServiceError> {
        Ok(PageGeometry {
            page_num,
            width: 612.0,
            height: 792.0,
            scale: self.scale,
        })
    }

    async fn render(
        &self,
        _document: &Arc<[u8]>,
        page_num: usize,
        crop: RenderedCrop,
    ) -> Result<ProcessedPage, ServiceError> {
        self.crops.lock().unwrap().push((page_num, crop));
        if self.fail_render_on == Some(page_num) {
            return Err(ServiceError::Decode(format!("page {page_num} bitmap allocation failed")));
        }
        let text = self
            .pages
            .get(page_num - 1)
            .cloned()
            .ok_or_else(|| ServiceError::Decode(format!("no page {page_num}")))?;
        Ok(ProcessedPage {
            page_num,
            content: PageContent::Text(text),
        })
    }
}

/// Returns the page text as-is; optionally fails on one page.
#[derive(Default)]
struct FakeRecognizer {
    fail_on_page: Option<usize>,
    calls: AtomicUsize,
}

#[async_trait]
impl TextRecognizer for FakeRecognizer {
    async fn recognize(
        &self,
        page: &ProcessedPage,
        _language_hint: Language,
    ) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_page == Some(page.page_num) {
            return Err(ServiceError::Unavailable("vision model overloaded".into()));
        }
        match &page.content {
            PageContent::Text(t) => Ok(t.clone()),
            PageContent::Image(_) => Err(ServiceError::Decode("unexpected image".into())),
        }
    }
}

/// Prefixes every chunk with the target language code; optionally fails on
/// the n-th call (1-based).
#[derive(Default)]
struct FakeTranslator {
    fail_on_call: Option<usize>,
    calls: AtomicUsize,
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(
        &self,
        _source: Language,
        target: Language,
        text: &str,
    ) -> Result<String, ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(ServiceError::Request("HTTP 429 rate limited".into()));
        }
        Ok(format!("  [{}] {}\n", target.code(), text))
    }
}

/// One sample per character; records what it was asked to speak.
struct FakeSynthesizer {
    rates: Vec<u32>,
    gate: Option<Arc<Notify>>,
    silent: bool,
    /// Zero-based chunk index that fails after being recorded.
    fail_on_chunk: Option<usize>,
    spoken: Mutex<Vec<(String, String)>>,
}

impl Default for FakeSynthesizer {
    fn default() -> Self {
        Self {
            rates: vec![RATE],
            gate: None,
            silent: false,
            fail_on_chunk: None,
            spoken: Mutex::new(Vec::new()),
        }
    }
}

impl FakeSynthesizer {
    fn texts(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioSegment, ServiceError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let index = {
            let mut spoken = self.spoken.lock().unwrap();
            spoken.push((text.to_string(), voice_id.to_string()));
            spoken.len() - 1
        };
        if self.fail_on_chunk == Some(index) {
            return Err(ServiceError::Unavailable("voice model not loaded".into()));
        }
        if self.silent {
            return Ok(AudioSegment::new(Vec::new(), RATE));
        }
        let rate = self.rates[index.min(self.rates.len() - 1)];
        Ok(AudioSegment::new(vec![0.25; text.chars().count()], rate))
    }
}

struct Harness {
    renderer: Arc<FakeRenderer>,
    recognizer: Arc<FakeRecognizer>,
    translator: Arc<FakeTranslator>,
    synthesizer: Arc<FakeSynthesizer>,
    pipeline: Arc<AudiobookPipeline>,
}

fn harness_with(
    renderer: FakeRenderer,
    recognizer: FakeRecognizer,
    synthesizer: FakeSynthesizer,
    config: AudiobookConfig,
) -> Harness {
    harness_full(
        renderer,
        recognizer,
        FakeTranslator::default(),
        synthesizer,
        config,
    )
}

fn harness_full(
    renderer: FakeRenderer,
    recognizer: FakeRecognizer,
    translator: FakeTranslator,
    synthesizer: FakeSynthesizer,
    config: AudiobookConfig,
) -> Harness {
    let renderer = Arc::new(renderer);
    let recognizer = Arc::new(recognizer);
    let translator = Arc::new(translator);
    let synthesizer = Arc::new(synthesizer);
    let collaborators = Collaborators::new(
        renderer.clone(),
        recognizer.clone(),
        translator.clone(),
        synthesizer.clone(),
    );
    Harness {
        renderer,
        recognizer,
        translator,
        synthesizer,
        pipeline: Arc::new(AudiobookPipeline::new(collaborators, config)),
    }
}

fn two_page_harness() -> Harness {
    harness_with(
        FakeRenderer::new(&["Page one text.", "Page two text."]),
        FakeRecognizer::default(),
        FakeSynthesizer::default(),
        AudiobookConfig::default(),
    )
}

fn request(range: PageRange, source: Language, target: Language) -> AudiobookRequest {
    AudiobookRequest::new(
        b"%PDF-1.7 fake".to_vec(),
        range,
        CropMargins::none(),
        source,
        target,
    )
}

fn recorder() -> (Arc<Mutex<Vec<ProgressEvent>>>, impl Fn(&ProgressEvent) + Send + Sync) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |e: &ProgressEvent| {
        sink.lock().unwrap().push(e.clone())
    })
}

fn stages(events: &[ProgressEvent]) -> Vec<PipelineStage> {
    let mut out: Vec<PipelineStage> = Vec::new();
    for e in events {
        if out.last() != Some(&e.stage) {
            out.push(e.stage);
        }
    }
    out
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_pages_become_one_wav() {
    let h = two_page_harness();
    let (events, cb) = recorder();
    let mut req = request(PageRange::new(1, 2), Language::English, Language::English);
    req.crop = CropMargins::new(50, 50);

    let output = h.pipeline.submit_with(req, &cb, None).await.unwrap();

    // Both pages are cropped by 50 points top and bottom at scale 1.
    let crop = RenderedCrop { top: 50, bottom: 50 };
    assert_eq!(*h.renderer.crops.lock().unwrap(), vec![(1, crop), (2, crop)]);

    let spoken = "Page one text. Page two text.";
    assert_eq!(output.chunks.len(), 1);
    assert_eq!(output.chunks[0].text, spoken);

    // No translation: the synthesizer receives the chunk text unchanged.
    assert_eq!(h.translator.calls.load(Ordering::SeqCst), 0);
    let chunk_texts: Vec<String> = output.chunks.iter().map(|c| c.text.clone()).collect();
    assert_eq!(h.synthesizer.texts(), chunk_texts);

    let n = spoken.chars().count();
    assert_eq!(output.audio.sample_rate, RATE);
    assert_eq!(output.audio.sample_count, n);
    assert_eq!(output.audio.len(), 44 + 2 * n);
    assert_eq!(&output.audio.bytes[..4], b"RIFF");

    let decoded = decode_wav(&output.audio.bytes).unwrap();
    assert_eq!(decoded.sample_rate, RATE);
    assert_eq!(decoded.samples.len(), n);

    let stats = &output.stats;
    assert_eq!(stats.pages_requested, 2);
    assert_eq!(stats.pages_processed, 2);
    assert_eq!(stats.chunk_count, 1);
    assert_eq!(stats.source_characters, n);
    assert!(!stats.translated);

    let events = events.lock().unwrap();
    assert_eq!(
        stages(&events),
        vec![
            PipelineStage::ExtractingPages,
            PipelineStage::RecognizingText,
            PipelineStage::Synthesizing,
            PipelineStage::Assembling,
            PipelineStage::Complete,
        ]
    );
    assert_eq!(h.pipeline.current_stage(), PipelineStage::Complete);
    assert!(!h.pipeline.is_processing());
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_at_100() {
    let h = harness_with(
        FakeRenderer::new(&[
            "First page. It has two sentences.",
            "Second page with more words in it.",
            "Third page closes the chapter.",
        ]),
        FakeRecognizer::default(),
        FakeSynthesizer::default(),
        AudiobookConfig::builder().max_chunk_size(24).build().unwrap(),
    );
    let (events, cb) = recorder();

    h.pipeline
        .submit_with(
            request(PageRange::new(1, 3), Language::English, Language::German),
            &cb,
            None,
        )
        .await
        .unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events[0].stage, PipelineStage::ExtractingPages);
    assert_eq!(events[0].percent_complete, 0.0);
    for pair in events.windows(2) {
        assert!(
            pair[1].percent_complete >= pair[0].percent_complete,
            "progress went backwards: {:?} -> {:?}",
            pair[0],
            pair[1]
        );
    }
    let last = events.last().unwrap();
    assert_eq!(last.stage, PipelineStage::Complete);
    assert_eq!(last.percent_complete, 100.0);
    assert_eq!(
        events.iter().filter(|e| e.stage.is_terminal()).count(),
        1,
        "exactly one terminal event"
    );
}

#[tokio::test]
async fn chunks_respect_configured_size() {
    let h = harness_with(
        FakeRenderer::new(&[
            "Short sentence one. Another short one here. And a final sentence to close.",
        ]),
        FakeRecognizer::default(),
        FakeSynthesizer::default(),
        AudiobookConfig::builder().max_chunk_size(30).build().unwrap(),
    );

    let output = h
        .pipeline
        .submit(request(PageRange::single(1), Language::English, Language::English))
        .await
        .unwrap();

    assert!(output.chunks.len() > 1);
    for (i, chunk) in output.chunks.iter().enumerate() {
        assert_eq!(chunk.index, i);
        assert!(chunk.text.chars().count() <= 30, "chunk too long: {:?}", chunk.text);
    }
    assert_eq!(h.synthesizer.texts().len(), output.chunks.len());
    let total: usize = output.chunks.iter().map(|c| c.text.chars().count()).sum();
    assert_eq!(output.audio.sample_count, total);
}

// ── Translation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn identical_languages_skip_translation() {
    let h = two_page_harness();
    let (events, cb) = recorder();

    h.pipeline
        .submit_with(
            request(PageRange::new(1, 2), Language::French, Language::French),
            &cb,
            None,
        )
        .await
        .unwrap();

    assert_eq!(h.translator.calls.load(Ordering::SeqCst), 0);
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .all(|e| e.stage != PipelineStage::Translating));
}

#[tokio::test]
async fn translated_text_is_what_gets_spoken() {
    let h = two_page_harness();
    let (events, cb) = recorder();

    let output = h
        .pipeline
        .submit_with(
            request(PageRange::new(1, 2), Language::English, Language::French),
            &cb,
            None,
        )
        .await
        .unwrap();

    assert_eq!(h.translator.calls.load(Ordering::SeqCst), output.chunks.len());
    assert!(output.stats.translated);
    for chunk in &output.chunks {
        assert!(chunk.text.starts_with("[fr] "), "untranslated: {:?}", chunk.text);
        assert_eq!(chunk.text, chunk.text.trim());
    }

    let spoken = h.synthesizer.spoken.lock().unwrap().clone();
    assert_eq!(spoken.len(), output.chunks.len());
    for ((text, voice), chunk) in spoken.iter().zip(&output.chunks) {
        assert_eq!(text, &chunk.text);
        assert_eq!(voice, &Language::French.default_voice());
    }

    assert!(stages(&events.lock().unwrap()).contains(&PipelineStage::Translating));
}

#[tokio::test]
async fn configured_voice_overrides_language_default() {
    let h = harness_with(
        FakeRenderer::new(&["Hello there."]),
        FakeRecognizer::default(),
        FakeSynthesizer::default(),
        AudiobookConfig::builder().voice("narrator-7").build().unwrap(),
    );

    h.pipeline
        .submit(request(PageRange::single(1), Language::English, Language::Spanish))
        .await
        .unwrap();

    let spoken = h.synthesizer.spoken.lock().unwrap().clone();
    assert!(spoken.iter().all(|(_, voice)| voice == "narrator-7"));
}

// ── Pages and cropping ───────────────────────────────────────────────────────

#[tokio::test]
async fn pages_past_the_end_are_dropped() {
    let h = two_page_harness();

    let output = h
        .pipeline
        .submit(request(PageRange::new(1, 5), Language::English, Language::English))
        .await
        .unwrap();

    assert_eq!(output.stats.pages_requested, 5);
    assert_eq!(output.stats.pages_processed, 2);
    assert_eq!(h.recognizer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn range_entirely_past_the_end_has_no_audio() {
    let h = two_page_harness();
    let (events, cb) = recorder();

    let err = h
        .pipeline
        .submit_with(
            request(PageRange::new(4, 6), Language::English, Language::English),
            &cb,
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AudiobookError::NoAudioData), "got {err:?}");
    assert_eq!(events.lock().unwrap().last().unwrap().stage, PipelineStage::Failed);
}

#[tokio::test]
async fn pages_are_processed_in_order() {
    let h = harness_with(
        FakeRenderer::new(&["alpha.", "beta.", "gamma.", "delta."]),
        FakeRecognizer::default(),
        FakeSynthesizer::default(),
        AudiobookConfig::default(),
    );

    let output = h
        .pipeline
        .submit(request(PageRange::new(2, 4), Language::English, Language::English))
        .await
        .unwrap();

    assert_eq!(output.chunks[0].text, "beta. gamma. delta.");
    let rendered: Vec<usize> = h.renderer.crops.lock().unwrap().iter().map(|(p, _)| *p).collect();
    assert_eq!(rendered, vec![2, 3, 4]);
}

#[tokio::test]
async fn crop_margins_are_scaled_for_the_renderer() {
    let h = harness_with(
        FakeRenderer::new(&["Cropped page."]).with_scale(2.0),
        FakeRecognizer::default(),
        FakeSynthesizer::default(),
        AudiobookConfig::default(),
    );
    let mut req = request(PageRange::single(1), Language::English, Language::English);
    req.crop = CropMargins::new(40, 30);

    h.pipeline.submit(req).await.unwrap();

    let crops = h.renderer.crops.lock().unwrap().clone();
    assert_eq!(crops, vec![(1, RenderedCrop { top: 80, bottom: 60 })]);
}

#[tokio::test]
async fn oversized_crop_is_rejected() {
    let h = two_page_harness();
    let (events, cb) = recorder();
    let mut req = request(PageRange::new(1, 2), Language::English, Language::English);
    // Default max_crop_fraction is 0.5 of a 792pt page.
    req.crop = CropMargins::new(500, 0);

    let err = h.pipeline.submit_with(req, &cb, None).await.unwrap_err();

    assert!(matches!(err, AudiobookError::InvalidCropRegion { page: 1, .. }), "got {err:?}");
    assert!(err.is_invalid_request());
    assert_eq!(h.recognizer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(events.lock().unwrap().last().unwrap().stage, PipelineStage::Failed);
}

// ── Validation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_request_fails_before_any_work() {
    let h = two_page_harness();
    let (events, cb) = recorder();

    let err = h
        .pipeline
        .submit_with(
            request(PageRange::new(3, 1), Language::English, Language::English),
            &cb,
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AudiobookError::InvalidRequest(_)), "got {err:?}");
    assert!(h.renderer.crops.lock().unwrap().is_empty());
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].stage, PipelineStage::Failed);
}

#[tokio::test]
async fn empty_document_is_rejected() {
    let h = two_page_harness();
    let req = AudiobookRequest::new(
        Vec::<u8>::new(),
        PageRange::single(1),
        CropMargins::none(),
        Language::English,
        Language::English,
    );

    let err = h.pipeline.submit(req).await.unwrap_err();
    assert!(matches!(err, AudiobookError::InvalidRequest(_)));
}

// ── Collaborator failures ────────────────────────────────────────────────────

#[tokio::test]
async fn recognizer_failure_aborts_the_run() {
    let h = harness_with(
        FakeRenderer::new(&["One.", "Two.", "Three."]),
        FakeRecognizer {
            fail_on_page: Some(2),
            ..Default::default()
        },
        FakeSynthesizer::default(),
        AudiobookConfig::default(),
    );
    let (events, cb) = recorder();

    let err = h
        .pipeline
        .submit_with(
            request(PageRange::new(1, 3), Language::English, Language::English),
            &cb,
            None,
        )
        .await
        .unwrap_err();

    match err {
        AudiobookError::CollaboratorFailure { stage, detail } => {
            assert_eq!(stage, PipelineStage::RecognizingText);
            assert!(detail.contains("overloaded"), "detail: {detail}");
        }
        other => panic!("expected CollaboratorFailure, got {other:?}"),
    }
    assert_eq!(h.recognizer.calls.load(Ordering::SeqCst), 2);
    assert!(h.synthesizer.texts().is_empty());

    let events = events.lock().unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.stage, PipelineStage::Failed);
    assert_eq!(events.iter().filter(|e| e.stage.is_terminal()).count(), 1);
    assert_eq!(h.pipeline.current_stage(), PipelineStage::Failed);
    assert!(!h.pipeline.is_processing());
}

#[tokio::test]
async fn mixed_sample_rates_fail_assembly() {
    let h = harness_with(
        FakeRenderer::new(&["First sentence here. Second sentence here."]),
        FakeRecognizer::default(),
        FakeSynthesizer {
            rates: vec![24_000, 16_000],
            ..Default::default()
        },
        AudiobookConfig::builder().max_chunk_size(22).build().unwrap(),
    );
    let (events, cb) = recorder();

    let err = h
        .pipeline
        .submit_with(
            request(PageRange::single(1), Language::English, Language::English),
            &cb,
            None,
        )
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            AudiobookError::SampleRateMismatch {
                segment: 1,
                expected: 24_000,
                found: 16_000
            }
        ),
        "got {err:?}"
    );
    let stages = stages(&events.lock().unwrap());
    assert_eq!(
        &stages[stages.len() - 2..],
        &[PipelineStage::Assembling, PipelineStage::Failed]
    );
}

#[tokio::test]
async fn silent_synthesis_is_a_collaborator_failure() {
    let h = harness_with(
        FakeRenderer::new(&["Say something."]),
        FakeRecognizer::default(),
        FakeSynthesizer {
            silent: true,
            ..Default::default()
        },
        AudiobookConfig::default(),
    );

    let err = h
        .pipeline
        .submit(request(PageRange::single(1), Language::English, Language::English))
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            AudiobookError::CollaboratorFailure {
                stage: PipelineStage::Synthesizing,
                ..
            }
        ),
        "got {err:?}"
    );
}

/// The run failed in `stage`, with exactly one terminal event, which is last.
fn assert_failed_in(
    result: Result<AudiobookOutput, AudiobookError>,
    events: &[ProgressEvent],
    stage: PipelineStage,
) -> String {
    let detail = match result {
        Err(AudiobookError::CollaboratorFailure { stage: s, detail }) => {
            assert_eq!(s, stage, "detail: {detail}");
            detail
        }
        other => panic!("expected CollaboratorFailure in {stage:?}, got {other:?}"),
    };
    assert_eq!(events.iter().filter(|e| e.stage.is_terminal()).count(), 1);
    assert_eq!(events.last().unwrap().stage, PipelineStage::Failed);
    detail
}

#[tokio::test]
async fn unreadable_page_count_fails_extraction() {
    let mut renderer = FakeRenderer::new(&["One.", "Two."]);
    renderer.fail_count = true;
    let h = harness_with(
        renderer,
        FakeRecognizer::default(),
        FakeSynthesizer::default(),
        AudiobookConfig::default(),
    );
    let (events, cb) = recorder();

    let result = h
        .pipeline
        .submit_with(
            request(PageRange::new(1, 2), Language::English, Language::English),
            &cb,
            None,
        )
        .await;

    let detail = assert_failed_in(result, &events.lock().unwrap(), PipelineStage::ExtractingPages);
    assert!(detail.contains("xref"), "detail: {detail}");
    assert!(h.renderer.crops.lock().unwrap().is_empty());
    assert_eq!(h.recognizer.calls.load(Ordering::SeqCst), 0);
    assert!(h.synthesizer.texts().is_empty());
    assert_eq!(h.pipeline.current_stage(), PipelineStage::Failed);
}

#[tokio::test]
async fn render_failure_fails_extraction() {
    let mut renderer = FakeRenderer::new(&["One.", "Two.", "Three."]);
    renderer.fail_render_on = Some(2);
    let h = harness_with(
        renderer,
        FakeRecognizer::default(),
        FakeSynthesizer::default(),
        AudiobookConfig::default(),
    );
    let (events, cb) = recorder();

    let result = h
        .pipeline
        .submit_with(
            request(PageRange::new(1, 3), Language::English, Language::English),
            &cb,
            None,
        )
        .await;

    let detail = assert_failed_in(result, &events.lock().unwrap(), PipelineStage::ExtractingPages);
    assert!(detail.contains("page 2"), "detail: {detail}");
    let rendered: Vec<usize> = h.renderer.crops.lock().unwrap().iter().map(|(p, _)| *p).collect();
    assert_eq!(rendered, vec![1, 2]);
    assert_eq!(h.recognizer.calls.load(Ordering::SeqCst), 0);
    assert!(h.synthesizer.texts().is_empty());
}

#[tokio::test]
async fn translator_failure_fails_translation() {
    let h = harness_full(
        FakeRenderer::new(&["First sentence here. Second sentence here."]),
        FakeRecognizer::default(),
        FakeTranslator {
            fail_on_call: Some(2),
            ..Default::default()
        },
        FakeSynthesizer::default(),
        AudiobookConfig::builder().max_chunk_size(22).build().unwrap(),
    );
    let (events, cb) = recorder();

    let result = h
        .pipeline
        .submit_with(
            request(PageRange::single(1), Language::English, Language::French),
            &cb,
            None,
        )
        .await;

    let detail = assert_failed_in(result, &events.lock().unwrap(), PipelineStage::Translating);
    assert!(detail.contains("429"), "detail: {detail}");
    assert_eq!(h.translator.calls.load(Ordering::SeqCst), 2);
    assert!(h.synthesizer.texts().is_empty());
}

#[tokio::test]
async fn synthesizer_failure_fails_synthesis() {
    let h = harness_with(
        FakeRenderer::new(&["First sentence here. Second sentence here."]),
        FakeRecognizer::default(),
        FakeSynthesizer {
            fail_on_chunk: Some(1),
            ..Default::default()
        },
        AudiobookConfig::builder().max_chunk_size(22).build().unwrap(),
    );
    let (events, cb) = recorder();

    let result = h
        .pipeline
        .submit_with(
            request(PageRange::single(1), Language::English, Language::English),
            &cb,
            None,
        )
        .await;

    let events = events.lock().unwrap();
    let detail = assert_failed_in(result, &events, PipelineStage::Synthesizing);
    assert!(detail.contains("voice model"), "detail: {detail}");
    assert_eq!(h.synthesizer.texts().len(), 2);
    assert!(!events.iter().any(|e| e.stage == PipelineStage::Assembling));
}

#[tokio::test]
async fn zero_hz_synthesis_is_a_collaborator_failure() {
    let h = harness_with(
        FakeRenderer::new(&["Say something."]),
        FakeRecognizer::default(),
        FakeSynthesizer {
            rates: vec![0],
            ..Default::default()
        },
        AudiobookConfig::default(),
    );
    let (events, cb) = recorder();

    let result = h
        .pipeline
        .submit_with(
            request(PageRange::single(1), Language::English, Language::English),
            &cb,
            None,
        )
        .await;

    let detail = assert_failed_in(result, &events.lock().unwrap(), PipelineStage::Synthesizing);
    assert!(detail.contains("0 Hz"), "detail: {detail}");
}

// ── Concurrency and cancellation ─────────────────────────────────────────────

#[tokio::test]
async fn second_request_is_rejected_while_busy() {
    let gate = Arc::new(Notify::new());
    let h = harness_with(
        FakeRenderer::new(&["Hold on."]),
        FakeRecognizer::default(),
        FakeSynthesizer {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        },
        AudiobookConfig::default(),
    );

    let pipeline = Arc::clone(&h.pipeline);
    let first = tokio::spawn(async move {
        pipeline
            .submit(request(PageRange::single(1), Language::English, Language::English))
            .await
    });

    // Wait until the first run is parked inside the synthesizer.
    for _ in 0..200 {
        if h.pipeline.current_stage() == PipelineStage::Synthesizing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(h.pipeline.is_processing());
    assert!(h.pipeline.current_stage().is_busy());

    let (events, cb) = recorder();
    let err = h
        .pipeline
        .submit_with(
            request(PageRange::single(1), Language::English, Language::English),
            &cb,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AudiobookError::AlreadyProcessing), "got {err:?}");
    assert!(events.lock().unwrap().is_empty(), "rejection must not emit events");

    gate.notify_one();
    let output = first.await.unwrap().unwrap();
    assert_eq!(output.chunks.len(), 1);
    assert!(!h.pipeline.is_processing());

    // The pipeline accepts work again once idle.
    gate.notify_one();
    h.pipeline
        .submit(request(PageRange::single(1), Language::English, Language::English))
        .await
        .unwrap();
}

#[tokio::test]
async fn cancellation_stops_at_the_next_unit() {
    let h = two_page_harness();
    let flag = CancellationFlag::new();
    let trigger = flag.clone();
    let (events, record) = recorder();
    let cb = move |e: &ProgressEvent| {
        if e.stage == PipelineStage::RecognizingText {
            trigger.cancel();
        }
        record(e);
    };

    let err = h
        .pipeline
        .submit_with(
            request(PageRange::new(1, 2), Language::English, Language::English),
            &cb,
            Some(&flag),
        )
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            AudiobookError::Cancelled {
                stage: PipelineStage::RecognizingText
            }
        ),
        "got {err:?}"
    );
    assert_eq!(h.recognizer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(events.lock().unwrap().last().unwrap().stage, PipelineStage::Failed);
}

#[tokio::test]
async fn pre_cancelled_run_does_no_rendering() {
    let h = two_page_harness();
    let flag = CancellationFlag::new();
    flag.cancel();

    let err = h
        .pipeline
        .submit_with(
            request(PageRange::new(1, 2), Language::English, Language::English),
            &edgequake_pdf2audio::NoopProgressCallback,
            Some(&flag),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AudiobookError::Cancelled {
            stage: PipelineStage::ExtractingPages
        }
    ));
    assert!(h.renderer.crops.lock().unwrap().is_empty());
}

// ── Stream and storage ───────────────────────────────────────────────────────

#[tokio::test]
async fn stream_ends_with_one_terminal_update() {
    let h = two_page_harness();

    let updates: Vec<PipelineUpdate> = Arc::clone(&h.pipeline)
        .submit_stream(request(PageRange::new(1, 2), Language::English, Language::Italian))
        .collect()
        .await;

    assert!(updates.len() > 2);
    assert_eq!(updates.iter().filter(|u| u.is_terminal()).count(), 1);
    match updates.last().unwrap() {
        PipelineUpdate::Complete(output) => assert!(!output.audio.is_empty()),
        other => panic!("expected Complete, got {other:?}"),
    }
    match &updates[updates.len() - 2] {
        PipelineUpdate::Progress(e) => assert_eq!(e.stage, PipelineStage::Complete),
        other => panic!("expected the Complete progress event, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_reports_failures() {
    let h = harness_with(
        FakeRenderer::new(&["One."]),
        FakeRecognizer {
            fail_on_page: Some(1),
            ..Default::default()
        },
        FakeSynthesizer::default(),
        AudiobookConfig::default(),
    );

    let updates: Vec<PipelineUpdate> = Arc::clone(&h.pipeline)
        .submit_stream(request(PageRange::single(1), Language::English, Language::English))
        .collect()
        .await;

    match updates.last().unwrap() {
        PipelineUpdate::Failed(msg) => assert!(msg.starts_with("Text recognition failed"), "msg: {msg}"),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn submit_to_storage_writes_the_wav() {
    let h = two_page_harness();
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path());

    let path = h
        .pipeline
        .submit_to_storage(
            request(PageRange::new(1, 2), Language::English, Language::English),
            &storage,
            "book.wav",
        )
        .await
        .unwrap();

    assert_eq!(path, dir.path().join("book.wav"));
    let bytes = std::fs::read(&path).unwrap();
    let decoded = decode_wav(&bytes).unwrap();
    assert_eq!(decoded.sample_rate, RATE);
    assert_eq!(
        decoded.samples.len(),
        "Page one text. Page two text.".chars().count()
    );
}

#[tokio::test]
async fn storage_failure_fails_in_assembly() {
    let h = two_page_harness();
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path());

    let err = h
        .pipeline
        .submit_to_storage(
            request(PageRange::new(1, 2), Language::English, Language::English),
            &storage,
            "../escape.wav",
        )
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            AudiobookError::CollaboratorFailure {
                stage: PipelineStage::Assembling,
                ..
            }
        ),
        "got {err:?}"
    );
    assert_eq!(h.pipeline.current_stage(), PipelineStage::Failed);
}

#[tokio::test]
async fn storage_with_progress_returns_output_and_path() {
    let h = two_page_harness();
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path());
    let (events, cb) = recorder();

    let (output, path) = h
        .pipeline
        .submit_to_storage_with(
            request(PageRange::new(1, 2), Language::English, Language::English),
            &storage,
            "book.wav",
            &cb,
            None,
        )
        .await
        .unwrap();

    assert_eq!(path, dir.path().join("book.wav"));
    assert_eq!(std::fs::read(&path).unwrap(), output.audio.bytes);
    assert_eq!(output.stats.pages_processed, 2);
    assert_eq!(events.lock().unwrap().last().unwrap().stage, PipelineStage::Complete);
}

#[test]
fn blocking_submit_outside_a_runtime() {
    let h = two_page_harness();
    let output = h
        .pipeline
        .submit_blocking(request(PageRange::new(1, 2), Language::English, Language::English))
        .unwrap();
    assert_eq!(output.stats.pages_processed, 2);
}
