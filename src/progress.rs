//! Pipeline stages and the progress events emitted while a request runs.
//!
//! Inject an [`Arc<dyn ProgressCallback>`] via
//! [`crate::config::AudiobookConfigBuilder::progress_callback`] (or pass one
//! to [`crate::AudiobookPipeline::submit_with`]) to receive a
//! [`ProgressEvent`] on entering every stage and after every page or chunk.
//!
//! Percentages are interpolated between fixed per-stage anchors:
//!
//! | Stage | Range |
//! |-------|-------|
//! | ExtractingPages | 0 – 10 |
//! | RecognizingText | 10 – 60 |
//! | Translating | 60 – 75 |
//! | Synthesizing | 75 – 95 |
//! | Assembling | 95 – 100 |
//!
//! Within one request the emitted percentage never decreases, and a
//! successful run always ends with a `Complete` event at exactly 100.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2audio::{AudiobookConfig, ProgressCallback, ProgressEvent};
//! use std::sync::Arc;
//!
//! let log = |event: &ProgressEvent| {
//!     eprintln!("[{:>5.1}%] {}", event.percent_complete, event.message);
//! };
//!
//! let config = AudiobookConfig::builder()
//!     .progress_callback(Arc::new(log) as Arc<dyn ProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One phase of the linear processing pipeline.
///
/// ```text
/// Idle ─▶ ExtractingPages ─▶ RecognizingText ─▶ [Translating] ─▶ Synthesizing ─▶ Assembling ─▶ Complete
///              any stage ──error──▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PipelineStage {
    #[default]
    Idle,
    ExtractingPages,
    RecognizingText,
    Translating,
    Synthesizing,
    Assembling,
    Complete,
    Failed,
}

impl PipelineStage {
    /// Start and end percentage of this stage on the overall progress bar.
    pub fn anchors(self) -> (f32, f32) {
        match self {
            PipelineStage::Idle => (0.0, 0.0),
            PipelineStage::ExtractingPages => (0.0, 10.0),
            PipelineStage::RecognizingText => (10.0, 60.0),
            PipelineStage::Translating => (60.0, 75.0),
            PipelineStage::Synthesizing => (75.0, 95.0),
            PipelineStage::Assembling => (95.0, 100.0),
            PipelineStage::Complete => (100.0, 100.0),
            PipelineStage::Failed => (0.0, 100.0),
        }
    }

    /// Short human-readable label, used in messages and error text.
    pub fn label(self) -> &'static str {
        match self {
            PipelineStage::Idle => "Idle",
            PipelineStage::ExtractingPages => "Page extraction",
            PipelineStage::RecognizingText => "Text recognition",
            PipelineStage::Translating => "Translation",
            PipelineStage::Synthesizing => "Speech synthesis",
            PipelineStage::Assembling => "Audio assembly",
            PipelineStage::Complete => "Complete",
            PipelineStage::Failed => "Failed",
        }
    }

    /// `true` for the two states a request ends in.
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Complete | PipelineStage::Failed)
    }

    /// `true` while a request is actively being worked on.
    pub fn is_busy(self) -> bool {
        !matches!(
            self,
            PipelineStage::Idle | PipelineStage::Complete | PipelineStage::Failed
        )
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Stage that was current when the event was emitted.
    pub stage: PipelineStage,
    /// Overall completion, 0–100.
    pub percent_complete: f32,
    /// Human-readable status line.
    pub message: String,
}

/// Receives progress events from the pipeline.
///
/// Events are delivered synchronously from the task running the request, in
/// emission order. Implementations should return quickly; forward to a
/// channel if the real work is slow.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressCallback for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ProgressCallback for NoopProgressCallback {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Convenience alias matching the type stored in [`crate::config::AudiobookConfig`].
pub type SharedProgressCallback = Arc<dyn ProgressCallback>;

/// Per-request owner of the current stage and percentage.
///
/// Clamps every emitted percentage to `[last, 100]`.
pub(crate) struct ProgressTracker<'a> {
    sink: &'a dyn ProgressCallback,
    stage: PipelineStage,
    percent: f32,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressCallback) -> Self {
        Self {
            sink,
            stage: PipelineStage::Idle,
            percent: 0.0,
        }
    }

    pub(crate) fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Transition into `stage` and emit its entry event.
    pub(crate) fn enter(&mut self, stage: PipelineStage, message: impl Into<String>) {
        self.stage = stage;
        let (start, _) = stage.anchors();
        self.emit(start, message.into());
    }

    /// Report `done` of `total` units finished within the current stage.
    pub(crate) fn advance(&mut self, done: usize, total: usize, message: impl Into<String>) {
        let (start, end) = self.stage.anchors();
        let fraction = if total == 0 {
            1.0
        } else {
            (done as f32 / total as f32).min(1.0)
        };
        self.emit(start + (end - start) * fraction, message.into());
    }

    pub(crate) fn complete(&mut self, message: impl Into<String>) {
        self.stage = PipelineStage::Complete;
        self.emit(100.0, message.into());
    }

    /// Final event of a failed run; keeps the last percentage.
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.stage = PipelineStage::Failed;
        let percent = self.percent;
        self.emit(percent, message.into());
    }

    fn emit(&mut self, percent: f32, message: String) {
        let percent = percent.clamp(self.percent, 100.0);
        self.percent = percent;
        self.sink.on_progress(&ProgressEvent {
            stage: self.stage,
            percent_complete: percent,
            message,
        });
    }
}
