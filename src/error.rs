//! Error types for the edgequake-pdf2audio library.
//!
//! Two error types mirror the two sides of the pipeline:
//!
//! * [`AudiobookError`] is what callers see. Every variant is terminal for the
//!   request that produced it: the pipeline moves to
//!   [`crate::progress::PipelineStage::Failed`] and no partial audio is
//!   returned.
//!
//! * [`ServiceError`] is what the external collaborators (renderer,
//!   recognizer, translator, synthesizer, storage) return. The orchestrator
//!   wraps it into [`AudiobookError::CollaboratorFailure`] together with the
//!   stage that was running.

use crate::progress::PipelineStage;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-pdf2audio library.
#[derive(Debug, Error)]
pub enum AudiobookError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The request itself is malformed (empty document, bad page range).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Crop margins would leave an empty or negative-height page.
    #[error(
        "Invalid crop region on page {page}: top {top}px + bottom {bottom}px \
         leaves nothing of a {height}px page"
    )]
    InvalidCropRegion {
        page: usize,
        top: u32,
        bottom: u32,
        height: u32,
    },

    /// Another request is still running on this pipeline instance.
    #[error("A request is already being processed; wait for it to finish and resubmit")]
    AlreadyProcessing,

    // ── Stage errors ──────────────────────────────────────────────────────
    /// An external collaborator failed while the pipeline was in `stage`.
    #[error("{} failed: {detail}", stage.label())]
    CollaboratorFailure {
        stage: PipelineStage,
        detail: String,
    },

    /// Assembly received no samples at all.
    #[error("No audio data to assemble: the document produced no speakable text")]
    NoAudioData,

    /// Segments disagree on their sample rate.
    #[error("Sample rate mismatch: segment {segment} is {found} Hz, expected {expected} Hz")]
    SampleRateMismatch {
        segment: usize,
        expected: u32,
        found: u32,
    },

    /// A segment claims a sample rate of 0 Hz.
    #[error("Invalid sample rate: segment {segment} reports 0 Hz")]
    InvalidSampleRate { segment: usize },

    /// The run was cancelled between two units of work.
    #[error("Cancelled during {}", stage.label())]
    Cancelled { stage: PipelineStage },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("Input is not a valid PDF: '{source_name}'\nFirst bytes: {magic:?}")]
    NotAPdf { source_name: String, magic: [u8; 4] },

    // ── Provider errors ───────────────────────────────────────────────────
    /// The configured LLM provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AudiobookError {
    /// Wrap a collaborator error with the stage it happened in.
    pub fn collaborator(stage: PipelineStage, detail: impl std::fmt::Display) -> Self {
        Self::CollaboratorFailure {
            stage,
            detail: detail.to_string(),
        }
    }

    /// `true` for errors caused by the request rather than by a collaborator.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_) | Self::InvalidCropRegion { .. }
        )
    }
}

/// Error returned by an external collaborator.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ServiceError {
    /// Input could not be decoded (malformed PDF, unreadable WAV, bad image).
    #[error("decoding failed: {0}")]
    Decode(String),

    /// The backing service or library is not reachable or not installed.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with an error.
    #[error("request failed: {0}")]
    Request(String),

    /// The service succeeded but returned nothing usable.
    #[error("empty output: {0}")]
    EmptyOutput(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}
