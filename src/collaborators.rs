//! Seams between the orchestrator and the outside world.
//!
//! Every external capability the pipeline needs is an async trait here. The
//! orchestrator only ever sees `Arc<dyn Trait>`, so the bundled
//! implementations ([`crate::pipeline::render::PdfiumPageRenderer`],
//! [`crate::pipeline::llm::VisionTextRecognizer`], …) can be swapped for
//! fakes in tests or for other backends in production.
//!
//! All methods return [`ServiceError`]; the orchestrator attaches the stage.

use crate::error::ServiceError;
use crate::pipeline::geometry::{PageGeometry, RenderedCrop};
use crate::pipeline::wav::AudioSegment;
use crate::request::Language;
use async_trait::async_trait;
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;

/// What a renderer produced for one page.
#[derive(Debug, Clone)]
pub enum PageContent {
    /// A cropped raster, to be read by a vision recognizer.
    Image(DynamicImage),
    /// Text already extracted by the renderer (e.g. a text layer).
    Text(String),
}

/// One page after extraction and cropping.
#[derive(Debug, Clone)]
pub struct ProcessedPage {
    /// 1-indexed page number.
    pub page_num: usize,
    pub content: PageContent,
}

/// Opens a document and produces cropped pages.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Number of pages in `document`.
    async fn page_count(&self, document: &Arc<[u8]>) -> Result<usize, ServiceError>;

    /// Source size of page `page_num` (1-indexed) and the scale `render`
    /// will use for it.
    async fn page_geometry(
        &self,
        document: &Arc<[u8]>,
        page_num: usize,
    ) -> Result<PageGeometry, ServiceError>;

    /// Render page `page_num` with `crop` already in rendered pixels.
    async fn render(
        &self,
        document: &Arc<[u8]>,
        page_num: usize,
        crop: RenderedCrop,
    ) -> Result<ProcessedPage, ServiceError>;
}

/// Turns a page into plain text.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(
        &self,
        page: &ProcessedPage,
        language_hint: Language,
    ) -> Result<String, ServiceError>;
}

/// Translates one chunk of text.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        source: Language,
        target: Language,
        text: &str,
    ) -> Result<String, ServiceError>;
}

/// Speaks one chunk of text.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioSegment, ServiceError>;
}

/// Writes finished audio somewhere durable.
#[async_trait]
pub trait AudioStorage: Send + Sync {
    /// Store `bytes` under `destination_name` and return where they landed.
    async fn persist(&self, bytes: &[u8], destination_name: &str)
        -> Result<PathBuf, ServiceError>;
}

/// The set of collaborators one pipeline instance drives.
#[derive(Clone)]
pub struct Collaborators {
    pub renderer: Arc<dyn PageRenderer>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub translator: Arc<dyn Translator>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl Collaborators {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        recognizer: Arc<dyn TextRecognizer>,
        translator: Arc<dyn Translator>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            renderer,
            recognizer,
            translator,
            synthesizer,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
