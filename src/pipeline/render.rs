//! PDF rasterisation and cropping via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for the whole render. Every pdfium call therefore runs
//! on tokio's blocking pool so worker threads never stall.
//!
//! ## Scale
//!
//! Pages render at `dpi / 72` pixels per point, reduced when needed so the
//! longest edge stays within `max_rendered_pixels`. The same factor is
//! reported by [`PageRenderer::page_geometry`], so crop margins mapped with
//! [`crate::pipeline::geometry::PageGeometryMapper`] line up with the
//! bitmap this module crops.

use crate::collaborators::{PageContent, PageRenderer, ProcessedPage};
use crate::config::AudiobookConfig;
use crate::error::ServiceError;
use crate::pipeline::geometry::{PageGeometry, RenderedCrop};
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info};

/// [`PageRenderer`] backed by the pdfium library.
///
/// The library is located via `PDFIUM_LIB_PATH` (a directory), then the
/// working directory, then the system library path.
#[derive(Debug, Clone)]
pub struct PdfiumPageRenderer {
    dpi: u32,
    max_rendered_pixels: u32,
    password: Option<String>,
    sizes: Arc<PageSizes>,
}

/// Page sizes in points, recorded by the last `page_count` call so
/// `page_geometry` does not reopen the document.
///
/// Keyed by the identity of the document `Arc`, not its contents; the
/// entry goes stale as soon as that `Arc` is dropped.
#[derive(Debug, Default)]
struct PageSizes(Mutex<Option<(Weak<[u8]>, Vec<(f32, f32)>)>>);

impl PageSizes {
    fn store(&self, document: &Arc<[u8]>, sizes: Vec<(f32, f32)>) {
        let mut guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some((Arc::downgrade(document), sizes));
    }

    fn get(&self, document: &Arc<[u8]>, page_num: usize) -> Option<(f32, f32)> {
        let guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        let (cached, sizes) = guard.as_ref()?;
        let cached = cached.upgrade()?;
        if !Arc::ptr_eq(&cached, document) {
            return None;
        }
        sizes.get(page_num.checked_sub(1)?).copied()
    }
}

impl Default for PdfiumPageRenderer {
    fn default() -> Self {
        Self::from_config(&AudiobookConfig::default())
    }
}

impl PdfiumPageRenderer {
    pub fn new(dpi: u32, max_rendered_pixels: u32) -> Self {
        Self {
            dpi,
            max_rendered_pixels,
            password: None,
            sizes: Arc::default(),
        }
    }

    pub fn from_config(config: &AudiobookConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_rendered_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            sizes: Arc::default(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Run `f` against the loaded document on the blocking pool.
    async fn with_document<T, F>(&self, document: &Arc<[u8]>, f: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(&PdfDocument<'_>) -> Result<T, ServiceError> + Send + 'static,
    {
        let bytes = Arc::clone(document);
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || {
            let pdfium = bind_pdfium()?;
            let doc = pdfium
                .load_pdf_from_byte_slice(&bytes, password.as_deref())
                .map_err(|e| load_error(e, password.is_some()))?;
            f(&doc)
        })
        .await
        .map_err(|e| ServiceError::Other(format!("Render task panicked: {}", e)))?
    }
}

#[async_trait]
impl PageRenderer for PdfiumPageRenderer {
    async fn page_count(&self, document: &Arc<[u8]>) -> Result<usize, ServiceError> {
        let sizes = self
            .with_document(document, |doc| {
                Ok(doc
                    .pages()
                    .iter()
                    .map(|page| (page.width().value, page.height().value))
                    .collect::<Vec<_>>())
            })
            .await?;
        let count = sizes.len();
        self.sizes.store(document, sizes);
        info!("PDF loaded: {} pages", count);
        Ok(count)
    }

    async fn page_geometry(
        &self,
        document: &Arc<[u8]>,
        page_num: usize,
    ) -> Result<PageGeometry, ServiceError> {
        let (dpi, max_px) = (self.dpi, self.max_rendered_pixels);
        if let Some((width, height)) = self.sizes.get(document, page_num) {
            return Ok(geometry_from_size(page_num, width, height, dpi, max_px));
        }
        self.with_document(document, move |doc| {
            let page = load_page(doc, page_num)?;
            Ok(geometry_of(&page, page_num, dpi, max_px))
        })
        .await
    }

    async fn render(
        &self,
        document: &Arc<[u8]>,
        page_num: usize,
        crop: RenderedCrop,
    ) -> Result<ProcessedPage, ServiceError> {
        let (dpi, max_px) = (self.dpi, self.max_rendered_pixels);
        let image = self
            .with_document(document, move |doc| {
                let page = load_page(doc, page_num)?;
                let geometry = geometry_of(&page, page_num, dpi, max_px);
                let config = PdfRenderConfig::new().scale_page_by_factor(geometry.scale);
                let bitmap = page.render_with_config(&config).map_err(|e| {
                    ServiceError::Decode(format!("page {}: rasterisation failed: {:?}", page_num, e))
                })?;
                let image = bitmap.as_image();
                debug!(
                    "Rendered page {} → {}x{} px",
                    page_num,
                    image.width(),
                    image.height()
                );
                crop_rendered(image, crop, page_num)
            })
            .await?;

        Ok(ProcessedPage {
            page_num,
            content: PageContent::Image(image),
        })
    }
}

/// Pixels per PDF point for a `width` × `height` page.
pub fn render_scale(width: f32, height: f32, dpi: u32, max_rendered_pixels: u32) -> f32 {
    let scale = dpi as f32 / 72.0;
    let longest = width.max(height);
    if longest <= 0.0 {
        return scale;
    }
    scale.min(max_rendered_pixels as f32 / longest)
}

/// Remove `crop.top` rows from the top and `crop.bottom` rows from the bottom.
pub fn crop_rendered(
    image: DynamicImage,
    crop: RenderedCrop,
    page_num: usize,
) -> Result<DynamicImage, ServiceError> {
    if crop == RenderedCrop::default() {
        return Ok(image);
    }

    let (width, height) = (image.width(), image.height());
    let remaining = crop.remaining_height(height);
    if remaining == 0 {
        return Err(ServiceError::Other(format!(
            "page {}: crop {}+{} px leaves nothing of a {} px bitmap",
            page_num, crop.top, crop.bottom, height
        )));
    }
    Ok(image.crop_imm(0, crop.top, width, remaining))
}

fn geometry_of(page: &PdfPage<'_>, page_num: usize, dpi: u32, max_px: u32) -> PageGeometry {
    geometry_from_size(page_num, page.width().value, page.height().value, dpi, max_px)
}

fn geometry_from_size(
    page_num: usize,
    width: f32,
    height: f32,
    dpi: u32,
    max_px: u32,
) -> PageGeometry {
    PageGeometry {
        page_num,
        width,
        height,
        scale: render_scale(width, height, dpi, max_px),
    }
}

fn load_page<'a>(doc: &PdfDocument<'a>, page_num: usize) -> Result<PdfPage<'a>, ServiceError> {
    let index = page_num
        .checked_sub(1)
        .and_then(|i| u16::try_from(i).ok())
        .ok_or_else(|| ServiceError::Other(format!("page {} is not addressable", page_num)))?;
    doc.pages()
        .get(index)
        .map_err(|e| ServiceError::Decode(format!("page {}: {:?}", page_num, e)))
}

fn bind_pdfium() -> Result<Pdfium, ServiceError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| {
        ServiceError::Unavailable(format!(
            "pdfium library not found ({:?}); set PDFIUM_LIB_PATH to the directory containing it",
            e
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn load_error(e: PdfiumError, had_password: bool) -> ServiceError {
    let detail = format!("{:?}", e);
    if detail.to_ascii_lowercase().contains("password") {
        if had_password {
            ServiceError::Decode("document password is incorrect".into())
        } else {
            ServiceError::Decode("document is password-protected; supply a password".into())
        }
    } else {
        ServiceError::Decode(format!("not a readable PDF: {}", detail))
    }
}
