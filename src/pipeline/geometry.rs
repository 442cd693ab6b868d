//! Mapping crop margins between source-page and rendered-pixel coordinates.
//!
//! Users pick crop margins against the page in PDF units (points, 72 per
//! inch). Renderers rasterise at some scale factor `s`, so the margins they
//! apply must be `margin * s`. The same mapping in the other direction drives
//! an on-screen overlay: with a thumbnail `display_width` pixels wide the
//! factor is `display_width / source_width`.

use crate::error::AudiobookError;
use crate::request::CropMargins;
use serde::{Deserialize, Serialize};

/// Size of a source page and the scale its renderer will use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// 1-indexed page number, for error messages.
    pub page_num: usize,
    /// Page width in source units.
    pub width: f32,
    /// Page height in source units.
    pub height: f32,
    /// Rendered pixels per source unit.
    pub scale: f32,
}

impl PageGeometry {
    pub fn rendered_width(&self) -> u32 {
        (self.width * self.scale).round() as u32
    }

    pub fn rendered_height(&self) -> u32 {
        (self.height * self.scale).round() as u32
    }
}

/// Crop margins in rendered pixels, ready for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderedCrop {
    pub top: u32,
    pub bottom: u32,
}

impl RenderedCrop {
    /// Height left after cropping an image `height` pixels tall.
    pub fn remaining_height(&self, height: u32) -> u32 {
        height.saturating_sub(self.top).saturating_sub(self.bottom)
    }
}

/// Validates and scales crop margins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometryMapper {
    max_crop_fraction: f32,
}

impl Default for PageGeometryMapper {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl PageGeometryMapper {
    /// `max_crop_fraction` caps each margin as a share of the page height.
    pub fn new(max_crop_fraction: f32) -> Self {
        Self {
            max_crop_fraction: max_crop_fraction.clamp(0.0, 1.0),
        }
    }

    /// Scale `crop` into rendered pixels for `page`.
    ///
    /// # Errors
    /// [`AudiobookError::InvalidCropRegion`] when the margins leave no rows,
    /// or when one margin exceeds the configured fraction of the page.
    pub fn to_rendered(
        &self,
        crop: CropMargins,
        page: &PageGeometry,
    ) -> Result<RenderedCrop, AudiobookError> {
        let height = page.rendered_height();
        let rendered = RenderedCrop {
            top: scale_px(crop.top, page.scale),
            bottom: scale_px(crop.bottom, page.scale),
        };

        if crop.is_none() {
            return Ok(rendered);
        }

        let limit = (page.height * self.max_crop_fraction).floor() as u32;
        let too_deep = crop.top > limit || crop.bottom > limit;
        if too_deep || rendered.top as u64 + rendered.bottom as u64 >= height as u64 {
            return Err(AudiobookError::InvalidCropRegion {
                page: page.page_num,
                top: rendered.top,
                bottom: rendered.bottom,
                height,
            });
        }

        Ok(rendered)
    }

    /// Scale from source units to a preview `display_width` pixels wide.
    pub fn display_scale(display_width: f32, source_width: f32) -> f32 {
        if source_width <= 0.0 {
            0.0
        } else {
            display_width / source_width
        }
    }

    /// Margins as drawn on a preview scaled by `display_scale`.
    pub fn to_display(crop: CropMargins, display_scale: f32) -> (f32, f32) {
        (
            crop.top as f32 * display_scale,
            crop.bottom as f32 * display_scale,
        )
    }
}

fn scale_px(source: u32, scale: f32) -> u32 {
    (source as f32 * scale).round().max(0.0) as u32
}
