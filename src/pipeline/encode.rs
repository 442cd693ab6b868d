//! Image encoding: cropped page `DynamicImage` → base64 PNG `ImageData`.
//!
//! PNG keeps rendered glyph edges intact; JPEG artefacts around small text
//! measurably hurt recognition. `detail: "high"` lets GPT-4-class models
//! tile the full image instead of reading one 512 px overview.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a cropped page as a base64 PNG for a vision request.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} page → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
