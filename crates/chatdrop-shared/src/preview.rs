use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;

use crate::constants::PREVIEW_MAX_EDGE;
use crate::error::PreviewError;

// Thumbnails keep the aspect ratio and are never upscaled.
pub fn image_preview(image_bytes: &[u8]) -> Result<String, PreviewError> {
    let img = image::load_from_memory(image_bytes)?;
    let thumb = if img.width() > PREVIEW_MAX_EDGE || img.height() > PREVIEW_MAX_EDGE {
        img.thumbnail(PREVIEW_MAX_EDGE, PREVIEW_MAX_EDGE)
    } else {
        img
    };

    let mut buf = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buf);
    thumb.write_to(&mut cursor, ImageFormat::Png)?;

    Ok(format!("data:image/png;base64,{}", STANDARD.encode(&buf)))
}
