//! Image encoding: [`RenderedImage`] → base64 payloads for vision APIs.
//!
//! Vision APIs accept images as base64 embedded in the JSON request body.
//! The bytes are wrapped exactly as rendered; nothing is re-encoded here.

use crate::document::RenderedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Base64 of the encoded image bytes.
pub fn to_base64(image: &RenderedImage) -> String {
    let b64 = STANDARD.encode(&image.data);
    debug!(
        "Encoded {}x{} {} → {} bytes base64",
        image.width,
        image.height,
        image.encoding.mime(),
        b64.len()
    );
    b64
}

/// Wrap the image for an `edgequake-llm` chat message.
///
/// `detail: "high"` keeps fine pen strokes legible on providers that tile
/// images (OpenAI-style); others ignore it.
pub fn to_image_data(image: &RenderedImage) -> ImageData {
    ImageData::new(to_base64(image), image.encoding.mime()).with_detail("high")
}
