//! Image encoding: `DynamicImage` → PNG bytes → base64 for the request body.
//!
//! The Anthropic message format on Bedrock embeds images as base64 strings
//! inside the JSON payload, tagged with their media type. PNG is lossless,
//! so small print in tables stays legible to the model.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Media type of every image this crate produces.
pub const PNG_MEDIA_TYPE: &str = "image/png";

/// Encode a rasterised page as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Standard (padded) base64 of raw image bytes, as Bedrock expects.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = encode_png(&img).expect("encode should succeed");
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let b64 = to_base64(&png);
        let decoded = STANDARD.decode(&b64).expect("valid base64");
        assert_eq!(decoded, png);
    }

    #[test]
    fn base64_is_padded_standard_alphabet() {
        assert_eq!(to_base64(b"ab"), "YWI=");
        assert_eq!(to_base64(&[0xfb, 0xff]), "+/8=");
    }
}
