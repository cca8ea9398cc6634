//! Conversions between wire payloads (base64 text, encoded image bytes) and
//! [`Frame`] rasters.

use crate::model::Frame;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use kornia_image::{Image, ImageSize, allocator::CpuAllocator};
use std::io::Cursor;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("image payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("image payload could not be decoded: {0}")]
    Decode(#[source] image::ImageError),

    #[error("frame could not be encoded: {0}")]
    Encode(#[source] image::ImageError),

    #[error("raster does not match its {width}x{height} size")]
    Shape { width: usize, height: usize },
}

/// Decodes a base64 image payload into an RGB frame.
///
/// Accepts either bare base64 or a `data:<mime>;base64,` URL.
pub fn decode_base64_image(payload: &str) -> Result<Frame, CodecError> {
    // MIME-style payloads wrap lines; the standard engine rejects whitespace
    let encoded: Vec<u8> = strip_data_url(payload.trim())
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let bytes = BASE64.decode(encoded)?;
    decode_image_bytes(&bytes)
}

/// Decodes encoded image bytes (any format the codec was built with).
pub fn decode_image_bytes(bytes: &[u8]) -> Result<Frame, CodecError> {
    let rgb = image::load_from_memory(bytes)
        .map_err(CodecError::Decode)?
        .to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    Image::new(ImageSize { width, height }, rgb.into_raw(), CpuAllocator)
        .map_err(|_| CodecError::Shape { width, height })
}

/// Encodes a frame as JPEG and returns the base64 text.
pub fn encode_jpeg_base64(frame: &Frame) -> Result<String, CodecError> {
    let size = frame.size();
    let rgb = image::RgbImage::from_raw(
        size.width as u32,
        size.height as u32,
        frame.as_slice().to_vec(),
    )
    .ok_or(CodecError::Shape {
        width: size.width,
        height: size.height,
    })?;

    let mut buffer = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(rgb)
        .write_to(&mut buffer, image::ImageFormat::Jpeg)
        .map_err(CodecError::Encode)?;

    Ok(BASE64.encode(buffer.into_inner()))
}

/// Base64 for arbitrary bytes, e.g. an image file read from disk.
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

fn strip_data_url(payload: &str) -> &str {
    match payload.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => payload,
    }
}
