//! Fetched image decoding

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageReader;
use sha2::{Digest, Sha256};
use std::io::Cursor;

/// A decoded image candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebImage {
    /// Source URL as it appears on the page
    pub src: String,

    /// MIME type sniffed from the bytes
    pub mime: String,

    pub width: u32,
    pub height: u32,

    /// Hex SHA-256 of the raw bytes
    pub hash: String,

    /// Raw image bytes
    pub bytes: Vec<u8>,
}

impl WebImage {
    /// Pixel area of the image
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Decodes raw bytes into a `WebImage`
///
/// Only the header is read: the format is sniffed from magic bytes and the
/// dimensions come from the decoder without decoding pixels. Returns `None`
/// when the bytes are not a supported image.
pub fn decode_image(src: &str, bytes: Vec<u8>) -> Option<WebImage> {
    let reader = ImageReader::new(Cursor::new(bytes.as_slice()))
        .with_guessed_format()
        .ok()?;

    let format = reader.format()?;
    let (width, height) = match reader.into_dimensions() {
        Ok(dimensions) => dimensions,
        Err(e) => {
            tracing::debug!("Failed to read dimensions of {}: {}", truncate(src), e);
            return None;
        }
    };

    let hash = hex::encode(Sha256::digest(&bytes));

    Some(WebImage {
        src: src.to_string(),
        mime: format.to_mime_type().to_string(),
        width,
        height,
        hash,
        bytes,
    })
}

/// Extracts the payload of a `data:` URI
///
/// Only base64 payloads are supported; images are never sent percent-encoded
/// in practice.
///
/// # Example
///
/// ```
/// use comic_updater::webpage::decode_data_uri;
///
/// let bytes = decode_data_uri("data:image/gif;base64,R0lG").unwrap();
/// assert_eq!(bytes, b"GIF");
/// ```
pub fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;

    if !header.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        return None;
    }

    // Inline data often carries line breaks
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).ok()
}

fn truncate(src: &str) -> &str {
    match src.char_indices().nth(64) {
        Some((index, _)) => &src[..index],
        None => src,
    }
}
