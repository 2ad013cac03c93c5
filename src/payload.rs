//! Self-describing image payloads.
//!
//! A payload is a format tag plus the encoded image bytes. On the wire it is a
//! data URL of the form `data:image/<format>;base64,<data>`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("image data is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("image data is empty")]
    Empty,
}

/// Image formats the remote service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    /// Used whenever a tag is missing or not recognized.
    pub const FALLBACK: ImageFormat = ImageFormat::Jpeg;

    /// Parse the `<format>` part of `image/<format>`. `jpg` is an alias of jpeg.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    /// Parse a full MIME type such as `image/png`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        mime.trim()
            .strip_prefix("image/")
            .and_then(ImageFormat::from_tag)
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// An encoded image held in memory.
///
/// Payloads are replaced wholesale, never edited in place; cloning shares the
/// underlying buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    format: ImageFormat,
    data: Bytes,
}

impl ImagePayload {
    pub fn new(format: ImageFormat, data: impl Into<Bytes>) -> Result<Self, PayloadError> {
        let data = data.into();
        if data.is_empty() {
            return Err(PayloadError::Empty);
        }
        Ok(Self { format, data })
    }

    /// Decode base64 image data tagged with the given format.
    pub fn from_base64(format: ImageFormat, encoded: &str) -> Result<Self, PayloadError> {
        let decoded = STANDARD.decode(encoded.trim())?;
        Self::new(format, decoded)
    }

    /// Parse a self-describing image string.
    ///
    /// `data:image/<png|jpeg|jpg|webp>;base64,` selects the format. Any other
    /// `data:` tag falls back to jpeg, and a string with no prefix is treated as
    /// raw base64 jpeg data.
    pub fn from_data_url(s: &str) -> Result<Self, PayloadError> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix(DATA_URL_PREFIX) {
            if let Some((media, encoded)) = rest.split_once(BASE64_MARKER) {
                let format = ImageFormat::from_mime(media).unwrap_or(ImageFormat::FALLBACK);
                return Self::from_base64(format, encoded);
            }
        }
        Self::from_base64(ImageFormat::FALLBACK, s)
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn to_data_url(&self) -> String {
        format!(
            "{DATA_URL_PREFIX}{}{BASE64_MARKER}{}",
            self.mime_type(),
            self.to_base64()
        )
    }

    /// Pixel dimensions, when the bytes decode as an image header.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        image::ImageReader::new(std::io::Cursor::new(self.data.as_ref()))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    }
}

// Payloads can be megabytes; keep Debug output to the summary.
impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("format", &self.format)
            .field("len", &self.data.len())
            .finish()
    }
}
