//! Conversion between encoded stills and RGB pixel buffers.
//!
use image::RgbImage;

use crate::error::SnapshotError;

/// JPEG quality of the annotated image.
const JPEG_QUALITY: i32 = 95;

/// An encoded still as received from the camera side.
#[derive(Clone, Debug)]
pub struct CapturedImage {
    bytes: Vec<u8>,
}

impl CapturedImage {
    /// Wrap encoded bytes. Empty input means nothing was captured.
    pub fn new(bytes: Vec<u8>) -> Option<Self> {
        match bytes.is_empty() {
            true => None,
            false => Some(Self { bytes }),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// MIME type guessed from the leading bytes.
    pub fn content_type(&self) -> &'static str {
        match image::guess_format(&self.bytes) {
            Ok(format) => match format {
                image::ImageFormat::Jpeg => "image/jpeg",
                image::ImageFormat::Png => "image/png",
                image::ImageFormat::Gif => "image/gif",
                image::ImageFormat::WebP => "image/webp",
                image::ImageFormat::Bmp => "image/bmp",
                _ => "application/octet-stream",
            },
            Err(_) => "application/octet-stream",
        }
    }

    /// Decode into a fresh RGB pixel buffer.
    pub fn decode(&self) -> Result<RgbImage, SnapshotError> {
        decode(&self.bytes)
    }
}

/// Decode an encoded still into RGB pixels.
///
/// JPEG goes through libjpeg-turbo, everything else through the `image` codecs.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, SnapshotError> {
    if is_jpeg(bytes) {
        turbojpeg::decompress_image(bytes).map_err(|err| SnapshotError::Decode(err.to_string()))
    } else {
        image::load_from_memory(bytes)
            .map(|image| image.to_rgb8())
            .map_err(|err| SnapshotError::Decode(err.to_string()))
    }
}

/// Encode RGB pixels as JPEG.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, SnapshotError> {
    turbojpeg::compress_image(image, JPEG_QUALITY, turbojpeg::Subsamp::Sub2x2)
        .map(|buf| buf.to_vec())
        .map_err(|err| SnapshotError::Encode(err.to_string()))
}

fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8, 0xFF])
}
