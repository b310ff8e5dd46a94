use std::{io::Cursor, path::Path};

use anyhow::Context;
use image::{ImageFormat, ImageReader, RgbImage, codecs::jpeg::JpegEncoder};
use thiserror::Error;

use crate::constants::OFFERED_MIME_TYPES;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("frame has no pixels ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("jpeg encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Content sniffing first, then the file extension.
pub fn sniff_mime(bytes: &[u8], file_name: &str) -> Option<&'static str> {
    image::guess_format(bytes)
        .or_else(|_| ImageFormat::from_path(Path::new(file_name)))
        .ok()
        .map(|format| format.to_mime_type())
}

pub fn is_offered_mime(mime: &str) -> bool {
    OFFERED_MIME_TYPES
        .iter()
        .any(|offered| offered.eq_ignore_ascii_case(mime))
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(EncodeError::EmptyFrame { width, height });
    }

    let mut out = Vec::with_capacity((width * height) as usize / 4);
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder.encode_image(frame)?;
    Ok(out)
}

/// Reads only the header.
pub fn dimensions(bytes: &[u8]) -> anyhow::Result<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("Failed to read image header")?
        .into_dimensions()
        .context("Failed to determine image dimensions")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn leafy_frame(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, 160, (y % 256) as u8]))
    }

    #[test]
    fn encodes_frames_as_jpeg() {
        let jpeg = encode_jpeg(&leafy_frame(32, 24), 92).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(sniff_mime(&jpeg, "whatever.bin"), Some("image/jpeg"));
        assert_eq!(dimensions(&jpeg).unwrap(), (32, 24));
    }

    #[test]
    fn refuses_empty_frames() {
        let err = encode_jpeg(&RgbImage::new(0, 10), 92).unwrap_err();
        assert!(matches!(err, EncodeError::EmptyFrame { width: 0, height: 10 }));
    }

    #[test]
    fn sniffing_falls_back_to_extension() {
        assert_eq!(sniff_mime(b"not an image", "leaf.webp"), Some("image/webp"));
        assert_eq!(sniff_mime(b"not an image", "notes.txt"), None);
    }

    #[test]
    fn offered_types_are_case_insensitive() {
        assert!(is_offered_mime("image/PNG"));
        assert!(is_offered_mime("image/webp"));
        assert!(!is_offered_mime("image/gif"));
    }
}
