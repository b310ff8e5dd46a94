use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;

use crate::{
    capture::CapturedFrame,
    image_processor,
    preview::{PreviewError, PreviewRegistry, PreviewUrl},
};

const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum ImageSourceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is empty")]
    Empty { path: PathBuf },
    #[error("{path} is {size} bytes, above the {limit} byte limit")]
    TooLarge {
        path: PathBuf,
        size: u64,
        limit: usize,
    },
}

impl ImageSourceError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Read { path, .. } => format!("Could not open {}.", path.display()),
            Self::Empty { path } => format!("{} contains no image data.", path.display()),
            Self::TooLarge { limit, .. } => format!(
                "The image is too large. Please choose one under {} MB.",
                limit / (1024 * 1024)
            ),
        }
    }
}

/// A selected or captured image, before it has a preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Bytes,
}

impl ImagePayload {
    pub fn from_path(path: impl AsRef<Path>, max_bytes: usize) -> Result<Self, ImageSourceError> {
        let path = path.as_ref();

        let size = std::fs::metadata(path)
            .map_err(|source| ImageSourceError::Read {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        if size > max_bytes as u64 {
            return Err(ImageSourceError::TooLarge {
                path: path.to_path_buf(),
                size,
                limit: max_bytes,
            });
        }

        let bytes = std::fs::read(path).map_err(|source| ImageSourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(ImageSourceError::Empty {
                path: path.to_path_buf(),
            });
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        Ok(Self::from_bytes(file_name, Bytes::from(bytes)))
    }

    pub fn from_bytes(file_name: impl Into<String>, bytes: Bytes) -> Self {
        let file_name = file_name.into();
        let mime = match image_processor::sniff_mime(&bytes, &file_name) {
            Some(mime) => mime.to_string(),
            None => {
                log::warn!("Could not determine the image type of {}", file_name);
                FALLBACK_MIME.to_string()
            }
        };

        if !image_processor::is_offered_mime(&mime) {
            log::warn!(
                "{} is {}, which is not one of the offered formats; sending it anyway",
                file_name,
                mime
            );
        }

        Self {
            file_name,
            mime,
            bytes,
        }
    }

    pub fn from_capture(frame: CapturedFrame) -> Self {
        Self {
            file_name: frame.file_name,
            mime: frame.mime.to_string(),
            bytes: frame.bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn extension(&self) -> &str {
        match self.mime.as_str() {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => Path::new(&self.file_name)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("bin"),
        }
    }
}

/// The image currently owned by the controller, with its live preview.
#[derive(Debug)]
pub struct ImageHandle {
    payload: ImagePayload,
    preview: PreviewUrl,
}

impl ImageHandle {
    pub(crate) fn create(
        payload: ImagePayload,
        previews: &mut impl PreviewRegistry,
    ) -> Result<Self, PreviewError> {
        let preview = previews.create(&payload)?;
        Ok(Self { payload, preview })
    }

    pub fn payload(&self) -> &ImagePayload {
        &self.payload
    }

    pub fn preview(&self) -> &PreviewUrl {
        &self.preview
    }

    pub(crate) fn release(self, previews: &mut impl PreviewRegistry) {
        log::debug!("Releasing preview of {}", self.payload.file_name);
        previews.revoke(self.preview);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::InMemoryPreviews;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n0000";

    #[test]
    fn reads_files_and_sniffs_their_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf.dat");
        std::fs::write(&path, PNG_MAGIC).unwrap();

        let payload = ImagePayload::from_path(&path, 1024).unwrap();
        assert_eq!(payload.file_name, "leaf.dat");
        assert_eq!(payload.mime, "image/png");
        assert_eq!(payload.extension(), "png");
        assert_eq!(payload.len(), PNG_MAGIC.len());
    }

    #[test]
    fn rejects_oversized_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.png");
        std::fs::write(&big, vec![0u8; 64]).unwrap();
        let err = ImagePayload::from_path(&big, 32).unwrap_err();
        assert!(matches!(err, ImageSourceError::TooLarge { size: 64, .. }));

        let empty = dir.path().join("empty.png");
        std::fs::write(&empty, b"").unwrap();
        let err = ImagePayload::from_path(&empty, 32).unwrap_err();
        assert!(matches!(err, ImageSourceError::Empty { .. }));
    }

    #[test]
    fn unoffered_types_are_still_accepted() {
        let payload = ImagePayload::from_bytes("leaf.gif", Bytes::from_static(b"GIF89a...."));
        assert_eq!(payload.mime, "image/gif");
        assert_eq!(payload.extension(), "gif");
    }

    #[test]
    fn file_and_capture_produce_the_same_handle_shape() {
        let mut previews = InMemoryPreviews::new();
        let from_file = ImagePayload::from_bytes("leaf.png", Bytes::from_static(PNG_MAGIC));
        let from_capture = ImagePayload::from_capture(CapturedFrame {
            file_name: "capture-1.jpg".to_string(),
            mime: "image/jpeg",
            bytes: Bytes::from_static(b"\xFF\xD8\xFF\xE0"),
            width: 1,
            height: 1,
        });

        let a = ImageHandle::create(from_file, &mut previews).unwrap();
        let b = ImageHandle::create(from_capture, &mut previews).unwrap();
        assert_eq!(b.payload().mime, "image/jpeg");
        assert_eq!(previews.live(), 2);

        a.release(&mut previews);
        b.release(&mut previews);
        assert_eq!(previews.live(), 0);
        assert_eq!(previews.revoked(), 2);
    }
}
