//! Displayable preview references for the selected image.
//!
//! A [`PreviewUrl`] is move-only: revoking it consumes the token, so a
//! preview can be released at most once. Releasing it at least once is the
//! owner's job (see [`crate::controller::AppController`]).

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use thiserror::Error;
use url::Url;

use crate::image_source::ImagePayload;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("failed to write preview file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("preview path {0} cannot be expressed as a file URL")]
    NotAbsolute(PathBuf),
}

#[derive(Debug, PartialEq, Eq)]
pub struct PreviewUrl(String);

impl PreviewUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PreviewUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait PreviewRegistry {
    fn create(&mut self, payload: &ImagePayload) -> Result<PreviewUrl, PreviewError>;
    fn revoke(&mut self, url: PreviewUrl);
}

fn random_token() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// `blob:`-style URLs backed by memory. Used by tests and embedders that do
/// their own drawing.
#[derive(Debug, Default)]
pub struct InMemoryPreviews {
    live: HashMap<String, Bytes>,
    created: usize,
    revoked: usize,
}

impl InMemoryPreviews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> usize {
        self.live.len()
    }

    pub fn created(&self) -> usize {
        self.created
    }

    pub fn revoked(&self) -> usize {
        self.revoked
    }

    pub fn resolve(&self, url: &PreviewUrl) -> Option<&Bytes> {
        self.live.get(url.as_str())
    }
}

impl PreviewRegistry for InMemoryPreviews {
    fn create(&mut self, payload: &ImagePayload) -> Result<PreviewUrl, PreviewError> {
        let url = format!("blob:chilli-scan/{}", random_token());
        self.live.insert(url.clone(), payload.bytes.clone());
        self.created += 1;
        Ok(PreviewUrl(url))
    }

    fn revoke(&mut self, url: PreviewUrl) {
        if self.live.remove(url.as_str()).is_some() {
            self.revoked += 1;
        } else {
            log::warn!("Revoking unknown preview {}", url);
        }
    }
}

/// Writes each preview to a file so a terminal user can open it.
#[derive(Debug)]
pub struct TempFilePreviews {
    dir: PathBuf,
    live: HashSet<PathBuf>,
}

impl TempFilePreviews {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            live: HashSet::new(),
        }
    }

    /// Previews go straight into the system temp directory.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn live(&self) -> usize {
        self.live.len()
    }

    fn remove(path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("Failed to remove preview {}: {}", path.display(), e);
        }
    }
}

impl PreviewRegistry for TempFilePreviews {
    fn create(&mut self, payload: &ImagePayload) -> Result<PreviewUrl, PreviewError> {
        let path = self
            .dir
            .join(format!("preview-{}.{}", random_token(), payload.extension()));

        fs::write(&path, &payload.bytes).map_err(|source| PreviewError::Write {
            path: path.clone(),
            source,
        })?;

        let url = match Url::from_file_path(&path) {
            Ok(url) => url,
            Err(()) => {
                Self::remove(&path);
                return Err(PreviewError::NotAbsolute(path));
            }
        };

        log::debug!("Preview written to {}", path.display());
        self.live.insert(path);
        Ok(PreviewUrl(url.into()))
    }

    fn revoke(&mut self, url: PreviewUrl) {
        let path = Url::parse(url.as_str())
            .ok()
            .and_then(|u| u.to_file_path().ok());

        match path {
            Some(path) if self.live.remove(&path) => Self::remove(&path),
            _ => log::warn!("Revoking unknown preview {}", url),
        }
    }
}

impl Drop for TempFilePreviews {
    fn drop(&mut self) {
        for path in self.live.drain() {
            Self::remove(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> ImagePayload {
        ImagePayload::from_bytes("leaf.png", Bytes::from_static(b"\x89PNG\r\n\x1a\nrest"))
    }

    #[test]
    fn in_memory_urls_are_unique_and_counted() {
        let mut previews = InMemoryPreviews::new();
        let a = previews.create(&payload()).unwrap();
        let b = previews.create(&payload()).unwrap();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("blob:chilli-scan/"));
        assert_eq!(previews.live(), 2);

        previews.revoke(a);
        assert_eq!(previews.live(), 1);
        assert_eq!(previews.revoked(), 1);
        assert!(previews.resolve(&b).is_some());
    }

    #[test]
    fn temp_file_preview_is_deleted_on_revoke() {
        let dir = tempfile::tempdir().unwrap();
        let mut previews = TempFilePreviews::new(dir.path());

        let url = previews.create(&payload()).unwrap();
        let path = Url::parse(url.as_str()).unwrap().to_file_path().unwrap();
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));

        previews.revoke(url);
        assert!(!path.exists());
        assert_eq!(previews.live(), 0);
    }

    #[test]
    fn dropping_the_registry_removes_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let mut previews = TempFilePreviews::new(dir.path());
            let url = previews.create(&payload()).unwrap();
            Url::parse(url.as_str()).unwrap().to_file_path().unwrap()
        };
        assert!(!path.exists());
    }
}
