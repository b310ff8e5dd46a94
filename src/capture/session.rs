use std::cell::RefCell;

use bytes::Bytes;
use thiserror::Error;

use crate::{
    capture::interface::{DeviceError, MediaDevices, MediaStream, TrackState, VideoConstraints},
    constants::{
        CAPTURE_EXTENSION, CAPTURE_JPEG_QUALITY, CAPTURE_MIME_TYPE, MSG_CAPTURE_FAILED,
        MSG_NO_CAMERA, MSG_VIDEO_NOT_READY,
    },
    image_processor::{self, EncodeError},
};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture session is closed")]
    Closed,
    #[error("capture session is still acquiring a camera")]
    Pending,
    #[error("capture session has no open stream")]
    NotOpen,
    #[error("no camera available (environment: {environment}; any: {any})")]
    Unavailable {
        environment: DeviceError,
        any: DeviceError,
    },
    #[error("video not ready ({width}x{height})")]
    NotReady { width: u32, height: u32 },
    #[error("failed to read frame: {0}")]
    Frame(DeviceError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl CaptureError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => MSG_NO_CAMERA,
            Self::NotReady { .. } | Self::Pending | Self::NotOpen => MSG_VIDEO_NOT_READY,
            Self::Closed | Self::Frame(_) | Self::Encode(_) => MSG_CAPTURE_FAILED,
        }
    }
}

/// A still taken from the live stream, already JPEG encoded.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
}

/// Owns the device stream. Dropping it stops every live track, and every
/// way out of a session ends in that drop.
struct ActiveStream {
    stream: Box<dyn MediaStream>,
    ready: bool,
}

impl ActiveStream {
    fn new(stream: Box<dyn MediaStream>) -> Self {
        Self {
            stream,
            ready: false,
        }
    }

    fn poll_ready(&mut self) -> bool {
        if !self.ready && self.stream.can_play() {
            log::debug!("Video can play");
            self.ready = true;
        }
        self.ready
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        let mut stopped = 0;
        for track in self.stream.tracks() {
            if track.state() == TrackState::Live {
                track.stop();
                stopped += 1;
            }
        }
        log::info!("Camera released ({} track(s) stopped)", stopped);
    }
}

enum Phase {
    Idle,
    Opening,
    Streaming(ActiveStream),
    Closed,
}

/// One capture-mode visit. `close` is terminal: a session is never reopened.
pub struct CaptureSession {
    phase: RefCell<Phase>,
    error: RefCell<Option<String>>,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            phase: RefCell::new(Phase::Idle),
            error: RefCell::new(None),
        }
    }

    /// Acquires a camera, rear-facing first. A stream that arrives after
    /// [`CaptureSession::close`] is released on the spot.
    pub async fn open(&self, devices: &impl MediaDevices) -> Result<(), CaptureError> {
        {
            let mut phase = self.phase.borrow_mut();
            match &*phase {
                Phase::Closed => return Err(CaptureError::Closed),
                Phase::Opening => return Err(CaptureError::Pending),
                Phase::Streaming(_) => return Ok(()),
                Phase::Idle => *phase = Phase::Opening,
            }
        }

        let acquired = self.acquire(devices).await;

        let mut phase = self.phase.borrow_mut();
        if matches!(*phase, Phase::Closed) {
            if let Ok(stream) = acquired {
                log::info!("Camera arrived after the session closed; releasing it");
                drop(ActiveStream::new(stream));
            }
            return Err(CaptureError::Closed);
        }

        match acquired {
            Ok(stream) => {
                let mut active = ActiveStream::new(stream);
                match active.stream.play() {
                    Ok(()) => active.ready = true,
                    // Readiness falls back to the can-play signal.
                    Err(e) => log::warn!("Video play failed: {}", e),
                }
                *phase = Phase::Streaming(active);
                *self.error.borrow_mut() = None;
                log::info!("Camera stream open");
                Ok(())
            }
            Err(err) => {
                *phase = Phase::Idle;
                *self.error.borrow_mut() = Some(err.user_message().to_string());
                Err(err)
            }
        }
    }

    async fn acquire(
        &self,
        devices: &impl MediaDevices,
    ) -> Result<Box<dyn MediaStream>, CaptureError> {
        let environment = match devices
            .get_user_media(VideoConstraints::environment())
            .await
        {
            Ok(stream) => return Ok(stream),
            Err(e) => e,
        };
        log::warn!(
            "Environment-facing camera unavailable ({}); trying any camera",
            environment
        );

        if self.is_closed() {
            return Err(CaptureError::Closed);
        }

        match devices.get_user_media(VideoConstraints::any()).await {
            Ok(stream) => Ok(stream),
            Err(any) => {
                log::error!("Fallback camera access failed: {}", any);
                Err(CaptureError::Unavailable { environment, any })
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        match &mut *self.phase.borrow_mut() {
            Phase::Streaming(active) => active.poll_ready(),
            _ => false,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.phase.borrow(), Phase::Streaming(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.phase.borrow(), Phase::Closed)
    }

    /// Last user-facing problem, cleared by the next success.
    pub fn error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub fn capture_frame(&self) -> Result<CapturedFrame, CaptureError> {
        let result = self.grab();
        match &result {
            Ok(frame) => {
                log::info!(
                    "Captured {} ({}x{}, {} bytes)",
                    frame.file_name,
                    frame.width,
                    frame.height,
                    frame.bytes.len()
                );
                *self.error.borrow_mut() = None;
            }
            Err(e) => {
                log::warn!("Capture refused: {}", e);
                *self.error.borrow_mut() = Some(e.user_message().to_string());
            }
        }
        result
    }

    fn grab(&self) -> Result<CapturedFrame, CaptureError> {
        let mut phase = self.phase.borrow_mut();
        let active = match &mut *phase {
            Phase::Streaming(active) => active,
            Phase::Opening => return Err(CaptureError::Pending),
            Phase::Idle => return Err(CaptureError::NotOpen),
            Phase::Closed => return Err(CaptureError::Closed),
        };

        let (width, height) = active.stream.video_size();
        if !active.poll_ready() || width == 0 || height == 0 {
            return Err(CaptureError::NotReady { width, height });
        }

        let frame = active.stream.read_frame().map_err(CaptureError::Frame)?;
        let jpeg = image_processor::encode_jpeg(&frame, CAPTURE_JPEG_QUALITY)?;

        Ok(CapturedFrame {
            file_name: format!(
                "capture-{}.{}",
                chrono::Utc::now().timestamp_millis(),
                CAPTURE_EXTENSION
            ),
            mime: CAPTURE_MIME_TYPE,
            bytes: Bytes::from(jpeg),
            width: frame.width(),
            height: frame.height(),
        })
    }

    /// Idempotent.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.phase.borrow_mut(), Phase::Closed);
        match previous {
            Phase::Streaming(active) => drop(active),
            Phase::Opening => log::debug!("Session closed while a camera was being acquired"),
            Phase::Idle | Phase::Closed => {}
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}
