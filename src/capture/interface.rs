use std::{future::Future, rc::Rc};

use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Rear camera on phones and tablets; the one pointed at the leaf.
    Environment,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub facing: FacingMode,
}

impl VideoConstraints {
    pub fn environment() -> Self {
        Self {
            facing: FacingMode::Environment,
        }
    }

    pub fn any() -> Self {
        Self {
            facing: FacingMode::Any,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera found")]
    NotFound,
    #[error("camera is in use by another application")]
    Busy,
    #[error("no camera satisfies {0:?}")]
    Unsatisfiable(VideoConstraints),
    #[error("camera backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended,
}

pub trait MediaTrack {
    fn label(&self) -> String;
    fn state(&self) -> TrackState;
    /// Releases the underlying device. Stopping an ended track does nothing.
    fn stop(&self);
}

pub trait MediaStream {
    fn tracks(&self) -> Vec<Rc<dyn MediaTrack>>;
    /// Starts playback. May fail under autoplay-style restrictions, in which
    /// case readiness is left to [`MediaStream::can_play`].
    fn play(&mut self) -> Result<(), DeviceError>;
    /// True once a first frame has been decoded.
    fn can_play(&mut self) -> bool;
    /// Native frame size, `(0, 0)` until the stream is producing frames.
    fn video_size(&self) -> (u32, u32);
    fn read_frame(&mut self) -> Result<RgbImage, DeviceError>;
}

pub trait MediaDevices {
    fn get_user_media(
        &self,
        constraints: VideoConstraints,
    ) -> impl Future<Output = Result<Box<dyn MediaStream>, DeviceError>>;
}
