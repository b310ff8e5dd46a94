use std::{cell::RefCell, rc::Rc};

use image::RgbImage;
use nokhwa::{
    Camera, NokhwaError,
    pixel_format::RgbFormat,
    utils::{ApiBackend, CameraInfo, RequestedFormat, RequestedFormatType},
};
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::capture::interface::{
    DeviceError, FacingMode, MediaDevices, MediaStream, MediaTrack, TrackState, VideoConstraints,
};

/// Name fragments that identify a rear-facing camera. Desktop webcams rarely
/// carry any of these, so `Environment` requests usually fall through to
/// `Any`.
const REAR_HINTS: [&str; 3] = ["back", "rear", "environment"];

#[derive(Debug, Default, Clone, Copy)]
pub struct NokhwaDevices;

fn device_error(e: NokhwaError) -> DeviceError {
    let text = e.to_string();
    let lower = text.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") {
        DeviceError::PermissionDenied
    } else if lower.contains("busy") || lower.contains("in use") {
        DeviceError::Busy
    } else {
        DeviceError::Backend(text)
    }
}

/// Runs a blocking device call. `Camera` is not `Send`, so instead of moving
/// it to the blocking pool the current worker is handed over for the call.
/// A current-thread runtime has no other worker to hand over to.
fn blocking<R>(call: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(call),
        _ => call(),
    }
}

fn pick(cameras: &[CameraInfo], facing: FacingMode) -> Option<&CameraInfo> {
    match facing {
        FacingMode::Environment => cameras.iter().find(|info| {
            let name = info.human_name().to_lowercase();
            REAR_HINTS.iter().any(|hint| name.contains(hint))
        }),
        FacingMode::Any => cameras.first(),
    }
}

impl MediaDevices for NokhwaDevices {
    async fn get_user_media(
        &self,
        constraints: VideoConstraints,
    ) -> Result<Box<dyn MediaStream>, DeviceError> {
        let cameras = tokio::task::spawn_blocking(|| nokhwa::query(ApiBackend::Auto))
            .await
            .map_err(|e| DeviceError::Backend(e.to_string()))?
            .map_err(device_error)?;

        if cameras.is_empty() {
            return Err(DeviceError::NotFound);
        }

        let info =
            pick(&cameras, constraints.facing).ok_or(DeviceError::Unsatisfiable(constraints))?;
        log::info!("Opening camera '{}'", info.human_name());

        let format =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
        let index = info.index().clone();
        let camera = blocking(|| Camera::new(index, format)).map_err(device_error)?;

        let camera = Rc::new(RefCell::new(Some(camera)));
        Ok(Box::new(NokhwaStream {
            track: Rc::new(CameraTrack {
                label: info.human_name(),
                camera: camera.clone(),
            }),
            camera,
            first_frame: false,
        }))
    }
}

/// `None` once the track has been stopped.
type SharedCamera = Rc<RefCell<Option<Camera>>>;

struct CameraTrack {
    label: String,
    camera: SharedCamera,
}

impl MediaTrack for CameraTrack {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn state(&self) -> TrackState {
        if self.camera.borrow().is_some() {
            TrackState::Live
        } else {
            TrackState::Ended
        }
    }

    fn stop(&self) {
        if let Some(mut camera) = self.camera.borrow_mut().take() {
            if camera.is_stream_open() {
                if let Err(e) = camera.stop_stream() {
                    log::warn!("Failed to stop '{}': {}", self.label, e);
                }
            }
        }
    }
}

struct NokhwaStream {
    camera: SharedCamera,
    track: Rc<CameraTrack>,
    first_frame: bool,
}

impl MediaStream for NokhwaStream {
    fn tracks(&self) -> Vec<Rc<dyn MediaTrack>> {
        vec![self.track.clone() as Rc<dyn MediaTrack>]
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        let mut guard = self.camera.borrow_mut();
        let camera = guard
            .as_mut()
            .ok_or_else(|| DeviceError::Backend("track stopped".to_string()))?;
        blocking(|| camera.open_stream()).map_err(device_error)
    }

    fn can_play(&mut self) -> bool {
        if !self.first_frame {
            let mut guard = self.camera.borrow_mut();
            if let Some(camera) = guard.as_mut() {
                self.first_frame = camera.is_stream_open() && camera.frame().is_ok();
            }
        }
        self.first_frame
    }

    fn video_size(&self) -> (u32, u32) {
        match self.camera.borrow().as_ref() {
            Some(camera) if camera.is_stream_open() => {
                let resolution = camera.resolution();
                (resolution.width(), resolution.height())
            }
            _ => (0, 0),
        }
    }

    fn read_frame(&mut self) -> Result<RgbImage, DeviceError> {
        let mut guard = self.camera.borrow_mut();
        let camera = guard
            .as_mut()
            .ok_or_else(|| DeviceError::Backend("track stopped".to_string()))?;

        let decoded = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbFormat>())
            .map_err(device_error)?;

        let (width, height) = (decoded.width(), decoded.height());
        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| DeviceError::Backend("frame buffer size mismatch".to_string()))
    }
}
