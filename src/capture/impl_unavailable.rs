use crate::capture::interface::{DeviceError, MediaDevices, MediaStream, VideoConstraints};

/// Backend for builds without the `webcam` feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCamera;

impl MediaDevices for NoCamera {
    async fn get_user_media(
        &self,
        constraints: VideoConstraints,
    ) -> Result<Box<dyn MediaStream>, DeviceError> {
        log::debug!(
            "Camera requested ({:?}) but this build has no webcam support",
            constraints.facing
        );
        Err(DeviceError::NotFound)
    }
}
