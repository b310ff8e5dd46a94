pub mod impl_fake;
#[cfg(feature = "webcam")]
pub mod impl_nokhwa;
pub mod impl_unavailable;
pub mod interface;
pub mod session;

pub use interface::{
    DeviceError, FacingMode, MediaDevices, MediaStream, MediaTrack, TrackState, VideoConstraints,
};
pub use session::{CaptureError, CaptureSession, CapturedFrame};

#[cfg(feature = "webcam")]
pub type SystemDevices = impl_nokhwa::NokhwaDevices;

#[cfg(not(feature = "webcam"))]
pub type SystemDevices = impl_unavailable::NoCamera;
