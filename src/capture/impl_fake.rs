use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

use image::{Rgb, RgbImage};
use tokio::sync::Notify;

use crate::capture::interface::{
    DeviceError, FacingMode, MediaDevices, MediaStream, MediaTrack, TrackState, VideoConstraints,
};

#[derive(Debug, Clone)]
pub struct FakeStreamSpec {
    pub width: u32,
    pub height: u32,
    pub tracks: usize,
    pub play_fails: bool,
    /// Number of `can_play` polls before it reports true.
    pub can_play_after_polls: usize,
}

impl Default for FakeStreamSpec {
    fn default() -> Self {
        Self {
            width: 64,
            height: 48,
            tracks: 1,
            play_fails: false,
            can_play_after_polls: 0,
        }
    }
}

enum Outcome {
    Stream(FakeStreamSpec),
    Fail(DeviceError),
}

#[derive(Debug)]
pub struct FakeTrack {
    label: String,
    live: Cell<bool>,
    stop_calls: Cell<usize>,
}

impl FakeTrack {
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.get()
    }
}

impl MediaTrack for FakeTrack {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn state(&self) -> TrackState {
        if self.live.get() {
            TrackState::Live
        } else {
            TrackState::Ended
        }
    }

    fn stop(&self) {
        self.stop_calls.set(self.stop_calls.get() + 1);
        self.live.set(false);
    }
}

struct FakeStream {
    spec: FakeStreamSpec,
    tracks: Vec<Rc<FakeTrack>>,
    polls: usize,
}

impl MediaStream for FakeStream {
    fn tracks(&self) -> Vec<Rc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .map(|t| t.clone() as Rc<dyn MediaTrack>)
            .collect()
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        if self.spec.play_fails {
            Err(DeviceError::Backend("autoplay blocked".to_string()))
        } else {
            Ok(())
        }
    }

    fn can_play(&mut self) -> bool {
        self.polls += 1;
        self.polls >= self.spec.can_play_after_polls
    }

    fn video_size(&self) -> (u32, u32) {
        (self.spec.width, self.spec.height)
    }

    fn read_frame(&mut self) -> Result<RgbImage, DeviceError> {
        if self.tracks.iter().any(|t| !t.live.get()) {
            return Err(DeviceError::Backend("track ended".to_string()));
        }
        Ok(RgbImage::from_pixel(
            self.spec.width,
            self.spec.height,
            Rgb([46, 125, 50]),
        ))
    }
}

/// Scripted camera backend. Each `get_user_media` call consumes the next
/// scripted outcome; an exhausted script answers `NotFound`.
#[derive(Default)]
pub struct FakeMediaDevices {
    script: RefCell<VecDeque<Outcome>>,
    requests: RefCell<Vec<FacingMode>>,
    issued: RefCell<Vec<Rc<FakeTrack>>>,
    gate: Option<Rc<Notify>>,
    request_seen: Notify,
}

impl FakeMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_stream(self, spec: FakeStreamSpec) -> Self {
        self.script.borrow_mut().push_back(Outcome::Stream(spec));
        self
    }

    pub fn then_fail(self, error: DeviceError) -> Self {
        self.script.borrow_mut().push_back(Outcome::Fail(error));
        self
    }

    /// Holds every acquisition until the gate is notified.
    pub fn gated(mut self, gate: Rc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub async fn request_seen(&self) {
        self.request_seen.notified().await;
    }

    pub fn requests(&self) -> Vec<FacingMode> {
        self.requests.borrow().clone()
    }

    pub fn issued_tracks(&self) -> Vec<Rc<FakeTrack>> {
        self.issued.borrow().clone()
    }

    pub fn live_tracks(&self) -> usize {
        self.issued
            .borrow()
            .iter()
            .filter(|t| t.state() == TrackState::Live)
            .count()
    }
}

impl MediaDevices for FakeMediaDevices {
    async fn get_user_media(
        &self,
        constraints: VideoConstraints,
    ) -> Result<Box<dyn MediaStream>, DeviceError> {
        self.requests.borrow_mut().push(constraints.facing);
        self.request_seen.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let outcome = self.script.borrow_mut().pop_front();
        match outcome {
            Some(Outcome::Stream(spec)) => {
                let tracks: Vec<Rc<FakeTrack>> = (0..spec.tracks)
                    .map(|i| {
                        Rc::new(FakeTrack {
                            label: format!("fake camera {i} ({:?})", constraints.facing),
                            live: Cell::new(true),
                            stop_calls: Cell::new(0),
                        })
                    })
                    .collect();
                self.issued.borrow_mut().extend(tracks.iter().cloned());
                Ok(Box::new(FakeStream {
                    spec,
                    tracks,
                    polls: 0,
                }))
            }
            Some(Outcome::Fail(error)) => Err(error),
            None => Err(DeviceError::NotFound),
        }
    }
}
