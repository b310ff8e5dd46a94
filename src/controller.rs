//! The application state machine.
//!
//! Every user action arrives as an [`Intent`]. The controller owns the only
//! [`ImageHandle`] and the only [`CaptureSession`], and releases each on the
//! transition that discards it: replacement, reset, leaving capture mode, or
//! dropping the controller.

use bytes::Bytes;

use crate::{
    analysis::{AnalysisError, AnalysisResult, Analyzer},
    capture::{CaptureSession, MediaDevices},
    constants::{MSG_PREVIEW_FAILED, MSG_SELECT_IMAGE_FIRST},
    image_source::{ImageHandle, ImagePayload},
    preview::PreviewRegistry,
};

#[derive(Debug)]
pub enum Intent {
    SelectImage(ImagePayload),
    StartCapture,
    Capture,
    CancelCapture,
    Analyze,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ImageSelected,
    Analyzing,
    Settled,
    Failed,
}

#[derive(Debug, Default)]
pub struct AppState {
    pub image: Option<ImageHandle>,
    pub result: Option<AnalysisResult>,
    pub loading: bool,
    pub error: Option<String>,
    pub capture_mode: bool,
    pub capture_ready: bool,
    pub capture_error: Option<String>,
}

impl AppState {
    pub fn phase(&self) -> Phase {
        if self.loading {
            Phase::Analyzing
        } else if self.error.is_some() {
            Phase::Failed
        } else if self.result.is_some() {
            Phase::Settled
        } else if self.image.is_some() {
            Phase::ImageSelected
        } else {
            Phase::Idle
        }
    }

    /// Same shape as a freshly started application.
    pub fn is_initial(&self) -> bool {
        self.image.is_none()
            && self.result.is_none()
            && !self.loading
            && self.error.is_none()
            && !self.capture_mode
            && !self.capture_ready
            && self.capture_error.is_none()
    }
}

/// Proof that an analysis was started. Completions carrying an outdated
/// generation are dropped.
#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    generation: u64,
    pub image: Bytes,
    pub mime_type: String,
}

pub struct AppController<A, D, P: PreviewRegistry> {
    analyzer: A,
    devices: D,
    previews: P,
    state: AppState,
    capture: Option<CaptureSession>,
    generation: u64,
}

impl<A, D, P> AppController<A, D, P>
where
    A: Analyzer,
    D: MediaDevices,
    P: PreviewRegistry,
{
    pub fn new(analyzer: A, devices: D, previews: P) -> Self {
        Self {
            analyzer,
            devices,
            previews,
            state: AppState::default(),
            capture: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    pub fn devices(&self) -> &D {
        &self.devices
    }

    pub fn previews(&self) -> &P {
        &self.previews
    }

    pub async fn dispatch(&mut self, intent: Intent) {
        log::debug!("Intent {:?} in phase {:?}", intent, self.state.phase());
        match intent {
            Intent::SelectImage(payload) => self.select_image(payload),
            Intent::StartCapture => self.start_capture().await,
            Intent::Capture => self.capture(),
            Intent::CancelCapture => self.close_capture(),
            Intent::Analyze => self.analyze().await,
            Intent::Reset => self.reset(),
        }
    }

    pub fn select_image(&mut self, payload: ImagePayload) {
        let handle = match ImageHandle::create(payload, &mut self.previews) {
            Ok(handle) => handle,
            Err(e) => {
                // The previous image stays selected; its verdict does not.
                log::error!("Preview creation failed: {}", e);
                self.generation += 1;
                self.state.result = None;
                self.state.loading = false;
                self.state.error = Some(MSG_PREVIEW_FAILED.to_string());
                return;
            }
        };

        log::info!(
            "Selected {} ({}, {} bytes)",
            handle.payload().file_name,
            handle.payload().mime,
            handle.payload().len()
        );
        self.replace_image(Some(handle));
        self.generation += 1;
        self.state.result = None;
        self.state.error = None;
        self.state.loading = false;
    }

    /// Moves to `Analyzing` and hands out the image to send, or refuses:
    /// while another analysis is in flight (no state change) or when there
    /// is no image (moves to `Failed`).
    pub fn begin_analysis(&mut self) -> Option<AnalysisTicket> {
        if self.state.loading {
            log::warn!("Analysis already in flight; ignoring request");
            return None;
        }

        let Some(image) = &self.state.image else {
            self.state.result = None;
            self.state.error = Some(MSG_SELECT_IMAGE_FIRST.to_string());
            return None;
        };
        let ticket = AnalysisTicket {
            generation: self.generation + 1,
            image: image.payload().bytes.clone(),
            mime_type: image.payload().mime.clone(),
        };

        self.generation = ticket.generation;
        self.state.loading = true;
        self.state.error = None;
        self.state.result = None;
        Some(ticket)
    }

    /// Settles the attempt `ticket` belongs to. Returns false when the
    /// attempt was superseded by a new image or a reset.
    pub fn finish_analysis(
        &mut self,
        ticket: AnalysisTicket,
        outcome: Result<AnalysisResult, AnalysisError>,
    ) -> bool {
        if ticket.generation != self.generation || !self.state.loading {
            log::info!("Discarding result of a superseded analysis");
            return false;
        }

        self.state.loading = false;
        match outcome {
            Ok(result) => self.state.result = Some(result),
            Err(e) => {
                log::error!("Analysis failed: {:?}", e);
                self.state.error = Some(e.user_message().to_string());
            }
        }
        true
    }

    async fn analyze(&mut self) {
        let Some(ticket) = self.begin_analysis() else {
            return;
        };
        let outcome = self
            .analyzer
            .analyze(&ticket.image, &ticket.mime_type)
            .await;
        self.finish_analysis(ticket, outcome);
    }

    /// Entering capture mode keeps the current image and result. A failed
    /// camera leaves capture mode open so the user can retry.
    async fn start_capture(&mut self) {
        self.state.capture_mode = true;
        let session = self.capture.get_or_insert_with(CaptureSession::new);
        if !session.is_open() {
            if let Err(e) = session.open(&self.devices).await {
                log::warn!("Capture mode has no camera: {}", e);
            }
        }
        self.refresh_capture();
    }

    fn capture(&mut self) {
        let Some(session) = &self.capture else {
            log::warn!("Capture requested outside capture mode");
            return;
        };

        match session.capture_frame() {
            Ok(frame) => {
                self.close_capture();
                self.select_image(ImagePayload::from_capture(frame));
            }
            Err(_) => self.refresh_capture(),
        }
    }

    /// Re-reads readiness and errors from the live session.
    pub fn refresh_capture(&mut self) {
        match &self.capture {
            Some(session) => {
                self.state.capture_ready = session.is_ready();
                self.state.capture_error = session.error();
            }
            None => {
                self.state.capture_ready = false;
                self.state.capture_error = None;
            }
        }
    }

    fn close_capture(&mut self) {
        if let Some(session) = self.capture.take() {
            session.close();
        }
        self.state.capture_mode = false;
        self.refresh_capture();
    }

    pub fn reset(&mut self) {
        self.replace_image(None);
        self.close_capture();
        self.generation += 1;
        self.state = AppState::default();
    }
}

impl<A, D, P: PreviewRegistry> AppController<A, D, P> {
    /// The only place a preview is revoked.
    fn replace_image(&mut self, next: Option<ImageHandle>) {
        if let Some(previous) = std::mem::replace(&mut self.state.image, next) {
            previous.release(&mut self.previews);
        }
    }
}

impl<A, D, P: PreviewRegistry> Drop for AppController<A, D, P> {
    fn drop(&mut self) {
        self.replace_image(None);
        if let Some(session) = self.capture.take() {
            session.close();
        }
    }
}
