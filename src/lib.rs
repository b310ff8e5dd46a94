pub mod analysis;
pub mod capture;
pub mod config;
pub mod constants;
pub mod controller;
pub mod image_processor;
pub mod image_source;
pub mod preview;
pub mod render;

pub use analysis::{AnalysisClient, AnalysisError, AnalysisResult, Analyzer, Disease};
pub use capture::{CaptureError, CaptureSession, CapturedFrame, MediaDevices};
pub use config::{Config, ConfigError};
pub use controller::{AppController, AppState, Intent, Phase};
pub use image_source::{ImageHandle, ImagePayload, ImageSourceError};
pub use preview::{InMemoryPreviews, PreviewRegistry, PreviewUrl, TempFilePreviews};
pub use render::{RenderOptions, Severity, render};
