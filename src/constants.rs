pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_USER_AGENT: &str = concat!("chilli-scan/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Kept low so repeated runs on the same leaf agree with each other.
pub const SAMPLING_TEMPERATURE: f64 = 0.2;

/// Matches the inline-data ceiling of the hosted API.
pub const DEFAULT_MAX_IMAGE_MB: usize = 20;

/// Formats offered by the file picker. Advisory only: other formats are
/// accepted with a warning.
pub const OFFERED_MIME_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

pub const CAPTURE_MIME_TYPE: &str = "image/jpeg";
pub const CAPTURE_EXTENSION: &str = "jpg";
pub const CAPTURE_JPEG_QUALITY: u8 = 92;

pub const DISEASE_LABELS: [&str; 4] = ["Healthy", "Leaf Curl", "Blight", "Leaf Spot"];

pub const CLASSIFY_PROMPT: &str = "You are an expert agricultural AI specializing in plant pathology, with a focus on chilli plants. Analyze the following chilli leaf image.

Your task is to:
1. Classify the disease from one of the following categories: Healthy, Leaf Curl, Blight, or Leaf Spot.
2. Provide a confidence score for your classification (e.g., 95).
3. Write a brief, user-friendly explanation for your diagnosis, mentioning the visual evidence you see in the image.

Return the result in a structured JSON format.";

pub const MSG_SELECT_IMAGE_FIRST: &str = "Please select an image first.";
pub const MSG_ANALYSIS_FAILED: &str =
    "Failed to analyze the image. The AI model may be overloaded. Please try again later.";
pub const MSG_PREVIEW_FAILED: &str = "Could not prepare a preview of the selected image.";
pub const MSG_NO_CAMERA: &str =
    "Could not access any camera. Please ensure it is not in use by another application.";
pub const MSG_VIDEO_NOT_READY: &str =
    "Video not ready to capture. Please wait a moment and try again.";
pub const MSG_CAPTURE_FAILED: &str = "Failed to capture image.";
