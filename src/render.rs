use std::fmt::Write as _;

use crate::{analysis::AnalysisResult, controller::AppState};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const GREY: &str = "\x1b[90m";

const BAR_WIDTH: usize = 20;

/// Cosmetic only; never feeds back into the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Caution,
    Severe,
    Neutral,
}

impl Severity {
    pub fn from_label(disease: &str) -> Self {
        let lower = disease.to_lowercase();
        if lower.contains("healthy") {
            Self::Success
        } else if lower.contains("curl") || lower.contains("spot") {
            Self::Caution
        } else if lower.contains("blight") {
            Self::Severe
        } else {
            Self::Neutral
        }
    }

    fn colour(self) -> &'static str {
        match self {
            Self::Success => GREEN,
            Self::Caution => YELLOW,
            Self::Severe => RED,
            Self::Neutral => GREY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub colour: bool,
}

struct Painter {
    colour: bool,
}

impl Painter {
    fn paint(&self, style: &str, text: &str) -> String {
        if self.colour {
            format!("{style}{text}{RESET}")
        } else {
            text.to_string()
        }
    }
}

pub fn render(state: &AppState, options: &RenderOptions) -> String {
    let painter = Painter {
        colour: options.colour,
    };
    let mut out = String::new();

    let _ = writeln!(out, "{}", painter.paint(BOLD, "Green Chilli Disease Detection System"));
    let _ = writeln!(out);

    if state.capture_mode {
        render_capture(&mut out, state, &painter);
    } else {
        render_main(&mut out, state, &painter);
    }

    out
}

fn render_main(out: &mut String, state: &AppState, painter: &Painter) {
    match &state.image {
        None => {
            let _ = writeln!(out, "{}", painter.paint(BOLD, "Select an Image"));
            let _ = writeln!(out, "Choose a file or use your webcam to get started.");
            let _ = writeln!(out, "{}", painter.paint(DIM, "  open <path>   |   camera"));
        }
        Some(image) => {
            let payload = image.payload();
            let _ = writeln!(
                out,
                "Image: {} ({}, {} bytes)",
                payload.file_name,
                payload.mime,
                payload.len()
            );
            let _ = writeln!(out, "Preview: {}", image.preview());
            if state.loading {
                let _ = writeln!(out, "{}", painter.paint(DIM, "[ Analyzing... ]"));
            } else {
                let _ = writeln!(out, "{}", painter.paint(DIM, "[ analyze ]   [ reset ]"));
            }
        }
    }

    if let Some(error) = &state.error {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", painter.paint(RED, &format!("! {error}")));
    }

    if !state.loading {
        if let Some(result) = &state.result {
            let _ = writeln!(out);
            render_result(out, result, painter);
        }
    }
}

fn render_result(out: &mut String, result: &AnalysisResult, painter: &Painter) {
    let colour = Severity::from_label(&result.disease).colour();

    let _ = writeln!(out, "{}", painter.paint(colour, "Analysis Result"));
    let _ = writeln!(out, "  Predicted Disease: {}", painter.paint(colour, &result.disease));
    let _ = writeln!(
        out,
        "  Confidence:        {} {}%",
        painter.paint(colour, &confidence_bar(result.confidence)),
        format_confidence(result.confidence)
    );
    let _ = writeln!(out, "  Explanation:");
    for line in wrap(&result.explanation, 72) {
        let _ = writeln!(out, "    {line}");
    }
}

fn render_capture(out: &mut String, state: &AppState, painter: &Painter) {
    let _ = writeln!(out, "{}", painter.paint(BOLD, "Webcam Capture"));
    if let Some(error) = &state.capture_error {
        let _ = writeln!(out, "{}", painter.paint(RED, &format!("! {error}")));
    }
    let status = if state.capture_ready {
        painter.paint(GREEN, "camera ready")
    } else {
        painter.paint(YELLOW, "waiting for camera")
    };
    let _ = writeln!(out, "Status: {status}");
    let capture_hint = if state.capture_ready && state.capture_error.is_none() {
        "[ snap ]"
    } else {
        "[ snap (unavailable) ]"
    };
    let _ = writeln!(
        out,
        "{}",
        painter.paint(DIM, &format!("{capture_hint}   [ cancel ]"))
    );
}

pub fn confidence_bar(confidence: f64) -> String {
    let filled = ((confidence.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

fn format_confidence(confidence: f64) -> String {
    if confidence.fract() == 0.0 {
        format!("{confidence:.0}")
    } else {
        format!("{confidence:.1}")
    }
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settled(disease: &str, confidence: f64) -> AppState {
        AppState {
            result: Some(AnalysisResult {
                disease: disease.to_string(),
                confidence,
                explanation: "Yellowing veins with upward curling along the leaf margin.".to_string(),
            }),
            ..AppState::default()
        }
    }

    #[test]
    fn severity_follows_keywords() {
        assert_eq!(Severity::from_label("Healthy"), Severity::Success);
        assert_eq!(Severity::from_label("Leaf Curl"), Severity::Caution);
        assert_eq!(Severity::from_label("leaf spot"), Severity::Caution);
        assert_eq!(Severity::from_label("Early BLIGHT"), Severity::Severe);
        assert_eq!(Severity::from_label("Mosaic Virus"), Severity::Neutral);
    }

    #[test]
    fn idle_state_shows_the_uploader() {
        let text = render(&AppState::default(), &RenderOptions::default());
        assert!(text.contains("Select an Image"));
        assert!(!text.contains("Analysis Result"));
    }

    #[test]
    fn result_card_shows_label_bar_and_explanation() {
        let text = render(&settled("Leaf Curl", 85.0), &RenderOptions::default());
        assert!(text.contains("Predicted Disease: Leaf Curl"));
        assert!(text.contains("[#################---] 85%"));
        assert!(text.contains("upward curling"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn colour_is_opt_in() {
        let text = render(&settled("Blight", 70.0), &RenderOptions { colour: true });
        assert!(text.contains(&format!("{RED}Blight{RESET}")));
    }

    #[test]
    fn result_is_hidden_while_loading_and_errors_are_shown() {
        let mut state = settled("Healthy", 99.0);
        state.loading = true;
        assert!(!render(&state, &RenderOptions::default()).contains("Analysis Result"));

        let state = AppState {
            error: Some("Please select an image first.".into()),
            ..AppState::default()
        };
        assert!(render(&state, &RenderOptions::default()).contains("! Please select an image first."));
    }

    #[test]
    fn capture_view_reports_readiness() {
        let state = AppState {
            capture_mode: true,
            capture_ready: false,
            ..AppState::default()
        };
        let text = render(&state, &RenderOptions::default());
        assert!(text.contains("Webcam Capture"));
        assert!(text.contains("waiting for camera"));
        assert!(text.contains("snap (unavailable)"));
    }

    #[test]
    fn bar_and_wrap_edges() {
        assert_eq!(confidence_bar(0.0), format!("[{}]", "-".repeat(20)));
        assert_eq!(confidence_bar(100.0), format!("[{}]", "#".repeat(20)));
        assert_eq!(format_confidence(92.5), "92.5");
        assert_eq!(wrap("a bb ccc", 4), vec!["a bb", "ccc"]);
    }
}
