use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four classes the prompt asks for, plus whatever else the model said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disease {
    Healthy,
    LeafCurl,
    Blight,
    LeafSpot,
    Unrecognized(String),
}

impl Disease {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "healthy" => Self::Healthy,
            "leaf curl" => Self::LeafCurl,
            "blight" => Self::Blight,
            "leaf spot" => Self::LeafSpot,
            _ => Self::Unrecognized(label.to_string()),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

/// A model verdict. `disease` keeps the label exactly as the model wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub disease: String,
    pub confidence: f64,
    pub explanation: String,
}

impl AnalysisResult {
    pub fn category(&self) -> Disease {
        Disease::from_label(&self.disease)
    }
}

/// Strict: every field present with the right type, or an error naming the
/// first problem. Nothing is repaired or defaulted.
pub fn parse_verdict(text: &str) -> Result<AnalysisResult, String> {
    let value: Value =
        serde_json::from_str(text.trim()).map_err(|e| format!("verdict is not JSON: {e}"))?;
    let object = value
        .as_object()
        .ok_or_else(|| "verdict is not a JSON object".to_string())?;

    let disease = non_empty_string(object.get("disease"), "disease")?;
    let explanation = non_empty_string(object.get("explanation"), "explanation")?;

    let confidence = match object.get("confidence") {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| "confidence is not representable".to_string())?,
        Some(other) => return Err(format!("confidence must be a number, got {other}")),
        None => return Err("confidence is missing".to_string()),
    };
    if !(0.0..=100.0).contains(&confidence) {
        return Err(format!("confidence {confidence} is outside 0..=100"));
    }

    Ok(AnalysisResult {
        disease,
        confidence,
        explanation,
    })
}

fn non_empty_string(value: Option<&Value>, field: &str) -> Result<String, String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(format!("{field} is empty")),
        Some(other) => Err(format!("{field} must be a string, got {other}")),
        None => Err(format!("{field} is missing")),
    }
}
