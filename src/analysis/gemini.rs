//! `generateContent` wire format and the HTTP transport that carries it.

use std::future::Future;

use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use url::Url;

use crate::{
    config::{Config, ConfigError},
    constants::{DEFAULT_USER_AGENT, DISEASE_LABELS},
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API Error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid header value: {0}")]
    Header(#[from] InvalidHeaderValue),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64, standard alphabet with padding.
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    pub response_schema: Value,
    pub temperature: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: Option<u64>,
    #[serde(default)]
    pub candidates_token_count: Option<u64>,
}

impl GenerateContentResponse {
    /// Text parts of the first candidate, joined.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if text.is_empty() { None } else { Some(text) }
    }
}

pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "disease": {
                "type": "STRING",
                "description": format!(
                    "The identified disease. Must be one of: {}.",
                    DISEASE_LABELS.join(", ")
                )
            },
            "confidence": {
                "type": "NUMBER",
                "description": "The confidence score of the prediction, as a percentage from 0 to 100."
            },
            "explanation": {
                "type": "STRING",
                "description": "A brief, one-paragraph explanation for the diagnosis, highlighting key visual indicators from the image."
            }
        },
        "required": ["disease", "confidence", "explanation"]
    })
}

pub fn build_request(
    prompt: &str,
    mime_type: &str,
    base64_image: String,
    temperature: f64,
) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part {
                    text: Some(prompt.to_string()),
                    inline_data: None,
                },
                Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: mime_type.to_string(),
                        data: base64_image,
                    }),
                },
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json".to_string(),
            response_schema: response_schema(),
            temperature,
        },
    }
}

/// Carries one request to the model and hands back the raw response body.
pub trait ModelTransport {
    fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> impl Future<Output = Result<String, TransportError>>;
}

pub struct GeminiHttp {
    client: reqwest::Client,
    url: Url,
    api_key: String,
}

impl GeminiHttp {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();

        Ok(Self {
            client,
            url: config.generate_content_url()?,
            api_key: config.api_key.clone(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl ModelTransport for GeminiHttp {
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<String, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        headers.insert("X-Goog-Api-Key", HeaderValue::from_str(&self.api_key)?);

        let response = self
            .client
            .post(self.url.clone())
            .headers(headers)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_prompt_image_and_schema() {
        let request = build_request("Look at this leaf.", "image/png", "aGVsbG8=".to_string(), 0.2);
        let wire = serde_json::to_value(&request).unwrap();

        let parts = &wire["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "Look at this leaf.");
        assert!(parts[0].get("inlineData").is_none());
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "aGVsbG8=");

        let config = &wire["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        assert_eq!(config["temperature"], 0.2);
        assert_eq!(
            config["responseSchema"]["required"],
            json!(["disease", "confidence", "explanation"])
        );
        assert_eq!(
            config["responseSchema"]["properties"]["confidence"]["type"],
            "NUMBER"
        );
        let description = config["responseSchema"]["properties"]["disease"]["description"]
            .as_str()
            .unwrap();
        assert!(description.contains("Healthy, Leaf Curl, Blight, Leaf Spot"));
    }

    #[test]
    fn response_text_joins_first_candidate_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "{\"a\":"}, {"text": "1}"}]},
                 "finishReason": "STOP"},
                {"content": {"parts": [{"text": "ignored"}]}}
            ],
            "usageMetadata": {"promptTokenCount": 300, "candidatesTokenCount": 40}
        }))
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("{\"a\":1}"));
        assert_eq!(
            response.usage_metadata.unwrap().prompt_token_count,
            Some(300)
        );
    }

    #[test]
    fn blocked_responses_have_no_text() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        assert_eq!(response.text(), None);
    }
}
