pub mod gemini;
pub mod impl_fake;
pub mod verdict;

use std::{future::Future, time::Instant};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error;

use crate::{
    config::{Config, ConfigError},
    constants::{CLASSIFY_PROMPT, MSG_ANALYSIS_FAILED, SAMPLING_TEMPERATURE},
};

pub use gemini::{GeminiHttp, ModelTransport, TransportError};
pub use verdict::{AnalysisResult, Disease};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("response body is not a generateContent response: {0}")]
    MalformedBody(String),
    #[error("response contains no text")]
    NoText,
    #[error("invalid response format: {0}")]
    InvalidVerdict(String),
}

impl AnalysisError {
    /// Always the same text; the cause goes to the log only.
    pub fn user_message(&self) -> &'static str {
        MSG_ANALYSIS_FAILED
    }
}

pub trait Analyzer {
    fn analyze(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> impl Future<Output = Result<AnalysisResult, AnalysisError>>;
}

/// One model call per `analyze`; no retry, no cache.
pub struct AnalysisClient<T> {
    transport: T,
}

impl AnalysisClient<GeminiHttp> {
    pub fn gemini(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(GeminiHttp::new(config)?))
    }
}

impl<T: ModelTransport> AnalysisClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn exchange(&self, image: &[u8], mime_type: &str) -> Result<AnalysisResult, AnalysisError> {
        let request = gemini::build_request(
            CLASSIFY_PROMPT,
            mime_type,
            STANDARD.encode(image),
            SAMPLING_TEMPERATURE,
        );

        let body = self.transport.generate_content(&request).await?;

        let response: gemini::GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| AnalysisError::MalformedBody(e.to_string()))?;

        if let Some(usage) = &response.usage_metadata {
            log::debug!(
                "Tokens: {} in, {} out",
                usage.prompt_token_count.unwrap_or(0),
                usage.candidates_token_count.unwrap_or(0)
            );
        }

        let text = response.text().ok_or(AnalysisError::NoText)?;
        verdict::parse_verdict(&text).map_err(AnalysisError::InvalidVerdict)
    }
}

impl<T: ModelTransport> Analyzer for AnalysisClient<T> {
    async fn analyze(&self, image: &[u8], mime_type: &str) -> Result<AnalysisResult, AnalysisError> {
        log::info!("Analyzing {} byte {} image", image.len(), mime_type);
        let start = Instant::now();

        let result = self.exchange(image, mime_type).await;

        match &result {
            Ok(verdict) => log::info!(
                "Analysis finished in {}ms: {} ({}%)",
                start.elapsed().as_millis(),
                verdict.disease,
                verdict.confidence
            ),
            Err(e) => log::error!(
                "Analysis failed after {}ms: {}",
                start.elapsed().as_millis(),
                e
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use serde_json::{Value, json};

    use super::*;
    use crate::analysis::gemini::GenerateContentRequest;

    #[derive(Default)]
    struct CannedTransport {
        reply: RefCell<Option<Result<String, TransportError>>>,
        calls: Cell<usize>,
        last_request: RefCell<Option<Value>>,
    }

    impl CannedTransport {
        fn replying(reply: Result<String, TransportError>) -> Self {
            Self {
                reply: RefCell::new(Some(reply)),
                ..Self::default()
            }
        }
    }

    impl ModelTransport for CannedTransport {
        async fn generate_content(
            &self,
            request: &GenerateContentRequest,
        ) -> Result<String, TransportError> {
            self.calls.set(self.calls.get() + 1);
            *self.last_request.borrow_mut() = Some(serde_json::to_value(request).unwrap());
            self.reply
                .borrow_mut()
                .take()
                .unwrap_or_else(|| {
                    Err(TransportError::Status {
                        status: 503,
                        body: "no reply scripted".into(),
                    })
                })
        }
    }

    fn envelope(text: &str) -> Result<String, TransportError> {
        Ok(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
        })
        .to_string())
    }

    #[tokio::test]
    async fn well_formed_verdict_comes_back_unchanged() {
        let client = AnalysisClient::new(CannedTransport::replying(envelope(
            r#"{"disease":"Healthy","confidence":92,"explanation":"Even colour, no lesions."}"#,
        )));

        let result = client.analyze(b"\xFF\xD8jpeg", "image/jpeg").await.unwrap();

        assert_eq!(
            result,
            AnalysisResult {
                disease: "Healthy".into(),
                confidence: 92.0,
                explanation: "Even colour, no lesions.".into(),
            }
        );
        assert_eq!(client.transport().calls.get(), 1);
    }

    #[tokio::test]
    async fn request_embeds_the_image_as_base64() {
        let client = AnalysisClient::new(CannedTransport::replying(envelope(
            r#"{"disease":"Blight","confidence":71,"explanation":"x"}"#,
        )));

        client.analyze(b"hello", "image/webp").await.unwrap();

        let request = client.transport().last_request.borrow().clone().unwrap();
        let image = &request["contents"][0]["parts"][1]["inlineData"];
        assert_eq!(image["data"], "aGVsbG8=");
        assert_eq!(image["mimeType"], "image/webp");
        assert_eq!(request["contents"][0]["parts"][0]["text"], CLASSIFY_PROMPT);
        assert_eq!(request["generationConfig"]["temperature"], 0.2);
    }

    #[tokio::test]
    async fn missing_confidence_fails_instead_of_returning_a_partial_result() {
        let client = AnalysisClient::new(CannedTransport::replying(envelope(
            r#"{"disease":"Leaf Spot","explanation":"Brown spots with yellow halos."}"#,
        )));

        let err = client.analyze(b"img", "image/png").await.unwrap_err();

        assert!(matches!(err, AnalysisError::InvalidVerdict(_)));
        assert_eq!(err.user_message(), MSG_ANALYSIS_FAILED);
        assert_eq!(client.transport().calls.get(), 1);
    }

    #[tokio::test]
    async fn non_json_bodies_fail() {
        let client =
            AnalysisClient::new(CannedTransport::replying(Ok("<html>busy</html>".to_string())));
        let err = client.analyze(b"img", "image/png").await.unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedBody(_)));

        let client = AnalysisClient::new(CannedTransport::replying(envelope("Leaf Curl, 80%")));
        let err = client.analyze(b"img", "image/png").await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidVerdict(_)));

        let client = AnalysisClient::new(CannedTransport::replying(Ok("{}".to_string())));
        let err = client.analyze(b"img", "image/png").await.unwrap_err();
        assert!(matches!(err, AnalysisError::NoText));
    }

    #[tokio::test]
    async fn transport_failures_are_not_retried() {
        let client = AnalysisClient::new(CannedTransport::replying(Err(TransportError::Status {
            status: 503,
            body: "overloaded".into(),
        })));

        let err = client.analyze(b"img", "image/png").await.unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::Transport(TransportError::Status { status: 503, .. })
        ));
        assert_eq!(err.user_message(), MSG_ANALYSIS_FAILED);
        assert_eq!(client.transport().calls.get(), 1);
    }
}
