//! Vision-model calls: send one page image plus the instruction, get text back.
//!
//! Two [`AnalysisClient`] implementations ship with the crate:
//!
//! * [`GeminiClient`] — talks to the Gemini `generateContent` REST endpoint
//!   directly with `reqwest`. The credential is passed to its constructor.
//! * [`ProviderClient`] — delegates to any `edgequake-llm` provider (OpenAI,
//!   Anthropic, Ollama, …), which resolves its own API key.
//!
//! Neither client retries. A failed call is reported once and the pipeline
//! records the page as failed. Returned text is never inspected or repaired.

use crate::config::Credential;
use crate::document::RenderedImage;
use crate::error::{AnalysisError, AnalyzerError};
use crate::pipeline::encode;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Sends one image and an instruction to a generation service.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn analyze(&self, image: &RenderedImage, instruction: &str)
        -> Result<String, AnalysisError>;
}

// ── Gemini REST client ───────────────────────────────────────────────────

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Options for [`GeminiClient`].
#[derive(Debug, Clone)]
pub struct GeminiOptions {
    pub model: String,
    /// Base URL up to and including the API version segment.
    pub endpoint: String,
    /// Default: 0.1. Transcription wants faithful, not creative, output.
    pub temperature: f32,
    /// Default: 8192. A dense page of notes plus its summary fits comfortably.
    pub max_output_tokens: u32,
    /// Per-request timeout in seconds. Default: 120.
    pub timeout_secs: u64,
}

impl Default for GeminiOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_GEMINI_MODEL.to_string(),
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            temperature: 0.1,
            max_output_tokens: 8192,
            timeout_secs: 120,
        }
    }
}

/// Direct Gemini client.
pub struct GeminiClient {
    http: reqwest::Client,
    credential: Credential,
    options: GeminiOptions,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("credential", &self.credential)
            .field("options", &self.options)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(credential: Credential, options: GeminiOptions) -> Result<Self, AnalyzerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| AnalyzerError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            credential,
            options,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.options.endpoint.trim_end_matches('/'),
            self.options.model
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

// Externally tagged: `{"text": …}` / `{"inlineData": {…}}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum RequestPart<'a> {
    Text(&'a str),
    InlineData(InlineData<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Pull the generated text out of a `generateContent` response body.
fn extract_text(body: &str) -> Result<String, AnalysisError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;

    let Some(candidate) = response.candidates.into_iter().next() else {
        return match response.prompt_feedback.and_then(|f| f.block_reason) {
            Some(reason) => Err(AnalysisError::MalformedResponse(format!(
                "prompt blocked: {reason}"
            ))),
            None => Err(AnalysisError::EmptyResponse),
        };
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        debug!("Candidate had no text (finish reason: {:?})", candidate.finish_reason);
        return Err(AnalysisError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl AnalysisClient for GeminiClient {
    async fn analyze(
        &self,
        image: &RenderedImage,
        instruction: &str,
    ) -> Result<String, AnalysisError> {
        let start = Instant::now();
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    RequestPart::Text(instruction),
                    RequestPart::InlineData(InlineData {
                        mime_type: image.encoding.mime(),
                        data: encode::to_base64(image),
                    }),
                ],
            }],
            generation_config: GenerationConfig {
                temperature: self.options.temperature,
                max_output_tokens: self.options.max_output_tokens,
            },
        };

        let response = self
            .http
            .post(self.url())
            .header("x-goog-api-key", self.credential.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout {
                        secs: self.options.timeout_secs,
                    }
                } else {
                    AnalysisError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(AnalysisError::Api {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let text = extract_text(&body)?;
        debug!(
            "Gemini {} returned {} bytes in {:?}",
            self.options.model,
            text.len(),
            start.elapsed()
        );
        Ok(text)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

// ── edgequake-llm provider client ────────────────────────────────────────

/// Options for [`ProviderClient`].
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 8192,
            timeout_secs: 120,
        }
    }
}

/// Analysis through any `edgequake-llm` vision provider.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    options: ProviderOptions,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, options: ProviderOptions) -> Self {
        Self { provider, options }
    }

    /// Build a named provider (`openai`, `anthropic`, `gemini`, `ollama`, …).
    /// The provider reads its own API key from the environment.
    pub fn from_name(
        provider_name: &str,
        model: &str,
        options: ProviderOptions,
    ) -> Result<Self, AnalyzerError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            AnalyzerError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, options))
    }

    fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.options.temperature),
            max_tokens: Some(self.options.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl AnalysisClient for ProviderClient {
    async fn analyze(
        &self,
        image: &RenderedImage,
        instruction: &str,
    ) -> Result<String, AnalysisError> {
        let messages = vec![ChatMessage::user_with_images(
            instruction,
            vec![encode::to_image_data(image)],
        )];
        let options = self.completion_options();

        let call = self.provider.chat(&messages, Some(&options));
        let response = tokio::time::timeout(Duration::from_secs(self.options.timeout_secs), call)
            .await
            .map_err(|_| AnalysisError::Timeout {
                secs: self.options.timeout_secs,
            })?
            .map_err(|e| AnalysisError::Request(format!("{e}")))?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        if response.content.is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ImageEncoding;

    #[test]
    fn extract_text_joins_parts_of_first_candidate() {
        let body = r####"{
            "candidates": [
                {"content": {"parts": [{"text": "### Transcript\n"}, {"text": "hello"}]},
                 "finishReason": "STOP"},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }"####;
        assert_eq!(extract_text(body).unwrap(), "### Transcript\nhello");
    }

    #[test]
    fn extract_text_blocked_prompt_is_malformed() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = extract_text(body).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn extract_text_empty_candidate() {
        let body = r#"{"candidates": [{"finishReason": "MAX_TOKENS"}]}"#;
        assert!(matches!(extract_text(body), Err(AnalysisError::EmptyResponse)));
        assert!(matches!(extract_text("{}"), Err(AnalysisError::EmptyResponse)));
    }

    #[test]
    fn extract_text_garbage_body() {
        assert!(matches!(
            extract_text("<html>502</html>"),
            Err(AnalysisError::MalformedResponse(_))
        ));
    }

    #[test]
    fn request_serialises_in_gemini_shape() {
        let image = RenderedImage {
            data: vec![1, 2, 3],
            width: 1,
            height: 1,
            encoding: ImageEncoding::Png,
        };
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    RequestPart::Text("do it"),
                    RequestPart::InlineData(InlineData {
                        mime_type: image.encoding.mime(),
                        data: encode::to_base64(&image),
                    }),
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                max_output_tokens: 10,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "do it");
        assert_eq!(
            json["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/png"
        );
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["data"], "AQID");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 10);
    }

    #[test]
    fn url_includes_model() {
        let client = GeminiClient::new(
            Credential::new("k"),
            GeminiOptions {
                endpoint: "http://localhost:9/v1beta/".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            client.url(),
            "http://localhost:9/v1beta/models/gemini-2.5-pro:generateContent"
        );
        assert!(!format!("{client:?}").contains("\"k\""));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 3), "é…");
    }
}
