use crate::config::Config;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Failure of a single text-generation call
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Response blocked: {0}")]
    Blocked(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("AI service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to reach AI service: {0}")]
    Transport(String),

    #[error("Empty response from AI service")]
    EmptyResponse,

    #[error("Malformed AI service response: {0}")]
    Malformed(String),
}

impl GenerationError {
    /// Content-policy blocks are deterministic, everything else may clear up
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GenerationError::Blocked(_))
    }

    /// Message shown to the caller for this failure
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::Blocked(_) => {
                "AI insights blocked due to content policy. Please try a different prompt."
                    .to_string()
            }
            GenerationError::QuotaExceeded(_) => {
                "AI service quota exceeded. Please try again later.".to_string()
            }
            GenerationError::Api { message, .. } if !message.is_empty() => message.clone(),
            _ => "Failed to generate AI insights".to_string(),
        }
    }

    /// Classify an unsuccessful HTTP reply from the service
    pub fn from_status(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct ApiErrorBody {
            error: ApiErrorDetail,
        }
        #[derive(Deserialize)]
        struct ApiErrorDetail {
            #[serde(default)]
            message: String,
        }

        let message = serde_json::from_str::<ApiErrorBody>(body)
            .map(|parsed| parsed.error.message)
            .unwrap_or_else(|_| body.trim().to_string());
        let lowered = message.to_lowercase();

        if lowered.contains("blocked") {
            GenerationError::Blocked(message)
        } else if status == 429 || lowered.contains("quota") {
            GenerationError::QuotaExceeded(message)
        } else {
            GenerationError::Api { status, message }
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(e: GenerationError) -> Self {
        AppError::UpstreamUnavailable {
            message: e.user_message(),
            cause: Some(e.to_string()),
        }
    }
}

/// A service that turns one prompt into one block of text
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Retry schedule around the generator call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delay: RETRY_DELAY,
        }
    }
}

/// Call `generator`, retrying transient failures with a fixed delay
///
/// Content-policy blocks are returned immediately; other failures are retried up
/// to `policy.max_retries` times before the last error is returned.
pub async fn generate_with_retry(
    generator: &dyn TextGenerator,
    prompt: &str,
    policy: &RetryPolicy,
) -> Result<String, GenerationError> {
    let mut attempt = 0;
    loop {
        match generator.generate(prompt).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                log::warn!(
                    "AI generation failed ({}), retry {}/{} in {:?}",
                    e,
                    attempt,
                    policy.max_retries,
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                log::error!("AI generation error: {}", e);
                return Err(e);
            }
        }
    }
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    structured_output: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiClient {
    /// Client for the configured model, or `None` when no API key is set
    ///
    /// # Errors
    /// * `AppError::Config` if the HTTP client cannot be built
    pub fn from_config(config: &Config) -> AppResult<Option<Self>> {
        let Some(api_key) = config.gemini_api_key.clone() else {
            return Ok(None);
        };

        let http = reqwest::Client::builder()
            .timeout(config.ai_timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Some(Self {
            http,
            endpoint: config.gemini_endpoint.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            api_key,
            structured_output: config.structured_output,
        }))
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });

        if self.structured_output {
            body["generationConfig"] = json!({
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "heading": { "type": "STRING" },
                            "body": { "type": "STRING" }
                        },
                        "required": ["heading", "body"]
                    }
                }
            });
        }

        body
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(GenerationError::from_status(status.as_u16(), &body));
        }

        parse_response(&body)
    }
}

/// Extract the generated text from a successful `generateContent` body
///
/// Text parts of the first candidate are concatenated. A prompt-level block reason,
/// or a `SAFETY` finish with no text, is reported as `Blocked`.
///
/// # Errors
/// * `GenerationError::Malformed` if the body is not a response object
/// * `GenerationError::EmptyResponse` if there are no candidates
/// * `GenerationError::Blocked` on content-policy blocks
pub fn parse_response(body: &str) -> Result<String, GenerationError> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;

    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerationError::Blocked(reason));
    }

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        return Err(GenerationError::EmptyResponse);
    };

    let text: String = candidate
        .content
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() && candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(GenerationError::Blocked("SAFETY".to_string()));
    }

    Ok(text)
}
