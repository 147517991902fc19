//! Image generation over the Gemini `generateContent` REST endpoint.
//!
//! The request asks for the `IMAGE` response modality; the reply carries the
//! picture as base64 `inlineData` inside the first candidate. Safety blocks
//! show up either as `promptFeedback.blockReason` or as a candidate
//! `finishReason` and are reported as
//! [`ServiceErrorKind::PolicyRejected`].

use crate::config::StorybookConfig;
use crate::error::{ServiceError, ServiceErrorKind, StorybookError};
use crate::service::{GeneratedImage, ImageGenerator};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// [`ImageGenerator`] calling Gemini image models.
#[derive(Debug, Clone)]
pub struct GeminiImageGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiImageGenerator {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StorybookError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorybookError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: API_BASE.to_string(),
        })
    }

    /// Point the client at another endpoint (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build from `GEMINI_API_KEY`.
    pub fn from_env(config: &StorybookConfig) -> Result<Self, StorybookError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| StorybookError::ProviderNotConfigured {
                provider: "gemini-image".to_string(),
                hint: "Set GEMINI_API_KEY to enable illustration generation.".to_string(),
            })?;
        Self::new(
            api_key,
            config.image_model.clone(),
            Duration::from_secs(config.api_timeout_secs),
        )
    }

    /// Injected generator if any, else [`Self::from_env`].
    pub fn resolve(config: &StorybookConfig) -> Result<Arc<dyn ImageGenerator>, StorybookError> {
        if let Some(ref generator) = config.image_generator {
            return Ok(Arc::clone(generator));
        }
        Ok(Arc::new(Self::from_env(config)?))
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ImageGenerator for GeminiImageGenerator {
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, ServiceError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["IMAGE"] }
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            let kind = ServiceErrorKind::from_status(status.as_u16());
            return Err(ServiceError::new(kind, format!("HTTP {status}: {}", snippet(&text))));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            ServiceError::new(
                ServiceErrorKind::Unavailable,
                format!("unparseable image response: {e}"),
            )
        })?;
        extract_image(parsed)
    }
}

fn transport_error(e: reqwest::Error) -> ServiceError {
    let kind = if e.is_timeout() {
        ServiceErrorKind::Timeout
    } else if e.is_connect() || e.is_request() || e.is_body() {
        ServiceErrorKind::Network
    } else {
        ServiceErrorKind::classify(&e.to_string())
    };
    ServiceError::new(kind, e.to_string())
}

fn snippet(text: &str) -> String {
    text.chars().take(200).collect()
}

// ── Response schema ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: String,
}

const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "PROHIBITED_CONTENT",
    "IMAGE_SAFETY",
    "BLOCKLIST",
    "RECITATION",
];

fn extract_image(response: GenerateContentResponse) -> Result<GeneratedImage, ServiceError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ServiceError::new(
            ServiceErrorKind::PolicyRejected,
            format!("prompt blocked: {reason}"),
        ));
    }

    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        ServiceError::new(ServiceErrorKind::Unavailable, "response contained no candidates")
    })?;

    if let Some(ref reason) = candidate.finish_reason {
        if BLOCKING_FINISH_REASONS.contains(&reason.as_str()) {
            return Err(ServiceError::new(
                ServiceErrorKind::PolicyRejected,
                format!("generation stopped: {reason}"),
            ));
        }
    }

    let inline = candidate
        .content
        .into_iter()
        .flat_map(|c| c.parts)
        .find_map(|p| p.inline_data)
        .ok_or_else(|| {
            ServiceError::new(ServiceErrorKind::Unavailable, "response contained no image data")
        })?;

    let bytes = STANDARD.decode(inline.data.as_bytes()).map_err(|e| {
        ServiceError::new(ServiceErrorKind::Unavailable, format!("invalid base64 image: {e}"))
    })?;
    debug!("Received image → {} bytes", bytes.len());

    Ok(GeneratedImage {
        bytes,
        mime_type: inline.mime_type,
    })
}
