//! Remote generative services consumed by the pipeline.
//!
//! The pipeline only ever talks to these two traits. Production adapters
//! live in the submodules:
//!
//! - [`llm`]    — text generation over any `edgequake-llm` provider
//! - [`gemini`] — image generation over the Gemini REST API
//!
//! Every failure is reported as a [`ServiceError`] whose
//! [`ServiceErrorKind`](crate::error::ServiceErrorKind) drives the retry
//! executor's retry-or-surface decision.

pub mod gemini;
pub mod llm;

use crate::error::ServiceError;
use async_trait::async_trait;

pub use gemini::GeminiImageGenerator;
pub use llm::LlmTextGenerator;

/// Shape of the reply a text-generation call should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// Free-form text.
    #[default]
    Text,
    /// A single JSON object.
    Json,
}

/// Raw image bytes returned by an image-generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    /// MIME type reported by the service, if any.
    pub mime_type: Option<String>,
}

/// Remote text-generation call: `generateText(prompt, responseFormat) -> text`.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(
        &self,
        prompt: &str,
        format: ResponseFormat,
    ) -> Result<String, ServiceError>;
}

/// Remote image-generation call: `generateImage(prompt) -> binaryImage`.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, ServiceError>;
}
