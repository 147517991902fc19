//! Illustrator: simplified story → image prompt → cached illustration.
//!
//! The prompt is derived through the text gate and requested as JSON
//! (`{"image_prompt": "..."}`); a reply that is not valid JSON is used as
//! the prompt itself after cleanup. The image is looked up in the
//! [`IllustrationCache`] under the prompt *before* the style qualifier is
//! added, and only generated (through the image gate) on a miss.

use crate::error::{IllustrationError, StepFailure};
use crate::pipeline::cache::{CacheStats, IllustrationCache};
use crate::pipeline::gate::{ConcurrencyGate, Gate};
use crate::pipeline::postprocess::{clean_image_prompt, JSON_RULES};
use crate::pipeline::retry::{retry, RetryPolicy};
use crate::prompts::{self, FALLBACK_IMAGE_PROMPT};
use crate::service::{GeneratedImage, ImageGenerator, ResponseFormat, TextGenerator};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_MIME: &str = "image/png";

/// Image prompt plus the rendered image as a data URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Illustration {
    pub image_prompt: String,
    pub image: String,
}

#[derive(Clone)]
pub struct Illustrator {
    text: Arc<dyn TextGenerator>,
    images: Arc<dyn ImageGenerator>,
    gates: ConcurrencyGate,
    policy: RetryPolicy,
    cache: Arc<IllustrationCache>,
}

impl Illustrator {
    pub fn new(
        text: Arc<dyn TextGenerator>,
        images: Arc<dyn ImageGenerator>,
        gates: ConcurrencyGate,
        policy: RetryPolicy,
        cache: Arc<IllustrationCache>,
    ) -> Self {
        Self {
            text,
            images,
            gates,
            policy,
            cache,
        }
    }

    /// One vivid, single-scene prompt for `simplified_text`.
    pub async fn derive_prompt(&self, simplified_text: &str) -> Result<String, IllustrationError> {
        let request = prompts::image_prompt_request(simplified_text);
        let reply = retry(&self.policy, "image prompt", || async {
            let _slot = self.gates.text.acquire().await?;
            self.text.generate_text(&request, ResponseFormat::Json).await
        })
        .await
        .map_err(IllustrationError::Prompt)?;
        Ok(parse_image_prompt(&reply))
    }

    /// Image for `image_prompt`, from the cache or freshly generated.
    pub async fn render(&self, image_prompt: &str) -> Result<String, IllustrationError> {
        let images = Arc::clone(&self.images);
        let gate = self.gates.image.clone();
        let policy = self.policy;
        let styled = prompts::styled_image_prompt(image_prompt.trim());

        self.cache
            .get_or_generate(image_prompt, move || generate_image(images, gate, policy, styled))
            .await
            .map_err(IllustrationError::Image)
    }

    /// Derive a prompt for `simplified_text` and render it.
    pub async fn illustrate(&self, simplified_text: &str) -> Result<Illustration, IllustrationError> {
        let image_prompt = self.derive_prompt(simplified_text).await?;
        debug!("image prompt: {image_prompt}");
        let image = self.render(&image_prompt).await?;
        Ok(Illustration {
            image_prompt,
            image,
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

async fn generate_image(
    images: Arc<dyn ImageGenerator>,
    gate: Gate,
    policy: RetryPolicy,
    prompt: String,
) -> Result<String, StepFailure> {
    let image = retry(&policy, "image generation", || async {
        let _slot = gate.acquire().await?;
        images.generate_image(&prompt).await
    })
    .await?;
    info!("Generated illustration ({} bytes)", image.bytes.len());
    Ok(encode_data_uri(&image))
}

/// `data:<mime>;base64,<payload>`, sniffing the format when the service
/// did not say.
pub fn encode_data_uri(image: &GeneratedImage) -> String {
    let mime = image
        .mime_type
        .as_deref()
        .filter(|m| m.starts_with("image/"))
        .map(str::to_string)
        .or_else(|| {
            image::guess_format(&image.bytes)
                .ok()
                .map(|f| f.to_mime_type().to_string())
        })
        .unwrap_or_else(|| DEFAULT_MIME.to_string());
    format!("data:{mime};base64,{}", STANDARD.encode(&image.bytes))
}

/// Pull `image_prompt` out of a JSON reply, falling back to the raw text.
fn parse_image_prompt(reply: &str) -> String {
    let body = JSON_RULES.apply(reply);
    let prompt = match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(value) => value
            .get("image_prompt")
            .and_then(|v| v.as_str())
            .map(clean_image_prompt)
            .unwrap_or_default(),
        Err(_) => clean_image_prompt(&body),
    };
    if prompt.is_empty() {
        FALLBACK_IMAGE_PROMPT.to_string()
    } else {
        prompt
    }
}
