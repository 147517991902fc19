//! Text generation over an `edgequake-llm` provider.
//!
//! Each call is a single user turn; JSON replies are requested with an
//! extra system message. Provider errors arrive as opaque text and are
//! classified with [`ServiceErrorKind::classify`].

use crate::config::StorybookConfig;
use crate::error::{ServiceError, ServiceErrorKind, StorybookError};
use crate::service::{ResponseFormat, TextGenerator};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default model when the provider is Gemini and no model was named.
pub const DEFAULT_GEMINI_TEXT_MODEL: &str = "gemini-2.5-flash";
/// Default model for every other provider.
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4.1-nano";

const JSON_INSTRUCTION: &str =
    "Respond with a single JSON object and nothing else. Do not wrap it in code fences.";

/// [`TextGenerator`] backed by any [`LLMProvider`].
pub struct LlmTextGenerator {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl LlmTextGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &StorybookConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Resolve the text generator, from most-specific to least-specific:
    ///
    /// 1. an injected [`TextGenerator`] on the config
    /// 2. `provider_name` (+ `model`) via [`ProviderFactory::create_llm_provider`]
    /// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
    /// 4. `GEMINI_API_KEY` present → Gemini
    /// 5. [`ProviderFactory::from_env`] auto-detection
    pub fn resolve(config: &StorybookConfig) -> Result<Arc<dyn TextGenerator>, StorybookError> {
        if let Some(ref generator) = config.text_generator {
            return Ok(Arc::clone(generator));
        }

        let provider = if let Some(ref name) = config.provider_name {
            create_provider(name, &default_model_for(name, config))?
        } else if let (Ok(prov), Ok(model)) = (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            if !prov.is_empty() && !model.is_empty() {
                create_provider(&prov, &model)?
            } else {
                auto_detect(config)?
            }
        } else {
            auto_detect(config)?
        };

        Ok(Arc::new(Self::new(provider, config)))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TextGenerator for LlmTextGenerator {
    async fn generate_text(
        &self,
        prompt: &str,
        format: ResponseFormat,
    ) -> Result<String, ServiceError> {
        let mut messages = Vec::with_capacity(2);
        if format == ResponseFormat::Json {
            messages.push(ChatMessage::system(JSON_INSTRUCTION));
        }
        messages.push(ChatMessage::user(prompt));

        let options = self.options();
        let start = Instant::now();
        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| {
                ServiceError::new(
                    ServiceErrorKind::Timeout,
                    format!("text generation timed out after {}s", self.timeout.as_secs()),
                )
            })?
            .map_err(|e| ServiceError::classified(e.to_string()))?;

        debug!(
            "text generation: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(ServiceError::new(
                ServiceErrorKind::Unavailable,
                "provider returned an empty response",
            ));
        }
        Ok(response.content)
    }
}

fn default_model_for(provider: &str, config: &StorybookConfig) -> String {
    match config.model {
        Some(ref m) => m.clone(),
        None if provider.eq_ignore_ascii_case("gemini") => DEFAULT_GEMINI_TEXT_MODEL.to_string(),
        None => DEFAULT_TEXT_MODEL.to_string(),
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, StorybookError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        StorybookError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn auto_detect(config: &StorybookConfig) -> Result<Arc<dyn LLMProvider>, StorybookError> {
    if std::env::var("GEMINI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_provider("gemini", &default_model_for("gemini", config));
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| StorybookError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No text-generation provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or ANTHROPIC_API_KEY.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(llm_provider)
}
