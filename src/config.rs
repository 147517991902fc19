//! Configuration types for storybook generation.
//!
//! Every knob of the pipeline lives in [`StorybookConfig`], built via its
//! [`StorybookConfigBuilder`]. Service handles (text generator, image
//! generator, extractor, progress observer) are injected here too, which is
//! how tests swap in scripted doubles.

use crate::error::StorybookError;
use crate::pipeline::extract::TextExtractor;
use crate::pipeline::retry::RetryPolicy;
use crate::progress::ProgressCallback;
use crate::service::gemini::DEFAULT_IMAGE_MODEL;
use crate::service::{ImageGenerator, TextGenerator};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for turning a document into a storybook.
///
/// Built via [`StorybookConfig::builder()`] or using
/// [`StorybookConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_storybook::StorybookConfig;
///
/// let config = StorybookConfig::builder()
///     .max_chapters(5)
///     .text_slots(2)
///     .image_slots(1)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_chapters, 5);
/// ```
#[derive(Clone)]
pub struct StorybookConfig {
    // ── Segmentation ──────────────────────────────────────────────────────
    /// Maximum number of chapters kept from a document. Default: 10.
    ///
    /// Anything past the cap is dropped, not queued.
    pub max_chapters: usize,

    /// Chapter body length (characters) before truncation with `"..."`. Default: 3000.
    pub max_chapter_chars: usize,

    /// A chapter's first line is taken as its title when shorter than this. Default: 100.
    pub title_line_max_chars: usize,

    /// Words per chunk when the document has no chapter markers. Default: 500.
    pub fallback_chunk_words: usize,

    // ── Concurrency ───────────────────────────────────────────────────────
    /// Concurrent text-generation calls. Default: 2.
    pub text_slots: usize,

    /// Concurrent image-generation calls. Default: 1.
    pub image_slots: usize,

    /// Chapters processed concurrently during bulk ingestion. Default: 2.
    ///
    /// Remote calls are still bounded by the slot counts above; this only
    /// controls how many chapter pipelines are interleaved.
    pub chapter_concurrency: usize,

    // ── Retry ─────────────────────────────────────────────────────────────
    /// Total attempts per remote call, first try included. Default: 5.
    pub max_attempts: u32,

    /// Backoff base in milliseconds; attempt `n` sleeps `base * 2^n + jitter`. Default: 3000.
    pub retry_base_delay_ms: u64,

    /// Upper bound (exclusive) of the uniform jitter added to each backoff. Default: 1000.
    pub retry_jitter_ms: u64,

    // ── Pipeline behaviour ────────────────────────────────────────────────
    /// Illustrate chapters during bulk ingestion. Default: true.
    ///
    /// When false, images are produced on demand or at export time.
    pub illustrate_on_ingest: bool,

    /// Leading characters of the raw chapter text sent for titling. Default: 1000.
    pub title_source_chars: usize,

    // ── Providers ─────────────────────────────────────────────────────────
    /// Text model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// Text provider name (e.g. "gemini", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Image model for the Gemini image endpoint. Default: `gemini-2.5-flash-image`.
    pub image_model: String,

    /// Sampling temperature for text generation. Default: 0.7.
    pub temperature: f32,

    /// Maximum tokens per text completion. Default: 2048.
    pub max_tokens: usize,

    /// Per remote call timeout in seconds. Default: 90.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    // ── Injected services ─────────────────────────────────────────────────
    /// Pre-constructed text generator. Takes precedence over `provider_name`.
    pub text_generator: Option<Arc<dyn TextGenerator>>,

    /// Pre-constructed image generator. Takes precedence over `GEMINI_API_KEY`.
    pub image_generator: Option<Arc<dyn ImageGenerator>>,

    /// Text extractor. If None, pdfium is used.
    pub extractor: Option<Arc<dyn TextExtractor>>,

    /// Observer for progress events on the eager API.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for StorybookConfig {
    fn default() -> Self {
        Self {
            max_chapters: 10,
            max_chapter_chars: 3000,
            title_line_max_chars: 100,
            fallback_chunk_words: 500,
            text_slots: 2,
            image_slots: 1,
            chapter_concurrency: 2,
            max_attempts: 5,
            retry_base_delay_ms: 3000,
            retry_jitter_ms: 1000,
            illustrate_on_ingest: true,
            title_source_chars: 1000,
            model: None,
            provider_name: None,
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            api_timeout_secs: 90,
            download_timeout_secs: 120,
            password: None,
            text_generator: None,
            image_generator: None,
            extractor: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for StorybookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorybookConfig")
            .field("max_chapters", &self.max_chapters)
            .field("max_chapter_chars", &self.max_chapter_chars)
            .field("fallback_chunk_words", &self.fallback_chunk_words)
            .field("text_slots", &self.text_slots)
            .field("image_slots", &self.image_slots)
            .field("chapter_concurrency", &self.chapter_concurrency)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_jitter_ms", &self.retry_jitter_ms)
            .field("illustrate_on_ingest", &self.illustrate_on_ingest)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("image_model", &self.image_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("text_generator", &self.text_generator.as_ref().map(|_| "<dyn TextGenerator>"))
            .field("image_generator", &self.image_generator.as_ref().map(|_| "<dyn ImageGenerator>"))
            .field("extractor", &self.extractor.as_ref().map(|_| "<dyn TextExtractor>"))
            .field("progress_callback", &self.progress_callback.as_ref().map(|_| "<dyn ProgressObserver>"))
            .finish()
    }
}

impl StorybookConfig {
    /// Create a new builder for `StorybookConfig`.
    pub fn builder() -> StorybookConfigBuilder {
        StorybookConfigBuilder {
            config: Self::default(),
        }
    }

    /// Retry policy derived from the retry fields.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            jitter: Duration::from_millis(self.retry_jitter_ms),
        }
    }
}

/// Builder for [`StorybookConfig`].
#[derive(Debug)]
pub struct StorybookConfigBuilder {
    config: StorybookConfig,
}

impl StorybookConfigBuilder {
    pub fn max_chapters(mut self, n: usize) -> Self {
        self.config.max_chapters = n;
        self
    }

    pub fn max_chapter_chars(mut self, n: usize) -> Self {
        self.config.max_chapter_chars = n;
        self
    }

    pub fn title_line_max_chars(mut self, n: usize) -> Self {
        self.config.title_line_max_chars = n;
        self
    }

    pub fn fallback_chunk_words(mut self, n: usize) -> Self {
        self.config.fallback_chunk_words = n;
        self
    }

    pub fn text_slots(mut self, n: usize) -> Self {
        self.config.text_slots = n;
        self
    }

    pub fn image_slots(mut self, n: usize) -> Self {
        self.config.image_slots = n;
        self
    }

    pub fn chapter_concurrency(mut self, n: usize) -> Self {
        self.config.chapter_concurrency = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    pub fn retry_jitter_ms(mut self, ms: u64) -> Self {
        self.config.retry_jitter_ms = ms;
        self
    }

    pub fn illustrate_on_ingest(mut self, v: bool) -> Self {
        self.config.illustrate_on_ingest = v;
        self
    }

    pub fn title_source_chars(mut self, n: usize) -> Self {
        self.config.title_source_chars = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.config.image_model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn text_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.config.text_generator = Some(generator);
        self
    }

    pub fn image_generator(mut self, generator: Arc<dyn ImageGenerator>) -> Self {
        self.config.image_generator = Some(generator);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.config.extractor = Some(extractor);
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<StorybookConfig, StorybookError> {
        let c = &self.config;
        let positive = [
            ("max_chapters", c.max_chapters),
            ("max_chapter_chars", c.max_chapter_chars),
            ("fallback_chunk_words", c.fallback_chunk_words),
            ("text_slots", c.text_slots),
            ("image_slots", c.image_slots),
            ("chapter_concurrency", c.chapter_concurrency),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(StorybookError::InvalidConfig(format!(
                    "{name} must be ≥ 1"
                )));
            }
        }
        if c.max_attempts == 0 {
            return Err(StorybookError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.image_model.trim().is_empty() {
            return Err(StorybookError::InvalidConfig(
                "image_model must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
