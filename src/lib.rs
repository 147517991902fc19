//! # edgequake-storybook
//!
//! Turn a PDF novel into an illustrated children's storybook.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Extract    page text via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Segment    chapter headings, or fixed-size chunks as a fallback
//!  ├─ 4. Transform  title + retelling for ages 6–8 (text gate, retried)
//!  ├─ 5. Illustrate image prompt + image (image gate, single-flight cache)
//!  └─ 6. Assemble   Markdown (or JSON) storybook
//! ```
//!
//! Progress is reported as a sequence of [`ProgressEvent`]s ending with one
//! `complete` or `error` event, either through a [`ProgressObserver`] or as
//! a stream ([`Storybook::ingest_stream`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_storybook::{export_to_file, MarkdownAssembler, Storybook, StorybookConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Text provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY,
//!     // images from GEMINI_API_KEY.
//!     let storybook = Storybook::new(StorybookConfig::default())?;
//!     let document = storybook.ingest_input("novel.pdf", None).await?;
//!     eprintln!("{} chapters, {} failed", document.chapters.len(), document.failed_count());
//!
//!     let ready = storybook.prepare_export(&document).await;
//!     export_to_file(&ready, &MarkdownAssembler::default(), "novel.md").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `storybook` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-storybook = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod service;
pub mod storybook;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{export_to_file, Assembler, JsonAssembler, MarkdownAssembler};
pub use config::{StorybookConfig, StorybookConfigBuilder};
pub use document::{Chapter, ChapterState, ChapterStub, Document, FailedStep, PLACEHOLDER_TEXT};
pub use error::{
    IllustrationError, ServiceError, ServiceErrorKind, StepFailure, StorybookError, TransformationError,
};
pub use pipeline::cache::CacheStats;
pub use pipeline::extract::{PdfiumExtractor, TextExtractor};
pub use pipeline::illustrate::Illustration;
pub use pipeline::transform::Transformation;
pub use progress::{EventKind, ProgressEvent, ProgressObserver, ProgressReporter};
pub use service::{GeneratedImage, ImageGenerator, ResponseFormat, TextGenerator};
pub use storybook::{ingest_input_sync, outline, Storybook};
pub use stream::{sse_frames, EventStream};
