//! Pipeline orchestrator.
//!
//! [`Storybook`] owns the services, gates and illustration cache for one
//! process and drives documents through them:
//!
//! ```text
//! extract ──▶ segment ──▶ per chapter: title ──▶ simplify ──▶ [illustrate]
//! (10%)        (20%)       └──────────── 20% … 95% ─────────────┘     complete (100%)
//! ```
//!
//! Bulk ingestion isolates chapter failures: a chapter whose transformation
//! fails gets the placeholder title `"Chapter {n}"` and placeholder text and
//! is marked `Failed`, and the document still completes. Only document-fatal
//! problems (unreadable or empty input) produce an `error` event. The
//! on-demand entry points ([`Storybook::simplify_chapter`],
//! [`Storybook::generate_image`], [`Storybook::illustrate_chapter`]) return
//! per-chapter errors to the caller instead.

use crate::config::StorybookConfig;
use crate::document::{Chapter, ChapterState, ChapterStub, Document, FailedStep, PLACEHOLDER_TEXT};
use crate::error::{IllustrationError, StorybookError, TransformationError};
use crate::pipeline::cache::{CacheStats, IllustrationCache};
use crate::pipeline::extract::{PdfiumExtractor, TextExtractor};
use crate::pipeline::gate::ConcurrencyGate;
use crate::pipeline::illustrate::Illustrator;
use crate::pipeline::input;
use crate::pipeline::segment::{segment, SegmentLimits};
use crate::pipeline::transform::{Transformation, Transformer};
use crate::progress::{ProgressReporter, EXTRACTED_PERCENT, SEGMENTED_PERCENT};
use crate::service::{GeminiImageGenerator, LlmTextGenerator};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Transformer steps reported per chapter (title, simplify).
const TRANSFORM_STEPS: usize = 2;

/// The storybook pipeline. Cheap to clone; clones share gates and cache.
#[derive(Clone)]
pub struct Storybook {
    config: StorybookConfig,
    limits: SegmentLimits,
    extractor: Arc<dyn TextExtractor>,
    transformer: Transformer,
    illustrator: Illustrator,
    gates: ConcurrencyGate,
    cache: Arc<IllustrationCache>,
}

impl Storybook {
    /// Resolve services from `config` and build the pipeline.
    ///
    /// # Errors
    /// [`StorybookError::ProviderNotConfigured`] when no text or image
    /// provider can be found.
    pub fn new(config: StorybookConfig) -> Result<Self, StorybookError> {
        let text = LlmTextGenerator::resolve(&config)?;
        let images = GeminiImageGenerator::resolve(&config)?;
        let extractor = extractor_for(&config);

        let gates = ConcurrencyGate::from_config(&config);
        let cache = Arc::new(IllustrationCache::new());
        let policy = config.retry_policy();
        let transformer = Transformer::new(
            Arc::clone(&text),
            gates.text.clone(),
            policy,
            config.title_source_chars,
        );
        let illustrator = Illustrator::new(text, images, gates.clone(), policy, Arc::clone(&cache));

        Ok(Self {
            limits: SegmentLimits::from(&config),
            config,
            extractor,
            transformer,
            illustrator,
            gates,
            cache,
        })
    }

    pub fn config(&self) -> &StorybookConfig {
        &self.config
    }

    /// Reporter wired to the configured progress callback, or a silent one.
    pub fn reporter(&self) -> ProgressReporter {
        match self.config.progress_callback {
            Some(ref cb) => ProgressReporter::with_callback(Arc::clone(cb)),
            None => ProgressReporter::silent(),
        }
    }

    /// Segment `text` with the configured limits.
    pub fn segment(&self, text: &str) -> Vec<ChapterStub> {
        segment(text, &self.limits)
    }

    // ── Bulk ingestion ───────────────────────────────────────────────────

    /// Load a PDF from a path or URL and ingest it.
    ///
    /// The document title is `title`, or the file name without `.pdf`.
    /// Progress goes to the configured callback.
    pub async fn ingest_input(
        &self,
        input_str: impl AsRef<str>,
        title: Option<&str>,
    ) -> Result<Document, StorybookError> {
        let reporter = self.reporter();
        let loaded = match input::load_document(input_str.as_ref(), self.config.download_timeout_secs).await {
            Ok(loaded) => loaded,
            Err(e) => {
                reporter.error(e.to_string());
                return Err(e);
            }
        };
        let title = title.map_or_else(|| loaded.title(), str::to_string);
        self.ingest(&loaded.bytes, &title, &reporter).await
    }

    /// Extract, segment and process a document held in memory.
    ///
    /// # Errors
    /// Only document-fatal conditions: unreadable input, no text, or an
    /// aborted reporter. Chapter failures are recorded on the chapters.
    pub async fn ingest(
        &self,
        bytes: &[u8],
        title: &str,
        reporter: &ProgressReporter,
    ) -> Result<Document, StorybookError> {
        let text = match self.extractor.extract_text(bytes).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Extraction failed: {e}");
                reporter.error(e.to_string());
                return Err(e);
            }
        };
        self.ingest_text(&text, title, reporter).await
    }

    /// Segment and process already-extracted text.
    pub async fn ingest_text(
        &self,
        text: &str,
        title: &str,
        reporter: &ProgressReporter,
    ) -> Result<Document, StorybookError> {
        let start = Instant::now();
        if text.trim().is_empty() {
            let e = StorybookError::EmptyDocument;
            reporter.error(e.to_string());
            return Err(e);
        }
        reporter.milestone(
            EXTRACTED_PERCENT,
            format!("Extracted {} characters", text.chars().count()),
        );

        let stubs = self.segment(text);
        info!("'{}': {} chapters", title, stubs.len());
        reporter.milestone(SEGMENTED_PERCENT, format!("Found {} chapters", stubs.len()));

        let mut document = Document::from_stubs(title, stubs);
        let illustrate = self.config.illustrate_on_ingest;
        reporter.plan_steps(document.chapters.len() * steps_per_chapter(illustrate));

        let chapters = std::mem::take(&mut document.chapters);
        let mut processed: Vec<Chapter> = stream::iter(chapters)
            .map(|chapter| self.process_chapter(chapter, illustrate, reporter))
            .buffer_unordered(self.config.chapter_concurrency)
            .collect()
            .await;
        processed.sort_by_key(|c| c.number);
        document.chapters = processed;

        self.finish(&document, reporter)?;
        info!(
            "'{}' complete: {} chapters, {} failed, {}ms",
            document.title,
            document.chapters.len(),
            document.failed_count(),
            start.elapsed().as_millis()
        );
        Ok(document)
    }

    /// Re-enter the pipeline for every `Failed` chapter, at the step it
    /// failed. Returns how many chapters are still failed afterwards.
    pub async fn redrive_failed(
        &self,
        document: &mut Document,
        reporter: &ProgressReporter,
    ) -> Result<usize, StorybookError> {
        let illustrate = self.config.illustrate_on_ingest;
        let targets: Vec<(usize, FailedStep)> = document
            .chapters
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.failed_step().map(|step| (i, step)))
            .collect();
        info!("Re-driving {} failed chapters", targets.len());

        let total_steps = targets
            .iter()
            .map(|(_, step)| match step {
                FailedStep::Transform => steps_per_chapter(illustrate),
                FailedStep::Illustrate => 1,
            })
            .sum();
        reporter.plan_steps(total_steps);

        let work: Vec<(usize, Chapter, FailedStep)> = targets
            .into_iter()
            .map(|(i, step)| (i, document.chapters[i].clone(), step))
            .collect();
        let results: Vec<(usize, Chapter)> = stream::iter(work)
            .map(|(i, chapter, step)| async move {
                let chapter = match step {
                    FailedStep::Transform => self.process_chapter(chapter, illustrate, reporter).await,
                    FailedStep::Illustrate => self.illustrate_step(chapter, reporter).await,
                };
                (i, chapter)
            })
            .buffer_unordered(self.config.chapter_concurrency)
            .collect()
            .await;
        for (i, chapter) in results {
            document.chapters[i] = chapter;
        }

        self.finish(document, reporter)?;
        Ok(document.failed_count())
    }

    fn finish(&self, document: &Document, reporter: &ProgressReporter) -> Result<(), StorybookError> {
        if reporter.is_aborted() {
            warn!("'{}': progress receiver gone, ingestion aborted", document.title);
            return Err(StorybookError::Aborted);
        }
        let payload = serde_json::to_value(document)
            .map_err(|e| StorybookError::Internal(format!("Failed to serialise document: {e}")))?;
        reporter.complete(Some(payload));
        Ok(())
    }

    /// Run one chapter through the Transformer and, when asked, the
    /// Illustrator. Never fails: errors degrade the chapter.
    async fn process_chapter(
        &self,
        mut chapter: Chapter,
        illustrate: bool,
        reporter: &ProgressReporter,
    ) -> Chapter {
        if reporter.is_aborted() {
            debug!("Chapter {}: skipped (aborted)", chapter.number);
            return chapter;
        }

        let mut done = 0;
        if let Err(e) = self.transform_steps(&mut chapter, reporter, &mut done).await {
            warn!("Chapter {}: {e}; using placeholder", chapter.number);
            chapter.title = format!("Chapter {}", chapter.number);
            chapter.simplified_text = Some(PLACEHOLDER_TEXT.to_string());
            if let Err(t) = chapter.fail(FailedStep::Transform, e.to_string()) {
                warn!("{t}");
            }
            let remaining = steps_per_chapter(illustrate).saturating_sub(done);
            reporter.advance(
                remaining,
                format!("Chapter {}: using placeholder text", chapter.number),
            );
            return chapter;
        }

        if illustrate {
            chapter = self.illustrate_step(chapter, reporter).await;
        }
        chapter
    }

    async fn transform_steps(
        &self,
        chapter: &mut Chapter,
        reporter: &ProgressReporter,
        done: &mut usize,
    ) -> Result<(), TransformationError> {
        chapter.transition(ChapterState::Simplifying)?;

        // A missing title is cosmetic; only a failed simplification
        // degrades the chapter.
        chapter.title = match self
            .transformer
            .generate_title(chapter.number, &chapter.raw_text)
            .await
        {
            Ok(title) => title,
            Err(e) => {
                warn!("Chapter {}: {e}; using default title", chapter.number);
                format!("Chapter {}", chapter.number)
            }
        };
        *done += 1;
        reporter.step(format!("Chapter {}: title \"{}\"", chapter.number, chapter.title));

        if reporter.is_aborted() {
            return Ok(());
        }
        let text = self
            .transformer
            .simplify(chapter.number, &chapter.raw_text)
            .await?;
        chapter.simplified_text = Some(text);
        chapter.transition(ChapterState::Simplified)?;
        *done += 1;
        reporter.step(format!("Chapter {}: story simplified", chapter.number));
        Ok(())
    }

    async fn illustrate_step(&self, mut chapter: Chapter, reporter: &ProgressReporter) -> Chapter {
        if reporter.is_aborted() {
            return chapter;
        }
        match self.illustrate_chapter(&mut chapter).await {
            Ok(()) => {
                reporter.step(format!("Chapter {}: illustration ready", chapter.number));
            }
            Err(e) => {
                warn!("Chapter {}: {e}; continuing without an image", chapter.number);
                reporter.step(format!("Chapter {}: illustration skipped", chapter.number));
            }
        }
        chapter
    }

    // ── On-demand operations ─────────────────────────────────────────────

    /// Title and simplify a single chapter, returning errors to the caller.
    pub async fn simplify_chapter(
        &self,
        number: usize,
        raw_text: &str,
    ) -> Result<Transformation, TransformationError> {
        let stub = ChapterStub {
            number,
            title_hint: format!("Chapter {number}"),
            text: raw_text.to_string(),
        };
        self.transformer.transform(&stub).await
    }

    /// Image for an already-derived prompt, served from the cache when
    /// possible.
    pub async fn generate_image(&self, prompt: &str) -> Result<String, IllustrationError> {
        self.illustrator.render(prompt).await
    }

    /// Illustrate `chapter` in place.
    ///
    /// A prompt already on the chapter is reused. On failure the chapter is
    /// marked `Failed` at the illustrate step and the error is returned.
    pub async fn illustrate_chapter(&self, chapter: &mut Chapter) -> Result<(), IllustrationError> {
        let text = chapter
            .simplified_text
            .clone()
            .ok_or(IllustrationError::MissingText(chapter.number))?;
        chapter.transition(ChapterState::IllustrationRequested)?;

        let result = async {
            let prompt = match chapter.image_prompt.clone() {
                Some(p) if !p.trim().is_empty() => p,
                _ => {
                    let p = self.illustrator.derive_prompt(&text).await?;
                    chapter.image_prompt = Some(p.clone());
                    p
                }
            };
            self.illustrator.render(&prompt).await
        }
        .await;

        match result {
            Ok(image) => {
                chapter.image = Some(image);
                chapter.transition(ChapterState::Illustrated)?;
                Ok(())
            }
            Err(e) => {
                chapter.fail(FailedStep::Illustrate, e.to_string())?;
                Err(e)
            }
        }
    }

    /// Fresh copy of `document` with every chapter that has text but no
    /// image illustrated. Chapters whose illustration fails keep no image.
    pub async fn prepare_export(&self, document: &Document) -> Document {
        let mut export = document.clone();
        let pending: Vec<(usize, Chapter)> = export
            .chapters
            .iter()
            .enumerate()
            .filter(|(_, c)| needs_illustration(c))
            .map(|(i, c)| (i, c.clone()))
            .collect();
        if pending.is_empty() {
            return export;
        }
        info!("Illustrating {} chapters for export", pending.len());

        let results: Vec<(usize, Chapter)> = stream::iter(pending)
            .map(|(i, mut chapter)| async move {
                if let Err(e) = self.illustrate_chapter(&mut chapter).await {
                    warn!("Chapter {}: export without image ({e})", chapter.number);
                }
                (i, chapter)
            })
            .buffer_unordered(self.config.chapter_concurrency)
            .collect()
            .await;
        for (i, chapter) in results {
            export.chapters[i] = chapter;
        }
        export
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Close both gates. Waiting and future remote calls fail as cancelled.
    pub fn shutdown(&self) {
        info!("Shutting down storybook gates");
        self.gates.close();
    }
}

/// Blocking wrapper around [`Storybook::ingest_input`] for callers without
/// an async runtime.
pub fn ingest_input_sync(
    storybook: &Storybook,
    input_str: impl AsRef<str>,
    title: Option<&str>,
) -> Result<Document, StorybookError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| StorybookError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(storybook.ingest_input(input_str, title))
}

/// Load, extract and segment a document without calling any generative
/// service. Useful to preview how a document will be split.
pub async fn outline(
    input_str: impl AsRef<str>,
    config: &StorybookConfig,
) -> Result<Vec<ChapterStub>, StorybookError> {
    let loaded = input::load_document(input_str.as_ref(), config.download_timeout_secs).await?;
    let text = extractor_for(config).extract_text(&loaded.bytes).await?;
    if text.trim().is_empty() {
        return Err(StorybookError::EmptyDocument);
    }
    Ok(segment(&text, &SegmentLimits::from(config)))
}

fn extractor_for(config: &StorybookConfig) -> Arc<dyn TextExtractor> {
    match config.extractor {
        Some(ref e) => Arc::clone(e),
        None => Arc::new(PdfiumExtractor::new(config.password.clone())),
    }
}

fn steps_per_chapter(illustrate: bool) -> usize {
    TRANSFORM_STEPS + usize::from(illustrate)
}

/// Has real simplified text but no image yet.
fn needs_illustration(chapter: &Chapter) -> bool {
    chapter.image.is_none()
        && chapter.simplified_text.is_some()
        && matches!(
            chapter.state(),
            ChapterState::Simplified | ChapterState::Illustrated | ChapterState::Failed
        )
        && chapter.failed_step() != Some(FailedStep::Transform)
}
