//! Integration tests for the storybook pipeline.
//!
//! Every remote service is replaced by a scripted double, so these run
//! offline and without pdfium: the extractor is injected too. Retry delays
//! are a millisecond with no jitter.

use async_trait::async_trait;
use edgequake_storybook::{
    export_to_file, ingest_input_sync, sse_frames, ChapterState, Document, EventKind, FailedStep,
    GeneratedImage, ImageGenerator, MarkdownAssembler, ProgressEvent, ProgressObserver,
    ProgressReporter, ResponseFormat, ServiceError, ServiceErrorKind, Storybook, StorybookConfig,
    StorybookError, TextExtractor, TextGenerator, PLACEHOLDER_TEXT,
};
use futures::future::join_all;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test doubles ─────────────────────────────────────────────────────────────

const STORY: &str = "A little fox found a warm place to sleep.";

/// Tracks concurrent calls and their peak.
#[derive(Default)]
struct Load {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Load {
    /// Count a call and return its 1-based ordinal.
    fn enter(&self) -> usize {
        let ordinal = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ordinal
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Text model double that answers by prompt kind.
struct FakeText {
    load: Load,
    delay: Duration,
    title_reply: String,
    /// Calls fail with `Overloaded` while this is above zero.
    transient_failures: AtomicUsize,
    /// Prompts containing this text are refused by policy.
    refuse: Mutex<Option<String>>,
    refused: AtomicUsize,
    /// Give every chapter its own image prompt instead of a shared one.
    distinct_prompts: bool,
}

impl FakeText {
    fn new() -> Self {
        Self {
            load: Load::default(),
            delay: Duration::ZERO,
            title_reply: "The Sleepy Fox".into(),
            transient_failures: AtomicUsize::new(0),
            refuse: Mutex::new(None),
            refused: AtomicUsize::new(0),
            distinct_prompts: false,
        }
    }

    fn refusing(self, marker: &str) -> Self {
        *self.refuse.lock().unwrap() = Some(marker.to_string());
        self
    }

    fn stop_refusing(&self) {
        *self.refuse.lock().unwrap() = None;
    }

    fn reply(&self, prompt: &str, format: ResponseFormat, ordinal: usize) -> Result<String, ServiceError> {
        if let Some(ref marker) = *self.refuse.lock().unwrap() {
            if prompt.contains(marker.as_str()) {
                self.refused.fetch_add(1, Ordering::SeqCst);
                return Err(ServiceError::new(ServiceErrorKind::PolicyRejected, "blocked"));
            }
        }
        let pending = self.transient_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_failures.store(pending - 1, Ordering::SeqCst);
            return Err(ServiceError::new(ServiceErrorKind::Overloaded, "503 overloaded"));
        }

        if format == ResponseFormat::Json {
            let scene = if self.distinct_prompts {
                format!("A fox, scene {ordinal}")
            } else {
                "A fox asleep in the snow".to_string()
            };
            Ok(format!(r#"{{"image_prompt": "{scene}"}}"#))
        } else if prompt.contains("chapter title") {
            Ok(self.title_reply.clone())
        } else {
            Ok(STORY.to_string())
        }
    }
}

#[async_trait]
impl TextGenerator for FakeText {
    async fn generate_text(&self, prompt: &str, format: ResponseFormat) -> Result<String, ServiceError> {
        let ordinal = self.load.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self.reply(prompt, format, ordinal);
        self.load.leave();
        reply
    }
}

struct FakeImage {
    load: Load,
    delay: Duration,
    fail: AtomicBool,
}

impl FakeImage {
    fn new() -> Self {
        Self {
            load: Load::default(),
            delay: Duration::ZERO,
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ImageGenerator for FakeImage {
    async fn generate_image(&self, _prompt: &str) -> Result<GeneratedImage, ServiceError> {
        self.load.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.load.leave();
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::new(ServiceErrorKind::PolicyRejected, "SAFETY"));
        }
        Ok(GeneratedImage {
            bytes: vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
            mime_type: Some("image/png".into()),
        })
    }
}

/// Returns fixed text for any input bytes.
struct FixedText(String);

#[async_trait]
impl TextExtractor for FixedText {
    async fn extract_text(&self, _bytes: &[u8]) -> Result<String, StorybookError> {
        Ok(self.0.clone())
    }
}

/// Records every event it sees.
#[derive(Default)]
struct Recorder(Mutex<Vec<ProgressEvent>>);

impl ProgressObserver for Recorder {
    fn on_event(&self, event: &ProgressEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

impl Recorder {
    fn events(&self) -> Vec<ProgressEvent> {
        self.0.lock().unwrap().clone()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn words(n: usize, tag: &str) -> String {
    (0..n).map(|i| format!("{tag}{i}")).collect::<Vec<_>>().join(" ")
}

fn chapters(n: usize) -> String {
    (1..=n)
        .map(|i| format!("Chapter {i}\n{}\n", words(30, &format!("c{i}w"))))
        .collect()
}

struct Harness {
    storybook: Storybook,
    text: Arc<FakeText>,
    images: Arc<FakeImage>,
    recorder: Arc<Recorder>,
}

fn harness_with(
    text: FakeText,
    images: FakeImage,
    document: &str,
    configure: impl FnOnce(edgequake_storybook::StorybookConfigBuilder) -> edgequake_storybook::StorybookConfigBuilder,
) -> Harness {
    let text = Arc::new(text);
    let images = Arc::new(images);
    let recorder = Arc::new(Recorder::default());
    let builder = StorybookConfig::builder()
        .retry_base_delay_ms(1)
        .retry_jitter_ms(0)
        .text_generator(text.clone())
        .image_generator(images.clone())
        .extractor(Arc::new(FixedText(document.to_string())))
        .progress_callback(recorder.clone());
    let config = configure(builder).build().unwrap();
    Harness {
        storybook: Storybook::new(config).unwrap(),
        text,
        images,
        recorder,
    }
}

fn harness(document: &str) -> Harness {
    harness_with(FakeText::new(), FakeImage::new(), document, |b| b)
}

async fn ingest(h: &Harness) -> Result<Document, StorybookError> {
    let reporter = h.storybook.reporter();
    h.storybook.ingest(b"%PDF-1.7", "The Fox", &reporter).await
}

// ── Segmentation ─────────────────────────────────────────────────────────────

#[test]
fn test_two_marked_chapters_keep_exact_bodies() {
    let first = words(200, "a");
    let second = words(300, "b");
    let text = format!("Chapter 1\n{first}\nChapter 2\n{second}");

    let h = harness(&text);
    let stubs = h.storybook.segment(&text);
    assert_eq!(stubs.len(), 2);
    assert_eq!(stubs[0].number, 1);
    assert_eq!(stubs[0].text, first);
    assert_eq!(stubs[1].number, 2);
    assert_eq!(stubs[1].text, second);
}

#[test]
fn test_unmarked_text_is_chunked() {
    let h = harness("");
    for n in [10usize, 500, 501, 1700, 6000] {
        let stubs = h.storybook.segment(&words(n, "w"));
        assert_eq!(stubs.len(), n.div_ceil(500).min(10), "{n} words");
        assert!(stubs.iter().all(|s| s.title_hint.starts_with("Part ")));
    }
}

// ── Transformer ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_title_survives_two_overloads() {
    let text = FakeText {
        title_reply: "  'My Title'  ".into(),
        transient_failures: AtomicUsize::new(2),
        ..FakeText::new()
    };
    let h = harness_with(text, FakeImage::new(), "", |b| b);

    let out = h.storybook.simplify_chapter(1, "Once there was a fox.").await.unwrap();
    assert_eq!(out.title, "My Title");
    assert_eq!(out.simplified_text, STORY);
    // two failures, then title, then simplify
    assert_eq!(h.text.load.calls(), 4);
}

#[tokio::test]
async fn test_transient_errors_retry_until_budget() {
    let text = FakeText {
        transient_failures: AtomicUsize::new(usize::MAX),
        ..FakeText::new()
    };
    let h = harness_with(text, FakeImage::new(), "", |b| b.max_attempts(3));

    let err = h.storybook.simplify_chapter(1, "raw").await.unwrap_err();
    assert!(err.is_exhausted());
    assert_eq!(err.failure().map(|f| f.attempts), Some(3));
    assert_eq!(h.text.load.calls(), 3);
}

#[tokio::test]
async fn test_fatal_error_is_not_retried() {
    let h = harness_with(FakeText::new().refusing("forbidden"), FakeImage::new(), "", |b| b);

    let err = h.storybook.simplify_chapter(1, "a forbidden tale").await.unwrap_err();
    assert!(!err.is_exhausted());
    assert_eq!(err.failure().map(|f| f.kind), Some(ServiceErrorKind::PolicyRejected));
    assert_eq!(h.text.refused.load(Ordering::SeqCst), 1);
    assert_eq!(h.text.load.calls(), 1);
}

// ── Bulk ingestion ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ingest_illustrates_every_chapter() {
    let h = harness(&chapters(3));
    let doc = ingest(&h).await.unwrap();

    assert_eq!(doc.title, "The Fox");
    assert_eq!(doc.chapters.len(), 3);
    assert!(doc.numbering_is_valid());
    for chapter in &doc.chapters {
        assert_eq!(chapter.state(), ChapterState::Illustrated);
        assert_eq!(chapter.title, "The Sleepy Fox");
        assert_eq!(chapter.simplified_text.as_deref(), Some(STORY));
        assert_eq!(chapter.image_prompt.as_deref(), Some("A fox asleep in the snow"));
        assert!(chapter.image.as_deref().unwrap().starts_with("data:image/png;base64,"));
    }
    // same prompt for every chapter: one generation, the rest from the cache
    assert_eq!(h.images.load.calls(), 1);
    let stats = h.storybook.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits + stats.coalesced, 2);
}

#[tokio::test]
async fn test_fatal_chapter_degrades_and_document_completes() {
    let text = "Chapter 1: Dawn\nA calm morning.\nChapter 2: Dusk\nA forbidden night.\nChapter 3: Noon\nA bright day.\n";
    let h = harness_with(FakeText::new().refusing("forbidden"), FakeImage::new(), text, |b| b);
    let doc = ingest(&h).await.unwrap();

    let failed = doc.chapter(2).unwrap();
    assert_eq!(failed.state(), ChapterState::Failed);
    assert_eq!(failed.failed_step(), Some(FailedStep::Transform));
    assert_eq!(failed.title, "Chapter 2");
    assert_eq!(failed.simplified_text.as_deref(), Some(PLACEHOLDER_TEXT));
    assert!(failed.image.is_none());
    // title and story prompts both carry the refused text
    assert_eq!(h.text.refused.load(Ordering::SeqCst), 2);

    assert_eq!(doc.chapter(1).unwrap().state(), ChapterState::Illustrated);
    assert_eq!(doc.chapter(3).unwrap().state(), ChapterState::Illustrated);
    assert_eq!(doc.failed_count(), 1);

    let events = h.recorder.events();
    let last = events.last().unwrap();
    assert_eq!(last.kind, EventKind::Complete);
    assert_eq!(last.progress, Some(100));
}

#[tokio::test]
async fn test_refused_title_keeps_story() {
    let h = harness_with(FakeText::new().refusing("chapter title"), FakeImage::new(), &chapters(2), |b| b);
    let doc = ingest(&h).await.unwrap();

    assert_eq!(doc.failed_count(), 0);
    for chapter in &doc.chapters {
        assert_eq!(chapter.title, format!("Chapter {}", chapter.number));
        assert_eq!(chapter.simplified_text.as_deref(), Some(STORY));
        assert_eq!(chapter.state(), ChapterState::Illustrated);
        assert!(chapter.image.is_some());
    }
    assert_eq!(h.text.refused.load(Ordering::SeqCst), 2);

    let events = h.recorder.events();
    assert_eq!(events.last().unwrap().kind, EventKind::Complete);
    assert_eq!(events.last().unwrap().progress, Some(100));
}

#[tokio::test]
async fn test_image_failure_keeps_story() {
    let images = FakeImage::new();
    images.fail.store(true, Ordering::SeqCst);
    let h = harness_with(FakeText::new(), images, &chapters(2), |b| b.chapter_concurrency(1));
    let doc = ingest(&h).await.unwrap();

    for chapter in &doc.chapters {
        assert_eq!(chapter.failed_step(), Some(FailedStep::Illustrate));
        assert_eq!(chapter.simplified_text.as_deref(), Some(STORY));
        assert!(chapter.image.is_none());
    }
    // failures are not cached: the second chapter asks again
    assert_eq!(h.images.load.calls(), 2);
    assert_eq!(h.recorder.events().last().unwrap().kind, EventKind::Complete);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_once() {
    let h = harness(&chapters(4));
    ingest(&h).await.unwrap();

    let events = h.recorder.events();
    let percents: Vec<u8> = events.iter().filter_map(|e| e.progress).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(events.last().unwrap().is_terminal());

    let payload = events.last().unwrap().payload.clone().unwrap();
    let doc: Document = serde_json::from_value(payload).unwrap();
    assert_eq!(doc.chapters.len(), 4);
}

#[tokio::test]
async fn test_empty_document_reports_error() {
    let h = harness("  \n\t  ");
    let err = ingest(&h).await.unwrap_err();
    assert!(matches!(err, StorybookError::EmptyDocument));

    let events = h.recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Error);
    assert_eq!(h.text.load.calls(), 0);
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_gates_bound_concurrent_calls() {
    let text = FakeText {
        delay: Duration::from_millis(5),
        distinct_prompts: true,
        ..FakeText::new()
    };
    let images = FakeImage {
        delay: Duration::from_millis(5),
        ..FakeImage::new()
    };
    let h = harness_with(text, images, &chapters(6), |b| b.chapter_concurrency(6));
    let doc = ingest(&h).await.unwrap();

    assert_eq!(doc.failed_count(), 0);
    assert!(h.text.load.peak() <= 2, "text peak {}", h.text.load.peak());
    assert!(h.images.load.peak() <= 1, "image peak {}", h.images.load.peak());
    assert_eq!(h.images.load.calls(), 6);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_generation() {
    let images = FakeImage {
        delay: Duration::from_millis(20),
        ..FakeImage::new()
    };
    let h = harness_with(FakeText::new(), images, "", |b| b);

    let results = join_all((0..8).map(|_| h.storybook.generate_image("A kite over the hill"))).await;
    let first = results[0].clone().unwrap();
    assert!(results.iter().all(|r| r.as_ref().ok() == Some(&first)));
    assert_eq!(h.images.load.calls(), 1);

    let stats = h.storybook.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.coalesced + stats.hits, 7);
    assert_eq!(stats.entries, 1);
}

#[tokio::test]
async fn test_shutdown_cancels_calls() {
    let h = harness("");
    h.storybook.shutdown();

    let err = h.storybook.simplify_chapter(1, "raw").await.unwrap_err();
    assert_eq!(err.failure().map(|f| f.kind), Some(ServiceErrorKind::Cancelled));
    assert!(!err.is_exhausted());
    assert_eq!(h.text.load.calls(), 0);

    let err = h.storybook.generate_image("a prompt").await.unwrap_err();
    assert_eq!(err.failure().map(|f| f.kind), Some(ServiceErrorKind::Cancelled));
}

// ── Deferred illustration, re-drive, export ──────────────────────────────────

#[tokio::test]
async fn test_deferred_illustration_on_export() {
    let h = harness_with(FakeText::new(), FakeImage::new(), &chapters(2), |b| {
        b.illustrate_on_ingest(false)
    });
    let doc = ingest(&h).await.unwrap();
    assert!(doc.chapters.iter().all(|c| c.state() == ChapterState::Simplified));
    assert!(doc.chapters.iter().all(|c| c.image.is_none()));
    assert_eq!(h.images.load.calls(), 0);

    let ready = h.storybook.prepare_export(&doc).await;
    assert!(ready.chapters.iter().all(|c| c.image.is_some()));
    assert!(ready.chapters.iter().all(|c| c.state() == ChapterState::Illustrated));
    // the input document is left untouched
    assert!(doc.chapters.iter().all(|c| c.image.is_none()));
}

#[tokio::test]
async fn test_export_skips_placeholder_chapters() {
    let text = "Chapter 1: Tale\nA forbidden tale.\n";
    let h = harness_with(FakeText::new().refusing("forbidden"), FakeImage::new(), text, |b| {
        b.illustrate_on_ingest(false)
    });
    let doc = ingest(&h).await.unwrap();
    let ready = h.storybook.prepare_export(&doc).await;
    assert!(ready.chapters[0].image.is_none());
    assert_eq!(h.images.load.calls(), 0);
}

#[tokio::test]
async fn test_redrive_recovers_failed_chapters() {
    let text = "Chapter 1: Tale\nA forbidden tale.\nChapter 2: Joy\nA happy tale.\n";
    let images = FakeImage::new();
    images.fail.store(true, Ordering::SeqCst);
    let h = harness_with(FakeText::new().refusing("forbidden"), images, text, |b| b);

    let mut doc = ingest(&h).await.unwrap();
    assert_eq!(doc.chapter(1).unwrap().failed_step(), Some(FailedStep::Transform));
    assert_eq!(doc.chapter(2).unwrap().failed_step(), Some(FailedStep::Illustrate));

    h.text.stop_refusing();
    h.images.fail.store(false, Ordering::SeqCst);
    let reporter = ProgressReporter::silent();
    let still_failed = h.storybook.redrive_failed(&mut doc, &reporter).await.unwrap();

    assert_eq!(still_failed, 0);
    let first = doc.chapter(1).unwrap();
    assert_eq!(first.title, "The Sleepy Fox");
    assert_eq!(first.simplified_text.as_deref(), Some(STORY));
    assert_eq!(first.state(), ChapterState::Illustrated);
    assert_eq!(doc.chapter(2).unwrap().state(), ChapterState::Illustrated);
}

#[tokio::test]
async fn test_export_markdown_file() {
    let h = harness(&chapters(2));
    let doc = ingest(&h).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fox.md");
    export_to_file(&doc, &MarkdownAssembler::default(), &path).await.unwrap();

    let md = std::fs::read_to_string(&path).unwrap();
    assert!(md.starts_with("# The Fox\n"));
    assert!(md.contains("## Chapter 1: The Sleepy Fox"));
    assert!(md.contains("## Chapter 2: The Sleepy Fox"));
    assert_eq!(md.matches("data:image/png;base64,").count(), 2);
    assert!(md.contains(STORY));
}

// ── Inputs and streaming ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_ingest_input_titles_from_file_name() {
    let h = harness(&chapters(1));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Winter Tales.PDF");
    std::fs::write(&path, b"%PDF-1.4\n% fake body").unwrap();

    let doc = h
        .storybook
        .ingest_input(path.to_string_lossy(), None)
        .await
        .unwrap();
    assert_eq!(doc.title, "Winter Tales");

    let doc = h
        .storybook
        .ingest_input(path.to_string_lossy(), Some("Custom"))
        .await
        .unwrap();
    assert_eq!(doc.title, "Custom");
}

#[tokio::test]
async fn test_ingest_input_rejects_non_pdf() {
    let h = harness(&chapters(1));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.pdf");
    std::fs::write(&path, b"hello world").unwrap();

    let err = h.storybook.ingest_input(path.to_string_lossy(), None).await.unwrap_err();
    assert!(matches!(err, StorybookError::NotAPdf { .. }));
    assert_eq!(h.recorder.events().last().unwrap().kind, EventKind::Error);
}

#[tokio::test]
async fn test_stream_ends_with_document() {
    let h = harness(&chapters(2));
    let events: Vec<ProgressEvent> = h.storybook.ingest_stream(b"%PDF".to_vec(), "Streamed").collect().await;

    let last = events.last().unwrap();
    assert_eq!(last.kind, EventKind::Complete);
    let doc: Document = serde_json::from_value(last.payload.clone().unwrap()).unwrap();
    assert_eq!(doc.title, "Streamed");
    assert_eq!(doc.chapters.len(), 2);
    assert!(last.to_sse().starts_with("data: {\"kind\":\"complete\""));
}

#[tokio::test]
async fn test_input_stream_missing_file_is_one_error() {
    let h = harness(&chapters(1));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nowhere.pdf");

    let events: Vec<ProgressEvent> = h
        .storybook
        .ingest_input_stream(path.to_string_lossy(), None)
        .collect()
        .await;
    assert_eq!(events.len(), 1, "{events:?}");
    assert_eq!(events[0].kind, EventKind::Error);
    assert_eq!(h.text.load.calls(), 0);
}

#[tokio::test]
async fn test_input_stream_non_pdf_is_one_error() {
    let h = harness(&chapters(1));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, b"just some notes").unwrap();

    let events: Vec<ProgressEvent> = h
        .storybook
        .ingest_input_stream(path.to_string_lossy(), Some("Notes".into()))
        .collect()
        .await;
    assert_eq!(events.len(), 1, "{events:?}");
    assert_eq!(events[0].kind, EventKind::Error);
    assert_eq!(h.text.load.calls(), 0);
}

#[tokio::test]
async fn test_sse_frames_wrap_every_event() {
    let h = harness(&chapters(2));
    let frames: Vec<String> = sse_frames(h.storybook.ingest_stream(b"%PDF".to_vec(), "Framed"))
        .collect()
        .await;

    assert!(frames.len() > 1);
    for frame in &frames {
        assert!(frame.starts_with("data: "), "{frame:?}");
        assert!(frame.ends_with("\n\n"), "{frame:?}");
        assert_eq!(frame.matches('\n').count(), 2, "{frame:?}");
    }
    assert!(frames.last().unwrap().contains("\"kind\":\"complete\""));
}

#[tokio::test]
async fn test_dropped_stream_stops_work() {
    let text = FakeText {
        delay: Duration::from_millis(20),
        ..FakeText::new()
    };
    let h = harness_with(text, FakeImage::new(), &chapters(5), |b| {
        b.chapter_concurrency(1).illustrate_on_ingest(false)
    });

    let mut events = h.storybook.ingest_stream(b"%PDF".to_vec(), "Dropped");
    let first = events.next().await.unwrap();
    assert_eq!(first.kind, EventKind::Progress);
    drop(events);

    tokio::time::sleep(Duration::from_millis(300)).await;
    // five chapters would take ten text calls
    assert!(h.text.load.calls() <= 2, "calls {}", h.text.load.calls());
}

#[test]
fn test_blocking_entry_point() {
    let h = harness(&chapters(2));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bedtime.pdf");
    std::fs::write(&path, b"%PDF-1.4\n% fake body").unwrap();

    let doc = ingest_input_sync(&h.storybook, path.to_string_lossy(), None).unwrap();
    assert_eq!(doc.title, "bedtime");
    assert_eq!(doc.chapters.len(), 2);
}

#[test]
fn test_single_chapter_with_block_on() {
    let h = harness("");
    let out = tokio_test::block_on(h.storybook.simplify_chapter(3, "The owl hooted."));
    let out = out.unwrap();
    assert_eq!(out.title, "The Sleepy Fox");
    assert_eq!(out.simplified_text, STORY);
}
