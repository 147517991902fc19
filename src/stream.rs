//! Streaming ingestion API: progress events as a `Stream`.
//!
//! [`Storybook::ingest`] reports through a callback and returns when the
//! whole document is done. The streaming variants here run ingestion on a
//! spawned task and hand back the [`ProgressEvent`]s as they are emitted,
//! ending with exactly one `complete` (carrying the document as JSON) or
//! `error` event. This is the shape an HTTP layer needs to relay progress
//! over a persistent connection; [`sse_frames`] formats each event as a
//! server-sent-events frame.
//!
//! Dropping the stream aborts the document: no more events are produced
//! and chapters that have not started are skipped.
//!
//! These functions spawn onto the current Tokio runtime and must be called
//! from within one.

use crate::pipeline::input;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::storybook::Storybook;
use futures::stream::StreamExt;
use std::pin::Pin;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info};

/// A boxed stream of progress events.
pub type EventStream = Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>;

impl Storybook {
    /// Ingest a document held in memory, streaming progress events.
    ///
    /// # Example
    /// ```rust,no_run
    /// use edgequake_storybook::{EventKind, Storybook, StorybookConfig};
    /// use futures::StreamExt;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let storybook = Storybook::new(StorybookConfig::default())?;
    /// let bytes = std::fs::read("novel.pdf")?;
    /// let mut events = storybook.ingest_stream(bytes, "Novel");
    /// while let Some(event) = events.next().await {
    ///     println!("{}", event.to_json());
    ///     if event.kind == EventKind::Error {
    ///         break;
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn ingest_stream(&self, bytes: Vec<u8>, title: impl Into<String>) -> EventStream {
        let title = title.into();
        let storybook = self.clone();
        spawn_ingestion(move |reporter| async move {
            info!("Streaming ingestion of '{}' started", title);
            let outcome = storybook.ingest(&bytes, &title, &reporter).await;
            debug!("Streaming ingestion of '{}' finished: ok={}", title, outcome.is_ok());
        })
    }

    /// Load a path or URL, then ingest it, streaming progress events.
    ///
    /// Load failures arrive as a single `error` event.
    pub fn ingest_input_stream(&self, input_str: impl Into<String>, title: Option<String>) -> EventStream {
        let input_str = input_str.into();
        let storybook = self.clone();
        spawn_ingestion(move |reporter| async move {
            let timeout = storybook.config().download_timeout_secs;
            match input::load_document(&input_str, timeout).await {
                Ok(loaded) => {
                    let title = title.unwrap_or_else(|| loaded.title());
                    let _ = storybook.ingest(&loaded.bytes, &title, &reporter).await;
                }
                Err(e) => {
                    reporter.error(e.to_string());
                }
            }
        })
    }
}

fn spawn_ingestion<F, Fut>(run: F) -> EventStream
where
    F: FnOnce(ProgressReporter) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (reporter, rx) = ProgressReporter::channel();
    tokio::spawn(run(reporter));
    Box::pin(UnboundedReceiverStream::new(rx))
}

/// Format each event as `data: {...}\n\n`.
pub fn sse_frames(events: EventStream) -> Pin<Box<dyn Stream<Item = String> + Send>> {
    Box::pin(events.map(|event| event.to_sse()))
}
