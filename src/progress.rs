//! Progress reporting for document ingestion.
//!
//! Every discrete pipeline step emits a [`ProgressEvent`]: extraction,
//! segmentation, and each chapter's title / simplify / illustrate step.
//! Events carry a monotonically non-decreasing percentage and end with
//! exactly one terminal event, `complete` or `error`.
//!
//! A [`ProgressReporter`] owns that contract. It can forward events to an
//! unbounded channel (the streaming API), to a [`ProgressObserver`]
//! callback (the eager API), or nowhere. Once a terminal event has been sent,
//! or the reporter has been aborted, further events are dropped.
//!
//! # Example
//!
//! ```rust
//! use edgequake_storybook::progress::{EventKind, ProgressReporter};
//!
//! let (reporter, mut rx) = ProgressReporter::channel();
//! reporter.milestone(10, "Text extracted");
//! reporter.plan_steps(2);
//! reporter.step("Chapter 1: title ready");
//! reporter.step("Chapter 1: story simplified");
//! reporter.complete(None);
//!
//! let mut last = 0;
//! while let Ok(ev) = rx.try_recv() {
//!     let pct = ev.progress.unwrap_or(last);
//!     assert!(pct >= last);
//!     last = pct;
//!     if ev.kind == EventKind::Complete {
//!         assert_eq!(pct, 100);
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// Percentage reported once text extraction finishes.
pub const EXTRACTED_PERCENT: u8 = 10;
/// Percentage reported once segmentation finishes.
pub const SEGMENTED_PERCENT: u8 = 20;
/// Upper bound of the per-chapter range; `complete` jumps to 100.
const CHAPTERS_END_PERCENT: u8 = 95;

/// Kind of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Progress,
    Complete,
    Error,
}

/// One message on the progress channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.kind != EventKind::Progress
    }

    /// Serialise as a single JSON line.
    pub fn to_json(&self) -> String {
        // A struct of strings, integers and a JSON value cannot fail to serialise.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }

    /// Serialise as a server-sent-events frame: `data: {...}\n\n`.
    pub fn to_sse(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

/// Receives progress events as they are emitted.
///
/// Chapters may be processed concurrently, so implementations must be
/// `Send + Sync` and protect their own mutable state.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Type stored in [`crate::config::StorybookConfig`].
pub type ProgressCallback = Arc<dyn ProgressObserver>;

enum Sink {
    Channel(mpsc::UnboundedSender<ProgressEvent>),
    Callback(ProgressCallback),
    Silent,
}

#[derive(Default)]
struct ReporterState {
    last_percent: u8,
    total_steps: usize,
    done_steps: usize,
    finished: bool,
}

/// Emits progress events for a single document.
pub struct ProgressReporter {
    sink: Sink,
    state: Mutex<ReporterState>,
    aborted: AtomicBool,
}

impl ProgressReporter {
    fn with_sink(sink: Sink) -> Self {
        Self {
            sink,
            state: Mutex::new(ReporterState::default()),
            aborted: AtomicBool::new(false),
        }
    }

    /// Reporter that forwards events to an unbounded channel.
    ///
    /// Dropping the receiver aborts the reporter.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_sink(Sink::Channel(tx)), rx)
    }

    pub fn with_callback(callback: ProgressCallback) -> Self {
        Self::with_sink(Sink::Callback(callback))
    }

    pub fn silent() -> Self {
        Self::with_sink(Sink::Silent)
    }

    /// Stop emitting and tell the pipeline to skip remaining work.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// `true` once a terminal event was sent or the reporter was aborted.
    pub fn is_finished(&self) -> bool {
        self.is_aborted() || self.lock().finished
    }

    /// Declare how many chapter steps the rest of the run will report.
    ///
    /// May be called again (e.g. when re-driving failed chapters); the
    /// step counter restarts but the percentage never goes backwards.
    pub fn plan_steps(&self, total: usize) {
        let mut state = self.lock();
        state.total_steps = total;
        state.done_steps = 0;
    }

    /// Report a fixed milestone such as "text extracted".
    pub fn milestone(&self, percent: u8, message: impl Into<String>) -> bool {
        self.emit(EventKind::Progress, Some(message.into()), |_| percent, None)
    }

    /// Report one completed chapter step.
    pub fn step(&self, message: impl Into<String>) -> bool {
        self.advance(1, message)
    }

    /// Report `steps` chapter steps as done at once (skipped or failed).
    pub fn advance(&self, steps: usize, message: impl Into<String>) -> bool {
        self.emit(
            EventKind::Progress,
            Some(message.into()),
            |state| {
                state.done_steps = (state.done_steps + steps).min(state.total_steps);
                chapter_percent(state.done_steps, state.total_steps)
            },
            None,
        )
    }

    /// Terminal success event, optionally carrying the finished document.
    pub fn complete(&self, payload: Option<serde_json::Value>) -> bool {
        self.emit(
            EventKind::Complete,
            Some("Storybook complete".to_string()),
            |_| 100,
            payload,
        )
    }

    /// Terminal failure event for document-fatal conditions.
    pub fn error(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        let mut state = self.lock();
        if state.finished || self.is_aborted() {
            return false;
        }
        state.finished = true;
        let event = ProgressEvent {
            kind: EventKind::Error,
            message: Some(message),
            progress: None,
            payload: None,
        };
        self.send(event)
    }

    fn emit(
        &self,
        kind: EventKind,
        message: Option<String>,
        percent: impl FnOnce(&mut ReporterState) -> u8,
        payload: Option<serde_json::Value>,
    ) -> bool {
        let mut state = self.lock();
        if state.finished || self.is_aborted() {
            return false;
        }
        let pct = percent(&mut *state).max(state.last_percent).min(100);
        state.last_percent = pct;
        if kind != EventKind::Progress {
            state.finished = true;
        }
        let event = ProgressEvent {
            kind,
            message,
            progress: Some(pct),
            payload,
        };
        // Sent while holding the lock so observers see percentages in order.
        self.send(event)
    }

    fn send(&self, event: ProgressEvent) -> bool {
        debug!(kind = ?event.kind, progress = ?event.progress, "progress: {}", event.message.as_deref().unwrap_or(""));
        match &self.sink {
            Sink::Channel(tx) => {
                if tx.send(event).is_err() {
                    debug!("progress receiver dropped; aborting document");
                    self.abort();
                    return false;
                }
                true
            }
            Sink::Callback(cb) => {
                cb.on_event(&event);
                true
            }
            Sink::Silent => true,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn chapter_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return CHAPTERS_END_PERCENT;
    }
    let span = (CHAPTERS_END_PERCENT - SEGMENTED_PERCENT) as usize;
    SEGMENTED_PERCENT + (span * done / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn percentages_never_decrease() {
        let (r, mut rx) = ProgressReporter::channel();
        r.milestone(EXTRACTED_PERCENT, "extracted");
        r.milestone(SEGMENTED_PERCENT, "segmented");
        r.plan_steps(4);
        r.step("a");
        r.milestone(5, "late milestone");
        r.advance(3, "rest");
        r.complete(None);

        let events = drain(&mut rx);
        let pcts: Vec<u8> = events.iter().filter_map(|e| e.progress).collect();
        assert!(pcts.windows(2).all(|w| w[0] <= w[1]), "{pcts:?}");
        assert_eq!(*pcts.last().unwrap(), 100);
        assert_eq!(events.last().unwrap().kind, EventKind::Complete);
    }

    #[test]
    fn nothing_after_terminal_event() {
        let (r, mut rx) = ProgressReporter::channel();
        r.error("unreadable");
        assert!(!r.step("ignored"));
        assert!(!r.complete(None));
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Error);
        assert!(r.is_finished());
    }

    #[test]
    fn dropped_receiver_aborts() {
        let (r, rx) = ProgressReporter::channel();
        drop(rx);
        assert!(!r.milestone(10, "x"));
        assert!(r.is_aborted());
    }

    #[test]
    fn abort_silences_reporter() {
        let (r, mut rx) = ProgressReporter::channel();
        r.abort();
        r.step("x");
        r.complete(None);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn callback_receives_events() {
        struct Counting(AtomicUsize);
        impl ProgressObserver for Counting {
            fn on_event(&self, _event: &ProgressEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let cb = Arc::new(Counting(AtomicUsize::new(0)));
        let r = ProgressReporter::with_callback(cb.clone());
        r.milestone(10, "a");
        r.complete(None);
        assert_eq!(cb.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn json_shape() {
        let ev = ProgressEvent {
            kind: EventKind::Progress,
            message: Some("hi".into()),
            progress: Some(42),
            payload: None,
        };
        assert_eq!(ev.to_json(), r#"{"kind":"progress","message":"hi","progress":42}"#);
        assert!(ev.to_sse().starts_with("data: {"));
        assert!(ev.to_sse().ends_with("\n\n"));
    }

    #[test]
    fn chapter_range() {
        assert_eq!(chapter_percent(0, 4), SEGMENTED_PERCENT);
        assert_eq!(chapter_percent(4, 4), CHAPTERS_END_PERCENT);
        assert_eq!(chapter_percent(0, 0), CHAPTERS_END_PERCENT);
    }
}
