//! Document model: the storybook under construction.
//!
//! A [`Document`] owns its [`Chapter`]s outright. Chapters start life as
//! [`ChapterStub`]s produced by the segmenter and advance through the
//! [`ChapterState`] machine as the Transformer and Illustrator fill them in:
//!
//! ```text
//! Extracted ─▶ Simplifying ─▶ Simplified ─▶ IllustrationRequested ─▶ Illustrated
//!                   │                               │
//!                   └──────────▶ Failed ◀───────────┘
//! ```
//!
//! `Failed` may be re-entered at the step that failed (see
//! [`Chapter::failed_step`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Placeholder body used when simplification fails during bulk ingestion.
pub const PLACEHOLDER_TEXT: &str = "Once upon a time, there was a wonderful story...";

/// Raw, unprocessed chapter produced by the segmenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterStub {
    /// 1-based position in the document.
    pub number: usize,
    /// Title found in the source, or `"Chapter {n}"` / `"Part {n}"`.
    pub title_hint: String,
    /// Bounded-length body text.
    pub text: String,
}

/// Lifecycle of a chapter within one pass of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterState {
    #[default]
    Extracted,
    Simplifying,
    Simplified,
    IllustrationRequested,
    Illustrated,
    Failed,
}

impl ChapterState {
    /// `true` for states that end an attempt.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Illustrated | Self::Failed)
    }

    /// Whether the state machine permits `self → next`.
    pub fn can_transition_to(self, next: ChapterState) -> bool {
        use ChapterState::*;
        matches!(
            (self, next),
            (Extracted, Simplifying)
                | (Simplifying, Simplified)
                | (Simplifying, Failed)
                | (Simplified, IllustrationRequested)
                | (IllustrationRequested, Illustrated)
                | (IllustrationRequested, Failed)
                // re-drive
                | (Failed, Simplifying)
                | (Failed, IllustrationRequested)
                // re-illustrate on demand
                | (Illustrated, IllustrationRequested)
        )
    }
}

impl fmt::Display for ChapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Extracted => "extracted",
            Self::Simplifying => "simplifying",
            Self::Simplified => "simplified",
            Self::IllustrationRequested => "illustration requested",
            Self::Illustrated => "illustrated",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("chapter {chapter}: illegal transition {from} → {to}")]
pub struct InvalidTransition {
    pub chapter: usize,
    pub from: ChapterState,
    pub to: ChapterState,
}

/// Pipeline step a chapter failed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStep {
    Transform,
    Illustrate,
}

/// Why a chapter ended up `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterFailure {
    pub step: FailedStep,
    pub message: String,
}

/// One chapter of the storybook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub number: usize,
    pub title: String,
    pub raw_text: String,
    pub simplified_text: Option<String>,
    pub image_prompt: Option<String>,
    /// Image as a `data:<mime>;base64,...` URI.
    pub image: Option<String>,
    state: ChapterState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ChapterFailure>,
}

impl Chapter {
    pub fn from_stub(stub: ChapterStub) -> Self {
        Self {
            number: stub.number,
            title: stub.title_hint,
            raw_text: stub.text,
            simplified_text: None,
            image_prompt: None,
            image: None,
            state: ChapterState::Extracted,
            failure: None,
        }
    }

    pub fn state(&self) -> ChapterState {
        self.state
    }

    /// Advance the state machine, rejecting illegal moves.
    pub fn transition(&mut self, next: ChapterState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                chapter: self.number,
                from: self.state,
                to: next,
            });
        }
        if next != ChapterState::Failed {
            self.failure = None;
        }
        self.state = next;
        Ok(())
    }

    /// Move to `Failed`, recording where and why.
    pub fn fail(&mut self, step: FailedStep, message: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(ChapterState::Failed)?;
        self.failure = Some(ChapterFailure {
            step,
            message: message.into(),
        });
        Ok(())
    }

    /// Step a `Failed` chapter should be re-entered at, if any.
    pub fn failed_step(&self) -> Option<FailedStep> {
        match self.state {
            ChapterState::Failed => self.failure.as_ref().map(|f| f.step),
            _ => None,
        }
    }
}

/// A storybook: a title plus ordered chapters numbered 1, 2, 3, …
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub chapters: Vec<Chapter>,
}

impl Document {
    /// Build a document from segmenter output, renumbering stubs so the
    /// numbering invariant holds regardless of input.
    pub fn from_stubs(title: impl Into<String>, stubs: Vec<ChapterStub>) -> Self {
        let chapters = stubs
            .into_iter()
            .enumerate()
            .map(|(i, mut stub)| {
                stub.number = i + 1;
                Chapter::from_stub(stub)
            })
            .collect();
        Self {
            title: title.into(),
            chapters,
        }
    }

    /// Chapter numbers are unique, 1-based and consecutive in order.
    pub fn numbering_is_valid(&self) -> bool {
        self.chapters
            .iter()
            .enumerate()
            .all(|(i, c)| c.number == i + 1)
    }

    pub fn chapter(&self, number: usize) -> Option<&Chapter> {
        number.checked_sub(1).and_then(|i| self.chapters.get(i))
    }

    pub fn failed_count(&self) -> usize {
        self.chapters
            .iter()
            .filter(|c| c.state() == ChapterState::Failed)
            .count()
    }
}
