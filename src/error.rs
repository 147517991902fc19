//! Error types for the edgequake-storybook library.
//!
//! Two layers of failure exist and they are kept apart:
//!
//! * [`StorybookError`] — **Fatal**: the document cannot be processed at all
//!   (unreadable PDF, no extractable text, provider not configured). Returned
//!   as `Err(StorybookError)` from the ingestion entry points and reported as
//!   an `error` progress event.
//!
//! * [`TransformationError`] / [`IllustrationError`] — **Per chapter**: one
//!   remote call failed for good. Bulk ingestion turns these into a degraded
//!   placeholder chapter; the on-demand entry points hand them to the caller.
//!
//! Both per-chapter errors wrap a [`StepFailure`], which records how the
//! [`crate::pipeline::retry`] executor gave up: immediately on a fatal
//! service error, or after the retry budget ran out.

use crate::document::InvalidTransition;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-storybook library.
#[derive(Debug, Error)]
pub enum StorybookError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes are not a PDF.
    #[error("Input is not a valid PDF: '{name}'\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: [u8; 4] },

    // ── Document errors ───────────────────────────────────────────────────
    /// Text extraction failed on corrupt or encrypted input.
    #[error("Document could not be read: {detail}")]
    UnreadableDocument { detail: String },

    /// Extraction succeeded but produced no text (e.g. a scanned PDF).
    #[error("Document contains no extractable text")]
    EmptyDocument,

    // ── Provider errors ───────────────────────────────────────────────────
    /// A generative provider could not be constructed.
    #[error("Provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The progress receiver went away before ingestion finished.
    #[error("Ingestion aborted before completion")]
    Aborted,

    // ── Output errors ─────────────────────────────────────────────────────
    /// The assembler could not render the document.
    #[error("Failed to assemble document: {0}")]
    AssemblyFailed(String),

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Classification of a failed remote-service call.
///
/// The first four kinds are transient and eligible for backoff-and-retry;
/// the rest are surfaced on the first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    /// The service is overloaded or rate-limiting (HTTP 429/503).
    Overloaded,
    /// The service is temporarily unavailable (HTTP 5xx).
    Unavailable,
    /// Connection reset, DNS failure or other transport error.
    Network,
    /// The call did not finish in time.
    Timeout,
    /// The request itself is malformed (HTTP 400) or otherwise unusable.
    InvalidRequest,
    /// Credentials missing or rejected (HTTP 401/403).
    Auth,
    /// The content was refused by the service's safety policy.
    PolicyRejected,
    /// The local gate was shut down while the call waited.
    Cancelled,
}

impl ServiceErrorKind {
    /// `true` for transient failures worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Overloaded | Self::Unavailable | Self::Network | Self::Timeout
        )
    }

    /// Map an HTTP status code to an error kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            408 => Self::Timeout,
            429 | 503 => Self::Overloaded,
            500..=599 => Self::Unavailable,
            _ => Self::InvalidRequest,
        }
    }

    /// Classify free-form provider error text.
    ///
    /// Fatal markers are checked first so that e.g. "403 ... connection"
    /// stays an auth failure. Status codes only count as whole numbers, so
    /// "port 4013" or "id 15000" match nothing. Text matching nothing is
    /// treated as an invalid request and will not be retried.
    pub fn classify(message: &str) -> Self {
        let m = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| m.contains(n));

        if RE_AUTH_STATUS.is_match(&m)
            || has(&["unauthori", "forbidden", "api key", "api_key", "permission denied"])
        {
            Self::Auth
        } else if has(&["safety", "policy", "content_filter", "blocked", "prohibited"]) {
            Self::PolicyRejected
        } else if RE_OVERLOADED_STATUS.is_match(&m)
            || has(&["overloaded", "rate limit", "resource_exhausted", "too many requests"])
        {
            Self::Overloaded
        } else if has(&["timeout", "timed out", "deadline"]) {
            Self::Timeout
        } else if RE_SERVER_STATUS.is_match(&m)
            || has(&["unavailable", "internal server error", "bad gateway"])
        {
            Self::Unavailable
        } else if RE_SOCKET_ABORTED.is_match(&m)
            || has(&["connection", "reset", "dns", "getaddrinfo", "network", "broken pipe"])
        {
            Self::Network
        } else {
            Self::InvalidRequest
        }
    }
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Overloaded => "overloaded",
            Self::Unavailable => "unavailable",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::InvalidRequest => "invalid request",
            Self::Auth => "auth",
            Self::PolicyRejected => "policy rejected",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

static RE_AUTH_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:401|403)\b").unwrap());
static RE_OVERLOADED_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:429|503)\b").unwrap());
static RE_SERVER_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:500|502|504)\b").unwrap());
/// Windows WSAECONNABORTED.
static RE_SOCKET_ABORTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b10053\b").unwrap());

/// A single failed call to a remote generative service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error whose kind is inferred from the message text.
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ServiceErrorKind::classify(&message),
            message,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// How a retried remote call finally failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Kind of the last error observed.
    pub kind: ServiceErrorKind,
    /// Number of times the operation was invoked.
    pub attempts: u32,
    /// `true` when the retry budget ran out on a retryable error,
    /// `false` when a fatal error stopped the executor early.
    pub exhausted: bool,
    /// Message of the last error.
    pub detail: String,
}

impl StepFailure {
    /// A fatal failure observed on the given attempt.
    pub fn fatal(error: ServiceError, attempts: u32) -> Self {
        Self {
            kind: error.kind,
            attempts,
            exhausted: false,
            detail: error.message,
        }
    }

    /// Retries ran out; `error` is the last one seen.
    pub fn exhausted(error: ServiceError, attempts: u32) -> Self {
        Self {
            kind: error.kind,
            attempts,
            exhausted: true,
            detail: error.message,
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exhausted {
            write!(
                f,
                "exhausted retries after {} attempts ({}: {})",
                self.attempts, self.kind, self.detail
            )
        } else {
            write!(f, "fatal service error ({}: {})", self.kind, self.detail)
        }
    }
}

/// The Transformer could not produce a title or a simplified text.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformationError {
    #[error("title generation failed: {0}")]
    Title(StepFailure),

    #[error("simplification failed: {0}")]
    Simplify(StepFailure),

    /// The chapter is in a state that cannot be transformed.
    #[error(transparent)]
    State(#[from] InvalidTransition),
}

impl TransformationError {
    pub fn failure(&self) -> Option<&StepFailure> {
        match self {
            Self::Title(f) | Self::Simplify(f) => Some(f),
            Self::State(_) => None,
        }
    }

    /// `true` when retries ran out, `false` for a fatal service error.
    pub fn is_exhausted(&self) -> bool {
        self.failure().is_some_and(|f| f.exhausted)
    }
}

/// The Illustrator could not derive a prompt or render an image.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum IllustrationError {
    #[error("image prompt derivation failed: {0}")]
    Prompt(StepFailure),

    #[error("image generation failed: {0}")]
    Image(StepFailure),

    /// Nothing to illustrate: the chapter has no simplified text yet.
    #[error("chapter {0} has no simplified text to illustrate")]
    MissingText(usize),

    #[error(transparent)]
    State(#[from] InvalidTransition),
}

impl IllustrationError {
    pub fn failure(&self) -> Option<&StepFailure> {
        match self {
            Self::Prompt(f) | Self::Image(f) => Some(f),
            Self::MissingText(_) | Self::State(_) => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.failure().is_some_and(|f| f.exhausted)
    }
}
