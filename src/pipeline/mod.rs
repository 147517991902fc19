//! Pipeline stages for PDF-to-storybook ingestion.
//!
//! Each submodule implements one step; the [`Storybook`](crate::Storybook)
//! orchestrator wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ segment ──▶ transform ──▶ illustrate
//! (URL/path)  (pdfium)   (regex)     (LLM, text)   (LLM + image, cached)
//! ```
//!
//! 1. [`input`]   — load the user-supplied path or URL into memory
//! 2. [`extract`] — page text via pdfium; runs in `spawn_blocking`
//! 3. [`segment`] — split into chapter stubs by heading, falling back to
//!    fixed-size word chunks
//! 4. [`transform`] — child-friendly title and retelling per chapter
//! 5. [`illustrate`] — image prompt, then an image through [`cache`]
//!
//! Every remote call goes through [`retry`] and holds a [`gate`] slot while
//! in flight. Model replies are cleaned by [`postprocess`].

pub mod cache;
pub mod extract;
pub mod gate;
pub mod illustrate;
pub mod input;
pub mod postprocess;
pub mod retry;
pub mod segment;
pub mod transform;
