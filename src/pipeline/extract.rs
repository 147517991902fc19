//! Text extraction: `extract_text(bytes) -> plain text`.
//!
//! The pipeline treats extraction as a black box behind [`TextExtractor`].
//! [`PdfiumExtractor`] is the production implementation; it runs inside
//! `spawn_blocking` because pdfium is a blocking C++ library.

use crate::error::StorybookError;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Turns raw document bytes into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Fails with [`StorybookError::UnreadableDocument`] on corrupt input.
    async fn extract_text(&self, bytes: &[u8]) -> Result<String, StorybookError>;
}

/// pdfium-backed extractor: each page's text followed by a newline.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    password: Option<String>,
}

impl PdfiumExtractor {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }
}

#[async_trait]
impl TextExtractor for PdfiumExtractor {
    async fn extract_text(&self, bytes: &[u8]) -> Result<String, StorybookError> {
        let bytes = bytes.to_vec();
        let password = self.password.clone();
        tokio::task::spawn_blocking(move || extract_blocking(&bytes, password.as_deref()))
            .await
            .map_err(|e| StorybookError::Internal(format!("Extraction task panicked: {e}")))?
    }
}

/// Bind pdfium: `PDFIUM_DYNAMIC_LIB_PATH`, then the working directory, then
/// the system library search path.
fn bind_pdfium() -> Result<Pdfium, StorybookError> {
    let from_env = std::env::var("PDFIUM_DYNAMIC_LIB_PATH")
        .ok()
        .filter(|p| !p.is_empty())
        .map(|dir| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir)));

    let bindings = match from_env {
        Some(Ok(bindings)) => Ok(bindings),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| StorybookError::Internal(format!(
        "pdfium library could not be loaded ({e}). Set PDFIUM_DYNAMIC_LIB_PATH to the directory containing it."
    )))?;

    Ok(Pdfium::new(bindings))
}

fn extract_blocking(bytes: &[u8], password: Option<&str>) -> Result<String, StorybookError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| StorybookError::UnreadableDocument {
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut text = String::new();
    for (index, page) in pages.iter().enumerate() {
        let page_text = page
            .text()
            .map_err(|e| StorybookError::UnreadableDocument {
                detail: format!("page {}: {e:?}", index + 1),
            })?
            .all();
        debug!("Page {} → {} chars", index + 1, page_text.len());
        text.push_str(&page_text);
        text.push('\n');
    }
    Ok(text)
}
