//! Input loading: read a user-supplied path or URL into memory.
//!
//! The extractor works on byte buffers, so both local files and downloads end
//! up as a [`LoadedDocument`]. The PDF magic bytes (`%PDF`) are checked here
//! so callers get a meaningful error instead of an extractor failure.

use crate::error::StorybookError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A document read into memory, ready for text extraction.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub bytes: Vec<u8>,
    /// File name as supplied by the path or URL, e.g. `"alice.pdf"`.
    pub name: String,
}

impl LoadedDocument {
    /// Storybook title derived from the file name: the name with a trailing
    /// `.pdf` (any case) removed.
    pub fn title(&self) -> String {
        title_from_name(&self.name)
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load `input` from disk, or download it when it is an HTTP(S) URL.
pub async fn load_document(input: &str, timeout_secs: u64) -> Result<LoadedDocument, StorybookError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else if input.trim().is_empty() {
        Err(StorybookError::InvalidInput {
            input: input.to_string(),
        })
    } else {
        load_local(Path::new(input)).await
    }
}

async fn load_local(path: &Path) -> Result<LoadedDocument, StorybookError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => StorybookError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => StorybookError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    check_magic(&bytes, &name)?;

    debug!("Loaded local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(LoadedDocument { bytes, name })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedDocument, StorybookError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| StorybookError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let failed = |e: reqwest::Error| {
        if e.is_timeout() {
            StorybookError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            StorybookError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(failed)?;
    if !response.status().is_success() {
        return Err(StorybookError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(failed)?.to_vec();
    let name = filename_from_url(url);
    check_magic(&bytes, &name)?;

    info!("Downloaded {} ({} bytes)", name, bytes.len());
    Ok(LoadedDocument { bytes, name })
}

fn check_magic(bytes: &[u8], name: &str) -> Result<(), StorybookError> {
    if bytes.len() >= 4 && &bytes[..4] != PDF_MAGIC {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(StorybookError::NotAPdf {
            name: name.to_string(),
            magic,
        });
    }
    Ok(())
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

fn title_from_name(name: &str) -> String {
    let stem = PathBuf::from(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = stem.to_ascii_lowercase();
    let title = match lower.strip_suffix(".pdf") {
        Some(rest) => &stem[..rest.len()],
        None => stem.as_str(),
    };
    if title.trim().is_empty() {
        "Storybook".to_string()
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn title_strips_pdf_suffix() {
        assert_eq!(title_from_name("alice.pdf"), "alice");
        assert_eq!(title_from_name("Peter Pan.PDF"), "Peter Pan");
        assert_eq!(title_from_name("notes.txt"), "notes.txt");
        assert_eq!(title_from_name(".pdf"), "Storybook");
    }

    #[test]
    fn url_filename() {
        assert_eq!(filename_from_url("https://x.org/books/alice.pdf"), "alice.pdf");
        assert_eq!(filename_from_url("https://x.org/download"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn local_pdf_loads() {
        let mut f = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        f.write_all(b"%PDF-1.7\n...").unwrap();
        let doc = load_document(f.path().to_str().unwrap(), 5).await.unwrap();
        assert!(doc.bytes.starts_with(b"%PDF"));
        assert!(doc.name.ends_with(".pdf"));
    }

    #[tokio::test]
    async fn non_pdf_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        let err = load_document(f.path().to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, StorybookError::NotAPdf { magic, .. } if &magic == b"hell"));
    }

    #[tokio::test]
    async fn missing_file() {
        let err = load_document("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, StorybookError::FileNotFound { .. }));
    }
}
