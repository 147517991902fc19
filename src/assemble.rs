//! Document assembly: `render(Document) -> bytes`.
//!
//! Rendering is a pure function of a completed [`Document`]. Missing parts
//! are skipped rather than treated as errors: a chapter without an image
//! has no image region, one without simplified text has no body.
//!
//! [`export_to_file`] writes the rendered bytes atomically (temp file, then
//! rename) so an interrupted export never leaves a truncated file behind.

use crate::document::Document;
use crate::error::StorybookError;
use std::path::Path;
use tracing::info;

/// Renders a finished document to bytes.
pub trait Assembler: Send + Sync {
    fn render(&self, document: &Document) -> Result<Vec<u8>, StorybookError>;

    /// File extension for the rendered output, without the dot.
    fn extension(&self) -> &'static str;
}

/// Markdown storybook: title, then per chapter a heading, the illustration
/// (embedded as a data URI) and the story paragraphs.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownAssembler {
    pub embed_images: bool,
}

impl Default for MarkdownAssembler {
    fn default() -> Self {
        Self { embed_images: true }
    }
}

impl Assembler for MarkdownAssembler {
    fn render(&self, document: &Document) -> Result<Vec<u8>, StorybookError> {
        let mut out = String::new();
        out.push_str(&format!("# {}\n", document.title.trim()));

        for chapter in &document.chapters {
            out.push('\n');
            out.push_str(&format!("## {}\n", chapter_heading(chapter.number, &chapter.title)));

            if self.embed_images {
                if let Some(ref image) = chapter.image {
                    out.push_str(&format!("\n![{}]({})\n", alt_text(&chapter.title), image));
                }
            }

            if let Some(ref text) = chapter.simplified_text {
                for paragraph in paragraphs(text) {
                    out.push('\n');
                    out.push_str(&paragraph);
                    out.push('\n');
                }
            }
        }
        Ok(out.into_bytes())
    }

    fn extension(&self) -> &'static str {
        "md"
    }
}

/// The document as pretty-printed JSON, for callers that render elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAssembler;

impl Assembler for JsonAssembler {
    fn render(&self, document: &Document) -> Result<Vec<u8>, StorybookError> {
        serde_json::to_vec_pretty(document).map_err(|e| StorybookError::AssemblyFailed(e.to_string()))
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

fn chapter_heading(number: usize, title: &str) -> String {
    let title = title.trim();
    let plain = format!("Chapter {number}");
    if title.is_empty() || title == plain {
        plain
    } else {
        format!("{plain}: {title}")
    }
}

fn alt_text(title: &str) -> String {
    title.replace(['[', ']'], "")
}

/// Non-empty lines of `text`, one paragraph each.
fn paragraphs(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Render `document` with `assembler` and write it to `path` atomically.
pub async fn export_to_file(
    document: &Document,
    assembler: &dyn Assembler,
    path: impl AsRef<Path>,
) -> Result<(), StorybookError> {
    let path = path.as_ref();
    let bytes = assembler.render(document)?;

    let write_failed = |e: std::io::Error| StorybookError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension(format!("{}.tmp", assembler.extension()));
    tokio::fs::write(&tmp_path, &bytes).await.map_err(write_failed)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }

    info!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChapterStub;

    fn document() -> Document {
        let mut doc = Document::from_stubs(
            "The Fox",
            vec![
                ChapterStub {
                    number: 1,
                    title_hint: "Snowy Morning".into(),
                    text: "raw".into(),
                },
                ChapterStub {
                    number: 2,
                    title_hint: "Chapter 2".into(),
                    text: "raw".into(),
                },
            ],
        );
        doc.chapters[0].simplified_text = Some("The fox woke up.\n\nIt was cold.".into());
        doc.chapters[0].image = Some("data:image/png;base64,AAAA".into());
        doc
    }

    fn render(doc: &Document) -> String {
        String::from_utf8(MarkdownAssembler::default().render(doc).unwrap()).unwrap()
    }

    #[test]
    fn markdown_layout() {
        let md = render(&document());
        assert!(md.starts_with("# The Fox\n"));
        assert!(md.contains("## Chapter 1: Snowy Morning\n"));
        assert!(md.contains("![Snowy Morning](data:image/png;base64,AAAA)"));
        assert!(md.contains("\nThe fox woke up.\n\nIt was cold.\n"));
    }

    #[test]
    fn missing_regions_are_skipped() {
        let md = render(&document());
        let second = md.split("## Chapter 2\n").nth(1).unwrap();
        assert!(second.trim().is_empty(), "got {second:?}");
    }

    #[test]
    fn images_can_be_left_out() {
        let bytes = MarkdownAssembler { embed_images: false }
            .render(&document())
            .unwrap();
        assert!(!String::from_utf8(bytes).unwrap().contains("data:image"));
    }

    #[test]
    fn json_round_trips() {
        let doc = document();
        let bytes = JsonAssembler.render(&doc).unwrap();
        let back: Document = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, doc);
    }

    #[tokio::test]
    async fn export_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("book.md");
        export_to_file(&document(), &MarkdownAssembler::default(), &path)
            .await
            .unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# The Fox"));
        assert!(!path.with_extension("md.tmp").exists());
    }

    #[tokio::test]
    async fn failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.md");
        // A non-empty directory in the way makes the rename fail.
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep.txt"), "x").unwrap();

        let err = export_to_file(&document(), &MarkdownAssembler::default(), &path)
            .await
            .unwrap_err();
        assert!(matches!(err, StorybookError::OutputWriteFailed { .. }), "got {err:?}");
        assert!(!dir.path().join("book.md.tmp").exists());
        assert!(path.join("keep.txt").exists());
    }
}
