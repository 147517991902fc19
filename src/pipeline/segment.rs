//! Segmentation: raw extracted text → ordered chapter stubs.
//!
//! A pure function. Chapter markers (`Chapter 3`, `CHAPTER IV: The Storm`,
//! `Ch. 2 - Home`) are searched at line starts; the span from one marker to
//! the next is that chapter's content. Text before the first marker is
//! front matter and is dropped.
//!
//! When the document carries no marker at all, it is cut into fixed-size
//! word chunks titled `Part {n}`. Either way the output is capped at
//! [`SegmentLimits::max_chapters`]; the excess is dropped.

use crate::config::StorybookConfig;
use crate::document::ChapterStub;
use once_cell::sync::Lazy;
use regex::Regex;

/// Appended to a chapter body cut at [`SegmentLimits::max_chapter_chars`].
pub const TRUNCATION_MARKER: &str = "...";

/// Numeric thresholds used by [`segment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLimits {
    pub max_chapters: usize,
    pub max_chapter_chars: usize,
    pub title_line_max_chars: usize,
    pub fallback_chunk_words: usize,
}

impl Default for SegmentLimits {
    fn default() -> Self {
        Self::from(&StorybookConfig::default())
    }
}

impl From<&StorybookConfig> for SegmentLimits {
    fn from(c: &StorybookConfig) -> Self {
        Self {
            max_chapters: c.max_chapters,
            max_chapter_chars: c.max_chapter_chars,
            title_line_max_chars: c.title_line_max_chars,
            fallback_chunk_words: c.fallback_chunk_words,
        }
    }
}

// Keyword, numeral (arabic or roman), then an optional inline title set off
// by punctuation or plain whitespace.
static RE_CHAPTER_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:chapter|ch\.)[ \t]*(?:\d+|[ivxlc]+)\b[ \t]*(?:[:.\-–—][ \t]*)?(?P<title>[^\r\n]*)",
    )
    .unwrap()
});

/// Split `text` into at most `limits.max_chapters` chapter stubs.
///
/// Deterministic: identical input yields identical output.
pub fn segment(text: &str, limits: &SegmentLimits) -> Vec<ChapterStub> {
    let markers: Vec<_> = RE_CHAPTER_MARKER.captures_iter(text).collect();
    if markers.is_empty() {
        return chunk_by_words(text, limits);
    }

    let mut stubs = Vec::with_capacity(markers.len().min(limits.max_chapters));
    for (i, caps) in markers.iter().enumerate().take(limits.max_chapters) {
        let number = i + 1;
        let (Some(whole), Some(inline)) = (caps.get(0), caps.name("title")) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        let content = text[whole.end()..end].trim();

        let inline_title = inline.as_str().trim();
        let (title, body) = if inline_title.is_empty() {
            split_title_line(content, limits.title_line_max_chars)
        } else if inline_title.chars().count() < limits.title_line_max_chars {
            (inline_title.to_string(), content)
        } else {
            // Prose running on from the marker line belongs to the body.
            (String::new(), text[inline.start()..end].trim())
        };

        stubs.push(ChapterStub {
            number,
            title_hint: if title.is_empty() {
                format!("Chapter {number}")
            } else {
                title
            },
            text: truncate_chars(body, limits.max_chapter_chars),
        });
    }
    stubs
}

/// First line becomes the title when short enough; it is then removed from
/// the body.
fn split_title_line(content: &str, max_chars: usize) -> (String, &str) {
    let (first, rest) = match content.split_once('\n') {
        Some((first, rest)) => (first.trim(), rest.trim()),
        None => (content.trim(), ""),
    };
    if !first.is_empty() && first.chars().count() < max_chars {
        (first.to_string(), rest)
    } else {
        (String::new(), content)
    }
}

fn chunk_by_words(text: &str, limits: &SegmentLimits) -> Vec<ChapterStub> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(limits.fallback_chunk_words.max(1))
        .take(limits.max_chapters)
        .enumerate()
        .map(|(i, chunk)| ChapterStub {
            number: i + 1,
            title_hint: format!("Part {}", i + 1),
            text: chunk.join(" "),
        })
        .collect()
}

/// Cut `text` to `max_chars` characters plus [`TRUNCATION_MARKER`].
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &text[..byte_idx]),
        None => text.to_string(),
    }
}
