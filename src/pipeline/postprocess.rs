//! Post-processing: deterministic cleanup of generated text.
//!
//! Models add quotes around titles, preambles such as "Here is the story:",
//! and code fences around JSON despite the prompt asking otherwise. Each fix
//! is a [`Rule`]; a [`RuleSet`] applies its rules in order. The rule sets
//! for titles, simplified stories and image prompts are constants, so the
//! cleanup applied to each output kind can be read in one place and tested
//! on its own.

use once_cell::sync::Lazy;
use regex::Regex;

/// Preambles removed from the start of a simplified story.
///
/// Matched case-sensitively; only the first leading match is removed.
pub const STORY_PREFIXES: &[&str] = &[
    "Here is the story in simple English for children:",
    "Here is the simplified story:",
    "Simplified version:",
    "Here's the story:",
    "Here is the story:",
    "Story:",
];

/// Labels models sometimes put in front of a title.
pub const TITLE_PREFIXES: &[&str] = &["Title:", "Chapter Title:"];

/// Labels models sometimes put in front of an image prompt.
pub const IMAGE_PROMPT_PREFIXES: &[&str] = &["Image prompt:", "Image Prompt:", "Prompt:"];

/// Opening and closing quotation marks that may wrap a title.
const QUOTE_PAIRS: &[(char, char)] = &[
    ('"', '"'),
    ('\'', '\''),
    ('`', '`'),
    ('“', '”'),
    ('‘', '’'),
    ('«', '»'),
];

/// One cleanup step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Trim leading and trailing whitespace.
    Trim,
    /// Remove an outer ```` ``` ```` fence (with optional language tag).
    StripCodeFence,
    /// CRLF / CR → LF.
    NormaliseLineEndings,
    /// Remove matching quotation marks wrapping the whole text.
    StripSurroundingQuotes,
    /// Remove the first listed prefix the text starts with, once.
    StripLeadingPrefix(&'static [&'static str]),
    /// Keep only the first `n` whitespace-separated words.
    MaxWords(usize),
    /// Collapse runs of three or more newlines into one blank line.
    CollapseBlankLines,
    /// Replace every whitespace run with one space.
    CollapseWhitespace,
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\n(.*?)\n?```$").unwrap());

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

impl Rule {
    pub fn apply(self, input: &str) -> String {
        match self {
            Rule::Trim => input.trim().to_string(),
            Rule::StripCodeFence => match RE_OUTER_FENCE.captures(input.trim()) {
                Some(caps) => caps[1].to_string(),
                None => input.to_string(),
            },
            Rule::NormaliseLineEndings => input.replace("\r\n", "\n").replace('\r', "\n"),
            Rule::StripSurroundingQuotes => strip_quote_pairs(input).to_string(),
            Rule::StripLeadingPrefix(prefixes) => {
                let trimmed = input.trim_start();
                prefixes
                    .iter()
                    .find_map(|p| trimmed.strip_prefix(p))
                    .unwrap_or(input)
                    .to_string()
            }
            Rule::MaxWords(n) => {
                let words: Vec<&str> = input.split_whitespace().collect();
                if words.len() > n {
                    words[..n].join(" ")
                } else {
                    input.to_string()
                }
            }
            Rule::CollapseBlankLines => RE_BLANK_LINES.replace_all(input, "\n\n").into_owned(),
            Rule::CollapseWhitespace => input.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

/// Peel off quote pairs while the first and last characters match. A lone
/// apostrophe (`'Twas`, `Kids'`) is part of the title and stays.
fn strip_quote_pairs(mut text: &str) -> &str {
    loop {
        let mut chars = text.chars();
        let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
            return text;
        };
        if !QUOTE_PAIRS.contains(&(first, last)) {
            return text;
        }
        text = &text[first.len_utf8()..text.len() - last.len_utf8()];
    }
}

/// An ordered list of [`Rule`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleSet(pub &'static [Rule]);

impl RuleSet {
    pub fn apply(&self, input: &str) -> String {
        self.0
            .iter()
            .fold(input.to_string(), |text, rule| rule.apply(&text))
    }
}

/// Titles: at most three words, no quotes.
pub const TITLE_RULES: RuleSet = RuleSet(&[
    Rule::StripCodeFence,
    Rule::Trim,
    Rule::StripLeadingPrefix(TITLE_PREFIXES),
    Rule::Trim,
    Rule::StripSurroundingQuotes,
    Rule::Trim,
    Rule::CollapseWhitespace,
    Rule::MaxWords(3),
    Rule::StripSurroundingQuotes,
]);

/// Simplified stories: no preamble, tidy paragraphs.
pub const STORY_RULES: RuleSet = RuleSet(&[
    Rule::StripCodeFence,
    Rule::NormaliseLineEndings,
    Rule::Trim,
    Rule::StripLeadingPrefix(STORY_PREFIXES),
    Rule::Trim,
    Rule::CollapseBlankLines,
]);

/// Image prompts: a single line of plain text.
pub const IMAGE_PROMPT_RULES: RuleSet = RuleSet(&[
    Rule::StripCodeFence,
    Rule::Trim,
    Rule::StripLeadingPrefix(IMAGE_PROMPT_PREFIXES),
    Rule::Trim,
    Rule::StripSurroundingQuotes,
    Rule::CollapseWhitespace,
]);

/// JSON replies: just drop an outer fence.
pub const JSON_RULES: RuleSet = RuleSet(&[Rule::Trim, Rule::StripCodeFence, Rule::Trim]);

pub fn clean_title(raw: &str) -> String {
    TITLE_RULES.apply(raw)
}

pub fn clean_story(raw: &str) -> String {
    STORY_RULES.apply(raw)
}

pub fn clean_image_prompt(raw: &str) -> String {
    IMAGE_PROMPT_RULES.apply(raw)
}
