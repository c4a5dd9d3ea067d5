//! Citation extraction from report text
//!
//! A single pass over the report finds every citation-shaped token
//! (`[path:start-end]`) and attaches the sentence it belongs to (the claim)
//! and the paragraph around it (the context).
//!
//! Tokens whose line range is not numeric are still extracted, with
//! [`ExtractedCitation::malformed`] set, so the validator can report the
//! exact problem. Tokens inside fenced code blocks are examples, not
//! citations, and are skipped.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::citation::{parse_line_range, Citation};
use crate::types::ExtractedCitation;

/// Citation-shaped token: `[PATH:RANGE]` with no whitespace inside.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
pub(crate) static CITATION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]\s:]+):([^\[\]\s]+)\]").expect("valid regex"));

/// Inline code span.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
pub(crate) static CODE_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`\n]+`").expect("valid regex"));

/// Ordered list marker such as `1.` or `2)`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static ORDERED_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)]\s+").expect("valid regex"));

/// Extract every citation in `report`, in order of appearance.
pub fn extract_citations(report: &str) -> Vec<ExtractedCitation> {
    let fences = fenced_block_ranges(report);
    let paragraphs = paragraph_ranges(report);

    let mut extracted = Vec::new();
    for caps in CITATION_TOKEN.captures_iter(report) {
        let Some(token) = caps.get(0) else { continue };
        let path = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let range = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

        if !looks_like_path(path) {
            continue;
        }
        if fences.iter().any(|f| f.contains(&token.start())) {
            continue;
        }

        let (citation, malformed) = match parse_line_range(range) {
            Some((start, end)) => (
                Citation {
                    file_path: path.to_string(),
                    start_line: start,
                    end_line: end,
                },
                None,
            ),
            None => (
                Citation {
                    file_path: path.to_string(),
                    start_line: 0,
                    end_line: 0,
                },
                Some(format!("non-numeric line range '{range}'")),
            ),
        };

        let paragraph = paragraphs
            .iter()
            .find(|p| p.start <= token.start() && token.end() <= p.end)
            .cloned()
            .unwrap_or(0..report.len());
        let sentence_range = locate_sentence(report, paragraph.clone(), token.range());
        let claim_text = normalize_claim(&report[sentence_range.clone()]);

        extracted.push(ExtractedCitation {
            citation,
            raw: token.as_str().to_string(),
            malformed,
            claim_text,
            position: token.start(),
            sentence_range,
            context: report[paragraph].trim().to_string(),
        });
    }

    debug!(count = extracted.len(), "extracted citations");
    extracted
}

/// Strip citation tokens and list/heading markers from a sentence.
pub fn normalize_claim(sentence: &str) -> String {
    let without_tokens = CITATION_TOKEN.replace_all(sentence, "");
    let stripped = strip_block_marker(&without_tokens);
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .replace(" .", ".")
        .replace(" ,", ",")
        .replace(" !", "!")
        .replace(" ?", "?")
        .trim()
        .to_string()
}

pub(crate) fn looks_like_path(path: &str) -> bool {
    path.contains('/') || path.contains('.')
}

/// Byte ranges of blank-line separated paragraphs.
pub(crate) fn paragraph_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start: Option<usize> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if line.trim().is_empty() {
            if let Some(s) = start.take() {
                ranges.push(s..offset);
            }
        } else if start.is_none() {
            start = Some(offset);
        }
        offset += line.len();
    }
    if let Some(s) = start {
        ranges.push(s..text.len());
    }
    ranges
}

/// Byte ranges of fenced code blocks, fences included.
pub(crate) fn fenced_block_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut open: Option<usize> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with("```") {
            match open.take() {
                Some(start) => ranges.push(start..offset + line.len()),
                None => open = Some(offset),
            }
        }
        offset += line.len();
    }
    if let Some(start) = open {
        ranges.push(start..text.len());
    }
    ranges
}

/// Whether a trimmed line starts a new block inside a paragraph.
pub(crate) fn is_block_start(trimmed: &str) -> bool {
    trimmed.starts_with('#')
        || trimmed.starts_with('|')
        || trimmed.starts_with("- ")
        || trimmed.starts_with("* ")
        || trimmed.starts_with("+ ")
        || ORDERED_MARKER.is_match(trimmed)
}

pub(crate) fn strip_block_marker(text: &str) -> &str {
    let trimmed = text.trim_start();
    if trimmed.starts_with('#') {
        return trimmed.trim_start_matches('#').trim_start();
    }
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return rest.trim_start();
        }
    }
    if let Some(m) = ORDERED_MARKER.find(trimmed) {
        return &trimmed[m.end()..];
    }
    trimmed
}

/// Ranges (relative to `text`) where sentence terminators do not count.
fn masked_ranges(text: &str) -> Vec<Range<usize>> {
    CITATION_TOKEN
        .find_iter(text)
        .chain(CODE_SPAN.find_iter(text))
        .map(|m| m.range())
        .collect()
}

/// Sentence start offsets within a paragraph, `0` included.
///
/// A sentence ends after an unmasked `.`, `!` or `?` followed by whitespace,
/// and before any line that starts a list item, table row or heading.
pub(crate) fn sentence_boundaries(text: &str) -> Vec<usize> {
    let masked = masked_ranges(text);
    let is_masked = |i: usize| masked.iter().any(|r| r.contains(&i));

    let mut boundaries = vec![0usize];
    for (i, b) in text.bytes().enumerate() {
        if matches!(b, b'.' | b'!' | b'?') && !is_masked(i) {
            let next = text[i + 1..].chars().next();
            if next.map_or(true, char::is_whitespace) {
                boundaries.push(i + 1);
            }
        }
    }

    let mut offset = 0;
    let mut previous_was_heading = false;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if offset > 0 && (previous_was_heading || is_block_start(trimmed)) {
            boundaries.push(offset);
        }
        previous_was_heading = trimmed.starts_with('#');
        offset += line.len();
    }
    boundaries.sort_unstable();
    boundaries.dedup();
    boundaries
}

/// Find the claim sentence for a token within its paragraph.
///
/// Returns an absolute byte range, trimmed of whitespace and list markers,
/// that always covers the token itself.
fn locate_sentence(report: &str, paragraph: Range<usize>, token: Range<usize>) -> Range<usize> {
    let base = paragraph.start;
    let text = &report[paragraph];
    let boundaries = sentence_boundaries(text);

    let token_start = token.start - base;
    let token_end = token.end - base;

    let mut start = boundaries
        .iter()
        .copied()
        .filter(|&b| b <= token_start)
        .max()
        .unwrap_or(0);
    let mut end = boundaries
        .iter()
        .copied()
        .find(|&b| b > token_start)
        .unwrap_or(text.len())
        .max(token_end);

    // `Claim text. [a.rs:1-2]`: the citation trails its sentence.
    let prose = CITATION_TOKEN.replace_all(&text[start..token_start], "");
    if !prose.chars().any(char::is_alphanumeric) && start > 0 {
        if let Some(previous) = boundaries.iter().copied().filter(|&b| b < start).max() {
            start = previous;
            end = token_end;
        }
    }

    let sentence = &text[start..end];
    let lead = sentence.len() - strip_block_marker(sentence).len();
    let trail = sentence.len() - sentence.trim_end().len();
    let (start, end) = (start + lead, (end - trail).max(token_end));

    base + start.min(token_start)..base + end
}
