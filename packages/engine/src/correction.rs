//! Deterministic correction strategies and report rewriting
//!
//! Each strategy turns a [`FailedCitation`] into a [`CitationCorrection`]:
//! - [`find_reference`] searches the cache for the lines the claim describes
//! - [`expand_range`] widens a citation by a fixed margin
//! - [`remove_citation`] drops the token and leaves the claim uncited
//! - [`rewrite_claim`] records claim text produced elsewhere (the judge)
//!
//! [`apply_corrections`] then edits the report. Strategies never mutate
//! anything; the caller owns the working copy of the report.

use std::cmp::Reverse;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tracing::{debug, info};

use crate::aggregator::FailedCitation;
use crate::cache::{CachedFile, FileCache};
use crate::citation::Citation;
use crate::config::SUPPORT_THRESHOLD;
use crate::extractor::CITATION_TOKEN;
use crate::terms::{claim_terms, CodeTerms};

/// What a correction did.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CorrectionAction {
    FixedReference,
    RewroteClaim,
    RemovedCitation,
    ExpandedRange,
    NoChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationCorrection {
    pub failed: FailedCitation,
    pub action_taken: CorrectionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_citation: Option<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_claim_text: Option<String>,
    pub correction_reasoning: String,
}

impl CitationCorrection {
    pub fn no_change(failed: &FailedCitation, reasoning: impl Into<String>) -> Self {
        Self {
            failed: failed.clone(),
            action_taken: CorrectionAction::NoChange,
            new_citation: None,
            new_claim_text: None,
            correction_reasoning: reasoning.into(),
        }
    }

    pub fn is_change(&self) -> bool {
        self.action_taken != CorrectionAction::NoChange
    }
}

/// Outcome of a whole correction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionResult {
    pub corrections: Vec<CitationCorrection>,
    pub remaining_failures: Vec<FailedCitation>,
    pub iterations: u32,
}

/// A report after corrections were applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCorrections {
    pub report: String,
    pub applied: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy)]
struct Window<'a> {
    path: &'a str,
    start: u32,
    end: u32,
    matched: usize,
}

/// Re-point a citation at the lines that best match its claim.
///
/// Windows of the original span length slide over every cached text file.
/// A new citation is proposed only for a unique confident match:
/// - the best window must score at least [`SUPPORT_THRESHOLD`]
/// - ties between files resolve only toward the originally cited file
/// - ties within a file resolve to the window nearest the original start
///
/// Anything else is [`CorrectionAction::NoChange`].
pub fn find_reference(failed: &FailedCitation, cache: &dyn FileCache) -> CitationCorrection {
    let original = failed.citation();
    let terms = claim_terms(&failed.extracted.claim_text);
    if terms.is_empty() {
        return CitationCorrection::no_change(failed, "claim has no searchable terms");
    }
    let span = original.line_span().max(1);

    let mut best: Vec<Window<'_>> = Vec::new();
    for path in cache.paths() {
        let Some(file) = cache.get(path) else {
            continue;
        };
        if file.is_binary || file.line_count == 0 {
            continue;
        }
        for window in scan_file(path, file, &terms, span.min(file.line_count)) {
            let score = window.matched as f64 / terms.len() as f64;
            if score < SUPPORT_THRESHOLD {
                continue;
            }
            match best.first().map(|w| w.matched) {
                Some(top) if window.matched < top => {}
                Some(top) if window.matched == top => best.push(window),
                _ => best = vec![window],
            }
        }
    }

    let Some(top) = best.first().map(|w| w.matched) else {
        return CitationCorrection::no_change(failed, "no confident match in the file cache");
    };

    let mut files: Vec<&str> = best.iter().map(|w| w.path).collect();
    files.dedup();
    let chosen = match files.as_slice() {
        [only] => *only,
        many if many.contains(&original.file_path.as_str()) => original.file_path.as_str(),
        many => {
            return CitationCorrection::no_change(
                failed,
                format!("ambiguous: {} files match equally well", many.len()),
            );
        }
    };

    let in_file: Vec<&Window<'_>> = best.iter().filter(|w| w.path == chosen).collect();
    let nearest = in_file
        .iter()
        .map(|w| w.start.abs_diff(original.start_line))
        .min()
        .unwrap_or_default();
    let closest: Vec<&&Window<'_>> = in_file
        .iter()
        .filter(|w| w.start.abs_diff(original.start_line) == nearest)
        .collect();
    let [window] = closest.as_slice() else {
        return CitationCorrection::no_change(
            failed,
            format!("ambiguous: {} equally close windows in {chosen}", closest.len()),
        );
    };

    let new_citation = Citation {
        file_path: window.path.to_string(),
        start_line: window.start,
        end_line: window.end,
    };
    if new_citation == *original {
        return CitationCorrection::no_change(failed, "best match is the cited range itself");
    }

    debug!(from = %original, to = %new_citation, "re-pointed citation");
    CitationCorrection {
        failed: failed.clone(),
        action_taken: CorrectionAction::FixedReference,
        correction_reasoning: format!(
            "matched {top} of {} claim terms at {new_citation}",
            terms.len()
        ),
        new_citation: Some(new_citation),
        new_claim_text: None,
    }
}

/// Matched term counts for every window of `span` lines in a file.
fn scan_file<'a>(
    path: &'a str,
    file: &CachedFile,
    terms: &[String],
    span: u32,
) -> Vec<Window<'a>> {
    let line_terms: Vec<CodeTerms> = file.lines.iter().map(|l| CodeTerms::from_code(l)).collect();

    // prefix[t][i]: lines before i containing term t
    let prefix: Vec<Vec<u32>> = terms
        .iter()
        .map(|term| {
            let mut counts = Vec::with_capacity(line_terms.len() + 1);
            counts.push(0);
            let mut running = 0;
            for line in &line_terms {
                running += u32::from(line.matches(term));
                counts.push(running);
            }
            counts
        })
        .collect();

    let lines = u32::try_from(line_terms.len()).unwrap_or(u32::MAX);
    (1..=lines.saturating_sub(span) + 1)
        .map(|start| {
            let from = (start - 1) as usize;
            let to = from + span as usize;
            let matched = prefix
                .iter()
                .filter(|counts| counts[to] > counts[from])
                .count();
            Window {
                path,
                start,
                end: start + span - 1,
                matched,
            }
        })
        .collect()
}

/// Widen a citation by `margin` lines on each side, clamped to the file.
pub fn expand_range(
    failed: &FailedCitation,
    cache: &dyn FileCache,
    margin: u32,
) -> CitationCorrection {
    let original = failed.citation();
    let Some(file) = cache
        .get(&original.file_path)
        .filter(|f| !f.is_binary && f.line_count > 0)
    else {
        return CitationCorrection::no_change(failed, "cited file is unavailable");
    };

    let start = original.start_line.max(1);
    let end = original.end_line.max(start);
    let new_citation = Citation {
        file_path: original.file_path.clone(),
        start_line: start.saturating_sub(margin).max(1),
        end_line: end.saturating_add(margin).min(file.line_count),
    };
    if new_citation.start_line > new_citation.end_line {
        return CitationCorrection::no_change(failed, "cited range lies outside the file");
    }
    if new_citation == *original {
        return CitationCorrection::no_change(failed, "range already spans the whole file");
    }

    CitationCorrection {
        failed: failed.clone(),
        action_taken: CorrectionAction::ExpandedRange,
        correction_reasoning: format!("widened {original} to {new_citation}"),
        new_citation: Some(new_citation),
        new_claim_text: None,
    }
}

/// Drop the citation; the claim stays in the report uncited.
pub fn remove_citation(failed: &FailedCitation) -> CitationCorrection {
    CitationCorrection {
        failed: failed.clone(),
        action_taken: CorrectionAction::RemovedCitation,
        new_citation: None,
        new_claim_text: None,
        correction_reasoning: format!("removed {}: {}", failed.extracted.raw, failed.failure_reason),
    }
}

/// Replace the claim text, keeping the citation.
pub fn rewrite_claim(
    failed: &FailedCitation,
    new_claim_text: impl Into<String>,
    reasoning: impl Into<String>,
) -> CitationCorrection {
    CitationCorrection {
        failed: failed.clone(),
        action_taken: CorrectionAction::RewroteClaim,
        new_citation: None,
        new_claim_text: Some(new_claim_text.into()),
        correction_reasoning: reasoning.into(),
    }
}

/// Apply corrections to a report.
///
/// Edits are applied from the end of the report backwards so earlier offsets
/// stay valid. An edit that overlaps one already applied, or whose token no
/// longer sits at its recorded offset, is skipped.
pub fn apply_corrections(report: &str, corrections: &[CitationCorrection]) -> AppliedCorrections {
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    let mut skipped = 0;
    for correction in corrections.iter().filter(|c| c.is_change()) {
        match edit_for(report, correction) {
            Some(edit) => edits.push(edit),
            None => skipped += 1,
        }
    }
    edits.sort_by_key(|(range, _)| Reverse(range.start));

    let mut text = report.to_string();
    let mut floor = report.len();
    let mut applied = 0;
    for (range, replacement) in edits {
        if range.end > floor {
            skipped += 1;
            continue;
        }
        floor = range.start;
        text.replace_range(range, &replacement);
        applied += 1;
    }

    info!(applied, skipped, "applied corrections");
    AppliedCorrections {
        report: text,
        applied,
        skipped,
    }
}

fn edit_for(report: &str, correction: &CitationCorrection) -> Option<(Range<usize>, String)> {
    let extracted = &correction.failed.extracted;
    let token = extracted.token_range();
    if report.get(token.clone()) != Some(extracted.raw.as_str()) {
        debug!(citation = %extracted.raw, "citation moved; skipping edit");
        return None;
    }

    match correction.action_taken {
        CorrectionAction::FixedReference | CorrectionAction::ExpandedRange => correction
            .new_citation
            .as_ref()
            .map(|c| (token, c.to_string())),
        CorrectionAction::RemovedCitation => {
            let start = if report[..token.start].ends_with(' ') {
                token.start - 1
            } else {
                token.start
            };
            Some((start..token.end, String::new()))
        }
        CorrectionAction::RewroteClaim => {
            let new_claim = correction.new_claim_text.as_deref()?;
            let range = extracted.sentence_range.clone();
            let sentence = report.get(range.clone())?;
            Some((range, rewrite_sentence(sentence, &extracted.claim_text, new_claim)))
        }
        CorrectionAction::NoChange => None,
    }
}

/// New claim, then every citation token of the old sentence, then the old terminator.
fn rewrite_sentence(sentence: &str, old_claim: &str, new_claim: &str) -> String {
    let claim = new_claim.trim().trim_end_matches(['.', '!', '?']);
    let tokens: Vec<&str> = CITATION_TOKEN
        .find_iter(sentence)
        .map(|m| m.as_str())
        .collect();
    let terminator = old_claim
        .chars()
        .last()
        .filter(|c| matches!(c, '.' | '!' | '?'))
        .map(String::from)
        .unwrap_or_default();

    if tokens.is_empty() {
        format!("{claim}{terminator}")
    } else {
        format!("{claim} {}{terminator}", tokens.join(" "))
    }
}
