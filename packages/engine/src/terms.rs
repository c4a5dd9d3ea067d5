//! Term extraction and fuzzy matching
//!
//! Claim terms are the identifier-like words of a claim: code-span contents,
//! capitalised names, `snake_case` and `camelCase` identifiers. Code terms are
//! every identifier-shaped word in the cited lines, which covers identifiers,
//! string literal contents and comment words alike, plus the `snake`/`camel`
//! parts of each identifier.
//!
//! A claim term matches when, in order of widening:
//! 1. its lowercase, underscore-free form appears in the code,
//! 2. its stem matches a code stem (`checks`/`checking` ~ `check`),
//! 3. all of its identifier parts match,
//! 4. it is within [`MAX_EDIT_DISTANCE`] of a code term, for terms of
//!    [`FUZZY_MIN_LEN`]..=[`FUZZY_MAX_LEN`] characters.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::{FUZZY_MAX_LEN, FUZZY_MIN_LEN, MAX_EDIT_DISTANCE, MIN_PROSE_TERM_LEN};
use crate::extractor::{CITATION_TOKEN, CODE_SPAN};

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("valid regex"));

/// Words that never count as claim terms.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "by", "called", "calls", "class",
    "classes", "code", "constant", "declared", "defined", "does", "each", "file", "files", "for",
    "found", "from", "function", "functions", "has", "have", "here", "if", "in", "into", "is",
    "it", "its", "line", "lines", "located", "method", "methods", "module", "not", "of", "on",
    "or", "that", "the", "their", "then", "there", "these", "this", "those", "to", "type", "used",
    "uses", "using", "value", "variable", "variables", "was", "were", "when", "where", "which",
    "while", "will", "with",
];

fn is_stop_word(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    STOP_WORDS.contains(&lower.as_str())
}

/// Lowercase form without underscores, so `validateToken` and `validate_token` agree.
fn term_key(word: &str) -> String {
    word.chars()
        .filter(|&c| c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether a prose word looks like a code name rather than plain English.
///
/// Capitalised words only count away from the start of a sentence.
pub fn is_identifier_like(word: &str, sentence_start: bool) -> bool {
    if word.len() < 2 || !word.chars().any(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    if word.contains('_') || word.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    let has_lower = word.chars().any(|c| c.is_ascii_lowercase());
    let inner_upper = word.chars().skip(1).any(|c| c.is_ascii_uppercase());
    if inner_upper && has_lower {
        return true;
    }
    if !has_lower {
        return true;
    }
    let first_upper = word.chars().next().is_some_and(|c| c.is_ascii_uppercase());
    first_upper && !sentence_start
}

/// Split an identifier into its `snake_case` and `camelCase` parts.
pub fn split_identifier(ident: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for piece in ident.split('_').filter(|p| !p.is_empty()) {
        let chars: Vec<char> = piece.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            let boundary = i > 0
                && c.is_uppercase()
                && (chars[i - 1].is_lowercase()
                    || chars[i - 1].is_ascii_digit()
                    || (chars[i - 1].is_uppercase()
                        && chars.get(i + 1).is_some_and(|n| n.is_lowercase())));
            if boundary && !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            current.push(c);
        }
        if !current.is_empty() {
            parts.push(current);
        }
    }
    parts
}

/// Crude suffix stemmer for verbs and plurals.
pub fn stem(word: &str) -> String {
    let lower = word.to_lowercase();
    let base = if let Some(s) = lower.strip_suffix("ing").filter(|s| s.len() >= 3) {
        s
    } else if let Some(s) = lower.strip_suffix("ed").filter(|s| s.len() >= 3) {
        s
    } else if let Some(s) = lower.strip_suffix("es").filter(|s| {
        s.len() >= 3
            && (s.ends_with(['s', 'x', 'z']) || s.ends_with("ch") || s.ends_with("sh"))
    }) {
        s
    } else if let Some(s) = lower
        .strip_suffix('s')
        .filter(|s| s.len() >= 3 && !s.ends_with('s'))
    {
        s
    } else {
        lower.as_str()
    };
    base.strip_suffix('e')
        .filter(|s| s.len() >= 3)
        .unwrap_or(base)
        .to_string()
}

/// Levenshtein distance over chars.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Extract the verifiable terms of a claim, in order of appearance.
///
/// Falls back to content words of at least [`MIN_PROSE_TERM_LEN`] characters
/// when the claim names nothing identifier-like.
pub fn claim_terms(claim: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    let mut add = |word: &str, terms: &mut Vec<String>| {
        if seen.insert(term_key(word)) {
            terms.push(word.to_string());
        }
    };

    for span in CODE_SPAN.find_iter(claim) {
        for ident in IDENTIFIER.find_iter(span.as_str()) {
            let word = ident.as_str();
            if word.len() >= 2 && !is_stop_word(word) {
                add(word, &mut terms);
            }
        }
    }

    let prose = CODE_SPAN.replace_all(claim, " ");
    let prose = CITATION_TOKEN.replace_all(&prose, " ");
    for (i, ident) in IDENTIFIER.find_iter(&prose).enumerate() {
        let word = ident.as_str();
        if is_identifier_like(word, i == 0) && !is_stop_word(word) {
            add(word, &mut terms);
        }
    }

    if terms.is_empty() {
        for ident in IDENTIFIER.find_iter(&prose) {
            let word = ident.as_str();
            if word.len() >= MIN_PROSE_TERM_LEN
                && word.chars().all(|c| c.is_ascii_alphabetic())
                && !is_stop_word(word)
            {
                add(&word.to_lowercase(), &mut terms);
            }
        }
    }

    terms
}

/// Searchable term index over a block of code.
#[derive(Debug, Clone, Default)]
pub struct CodeTerms {
    keys: HashSet<String>,
    stems: HashSet<String>,
}

impl CodeTerms {
    pub fn from_code(code: &str) -> Self {
        let mut keys = HashSet::new();
        for ident in IDENTIFIER.find_iter(code) {
            let word = ident.as_str();
            keys.insert(term_key(word));
            for part in split_identifier(word) {
                if part.len() >= 2 {
                    keys.insert(term_key(&part));
                }
            }
        }
        keys.retain(|k| !k.is_empty());
        let stems = keys.iter().map(|k| stem(k)).collect();
        Self { keys, stems }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether a single claim term is found in the code.
    pub fn matches(&self, term: &str) -> bool {
        let key = term_key(term);
        if key.is_empty() {
            return false;
        }
        if self.matches_exact(&key) {
            return true;
        }

        let parts = split_identifier(term);
        if parts.len() > 1 && parts.iter().all(|p| self.matches_exact(&term_key(p))) {
            return true;
        }

        let len = key.chars().count();
        if !(FUZZY_MIN_LEN..=FUZZY_MAX_LEN).contains(&len) {
            return false;
        }
        self.keys.iter().any(|candidate| {
            let candidate_len = candidate.chars().count();
            candidate_len >= FUZZY_MIN_LEN
                && candidate_len.abs_diff(len) <= MAX_EDIT_DISTANCE
                && edit_distance(&key, candidate) <= MAX_EDIT_DISTANCE
        })
    }

    fn matches_exact(&self, key: &str) -> bool {
        self.keys.contains(key) || self.stems.contains(&stem(key))
    }
}

/// Result of scoring claim terms against code.
#[derive(Debug, Clone, PartialEq)]
pub struct TermScore {
    /// `matched / (matched + missing)`; `0.0` when there are no terms.
    pub score: f64,
    pub matched: Vec<String>,
    pub missing: Vec<String>,
}

impl TermScore {
    pub fn total(&self) -> usize {
        self.matched.len() + self.missing.len()
    }

    pub fn has_terms(&self) -> bool {
        self.total() > 0
    }
}

/// Score pre-extracted claim terms against an indexed code block.
pub fn score_terms(terms: &[String], code: &CodeTerms) -> TermScore {
    let (matched, missing): (Vec<String>, Vec<String>) =
        terms.iter().cloned().partition(|t| code.matches(t));
    let score = if terms.is_empty() {
        0.0
    } else {
        matched.len() as f64 / terms.len() as f64
    };
    TermScore {
        score,
        matched,
        missing,
    }
}

/// Extract terms from `claim` and score them against `code`.
pub fn score_claim(claim: &str, code: &str) -> TermScore {
    score_terms(&claim_terms(claim), &CodeTerms::from_code(code))
}
