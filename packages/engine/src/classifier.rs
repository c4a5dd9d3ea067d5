//! Heuristic claim classification
//!
//! Routes each structurally valid claim to the cheap extractive verifier or to
//! the judge. Pattern groups are checked in order:
//!
//! 1. **extractive**: an inline code span, a kind word followed by a name
//!    (`function parse_args`, `class FileCache`), or a location phrase
//!    (`defined in`, `found at`)
//! 2. **abstractive**: a behavioural phrase (`handles`, `manages`, `uses`,
//!    `responsible for`, ...)
//! 3. **unknown**: routed per [`UnknownRouting`]
//!
//! Classification never produces a verdict and never calls the judge.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::config::UnknownRouting;
use crate::extractor::CODE_SPAN;
use crate::terms::is_identifier_like;
use crate::types::{Classification, ClassificationResult, ExtractedCitation, VerificationMethod};

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static NAMED_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:function|class|method|variable|constant|struct|enum|trait|interface|field|parameter|property|attribute|module)\s+`?([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("valid regex")
});

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static LOCATION_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:defined|located|found|declared)\s+(?:in|at)\b").expect("valid regex")
});

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static BEHAVIOURAL_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(handles?|manages?|implements?|provides?|ensures?|architecture|patterns?|uses|supports?|responsible\s+for|orchestrates?|coordinates?|delegates?|abstracts?|enables?|integrates?|designed|strategy|lifecycle|workflow)\b",
    )
    .expect("valid regex")
});

/// Confidence when two or more kinds of extractive pattern match.
const MULTI_PATTERN_CONFIDENCE: f64 = 0.9;
/// Confidence when a single kind of extractive pattern matches.
const SINGLE_PATTERN_CONFIDENCE: f64 = 0.75;
const ABSTRACTIVE_CONFIDENCE: f64 = 0.7;
const UNKNOWN_CONFIDENCE: f64 = 0.5;

/// Deterministic claim router.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimClassifier {
    unknown_routing: UnknownRouting,
}

impl ClaimClassifier {
    pub fn new(unknown_routing: UnknownRouting) -> Self {
        Self { unknown_routing }
    }

    pub fn classify(&self, extracted: &ExtractedCitation) -> ClassificationResult {
        let (classification, confidence, matched_patterns) =
            classify_claim(&extracted.claim_text);

        let route = match classification {
            Classification::Extractive => VerificationMethod::Extractive,
            Classification::Abstractive => VerificationMethod::Abstractive,
            Classification::Unknown => match self.unknown_routing {
                UnknownRouting::Extractive => VerificationMethod::Extractive,
                UnknownRouting::Abstractive => VerificationMethod::Abstractive,
            },
        };

        debug!(
            citation = %extracted.raw,
            %classification,
            %route,
            "classified claim"
        );

        ClassificationResult {
            extracted: extracted.clone(),
            classification,
            confidence,
            matched_patterns,
            route,
        }
    }
}

/// Classify claim text, returning the category, its confidence and the patterns that fired.
pub fn classify_claim(claim: &str) -> (Classification, f64, Vec<String>) {
    let mut extractive = Vec::new();

    if CODE_SPAN.is_match(claim) {
        extractive.push("code_span".to_string());
    }
    let named = NAMED_ENTITY.captures_iter(claim).any(|caps| {
        caps.get(1)
            .is_some_and(|name| is_identifier_like(name.as_str(), false))
    });
    if named {
        extractive.push("named_entity".to_string());
    }
    if LOCATION_PHRASE.is_match(claim) {
        extractive.push("location_phrase".to_string());
    }

    if !extractive.is_empty() {
        let confidence = if extractive.len() > 1 {
            MULTI_PATTERN_CONFIDENCE
        } else {
            SINGLE_PATTERN_CONFIDENCE
        };
        return (Classification::Extractive, confidence, extractive);
    }

    let mut behavioural: Vec<String> = Vec::new();
    for m in BEHAVIOURAL_PHRASE.find_iter(claim) {
        let phrase = m
            .as_str()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let pattern = format!("behavioural:{phrase}");
        if !behavioural.contains(&pattern) {
            behavioural.push(pattern);
        }
    }
    if !behavioural.is_empty() {
        return (Classification::Abstractive, ABSTRACTIVE_CONFIDENCE, behavioural);
    }

    (Classification::Unknown, UNKNOWN_CONFIDENCE, Vec::new())
}
