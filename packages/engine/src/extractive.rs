//! Deterministic extractive verification
//!
//! Scores the claim's terms against the cited lines (see [`crate::terms`]) and
//! maps the score onto a verdict. No judge call is ever made here.

use tracing::debug;

use crate::config::{PartialPolicy, PARTIAL_THRESHOLD, SUPPORT_THRESHOLD};
use crate::terms::{score_claim, TermScore};
use crate::types::{Confidence, ExtractedCitation, VerificationMethod, VerificationResult};

/// Verdict derived from a term-match score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreVerdict {
    pub supports: bool,
    pub confidence: Confidence,
    /// Score fell in the partial band and the policy rejected it.
    pub partial: bool,
}

/// Map a score onto a verdict.
///
/// - `score >= SUPPORT_THRESHOLD`: supports, high
/// - `PARTIAL_THRESHOLD <= score < SUPPORT_THRESHOLD`: per `policy`, medium
/// - below: does not support, high
pub fn score_verdict(score: f64, policy: PartialPolicy) -> ScoreVerdict {
    if score >= SUPPORT_THRESHOLD {
        ScoreVerdict {
            supports: true,
            confidence: Confidence::High,
            partial: false,
        }
    } else if score >= PARTIAL_THRESHOLD {
        match policy {
            PartialPolicy::Pass => ScoreVerdict {
                supports: true,
                confidence: Confidence::Medium,
                partial: false,
            },
            PartialPolicy::SoftFail => ScoreVerdict {
                supports: false,
                confidence: Confidence::Medium,
                partial: true,
            },
        }
    } else {
        ScoreVerdict {
            supports: false,
            confidence: Confidence::High,
            partial: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveVerifier {
    partial_policy: PartialPolicy,
}

impl ExtractiveVerifier {
    pub fn new(partial_policy: PartialPolicy) -> Self {
        Self { partial_policy }
    }

    /// Verify a claim against its cited lines.
    pub fn verify(&self, extracted: &ExtractedCitation, cited_content: &str) -> VerificationResult {
        let terms = score_claim(&extracted.claim_text, cited_content);

        if !terms.has_terms() {
            debug!(citation = %extracted.raw, "claim has no verifiable terms");
            return VerificationResult {
                matched_terms: Some(Vec::new()),
                score: Some(0.0),
                ..VerificationResult::degraded(
                    extracted.clone(),
                    VerificationMethod::Extractive,
                    "claim has no verifiable terms",
                )
            };
        }

        let verdict = score_verdict(terms.score, self.partial_policy);
        debug!(
            citation = %extracted.raw,
            score = terms.score,
            supports = verdict.supports,
            "extractive verdict"
        );

        VerificationResult {
            extracted: extracted.clone(),
            supports: verdict.supports,
            method: VerificationMethod::Extractive,
            confidence: verdict.confidence,
            reasoning: describe(&terms),
            score: Some(terms.score),
            matched_terms: Some(terms.matched),
            escalated: false,
            unverified: false,
            partial: verdict.partial,
            degraded: false,
        }
    }
}

fn describe(terms: &TermScore) -> String {
    let mut reasoning = format!(
        "matched {} of {} claim terms",
        terms.matched.len(),
        terms.total()
    );
    if !terms.missing.is_empty() {
        reasoning.push_str(&format!("; not found: {}", terms.missing.join(", ")));
    }
    reasoning
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::extract_citations;
    use pretty_assertions::assert_eq;

    fn claim(text: &str) -> ExtractedCitation {
        let report = format!("{text} [src/a.py:1-3].");
        extract_citations(&report).remove(0)
    }

    #[test]
    fn test_threshold_boundaries() {
        let at = score_verdict(0.8, PartialPolicy::Pass);
        assert!(at.supports);
        assert_eq!(at.confidence, Confidence::High);

        let below = score_verdict(0.4999, PartialPolicy::Pass);
        assert!(!below.supports);
        assert_eq!(below.confidence, Confidence::High);

        let partial = score_verdict(0.5, PartialPolicy::Pass);
        assert!(partial.supports);
        assert_eq!(partial.confidence, Confidence::Medium);

        let strict = score_verdict(0.79, PartialPolicy::SoftFail);
        assert!(!strict.supports);
        assert!(strict.partial);
    }

    #[test]
    fn test_supporting_claim() {
        let code = "def validate_token(token):\n    if token.expiry < now(): raise Expired()";
        let result = ExtractiveVerifier::default().verify(
            &claim("The `validate_token` function checks the expiry timestamp"),
            code,
        );
        assert!(result.supports);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.method, VerificationMethod::Extractive);
        assert_eq!(result.score, Some(1.0));
        assert_eq!(result.reasoning, "matched 1 of 1 claim terms");
    }

    #[test]
    fn test_unsupported_claim_lists_missing_terms() {
        let result = ExtractiveVerifier::default()
            .verify(&claim("The `load_config` function reads `CONFIG_PATH`"), "x = 1");
        assert!(!result.supports);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(
            result.reasoning,
            "matched 0 of 2 claim terms; not found: load_config, CONFIG_PATH"
        );
    }

    #[test]
    fn test_partial_policy() {
        let code = "fn load_config() {}";
        let extracted = claim("The `load_config` function reads `CONFIG_PATH`");

        let pass = ExtractiveVerifier::new(PartialPolicy::Pass).verify(&extracted, code);
        assert!(pass.supports);
        assert_eq!(pass.confidence, Confidence::Medium);

        let strict = ExtractiveVerifier::new(PartialPolicy::SoftFail).verify(&extracted, code);
        assert!(!strict.supports);
        assert!(strict.partial);
    }

    #[test]
    fn test_claim_without_terms_is_low_confidence() {
        let result = ExtractiveVerifier::default().verify(&claim("It is on"), "anything");
        assert!(!result.supports);
        assert_eq!(result.confidence, Confidence::Low);
    }
}
