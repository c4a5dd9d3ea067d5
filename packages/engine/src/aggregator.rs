//! Report-level reduction of per-citation results
//!
//! [`aggregate`] is a pure function of the report text, the validation and
//! verification results, the judge usage counters and the policy. It computes
//! rates, collects failures and maps each failure onto a repair strategy.
//!
//! Every rate over an empty denominator is `1.0`: a report with nothing to
//! check has nothing wrong with it.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::citation::Citation;
use crate::config::VerificationPolicy;
use crate::extractor::{
    extract_citations, fenced_block_ranges, paragraph_ranges, sentence_boundaries,
    strip_block_marker, CITATION_TOKEN,
};
use crate::types::{
    Confidence, ExtractedCitation, FailureType, SuggestedAction, ValidationResult,
    VerificationMethod, VerificationResult,
};

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static META_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:this (?:section|document|report|page)|the following|as follows|see below|in summary|table of contents)\b",
    )
    .expect("valid regex")
});

/// Judge reasoning that marks a claim as inference rather than a reading of the code.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static INFERENTIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:inferential|inferred|inference|speculative|speculation|not (?:directly |explicitly )?stated)\b",
    )
    .expect("valid regex")
});

/// Cost and availability counters reported by the abstractive stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeUsage {
    pub llm_calls: u32,
    pub llm_tokens: u64,
    pub escalations: u32,
    pub judge_unavailable: bool,
}

/// A citation that did not pass, with the proposed repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCitation {
    pub extracted: ExtractedCitation,
    pub failure_type: FailureType,
    pub failure_reason: String,
    pub suggested_action: SuggestedAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cited_content: Option<String>,
}

impl FailedCitation {
    pub fn citation(&self) -> &Citation {
        &self.extracted.citation
    }
}

/// An invalid citation with its error, as listed in [`CitationStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidCitation {
    pub citation: String,
    pub error: String,
}

/// Structural validity summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationStats {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub invalid_citations: Vec<InvalidCitation>,
}

/// Report-level evaluation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub total_citations: usize,
    pub valid_citations: usize,
    pub invalid_citations: usize,
    pub extractive_checked: usize,
    pub extractive_supported: usize,
    pub abstractive_checked: usize,
    pub abstractive_supported: usize,
    pub unverified: usize,
    pub total_claims: usize,
    pub cited_claims: usize,

    pub validity_rate: f64,
    pub extractive_precision: f64,
    pub abstractive_precision: f64,
    pub overall_precision: f64,
    pub coverage: f64,

    pub llm_calls: u32,
    pub llm_tokens: u64,
    pub escalations: u32,
    pub judge_unavailable: bool,

    pub citation_stats: CitationStats,
    pub validations: Vec<ValidationResult>,
    pub results: Vec<VerificationResult>,
    pub failed_citations: Vec<FailedCitation>,
}

impl EvalResult {
    pub fn needs_correction(&self) -> bool {
        !self.failed_citations.is_empty()
    }

    pub fn is_perfect(&self) -> bool {
        self.validity_rate == 1.0 && self.overall_precision == 1.0 && !self.needs_correction()
    }
}

fn rate(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        1.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Reduce per-citation results to an [`EvalResult`].
pub fn aggregate(
    report: &str,
    validations: Vec<ValidationResult>,
    results: Vec<VerificationResult>,
    usage: JudgeUsage,
    policy: &VerificationPolicy,
) -> EvalResult {
    let total_citations = validations.len();
    let valid_citations = validations.iter().filter(|v| v.valid).count();
    let invalid_citations = total_citations - valid_citations;

    let checked = |method: VerificationMethod| {
        results
            .iter()
            .filter(|r| r.method == method && !r.unverified)
            .collect::<Vec<_>>()
    };
    let extractive = checked(VerificationMethod::Extractive);
    let abstractive = checked(VerificationMethod::Abstractive);
    let extractive_supported = extractive.iter().filter(|r| r.supports).count();
    let abstractive_supported = abstractive.iter().filter(|r| r.supports).count();
    let unverified = results.iter().filter(|r| r.unverified).count();

    let claims = detect_claims(report);
    let cited_claims = claims.iter().filter(|c| c.cited).count();

    let failed_citations = collect_failures(&validations, &results, policy);
    let citation_stats = citation_stats(&validations);

    let result = EvalResult {
        total_citations,
        valid_citations,
        invalid_citations,
        extractive_checked: extractive.len(),
        extractive_supported,
        abstractive_checked: abstractive.len(),
        abstractive_supported,
        unverified,
        total_claims: claims.len(),
        cited_claims,
        validity_rate: rate(valid_citations, total_citations),
        extractive_precision: rate(extractive_supported, extractive.len()),
        abstractive_precision: rate(abstractive_supported, abstractive.len()),
        overall_precision: rate(
            extractive_supported + abstractive_supported,
            extractive.len() + abstractive.len(),
        ),
        coverage: rate(cited_claims, claims.len()),
        llm_calls: usage.llm_calls,
        llm_tokens: usage.llm_tokens,
        escalations: usage.escalations,
        judge_unavailable: usage.judge_unavailable,
        citation_stats,
        validations,
        results,
        failed_citations,
    };

    info!(
        citations = result.total_citations,
        invalid = result.invalid_citations,
        failures = result.failed_citations.len(),
        validity_rate = result.validity_rate,
        overall_precision = result.overall_precision,
        coverage = result.coverage,
        "aggregated evaluation"
    );
    result
}

fn collect_failures(
    validations: &[ValidationResult],
    results: &[VerificationResult],
    policy: &VerificationPolicy,
) -> Vec<FailedCitation> {
    let content: HashMap<usize, &str> = validations
        .iter()
        .filter_map(|v| {
            v.cited_content
                .as_deref()
                .map(|c| (v.extracted.position, c))
        })
        .collect();

    let mut failures: Vec<FailedCitation> = validations
        .iter()
        .filter(|v| !v.valid)
        .filter_map(|v| {
            let error = v.error.as_ref()?;
            Some(FailedCitation {
                extracted: v.extracted.clone(),
                failure_type: error.failure_type,
                failure_reason: error.message.clone(),
                suggested_action: suggested_action(error.failure_type, None),
                llm_reasoning: None,
                cited_content: None,
            })
        })
        .collect();

    for result in results {
        let Some(failure_type) = verification_failure(result, policy) else {
            continue;
        };
        let llm_reasoning =
            (result.method == VerificationMethod::Abstractive).then(|| result.reasoning.clone());
        let failure_reason = match failure_type {
            FailureType::Unverified => "judge unavailable; claim not verified".to_string(),
            _ => result.reasoning.clone(),
        };
        let suggested_action = if result.degraded && failure_type == FailureType::LowConfidence {
            degraded_action(result.method)
        } else {
            suggested_action(failure_type, llm_reasoning.as_deref())
        };
        failures.push(FailedCitation {
            extracted: result.extracted.clone(),
            failure_type,
            suggested_action,
            failure_reason,
            llm_reasoning,
            cited_content: content
                .get(&result.extracted.position)
                .map(|c| c.to_string()),
        });
    }

    failures.sort_by_key(|f| f.extracted.position);
    failures
}

fn verification_failure(
    result: &VerificationResult,
    policy: &VerificationPolicy,
) -> Option<FailureType> {
    if result.unverified {
        Some(FailureType::Unverified)
    } else if result.partial {
        Some(FailureType::PartialSupport)
    } else if !result.supports && result.confidence == Confidence::Low {
        Some(FailureType::LowConfidence)
    } else if !result.supports {
        Some(FailureType::NotSupporting)
    } else if result.confidence == Confidence::Low && policy.low_confidence_is_failure {
        Some(FailureType::LowConfidence)
    } else {
        None
    }
}

/// Map a failure onto its repair strategy.
pub fn suggested_action(failure_type: FailureType, llm_reasoning: Option<&str>) -> SuggestedAction {
    match failure_type {
        FailureType::InvalidFile | FailureType::InvalidRange | FailureType::BinaryFile => {
            SuggestedAction::FixReference
        }
        FailureType::NotSupporting => {
            if llm_reasoning.is_some_and(|r| INFERENTIAL.is_match(r)) {
                SuggestedAction::RemoveCitation
            } else {
                SuggestedAction::RewriteClaim
            }
        }
        FailureType::LowConfidence | FailureType::PartialSupport => SuggestedAction::ExpandRange,
        FailureType::Unverified => SuggestedAction::ManualReview,
    }
}

/// Repair for a claim that never got a real verdict. A wider range cannot
/// help: a claim without terms needs rewording, and a judge that timed out or
/// answered unintelligibly needs a person.
fn degraded_action(method: VerificationMethod) -> SuggestedAction {
    match method {
        VerificationMethod::Extractive => SuggestedAction::RewriteClaim,
        VerificationMethod::Abstractive => SuggestedAction::ManualReview,
    }
}

/// Structural summary of a set of validations.
pub fn citation_stats(validations: &[ValidationResult]) -> CitationStats {
    let invalid_citations: Vec<InvalidCitation> = validations
        .iter()
        .filter(|v| !v.valid)
        .map(|v| InvalidCitation {
            citation: v.extracted.raw.clone(),
            error: v
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_default(),
        })
        .collect();
    CitationStats {
        total: validations.len(),
        valid: validations.len() - invalid_citations.len(),
        invalid: invalid_citations.len(),
        invalid_citations,
    }
}

/// A sentence that reads as a factual claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedClaim {
    pub range: Range<usize>,
    pub cited: bool,
}

/// Find the claim sentences of a report.
///
/// Headings, fenced code, table rows, questions and meta sentences
/// ("this section describes...") are not claims. A citation that opens a
/// sentence belongs to the preceding claim.
pub fn detect_claims(report: &str) -> Vec<DetectedClaim> {
    let fences = fenced_block_ranges(report);
    let token_positions: Vec<usize> = extract_citations(report)
        .iter()
        .map(|c| c.position)
        .collect();

    let mut claims: Vec<DetectedClaim> = Vec::new();
    for paragraph in paragraph_ranges(report) {
        for block in subtract(paragraph, &fences) {
            let text = &report[block.clone()];
            let mut bounds = sentence_boundaries(text);
            bounds.push(text.len());

            let mut previous_claim: Option<usize> = None;
            for pair in bounds.windows(2) {
                let range = block.start + pair[0]..block.start + pair[1];
                let sentence = report[range.clone()].trim();

                let mut cited = false;
                for &position in token_positions.iter().filter(|p| range.contains(p)) {
                    let lead = CITATION_TOKEN.replace_all(&report[range.start..position], "");
                    match previous_claim {
                        Some(i) if !lead.chars().any(char::is_alphanumeric) => {
                            claims[i].cited = true;
                        }
                        _ => cited = true,
                    }
                }

                let prose = CITATION_TOKEN.replace_all(sentence, "");
                if !prose.chars().any(char::is_alphanumeric) {
                    continue;
                }
                if !is_claim(sentence) {
                    previous_claim = None;
                    continue;
                }
                claims.push(DetectedClaim { range, cited });
                previous_claim = Some(claims.len() - 1);
            }
        }
    }
    claims
}

fn is_claim(sentence: &str) -> bool {
    let trimmed = sentence.trim_start();
    if trimmed.starts_with('#') || trimmed.starts_with('|') {
        return false;
    }
    let body = CITATION_TOKEN.replace_all(strip_block_marker(trimmed), "");
    let body = body.trim();
    !body.ends_with('?') && !META_PHRASE.is_match(body)
}

/// Parts of `range` not covered by any of `holes`.
fn subtract(range: Range<usize>, holes: &[Range<usize>]) -> Vec<Range<usize>> {
    let mut pieces = vec![range];
    for hole in holes {
        pieces = pieces
            .into_iter()
            .flat_map(|piece| {
                if hole.end <= piece.start || hole.start >= piece.end {
                    return vec![piece];
                }
                let mut kept = Vec::new();
                if piece.start < hole.start {
                    kept.push(piece.start..hole.start);
                }
                if hole.end < piece.end {
                    kept.push(hole.end..piece.end);
                }
                kept
            })
            .collect();
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StructuralError;
    use pretty_assertions::assert_eq;

    fn extracted(report: &str) -> Vec<ExtractedCitation> {
        extract_citations(report)
    }

    fn valid(e: &ExtractedCitation) -> ValidationResult {
        ValidationResult {
            extracted: e.clone(),
            valid: true,
            error: None,
            cited_content: Some("fn cited() {}".into()),
        }
    }

    fn invalid(e: &ExtractedCitation) -> ValidationResult {
        ValidationResult {
            extracted: e.clone(),
            valid: false,
            error: Some(StructuralError {
                failure_type: FailureType::InvalidFile,
                message: "File not found in cache: gone.rs".into(),
            }),
            cited_content: None,
        }
    }

    fn verdict(
        e: &ExtractedCitation,
        method: VerificationMethod,
        supports: bool,
        confidence: Confidence,
        reasoning: &str,
    ) -> VerificationResult {
        VerificationResult {
            supports,
            confidence,
            degraded: false,
            ..VerificationResult::degraded(e.clone(), method, reasoning)
        }
    }

    #[test]
    fn test_empty_report_is_perfect() {
        let result = aggregate(
            "",
            Vec::new(),
            Vec::new(),
            JudgeUsage::default(),
            &VerificationPolicy::default(),
        );
        assert_eq!(result.validity_rate, 1.0);
        assert_eq!(result.overall_precision, 1.0);
        assert_eq!(result.coverage, 1.0);
        assert!(result.is_perfect());
        assert!(!result.needs_correction());
    }

    #[test]
    fn test_rates_and_failures() {
        let report = "Parses `args` [a.rs:1-2]. Handles retries [b.rs:1-2]. Loads `cfg` [gone.rs:1-2].";
        let e = extracted(report);
        let validations = vec![valid(&e[0]), valid(&e[1]), invalid(&e[2])];
        let results = vec![
            verdict(&e[0], VerificationMethod::Extractive, true, Confidence::High, "ok"),
            verdict(
                &e[1],
                VerificationMethod::Abstractive,
                false,
                Confidence::High,
                "the code does not retry",
            ),
        ];
        let usage = JudgeUsage {
            llm_calls: 1,
            llm_tokens: 120,
            ..JudgeUsage::default()
        };

        let result = aggregate(report, validations, results, usage, &VerificationPolicy::default());

        assert_eq!(result.total_citations, 3);
        assert!((result.validity_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.extractive_precision, 1.0);
        assert_eq!(result.abstractive_precision, 0.0);
        assert_eq!(result.overall_precision, 0.5);
        assert_eq!(result.llm_calls, 1);
        assert_eq!(result.coverage, 1.0);

        let failures: Vec<(FailureType, SuggestedAction)> = result
            .failed_citations
            .iter()
            .map(|f| (f.failure_type, f.suggested_action))
            .collect();
        assert_eq!(
            failures,
            vec![
                (FailureType::NotSupporting, SuggestedAction::RewriteClaim),
                (FailureType::InvalidFile, SuggestedAction::FixReference),
            ]
        );
        assert_eq!(
            result.failed_citations[0].llm_reasoning.as_deref(),
            Some("the code does not retry")
        );
        assert_eq!(
            result.failed_citations[0].cited_content.as_deref(),
            Some("fn cited() {}")
        );
        assert!(result.needs_correction());
        assert!(!result.is_perfect());

        assert_eq!(result.citation_stats.invalid, 1);
        assert_eq!(
            result.citation_stats.invalid_citations,
            vec![InvalidCitation {
                citation: "[gone.rs:1-2]".into(),
                error: "File not found in cache: gone.rs".into(),
            }]
        );
    }

    #[test]
    fn test_suggested_actions() {
        assert_eq!(
            suggested_action(FailureType::BinaryFile, None),
            SuggestedAction::FixReference
        );
        assert_eq!(
            suggested_action(
                FailureType::NotSupporting,
                Some("The claim is inferred from naming, not stated in code")
            ),
            SuggestedAction::RemoveCitation
        );
        assert_eq!(
            suggested_action(FailureType::PartialSupport, None),
            SuggestedAction::ExpandRange
        );
        assert_eq!(
            suggested_action(FailureType::Unverified, None),
            SuggestedAction::ManualReview
        );
    }

    #[test]
    fn test_low_confidence_policy() {
        let report = "Handles retries [b.rs:1-2].";
        let e = extracted(report);
        let low = || {
            vec![verdict(
                &e[0],
                VerificationMethod::Abstractive,
                true,
                Confidence::Low,
                "probably",
            )]
        };

        let lenient = aggregate(
            report,
            vec![valid(&e[0])],
            low(),
            JudgeUsage::default(),
            &VerificationPolicy::default(),
        );
        assert!(lenient.is_perfect());

        let strict = aggregate(
            report,
            vec![valid(&e[0])],
            low(),
            JudgeUsage::default(),
            &VerificationPolicy::default().with_low_confidence_is_failure(true),
        );
        assert_eq!(
            strict.failed_citations[0].failure_type,
            FailureType::LowConfidence
        );
    }

    #[test]
    fn test_degraded_verdicts_are_not_range_expansions() {
        let report = "Handles retries [b.rs:1-2]. It is fast [c.rs:1-2]. Retries back off [d.rs:1-2].";
        let e = extracted(report);
        let results = vec![
            VerificationResult::degraded(
                e[0].clone(),
                VerificationMethod::Abstractive,
                "judge call timed out",
            ),
            VerificationResult::degraded(
                e[1].clone(),
                VerificationMethod::Extractive,
                "claim has no verifiable terms",
            ),
            verdict(
                &e[2],
                VerificationMethod::Abstractive,
                false,
                Confidence::Low,
                "unsure",
            ),
        ];

        let result = aggregate(
            report,
            e.iter().map(valid).collect(),
            results,
            JudgeUsage::default(),
            &VerificationPolicy::default(),
        );

        let actions: Vec<SuggestedAction> = result
            .failed_citations
            .iter()
            .map(|f| f.suggested_action)
            .collect();
        assert!(result
            .failed_citations
            .iter()
            .all(|f| f.failure_type == FailureType::LowConfidence));
        assert_eq!(
            actions,
            vec![
                SuggestedAction::ManualReview,
                SuggestedAction::RewriteClaim,
                SuggestedAction::ExpandRange,
            ]
        );
    }

    #[test]
    fn test_unverified_claims_are_excluded_from_precision() {
        let report = "Handles retries [b.rs:1-2].";
        let e = extracted(report);
        let mut result = verdict(&e[0], VerificationMethod::Abstractive, false, Confidence::Low, "");
        result.unverified = true;

        let eval = aggregate(
            report,
            vec![valid(&e[0])],
            vec![result],
            JudgeUsage {
                judge_unavailable: true,
                ..JudgeUsage::default()
            },
            &VerificationPolicy::default(),
        );
        assert_eq!(eval.abstractive_checked, 0);
        assert_eq!(eval.unverified, 1);
        assert_eq!(eval.overall_precision, 1.0);
        assert_eq!(
            eval.failed_citations[0].suggested_action,
            SuggestedAction::ManualReview
        );
        assert!(eval.judge_unavailable);
    }

    #[test]
    fn test_detect_claims_filters_non_claims() {
        let report = "# Overview\n\
                      This section describes the parser.\n\n\
                      The parser reads tokens. [src/parse.rs:1-9]\n\
                      Why does it buffer?\n\n\
                      | col | col |\n\
                      |-----|-----|\n\n\
                      ```\n\
                      Code is not a claim.\n\
                      ```\n\n\
                      - Writes output files.\n";
        let claims = detect_claims(report);
        let texts: Vec<(&str, bool)> = claims
            .iter()
            .map(|c| (report[c.range.clone()].trim(), c.cited))
            .collect();
        assert_eq!(
            texts,
            vec![
                ("The parser reads tokens.", true),
                ("- Writes output files.", false),
            ]
        );
    }
}
