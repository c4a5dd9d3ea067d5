//! Core per-citation types shared by every pipeline stage

use std::ops::Range;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::citation::Citation;

/// Why a citation did not pass.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureType {
    /// Cited file is not in the cache.
    InvalidFile,
    /// Line range is malformed or outside the file.
    InvalidRange,
    /// Cited file is binary.
    BinaryFile,
    /// Cited code does not back the claim.
    NotSupporting,
    /// Only part of the claim's terms were found (strict partial policy).
    PartialSupport,
    /// Verdict stayed low-confidence after escalation.
    LowConfidence,
    /// The judge could not be reached; the claim was never checked.
    Unverified,
}

impl FailureType {
    /// Structural failures are deterministic and never retried.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            FailureType::InvalidFile | FailureType::InvalidRange | FailureType::BinaryFile
        )
    }
}

/// Repair strategy proposed for a failed citation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SuggestedAction {
    FixReference,
    RewriteClaim,
    RemoveCitation,
    ExpandRange,
    ManualReview,
}

/// Heuristic routing category of a claim.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Classification {
    Extractive,
    Abstractive,
    Unknown,
}

/// Which verifier produced a verdict.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerificationMethod {
    Extractive,
    Abstractive,
}

/// Confidence attached to a verdict.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// A citation found in report text, with the claim it is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedCitation {
    pub citation: Citation,
    /// The token exactly as written in the report, brackets included.
    pub raw: String,
    /// Syntactic problem noticed during extraction (e.g. non-numeric lines).
    pub malformed: Option<String>,
    pub claim_text: String,
    /// Byte offset of `raw` in the report.
    pub position: usize,
    /// Byte range of the sentence the citation belongs to.
    pub sentence_range: Range<usize>,
    /// The enclosing paragraph.
    pub context: String,
}

impl ExtractedCitation {
    /// Byte range of the citation token in the report.
    pub fn token_range(&self) -> Range<usize> {
        self.position..self.position + self.raw.len()
    }
}

/// Structural failure detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralError {
    pub failure_type: FailureType,
    pub message: String,
}

/// Outcome of the structural checks for one citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub extracted: ExtractedCitation,
    pub valid: bool,
    pub error: Option<StructuralError>,
    /// Cited lines, verbatim from the cache. Only set when `valid`.
    pub cited_content: Option<String>,
}

impl ValidationResult {
    pub fn citation(&self) -> &Citation {
        &self.extracted.citation
    }
}

/// Routing decision for a structurally valid citation. Carries no verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub extracted: ExtractedCitation,
    pub classification: Classification,
    pub confidence: f64,
    pub matched_patterns: Vec<String>,
    /// Verifier selected after applying the `unknown` fallback.
    pub route: VerificationMethod,
}

/// Terminal per-citation verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub extracted: ExtractedCitation,
    pub supports: bool,
    pub method: VerificationMethod,
    pub confidence: Confidence,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_terms: Option<Vec<String>>,
    /// Term-match score, extractive only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Re-judged alone by the stronger judge tier.
    #[serde(default)]
    pub escalated: bool,
    /// The judge was unreachable and the claim never checked.
    #[serde(default)]
    pub unverified: bool,
    /// Extractive partial match rejected by the strict partial policy.
    #[serde(default)]
    pub partial: bool,
    /// No real verdict was reached: the claim had no terms, or the judge
    /// timed out or answered unintelligibly.
    #[serde(default)]
    pub degraded: bool,
}

impl VerificationResult {
    /// Conservative verdict used whenever a judge answer is missing or unusable.
    pub fn degraded(
        extracted: ExtractedCitation,
        method: VerificationMethod,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            extracted,
            supports: false,
            method,
            confidence: Confidence::Low,
            reasoning: reasoning.into(),
            matched_terms: None,
            score: None,
            escalated: false,
            unverified: false,
            partial: false,
            degraded: true,
        }
    }
}
