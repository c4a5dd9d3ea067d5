//! Citeguard Engine
//!
//! Deterministic core of the citeguard citation checker.
//! This library provides functionality for:
//! - Extracting `[path:start-end]` citations and their claims from report text
//! - Validating citations against a read-only file cache
//! - Routing claims to extractive or abstractive verification
//! - Verifying extractive claims by fuzzy term matching
//! - Aggregating per-citation results into report-level metrics
//! - Proposing and applying citation corrections
//!
//! The judge-backed stages live in `citeguard-pipeline`.
//!
//! # Example
//!
//! ```ignore
//! use citeguard_engine::{
//!     extract_citations, validate_all, ClaimClassifier, ExtractiveVerifier, InMemoryFileCache,
//! };
//!
//! let cache = InMemoryFileCache::from_dir(Path::new("./repo"))?;
//! let extracted = extract_citations(&report);
//! for validation in validate_all(&extracted, &cache) {
//!     if let Some(content) = &validation.cited_content {
//!         let verdict = ExtractiveVerifier::default().verify(&validation.extracted, content);
//!         println!("{} supports={}", validation.extracted.raw, verdict.supports);
//!     }
//! }
//! ```

pub mod aggregator;
pub mod cache;
pub mod citation;
pub mod classifier;
pub mod config;
pub mod correction;
pub mod error;
pub mod extractive;
pub mod extractor;
pub mod terms;
pub mod types;
pub mod validator;

// Re-export commonly used items
pub use aggregator::{
    aggregate, citation_stats, detect_claims, suggested_action, CitationStats, DetectedClaim,
    EvalResult, FailedCitation, InvalidCitation, JudgeUsage,
};
pub use cache::{detect_language, CachedFile, FileCache, InMemoryFileCache};
pub use citation::Citation;
pub use classifier::{classify_claim, ClaimClassifier};
pub use config::{PartialPolicy, UnknownRouting, VerificationPolicy};
pub use correction::{
    apply_corrections, expand_range, find_reference, remove_citation, rewrite_claim,
    AppliedCorrections, CitationCorrection, CorrectionAction, CorrectionResult,
};
pub use error::{EngineError, Result};
pub use extractive::{score_verdict, ExtractiveVerifier, ScoreVerdict};
pub use extractor::{extract_citations, normalize_claim};
pub use terms::{claim_terms, score_claim, CodeTerms, TermScore};
pub use types::{
    Classification, ClassificationResult, Confidence, ExtractedCitation, FailureType,
    StructuralError, SuggestedAction, ValidationResult, VerificationMethod, VerificationResult,
};
pub use validator::{validate_all, validate_citation};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[test]
    fn test_reexports() {
        let _policy = VerificationPolicy::default();
        let _action = CorrectionAction::NoChange;
        let _err = EngineError::InvalidCitation("x".into());
    }
}
