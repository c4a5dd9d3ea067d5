//! Configuration constants and verification policy for the citeguard engine
//!
//! Centralized values used throughout the engine for:
//! - Extractive scoring thresholds
//! - Fuzzy-matching limits
//! - Correction loop bounds and repair margins
//! - File cache loading limits
//!
//! Runtime knobs that callers are expected to tune live in [`VerificationPolicy`];
//! everything else is a compile-time constant.

use serde::{Deserialize, Serialize};

/// Minimum term-match score for an extractive claim to count as fully supported.
pub const SUPPORT_THRESHOLD: f64 = 0.8;

/// Minimum term-match score for a partial extractive match.
///
/// Scores in `[PARTIAL_THRESHOLD, SUPPORT_THRESHOLD)` are handled by [`PartialPolicy`].
pub const PARTIAL_THRESHOLD: f64 = 0.5;

/// Maximum edit distance for a fuzzy identifier match.
pub const MAX_EDIT_DISTANCE: usize = 2;

/// Identifiers shorter than this only match exactly (modulo case and stemming).
///
/// Edit distance 2 on a 3-letter word matches almost anything.
pub const FUZZY_MIN_LEN: usize = 4;

/// Identifiers longer than this only match exactly (modulo case and stemming).
pub const FUZZY_MAX_LEN: usize = 12;

/// Minimum length of a prose word used as a fallback claim term.
pub const MIN_PROSE_TERM_LEN: usize = 4;

/// Maximum number of claims sent to the judge in a single batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Maximum number of correction iterations before the loop gives up.
pub const DEFAULT_MAX_CORRECTION_ITERATIONS: u32 = 3;

/// Failure count above which automated repair is skipped and the report escalated.
pub const DEFAULT_MAX_FAILURES_FOR_AUTO: usize = 10;

/// Number of lines added on each side of a citation by `expand_range`.
pub const DEFAULT_EXPAND_MARGIN: u32 = 5;

/// Number of leading bytes inspected when sniffing for binary content.
pub const BINARY_SNIFF_BYTES: usize = 8000;

/// Files larger than this are skipped when loading a directory into the cache (1 MiB).
pub const MAX_CACHED_FILE_SIZE: u64 = 1024 * 1024;

/// Directory names never loaded into the cache.
pub const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules", ".venv", "__pycache__"];

/// How claims the classifier cannot place are verified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownRouting {
    /// Verify with deterministic term matching (no judge cost).
    #[default]
    Extractive,
    /// Send to the judge (LLM-assisted handling).
    Abstractive,
}

/// How an extractive score in the partial band is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialPolicy {
    /// Partial matches pass with `medium` confidence.
    #[default]
    Pass,
    /// Partial matches become `partial_support` failures and feed the correction loop.
    SoftFail,
}

/// Runtime verification policy shared by the classifier, verifiers and aggregator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationPolicy {
    pub unknown_routing: UnknownRouting,
    pub partial_policy: PartialPolicy,
    /// Treat supporting verdicts that stayed `low` confidence after escalation as failures.
    pub low_confidence_is_failure: bool,
}

impl VerificationPolicy {
    pub fn with_unknown_routing(mut self, routing: UnknownRouting) -> Self {
        self.unknown_routing = routing;
        self
    }

    pub fn with_partial_policy(mut self, policy: PartialPolicy) -> Self {
        self.partial_policy = policy;
        self
    }

    pub fn with_low_confidence_is_failure(mut self, enabled: bool) -> Self {
        self.low_confidence_is_failure = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_are_reasonable() {
        assert!(PARTIAL_THRESHOLD < SUPPORT_THRESHOLD);
        assert!(SUPPORT_THRESHOLD <= 1.0);
        assert!(PARTIAL_THRESHOLD > 0.0);

        assert!(FUZZY_MIN_LEN > MAX_EDIT_DISTANCE, "fuzzy match would be trivial");
        assert!(FUZZY_MIN_LEN < FUZZY_MAX_LEN);

        assert!(DEFAULT_BATCH_SIZE >= 1);
        assert!(DEFAULT_BATCH_SIZE <= 20, "batches should stay small");

        assert!(DEFAULT_MAX_CORRECTION_ITERATIONS >= 1);
        assert!(DEFAULT_MAX_CORRECTION_ITERATIONS <= 10);

        assert!(DEFAULT_EXPAND_MARGIN >= 1);
        assert!(BINARY_SNIFF_BYTES >= 512);
    }

    #[test]
    fn test_default_policy_is_conservative() {
        let policy = VerificationPolicy::default();
        assert_eq!(policy.unknown_routing, UnknownRouting::Extractive);
        assert_eq!(policy.partial_policy, PartialPolicy::Pass);
        assert!(!policy.low_confidence_is_failure);
    }
}
