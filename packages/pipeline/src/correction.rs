//! Iterative correction loop.
//!
//! ```text
//! Evaluating -> Correcting -> Evaluating -> ... -> Converged | IterationLimit | Escalated
//! ```
//!
//! Every pass re-evaluates the working copy of the report from scratch.
//! Cancellation is checked only between passes.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use citeguard_engine::{
    apply_corrections, expand_range, find_reference, remove_citation, rewrite_claim,
    CitationCorrection, CorrectionResult, EvalResult, FailedCitation, SuggestedAction,
};

use crate::config::CorrectionConfig;
use crate::evaluator::Evaluator;
use crate::judge::ClaimRewriter;

/// Where the correction loop is, or where it stopped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CorrectionState {
    Evaluating,
    Correcting,
    /// No failures remain.
    Converged,
    IterationLimit,
    /// Left for a human: too many failures, no judge, or nothing left to try.
    Escalated,
    Cancelled,
}

impl CorrectionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Evaluating | Self::Correcting)
    }
}

/// Final state of a correction run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionRun {
    pub state: CorrectionState,
    pub result: CorrectionResult,
    /// Report text after all applied corrections.
    pub report: String,
    /// Evaluation of `report`.
    pub evaluation: EvalResult,
    /// Failures found by each evaluation, in order.
    pub failures_per_pass: Vec<usize>,
    /// Judge and rewrite calls across every pass.
    pub llm_calls: u32,
    pub llm_tokens: u64,
}

impl CorrectionRun {
    pub fn is_clean(&self) -> bool {
        self.result.remaining_failures.is_empty()
    }
}

pub struct CorrectionEngine<'a> {
    evaluator: Evaluator<'a>,
    rewriter: Option<&'a dyn ClaimRewriter>,
    config: CorrectionConfig,
    cancel: CancellationToken,
}

impl<'a> CorrectionEngine<'a> {
    pub fn new(evaluator: Evaluator<'a>, config: CorrectionConfig) -> Self {
        Self {
            evaluator,
            rewriter: None,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_rewriter(mut self, rewriter: &'a dyn ClaimRewriter) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// State to move to after evaluating, given the passes already made.
    fn next_state(&self, evaluation: &EvalResult, iterations: u32) -> CorrectionState {
        let failures = evaluation.failed_citations.len();
        if !evaluation.needs_correction() {
            CorrectionState::Converged
        } else if self.cancel.is_cancelled() {
            CorrectionState::Cancelled
        } else if iterations >= self.config.max_iterations {
            CorrectionState::IterationLimit
        } else if failures > self.config.max_failures_for_auto || evaluation.judge_unavailable {
            CorrectionState::Escalated
        } else {
            CorrectionState::Correcting
        }
    }

    pub async fn run(&self, report: &str) -> CorrectionRun {
        let mut working = report.to_string();
        let mut result = CorrectionResult::default();
        let mut tally = Tally::default();

        loop {
            let evaluation = self.evaluator.evaluate(&working).await;
            tally.add(evaluation.llm_calls, evaluation.llm_tokens);
            tally.failures_per_pass.push(evaluation.failed_citations.len());
            let state = self.next_state(&evaluation, result.iterations);
            info!(
                iteration = result.iterations,
                failures = evaluation.failed_citations.len(),
                %state,
                "correction pass evaluated"
            );

            if state.is_terminal() {
                return finish(state, result, working, evaluation, tally);
            }

            let corrections = self.propose(&evaluation.failed_citations, &mut tally).await;
            let applied = apply_corrections(&working, &corrections);
            result.iterations += 1;
            result.corrections.extend(corrections);

            if applied.applied == 0 {
                warn!(
                    iteration = result.iterations,
                    failures = evaluation.failed_citations.len(),
                    "no correction could be applied, escalating"
                );
                return finish(CorrectionState::Escalated, result, working, evaluation, tally);
            }
            debug!(applied = applied.applied, skipped = applied.skipped, "corrections applied");
            working = applied.report;
        }
    }

    async fn propose(
        &self,
        failures: &[FailedCitation],
        tally: &mut Tally,
    ) -> Vec<CitationCorrection> {
        let mut corrections = Vec::with_capacity(failures.len());
        for failed in failures {
            let correction = self.correct(failed, tally).await;
            debug!(
                citation = %failed.extracted.citation,
                action = %correction.action_taken,
                "correction proposed"
            );
            corrections.push(correction);
        }
        corrections
    }

    async fn correct(&self, failed: &FailedCitation, tally: &mut Tally) -> CitationCorrection {
        let cache = self.evaluator.cache();
        match failed.suggested_action {
            SuggestedAction::FixReference => find_reference(failed, cache),
            SuggestedAction::ExpandRange => expand_range(failed, cache, self.config.expand_margin),
            SuggestedAction::RemoveCitation => remove_citation(failed),
            SuggestedAction::RewriteClaim => self.rewrite(failed, tally).await,
            SuggestedAction::ManualReview => {
                CitationCorrection::no_change(failed, "needs manual review")
            }
        }
    }

    async fn rewrite(&self, failed: &FailedCitation, tally: &mut Tally) -> CitationCorrection {
        let Some(rewriter) = self.rewriter else {
            return CitationCorrection::no_change(failed, "no claim rewriter configured");
        };
        match rewriter.rewrite_claim(failed).await {
            Ok(rewrite) => {
                debug!(tokens = rewrite.llm_tokens, "claim rewritten");
                tally.add(rewrite.llm_calls, rewrite.llm_tokens);
                rewrite_claim(failed, rewrite.claim, rewrite.reasoning)
            }
            Err(e) => {
                warn!(error = %e, citation = %failed.extracted.citation, "claim rewrite failed");
                CitationCorrection::no_change(failed, format!("claim rewrite failed: {e}"))
            }
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    failures_per_pass: Vec<usize>,
    llm_calls: u32,
    llm_tokens: u64,
}

impl Tally {
    fn add(&mut self, calls: u32, tokens: u64) {
        self.llm_calls += calls;
        self.llm_tokens += tokens;
    }
}

fn finish(
    state: CorrectionState,
    mut result: CorrectionResult,
    report: String,
    evaluation: EvalResult,
    tally: Tally,
) -> CorrectionRun {
    result.remaining_failures = evaluation.failed_citations.clone();
    info!(
        %state,
        iterations = result.iterations,
        remaining = result.remaining_failures.len(),
        llm_calls = tally.llm_calls,
        llm_tokens = tally.llm_tokens,
        "correction finished"
    );
    CorrectionRun {
        state,
        result,
        report,
        evaluation,
        failures_per_pass: tally.failures_per_pass,
        llm_calls: tally.llm_calls,
        llm_tokens: tally.llm_tokens,
    }
}
