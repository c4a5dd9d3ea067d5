//! Judge-backed verification of abstractive claims.
//!
//! Claims are grouped by cited file, chunked into batches, and judged with at
//! most `max_concurrency` calls in flight. Results come back in input order
//! no matter which batch finishes first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use citeguard_engine::config::DEFAULT_BATCH_SIZE;
use citeguard_engine::{
    Confidence, ExtractedCitation, JudgeUsage, VerificationMethod, VerificationResult,
};

use crate::config::{JudgeConfig, DEFAULT_MAX_CONCURRENCY};
use crate::error::{PipelineError, Result};
use crate::judge::{Judge, JudgeItem, JudgeReply, JudgeVerdict};

/// Attempts per judge call when it times out.
const TIMEOUT_ATTEMPTS: u32 = 2;

const REASON_TIMED_OUT: &str = "judge call timed out";
const REASON_UNPARSEABLE: &str = "unparseable judge response";
const REASON_UNAVAILABLE: &str = "judge unavailable; claim not verified";

/// A structurally valid claim routed to the judge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingClaim {
    pub extracted: ExtractedCitation,
    pub cited_content: String,
}

impl PendingClaim {
    fn item(&self) -> JudgeItem {
        JudgeItem::new(&self.extracted, &self.cited_content)
    }
}

/// How judge calls are batched and bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JudgeSettings {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub call_timeout: Duration,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            call_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&JudgeConfig> for JudgeSettings {
    fn from(config: &JudgeConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_concurrency: config.max_concurrency,
            call_timeout: config.call_timeout(),
        }
    }
}

/// Verdicts for every pending claim, in input order, plus judge usage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbstractiveOutcome {
    pub results: Vec<VerificationResult>,
    pub usage: JudgeUsage,
}

impl AbstractiveOutcome {
    /// Outcome when no judge can be reached: every claim is left unverified.
    pub fn unverified(pending: &[PendingClaim]) -> Self {
        Self {
            results: pending.iter().map(|p| unverified(&p.extracted)).collect(),
            usage: JudgeUsage {
                judge_unavailable: !pending.is_empty(),
                ..JudgeUsage::default()
            },
        }
    }
}

enum CallOutcome {
    Reply(JudgeReply),
    TimedOut,
    Failed(PipelineError),
}

#[derive(Default)]
struct BatchOutcome {
    results: Vec<(usize, VerificationResult)>,
    usage: JudgeUsage,
}

fn unverified(extracted: &ExtractedCitation) -> VerificationResult {
    VerificationResult {
        unverified: true,
        ..VerificationResult::degraded(
            extracted.clone(),
            VerificationMethod::Abstractive,
            REASON_UNAVAILABLE,
        )
    }
}

fn from_verdict(
    extracted: &ExtractedCitation,
    verdict: JudgeVerdict,
    escalated: bool,
) -> VerificationResult {
    VerificationResult {
        extracted: extracted.clone(),
        supports: verdict.supports,
        method: VerificationMethod::Abstractive,
        confidence: verdict.confidence,
        reasoning: verdict.reasoning,
        matched_terms: None,
        score: None,
        escalated,
        unverified: false,
        partial: false,
        degraded: false,
    }
}

/// Group claim indices by cited file, in order of first appearance, then
/// split each group into chunks of at most `batch_size`.
pub fn plan_batches(pending: &[PendingClaim], batch_size: usize) -> Vec<Vec<usize>> {
    let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
    for (i, claim) in pending.iter().enumerate() {
        let path = claim.extracted.citation.file_path.as_str();
        match groups.iter_mut().find(|(p, _)| *p == path) {
            Some((_, indices)) => indices.push(i),
            None => groups.push((path, vec![i])),
        }
    }

    groups
        .into_iter()
        .flat_map(|(_, indices)| {
            indices
                .chunks(batch_size.max(1))
                .map(<[usize]>::to_vec)
                .collect::<Vec<_>>()
        })
        .collect()
}

pub struct AbstractiveVerifier<'a> {
    judge: &'a dyn Judge,
    settings: JudgeSettings,
}

impl<'a> AbstractiveVerifier<'a> {
    pub fn new(judge: &'a dyn Judge, settings: JudgeSettings) -> Self {
        Self { judge, settings }
    }

    /// Judge every pending claim.
    ///
    /// A judge error stops all batches that have not started yet; their claims
    /// come back unverified and `judge_unavailable` is set.
    pub async fn verify_all(&self, pending: &[PendingClaim]) -> AbstractiveOutcome {
        if pending.is_empty() {
            return AbstractiveOutcome::default();
        }

        let batches = plan_batches(pending, self.settings.batch_size);
        info!(
            claims = pending.len(),
            batches = batches.len(),
            max_concurrency = self.settings.max_concurrency,
            "judging abstractive claims"
        );

        let semaphore = Semaphore::new(self.settings.max_concurrency.max(1));
        let aborted = AtomicBool::new(false);

        let outcomes = join_all(
            batches
                .iter()
                .map(|batch| self.run_batch(batch, pending, &semaphore, &aborted)),
        )
        .await;

        let mut usage = JudgeUsage::default();
        let mut results = Vec::with_capacity(pending.len());
        for outcome in outcomes {
            usage.llm_calls += outcome.usage.llm_calls;
            usage.llm_tokens += outcome.usage.llm_tokens;
            usage.escalations += outcome.usage.escalations;
            usage.judge_unavailable |= outcome.usage.judge_unavailable;
            results.extend(outcome.results);
        }
        results.sort_by_key(|(i, _)| *i);

        AbstractiveOutcome {
            results: results.into_iter().map(|(_, r)| r).collect(),
            usage,
        }
    }

    async fn run_batch(
        &self,
        batch: &[usize],
        pending: &[PendingClaim],
        semaphore: &Semaphore,
        aborted: &AtomicBool,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let abandon = |outcome: &mut BatchOutcome| {
            outcome.usage.judge_unavailable = true;
            outcome.results = batch
                .iter()
                .map(|&i| (i, unverified(&pending[i].extracted)))
                .collect();
        };

        let Ok(_permit) = semaphore.acquire().await else {
            abandon(&mut outcome);
            return outcome;
        };
        if aborted.load(Ordering::SeqCst) {
            abandon(&mut outcome);
            return outcome;
        }

        let items: Vec<JudgeItem> = batch.iter().map(|&i| pending[i].item()).collect();
        let reply = match self.call(|| self.judge.batch_judge(&items)).await {
            CallOutcome::Reply(reply) => reply,
            CallOutcome::TimedOut => {
                outcome.usage.llm_calls += TIMEOUT_ATTEMPTS;
                outcome.results = batch
                    .iter()
                    .map(|&i| {
                        let extracted = pending[i].extracted.clone();
                        let degraded = VerificationResult::degraded(
                            extracted,
                            VerificationMethod::Abstractive,
                            REASON_TIMED_OUT,
                        );
                        (i, degraded)
                    })
                    .collect();
                return outcome;
            }
            CallOutcome::Failed(e) => {
                warn!(error = %e, claims = batch.len(), "judge unavailable, aborting abstractive stage");
                aborted.store(true, Ordering::SeqCst);
                abandon(&mut outcome);
                return outcome;
            }
        };

        debug!(claims = batch.len(), llm_calls = reply.llm_calls, "batch judged");
        outcome.usage.llm_calls += reply.llm_calls;
        outcome.usage.llm_tokens += reply.llm_tokens;

        let mut verdicts = reply.verdicts.into_iter();
        for (&i, item) in batch.iter().zip(&items) {
            let extracted = &pending[i].extracted;
            let result = match verdicts.next().flatten() {
                None => VerificationResult::degraded(
                    extracted.clone(),
                    VerificationMethod::Abstractive,
                    REASON_UNPARSEABLE,
                ),
                Some(verdict) if verdict.confidence == Confidence::Low => {
                    self.escalate(extracted, item, verdict, &mut outcome.usage)
                        .await
                }
                Some(verdict) => from_verdict(extracted, verdict, false),
            };
            outcome.results.push((i, result));
        }

        outcome
    }

    /// Re-judge a low-confidence verdict alone with the stronger tier.
    /// The original verdict stands when the re-judgement yields nothing.
    async fn escalate(
        &self,
        extracted: &ExtractedCitation,
        item: &JudgeItem,
        original: JudgeVerdict,
        usage: &mut JudgeUsage,
    ) -> VerificationResult {
        debug!(citation = %extracted.citation, "escalating low-confidence verdict");
        match self.call(|| self.judge.single_judge_high_tier(item)).await {
            CallOutcome::Reply(reply) => {
                usage.escalations += 1;
                usage.llm_calls += reply.llm_calls;
                usage.llm_tokens += reply.llm_tokens;
                match reply.verdicts.into_iter().next().flatten() {
                    Some(verdict) => from_verdict(extracted, verdict, true),
                    None => from_verdict(extracted, original, false),
                }
            }
            CallOutcome::TimedOut => {
                usage.llm_calls += TIMEOUT_ATTEMPTS;
                from_verdict(extracted, original, false)
            }
            CallOutcome::Failed(e) => {
                warn!(error = %e, citation = %extracted.citation, "escalation failed");
                from_verdict(extracted, original, false)
            }
        }
    }

    /// Run a judge call under the per-call timeout, retrying once on timeout.
    async fn call<'f>(&self, make: impl Fn() -> BoxFuture<'f, Result<JudgeReply>>) -> CallOutcome {
        for attempt in 1..=TIMEOUT_ATTEMPTS {
            match tokio::time::timeout(self.settings.call_timeout, make()).await {
                Ok(Ok(reply)) => return CallOutcome::Reply(reply),
                Ok(Err(e)) => return CallOutcome::Failed(e),
                Err(_) => {
                    let e = PipelineError::JudgeTimeout {
                        secs: self.settings.call_timeout.as_secs(),
                    };
                    warn!(attempt, error = %e, "judge call timed out");
                }
            }
        }
        CallOutcome::TimedOut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::scripted::{verdict, ScriptedJudge};
    use citeguard_engine::Citation;
    use pretty_assertions::assert_eq;

    fn claim(path: &str, text: &str, position: usize) -> PendingClaim {
        let citation = Citation::new(path, 1, 2).expect("citation");
        PendingClaim {
            extracted: ExtractedCitation {
                raw: citation.to_string(),
                citation,
                malformed: None,
                claim_text: text.into(),
                position,
                sentence_range: 0..position,
                context: text.into(),
            },
            cited_content: "def login(user, password):\n    return check(user, password)".into(),
        }
    }

    fn settings(batch_size: usize, max_concurrency: usize) -> JudgeSettings {
        JudgeSettings {
            batch_size,
            max_concurrency,
            call_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_plan_batches_groups_by_file() {
        let pending = vec![
            claim("a.py", "one", 0),
            claim("b.py", "two", 10),
            claim("a.py", "three", 20),
            claim("a.py", "four", 30),
        ];
        assert_eq!(
            plan_batches(&pending, 2),
            vec![vec![0, 2], vec![3], vec![1]]
        );
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let judge = ScriptedJudge::supporting();
        let outcome = AbstractiveVerifier::new(&judge, settings(5, 4))
            .verify_all(&[])
            .await;
        assert!(outcome.results.is_empty());
        assert!(judge.batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_input_order() {
        // The first file's batch finishes last.
        let judge = ScriptedJudge::new(|item| {
            Some(verdict(item.claim.contains("keep"), Confidence::High, "checked"))
        })
        .with_delay(|items| {
            if items[0].citation.starts_with("[a.py") {
                Duration::from_millis(300)
            } else {
                Duration::from_millis(10)
            }
        });
        let pending = vec![
            claim("a.py", "keep one", 0),
            claim("b.py", "drop two", 10),
            claim("c.py", "keep three", 20),
        ];

        let outcome = AbstractiveVerifier::new(&judge, settings(5, 3))
            .verify_all(&pending)
            .await;

        let claims: Vec<&str> = outcome
            .results
            .iter()
            .map(|r| r.extracted.claim_text.as_str())
            .collect();
        assert_eq!(claims, vec!["keep one", "drop two", "keep three"]);
        assert_eq!(
            outcome.results.iter().map(|r| r.supports).collect::<Vec<_>>(),
            vec![true, false, true]
        );
        assert_eq!(outcome.usage.llm_calls, 3);
        assert_eq!(outcome.usage.llm_tokens, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let judge = ScriptedJudge::supporting().with_delay(|_| Duration::from_millis(50));
        let pending: Vec<PendingClaim> = (0..6)
            .map(|i| claim(&format!("f{i}.py"), "claim", i * 10))
            .collect();

        AbstractiveVerifier::new(&judge, settings(5, 2))
            .verify_all(&pending)
            .await;

        assert_eq!(judge.batches().len(), 6);
        assert!(judge.max_in_flight() <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_retries_once_then_degrades() {
        let judge = ScriptedJudge::supporting().with_delay(|_| Duration::from_secs(60));
        let pending = vec![claim("a.py", "slow claim", 0)];

        let outcome = AbstractiveVerifier::new(&judge, settings(5, 1))
            .verify_all(&pending)
            .await;

        assert_eq!(judge.batches().len(), 2);
        assert_eq!(outcome.usage.llm_calls, 2);
        assert_eq!(outcome.usage.llm_tokens, 0);
        let result = &outcome.results[0];
        assert!(!result.supports);
        assert!(!result.unverified);
        assert!(result.degraded);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.reasoning, REASON_TIMED_OUT);
    }

    #[tokio::test]
    async fn test_missing_verdict_degrades() {
        let judge = ScriptedJudge::new(|_| None);
        let outcome = AbstractiveVerifier::new(&judge, settings(5, 1))
            .verify_all(&[claim("a.py", "claim", 0)])
            .await;
        assert_eq!(outcome.results[0].reasoning, REASON_UNPARSEABLE);
        assert!(!outcome.results[0].supports);
    }

    #[tokio::test]
    async fn test_low_confidence_is_escalated() {
        let judge = ScriptedJudge::new(|_| Some(verdict(false, Confidence::Low, "unsure")))
            .with_high_tier(|_| Some(verdict(true, Confidence::High, "it does")));

        let outcome = AbstractiveVerifier::new(&judge, settings(5, 1))
            .verify_all(&[claim("a.py", "claim", 0)])
            .await;

        let result = &outcome.results[0];
        assert!(result.supports);
        assert!(result.escalated);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(outcome.usage.escalations, 1);
        assert_eq!(outcome.usage.llm_calls, 2);
        assert_eq!(judge.high_tier_calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_escalation_keeps_original() {
        let judge = ScriptedJudge::new(|_| Some(verdict(true, Confidence::Low, "maybe")));

        let outcome = AbstractiveVerifier::new(&judge, settings(5, 1))
            .verify_all(&[claim("a.py", "claim", 0)])
            .await;

        let result = &outcome.results[0];
        assert!(result.supports);
        assert!(!result.escalated);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.reasoning, "maybe");
    }

    #[tokio::test]
    async fn test_judge_error_marks_remaining_unverified() {
        let judge = ScriptedJudge::supporting().failing_after(1);
        let pending = vec![
            claim("a.py", "first", 0),
            claim("b.py", "second", 10),
            claim("c.py", "third", 20),
        ];

        let outcome = AbstractiveVerifier::new(&judge, settings(5, 1))
            .verify_all(&pending)
            .await;

        assert!(outcome.usage.judge_unavailable);
        assert!(outcome.results[0].supports);
        assert!(outcome.results[1].unverified);
        assert!(outcome.results[2].unverified);
        // The third batch never reaches the judge.
        assert_eq!(judge.batches().len(), 2);
    }

    #[test]
    fn test_unverified_outcome() {
        let outcome = AbstractiveOutcome::unverified(&[claim("a.py", "claim", 0)]);
        assert!(outcome.usage.judge_unavailable);
        assert!(outcome.results[0].unverified);
        assert!(!AbstractiveOutcome::unverified(&[]).usage.judge_unavailable);
    }
}
