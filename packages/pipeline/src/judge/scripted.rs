//! In-process [`Judge`] whose answers are computed by closures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use citeguard_engine::Confidence;

use crate::error::{PipelineError, Result};
use crate::judge::{Judge, JudgeItem, JudgeReply, JudgeVerdict};

type VerdictFn = Box<dyn Fn(&JudgeItem) -> Option<JudgeVerdict> + Send + Sync>;
type DelayFn = Box<dyn Fn(&[JudgeItem]) -> Duration + Send + Sync>;

/// Tokens charged per judged item.
const TOKENS_PER_ITEM: u64 = 10;

pub fn verdict(supports: bool, confidence: Confidence, reasoning: &str) -> JudgeVerdict {
    JudgeVerdict {
        supports,
        reasoning: reasoning.to_string(),
        confidence,
    }
}

pub struct ScriptedJudge {
    verdict: VerdictFn,
    high_tier: VerdictFn,
    delay: DelayFn,
    /// Batch calls that succeed before every further call fails.
    fail_after: Option<usize>,
    batches: Mutex<Vec<Vec<String>>>,
    high_tier_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedJudge {
    pub fn new(
        verdict: impl Fn(&JudgeItem) -> Option<JudgeVerdict> + Send + Sync + 'static,
    ) -> Self {
        Self {
            verdict: Box::new(verdict),
            high_tier: Box::new(|_| None),
            delay: Box::new(|_| Duration::ZERO),
            fail_after: None,
            batches: Mutex::new(Vec::new()),
            high_tier_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Judge that agrees with every claim.
    pub fn supporting() -> Self {
        Self::new(|_| Some(verdict(true, Confidence::High, "consistent with the code")))
    }

    pub fn with_high_tier(
        mut self,
        high_tier: impl Fn(&JudgeItem) -> Option<JudgeVerdict> + Send + Sync + 'static,
    ) -> Self {
        self.high_tier = Box::new(high_tier);
        self
    }

    pub fn with_delay(
        mut self,
        delay: impl Fn(&[JudgeItem]) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Box::new(delay);
        self
    }

    pub fn failing_after(mut self, successful_calls: usize) -> Self {
        self.fail_after = Some(successful_calls);
        self
    }

    /// Claims of every batch call received, in call order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    pub fn high_tier_calls(&self) -> usize {
        self.high_tier_calls.load(Ordering::SeqCst)
    }

    /// Highest number of batch calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, items: &[JudgeItem]) -> usize {
        let mut batches = self
            .batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        batches.push(items.iter().map(|i| i.claim.clone()).collect());
        batches.len() - 1
    }

    fn reply(&self, items: &[JudgeItem], f: &VerdictFn) -> JudgeReply {
        JudgeReply {
            verdicts: items.iter().map(|item| f(item)).collect(),
            llm_calls: 1,
            llm_tokens: TOKENS_PER_ITEM * items.len() as u64,
        }
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn batch_judge(&self, items: &[JudgeItem]) -> Result<JudgeReply> {
        let call = self.record(items);
        if self.fail_after.is_some_and(|n| call >= n) {
            return Err(PipelineError::LlmApiError {
                status: 503,
                message: "judge unavailable".into(),
            });
        }

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep((self.delay)(items)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(self.reply(items, &self.verdict))
    }

    async fn single_judge_high_tier(&self, item: &JudgeItem) -> Result<JudgeReply> {
        self.high_tier_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply(std::slice::from_ref(item), &self.high_tier))
    }
}
