//! Language-model judge and claim rewriter.

use async_trait::async_trait;
use tracing::{debug, warn};

use citeguard_engine::FailedCitation;

use crate::config::JudgeConfig;
use crate::error::Result;
use crate::judge::client::{LlmClient, LlmRequest, Message};
use crate::judge::parse::{parse_rewrite, parse_verdicts};
use crate::judge::prompt::{
    build_judge_prompt, build_rewrite_prompt, judge_system_prompt, rewrite_system_prompt,
};
use crate::judge::{ClaimRewrite, ClaimRewriter, Judge, JudgeItem, JudgeReply};

/// Calls per prompt before an unparseable answer is given up on.
const PARSE_ATTEMPTS: u32 = 2;

/// [`Judge`] and [`ClaimRewriter`] backed by a language model.
pub struct LlmJudge<'a, C: LlmClient> {
    client: &'a C,
    config: &'a JudgeConfig,
}

impl<'a, C: LlmClient> LlmJudge<'a, C> {
    pub fn new(client: &'a C, config: &'a JudgeConfig) -> Self {
        Self { client, config }
    }

    fn request(&self, model: Option<&str>, system: &str, user: String) -> LlmRequest {
        LlmRequest {
            model: model.map(str::to_string),
            system: system.to_string(),
            messages: vec![Message::user(user)],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    /// Ask about `items`, retrying once verbatim when the answer does not parse.
    async fn judge(&self, items: &[JudgeItem], model: Option<&str>) -> Result<JudgeReply> {
        let request = self.request(model, judge_system_prompt(), build_judge_prompt(items));
        let mut reply = JudgeReply::default();

        for attempt in 1..=PARSE_ATTEMPTS {
            let response = self.client.complete(&request).await?;
            reply.llm_calls += 1;
            reply.llm_tokens += response.total_tokens();

            match parse_verdicts(&response.content, items.len()) {
                Ok(verdicts) => {
                    debug!(items = items.len(), attempt, "judge verdicts parsed");
                    reply.verdicts = verdicts.into_iter().map(Some).collect();
                    return Ok(reply);
                }
                Err(e) => warn!(attempt, error = %e, "unparseable judge response"),
            }
        }

        reply.verdicts = vec![None; items.len()];
        Ok(reply)
    }
}

#[async_trait]
impl<C: LlmClient> Judge for LlmJudge<'_, C> {
    async fn batch_judge(&self, items: &[JudgeItem]) -> Result<JudgeReply> {
        if items.is_empty() {
            return Ok(JudgeReply::default());
        }
        self.judge(items, None).await
    }

    async fn single_judge_high_tier(&self, item: &JudgeItem) -> Result<JudgeReply> {
        let model = self.config.escalation_model.as_str();
        self.judge(std::slice::from_ref(item), Some(model)).await
    }
}

#[async_trait]
impl<C: LlmClient> ClaimRewriter for LlmJudge<'_, C> {
    async fn rewrite_claim(&self, failed: &FailedCitation) -> Result<ClaimRewrite> {
        let request = self.request(None, rewrite_system_prompt(), build_rewrite_prompt(failed));
        let response = self.client.complete(&request).await?;
        let (claim, reasoning) = parse_rewrite(&response.content)?;
        Ok(ClaimRewrite {
            claim,
            reasoning,
            llm_calls: 1,
            llm_tokens: response.total_tokens(),
        })
    }
}
