//! Language-model judge
//!
//! [`Judge`] is the seam between the abstractive verifier and whatever decides
//! whether cited code supports a claim. [`LlmJudge`] implements it (and
//! [`ClaimRewriter`]) on top of any [`LlmClient`].

mod client;
mod llm_judge;
mod parse;
mod prompt;
#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use citeguard_engine::{Confidence, ExtractedCitation, FailedCitation};

use crate::error::Result;

pub use client::{AnthropicClient, LlmClient, LlmRequest, LlmResponse, Message, Role};
#[cfg(any(test, feature = "test-utils"))]
pub use client::test_support::MockLlmClient;
#[cfg(any(test, feature = "test-utils"))]
pub use scripted::ScriptedJudge;
pub use llm_judge::LlmJudge;
pub use parse::{extract_fenced_blocks, parse_rewrite, parse_verdicts};

/// One claim put before the judge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JudgeItem {
    /// Canonical citation token.
    pub citation: String,
    pub claim: String,
    /// Enclosing paragraph of the claim.
    pub context: String,
    pub cited_content: String,
}

impl JudgeItem {
    pub fn new(extracted: &ExtractedCitation, cited_content: &str) -> Self {
        Self {
            citation: extracted.citation.to_string(),
            claim: extracted.claim_text.clone(),
            context: extracted.context.clone(),
            cited_content: cited_content.to_string(),
        }
    }
}

/// The judge's answer for one claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub supports: bool,
    pub reasoning: String,
    pub confidence: Confidence,
}

/// Verdicts for one judge call plus what the call cost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JudgeReply {
    /// Aligned with the items asked about; `None` where no usable answer came back.
    pub verdicts: Vec<Option<JudgeVerdict>>,
    pub llm_calls: u32,
    pub llm_tokens: u64,
}

/// A regenerated claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRewrite {
    pub claim: String,
    pub reasoning: String,
    pub llm_calls: u32,
    pub llm_tokens: u64,
}

/// Decides whether cited code supports claims.
///
/// Errors mean the judge could not be reached at all; an answer that could
/// not be understood is a `None` verdict instead.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn batch_judge(&self, items: &[JudgeItem]) -> Result<JudgeReply>;

    /// Re-judge a single item with the stronger tier.
    async fn single_judge_high_tier(&self, item: &JudgeItem) -> Result<JudgeReply>;
}

/// Regenerates unsupported claims from their cited code.
#[async_trait]
pub trait ClaimRewriter: Send + Sync {
    async fn rewrite_claim(&self, failed: &FailedCitation) -> Result<ClaimRewrite>;
}
