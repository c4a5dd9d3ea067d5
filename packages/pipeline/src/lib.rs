//! Citeguard Pipeline
//!
//! The judge-backed half of citeguard:
//! - [`judge`]: the `Judge` seam, an Anthropic client and the LLM-backed judge
//! - [`abstractive`]: batched, bounded-concurrency verification of abstractive claims
//! - [`evaluator`]: one full evaluation pass over a report
//! - [`correction`]: the iterative correction loop

pub mod abstractive;
pub mod config;
pub mod correction;
pub mod error;
pub mod evaluator;
pub mod judge;

pub use abstractive::{AbstractiveOutcome, AbstractiveVerifier, JudgeSettings, PendingClaim};
pub use config::{CorrectionConfig, JudgeConfig};
pub use correction::{CorrectionEngine, CorrectionRun, CorrectionState};
pub use error::{PipelineError, Result};
pub use evaluator::Evaluator;
pub use judge::{
    AnthropicClient, ClaimRewrite, ClaimRewriter, Judge, JudgeItem, JudgeReply, JudgeVerdict,
    LlmClient, LlmJudge,
};
