use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("engine error: {0}")]
    Engine(#[from] citeguard_engine::EngineError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("LLM API request failed: {0}")]
    LlmApiRequest(#[from] reqwest::Error),

    #[error("LLM API error (status {status}): {message}")]
    LlmApiError { status: u16, message: String },

    #[error("LLM rate limited, retry after {retry_after_secs}s")]
    LlmRateLimited { retry_after_secs: u64 },

    #[error("failed to parse LLM response: {0}")]
    LlmResponseParse(String),

    #[error("LLM returned empty response")]
    LlmEmptyResponse,

    #[error("judge call timed out after {secs}s")]
    JudgeTimeout { secs: u64 },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
