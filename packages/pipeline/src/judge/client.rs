//! Language-model transport for the judge.
//!
//! [`LlmClient`] is the seam the judge talks through. [`AnthropicClient`]
//! speaks the Anthropic Messages API. Each HTTP attempt is classified once
//! into an answer, a transient failure, or a rejection; transient failures
//! (connection errors, 408, 429, 5xx, empty answers) are retried after 1 s,
//! 2 s and 4 s, or after the server's `retry-after` when that is longer.
//! Rejections such as a bad key or an unknown model fail at once, so the
//! abstractive stage can stop asking.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::JudgeConfig;
use crate::error::{PipelineError, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Waits before the second, third and fourth attempt.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Author of a message. Judge prompts are single-turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One prompt for the model.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Overrides the client's default model; used for the stronger judge tier.
    pub model: Option<String>,
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;
}

/// Anthropic Messages API client.
///
/// Does not derive `Debug`: it holds the API key.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl MessagesResponse {
    /// Concatenated text blocks, or `None` when the model said nothing.
    fn into_answer(self) -> Option<LlmResponse> {
        let content: String = self.content.into_iter().filter_map(|b| b.text).collect();
        (!content.trim().is_empty()).then_some(LlmResponse {
            content,
            input_tokens: self.usage.input_tokens,
            output_tokens: self.usage.output_tokens,
        })
    }
}

/// How a response status is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Success,
    RateLimited,
    Transient,
    Rejected,
}

fn classify(status: StatusCode) -> StatusClass {
    match status {
        StatusCode::OK => StatusClass::Success,
        StatusCode::TOO_MANY_REQUESTS => StatusClass::RateLimited,
        StatusCode::REQUEST_TIMEOUT => StatusClass::Transient,
        s if s.is_server_error() => StatusClass::Transient,
        _ => StatusClass::Rejected,
    }
}

/// Server-requested wait from a `retry-after` header in seconds.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// The API's own error message when the body carries one.
fn rejection_message(body: String) -> String {
    serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|e| e.error)
        .map(|e| e.message)
        .unwrap_or(body)
}

/// Result of a single HTTP attempt.
enum Attempt {
    Answer(LlmResponse),
    Retry {
        error: PipelineError,
        server_wait: Option<Duration>,
    },
    Fail(PipelineError),
}

impl Attempt {
    fn retry(error: PipelineError) -> Self {
        Self::Retry {
            error,
            server_wait: None,
        }
    }
}

impl AnthropicClient {
    pub fn new(config: &JudgeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(PipelineError::LlmApiRequest)?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            endpoint: format!("{}/v1/messages", config.api_base_url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    async fn attempt(&self, body: &MessagesRequest<'_>) -> Attempt {
        let response = match self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Attempt::retry(PipelineError::LlmApiRequest(e)),
        };

        let status = response.status();
        match classify(status) {
            StatusClass::Success => match response.json::<MessagesResponse>().await {
                Ok(parsed) => parsed
                    .into_answer()
                    .map_or_else(|| Attempt::retry(PipelineError::LlmEmptyResponse), Attempt::Answer),
                Err(e) => Attempt::Fail(PipelineError::LlmResponseParse(e.to_string())),
            },
            StatusClass::RateLimited => {
                let server_wait = retry_after(response.headers());
                Attempt::Retry {
                    error: PipelineError::LlmRateLimited {
                        retry_after_secs: server_wait.unwrap_or(RETRY_DELAYS[0]).as_secs(),
                    },
                    server_wait,
                }
            }
            StatusClass::Transient => Attempt::retry(PipelineError::LlmApiError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
            StatusClass::Rejected => Attempt::Fail(PipelineError::LlmApiError {
                status: status.as_u16(),
                message: rejection_message(response.text().await.unwrap_or_default()),
            }),
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = MessagesRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system,
            messages: &request.messages,
        };

        let mut wait = Duration::ZERO;
        let mut last_error = PipelineError::LlmEmptyResponse;
        for (attempt, backoff) in RETRY_DELAYS.iter().copied().map(Some).chain([None]).enumerate() {
            if !wait.is_zero() {
                debug!(attempt, ?wait, model = body.model, "retrying judge request");
                tokio::time::sleep(wait).await;
            }

            match self.attempt(&body).await {
                Attempt::Answer(answer) => return Ok(answer),
                Attempt::Fail(e) => return Err(e),
                Attempt::Retry { error, server_wait } => {
                    warn!(attempt, error = %error, "judge request failed");
                    last_error = error;
                    let Some(backoff) = backoff else { break };
                    wait = server_wait.map_or(backoff, |w| w.max(backoff));
                }
            }
        }

        Err(last_error)
    }
}

/// Test utilities for the LLM client.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted client: answers from a queue and records every request.
    pub struct MockLlmClient {
        answers: Mutex<VecDeque<Result<LlmResponse>>>,
        requests: Mutex<Vec<LlmRequest>>,
    }

    impl MockLlmClient {
        pub fn new(answers: Vec<Result<LlmResponse>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn with_response(content: &str) -> Self {
            Self::with_responses(vec![content])
        }

        /// Each answer costs 100 input and 200 output tokens.
        pub fn with_responses(contents: Vec<&str>) -> Self {
            Self::new(
                contents
                    .into_iter()
                    .map(|c| {
                        Ok(LlmResponse {
                            content: c.to_string(),
                            input_tokens: 100,
                            output_tokens: 200,
                        })
                    })
                    .collect(),
            )
        }

        pub fn requests(&self) -> Vec<LlmRequest> {
            self.requests
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone()
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
            self.requests
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(request.clone());
            self.answers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .pop_front()
                .unwrap_or(Err(PipelineError::LlmEmptyResponse))
        }
    }
}
