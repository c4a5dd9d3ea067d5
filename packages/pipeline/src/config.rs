//! Judge and correction-loop settings, read from the environment.

use std::str::FromStr;
use std::time::Duration;

use citeguard_engine::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_EXPAND_MARGIN, DEFAULT_MAX_CORRECTION_ITERATIONS,
    DEFAULT_MAX_FAILURES_FOR_AUTO,
};

use crate::error::{PipelineError, Result};

const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_ESCALATION_MODEL: &str = "claude-opus-4-1-20250805";
const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";

/// Default number of judge batches in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Configuration for the language-model judge.
///
/// NOTE: Do NOT derive `Debug` on this struct; `api_key` would be exposed.
#[derive(Clone)]
pub struct JudgeConfig {
    pub api_key: String,
    pub model: String,
    /// Stronger model used to re-judge low-confidence verdicts.
    pub escalation_model: String,
    pub api_base_url: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Per HTTP request.
    pub timeout_secs: u64,
    /// Per judge call, retries included.
    pub call_timeout_secs: u64,
    pub batch_size: usize,
    pub max_concurrency: usize,
}

impl std::fmt::Debug for JudgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgeConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("escalation_model", &self.escalation_model)
            .field("api_base_url", &self.api_base_url)
            .field("batch_size", &self.batch_size)
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

impl JudgeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| PipelineError::Config("LLM_API_KEY not set".into()))?;

        let defaults = Self::builder(api_key).build();
        Ok(Self {
            model: env_or("LLM_MODEL", defaults.model.clone()),
            escalation_model: env_or("LLM_ESCALATION_MODEL", defaults.escalation_model.clone()),
            api_base_url: env_or("LLM_API_BASE_URL", defaults.api_base_url.clone()),
            temperature: env_or("LLM_TEMPERATURE", defaults.temperature),
            max_tokens: env_or("LLM_MAX_TOKENS", defaults.max_tokens),
            timeout_secs: env_or("LLM_TIMEOUT_SECS", defaults.timeout_secs),
            call_timeout_secs: env_or("LLM_CALL_TIMEOUT_SECS", defaults.call_timeout_secs),
            batch_size: env_or("JUDGE_BATCH_SIZE", defaults.batch_size).max(1),
            max_concurrency: env_or("JUDGE_MAX_CONCURRENCY", defaults.max_concurrency).max(1),
            ..defaults
        })
    }

    /// Create a config builder for testing.
    pub fn builder(api_key: impl Into<String>) -> JudgeConfigBuilder {
        JudgeConfigBuilder {
            config: JudgeConfig {
                api_key: api_key.into(),
                model: DEFAULT_MODEL.into(),
                escalation_model: DEFAULT_ESCALATION_MODEL.into(),
                api_base_url: DEFAULT_API_BASE_URL.into(),
                temperature: 0.0,
                max_tokens: 4096,
                timeout_secs: 120,
                call_timeout_secs: 300,
                batch_size: DEFAULT_BATCH_SIZE,
                max_concurrency: DEFAULT_MAX_CONCURRENCY,
            },
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Builder for constructing `JudgeConfig` in tests.
pub struct JudgeConfigBuilder {
    config: JudgeConfig,
}

impl JudgeConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn escalation_model(mut self, model: impl Into<String>) -> Self {
        self.config.escalation_model = model.into();
        self
    }

    pub fn api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.config.api_base_url = api_base_url.into();
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.config.timeout_secs = timeout_secs;
        self
    }

    pub fn call_timeout_secs(mut self, call_timeout_secs: u64) -> Self {
        self.config.call_timeout_secs = call_timeout_secs;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size.max(1);
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn build(self) -> JudgeConfig {
        self.config
    }
}

/// Bounds of the correction loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionConfig {
    pub max_iterations: u32,
    /// Above this many failures the report is escalated instead of repaired.
    pub max_failures_for_auto: usize,
    pub expand_margin: u32,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_CORRECTION_ITERATIONS,
            max_failures_for_auto: DEFAULT_MAX_FAILURES_FOR_AUTO,
            expand_margin: DEFAULT_EXPAND_MARGIN,
        }
    }
}

impl CorrectionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_iterations: env_or("CORRECTION_MAX_ITERATIONS", defaults.max_iterations),
            max_failures_for_auto: env_or(
                "CORRECTION_MAX_FAILURES",
                defaults.max_failures_for_auto,
            ),
            expand_margin: env_or("CORRECTION_EXPAND_MARGIN", defaults.expand_margin),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_failures_for_auto(mut self, max_failures: usize) -> Self {
        self.max_failures_for_auto = max_failures;
        self
    }

    pub fn with_expand_margin(mut self, margin: u32) -> Self {
        self.expand_margin = margin;
        self
    }
}
