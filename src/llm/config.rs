//! Typed generator configuration.
//!
//! Every value comes through a key lookup so the parsing rules can be
//! exercised without touching the process environment. [`LlmConfig::from_env`]
//! is the lookup over `std::env`.

use std::str::FromStr;
use std::time::Duration;

use super::types::LlmError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const KEY_VAR_SELECTOR: &str = "LLM_API_KEY_ENV";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProviderKind {
    Anthropic,
    #[default]
    OpenAi,
}

impl LlmProviderKind {
    fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-5-20250929",
            Self::OpenAi => "gpt-4o",
        }
    }
}

impl FromStr for LlmProviderKind {
    type Err = LlmError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(LlmError::ConfigParse(format!("unknown LLM_PROVIDER: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenAiApiMode {
    #[default]
    ChatCompletions,
    Responses,
}

impl FromStr for OpenAiApiMode {
    type Err = LlmError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "chat_completions" => Ok(Self::ChatCompletions),
            "responses" => Ok(Self::Responses),
            other => Err(LlmError::ConfigParse(format!(
                "unknown LLM_OPENAI_MODE: {other} (expected chat_completions or responses)"
            ))),
        }
    }
}

/// HTTP deadlines applied by the provider clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmTimeouts {
    pub request: Duration,
    pub connect: Duration,
}

impl Default for LlmTimeouts {
    fn default() -> Self {
        Self { request: Duration::from_secs(120), connect: Duration::from_secs(10) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub api_key: String,
    pub model: String,
    pub openai_mode: OpenAiApiMode,
    pub openai_base_url: String,
    pub timeouts: LlmTimeouts,
}

impl LlmConfig {
    /// Read the config from the process environment.
    ///
    /// # Errors
    ///
    /// See [`LlmConfig::from_lookup`].
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from `lookup`, treating blank values as unset.
    ///
    /// `LLM_API_KEY_ENV` names the variable that holds the key; it is the only
    /// required setting. `LLM_PROVIDER`, `LLM_MODEL`, `LLM_OPENAI_MODE`,
    /// `LLM_OPENAI_BASE_URL`, `LLM_REQUEST_TIMEOUT_SECS` and
    /// `LLM_CONNECT_TIMEOUT_SECS` fall back to defaults.
    ///
    /// # Errors
    ///
    /// `MissingApiKey` when the key cannot be resolved, `ConfigParse` for an
    /// unknown provider, mode or a non-numeric timeout.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LlmError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let provider = get("LLM_PROVIDER").map_or(Ok(LlmProviderKind::default()), |raw| raw.parse())?;
        let openai_mode = get("LLM_OPENAI_MODE").map_or(Ok(OpenAiApiMode::default()), |raw| raw.parse())?;

        let key_var = get(KEY_VAR_SELECTOR).ok_or_else(|| LlmError::MissingApiKey { var: KEY_VAR_SELECTOR.into() })?;
        let api_key = get(key_var.as_str()).ok_or(LlmError::MissingApiKey { var: key_var })?;

        let defaults = LlmTimeouts::default();
        let timeouts = LlmTimeouts {
            request: seconds(get("LLM_REQUEST_TIMEOUT_SECS"), "LLM_REQUEST_TIMEOUT_SECS", defaults.request)?,
            connect: seconds(get("LLM_CONNECT_TIMEOUT_SECS"), "LLM_CONNECT_TIMEOUT_SECS", defaults.connect)?,
        };

        let mut openai_base_url = get("LLM_OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_owned());
        openai_base_url.truncate(openai_base_url.trim_end_matches('/').len());

        Ok(Self {
            provider,
            api_key,
            model: get("LLM_MODEL").unwrap_or_else(|| provider.default_model().to_owned()),
            openai_mode,
            openai_base_url,
            timeouts,
        })
    }
}

fn seconds(raw: Option<String>, key: &str, default: Duration) -> Result<Duration, LlmError> {
    raw.map_or(Ok(default), |v| {
        v.parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| LlmError::ConfigParse(format!("{key} must be a whole number of seconds, got {v}")))
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
