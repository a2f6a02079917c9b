//! Optimization gateway: diagram markup → LLM → validated suggestion.
//!
//! DESIGN
//! ======
//! The generator is untrusted and non-deterministic, so its output goes
//! through a fixed pipeline before anything is handed back:
//!
//! 1. extract the text payload and strip a fenced code block if present
//! 2. parse `{ suggestions, optimizedMarkup }`
//! 3. validate the markup (XML declaration + definitions root)
//! 4. validate the suggestions (non-empty list of non-empty strings)
//! 5. sanitize the markup (trim, undo literal escapes, start at `<?xml`)
//!
//! Nothing here writes to the store; a failed or cancelled optimization has
//! no persistent side effects.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ErrorCode;
use crate::llm::LlmChat;
use crate::llm::types::{ChatOptions, LlmError, Message};

const DEFAULT_OPTIMIZE_MAX_TOKENS: u32 = 4096;
const DEFAULT_OPTIMIZE_TEMPERATURE: f32 = 0.2;
const DEFAULT_OPTIMIZE_TIMEOUT_SECS: u64 = 150;

const XML_DECLARATION: &str = "<?xml";
const CODE_FENCE: &str = "```";

const SYSTEM_PROMPT: &str = "You are a BPMN process optimization expert. Analyze the BPMN 2.0 diagram XML \
provided by the user and:
1. Identify the process elements (activities, events, gateways) and how they connect.
2. Find bottlenecks, redundant steps, and activities that could run in parallel.
3. Produce an optimized version of the process that keeps its business rules intact.

Respond with a single JSON object and nothing else, using exactly this shape:
{
  \"suggestions\": [\"short, concrete improvement\", \"...\"],
  \"optimizedMarkup\": \"complete BPMN 2.0 XML\"
}

Rules for optimizedMarkup:
- It must be a complete document that starts with an XML declaration (<?xml ...?>).
- Its root element must be bpmn:definitions, including diagram interchange (bpmndi) shapes and edges \
for every element so it can be rendered.
- Do not wrap the JSON in markdown.";

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OptimizationError {
    #[error("optimizer not configured")]
    NotConfigured,
    #[error("no markup to optimize")]
    EmptyInput,
    #[error("optimization service unavailable: {0}")]
    Unavailable(#[from] LlmError),
    #[error("optimization timed out after {0}s")]
    TimedOut(u64),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("invalid markup: {0}")]
    InvalidMarkup(String),
    #[error("no suggestions")]
    NoSuggestions,
}

impl ErrorCode for OptimizationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "E_OPTIMIZER_NOT_CONFIGURED",
            Self::EmptyInput => "E_EMPTY_INPUT",
            Self::Unavailable(_) => "E_OPTIMIZER_UNAVAILABLE",
            Self::TimedOut(_) => "E_OPTIMIZER_TIMEOUT",
            Self::MalformedResponse(_) => "E_MALFORMED_RESPONSE",
            Self::InvalidMarkup(_) => "E_INVALID_MARKUP",
            Self::NoSuggestions => "E_NO_SUGGESTIONS",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Unavailable(e) if e.retryable()) || matches!(self, Self::TimedOut(_))
    }
}

/// Validated, sanitized output of one optimization call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub suggestions: Vec<String>,
    pub optimized_markup: String,
}

/// Generation controls for the optimizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizeSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for OptimizeSettings {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_OPTIMIZE_MAX_TOKENS,
            temperature: DEFAULT_OPTIMIZE_TEMPERATURE,
            timeout: Duration::from_secs(DEFAULT_OPTIMIZE_TIMEOUT_SECS),
        }
    }
}

impl OptimizeSettings {
    /// Read `OPTIMIZE_MAX_TOKENS`, `OPTIMIZE_TEMPERATURE` and
    /// `OPTIMIZE_TIMEOUT_SECS`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_tokens: env_parse("OPTIMIZE_MAX_TOKENS", DEFAULT_OPTIMIZE_MAX_TOKENS),
            temperature: env_parse("OPTIMIZE_TEMPERATURE", DEFAULT_OPTIMIZE_TEMPERATURE),
            timeout: Duration::from_secs(env_parse("OPTIMIZE_TIMEOUT_SECS", DEFAULT_OPTIMIZE_TIMEOUT_SECS)),
        }
    }
}

// =============================================================================
// OPTIMIZER TRAIT
// =============================================================================

/// Capability that turns diagram markup into a suggested improvement.
#[async_trait::async_trait]
pub trait Optimizer: Send + Sync {
    /// # Errors
    ///
    /// Returns an [`OptimizationError`] if the generator is unreachable or its
    /// output fails parsing or validation.
    async fn optimize(&self, markup: &str) -> Result<OptimizationResult, OptimizationError>;
}

/// [`Optimizer`] backed by an LLM chat capability.
pub struct LlmOptimizer {
    llm: Arc<dyn LlmChat>,
    settings: OptimizeSettings,
}

impl LlmOptimizer {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmChat>, settings: OptimizeSettings) -> Self {
        Self { llm, settings }
    }
}

#[async_trait::async_trait]
impl Optimizer for LlmOptimizer {
    async fn optimize(&self, markup: &str) -> Result<OptimizationResult, OptimizationError> {
        if markup.trim().is_empty() {
            return Err(OptimizationError::EmptyInput);
        }
        info!(markup_len = markup.len(), "optimize: request");

        let options = ChatOptions {
            max_tokens: self.settings.max_tokens,
            temperature: Some(self.settings.temperature),
            json_object: true,
        };
        let messages = [Message::user(build_user_message(markup))];
        let call = self.llm.chat(options, SYSTEM_PROMPT, &messages);
        let response = tokio::time::timeout(self.settings.timeout, call)
            .await
            .map_err(|_| OptimizationError::TimedOut(self.settings.timeout.as_secs()))??;

        info!(
            model = %response.model,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            stop_reason = %response.stop_reason,
            "optimize: response received"
        );
        if response.stop_reason == "max_tokens" {
            warn!(max_tokens = self.settings.max_tokens, "optimize: response truncated at token limit");
        }

        let payload = response.text();
        parse_optimization(&payload).inspect_err(|e| {
            warn!(error = %e, payload_len = payload.len(), "optimize: rejected generator output");
        })
    }
}

fn build_user_message(markup: &str) -> String {
    format!("Optimize the following BPMN process.\n\n<process_markup>\n{markup}\n</process_markup>")
}

// =============================================================================
// PIPELINE
// =============================================================================

#[derive(Deserialize)]
struct RawOptimization {
    #[serde(default, alias = "vorschlaege")]
    suggestions: Option<Vec<String>>,
    #[serde(default, rename = "optimizedMarkup", alias = "optimized_markup", alias = "optimized_bpmn")]
    optimized_markup: Option<String>,
}

/// Run the full parse → validate → sanitize pipeline over a generator payload.
///
/// # Errors
///
/// Returns `MalformedResponse`, `InvalidMarkup` or `NoSuggestions` depending on
/// the first stage that rejects the payload.
pub fn parse_optimization(payload: &str) -> Result<OptimizationResult, OptimizationError> {
    let raw = decode_payload(payload)?;

    let markup = raw.optimized_markup.unwrap_or_default();
    validate_markup(&markup)?;
    let suggestions = validate_suggestions(raw.suggestions)?;

    let optimized_markup = sanitize_markup(&markup);
    if !optimized_markup.starts_with(XML_DECLARATION) {
        return Err(OptimizationError::InvalidMarkup("content precedes the XML declaration".into()));
    }

    Ok(OptimizationResult { suggestions, optimized_markup })
}

/// Bare JSON wins; fence extraction only runs when the payload as a whole is
/// not a JSON object, so backticks inside string values survive.
fn decode_payload(payload: &str) -> Result<RawOptimization, OptimizationError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(OptimizationError::MalformedResponse("empty response".into()));
    }
    if let Ok(raw) = serde_json::from_str::<RawOptimization>(trimmed) {
        return Ok(raw);
    }

    let body = strip_code_fence(trimmed);
    if body.is_empty() {
        return Err(OptimizationError::MalformedResponse("empty response".into()));
    }
    serde_json::from_str(body).map_err(|e| OptimizationError::MalformedResponse(e.to_string()))
}

/// Return the body of the first fenced code block, or the trimmed input when
/// there is no fence. A missing closing fence keeps everything after the opener.
pub fn strip_code_fence(payload: &str) -> &str {
    let trimmed = payload.trim();
    let Some(open) = trimmed.find(CODE_FENCE) else {
        return trimmed;
    };

    // Skip the info string (`json`, `xml`, ...) after the opening fence.
    let after_open = &trimmed[open + CODE_FENCE.len()..];
    let body = after_open.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    match body.rfind(CODE_FENCE) {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

fn validate_markup(markup: &str) -> Result<(), OptimizationError> {
    if markup.trim().is_empty() {
        return Err(OptimizationError::InvalidMarkup("markup is empty".into()));
    }
    if !markup.contains(XML_DECLARATION) {
        return Err(OptimizationError::InvalidMarkup("missing XML declaration".into()));
    }
    if !has_definitions_root(markup) {
        return Err(OptimizationError::InvalidMarkup("missing definitions root element".into()));
    }
    Ok(())
}

/// True for `<definitions` or a prefixed `<ns:definitions`.
fn has_definitions_root(markup: &str) -> bool {
    if markup.contains("<definitions") {
        return true;
    }
    markup.match_indices(":definitions").any(|(idx, _)| {
        let head = &markup[..idx];
        head.rfind('<').is_some_and(|lt| {
            let prefix = &head[lt + 1..];
            !prefix.is_empty() && prefix.chars().all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        })
    })
}

fn validate_suggestions(suggestions: Option<Vec<String>>) -> Result<Vec<String>, OptimizationError> {
    let suggestions = suggestions.unwrap_or_default();
    if suggestions.is_empty() || suggestions.iter().any(|s| s.trim().is_empty()) {
        return Err(OptimizationError::NoSuggestions);
    }
    Ok(suggestions
        .into_iter()
        .map(|s| s.trim().to_owned())
        .collect())
}

/// Trim, undo literal `\n` / `\"` / `\\` escapes left by double encoding, and
/// drop whitespace ahead of the XML declaration.
#[must_use]
pub fn sanitize_markup(markup: &str) -> String {
    unescape_literals(markup.trim()).trim().to_owned()
}

fn unescape_literals(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('n') => out.push('\n'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            _ => {
                out.push(c);
                continue;
            }
        }
        chars.next();
    }
    out
}

#[cfg(test)]
#[path = "optimize_test.rs"]
mod tests;
