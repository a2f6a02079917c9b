//! OpenAI-compatible API client.
//!
//! Supports both `/v1/chat/completions` and `/v1/responses` endpoints. Request
//! building and response parsing are pure functions so they can be tested
//! without a network.

use serde::Serialize;
use serde_json::Value;

use super::config::{LlmTimeouts, OpenAiApiMode};
use super::types::{ChatOptions, ChatResponse, ContentBlock, LlmError, Message};

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    mode: OpenAiApiMode,
}

impl OpenAiClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_key: String,
        mode: OpenAiApiMode,
        base_url: String,
        timeouts: LlmTimeouts,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(timeouts.request)
            .connect_timeout(timeouts.connect)
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key, base_url: base_url.trim_end_matches('/').to_string(), mode })
    }

    /// # Errors
    ///
    /// Returns an error on transport failure, non-200 status, or an unparsable body.
    pub async fn chat(
        &self,
        model: &str,
        options: ChatOptions,
        system: &str,
        messages: &[Message],
    ) -> Result<ChatResponse, LlmError> {
        match self.mode {
            OpenAiApiMode::ChatCompletions => {
                let msgs = build_chat_completions_messages(system, messages);
                let body = build_cc_request(model, options, &msgs);
                let text = self.send_json("/chat/completions", &body).await?;
                parse_chat_completions_response(&text)
            }
            OpenAiApiMode::Responses => {
                let input = build_responses_input(messages);
                let body = build_resp_request(model, options, system, &input);
                let text = self.send_json("/responses", &body).await?;
                parse_responses_response(&text)
            }
        }
    }

    async fn send_json(&self, path: &str, body: &impl Serialize) -> Result<String, LlmError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        if status != 200 {
            return Err(LlmError::ApiResponse { status, body: text });
        }
        Ok(text)
    }
}

// =============================================================================
// CHAT COMPLETIONS WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct CcRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: &'a [CcMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct CcMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

const JSON_OBJECT_FORMAT: ResponseFormat = ResponseFormat { format_type: "json_object" };

fn build_cc_request<'a>(model: &'a str, options: ChatOptions, messages: &'a [CcMessage]) -> CcRequest<'a> {
    CcRequest {
        model,
        max_tokens: options.max_tokens,
        temperature: options.temperature,
        messages,
        response_format: options.json_object.then_some(JSON_OBJECT_FORMAT),
    }
}

fn build_chat_completions_messages(system: &str, messages: &[Message]) -> Vec<CcMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if !system.trim().is_empty() {
        out.push(CcMessage { role: "system".to_string(), content: system.to_string() });
    }
    out.extend(
        messages
            .iter()
            .map(|message| CcMessage { role: message.role.clone(), content: message.content.clone() }),
    );
    out
}

// =============================================================================
// RESPONSES WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct RespRequest<'a> {
    model: &'a str,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    instructions: &'a str,
    input: &'a [RespInputItem],
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<RespTextConfig>,
}

#[derive(Serialize)]
struct RespTextConfig {
    format: ResponseFormat,
}

#[derive(Serialize)]
struct RespInputItem {
    #[serde(rename = "type")]
    item_type: &'static str,
    role: String,
    content: Vec<RespTextContent>,
}

#[derive(Serialize)]
struct RespTextContent {
    #[serde(rename = "type")]
    content_type: &'static str,
    text: String,
}

fn build_resp_request<'a>(
    model: &'a str,
    options: ChatOptions,
    system: &'a str,
    input: &'a [RespInputItem],
) -> RespRequest<'a> {
    RespRequest {
        model,
        max_output_tokens: options.max_tokens,
        temperature: options.temperature,
        instructions: system,
        input,
        text: options
            .json_object
            .then_some(RespTextConfig { format: JSON_OBJECT_FORMAT }),
    }
}

fn build_responses_input(messages: &[Message]) -> Vec<RespInputItem> {
    messages
        .iter()
        .map(|message| RespInputItem {
            item_type: "message",
            role: message.role.clone(),
            content: vec![RespTextContent { content_type: "input_text", text: message.content.clone() }],
        })
        .collect()
}

// =============================================================================
// RESPONSE PARSING
// =============================================================================

pub(crate) fn parse_chat_completions_response(json_text: &str) -> Result<ChatResponse, LlmError> {
    let root: Value = serde_json::from_str(json_text).map_err(|e| LlmError::ApiParse(e.to_string()))?;
    let model = root
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default();
    let prompt_tokens = root
        .get("usage")
        .and_then(|u| u.get("prompt_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let completion_tokens = root
        .get("usage")
        .and_then(|u| u.get("completion_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let Some(choice) = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
    else {
        return Err(LlmError::ApiParse("chat_completions: missing choices[0]".to_string()));
    };
    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .unwrap_or("stop");

    let mut content = Vec::new();
    if let Some(text) = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
    {
        if !text.is_empty() {
            content.push(ContentBlock::Text { text: text.to_string() });
        }
    }

    let stop_reason = if finish_reason == "length" { "max_tokens" } else { "end_turn" };

    Ok(ChatResponse {
        content,
        model,
        stop_reason: stop_reason.to_string(),
        input_tokens: prompt_tokens,
        output_tokens: completion_tokens,
    })
}

pub(crate) fn parse_responses_response(json_text: &str) -> Result<ChatResponse, LlmError> {
    let root: Value = serde_json::from_str(json_text).map_err(|e| LlmError::ApiParse(e.to_string()))?;
    let model = root
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default();
    let input_tokens = root
        .get("usage")
        .and_then(|u| u.get("input_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let output_tokens = root
        .get("usage")
        .and_then(|u| u.get("output_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let mut content = Vec::new();
    if let Some(items) = root.get("output").and_then(Value::as_array) {
        for item in items {
            if item.get("type").and_then(Value::as_str) != Some("message") {
                continue;
            }
            let Some(parts) = item.get("content").and_then(Value::as_array) else {
                continue;
            };
            for part in parts {
                let kind = part.get("type").and_then(Value::as_str);
                let text = part
                    .get("text")
                    .or_else(|| part.get("output_text"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if matches!(kind, Some("output_text" | "text")) && !text.is_empty() {
                    content.push(ContentBlock::Text { text: text.to_string() });
                }
            }
        }
    } else if let Some(output_text) = root.get("output_text").and_then(Value::as_str) {
        if !output_text.is_empty() {
            content.push(ContentBlock::Text { text: output_text.to_string() });
        }
    }

    let stop_reason = if root
        .get("incomplete_details")
        .and_then(|d| d.get("reason"))
        .and_then(Value::as_str)
        == Some("max_output_tokens")
    {
        "max_tokens"
    } else {
        "end_turn"
    };

    Ok(ChatResponse { content, model, stop_reason: stop_reason.to_string(), input_tokens, output_tokens })
}

#[cfg(test)]
#[path = "openai_test.rs"]
mod tests;
