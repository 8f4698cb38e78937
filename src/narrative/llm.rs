//! OpenAI-compatible chat completion client.
//!
//! Only `POST {base}/chat/completions` is used. Providers disagree on where
//! the text lives in the response, so extraction accepts a plain `text` on
//! the choice, a string `message.content`, or a list of content parts.

use crate::config::LlmConfig;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("orgmap/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Errors from one completion call.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Key rejected (401 or 403)
    #[error("LLM API rejected the key: HTTP {0}")]
    Unauthorized(u16),

    /// Transport failure or non-success status
    #[error("LLM request failed: {0}")]
    Http(String),

    /// Response body was not the expected JSON
    #[error("Failed to parse LLM response: {0}")]
    Parse(String),

    /// Completion carried no text
    #[error("LLM returned an empty completion (finish_reason={0})")]
    EmptyResponse(String),
}

impl ChatError {
    /// Short machine-friendly tag, used to count fallback reasons.
    pub fn reason(&self) -> &'static str {
        match self {
            ChatError::Unauthorized(_) => "unauthorized",
            ChatError::Http(_) => "http",
            ChatError::Parse(_) => "parse",
            ChatError::EmptyResponse(reason) if reason == "length" => "token_limit_no_content",
            ChatError::EmptyResponse(_) => "empty_response",
        }
    }
}

/// One chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Text and finish reason of the first choice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatCompletion {
    pub text: String,
    pub finish_reason: String,
}

/// Blocking client for the configured endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    config: LlmConfig,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn body(&self, request: &ChatRequest) -> Value {
        let mut messages = Vec::new();
        if !request.system.is_empty() {
            messages.push(json!({"role": "system", "content": request.system}));
        }
        messages.push(json!({"role": "user", "content": request.user}));
        json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": false,
        })
    }

    /// Send one request. An empty completion is an error.
    pub fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, ChatError> {
        let response = ureq::post(&self.endpoint())
            .set("Authorization", &format!("Bearer {}", self.config.api_key))
            .set("Accept", "application/json")
            .set("User-Agent", USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .send_json(self.body(request));

        let body: Value = match response {
            Ok(resp) => resp
                .into_json()
                .map_err(|e| ChatError::Parse(e.to_string()))?,
            Err(ureq::Error::Status(code @ (401 | 403), _)) => {
                return Err(ChatError::Unauthorized(code));
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                let snippet: String = body.chars().take(300).collect();
                return Err(ChatError::Http(format!("HTTP {}: {}", code, snippet)));
            }
            Err(e) => return Err(ChatError::Http(e.to_string())),
        };

        let completion = extract_completion(&body)?;
        if completion.text.is_empty() {
            return Err(ChatError::EmptyResponse(completion.finish_reason));
        }
        Ok(completion)
    }
}

/// Concatenate the text found in a content node.
fn collect_text(node: &Value) -> String {
    match node {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(collect_text).collect(),
        Value::Object(map) => ["text", "value"]
            .iter()
            .filter_map(|key| map.get(*key))
            .map(collect_text)
            .collect(),
        _ => String::new(),
    }
}

/// Pull the first choice's text out of a completion body.
pub fn extract_completion(body: &Value) -> Result<ChatCompletion, ChatError> {
    let choices = body
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| ChatError::Parse("missing choices".to_string()))?;
    let Some(first) = choices.first() else {
        return Ok(ChatCompletion::default());
    };

    let finish_reason = first
        .get("finish_reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if let Some(text) = first.get("text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return Ok(ChatCompletion {
                text: text.trim().to_string(),
                finish_reason,
            });
        }
    }

    let text = first
        .get("message")
        .and_then(|m| m.get("content"))
        .map(|content| match content {
            Value::String(s) => s.clone(),
            Value::Array(_) => collect_text(content),
            _ => String::new(),
        })
        .unwrap_or_default();

    Ok(ChatCompletion {
        text: text.trim().to_string(),
        finish_reason,
    })
}
