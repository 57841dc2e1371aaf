//! Anthropic Messages API backend.
use super::{ChatMessage, Reasoner};
use crate::util::truncate_string;
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
const BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 8192;

pub struct AnthropicClient {
    agent: ureq::Agent,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: Option<String>, timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    fn request_body(&self, system_prompt: &str, messages: &[ChatMessage]) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system_prompt,
            "messages": messages,
        })
    }
}

impl Reasoner for AnthropicClient {
    fn chat(&self, system_prompt: &str, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{BASE_URL}/v1/messages");
        let mut response = self
            .agent
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send_json(self.request_body(system_prompt, messages))
            .with_context(|| format!("POST {url}"))?;
        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .context("read Anthropic response body")?;
        if !status.is_success() {
            return Err(anyhow!(
                "Anthropic API returned {}: {}",
                status.as_u16(),
                truncate_string(&body, 500)
            ));
        }
        let value: Value = serde_json::from_str(&body).context("parse Anthropic response")?;
        response_text(&value)
    }
}

fn response_text(response: &Value) -> Result<String> {
    let blocks = response
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Anthropic response has no content"))?;
    let text: String = blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        return Err(anyhow!("Anthropic response has no text blocks"));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_system_and_roles() {
        let client = AnthropicClient::new("key", None, Duration::from_secs(5));
        let body = client.request_body(
            "system text",
            &[ChatMessage::user("a"), ChatMessage::assistant("b")],
        );
        assert_eq!(body["model"], DEFAULT_ANTHROPIC_MODEL);
        assert_eq!(body["max_tokens"], 8192);
        assert_eq!(body["system"], "system text");
        assert_eq!(body["messages"][1]["role"], "assistant");
    }

    #[test]
    fn response_text_joins_text_blocks() {
        let response = json!({"content": [
            {"type": "text", "text": "{\"a\":"},
            {"type": "tool_use", "id": "x"},
            {"type": "text", "text": "1}"}
        ]});
        assert_eq!(response_text(&response).unwrap(), "{\"a\":1}");
        assert!(response_text(&json!({"content": []})).is_err());
    }
}
