//! Reasoning and vision collaborators.
//!
//! The store never talks to a model directly: pipelines receive a
//! [`Reasoner`] and a [`VisionExtractor`] and the backend is picked from
//! configuration. Three backends exist:
//!
//! - `command`: any local tool that reads a prompt on stdin and prints a reply
//!   on stdout (`llm`, `ollama run`, a wrapper script, a test mock)
//! - `anthropic`: the Messages API
//! - `gemini`: `generateContent`, used for listing photos
//!
//! Every call through a configured backend is appended to `lm_log.jsonl`.
mod anthropic;
mod command;
mod gemini;
mod log;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub use anthropic::{AnthropicClient, DEFAULT_ANTHROPIC_MODEL};
pub use command::CommandLm;
pub use gemini::{GeminiClient, DEFAULT_GEMINI_MODEL};
pub use log::{load_lm_log, LmLog, LmLogEntry, LmOperation, LmOutcome, Logged};

/// Retries after the first reply when a reply that should be JSON is not.
pub const MAX_LM_RETRIES: usize = 2;

/// Photos beyond this count are not sent to the vision model.
pub const MAX_VISION_PHOTOS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Text reasoning model.
pub trait Reasoner {
    /// Multi-turn conversation; returns the assistant's reply text.
    fn chat(&self, system_prompt: &str, messages: &[ChatMessage]) -> Result<String>;

    /// Single request whose reply must be a JSON value.
    ///
    /// Unparseable replies are retried with the parse error fed back, up to
    /// [`MAX_LM_RETRIES`] times.
    fn reason(&self, system_prompt: &str, user_message: &str) -> Result<Value> {
        reason_with_retries(self, system_prompt, user_message)
    }
}

/// Vision model that turns listing photos into structured property facts.
pub trait VisionExtractor {
    fn extract(&self, photos: &[PathBuf], instructions: &str, address: &str) -> Result<Value>;
}

pub(crate) fn reason_with_retries<R: Reasoner + ?Sized>(
    reasoner: &R,
    system_prompt: &str,
    user_message: &str,
) -> Result<Value> {
    let mut messages = vec![ChatMessage::user(user_message)];
    let mut last_error = String::new();
    for attempt in 0..=MAX_LM_RETRIES {
        if attempt > 0 {
            tracing::warn!(attempt, max = MAX_LM_RETRIES, error = %last_error, "retrying unparseable LM reply");
        }
        let reply = reasoner.chat(system_prompt, &messages)?;
        match parse_json_reply(&reply) {
            Ok(value) => return Ok(value),
            Err(err) => {
                last_error = err.to_string();
                messages.push(ChatMessage::assistant(reply));
                messages.push(ChatMessage::user(format!(
                    "Your previous response could not be parsed as JSON: {last_error}\n\
                     Respond ONLY with the corrected JSON object, no other text."
                )));
            }
        }
    }
    Err(anyhow!(
        "LM reply was not valid JSON after {} attempts: {last_error}",
        MAX_LM_RETRIES + 1
    ))
}

/// Parse a reply that should be JSON, tolerating markdown fences and prose
/// around a single object.
pub fn parse_json_reply(text: &str) -> Result<Value> {
    let json_text = extract_json(text);
    if json_text.is_empty() {
        return Err(anyhow!("empty response"));
    }
    match serde_json::from_str(json_text) {
        Ok(value) => Ok(value),
        Err(err) => {
            let (start, end) = (json_text.find('{'), json_text.rfind('}'));
            if let (Some(start), Some(end)) = (start, end) {
                if start < end {
                    if let Ok(value) = serde_json::from_str(&json_text[start..=end]) {
                        return Ok(value);
                    }
                }
            }
            Err(anyhow!(
                "parse LM response as JSON: {err} (first 200 chars: {})",
                crate::util::truncate_string(text, 200)
            ))
        }
    }
}

/// Extract JSON from text that might have markdown code fences.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let start = start + 3;
        // Skip language identifier if present
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    text
}

pub(crate) fn image_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Scripted {
        replies: RefCell<Vec<String>>,
        seen: RefCell<Vec<usize>>,
    }

    impl Reasoner for Scripted {
        fn chat(&self, _system_prompt: &str, messages: &[ChatMessage]) -> Result<String> {
            self.seen.borrow_mut().push(messages.len());
            Ok(self.replies.borrow_mut().remove(0))
        }
    }

    #[test]
    fn extract_json_handles_fences() {
        assert_eq!(extract_json(r#"{"a": 1}"#), r#"{"a": 1}"#);
        assert_eq!(
            extract_json("Here you go:\n```json\n{\"a\": 1}\n```\n"),
            r#"{"a": 1}"#
        );
        assert_eq!(extract_json("```\n{\"a\": 1}\n```"), r#"{"a": 1}"#);
    }

    #[test]
    fn parse_json_reply_finds_object_inside_prose() {
        let value = parse_json_reply("Sure! {\"go_no_go\": \"GO\"} Hope that helps.").unwrap();
        assert_eq!(value["go_no_go"], "GO");
        assert!(parse_json_reply("no json here").is_err());
        assert!(parse_json_reply("   ").is_err());
    }

    #[test]
    fn reason_retries_with_the_parse_error_in_context() {
        let scripted = Scripted {
            replies: RefCell::new(vec!["not json".to_string(), "{\"ok\": true}".to_string()]),
            seen: RefCell::new(Vec::new()),
        };
        let value = scripted.reason("system", "question").unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(*scripted.seen.borrow(), vec![1, 3]);
    }

    #[test]
    fn reason_gives_up_after_max_retries() {
        let scripted = Scripted {
            replies: RefCell::new(vec!["nope".to_string(); MAX_LM_RETRIES + 1]),
            seen: RefCell::new(Vec::new()),
        };
        let err = scripted.reason("system", "question").unwrap_err();
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[test]
    fn image_mime_type_defaults_to_jpeg() {
        assert_eq!(image_mime_type(Path::new("a.PNG")), "image/png");
        assert_eq!(image_mime_type(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(image_mime_type(Path::new("a")), "image/jpeg");
    }
}
