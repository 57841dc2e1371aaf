//! Gemini `generateContent` backend. Used for photo extraction, and usable
//! as a reasoner.
use super::{
    image_mime_type, parse_json_reply, ChatMessage, Reasoner, Role, VisionExtractor,
    MAX_VISION_PHOTOS,
};
use crate::util::truncate_string;
use anyhow::{anyhow, Context, Result};
use base64::Engine;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    agent: ureq::Agent,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: Option<String>, timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        }
    }

    fn generate(&self, body: &Value) -> Result<String> {
        let url = format!("{BASE_URL}/models/{}:generateContent", self.model);
        let mut response = self
            .agent
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .send_json(body)
            .with_context(|| format!("POST {url}"))?;
        let status = response.status();
        let text = response
            .body_mut()
            .read_to_string()
            .context("read Gemini response body")?;
        if !status.is_success() {
            return Err(anyhow!(
                "Gemini API returned {}: {}",
                status.as_u16(),
                truncate_string(&text, 500)
            ));
        }
        let value: Value = serde_json::from_str(&text).context("parse Gemini response")?;
        response_text(&value)
    }
}

impl Reasoner for GeminiClient {
    fn chat(&self, system_prompt: &str, messages: &[ChatMessage]) -> Result<String> {
        let contents: Vec<Value> = messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect();
        let body = json!({
            "systemInstruction": {"parts": [{"text": system_prompt}]},
            "contents": contents,
        });
        self.generate(&body)
    }
}

impl VisionExtractor for GeminiClient {
    fn extract(&self, photos: &[PathBuf], instructions: &str, address: &str) -> Result<Value> {
        let body = vision_request(photos, instructions, address)?;
        let reply = self.generate(&body)?;
        parse_json_reply(&reply)
    }
}

fn vision_request(photos: &[PathBuf], instructions: &str, address: &str) -> Result<Value> {
    if photos.len() > MAX_VISION_PHOTOS {
        tracing::warn!(
            photos = photos.len(),
            sent = MAX_VISION_PHOTOS,
            "too many photos; sending the first ones only"
        );
    }
    let mut parts = vec![
        json!({"text": instructions}),
        json!({"text": format!("Property address: {address}")}),
    ];
    for photo in photos.iter().take(MAX_VISION_PHOTOS) {
        let bytes = fs::read(photo).with_context(|| format!("read photo {}", photo.display()))?;
        parts.push(json!({
            "inline_data": {
                "mime_type": image_mime_type(photo),
                "data": base64::engine::general_purpose::STANDARD.encode(bytes),
            }
        }));
    }
    parts.push(json!({
        "text": "Respond ONLY with valid JSON matching the schema above. No markdown fences."
    }));
    Ok(json!({
        "contents": [{"role": "user", "parts": parts}],
        "generationConfig": {"responseMimeType": "application/json"},
    }))
}

fn response_text(response: &Value) -> Result<String> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Gemini response has no candidates"))?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        return Err(anyhow!("Gemini response has no text parts"));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vision_request_inlines_photos_between_prompt_and_footer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let photo = dir.path().join("front.png");
        fs::write(&photo, b"png").unwrap();

        let body = vision_request(&[photo], "Describe the house.", "42 Smith St").unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1]["text"], "Property address: 42 Smith St");
        assert_eq!(parts[2]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[2]["inline_data"]["data"], "cG5n");
    }

    #[test]
    fn vision_request_caps_photo_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let photos: Vec<PathBuf> = (0..MAX_VISION_PHOTOS + 5)
            .map(|i| {
                let path = dir.path().join(format!("{i}.jpg"));
                fs::write(&path, b"x").unwrap();
                path
            })
            .collect();
        let body = vision_request(&photos, "x", "y").unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), MAX_VISION_PHOTOS + 3);
    }

    #[test]
    fn missing_photo_is_an_error() {
        let err = vision_request(&[PathBuf::from("/nonexistent/a.jpg")], "x", "y").unwrap_err();
        assert!(err.to_string().contains("read photo"));
    }

    #[test]
    fn response_text_reads_first_candidate() {
        let response = json!({"candidates": [{"content": {"parts": [{"text": "{}"}]}}]});
        assert_eq!(response_text(&response).unwrap(), "{}");
        assert!(response_text(&json!({})).is_err());
    }
}
