//! Local command backend: the whole conversation goes to stdin as one prompt
//! and stdout is the reply.
use super::{parse_json_reply, ChatMessage, Reasoner, VisionExtractor, MAX_VISION_PHOTOS};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct CommandLm {
    command: String,
}

impl CommandLm {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Reasoner for CommandLm {
    fn chat(&self, system_prompt: &str, messages: &[ChatMessage]) -> Result<String> {
        invoke_lm_command(&self.command, &render_conversation(system_prompt, messages))
    }
}

impl VisionExtractor for CommandLm {
    /// Photos are passed by path; the command decides how to attach them.
    fn extract(&self, photos: &[PathBuf], instructions: &str, address: &str) -> Result<Value> {
        let mut prompt = format!("{instructions}\n\nProperty address: {address}\n\nPhotos:\n");
        for photo in photos.iter().take(MAX_VISION_PHOTOS) {
            prompt.push_str(&format!("- {}\n", photo.display()));
        }
        prompt.push_str("\nRespond ONLY with valid JSON matching the schema above.\n");
        let reply = invoke_lm_command(&self.command, &prompt)?;
        parse_json_reply(&reply)
    }
}

fn render_conversation(system_prompt: &str, messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    if !system_prompt.trim().is_empty() {
        prompt.push_str(system_prompt.trim_end());
        prompt.push_str("\n\n");
    }
    if let [only] = messages {
        prompt.push_str(&only.content);
        return prompt;
    }
    for message in messages {
        prompt.push_str(&format!("[{}]\n{}\n\n", message.role.as_str(), message.content));
    }
    prompt
}

fn invoke_lm_command(command: &str, prompt: &str) -> Result<String> {
    let args =
        shell_words::split(command).with_context(|| format!("parse LM command: {command}"))?;
    let Some((program, rest)) = args.split_first() else {
        return Err(anyhow!("LM command is empty"));
    };

    let start = Instant::now();
    let mut child = Command::new(program)
        .args(rest)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn LM command: {program}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(prompt.as_bytes())
            .context("write prompt to LM stdin")?;
    }

    let output = child.wait_with_output().context("wait for LM command")?;
    tracing::info!(
        elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        prompt_bytes = prompt.len(),
        response_bytes = output.stdout.len(),
        "lm invoke complete"
    );

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "LM command failed with status {}: {}",
            output.status,
            stderr.trim()
        ));
    }

    String::from_utf8(output.stdout).context("decode LM stdout as UTF-8")
}
