//! Call log for model backends.
//!
//! Entries are appended to `<root>/lm_log.jsonl` as newline-delimited JSON:
//!
//! ```jsonl
//! {"schema_version":1,"ts":1707900000000,"backend":"anthropic","operation":"chat","duration_ms":4200,"outcome":"success",...}
//! ```
use super::{ChatMessage, Reasoner, VisionExtractor};
use crate::util::{now_epoch_ms, truncate_string};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Current schema version for lm_log.jsonl entries.
pub const LM_LOG_SCHEMA_VERSION: u32 = 1;

const PROMPT_PREVIEW_BYTES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LmOperation {
    Chat,
    Vision,
}

impl fmt::Display for LmOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Vision => write!(f, "vision"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LmOutcome {
    Success,
    Failed,
}

/// A single model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmLogEntry {
    pub schema_version: u32,

    /// Unix timestamp in milliseconds when the call finished.
    pub ts: u64,

    /// Backend name from configuration (`command`, `anthropic`, `gemini`).
    pub backend: String,

    pub operation: LmOperation,

    pub duration_ms: u64,

    pub outcome: LmOutcome,

    /// Messages in the conversation, or photos sent for vision calls.
    #[serde(default)]
    pub inputs_count: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_bytes: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// First ~500 bytes of the last user turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_preview: Option<String>,
}

/// Times one call and turns its outcome into an entry.
pub struct LmLogBuilder {
    start: Instant,
    backend: String,
    operation: LmOperation,
    inputs_count: usize,
    prompt_preview: Option<String>,
}

impl LmLogBuilder {
    pub fn new(backend: impl Into<String>, operation: LmOperation) -> Self {
        Self {
            start: Instant::now(),
            backend: backend.into(),
            operation,
            inputs_count: 0,
            prompt_preview: None,
        }
    }

    pub fn with_inputs_count(mut self, count: usize) -> Self {
        self.inputs_count = count;
        self
    }

    pub fn with_prompt_preview(mut self, prompt: &str) -> Self {
        let mut preview = truncate_string(prompt, PROMPT_PREVIEW_BYTES);
        if preview.len() < prompt.len() {
            preview.push_str("...");
        }
        self.prompt_preview = Some(preview);
        self
    }

    pub fn success(self, response_bytes: usize) -> LmLogEntry {
        self.build(LmOutcome::Success, Some(response_bytes), None)
    }

    pub fn failed(self, error: impl Into<String>) -> LmLogEntry {
        self.build(LmOutcome::Failed, None, Some(error.into()))
    }

    fn build(
        self,
        outcome: LmOutcome,
        response_bytes: Option<usize>,
        error: Option<String>,
    ) -> LmLogEntry {
        LmLogEntry {
            schema_version: LM_LOG_SCHEMA_VERSION,
            ts: now_epoch_ms()
                .ok()
                .and_then(|ms| u64::try_from(ms).ok())
                .unwrap_or_default(),
            backend: self.backend,
            operation: self.operation,
            duration_ms: u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX),
            outcome,
            inputs_count: self.inputs_count,
            response_bytes,
            error,
            prompt_preview: self.prompt_preview,
        }
    }
}

/// Append-only JSONL log file.
#[derive(Debug, Clone)]
pub struct LmLog {
    path: PathBuf,
}

impl LmLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &LmLogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("create directory for lm_log")?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open lm_log for append: {}", self.path.display()))?;
        let line = serde_json::to_string(entry).context("serialize lm_log entry")?;
        writeln!(file, "{line}").context("write lm_log entry")?;
        Ok(())
    }

    fn record(&self, entry: LmLogEntry) {
        tracing::info!(
            backend = %entry.backend,
            operation = %entry.operation,
            duration_ms = entry.duration_ms,
            ok = entry.outcome == LmOutcome::Success,
            "lm call complete"
        );
        if let Err(err) = self.append(&entry) {
            tracing::warn!(error = %format!("{err:#}"), "failed to append lm_log entry");
        }
    }
}

/// Load all entries, skipping corrupt lines.
pub fn load_lm_log(path: &Path) -> Result<Vec<LmLogEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("open lm_log: {}", path.display()))?;
    let mut entries = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read line {} of lm_log", line_num + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LmLogEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(line = line_num + 1, error = %err, "skip corrupt lm_log entry");
            }
        }
    }
    Ok(entries)
}

/// A backend whose calls are appended to an [`LmLog`].
pub struct Logged<T> {
    inner: T,
    backend: String,
    log: LmLog,
}

impl<T> Logged<T> {
    pub fn new(inner: T, backend: impl Into<String>, log: LmLog) -> Self {
        Self {
            inner,
            backend: backend.into(),
            log,
        }
    }
}

impl<T: Reasoner> Reasoner for Logged<T> {
    fn chat(&self, system_prompt: &str, messages: &[ChatMessage]) -> Result<String> {
        let last_user = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        let builder = LmLogBuilder::new(&self.backend, LmOperation::Chat)
            .with_inputs_count(messages.len())
            .with_prompt_preview(last_user);
        let result = self.inner.chat(system_prompt, messages);
        self.log.record(match &result {
            Ok(reply) => builder.success(reply.len()),
            Err(err) => builder.failed(format!("{err:#}")),
        });
        result
    }
}

impl<T: VisionExtractor> VisionExtractor for Logged<T> {
    fn extract(&self, photos: &[PathBuf], instructions: &str, address: &str) -> Result<Value> {
        let builder = LmLogBuilder::new(&self.backend, LmOperation::Vision)
            .with_inputs_count(photos.len())
            .with_prompt_preview(address);
        let result = self.inner.extract(photos, instructions, address);
        self.log.record(match &result {
            Ok(value) => builder.success(value.to_string().len()),
            Err(err) => builder.failed(format!("{err:#}")),
        });
        result
    }
}
