//! Append-only audit trail per deal.
//!
//! Every mutating operation appends one line to `history.jsonl`, whether it
//! succeeded or not, so a deal's sign-off trail can be reconstructed.
use super::{DealPaths, WorkflowKind, HISTORY_SCHEMA_VERSION};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Create,
    SaveInput,
    Run,
    Upload,
    Approve,
    Unapprove,
    Recover,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub schema_version: u32,
    pub at: DateTime<Utc>,
    pub action: HistoryAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<WorkflowKind>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_revision: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HistoryEntry {
    pub(crate) fn new(action: HistoryAction, kind: Option<WorkflowKind>) -> Self {
        Self {
            schema_version: HISTORY_SCHEMA_VERSION,
            at: Utc::now(),
            action,
            kind,
            success: true,
            version: None,
            input_revision: None,
            duration_ms: None,
            message: None,
        }
    }

    pub(crate) fn failed(mut self, message: impl Into<String>) -> Self {
        self.success = false;
        self.message = Some(message.into());
        self
    }
}

/// Append a history entry as JSONL.
pub(crate) fn append_history(paths: &DealPaths, entry: &HistoryEntry) -> Result<()> {
    let path = paths.history_path();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    let mut line = serde_json::to_string(entry).context("serialize history entry")?;
    line.push('\n');
    file.write_all(line.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Load a deal's history, oldest first. Unreadable lines are skipped.
pub fn read_history(paths: &DealPaths) -> Result<Vec<HistoryEntry>> {
    let path = paths.history_path();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(&path).with_context(|| format!("open {}", path.display()))?;
    let mut entries = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read line {} of {}", idx + 1, path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(err) => warn!(path = %path.display(), line = idx + 1, %err, "skip corrupt history entry"),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_appends_and_skips_torn_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = DealPaths::new(dir.path().to_path_buf());
        append_history(&paths, &HistoryEntry::new(HistoryAction::Create, None)).unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(paths.history_path())
            .unwrap()
            .write_all(b"{\"schema_version\":1,\"at\"\n")
            .unwrap();
        let failed = HistoryEntry::new(HistoryAction::Run, Some(WorkflowKind::Cma))
            .failed("reasoner unavailable");
        append_history(&paths, &failed).unwrap();

        let entries = read_history(&paths).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, HistoryAction::Create);
        assert!(!entries[1].success);
        assert_eq!(entries[1].kind, Some(WorkflowKind::Cma));
    }
}
