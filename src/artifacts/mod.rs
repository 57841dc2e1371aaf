//! Artifact sets produced from a workflow result.
//!
//! Every set carries the raw result as JSON plus human-facing reports (CSV
//! for spreadsheets, markdown for summaries). Approval status is never
//! written into an artifact; it lives only in the document pointer.
mod cma;
mod due_diligence;
mod feasibility;
mod format;
mod reno;

use crate::store::{Deal, WorkflowKind};
use anyhow::{Context, Result};
use serde_json::Value;

/// One file of an artifact set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Stable key in the document's artifact map.
    pub name: String,
    /// Path relative to the version directory.
    pub file: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, file: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            bytes,
        }
    }

    fn text(name: impl Into<String>, file: impl Into<String>, text: String) -> Self {
        Self::new(name, file, text.into_bytes())
    }

    fn json(name: impl Into<String>, file: impl Into<String>, value: &Value) -> Result<Self> {
        let mut bytes = serde_json::to_vec_pretty(value).context("serialize result artifact")?;
        bytes.push(b'\n');
        Ok(Self::new(name, file, bytes))
    }
}

/// Turns a workflow result into the files of one artifact set.
pub trait ArtifactRenderer: Send + Sync {
    fn render(&self, kind: WorkflowKind, deal: &Deal, result: &Value) -> Result<Vec<Artifact>>;
}

/// The report formats shipped with the tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRenderer;

impl ArtifactRenderer for StandardRenderer {
    fn render(&self, kind: WorkflowKind, deal: &Deal, result: &Value) -> Result<Vec<Artifact>> {
        match kind {
            WorkflowKind::Cma => cma::render(deal, result),
            WorkflowKind::Feasibility => feasibility::render(deal, result),
            WorkflowKind::DueDiligence => due_diligence::render(deal, result),
            WorkflowKind::Reno => reno::render(result),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::store::{Deal, DealRecord};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    pub(crate) fn deal(address: &str) -> Deal {
        Deal {
            record: DealRecord {
                schema_version: 1,
                id: "20260301-090000_test".to_string(),
                address: address.to_string(),
                listing_url: "https://example.com/listing/1".to_string(),
                state: "NSW".to_string(),
                council: "Inner West".to_string(),
                notes: String::new(),
                created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            },
            root: PathBuf::from("/nonexistent"),
            inputs: BTreeMap::new(),
            documents: BTreeMap::new(),
        }
    }
}
