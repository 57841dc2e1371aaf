//! Deal records, workflow documents and the store that owns them.
//!
//! A deal owns at most one input set and one approvable document per
//! workflow kind. Documents point at an immutable, versioned artifact set;
//! the pointer is the only thing a run or an approval rewrites.
mod deal_store;
mod history;
mod lock;
mod paths;
mod recovery;

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use deal_store::{CallRequest, DealStore, ExternalCall};
pub use history::{read_history, HistoryAction, HistoryEntry};
pub use lock::input_hash;
pub use paths::{DealPaths, StorePaths};
pub use recovery::RecoveryReport;

pub const DEAL_SCHEMA_VERSION: u32 = 1;
pub const DOCUMENT_SCHEMA_VERSION: u32 = 1;
pub const INPUTS_SCHEMA_VERSION: u32 = 1;
pub const HISTORY_SCHEMA_VERSION: u32 = 1;

/// Versions retained per workflow when no explicit retention is configured.
pub const DEFAULT_KEEP_VERSIONS: usize = 3;

/// The four analysis pipelines a deal can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Cma,
    Feasibility,
    DueDiligence,
    Reno,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 4] = [
        WorkflowKind::Cma,
        WorkflowKind::Feasibility,
        WorkflowKind::DueDiligence,
        WorkflowKind::Reno,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Cma => "cma",
            WorkflowKind::Feasibility => "feasibility",
            WorkflowKind::DueDiligence => "due_diligence",
            WorkflowKind::Reno => "reno",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WorkflowKind::Cma => "CMA",
            WorkflowKind::Feasibility => "Feasibility",
            WorkflowKind::DueDiligence => "Due Diligence",
            WorkflowKind::Reno => "Reno Plan",
        }
    }

    /// Kinds whose results may be produced outside the system and uploaded.
    pub fn accepts_upload(&self) -> bool {
        matches!(self, WorkflowKind::DueDiligence)
    }

    /// Workflows whose documents feed this one's external call.
    pub fn upstream(&self) -> &'static [WorkflowKind] {
        match self {
            WorkflowKind::Feasibility => &[WorkflowKind::Cma],
            _ => &[],
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "cma" => Ok(WorkflowKind::Cma),
            "feasibility" | "feas" => Ok(WorkflowKind::Feasibility),
            "due_diligence" | "dd" => Ok(WorkflowKind::DueDiligence),
            "reno" | "reno_plan" => Ok(WorkflowKind::Reno),
            _ => Err(StoreError::UnknownWorkflowKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Draft,
    Approved,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Draft => "draft",
            ApprovalStatus::Approved => "approved",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the current artifact set was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    Run,
    Upload,
}

/// Deal metadata persisted in `deal.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealRecord {
    pub schema_version: u32,
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub listing_url: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub council: String,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// Fields a user supplies when opening a new deal.
#[derive(Debug, Clone, Default)]
pub struct NewDeal {
    pub address: String,
    pub listing_url: String,
    pub state: String,
    pub council: String,
    pub notes: String,
}

impl NewDeal {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }
}

/// The input payload for one workflow, with a revision that moves only when
/// the content changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSet {
    pub schema_version: u32,
    pub revision: u64,
    pub hash: String,
    pub saved_at: DateTime<Utc>,
    pub payload: Value,
}

/// Approvable output record for one workflow of one deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub schema_version: u32,
    pub kind: WorkflowKind,
    pub status: ApprovalStatus,
    /// Artifact-set version; artifacts live under `versions/<version>/`.
    pub version: u64,
    /// Artifact name to path relative to the deal root.
    pub artifacts: BTreeMap<String, String>,
    pub result: Value,
    pub source: DocumentSource,
    /// Input revision and hash the artifacts were produced from.
    pub input_revision: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs_hash: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
}

impl WorkflowDocument {
    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }

    /// Absolute path of a named artifact.
    pub fn artifact_path(&self, deal_root: &Path, name: &str) -> Option<PathBuf> {
        self.artifacts.get(name).map(|rel| deal_root.join(rel))
    }
}

/// A deal with everything currently persisted for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deal {
    #[serde(flatten)]
    pub record: DealRecord,
    pub root: PathBuf,
    pub inputs: BTreeMap<WorkflowKind, InputSet>,
    pub documents: BTreeMap<WorkflowKind, WorkflowDocument>,
}

impl Deal {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn document(&self, kind: WorkflowKind) -> Option<&WorkflowDocument> {
        self.documents.get(&kind)
    }

    pub fn input(&self, kind: WorkflowKind) -> Option<&InputSet> {
        self.inputs.get(&kind)
    }

    pub fn status(&self, kind: WorkflowKind) -> Option<ApprovalStatus> {
        self.document(kind).map(|doc| doc.status)
    }
}

/// One row of `list_deals`.
#[derive(Debug, Clone, Serialize)]
pub struct DealSummary {
    pub id: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub photo_count: usize,
    pub statuses: BTreeMap<WorkflowKind, ApprovalStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_kind_parses_aliases_and_rejects_unknown() {
        assert_eq!("cma".parse::<WorkflowKind>().unwrap(), WorkflowKind::Cma);
        assert_eq!("DD".parse::<WorkflowKind>().unwrap(), WorkflowKind::DueDiligence);
        assert_eq!(
            "due-diligence".parse::<WorkflowKind>().unwrap(),
            WorkflowKind::DueDiligence
        );
        assert_eq!("reno".parse::<WorkflowKind>().unwrap(), WorkflowKind::Reno);
        let err = "valuation".parse::<WorkflowKind>().unwrap_err();
        assert!(matches!(err, StoreError::UnknownWorkflowKind(ref k) if k == "valuation"));
    }

    #[test]
    fn workflow_kind_round_trips_through_display() {
        for kind in WorkflowKind::ALL {
            assert_eq!(kind.to_string().parse::<WorkflowKind>().unwrap(), kind);
        }
    }

    #[test]
    fn only_due_diligence_accepts_uploads() {
        let accepting: Vec<_> = WorkflowKind::ALL
            .into_iter()
            .filter(WorkflowKind::accepts_upload)
            .collect();
        assert_eq!(accepting, vec![WorkflowKind::DueDiligence]);
    }
}
