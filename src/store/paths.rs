//! Typed paths into the deal store layout.
//!
//! Every file the store touches is derived here so the on-disk layout has a
//! single definition.
use super::WorkflowKind;
use std::path::{Path, PathBuf};

/// Paths rooted at the store directory that holds every deal.
#[derive(Debug, Clone)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the optional `config.json` path.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Return the `.locks/` directory path.
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join(".locks")
    }

    /// Return the advisory lock file for one deal.
    pub fn lock_path(&self, deal_id: &str) -> PathBuf {
        self.locks_dir().join(format!("{deal_id}.lock"))
    }

    /// Return the `lm_log.jsonl` path.
    pub fn lm_log_path(&self) -> PathBuf {
        self.root.join("lm_log.jsonl")
    }

    /// Return the temporary directory a deal is assembled in before it appears.
    pub fn creating_dir(&self, deal_id: &str) -> PathBuf {
        self.root.join(format!(".creating-{deal_id}"))
    }

    pub fn deal(&self, deal_id: &str) -> DealPaths {
        DealPaths::new(self.root.join(deal_id))
    }
}

/// Paths inside a single deal directory.
#[derive(Debug, Clone)]
pub struct DealPaths {
    root: PathBuf,
}

impl DealPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the `deal.json` metadata path.
    pub fn record_path(&self) -> PathBuf {
        self.root.join("deal.json")
    }

    /// Return the `history.jsonl` path.
    pub fn history_path(&self) -> PathBuf {
        self.root.join("history.jsonl")
    }

    /// Return the `inputs/photos/` directory path.
    pub fn photos_dir(&self) -> PathBuf {
        self.root.join("inputs").join("photos")
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.root.join("workflows")
    }

    pub fn workflow_dir(&self, kind: WorkflowKind) -> PathBuf {
        self.workflows_dir().join(kind.as_str())
    }

    /// Return the per-workflow `inputs.json` path.
    pub fn inputs_path(&self, kind: WorkflowKind) -> PathBuf {
        self.workflow_dir(kind).join("inputs.json")
    }

    /// Return the per-workflow `document.json` pointer path.
    pub fn document_path(&self, kind: WorkflowKind) -> PathBuf {
        self.workflow_dir(kind).join("document.json")
    }

    pub fn versions_dir(&self, kind: WorkflowKind) -> PathBuf {
        self.workflow_dir(kind).join("versions")
    }

    pub fn version_dir(&self, kind: WorkflowKind, version: u64) -> PathBuf {
        self.versions_dir(kind).join(version.to_string())
    }

    /// Artifact path relative to the deal root, as recorded in documents.
    pub fn artifact_rel(&self, kind: WorkflowKind, version: u64, file: &str) -> String {
        format!("workflows/{}/versions/{version}/{file}", kind.as_str())
    }

    /// Return the `txns/` directory path.
    pub fn txns_root(&self) -> PathBuf {
        self.root.join("txns")
    }

    pub fn txn_root(&self, txn_id: &str) -> PathBuf {
        self.txns_root().join(txn_id)
    }

    /// Return the per-transaction staging directory path.
    pub fn txn_staging_root(&self, txn_id: &str) -> PathBuf {
        self.txn_root(txn_id).join("staging")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_rel_matches_version_dir_layout() {
        let store = StorePaths::new(PathBuf::from("/deals"));
        let deal = store.deal("20240101-000000_42-smith-st");
        let rel = deal.artifact_rel(WorkflowKind::DueDiligence, 3, "dd_report.csv");
        assert_eq!(rel, "workflows/due_diligence/versions/3/dd_report.csv");
        assert_eq!(
            deal.root().join(&rel),
            deal.version_dir(WorkflowKind::DueDiligence, 3)
                .join("dd_report.csv")
        );
    }
}
