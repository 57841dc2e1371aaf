use crate::store::WorkflowKind;
use std::path::PathBuf;
use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("deal not found: {0}")]
    DealNotFound(String),

    #[error("deal already exists: {0}")]
    DuplicateDeal(String),

    #[error("unknown workflow kind '{0}' (expected cma, feasibility, due_diligence or reno)")]
    UnknownWorkflowKind(String),

    #[error("deal {deal_id} has no {kind} document yet; run the workflow first")]
    NoDocument { deal_id: String, kind: WorkflowKind },

    #[error("{kind} external call failed: {message}")]
    ExternalCall { kind: WorkflowKind, message: String },

    #[error("{kind} inputs changed while the external call was running ({reason}); result discarded, re-run")]
    StaleInput { kind: WorkflowKind, reason: String },

    #[error("invalid {kind} input: {message}")]
    InvalidInput { kind: WorkflowKind, message: String },

    #[error("{0} does not accept uploaded results")]
    UploadNotAccepted(WorkflowKind),

    #[error("corrupt record {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl StoreError {
    /// Whether the same request may succeed if simply retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ExternalCall { .. } | StoreError::StaleInput { .. }
        )
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Storage(err.into())
    }
}
