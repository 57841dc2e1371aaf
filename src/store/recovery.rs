//! Crash recovery and version retention.
//!
//! A crash can leave a staging tree, a published version whose pointer flip
//! never happened, a temp file from an interrupted atomic write, or a deal
//! still under its `.creating-` name. None of these are reachable from a
//! pointer, so removing them never changes what a reader sees.
use super::deal_store::read_record;
use super::{DealPaths, StorePaths, WorkflowDocument, WorkflowKind};
use crate::error::StoreResult;
use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub removed_txns: Vec<PathBuf>,
    pub removed_versions: Vec<PathBuf>,
    pub removed_temp_files: Vec<PathBuf>,
    pub removed_partial_deals: Vec<PathBuf>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.removed_txns.is_empty()
            && self.removed_versions.is_empty()
            && self.removed_temp_files.is_empty()
            && self.removed_partial_deals.is_empty()
    }

    pub(crate) fn merge(&mut self, other: RecoveryReport) {
        self.removed_txns.extend(other.removed_txns);
        self.removed_versions.extend(other.removed_versions);
        self.removed_temp_files.extend(other.removed_temp_files);
        self.removed_partial_deals.extend(other.removed_partial_deals);
    }
}

/// Sweep one deal. The caller must hold the deal lock.
pub(crate) fn recover_deal(paths: &DealPaths) -> StoreResult<RecoveryReport> {
    let mut report = RecoveryReport::default();

    let txns_root = paths.txns_root();
    for entry in read_dir_sorted(&txns_root)? {
        remove_path(&entry)?;
        report.removed_txns.push(entry);
    }

    report
        .removed_temp_files
        .extend(remove_temp_files(paths.root())?);

    for kind in WorkflowKind::ALL {
        let workflow_dir = paths.workflow_dir(kind);
        if !workflow_dir.is_dir() {
            continue;
        }
        report
            .removed_temp_files
            .extend(remove_temp_files(&workflow_dir)?);

        let current = read_record::<WorkflowDocument>(&paths.document_path(kind))?
            .map(|doc| doc.version)
            .unwrap_or(0);
        for (version, path) in version_dirs(&paths.versions_dir(kind))? {
            if version > current {
                debug!(path = %path.display(), current, "remove unreferenced version");
                remove_path(&path)?;
                report.removed_versions.push(path);
            }
        }
    }
    Ok(report)
}

/// Deal directories whose creation never completed, keyed by deal id.
pub(crate) fn partial_deal_dirs(store: &StorePaths) -> StoreResult<Vec<(String, PathBuf)>> {
    let mut partial = Vec::new();
    for entry in read_dir_sorted(store.root())? {
        let id = entry
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix(".creating-"))
            .map(str::to_string);
        if let Some(id) = id {
            partial.push((id, entry));
        }
    }
    Ok(partial)
}

/// Delete the oldest versions beyond `keep`, never touching `current`.
pub(crate) fn prune_versions(
    paths: &DealPaths,
    kind: WorkflowKind,
    current: u64,
    keep: usize,
) -> StoreResult<Vec<PathBuf>> {
    let keep = keep.max(1);
    let mut older: Vec<_> = version_dirs(&paths.versions_dir(kind))?
        .into_iter()
        .filter(|(version, _)| *version < current)
        .collect();
    older.reverse();
    let mut removed = Vec::new();
    for (_, path) in older.into_iter().skip(keep - 1) {
        remove_path(&path)?;
        removed.push(path);
    }
    Ok(removed)
}

/// Numbered version directories, ascending.
pub(crate) fn version_dirs(versions_dir: &Path) -> StoreResult<Vec<(u64, PathBuf)>> {
    let mut versions: Vec<(u64, PathBuf)> = read_dir_sorted(versions_dir)?
        .into_iter()
        .filter_map(|path| {
            let version = path.file_name()?.to_str()?.parse::<u64>().ok()?;
            Some((version, path))
        })
        .collect();
    versions.sort_by_key(|(version, _)| *version);
    Ok(versions)
}

fn remove_temp_files(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for entry in read_dir_sorted(dir)? {
        let is_temp = entry
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(".tmp"));
        if is_temp && entry.is_file() {
            remove_path(&entry)?;
            removed.push(entry);
        }
    }
    Ok(removed)
}

fn read_dir_sorted(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        entries.push(entry.with_context(|| format!("read {}", dir.display()))?.path());
    }
    entries.sort();
    Ok(entries)
}

pub(crate) fn remove_path(path: &Path) -> StoreResult<()> {
    if path.is_dir() {
        fs::remove_dir_all(path).with_context(|| format!("remove {}", path.display()))?;
    } else {
        fs::remove_file(path).with_context(|| format!("remove {}", path.display()))?;
    }
    Ok(())
}
