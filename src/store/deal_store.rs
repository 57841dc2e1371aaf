//! The deal store: lifecycle, inputs, runs, uploads and approvals.
//!
//! Every mutation of a deal happens under that deal's lock. `run_workflow`
//! takes the lock twice, once to snapshot inputs and once to commit, and
//! never holds it across the external call.
use super::history::{append_history, read_history};
use super::lock::{input_hash, lock_deal, DealGuard};
use super::recovery::{
    partial_deal_dirs, prune_versions, recover_deal, remove_path, version_dirs,
};
use super::{
    ApprovalStatus, Deal, DealPaths, DealRecord, DealSummary, DocumentSource, HistoryAction,
    HistoryEntry, InputSet, NewDeal, RecoveryReport, StorePaths, WorkflowDocument,
    WorkflowKind, DEAL_SCHEMA_VERSION, DEFAULT_KEEP_VERSIONS, DOCUMENT_SCHEMA_VERSION,
    INPUTS_SCHEMA_VERSION,
};
use crate::artifacts::{ArtifactRenderer, StandardRenderer};
use crate::error::{StoreError, StoreResult};
use crate::pipelines::due_diligence;
use crate::staging::{publish_version, write_json_atomic, write_staged_bytes};
use crate::util::{now_epoch_ms, slugify};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "heic"];

/// What an external call sees: a snapshot taken under the deal lock.
#[derive(Debug, Clone)]
pub struct CallRequest<'a> {
    pub deal: &'a Deal,
    pub kind: WorkflowKind,
    pub inputs: &'a Value,
    pub input_revision: u64,
}

/// The collaborator a run dispatches to.
pub trait ExternalCall {
    /// Reject inputs that cannot produce a result, before anything is sent.
    fn preflight(&self, _request: &CallRequest<'_>) -> Result<(), String> {
        Ok(())
    }

    fn call(&self, request: &CallRequest<'_>) -> anyhow::Result<Value>;
}

impl<F> ExternalCall for F
where
    F: Fn(&CallRequest<'_>) -> anyhow::Result<Value>,
{
    fn call(&self, request: &CallRequest<'_>) -> anyhow::Result<Value> {
        self(request)
    }
}

/// Inputs, the workflow's own document and upstream versions recorded when
/// a call is dispatched.
#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    input_revision: u64,
    inputs_hash: Option<String>,
    document_version: Option<u64>,
    upstream: BTreeMap<WorkflowKind, Option<u64>>,
}

pub struct DealStore {
    paths: StorePaths,
    keep_versions: usize,
    renderer: Box<dyn ArtifactRenderer>,
}

impl DealStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).with_context(|| format!("create {}", root.display()))?;
        Ok(Self {
            paths: StorePaths::new(root),
            keep_versions: DEFAULT_KEEP_VERSIONS,
            renderer: Box::new(StandardRenderer),
        })
    }

    pub fn with_keep_versions(mut self, keep: usize) -> Self {
        self.keep_versions = keep.max(1);
        self
    }

    pub fn with_renderer(mut self, renderer: impl ArtifactRenderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn create_deal(&self, new: NewDeal) -> StoreResult<Deal> {
        self.create_deal_at(new, Utc::now())
    }

    /// Create a deal whose identifier is derived from `created_at`.
    pub fn create_deal_at(&self, new: NewDeal, created_at: DateTime<Utc>) -> StoreResult<Deal> {
        let slug = match slugify(&new.address) {
            slug if slug.is_empty() => "deal".to_string(),
            slug => slug,
        };
        let id = format!("{}_{slug}", created_at.format("%Y%m%d-%H%M%S"));
        let _guard = self.lock(&id)?;
        let deal_paths = self.paths.deal(&id);
        if deal_paths.root().exists() {
            return Err(StoreError::DuplicateDeal(id));
        }

        let record = DealRecord {
            schema_version: DEAL_SCHEMA_VERSION,
            id: id.clone(),
            address: new.address,
            listing_url: new.listing_url,
            state: new.state,
            council: new.council,
            notes: new.notes,
            created_at,
        };

        let building = DealPaths::new(self.paths.creating_dir(&id));
        if building.root().exists() {
            remove_path(building.root())?;
        }
        fs::create_dir_all(building.photos_dir())
            .with_context(|| format!("create {}", building.photos_dir().display()))?;
        fs::create_dir_all(building.workflows_dir())
            .with_context(|| format!("create {}", building.workflows_dir().display()))?;
        write_json_atomic(&building.record_path(), &record)?;
        append_history(&building, &HistoryEntry::new(HistoryAction::Create, None))?;
        fs::rename(building.root(), deal_paths.root()).with_context(|| {
            format!(
                "rename {} -> {}",
                building.root().display(),
                deal_paths.root().display()
            )
        })?;

        info!(deal = %id, address = %record.address, "created deal");
        Ok(Deal {
            record,
            root: deal_paths.root().to_path_buf(),
            inputs: BTreeMap::new(),
            documents: BTreeMap::new(),
        })
    }

    pub fn get_deal(&self, id: &str) -> StoreResult<Deal> {
        let paths = self.existing_deal(id)?;
        self.load_deal(id, &paths)
    }

    /// All deals, newest first. Deals whose metadata cannot be read are skipped.
    pub fn list_deals(&self) -> StoreResult<Vec<DealSummary>> {
        let root = self.paths.root();
        let mut summaries = Vec::new();
        for entry in fs::read_dir(root).with_context(|| format!("read {}", root.display()))? {
            let entry = entry.with_context(|| format!("read {}", root.display()))?;
            let Some(id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !valid_deal_id(&id) || !entry.path().join("deal.json").is_file() {
                continue;
            }
            match self.get_deal(&id) {
                Ok(deal) => summaries.push(DealSummary {
                    photo_count: list_photo_files(&self.paths.deal(&id).photos_dir())?.len(),
                    statuses: deal
                        .documents
                        .iter()
                        .map(|(kind, doc)| (*kind, doc.status))
                        .collect(),
                    id: deal.record.id,
                    address: deal.record.address,
                    created_at: deal.record.created_at,
                }),
                Err(err) => warn!(deal = %id, %err, "skip unreadable deal"),
            }
        }
        summaries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(summaries)
    }

    pub fn history(&self, id: &str) -> StoreResult<Vec<HistoryEntry>> {
        let paths = self.existing_deal(id)?;
        Ok(read_history(&paths)?)
    }

    /// Replace a workflow's input set. Approval state and outputs are untouched.
    pub fn save_workflow_input(
        &self,
        id: &str,
        kind: WorkflowKind,
        payload: Value,
    ) -> StoreResult<InputSet> {
        let paths = self.existing_deal(id)?;
        let _guard = self.lock(id)?;
        let saved = save_input(&paths, kind, payload)?;
        debug!(deal = %id, %kind, revision = saved.revision, "saved input");
        Ok(saved)
    }

    /// Read-modify-write of an input set under the deal lock.
    ///
    /// `update` receives the current payload, or an empty object when none
    /// has been saved.
    pub fn update_workflow_input<F>(
        &self,
        id: &str,
        kind: WorkflowKind,
        update: F,
    ) -> StoreResult<InputSet>
    where
        F: FnOnce(Value) -> StoreResult<Value>,
    {
        self.update_input(id, kind, None, update)
    }

    /// Like [`DealStore::update_workflow_input`], but only while the input
    /// set is still at `expected_revision` (0 when none was saved).
    /// Otherwise `update` is not called and the result is `StaleInput`.
    pub fn update_workflow_input_at<F>(
        &self,
        id: &str,
        kind: WorkflowKind,
        expected_revision: u64,
        update: F,
    ) -> StoreResult<InputSet>
    where
        F: FnOnce(Value) -> StoreResult<Value>,
    {
        self.update_input(id, kind, Some(expected_revision), update)
    }

    fn update_input<F>(
        &self,
        id: &str,
        kind: WorkflowKind,
        expected_revision: Option<u64>,
        update: F,
    ) -> StoreResult<InputSet>
    where
        F: FnOnce(Value) -> StoreResult<Value>,
    {
        let paths = self.existing_deal(id)?;
        let _guard = self.lock(id)?;
        let current = read_record::<InputSet>(&paths.inputs_path(kind))?;
        let revision = current.as_ref().map(|set| set.revision).unwrap_or(0);
        if let Some(expected) = expected_revision.filter(|expected| *expected != revision) {
            return Err(StoreError::StaleInput {
                kind,
                reason: format!("input revision {expected} is now {revision}"),
            });
        }
        let payload = current
            .map(|set| set.payload)
            .unwrap_or_else(|| Value::Object(Map::new()));
        let saved = save_input(&paths, kind, update(payload)?)?;
        debug!(deal = %id, %kind, revision = saved.revision, "updated input");
        Ok(saved)
    }

    /// Run a workflow and commit its artifacts as a new DRAFT document.
    ///
    /// When `input` is given it becomes the input set first. The external
    /// call runs without the deal lock; if the inputs (or an upstream
    /// document) changed meanwhile, the result is discarded.
    pub fn run_workflow(
        &self,
        id: &str,
        kind: WorkflowKind,
        input: Option<Value>,
        external: &dyn ExternalCall,
    ) -> StoreResult<WorkflowDocument> {
        let paths = self.existing_deal(id)?;

        let (deal, dispatched) = {
            let _guard = self.lock(id)?;
            if let Some(payload) = input {
                save_input(&paths, kind, payload)?;
            }
            let deal = self.load_deal(id, &paths)?;
            let snapshot = snapshot(&deal, kind);
            (deal, snapshot)
        };

        let empty = Value::Object(Map::new());
        let request = CallRequest {
            deal: &deal,
            kind,
            inputs: deal.input(kind).map(|set| &set.payload).unwrap_or(&empty),
            input_revision: dispatched.input_revision,
        };
        if let Err(message) = external.preflight(&request) {
            self.record_failure(id, HistoryAction::Run, kind, &message);
            return Err(StoreError::InvalidInput { kind, message });
        }

        info!(deal = %id, %kind, revision = dispatched.input_revision, "dispatching external call");
        let started = Instant::now();
        let outcome = external.call(&request);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                let message = format!("{err:#}");
                warn!(deal = %id, %kind, elapsed_ms, error = %message, "external call failed");
                self.record_failure(id, HistoryAction::Run, kind, &message);
                return Err(StoreError::ExternalCall { kind, message });
            }
        };

        let _guard = self.lock(id)?;
        let deal = self.load_deal(id, &paths)?;
        let current = snapshot(&deal, kind);
        if let Some(reason) = staleness(&dispatched, &current) {
            warn!(deal = %id, %kind, %reason, "discarding stale result");
            let entry = HistoryEntry::new(HistoryAction::Run, Some(kind)).failed(&reason);
            note_history(&paths, &entry);
            return Err(StoreError::StaleInput { kind, reason });
        }

        let committed = self.commit(
            &paths,
            &deal,
            kind,
            result,
            DocumentSource::Run,
            &current,
        );
        let document = match committed {
            Ok(document) => document,
            Err(err) => {
                let entry = HistoryEntry::new(HistoryAction::Run, Some(kind)).failed(err.to_string());
                note_history(&paths, &entry);
                return Err(err);
            }
        };
        let mut entry = HistoryEntry::new(HistoryAction::Run, Some(kind));
        entry.version = Some(document.version);
        entry.input_revision = Some(document.input_revision);
        entry.duration_ms = Some(elapsed_ms);
        note_history(&paths, &entry);
        info!(deal = %id, %kind, version = document.version, elapsed_ms, "committed run");
        Ok(document)
    }

    /// Store an externally produced result as a new DRAFT document.
    pub fn upload_workflow_result(
        &self,
        id: &str,
        kind: WorkflowKind,
        payload: Value,
    ) -> StoreResult<WorkflowDocument> {
        let paths = self.existing_deal(id)?;
        if !kind.accepts_upload() {
            return Err(StoreError::UploadNotAccepted(kind));
        }
        let result = match due_diligence::normalize_upload(payload) {
            Ok(result) => result,
            Err(message) => {
                self.record_failure(id, HistoryAction::Upload, kind, &message);
                return Err(StoreError::InvalidInput { kind, message });
            }
        };

        let _guard = self.lock(id)?;
        let deal = self.load_deal(id, &paths)?;
        let current = snapshot(&deal, kind);
        let document = self.commit(
            &paths,
            &deal,
            kind,
            result,
            DocumentSource::Upload,
            &current,
        )?;
        let mut entry = HistoryEntry::new(HistoryAction::Upload, Some(kind));
        entry.version = Some(document.version);
        note_history(&paths, &entry);
        info!(deal = %id, %kind, version = document.version, "committed upload");
        Ok(document)
    }

    /// Set or clear sign-off on the current document. Artifacts are untouched.
    pub fn approve_workflow(
        &self,
        id: &str,
        kind: WorkflowKind,
        approved: bool,
    ) -> StoreResult<WorkflowDocument> {
        let paths = self.existing_deal(id)?;
        let _guard = self.lock(id)?;
        let action = if approved {
            HistoryAction::Approve
        } else {
            HistoryAction::Unapprove
        };
        let Some(mut document) = read_record::<WorkflowDocument>(&paths.document_path(kind))?
        else {
            let entry = HistoryEntry::new(action, Some(kind)).failed("no document");
            note_history(&paths, &entry);
            return Err(StoreError::NoDocument {
                deal_id: id.to_string(),
                kind,
            });
        };

        let now = Utc::now();
        document.status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Draft
        };
        document.status_changed_at = now;
        document.approved_at = approved.then_some(now);
        write_json_atomic(&paths.document_path(kind), &document)?;

        let mut entry = HistoryEntry::new(action, Some(kind));
        entry.version = Some(document.version);
        note_history(&paths, &entry);
        info!(deal = %id, %kind, version = document.version, status = %document.status, "set approval");
        Ok(document)
    }

    /// Copy listing photos into the deal. Missing sources are skipped.
    pub fn add_photos(&self, id: &str, sources: &[PathBuf]) -> StoreResult<Vec<PathBuf>> {
        let paths = self.existing_deal(id)?;
        let _guard = self.lock(id)?;
        let dest_dir = paths.photos_dir();
        fs::create_dir_all(&dest_dir).with_context(|| format!("create {}", dest_dir.display()))?;
        let mut copied = Vec::new();
        for source in sources {
            let Some(name) = source.file_name().filter(|_| source.is_file()) else {
                warn!(path = %source.display(), "skip missing photo");
                continue;
            };
            let dest = dest_dir.join(name);
            fs::copy(source, &dest).with_context(|| {
                format!("copy {} -> {}", source.display(), dest.display())
            })?;
            copied.push(dest);
        }
        info!(deal = %id, count = copied.len(), "added photos");
        Ok(copied)
    }

    pub fn list_photos(&self, id: &str) -> StoreResult<Vec<PathBuf>> {
        let paths = self.existing_deal(id)?;
        list_photo_files(&paths.photos_dir())
    }

    /// Remove leftovers of interrupted writes for one deal.
    pub fn recover(&self, id: &str) -> StoreResult<RecoveryReport> {
        let paths = self.existing_deal(id)?;
        let _guard = self.lock(id)?;
        let report = recover_deal(&paths)?;
        if !report.is_clean() {
            let mut entry = HistoryEntry::new(HistoryAction::Recover, None);
            entry.message = Some(format!(
                "removed {} txns, {} versions, {} temp files",
                report.removed_txns.len(),
                report.removed_versions.len(),
                report.removed_temp_files.len()
            ));
            note_history(&paths, &entry);
            info!(deal = %id, ?report, "recovered deal");
        }
        Ok(report)
    }

    /// Recover every deal and remove half-created ones.
    pub fn recover_all(&self) -> StoreResult<RecoveryReport> {
        let mut report = RecoveryReport::default();
        for (id, dir) in partial_deal_dirs(&self.paths)? {
            let _guard = self.lock(&id)?;
            if dir.exists() {
                info!(path = %dir.display(), "remove partially created deal");
                remove_path(&dir)?;
                report.removed_partial_deals.push(dir);
            }
        }
        for summary in self.list_deals()? {
            report.merge(self.recover(&summary.id)?);
        }
        Ok(report)
    }

    fn lock(&self, id: &str) -> StoreResult<DealGuard> {
        Ok(lock_deal(&self.paths.lock_path(id))?)
    }

    fn existing_deal(&self, id: &str) -> StoreResult<DealPaths> {
        if !valid_deal_id(id) {
            return Err(StoreError::DealNotFound(id.to_string()));
        }
        let paths = self.paths.deal(id);
        if !paths.record_path().is_file() {
            return Err(StoreError::DealNotFound(id.to_string()));
        }
        Ok(paths)
    }

    fn load_deal(&self, id: &str, paths: &DealPaths) -> StoreResult<Deal> {
        let record = read_record::<DealRecord>(&paths.record_path())?
            .ok_or_else(|| StoreError::DealNotFound(id.to_string()))?;
        let mut inputs = BTreeMap::new();
        let mut documents = BTreeMap::new();
        for kind in WorkflowKind::ALL {
            if let Some(set) = read_record::<InputSet>(&paths.inputs_path(kind))? {
                inputs.insert(kind, set);
            }
            if let Some(doc) = read_record::<WorkflowDocument>(&paths.document_path(kind))? {
                documents.insert(kind, doc);
            }
        }
        Ok(Deal {
            record,
            root: paths.root().to_path_buf(),
            inputs,
            documents,
        })
    }

    /// Record a failed attempt. The caller's error is what gets reported.
    fn record_failure(&self, id: &str, action: HistoryAction, kind: WorkflowKind, message: &str) {
        let entry = HistoryEntry::new(action, Some(kind)).failed(message);
        match self.lock(id) {
            Ok(_guard) => note_history(&self.paths.deal(id), &entry),
            Err(err) => warn!(deal = %id, error = %err, "cannot lock deal to record failure"),
        }
    }

    /// Stage, publish and point at a new artifact set. Caller holds the lock.
    fn commit(
        &self,
        paths: &DealPaths,
        deal: &Deal,
        kind: WorkflowKind,
        result: Value,
        source: DocumentSource,
        snapshot: &Snapshot,
    ) -> StoreResult<WorkflowDocument> {
        let previous = deal.document(kind).map(|doc| doc.version).unwrap_or(0);
        let on_disk = version_dirs(&paths.versions_dir(kind))?
            .last()
            .map(|(version, _)| *version)
            .unwrap_or(0);
        let version = previous.max(on_disk) + 1;

        let txn_id = format!("{}-{}-{kind}", now_epoch_ms()?, std::process::id());
        let txn_root = paths.txn_root(&txn_id);
        let staging_root = paths.txn_staging_root(&txn_id);
        let staged = self.stage_artifacts(&staging_root, kind, deal, &result);
        let artifacts = match staged {
            Ok(artifacts) => artifacts,
            Err(err) => {
                if txn_root.exists() {
                    remove_path(&txn_root)?;
                }
                return Err(err);
            }
        };
        let version_root = paths.version_dir(kind, version);
        if let Err(err) = publish_version(&staging_root, &version_root) {
            remove_path(&txn_root)?;
            return Err(err.into());
        }
        remove_path(&txn_root)?;

        let now = Utc::now();
        let document = WorkflowDocument {
            schema_version: DOCUMENT_SCHEMA_VERSION,
            kind,
            status: ApprovalStatus::Draft,
            version,
            artifacts: artifacts
                .into_iter()
                .map(|(name, file)| (name, paths.artifact_rel(kind, version, &file)))
                .collect(),
            result,
            source,
            input_revision: snapshot.input_revision,
            inputs_hash: snapshot.inputs_hash.clone(),
            updated_at: now,
            status_changed_at: now,
            approved_at: None,
        };
        write_json_atomic(&paths.document_path(kind), &document)?;

        // Past the pointer flip: a retention failure only leaves extra versions.
        match prune_versions(paths, kind, version, self.keep_versions) {
            Ok(pruned) if !pruned.is_empty() => {
                debug!(deal = %deal.id(), %kind, count = pruned.len(), "pruned old versions");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(deal = %deal.id(), %kind, error = %format!("{err:#}"), "failed to prune old versions");
            }
        }
        Ok(document)
    }

    fn stage_artifacts(
        &self,
        staging_root: &Path,
        kind: WorkflowKind,
        deal: &Deal,
        result: &Value,
    ) -> StoreResult<Vec<(String, String)>> {
        fs::create_dir_all(staging_root)
            .with_context(|| format!("create {}", staging_root.display()))?;
        let mut names = Vec::new();
        for artifact in self.renderer.render(kind, deal, result)? {
            write_staged_bytes(staging_root, &artifact.file, &artifact.bytes)?;
            names.push((artifact.name, artifact.file));
        }
        Ok(names)
    }
}

/// Read a JSON record; a missing file is `None`, an unparseable one is corrupt.
pub(crate) fn read_record<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|err| StoreError::Corrupt {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

fn save_input(paths: &DealPaths, kind: WorkflowKind, payload: Value) -> StoreResult<InputSet> {
    let hash = input_hash(&payload)?;
    let path = paths.inputs_path(kind);
    let previous = read_record::<InputSet>(&path)?;
    if let Some(previous) = previous.as_ref().filter(|set| set.hash == hash) {
        return Ok(previous.clone());
    }
    let set = InputSet {
        schema_version: INPUTS_SCHEMA_VERSION,
        revision: previous.map(|set| set.revision).unwrap_or(0) + 1,
        hash,
        saved_at: Utc::now(),
        payload,
    };
    write_json_atomic(&path, &set)?;
    let mut entry = HistoryEntry::new(HistoryAction::SaveInput, Some(kind));
    entry.input_revision = Some(set.revision);
    note_history(paths, &entry);
    Ok(set)
}

fn snapshot(deal: &Deal, kind: WorkflowKind) -> Snapshot {
    let input = deal.input(kind);
    Snapshot {
        input_revision: input.map(|set| set.revision).unwrap_or(0),
        inputs_hash: input.map(|set| set.hash.clone()),
        document_version: deal.document(kind).map(|doc| doc.version),
        upstream: kind
            .upstream()
            .iter()
            .map(|up| (*up, deal.document(*up).map(|doc| doc.version)))
            .collect(),
    }
}

fn staleness(dispatched: &Snapshot, current: &Snapshot) -> Option<String> {
    if dispatched.input_revision != current.input_revision {
        return Some(format!(
            "input revision {} is now {}",
            dispatched.input_revision, current.input_revision
        ));
    }
    if dispatched.document_version != current.document_version {
        return Some(format!(
            "document version {} is now {}",
            dispatched.document_version.unwrap_or(0),
            current.document_version.unwrap_or(0)
        ));
    }
    for (kind, version) in &dispatched.upstream {
        let now = current.upstream.get(kind).copied().flatten();
        if *version != now {
            return Some(format!(
                "{kind} document version {} is now {}",
                version.unwrap_or(0),
                now.unwrap_or(0)
            ));
        }
    }
    None
}

/// Append to history after the change it records is on disk. Failures are
/// logged, never returned.
fn note_history(paths: &DealPaths, entry: &HistoryEntry) {
    if let Err(err) = append_history(paths, entry) {
        warn!(
            path = %paths.history_path().display(),
            error = %format!("{err:#}"),
            "failed to append history"
        );
    }
}

fn list_photo_files(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut photos = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry.with_context(|| format!("read {}", dir.display()))?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| PHOTO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if is_image && path.is_file() {
            photos.push(path);
        }
    }
    photos.sort();
    Ok(photos)
}

fn valid_deal_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
