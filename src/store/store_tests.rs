use super::*;
use crate::artifacts::Artifact;
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;

/// Writes the result and a second file derived from it, so tests can check
/// both files of a set always agree.
struct PairRenderer;

impl ArtifactRenderer for PairRenderer {
    fn render(
        &self,
        _kind: WorkflowKind,
        _deal: &Deal,
        result: &Value,
    ) -> anyhow::Result<Vec<Artifact>> {
        let text = serde_json::to_string(result)?;
        Ok(vec![
            Artifact::new("result", "result.json", text.clone().into_bytes()),
            Artifact::new("summary", "summary.md", format!("# {text}\n").into_bytes()),
        ])
    }
}

/// Writes one good file and then one that cannot be staged.
struct BrokenRenderer;

impl ArtifactRenderer for BrokenRenderer {
    fn render(
        &self,
        _kind: WorkflowKind,
        _deal: &Deal,
        _result: &Value,
    ) -> anyhow::Result<Vec<Artifact>> {
        Ok(vec![
            Artifact::new("result", "result.json", b"{}".to_vec()),
            Artifact::new("escape", "../outside.md", b"x".to_vec()),
        ])
    }
}

struct RequiresComps;

impl ExternalCall for RequiresComps {
    fn preflight(&self, request: &CallRequest<'_>) -> Result<(), String> {
        match request.inputs.get("comps").and_then(Value::as_array) {
            Some(comps) if !comps.is_empty() => Ok(()),
            _ => Err("at least one comparable sale is required".to_string()),
        }
    }

    fn call(&self, _request: &CallRequest<'_>) -> anyhow::Result<Value> {
        Ok(json!({"ok": true}))
    }
}

fn open_store(dir: &tempfile::TempDir) -> DealStore {
    DealStore::open(dir.path().join("deals"))
        .expect("open store")
        .with_renderer(PairRenderer)
}

fn new_deal(store: &DealStore) -> Deal {
    store
        .create_deal(NewDeal::new("42 Smith St"))
        .expect("create deal")
}

fn echo(request: &CallRequest<'_>) -> anyhow::Result<Value> {
    Ok(request.inputs.clone())
}

fn snapshot_files(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    crate::staging::collect_files_recursive(root)
        .expect("collect")
        .into_iter()
        .filter(|path| path.file_name().is_some_and(|name| name != "history.jsonl"))
        .map(|path| {
            let bytes = fs::read(&path).expect("read");
            (path, bytes)
        })
        .collect()
}

fn read_artifacts(deal: &Deal, doc: &WorkflowDocument) -> (String, String) {
    let result = fs::read_to_string(doc.artifact_path(&deal.root, "result").expect("result"))
        .expect("read result");
    let summary = fs::read_to_string(doc.artifact_path(&deal.root, "summary").expect("summary"))
        .expect("read summary");
    (result, summary)
}

#[test]
fn create_deal_builds_identifier_from_timestamp_and_slug() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let at = DateTime::parse_from_rfc3339("2024-03-05T09:08:07Z")
        .expect("timestamp")
        .with_timezone(&Utc);
    let mut new = NewDeal::new("42 Smith St, Newtown NSW");
    new.state = "NSW".to_string();
    new.council = "Inner West".to_string();

    let deal = store.create_deal_at(new, at).expect("create");
    assert_eq!(deal.id(), "20240305-090807_42-smith-st-newtown-nsw");
    assert!(deal.documents.is_empty());
    assert!(deal.inputs.is_empty());

    let loaded = store.get_deal(deal.id()).expect("get");
    assert_eq!(loaded, deal);
    assert_eq!(loaded.record.council, "Inner West");
}

#[test]
fn create_deal_rejects_identifier_collision() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let at = Utc::now();
    store
        .create_deal_at(NewDeal::new("42 Smith St"), at)
        .expect("first");
    let err = store
        .create_deal_at(NewDeal::new("42 Smith St"), at)
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateDeal(_)));
}

#[test]
fn get_deal_on_unknown_or_partial_deals_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let root = store.paths().root().to_path_buf();
    fs::create_dir_all(root.join("20240101-000000_no-record")).expect("bare dir");
    fs::create_dir_all(root.join(".creating-20240101-000000_half")).expect("partial");

    for id in [
        "missing",
        "",
        "../deals",
        "20240101-000000_no-record",
        ".creating-20240101-000000_half",
    ] {
        let err = store.get_deal(id).unwrap_err();
        assert!(
            matches!(err, StoreError::DealNotFound(ref got) if got == id),
            "{id}: {err}"
        );
    }
}

#[test]
fn save_input_bumps_revision_only_when_content_changes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);

    let first = store
        .save_workflow_input(deal.id(), WorkflowKind::Cma, json!({"comps": [1]}))
        .expect("save");
    let same = store
        .save_workflow_input(deal.id(), WorkflowKind::Cma, json!({"comps": [1]}))
        .expect("save again");
    let changed = store
        .save_workflow_input(deal.id(), WorkflowKind::Cma, json!({"comps": [1, 2]}))
        .expect("save changed");

    assert_eq!(first.revision, 1);
    assert_eq!(same.revision, 1);
    assert_eq!(changed.revision, 2);
    assert_ne!(first.hash, changed.hash);
}

#[test]
fn saving_inputs_leaves_approval_and_outputs_alone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);
    store
        .run_workflow(deal.id(), WorkflowKind::Cma, Some(json!({"comps": [1]})), &echo)
        .expect("run");
    store
        .approve_workflow(deal.id(), WorkflowKind::Cma, true)
        .expect("approve");

    store
        .save_workflow_input(deal.id(), WorkflowKind::Cma, json!({"comps": [9]}))
        .expect("save");

    let deal = store.get_deal(deal.id()).expect("get");
    let doc = deal.document(WorkflowKind::Cma).expect("doc");
    assert!(doc.is_approved());
    assert_eq!(doc.result, json!({"comps": [1]}));
    assert_eq!(doc.input_revision, 1);
    assert_eq!(deal.input(WorkflowKind::Cma).expect("input").revision, 2);
}

#[test]
fn approve_without_document_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);
    let err = store
        .approve_workflow(deal.id(), WorkflowKind::Reno, true)
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::NoDocument { kind: WorkflowKind::Reno, .. }
    ));
    assert!(!err.is_retryable());
}

#[test]
fn approval_never_survives_a_new_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);
    let kind = WorkflowKind::Feasibility;

    let first = store
        .run_workflow(deal.id(), kind, Some(json!({"price": 1})), &echo)
        .expect("run");
    assert_eq!(first.status, ApprovalStatus::Draft);
    assert_eq!(first.version, 1);

    let approved = store.approve_workflow(deal.id(), kind, true).expect("approve");
    assert_eq!(approved.status, ApprovalStatus::Approved);
    assert!(approved.approved_at.is_some());
    assert_eq!(approved.artifacts, first.artifacts);

    let second = store.run_workflow(deal.id(), kind, None, &echo).expect("rerun");
    assert_eq!(second.status, ApprovalStatus::Draft);
    assert_eq!(second.approved_at, None);
    assert_eq!(second.version, 2);

    let unapproved = store.approve_workflow(deal.id(), kind, false).expect("unapprove");
    assert_eq!(unapproved.status, ApprovalStatus::Draft);
}

#[test]
fn external_call_failure_leaves_document_byte_identical() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);
    let kind = WorkflowKind::Cma;
    store
        .run_workflow(deal.id(), kind, Some(json!({"comps": [1]})), &echo)
        .expect("run");
    store.approve_workflow(deal.id(), kind, true).expect("approve");
    let workflow_dir = store.paths().deal(deal.id()).workflow_dir(kind);
    let before: BTreeMap<_, _> = snapshot_files(&workflow_dir)
        .into_iter()
        .filter(|(path, _)| !path.ends_with("inputs.json"))
        .collect();

    let failing = |_: &CallRequest<'_>| -> anyhow::Result<Value> {
        Err(anyhow::anyhow!("upstream 529 overloaded"))
    };
    let err = store
        .run_workflow(deal.id(), kind, Some(json!({"comps": [2]})), &failing)
        .unwrap_err();
    match &err {
        StoreError::ExternalCall { kind: got, message } => {
            assert_eq!(*got, kind);
            assert!(message.contains("529 overloaded"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_retryable());

    let after: BTreeMap<_, _> = snapshot_files(&workflow_dir)
        .into_iter()
        .filter(|(path, _)| !path.ends_with("inputs.json"))
        .collect();
    assert_eq!(before, after);

    let history = store.history(deal.id()).expect("history");
    let last = history.last().expect("entry");
    assert_eq!(last.action, HistoryAction::Run);
    assert!(!last.success);
}

#[test]
fn concurrent_runs_with_different_inputs_commit_exactly_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(open_store(&dir));
    let deal = new_deal(&store);
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = ["first", "second"]
        .into_iter()
        .map(|label| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let id = deal.id().to_string();
            thread::spawn(move || {
                // Both calls are in flight before either commits.
                let call = |request: &CallRequest<'_>| -> anyhow::Result<Value> {
                    barrier.wait();
                    Ok(request.inputs.clone())
                };
                store.run_workflow(&id, WorkflowKind::Cma, Some(json!({"comps": [label]})), &call)
            })
        })
        .collect();
    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("join"))
        .collect();

    let committed: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
    let stale = outcomes
        .iter()
        .filter(|o| matches!(o, Err(StoreError::StaleInput { .. })))
        .count();
    assert_eq!(committed.len(), 1);
    assert_eq!(stale, 1);

    let deal = store.get_deal(deal.id()).expect("get");
    let doc = deal.document(WorkflowKind::Cma).expect("doc");
    let input = deal.input(WorkflowKind::Cma).expect("input");
    assert_eq!(doc.version, 1);
    assert_eq!(doc.input_revision, input.revision);
    assert_eq!(doc.result, input.payload);
    assert_eq!(committed[0], doc);
}

#[test]
fn feasibility_is_stale_when_cma_changes_during_the_call() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);
    store
        .run_workflow(deal.id(), WorkflowKind::Cma, Some(json!({"comps": [1]})), &echo)
        .expect("cma");

    let id = deal.id().to_string();
    let rerun_cma = |request: &CallRequest<'_>| -> anyhow::Result<Value> {
        store
            .run_workflow(&id, WorkflowKind::Cma, Some(json!({"comps": [2]})), &echo)
            .map_err(anyhow::Error::from)?;
        Ok(request.inputs.clone())
    };
    let err = store
        .run_workflow(deal.id(), WorkflowKind::Feasibility, Some(json!({})), &rerun_cma)
        .unwrap_err();
    match err {
        StoreError::StaleInput { kind, reason } => {
            assert_eq!(kind, WorkflowKind::Feasibility);
            assert!(reason.contains("cma"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
    let deal = store.get_deal(deal.id()).expect("get");
    assert!(deal.document(WorkflowKind::Feasibility).is_none());
    assert_eq!(deal.document(WorkflowKind::Cma).expect("cma").version, 2);
}

#[test]
fn preflight_rejection_never_dispatches() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);
    let err = store
        .run_workflow(deal.id(), WorkflowKind::Cma, Some(json!({"comps": []})), &RequiresComps)
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput { kind: WorkflowKind::Cma, .. }));
    assert!(store.get_deal(deal.id()).unwrap().documents.is_empty());

    let doc = store
        .run_workflow(deal.id(), WorkflowKind::Cma, Some(json!({"comps": [1]})), &RequiresComps)
        .expect("run");
    assert_eq!(doc.result, json!({"ok": true}));
}

#[test]
fn failed_staging_keeps_previous_set_and_leaves_no_transaction() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);
    let kind = WorkflowKind::Reno;
    let before = store
        .run_workflow(deal.id(), kind, Some(json!({"messages": []})), &echo)
        .expect("run");

    let broken = DealStore::open(store.paths().root())
        .expect("reopen")
        .with_renderer(BrokenRenderer);
    assert!(broken
        .run_workflow(deal.id(), kind, Some(json!({"messages": ["hi"]})), &echo)
        .is_err());

    let deal_paths = store.paths().deal(deal.id());
    let deal = store.get_deal(deal.id()).expect("get");
    assert_eq!(deal.document(kind), Some(&before));
    assert!(!deal_paths.version_dir(kind, 2).exists());
    let leftover = fs::read_dir(deal_paths.txns_root())
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);
    assert!(!deal_paths.root().join("outside.md").exists());
}

#[test]
fn recovery_after_crash_yields_the_last_complete_set() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);
    let kind = WorkflowKind::Cma;
    let committed = store
        .run_workflow(deal.id(), kind, Some(json!({"comps": ["old"]})), &echo)
        .expect("run");
    let paths = store.paths().deal(deal.id());

    // Crash between artifact writes: a half-filled staging tree.
    let staging = paths.txn_staging_root("1-1-cma");
    fs::create_dir_all(&staging).expect("staging");
    fs::write(staging.join("result.json"), b"{\"comps\":[\"new\"]}").expect("partial");
    // Crash after publish but before the pointer flip.
    let orphan = paths.version_dir(kind, 2);
    fs::create_dir_all(&orphan).expect("orphan");
    fs::write(orphan.join("result.json"), b"{\"comps\":[\"new\"]}").expect("orphan file");
    // Crash during the pointer write.
    fs::write(paths.workflow_dir(kind).join(".tmpAbC123"), b"{\"trunc").expect("temp");

    let report = store.recover(deal.id()).expect("recover");
    assert_eq!(report.removed_txns.len(), 1);
    assert_eq!(report.removed_versions, vec![orphan.clone()]);
    assert_eq!(report.removed_temp_files.len(), 1);

    let deal = store.get_deal(deal.id()).expect("get");
    let doc = deal.document(kind).expect("doc");
    assert_eq!(doc, &committed);
    let (result, summary) = read_artifacts(&deal, doc);
    assert_eq!(result, r#"{"comps":["old"]}"#);
    assert_eq!(summary, "# {\"comps\":[\"old\"]}\n");

    assert!(store.recover(deal.id()).expect("again").is_clean());
    let next = store
        .run_workflow(deal.id(), kind, Some(json!({"comps": ["new"]})), &echo)
        .expect("run after recovery");
    assert_eq!(next.version, 2);
    let (result, summary) = read_artifacts(&deal, &next);
    assert_eq!(result, r#"{"comps":["new"]}"#);
    assert_eq!(summary, "# {\"comps\":[\"new\"]}\n");
}

#[test]
fn every_run_sees_a_matching_pair_of_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);
    for n in 0..5 {
        let doc = store
            .run_workflow(deal.id(), WorkflowKind::Cma, Some(json!({"n": n})), &echo)
            .expect("run");
        let (result, summary) = read_artifacts(&deal, &doc);
        assert_eq!(summary, format!("# {result}\n"));
        assert_eq!(result, format!("{{\"n\":{n}}}"));
    }
}

#[test]
fn old_versions_are_pruned_to_the_retention_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).with_keep_versions(2);
    let deal = new_deal(&store);
    for n in 0..4 {
        store
            .run_workflow(deal.id(), WorkflowKind::Cma, Some(json!({"n": n})), &echo)
            .expect("run");
    }
    let paths = store.paths().deal(deal.id());
    let versions: Vec<u64> = version_dirs(&paths.versions_dir(WorkflowKind::Cma))
        .expect("versions")
        .into_iter()
        .map(|(version, _)| version)
        .collect();
    assert_eq!(versions, vec![3, 4]);
}

#[test]
fn upload_is_limited_to_due_diligence_and_resets_approval() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);

    let err = store
        .upload_workflow_result(deal.id(), WorkflowKind::Cma, json!([]))
        .unwrap_err();
    assert!(matches!(err, StoreError::UploadNotAccepted(WorkflowKind::Cma)));

    let err = store
        .upload_workflow_result(deal.id(), WorkflowKind::DueDiligence, json!("nope"))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput { .. }));

    let kind = WorkflowKind::DueDiligence;
    let results = json!([{"item_number": 1, "item_name": "Zoning", "status": "PASS"}]);
    let first = store
        .upload_workflow_result(deal.id(), kind, results.clone())
        .expect("upload");
    assert_eq!(first.source, DocumentSource::Upload);
    assert_eq!(first.result["results"], results);
    store.approve_workflow(deal.id(), kind, true).expect("approve");

    let second = store
        .upload_workflow_result(deal.id(), kind, json!({"results": results}))
        .expect("upload object");
    assert_eq!(second.status, ApprovalStatus::Draft);
    assert_eq!(second.version, 2);
}

#[test]
fn update_input_merges_without_losing_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);
    store
        .save_workflow_input(deal.id(), WorkflowKind::Cma, json!({"comps": [1]}))
        .expect("save");
    let updated = store
        .update_workflow_input(deal.id(), WorkflowKind::Cma, |mut payload| {
            if let Some(obj) = payload.as_object_mut() {
                obj.insert("vision".to_string(), json!({"bedrooms": 3}));
            }
            Ok(payload)
        })
        .expect("update");
    assert_eq!(updated.revision, 2);
    assert_eq!(updated.payload, json!({"comps": [1], "vision": {"bedrooms": 3}}));
}

#[test]
fn list_deals_is_newest_first_with_statuses_and_photos() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let older = store
        .create_deal_at(
            NewDeal::new("1 Old Rd"),
            Utc::now() - chrono::Duration::days(1),
        )
        .expect("older");
    let newer = new_deal(&store);
    store
        .run_workflow(newer.id(), WorkflowKind::Cma, Some(json!({})), &echo)
        .expect("run");

    let photo = dir.path().join("front.JPG");
    fs::write(&photo, b"jpeg").expect("photo");
    let notes = dir.path().join("notes.txt");
    fs::write(&notes, b"text").expect("notes");
    let copied = store
        .add_photos(
            newer.id(),
            &[photo, notes, dir.path().join("missing.png")],
        )
        .expect("add photos");
    assert_eq!(copied.len(), 2);
    assert_eq!(store.list_photos(newer.id()).expect("photos").len(), 1);

    let deals = store.list_deals().expect("list");
    let ids: Vec<_> = deals.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec![newer.id(), older.id()]);
    assert_eq!(deals[0].photo_count, 1);
    assert_eq!(
        deals[0].statuses.get(&WorkflowKind::Cma),
        Some(&ApprovalStatus::Draft)
    );
    assert!(deals[1].statuses.is_empty());
}

#[test]
fn recover_all_removes_half_created_deals() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);
    let partial = store.paths().creating_dir("20240101-000000_half");
    fs::create_dir_all(&partial).expect("partial");

    let report = store.recover_all().expect("recover");
    assert_eq!(report.removed_partial_deals, vec![partial.clone()]);
    assert!(!partial.exists());
    assert!(store.get_deal(deal.id()).is_ok());
}

#[test]
fn history_records_each_operation_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);
    store
        .run_workflow(deal.id(), WorkflowKind::Cma, Some(json!({"comps": [1]})), &echo)
        .expect("run");
    store
        .approve_workflow(deal.id(), WorkflowKind::Cma, true)
        .expect("approve");

    let actions: Vec<_> = store
        .history(deal.id())
        .expect("history")
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            HistoryAction::Create,
            HistoryAction::SaveInput,
            HistoryAction::Run,
            HistoryAction::Approve
        ]
    );
}

#[test]
fn upload_during_a_run_is_not_overwritten_by_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);
    let id = deal.id().to_string();

    let upload_then_placeholder = |_: &CallRequest<'_>| -> anyhow::Result<Value> {
        store
            .upload_workflow_result(
                &id,
                WorkflowKind::DueDiligence,
                json!([{"item_number": 1, "status": "PASS"}]),
            )
            .map_err(anyhow::Error::from)?;
        Ok(json!({"results": [{"item_number": 1, "status": "PENDING"}]}))
    };
    let err = store
        .run_workflow(&id, WorkflowKind::DueDiligence, None, &upload_then_placeholder)
        .unwrap_err();
    match err {
        StoreError::StaleInput { kind, reason } => {
            assert_eq!(kind, WorkflowKind::DueDiligence);
            assert!(reason.contains("document version"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }

    let doc = store
        .get_deal(&id)
        .expect("get")
        .document(WorkflowKind::DueDiligence)
        .cloned()
        .expect("uploaded document");
    assert_eq!(doc.version, 1);
    assert_eq!(doc.source, DocumentSource::Upload);
    assert_eq!(doc.result["results"][0]["status"], "PASS");
}

#[test]
fn committed_run_is_reported_even_when_history_cannot_be_written() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);
    store
        .save_workflow_input(deal.id(), WorkflowKind::Cma, json!({"comps": [1]}))
        .expect("save");
    let history = store.paths().deal(deal.id()).history_path();
    fs::remove_file(&history).expect("remove history");
    fs::create_dir(&history).expect("block history");

    let doc = store
        .run_workflow(deal.id(), WorkflowKind::Cma, None, &echo)
        .expect("run commits");
    assert_eq!(doc.version, 1);
    let approved = store
        .approve_workflow(deal.id(), WorkflowKind::Cma, true)
        .expect("approve commits");
    assert_eq!(approved.status, ApprovalStatus::Approved);

    let failing = |_: &CallRequest<'_>| -> anyhow::Result<Value> { Err(anyhow::anyhow!("overloaded")) };
    let err = store
        .run_workflow(deal.id(), WorkflowKind::Cma, None, &failing)
        .unwrap_err();
    assert!(matches!(err, StoreError::ExternalCall { .. }), "{err}");
    assert_eq!(
        store.get_deal(deal.id()).expect("get").status(WorkflowKind::Cma),
        Some(ApprovalStatus::Approved)
    );
}

#[test]
fn revision_checked_update_rejects_a_moved_input_set() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let deal = new_deal(&store);
    store
        .save_workflow_input(deal.id(), WorkflowKind::Reno, json!({"messages": []}))
        .expect("save");

    let mut called = false;
    let err = store
        .update_workflow_input_at(deal.id(), WorkflowKind::Reno, 0, |payload| {
            called = true;
            Ok(payload)
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::StaleInput { kind: WorkflowKind::Reno, .. }));
    assert!(!called);

    let saved = store
        .update_workflow_input_at(deal.id(), WorkflowKind::Reno, 1, |_| {
            Ok(json!({"messages": [{"role": "user", "content": "hi"}]}))
        })
        .expect("update at current revision");
    assert_eq!(saved.revision, 2);
}
