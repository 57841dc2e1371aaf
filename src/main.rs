use anyhow::{anyhow, Context, Result};
use clap::Parser;
use property_ops::config::{config_stub, BackendChoice, Settings};
use property_ops::error::StoreError;
use property_ops::lm::{load_lm_log, LmOutcome};
use property_ops::pipelines::due_diligence::DueDiligencePipeline;
use property_ops::pipelines::{cma, extract_vision, reno_chat, Pipelines};
use property_ops::store::{
    DealStore, InputSet, NewDeal, RecoveryReport, WorkflowDocument, WorkflowKind,
};
use property_ops::util::display_path;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::ExitCode;

mod cli;
use cli::{
    ApproveArgs, Command, CreateArgs, InputArgs, InputEdit, ListArgs, PhotosArgs, RecoverArgs,
    RenoChatArgs, RootArgs, RunArgs, ShowArgs, UploadArgs, VisionArgs,
};

fn main() -> ExitCode {
    let args = RootArgs::parse();
    if let Err(err) = init_tracing(args.global.verbose) {
        eprintln!("propops: {err:#}");
        return ExitCode::FAILURE;
    }
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("propops: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "info" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to initialize tracing subscriber: {err}"))
}

/// 2 for requests that cannot succeed as given, 3 for a failed external
/// call, 4 for a result discarded as stale, 1 for everything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<StoreError>() {
        Some(
            StoreError::DealNotFound(_)
            | StoreError::DuplicateDeal(_)
            | StoreError::UnknownWorkflowKind(_)
            | StoreError::NoDocument { .. }
            | StoreError::InvalidInput { .. }
            | StoreError::UploadNotAccepted(_),
        ) => 2,
        Some(StoreError::ExternalCall { .. }) => 3,
        Some(StoreError::StaleInput { .. }) => 4,
        _ => 1,
    }
}

fn run(args: RootArgs) -> Result<()> {
    let settings = Settings::load(args.global.overrides())?;
    match args.command {
        Command::Create(args) => cmd_create(&settings, args),
        Command::List(args) => cmd_list(&settings, args),
        Command::Show(args) => cmd_show(&settings, args),
        Command::Photos(args) => cmd_photos(&settings, args),
        Command::Input(args) => cmd_input(&settings, args),
        Command::Vision(args) => cmd_vision(&settings, args),
        Command::Run(args) => cmd_run(&settings, args),
        Command::Upload(args) => cmd_upload(&settings, args),
        Command::Approve(args) => cmd_approve(&settings, args),
        Command::RenoChat(args) => cmd_reno_chat(&settings, args),
        Command::Recover(args) => cmd_recover(&settings, args),
        Command::Doctor => cmd_doctor(&settings),
    }
}

fn cmd_create(settings: &Settings, args: CreateArgs) -> Result<()> {
    let store = settings.open_store()?;
    let deal = store.create_deal(NewDeal {
        address: args.address,
        listing_url: args.listing_url,
        state: args.state,
        council: args.council,
        notes: args.notes,
    })?;
    if args.json {
        return print_json(&deal);
    }
    println!("{}", deal.id());
    Ok(())
}

fn cmd_list(settings: &Settings, args: ListArgs) -> Result<()> {
    let store = settings.open_store()?;
    let deals = store.list_deals()?;
    if args.json {
        return print_json(&deals);
    }
    if deals.is_empty() {
        println!("no deals under {}", settings.root.display());
        return Ok(());
    }
    for deal in deals {
        let statuses: Vec<String> = WorkflowKind::ALL
            .iter()
            .map(|kind| {
                let status = deal.statuses.get(kind).map_or("-", |status| status.as_str());
                format!("{kind}={status}")
            })
            .collect();
        println!(
            "{}  {}  photos={}  {}",
            deal.id,
            deal.address,
            deal.photo_count,
            statuses.join(" ")
        );
    }
    Ok(())
}

fn cmd_show(settings: &Settings, args: ShowArgs) -> Result<()> {
    let store = settings.open_store()?;
    let deal = store.get_deal(&args.deal)?;
    let history = if args.history {
        Some(store.history(&args.deal)?)
    } else {
        None
    };
    if args.json {
        let mut value = serde_json::to_value(&deal).context("serialize deal")?;
        if let (Some(history), Some(map)) = (&history, value.as_object_mut()) {
            map.insert("history".to_string(), serde_json::to_value(history)?);
        }
        return print_json(&value);
    }

    let record = &deal.record;
    println!("{}  {}", record.id, record.address);
    for (label, value) in [
        ("listing", &record.listing_url),
        ("state", &record.state),
        ("council", &record.council),
        ("notes", &record.notes),
    ] {
        if !value.is_empty() {
            println!("  {label}: {value}");
        }
    }
    println!("  photos: {}", store.list_photos(&args.deal)?.len());
    for kind in WorkflowKind::ALL {
        let input = deal.input(kind);
        let Some(document) = deal.document(kind) else {
            if let Some(input) = input {
                println!("{kind}: no document (inputs r{})", input.revision);
            }
            continue;
        };
        let mut line = format!(
            "{kind}: {} v{} from inputs r{}",
            document.status, document.version, document.input_revision
        );
        if input.is_some_and(|input| input.revision != document.input_revision) {
            line.push_str(" (inputs changed since)");
        }
        println!("{line}");
        print_artifacts(&deal.root, settings.root.as_path(), document);
    }
    if let Some(history) = history {
        println!("history:");
        for entry in history {
            let kind = entry.kind.map(|kind| kind.to_string()).unwrap_or_default();
            let outcome = if entry.success { "ok" } else { "failed" };
            let mut line = format!(
                "  {}  {:?} {kind} {outcome}",
                entry.at.format("%Y-%m-%d %H:%M:%S"),
                entry.action
            );
            if let Some(version) = entry.version {
                line.push_str(&format!(" v{version}"));
            }
            if let Some(message) = entry.message {
                line.push_str(&format!(": {message}"));
            }
            println!("{line}");
        }
    }
    Ok(())
}

fn cmd_photos(settings: &Settings, args: PhotosArgs) -> Result<()> {
    let store = settings.open_store()?;
    if !args.files.is_empty() {
        let added = store.add_photos(&args.deal, &args.files)?;
        let skipped = args.files.len() - added.len();
        println!("added {} photo(s)", added.len());
        if skipped > 0 {
            eprintln!("skipped {skipped} missing file(s)");
        }
        return Ok(());
    }
    for photo in store.list_photos(&args.deal)? {
        println!("{}", photo.display());
    }
    Ok(())
}

fn cmd_input(settings: &Settings, args: InputArgs) -> Result<()> {
    let store = settings.open_store()?;
    let kind: WorkflowKind = args.kind.parse()?;
    if args.show || args.edit.is_empty() {
        let deal = store.get_deal(&args.deal)?;
        return match deal.input(kind) {
            Some(input) => print_json(input),
            None => {
                println!("{kind}: no inputs saved");
                Ok(())
            }
        };
    }
    if let Some(saved) = apply_input_edit(&store, &args.deal, kind, args.edit)? {
        println!("{kind} inputs saved (r{})", saved.revision);
    }
    Ok(())
}

fn cmd_vision(settings: &Settings, args: VisionArgs) -> Result<()> {
    let store = settings.open_store()?;
    let resources = settings.resources()?;
    let extractor = settings.vision()?;
    let saved = extract_vision(&store, &args.deal, extractor.as_ref(), &resources.vision_prompt)?;
    println!("vision facts merged into cma inputs (r{})", saved.revision);
    Ok(())
}

fn cmd_run(settings: &Settings, args: RunArgs) -> Result<()> {
    let store = settings.open_store()?;
    let kind: WorkflowKind = args.kind.parse()?;
    let resources = settings.resources()?;
    apply_input_edit(&store, &args.deal, kind, args.edit)?;
    if args.vision {
        if kind != WorkflowKind::Cma {
            return Err(anyhow!("--vision only applies to cma runs"));
        }
        let extractor = settings.vision()?;
        extract_vision(&store, &args.deal, extractor.as_ref(), &resources.vision_prompt)?;
    }

    let document = if kind == WorkflowKind::DueDiligence {
        let pipeline = DueDiligencePipeline {
            job_template: &resources.dd_job_template,
            checklist: &resources.checklist,
        };
        store.run_workflow(&args.deal, kind, None, &pipeline)?
    } else {
        let reasoner = settings.reasoner()?;
        let pipelines = Pipelines::new(reasoner.as_ref(), &resources, &settings.config.feasibility);
        let pipeline = pipelines.for_kind(kind);
        store.run_workflow(&args.deal, kind, None, pipeline.as_ref())?
    };
    if args.json {
        return print_json(&document);
    }
    let deal_root = store.paths().deal(&args.deal).root().to_path_buf();
    println!("{kind}: {} v{}", document.status, document.version);
    print_artifacts(&deal_root, settings.root.as_path(), &document);
    Ok(())
}

fn cmd_upload(settings: &Settings, args: UploadArgs) -> Result<()> {
    let store = settings.open_store()?;
    let kind: WorkflowKind = args.kind.parse()?;
    let payload = read_json_file(&args.file)?;
    let document = store.upload_workflow_result(&args.deal, kind, payload)?;
    let deal_root = store.paths().deal(&args.deal).root().to_path_buf();
    println!("{kind}: {} v{} (uploaded)", document.status, document.version);
    print_artifacts(&deal_root, settings.root.as_path(), &document);
    Ok(())
}

fn cmd_approve(settings: &Settings, args: ApproveArgs) -> Result<()> {
    let store = settings.open_store()?;
    let kind: WorkflowKind = args.kind.parse()?;
    let document = store.approve_workflow(&args.deal, kind, !args.revoke)?;
    println!("{kind}: {} v{}", document.status, document.version);
    Ok(())
}

fn cmd_reno_chat(settings: &Settings, args: RenoChatArgs) -> Result<()> {
    let store = settings.open_store()?;
    let resources = settings.resources()?;
    let reasoner = settings.reasoner()?;
    let reply = reno_chat(
        &store,
        &args.deal,
        reasoner.as_ref(),
        &resources,
        &args.message,
    )?;
    println!("{reply}");
    Ok(())
}

fn cmd_recover(settings: &Settings, args: RecoverArgs) -> Result<()> {
    let store = settings.open_store()?;
    let report = match &args.deal {
        Some(deal) => store.recover(deal)?,
        None => store.recover_all()?,
    };
    print_recovery(&report, settings.root.as_path());
    Ok(())
}

fn cmd_doctor(settings: &Settings) -> Result<()> {
    let mut problems = 0usize;
    println!("root: {}", settings.root.display());
    if settings.config_found {
        println!("config: {}", settings.config_path().display());
    } else {
        println!(
            "config: none (defaults); create {} to customize, e.g.\n{}",
            settings.config_path().display(),
            config_stub()?
        );
    }
    println!("keep_versions: {}", settings.keep_versions());

    match settings.resources() {
        Ok(resources) => println!(
            "resources: {} checklist items, {} stores",
            resources.checklist.len(),
            resources.stores.len()
        ),
        Err(err) => {
            problems += 1;
            println!("resources: error: {err:#}");
        }
    }

    for (label, choice) in [
        ("reasoner", settings.reasoner_choice()),
        ("vision", settings.vision_choice()),
    ] {
        match choice {
            Ok(choice) => {
                println!("{label}: {choice}");
                if let Err(err) = check_command(&choice) {
                    problems += 1;
                    println!("  error: {err:#}");
                }
            }
            Err(err) => {
                problems += 1;
                println!("{label}: not configured ({err:#})");
            }
        }
    }

    let log = settings.lm_log();
    match load_lm_log(log.path()) {
        Ok(entries) => {
            let failed = entries
                .iter()
                .filter(|entry| entry.outcome == LmOutcome::Failed)
                .count();
            println!("lm log: {} call(s), {failed} failed", entries.len());
        }
        Err(err) => {
            problems += 1;
            println!("lm log: error: {err:#}");
        }
    }

    if problems > 0 {
        return Err(anyhow!("{problems} problem(s) found"));
    }
    println!("ok");
    Ok(())
}

/// A command backend's program must resolve on PATH.
fn check_command(choice: &BackendChoice) -> Result<()> {
    let BackendChoice::Command { command } = choice else {
        return Ok(());
    };
    let argv = shell_words::split(command).context("parse command")?;
    let program = argv
        .first()
        .ok_or_else(|| anyhow!("command is empty"))?;
    let resolved = which::which(program).with_context(|| format!("`{program}` not found"))?;
    println!("  resolved: {}", resolved.display());
    Ok(())
}

/// Apply `--file`, `--comps` and `--set` edits in one read-modify-write.
fn apply_input_edit(
    store: &DealStore,
    deal: &str,
    kind: WorkflowKind,
    edit: InputEdit,
) -> Result<Option<InputSet>> {
    if edit.is_empty() {
        return Ok(None);
    }
    let replacement = edit.file.as_deref().map(read_json_file).transpose()?;
    let comps = match edit.comps.as_deref() {
        Some(_) if kind != WorkflowKind::Cma => {
            return Err(anyhow!("--comps only applies to cma inputs"));
        }
        Some(path) => Some(
            cma::read_comps_file(path)
                .with_context(|| format!("load comps from {}", path.display()))?,
        ),
        None => None,
    };
    let fields = edit
        .set
        .iter()
        .map(String::as_str)
        .map(parse_field)
        .collect::<Result<Vec<_>>>()?;

    let saved = store.update_workflow_input(deal, kind, move |current| {
        let mut payload = replacement.unwrap_or(current);
        let map = payload
            .as_object_mut()
            .ok_or_else(|| StoreError::InvalidInput {
                kind,
                message: "the input set must be a JSON object".to_string(),
            })?;
        if let Some(comps) = comps {
            map.insert("comps".to_string(), Value::Array(comps));
        }
        for (key, value) in fields {
            map.insert(key, value);
        }
        Ok(payload)
    })?;
    Ok(Some(saved))
}

fn parse_field(pair: &str) -> Result<(String, Value)> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got `{pair}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("empty key in `{pair}`"));
    }
    let value =
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn read_json_file(path: &Path) -> Result<Value> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
}

fn print_artifacts(deal_root: &Path, store_root: &Path, document: &WorkflowDocument) {
    for (name, rel) in &document.artifacts {
        println!(
            "  {name:<24} {}",
            display_path(&deal_root.join(rel), Some(store_root))
        );
    }
}

fn print_recovery(report: &RecoveryReport, store_root: &Path) {
    if report.is_clean() {
        println!("nothing to recover");
        return;
    }
    for (label, paths) in [
        ("transaction", &report.removed_txns),
        ("orphan version", &report.removed_versions),
        ("temp file", &report.removed_temp_files),
        ("partial deal", &report.removed_partial_deals),
    ] {
        for path in paths {
            println!("removed {label}: {}", display_path(path, Some(store_root)));
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}
