//! CLI argument parsing for the deal workflow.
use clap::{Args, Parser, Subcommand};
use property_ops::config::{Backend, Overrides};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "propops",
    version,
    about = "Deal artifact store and sign-off workflow for property analysis",
    after_help = "Examples:\n  propops create \"42 Smith St, Newtown NSW 2042\" --council \"Inner West\"\n  propops photos <deal> ~/listing/*.jpg\n  propops input <deal> cma --comps comps.json\n  propops run <deal> cma --vision\n  propops approve <deal> cma\n  propops run <deal> feasibility --set purchase_price=700000 --set reno_budget=80000\n  propops reno-chat <deal> \"Kitchen and both bathrooms\"\n  propops upload <deal> dd results.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Deal store root (default: $PROPOPS_ROOT, then the per-user data dir)
    #[arg(long, value_name = "DIR", global = true)]
    pub root: Option<PathBuf>,

    /// Log progress to stderr (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Reasoning backend
    #[arg(long, value_enum, value_name = "BACKEND", global = true)]
    pub lm_backend: Option<Backend>,

    /// Shell command for the command reasoning backend
    #[arg(long, value_name = "CMD", global = true)]
    pub lm_command: Option<String>,

    /// Vision backend
    #[arg(long, value_enum, value_name = "BACKEND", global = true)]
    pub vision_backend: Option<Backend>,

    /// Shell command for the command vision backend
    #[arg(long, value_name = "CMD", global = true)]
    pub vision_command: Option<String>,

    /// Artifact versions kept per workflow
    #[arg(long, value_name = "N", global = true)]
    pub keep_versions: Option<usize>,
}

impl GlobalArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            root: self.root.clone(),
            lm_backend: self.lm_backend,
            lm_command: self.lm_command.clone(),
            vision_backend: self.vision_backend,
            vision_command: self.vision_command.clone(),
            keep_versions: self.keep_versions,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Create(CreateArgs),
    List(ListArgs),
    Show(ShowArgs),
    Photos(PhotosArgs),
    Input(InputArgs),
    Vision(VisionArgs),
    Run(RunArgs),
    Upload(UploadArgs),
    Approve(ApproveArgs),
    RenoChat(RenoChatArgs),
    Recover(RecoverArgs),
    /// Check the store root, configuration and model backends
    Doctor,
}

#[derive(Parser, Debug)]
#[command(about = "Open a new deal")]
pub struct CreateArgs {
    /// Property address
    pub address: String,

    #[arg(long, value_name = "URL", default_value = "")]
    pub listing_url: String,

    /// State, for due diligence (e.g. NSW)
    #[arg(long, default_value = "")]
    pub state: String,

    /// Local council, for due diligence
    #[arg(long, default_value = "")]
    pub council: String,

    #[arg(long, default_value = "")]
    pub notes: String,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "List deals with their workflow statuses")]
pub struct ListArgs {
    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Show a deal, its documents and artifacts")]
pub struct ShowArgs {
    pub deal: String,

    /// Include the deal's history
    #[arg(long)]
    pub history: bool,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Add listing photos to a deal, or list them")]
pub struct PhotosArgs {
    pub deal: String,

    /// Photo files to copy in; none lists the current photos
    pub files: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Save or edit a workflow's input set")]
pub struct InputArgs {
    pub deal: String,

    /// cma, feasibility, dd or reno
    pub kind: String,

    #[command(flatten)]
    pub edit: InputEdit,

    /// Print the current input set and exit
    #[arg(long, conflicts_with_all = ["file", "set", "comps"])]
    pub show: bool,
}

#[derive(Args, Debug, Default)]
pub struct InputEdit {
    /// Replace the input set with this JSON file
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Set one field (KEY=VALUE; VALUE parsed as JSON, else taken as text)
    #[arg(long, value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Comparable sales for CMA: a `.csv` export, or JSON (array, or {"comps": [...]})
    #[arg(long, value_name = "PATH")]
    pub comps: Option<PathBuf>,
}

impl InputEdit {
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.set.is_empty() && self.comps.is_none()
    }
}

#[derive(Parser, Debug)]
#[command(about = "Extract property facts from the deal's photos into the CMA inputs")]
pub struct VisionArgs {
    pub deal: String,
}

#[derive(Parser, Debug)]
#[command(about = "Run a workflow and store its artifacts as a new draft")]
pub struct RunArgs {
    pub deal: String,

    /// cma, feasibility, dd or reno
    pub kind: String,

    #[command(flatten)]
    pub edit: InputEdit,

    /// Extract vision facts from the photos before a CMA run
    #[arg(long)]
    pub vision: bool,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Store externally produced results (due diligence) as a new draft")]
pub struct UploadArgs {
    pub deal: String,

    pub kind: String,

    /// JSON results file
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
#[command(about = "Approve (or revoke approval of) a workflow document")]
pub struct ApproveArgs {
    pub deal: String,

    pub kind: String,

    /// Return the document to draft
    #[arg(long)]
    pub revoke: bool,
}

#[derive(Parser, Debug)]
#[command(about = "One turn of the renovation scope interview")]
pub struct RenoChatArgs {
    pub deal: String,

    /// Your reply; may be empty on the first turn
    #[arg(default_value = "")]
    pub message: String,
}

#[derive(Parser, Debug)]
#[command(about = "Remove leftovers of interrupted writes")]
pub struct RecoverArgs {
    /// Deal to recover; all deals when omitted
    pub deal: Option<String>,
}
