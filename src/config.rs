//! Store configuration.
//!
//! Settings come from three places: command-line flags, `<root>/config.json`
//! and the environment, in that order of priority. The store root itself is
//! resolved first (flag, then `PROPOPS_ROOT`, then the per-user data dir)
//! since the config file lives inside it.
use crate::lm::{
    AnthropicClient, CommandLm, GeminiClient, LmLog, Logged, Reasoner, VisionExtractor,
};
use crate::pipelines::{FeasibilityAssumptions, Resources};
use crate::store::{DealStore, StorePaths, DEFAULT_KEEP_VERSIONS};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Environment variables the configuration reads.
pub const ENV_VARS: &[&str] = &[
    "PROPOPS_ROOT",
    "PROPOPS_LM_COMMAND",
    "PROPOPS_VISION_COMMAND",
    "ANTHROPIC_API_KEY",
    "CLAUDE_MODEL",
    "GEMINI_API_KEY",
    "GEMINI_MODEL",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Command,
    Anthropic,
    Gemini,
}

/// `<root>/config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub schema_version: u32,
    pub lm: BackendConfig,
    pub vision: BackendConfig,
    pub keep_versions: usize,
    pub feasibility: FeasibilityAssumptions,
    /// Directory whose prompt files replace the built-in prompts.
    pub prompts_dir: Option<PathBuf>,
    pub dd_checklist_path: Option<PathBuf>,
    pub stores_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            lm: BackendConfig::default(),
            vision: BackendConfig::default(),
            keep_versions: DEFAULT_KEEP_VERSIONS,
            feasibility: FeasibilityAssumptions::default(),
            prompts_dir: None,
            dd_checklist_path: None,
            stores_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    pub backend: Option<Backend>,
    pub command: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend: None,
            command: None,
            model: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root: Option<PathBuf>,
    pub lm_backend: Option<Backend>,
    pub lm_command: Option<String>,
    pub vision_backend: Option<Backend>,
    pub vision_command: Option<String>,
    pub keep_versions: Option<usize>,
}

/// Snapshot of [`ENV_VARS`]; empty values count as unset.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn from_process() -> Self {
        Self::from_pairs(
            ENV_VARS
                .iter()
                .filter_map(|key| std::env::var(key).ok().map(|value| (*key, value))),
        )
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        let vars = pairs
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

/// A resolved model backend.
#[derive(Clone, PartialEq, Eq)]
pub enum BackendChoice {
    Command { command: String },
    Anthropic { api_key: String, model: Option<String> },
    Gemini { api_key: String, model: Option<String> },
}

impl fmt::Debug for BackendChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendChoice::Command { command } => write!(f, "command `{command}`"),
            BackendChoice::Anthropic { model, .. } => write!(
                f,
                "anthropic ({})",
                model.as_deref().unwrap_or(crate::lm::DEFAULT_ANTHROPIC_MODEL)
            ),
            BackendChoice::Gemini { model, .. } => write!(
                f,
                "gemini ({})",
                model.as_deref().unwrap_or(crate::lm::DEFAULT_GEMINI_MODEL)
            ),
        }
    }
}

impl BackendChoice {
    pub fn backend(&self) -> Backend {
        match self {
            BackendChoice::Command { .. } => Backend::Command,
            BackendChoice::Anthropic { .. } => Backend::Anthropic,
            BackendChoice::Gemini { .. } => Backend::Gemini,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub root: PathBuf,
    /// Whether `config.json` existed.
    pub config_found: bool,
    pub config: Config,
    overrides: Overrides,
    env: Environment,
}

impl Settings {
    pub fn load(overrides: Overrides) -> Result<Self> {
        Self::resolve(overrides, Environment::from_process())
    }

    pub fn resolve(overrides: Overrides, env: Environment) -> Result<Self> {
        let root = match (&overrides.root, env.get("PROPOPS_ROOT")) {
            (Some(root), _) => root.clone(),
            (None, Some(root)) => PathBuf::from(root),
            (None, None) => default_root()?,
        };
        let (config, config_found) = load_config(&root)?;
        Ok(Self {
            root,
            config_found,
            config,
            overrides,
            env,
        })
    }

    pub fn config_path(&self) -> PathBuf {
        StorePaths::new(self.root.clone()).config_path()
    }

    pub fn keep_versions(&self) -> usize {
        self.overrides
            .keep_versions
            .unwrap_or(self.config.keep_versions)
    }

    pub fn open_store(&self) -> Result<DealStore> {
        let store = DealStore::open(&self.root)
            .with_context(|| format!("open deal store at {}", self.root.display()))?;
        Ok(store.with_keep_versions(self.keep_versions()))
    }

    pub fn lm_log(&self) -> LmLog {
        LmLog::new(StorePaths::new(self.root.clone()).lm_log_path())
    }

    /// Embedded prompts and lists with any configured file overrides.
    pub fn resources(&self) -> Result<Resources> {
        let mut resources = Resources::embedded()?;
        if let Some(dir) = &self.config.prompts_dir {
            resources = resources.with_prompts_dir(&self.under_root(dir))?;
        }
        if let Some(path) = &self.config.dd_checklist_path {
            resources = resources.with_checklist_file(&self.under_root(path))?;
        }
        if let Some(path) = &self.config.stores_path {
            resources = resources.with_stores_file(&self.under_root(path))?;
        }
        Ok(resources)
    }

    fn under_root(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// The reasoning backend: explicit choice, else a configured command,
    /// else whichever API key is present.
    pub fn reasoner_choice(&self) -> Result<BackendChoice> {
        let command = self
            .overrides
            .lm_command
            .clone()
            .or_else(|| self.config.lm.command.clone())
            .or_else(|| self.env.get("PROPOPS_LM_COMMAND").map(str::to_string));
        let backend = self.overrides.lm_backend.or(self.config.lm.backend);
        self.choose(
            backend,
            command,
            &self.config.lm,
            "PROPOPS_LM_COMMAND",
            &[Backend::Anthropic, Backend::Gemini],
        )
    }

    /// The vision backend: explicit choice, else a configured command, else
    /// Gemini when its key is present.
    pub fn vision_choice(&self) -> Result<BackendChoice> {
        let command = self
            .overrides
            .vision_command
            .clone()
            .or_else(|| self.config.vision.command.clone())
            .or_else(|| self.env.get("PROPOPS_VISION_COMMAND").map(str::to_string));
        let backend = self.overrides.vision_backend.or(self.config.vision.backend);
        let choice = self.choose(
            backend,
            command,
            &self.config.vision,
            "PROPOPS_VISION_COMMAND",
            &[Backend::Gemini],
        )?;
        if choice.backend() == Backend::Anthropic {
            return Err(anyhow!(
                "the anthropic backend cannot read photos; use gemini or a vision command"
            ));
        }
        Ok(choice)
    }

    fn choose(
        &self,
        backend: Option<Backend>,
        command: Option<String>,
        config: &BackendConfig,
        command_var: &str,
        fallbacks: &[Backend],
    ) -> Result<BackendChoice> {
        let backend = match (backend, &command) {
            (Some(backend), _) => backend,
            (None, Some(_)) => Backend::Command,
            (None, None) => fallbacks
                .iter()
                .copied()
                .find(|backend| self.api_key(*backend).is_some())
                .ok_or_else(|| {
                    anyhow!(
                        "no model backend configured: set {command_var}, an API key, \
                         or a backend in {}",
                        self.config_path().display()
                    )
                })?,
        };
        match backend {
            Backend::Command => {
                let command = command
                    .ok_or_else(|| anyhow!("command backend selected but {command_var} is not set"))?;
                Ok(BackendChoice::Command { command })
            }
            Backend::Anthropic => Ok(BackendChoice::Anthropic {
                api_key: self.required_key(backend)?,
                model: config
                    .model
                    .clone()
                    .or_else(|| self.env.get("CLAUDE_MODEL").map(str::to_string)),
            }),
            Backend::Gemini => Ok(BackendChoice::Gemini {
                api_key: self.required_key(backend)?,
                model: config
                    .model
                    .clone()
                    .or_else(|| self.env.get("GEMINI_MODEL").map(str::to_string)),
            }),
        }
    }

    fn api_key(&self, backend: Backend) -> Option<&str> {
        match backend {
            Backend::Command => None,
            Backend::Anthropic => self.env.get("ANTHROPIC_API_KEY"),
            Backend::Gemini => self.env.get("GEMINI_API_KEY"),
        }
    }

    fn required_key(&self, backend: Backend) -> Result<String> {
        let var = match backend {
            Backend::Gemini => "GEMINI_API_KEY",
            _ => "ANTHROPIC_API_KEY",
        };
        self.api_key(backend)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("{var} is not set"))
    }

    /// Build the configured reasoner; every call is appended to the LM log.
    pub fn reasoner(&self) -> Result<Box<dyn Reasoner>> {
        let choice = self.reasoner_choice()?;
        let timeout = Duration::from_secs(self.config.lm.timeout_secs);
        tracing::debug!(backend = %choice, "reasoner");
        let log = self.lm_log();
        Ok(match choice {
            BackendChoice::Command { command } => {
                Box::new(Logged::new(CommandLm::new(command), "command", log))
            }
            BackendChoice::Anthropic { api_key, model } => Box::new(Logged::new(
                AnthropicClient::new(api_key, model, timeout),
                "anthropic",
                log,
            )),
            BackendChoice::Gemini { api_key, model } => Box::new(Logged::new(
                GeminiClient::new(api_key, model, timeout),
                "gemini",
                log,
            )),
        })
    }

    pub fn vision(&self) -> Result<Box<dyn VisionExtractor>> {
        let choice = self.vision_choice()?;
        let timeout = Duration::from_secs(self.config.vision.timeout_secs);
        tracing::debug!(backend = %choice, "vision extractor");
        let log = self.lm_log();
        match choice {
            BackendChoice::Command { command } => Ok(Box::new(Logged::new(
                CommandLm::new(command),
                "command",
                log,
            ))),
            BackendChoice::Gemini { api_key, model } => Ok(Box::new(Logged::new(
                GeminiClient::new(api_key, model, timeout),
                "gemini",
                log,
            ))),
            BackendChoice::Anthropic { .. } => {
                Err(anyhow!("the anthropic backend cannot read photos"))
            }
        }
    }
}

/// `~/.local/share/propops/deals` or the platform equivalent.
pub fn default_root() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("cannot determine home directory; pass --root"))?;
    Ok(data_dir.join("propops").join("deals"))
}

/// Load `<root>/config.json`; a missing file yields defaults.
pub fn load_config(root: &Path) -> Result<(Config, bool)> {
    let path = StorePaths::new(root.to_path_buf()).config_path();
    if !path.is_file() {
        return Ok((Config::default(), false));
    }
    let bytes = fs::read(&path).with_context(|| format!("read config {}", path.display()))?;
    let config: Config = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config {}", path.display()))?;
    validate_config(&config)?;
    Ok((config, true))
}

fn validate_config(config: &Config) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.keep_versions == 0 {
        return Err(anyhow!("keep_versions must be at least 1"));
    }
    Ok(())
}

/// Pretty JSON of the default configuration, for `doctor`.
pub fn config_stub() -> Result<String> {
    serde_json::to_string_pretty(&Config::default()).context("serialize config stub")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
