//! The four workflows, each an [`ExternalCall`] the store dispatches to.
//!
//! CMA, Feasibility commentary and Reno go to the reasoner; Due Diligence
//! is produced locally and completed by upload. Vision extraction is not a
//! workflow of its own: it feeds the CMA input set.
pub mod cma;
pub mod comps_table;
pub mod due_diligence;
pub mod feasibility;
pub mod reno;
mod vision;

use crate::lm::Reasoner;
use crate::store::{ExternalCall, WorkflowKind};
use crate::templates;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

pub use due_diligence::ChecklistItem;
pub use feasibility::FeasibilityAssumptions;
pub use reno::reno_chat;
pub use vision::extract_vision;

/// Prompts and reference lists the pipelines run with.
#[derive(Debug, Clone)]
pub struct Resources {
    pub cma_prompt: String,
    pub vision_prompt: String,
    pub feasibility_prompt: String,
    pub dd_job_template: String,
    pub reno_prompt: String,
    pub checklist: Vec<ChecklistItem>,
    pub stores: Vec<Value>,
}

#[derive(Deserialize)]
struct ChecklistFile {
    checklist: Vec<ChecklistItem>,
}

#[derive(Deserialize)]
struct StoresFile {
    stores: Vec<Value>,
}

impl Resources {
    /// The prompts and lists compiled into the binary.
    pub fn embedded() -> Result<Self> {
        Ok(Self {
            cma_prompt: templates::CMA_REASONING_PROMPT_MD.to_string(),
            vision_prompt: templates::VISION_EXTRACTION_PROMPT_MD.to_string(),
            feasibility_prompt: templates::FEASIBILITY_REASONING_PROMPT_MD.to_string(),
            dd_job_template: templates::DD_JOB_PROMPT_MD.to_string(),
            reno_prompt: templates::RENO_INTERVIEW_PROMPT_MD.to_string(),
            checklist: parse_checklist(templates::DD_CHECKLIST_JSON)
                .context("parse embedded DD checklist")?,
            stores: parse_stores(templates::STORES_JSON).context("parse embedded stores list")?,
        })
    }

    /// Replace any prompt for which `dir` holds a file of the same name.
    pub fn with_prompts_dir(mut self, dir: &Path) -> Result<Self> {
        for (file, slot) in [
            ("cma_reasoning.md", &mut self.cma_prompt),
            ("vision_extraction.md", &mut self.vision_prompt),
            ("feasibility_reasoning.md", &mut self.feasibility_prompt),
            ("dd_job.md", &mut self.dd_job_template),
            ("reno_interview.md", &mut self.reno_prompt),
        ] {
            let path = dir.join(file);
            if path.is_file() {
                *slot = fs::read_to_string(&path)
                    .with_context(|| format!("read prompt {}", path.display()))?;
                tracing::debug!(path = %path.display(), "prompt override");
            }
        }
        Ok(self)
    }

    pub fn with_checklist_file(mut self, path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read DD checklist {}", path.display()))?;
        self.checklist =
            parse_checklist(&text).with_context(|| format!("parse {}", path.display()))?;
        Ok(self)
    }

    pub fn with_stores_file(mut self, path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read stores list {}", path.display()))?;
        self.stores = parse_stores(&text).with_context(|| format!("parse {}", path.display()))?;
        Ok(self)
    }
}

fn parse_checklist(text: &str) -> Result<Vec<ChecklistItem>> {
    Ok(serde_json::from_str::<ChecklistFile>(text)?.checklist)
}

fn parse_stores(text: &str) -> Result<Vec<Value>> {
    Ok(serde_json::from_str::<StoresFile>(text)?.stores)
}

/// Collaborators shared by every workflow, resolved once per command.
pub struct Pipelines<'a> {
    reasoner: &'a dyn Reasoner,
    resources: &'a Resources,
    assumptions: &'a FeasibilityAssumptions,
}

impl<'a> Pipelines<'a> {
    pub fn new(
        reasoner: &'a dyn Reasoner,
        resources: &'a Resources,
        assumptions: &'a FeasibilityAssumptions,
    ) -> Self {
        Self {
            reasoner,
            resources,
            assumptions,
        }
    }

    pub fn for_kind(&self, kind: WorkflowKind) -> Box<dyn ExternalCall + 'a> {
        match kind {
            WorkflowKind::Cma => Box::new(cma::CmaPipeline {
                reasoner: self.reasoner,
                system_prompt: &self.resources.cma_prompt,
            }),
            WorkflowKind::Feasibility => Box::new(feasibility::FeasibilityPipeline {
                reasoner: self.reasoner,
                system_prompt: &self.resources.feasibility_prompt,
                assumptions: self.assumptions,
            }),
            WorkflowKind::DueDiligence => Box::new(due_diligence::DueDiligencePipeline {
                job_template: &self.resources.dd_job_template,
                checklist: &self.resources.checklist,
            }),
            WorkflowKind::Reno => Box::new(reno::RenoPipeline {
                reasoner: self.reasoner,
                system_prompt: reno::system_prompt(
                    &self.resources.reno_prompt,
                    &self.resources.stores,
                ),
            }),
        }
    }
}

/// A dollar amount or count from user input: a number, or a string such as
/// `"$850,000"`.
pub(crate) fn amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let cleaned: String = text
                .trim()
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | '_' | ' '))
                .collect();
            cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}
