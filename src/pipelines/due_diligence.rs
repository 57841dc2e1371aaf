//! Due diligence: a job prompt for an outside research agent, placeholder
//! results until the agent's findings are uploaded.
use crate::store::{CallRequest, Deal, ExternalCall};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub item_number: u32,
    #[serde(default)]
    pub category: String,
    pub name: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_risk")]
    pub risk_if_fail: String,
}

fn default_source() -> String {
    "TBD".to_string()
}

fn default_risk() -> String {
    "medium".to_string()
}

pub struct DueDiligencePipeline<'a> {
    pub job_template: &'a str,
    pub checklist: &'a [ChecklistItem],
}

impl ExternalCall for DueDiligencePipeline<'_> {
    fn preflight(&self, _request: &CallRequest<'_>) -> Result<(), String> {
        if self.checklist.is_empty() {
            return Err("the DD checklist is empty".to_string());
        }
        Ok(())
    }

    fn call(&self, request: &CallRequest<'_>) -> Result<Value> {
        let prompt = job_prompt(self.job_template, request.deal, request.inputs, self.checklist);
        Ok(json!({
            "results": placeholder_results(self.checklist),
            "job_prompt": prompt,
        }))
    }
}

/// Fill the job template. `state` and `council` in the input set override
/// the deal record.
pub fn job_prompt(
    template: &str,
    deal: &Deal,
    inputs: &Value,
    checklist: &[ChecklistItem],
) -> String {
    let pick = |key: &str, recorded: &str, fallback: &str| -> String {
        inputs
            .get(key)
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .or(Some(recorded).filter(|text| !text.trim().is_empty()))
            .unwrap_or(fallback)
            .to_string()
    };
    let record = &deal.record;
    template
        .replace("{address}", &record.address)
        .replace("{listing_url}", &record.listing_url)
        .replace("{state}", &pick("state", &record.state, "NSW"))
        .replace("{council}", &pick("council", &record.council, "TBD"))
        .replace("{checklist_items}", &checklist_text(checklist))
}

fn checklist_text(checklist: &[ChecklistItem]) -> String {
    checklist
        .iter()
        .map(|item| {
            format!(
                "{}. [{}] {} - Source: {} - Risk: {}",
                item.item_number, item.category, item.name, item.source, item.risk_if_fail
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn placeholder_results(checklist: &[ChecklistItem]) -> Vec<Value> {
    checklist
        .iter()
        .map(|item| {
            json!({
                "item_number": item.item_number,
                "item_name": item.name,
                "category": item.category,
                "status": "PENDING",
                "finding_summary": "Awaiting research results or manual entry",
                "source_url": "",
                "screenshot_filename": "",
                "risk_level": item.risk_if_fail,
                "notes": "",
            })
        })
        .collect()
}

/// Validate an uploaded result: an array of item objects, or an object with
/// a `results` array. Returns `{ "results": [...] }` plus any other keys of
/// the uploaded object.
pub fn normalize_upload(payload: Value) -> Result<Value, String> {
    let mut wrapper = match payload {
        Value::Array(results) => {
            let mut map = serde_json::Map::new();
            map.insert("results".to_string(), Value::Array(results));
            map
        }
        Value::Object(map) => map,
        _ => return Err("expected a JSON array of results or {\"results\": [...]}".to_string()),
    };
    let Some(Value::Array(results)) = wrapper.get("results") else {
        return Err("expected a `results` array".to_string());
    };
    if let Some(bad) = results.iter().position(|item| !item.is_object()) {
        return Err(format!("result #{} is not a JSON object", bad + 1));
    }
    wrapper.remove("job_prompt");
    Ok(Value::Object(wrapper))
}
