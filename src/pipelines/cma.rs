//! Comparative market analysis: comps plus vision facts go to the reasoner.
use super::vision::vision_facts;
use crate::lm::Reasoner;
use crate::store::{CallRequest, ExternalCall};
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

pub struct CmaPipeline<'a> {
    pub reasoner: &'a dyn Reasoner,
    pub system_prompt: &'a str,
}

impl ExternalCall for CmaPipeline<'_> {
    fn preflight(&self, request: &CallRequest<'_>) -> Result<(), String> {
        if comps(request.inputs).is_empty() {
            return Err("at least one comparable sale is required (set `comps`)".to_string());
        }
        Ok(())
    }

    fn call(&self, request: &CallRequest<'_>) -> Result<Value> {
        let record = &request.deal.record;
        let message = json!({
            "subject_property": {
                "address": record.address,
                "listing_url": record.listing_url,
                "notes": record.notes,
                "vision_extraction": vision_facts(request.inputs).cloned().unwrap_or_else(|| json!({})),
            },
            "comparable_sales": comps(request.inputs),
        });
        let message = serde_json::to_string_pretty(&message)?;
        let result = self.reasoner.reason(self.system_prompt, &message)?;
        if !result.is_object() {
            return Err(anyhow!("CMA reply was not a JSON object"));
        }
        Ok(result)
    }
}

/// Comparable sales from a CMA input set (`comps`, or `comparable_sales`).
pub fn comps(inputs: &Value) -> &[Value] {
    ["comps", "comparable_sales"]
        .iter()
        .find_map(|key| inputs.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Accept a comps file as a bare array or as `{ "comps": [...] }`.
pub fn load_comps(value: Value) -> Result<Vec<Value>> {
    let list = match value {
        Value::Array(list) => list,
        Value::Object(mut map) => match map.remove("comps") {
            Some(Value::Array(list)) => list,
            _ => return Err(anyhow!("expected a JSON array of comps or {{\"comps\": [...]}}")),
        },
        _ => return Err(anyhow!("expected a JSON array of comps or {{\"comps\": [...]}}")),
    };
    if let Some(bad) = list.iter().position(|comp| !comp.is_object()) {
        return Err(anyhow!("comp #{} is not a JSON object", bad + 1));
    }
    Ok(list)
}

/// Read comps from a `.csv` export or a JSON file.
pub fn read_comps_file(path: &Path) -> Result<Vec<Value>> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        return super::comps_table::comps_from_csv(&bytes);
    }
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse {} as JSON", path.display()))?;
    load_comps(value)
}

/// The valuation block of a CMA result. Results that put the value range at
/// the top level are their own valuation block.
pub fn valuation(result: &Value) -> &Value {
    match result.get("valuation") {
        Some(block) if block.is_object() => block,
        _ => result,
    }
}

/// `(value_range_low, value_range_high)` of a CMA result.
pub fn value_range(result: &Value) -> (Option<f64>, Option<f64>) {
    let block = valuation(result);
    (
        block.get("value_range_low").and_then(super::amount),
        block.get("value_range_high").and_then(super::amount),
    )
}
