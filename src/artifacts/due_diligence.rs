use super::format::{cell, field, items, Sheet};
use super::Artifact;
use crate::store::Deal;
use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeMap;

pub(super) fn render(deal: &Deal, result: &Value) -> Result<Vec<Artifact>> {
    let results = items(field(result, "results"));
    let mut artifacts = vec![
        Artifact::json("result", "dd_results.json", result)?,
        Artifact::new("spreadsheet", "dd_report.csv", checklist_sheet(results)),
        Artifact::new("evidence", "dd_evidence.csv", evidence_sheet(results)),
        Artifact::text("summary", "dd_report.md", report(deal, results)),
    ];
    if let Some(prompt) = field(result, "job_prompt").as_str() {
        artifacts.push(Artifact::text(
            "job_prompt",
            "dd_job_prompt.md",
            prompt.to_string(),
        ));
    }
    Ok(artifacts)
}

fn status(item: &Value) -> String {
    let status = cell(field(item, "status"));
    if status.is_empty() {
        "PENDING".to_string()
    } else {
        status
    }
}

fn checklist_sheet(results: &[Value]) -> Vec<u8> {
    let mut sheet = Sheet::new();
    sheet.row(["#", "Category", "Item", "Status", "Finding", "Risk", "Source URL", "Notes"]);
    for item in results {
        sheet.row([
            cell(field(item, "item_number")),
            cell(field(item, "category")),
            cell(field(item, "item_name")),
            status(item),
            cell(field(item, "finding_summary")),
            cell(field(item, "risk_level")),
            cell(field(item, "source_url")),
            cell(field(item, "notes")),
        ]);
    }
    sheet.into_bytes()
}

fn evidence_sheet(results: &[Value]) -> Vec<u8> {
    let mut sheet = Sheet::new();
    sheet.row(["Item #", "Item", "Screenshot", "Source URL", "Summary"]);
    for item in results {
        sheet.row([
            cell(field(item, "item_number")),
            cell(field(item, "item_name")),
            cell(field(item, "screenshot_filename")),
            cell(field(item, "source_url")),
            cell(field(item, "finding_summary")),
        ]);
    }
    sheet.into_bytes()
}

fn report(deal: &Deal, results: &[Value]) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Due Diligence Report: {}\n", deal.record.address));

    let mut tally: BTreeMap<String, usize> = BTreeMap::new();
    for item in results {
        *tally.entry(status(item)).or_default() += 1;
    }
    if !tally.is_empty() {
        let counts: Vec<String> = tally
            .iter()
            .map(|(status, count)| format!("{status}: {count}"))
            .collect();
        out.push_str(&format!("\n{} items ({})\n", results.len(), counts.join(", ")));
    }

    // Categories in first-seen order.
    let mut categories: Vec<(String, Vec<&Value>)> = Vec::new();
    for item in results {
        let mut category = cell(field(item, "category"));
        if category.is_empty() {
            category = "Other".to_string();
        }
        match categories.iter_mut().find(|(name, _)| *name == category) {
            Some((_, members)) => members.push(item),
            None => categories.push((category, vec![item])),
        }
    }

    for (category, members) in categories {
        out.push_str(&format!("\n## {category}\n"));
        for item in members {
            let status = status(item);
            out.push_str(&format!(
                "\n### [{status}] {}\n",
                cell(field(item, "item_name"))
            ));
            out.push_str(&format!("- **Status**: {status}\n"));
            out.push_str(&format!("- **Risk**: {}\n", cell(field(item, "risk_level"))));
            let finding = cell(field(item, "finding_summary"));
            if !finding.is_empty() {
                out.push_str(&format!("- **Finding**: {finding}\n"));
            }
            let source = cell(field(item, "source_url"));
            if !source.is_empty() {
                out.push_str(&format!("- **Source**: {source}\n"));
            }
        }
    }
    out
}
