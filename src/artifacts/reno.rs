use super::format::{cell, field, file_stem, items, money, Sheet};
use super::Artifact;
use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeSet;

pub(super) fn render(result: &Value) -> Result<Vec<Artifact>> {
    let mut artifacts = vec![Artifact::json("result", "reno_plan.json", result)?];
    if field(result, "parse_error").as_bool().unwrap_or(false) {
        return Ok(artifacts);
    }

    artifacts.push(Artifact::new("product_list", "product_list.csv", product_list(result)));
    artifacts.push(Artifact::new("quote_tracker", "quote_tracker.csv", quote_tracker(result)));
    artifacts.push(Artifact::new("timeline", "timeline.csv", timeline(result)));

    let mut used = BTreeSet::new();
    for package in items(field(result, "trade_packages")) {
        let mut stem = file_stem(&cell(field(package, "trade")));
        if !used.insert(stem.clone()) {
            let mut n = 2;
            while !used.insert(format!("{stem}_{n}")) {
                n += 1;
            }
            stem = format!("{stem}_{n}");
        }
        artifacts.push(Artifact::text(
            format!("trade_scope:{stem}"),
            format!("trade_scopes/{stem}_scope.md"),
            cell(field(package, "scope_document")),
        ));
        let email = cell(field(package, "quote_email_template"));
        if !email.is_empty() {
            artifacts.push(Artifact::text(
                format!("quote_email:{stem}"),
                format!("trade_scopes/{stem}_quote_email.md"),
                email,
            ));
        }
    }
    Ok(artifacts)
}

fn product_list(plan: &Value) -> Vec<u8> {
    let mut sheet = Sheet::new();
    sheet.section("PRODUCT PROCUREMENT PLAN");
    sheet.row([
        "Category",
        "Item",
        "Room",
        "Budget Low",
        "Budget High",
        "Preferred Store",
        "When to Order",
        "Alternatives",
        "Notes",
    ]);
    for product in items(field(plan, "product_list")) {
        sheet.row([
            cell(field(product, "category")),
            cell(field(product, "item_description")),
            cell(field(product, "room")),
            money(field(product, "budget_estimate_low")),
            money(field(product, "budget_estimate_high")),
            cell(field(product, "preferred_stores")),
            cell(field(product, "when_to_order")),
            cell(field(product, "alternatives")),
            cell(field(product, "notes")),
        ]);
    }

    let budget = field(plan, "total_budget_estimate");
    if budget.is_object() {
        sheet.section("BUDGET SUMMARY");
        sheet.kv("Budget Low", money(field(budget, "low")));
        sheet.kv("Budget High", money(field(budget, "high")));
        sheet.kv("Notes", cell(field(budget, "notes")));
    }
    sheet.into_bytes()
}

fn quote_tracker(plan: &Value) -> Vec<u8> {
    let mut sheet = Sheet::new();
    sheet.section("TRADIE QUOTE TRACKER");
    sheet.row([
        "Trade",
        "Company",
        "Contact",
        "Phone",
        "Email",
        "Quote Amount",
        "Quote Date",
        "Available Start",
        "Status",
        "Notes",
    ]);
    for trade in items(field(plan, "scope_by_trade")) {
        sheet.row([
            cell(field(trade, "trade")).as_str(),
            "",
            "",
            "",
            "",
            "",
            "",
            "",
            "Not quoted",
            "",
        ]);
    }
    sheet.into_bytes()
}

fn timeline(plan: &Value) -> Vec<u8> {
    let mut sheet = Sheet::new();
    sheet.section("RENOVATION TIMELINE");
    sheet.row([
        "Phase",
        "Name",
        "Trades",
        "Duration (days)",
        "Dependencies",
        "Start Date",
        "Notes",
    ]);
    for phase in items(field(plan, "timeline")) {
        sheet.row([
            cell(field(phase, "phase")),
            cell(field(phase, "name")),
            cell(field(phase, "trades")),
            cell(field(phase, "duration_days")),
            cell(field(phase, "dependencies")),
            String::new(),
            cell(field(phase, "notes")),
        ]);
    }
    sheet.into_bytes()
}
