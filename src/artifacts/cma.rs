use super::format::{cell, field, items, money, ratio_percent, Sheet};
use super::Artifact;
use crate::pipelines::cma::valuation;
use crate::store::{Deal, WorkflowKind};
use anyhow::Result;
use serde_json::Value;

pub(super) fn render(deal: &Deal, result: &Value) -> Result<Vec<Artifact>> {
    Ok(vec![
        Artifact::json("result", "cma_result.json", result)?,
        Artifact::new("spreadsheet", "cma_report.csv", spreadsheet(deal, result)),
        Artifact::text("summary", "cma_summary.md", summary(deal, result)),
    ])
}

/// Subject facts from the model, falling back to what vision extracted.
fn subject_fact<'a>(deal: &'a Deal, result: &'a Value, key: &str, vision_key: &str) -> &'a Value {
    let from_model = field(field(result, "subject_summary"), key);
    if !from_model.is_null() {
        return from_model;
    }
    deal.input(WorkflowKind::Cma)
        .map(|input| field(field(&input.payload, "vision"), vision_key))
        .unwrap_or(from_model)
}

fn spreadsheet(deal: &Deal, result: &Value) -> Vec<u8> {
    let mut sheet = Sheet::new();

    sheet.section("SUBJECT PROPERTY");
    sheet.kv("Address", &deal.record.address);
    for (label, key, vision_key) in [
        ("Property Type", "property_type", "property_type"),
        ("Bedrooms", "beds", "bedrooms"),
        ("Bathrooms", "baths", "bathrooms"),
        ("Car Spaces", "cars", "car_spaces"),
        ("Land Area (sqm)", "land_sqm", "land_area_sqm"),
        ("Building Area (sqm)", "building_sqm", "building_area_sqm"),
        ("Condition", "condition", "condition_overall"),
        ("Finish Level", "finish_level", "finish_level"),
    ] {
        sheet.kv(label, cell(subject_fact(deal, result, key, vision_key)));
    }
    sheet.kv("Listing URL", &deal.record.listing_url);

    let comps = items(field(result, "comps_analysis"));
    sheet.section("COMPARABLE SALES ANALYSIS");
    sheet.row([
        "Address",
        "Sold Price",
        "Sold Date",
        "Beds",
        "Baths",
        "Cars",
        "Land (sqm)",
        "Tag",
        "Adjusted Price",
        "Weight",
        "Reasoning",
    ]);
    for comp in comps {
        sheet.row([
            cell(field(comp, "address")),
            money(field(comp, "sold_price")),
            cell(field(comp, "sold_date")),
            cell(field(comp, "beds")),
            cell(field(comp, "baths")),
            cell(field(comp, "cars")),
            cell(field(comp, "land_sqm")),
            cell(field(comp, "similarity_tag")),
            money(field(comp, "adjusted_price")),
            ratio_percent(field(comp, "weight")),
            cell(field(comp, "similarity_reasoning")),
        ]);
    }

    if comps
        .iter()
        .any(|comp| !items(field(comp, "adjustments")).is_empty())
    {
        sheet.section("ADJUSTMENT DETAILS");
        sheet.row(["Comparable", "Factor", "Direction", "Amount (%)", "Reasoning"]);
        for comp in comps {
            for adjustment in items(field(comp, "adjustments")) {
                sheet.row([
                    cell(field(comp, "address")),
                    cell(field(adjustment, "factor")),
                    cell(field(adjustment, "direction")),
                    cell(field(adjustment, "amount_pct")),
                    cell(field(adjustment, "reasoning")),
                ]);
            }
        }
    }

    let valuation = valuation(result);
    sheet.section("VALUATION");
    sheet.kv("Methodology", cell(field(valuation, "methodology")));
    for (label, key) in [
        ("Weighted Average", "weighted_average"),
        ("Value Range Low", "value_range_low"),
        ("Value Range High", "value_range_high"),
        ("Point Estimate", "point_estimate"),
    ] {
        sheet.kv(label, money(field(valuation, key)));
    }
    sheet.kv(
        "Confidence Score",
        ratio_percent(field(valuation, "confidence_score")),
    );
    sheet.kv(
        "Confidence Reasoning",
        cell(field(valuation, "confidence_reasoning")),
    );

    let assumptions = items(field(valuation, "assumptions"));
    let caveats = items(field(valuation, "caveats"));
    if !assumptions.is_empty() || !caveats.is_empty() {
        sheet.section("ASSUMPTIONS & CAVEATS");
        for assumption in assumptions {
            sheet.kv("Assumption", cell(assumption));
        }
        for caveat in caveats {
            sheet.kv("Caveat", cell(caveat));
        }
    }

    sheet.into_bytes()
}

fn summary(deal: &Deal, result: &Value) -> String {
    let subject = field(result, "subject_summary");
    let valuation = valuation(result);
    let or_unknown = |value: &Value| {
        let text = cell(value);
        if text.is_empty() {
            "?".to_string()
        } else {
            text
        }
    };

    let mut out = String::new();
    out.push_str(&format!("# CMA Report: {}\n\n", deal.record.address));

    out.push_str("## Subject Property\n");
    out.push_str(&format!("- **Address**: {}\n", deal.record.address));
    out.push_str(&format!("- **Type**: {}\n", cell(field(subject, "property_type"))));
    out.push_str(&format!(
        "- **Beds/Baths/Cars**: {}/{}/{}\n",
        or_unknown(field(subject, "beds")),
        or_unknown(field(subject, "baths")),
        or_unknown(field(subject, "cars"))
    ));
    out.push_str(&format!("- **Land**: {} sqm\n", or_unknown(field(subject, "land_sqm"))));
    out.push_str(&format!("- **Condition**: {}\n", cell(field(subject, "condition"))));
    out.push_str(&format!("- **Finish**: {}\n\n", cell(field(subject, "finish_level"))));

    out.push_str("## Valuation\n");
    out.push_str(&format!(
        "- **Value Range**: {} to {}\n",
        money(field(valuation, "value_range_low")),
        money(field(valuation, "value_range_high"))
    ));
    if !field(valuation, "point_estimate").is_null() {
        out.push_str(&format!(
            "- **Point Estimate**: {}\n",
            money(field(valuation, "point_estimate"))
        ));
    }
    if !field(valuation, "confidence_score").is_null() {
        out.push_str(&format!(
            "- **Confidence**: {}\n",
            ratio_percent(field(valuation, "confidence_score"))
        ));
    }
    if !field(valuation, "methodology").is_null() {
        out.push_str(&format!(
            "- **Methodology**: {}\n",
            cell(field(valuation, "methodology"))
        ));
    }

    let comps = items(field(result, "comps_analysis"));
    if !comps.is_empty() {
        out.push_str("\n## Comparable Sales\n\n");
        out.push_str("| Address | Sold Price | Tag | Adjusted | Weight |\n");
        out.push_str("|---------|-----------|-----|----------|--------|\n");
        for comp in comps {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                cell(field(comp, "address")),
                money(field(comp, "sold_price")),
                cell(field(comp, "similarity_tag")),
                money(field(comp, "adjusted_price")),
                ratio_percent(field(comp, "weight"))
            ));
        }
    }

    for (heading, key) in [
        ("Market Commentary", "market_commentary"),
        ("Recommendations", "recommendations"),
    ] {
        let text = cell(field(result, key));
        if !text.is_empty() {
            out.push_str(&format!("\n## {heading}\n{text}\n"));
        }
    }
    out
}
