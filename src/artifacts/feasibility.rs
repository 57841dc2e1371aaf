use super::format::{cell, field, items, money, percent, Sheet};
use super::Artifact;
use crate::store::Deal;
use anyhow::Result;
use serde_json::Value;

pub(super) fn render(deal: &Deal, result: &Value) -> Result<Vec<Artifact>> {
    Ok(vec![
        Artifact::json("result", "feasibility_result.json", result)?,
        Artifact::new("spreadsheet", "feasibility_report.csv", spreadsheet(result)),
        Artifact::text("summary", "feasibility_summary.md", summary(deal, result)),
    ])
}

enum Unit {
    Money,
    Percent,
    Count,
}

const SECTIONS: &[(&str, &str, &[(&str, &str, Unit)])] = &[
    (
        "PURCHASE ANALYSIS",
        "purchase_analysis",
        &[
            ("Asking Price", "asking_price", Unit::Money),
            ("Purchase Price", "purchase_price", Unit::Money),
            ("CMA Value Low", "cma_value_low", Unit::Money),
            ("CMA Value High", "cma_value_high", Unit::Money),
            ("Stamp Duty", "stamp_duty", Unit::Money),
            ("Legal / Conveyancing", "legal_conveyancing", Unit::Money),
            ("Building & Pest", "building_pest_inspection", Unit::Money),
            ("Total Acquisition Cost", "total_acquisition_cost", Unit::Money),
        ],
    ),
    (
        "RENOVATION",
        "renovation",
        &[
            ("Reno Budget", "reno_budget", Unit::Money),
            ("Contingency %", "contingency_pct", Unit::Percent),
            ("Contingency Amount", "contingency_amount", Unit::Money),
            ("Total Reno Cost", "total_reno_cost", Unit::Money),
        ],
    ),
    (
        "HOLDING COSTS",
        "holding_costs",
        &[
            ("Hold Period (months)", "hold_period_months", Unit::Count),
            ("Loan Amount", "loan_amount", Unit::Money),
            ("Finance Cost / month", "finance_cost_monthly", Unit::Money),
            ("Council Rates / month", "council_rates_monthly", Unit::Money),
            ("Water / month", "water_rates_monthly", Unit::Money),
            ("Insurance / month", "insurance_monthly", Unit::Money),
            ("Land Tax / month", "land_tax_monthly", Unit::Money),
            ("Utilities / month", "utilities_monthly", Unit::Money),
            ("Total Monthly", "total_monthly", Unit::Money),
            ("Total Holding Cost", "total_holding_cost", Unit::Money),
        ],
    ),
    (
        "SELLING COSTS",
        "selling",
        &[
            ("Sale Price", "estimated_sale_price", Unit::Money),
            ("Commission %", "agent_commission_pct", Unit::Percent),
            ("Commission $", "agent_commission_amount", Unit::Money),
            ("Marketing", "marketing_cost", Unit::Money),
            ("Legal (selling)", "legal_selling", Unit::Money),
            ("Styling", "styling", Unit::Money),
            ("Total Selling Cost", "total_selling_cost", Unit::Money),
        ],
    ),
    (
        "PROFITABILITY",
        "profitability",
        &[
            ("Total Cost In", "total_cost_in", Unit::Money),
            ("Total Invested", "total_invested", Unit::Money),
            ("Sale Price", "estimated_sale_price", Unit::Money),
            ("Gross Profit", "gross_profit", Unit::Money),
            ("Net Profit", "net_profit", Unit::Money),
            ("ROI %", "roi_pct", Unit::Percent),
            ("Margin %", "margin_pct", Unit::Percent),
            ("Profit / Month", "profit_per_month", Unit::Money),
            ("Annualised ROI %", "annualised_roi_pct", Unit::Percent),
        ],
    ),
    (
        "MAX PURCHASE PRICE",
        "max_purchase_price",
        &[
            ("Target Profit", "target_profit", Unit::Money),
            ("Target ROI %", "target_roi_pct", Unit::Percent),
            ("Max Purchase Price", "max_purchase_to_hit_target", Unit::Money),
        ],
    ),
];

fn spreadsheet(result: &Value) -> Vec<u8> {
    let mut sheet = Sheet::new();
    for (title, key, rows) in SECTIONS {
        let section = field(result, key);
        sheet.section(title);
        for (label, row_key, unit) in rows.iter() {
            let value = field(section, row_key);
            let text = match unit {
                Unit::Money => money(value),
                Unit::Percent => percent(value),
                Unit::Count => cell(value),
            };
            sheet.kv(label, text);
        }
    }

    let sensitivity = items(field(result, "sensitivity"));
    if !sensitivity.is_empty() {
        sheet.section("SENSITIVITY ANALYSIS");
        sheet.row(["Scenario", "Impact on Profit", "Still Viable?"]);
        for scenario in sensitivity {
            sheet.row([
                cell(field(scenario, "scenario")),
                cell(field(scenario, "impact_on_profit")),
                viable(scenario).to_string(),
            ]);
        }
    }

    let breakers = items(field(result, "deal_breakers"));
    if !breakers.is_empty() {
        sheet.section("DEAL BREAKERS");
        for breaker in breakers {
            sheet.row([cell(breaker)]);
        }
    }

    let verdict = cell(field(result, "go_no_go"));
    if !verdict.is_empty() {
        sheet.section(&format!("VERDICT: {verdict}"));
        sheet.row([cell(field(result, "reasoning"))]);
    }
    sheet.into_bytes()
}

fn viable(scenario: &Value) -> &'static str {
    if field(scenario, "still_viable").as_bool().unwrap_or(false) {
        "Yes"
    } else {
        "No"
    }
}

fn summary(deal: &Deal, result: &Value) -> String {
    let purchase = field(result, "purchase_analysis");
    let profit = field(result, "profitability");
    let max_purchase = field(result, "max_purchase_price");

    let mut out = String::new();
    out.push_str(&format!("# Feasibility Report: {}\n\n", deal.record.address));
    out.push_str("## Summary\n");
    out.push_str(&format!(
        "- **Purchase Price**: {}\n",
        money(field(purchase, "purchase_price"))
    ));
    out.push_str(&format!(
        "- **Total Cost In**: {}\n",
        money(field(profit, "total_cost_in"))
    ));
    out.push_str(&format!(
        "- **Sale Price**: {}\n",
        money(field(profit, "estimated_sale_price"))
    ));
    out.push_str(&format!("- **Net Profit**: {}\n", money(field(profit, "net_profit"))));
    out.push_str(&format!("- **ROI**: {}\n", percent(field(profit, "roi_pct"))));
    out.push_str(&format!("- **Margin**: {}\n", percent(field(profit, "margin_pct"))));
    out.push_str(&format!(
        "- **Max Purchase (for target)**: {}\n",
        money(field(max_purchase, "max_purchase_to_hit_target"))
    ));

    let verdict = cell(field(result, "go_no_go"));
    if !verdict.is_empty() {
        out.push_str(&format!(
            "\n## Verdict: {verdict}\n{}\n",
            cell(field(result, "reasoning"))
        ));
    }

    let sensitivity = items(field(result, "sensitivity"));
    if !sensitivity.is_empty() {
        out.push_str("\n## Sensitivity\n");
        for scenario in sensitivity {
            out.push_str(&format!(
                "- {}: {} (still viable: {})\n",
                cell(field(scenario, "scenario")),
                cell(field(scenario, "impact_on_profit")),
                viable(scenario)
            ));
        }
    }

    let breakers = items(field(result, "deal_breakers"));
    if !breakers.is_empty() {
        out.push_str("\n## Deal Breakers\n");
        for breaker in breakers {
            out.push_str(&format!("- {}\n", cell(breaker)));
        }
    }
    out
}
