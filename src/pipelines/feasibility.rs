//! Renovate-and-resell feasibility: a local calculator, then reasoner
//! commentary merged into the model.
use super::{amount, cma};
use crate::lm::Reasoner;
use crate::store::{CallRequest, Deal, ExternalCall, WorkflowKind};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Cost assumptions and investor targets. Rates are percentages, costs are
/// dollars, holding costs are per month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeasibilityAssumptions {
    pub stamp_duty_rate_pct: f64,
    pub legal_conveyancing: f64,
    pub building_pest_inspection: f64,
    pub other_acquisition: f64,

    pub contingency_pct: f64,

    pub finance_lvr_pct: f64,
    pub finance_interest_rate_annual_pct: f64,
    pub council_rates: f64,
    pub water_rates: f64,
    pub insurance: f64,
    pub land_tax_monthly: f64,
    pub utilities: f64,
    pub other_holding: f64,

    pub agent_commission_pct: f64,
    pub marketing: f64,
    pub legal_selling: f64,
    pub styling: f64,
    pub other_selling: f64,

    pub default_hold_period_months: u32,
    pub target_profit_min: f64,
    pub target_roi_min_pct: f64,
    pub target_margin_min_pct: f64,
}

impl Default for FeasibilityAssumptions {
    fn default() -> Self {
        Self {
            stamp_duty_rate_pct: 4.5,
            legal_conveyancing: 2500.0,
            building_pest_inspection: 800.0,
            other_acquisition: 0.0,
            contingency_pct: 15.0,
            finance_lvr_pct: 80.0,
            finance_interest_rate_annual_pct: 6.5,
            council_rates: 350.0,
            water_rates: 150.0,
            insurance: 250.0,
            land_tax_monthly: 0.0,
            utilities: 100.0,
            other_holding: 0.0,
            agent_commission_pct: 2.0,
            marketing: 5000.0,
            legal_selling: 1500.0,
            styling: 3000.0,
            other_selling: 0.0,
            default_hold_period_months: 6,
            target_profit_min: 50000.0,
            target_roi_min_pct: 15.0,
            target_margin_min_pct: 10.0,
        }
    }
}

/// Deal-specific numbers, resolved from the input set and the CMA.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DealParameters {
    pub asking_price: f64,
    pub purchase_price: f64,
    pub reno_budget: f64,
    pub post_reno_sale_price: f64,
    pub hold_period_months: u32,
    pub state: String,
}

impl DealParameters {
    /// Missing asking price falls back to the purchase price; missing sale
    /// price (or `"cma"`) falls back to the CMA high value.
    pub fn resolve(
        inputs: &Value,
        deal: &Deal,
        cma_result: Option<&Value>,
        assumptions: &FeasibilityAssumptions,
    ) -> Result<Self, String> {
        let purchase_price = inputs
            .get("purchase_price")
            .and_then(amount)
            .filter(|price| *price > 0.0)
            .ok_or("`purchase_price` is required and must be positive")?;
        let asking_price = inputs
            .get("asking_price")
            .and_then(amount)
            .unwrap_or(purchase_price);
        let reno_budget = inputs.get("reno_budget").and_then(amount).unwrap_or(0.0);
        if reno_budget < 0.0 {
            return Err("`reno_budget` must not be negative".to_string());
        }
        let post_reno_sale_price = match inputs.get("post_reno_sale_price").and_then(amount) {
            Some(price) => price,
            None => cma_result
                .and_then(|result| cma::value_range(result).1)
                .ok_or("`post_reno_sale_price` is required when there is no CMA value range")?,
        };
        let hold_period_months = match inputs.get("hold_period_months") {
            None | Some(Value::Null) => assumptions.default_hold_period_months,
            Some(value) => amount(value)
                .filter(|months| *months >= 1.0 && months.fract() == 0.0)
                .map(|months| months as u32)
                .ok_or("`hold_period_months` must be a whole number of at least 1")?,
        };
        let state = inputs
            .get("state")
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|state| !state.trim().is_empty())
            .or_else(|| Some(deal.record.state.clone()).filter(|state| !state.is_empty()))
            .unwrap_or_else(|| "NSW".to_string());
        Ok(Self {
            asking_price,
            purchase_price,
            reno_budget,
            post_reno_sale_price,
            hold_period_months,
            state,
        })
    }
}

/// Truncate to whole dollars.
fn whole(amount: f64) -> i64 {
    amount.trunc() as i64
}

fn round1(pct: f64) -> f64 {
    (pct * 10.0).round() / 10.0
}

/// The feasibility model. Pure: the same inputs always give the same model.
pub fn compute(
    params: &DealParameters,
    assumptions: &FeasibilityAssumptions,
    cma_result: Option<&Value>,
) -> Value {
    let a = assumptions;
    let purchase = params.purchase_price;
    let reno = params.reno_budget;
    let sale = params.post_reno_sale_price;
    let months = f64::from(params.hold_period_months);

    let stamp_duty = whole(purchase * a.stamp_duty_rate_pct / 100.0);
    let total_acquisition = whole(purchase)
        + stamp_duty
        + whole(a.legal_conveyancing)
        + whole(a.building_pest_inspection)
        + whole(a.other_acquisition);

    let contingency = whole(reno * a.contingency_pct / 100.0);
    let total_reno = whole(reno) + contingency;

    let loan = purchase * a.finance_lvr_pct / 100.0;
    let monthly_interest = loan * (a.finance_interest_rate_annual_pct / 100.0) / 12.0;
    let monthly_holding = monthly_interest
        + a.council_rates
        + a.water_rates
        + a.insurance
        + a.land_tax_monthly
        + a.utilities
        + a.other_holding;
    let total_holding = whole(monthly_holding * months);

    let commission = whole(sale * a.agent_commission_pct / 100.0);
    let total_selling = commission
        + whole(a.marketing)
        + whole(a.legal_selling)
        + whole(a.styling)
        + whole(a.other_selling);

    let total_cost = total_acquisition + total_reno + total_holding + total_selling;
    let gross_profit = whole(sale) - whole(purchase);
    let net_profit = whole(sale) - total_cost;
    let total_invested = total_acquisition + total_reno + total_holding;
    let ratio = |num: i64, den: f64| if den != 0.0 { num as f64 / den } else { 0.0 };
    let roi = ratio(net_profit, total_invested as f64);
    let margin = ratio(net_profit, sale);
    let profit_per_month = ratio(net_profit, months);
    let annualised_roi = if months > 0.0 { roi * (12.0 / months) } else { 0.0 };

    let max_purchase = whole(
        (sale
            - total_selling as f64
            - total_reno as f64
            - total_holding as f64
            - a.legal_conveyancing
            - a.building_pest_inspection
            - a.target_profit_min)
            / (1.0 + a.stamp_duty_rate_pct / 100.0),
    );

    let (cma_low, cma_high) = cma_result.map(cma::value_range).unwrap_or((None, None));
    let roi_pct = round1(roi * 100.0);
    let margin_pct = round1(margin * 100.0);

    json!({
        "purchase_analysis": {
            "asking_price": whole(params.asking_price),
            "purchase_price": whole(purchase),
            "cma_value_low": cma_low.map(whole),
            "cma_value_high": cma_high.map(whole),
            "stamp_duty": stamp_duty,
            "legal_conveyancing": whole(a.legal_conveyancing),
            "building_pest_inspection": whole(a.building_pest_inspection),
            "total_acquisition_cost": total_acquisition,
        },
        "renovation": {
            "reno_budget": whole(reno),
            "contingency_pct": a.contingency_pct,
            "contingency_amount": contingency,
            "total_reno_cost": total_reno,
        },
        "holding_costs": {
            "hold_period_months": params.hold_period_months,
            "loan_amount": whole(loan),
            "finance_cost_monthly": whole(monthly_interest),
            "council_rates_monthly": whole(a.council_rates),
            "water_rates_monthly": whole(a.water_rates),
            "insurance_monthly": whole(a.insurance),
            "land_tax_monthly": whole(a.land_tax_monthly),
            "utilities_monthly": whole(a.utilities),
            "total_monthly": whole(monthly_holding),
            "total_holding_cost": total_holding,
        },
        "selling": {
            "estimated_sale_price": whole(sale),
            "agent_commission_pct": a.agent_commission_pct,
            "agent_commission_amount": commission,
            "marketing_cost": whole(a.marketing),
            "legal_selling": whole(a.legal_selling),
            "styling": whole(a.styling),
            "total_selling_cost": total_selling,
        },
        "profitability": {
            "total_cost_in": total_cost,
            "total_invested": total_invested,
            "estimated_sale_price": whole(sale),
            "gross_profit": gross_profit,
            "net_profit": net_profit,
            "roi_pct": roi_pct,
            "margin_pct": margin_pct,
            "profit_per_month": whole(profit_per_month),
            "annualised_roi_pct": round1(annualised_roi * 100.0),
        },
        "max_purchase_price": {
            "target_profit": whole(a.target_profit_min),
            "target_roi_pct": a.target_roi_min_pct,
            "target_margin_pct": a.target_margin_min_pct,
            "max_purchase_to_hit_target": max_purchase,
        },
        "targets_met": {
            "profit": net_profit as f64 >= a.target_profit_min,
            "roi": roi_pct >= a.target_roi_min_pct,
            "margin": margin_pct >= a.target_margin_min_pct,
        },
    })
}

pub struct FeasibilityPipeline<'a> {
    pub reasoner: &'a dyn Reasoner,
    pub system_prompt: &'a str,
    pub assumptions: &'a FeasibilityAssumptions,
}

fn cma_result(deal: &Deal) -> Option<&Value> {
    deal.document(WorkflowKind::Cma).map(|doc| &doc.result)
}

impl ExternalCall for FeasibilityPipeline<'_> {
    fn preflight(&self, request: &CallRequest<'_>) -> Result<(), String> {
        DealParameters::resolve(
            request.inputs,
            request.deal,
            cma_result(request.deal),
            self.assumptions,
        )
        .map(|_| ())
    }

    fn call(&self, request: &CallRequest<'_>) -> Result<Value> {
        let cma = cma_result(request.deal);
        let params = DealParameters::resolve(request.inputs, request.deal, cma, self.assumptions)
            .map_err(|message| anyhow!(message))?;
        let mut model = compute(&params, self.assumptions, cma);
        tracing::info!(
            deal = %request.deal.id(),
            net_profit = %model["profitability"]["net_profit"],
            "feasibility model computed"
        );

        let message = json!({
            "feasibility_model": model,
            "cma_data": cma.cloned().unwrap_or_else(|| json!({})),
            "deal_inputs": params,
            "template_defaults": self.assumptions,
        });
        let message = serde_json::to_string_pretty(&message)?;
        let commentary = self
            .reasoner
            .reason(self.system_prompt, &message)
            .context("feasibility commentary")?;
        merge_commentary(&mut model, &commentary);
        Ok(model)
    }
}

/// Copy the reasoner's sensitivity, deal breakers and verdict into the model.
fn merge_commentary(model: &mut Value, commentary: &Value) {
    let empty = Map::new();
    let commentary = commentary.as_object().unwrap_or(&empty);
    if let Value::Object(map) = model {
        for (key, default) in [
            ("sensitivity", json!([])),
            ("deal_breakers", json!([])),
            ("go_no_go", json!("")),
            ("reasoning", json!("")),
        ] {
            let value = commentary.get(key).cloned().unwrap_or(default);
            map.insert(key.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::test_support::deal;

    fn params() -> DealParameters {
        DealParameters {
            asking_price: 720000.0,
            purchase_price: 700000.0,
            reno_budget: 80000.0,
            post_reno_sale_price: 900000.0,
            hold_period_months: 6,
            state: "NSW".to_string(),
        }
    }

    #[test]
    fn worked_example_with_default_assumptions() {
        let model = compute(&params(), &FeasibilityAssumptions::default(), None);

        assert_eq!(model["purchase_analysis"]["stamp_duty"], 31500);
        assert_eq!(model["purchase_analysis"]["total_acquisition_cost"], 734800);
        assert_eq!(model["renovation"]["contingency_amount"], 12000);
        assert_eq!(model["renovation"]["total_reno_cost"], 92000);
        assert_eq!(model["holding_costs"]["loan_amount"], 560000);
        assert_eq!(model["holding_costs"]["finance_cost_monthly"], 3033);
        assert_eq!(model["holding_costs"]["total_monthly"], 3883);
        assert_eq!(model["holding_costs"]["total_holding_cost"], 23300);
        assert_eq!(model["selling"]["agent_commission_amount"], 18000);
        assert_eq!(model["selling"]["total_selling_cost"], 27500);

        let profit = &model["profitability"];
        assert_eq!(profit["total_cost_in"], 877600);
        assert_eq!(profit["total_invested"], 850100);
        assert_eq!(profit["gross_profit"], 200000);
        assert_eq!(profit["net_profit"], 22400);
        assert_eq!(profit["roi_pct"], 2.6);
        assert_eq!(profit["margin_pct"], 2.5);
        assert_eq!(profit["profit_per_month"], 3733);
        assert_eq!(profit["annualised_roi_pct"], 5.3);

        assert_eq!(model["max_purchase_price"]["max_purchase_to_hit_target"], 673588);
        assert_eq!(model["targets_met"]["profit"], false);
        assert!(model["purchase_analysis"]["cma_value_high"].is_null());
    }

    #[test]
    fn sale_price_defaults_to_cma_high() {
        let cma = json!({"value_range_low": 800000, "value_range_high": 850000});
        let inputs = json!({"purchase_price": "$650,000", "reno_budget": 50000});
        let params = DealParameters::resolve(
            &inputs,
            &deal("42 Smith St"),
            Some(&cma),
            &FeasibilityAssumptions::default(),
        )
        .unwrap();
        assert_eq!(params.post_reno_sale_price, 850000.0);
        assert_eq!(params.asking_price, 650000.0);
        assert_eq!(params.hold_period_months, 6);
        assert_eq!(params.state, "NSW");

        let model = compute(&params, &FeasibilityAssumptions::default(), Some(&cma));
        assert_eq!(model["purchase_analysis"]["cma_value_low"], 800000);
    }

    #[test]
    fn missing_sale_price_without_cma_is_rejected() {
        let err = DealParameters::resolve(
            &json!({"purchase_price": 500000}),
            &deal("42 Smith St"),
            None,
            &FeasibilityAssumptions::default(),
        )
        .unwrap_err();
        assert!(err.contains("post_reno_sale_price"));
    }

    #[test]
    fn bad_hold_period_is_rejected() {
        let err = DealParameters::resolve(
            &json!({"purchase_price": 1, "post_reno_sale_price": 2, "hold_period_months": 0}),
            &deal("42 Smith St"),
            None,
            &FeasibilityAssumptions::default(),
        )
        .unwrap_err();
        assert!(err.contains("hold_period_months"));
    }

    #[test]
    fn commentary_fields_are_merged_with_defaults() {
        let mut model = json!({"profitability": {}});
        merge_commentary(&mut model, &json!({"go_no_go": "GO", "extra": 1}));
        assert_eq!(model["go_no_go"], "GO");
        assert_eq!(model["sensitivity"], json!([]));
        assert_eq!(model["reasoning"], "");
        assert!(model.get("extra").is_none());
    }

    #[test]
    fn assumptions_deserialize_partially() {
        let parsed: FeasibilityAssumptions =
            serde_json::from_value(json!({"stamp_duty_rate_pct": 5.0})).unwrap();
        assert_eq!(parsed.stamp_duty_rate_pct, 5.0);
        assert_eq!(parsed.marketing, 5000.0);
        assert!(serde_json::from_value::<FeasibilityAssumptions>(json!({"stamp": 1})).is_err());
    }
}
