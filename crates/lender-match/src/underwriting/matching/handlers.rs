//! Dedicated handlers for the well-known criterion types.

use tracing::debug;

use super::compare::{compare, expected_value, format_currency, format_number, format_percent};
use super::criteria::{CriterionHandler, RecordKind, Verdict};
use super::facts::ApplicationFacts;
use crate::underwriting::domain::{Criterion, Operator};

pub(crate) fn builtin() -> Vec<(&'static str, CriterionHandler)> {
    vec![
        ("fico_score", fico_score as CriterionHandler),
        ("paynet_score", paynet_score),
        ("time_in_business", time_in_business),
        ("annual_revenue", annual_revenue),
        ("loan_amount_min", loan_amount_min),
        ("loan_amount_max", loan_amount_max),
        ("equipment_age", equipment_age),
        ("equipment_type", equipment_type),
        ("state_allowed", state_allowed),
        ("state_excluded", state_excluded),
        ("industry_allowed", industry_allowed),
        ("industry_excluded", industry_excluded),
        ("bankruptcy_lookback", bankruptcy_lookback),
        ("tax_lien_max", tax_lien_max),
        ("down_payment_percent", down_payment_percent),
    ]
}

fn fico_score(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(guarantor) = facts.guarantor() else {
        return Verdict::missing(RecordKind::Guarantor.missing_message());
    };
    let Some(fico) = guarantor.fico_score else {
        return Verdict::missing("FICO score not provided");
    };

    Verdict::compared(
        compare(Some(f64::from(fico)), criterion),
        fico.to_string(),
        criterion,
        format!("FICO score of {fico} meets requirement"),
        || {
            format!(
                "FICO score of {fico} does not meet the requirement of {}",
                expected_value(criterion)
            )
        },
    )
}

fn paynet_score(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(credit) = facts.business_credit() else {
        return Verdict::missing(RecordKind::BusinessCredit.missing_message());
    };
    let Some(paynet) = credit.paynet_score else {
        return Verdict::missing("PayNet score not provided");
    };

    Verdict::compared(
        compare(Some(f64::from(paynet)), criterion),
        paynet.to_string(),
        criterion,
        format!("PayNet score of {paynet} meets requirement"),
        || {
            format!(
                "PayNet score of {paynet} does not meet the requirement of {}",
                expected_value(criterion)
            )
        },
    )
}

fn time_in_business(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    if facts.business().is_none() {
        return Verdict::missing(RecordKind::Business.missing_message());
    }
    let Some(months) = facts.months_in_business() else {
        return Verdict::missing("Time in business not provided");
    };

    let years = f64::from(months) / 12.0;
    Verdict::compared(
        compare(Some(f64::from(months)), criterion),
        format!("{months} months"),
        criterion,
        format!("Business operating for {years:.1} years meets requirement"),
        || {
            let required = criterion
                .numeric_value
                .map(|required| {
                    format!(
                        "{:.1} years ({} months)",
                        required / 12.0,
                        format_number(required)
                    )
                })
                .unwrap_or_else(|| format!("{} months", expected_value(criterion)));
            format!(
                "Business has been operating for {years:.1} years ({months} months), but {required} required"
            )
        },
    )
}

fn annual_revenue(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    if facts.business().is_none() {
        return Verdict::missing(RecordKind::Business.missing_message());
    }
    let Some(revenue) = facts.annual_revenue() else {
        return Verdict::missing("Annual revenue not provided");
    };

    let shown = format_currency(revenue);
    Verdict::compared(
        compare(Some(revenue), criterion),
        shown.clone(),
        criterion,
        format!("Annual revenue of {shown} meets requirement"),
        || format!("Annual revenue of {shown} does not meet {}", money_bound(criterion)),
    )
}

fn loan_amount_min(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(request) = facts.loan_request() else {
        return Verdict::missing(RecordKind::LoanRequest.missing_message());
    };

    let amount = request.requested_amount;
    let shown = format_currency(amount);
    Verdict::compared(
        compare(Some(amount), criterion),
        shown.clone(),
        criterion,
        format!("Requested amount of {shown} meets minimum requirement"),
        || format!("Requested amount of {shown} is below minimum of {}", money_bound(criterion)),
    )
}

fn loan_amount_max(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(request) = facts.loan_request() else {
        return Verdict::missing(RecordKind::LoanRequest.missing_message());
    };

    let amount = request.requested_amount;
    let shown = format_currency(amount);
    Verdict::compared(
        compare(Some(amount), criterion),
        shown.clone(),
        criterion,
        format!("Requested amount of {shown} within maximum limit"),
        || format!("Requested amount of {shown} exceeds maximum of {}", money_bound(criterion)),
    )
}

fn equipment_age(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    if facts.loan_request().is_none() {
        return Verdict::missing(RecordKind::LoanRequest.missing_message());
    }
    let Some(age) = facts.equipment_age_years() else {
        return Verdict::missing("Equipment age not provided");
    };

    let shown = format_number(age);
    Verdict::compared(
        compare(Some(age), criterion),
        format!("{shown} years"),
        criterion,
        format!("Equipment age of {shown} years meets requirement"),
        || {
            format!(
                "Equipment age of {shown} years does not meet the requirement of {} years",
                expected_value(criterion)
            )
        },
    )
}

/// Lowercase with spaces folded to underscores, so "Heavy Equipment" matches "heavy_equipment".
pub(crate) fn normalize_equipment_type(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

fn equipment_type(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(request) = facts.loan_request() else {
        return Verdict::missing(RecordKind::LoanRequest.missing_message());
    };
    let Some(raw) = request
        .equipment_type
        .as_deref()
        .filter(|value| !value.trim().is_empty())
    else {
        return Verdict::missing("Equipment type not provided");
    };

    let normalized = normalize_equipment_type(raw);
    let listed: Vec<String> = criterion
        .list_values
        .iter()
        .map(|value| normalize_equipment_type(value))
        .collect();
    debug!(
        equipment_type = raw,
        normalized = %normalized,
        operator = criterion.operator.label(),
        "evaluating equipment type"
    );

    let member = listed.contains(&normalized);
    match criterion.operator {
        Operator::In => Verdict::compared(
            member,
            raw,
            criterion,
            format!("Equipment type '{raw}' is approved"),
            || {
                format!(
                    "Equipment type '{raw}' is not in the approved list: {}",
                    criterion.list_values.join(", ")
                )
            },
        ),
        Operator::NotIn => Verdict::compared(
            !member,
            raw,
            criterion,
            format!("Equipment type '{raw}' is not excluded"),
            || format!("Equipment type '{raw}' is in the excluded list"),
        ),
        other => Verdict::invalid(
            Some(raw.to_string()),
            format!("Invalid operator for equipment type: {}", other.label()),
        ),
    }
}

fn business_state<'a>(facts: &ApplicationFacts<'a>) -> Result<&'a str, Verdict> {
    let business = facts
        .business()
        .ok_or_else(|| Verdict::missing(RecordKind::Business.missing_message()))?;
    let state = business.state.trim();
    if state.is_empty() {
        return Err(Verdict::missing("Business state not provided"));
    }
    Ok(state)
}

fn state_listed(state: &str, criterion: &Criterion) -> bool {
    criterion
        .list_values
        .iter()
        .any(|listed| listed.trim().eq_ignore_ascii_case(state))
}

fn state_allowed(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let state = match business_state(facts) {
        Ok(state) => state,
        Err(verdict) => return verdict,
    };

    Verdict::compared(
        state_listed(state, criterion),
        state,
        criterion,
        format!("Business state '{state}' is approved"),
        || format!("Business state '{state}' is not in the approved states"),
    )
}

fn state_excluded(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let state = match business_state(facts) {
        Ok(state) => state,
        Err(verdict) => return verdict,
    };

    Verdict::compared(
        !state_listed(state, criterion),
        state,
        criterion,
        format!("Business state '{state}' is not excluded"),
        || format!("Business state '{state}' is in the excluded states list"),
    )
}

/// Exact match, or a listed value appearing inside the industry description.
fn industry_listed(industry: &str, criterion: &Criterion) -> bool {
    let lowered = industry.to_lowercase();
    criterion
        .list_values
        .iter()
        .map(|listed| listed.trim().to_lowercase())
        .filter(|listed| !listed.is_empty())
        .any(|listed| lowered == listed || lowered.contains(listed.as_str()))
}

fn industry_allowed(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(business) = facts.business() else {
        return Verdict::missing(RecordKind::Business.missing_message());
    };
    let Some(industry) = business
        .industry
        .as_deref()
        .filter(|value| !value.trim().is_empty())
    else {
        return Verdict::missing("Industry not provided");
    };

    Verdict::compared(
        industry_listed(industry, criterion),
        industry,
        criterion,
        format!("Industry '{industry}' is approved"),
        || format!("Industry '{industry}' is not in the approved industries"),
    )
}

fn industry_excluded(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(business) = facts.business() else {
        return Verdict::missing(RecordKind::Business.missing_message());
    };
    let Some(industry) = business
        .industry
        .as_deref()
        .filter(|value| !value.trim().is_empty())
    else {
        return Verdict::assumed(None, "Industry not provided - assuming not excluded");
    };

    Verdict::compared(
        !industry_listed(industry, criterion),
        industry,
        criterion,
        format!("Industry '{industry}' is not excluded"),
        || format!("Industry '{industry}' is in the excluded industries list"),
    )
}

fn bankruptcy_lookback(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(guarantor) = facts.guarantor() else {
        return Verdict::missing(RecordKind::Guarantor.missing_message());
    };
    if !guarantor.has_bankruptcy {
        return Verdict::assumed(Some("No bankruptcy".to_string()), "No bankruptcy on record");
    }
    let Some(years) = facts.years_since_bankruptcy() else {
        return Verdict::missing("Bankruptcy on record but discharge date unknown")
            .with_actual("Bankruptcy - unknown date");
    };
    let actual = format!("{years:.1} years since discharge");
    let Some(lookback) = criterion.numeric_value else {
        return Verdict::invalid(Some(actual), "Bankruptcy lookback period is not configured");
    };

    let shown = format_number(lookback);
    Verdict::compared(
        years >= lookback,
        actual,
        criterion,
        format!("Bankruptcy discharged {years:.1} years ago, meets {shown} year requirement"),
        || format!("Bankruptcy discharged {years:.1} years ago, but must be at least {shown} years"),
    )
}

fn tax_lien_max(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(guarantor) = facts.guarantor() else {
        return Verdict::missing(RecordKind::Guarantor.missing_message());
    };
    if !guarantor.has_open_tax_liens {
        return Verdict::assumed(Some(format_currency(0.0)), "No open tax liens");
    }

    let amount = guarantor.tax_lien_amount.unwrap_or(0.0);
    let shown = format_currency(amount);
    Verdict::compared(
        compare(Some(amount), criterion),
        shown.clone(),
        criterion,
        format!("Tax liens of {shown} within acceptable limit"),
        || format!("Open tax liens of {shown} exceed maximum of {}", money_bound(criterion)),
    )
}

fn down_payment_percent(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    if facts.loan_request().is_none() {
        return Verdict::missing(RecordKind::LoanRequest.missing_message());
    }
    let Some(percent) = facts.down_payment_percent() else {
        return Verdict::missing("Down payment information not provided");
    };

    let shown = format_percent(percent);
    Verdict::compared(
        compare(Some(percent), criterion),
        shown.clone(),
        criterion,
        format!("Down payment of {shown} meets requirement"),
        || format!("Down payment of {shown} does not meet {}%", expected_value(criterion)),
    )
}

fn money_bound(criterion: &Criterion) -> String {
    criterion
        .numeric_value
        .map(format_currency)
        .unwrap_or_else(|| expected_value(criterion))
}
