//! Name-based rules for broad criterion categories produced by policy extraction.
//!
//! Each category holds ordered substring rules; the first rule whose keyword
//! appears in the lowercased criterion name decides which fact is compared.

use super::compare::{format_currency, format_number, format_percent};
use super::criteria::{HeuristicCategory, HeuristicRule, RecordKind, Verdict};
use super::facts::ApplicationFacts;
use super::handlers::normalize_equipment_type;
use crate::underwriting::domain::Criterion;

pub(crate) fn builtin() -> Vec<(&'static str, HeuristicCategory)> {
    vec![
        (
            "personal_credit",
            category(
                "Personal credit",
                None,
                vec![
                    HeuristicRule::new(&["fico"], personal_fico),
                    HeuristicRule::new(&["bankruptcy"], personal_bankruptcy),
                ],
            ),
        ),
        (
            "business_credit",
            category(
                "Business credit",
                Some(RecordKind::BusinessCredit),
                vec![
                    HeuristicRule::new(&["paynet"], credit_paynet),
                    HeuristicRule::new(&["paydex"], credit_paydex),
                    HeuristicRule::new(&["experian"], credit_experian),
                ],
            ),
        ),
        (
            "business",
            category(
                "Business",
                Some(RecordKind::Business),
                vec![
                    HeuristicRule::new(
                        &["time in business", "tib", "years in business"],
                        business_tenure,
                    ),
                    HeuristicRule::new(&["revenue"], business_revenue),
                    HeuristicRule::new(&["industry", "restricted"], business_industry),
                    HeuristicRule::new(&["fleet", "truck"], business_fleet),
                ],
            ),
        ),
        (
            "loan",
            category(
                "Loan",
                Some(RecordKind::LoanRequest),
                vec![
                    HeuristicRule::new(&["loan amount", "app only", "app-only"], loan_amount),
                    HeuristicRule::new(&["ltv"], loan_to_value),
                    HeuristicRule::new(&["down payment"], loan_down_payment),
                    HeuristicRule::new(&["comparable"], loan_comparable_credit),
                ],
            ),
        ),
        (
            "equipment",
            category(
                "Equipment",
                Some(RecordKind::LoanRequest),
                vec![
                    HeuristicRule::new(&["age", "year"], equipment_age),
                    HeuristicRule::new(&["type"], equipment_type),
                    HeuristicRule::new(&["condition"], equipment_condition),
                ],
            ),
        ),
        (
            "rate",
            category("Rate", None, vec![HeuristicRule::new(&[], rate)]),
        ),
    ]
}

fn category(label: &str, requires: Option<RecordKind>, rules: Vec<HeuristicRule>) -> HeuristicCategory {
    HeuristicCategory {
        label: label.to_string(),
        requires,
        rules,
    }
}

/// Threshold for minimum-style rules.
fn floor(criterion: &Criterion) -> Option<f64> {
    criterion.numeric_value.or(criterion.numeric_value_min)
}

/// Threshold for limit-style rules.
fn ceiling(criterion: &Criterion) -> Option<f64> {
    criterion.numeric_value.or(criterion.numeric_value_max)
}

fn score_at_least(
    label: &str,
    score: Option<u16>,
    missing: &str,
    criterion: &Criterion,
) -> Verdict {
    let Some(score) = score else {
        return Verdict::missing(missing);
    };
    let Some(threshold) = floor(criterion) else {
        return Verdict::assumed(Some(score.to_string()), format!("{label} score: {score}"));
    };

    let value = f64::from(score);
    let shown = format_number(threshold);
    Verdict::compared(
        value >= threshold,
        score.to_string(),
        criterion,
        format!("{label} score {score} meets minimum {shown}"),
        || format!("{label} score {score} is below minimum {shown}"),
    )
}

fn personal_fico(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(guarantor) = facts.guarantor() else {
        return Verdict::missing(RecordKind::Guarantor.missing_message());
    };
    score_at_least("FICO", guarantor.fico_score, "FICO score not provided", criterion)
}

fn personal_bankruptcy(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(guarantor) = facts.guarantor() else {
        return Verdict::missing(RecordKind::Guarantor.missing_message());
    };
    if !guarantor.has_bankruptcy {
        return Verdict::assumed(Some("No bankruptcy".to_string()), "No bankruptcy history");
    }
    let Some(years) = facts.years_since_bankruptcy() else {
        return Verdict::missing("Bankruptcy history exists but discharge date not provided")
            .with_actual("Bankruptcy on record");
    };

    let actual = format!("{years:.1} years");
    let Some(months) = floor(criterion).filter(|months| *months > 0.0) else {
        return Verdict::assumed(Some(actual), "Bankruptcy history evaluated");
    };

    let required = months / 12.0;
    Verdict::compared(
        years >= required,
        actual,
        criterion,
        format!("Bankruptcy discharged {years:.1} years ago meets requirement"),
        || format!("Bankruptcy discharged {years:.1} years ago, requires {required:.1}+ years"),
    )
}

fn credit_paynet(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let credit = facts.business_credit();
    let score = credit.and_then(|credit| credit.paynet_score.or(credit.paynet_master_score));
    score_at_least("PayNet", score, "PayNet score not provided", criterion)
}

fn credit_paydex(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let score = facts.business_credit().and_then(|credit| credit.paydex_score);
    score_at_least("PAYDEX", score, "PAYDEX score not provided", criterion)
}

fn credit_experian(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let score = facts
        .business_credit()
        .and_then(|credit| credit.experian_business_score);
    score_at_least(
        "Experian",
        score,
        "Experian business score not provided",
        criterion,
    )
}

fn business_tenure(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(months) = facts.months_in_business() else {
        return Verdict::missing("Time in business not provided");
    };

    let years = f64::from(months) / 12.0;
    let actual = format!("{months} months");
    let Some(threshold) = floor(criterion) else {
        return Verdict::assumed(
            Some(actual),
            format!("Business operating for {years:.1} years"),
        );
    };

    let required_years = threshold / 12.0;
    Verdict::compared(
        f64::from(months) >= threshold,
        actual,
        criterion,
        format!("Business operating {years:.1} years meets {required_years:.1} year requirement"),
        || {
            format!(
                "Business operating {years:.1} years ({months} months), requires {required_years:.1}+ years ({} months)",
                format_number(threshold)
            )
        },
    )
}

fn business_revenue(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(revenue) = facts.annual_revenue() else {
        return Verdict::missing("Annual revenue not provided");
    };

    let shown = format_currency(revenue);
    let Some(threshold) = floor(criterion) else {
        return Verdict::assumed(Some(shown.clone()), format!("Annual revenue: {shown}"));
    };

    Verdict::compared(
        revenue >= threshold,
        shown.clone(),
        criterion,
        format!("Annual revenue {shown} meets requirement"),
        || {
            format!(
                "Annual revenue {shown} is below minimum {}",
                format_currency(threshold)
            )
        },
    )
}

fn business_industry(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(industry) = facts
        .business()
        .and_then(|business| business.industry.as_deref())
        .filter(|industry| !industry.trim().is_empty())
    else {
        return Verdict::assumed(
            Some("Not specified".to_string()),
            "Industry not specified, assuming eligible",
        );
    };

    let restricted = criterion
        .list_values
        .iter()
        .any(|listed| listed.trim().eq_ignore_ascii_case(industry.trim()));
    Verdict::compared(
        !restricted,
        industry,
        criterion,
        format!("Industry '{industry}' is eligible"),
        || format!("Industry '{industry}' is restricted"),
    )
}

fn business_fleet(_facts: &ApplicationFacts<'_>, _criterion: &Criterion) -> Verdict {
    Verdict::not_evaluated("Fleet size not evaluated (not in application)")
}

fn loan_amount(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(request) = facts.loan_request() else {
        return Verdict::missing(RecordKind::LoanRequest.missing_message());
    };

    let amount = request.requested_amount;
    let shown = format_currency(amount);
    if criterion.name.to_lowercase().contains("min") {
        if let Some(minimum) = floor(criterion) {
            return Verdict::compared(
                amount >= minimum,
                shown.clone(),
                criterion,
                "Requested amount meets minimum",
                || {
                    format!(
                        "Requested {shown} is below minimum {}",
                        format_currency(minimum)
                    )
                },
            );
        }
    }

    match ceiling(criterion) {
        Some(limit) => Verdict::compared(
            amount <= limit,
            shown.clone(),
            criterion,
            "Requested amount within limit",
            || format!("Requested {shown} exceeds limit {}", format_currency(limit)),
        ),
        None => Verdict::assumed(Some(shown.clone()), format!("Loan amount: {shown}")),
    }
}

fn loan_to_value(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(ltv) = facts.loan_to_value_percent() else {
        return Verdict::assumed(None, "LTV not calculable (no equipment cost)");
    };

    let shown = format_percent(ltv);
    let Some(limit) = ceiling(criterion) else {
        return Verdict::assumed(Some(shown.clone()), format!("LTV {shown}"));
    };

    Verdict::compared(
        ltv <= limit,
        shown.clone(),
        criterion,
        format!("LTV {shown} within limit"),
        || format!("LTV {shown} exceeds maximum {}%", format_number(limit)),
    )
}

fn loan_down_payment(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(percent) = facts.down_payment_percent() else {
        return Verdict::assumed(None, "Down payment not specified");
    };

    let shown = format_percent(percent);
    let Some(required) = floor(criterion) else {
        return Verdict::assumed(Some(shown.clone()), format!("Down payment: {shown}"));
    };

    Verdict::compared(
        percent >= required,
        shown.clone(),
        criterion,
        format!("Down payment {shown} meets requirement"),
        || format!("Down payment {shown} below required {}%", format_number(required)),
    )
}

fn loan_comparable_credit(_facts: &ApplicationFacts<'_>, _criterion: &Criterion) -> Verdict {
    Verdict::not_evaluated("Comparable credit history not tracked in application")
}

fn equipment_age(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(age) = facts.equipment_age_years() else {
        return Verdict::assumed(None, "Equipment age not provided");
    };

    let years = format_number(age);
    let actual = format!("{years} years");
    let Some(limit) = ceiling(criterion) else {
        return Verdict::assumed(Some(actual), format!("Equipment age: {years} years"));
    };

    Verdict::compared(
        age <= limit,
        actual,
        criterion,
        format!("Equipment age {years} years within limit"),
        || {
            format!(
                "Equipment age {years} years exceeds maximum {} years",
                format_number(limit)
            )
        },
    )
}

fn equipment_type(facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let Some(kind) = facts
        .loan_request()
        .and_then(|request| request.equipment_type.as_deref())
        .filter(|kind| !kind.trim().is_empty())
    else {
        return Verdict::assumed(None, "Equipment type not specified");
    };

    if criterion.list_values.is_empty() {
        return Verdict::assumed(Some(kind.to_string()), format!("Equipment type: {kind}"));
    }

    let normalized = normalize_equipment_type(kind);
    let allowed = criterion
        .list_values
        .iter()
        .any(|listed| normalize_equipment_type(listed) == normalized);
    Verdict::compared(
        allowed,
        kind,
        criterion,
        format!("Equipment type '{kind}' is allowed"),
        || format!("Equipment type '{kind}' not in allowed list"),
    )
}

fn equipment_condition(facts: &ApplicationFacts<'_>, _criterion: &Criterion) -> Verdict {
    match facts
        .loan_request()
        .and_then(|request| request.equipment_condition.as_deref())
        .filter(|condition| !condition.trim().is_empty())
    {
        Some(condition) => Verdict::assumed(
            Some(condition.to_string()),
            format!("Equipment condition: {condition}"),
        ),
        None => Verdict::assumed(None, "Equipment condition not specified"),
    }
}

fn rate(_facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
    let configured = criterion
        .numeric_value
        .or(criterion.numeric_value_min)
        .or(criterion.numeric_value_max);
    match configured {
        Some(rate) => {
            let shown = format!("{}%", format_number(rate));
            Verdict::assumed(Some(shown.clone()), format!("Rate: {shown}"))
        }
        None => Verdict::assumed(None, "Rate information"),
    }
}
