use crate::underwriting::domain::{Criterion, Operator};

/// Apply a numeric operator to `actual` using the criterion's configured bound(s).
///
/// A missing actual value or a missing bound never passes. `between` is inclusive.
/// Membership operators are not numeric and always return `false` here.
pub fn compare(actual: Option<f64>, criterion: &Criterion) -> bool {
    let Some(actual) = actual else {
        return false;
    };

    match criterion.operator {
        Operator::Between => match (criterion.numeric_value_min, criterion.numeric_value_max) {
            (Some(min), Some(max)) => min <= actual && actual <= max,
            _ => false,
        },
        Operator::In | Operator::NotIn => false,
        operator => {
            let Some(bound) = criterion.numeric_value else {
                return false;
            };
            match operator {
                Operator::Gte => actual >= bound,
                Operator::Gt => actual > bound,
                Operator::Lte => actual <= bound,
                Operator::Lt => actual < bound,
                Operator::Eq => actual == bound,
                Operator::Neq => actual != bound,
                Operator::Between | Operator::In | Operator::NotIn => false,
            }
        }
    }
}

/// Display form of the requirement, derived only from operator and configuration.
///
/// `neq` shows the bare excluded value; the operator is implied by the record.
pub fn expected_value(criterion: &Criterion) -> String {
    let bound = || {
        criterion
            .numeric_value
            .map(format_number)
            .or_else(|| criterion.string_value.clone())
            .unwrap_or_else(|| "?".to_string())
    };
    let range_end = |value: Option<f64>| value.map(format_number).unwrap_or_else(|| "?".to_string());

    match criterion.operator {
        Operator::Gte => format!("≥ {}", bound()),
        Operator::Gt => format!("> {}", bound()),
        Operator::Lte => format!("≤ {}", bound()),
        Operator::Lt => format!("< {}", bound()),
        Operator::Eq => format!("= {}", bound()),
        Operator::Neq => bound(),
        Operator::Between => format!(
            "{} - {}",
            range_end(criterion.numeric_value_min),
            range_end(criterion.numeric_value_max)
        ),
        Operator::In => format!("One of: {}", criterion.list_values.join(", ")),
        Operator::NotIn => format!("Not: {}", criterion.list_values.join(", ")),
    }
}

/// Render a number without a trailing `.0` when it is integral.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let rendered = format!("{value:.2}");
        rendered
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

/// Whole-dollar amount with thousands separators, e.g. `$1,250,000`.
pub fn format_currency(value: f64) -> String {
    let rounded = value.round();
    let negative = rounded < 0.0;
    let digits = format!("{}", rounded.abs() as u64);

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

/// Round to one decimal place for fit scores. Exact halves go to the even tenth.
pub fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}
