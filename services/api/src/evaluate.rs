use crate::infra::{bundled_lenders, parse_date};
use chrono::{Local, NaiveDate};
use clap::Args;
use lender_match::config::AppConfig;
use lender_match::error::AppError;
use lender_match::underwriting::{
    load_lenders, ApplicationSnapshot, MatchResult, MatchingEngine, UnderwritingResults,
};
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// Application snapshot (JSON) to evaluate
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Lender policy file (JSON); defaults to APP_POLICY_SEED or the bundled policies
    #[arg(long)]
    pub(crate) lenders: Option<PathBuf>,
    /// Evaluation date (YYYY-MM-DD, defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Print the grouped results as JSON instead of a text ranking
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let EvaluateArgs {
        input,
        lenders,
        as_of,
        json,
    } = args;

    let config = AppConfig::load()?;
    let raw = std::fs::read_to_string(&input)?;
    let snapshot: ApplicationSnapshot = serde_json::from_str(&raw)?;

    let lenders = match lenders.or(config.policy_seed) {
        Some(path) => load_lenders(&path)?,
        None => bundled_lenders()?,
    };
    let as_of = as_of.unwrap_or_else(|| Local::now().date_naive());

    let matches =
        MatchingEngine::new(config.matching).evaluate_all_lenders(&snapshot, &lenders, as_of);
    let results = UnderwritingResults::from_matches(snapshot.application_id.clone(), None, matches);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print!("{}", render_results(&results, as_of));
    }
    Ok(())
}

pub(crate) fn render_results(results: &UnderwritingResults, as_of: NaiveDate) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Underwriting results for {} (as of {as_of})",
        results.application_id
    );
    let _ = writeln!(
        out,
        "{} lenders evaluated | {} eligible | {} needs review | {} ineligible",
        results.total_evaluated,
        results.eligible_count,
        results.needs_review_count,
        results.ineligible_count
    );
    match &results.best_match {
        Some(best) => {
            let _ = writeln!(
                out,
                "Best match: {} ({:.1})",
                offer_label(best),
                best.fit_score
            );
        }
        None => {
            let _ = writeln!(out, "Best match: none");
        }
    }

    for (heading, group) in [
        ("Eligible", &results.eligible),
        ("Needs review", &results.needs_review),
        ("Ineligible", &results.ineligible),
    ] {
        if group.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{heading}");
        for result in group {
            let _ = writeln!(
                out,
                "  - {} | fit {:.1} | {}",
                offer_label(result),
                result.fit_score,
                result.summary
            );
            for record in result.criteria_results.iter().filter(|record| !record.passed) {
                let marker = if record.is_required { "x" } else { "~" };
                let _ = writeln!(
                    out,
                    "      {marker} {}: {}",
                    record.criterion_name, record.explanation
                );
            }
        }
    }
    out
}

fn offer_label(result: &MatchResult) -> String {
    match &result.program_name {
        Some(program) => format!("{} - {program}", result.lender_name),
        None => result.lender_name.clone(),
    }
}
