use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::compare::round_tenths;
use super::criteria::{CriteriaEvaluator, CriterionEvaluation, EvaluationBasis};
use super::facts::ApplicationFacts;
use crate::underwriting::domain::{Lender, LenderId, Program, ProgramId};

/// Names listed in an ineligible summary before the remainder is counted.
const SUMMARY_NAME_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Eligible,
    Ineligible,
    NeedsReview,
}

impl MatchStatus {
    pub const fn label(self) -> &'static str {
        match self {
            MatchStatus::Eligible => "ELIGIBLE",
            MatchStatus::Ineligible => "INELIGIBLE",
            MatchStatus::NeedsReview => "NEEDS_REVIEW",
        }
    }
}

/// Outcome of one lender (through its selected program) for one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub lender_id: LenderId,
    pub lender_name: String,
    pub program_id: Option<ProgramId>,
    pub program_name: Option<String>,
    pub status: MatchStatus,
    pub fit_score: f64,
    pub summary: String,
    pub recommendation: Option<String>,
    pub criteria_results: Vec<CriterionEvaluation>,
    pub criteria_met: usize,
    pub criteria_failed: usize,
    pub criteria_total: usize,
}

impl MatchResult {
    /// Placeholder result for a lender that offers no active program.
    pub fn no_active_programs(lender: &Lender) -> Self {
        Self {
            lender_id: lender.id,
            lender_name: lender.display_name.clone(),
            program_id: None,
            program_name: None,
            status: MatchStatus::Ineligible,
            fit_score: 0.0,
            summary: "No active programs available for this lender".to_string(),
            recommendation: None,
            criteria_results: Vec::new(),
            criteria_met: 0,
            criteria_failed: 0,
            criteria_total: 0,
        }
    }

    /// Criteria that were passed without a real comparison because nothing recognised them.
    pub fn unevaluated_criteria(&self) -> impl Iterator<Item = &CriterionEvaluation> {
        self.criteria_results
            .iter()
            .filter(|record| record.basis == EvaluationBasis::NotEvaluated)
    }
}

#[derive(Debug, Default)]
struct Tally {
    required_passed: usize,
    required_failed: usize,
    optional_passed: usize,
    optional_failed: usize,
    total_weight: f64,
    passed_weight: f64,
}

impl Tally {
    fn record(&mut self, evaluation: &CriterionEvaluation) {
        match (evaluation.is_required, evaluation.passed) {
            (true, true) => self.required_passed += 1,
            (true, false) => self.required_failed += 1,
            (false, true) => self.optional_passed += 1,
            (false, false) => self.optional_failed += 1,
        }

        self.total_weight += evaluation.weight;
        if evaluation.passed {
            self.passed_weight += evaluation.weight;
        }
    }

    fn fit_score(&self) -> f64 {
        if self.total_weight > 0.0 {
            round_tenths(self.passed_weight / self.total_weight * 100.0)
        } else if self.required_failed == 0 {
            100.0
        } else {
            0.0
        }
    }
}

/// Evaluate every active criterion of `program` and classify the result.
pub fn evaluate_program(
    evaluator: &CriteriaEvaluator,
    facts: &ApplicationFacts<'_>,
    lender: &Lender,
    program: &Program,
) -> MatchResult {
    let mut tally = Tally::default();
    let mut criteria_results = Vec::new();

    for criterion in program.active_criteria() {
        let evaluation = evaluator.evaluate(facts, criterion);
        if evaluation.basis == EvaluationBasis::NotEvaluated {
            warn!(
                lender = %lender.name,
                program = %program.name,
                criterion_type = %criterion.criterion_type,
                criterion = %criterion.name,
                passed = evaluation.passed,
                "criterion not specifically evaluated"
            );
        }
        tally.record(&evaluation);
        criteria_results.push(evaluation);
    }

    let criteria_total = criteria_results.len();
    let fit_score = tally.fit_score();

    let (status, summary, recommendation) = if tally.required_failed > 0 {
        let failed: Vec<&str> = criteria_results
            .iter()
            .filter(|record| record.is_required && !record.passed)
            .map(|record| record.criterion_name.as_str())
            .collect();
        let mut summary = format!(
            "Failed {} required criteria: {}",
            tally.required_failed,
            failed
                .iter()
                .take(SUMMARY_NAME_LIMIT)
                .copied()
                .collect::<Vec<_>>()
                .join(", ")
        );
        if failed.len() > SUMMARY_NAME_LIMIT {
            summary.push_str(&format!(" +{} more", failed.len() - SUMMARY_NAME_LIMIT));
        }
        (MatchStatus::Ineligible, summary, None)
    } else if tally.optional_failed > 0 {
        (
            MatchStatus::NeedsReview,
            format!(
                "Met all required criteria but failed {} optional criteria",
                tally.optional_failed
            ),
            Some("Manual review recommended".to_string()),
        )
    } else {
        (
            MatchStatus::Eligible,
            format!("Meets all {criteria_total} criteria for {}", program.name),
            Some(format!(
                "Strong candidate for {} - {}",
                lender.display_name, program.name
            )),
        )
    };

    debug!(
        lender = %lender.name,
        program = %program.name,
        status = status.label(),
        fit_score,
        criteria_total,
        "program evaluated"
    );

    MatchResult {
        lender_id: lender.id,
        lender_name: lender.display_name.clone(),
        program_id: Some(program.id),
        program_name: Some(program.name.clone()),
        status,
        fit_score,
        summary,
        recommendation,
        criteria_results,
        criteria_met: tally.required_passed + tally.optional_passed,
        criteria_failed: tally.required_failed + tally.optional_failed,
        criteria_total,
    }
}
