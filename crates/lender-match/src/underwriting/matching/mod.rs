//! Policy matching: criterion evaluation, program scoring, and best-program selection.

mod compare;
mod config;
mod criteria;
mod facts;
mod handlers;
mod heuristics;
mod program;

pub use compare::{compare, expected_value, format_currency};
pub use config::{MatchingConfig, UnevaluatedPolicy};
pub use criteria::{
    CriteriaEvaluator, CriterionEvaluation, CriterionHandler, EvaluationBasis, HeuristicCategory,
    HeuristicRule, RecordKind, Verdict,
};
pub use facts::ApplicationFacts;
pub use program::{evaluate_program, MatchResult, MatchStatus};

use chrono::NaiveDate;

use super::domain::{ApplicationSnapshot, Lender};

/// Stateless engine; a pure function of snapshot, lender policies, and evaluation date.
#[derive(Debug, Clone, Default)]
pub struct MatchingEngine {
    evaluator: CriteriaEvaluator,
}

impl MatchingEngine {
    pub fn new(config: MatchingConfig) -> Self {
        Self {
            evaluator: CriteriaEvaluator::standard(config.unevaluated),
        }
    }

    /// Engine over a caller-built registry, e.g. one with extra handlers.
    pub fn with_evaluator(evaluator: CriteriaEvaluator) -> Self {
        Self { evaluator }
    }

    /// One result per active lender, in lender order.
    ///
    /// The representative program is the one with the strictly highest fit
    /// score; ties keep the earlier program. Status plays no part in selection.
    pub fn evaluate_all_lenders(
        &self,
        snapshot: &ApplicationSnapshot,
        lenders: &[Lender],
        as_of: NaiveDate,
    ) -> Vec<MatchResult> {
        let facts = ApplicationFacts::new(snapshot, as_of);

        lenders
            .iter()
            .filter(|lender| lender.is_active)
            .map(|lender| self.best_program(&facts, lender))
            .collect()
    }

    fn best_program(&self, facts: &ApplicationFacts<'_>, lender: &Lender) -> MatchResult {
        let mut best: Option<MatchResult> = None;

        for program in lender.active_programs() {
            let candidate = evaluate_program(&self.evaluator, facts, lender, program);
            let better = best
                .as_ref()
                .map_or(true, |current| candidate.fit_score > current.fit_score);
            if better {
                best = Some(candidate);
            }
        }

        best.unwrap_or_else(|| MatchResult::no_active_programs(lender))
    }
}
