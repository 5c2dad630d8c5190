use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::compare::expected_value;
use super::config::UnevaluatedPolicy;
use super::facts::ApplicationFacts;
use super::{handlers, heuristics};
use crate::underwriting::domain::{Criterion, CriterionId};

/// Why an evaluation came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationBasis {
    /// The application value was checked against the configured requirement.
    Compared,
    /// Input data was absent; always a failure.
    MissingData,
    /// A documented permissive default applied (e.g. no bankruptcy on record).
    Assumed,
    /// The criterion cannot be evaluated as configured; always a failure.
    InvalidConfiguration,
    /// Nothing recognised the criterion; outcome follows [`UnevaluatedPolicy`].
    NotEvaluated,
}

/// Raw handler output before it is folded into a [`CriterionEvaluation`].
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub passed: bool,
    pub actual: Option<String>,
    pub explanation: String,
    pub basis: EvaluationBasis,
}

impl Verdict {
    /// Result of an actual check. On failure the criterion's own message wins.
    pub fn compared(
        passed: bool,
        actual: impl Into<String>,
        criterion: &Criterion,
        met: impl Into<String>,
        unmet: impl FnOnce() -> String,
    ) -> Self {
        let explanation = if passed {
            met.into()
        } else {
            criterion.failure_message.clone().unwrap_or_else(unmet)
        };

        Self {
            passed,
            actual: Some(actual.into()),
            explanation,
            basis: EvaluationBasis::Compared,
        }
    }

    pub fn missing(explanation: impl Into<String>) -> Self {
        Self {
            passed: false,
            actual: None,
            explanation: explanation.into(),
            basis: EvaluationBasis::MissingData,
        }
    }

    pub fn assumed(actual: Option<String>, explanation: impl Into<String>) -> Self {
        Self {
            passed: true,
            actual,
            explanation: explanation.into(),
            basis: EvaluationBasis::Assumed,
        }
    }

    pub fn invalid(actual: Option<String>, explanation: impl Into<String>) -> Self {
        Self {
            passed: false,
            actual,
            explanation: explanation.into(),
            basis: EvaluationBasis::InvalidConfiguration,
        }
    }

    /// Placeholder outcome; the evaluator sets `passed` from its policy.
    pub fn not_evaluated(explanation: impl Into<String>) -> Self {
        Self {
            passed: true,
            actual: None,
            explanation: explanation.into(),
            basis: EvaluationBasis::NotEvaluated,
        }
    }

    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }
}

/// Per-criterion audit record kept with every match result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionEvaluation {
    pub criterion_id: CriterionId,
    pub criterion_type: String,
    pub criterion_name: String,
    pub passed: bool,
    pub is_required: bool,
    pub expected_value: String,
    pub actual_value: Option<String>,
    pub explanation: String,
    pub weight: f64,
    pub basis: EvaluationBasis,
}

/// Handler for one criterion type or one heuristic rule.
pub type CriterionHandler = fn(&ApplicationFacts<'_>, &Criterion) -> Verdict;

/// Snapshot sub-record a heuristic category needs before any rule runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Business,
    Guarantor,
    BusinessCredit,
    LoanRequest,
}

impl RecordKind {
    fn present(self, facts: &ApplicationFacts<'_>) -> bool {
        match self {
            RecordKind::Business => facts.business().is_some(),
            RecordKind::Guarantor => facts.guarantor().is_some(),
            RecordKind::BusinessCredit => facts.business_credit().is_some(),
            RecordKind::LoanRequest => facts.loan_request().is_some(),
        }
    }

    pub const fn missing_message(self) -> &'static str {
        match self {
            RecordKind::Business => "No business information provided",
            RecordKind::Guarantor => "No personal guarantor information provided",
            RecordKind::BusinessCredit => "No business credit information provided",
            RecordKind::LoanRequest => "No loan request information provided",
        }
    }
}

/// Name-matching rule inside a heuristic category. An empty keyword list matches any name.
#[derive(Clone)]
pub struct HeuristicRule {
    pub keywords: Vec<String>,
    pub handler: CriterionHandler,
}

impl HeuristicRule {
    pub fn new(keywords: &[&str], handler: CriterionHandler) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_ascii_lowercase()).collect(),
            handler,
        }
    }

    pub fn matches(&self, lowered_name: &str) -> bool {
        self.keywords.is_empty()
            || self
                .keywords
                .iter()
                .any(|keyword| lowered_name.contains(keyword.as_str()))
    }
}

impl std::fmt::Debug for HeuristicRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeuristicRule")
            .field("keywords", &self.keywords)
            .finish_non_exhaustive()
    }
}

/// Ordered rules for a broad criterion category such as `business` or `loan`.
#[derive(Debug, Clone)]
pub struct HeuristicCategory {
    pub label: String,
    pub requires: Option<RecordKind>,
    pub rules: Vec<HeuristicRule>,
}

/// Evaluates single criteria through two registries.
///
/// Dispatch order: the dedicated handler registered for the lowercased type,
/// then the heuristic category registered under that type (first rule whose
/// keyword occurs in the lowercased criterion name), then the unevaluated
/// fallback. The fallback passes under the default policy; such records are
/// tagged [`EvaluationBasis::NotEvaluated`] and [`UnevaluatedPolicy::Fail`]
/// turns them into failures.
///
/// A dedicated handler only sees criteria that pass [`Criterion::validate`];
/// anything else is recorded as [`EvaluationBasis::InvalidConfiguration`].
/// Passing comparisons read `✓ <name> requirement met`.
#[derive(Clone)]
pub struct CriteriaEvaluator {
    handlers: HashMap<String, CriterionHandler>,
    categories: HashMap<String, HeuristicCategory>,
    unevaluated: UnevaluatedPolicy,
}

impl CriteriaEvaluator {
    /// Registry with no handlers at all; every criterion is unevaluated.
    pub fn empty(unevaluated: UnevaluatedPolicy) -> Self {
        Self {
            handlers: HashMap::new(),
            categories: HashMap::new(),
            unevaluated,
        }
    }

    /// Registry populated with the built-in handlers and heuristic categories.
    pub fn standard(unevaluated: UnevaluatedPolicy) -> Self {
        let mut evaluator = Self::empty(unevaluated);
        for (criterion_type, handler) in handlers::builtin() {
            evaluator.register_handler(criterion_type, handler);
        }
        for (key, category) in heuristics::builtin() {
            evaluator.categories.insert(key.to_string(), category);
        }
        evaluator
    }

    pub fn register_handler(&mut self, criterion_type: &str, handler: CriterionHandler) {
        self.handlers
            .insert(criterion_type.trim().to_ascii_lowercase(), handler);
    }

    /// Append a rule to a category, creating the category when it is new.
    pub fn register_heuristic(
        &mut self,
        category: &str,
        requires: Option<RecordKind>,
        rule: HeuristicRule,
    ) {
        let key = category.trim().to_ascii_lowercase();
        self.categories
            .entry(key.clone())
            .or_insert_with(|| HeuristicCategory {
                label: key,
                requires,
                rules: Vec::new(),
            })
            .rules
            .push(rule);
    }

    pub fn handles(&self, criterion_type: &str) -> bool {
        let key = criterion_type.trim().to_ascii_lowercase();
        self.handlers.contains_key(&key) || self.categories.contains_key(&key)
    }

    pub fn evaluate(
        &self,
        facts: &ApplicationFacts<'_>,
        criterion: &Criterion,
    ) -> CriterionEvaluation {
        let mut verdict = self.dispatch(facts, criterion);
        match verdict.basis {
            EvaluationBasis::NotEvaluated => verdict.passed = self.unevaluated.passes(),
            EvaluationBasis::Compared if verdict.passed => {
                verdict.explanation = format!("✓ {} requirement met", criterion.name);
            }
            _ => {}
        }

        CriterionEvaluation {
            criterion_id: criterion.id,
            criterion_type: criterion.criterion_type.clone(),
            criterion_name: criterion.name.clone(),
            passed: verdict.passed,
            is_required: criterion.is_required,
            expected_value: expected_value(criterion),
            actual_value: verdict.actual,
            explanation: verdict.explanation,
            weight: criterion.weight,
            basis: verdict.basis,
        }
    }

    fn dispatch(&self, facts: &ApplicationFacts<'_>, criterion: &Criterion) -> Verdict {
        let key = criterion.type_key();

        if let Some(handler) = self.handlers.get(&key) {
            if let Err(issue) = criterion.validate() {
                return Verdict::invalid(None, issue.to_string());
            }
            return handler(facts, criterion);
        }

        let Some(category) = self.categories.get(&key) else {
            return Verdict::not_evaluated(format!(
                "No evaluator for criteria type '{}'; '{}' not specifically evaluated",
                criterion.criterion_type, criterion.name
            ));
        };

        if let Some(record) = category.requires {
            if !record.present(facts) {
                return Verdict::missing(record.missing_message());
            }
        }

        let lowered = criterion.name.to_lowercase();
        match category.rules.iter().find(|rule| rule.matches(&lowered)) {
            Some(rule) => (rule.handler)(facts, criterion),
            None => Verdict::not_evaluated(format!(
                "{} criteria '{}' not specifically evaluated",
                category.label, criterion.name
            )),
        }
    }
}

impl std::fmt::Debug for CriteriaEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut handlers: Vec<&String> = self.handlers.keys().collect();
        handlers.sort();
        let mut categories: Vec<&String> = self.categories.keys().collect();
        categories.sort();
        f.debug_struct("CriteriaEvaluator")
            .field("handlers", &handlers)
            .field("categories", &categories)
            .field("unevaluated", &self.unevaluated)
            .finish()
    }
}

impl Default for CriteriaEvaluator {
    fn default() -> Self {
        Self::standard(UnevaluatedPolicy::default())
    }
}
