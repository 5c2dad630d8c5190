use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Reference identifier for a loan application (e.g. `APP-00000042`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LenderId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgramId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CriterionId(pub u64);

impl std::fmt::Display for LenderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for ProgramId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for CriterionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operating business requesting financing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Business {
    pub legal_name: String,
    pub state: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub years_in_business: Option<f64>,
    #[serde(default)]
    pub months_in_business: Option<u32>,
    #[serde(default)]
    pub annual_revenue: Option<f64>,
    #[serde(default)]
    pub monthly_revenue: Option<f64>,
}

/// Personal guarantor and their consumer credit profile.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersonalGuarantor {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub fico_score: Option<u16>,
    #[serde(default)]
    pub has_bankruptcy: bool,
    #[serde(default)]
    pub bankruptcy_discharge_date: Option<NaiveDate>,
    #[serde(default)]
    pub years_since_bankruptcy: Option<f64>,
    #[serde(default)]
    pub has_open_tax_liens: bool,
    #[serde(default)]
    pub tax_lien_amount: Option<f64>,
    #[serde(default)]
    pub has_judgments: bool,
}

/// Commercial bureau scores for the business.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BusinessCredit {
    #[serde(default)]
    pub paynet_score: Option<u16>,
    #[serde(default)]
    pub paynet_master_score: Option<u16>,
    #[serde(default)]
    pub paydex_score: Option<u16>,
    #[serde(default)]
    pub experian_business_score: Option<u16>,
}

/// Requested financing and the equipment it pays for.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoanRequest {
    pub requested_amount: f64,
    #[serde(default)]
    pub term_months: Option<u32>,
    #[serde(default)]
    pub equipment_type: Option<String>,
    #[serde(default)]
    pub equipment_cost: Option<f64>,
    #[serde(default)]
    pub equipment_year: Option<i32>,
    #[serde(default)]
    pub equipment_age_years: Option<f64>,
    #[serde(default)]
    pub equipment_condition: Option<String>,
    #[serde(default)]
    pub down_payment_amount: Option<f64>,
    #[serde(default)]
    pub down_payment_percent: Option<f64>,
}

/// Fully materialized, read-only application data handed to the matching engine.
///
/// Every sub-record is optional; criteria that depend on an absent record fail
/// with an explanation rather than aborting the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSnapshot {
    pub application_id: ApplicationId,
    #[serde(default)]
    pub business: Option<Business>,
    #[serde(default)]
    pub guarantor: Option<PersonalGuarantor>,
    #[serde(default)]
    pub business_credit: Option<BusinessCredit>,
    #[serde(default)]
    pub loan_request: Option<LoanRequest>,
}

impl ApplicationSnapshot {
    pub fn empty(application_id: ApplicationId) -> Self {
        Self {
            application_id,
            business: None,
            guarantor: None,
            business_credit: None,
            loan_request: None,
        }
    }

    /// Completeness checks required before an application may be submitted.
    pub fn submission_gaps(&self) -> Vec<String> {
        let mut gaps = Vec::new();

        match &self.business {
            None => gaps.push("Business information is required".to_string()),
            Some(business) => {
                if business.legal_name.trim().is_empty() {
                    gaps.push("Business legal name is required".to_string());
                }
                if business.state.trim().is_empty() {
                    gaps.push("Business state is required".to_string());
                }
            }
        }

        match &self.guarantor {
            None => gaps.push("Personal guarantor information is required".to_string()),
            Some(guarantor) if guarantor.fico_score.is_none() => {
                gaps.push("FICO score is required".to_string())
            }
            Some(_) => {}
        }

        match &self.loan_request {
            None => gaps.push("Loan request information is required".to_string()),
            Some(request) if !(request.requested_amount > 0.0) => {
                gaps.push("Requested loan amount is required".to_string())
            }
            Some(_) => {}
        }

        gaps
    }
}

/// Comparison operator attached to a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Gte,
    Gt,
    Lte,
    Lt,
    Eq,
    Neq,
    Between,
    In,
    NotIn,
}

impl Operator {
    pub const fn label(self) -> &'static str {
        match self {
            Operator::Gte => "gte",
            Operator::Gt => "gt",
            Operator::Lte => "lte",
            Operator::Lt => "lt",
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Between => "between",
            Operator::In => "in",
            Operator::NotIn => "not_in",
        }
    }
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_weight() -> f64 {
    1.0
}

/// A single declarative underwriting rule.
///
/// `criterion_type` is an open string: policies produced by
/// document extraction may carry types no dedicated handler knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: CriterionId,
    pub criterion_type: String,
    pub name: String,
    pub operator: Operator,
    #[serde(default)]
    pub numeric_value: Option<f64>,
    #[serde(default)]
    pub numeric_value_min: Option<f64>,
    #[serde(default)]
    pub numeric_value_max: Option<f64>,
    #[serde(default)]
    pub string_value: Option<String>,
    #[serde(default)]
    pub list_values: Vec<String>,
    #[serde(default = "default_true")]
    pub is_required: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub failure_message: Option<String>,
}

impl Criterion {
    /// Build an active, required criterion with weight 1.0 and no bounds.
    pub fn new(
        id: u64,
        criterion_type: impl Into<String>,
        name: impl Into<String>,
        operator: Operator,
    ) -> Self {
        Self {
            id: CriterionId(id),
            criterion_type: criterion_type.into(),
            name: name.into(),
            operator,
            numeric_value: None,
            numeric_value_min: None,
            numeric_value_max: None,
            string_value: None,
            list_values: Vec::new(),
            is_required: true,
            weight: 1.0,
            is_active: true,
            failure_message: None,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.numeric_value = Some(value);
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.numeric_value_min = Some(min);
        self.numeric_value_max = Some(max);
        self
    }

    pub fn with_text(mut self, value: impl Into<String>) -> Self {
        self.string_value = Some(value.into());
        self
    }

    pub fn with_list<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.list_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    /// Lowercased type tag used for handler dispatch.
    pub fn type_key(&self) -> String {
        self.criterion_type.trim().to_ascii_lowercase()
    }

    /// Check that the configured bounds make sense for the operator.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(PolicyError::InvalidWeight {
                criterion: self.name.clone(),
                weight: self.weight,
            });
        }

        match self.operator {
            Operator::Between => match (self.numeric_value_min, self.numeric_value_max) {
                (Some(min), Some(max)) if min <= max => Ok(()),
                (Some(min), Some(max)) => Err(PolicyError::InvertedRange {
                    criterion: self.name.clone(),
                    min,
                    max,
                }),
                _ => Err(PolicyError::MissingBound {
                    criterion: self.name.clone(),
                    operator: self.operator,
                }),
            },
            Operator::In | Operator::NotIn => {
                if self.list_values.is_empty() {
                    Err(PolicyError::EmptyList {
                        criterion: self.name.clone(),
                        operator: self.operator,
                    })
                } else {
                    Ok(())
                }
            }
            Operator::Eq | Operator::Neq
                if self.numeric_value.is_none() && self.string_value.is_some() =>
            {
                Ok(())
            }
            _ => {
                if self.numeric_value.is_some() {
                    Ok(())
                } else {
                    Err(PolicyError::MissingBound {
                        criterion: self.name.clone(),
                        operator: self.operator,
                    })
                }
            }
        }
    }
}

/// Named bundle of criteria offered by a lender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

impl Program {
    pub fn active_criteria(&self) -> impl Iterator<Item = &Criterion> {
        self.criteria.iter().filter(|criterion| criterion.is_active)
    }
}

/// Lender policy aggregate as loaded by the policy repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lender {
    pub id: LenderId,
    pub name: String,
    pub display_name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub programs: Vec<Program>,
}

impl Lender {
    pub fn active_programs(&self) -> impl Iterator<Item = &Program> {
        self.programs.iter().filter(|program| program.is_active)
    }

    /// Validation problems across every criterion of the lender, in policy order.
    pub fn policy_issues(&self) -> Vec<PolicyError> {
        self.programs
            .iter()
            .flat_map(|program| program.criteria.iter())
            .filter_map(|criterion| criterion.validate().err())
            .collect()
    }
}

/// Configuration defects detected when a policy is loaded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("criterion '{criterion}' uses {} without the bound(s) it needs", .operator.label())]
    MissingBound { criterion: String, operator: Operator },
    #[error("criterion '{criterion}' has min {min} greater than max {max}")]
    InvertedRange {
        criterion: String,
        min: f64,
        max: f64,
    },
    #[error("criterion '{criterion}' uses {} with an empty list", .operator.label())]
    EmptyList { criterion: String, operator: Operator },
    #[error("criterion '{criterion}' has invalid weight {weight}")]
    InvalidWeight { criterion: String, weight: f64 },
}

/// Lifecycle of a loan application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    Processing,
    Completed,
    Failed,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "DRAFT",
            ApplicationStatus::Submitted => "SUBMITTED",
            ApplicationStatus::Processing => "PROCESSING",
            ApplicationStatus::Completed => "COMPLETED",
            ApplicationStatus::Failed => "FAILED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Some(Self::Draft),
            "SUBMITTED" => Some(Self::Submitted),
            "PROCESSING" => Some(Self::Processing),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub const fn is_editable(self) -> bool {
        matches!(self, ApplicationStatus::Draft)
    }

    pub const fn can_start_run(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Submitted | ApplicationStatus::Completed
        )
    }
}

/// Stored application: the snapshot plus lifecycle bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub snapshot: ApplicationSnapshot,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ApplicationRecord {
    pub fn id(&self) -> &ApplicationId {
        &self.snapshot.application_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// One underwriting run against the active lender set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderwritingRun {
    pub run_id: RunId,
    pub application_id: ApplicationId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_lenders_evaluated: usize,
    pub eligible_lenders: usize,
    pub error_message: Option<String>,
}
