//! Loan application intake, lender policy matching, and underwriting runs.

pub mod domain;
pub mod lenders;
pub mod matching;
pub mod repository;
pub mod results;
pub mod router;
pub mod seed;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    ApplicationId, ApplicationRecord, ApplicationSnapshot, ApplicationStatus, Business,
    BusinessCredit, Criterion, CriterionId, Lender, LenderId, LoanRequest, Operator,
    PersonalGuarantor, PolicyError, Program, ProgramId, RunId, RunStatus, UnderwritingRun,
};
pub use lenders::{CriterionDraft, LenderDraft, LenderUpdate, ProgramDraft, ProgramUpdate};
pub use matching::{
    CriteriaEvaluator, CriterionEvaluation, EvaluationBasis, MatchResult, MatchStatus,
    MatchingConfig, MatchingEngine, UnevaluatedPolicy,
};
pub use repository::{
    ApplicationRepository, PolicyRepository, RepositoryError, ResultStore, RunCommit,
};
pub use results::{ApplicationPage, UnderwritingResults, UnderwritingStatusView};
pub use router::underwriting_router;
pub use seed::{load_lenders, parse_lenders, SeedError};
pub use service::{
    ApplicationDraft, ClaimedRun, ListQuery, UnderwritingError, UnderwritingService,
};
