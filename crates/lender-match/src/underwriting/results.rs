use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    ApplicationId, ApplicationRecord, ApplicationStatus, LenderId, UnderwritingRun,
};
use super::matching::{MatchResult, MatchStatus};

/// Match results grouped by status, each group ordered by fit score.
#[derive(Debug, Clone, Serialize)]
pub struct UnderwritingResults {
    pub application_id: ApplicationId,
    pub run: Option<UnderwritingRun>,
    pub total_evaluated: usize,
    pub eligible_count: usize,
    pub needs_review_count: usize,
    pub ineligible_count: usize,
    pub best_match: Option<MatchResult>,
    pub eligible: Vec<MatchResult>,
    pub needs_review: Vec<MatchResult>,
    pub ineligible: Vec<MatchResult>,
}

impl UnderwritingResults {
    pub fn from_matches(
        application_id: ApplicationId,
        run: Option<UnderwritingRun>,
        matches: Vec<MatchResult>,
    ) -> Self {
        let total_evaluated = matches.len();
        let mut eligible = Vec::new();
        let mut needs_review = Vec::new();
        let mut ineligible = Vec::new();

        for result in matches {
            match result.status {
                MatchStatus::Eligible => eligible.push(result),
                MatchStatus::NeedsReview => needs_review.push(result),
                MatchStatus::Ineligible => ineligible.push(result),
            }
        }

        for group in [&mut eligible, &mut needs_review, &mut ineligible] {
            rank_by_fit(group);
        }

        Self {
            application_id,
            run,
            total_evaluated,
            eligible_count: eligible.len(),
            needs_review_count: needs_review.len(),
            ineligible_count: ineligible.len(),
            best_match: eligible.first().cloned(),
            eligible,
            needs_review,
            ineligible,
        }
    }
}

/// Stable sort by fit score descending; equal scores keep engine order.
pub fn rank_by_fit(results: &mut [MatchResult]) {
    results.sort_by(|left, right| right.fit_score.total_cmp(&left.fit_score));
}

/// Short per-lender line used by status polling.
#[derive(Debug, Clone, Serialize)]
pub struct LenderOutcome {
    pub lender_id: LenderId,
    pub lender_name: String,
    pub program_name: Option<String>,
    pub status: MatchStatus,
    pub fit_score: f64,
    pub summary: String,
}

impl From<&MatchResult> for LenderOutcome {
    fn from(result: &MatchResult) -> Self {
        Self {
            lender_id: result.lender_id,
            lender_name: result.lender_name.clone(),
            program_name: result.program_name.clone(),
            status: result.status,
            fit_score: result.fit_score,
            summary: result.summary.clone(),
        }
    }
}

/// Application status plus the latest run, for polling clients.
#[derive(Debug, Clone, Serialize)]
pub struct UnderwritingStatusView {
    pub application_id: ApplicationId,
    pub status: ApplicationStatus,
    pub error_message: Option<String>,
    pub latest_run: Option<UnderwritingRun>,
    pub lenders: Vec<LenderOutcome>,
}

impl UnderwritingStatusView {
    pub fn new(
        record: &ApplicationRecord,
        latest_run: Option<UnderwritingRun>,
        results: &[MatchResult],
    ) -> Self {
        let mut lenders: Vec<LenderOutcome> = results.iter().map(LenderOutcome::from).collect();
        lenders.sort_by(|left, right| right.fit_score.total_cmp(&left.fit_score));

        Self {
            application_id: record.id().clone(),
            status: record.status,
            error_message: record.error_message.clone(),
            latest_run,
            lenders,
        }
    }
}

/// Row in the application listing.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationSummary {
    pub reference_id: ApplicationId,
    pub business_name: Option<String>,
    pub requested_amount: Option<f64>,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl From<&ApplicationRecord> for ApplicationSummary {
    fn from(record: &ApplicationRecord) -> Self {
        Self {
            reference_id: record.id().clone(),
            business_name: record
                .snapshot
                .business
                .as_ref()
                .map(|business| business.legal_name.clone()),
            requested_amount: record
                .snapshot
                .loan_request
                .as_ref()
                .map(|request| request.requested_amount),
            status: record.status,
            created_at: record.created_at,
            submitted_at: record.submitted_at,
        }
    }
}

/// One page of the application listing.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationPage {
    pub items: Vec<ApplicationSummary>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}
