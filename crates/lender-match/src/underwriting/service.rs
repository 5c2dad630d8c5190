use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::domain::{
    ApplicationId, ApplicationRecord, ApplicationSnapshot, ApplicationStatus, Business,
    BusinessCredit, CriterionId, LenderId, LoanRequest, PersonalGuarantor, ProgramId, RunId,
    RunStatus, UnderwritingRun,
};
use super::matching::{MatchStatus, MatchingConfig, MatchingEngine};
use super::repository::{
    ApplicationRepository, PolicyRepository, RepositoryError, ResultStore, RunCommit,
};
use super::results::{
    ApplicationPage, ApplicationSummary, UnderwritingResults, UnderwritingStatusView,
};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Editable application content; everything but the reference id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDraft {
    #[serde(default)]
    pub business: Option<Business>,
    #[serde(default)]
    pub guarantor: Option<PersonalGuarantor>,
    #[serde(default)]
    pub business_credit: Option<BusinessCredit>,
    #[serde(default)]
    pub loan_request: Option<LoanRequest>,
}

impl ApplicationDraft {
    fn into_snapshot(self, application_id: ApplicationId) -> ApplicationSnapshot {
        ApplicationSnapshot {
            application_id,
            business: self.business,
            guarantor: self.guarantor,
            business_credit: self.business_credit,
            loan_request: self.loan_request,
        }
    }
}

/// Listing filter and page selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub status: Option<ApplicationStatus>,
}

/// An application claimed for underwriting whose run has not been evaluated yet.
#[derive(Debug, Clone)]
pub struct ClaimedRun {
    run: UnderwritingRun,
    record: ApplicationRecord,
}

impl ClaimedRun {
    /// The run as recorded at claim time, still RUNNING.
    pub fn run(&self) -> &UnderwritingRun {
        &self.run
    }
}

/// Service composing application storage, lender policies, the result store, and the engine.
pub struct UnderwritingService<A, P, S> {
    applications: Arc<A>,
    pub(super) policies: Arc<P>,
    results: Arc<S>,
    engine: MatchingEngine,
    application_sequence: AtomicU64,
    run_sequence: AtomicU64,
    policy_writes: Mutex<()>,
}

impl<A, P, S> UnderwritingService<A, P, S>
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    pub fn new(applications: Arc<A>, policies: Arc<P>, results: Arc<S>, config: MatchingConfig) -> Self {
        Self::with_engine(applications, policies, results, MatchingEngine::new(config))
    }

    pub fn with_engine(
        applications: Arc<A>,
        policies: Arc<P>,
        results: Arc<S>,
        engine: MatchingEngine,
    ) -> Self {
        Self {
            applications,
            policies,
            results,
            engine,
            application_sequence: AtomicU64::new(1),
            run_sequence: AtomicU64::new(1),
            policy_writes: Mutex::new(()),
        }
    }

    /// Serializes read-modify-write edits of lender policies.
    pub(super) fn policy_write_lock(&self) -> Result<MutexGuard<'_, ()>, UnderwritingError> {
        self.policy_writes.lock().map_err(|_| {
            RepositoryError::Unavailable("policy write lock poisoned".to_string()).into()
        })
    }

    fn next_application_id(&self) -> ApplicationId {
        let id = self.application_sequence.fetch_add(1, Ordering::Relaxed);
        ApplicationId(format!("APP-{id:08}"))
    }

    fn next_run_id(&self) -> RunId {
        RunId(self.run_sequence.fetch_add(1, Ordering::Relaxed))
    }

    fn load(&self, id: &ApplicationId) -> Result<ApplicationRecord, UnderwritingError> {
        self.applications
            .fetch(id)?
            .ok_or_else(|| UnderwritingError::NotFound(id.clone()))
    }

    fn load_draft(
        &self,
        id: &ApplicationId,
        action: &'static str,
    ) -> Result<ApplicationRecord, UnderwritingError> {
        let record = self.load(id)?;
        if !record.status.is_editable() {
            return Err(UnderwritingError::InvalidState {
                id: id.clone(),
                status: record.status,
                action,
            });
        }
        Ok(record)
    }

    /// Store a new DRAFT application under a fresh reference id.
    pub fn create(&self, draft: ApplicationDraft) -> Result<ApplicationRecord, UnderwritingError> {
        let record = ApplicationRecord {
            snapshot: draft.into_snapshot(self.next_application_id()),
            status: ApplicationStatus::Draft,
            created_at: Utc::now(),
            submitted_at: None,
            completed_at: None,
            error_message: None,
        };

        let stored = self.applications.insert(record)?;
        info!(application = %stored.id(), "application draft created");
        Ok(stored)
    }

    pub fn update(
        &self,
        id: &ApplicationId,
        draft: ApplicationDraft,
    ) -> Result<ApplicationRecord, UnderwritingError> {
        let mut record = self.load_draft(id, "update")?;
        record.snapshot = draft.into_snapshot(id.clone());
        self.applications.update(record.clone())?;
        Ok(record)
    }

    pub fn delete(&self, id: &ApplicationId) -> Result<(), UnderwritingError> {
        self.load_draft(id, "delete")?;
        self.applications.delete(id)?;
        info!(application = %id, "application draft deleted");
        Ok(())
    }

    /// Validate a draft and move it to SUBMITTED. Every gap is reported at once.
    pub fn submit(&self, id: &ApplicationId) -> Result<ApplicationRecord, UnderwritingError> {
        let mut record = self.load_draft(id, "submit")?;

        let gaps = record.snapshot.submission_gaps();
        if !gaps.is_empty() {
            return Err(UnderwritingError::Validation(gaps));
        }

        record.status = ApplicationStatus::Submitted;
        record.submitted_at = Some(Utc::now());
        self.applications
            .update_if(record.clone(), ApplicationStatus::Draft)
            .map_err(|error| match error {
                RepositoryError::Conflict => UnderwritingError::InvalidState {
                    id: id.clone(),
                    status: ApplicationStatus::Submitted,
                    action: "submit",
                },
                other => other.into(),
            })?;

        info!(application = %id, "application submitted");
        Ok(record)
    }

    pub fn get(&self, id: &ApplicationId) -> Result<ApplicationRecord, UnderwritingError> {
        self.load(id)
    }

    /// Newest first; `page` starts at 1 and `page_size` is capped at [`MAX_PAGE_SIZE`].
    pub fn list(&self, query: ListQuery) -> Result<ApplicationPage, UnderwritingError> {
        let page = query.page.unwrap_or(1);
        let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page == 0 {
            return Err(UnderwritingError::InvalidQuery(
                "page must be at least 1".to_string(),
            ));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(UnderwritingError::InvalidQuery(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let mut records = self.applications.list(query.status)?;
        records.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| right.id().cmp(left.id()))
        });

        let total = records.len();
        let items = records
            .iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .map(ApplicationSummary::from)
            .collect();

        Ok(ApplicationPage {
            items,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        })
    }

    /// Claim the application and evaluate it in one call.
    pub fn run_as_of(
        &self,
        id: &ApplicationId,
        as_of: NaiveDate,
    ) -> Result<UnderwritingRun, UnderwritingError> {
        let claimed = self.start_run(id)?;
        self.finish_run(claimed, as_of)
    }

    /// Claim the application for a new run and record the run as RUNNING.
    ///
    /// Only SUBMITTED or COMPLETED applications may start a run. The application
    /// is moved to PROCESSING with a conditional update, so a second concurrent
    /// run is refused rather than duplicated.
    pub fn start_run(&self, id: &ApplicationId) -> Result<ClaimedRun, UnderwritingError> {
        let mut record = self.load(id)?;

        if record.status == ApplicationStatus::Processing {
            return Err(UnderwritingError::RunInProgress(id.clone()));
        }
        if !record.status.can_start_run() {
            return Err(UnderwritingError::InvalidState {
                id: id.clone(),
                status: record.status,
                action: "run underwriting for",
            });
        }

        let gaps = record.snapshot.submission_gaps();
        if !gaps.is_empty() {
            return Err(UnderwritingError::Validation(gaps));
        }

        let previous = record.status;
        record.status = ApplicationStatus::Processing;
        record.error_message = None;
        self.applications
            .update_if(record.clone(), previous)
            .map_err(|error| match error {
                RepositoryError::Conflict => UnderwritingError::RunInProgress(id.clone()),
                other => other.into(),
            })?;

        let run = UnderwritingRun {
            run_id: self.next_run_id(),
            application_id: id.clone(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            total_lenders_evaluated: 0,
            eligible_lenders: 0,
            error_message: None,
        };

        if let Err(error) = self.results.begin_run(&run) {
            let message = error.to_string();
            warn!(application = %id, run = run.run_id.0, error = %message, "could not record run start");
            self.mark_failed(run, record, &message);
            return Err(UnderwritingError::RunFailed {
                id: id.clone(),
                message,
            });
        }

        info!(application = %id, run = run.run_id.0, "underwriting run started");
        Ok(ClaimedRun { run, record })
    }

    /// Evaluate a claimed application against every active lender and commit the results.
    ///
    /// Any failure marks both the run and the application FAILED.
    pub fn finish_run(
        &self,
        claimed: ClaimedRun,
        as_of: NaiveDate,
    ) -> Result<UnderwritingRun, UnderwritingError> {
        let ClaimedRun { run, record } = claimed;
        let id = record.id().clone();

        match self.execute(run.clone(), record.clone(), as_of) {
            Ok(finished) => {
                info!(
                    application = %id,
                    run = finished.run_id.0,
                    lenders = finished.total_lenders_evaluated,
                    eligible = finished.eligible_lenders,
                    %as_of,
                    "underwriting run completed"
                );
                Ok(finished)
            }
            Err(error) => {
                let message = error.to_string();
                warn!(application = %id, run = run.run_id.0, error = %message, "underwriting run failed");
                self.mark_failed(run, record, &message);
                Err(UnderwritingError::RunFailed { id, message })
            }
        }
    }

    fn execute(
        &self,
        mut run: UnderwritingRun,
        mut record: ApplicationRecord,
        as_of: NaiveDate,
    ) -> Result<UnderwritingRun, RepositoryError> {
        let lenders = self.policies.active_lenders()?;
        for lender in &lenders {
            for issue in lender.policy_issues() {
                warn!(lender = %lender.name, %issue, "lender policy has an invalid criterion");
            }
        }

        let matches = self
            .engine
            .evaluate_all_lenders(&record.snapshot, &lenders, as_of);

        let finished_at = Utc::now();
        run.status = RunStatus::Completed;
        run.completed_at = Some(finished_at);
        run.total_lenders_evaluated = matches.len();
        run.eligible_lenders = matches
            .iter()
            .filter(|result| result.status == MatchStatus::Eligible)
            .count();

        record.status = ApplicationStatus::Completed;
        record.completed_at = Some(finished_at);
        record.error_message = None;

        self.results.commit_run(RunCommit {
            run: run.clone(),
            application: record,
            results: matches,
        })?;

        Ok(run)
    }

    /// Persist the failure. When the result store refuses, the application
    /// record alone is moved from PROCESSING to FAILED.
    fn mark_failed(&self, mut run: UnderwritingRun, mut record: ApplicationRecord, message: &str) {
        run.status = RunStatus::Failed;
        run.completed_at = Some(Utc::now());
        run.error_message = Some(message.to_string());
        record.status = ApplicationStatus::Failed;
        record.error_message = Some(message.to_string());

        let application = record.id().clone();
        let Err(error) = self.results.record_failure(run, record.clone()) else {
            return;
        };
        warn!(%application, %error, "failed to record underwriting failure");

        if let Err(error) = self
            .applications
            .update_if(record, ApplicationStatus::Processing)
        {
            error!(%application, %error, "application left in PROCESSING after a failed run");
        }
    }

    pub fn status(&self, id: &ApplicationId) -> Result<UnderwritingStatusView, UnderwritingError> {
        let record = self.load(id)?;
        let latest_run = self.results.latest_run(id)?;
        let results = self.results.results_for(id)?;
        Ok(UnderwritingStatusView::new(&record, latest_run, &results))
    }

    pub fn results(&self, id: &ApplicationId) -> Result<UnderwritingResults, UnderwritingError> {
        self.load(id)?;
        let latest_run = self.results.latest_run(id)?;
        let results = self.results.results_for(id)?;
        Ok(UnderwritingResults::from_matches(
            id.clone(),
            latest_run,
            results,
        ))
    }
}

/// Error raised by the underwriting service.
#[derive(Debug, thiserror::Error)]
pub enum UnderwritingError {
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("cannot {action} application {id} in status {}", .status.label())]
    InvalidState {
        id: ApplicationId,
        status: ApplicationStatus,
        action: &'static str,
    },
    #[error("an underwriting run is already in progress for application {0}")]
    RunInProgress(ApplicationId),
    #[error("application is incomplete: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("invalid listing query: {0}")]
    InvalidQuery(String),
    #[error("lender {0} not found")]
    LenderNotFound(LenderId),
    #[error("program {0} not found")]
    ProgramNotFound(ProgramId),
    #[error("criterion {0} not found")]
    CriterionNotFound(CriterionId),
    #[error("a lender named '{0}' already exists")]
    DuplicateLender(String),
    #[error("lender policy is invalid: {}", .0.join("; "))]
    InvalidPolicy(Vec<String>),
    #[error("underwriting run for application {id} failed: {message}")]
    RunFailed { id: ApplicationId, message: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
