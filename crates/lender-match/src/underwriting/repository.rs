use super::domain::{
    ApplicationId, ApplicationRecord, ApplicationStatus, Lender, LenderId, UnderwritingRun,
};
use super::matching::MatchResult;

/// Storage abstraction for applications so the service can be exercised in isolation.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn update(&self, record: ApplicationRecord) -> Result<(), RepositoryError>;
    /// Replace the record only while its stored status still equals `expected`.
    ///
    /// Returns [`RepositoryError::Conflict`] when another writer moved it first.
    fn update_if(
        &self,
        record: ApplicationRecord,
        expected: ApplicationStatus,
    ) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn delete(&self, id: &ApplicationId) -> Result<(), RepositoryError>;
    fn list(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError>;
}

/// Store of lender policies. Lenders are read and written as fully materialized aggregates.
pub trait PolicyRepository: Send + Sync {
    /// Every lender, inactive ones included, in storage order.
    fn lenders(&self) -> Result<Vec<Lender>, RepositoryError>;

    /// Insert the lender, or replace the stored lender with the same id.
    fn save_lender(&self, lender: Lender) -> Result<(), RepositoryError>;

    /// Remove the lender with its programs and criteria.
    fn delete_lender(&self, id: LenderId) -> Result<(), RepositoryError>;

    fn active_lenders(&self) -> Result<Vec<Lender>, RepositoryError> {
        Ok(self
            .lenders()?
            .into_iter()
            .filter(|lender| lender.is_active)
            .collect())
    }
}

/// Everything persisted when a run finishes successfully.
#[derive(Debug, Clone)]
pub struct RunCommit {
    pub run: UnderwritingRun,
    pub application: ApplicationRecord,
    pub results: Vec<MatchResult>,
}

/// Sink for underwriting runs and their match results.
pub trait ResultStore: Send + Sync {
    /// Record a run that has just started.
    fn begin_run(&self, run: &UnderwritingRun) -> Result<(), RepositoryError>;

    /// Atomically replace the application's result set, store the finished run,
    /// and persist the updated application record. Readers must never observe
    /// a partial commit.
    fn commit_run(&self, commit: RunCommit) -> Result<(), RepositoryError>;

    /// Atomically store the failed run and the failed application record.
    /// Previously committed results are left untouched.
    fn record_failure(
        &self,
        run: UnderwritingRun,
        application: ApplicationRecord,
    ) -> Result<(), RepositoryError>;

    fn results_for(&self, id: &ApplicationId) -> Result<Vec<MatchResult>, RepositoryError>;
    fn latest_run(&self, id: &ApplicationId) -> Result<Option<UnderwritingRun>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists or was modified concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
