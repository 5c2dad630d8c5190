use chrono::NaiveDate;
use lender_match::config::AppConfig;
use lender_match::underwriting::{
    load_lenders, parse_lenders, ApplicationId, ApplicationRecord, ApplicationRepository,
    ApplicationStatus, Lender, LenderId, MatchResult, PolicyRepository, RepositoryError, ResultStore,
    RunCommit, SeedError, UnderwritingRun,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

const BUNDLED_LENDERS: &str = include_str!("../data/seed_lenders.json");

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct StoreState {
    applications: HashMap<ApplicationId, ApplicationRecord>,
    runs: HashMap<ApplicationId, Vec<UnderwritingRun>>,
    results: HashMap<ApplicationId, Vec<MatchResult>>,
}

/// Applications, runs, and match results behind one lock so a run commit is all-or-nothing.
#[derive(Default, Clone)]
pub(crate) struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl ApplicationRepository for InMemoryStore {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.applications.contains_key(record.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.applications.insert(record.id().clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: ApplicationRecord) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        match guard.applications.get_mut(record.id()) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn update_if(
        &self,
        record: ApplicationRecord,
        expected: ApplicationStatus,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        match guard.applications.get_mut(record.id()) {
            Some(existing) if existing.status == expected => {
                *existing = record;
                Ok(())
            }
            Some(_) => Err(RepositoryError::Conflict),
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(self.lock()?.applications.get(id).cloned())
    }

    fn delete(&self, id: &ApplicationId) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        guard.applications.remove(id).ok_or(RepositoryError::NotFound)?;
        guard.runs.remove(id);
        guard.results.remove(id);
        Ok(())
    }

    fn list(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .applications
            .values()
            .filter(|record| status.map_or(true, |wanted| record.status == wanted))
            .cloned()
            .collect())
    }
}

impl ResultStore for InMemoryStore {
    fn begin_run(&self, run: &UnderwritingRun) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        guard
            .runs
            .entry(run.application_id.clone())
            .or_default()
            .push(run.clone());
        Ok(())
    }

    fn commit_run(&self, commit: RunCommit) -> Result<(), RepositoryError> {
        let RunCommit {
            run,
            application,
            results,
        } = commit;
        let mut guard = self.lock()?;
        let id = application.id().clone();
        store_run(guard.runs.entry(id.clone()).or_default(), run);
        guard.results.insert(id.clone(), results);
        guard.applications.insert(id, application);
        Ok(())
    }

    fn record_failure(
        &self,
        run: UnderwritingRun,
        application: ApplicationRecord,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        let id = application.id().clone();
        store_run(guard.runs.entry(id.clone()).or_default(), run);
        guard.applications.insert(id, application);
        Ok(())
    }

    fn results_for(&self, id: &ApplicationId) -> Result<Vec<MatchResult>, RepositoryError> {
        Ok(self.lock()?.results.get(id).cloned().unwrap_or_default())
    }

    fn latest_run(&self, id: &ApplicationId) -> Result<Option<UnderwritingRun>, RepositoryError> {
        Ok(self
            .lock()?
            .runs
            .get(id)
            .and_then(|runs| runs.last().cloned()))
    }
}

fn store_run(runs: &mut Vec<UnderwritingRun>, run: UnderwritingRun) {
    match runs.iter_mut().find(|existing| existing.run_id == run.run_id) {
        Some(existing) => *existing = run,
        None => runs.push(run),
    }
}

/// Lender policies seeded at startup and edited in place through the lender routes.
pub(crate) struct SeedPolicies {
    lenders: Mutex<Vec<Lender>>,
}

impl SeedPolicies {
    pub(crate) fn new(lenders: Vec<Lender>) -> Self {
        Self {
            lenders: Mutex::new(lenders),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Lender>>, RepositoryError> {
        self.lenders
            .lock()
            .map_err(|_| RepositoryError::Unavailable("policy mutex poisoned".to_string()))
    }
}

impl PolicyRepository for SeedPolicies {
    fn lenders(&self) -> Result<Vec<Lender>, RepositoryError> {
        Ok(self.lock()?.clone())
    }

    fn save_lender(&self, lender: Lender) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        match guard.iter_mut().find(|existing| existing.id == lender.id) {
            Some(existing) => *existing = lender,
            None => guard.push(lender),
        }
        Ok(())
    }

    fn delete_lender(&self, id: LenderId) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        let before = guard.len();
        guard.retain(|lender| lender.id != id);
        if guard.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

pub(crate) fn bundled_lenders() -> Result<Vec<Lender>, SeedError> {
    parse_lenders(BUNDLED_LENDERS)
}

/// Policies from `APP_POLICY_SEED` when configured, otherwise the bundled set.
pub(crate) fn configured_lenders(config: &AppConfig) -> Result<Vec<Lender>, SeedError> {
    match &config.policy_seed {
        Some(path) => {
            info!(path = %path.display(), "loading lender policies from file");
            load_lenders(path)
        }
        None => bundled_lenders(),
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
