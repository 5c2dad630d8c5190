use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::underwriting::domain::{
    ApplicationId, ApplicationRecord, ApplicationSnapshot, ApplicationStatus, Business,
    BusinessCredit, Criterion, Lender, LenderId, LoanRequest, Operator, PersonalGuarantor,
    Program, ProgramId, UnderwritingRun,
};
use crate::underwriting::matching::{
    ApplicationFacts, CriteriaEvaluator, CriterionEvaluation, MatchResult, MatchingConfig,
};
use crate::underwriting::repository::{
    ApplicationRepository, PolicyRepository, RepositoryError, ResultStore, RunCommit,
};
use crate::underwriting::service::{ApplicationDraft, UnderwritingService};

pub(super) type MemoryService = UnderwritingService<MemoryStore, MemoryPolicies, MemoryStore>;

pub(super) fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date")
}

pub(super) fn business() -> Business {
    Business {
        legal_name: "Prairie Earthworks LLC".to_string(),
        state: "TX".to_string(),
        industry: Some("Construction".to_string()),
        years_in_business: Some(5.0),
        months_in_business: Some(60),
        annual_revenue: Some(1_200_000.0),
        monthly_revenue: None,
    }
}

pub(super) fn guarantor() -> PersonalGuarantor {
    PersonalGuarantor {
        first_name: "Dana".to_string(),
        last_name: "Whitfield".to_string(),
        fico_score: Some(720),
        ..PersonalGuarantor::default()
    }
}

pub(super) fn business_credit() -> BusinessCredit {
    BusinessCredit {
        paynet_score: Some(680),
        paydex_score: Some(75),
        ..BusinessCredit::default()
    }
}

pub(super) fn loan_request() -> LoanRequest {
    LoanRequest {
        requested_amount: 150_000.0,
        term_months: Some(60),
        equipment_type: Some("Excavator".to_string()),
        equipment_cost: Some(170_000.0),
        equipment_year: Some(2021),
        equipment_condition: Some("used".to_string()),
        down_payment_amount: Some(20_000.0),
        ..LoanRequest::default()
    }
}

/// Complete, strong application.
pub(super) fn snapshot() -> ApplicationSnapshot {
    ApplicationSnapshot {
        application_id: ApplicationId("APP-TEST".to_string()),
        business: Some(business()),
        guarantor: Some(guarantor()),
        business_credit: Some(business_credit()),
        loan_request: Some(loan_request()),
    }
}

pub(super) fn draft() -> ApplicationDraft {
    let snapshot = snapshot();
    ApplicationDraft {
        business: snapshot.business,
        guarantor: snapshot.guarantor,
        business_credit: snapshot.business_credit,
        loan_request: snapshot.loan_request,
    }
}

pub(super) fn evaluate(snapshot: &ApplicationSnapshot, criterion: &Criterion) -> CriterionEvaluation {
    CriteriaEvaluator::default().evaluate(&ApplicationFacts::new(snapshot, as_of()), criterion)
}

pub(super) fn program(id: u64, name: &str, criteria: Vec<Criterion>) -> Program {
    Program {
        id: ProgramId(id),
        name: name.to_string(),
        is_active: true,
        priority: 0,
        criteria,
    }
}

pub(super) fn lender(id: u64, display_name: &str, programs: Vec<Program>) -> Lender {
    Lender {
        id: LenderId(id),
        name: display_name.to_ascii_lowercase().replace(' ', "_"),
        display_name: display_name.to_string(),
        is_active: true,
        programs,
    }
}

/// Three lenders: one the strong applicant clears, one it misses on FICO, one with an optional miss.
pub(super) fn sample_lenders() -> Vec<Lender> {
    vec![
        lender(
            1,
            "Summit Equipment Finance",
            vec![program(
                10,
                "Standard",
                vec![
                    Criterion::new(100, "fico_score", "Minimum FICO", Operator::Gte)
                        .with_value(680.0)
                        .with_weight(2.0),
                    Criterion::new(101, "time_in_business", "Time in business", Operator::Gte)
                        .with_value(24.0),
                    Criterion::new(102, "loan_amount_max", "Maximum amount", Operator::Lte)
                        .with_value(500_000.0),
                ],
            )],
        ),
        lender(
            2,
            "Keystone Capital",
            vec![program(
                20,
                "Prime",
                vec![
                    Criterion::new(200, "fico_score", "Minimum FICO", Operator::Gte)
                        .with_value(760.0),
                    Criterion::new(201, "state_excluded", "Excluded states", Operator::NotIn)
                        .with_list(["CA", "NV"]),
                ],
            )],
        ),
        lender(
            3,
            "Ridgeline Leasing",
            vec![program(
                30,
                "Growth",
                vec![
                    Criterion::new(300, "fico_score", "Minimum FICO", Operator::Gte)
                        .with_value(650.0),
                    Criterion::new(301, "paynet_score", "PayNet preferred", Operator::Gte)
                        .with_value(700.0)
                        .optional(),
                ],
            )],
        ),
    ]
}

#[derive(Default)]
pub(super) struct StoreState {
    pub(super) applications: HashMap<ApplicationId, ApplicationRecord>,
    pub(super) runs: HashMap<ApplicationId, Vec<UnderwritingRun>>,
    pub(super) results: HashMap<ApplicationId, Vec<MatchResult>>,
}

/// Applications, runs, and results behind a single mutex so commits are atomic.
#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    pub(super) state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub(super) fn runs(&self, id: &ApplicationId) -> Vec<UnderwritingRun> {
        let guard = self.state.lock().expect("store mutex poisoned");
        guard.runs.get(id).cloned().unwrap_or_default()
    }

    pub(super) fn force_status(&self, id: &ApplicationId, status: ApplicationStatus) {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        if let Some(record) = guard.applications.get_mut(id) {
            record.status = status;
        }
    }
}

impl ApplicationRepository for MemoryStore {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        if guard.applications.contains_key(record.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.applications.insert(record.id().clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: ApplicationRecord) -> Result<(), RepositoryError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        guard.applications.insert(record.id().clone(), record);
        Ok(())
    }

    fn update_if(
        &self,
        record: ApplicationRecord,
        expected: ApplicationStatus,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        match guard.applications.get(record.id()) {
            Some(current) if current.status == expected => {
                guard.applications.insert(record.id().clone(), record);
                Ok(())
            }
            Some(_) => Err(RepositoryError::Conflict),
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard.applications.get(id).cloned())
    }

    fn delete(&self, id: &ApplicationId) -> Result<(), RepositoryError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        guard
            .applications
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn list(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard
            .applications
            .values()
            .filter(|record| status.map_or(true, |wanted| record.status == wanted))
            .cloned()
            .collect())
    }
}

impl ResultStore for MemoryStore {
    fn begin_run(&self, run: &UnderwritingRun) -> Result<(), RepositoryError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        guard
            .runs
            .entry(run.application_id.clone())
            .or_default()
            .push(run.clone());
        Ok(())
    }

    fn commit_run(&self, commit: RunCommit) -> Result<(), RepositoryError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        let id = commit.application.id().clone();
        upsert_run(guard.runs.entry(id.clone()).or_default(), commit.run);
        guard.results.insert(id.clone(), commit.results);
        guard.applications.insert(id, commit.application);
        Ok(())
    }

    fn record_failure(
        &self,
        run: UnderwritingRun,
        application: ApplicationRecord,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.state.lock().expect("store mutex poisoned");
        let id = application.id().clone();
        upsert_run(guard.runs.entry(id.clone()).or_default(), run);
        guard.applications.insert(id, application);
        Ok(())
    }

    fn results_for(&self, id: &ApplicationId) -> Result<Vec<MatchResult>, RepositoryError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard.results.get(id).cloned().unwrap_or_default())
    }

    fn latest_run(&self, id: &ApplicationId) -> Result<Option<UnderwritingRun>, RepositoryError> {
        let guard = self.state.lock().expect("store mutex poisoned");
        Ok(guard.runs.get(id).and_then(|runs| runs.last().cloned()))
    }
}

fn upsert_run(runs: &mut Vec<UnderwritingRun>, run: UnderwritingRun) {
    match runs.iter_mut().find(|existing| existing.run_id == run.run_id) {
        Some(existing) => *existing = run,
        None => runs.push(run),
    }
}

pub(super) struct MemoryPolicies {
    pub(super) lenders: Mutex<Vec<Lender>>,
}

impl MemoryPolicies {
    pub(super) fn new(lenders: Vec<Lender>) -> Self {
        Self {
            lenders: Mutex::new(lenders),
        }
    }
}

impl PolicyRepository for MemoryPolicies {
    fn lenders(&self) -> Result<Vec<Lender>, RepositoryError> {
        Ok(self.lenders.lock().expect("policy mutex poisoned").clone())
    }

    fn save_lender(&self, lender: Lender) -> Result<(), RepositoryError> {
        let mut guard = self.lenders.lock().expect("policy mutex poisoned");
        match guard.iter_mut().find(|existing| existing.id == lender.id) {
            Some(existing) => *existing = lender,
            None => guard.push(lender),
        }
        Ok(())
    }

    fn delete_lender(&self, id: LenderId) -> Result<(), RepositoryError> {
        let mut guard = self.lenders.lock().expect("policy mutex poisoned");
        let before = guard.len();
        guard.retain(|lender| lender.id != id);
        if guard.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

pub(super) struct UnavailablePolicies;

fn policy_database_offline() -> RepositoryError {
    RepositoryError::Unavailable("policy database offline".to_string())
}

impl PolicyRepository for UnavailablePolicies {
    fn lenders(&self) -> Result<Vec<Lender>, RepositoryError> {
        Err(policy_database_offline())
    }

    fn save_lender(&self, _lender: Lender) -> Result<(), RepositoryError> {
        Err(policy_database_offline())
    }

    fn delete_lender(&self, _id: LenderId) -> Result<(), RepositoryError> {
        Err(policy_database_offline())
    }
}

/// Result store that refuses selected writes and forwards everything else.
pub(super) struct RejectingResults {
    pub(super) inner: MemoryStore,
    pub(super) reject_begin: bool,
    pub(super) reject_failure: bool,
}

fn result_store_offline() -> RepositoryError {
    RepositoryError::Unavailable("result store offline".to_string())
}

impl ResultStore for RejectingResults {
    fn begin_run(&self, run: &UnderwritingRun) -> Result<(), RepositoryError> {
        if self.reject_begin {
            return Err(result_store_offline());
        }
        self.inner.begin_run(run)
    }

    fn commit_run(&self, _commit: RunCommit) -> Result<(), RepositoryError> {
        Err(result_store_offline())
    }

    fn record_failure(
        &self,
        run: UnderwritingRun,
        application: ApplicationRecord,
    ) -> Result<(), RepositoryError> {
        if self.reject_failure {
            return Err(result_store_offline());
        }
        self.inner.record_failure(run, application)
    }

    fn results_for(&self, id: &ApplicationId) -> Result<Vec<MatchResult>, RepositoryError> {
        self.inner.results_for(id)
    }

    fn latest_run(&self, id: &ApplicationId) -> Result<Option<UnderwritingRun>, RepositoryError> {
        self.inner.latest_run(id)
    }
}

pub(super) fn build_service(lenders: Vec<Lender>) -> (Arc<MemoryService>, MemoryStore) {
    let store = MemoryStore::default();
    let shared = Arc::new(store.clone());
    let service = UnderwritingService::new(
        shared.clone(),
        Arc::new(MemoryPolicies::new(lenders)),
        shared,
        MatchingConfig::default(),
    );
    (Arc::new(service), store)
}

/// Create and submit the standard application, returning its reference id.
pub(super) fn submitted_application(service: &MemoryService) -> ApplicationId {
    let record = service.create(draft()).expect("draft created");
    service.submit(record.id()).expect("draft submitted");
    record.id().clone()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
