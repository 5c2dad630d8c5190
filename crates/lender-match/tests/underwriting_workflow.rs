//! End-to-end scenarios for application intake and underwriting through the public
//! service facade and HTTP router, backed by lender policies parsed from JSON.

mod common {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use chrono::NaiveDate;

    use lender_match::underwriting::{
        parse_lenders, ApplicationDraft, ApplicationId, ApplicationRecord, ApplicationRepository,
        ApplicationStatus, Business, BusinessCredit, Lender, LenderId, LoanRequest, MatchResult,
        MatchingConfig, PersonalGuarantor, PolicyRepository, RepositoryError, ResultStore,
        RunCommit, UnderwritingRun, UnderwritingService,
    };

    pub(super) const POLICIES: &str = r#"[
        {
            "id": 1,
            "name": "granite",
            "display_name": "Granite Equipment Capital",
            "programs": [
                {
                    "id": 11,
                    "name": "Tier 1",
                    "priority": 1,
                    "criteria": [
                        {"id": 111, "criterion_type": "fico_score", "name": "Minimum FICO", "operator": "gte", "numeric_value": 700, "weight": 2.0},
                        {"id": 112, "criterion_type": "time_in_business", "name": "Time in business", "operator": "gte", "numeric_value": 36},
                        {"id": 113, "criterion_type": "loan_amount_max", "name": "Maximum amount", "operator": "lte", "numeric_value": 250000}
                    ]
                },
                {
                    "id": 12,
                    "name": "Tier 2",
                    "priority": 2,
                    "criteria": [
                        {"id": 121, "criterion_type": "fico_score", "name": "Minimum FICO", "operator": "gte", "numeric_value": 780}
                    ]
                }
            ]
        },
        {
            "id": 2,
            "name": "lone_star",
            "display_name": "Lone Star Leasing",
            "programs": [
                {
                    "id": 21,
                    "name": "Standard",
                    "criteria": [
                        {"id": 211, "criterion_type": "fico_score", "name": "Minimum FICO", "operator": "gte", "numeric_value": 650},
                        {"id": 212, "criterion_type": "state_excluded", "name": "Excluded states", "operator": "not_in", "list_values": ["TX", "OK"]}
                    ]
                }
            ]
        },
        {
            "id": 3,
            "name": "northgate",
            "display_name": "Northgate Funding",
            "programs": [
                {
                    "id": 31,
                    "name": "Flex",
                    "criteria": [
                        {"id": 311, "criterion_type": "fico_score", "name": "Minimum FICO", "operator": "gte", "numeric_value": 640},
                        {"id": 312, "criterion_type": "paynet_score", "name": "PayNet preferred", "operator": "gte", "numeric_value": 700, "is_required": false}
                    ]
                }
            ]
        },
        {
            "id": 4,
            "name": "retired",
            "display_name": "Retired Lender",
            "is_active": false,
            "programs": []
        }
    ]"#;

    pub(super) fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date")
    }

    pub(super) fn draft() -> ApplicationDraft {
        ApplicationDraft {
            business: Some(Business {
                legal_name: "Red River Excavation Inc".to_string(),
                state: "TX".to_string(),
                industry: Some("Construction".to_string()),
                months_in_business: Some(72),
                annual_revenue: Some(2_400_000.0),
                ..Business::default()
            }),
            guarantor: Some(PersonalGuarantor {
                first_name: "Morgan".to_string(),
                last_name: "Ellery".to_string(),
                fico_score: Some(735),
                ..PersonalGuarantor::default()
            }),
            business_credit: Some(BusinessCredit {
                paynet_score: Some(660),
                ..BusinessCredit::default()
            }),
            loan_request: Some(LoanRequest {
                requested_amount: 180_000.0,
                term_months: Some(48),
                equipment_type: Some("Excavator".to_string()),
                equipment_cost: Some(200_000.0),
                equipment_year: Some(2022),
                ..LoanRequest::default()
            }),
        }
    }

    #[derive(Default)]
    struct State {
        applications: HashMap<ApplicationId, ApplicationRecord>,
        runs: HashMap<ApplicationId, Vec<UnderwritingRun>>,
        results: HashMap<ApplicationId, Vec<MatchResult>>,
    }

    #[derive(Default, Clone)]
    pub(super) struct MemoryStore {
        state: Arc<Mutex<State>>,
    }

    impl MemoryStore {
        pub(super) fn run_count(&self, id: &ApplicationId) -> usize {
            let guard = self.state.lock().expect("lock");
            guard.runs.get(id).map_or(0, Vec::len)
        }
    }

    impl ApplicationRepository for MemoryStore {
        fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
            let mut guard = self.state.lock().expect("lock");
            if guard.applications.contains_key(record.id()) {
                return Err(RepositoryError::Conflict);
            }
            guard.applications.insert(record.id().clone(), record.clone());
            Ok(record)
        }

        fn update(&self, record: ApplicationRecord) -> Result<(), RepositoryError> {
            let mut guard = self.state.lock().expect("lock");
            guard.applications.insert(record.id().clone(), record);
            Ok(())
        }

        fn update_if(
            &self,
            record: ApplicationRecord,
            expected: ApplicationStatus,
        ) -> Result<(), RepositoryError> {
            let mut guard = self.state.lock().expect("lock");
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
            Ok(self.state.lock().expect("lock").applications.get(id).cloned())
        }

        fn delete(&self, id: &ApplicationId) -> Result<(), RepositoryError> {
            let mut guard = self.state.lock().expect("lock");
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
            let guard = self.state.lock().expect("lock");
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
            let mut guard = self.state.lock().expect("lock");
            guard
                .runs
                .entry(run.application_id.clone())
                .or_default()
                .push(run.clone());
            Ok(())
        }

        fn commit_run(&self, commit: RunCommit) -> Result<(), RepositoryError> {
            let mut guard = self.state.lock().expect("lock");
            let id = commit.application.id().clone();
            replace_run(guard.runs.entry(id.clone()).or_default(), commit.run);
            guard.results.insert(id.clone(), commit.results);
            guard.applications.insert(id, commit.application);
            Ok(())
        }

        fn record_failure(
            &self,
            run: UnderwritingRun,
            application: ApplicationRecord,
        ) -> Result<(), RepositoryError> {
            let mut guard = self.state.lock().expect("lock");
            let id = application.id().clone();
            replace_run(guard.runs.entry(id.clone()).or_default(), run);
            guard.applications.insert(id, application);
            Ok(())
        }

        fn results_for(&self, id: &ApplicationId) -> Result<Vec<MatchResult>, RepositoryError> {
            Ok(self
                .state
                .lock()
                .expect("lock")
                .results
                .get(id)
                .cloned()
                .unwrap_or_default())
        }

        fn latest_run(
            &self,
            id: &ApplicationId,
        ) -> Result<Option<UnderwritingRun>, RepositoryError> {
            let guard = self.state.lock().expect("lock");
            Ok(guard.runs.get(id).and_then(|runs| runs.last().cloned()))
        }
    }

    fn replace_run(runs: &mut Vec<UnderwritingRun>, run: UnderwritingRun) {
        match runs.iter_mut().find(|existing| existing.run_id == run.run_id) {
            Some(existing) => *existing = run,
            None => runs.push(run),
        }
    }

    pub(super) struct SeededPolicies {
        lenders: Mutex<Vec<Lender>>,
    }

    impl PolicyRepository for SeededPolicies {
        fn lenders(&self) -> Result<Vec<Lender>, RepositoryError> {
            Ok(self.lenders.lock().expect("lock").clone())
        }

        fn save_lender(&self, lender: Lender) -> Result<(), RepositoryError> {
            let mut guard = self.lenders.lock().expect("lock");
            match guard.iter_mut().find(|existing| existing.id == lender.id) {
                Some(existing) => *existing = lender,
                None => guard.push(lender),
            }
            Ok(())
        }

        fn delete_lender(&self, id: LenderId) -> Result<(), RepositoryError> {
            let mut guard = self.lenders.lock().expect("lock");
            let position = guard
                .iter()
                .position(|lender| lender.id == id)
                .ok_or(RepositoryError::NotFound)?;
            guard.remove(position);
            Ok(())
        }
    }

    pub(super) type Service = UnderwritingService<MemoryStore, SeededPolicies, MemoryStore>;

    pub(super) fn build_service() -> (Arc<Service>, MemoryStore) {
        let lenders = parse_lenders(POLICIES).expect("policies parse");
        let store = MemoryStore::default();
        let shared = Arc::new(store.clone());
        let policies = Arc::new(SeededPolicies {
            lenders: Mutex::new(lenders),
        });
        let service = UnderwritingService::new(
            shared.clone(),
            policies,
            shared,
            MatchingConfig::default(),
        );
        (Arc::new(service), store)
    }
}

mod workflow {
    use super::common::*;
    use lender_match::underwriting::{
        ApplicationStatus, CriterionDraft, CriterionId, LenderId, MatchStatus, Operator,
        ProgramId, RunStatus,
    };

    #[test]
    fn seeded_policies_rank_lenders() {
        let (service, store) = build_service();
        let record = service.create(draft()).expect("created");
        let id = record.id().clone();
        service.submit(&id).expect("submitted");

        let run = service.run_as_of(&id, as_of()).expect("run");
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.total_lenders_evaluated, 3);
        assert_eq!(run.eligible_lenders, 1);
        assert_eq!(store.run_count(&id), 1);

        let results = service.results(&id).expect("results");
        let best = results.best_match.expect("best match");
        assert_eq!(best.lender_id, LenderId(1));
        assert_eq!(best.program_id, Some(ProgramId(11)));
        assert_eq!(best.fit_score, 100.0);

        assert_eq!(results.ineligible.len(), 1);
        assert_eq!(results.ineligible[0].lender_name, "Lone Star Leasing");
        assert!(results.ineligible[0].summary.contains("Excluded states"));

        assert_eq!(results.needs_review.len(), 1);
        assert_eq!(results.needs_review[0].status, MatchStatus::NeedsReview);
    }

    #[test]
    fn rerun_reflects_updated_policies() {
        let (service, store) = build_service();
        let record = service.create(draft()).expect("created");
        let id = record.id().clone();
        service.submit(&id).expect("submitted");
        service.run_as_of(&id, as_of()).expect("first run");

        let tightened = CriterionDraft {
            criterion_type: "fico_score".to_string(),
            name: "Minimum FICO".to_string(),
            operator: Operator::Gte,
            numeric_value: Some(760.0),
            numeric_value_min: None,
            numeric_value_max: None,
            string_value: None,
            list_values: Vec::new(),
            is_required: true,
            weight: 2.0,
            is_active: true,
            failure_message: None,
        };
        service
            .replace_criterion(LenderId(1), ProgramId(11), CriterionId(111), tightened)
            .expect("criterion tightened");

        let run = service.run_as_of(&id, as_of()).expect("second run");
        assert_eq!(run.eligible_lenders, 0);
        assert_eq!(store.run_count(&id), 2);

        let results = service.results(&id).expect("results");
        assert_eq!(results.total_evaluated, 3);
        assert!(results.best_match.is_none());
        assert_eq!(
            service.get(&id).expect("record").status,
            ApplicationStatus::Completed
        );
    }
}

mod http {
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::common::*;
    use lender_match::underwriting::underwriting_router;

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    async fn post_empty(router: &Router, path: String) -> StatusCode {
        router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(path)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response")
            .status()
    }

    async fn wait_for_run(router: &Router, reference: &str) -> Value {
        for _ in 0..300 {
            let response = router
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(format!("/api/v1/underwriting/{reference}/status"))
                        .body(Body::empty())
                        .expect("request"),
                )
                .await
                .expect("response");
            let view = json_body(response).await;
            if view["status"] != "PROCESSING" {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run for {reference} did not settle");
    }

    #[tokio::test]
    async fn intake_through_results() {
        let (service, _) = build_service();
        let router = underwriting_router(service);

        let payload = serde_json::to_string(&draft()).expect("payload");
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/applications")
                    .header("content-type", "application/json")
                    .body(Body::from(payload))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["status"], "DRAFT");
        let reference = created["snapshot"]["application_id"]
            .as_str()
            .expect("reference")
            .to_string();

        let submitted =
            post_empty(&router, format!("/api/v1/applications/{reference}/submit")).await;
        assert_eq!(submitted, StatusCode::OK);
        let started = post_empty(&router, format!("/api/v1/underwriting/{reference}/run")).await;
        assert_eq!(started, StatusCode::ACCEPTED);

        let view = wait_for_run(&router, &reference).await;
        assert_eq!(view["status"], "COMPLETED");
        assert_eq!(view["latest_run"]["eligible_lenders"], 1);

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/underwriting/{reference}/results"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let results = json_body(response).await;
        assert_eq!(results["total_evaluated"], 3);
        assert_eq!(results["best_match"]["lender_name"], "Granite Equipment Capital");
        assert_eq!(results["best_match"]["program_name"], "Tier 1");
        assert!(results["best_match"]["criteria_results"]
            .as_array()
            .is_some_and(|criteria| criteria.len() == 3));
    }
}
