use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::domain::{ApplicationId, ApplicationStatus, CriterionId, LenderId, ProgramId};
use super::lenders::{CriterionDraft, LenderDraft, LenderUpdate, ProgramDraft, ProgramUpdate};
use super::repository::{ApplicationRepository, PolicyRepository, RepositoryError, ResultStore};
use super::service::{ApplicationDraft, ListQuery, UnderwritingError, UnderwritingService};

type SharedService<A, P, S> = Arc<UnderwritingService<A, P, S>>;

/// Router exposing application intake and underwriting endpoints.
pub fn underwriting_router<A, P, S>(service: SharedService<A, P, S>) -> Router
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/applications",
            post(create_handler::<A, P, S>).get(list_handler::<A, P, S>),
        )
        .route(
            "/api/v1/applications/:reference_id",
            get(get_handler::<A, P, S>)
                .put(update_handler::<A, P, S>)
                .delete(delete_handler::<A, P, S>),
        )
        .route(
            "/api/v1/applications/:reference_id/submit",
            post(submit_handler::<A, P, S>),
        )
        .route(
            "/api/v1/underwriting/:reference_id/run",
            post(run_handler::<A, P, S>),
        )
        .route(
            "/api/v1/underwriting/:reference_id/status",
            get(status_handler::<A, P, S>),
        )
        .route(
            "/api/v1/underwriting/:reference_id/results",
            get(results_handler::<A, P, S>),
        )
        .route(
            "/api/v1/lenders",
            get(lenders_handler::<A, P, S>).post(create_lender_handler::<A, P, S>),
        )
        .route(
            "/api/v1/lenders/:lender_id",
            get(lender_handler::<A, P, S>)
                .put(update_lender_handler::<A, P, S>)
                .delete(delete_lender_handler::<A, P, S>),
        )
        .route(
            "/api/v1/lenders/:lender_id/programs",
            get(programs_handler::<A, P, S>).post(create_program_handler::<A, P, S>),
        )
        .route(
            "/api/v1/lenders/:lender_id/programs/:program_id",
            put(update_program_handler::<A, P, S>).delete(delete_program_handler::<A, P, S>),
        )
        .route(
            "/api/v1/lenders/:lender_id/programs/:program_id/criteria",
            get(criteria_handler::<A, P, S>).post(create_criterion_handler::<A, P, S>),
        )
        .route(
            "/api/v1/lenders/:lender_id/programs/:program_id/criteria/:criterion_id",
            put(replace_criterion_handler::<A, P, S>)
                .delete(delete_criterion_handler::<A, P, S>),
        )
        .with_state(service)
}

/// Map service errors onto HTTP status codes with a JSON error body.
pub(crate) fn error_response(error: UnderwritingError) -> Response {
    let status = match &error {
        UnderwritingError::NotFound(_)
        | UnderwritingError::LenderNotFound(_)
        | UnderwritingError::ProgramNotFound(_)
        | UnderwritingError::CriterionNotFound(_) => StatusCode::NOT_FOUND,
        UnderwritingError::InvalidState { .. }
        | UnderwritingError::RunInProgress(_)
        | UnderwritingError::DuplicateLender(_) => StatusCode::CONFLICT,
        UnderwritingError::Validation(_)
        | UnderwritingError::InvalidQuery(_)
        | UnderwritingError::InvalidPolicy(_) => StatusCode::UNPROCESSABLE_ENTITY,
        UnderwritingError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        UnderwritingError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        UnderwritingError::Repository(RepositoryError::Unavailable(_))
        | UnderwritingError::RunFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = match &error {
        UnderwritingError::Validation(errors) => json!({
            "error": "application is incomplete",
            "details": errors,
        }),
        UnderwritingError::InvalidPolicy(errors) => json!({
            "error": "lender policy is invalid",
            "details": errors,
        }),
        // Storage details stay in the logs.
        UnderwritingError::Repository(RepositoryError::Unavailable(_)) => json!({
            "error": "storage unavailable",
        }),
        UnderwritingError::RunFailed { id, .. } => json!({
            "error": "underwriting run failed",
            "application_id": id,
        }),
        other => json!({
            "error": other.to_string(),
        }),
    };

    (status, Json(payload)).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    page: Option<usize>,
    page_size: Option<usize>,
    status: Option<String>,
}

pub(crate) async fn create_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Json(draft): Json<ApplicationDraft>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.create(draft) {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Query(params): Query<ListParams>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    let status = match params.status.as_deref() {
        None => None,
        Some(raw) => match ApplicationStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return error_response(UnderwritingError::InvalidQuery(format!(
                    "unknown status filter '{raw}'"
                )))
            }
        },
    };

    let query = ListQuery {
        page: params.page,
        page_size: params.page_size,
        status,
    };
    match service.list(query) {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path(reference_id): Path<String>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.get(&ApplicationId(reference_id)) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path(reference_id): Path<String>,
    Json(draft): Json<ApplicationDraft>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.update(&ApplicationId(reference_id), draft) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path(reference_id): Path<String>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.delete(&ApplicationId(reference_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path(reference_id): Path<String>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.submit(&ApplicationId(reference_id)) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn run_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path(reference_id): Path<String>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    let claimed = match service.start_run(&ApplicationId(reference_id)) {
        Ok(claimed) => claimed,
        Err(error) => return error_response(error),
    };
    let accepted = claimed.run().clone();

    // Outcome is recorded by the service and read back through the status endpoint.
    let as_of = Utc::now().date_naive();
    tokio::task::spawn_blocking(move || service.finish_run(claimed, as_of));

    (StatusCode::ACCEPTED, Json(accepted)).into_response()
}

pub(crate) async fn status_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path(reference_id): Path<String>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.status(&ApplicationId(reference_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn results_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path(reference_id): Path<String>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.results(&ApplicationId(reference_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LenderParams {
    #[serde(default)]
    include_inactive: bool,
}

pub(crate) async fn lenders_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Query(params): Query<LenderParams>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.lenders(params.include_inactive) {
        Ok(lenders) => (StatusCode::OK, Json(lenders)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn create_lender_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Json(draft): Json<LenderDraft>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.create_lender(draft) {
        Ok(lender) => (StatusCode::CREATED, Json(lender)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn lender_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path(lender_id): Path<u64>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.lender(LenderId(lender_id)) {
        Ok(lender) => (StatusCode::OK, Json(lender)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_lender_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path(lender_id): Path<u64>,
    Json(update): Json<LenderUpdate>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.update_lender(LenderId(lender_id), update) {
        Ok(lender) => (StatusCode::OK, Json(lender)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_lender_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path(lender_id): Path<u64>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.delete_lender(LenderId(lender_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn programs_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path(lender_id): Path<u64>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.programs(LenderId(lender_id)) {
        Ok(programs) => (StatusCode::OK, Json(programs)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn create_program_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path(lender_id): Path<u64>,
    Json(draft): Json<ProgramDraft>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.add_program(LenderId(lender_id), draft) {
        Ok(program) => (StatusCode::CREATED, Json(program)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_program_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path((lender_id, program_id)): Path<(u64, u64)>,
    Json(update): Json<ProgramUpdate>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.update_program(LenderId(lender_id), ProgramId(program_id), update) {
        Ok(program) => (StatusCode::OK, Json(program)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_program_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path((lender_id, program_id)): Path<(u64, u64)>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.delete_program(LenderId(lender_id), ProgramId(program_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn criteria_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path((lender_id, program_id)): Path<(u64, u64)>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.criteria(LenderId(lender_id), ProgramId(program_id)) {
        Ok(criteria) => (StatusCode::OK, Json(criteria)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn create_criterion_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path((lender_id, program_id)): Path<(u64, u64)>,
    Json(draft): Json<CriterionDraft>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.add_criterion(LenderId(lender_id), ProgramId(program_id), draft) {
        Ok(criterion) => (StatusCode::CREATED, Json(criterion)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn replace_criterion_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path((lender_id, program_id, criterion_id)): Path<(u64, u64, u64)>,
    Json(draft): Json<CriterionDraft>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.replace_criterion(
        LenderId(lender_id),
        ProgramId(program_id),
        CriterionId(criterion_id),
        draft,
    ) {
        Ok(criterion) => (StatusCode::OK, Json(criterion)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_criterion_handler<A, P, S>(
    State(service): State<SharedService<A, P, S>>,
    Path((lender_id, program_id, criterion_id)): Path<(u64, u64, u64)>,
) -> Response
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    match service.delete_criterion(
        LenderId(lender_id),
        ProgramId(program_id),
        CriterionId(criterion_id),
    ) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}
