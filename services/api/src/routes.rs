use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use lender_match::underwriting::{
    underwriting_router, ApplicationRepository, PolicyRepository, ResultStore,
    UnderwritingService,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub(crate) fn with_underwriting_routes<A, P, S>(
    service: Arc<UnderwritingService<A, P, S>>,
) -> axum::Router
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    underwriting_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    if state.readiness.load(Ordering::Acquire) {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "initializing" })),
        )
    }
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{bundled_lenders, InMemoryStore, SeedPolicies};
    use axum::body::Body;
    use axum::http::{Method, Request};
    use lender_match::underwriting::MatchingConfig;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let store = Arc::new(InMemoryStore::default());
        let policies = SeedPolicies::new(bundled_lenders().expect("bundled policies"));
        let service = Arc::new(UnderwritingService::new(
            store.clone(),
            Arc::new(policies),
            store,
            MatchingConfig::default(),
        ));
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_underwriting_routes(service).layer(Extension(state))
    }

    async fn call(app: &axum::Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => Request::builder().method(method).uri(uri).body(Body::empty()),
        }
        .expect("request");

        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn settle(app: &axum::Router, reference: &str) -> Value {
        let uri = format!("/api/v1/underwriting/{reference}/status");
        for _ in 0..300 {
            let (_, view) = call(app, Method::GET, &uri, None).await;
            if view["status"] != "PROCESSING" {
                return view;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("run for {reference} did not settle");
    }

    #[tokio::test]
    async fn health_and_readiness() {
        let starting = app(false);
        let (status, body) = call(&starting, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = call(&starting, Method::GET, "/ready", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "initializing");

        let (status, _) = call(&app(true), Method::GET, "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_render_as_text() {
        let response = app(true)
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }

    #[tokio::test]
    async fn bundled_lenders_are_served() {
        let (status, body) = call(&app(true), Method::GET, "/api/v1/lenders", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(5));
        assert_eq!(body[0]["display_name"], "Stearns Bank");
    }

    #[tokio::test]
    async fn underwriting_against_bundled_lenders() {
        let app = app(true);
        let draft = json!({
            "business": {
                "legal_name": "Cedar Ridge Grading LLC",
                "state": "MN",
                "industry": "construction",
                "months_in_business": 60,
                "annual_revenue": 1500000.0
            },
            "guarantor": {
                "first_name": "Avery",
                "last_name": "Lund",
                "fico_score": 740
            },
            "loan_request": {
                "requested_amount": 200000.0,
                "equipment_type": "excavator",
                "equipment_cost": 230000.0,
                "equipment_age_years": 3.0
            }
        });

        let (status, created) =
            call(&app, Method::POST, "/api/v1/applications", Some(draft)).await;
        assert_eq!(status, StatusCode::CREATED);
        let reference = created["snapshot"]["application_id"]
            .as_str()
            .expect("reference")
            .to_string();

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/api/v1/applications/{reference}/submit"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, run) = call(
            &app,
            Method::POST,
            &format!("/api/v1/underwriting/{reference}/run"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(run["status"], "RUNNING");

        let view = settle(&app, &reference).await;
        assert_eq!(view["status"], "COMPLETED");
        assert_eq!(view["latest_run"]["total_lenders_evaluated"], 5);
        assert_eq!(view["latest_run"]["eligible_lenders"], 5);

        let (status, results) = call(
            &app,
            Method::GET,
            &format!("/api/v1/underwriting/{reference}/results"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(results["eligible_count"], 5);
        assert_eq!(results["best_match"]["lender_name"], "Stearns Bank");
    }

    #[tokio::test]
    async fn lenders_added_at_runtime_are_served() {
        let app = app(true);
        let lender = json!({
            "name": "prairie_capital",
            "display_name": "Prairie Capital",
            "programs": [{
                "name": "Core",
                "criteria": [{
                    "criterion_type": "fico_score",
                    "name": "Minimum FICO",
                    "operator": "gte",
                    "numeric_value": 680
                }]
            }]
        });

        let (status, created) = call(&app, Method::POST, "/api/v1/lenders", Some(lender.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(created["id"].as_u64().is_some());

        let (status, _) = call(&app, Method::POST, "/api/v1/lenders", Some(lender)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, listed) = call(&app, Method::GET, "/api/v1/lenders", None).await;
        assert_eq!(listed.as_array().map(Vec::len), Some(6));
    }
}
