use crate::cli::ServeArgs;
use crate::infra::{configured_lenders, AppState, InMemoryStore, SeedPolicies};
use crate::routes::with_underwriting_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use lender_match::config::AppConfig;
use lender_match::error::AppError;
use lender_match::telemetry;
use lender_match::underwriting::UnderwritingService;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let lenders = configured_lenders(&config)?;
    let store = Arc::new(InMemoryStore::default());
    let service = Arc::new(UnderwritingService::new(
        store.clone(),
        Arc::new(SeedPolicies::new(lenders)),
        store,
        config.matching,
    ));

    let app = with_underwriting_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        unevaluated = ?config.matching.unevaluated,
        "lender matching service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
