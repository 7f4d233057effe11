use crate::cli::ServeArgs;
use crate::infra::{build_engine, AppState};
use crate::routes::with_lead_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use lead_scoring::assessment::AssessmentRegistry;
use lead_scoring::config::AppConfig;
use lead_scoring::error::AppError;
use lead_scoring::logging;
use std::sync::atomic::Ordering;
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
    if let Some(path) = args.storage_path.take() {
        config.scoring.storage_path = Some(path);
    }

    logging::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let engine = Arc::new(build_engine(&config.scoring, &config.telemetry)?);
    let assessments = Arc::new(AssessmentRegistry::standard());

    let app = with_lead_routes(engine, assessments)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "lead scoring service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
