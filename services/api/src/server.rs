use crate::cli::ServeArgs;
use crate::infra::ServiceState;
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tvde_fleet::config::AppConfig;
use tvde_fleet::error::AppError;
use tvde_fleet::rpa::WebDriverLauncher;
use tvde_fleet::{telemetry, AppState};

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
    let service_state = ServiceState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let launcher = Arc::new(WebDriverLauncher::new(&config.rpa));
    let app_state = AppState::in_memory(&config, launcher);
    if let Some(admin) = &config.auth.bootstrap_admin {
        app_state.auth.ensure_admin(admin)?;
    }

    let app = with_service_routes(app_state)
        .layer(Extension(service_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        webdriver = %config.rpa.webdriver_url,
        "tvde fleet api ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
