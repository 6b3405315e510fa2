use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryCertificateStore, InMemoryPersonDirectory, LoggingEventSink};
use crate::routes::with_registry_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use iav_registry::config::AppConfig;
use iav_registry::error::AppError;
use iav_registry::eventlog::EventLog;
use iav_registry::registry::{
    EventDispatcher, IngestQueue, RegistryService, RegistryState, StickAccumulator,
};
use iav_registry::telemetry;
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

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryCertificateStore::default());
    let directory = Arc::new(InMemoryPersonDirectory::default());

    let event_log = match &config.dispatch.event_log {
        Some(path) => Some(Arc::new(EventLog::create(path).map_err(AppError::EventLog)?)),
        None => None,
    };
    let (dispatcher, dispatch_worker) = EventDispatcher::spawn(
        Arc::new(LoggingEventSink),
        config.dispatch.retry_policy(),
        config.dispatch.endpoints(),
        event_log,
    );

    let accumulator = StickAccumulator::new(Arc::clone(&store), dispatcher.clone());
    let (queue, ingest_worker) = IngestQueue::pair(accumulator);
    let ingest_task = tokio::spawn(ingest_worker.run());

    let service = Arc::new(RegistryService::new(
        Arc::clone(&store),
        Arc::clone(&directory),
        dispatcher.clone(),
        queue,
    ));

    let app = with_registry_routes(
        RegistryState {
            service,
            dispatcher,
        },
        directory,
    )
    .layer(Extension(app_state))
    .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "certificate registry ready");

    axum::serve(listener, app).await?;

    // The routes own the only queue and dispatcher handles; once serve
    // returns they are gone and both workers drain and stop.
    ingest_task.await.map_err(|err| {
        AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, err))
    })?;
    let report = dispatch_worker.await.map_err(|err| {
        AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, err))
    })?;
    info!(
        delivered = report.stats.delivered,
        dead_lettered = report.stats.dead_lettered,
        "dispatch worker stopped"
    );

    Ok(())
}
