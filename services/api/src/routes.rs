use crate::infra::{AppState, InMemoryCertificateStore, InMemoryPersonDirectory};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use iav_registry::registry::{
    registry_router, IncomeSnapshot, PersonalNumber, RegistryState,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub(crate) type ApiRegistryState =
    RegistryState<InMemoryCertificateStore, InMemoryPersonDirectory>;

/// Compose the registry endpoints with the operational routes and the
/// person-seeding glue.
pub(crate) fn with_registry_routes(
    state: ApiRegistryState,
    directory: Arc<InMemoryPersonDirectory>,
) -> axum::Router {
    registry_router(state)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/persons",
            axum::routing::post(register_person_endpoint).with_state(directory),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterPersonRequest {
    personal_number: String,
    salary_income: i64,
    capital_income: i64,
}

/// Seed the in-memory person directory. Stands in for the external
/// population registry that owns this data in production.
pub(crate) async fn register_person_endpoint(
    axum::extract::State(directory): axum::extract::State<Arc<InMemoryPersonDirectory>>,
    Json(request): Json<RegisterPersonRequest>,
) -> impl IntoResponse {
    let personal_number = PersonalNumber(request.personal_number);
    info!(%personal_number, "person registered in directory");
    directory.insert(
        personal_number,
        IncomeSnapshot {
            salary_income: request.salary_income,
            capital_income: request.capital_income,
        },
    );
    (StatusCode::CREATED, Json(json!({ "status": "registered" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::LoggingEventSink;
    use axum::body::Body;
    use axum::http::Request;
    use iav_registry::registry::{
        DispatchEndpoints, EventDispatcher, IngestQueue, RegistryService, RetryPolicy,
        StickAccumulator,
    };
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn build_app(ready: bool) -> axum::Router {
        let store = Arc::new(InMemoryCertificateStore::default());
        let directory = Arc::new(InMemoryPersonDirectory::default());
        let (dispatcher, _dispatch_worker) = EventDispatcher::spawn(
            Arc::new(LoggingEventSink),
            RetryPolicy::default(),
            DispatchEndpoints::default(),
            None,
        );

        let accumulator = StickAccumulator::new(Arc::clone(&store), dispatcher.clone());
        let (queue, ingest_worker) = IngestQueue::pair(accumulator);
        tokio::spawn(ingest_worker.run());

        let service = Arc::new(RegistryService::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            dispatcher.clone(),
            queue,
        ));
        let recorder = PrometheusBuilder::new().build_recorder();
        let app_state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(recorder.handle()),
        };

        with_registry_routes(
            RegistryState {
                service,
                dispatcher,
            },
            directory,
        )
        .layer(Extension(app_state))
    }

    #[tokio::test]
    async fn health_is_always_ok_and_readiness_tracks_the_flag() {
        let app = build_app(false);

        let health = app
            .clone()
            .oneshot(
                Request::get("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("call");
        assert_eq!(health.status(), StatusCode::OK);

        let ready = app
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("call");
        assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);

        let app = build_app(true);
        let ready = app
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("call");
        assert_eq!(ready.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn a_seeded_person_can_be_granted_a_certificate() {
        let app = build_app(true);

        let seeded = app
            .clone()
            .oneshot(
                Request::post("/api/v1/persons")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({
                            "personal_number": "19900101-1234",
                            "salary_income": 90_000,
                            "capital_income": 15_000,
                        })
                        .to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("seed call");
        assert_eq!(seeded.status(), StatusCode::CREATED);

        let granted = app
            .oneshot(
                Request::post("/api/v1/certificates/eligibility-check")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({
                            "personal_number": "19900101-1234",
                            "salary_income": 90_000,
                            "capital_income": 15_000,
                        })
                        .to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("grant call");
        assert_eq!(granted.status(), StatusCode::CREATED);
    }
}
