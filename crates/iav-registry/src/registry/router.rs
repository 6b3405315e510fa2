use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::dispatch::EventDispatcher;
use super::domain::{CertificateId, CorrelationInfo, IncomeBatch, IncomeSnapshot, PersonalNumber};
use super::eligibility::EligibilityOutcome;
use super::service::RegistryService;
use super::store::{CertificateStore, PersonDirectory};

/// Shared state for the registry HTTP endpoints.
pub struct RegistryState<S, P> {
    pub service: Arc<RegistryService<S, P>>,
    pub dispatcher: EventDispatcher,
}

impl<S, P> Clone for RegistryState<S, P> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

/// Router builder exposing the three registry operations plus the dispatch
/// status view.
pub fn registry_router<S, P>(state: RegistryState<S, P>) -> Router
where
    S: CertificateStore + 'static,
    P: PersonDirectory + 'static,
{
    Router::new()
        .route(
            "/api/v1/certificates/eligibility-check",
            post(eligibility_handler::<S, P>),
        )
        .route("/api/v1/income/monthly", post(income_handler::<S, P>))
        .route(
            "/api/v1/certificates/valid",
            get(validity_handler::<S, P>),
        )
        .route(
            "/api/v1/dispatch/status",
            get(dispatch_status_handler::<S, P>),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct EligibilityCheckRequest {
    pub personal_number: String,
    pub salary_income: i64,
    pub capital_income: i64,
    #[serde(default)]
    pub completion: bool,
    #[serde(default)]
    pub origin_ms: i64,
}

pub(crate) async fn eligibility_handler<S, P>(
    State(state): State<RegistryState<S, P>>,
    axum::Json(request): axum::Json<EligibilityCheckRequest>,
) -> Response
where
    S: CertificateStore + 'static,
    P: PersonDirectory + 'static,
{
    let outcome = state.service.request_eligibility_check(
        PersonalNumber(request.personal_number),
        IncomeSnapshot {
            salary_income: request.salary_income,
            capital_income: request.capital_income,
        },
        CorrelationInfo {
            completion: request.completion,
            origin_ms: request.origin_ms,
        },
    );

    match outcome {
        Ok(EligibilityOutcome::Granted(certificate)) => (
            StatusCode::CREATED,
            axum::Json(json!({
                "outcome": "granted",
                "certificate": certificate,
            })),
        )
            .into_response(),
        Ok(other) => {
            let label = match other {
                EligibilityOutcome::AlreadyRegistered => "already_registered",
                EligibilityOutcome::NotEligible => "not_eligible",
                EligibilityOutcome::UnknownPerson => "unknown_person",
                EligibilityOutcome::Granted(_) => unreachable!("handled above"),
            };
            (
                StatusCode::OK,
                axum::Json(json!({ "outcome": label, "certificate": null })),
            )
                .into_response()
        }
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn income_handler<S, P>(
    State(state): State<RegistryState<S, P>>,
    axum::Json(batch): axum::Json<IncomeBatch>,
) -> Response
where
    S: CertificateStore + 'static,
    P: PersonDirectory + 'static,
{
    match state.service.submit_income_batch(batch) {
        Ok(accepted) => (
            StatusCode::ACCEPTED,
            axum::Json(json!({ "accepted": accepted })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidityQuery {
    pub personal_number: String,
    pub certificate_id: u64,
}

pub(crate) async fn validity_handler<S, P>(
    State(state): State<RegistryState<S, P>>,
    Query(query): Query<ValidityQuery>,
) -> Response
where
    S: CertificateStore + 'static,
    P: PersonDirectory + 'static,
{
    let personal_number = PersonalNumber(query.personal_number);
    match state
        .service
        .certificate_valid(&personal_number, CertificateId(query.certificate_id))
    {
        Ok(valid) => (StatusCode::OK, axum::Json(json!({ "valid": valid }))).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

pub(crate) async fn dispatch_status_handler<S, P>(
    State(state): State<RegistryState<S, P>>,
) -> Response
where
    S: CertificateStore + 'static,
    P: PersonDirectory + 'static,
{
    let stats = state.dispatcher.stats();
    let dead_letters = state.dispatcher.dead_letters();
    (
        StatusCode::OK,
        axum::Json(json!({
            "stats": stats,
            "dead_letters": dead_letters,
        })),
    )
        .into_response()
}
