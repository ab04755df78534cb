//! # HTTP API
//!
//! Builds the axum router for webhook intake, status queries and liveness.
//!
//! | Method | Path                                | Description                       |
//! |--------|-------------------------------------|-----------------------------------|
//! | GET    | `/`, `/health`                      | Liveness probe                    |
//! | POST   | `/v1/webhooks/transactions`         | Webhook intake, answers 202       |
//! | GET    | `/v1/transactions/:transaction_id`  | Transaction status by id          |

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::application::dispatcher::{DispatchOutcome, SettlementDispatcher};
use crate::domain::ports::SharedTransactionStore;
use crate::domain::transaction::{Transaction, TransactionWebhook};
use crate::error::TransactionError;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for all handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedTransactionStore,
    pub dispatcher: SettlementDispatcher,
}

impl AppState {
    pub fn new(store: SharedTransactionStore, dispatcher: SettlementDispatcher) -> Self {
        Self { store, dispatcher }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .route("/v1/webhooks/transactions", post(receive_transaction_handler))
        .route(
            "/v1/transactions/:transaction_id",
            get(fetch_transaction_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Body of the 202 answer to a webhook.
#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub acknowledged: bool,
    pub transaction_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// RFC 3339 UTC timestamp.
    pub current_time: String,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps domain errors onto HTTP status codes.
#[derive(Debug)]
pub struct ApiError(pub TransactionError);

impl From<TransactionError> for ApiError {
    fn from(err: TransactionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TransactionError::NotFound(_) => StatusCode::NOT_FOUND,
            TransactionError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /`: liveness only, touches no other component.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "HEALTHY".to_string(),
        current_time: Utc::now().to_rfc3339(),
    })
}

/// `POST /v1/webhooks/transactions`: records and schedules settlement.
///
/// Recording happens before the answer so an immediate query already sees
/// `PROCESSING`; settlement itself runs detached. A recording failure here is
/// only logged: the sender still gets 202 and the settlement task records again.
async fn receive_transaction_handler(
    State(state): State<AppState>,
    Json(webhook): Json<TransactionWebhook>,
) -> Result<(StatusCode, Json<AckResponse>), ApiError> {
    webhook.validate()?;
    let transaction_id = webhook.transaction_id.clone();

    let recorded = state
        .dispatcher
        .workflow()
        .recorder()
        .record_if_absent(webhook.clone())
        .await;

    match recorded {
        Ok(tx) if tx.status.is_terminal() => {
            tracing::debug!(%transaction_id, "redelivery of settled transaction");
        }
        Ok(_) => schedule(&state.dispatcher, webhook),
        Err(e) => {
            tracing::warn!(%transaction_id, error = %e, "recording at intake failed, deferring to settlement");
            schedule(&state.dispatcher, webhook);
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(AckResponse {
            acknowledged: true,
            transaction_id,
        }),
    ))
}

fn schedule(dispatcher: &SettlementDispatcher, webhook: TransactionWebhook) {
    if dispatcher.dispatch(webhook) == DispatchOutcome::AlreadyInFlight {
        tracing::debug!("duplicate delivery joined an in-flight settlement");
    }
}

/// `GET /v1/transactions/:transaction_id`
async fn fetch_transaction_handler(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<Transaction>, ApiError> {
    let found = state.store.find(&transaction_id).await?;
    match found {
        Some(tx) => Ok(Json(tx)),
        None => Err(TransactionError::NotFound(transaction_id).into()),
    }
}
