//! Request handlers. Bodies are taken as raw bytes so malformed JSON gets the
//! same error shape as every other rejection.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::{de::DeserializeOwned, Serialize};

use super::{ApiResult, AppState};
use crate::builder::IntentFields;
use crate::error::ValidationError;
use crate::identity::FederatedIdentity;
use crate::request::{ActionFields, ReservationFields};
use crate::service::{PreparedIntent, RegisterRequest, RegisteredIntent};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub signer: alloy_primitives::Address,
    pub chain_id: u64,
    pub version: &'static str,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        signer: state.service.signer_address(),
        chain_id: state.service.domain().chain_id,
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ValidationError> {
    serde_json::from_slice(body).map_err(|e| ValidationError::MalformedBody(e.to_string()))
}

/// POST /intents/actions/prepare
pub async fn prepare_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<PreparedIntent>> {
    let identity = FederatedIdentity::from_headers(&headers)?;
    let fields: ActionFields = parse_body(&body)?;
    let request = fields.validate()?;

    let prepared = state
        .service
        .prepare(&identity, IntentFields::Action(request), fields.return_url.as_deref())
        .await?;
    Ok(Json(prepared))
}

/// POST /intents/reservations/prepare
pub async fn prepare_reservation(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<PreparedIntent>> {
    let identity = FederatedIdentity::from_headers(&headers)?;
    let fields: ReservationFields = parse_body(&body)?;
    let request = fields.validate()?;

    let prepared = state
        .service
        .prepare(
            &identity,
            IntentFields::Reservation(request),
            fields.return_url.as_deref(),
        )
        .await?;
    Ok(Json(prepared))
}

/// POST /intents/register
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<RegisteredIntent>> {
    let identity = FederatedIdentity::from_headers(&headers)?;
    let request: RegisterRequest = parse_body(&body)?;

    let registered = state.service.register(&identity, request).await?;
    Ok(Json(registered))
}
