//! Error responses with `{error, code, details}` bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::authorization::{AuthorizationError, AuthorizationStatus};
use crate::service::RelayError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
    details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.message,
            "code": self.code,
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        let message = err.to_string();
        match err {
            RelayError::Validation(e) => {
                let api = ApiError::new(StatusCode::BAD_REQUEST, e.code(), message);
                match e.field() {
                    Some(field) => api.with_details(json!({ "field": field })),
                    None => api,
                }
            }
            RelayError::Identity(e) => ApiError::new(StatusCode::UNAUTHORIZED, e.code(), message),
            RelayError::Authorization(e) => match &e {
                AuthorizationError::Rejected(rejection) => {
                    ApiError::new(StatusCode::CONFLICT, e.code(), rejection.backend_code())
                        .with_details(json!({ "message": message }))
                }
                AuthorizationError::Upstream { status, code, .. } => {
                    ApiError::new(StatusCode::BAD_GATEWAY, e.code(), message)
                        .with_details(json!({ "upstreamStatus": status, "upstreamCode": code }))
                }
                _ => ApiError::new(StatusCode::BAD_GATEWAY, e.code(), message),
            },
            RelayError::CeremonyIncomplete(status) => {
                let code = match status {
                    AuthorizationStatus::Pending => "INTENT_AUTHORIZATION_PENDING",
                    AuthorizationStatus::Denied => "INTENT_AUTHORIZATION_DENIED",
                    AuthorizationStatus::Expired => "INTENT_AUTHORIZATION_EXPIRED",
                    AuthorizationStatus::Approved => "INTENT_AUTHORIZATION_APPROVED",
                };
                ApiError::new(StatusCode::CONFLICT, code, message)
            }
            RelayError::CeremonyMismatch => {
                ApiError::new(StatusCode::CONFLICT, "INTENT_AUTHORIZATION_MISMATCH", message)
            }
            RelayError::NotPrepared(_) => {
                ApiError::new(StatusCode::FORBIDDEN, "INTENT_NOT_PREPARED", message)
            }
            RelayError::Preflight(report) => {
                let status = if report.ledger_failed() {
                    StatusCode::BAD_GATEWAY
                } else {
                    StatusCode::CONFLICT
                };
                ApiError::new(status, "PREFLIGHT_FAILED", message)
                    .with_details(json!({ "errors": report.errors }))
            }
            RelayError::Ledger(e) => {
                ApiError::new(StatusCode::BAD_GATEWAY, e.code(), message).with_details(e.details())
            }
            RelayError::Signer(_) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "RELAY_SIGNER_ERROR", message)
            }
            RelayError::Token(_) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "BACKEND_TOKEN_ERROR", message)
            }
        }
    }
}

impl From<crate::error::ValidationError> for ApiError {
    fn from(err: crate::error::ValidationError) -> Self {
        RelayError::from(err).into()
    }
}

impl From<crate::identity::IdentityError> for ApiError {
    fn from(err: crate::identity::IdentityError) -> Self {
        RelayError::from(err).into()
    }
}
