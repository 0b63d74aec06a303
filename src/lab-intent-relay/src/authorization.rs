//! Second-factor authorization ceremonies run by the institution's backend.
//!
//! The relay opens a session for a built intent and later checks that the
//! session was approved for that same intent before registering it.

use std::time::Duration;

use alloy_primitives::B256;
use async_trait::async_trait;
use chrono::DateTime;
use lab_intent_types::{IntentMeta, IntentPayload};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

/// Backend rejections the relay knows how to explain to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownRejection {
    CredentialNotRegistered,
    CredentialRevoked,
    IntentAlreadyPending,
    UserNotEnrolled,
}

impl KnownRejection {
    pub fn from_backend(code: &str) -> Option<Self> {
        let rejection = match code.trim().to_ascii_lowercase().as_str() {
            "webauthn_credential_not_registered" => KnownRejection::CredentialNotRegistered,
            "webauthn_credential_revoked" => KnownRejection::CredentialRevoked,
            "intent_already_pending" => KnownRejection::IntentAlreadyPending,
            "user_not_enrolled" => KnownRejection::UserNotEnrolled,
            _ => return None,
        };
        Some(rejection)
    }

    /// Code as the backend spells it, echoed back to clients.
    pub fn backend_code(self) -> &'static str {
        match self {
            KnownRejection::CredentialNotRegistered => "webauthn_credential_not_registered",
            KnownRejection::CredentialRevoked => "webauthn_credential_revoked",
            KnownRejection::IntentAlreadyPending => "intent_already_pending",
            KnownRejection::UserNotEnrolled => "user_not_enrolled",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            KnownRejection::CredentialNotRegistered => "WEBAUTHN_CREDENTIAL_NOT_REGISTERED",
            KnownRejection::CredentialRevoked => "WEBAUTHN_CREDENTIAL_REVOKED",
            KnownRejection::IntentAlreadyPending => "INTENT_ALREADY_PENDING",
            KnownRejection::UserNotEnrolled => "USER_NOT_ENROLLED",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            KnownRejection::CredentialNotRegistered => {
                "no WebAuthn credential is registered for this user"
            }
            KnownRejection::CredentialRevoked => "the user's WebAuthn credential was revoked",
            KnownRejection::IntentAlreadyPending => {
                "another intent is already awaiting authorization"
            }
            KnownRejection::UserNotEnrolled => "the user is not enrolled with the institution",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("{}", .0.message())]
    Rejected(KnownRejection),
    #[error("authorization backend failed: {message}")]
    Upstream {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },
    #[error("authorization backend returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("authorization backend did not answer in time")]
    Timeout,
}

impl AuthorizationError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthorizationError::Rejected(rejection) => rejection.code(),
            AuthorizationError::Upstream { .. } => "INTENT_AUTHORIZATION_FAILED",
            AuthorizationError::InvalidResponse(_) => "INTENT_AUTHORIZATION_RESPONSE_INVALID",
            AuthorizationError::Timeout => "INTENT_AUTHORIZATION_TIMEOUT",
        }
    }
}

/// Everything the ceremony backend needs to show the user what they approve.
pub struct AuthorizationRequest<'a> {
    pub backend_url: &'a str,
    pub token: &'a str,
    pub assertion: String,
    pub organization: &'a str,
    pub puc: &'a str,
    pub return_url: Option<&'a str>,
    pub meta: &'a IntentMeta,
    pub payload: &'a IntentPayload,
}

impl AuthorizationRequest<'_> {
    pub fn body(&self) -> Value {
        let payload_key = self.payload.kind().payload_key();
        let mut body = Map::new();
        body.insert("payloadKey".into(), json!(payload_key));
        body.insert("requestId".into(), json!(self.meta.request_id));
        body.insert("payloadHash".into(), json!(self.meta.payload_hash));
        body.insert("schacHomeOrganization".into(), json!(self.organization));
        body.insert("puc".into(), json!(self.puc));
        body.insert("samlAssertion".into(), json!(self.assertion));
        body.insert("returnUrl".into(), json!(self.return_url));
        body.insert("meta".into(), json!(self.meta));
        body.insert(payload_key.into(), json!(self.payload));
        Value::Object(body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationSession {
    pub session_id: String,
    pub authorization_url: String,
    /// Epoch seconds, when the backend reports one.
    pub expires_at: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationStatus {
    Approved,
    Pending,
    Denied,
    Expired,
}

/// Ceremony outcome as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CeremonyStatus {
    pub status: AuthorizationStatus,
    #[serde(default)]
    pub request_id: Option<B256>,
    #[serde(default)]
    pub payload_hash: Option<B256>,
}

#[async_trait]
pub trait AuthorizationBackend: Send + Sync {
    async fn request_authorization(
        &self,
        request: &AuthorizationRequest<'_>,
    ) -> Result<AuthorizationSession, AuthorizationError>;

    async fn authorization_status(
        &self,
        backend_url: &str,
        token: &str,
        session_id: &str,
    ) -> Result<CeremonyStatus, AuthorizationError>;
}

/// Ceremony backend reached over HTTP.
#[derive(Clone)]
pub struct HttpAuthorizationClient {
    client: HttpClient,
    timeout: Duration,
}

impl HttpAuthorizationClient {
    pub fn new(timeout: Duration) -> Result<Self, AuthorizationError> {
        let client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthorizationError::Upstream {
                status: None,
                code: None,
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client, timeout })
    }

    async fn exchange(&self, request: reqwest::RequestBuilder) -> Result<Value, AuthorizationError> {
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| AuthorizationError::Timeout)?
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        let refused = body.get("ok") == Some(&Value::Bool(false));
        if !status.is_success() || refused {
            let err = classify_rejection(status.as_u16(), &body);
            warn!(status = status.as_u16(), code = err.code(), "authorization backend refused");
            return Err(err);
        }
        Ok(body)
    }
}

#[async_trait]
impl AuthorizationBackend for HttpAuthorizationClient {
    async fn request_authorization(
        &self,
        request: &AuthorizationRequest<'_>,
    ) -> Result<AuthorizationSession, AuthorizationError> {
        let url = format!("{}/intents/authorize", request.backend_url.trim_end_matches('/'));
        debug!(%url, request_id = %request.meta.request_id, "opening authorization session");

        let body = self
            .exchange(
                self.client
                    .post(&url)
                    .bearer_auth(request.token)
                    .json(&request.body()),
            )
            .await?;
        parse_session(&body)
    }

    async fn authorization_status(
        &self,
        backend_url: &str,
        token: &str,
        session_id: &str,
    ) -> Result<CeremonyStatus, AuthorizationError> {
        let url = format!(
            "{}/intents/authorize/status/{}",
            backend_url.trim_end_matches('/'),
            session_id
        );
        let body = self.exchange(self.client.get(&url).bearer_auth(token)).await?;
        serde_json::from_value(body).map_err(|e| AuthorizationError::InvalidResponse(e.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> AuthorizationError {
    if err.is_timeout() {
        return AuthorizationError::Timeout;
    }
    AuthorizationError::Upstream {
        status: err.status().map(|s| s.as_u16()),
        code: None,
        message: err.to_string(),
    }
}

fn text<'a>(body: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(body, |v, key| v.get(*key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Map a refusal from the backend onto a known rejection when its code is one
/// the relay recognizes.
pub fn classify_rejection(status: u16, body: &Value) -> AuthorizationError {
    let code = text(body, &["error"])
        .or_else(|| text(body, &["code"]))
        .or_else(|| text(body, &["data", "error"]));

    if let Some(rejection) = code.and_then(KnownRejection::from_backend) {
        return AuthorizationError::Rejected(rejection);
    }

    let message = text(body, &["message"])
        .or(code)
        .map(str::to_string)
        .unwrap_or_else(|| format!("backend answered with status {status}"));
    AuthorizationError::Upstream {
        status: Some(status),
        code: code.map(str::to_string),
        message,
    }
}

/// Extract the session from a successful backend response.
pub fn parse_session(body: &Value) -> Result<AuthorizationSession, AuthorizationError> {
    let session_id = text(body, &["sessionId"])
        .ok_or_else(|| AuthorizationError::InvalidResponse("missing sessionId".to_string()))?;
    let authorization_url = text(body, &["ceremonyUrl"])
        .or_else(|| text(body, &["authorizationUrl"]))
        .ok_or_else(|| AuthorizationError::InvalidResponse("missing ceremony url".to_string()))?;

    Ok(AuthorizationSession {
        session_id: session_id.to_string(),
        authorization_url: authorization_url.to_string(),
        expires_at: body.get("expiresAt").and_then(epoch_seconds),
    })
}

/// Accepts epoch seconds, epoch milliseconds or an RFC 3339 timestamp.
fn epoch_seconds(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().map(|v| if v > 10_000_000_000 { v / 1_000 } else { v }),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .and_then(|t| u64::try_from(t.timestamp()).ok()),
        _ => None,
    }
}
