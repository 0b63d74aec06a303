//! Orchestration of the relay flows.
//!
//! `prepare`: resolve institution, read ledger time and nonce, build, preflight
//! the unsigned intent, open the authorization ceremony.
//! `register`: check the intent is the one prepared for this caller, confirm
//! the ceremony approved exactly that intent, sign, preflight, submit.
//!
//! The relay signature never leaves the process before the ceremony is
//! approved.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use lab_intent_types::{
    InstitutionRecord, IntentDomain, IntentKind, IntentMeta, IntentPayload,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};

use crate::authorization::{
    AuthorizationBackend, AuthorizationError, AuthorizationRequest, AuthorizationStatus,
};
use crate::builder::{new_request_id, IntentBuilder, IntentContext, IntentFields};
use crate::error::{BuildError, ValidationError};
use crate::hasher;
use crate::identity::{FederatedIdentity, IdentityError};
use crate::intent::BuiltIntent;
use crate::ledger::{bounded, LedgerClient, LedgerError};
use crate::preflight::{PreflightReport, PreflightValidator};
use crate::registrar::Registrar;
use crate::signer::{RelaySigner, SignerError};
use crate::token::{BackendTokenIssuer, TokenError};
use crate::typed_data::TypedData;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error("authorization session is {0:?}")]
    CeremonyIncomplete(AuthorizationStatus),
    #[error("authorization session was not approved for this intent")]
    CeremonyMismatch,
    #[error("intent was not prepared by this relay for this caller: {0}")]
    NotPrepared(&'static str),
    #[error(transparent)]
    Preflight(#[from] PreflightReport),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl From<BuildError> for RelayError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Validation(e) => RelayError::Validation(e),
            BuildError::Ledger(e) => RelayError::Ledger(e),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServiceSettings {
    pub domain: IntentDomain,
    pub intent_ttl: u64,
    pub call_timeout: Duration,
    pub submit_timeout: Duration,
    pub registrar_role: B256,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedEnvelope {
    pub meta: IntentMeta,
    pub payload: IntentPayload,
    pub typed_data: TypedData,
}

/// Response of the prepare endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedIntent {
    pub kind: IntentKind,
    pub request_id: B256,
    pub backend_url: String,
    pub authorization_session_id: String,
    pub authorization_url: String,
    pub backend_auth_token: String,
    pub expires_at: u64,
    pub intent: PreparedEnvelope,
}

/// Body of `POST /intents/register`: the prepared intent echoed back with the
/// session and token prepare returned.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub kind: IntentKind,
    pub meta: IntentMeta,
    pub payload: Value,
    pub authorization_session_id: String,
    pub backend_auth_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredIntent {
    pub request_id: B256,
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

pub struct IntentService {
    ledger: Arc<dyn LedgerClient>,
    authorization: Arc<dyn AuthorizationBackend>,
    signer: Arc<RelaySigner>,
    tokens: BackendTokenIssuer,
    builder: IntentBuilder,
    preflight: PreflightValidator,
    registrar: Registrar,
    call_timeout: Duration,
}

impl IntentService {
    pub fn new(
        settings: ServiceSettings,
        ledger: Arc<dyn LedgerClient>,
        authorization: Arc<dyn AuthorizationBackend>,
        signer: Arc<RelaySigner>,
        tokens: BackendTokenIssuer,
    ) -> Self {
        let builder = IntentBuilder::new(
            settings.domain.clone(),
            settings.intent_ttl,
            ledger.clone(),
            settings.call_timeout,
        );
        let preflight = PreflightValidator::new(
            ledger.clone(),
            settings.domain,
            signer.address(),
            settings.registrar_role,
            settings.call_timeout,
        );
        let registrar = Registrar::new(ledger.clone(), settings.submit_timeout);
        Self {
            ledger,
            authorization,
            signer,
            tokens,
            builder,
            preflight,
            registrar,
            call_timeout: settings.call_timeout,
        }
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    pub fn domain(&self) -> &IntentDomain {
        self.builder.domain()
    }

    async fn institution(&self, identity: &FederatedIdentity) -> Result<InstitutionRecord, RelayError> {
        let organization = identity.organization();
        bounded(
            self.call_timeout,
            "resolveSchacHomeOrganization",
            self.ledger.institution(organization),
        )
        .await?
        .ok_or_else(|| IdentityError::UnknownInstitution(organization.to_string()).into())
    }

    pub async fn prepare(
        &self,
        identity: &FederatedIdentity,
        fields: IntentFields,
        return_url: Option<&str>,
    ) -> Result<PreparedIntent, RelayError> {
        let request_id = new_request_id();
        let span = info_span!("prepare_intent", %request_id, org = identity.organization());
        self.prepare_inner(identity, fields, return_url, request_id)
            .instrument(span)
            .await
    }

    async fn prepare_inner(
        &self,
        identity: &FederatedIdentity,
        fields: IntentFields,
        return_url: Option<&str>,
        request_id: B256,
    ) -> Result<PreparedIntent, RelayError> {
        let institution = self.institution(identity).await?;

        let relay = self.signer.address();
        let (now, nonce) = tokio::try_join!(
            bounded(self.call_timeout, "blockTimestamp", self.ledger.block_timestamp()),
            bounded(self.call_timeout, "nextIntentNonce", self.ledger.next_nonce(relay)),
        )?;

        let ctx = IntentContext {
            request_id,
            signer: relay,
            executor: institution.executor,
            organization: identity.organization().to_string(),
            puc: identity.puc().to_string(),
            assertion_hash: identity.assertion_hash(),
            nonce,
            now,
        };
        let built = self.builder.build(&fields, &ctx).await?;
        self.preflight.validate_unsigned(&built).await.into_result()?;

        let (token, _) = self.tokens.issue(
            identity,
            request_id,
            built.typed_data.signing_hash(),
            chrono::Utc::now().timestamp().max(0) as u64,
        )?;

        let session = self
            .authorization
            .request_authorization(&AuthorizationRequest {
                backend_url: &institution.backend_url,
                token: &token,
                assertion: identity.assertion_base64(),
                organization: identity.organization(),
                puc: identity.puc(),
                return_url,
                meta: &built.meta,
                payload: &built.payload,
            })
            .await?;

        let expires_at = session
            .expires_at
            .map_or(built.meta.expires_at, |t| t.min(built.meta.expires_at));
        info!(
            action = %built.meta.action,
            nonce = %built.meta.nonce,
            session = %session.session_id,
            "intent prepared"
        );

        Ok(PreparedIntent {
            kind: built.kind(),
            request_id,
            backend_url: institution.backend_url,
            authorization_session_id: session.session_id,
            authorization_url: session.authorization_url,
            backend_auth_token: token,
            expires_at,
            intent: PreparedEnvelope {
                meta: built.meta,
                payload: built.payload,
                typed_data: built.typed_data,
            },
        })
    }

    pub async fn register(
        &self,
        identity: &FederatedIdentity,
        request: RegisterRequest,
    ) -> Result<RegisteredIntent, RelayError> {
        let span = info_span!("register_request", request_id = %request.meta.request_id);
        self.register_inner(identity, request).instrument(span).await
    }

    async fn register_inner(
        &self,
        identity: &FederatedIdentity,
        request: RegisterRequest,
    ) -> Result<RegisteredIntent, RelayError> {
        let payload = hasher::parse_payload(request.kind, request.payload)?;
        if !request.kind.allows(request.meta.action) {
            return Err(ValidationError::ActionNotAllowed {
                action: request.meta.action,
                kind: request.kind,
            }
            .into());
        }
        let session_id = request.authorization_session_id.trim();
        if session_id.is_empty() {
            return Err(ValidationError::MissingField("authorizationSessionId").into());
        }
        let token = request.backend_auth_token.trim();
        if token.is_empty() {
            return Err(ValidationError::MissingField("backendAuthToken").into());
        }

        let typed_data = TypedData::new(self.domain().clone(), request.meta.clone());
        let claims = self.tokens.verify(token).map_err(|e| {
            warn!(%e, "backend token refused");
            RelayError::NotPrepared("backend token is invalid or expired")
        })?;
        if !claims.binds(identity, request.meta.request_id, typed_data.signing_hash()) {
            return Err(RelayError::NotPrepared("backend token was issued for another intent or user"));
        }

        let institution = self.institution(identity).await?;
        if institution.executor != request.meta.executor {
            return Err(IdentityError::ExecutorMismatch {
                expected: institution.executor,
                declared: request.meta.executor,
            }
            .into());
        }
        if payload.organization() != identity.organization() {
            return Err(IdentityError::SubjectMismatch("schacHomeOrganization").into());
        }
        if payload.puc() != identity.puc() {
            return Err(IdentityError::SubjectMismatch("puc").into());
        }

        let ceremony = self
            .authorization
            .authorization_status(&institution.backend_url, token, session_id)
            .await?;
        if ceremony.status != AuthorizationStatus::Approved {
            return Err(RelayError::CeremonyIncomplete(ceremony.status));
        }
        // An approval that does not name this intent is not an approval of it.
        if ceremony.request_id != Some(request.meta.request_id)
            || ceremony.payload_hash != Some(request.meta.payload_hash)
        {
            warn!(
                session = session_id,
                approved_request = ?ceremony.request_id,
                approved_payload = ?ceremony.payload_hash,
                "ceremony approval does not match the intent"
            );
            return Err(RelayError::CeremonyMismatch);
        }

        let signature = self.signer.sign(&request.meta, &typed_data)?;
        let intent = BuiltIntent {
            meta: request.meta,
            payload,
            typed_data,
        }
        .signed(signature);
        self.preflight.validate(&intent).await.into_result()?;

        let outcome = self.registrar.register(&intent).await?;
        Ok(RegisteredIntent {
            request_id: intent.meta.request_id,
            tx_hash: outcome.tx_hash,
            block_number: outcome.block_number,
        })
    }
}
