//! Shared fixtures for the relay's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{address, keccak256, Address, B256, U256};
use async_trait::async_trait;
use lab_intent_types::{
    ActionCode, ActionPayload, InstitutionRecord, IntentDomain, IntentMeta, LabSnapshot,
    ReservationPayload,
};

use crate::authorization::{
    AuthorizationBackend, AuthorizationError, AuthorizationRequest, AuthorizationSession,
    AuthorizationStatus, CeremonyStatus,
};
use crate::identity::FederatedIdentity;
use crate::ledger::{LedgerClient, MemoryLedger};
use crate::service::{IntentService, ServiceSettings};
use crate::signer::RelaySigner;
use crate::token::BackendTokenIssuer;
use crate::typed_data::TypedData;

pub const RELAY_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const NOW: u64 = 1_700_000_000;
pub const EXECUTOR: Address = address!("00000000000000000000000000000000000000aa");
pub const ORG: &str = "uned.es";
pub const PUC: &str = "u-123";
pub const BACKEND: &str = "https://idp.uned.es";
pub const ASSERTION: &[u8] = b"<saml:Assertion ID=\"relay-test\"/>";
pub const TOKEN_SECRET: &[u8] = b"relay-test-secret";
pub const LAB_ID: u64 = 7;
pub const LAB_PRICE: u64 = 1_500_000;
pub const PROVIDER: Address = address!("00000000000000000000000000000000000000bb");

pub fn relay_signer() -> RelaySigner {
    RelaySigner::from_hex(RELAY_KEY).unwrap()
}

pub fn domain() -> IntentDomain {
    IntentDomain {
        name: "LabMarketplaceIntents".to_string(),
        version: "1".to_string(),
        chain_id: 11155111,
        verifying_contract: address!("1111111111111111111111111111111111111111"),
    }
}

/// Payload with every field populated, so hashing covers all members.
pub fn action_payload() -> ActionPayload {
    ActionPayload {
        executor: EXECUTOR,
        schac_home_organization: ORG.to_string(),
        puc: PUC.to_string(),
        assertion_hash: keccak256(ASSERTION),
        lab_id: U256::from(7u64),
        reservation_key: B256::repeat_byte(0x42),
        price: U256::from(1_500_000u64),
        max_batch: U256::from(25u64),
        auth: "https://auth.uned.es".to_string(),
        access_uri: "https://lab.uned.es/7".to_string(),
        access_key: "lab-7".to_string(),
        token_uri: "ipfs://bafy-lab-7".to_string(),
    }
}

pub fn reservation_payload() -> ReservationPayload {
    let lab_id = U256::from(7u64);
    let start = (NOW + 3_600) as u32;
    ReservationPayload {
        executor: EXECUTOR,
        schac_home_organization: ORG.to_string(),
        puc: PUC.to_string(),
        assertion_hash: keccak256(ASSERTION),
        lab_id,
        start,
        end: start + 1_800,
        price: U256::from(1_500_000u64),
        reservation_key: lab_intent_types::reservation_key(lab_id, EXECUTOR, start),
    }
}

pub fn typed_data(signer: Address) -> TypedData {
    let meta = IntentMeta {
        request_id: B256::repeat_byte(0x01),
        signer,
        executor: EXECUTOR,
        action: ActionCode::RequestFunds,
        payload_hash: action_payload().struct_hash(),
        nonce: U256::from(3u64),
        requested_at: NOW,
        expires_at: NOW + 900,
    };
    TypedData::new(domain(), meta)
}

pub fn identity() -> FederatedIdentity {
    FederatedIdentity::new(ASSERTION.to_vec(), ORG, PUC)
}

/// Ledger at `NOW` with the relay holding the registrar role, `ORG`
/// registered to `EXECUTOR` and lab `LAB_ID` listed at `LAB_PRICE`.
pub fn ledger() -> MemoryLedger {
    let ledger = MemoryLedger::new(domain(), NOW);
    ledger.grant_role(B256::ZERO, relay_signer().address());
    ledger.register_institution(
        ORG,
        InstitutionRecord {
            executor: EXECUTOR,
            backend_url: BACKEND.to_string(),
        },
    );
    ledger.insert_lab(
        U256::from(LAB_ID),
        LabSnapshot {
            provider: PROVIDER,
            price: U256::from(LAB_PRICE),
            listed: true,
        },
    );
    ledger
}

pub fn settings() -> ServiceSettings {
    ServiceSettings {
        domain: domain(),
        intent_ttl: 900,
        call_timeout: Duration::from_secs(5),
        submit_timeout: Duration::from_secs(5),
        registrar_role: B256::ZERO,
    }
}

pub fn service(ledger: Arc<MemoryLedger>, authorization: Arc<StubAuthorization>) -> IntentService {
    let ledger: Arc<dyn LedgerClient> = ledger;
    let authorization: Arc<dyn AuthorizationBackend> = authorization;
    IntentService::new(
        settings(),
        ledger,
        authorization,
        Arc::new(relay_signer()),
        BackendTokenIssuer::new(TOKEN_SECRET, 900),
    )
}

/// Ceremony backend that opens sessions unless told to refuse.
///
/// Each session remembers the intent it was opened for and reports it as
/// approved, bound to that intent. Unknown sessions read as expired.
pub struct StubAuthorization {
    calls: AtomicUsize,
    refusal: Mutex<Option<AuthorizationError>>,
    sessions: Mutex<HashMap<String, (B256, B256)>>,
    status: Mutex<Option<CeremonyStatus>>,
    session_expires_at: Option<u64>,
}

impl StubAuthorization {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            refusal: Mutex::new(None),
            sessions: Mutex::new(HashMap::new()),
            status: Mutex::new(None),
            session_expires_at: Some(NOW + 300),
        }
    }

    pub fn refuse_with(&self, err: AuthorizationError) {
        *self.refusal.lock().unwrap() = Some(err);
    }

    /// Report `status` for every session from now on.
    pub fn set_status(&self, status: CeremonyStatus) {
        *self.status.lock().unwrap() = Some(status);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorizationBackend for StubAuthorization {
    async fn request_authorization(
        &self,
        request: &AuthorizationRequest<'_>,
    ) -> Result<AuthorizationSession, AuthorizationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.refusal.lock().unwrap().clone() {
            return Err(err);
        }
        let session_id = format!("session-{}", request.meta.request_id);
        self.sessions.lock().unwrap().insert(
            session_id.clone(),
            (request.meta.request_id, request.meta.payload_hash),
        );
        Ok(AuthorizationSession {
            authorization_url: format!("{}/ceremony/{session_id}", request.backend_url),
            session_id,
            expires_at: self.session_expires_at,
        })
    }

    async fn authorization_status(
        &self,
        _backend_url: &str,
        _token: &str,
        session_id: &str,
    ) -> Result<CeremonyStatus, AuthorizationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.refusal.lock().unwrap().clone() {
            return Err(err);
        }
        if let Some(status) = self.status.lock().unwrap().clone() {
            return Ok(status);
        }
        Ok(match self.sessions.lock().unwrap().get(session_id) {
            Some(&(request_id, payload_hash)) => CeremonyStatus {
                status: AuthorizationStatus::Approved,
                request_id: Some(request_id),
                payload_hash: Some(payload_hash),
            },
            None => CeremonyStatus {
                status: AuthorizationStatus::Expired,
                request_id: None,
                payload_hash: None,
            },
        })
    }
}
