//! Last gate before an intent reaches the ledger.
//!
//! Every check runs, and every failure is reported, so a client sees the full
//! list of problems instead of the first one the contract would revert on.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use lab_intent_types::{ActionCode, IntentDomain, IntentKind, IntentMeta, IntentPayload, IntentState};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::intent::{BuiltIntent, SignedIntent};
use crate::ledger::{bounded, LedgerClient, LedgerError};
use crate::signer::{recover_signer, IntentSignature};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreflightError {
    #[error("`{0}` must not be the zero address")]
    ZeroAddress(&'static str),
    #[error("intent signer {declared} is not the relay {relay}")]
    ForeignSigner { declared: Address, relay: Address },
    #[error("payload executor {payload} differs from meta executor {meta}")]
    ExecutorMismatch { meta: Address, payload: Address },
    #[error("{action} is not a {kind} intent")]
    ActionNotAllowed { action: ActionCode, kind: IntentKind },
    #[error("expiresAt {expires_at} must be after requestedAt {requested_at}")]
    InvalidWindow { requested_at: u64, expires_at: u64 },
    #[error("payloadHash {declared} does not match the payload ({computed})")]
    PayloadHashMismatch { declared: B256, computed: B256 },
    #[error("nonce {declared} is not the ledger's next nonce {expected}")]
    NonceMismatch { declared: U256, expected: U256 },
    #[error("request id already known to the ledger ({0:?})")]
    DuplicateRequest(IntentState),
    #[error("relay {account} lacks registrar role {role}")]
    MissingRole { role: B256, account: Address },
    #[error("requestedAt {requested_at} is ahead of ledger time {now}")]
    RequestedInFuture { requested_at: u64, now: u64 },
    #[error("intent expired at {expires_at}, ledger time is {now}")]
    Expired { expires_at: u64, now: u64 },
    #[error("signature does not recover to the intent signer")]
    SignatureMismatch { recovered: Option<Address> },
    #[error("ledger read `{call}` failed: {error}")]
    LedgerUnavailable { call: &'static str, error: LedgerError },
}

impl PreflightError {
    pub fn code(&self) -> &'static str {
        match self {
            PreflightError::ZeroAddress(_) => "ZERO_ADDRESS",
            PreflightError::ForeignSigner { .. } => "SIGNER_NOT_RELAY",
            PreflightError::ExecutorMismatch { .. } => "EXECUTOR_MISMATCH",
            PreflightError::ActionNotAllowed { .. } => "ACTION_NOT_ALLOWED",
            PreflightError::InvalidWindow { .. } => "INVALID_EXPIRY_WINDOW",
            PreflightError::PayloadHashMismatch { .. } => "PAYLOAD_HASH_MISMATCH",
            PreflightError::NonceMismatch { .. } => "NONCE_MISMATCH",
            PreflightError::DuplicateRequest(_) => "REQUEST_ID_ALREADY_USED",
            PreflightError::MissingRole { .. } => "RELAY_MISSING_ROLE",
            PreflightError::RequestedInFuture { .. } => "REQUESTED_IN_FUTURE",
            PreflightError::Expired { .. } => "INTENT_EXPIRED",
            PreflightError::SignatureMismatch { .. } => "SIGNATURE_MISMATCH",
            PreflightError::LedgerUnavailable { .. } => "LEDGER_UNAVAILABLE",
        }
    }
}

impl Serialize for PreflightError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("code", self.code())?;
        map.serialize_entry("message", &self.to_string())?;
        map.end()
    }
}

/// Accumulated preflight failures. Empty means the intent may be submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("preflight rejected the intent ({} problem(s))", .errors.len())]
pub struct PreflightReport {
    pub errors: Vec<PreflightError>,
}

impl PreflightReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether the verdict is incomplete because the ledger could not be read.
    pub fn ledger_failed(&self) -> bool {
        self.errors
            .iter()
            .any(|e| matches!(e, PreflightError::LedgerUnavailable { .. }))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.code() == code)
    }

    pub fn into_result(self) -> Result<(), PreflightReport> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }

    fn push(&mut self, error: PreflightError) {
        self.errors.push(error);
    }
}

pub struct PreflightValidator {
    ledger: Arc<dyn LedgerClient>,
    domain: IntentDomain,
    relay: Address,
    registrar_role: B256,
    timeout: Duration,
}

impl PreflightValidator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        domain: IntentDomain,
        relay: Address,
        registrar_role: B256,
        timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            domain,
            relay,
            registrar_role,
            timeout,
        }
    }

    /// Full check of a relay-signed intent, right before submission.
    pub async fn validate(&self, intent: &SignedIntent) -> PreflightReport {
        let mut report = PreflightReport::default();
        self.check_local(&intent.meta, &intent.payload, &mut report);
        self.check_ledger(&intent.meta, &mut report).await;
        self.check_signature(&intent.meta, &intent.signature, &mut report);
        log_verdict(&intent.meta, &report);
        report
    }

    /// Everything except signature recovery, for an intent that is still
    /// waiting on its authorization ceremony.
    pub async fn validate_unsigned(&self, intent: &BuiltIntent) -> PreflightReport {
        let mut report = PreflightReport::default();
        self.check_local(&intent.meta, &intent.payload, &mut report);
        self.check_ledger(&intent.meta, &mut report).await;
        log_verdict(&intent.meta, &report);
        report
    }

    fn check_local(&self, meta: &IntentMeta, payload: &IntentPayload, report: &mut PreflightReport) {
        if meta.signer == Address::ZERO {
            report.push(PreflightError::ZeroAddress("signer"));
        }
        if meta.executor == Address::ZERO {
            report.push(PreflightError::ZeroAddress("executor"));
        }
        if meta.signer != self.relay {
            report.push(PreflightError::ForeignSigner {
                declared: meta.signer,
                relay: self.relay,
            });
        }
        if payload.executor() != meta.executor {
            report.push(PreflightError::ExecutorMismatch {
                meta: meta.executor,
                payload: payload.executor(),
            });
        }
        if !payload.kind().allows(meta.action) {
            report.push(PreflightError::ActionNotAllowed {
                action: meta.action,
                kind: payload.kind(),
            });
        }
        if meta.expires_at <= meta.requested_at {
            report.push(PreflightError::InvalidWindow {
                requested_at: meta.requested_at,
                expires_at: meta.expires_at,
            });
        }
        let computed = payload.struct_hash();
        if computed != meta.payload_hash {
            report.push(PreflightError::PayloadHashMismatch {
                declared: meta.payload_hash,
                computed,
            });
        }
    }

    async fn check_ledger(&self, meta: &IntentMeta, report: &mut PreflightReport) {
        let ledger = self.ledger.as_ref();

        let (nonce, state, role, now) = tokio::join!(
            bounded(self.timeout, "nextIntentNonce", ledger.next_nonce(meta.signer)),
            bounded(self.timeout, "getIntentState", ledger.intent_state(meta.request_id)),
            bounded(
                self.timeout,
                "hasRole",
                ledger.has_role(self.registrar_role, self.relay)
            ),
            bounded(self.timeout, "blockTimestamp", ledger.block_timestamp()),
        );

        match nonce {
            Ok(expected) if expected != meta.nonce => report.push(PreflightError::NonceMismatch {
                declared: meta.nonce,
                expected,
            }),
            Ok(_) => {}
            Err(error) => report.push(unavailable("nextIntentNonce", error)),
        }

        match state {
            Ok(IntentState::None) => {}
            Ok(state) => report.push(PreflightError::DuplicateRequest(state)),
            Err(error) => report.push(unavailable("getIntentState", error)),
        }

        match role {
            Ok(true) => {}
            Ok(false) => report.push(PreflightError::MissingRole {
                role: self.registrar_role,
                account: self.relay,
            }),
            Err(error) => report.push(unavailable("hasRole", error)),
        }

        match now {
            Ok(now) => {
                if meta.requested_at > now {
                    report.push(PreflightError::RequestedInFuture {
                        requested_at: meta.requested_at,
                        now,
                    });
                }
                if now >= meta.expires_at {
                    report.push(PreflightError::Expired {
                        expires_at: meta.expires_at,
                        now,
                    });
                }
            }
            Err(error) => report.push(unavailable("blockTimestamp", error)),
        }
    }

    fn check_signature(&self, meta: &IntentMeta, signature: &IntentSignature, report: &mut PreflightReport) {
        let digest = lab_intent_types::signing_digest(&self.domain, meta);
        let recovered = recover_signer(digest, signature).ok();
        if recovered != Some(meta.signer) {
            report.push(PreflightError::SignatureMismatch { recovered });
        }
    }
}

fn log_verdict(meta: &IntentMeta, report: &PreflightReport) {
    if report.is_ok() {
        debug!(request_id = %meta.request_id, "preflight passed");
    } else {
        let codes: Vec<&str> = report.errors.iter().map(PreflightError::code).collect();
        warn!(request_id = %meta.request_id, ?codes, "preflight rejected intent");
    }
}

fn unavailable(call: &'static str, error: LedgerError) -> PreflightError {
    PreflightError::LedgerUnavailable { call, error }
}
