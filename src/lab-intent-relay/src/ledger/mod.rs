//! Ledger access: read calls for preflight and intent building, write calls
//! for registration.
//!
//! `LedgerClient` is implemented against the registry over JSON-RPC
//! ([`rpc::RpcLedger`]); unit tests run against an in-memory registry.

pub mod abi;
#[cfg(test)]
pub mod memory;
pub mod rpc;

use std::{future::Future, time::Duration};

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use lab_intent_types::{
    ActionPayload, InstitutionRecord, IntentMeta, IntentState, LabSnapshot, ReservationPayload,
    ReservationSnapshot,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::signer::IntentSignature;

#[cfg(test)]
pub use memory::MemoryLedger;
pub use rpc::RpcLedger;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger rejected the call: {reason}")]
    Reverted {
        reason: String,
        data: Option<Bytes>,
        tx_hash: Option<B256>,
    },
    #[error("ledger rpc error: {message}")]
    Rpc { code: Option<i64>, message: String },
    #[error("ledger call `{0}` timed out")]
    Timeout(&'static str),
    #[error("transaction {0} dropped before inclusion")]
    Dropped(B256),
    #[error("cannot encode `{field}` for the registry: {reason}")]
    Encoding { field: &'static str, reason: String },
    #[error("unexpected ledger response: {0}")]
    Decode(String),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Reverted { .. } => "LEDGER_REVERTED",
            LedgerError::Rpc { .. } => "LEDGER_RPC_ERROR",
            LedgerError::Timeout(_) => "LEDGER_TIMEOUT",
            LedgerError::Dropped(_) => "LEDGER_TX_DROPPED",
            LedgerError::Encoding { .. } => "LEDGER_ENCODING_ERROR",
            LedgerError::Decode(_) => "LEDGER_DECODE_ERROR",
        }
    }

    /// Structured details for the API error body.
    pub fn details(&self) -> Value {
        match self {
            LedgerError::Reverted { reason, data, tx_hash } => json!({
                "reason": reason,
                "revertData": data,
                "txHash": tx_hash,
            }),
            LedgerError::Rpc { code, message } => json!({ "rpcCode": code, "message": message }),
            LedgerError::Timeout(call) => json!({ "call": call }),
            LedgerError::Dropped(tx_hash) => json!({ "txHash": tx_hash }),
            LedgerError::Encoding { field, reason } => json!({ "field": field, "reason": reason }),
            LedgerError::Decode(message) => json!({ "message": message }),
        }
    }
}

/// Inclusion result of a registration transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOutcome {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

/// Registry surface the relay depends on.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn block_timestamp(&self) -> Result<u64, LedgerError>;

    async fn next_nonce(&self, signer: Address) -> Result<U256, LedgerError>;

    async fn intent_state(&self, request_id: B256) -> Result<IntentState, LedgerError>;

    async fn has_role(&self, role: B256, account: Address) -> Result<bool, LedgerError>;

    /// `None` when the key is unknown to the registry.
    async fn reservation(&self, key: B256) -> Result<Option<ReservationSnapshot>, LedgerError>;

    /// `None` when no lab has this id.
    async fn lab(&self, lab_id: U256) -> Result<Option<LabSnapshot>, LedgerError>;

    /// `None` when the organization has no registered institution.
    async fn institution(&self, organization: &str) -> Result<Option<InstitutionRecord>, LedgerError>;

    async fn register_action_intent(
        &self,
        meta: &IntentMeta,
        payload: &ActionPayload,
        signature: &IntentSignature,
    ) -> Result<TxOutcome, LedgerError>;

    async fn register_reservation_intent(
        &self,
        meta: &IntentMeta,
        payload: &ReservationPayload,
        signature: &IntentSignature,
    ) -> Result<TxOutcome, LedgerError>;
}

/// Bound a ledger call by the caller-supplied timeout.
pub async fn bounded<T, F>(limit: Duration, call: &'static str, fut: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| LedgerError::Timeout(call))?
}
