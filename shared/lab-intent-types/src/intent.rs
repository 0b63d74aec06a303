use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::actions::{ActionCode, IntentKind};
use crate::eip712;

/// Chain-verifiable envelope signed by the relay (EIP-712 primary type `IntentMeta`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentMeta {
    /// Idempotency key; the registry refuses to see it twice.
    pub request_id: B256,
    /// Relay key expected to have produced the signature.
    pub signer: Address,
    /// Institution's on-chain actor.
    pub executor: Address,
    pub action: ActionCode,
    /// `hashStruct` of the accompanying payload.
    pub payload_hash: B256,
    /// Per-signer replay nonce.
    #[serde(with = "crate::wide::decimal")]
    pub nonce: U256,
    /// Ledger-time bounds (epoch seconds).
    pub requested_at: u64,
    pub expires_at: u64,
}

impl IntentMeta {
    pub fn struct_hash(&self) -> B256 {
        eip712::meta_struct_hash(self)
    }
}

/// Payload for lab lifecycle, cancellation and fund requests.
///
/// Fields the action does not use stay at zero / empty so the hash is
/// deterministic regardless of action.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPayload {
    pub executor: Address,
    pub schac_home_organization: String,
    pub puc: String,
    pub assertion_hash: B256,
    #[serde(default, with = "crate::wide::decimal")]
    pub lab_id: U256,
    #[serde(default)]
    pub reservation_key: B256,
    #[serde(default, with = "crate::wide::decimal")]
    pub price: U256,
    #[serde(default, with = "crate::wide::decimal")]
    pub max_batch: U256,
    #[serde(default)]
    pub auth: String,
    #[serde(default, rename = "accessURI")]
    pub access_uri: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default, rename = "tokenURI")]
    pub token_uri: String,
}

impl ActionPayload {
    pub fn struct_hash(&self) -> B256 {
        eip712::action_payload_hash(self)
    }
}

/// Payload for institutional booking creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationPayload {
    pub executor: Address,
    pub schac_home_organization: String,
    pub puc: String,
    pub assertion_hash: B256,
    #[serde(with = "crate::wide::decimal")]
    pub lab_id: U256,
    pub start: u32,
    pub end: u32,
    #[serde(with = "crate::wide::decimal")]
    pub price: U256,
    pub reservation_key: B256,
}

impl ReservationPayload {
    pub fn struct_hash(&self) -> B256 {
        eip712::reservation_payload_hash(self)
    }
}

/// Either payload, tagged by the registry entry point it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum IntentPayload {
    Action(ActionPayload),
    Reservation(ReservationPayload),
}

impl IntentPayload {
    pub fn kind(&self) -> IntentKind {
        match self {
            IntentPayload::Action(_) => IntentKind::Action,
            IntentPayload::Reservation(_) => IntentKind::Reservation,
        }
    }

    pub fn executor(&self) -> Address {
        match self {
            IntentPayload::Action(p) => p.executor,
            IntentPayload::Reservation(p) => p.executor,
        }
    }

    pub fn organization(&self) -> &str {
        match self {
            IntentPayload::Action(p) => &p.schac_home_organization,
            IntentPayload::Reservation(p) => &p.schac_home_organization,
        }
    }

    pub fn puc(&self) -> &str {
        match self {
            IntentPayload::Action(p) => &p.puc,
            IntentPayload::Reservation(p) => &p.puc,
        }
    }

    pub fn struct_hash(&self) -> B256 {
        match self {
            IntentPayload::Action(p) => p.struct_hash(),
            IntentPayload::Reservation(p) => p.struct_hash(),
        }
    }
}
