//! EIP-712 encoding for intent envelopes and payloads.
//!
//! The registry recomputes `hashStruct(payload)` and the `IntentMeta` digest on
//! its side, so field order and word widths here must match the contract's
//! type strings exactly. Type strings are derived from the field tables below.

use alloy_primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::intent::{ActionPayload, IntentMeta, ReservationPayload};

pub const DOMAIN_FIELDS: &[(&str, &str)] = &[
    ("name", "string"),
    ("version", "string"),
    ("chainId", "uint256"),
    ("verifyingContract", "address"),
];

pub const INTENT_META_FIELDS: &[(&str, &str)] = &[
    ("requestId", "bytes32"),
    ("signer", "address"),
    ("executor", "address"),
    ("action", "uint8"),
    ("payloadHash", "bytes32"),
    ("nonce", "uint256"),
    ("requestedAt", "uint64"),
    ("expiresAt", "uint64"),
];

pub const ACTION_PAYLOAD_FIELDS: &[(&str, &str)] = &[
    ("executor", "address"),
    ("schacHomeOrganization", "string"),
    ("puc", "string"),
    ("assertionHash", "bytes32"),
    ("labId", "uint256"),
    ("reservationKey", "bytes32"),
    ("price", "uint96"),
    ("maxBatch", "uint96"),
    ("auth", "string"),
    ("accessURI", "string"),
    ("accessKey", "string"),
    ("tokenURI", "string"),
];

pub const RESERVATION_PAYLOAD_FIELDS: &[(&str, &str)] = &[
    ("executor", "address"),
    ("schacHomeOrganization", "string"),
    ("puc", "string"),
    ("assertionHash", "bytes32"),
    ("labId", "uint256"),
    ("start", "uint32"),
    ("end", "uint32"),
    ("price", "uint96"),
    ("reservationKey", "bytes32"),
];

pub const DOMAIN_TYPE_NAME: &str = "EIP712Domain";
pub const INTENT_META_TYPE_NAME: &str = "IntentMeta";
pub const ACTION_PAYLOAD_TYPE_NAME: &str = "ActionIntentPayload";
pub const RESERVATION_PAYLOAD_TYPE_NAME: &str = "ReservationIntentPayload";

/// `Name(type1 name1,type2 name2,...)`
pub fn encode_type(name: &str, fields: &[(&str, &str)]) -> String {
    let members: Vec<String> = fields.iter().map(|(n, t)| format!("{t} {n}")).collect();
    format!("{name}({})", members.join(","))
}

pub fn type_hash(name: &str, fields: &[(&str, &str)]) -> B256 {
    keccak256(encode_type(name, fields).as_bytes())
}

/// Word-by-word `encodeData` builder. Every member is one 32-byte word.
#[derive(Clone, Debug)]
pub struct StructEncoder {
    buf: Vec<u8>,
}

impl StructEncoder {
    pub fn new(name: &str, fields: &[(&str, &str)]) -> Self {
        let mut buf = Vec::with_capacity(32 * (fields.len() + 1));
        buf.extend_from_slice(type_hash(name, fields).as_slice());
        Self { buf }
    }

    pub fn address(mut self, value: Address) -> Self {
        let mut padded = [0u8; 32];
        padded[12..32].copy_from_slice(value.as_slice());
        self.buf.extend_from_slice(&padded);
        self
    }

    pub fn bytes32(mut self, value: B256) -> Self {
        self.buf.extend_from_slice(value.as_slice());
        self
    }

    pub fn uint(mut self, value: U256) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes::<32>());
        self
    }

    pub fn uint64(self, value: u64) -> Self {
        self.uint(U256::from(value))
    }

    /// Dynamic `string` members are encoded as `keccak256(bytes)`.
    pub fn string(self, value: &str) -> Self {
        self.bytes32(keccak256(value.as_bytes()))
    }

    pub fn encoded(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> B256 {
        keccak256(&self.buf)
    }
}

/// EIP-712 domain of the intent registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl IntentDomain {
    pub fn separator(&self) -> B256 {
        StructEncoder::new(DOMAIN_TYPE_NAME, DOMAIN_FIELDS)
            .string(&self.name)
            .string(&self.version)
            .uint64(self.chain_id)
            .address(self.verifying_contract)
            .finish()
    }
}

pub fn meta_encoder(meta: &IntentMeta) -> StructEncoder {
    StructEncoder::new(INTENT_META_TYPE_NAME, INTENT_META_FIELDS)
        .bytes32(meta.request_id)
        .address(meta.signer)
        .address(meta.executor)
        .uint64(u64::from(meta.action.as_u8()))
        .bytes32(meta.payload_hash)
        .uint(meta.nonce)
        .uint64(meta.requested_at)
        .uint64(meta.expires_at)
}

pub fn meta_struct_hash(meta: &IntentMeta) -> B256 {
    meta_encoder(meta).finish()
}

pub fn action_payload_encoder(payload: &ActionPayload) -> StructEncoder {
    StructEncoder::new(ACTION_PAYLOAD_TYPE_NAME, ACTION_PAYLOAD_FIELDS)
        .address(payload.executor)
        .string(&payload.schac_home_organization)
        .string(&payload.puc)
        .bytes32(payload.assertion_hash)
        .uint(payload.lab_id)
        .bytes32(payload.reservation_key)
        .uint(payload.price)
        .uint(payload.max_batch)
        .string(&payload.auth)
        .string(&payload.access_uri)
        .string(&payload.access_key)
        .string(&payload.token_uri)
}

pub fn action_payload_hash(payload: &ActionPayload) -> B256 {
    action_payload_encoder(payload).finish()
}

pub fn reservation_payload_encoder(payload: &ReservationPayload) -> StructEncoder {
    StructEncoder::new(RESERVATION_PAYLOAD_TYPE_NAME, RESERVATION_PAYLOAD_FIELDS)
        .address(payload.executor)
        .string(&payload.schac_home_organization)
        .string(&payload.puc)
        .bytes32(payload.assertion_hash)
        .uint(payload.lab_id)
        .uint64(u64::from(payload.start))
        .uint64(u64::from(payload.end))
        .uint(payload.price)
        .bytes32(payload.reservation_key)
}

pub fn reservation_payload_hash(payload: &ReservationPayload) -> B256 {
    reservation_payload_encoder(payload).finish()
}

/// Final digest: `keccak256("\x19\x01" || domainSeparator || hashStruct(meta))`.
pub fn signing_digest(domain: &IntentDomain, meta: &IntentMeta) -> B256 {
    let mut final_buf = Vec::with_capacity(2 + 32 + 32);
    final_buf.extend_from_slice(b"\x19\x01");
    final_buf.extend_from_slice(domain.separator().as_slice());
    final_buf.extend_from_slice(meta_struct_hash(meta).as_slice());
    keccak256(final_buf)
}

/// `keccak256(abi.encodePacked(uint256 labId, address executor, uint32 start))`.
pub fn reservation_key(lab_id: U256, executor: Address, start: u32) -> B256 {
    let mut buf = Vec::with_capacity(32 + 20 + 4);
    buf.extend_from_slice(&lab_id.to_be_bytes::<32>());
    buf.extend_from_slice(executor.as_slice());
    buf.extend_from_slice(&start.to_be_bytes());
    keccak256(buf)
}
