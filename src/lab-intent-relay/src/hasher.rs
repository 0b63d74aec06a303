//! Payload hashing: the `payloadHash` committed in every intent meta.

use alloy_primitives::{keccak256, B256};
use lab_intent_types::{ActionPayload, IntentKind, IntentPayload, ReservationPayload};
use serde_json::Value;

use crate::error::ValidationError;

pub use lab_intent_types::reservation_key;

/// EIP-712 `hashStruct` of the payload.
pub fn payload_hash(payload: &IntentPayload) -> B256 {
    payload.struct_hash()
}

/// Digest of the identity assertion. Only the digest outlives the request.
pub fn assertion_hash(assertion: &[u8]) -> B256 {
    keccak256(assertion)
}

/// Parse a client-echoed payload according to the intent kind it claims.
///
/// Numeric fields go through the canonical wide-integer parser, so key order
/// and numeric representation never affect the resulting hash.
pub fn parse_payload(kind: IntentKind, value: Value) -> Result<IntentPayload, ValidationError> {
    let malformed = |e: serde_json::Error| ValidationError::InvalidField {
        field: "payload",
        reason: e.to_string(),
    };
    match kind {
        IntentKind::Action => serde_json::from_value::<ActionPayload>(value)
            .map(IntentPayload::Action)
            .map_err(malformed),
        IntentKind::Reservation => serde_json::from_value::<ReservationPayload>(value)
            .map(IntentPayload::Reservation)
            .map_err(malformed),
    }
}
