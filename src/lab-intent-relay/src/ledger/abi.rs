//! Solidity ABI of the intent registry and conversions from the relay's types.
//!
//! Conversions narrow every `U256` to the registry's declared width and fail
//! instead of truncating.

use alloy_primitives::{aliases::U96, Bytes, U256};
use alloy_sol_types::sol;
use lab_intent_types::wide;
use lab_intent_types::{ActionPayload, IntentMeta as Meta, ReservationPayload};

use super::LedgerError;
use crate::signer::IntentSignature;

sol! {
    #![sol(all_derives)]

    struct IntentMeta {
        bytes32 requestId;
        address signer;
        address executor;
        uint8 action;
        bytes32 payloadHash;
        uint256 nonce;
        uint64 requestedAt;
        uint64 expiresAt;
    }

    struct ActionIntentPayload {
        address executor;
        string schacHomeOrganization;
        string puc;
        bytes32 assertionHash;
        uint256 labId;
        bytes32 reservationKey;
        uint96 price;
        uint96 maxBatch;
        string auth;
        string accessURI;
        string accessKey;
        string tokenURI;
    }

    struct ReservationIntentPayload {
        address executor;
        string schacHomeOrganization;
        string puc;
        bytes32 assertionHash;
        uint256 labId;
        uint32 start;
        uint32 end;
        uint96 price;
        bytes32 reservationKey;
    }

    interface IIntentRegistry {
        function nextIntentNonce(address signer) external view returns (uint256);
        function getIntentState(bytes32 requestId) external view returns (uint8);
        function hasRole(bytes32 role, address account) external view returns (bool);
        function getReservation(bytes32 reservationKey)
            external
            view
            returns (uint256 labId, address renter, uint96 price, uint32 start, uint32 end, uint8 status);
        function getLab(uint256 labId) external view returns (address provider, uint96 price, bool listed);
        function resolveSchacHomeOrganization(string organization) external view returns (address);
        function getSchacHomeOrganizationBackend(address institution) external view returns (string);

        function registerActionIntent(IntentMeta meta, ActionIntentPayload payload, bytes signature) external;
        function registerReservationIntent(IntentMeta meta, ReservationIntentPayload payload, bytes signature)
            external;
    }
}

fn narrow_u96(value: U256, field: &'static str) -> Result<U96, LedgerError> {
    let value = wide::fit(value, 96).map_err(|e| LedgerError::Encoding {
        field,
        reason: e.to_string(),
    })?;
    let limbs = value.as_limbs();
    Ok(U96::from_limbs([limbs[0], limbs[1]]))
}

pub fn meta_to_sol(meta: &Meta) -> Result<IntentMeta, LedgerError> {
    Ok(IntentMeta {
        requestId: meta.request_id,
        signer: meta.signer,
        executor: meta.executor,
        action: meta.action.as_u8(),
        payloadHash: meta.payload_hash,
        nonce: meta.nonce,
        requestedAt: meta.requested_at,
        expiresAt: meta.expires_at,
    })
}

pub fn action_to_sol(payload: &ActionPayload) -> Result<ActionIntentPayload, LedgerError> {
    Ok(ActionIntentPayload {
        executor: payload.executor,
        schacHomeOrganization: payload.schac_home_organization.clone(),
        puc: payload.puc.clone(),
        assertionHash: payload.assertion_hash,
        labId: payload.lab_id,
        reservationKey: payload.reservation_key,
        price: narrow_u96(payload.price, "price")?,
        maxBatch: narrow_u96(payload.max_batch, "maxBatch")?,
        auth: payload.auth.clone(),
        accessURI: payload.access_uri.clone(),
        accessKey: payload.access_key.clone(),
        tokenURI: payload.token_uri.clone(),
    })
}

pub fn reservation_to_sol(payload: &ReservationPayload) -> Result<ReservationIntentPayload, LedgerError> {
    Ok(ReservationIntentPayload {
        executor: payload.executor,
        schacHomeOrganization: payload.schac_home_organization.clone(),
        puc: payload.puc.clone(),
        assertionHash: payload.assertion_hash,
        labId: payload.lab_id,
        start: payload.start,
        end: payload.end,
        price: narrow_u96(payload.price, "price")?,
        reservationKey: payload.reservation_key,
    })
}

pub fn register_action_call(
    meta: &Meta,
    payload: &ActionPayload,
    signature: &IntentSignature,
) -> Result<IIntentRegistry::registerActionIntentCall, LedgerError> {
    Ok(IIntentRegistry::registerActionIntentCall {
        meta: meta_to_sol(meta)?,
        payload: action_to_sol(payload)?,
        signature: Bytes::copy_from_slice(signature.as_bytes()),
    })
}

pub fn register_reservation_call(
    meta: &Meta,
    payload: &ReservationPayload,
    signature: &IntentSignature,
) -> Result<IIntentRegistry::registerReservationIntentCall, LedgerError> {
    Ok(IIntentRegistry::registerReservationIntentCall {
        meta: meta_to_sol(meta)?,
        payload: reservation_to_sol(payload)?,
        signature: Bytes::copy_from_slice(signature.as_bytes()),
    })
}
