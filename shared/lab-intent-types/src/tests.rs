use alloy_primitives::{address, b256, keccak256, Address, B256, U256};

use crate::eip712::{self, encode_type, ACTION_PAYLOAD_FIELDS, INTENT_META_FIELDS};
use crate::{
    reservation_key, signing_digest, ActionCode, ActionPayload, IntentDomain, IntentKind,
    IntentMeta, RawNumber, ReservationPayload, WideError,
};

const EXECUTOR: Address = address!("00000000000000000000000000000000000000aa");

fn domain() -> IntentDomain {
    IntentDomain {
        name: "LabMarketplaceIntents".to_string(),
        version: "1".to_string(),
        chain_id: 11155111,
        verifying_contract: address!("1111111111111111111111111111111111111111"),
    }
}

fn meta() -> IntentMeta {
    IntentMeta {
        request_id: b256!("0101010101010101010101010101010101010101010101010101010101010101"),
        signer: address!("2222222222222222222222222222222222222222"),
        executor: EXECUTOR,
        action: ActionCode::RequestFunds,
        payload_hash: B256::ZERO,
        nonce: U256::from(7u64),
        requested_at: 1_700_000_000,
        expires_at: 1_700_000_900,
    }
}

#[test]
fn test_action_codes_parse_by_number_and_name() {
    for action in ActionCode::ALL {
        assert_eq!(ActionCode::try_from(action.as_u8()), Ok(action));
        assert_eq!(action.name().parse::<ActionCode>(), Ok(action));
    }
    assert_eq!("request_funds".parse::<ActionCode>(), Ok(ActionCode::RequestFunds));
    assert!(ActionCode::try_from(0).is_err());
    assert!(ActionCode::try_from(12).is_err());
}

#[test]
fn test_only_request_booking_is_reservation_kind() {
    for action in ActionCode::ALL {
        let expected = action == ActionCode::RequestBooking;
        assert_eq!(IntentKind::Reservation.allows(action), expected);
        assert_eq!(IntentKind::Action.allows(action), !expected);
    }
}

#[test]
fn test_action_code_deserializes_from_number_or_name() {
    let by_number: ActionCode = serde_json::from_str("11").unwrap();
    let by_name: ActionCode = serde_json::from_str("\"CANCEL_BOOKING\"").unwrap();
    assert_eq!(by_number, ActionCode::RequestFunds);
    assert_eq!(by_name, ActionCode::CancelBooking);
    assert!(serde_json::from_str::<ActionCode>("300").is_err());
}

#[test]
fn test_wide_accepts_equivalent_representations() {
    let a = RawNumber::Int(1000).to_u256().unwrap();
    let b = RawNumber::Text("1000".into()).to_u256().unwrap();
    let c = RawNumber::Text("0x3e8".into()).to_u256().unwrap();
    assert_eq!(a, b);
    assert_eq!(b, c);
}

#[test]
fn test_wide_rejects_non_canonical_inputs() {
    assert_eq!(RawNumber::Float(-1.0).to_u256(), Err(WideError::Negative));
    assert_eq!(RawNumber::Float(1.5).to_u256(), Err(WideError::Fractional));
    assert_eq!(RawNumber::Float(1e20).to_u256(), Err(WideError::Imprecise));
    assert_eq!(RawNumber::Text("-3".into()).to_u256(), Err(WideError::Negative));
    assert_eq!(RawNumber::Text("2.5".into()).to_u256(), Err(WideError::Fractional));
    assert_eq!(RawNumber::Text(String::new()).to_u256(), Err(WideError::Empty));
    assert!(matches!(
        RawNumber::Text("12abc".into()).to_u256(),
        Err(WideError::Malformed(_))
    ));
    assert_eq!(
        crate::wide::fit(U256::from(1u64) << 96, 96),
        Err(WideError::Overflow { bits: 96 })
    );
}

#[test]
fn test_raw_number_from_json() {
    let parsed: Vec<RawNumber> = serde_json::from_str(r#"[5, "5", -5, 5.5]"#).unwrap();
    assert_eq!(parsed[0], RawNumber::Int(5));
    assert_eq!(parsed[1], RawNumber::Text("5".into()));
    assert_eq!(parsed[2].to_u256(), Err(WideError::Negative));
    assert_eq!(parsed[3].to_u256(), Err(WideError::Fractional));
}

#[test]
fn test_type_strings_match_registry() {
    assert_eq!(
        encode_type("IntentMeta", INTENT_META_FIELDS),
        "IntentMeta(bytes32 requestId,address signer,address executor,uint8 action,bytes32 payloadHash,uint256 nonce,uint64 requestedAt,uint64 expiresAt)"
    );
    assert_eq!(
        encode_type("ActionIntentPayload", ACTION_PAYLOAD_FIELDS),
        "ActionIntentPayload(address executor,string schacHomeOrganization,string puc,bytes32 assertionHash,uint256 labId,bytes32 reservationKey,uint96 price,uint96 maxBatch,string auth,string accessURI,string accessKey,string tokenURI)"
    );
}

#[test]
fn test_payload_hash_ignores_key_order_and_numeric_form() {
    let a: ActionPayload = serde_json::from_str(
        r#"{
            "executor": "0x00000000000000000000000000000000000000aa",
            "schacHomeOrganization": "uned.es",
            "puc": "12345",
            "assertionHash": "0x0000000000000000000000000000000000000000000000000000000000000001",
            "labId": 12,
            "maxBatch": "5",
            "price": 1000
        }"#,
    )
    .unwrap();
    let b: ActionPayload = serde_json::from_str(
        r#"{
            "price": "0x3e8",
            "maxBatch": 5,
            "labId": "12",
            "puc": "12345",
            "assertionHash": "0x0000000000000000000000000000000000000000000000000000000000000001",
            "schacHomeOrganization": "uned.es",
            "executor": "0x00000000000000000000000000000000000000aa"
        }"#,
    )
    .unwrap();

    assert_eq!(a, b);
    assert_eq!(a.struct_hash(), b.struct_hash());
    assert_eq!(a.struct_hash(), a.struct_hash());
}

#[test]
fn test_payload_hash_changes_with_any_field() {
    let base = ActionPayload {
        executor: EXECUTOR,
        lab_id: U256::from(12u64),
        max_batch: U256::from(5u64),
        ..Default::default()
    };
    let mut other = base.clone();
    other.max_batch = U256::from(6u64);
    assert_ne!(base.struct_hash(), other.struct_hash());

    let mut other = base.clone();
    other.token_uri = "ipfs://x".into();
    assert_ne!(base.struct_hash(), other.struct_hash());
}

#[test]
fn test_reservation_hash_encodes_window() {
    let payload = ReservationPayload {
        executor: EXECUTOR,
        lab_id: U256::from(3u64),
        start: 1_700_001_000,
        end: 1_700_004_600,
        price: U256::from(10u64),
        ..Default::default()
    };
    let encoder = eip712::reservation_payload_encoder(&payload);
    // typehash + 9 members
    assert_eq!(encoder.encoded().len(), 32 * 10);
    let mut shifted = payload.clone();
    shifted.end += 1;
    assert_ne!(payload.struct_hash(), shifted.struct_hash());
}

#[test]
fn test_reservation_key_is_packed_keccak() {
    let lab_id = U256::from(42u64);
    let start = 1_700_000_000u32;
    let mut packed = Vec::new();
    packed.extend_from_slice(&lab_id.to_be_bytes::<32>());
    packed.extend_from_slice(EXECUTOR.as_slice());
    packed.extend_from_slice(&start.to_be_bytes());
    assert_eq!(reservation_key(lab_id, EXECUTOR, start), keccak256(packed));
    assert_ne!(
        reservation_key(lab_id, EXECUTOR, start),
        reservation_key(lab_id, EXECUTOR, start + 1)
    );
}

#[test]
fn test_signing_digest_binds_domain_and_meta() {
    let meta = meta();
    let digest = signing_digest(&domain(), &meta);

    let mut other_domain = domain();
    other_domain.chain_id = 1;
    assert_ne!(digest, signing_digest(&other_domain, &meta));

    let mut other_meta = meta.clone();
    other_meta.nonce += U256::from(1u64);
    assert_ne!(digest, signing_digest(&domain(), &other_meta));
}

#[test]
fn test_meta_serializes_nonce_as_decimal() {
    let json = serde_json::to_value(meta()).unwrap();
    assert_eq!(json["nonce"], "7");
    assert_eq!(json["action"], 11);
    let back: IntentMeta = serde_json::from_value(json).unwrap();
    assert_eq!(back, meta());
}
