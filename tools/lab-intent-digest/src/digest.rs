//! Independent re-implementation of the intent hashing.
//!
//! Type strings, member order and word widths are written out here rather than
//! taken from `lab_intent_types::eip712`, and hashing goes through `sha3`. Every
//! result is compared with the shared crate before it is printed.

use alloy_primitives::{Address, B256, U256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use lab_intent_types::{ActionPayload, IntentDomain, IntentKind, IntentMeta, ReservationPayload};
use sha3::{Digest, Keccak256};

pub const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
pub const META_TYPE: &str = "IntentMeta(bytes32 requestId,address signer,address executor,uint8 action,bytes32 payloadHash,uint256 nonce,uint64 requestedAt,uint64 expiresAt)";
pub const ACTION_PAYLOAD_TYPE: &str = "ActionIntentPayload(address executor,string schacHomeOrganization,string puc,bytes32 assertionHash,uint256 labId,bytes32 reservationKey,uint96 price,uint96 maxBatch,string auth,string accessURI,string accessKey,string tokenURI)";
pub const RESERVATION_PAYLOAD_TYPE: &str = "ReservationIntentPayload(address executor,string schacHomeOrganization,string puc,bytes32 assertionHash,uint256 labId,uint32 start,uint32 end,uint96 price,bytes32 reservationKey)";

/// Keccak-256 via `sha3`, kept separate from the hasher the shared crate uses.
pub fn keccak256_bytes(data: &[u8]) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    B256::from_slice(&hasher.finalize())
}

/// One `encodeData` member.
enum Word<'a> {
    Address(Address),
    Bytes32(B256),
    Uint { value: U256, bits: usize },
    Str(&'a str),
}

impl Word<'_> {
    /// `None` when a value does not fit its declared width.
    fn encode(&self) -> Option<[u8; 32]> {
        let mut out = [0u8; 32];
        match self {
            Word::Address(value) => out[12..].copy_from_slice(value.as_slice()),
            Word::Bytes32(value) => out.copy_from_slice(value.as_slice()),
            Word::Uint { value, bits } => {
                if value.bit_len() > *bits {
                    return None;
                }
                out = value.to_be_bytes::<32>();
            }
            Word::Str(value) => out.copy_from_slice(keccak256_bytes(value.as_bytes()).as_slice()),
        }
        Some(out)
    }
}

fn uint(value: U256, bits: usize) -> Word<'static> {
    Word::Uint { value, bits }
}

fn small(value: u64, bits: usize) -> Word<'static> {
    uint(U256::from(value), bits)
}

/// `hashStruct` over a literal type string and its members in order.
fn hash_struct(type_string: &str, words: &[Word<'_>]) -> Option<B256> {
    let mut buf = Vec::with_capacity(32 * (words.len() + 1));
    buf.extend_from_slice(keccak256_bytes(type_string.as_bytes()).as_slice());
    for word in words {
        buf.extend_from_slice(&word.encode()?);
    }
    Some(keccak256_bytes(&buf))
}

#[derive(Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub what: &'static str,
    pub shared: B256,
    pub local: Option<B256>,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.local {
            Some(local) => write!(f, "{} mismatch: shared {} vs local {}", self.what, self.shared, local),
            None => write!(f, "{} has a value wider than its declared type", self.what),
        }
    }
}

impl std::error::Error for Mismatch {}

fn agree(what: &'static str, shared: B256, local: Option<B256>) -> Result<B256, Mismatch> {
    if local == Some(shared) {
        Ok(shared)
    } else {
        Err(Mismatch { what, shared, local })
    }
}

fn local_action_hash(p: &ActionPayload) -> Option<B256> {
    hash_struct(
        ACTION_PAYLOAD_TYPE,
        &[
            Word::Address(p.executor),
            Word::Str(&p.schac_home_organization),
            Word::Str(&p.puc),
            Word::Bytes32(p.assertion_hash),
            uint(p.lab_id, 256),
            Word::Bytes32(p.reservation_key),
            uint(p.price, 96),
            uint(p.max_batch, 96),
            Word::Str(&p.auth),
            Word::Str(&p.access_uri),
            Word::Str(&p.access_key),
            Word::Str(&p.token_uri),
        ],
    )
}

fn local_reservation_hash(p: &ReservationPayload) -> Option<B256> {
    hash_struct(
        RESERVATION_PAYLOAD_TYPE,
        &[
            Word::Address(p.executor),
            Word::Str(&p.schac_home_organization),
            Word::Str(&p.puc),
            Word::Bytes32(p.assertion_hash),
            uint(p.lab_id, 256),
            small(u64::from(p.start), 32),
            small(u64::from(p.end), 32),
            uint(p.price, 96),
            Word::Bytes32(p.reservation_key),
        ],
    )
}

fn local_meta_hash(m: &IntentMeta) -> Option<B256> {
    hash_struct(
        META_TYPE,
        &[
            Word::Bytes32(m.request_id),
            Word::Address(m.signer),
            Word::Address(m.executor),
            small(u64::from(m.action.as_u8()), 8),
            Word::Bytes32(m.payload_hash),
            uint(m.nonce, 256),
            small(m.requested_at, 64),
            small(m.expires_at, 64),
        ],
    )
}

/// `hashStruct(payload)` for the given kind, checked against the shared crate.
pub fn payload_hash(kind: IntentKind, payload: &serde_json::Value) -> anyhow::Result<B256> {
    let hash = match kind {
        IntentKind::Action => {
            let payload: ActionPayload = serde_json::from_value(payload.clone())?;
            agree("action payload", payload.struct_hash(), local_action_hash(&payload))?
        }
        IntentKind::Reservation => {
            let payload: ReservationPayload = serde_json::from_value(payload.clone())?;
            agree(
                "reservation payload",
                payload.struct_hash(),
                local_reservation_hash(&payload),
            )?
        }
    };
    Ok(hash)
}

pub fn domain_separator(domain: &IntentDomain) -> Result<B256, Mismatch> {
    let local = hash_struct(
        DOMAIN_TYPE,
        &[
            Word::Str(&domain.name),
            Word::Str(&domain.version),
            small(domain.chain_id, 256),
            Word::Address(domain.verifying_contract),
        ],
    );
    agree("domain separator", domain.separator(), local)
}

/// Separator, meta struct hash and final signing digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaDigest {
    pub domain_separator: B256,
    pub struct_hash: B256,
    pub digest: B256,
}

pub fn meta_digest(domain: &IntentDomain, meta: &IntentMeta) -> Result<MetaDigest, Mismatch> {
    let separator = domain_separator(domain)?;
    let struct_hash = agree("intent meta", meta.struct_hash(), local_meta_hash(meta))?;

    let mut final_buf = Vec::with_capacity(2 + 32 + 32);
    final_buf.extend_from_slice(b"\x19\x01");
    final_buf.extend_from_slice(separator.as_slice());
    final_buf.extend_from_slice(struct_hash.as_slice());
    let digest = agree(
        "signing digest",
        lab_intent_types::signing_digest(domain, meta),
        Some(keccak256_bytes(&final_buf)),
    )?;

    Ok(MetaDigest {
        domain_separator: separator,
        struct_hash,
        digest,
    })
}

pub fn reservation_key(lab_id: U256, executor: Address, start: u32) -> Result<B256, Mismatch> {
    let mut buf = Vec::with_capacity(32 + 20 + 4);
    buf.extend_from_slice(&lab_id.to_be_bytes::<32>());
    buf.extend_from_slice(executor.as_slice());
    buf.extend_from_slice(&start.to_be_bytes());
    agree(
        "reservation key",
        lab_intent_types::reservation_key(lab_id, executor, start),
        Some(keccak256_bytes(&buf)),
    )
}

pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    Address::from_slice(&keccak256_bytes(&point.as_bytes()[1..])[12..])
}

/// Sign a prehashed digest as `r || s || v`, low-s, `v` in {27, 28}.
pub fn sign_digest(key: &SigningKey, digest: B256) -> Result<[u8; 65], k256::ecdsa::Error> {
    let (mut signature, mut recovery_id) = key.sign_prehash_recoverable(digest.as_slice())?;
    if let Some(normalized) = signature.normalize_s() {
        signature = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(signature.to_bytes().as_slice());
    out[64] = 27 + recovery_id.to_byte();
    Ok(out)
}

pub fn recover(digest: B256, signature: &[u8; 65]) -> Result<Address, k256::ecdsa::Error> {
    let v = signature[64].checked_sub(27).unwrap_or(signature[64]);
    let recovery_id = RecoveryId::from_byte(v).ok_or_else(k256::ecdsa::Error::new)?;
    let sig = Signature::from_slice(&signature[..64])?;
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &sig, recovery_id)?;
    Ok(address_of(&key))
}

pub fn parse_signing_key(hex_key: &str) -> anyhow::Result<SigningKey> {
    let bytes = hex::decode(hex_key.trim().trim_start_matches("0x"))?;
    Ok(SigningKey::from_slice(&bytes)?)
}
