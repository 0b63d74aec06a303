//! Relay signing key and signature recovery.
//!
//! The relay key is the registry's trusted co-signer for institutional intents.
//! It is loaded once at startup and handed to the stages that need it; the
//! secret never leaves this module except to build the ledger transaction
//! wallet.

use std::{fmt, fs, path::Path};

use alloy_primitives::{keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use lab_intent_types::IntentMeta;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::typed_data::TypedData;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    #[error("relay key is not valid hex")]
    KeyEncoding,
    #[error("relay key is not a valid secp256k1 scalar")]
    InvalidKey,
    #[error("failed to read relay key file: {0}")]
    KeyFile(String),
    #[error("typed data message does not match the intent meta")]
    TypedDataMismatch,
    #[error("intent names signer {declared}, relay is {relay}")]
    ForeignSigner { declared: Address, relay: Address },
    #[error("signing failed")]
    Signing,
    #[error("signature must be 65 bytes (r||s||v)")]
    MalformedSignature,
    #[error("unsupported recovery byte {0}")]
    InvalidRecoveryId(u8),
    #[error("no public key recovers from this signature")]
    Unrecoverable,
}

/// 65-byte ECDSA signature `r || s || v` with `v` in {27, 28}.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IntentSignature([u8; 65]);

impl IntentSignature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignerError> {
        let raw: [u8; 65] = bytes.try_into().map_err(|_| SignerError::MalformedSignature)?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for IntentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for IntentSignature {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|_| SignerError::MalformedSignature)?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for IntentSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for IntentSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// The relay's privileged signing capability.
pub struct RelaySigner {
    key: SigningKey,
    address: Address,
}

impl RelaySigner {
    pub fn from_signing_key(key: SigningKey) -> Self {
        let address = address_of(key.verifying_key());
        Self { key, address }
    }

    /// Parse a hex-encoded secret (with or without `0x`).
    pub fn from_hex(secret: &str) -> Result<Self, SignerError> {
        let trimmed = secret.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(stripped).map_err(|_| SignerError::KeyEncoding)?;
        let key = SigningKey::from_slice(&bytes).map_err(|_| SignerError::InvalidKey)?;
        Ok(Self::from_signing_key(key))
    }

    pub fn from_key_file(path: &Path) -> Result<Self, SignerError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| SignerError::KeyFile(format!("{}: {e}", path.display())))?;
        Self::from_hex(&contents)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign the EIP-712 digest of `typed_data`.
    ///
    /// Refuses when the typed message drifted from `meta` or names another signer,
    /// since the registry would recover a different address.
    pub fn sign(&self, meta: &IntentMeta, typed_data: &TypedData) -> Result<IntentSignature, SignerError> {
        if typed_data.message != *meta {
            return Err(SignerError::TypedDataMismatch);
        }
        if meta.signer != self.address {
            return Err(SignerError::ForeignSigner {
                declared: meta.signer,
                relay: self.address,
            });
        }
        self.sign_digest(typed_data.signing_hash())
    }

    pub fn sign_digest(&self, digest: B256) -> Result<IntentSignature, SignerError> {
        let (mut signature, mut recovery_id) = self
            .key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|_| SignerError::Signing)?;

        // ecrecover on the registry side only accepts low-s signatures.
        if let Some(normalized) = signature.normalize_s() {
            signature = normalized;
            recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
        }

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(signature.to_bytes().as_slice());
        out[64] = 27 + recovery_id.to_byte();
        Ok(IntentSignature(out))
    }

    /// Raw secret for the transaction wallet. Stays inside the process.
    pub(crate) fn secret_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.key.to_bytes().as_slice());
        out
    }
}

impl fmt::Debug for RelaySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaySigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Ethereum address of a secp256k1 public key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Recover the signer address from a digest, accepting `v` in {0, 1, 27, 28}.
pub fn recover_signer(digest: B256, signature: &IntentSignature) -> Result<Address, SignerError> {
    let bytes = signature.as_bytes();
    let v = match bytes[64] {
        v @ (27 | 28) => v - 27,
        v @ (0 | 1) => v,
        other => return Err(SignerError::InvalidRecoveryId(other)),
    };
    let recovery_id = RecoveryId::from_byte(v).ok_or(SignerError::InvalidRecoveryId(bytes[64]))?;
    let sig = Signature::from_slice(&bytes[..64]).map_err(|_| SignerError::MalformedSignature)?;
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &sig, recovery_id)
        .map_err(|_| SignerError::Unrecoverable)?;
    Ok(address_of(&key))
}
