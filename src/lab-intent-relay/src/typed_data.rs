//! EIP-712 typed-data triple handed to clients and signed by the relay.
//!
//! Signing always goes through the typed `IntentMeta` value; the JSON rendering
//! is derived from the same field tables the digest uses, so a wallet or the
//! ceremony service re-hashing the JSON lands on the same bytes.

use alloy_primitives::B256;
use lab_intent_types::eip712::{
    self, DOMAIN_FIELDS, DOMAIN_TYPE_NAME, INTENT_META_FIELDS, INTENT_META_TYPE_NAME,
};
use lab_intent_types::{IntentDomain, IntentMeta};
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypedData {
    pub domain: IntentDomain,
    pub message: IntentMeta,
}

impl TypedData {
    pub fn new(domain: IntentDomain, message: IntentMeta) -> Self {
        Self { domain, message }
    }

    pub fn signing_hash(&self) -> B256 {
        eip712::signing_digest(&self.domain, &self.message)
    }

    pub fn to_json(&self) -> Value {
        let mut types = Map::new();
        types.insert(DOMAIN_TYPE_NAME.to_string(), field_list(DOMAIN_FIELDS));
        types.insert(INTENT_META_TYPE_NAME.to_string(), field_list(INTENT_META_FIELDS));

        json!({
            "types": types,
            "primaryType": INTENT_META_TYPE_NAME,
            "domain": {
                "name": self.domain.name,
                "version": self.domain.version,
                "chainId": self.domain.chain_id,
                "verifyingContract": self.domain.verifying_contract,
            },
            "message": self.message,
        })
    }
}

impl Serialize for TypedData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn field_list(fields: &[(&str, &str)]) -> Value {
    Value::Array(
        fields
            .iter()
            .map(|(name, ty)| json!({ "name": name, "type": ty }))
            .collect(),
    )
}
