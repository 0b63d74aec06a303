use lab_intent_types::{IntentKind, IntentMeta, IntentPayload};
use serde::Serialize;

use crate::signer::IntentSignature;
use crate::typed_data::TypedData;

/// Intent as assembled by the builder, before it is signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltIntent {
    pub meta: IntentMeta,
    pub payload: IntentPayload,
    pub typed_data: TypedData,
}

impl BuiltIntent {
    pub fn kind(&self) -> IntentKind {
        self.payload.kind()
    }

    pub fn signed(self, signature: IntentSignature) -> SignedIntent {
        SignedIntent {
            meta: self.meta,
            payload: self.payload,
            signature,
        }
    }
}

/// Meta, payload and relay signature: what the registry receives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignedIntent {
    pub meta: IntentMeta,
    pub payload: IntentPayload,
    pub signature: IntentSignature,
}

impl SignedIntent {
    pub fn kind(&self) -> IntentKind {
        self.payload.kind()
    }
}
