//! Shared types for institutional intents: action codes, envelope, payloads,
//! ledger snapshots and their EIP-712 encoding.

pub mod actions;
pub mod eip712;
pub mod intent;
pub mod ledger;
pub mod wide;

#[cfg(test)]
mod tests;

pub use actions::{ActionCode, IntentKind, UnknownAction};
pub use eip712::{reservation_key, signing_digest, IntentDomain, StructEncoder};
pub use intent::{ActionPayload, IntentMeta, IntentPayload, ReservationPayload};
pub use ledger::{InstitutionRecord, IntentState, LabSnapshot, ReservationSnapshot, ReservationStatus};
pub use wide::{RawNumber, WideError};
