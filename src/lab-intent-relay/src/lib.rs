//! Trusted relay for institutional lab-marketplace intents.
//!
//! A prepare request is bound to the caller's federated identity, preflighted
//! and handed to the institution's second-factor ceremony. A register request
//! co-signs the intent with the relay key once the ceremony approved it and
//! submits it to the on-chain intent registry.

pub mod api;
pub mod authorization;
pub mod builder;
pub mod config;
pub mod error;
pub mod hasher;
pub mod identity;
pub mod intent;
pub mod ledger;
pub mod preflight;
pub mod registrar;
pub mod request;
pub mod service;
pub mod signer;
pub mod token;
pub mod typed_data;

#[cfg(test)]
mod testing;

pub use builder::{IntentBuilder, IntentContext, IntentFields};
pub use intent::{BuiltIntent, SignedIntent};
pub use ledger::{LedgerClient, LedgerError, RpcLedger, TxOutcome};
pub use preflight::{PreflightError, PreflightReport, PreflightValidator};
pub use service::{IntentService, RelayError, ServiceSettings};
pub use signer::{IntentSignature, RelaySigner};
pub use typed_data::TypedData;
