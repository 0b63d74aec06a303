//! Errors raised while turning a client request into an intent.

use alloy_primitives::{B256, U256};
use lab_intent_types::{ActionCode, IntentKind, ReservationStatus};

use crate::ledger::LedgerError;

/// Request-shape problems. Detected before any network call unless the check
/// depends on ledger data (reservation window, lab listing, cancellations).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("request body is not valid: {0}")]
    MalformedBody(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("{action} cannot be submitted as a {kind} intent")]
    ActionNotAllowed { action: ActionCode, kind: IntentKind },
    #[error("reservation start {start} must be before end {end}")]
    InvalidWindow { start: u32, end: u32 },
    #[error("reservation start {start} is before ledger time {now}")]
    StartInPast { start: u32, now: u64 },
    #[error("reservation {0} does not exist")]
    UnknownReservation(B256),
    #[error("{action} needs a {required:?} reservation, found {status:?}")]
    NotCancellable {
        action: ActionCode,
        status: ReservationStatus,
        required: ReservationStatus,
    },
    #[error("reservation {0} is not held by this institution")]
    ReservationNotOwned(B256),
    #[error("lab {0} does not exist")]
    UnknownLab(U256),
    #[error("lab {0} is not listed for booking")]
    LabNotListed(U256),
    #[error("quoted price {quoted} differs from the listed price {listed}")]
    PriceMismatch { quoted: U256, listed: U256 },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MalformedBody(_) => "MALFORMED_BODY",
            ValidationError::MissingField(_) => "MISSING_FIELD",
            ValidationError::InvalidField { .. } => "INVALID_FIELD",
            ValidationError::ActionNotAllowed { .. } => "ACTION_NOT_ALLOWED",
            ValidationError::InvalidWindow { .. } => "INVALID_RESERVATION_WINDOW",
            ValidationError::StartInPast { .. } => "RESERVATION_START_IN_PAST",
            ValidationError::UnknownReservation(_) => "RESERVATION_NOT_FOUND",
            ValidationError::NotCancellable { .. } => "RESERVATION_NOT_CANCELLABLE",
            ValidationError::ReservationNotOwned(_) => "RESERVATION_NOT_OWNED",
            ValidationError::UnknownLab(_) => "LAB_NOT_FOUND",
            ValidationError::LabNotListed(_) => "LAB_NOT_LISTED",
            ValidationError::PriceMismatch { .. } => "PRICE_MISMATCH",
        }
    }

    /// Field the error refers to, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::MissingField(field) | ValidationError::InvalidField { field, .. } => {
                Some(field)
            }
            ValidationError::InvalidWindow { .. } | ValidationError::StartInPast { .. } => {
                Some("start")
            }
            ValidationError::UnknownReservation(_)
            | ValidationError::NotCancellable { .. }
            | ValidationError::ReservationNotOwned(_) => Some("reservationKey"),
            ValidationError::UnknownLab(_) | ValidationError::LabNotListed(_) => Some("labId"),
            ValidationError::PriceMismatch { .. } => Some("price"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
