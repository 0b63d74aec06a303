use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Registry-side lifecycle of an intent (`getIntentState`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum IntentState {
    None = 0,
    Pending = 1,
    Executed = 2,
    Cancelled = 3,
    Expired = 4,
}

impl TryFrom<u8> for IntentState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let state = match value {
            0 => IntentState::None,
            1 => IntentState::Pending,
            2 => IntentState::Executed,
            3 => IntentState::Cancelled,
            4 => IntentState::Expired,
            other => return Err(other),
        };
        Ok(state)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ReservationStatus {
    Pending = 0,
    Booked = 1,
    Used = 2,
    Collected = 3,
    Cancelled = 4,
}

impl TryFrom<u8> for ReservationStatus {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let status = match value {
            0 => ReservationStatus::Pending,
            1 => ReservationStatus::Booked,
            2 => ReservationStatus::Used,
            3 => ReservationStatus::Collected,
            4 => ReservationStatus::Cancelled,
            other => return Err(other),
        };
        Ok(status)
    }
}

/// Reservation as currently recorded on the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationSnapshot {
    #[serde(with = "crate::wide::decimal")]
    pub lab_id: U256,
    pub renter: Address,
    #[serde(with = "crate::wide::decimal")]
    pub price: U256,
    pub start: u32,
    pub end: u32,
    pub status: ReservationStatus,
}

/// Lab listing as currently recorded on the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabSnapshot {
    pub provider: Address,
    #[serde(with = "crate::wide::decimal")]
    pub price: U256,
    pub listed: bool,
}

/// Institution resolved from its `schacHomeOrganization`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionRecord {
    pub executor: Address,
    /// Ceremony backend registered by the institution.
    pub backend_url: String,
}
