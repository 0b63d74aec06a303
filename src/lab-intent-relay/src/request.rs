//! Client request bodies for the prepare endpoints and their validation into
//! typed per-action requests.
//!
//! Nothing here touches the network: every check that can be made from the
//! body alone happens in `validate`.

use alloy_primitives::{B256, U256};
use lab_intent_types::{wide, ActionCode, IntentKind, RawNumber};
use serde::Deserialize;

use crate::error::ValidationError;

/// Lab definition carried by `LAB_ADD`, `LAB_ADD_AND_LIST` and `LAB_UPDATE`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabSpec {
    pub price: U256,
    pub auth: String,
    pub access_uri: String,
    pub access_key: String,
    pub token_uri: String,
}

/// One variant per action-kind operation, each with exactly the fields it needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionRequest {
    AddLab { list: bool, lab: LabSpec },
    SetTokenUri { lab_id: U256, token_uri: String },
    UpdateLab { lab_id: U256, lab: LabSpec },
    DeleteLab { lab_id: U256 },
    ListLab { lab_id: U256 },
    UnlistLab { lab_id: U256 },
    CancelReservation { action: ActionCode, reservation_key: B256 },
    RequestFunds { lab_id: U256, max_batch: U256 },
}

impl ActionRequest {
    pub fn action(&self) -> ActionCode {
        match self {
            ActionRequest::AddLab { list: false, .. } => ActionCode::LabAdd,
            ActionRequest::AddLab { list: true, .. } => ActionCode::LabAddAndList,
            ActionRequest::SetTokenUri { .. } => ActionCode::LabSetUri,
            ActionRequest::UpdateLab { .. } => ActionCode::LabUpdate,
            ActionRequest::DeleteLab { .. } => ActionCode::LabDelete,
            ActionRequest::ListLab { .. } => ActionCode::LabList,
            ActionRequest::UnlistLab { .. } => ActionCode::LabUnlist,
            ActionRequest::CancelReservation { action, .. } => *action,
            ActionRequest::RequestFunds { .. } => ActionCode::RequestFunds,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFields {
    pub action: Option<ActionCode>,
    pub lab_id: Option<RawNumber>,
    pub reservation_key: Option<String>,
    pub price: Option<RawNumber>,
    pub max_batch: Option<RawNumber>,
    pub auth: Option<String>,
    #[serde(rename = "accessURI")]
    pub access_uri: Option<String>,
    pub access_key: Option<String>,
    #[serde(rename = "tokenURI")]
    pub token_uri: Option<String>,
    pub return_url: Option<String>,
}

impl ActionFields {
    pub fn validate(&self) -> Result<ActionRequest, ValidationError> {
        let action = self.action.ok_or(ValidationError::MissingField("action"))?;
        let request = match action {
            ActionCode::LabAdd | ActionCode::LabAddAndList => ActionRequest::AddLab {
                list: action == ActionCode::LabAddAndList,
                lab: self.lab_spec()?,
            },
            ActionCode::LabSetUri => ActionRequest::SetTokenUri {
                lab_id: self.lab_id()?,
                token_uri: required_text("tokenURI", &self.token_uri)?,
            },
            ActionCode::LabUpdate => ActionRequest::UpdateLab {
                lab_id: self.lab_id()?,
                lab: self.lab_spec()?,
            },
            ActionCode::LabDelete => ActionRequest::DeleteLab {
                lab_id: self.lab_id()?,
            },
            ActionCode::LabList => ActionRequest::ListLab {
                lab_id: self.lab_id()?,
            },
            ActionCode::LabUnlist => ActionRequest::UnlistLab {
                lab_id: self.lab_id()?,
            },
            ActionCode::CancelRequestBooking | ActionCode::CancelBooking => {
                ActionRequest::CancelReservation {
                    action,
                    reservation_key: self.reservation_key()?,
                }
            }
            ActionCode::RequestFunds => {
                let max_batch = required_number("maxBatch", &self.max_batch, 96)?;
                if max_batch.is_zero() {
                    return Err(ValidationError::InvalidField {
                        field: "maxBatch",
                        reason: "must be greater than zero".to_string(),
                    });
                }
                ActionRequest::RequestFunds {
                    lab_id: self.lab_id()?,
                    max_batch,
                }
            }
            ActionCode::RequestBooking => {
                return Err(ValidationError::ActionNotAllowed {
                    action,
                    kind: IntentKind::Action,
                })
            }
        };
        Ok(request)
    }

    fn lab_id(&self) -> Result<U256, ValidationError> {
        let lab_id = required_number("labId", &self.lab_id, 256)?;
        if lab_id.is_zero() {
            return Err(ValidationError::InvalidField {
                field: "labId",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(lab_id)
    }

    fn lab_spec(&self) -> Result<LabSpec, ValidationError> {
        Ok(LabSpec {
            price: required_number("price", &self.price, 96)?,
            auth: required_text("auth", &self.auth)?,
            access_uri: required_text("accessURI", &self.access_uri)?,
            access_key: required_text("accessKey", &self.access_key)?,
            token_uri: required_text("tokenURI", &self.token_uri)?,
        })
    }

    fn reservation_key(&self) -> Result<B256, ValidationError> {
        let raw = required_text("reservationKey", &self.reservation_key)?;
        raw.parse::<B256>().map_err(|_| ValidationError::InvalidField {
            field: "reservationKey",
            reason: "expected a 0x-prefixed 32-byte hex string".to_string(),
        })
    }
}

/// Booking creation request, before the ledger-time check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationRequest {
    pub lab_id: U256,
    pub start: u32,
    pub end: u32,
    pub price: U256,
}

impl ReservationRequest {
    /// `start` must not precede the ledger's current time.
    pub fn check_window(&self, now: u64) -> Result<(), ValidationError> {
        if u64::from(self.start) < now {
            return Err(ValidationError::StartInPast {
                start: self.start,
                now,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationFields {
    pub action: Option<ActionCode>,
    pub lab_id: Option<RawNumber>,
    pub start: Option<RawNumber>,
    pub end: Option<RawNumber>,
    pub price: Option<RawNumber>,
    pub return_url: Option<String>,
}

impl ReservationFields {
    pub fn validate(&self) -> Result<ReservationRequest, ValidationError> {
        if let Some(action) = self.action {
            if action.kind() != IntentKind::Reservation {
                return Err(ValidationError::ActionNotAllowed {
                    action,
                    kind: IntentKind::Reservation,
                });
            }
        }

        let lab_id = required_number("labId", &self.lab_id, 256)?;
        if lab_id.is_zero() {
            return Err(ValidationError::InvalidField {
                field: "labId",
                reason: "must be greater than zero".to_string(),
            });
        }
        let start = required_u32("start", &self.start)?;
        let end = required_u32("end", &self.end)?;
        if start >= end {
            return Err(ValidationError::InvalidWindow { start, end });
        }

        Ok(ReservationRequest {
            lab_id,
            start,
            end,
            price: required_number("price", &self.price, 96)?,
        })
    }
}

fn required_number(
    field: &'static str,
    raw: &Option<RawNumber>,
    bits: usize,
) -> Result<U256, ValidationError> {
    let raw = raw.as_ref().ok_or(ValidationError::MissingField(field))?;
    raw.to_u256()
        .and_then(|v| wide::fit(v, bits))
        .map_err(|e| ValidationError::InvalidField {
            field,
            reason: e.to_string(),
        })
}

fn required_u32(field: &'static str, raw: &Option<RawNumber>) -> Result<u32, ValidationError> {
    let value = required_number(field, raw, 32)?;
    Ok(value.as_limbs()[0] as u32)
}

fn required_text(field: &'static str, raw: &Option<String>) -> Result<String, ValidationError> {
    match raw.as_deref().map(str::trim) {
        None => Err(ValidationError::MissingField(field)),
        Some("") => Err(ValidationError::InvalidField {
            field,
            reason: "must not be empty".to_string(),
        }),
        Some(text) => Ok(text.to_string()),
    }
}
