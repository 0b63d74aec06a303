//! Intent builder: turns a validated request plus the caller's institutional
//! context into the meta/payload pair the relay signs.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use lab_intent_types::{
    ActionCode, ActionPayload, IntentDomain, IntentMeta, IntentPayload, ReservationPayload, ReservationStatus,
};
use rand::RngCore;
use tracing::debug;

use crate::error::{BuildError, ValidationError};
use crate::hasher;
use crate::intent::BuiltIntent;
use crate::ledger::{bounded, LedgerClient};
use crate::request::{ActionRequest, ReservationRequest};
use crate::typed_data::TypedData;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntentFields {
    Action(ActionRequest),
    Reservation(ReservationRequest),
}

/// Facts fixed before the intent is assembled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntentContext {
    pub request_id: B256,
    pub signer: Address,
    pub executor: Address,
    pub organization: String,
    pub puc: String,
    pub assertion_hash: B256,
    pub nonce: U256,
    /// Ledger time.
    pub now: u64,
}

/// Fresh random idempotency key.
pub fn new_request_id() -> B256 {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    B256::from(bytes)
}

pub struct IntentBuilder {
    domain: IntentDomain,
    ttl: u64,
    ledger: Arc<dyn LedgerClient>,
    timeout: Duration,
}

impl IntentBuilder {
    pub fn new(domain: IntentDomain, ttl: u64, ledger: Arc<dyn LedgerClient>, timeout: Duration) -> Self {
        Self {
            domain,
            ttl,
            ledger,
            timeout,
        }
    }

    pub fn domain(&self) -> &IntentDomain {
        &self.domain
    }

    pub async fn build(&self, fields: &IntentFields, ctx: &IntentContext) -> Result<BuiltIntent, BuildError> {
        let (action, payload) = match fields {
            IntentFields::Action(request) => (
                request.action(),
                IntentPayload::Action(self.action_payload(request, ctx).await?),
            ),
            IntentFields::Reservation(request) => {
                request.check_window(ctx.now)?;
                (
                    ActionCode::RequestBooking,
                    IntentPayload::Reservation(self.reservation_payload(request, ctx).await?),
                )
            }
        };

        let meta = IntentMeta {
            request_id: ctx.request_id,
            signer: ctx.signer,
            executor: ctx.executor,
            action,
            payload_hash: hasher::payload_hash(&payload),
            nonce: ctx.nonce,
            requested_at: ctx.now,
            expires_at: ctx.now.saturating_add(self.ttl),
        };
        debug!(
            request_id = %meta.request_id,
            %action,
            nonce = %meta.nonce,
            payload_hash = %meta.payload_hash,
            "intent built"
        );

        let typed_data = TypedData::new(self.domain.clone(), meta.clone());
        Ok(BuiltIntent {
            meta,
            payload,
            typed_data,
        })
    }

    async fn action_payload(&self, request: &ActionRequest, ctx: &IntentContext) -> Result<ActionPayload, BuildError> {
        let mut payload = ActionPayload {
            executor: ctx.executor,
            schac_home_organization: ctx.organization.clone(),
            puc: ctx.puc.clone(),
            assertion_hash: ctx.assertion_hash,
            ..ActionPayload::default()
        };

        match request {
            ActionRequest::AddLab { lab, .. } => {
                payload.price = lab.price;
                payload.auth = lab.auth.clone();
                payload.access_uri = lab.access_uri.clone();
                payload.access_key = lab.access_key.clone();
                payload.token_uri = lab.token_uri.clone();
            }
            ActionRequest::UpdateLab { lab_id, lab } => {
                payload.lab_id = *lab_id;
                payload.price = lab.price;
                payload.auth = lab.auth.clone();
                payload.access_uri = lab.access_uri.clone();
                payload.access_key = lab.access_key.clone();
                payload.token_uri = lab.token_uri.clone();
            }
            ActionRequest::SetTokenUri { lab_id, token_uri } => {
                payload.lab_id = *lab_id;
                payload.token_uri = token_uri.clone();
            }
            ActionRequest::DeleteLab { lab_id }
            | ActionRequest::ListLab { lab_id }
            | ActionRequest::UnlistLab { lab_id } => {
                payload.lab_id = *lab_id;
            }
            ActionRequest::RequestFunds { lab_id, max_batch } => {
                payload.lab_id = *lab_id;
                payload.max_batch = *max_batch;
            }
            ActionRequest::CancelReservation {
                action,
                reservation_key,
            } => {
                let required = match action {
                    ActionCode::CancelBooking => ReservationStatus::Booked,
                    _ => ReservationStatus::Pending,
                };
                let reservation = bounded(
                    self.timeout,
                    "getReservation",
                    self.ledger.reservation(*reservation_key),
                )
                .await?
                .ok_or(ValidationError::UnknownReservation(*reservation_key))?;

                if reservation.renter != ctx.executor {
                    return Err(ValidationError::ReservationNotOwned(*reservation_key).into());
                }
                if reservation.status != required {
                    return Err(ValidationError::NotCancellable {
                        action: *action,
                        status: reservation.status,
                        required,
                    }
                    .into());
                }

                // The ledger snapshot wins over anything the client sent.
                payload.reservation_key = *reservation_key;
                payload.lab_id = reservation.lab_id;
                payload.price = reservation.price;
            }
        }
        Ok(payload)
    }

    /// The booking price comes from the lab's current listing; the client's
    /// figure is only a quote that must agree with it.
    async fn reservation_payload(
        &self,
        request: &ReservationRequest,
        ctx: &IntentContext,
    ) -> Result<ReservationPayload, BuildError> {
        let lab = bounded(self.timeout, "getLab", self.ledger.lab(request.lab_id))
            .await?
            .ok_or(ValidationError::UnknownLab(request.lab_id))?;
        if !lab.listed {
            return Err(ValidationError::LabNotListed(request.lab_id).into());
        }
        if lab.price != request.price {
            return Err(ValidationError::PriceMismatch {
                quoted: request.price,
                listed: lab.price,
            }
            .into());
        }

        Ok(ReservationPayload {
            executor: ctx.executor,
            schac_home_organization: ctx.organization.clone(),
            puc: ctx.puc.clone(),
            assertion_hash: ctx.assertion_hash,
            lab_id: request.lab_id,
            start: request.start,
            end: request.end,
            price: lab.price,
            reservation_key: hasher::reservation_key(request.lab_id, ctx.executor, request.start),
        })
    }
}
