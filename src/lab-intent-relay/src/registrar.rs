use std::sync::Arc;
use std::time::Duration;

use lab_intent_types::IntentPayload;
use tracing::{error, info, info_span, Instrument};

use crate::intent::SignedIntent;
use crate::ledger::{bounded, LedgerClient, LedgerError, TxOutcome};

/// Submits signed intents to the registry entry point matching their kind.
pub struct Registrar {
    ledger: Arc<dyn LedgerClient>,
    timeout: Duration,
}

impl Registrar {
    pub fn new(ledger: Arc<dyn LedgerClient>, timeout: Duration) -> Self {
        Self { ledger, timeout }
    }

    pub async fn register(&self, intent: &SignedIntent) -> Result<TxOutcome, LedgerError> {
        let meta = &intent.meta;
        let span = info_span!(
            "register_intent",
            request_id = %meta.request_id,
            action = %meta.action,
            nonce = %meta.nonce,
        );

        let submission = async {
            let result = match &intent.payload {
                IntentPayload::Action(payload) => {
                    bounded(
                        self.timeout,
                        "registerActionIntent",
                        self.ledger
                            .register_action_intent(meta, payload, &intent.signature),
                    )
                    .await
                }
                IntentPayload::Reservation(payload) => {
                    bounded(
                        self.timeout,
                        "registerReservationIntent",
                        self.ledger
                            .register_reservation_intent(meta, payload, &intent.signature),
                    )
                    .await
                }
            };

            match &result {
                Ok(outcome) => info!(
                    tx_hash = %outcome.tx_hash,
                    block_number = ?outcome.block_number,
                    "intent registered"
                ),
                Err(err) => error!(code = err.code(), %err, "intent registration failed"),
            }
            result
        };

        submission.instrument(span).await
    }
}
