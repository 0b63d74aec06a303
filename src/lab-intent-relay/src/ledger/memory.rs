use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy_primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use lab_intent_types::{
    ActionPayload, InstitutionRecord, IntentDomain, IntentKind, IntentMeta, IntentState,
    LabSnapshot, ReservationPayload, ReservationSnapshot,
};

use super::{abi, LedgerClient, LedgerError, TxOutcome};
use crate::signer::{recover_signer, IntentSignature};

#[derive(Debug, Default)]
struct State {
    now: u64,
    block: u64,
    nonces: HashMap<Address, U256>,
    intents: HashMap<B256, IntentState>,
    roles: HashSet<(B256, Address)>,
    reservations: HashMap<B256, ReservationSnapshot>,
    labs: HashMap<U256, LabSnapshot>,
    institutions: HashMap<String, InstitutionRecord>,
    reads: usize,
    submissions: usize,
    fail_reads: Option<LedgerError>,
    fail_next_submission: Option<LedgerError>,
}

/// In-process stand-in for the intent registry.
///
/// Registration applies the same acceptance rules as the contract, in the
/// contract's order, and reverts with the contract's error names.
#[derive(Debug)]
pub struct MemoryLedger {
    domain: IntentDomain,
    registrar_role: B256,
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new(domain: IntentDomain, now: u64) -> Self {
        Self {
            domain,
            registrar_role: B256::ZERO,
            state: Mutex::new(State {
                now,
                block: 1,
                ..State::default()
            }),
        }
    }

    pub fn with_registrar_role(mut self, role: B256) -> Self {
        self.registrar_role = role;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_time(&self, now: u64) {
        self.state().now = now;
    }

    pub fn advance(&self, secs: u64) {
        self.state().now += secs;
    }

    pub fn grant_role(&self, role: B256, account: Address) {
        self.state().roles.insert((role, account));
    }

    pub fn revoke_role(&self, role: B256, account: Address) {
        self.state().roles.remove(&(role, account));
    }

    pub fn set_nonce(&self, signer: Address, nonce: U256) {
        self.state().nonces.insert(signer, nonce);
    }

    pub fn set_intent_state(&self, request_id: B256, state: IntentState) {
        self.state().intents.insert(request_id, state);
    }

    pub fn insert_reservation(&self, key: B256, reservation: ReservationSnapshot) {
        self.state().reservations.insert(key, reservation);
    }

    pub fn insert_lab(&self, lab_id: U256, lab: LabSnapshot) {
        self.state().labs.insert(lab_id, lab);
    }

    pub fn register_institution(&self, organization: &str, record: InstitutionRecord) {
        self.state()
            .institutions
            .insert(organization.to_string(), record);
    }

    /// Every read fails with `err` until [`MemoryLedger::restore_reads`].
    pub fn fail_reads(&self, err: LedgerError) {
        self.state().fail_reads = Some(err);
    }

    pub fn restore_reads(&self) {
        self.state().fail_reads = None;
    }

    pub fn fail_next_submission(&self, err: LedgerError) {
        self.state().fail_next_submission = Some(err);
    }

    /// Number of read calls served so far.
    pub fn reads(&self) -> usize {
        self.state().reads
    }

    /// Number of registration attempts, accepted or not.
    pub fn submissions(&self) -> usize {
        self.state().submissions
    }

    pub fn intent(&self, request_id: B256) -> Option<IntentState> {
        self.state().intents.get(&request_id).copied()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, LedgerError> {
        let mut state = self.state();
        state.reads += 1;
        if let Some(err) = &state.fail_reads {
            return Err(err.clone());
        }
        Ok(f(&state))
    }

    fn register(
        &self,
        meta: &IntentMeta,
        kind: IntentKind,
        payload_executor: Address,
        payload_hash: B256,
        signature: &IntentSignature,
    ) -> Result<TxOutcome, LedgerError> {
        let mut state = self.state();
        state.submissions += 1;
        if let Some(err) = state.fail_next_submission.take() {
            return Err(err);
        }

        let next = state.nonces.get(&meta.signer).copied().unwrap_or(U256::ZERO);
        let known = state
            .intents
            .get(&meta.request_id)
            .is_some_and(|s| *s != IntentState::None);

        let rejection = if known {
            Some("IntentAlreadyExists")
        } else if !state.roles.contains(&(self.registrar_role, meta.signer)) {
            Some("MissingRole")
        } else if meta.action.kind() != kind {
            Some("ActionKindMismatch")
        } else if meta.nonce != next {
            Some("InvalidNonce")
        } else if meta.requested_at > state.now {
            Some("RequestedInFuture")
        } else if state.now >= meta.expires_at {
            Some("IntentExpired")
        } else if payload_executor != meta.executor {
            Some("ExecutorMismatch")
        } else if payload_hash != meta.payload_hash {
            Some("PayloadHashMismatch")
        } else if recover_signer(
            lab_intent_types::signing_digest(&self.domain, meta),
            signature,
        )
        .ok()
            != Some(meta.signer)
        {
            Some("InvalidSignature")
        } else {
            None
        };

        if let Some(reason) = rejection {
            return Err(LedgerError::Reverted {
                reason: reason.to_string(),
                data: None,
                tx_hash: None,
            });
        }

        state.intents.insert(meta.request_id, IntentState::Pending);
        state.nonces.insert(meta.signer, next + U256::from(1u64));
        state.block += 1;

        let mut preimage = [0u8; 40];
        preimage[..32].copy_from_slice(meta.request_id.as_slice());
        preimage[32..].copy_from_slice(&state.block.to_be_bytes());
        Ok(TxOutcome {
            tx_hash: keccak256(preimage),
            block_number: Some(state.block),
        })
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn block_timestamp(&self) -> Result<u64, LedgerError> {
        self.read(|s| s.now)
    }

    async fn next_nonce(&self, signer: Address) -> Result<U256, LedgerError> {
        self.read(|s| s.nonces.get(&signer).copied().unwrap_or(U256::ZERO))
    }

    async fn intent_state(&self, request_id: B256) -> Result<IntentState, LedgerError> {
        self.read(|s| {
            s.intents
                .get(&request_id)
                .copied()
                .unwrap_or(IntentState::None)
        })
    }

    async fn has_role(&self, role: B256, account: Address) -> Result<bool, LedgerError> {
        self.read(|s| s.roles.contains(&(role, account)))
    }

    async fn reservation(&self, key: B256) -> Result<Option<ReservationSnapshot>, LedgerError> {
        self.read(|s| s.reservations.get(&key).cloned())
    }

    async fn lab(&self, lab_id: U256) -> Result<Option<LabSnapshot>, LedgerError> {
        self.read(|s| s.labs.get(&lab_id).cloned())
    }

    async fn institution(&self, organization: &str) -> Result<Option<InstitutionRecord>, LedgerError> {
        self.read(|s| s.institutions.get(organization).cloned())
    }

    async fn register_action_intent(
        &self,
        meta: &IntentMeta,
        payload: &ActionPayload,
        signature: &IntentSignature,
    ) -> Result<TxOutcome, LedgerError> {
        abi::register_action_call(meta, payload, signature)?;
        self.register(
            meta,
            IntentKind::Action,
            payload.executor,
            payload.struct_hash(),
            signature,
        )
    }

    async fn register_reservation_intent(
        &self,
        meta: &IntentMeta,
        payload: &ReservationPayload,
        signature: &IntentSignature,
    ) -> Result<TxOutcome, LedgerError> {
        abi::register_reservation_call(meta, payload, signature)?;
        self.register(
            meta,
            IntentKind::Reservation,
            payload.executor,
            payload.struct_hash(),
            signature,
        )
    }
}
