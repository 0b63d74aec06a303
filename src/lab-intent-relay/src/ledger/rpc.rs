use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{decode_revert_reason, SolCall};
use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, MiddlewareError, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{transaction::eip2718::TypedTransaction, BlockNumber, TransactionRequest, H160};
use lab_intent_types::{
    ActionPayload, InstitutionRecord, IntentMeta, IntentState, LabSnapshot, ReservationPayload,
    ReservationSnapshot, ReservationStatus,
};
use tracing::{debug, info, warn};

use super::abi::{self, IIntentRegistry};
use super::{LedgerClient, LedgerError, TxOutcome};
use crate::signer::{IntentSignature, RelaySigner};

type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Intent registry reached over JSON-RPC.
///
/// Reads are `eth_call`s against the latest block; writes are sent from the
/// relay key and awaited until `confirmations` blocks deep.
#[derive(Clone, Debug)]
pub struct RpcLedger {
    client: Arc<Client>,
    contract: Address,
    confirmations: usize,
}

impl RpcLedger {
    pub fn connect(
        rpc_url: &str,
        chain_id: u64,
        contract: Address,
        signer: &RelaySigner,
        confirmations: usize,
    ) -> Result<Self, LedgerError> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(|e| LedgerError::Rpc {
            code: None,
            message: format!("invalid rpc url: {e}"),
        })?;
        let wallet = LocalWallet::from_bytes(&signer.secret_bytes())
            .map_err(|e| LedgerError::Rpc {
                code: None,
                message: format!("cannot build transaction wallet: {e}"),
            })?
            .with_chain_id(chain_id);

        info!(%contract, chain_id, confirmations, "connected intent registry");
        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            contract,
            confirmations,
        })
    }

    fn to(&self) -> H160 {
        H160::from(self.contract.0 .0)
    }

    async fn read<C: SolCall>(&self, call: C) -> Result<C::Return, LedgerError> {
        let tx: TypedTransaction = TransactionRequest::new()
            .to(self.to())
            .data(call.abi_encode())
            .into();
        let out = self.client.call(&tx, None).await.map_err(rpc_error)?;
        C::abi_decode_returns(out.as_ref(), true)
            .map_err(|e| LedgerError::Decode(format!("{}: {e}", C::SIGNATURE)))
    }

    async fn submit(&self, data: Vec<u8>, request_id: B256) -> Result<TxOutcome, LedgerError> {
        let tx = TransactionRequest::new().to(self.to()).data(data);
        let pending = self.client.send_transaction(tx, None).await.map_err(rpc_error)?;
        let tx_hash = B256::from((*pending).0);
        debug!(%request_id, %tx_hash, "registration sent");

        let receipt = pending
            .confirmations(self.confirmations)
            .await
            .map_err(rpc_error)?
            .ok_or(LedgerError::Dropped(tx_hash))?;

        if receipt.status.map(|s| s.as_u64()) != Some(1) {
            warn!(%request_id, %tx_hash, "registration reverted on inclusion");
            return Err(LedgerError::Reverted {
                reason: "transaction reverted".to_string(),
                data: None,
                tx_hash: Some(tx_hash),
            });
        }

        Ok(TxOutcome {
            tx_hash,
            block_number: receipt.block_number.map(|b| b.as_u64()),
        })
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn block_timestamp(&self) -> Result<u64, LedgerError> {
        let block = self
            .client
            .get_block(BlockNumber::Latest)
            .await
            .map_err(rpc_error)?
            .ok_or_else(|| LedgerError::Decode("latest block unavailable".to_string()))?;
        Ok(block.timestamp.as_u64())
    }

    async fn next_nonce(&self, signer: Address) -> Result<U256, LedgerError> {
        let ret = self
            .read(IIntentRegistry::nextIntentNonceCall { signer })
            .await?;
        Ok(ret._0)
    }

    async fn intent_state(&self, request_id: B256) -> Result<IntentState, LedgerError> {
        let ret = self
            .read(IIntentRegistry::getIntentStateCall { requestId: request_id })
            .await?;
        IntentState::try_from(ret._0)
            .map_err(|raw| LedgerError::Decode(format!("unknown intent state {raw}")))
    }

    async fn has_role(&self, role: B256, account: Address) -> Result<bool, LedgerError> {
        let ret = self
            .read(IIntentRegistry::hasRoleCall { role, account })
            .await?;
        Ok(ret._0)
    }

    async fn reservation(&self, key: B256) -> Result<Option<ReservationSnapshot>, LedgerError> {
        let ret = self
            .read(IIntentRegistry::getReservationCall { reservationKey: key })
            .await?;
        if ret.renter == Address::ZERO {
            return Ok(None);
        }
        let status = ReservationStatus::try_from(ret.status)
            .map_err(|raw| LedgerError::Decode(format!("unknown reservation status {raw}")))?;
        Ok(Some(ReservationSnapshot {
            lab_id: ret.labId,
            renter: ret.renter,
            price: U256::from_be_slice(&ret.price.to_be_bytes::<12>()),
            start: ret.start,
            end: ret.end,
            status,
        }))
    }

    async fn lab(&self, lab_id: U256) -> Result<Option<LabSnapshot>, LedgerError> {
        let ret = self.read(IIntentRegistry::getLabCall { labId: lab_id }).await?;
        if ret.provider == Address::ZERO {
            return Ok(None);
        }
        Ok(Some(LabSnapshot {
            provider: ret.provider,
            price: U256::from_be_slice(&ret.price.to_be_bytes::<12>()),
            listed: ret.listed,
        }))
    }

    async fn institution(&self, organization: &str) -> Result<Option<InstitutionRecord>, LedgerError> {
        let executor = self
            .read(IIntentRegistry::resolveSchacHomeOrganizationCall {
                organization: organization.to_string(),
            })
            .await?
            ._0;
        if executor == Address::ZERO {
            return Ok(None);
        }
        let backend_url = self
            .read(IIntentRegistry::getSchacHomeOrganizationBackendCall { institution: executor })
            .await?
            ._0;
        Ok(Some(InstitutionRecord { executor, backend_url }))
    }

    async fn register_action_intent(
        &self,
        meta: &IntentMeta,
        payload: &ActionPayload,
        signature: &IntentSignature,
    ) -> Result<TxOutcome, LedgerError> {
        let call = abi::register_action_call(meta, payload, signature)?;
        self.submit(call.abi_encode(), meta.request_id).await
    }

    async fn register_reservation_intent(
        &self,
        meta: &IntentMeta,
        payload: &ReservationPayload,
        signature: &IntentSignature,
    ) -> Result<TxOutcome, LedgerError> {
        let call = abi::register_reservation_call(meta, payload, signature)?;
        self.submit(call.abi_encode(), meta.request_id).await
    }
}

/// Map a middleware failure, preferring the node's JSON-RPC error body.
///
/// Revert data, when the node returns it, is decoded as `Error(string)` /
/// `Panic(uint256)`; custom errors keep the raw bytes in `data`.
fn rpc_error<E: MiddlewareError>(err: E) -> LedgerError {
    let Some(resp) = err.as_error_response() else {
        return LedgerError::Rpc {
            code: None,
            message: err.to_string(),
        };
    };

    let data = resp
        .data
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| hex::decode(s.trim_start_matches("0x")).ok())
        .map(Bytes::from);

    if data.is_some() || resp.message.starts_with("execution reverted") {
        let reason = data
            .as_ref()
            .and_then(|d| decode_revert_reason(d))
            .unwrap_or_else(|| resp.message.clone());
        return LedgerError::Reverted {
            reason,
            data,
            tx_hash: None,
        };
    }

    LedgerError::Rpc {
        code: Some(resp.code),
        message: resp.message.clone(),
    }
}
