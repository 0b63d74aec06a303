//! Relay configuration: command-line flags with `RELAY_*` environment fallbacks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use clap::Parser;
use lab_intent_types::IntentDomain;

use crate::service::ServiceSettings;
use crate::signer::{RelaySigner, SignerError};

/// Authorize, co-sign and register institutional lab-marketplace intents.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct RelayConfig {
    /// Address the HTTP API listens on.
    #[arg(long, env = "RELAY_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,

    /// JSON-RPC endpoint of the chain hosting the intent registry.
    #[arg(long, env = "RELAY_RPC_URL")]
    pub rpc_url: String,

    #[arg(long, env = "RELAY_CHAIN_ID")]
    pub chain_id: u64,

    /// Intent registry contract (also the EIP-712 verifying contract).
    #[arg(long, env = "RELAY_CONTRACT")]
    pub contract: Address,

    /// Relay private key (hex string, 0x...).
    #[arg(
        long,
        env = "RELAY_PRIVATE_KEY",
        hide_env_values = true,
        conflicts_with = "private_key_path"
    )]
    pub private_key: Option<String>,

    /// Path to a file containing the relay private key.
    #[arg(long, env = "RELAY_PRIVATE_KEY_PATH", conflicts_with = "private_key")]
    pub private_key_path: Option<PathBuf>,

    /// EIP-712 domain name.
    #[arg(long, env = "RELAY_DOMAIN_NAME", default_value = "LabMarketplaceIntents")]
    pub domain_name: String,

    /// EIP-712 domain version.
    #[arg(long, env = "RELAY_DOMAIN_VERSION", default_value = "1")]
    pub domain_version: String,

    /// Lifetime of a prepared intent, in seconds of ledger time.
    #[arg(long, env = "RELAY_INTENT_TTL_SECS", default_value_t = 900)]
    pub intent_ttl_secs: u64,

    /// Upper bound for each ledger read and backend call.
    #[arg(long, env = "RELAY_CALL_TIMEOUT_SECS", default_value_t = 10)]
    pub call_timeout_secs: u64,

    /// Upper bound for a registration, including waiting for confirmations.
    #[arg(long, env = "RELAY_SUBMIT_TIMEOUT_SECS", default_value_t = 120)]
    pub submit_timeout_secs: u64,

    #[arg(long, env = "RELAY_CONFIRMATIONS", default_value_t = 1)]
    pub confirmations: usize,

    /// Role the relay must hold on the registry (defaults to DEFAULT_ADMIN_ROLE).
    #[arg(long, env = "RELAY_REGISTRAR_ROLE", default_value_t = B256::ZERO)]
    pub registrar_role: B256,

    /// HS256 secret shared with institution ceremony backends.
    #[arg(long, env = "RELAY_BACKEND_TOKEN_SECRET", hide_env_values = true)]
    pub backend_token_secret: String,

    #[arg(long, env = "RELAY_BACKEND_TOKEN_TTL_SECS", default_value_t = 900)]
    pub backend_token_ttl_secs: u64,
}

impl RelayConfig {
    pub fn domain(&self) -> IntentDomain {
        IntentDomain {
            name: self.domain_name.clone(),
            version: self.domain_version.clone(),
            chain_id: self.chain_id,
            verifying_contract: self.contract,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn settings(&self) -> ServiceSettings {
        ServiceSettings {
            domain: self.domain(),
            intent_ttl: self.intent_ttl_secs,
            call_timeout: self.call_timeout(),
            submit_timeout: Duration::from_secs(self.submit_timeout_secs),
            registrar_role: self.registrar_role,
        }
    }

    /// Load the relay key from whichever source was configured.
    pub fn relay_signer(&self) -> Result<RelaySigner, SignerError> {
        if let Some(path) = &self.private_key_path {
            return RelaySigner::from_key_file(path);
        }
        match &self.private_key {
            Some(key) => RelaySigner::from_hex(key),
            None => Err(SignerError::KeyFile(
                "missing relay key: provide --private-key-path or --private-key \
                 (or set RELAY_PRIVATE_KEY_PATH/RELAY_PRIVATE_KEY)"
                    .to_string(),
            )),
        }
    }
}
