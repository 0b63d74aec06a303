//! Institutional intent relay server.
//!
//! Loads the relay key, connects to the intent registry and serves the
//! prepare/register API.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lab_intent_relay::{
    api::{start_server, AppState},
    authorization::HttpAuthorizationClient,
    config::RelayConfig,
    ledger::RpcLedger,
    service::IntentService,
    token::BackendTokenIssuer,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = RelayConfig::parse();

    let signer = Arc::new(config.relay_signer().context("failed to load relay key")?);
    info!(signer = %signer.address(), "relay key loaded");

    let ledger = RpcLedger::connect(
        &config.rpc_url,
        config.chain_id,
        config.contract,
        &signer,
        config.confirmations,
    )
    .context("failed to connect to the intent registry")?;

    let authorization = HttpAuthorizationClient::new(config.call_timeout())
        .context("failed to create authorization client")?;
    let tokens = BackendTokenIssuer::new(
        config.backend_token_secret.as_bytes(),
        config.backend_token_ttl_secs,
    );

    info!("Server configuration:");
    info!("  Listen Address: {}", config.listen_addr);
    info!("  Chain ID: {}", config.chain_id);
    info!("  Registry: {}", config.contract);
    info!("  Intent TTL: {}s", config.intent_ttl_secs);

    let service = IntentService::new(
        config.settings(),
        Arc::new(ledger),
        Arc::new(authorization),
        signer,
        tokens,
    );

    if let Err(e) = start_server(AppState::new(Arc::new(service)), config.listen_addr).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
