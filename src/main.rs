// src/main.rs

//! # did:memo resolver - Main Entry Point
//!
//! Loads settings, connects to the registry chain and serves the HTTP
//! resolution API.
//!
//! ## Environment Variables
//! - `MEMO_DID_RPC_URL`: JSON-RPC endpoint (default: http://127.0.0.1:8545)
//! - `MEMO_DID_ACCOUNT_DID_ADDRESS`: deployed account-DID contract
//! - `MEMO_DID_PROXY_ADDRESS`: deployed DID proxy contract
//! - `MEMO_DID_PRIVATE_KEY`: (Optional) signing key for mutations
//! - `MEMO_DID_LISTEN_ADDR`: (Optional) bind address (default: 127.0.0.1:3000)
//! - `MEMO_DID_REGISTER_ON_START`: (Optional) register a fresh identity for the
//!   signing key before serving (default: false)
//! - `RUST_LOG`: log filter, e.g. `info` or `memo_did=debug`

use anyhow::Context;
use dotenv::dotenv;
use log::{info, warn};
use memo_did::blockchain::evm_client::EvmClient;
use memo_did::config::Settings;
use memo_did::contracts::account_did::AccountDid;
use memo_did::services::api_server::ApiServer;
use memo_did::{DocumentResolver, IdentityController};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let settings = Settings::load().context("loading settings")?;
    let policy = settings.confirm_policy().context("confirmation policy")?;

    let key = settings.key_manager()?;
    let mut client = EvmClient::new(&settings.rpc_url)?.with_gas(settings.gas_limit, settings.gas_price);
    if let Some(key) = &key {
        client = client.with_signer(key, settings.chain_id_fallback).await;
        info!("signer {:#x} attached, confirming mutations with {:?}", key.address(), policy);
    }
    let client = Arc::new(client);

    match &key {
        Some(key) if settings.register_on_start => {
            let controller = IdentityController::from_settings(&settings, Arc::clone(&client))
                .await
                .context("binding the did proxy")?;
            controller
                .register_with_key(key)
                .await
                .with_context(|| format!("registering {}", controller.did()))?;
            info!("registered {}", controller.did());
        }
        None if settings.register_on_start => {
            warn!("register_on_start is set but no signing key is configured");
        }
        _ => {}
    }

    let account = AccountDid::new(Arc::clone(&client), settings.account_did_address)?;
    info!(
        "resolving against account contract {:#x} via {}",
        settings.account_did_address, settings.rpc_url
    );

    let resolver = DocumentResolver::new(Arc::new(account));
    ApiServer::new(resolver)
        .run(settings.listen_addr)
        .await
        .context("serving http")?;
    Ok(())
}
