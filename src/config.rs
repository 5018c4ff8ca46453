// src/config.rs
//! Runtime settings.
//!
//! Built-in defaults overlaid by `MEMO_DID_*` environment variables, e.g.
//! `MEMO_DID_RPC_URL` or `MEMO_DID_PRIVATE_KEY`. A `.env` file is honoured
//! when the binary loads it before calling [`Settings::load`].

use crate::blockchain::evm_client::{DEFAULT_GAS_LIMIT, DEFAULT_GAS_PRICE};
use crate::error::ConfigError;
use crate::services::confirmer::ConfirmPolicy;
use crate::wallet::key_management::KeyManager;
use config::{Config, Environment, Source};
use ethers::types::Address;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

pub const ENV_PREFIX: &str = "MEMO_DID";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// JSON-RPC endpoint of the chain hosting the registry
    pub rpc_url: String,
    /// Account-DID contract, queried for resolution
    pub account_did_address: Address,
    /// Proxy contract receiving mutations
    pub proxy_address: Address,
    /// Hex signing key; resolution works without one
    pub private_key: Option<String>,
    /// Chain id used when the node cannot be asked
    pub chain_id_fallback: u64,
    pub gas_limit: u64,
    pub gas_price: u64,
    pub confirm_initial_wait_secs: u64,
    pub block_period_secs: u64,
    pub max_confirm_attempts: u32,
    /// Bind address of the HTTP resolver
    pub listen_addr: SocketAddr,
    /// Register a fresh identity for the signing key before serving
    pub register_on_start: bool,
}

impl Settings {
    /// Loads defaults overlaid by the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Loads defaults overlaid by `overrides`.
    pub fn from_source<S>(overrides: S) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        let settings = Config::builder()
            .set_default("rpc_url", "http://127.0.0.1:8545")?
            .set_default("account_did_address", format!("{:#x}", Address::zero()))?
            .set_default("proxy_address", format!("{:#x}", Address::zero()))?
            .set_default("chain_id_fallback", 666_i64)?
            .set_default("gas_limit", DEFAULT_GAS_LIMIT as i64)?
            .set_default("gas_price", DEFAULT_GAS_PRICE as i64)?
            .set_default("confirm_initial_wait_secs", 6_i64)?
            .set_default("block_period_secs", 5_i64)?
            .set_default("max_confirm_attempts", 10_i64)?
            .set_default("listen_addr", "127.0.0.1:3000")?
            .set_default("register_on_start", false)?
            .add_source(overrides)
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Validated receipt polling policy.
    pub fn confirm_policy(&self) -> Result<ConfirmPolicy, ConfigError> {
        ConfirmPolicy::new(
            Duration::from_secs(self.confirm_initial_wait_secs),
            Duration::from_secs(self.block_period_secs),
            self.max_confirm_attempts,
        )
    }

    /// Signing key, if one is configured. A blank value counts as none.
    pub fn key_manager(&self) -> Result<Option<KeyManager>, ConfigError> {
        match self.private_key.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(key) => KeyManager::from_hex(key).map(Some),
        }
    }
}
