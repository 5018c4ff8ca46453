// src/blockchain/evm_client.rs
//! EVM JSON-RPC client.
//!
//! Thin layer over an `ethers` HTTP provider used by the contract bindings:
//! read-only contract calls, signed legacy transactions, receipt lookup and
//! event log queries. Every failure is reported as a [`LedgerError`]; nothing
//! is retried here.

use crate::error::LedgerError;
use crate::ledger::{Receipt, TxHash};
use crate::wallet::key_management::KeyManager;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::LocalWallet;
use ethers_contract::{BaseContract, Contract};
use ethers_core::abi::{Detokenize, Tokenize};
use ethers_core::types::{Address, BlockNumber, Filter, Log, TransactionReceipt, U256, U64};
use log::{debug, warn};
use std::sync::Arc;

type SignerClient = SignerMiddleware<Arc<Provider<Http>>, LocalWallet>;

/// Default gas limit for registry mutations, in gas units.
pub const DEFAULT_GAS_LIMIT: u64 = 300_000;
/// Default legacy gas price, in wei.
pub const DEFAULT_GAS_PRICE: u64 = 1_000;

/// EVM client with an optional transaction signer.
///
/// Without a signer only queries work; [`EvmClient::send_transaction`] then
/// fails with [`LedgerError::NoSigner`].
#[derive(Clone)]
pub struct EvmClient {
    /// JSON-RPC provider
    provider: Arc<Provider<Http>>,
    /// Signing middleware, present once a key is attached
    signer: Option<Arc<SignerClient>>,
    gas_limit: U256,
    gas_price: U256,
}

impl EvmClient {
    /// Creates a read-only client.
    ///
    /// # Arguments
    /// * `rpc_url` - JSON-RPC endpoint URL
    ///
    /// # Errors
    /// Returns `LedgerError::Transport` if the URL cannot be parsed. No
    /// connection is made until the first request.
    pub fn new(rpc_url: &str) -> Result<Self, LedgerError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| LedgerError::Transport(format!("invalid rpc url {}: {}", rpc_url, e)))?;
        Ok(Self {
            provider: Arc::new(provider),
            signer: None,
            gas_limit: U256::from(DEFAULT_GAS_LIMIT),
            gas_price: U256::from(DEFAULT_GAS_PRICE),
        })
    }

    /// Attaches a signing key.
    ///
    /// The chain id is asked from the node; if that fails `chain_id_fallback`
    /// is used instead.
    pub async fn with_signer(mut self, key: &KeyManager, chain_id_fallback: u64) -> Self {
        let chain_id = match self.provider.get_chainid().await {
            Ok(id) => id.low_u64(),
            Err(e) => {
                warn!("chain id lookup failed ({}), using fallback {}", e, chain_id_fallback);
                chain_id_fallback
            }
        };
        let middleware = SignerMiddleware::new(Arc::clone(&self.provider), key.wallet(chain_id));
        self.signer = Some(Arc::new(middleware));
        self
    }

    /// Overrides the gas limit and legacy gas price of sent transactions.
    pub fn with_gas(mut self, gas_limit: u64, gas_price: u64) -> Self {
        self.gas_limit = U256::from(gas_limit);
        self.gas_price = U256::from(gas_price);
        self
    }

    /// Address of the attached signer.
    pub fn signer_address(&self) -> Result<Address, LedgerError> {
        self.signer
            .as_ref()
            .map(|s| s.address())
            .ok_or(LedgerError::NoSigner)
    }

    /// Pending-state nonce of the attached signer.
    pub async fn pending_nonce(&self) -> Result<u64, LedgerError> {
        let address = self.signer_address()?;
        self.provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map(|n| n.low_u64())
            .map_err(|e| LedgerError::Transport(e.to_string()))
    }

    /// Sends a signed legacy transaction calling `method` on a contract.
    ///
    /// # Arguments
    /// * `contract_address` - Address of the target contract
    /// * `abi` - Contract interface
    /// * `method` - Method name to call
    /// * `params` - Method parameters
    ///
    /// # Returns
    /// Hash of the broadcast transaction. Mining is not awaited.
    ///
    /// # Errors
    /// - `NoSigner` if no key is attached
    /// - `Abi` if the parameters do not match the method
    /// - `Contract` if signing or broadcasting fails
    pub async fn send_transaction(
        &self,
        contract_address: Address,
        abi: &BaseContract,
        method: &str,
        params: impl Tokenize,
    ) -> Result<TxHash, LedgerError> {
        let signer = self.signer.as_ref().ok_or(LedgerError::NoSigner)?;
        let contract = Contract::new(contract_address, abi.clone(), Arc::clone(signer));

        let call = contract
            .method::<_, TxHash>(method, params)?
            .legacy()
            .gas(self.gas_limit)
            .gas_price(self.gas_price);
        let pending = call.send().await.map_err(|e| LedgerError::Contract {
            method: method.to_string(),
            reason: e.to_string(),
        })?;
        debug!("{}: broadcast {:#x}", method, pending.tx_hash());
        Ok(pending.tx_hash())
    }

    /// Calls a view method (no transaction).
    ///
    /// # Errors
    /// - `Abi` if the parameters do not match the method
    /// - `Contract` if the call fails or its result cannot be decoded as `R`
    pub async fn query_contract<R: Detokenize>(
        &self,
        contract_address: Address,
        abi: &BaseContract,
        method: &str,
        params: impl Tokenize,
    ) -> Result<R, LedgerError> {
        let contract = Contract::new(contract_address, abi.clone(), Arc::clone(&self.provider));
        contract
            .method::<_, R>(method, params)?
            .call()
            .await
            .map_err(|e| LedgerError::Contract {
                method: method.to_string(),
                reason: e.to_string(),
            })
    }

    /// Receipt of `tx`, `None` while it is pending or unknown.
    pub async fn receipt(&self, tx: TxHash) -> Result<Option<Receipt>, LedgerError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx)
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(receipt.as_ref().map(to_receipt))
    }

    /// Event logs matching `filter`, in chain order.
    pub async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, LedgerError> {
        self.provider
            .get_logs(filter)
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))
    }
}

/// Reduces a node receipt to what confirmation needs. A missing status
/// (pre-Byzantium) counts as failure.
pub(crate) fn to_receipt(receipt: &TransactionReceipt) -> Receipt {
    Receipt {
        success: receipt.status == Some(U64::one()),
        gas_used: receipt.gas_used.unwrap_or_default().low_u64(),
        cumulative_gas_used: receipt.cumulative_gas_used.low_u64(),
    }
}
