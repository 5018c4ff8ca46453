// src/contracts/did_proxy.rs
//! DID proxy contract: the write side of the ledger.
//!
//! Maps each [`LedgerCall`] onto the proxy method that performs it and submits
//! it as a signed legacy transaction. Receipts are looked up through the same
//! client.

use crate::blockchain::evm_client::EvmClient;
use crate::error::LedgerError;
use crate::ledger::{LedgerCall, LedgerMutation, Receipt, TxHash};
use crate::models::did::Identifier;
use crate::models::document::{Relationship, RelationshipKind};
use async_trait::async_trait;
use ethers::abi::{parse_abi, Token};
use ethers::types::{Address, U256};
use ethers_contract::BaseContract;
use log::debug;
use std::sync::Arc;

const DID_PROXY_ABI: &[&str] = &[
    "function createDID(string did, string methodType, bytes pubKeyData)",
    "function addController(string did, string caller, string controller)",
    "function removeController(string did, string caller, string controller)",
    "function addVeri(string did, string caller, tuple(string,string,bytes,bool) publicKey)",
    "function updateVeri(string did, uint256 index, string methodType, bytes pubKeyData)",
    "function deactivateVeri(string did, string caller, uint256 index, bool deactivate)",
    "function addAuth(string did, string caller, string publicKey)",
    "function addAssertion(string did, string caller, string publicKey)",
    "function addDelegation(string did, string caller, string publicKey, uint256 expireTime)",
    "function addRecovery(string did, string caller, string publicKey)",
    "function removeAuth(string did, string caller, string publicKey)",
    "function removeAssertion(string did, string caller, string publicKey)",
    "function removeDelegation(string did, string caller, string publicKey)",
    "function removeRecovery(string did, string caller, string publicKey)",
    "function deactivateDID(string did, string caller, bool deactivate)",
];

pub(crate) fn did_proxy_abi() -> Result<BaseContract, LedgerError> {
    parse_abi(DID_PROXY_ABI)
        .map(BaseContract::from)
        .map_err(|e| LedgerError::AbiDefinition(e.to_string()))
}

fn string(s: String) -> Token {
    Token::String(s)
}

/// Proxy method name and arguments performing `call`.
///
/// Negative delegation expiries are sent as zero, which the contract stores as
/// already expired.
pub(crate) fn encode_call(call: LedgerCall) -> (&'static str, Vec<Token>) {
    match call {
        LedgerCall::CreateDid { did, method_type, public_key } => (
            "createDID",
            vec![string(did), string(method_type), Token::Bytes(public_key)],
        ),
        LedgerCall::AddController { did, caller, controller } => (
            "addController",
            vec![string(did), string(caller), string(controller)],
        ),
        LedgerCall::RemoveController { did, caller, controller } => (
            "removeController",
            vec![string(did), string(caller), string(controller)],
        ),
        LedgerCall::AddMethod { did, caller, method } => {
            let record = Token::Tuple(vec![
                string(method.method_type),
                string(method.controller),
                Token::Bytes(method.public_key),
                Token::Bool(false),
            ]);
            ("addVeri", vec![string(did), string(caller), record])
        }
        // updateVeri authenticates by transaction sender only
        LedgerCall::UpdateMethod { did, index, method_type, public_key, .. } => (
            "updateVeri",
            vec![
                string(did),
                Token::Uint(U256::from(index)),
                string(method_type),
                Token::Bytes(public_key),
            ],
        ),
        LedgerCall::DeactivateMethod { did, caller, index } => (
            "deactivateVeri",
            vec![string(did), string(caller), Token::Uint(U256::from(index)), Token::Bool(true)],
        ),
        LedgerCall::AddRelationship { did, caller, relationship, url } => {
            let mut args = vec![string(did), string(caller), string(url)];
            let method = match relationship {
                Relationship::Authentication => "addAuth",
                Relationship::AssertionMethod => "addAssertion",
                Relationship::CapabilityDelegation { expires_at } => {
                    args.push(Token::Uint(U256::from(expires_at.max(0) as u64)));
                    "addDelegation"
                }
                Relationship::Recovery => "addRecovery",
            };
            (method, args)
        }
        LedgerCall::RemoveRelationship { did, caller, kind, url } => {
            let method = match kind {
                RelationshipKind::Authentication => "removeAuth",
                RelationshipKind::AssertionMethod => "removeAssertion",
                RelationshipKind::CapabilityDelegation => "removeDelegation",
                RelationshipKind::Recovery => "removeRecovery",
            };
            (method, vec![string(did), string(caller), string(url)])
        }
        LedgerCall::DeactivateDid { did, caller } => (
            "deactivateDID",
            vec![string(did), string(caller), Token::Bool(true)],
        ),
    }
}

/// Write binding of the DID proxy contract.
#[derive(Clone)]
pub struct DidProxy {
    client: Arc<EvmClient>,
    address: Address,
    abi: BaseContract,
}

impl DidProxy {
    /// Binds the proxy deployed at `address`. `client` needs a signer for
    /// [`LedgerMutation::submit`] and [`DidProxy::fresh_identifier`].
    pub fn new(client: Arc<EvmClient>, address: Address) -> Result<Self, LedgerError> {
        Ok(Self { client, address, abi: did_proxy_abi()? })
    }

    /// Derives a not-yet-registered identifier from the signer address and
    /// its pending nonce.
    ///
    /// # Errors
    /// `NoSigner` without a key, `Transport` if the nonce lookup fails.
    pub async fn fresh_identifier(&self) -> Result<Identifier, LedgerError> {
        let address = self.client.signer_address()?;
        let nonce = self.client.pending_nonce().await?;
        Ok(Identifier::derive(&address, nonce))
    }
}

#[async_trait]
impl LedgerMutation for DidProxy {
    async fn submit(&self, call: LedgerCall) -> Result<TxHash, LedgerError> {
        let (method, args) = encode_call(call);
        debug!("submitting {} to proxy {:#x}", method, self.address);
        self.client
            .send_transaction(self.address, &self.abi, method, args.as_slice())
            .await
    }

    async fn receipt(&self, tx: TxHash) -> Result<Option<Receipt>, LedgerError> {
        self.client.receipt(tx).await
    }
}
