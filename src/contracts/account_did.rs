// src/contracts/account_did.rs
//! Account-DID registry contract: the read side of the ledger.
//!
//! Implements [`LedgerQuery`] with view calls against the registry contract and
//! `eth_getLogs` queries over its "added" events. Events index the subject DID
//! as `keccak256(did)`, so the subject of every decoded event is the queried
//! one.

use crate::blockchain::evm_client::EvmClient;
use crate::error::LedgerError;
use crate::ledger::{AddedEvent, LedgerQuery, MethodRecord};
use crate::models::document::RelationshipKind;
use async_trait::async_trait;
use ethers::abi::parse_abi;
use ethers::types::{Bytes, Filter, Log, H256, U256};
use ethers::utils::keccak256;
use ethers_contract::BaseContract;
use std::sync::Arc;

const ACCOUNT_DID_ABI: &[&str] = &[
    "function isDeactivated(string did) view returns (bool)",
    "function getVeriLen(string did) view returns (uint256)",
    "function getVeri(string did, uint256 index) view returns ((string,string,bytes,bool))",
    "function isController(string did, string controller) view returns (bool)",
    "function inAuth(string did, string publicKey) view returns (bool)",
    "function inAssertion(string did, string publicKey) view returns (bool)",
    "function inDelegation(string did, string publicKey) view returns (uint256)",
    "function inRecovery(string did, string publicKey) view returns (bool)",
    "event AddController(string indexed did, string controller)",
    "event AddAuth(string indexed did, string publicKey)",
    "event AddAssertion(string indexed did, string publicKey)",
    "event AddDelegation(string indexed did, string publicKey, uint256 expireTime)",
    "event AddRecovery(string indexed did, string publicKey)",
];

/// Event carrying grants of `kind`, with its canonical signature.
fn event_for(kind: RelationshipKind) -> (&'static str, &'static str) {
    match kind {
        RelationshipKind::Authentication => ("AddAuth", "AddAuth(string,string)"),
        RelationshipKind::AssertionMethod => ("AddAssertion", "AddAssertion(string,string)"),
        RelationshipKind::CapabilityDelegation => {
            ("AddDelegation", "AddDelegation(string,string,uint256)")
        }
        RelationshipKind::Recovery => ("AddRecovery", "AddRecovery(string,string)"),
    }
}

pub(crate) fn account_did_abi() -> Result<BaseContract, LedgerError> {
    parse_abi(ACCOUNT_DID_ABI)
        .map(BaseContract::from)
        .map_err(|e| LedgerError::AbiDefinition(e.to_string()))
}

/// Clamps an on-chain uint256 timestamp into unix seconds.
fn to_unix_seconds(value: U256) -> i64 {
    if value > U256::from(i64::MAX as u64) {
        i64::MAX
    } else {
        value.low_u64() as i64
    }
}

/// Maps a `getVeri` tuple. Every slot below `getVeriLen` is a record, even one
/// whose fields were all updated to empty values.
fn to_method_record(
    (method_type, controller, public_key, deactivated): (String, String, Bytes, bool),
) -> MethodRecord {
    MethodRecord {
        method_type,
        controller,
        public_key: public_key.to_vec(),
        deactivated,
    }
}

/// Read binding of the account-DID contract.
#[derive(Clone)]
pub struct AccountDid {
    client: Arc<EvmClient>,
    address: ethers::types::Address,
    abi: BaseContract,
}

impl AccountDid {
    /// Binds the contract deployed at `address`.
    pub fn new(client: Arc<EvmClient>, address: ethers::types::Address) -> Result<Self, LedgerError> {
        Ok(Self { client, address, abi: account_did_abi()? })
    }

    async fn call<R, T>(&self, method: &str, params: T) -> Result<R, LedgerError>
    where
        R: ethers::abi::Detokenize,
        T: ethers::abi::Tokenize,
    {
        self.client
            .query_contract(self.address, &self.abi, method, params)
            .await
    }

    async fn events(&self, id: &str, signature: &str) -> Result<Vec<Log>, LedgerError> {
        let filter = Filter::new()
            .address(self.address)
            .event(signature)
            .topic1(H256::from(keccak256(id.as_bytes())))
            .from_block(0u64);
        self.client.logs(&filter).await
    }

    /// Decodes the non-indexed `related` field of a grant event.
    fn decode_added(&self, name: &str, id: &str, log: Log) -> Result<AddedEvent, LedgerError> {
        let related = if name == "AddDelegation" {
            let (_, related, _): (H256, String, U256) =
                self.abi.decode_event(name, log.topics, log.data)?;
            related
        } else {
            let (_, related): (H256, String) = self.abi.decode_event(name, log.topics, log.data)?;
            related
        };
        Ok(AddedEvent { subject: id.to_string(), related })
    }
}

#[async_trait]
impl LedgerQuery for AccountDid {
    async fn is_deactivated(&self, id: &str) -> Result<bool, LedgerError> {
        self.call("isDeactivated", id.to_string()).await
    }

    async fn method_count(&self, id: &str) -> Result<u64, LedgerError> {
        let count: U256 = self.call("getVeriLen", id.to_string()).await?;
        Ok(count.low_u64())
    }

    async fn method_at(&self, id: &str, index: u64) -> Result<Option<MethodRecord>, LedgerError> {
        // getVeri reverts past the end, so slots are bounded by getVeriLen first
        if index >= self.method_count(id).await? {
            return Ok(None);
        }
        let raw: (String, String, Bytes, bool) = self
            .call("getVeri", (id.to_string(), U256::from(index)))
            .await?;
        Ok(Some(to_method_record(raw)))
    }

    async fn is_controller(&self, id: &str, candidate: &str) -> Result<bool, LedgerError> {
        self.call("isController", (id.to_string(), candidate.to_string()))
            .await
    }

    async fn controller_events(&self, id: &str) -> Result<Vec<AddedEvent>, LedgerError> {
        self.events(id, "AddController(string,string)")
            .await?
            .into_iter()
            .map(|log| self.decode_added("AddController", id, log))
            .collect()
    }

    async fn relationship_events(
        &self,
        id: &str,
        kind: RelationshipKind,
    ) -> Result<Vec<AddedEvent>, LedgerError> {
        let (name, signature) = event_for(kind);
        self.events(id, signature)
            .await?
            .into_iter()
            .map(|log| self.decode_added(name, id, log))
            .collect()
    }

    async fn in_authentication(&self, id: &str, url: &str) -> Result<bool, LedgerError> {
        self.call("inAuth", (id.to_string(), url.to_string())).await
    }

    async fn in_assertion(&self, id: &str, url: &str) -> Result<bool, LedgerError> {
        self.call("inAssertion", (id.to_string(), url.to_string())).await
    }

    async fn delegation_expiry(&self, id: &str, url: &str) -> Result<i64, LedgerError> {
        let expiry: U256 = self
            .call("inDelegation", (id.to_string(), url.to_string()))
            .await?;
        Ok(to_unix_seconds(expiry))
    }

    async fn in_recovery(&self, id: &str, url: &str) -> Result<bool, LedgerError> {
        self.call("inRecovery", (id.to_string(), url.to_string())).await
    }
}
