// src/ledger/mod.rs
//! Ports to the identity registry ledger.
//!
//! The resolver reads through [`LedgerQuery`]; the controller writes through
//! [`LedgerMutation`]. Implementations bind these to a concrete chain (see
//! `contracts`) and must surface every failure as a [`LedgerError`] without
//! local recovery. Identifiers are passed as the bare 64-hex id.

#[cfg(test)]
pub(crate) mod memory;

use crate::error::LedgerError;
use crate::models::document::{Relationship, RelationshipKind};
use async_trait::async_trait;
use ethers::types::H256;

/// Handle of a submitted transaction.
pub type TxHash = H256;

/// A verification-method record as stored by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRecord {
    pub method_type: String,
    /// Bare hex id of the controlling identity; empty when none was recorded.
    pub controller: String,
    pub public_key: Vec<u8>,
    pub deactivated: bool,
}

/// One historical "added" event for a subject DID.
///
/// `related` is the controller's bare hex id for controller grants and the
/// DID URL string for relationship grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedEvent {
    pub subject: String,
    pub related: String,
}

/// Point-in-time and historical reads against the identity registry.
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    async fn is_deactivated(&self, id: &str) -> Result<bool, LedgerError>;

    /// Number of verification-method slots ever assigned, tombstones included.
    async fn method_count(&self, id: &str) -> Result<u64, LedgerError>;

    async fn method_at(&self, id: &str, index: u64) -> Result<Option<MethodRecord>, LedgerError>;

    async fn is_controller(&self, id: &str, candidate: &str) -> Result<bool, LedgerError>;

    /// Controller grants for `id`, in ledger order.
    async fn controller_events(&self, id: &str) -> Result<Vec<AddedEvent>, LedgerError>;

    /// Grants of relationship `kind` for `id`, in ledger order.
    async fn relationship_events(
        &self,
        id: &str,
        kind: RelationshipKind,
    ) -> Result<Vec<AddedEvent>, LedgerError>;

    async fn in_authentication(&self, id: &str, url: &str) -> Result<bool, LedgerError>;

    async fn in_assertion(&self, id: &str, url: &str) -> Result<bool, LedgerError>;

    /// Expiry of a delegation entry in unix seconds, zero when absent.
    async fn delegation_expiry(&self, id: &str, url: &str) -> Result<i64, LedgerError>;

    async fn in_recovery(&self, id: &str, url: &str) -> Result<bool, LedgerError>;
}

/// New verification method payload for [`LedgerCall::AddMethod`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMethod {
    pub method_type: String,
    /// Bare hex id of the controlling identity
    pub controller: String,
    pub public_key: Vec<u8>,
}

/// A state-changing registry call. `caller` is the bare hex id of the
/// identity the call is authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    CreateDid {
        did: String,
        method_type: String,
        public_key: Vec<u8>,
    },
    AddController {
        did: String,
        caller: String,
        controller: String,
    },
    RemoveController {
        did: String,
        caller: String,
        controller: String,
    },
    AddMethod {
        did: String,
        caller: String,
        method: NewMethod,
    },
    UpdateMethod {
        did: String,
        caller: String,
        index: u64,
        method_type: String,
        public_key: Vec<u8>,
    },
    DeactivateMethod {
        did: String,
        caller: String,
        index: u64,
    },
    AddRelationship {
        did: String,
        caller: String,
        relationship: Relationship,
        url: String,
    },
    RemoveRelationship {
        did: String,
        caller: String,
        kind: RelationshipKind,
        url: String,
    },
    DeactivateDid {
        did: String,
        caller: String,
    },
}

impl LedgerCall {
    /// Subject DID (bare hex) the call acts on.
    pub fn target(&self) -> &str {
        match self {
            LedgerCall::CreateDid { did, .. }
            | LedgerCall::AddController { did, .. }
            | LedgerCall::RemoveController { did, .. }
            | LedgerCall::AddMethod { did, .. }
            | LedgerCall::UpdateMethod { did, .. }
            | LedgerCall::DeactivateMethod { did, .. }
            | LedgerCall::AddRelationship { did, .. }
            | LedgerCall::RemoveRelationship { did, .. }
            | LedgerCall::DeactivateDid { did, .. } => did,
        }
    }
}

/// Mined-transaction receipt, reduced to what confirmation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub success: bool,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
}

/// Submission of signed registry calls and receipt lookup.
#[async_trait]
pub trait LedgerMutation: Send + Sync {
    /// Signs and broadcasts `call`, returning the pending transaction hash.
    async fn submit(&self, call: LedgerCall) -> Result<TxHash, LedgerError>;

    /// Receipt of `tx`, `None` while it has not been mined.
    async fn receipt(&self, tx: TxHash) -> Result<Option<Receipt>, LedgerError>;
}
