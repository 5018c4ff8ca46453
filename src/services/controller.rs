// src/services/controller.rs
//! Identity mutation orchestration.
//!
//! Every operation follows the same shape: build a typed [`LedgerCall`],
//! submit it authenticated as this controller's own identity, then block on
//! the [`TransactionConfirmer`] until the ledger reports an outcome.
//!
//! Authorization is never checked here. The registry contract decides, and a
//! refusal surfaces as [`MutationError::Rejected`].

use crate::blockchain::evm_client::EvmClient;
use crate::config::Settings;
use crate::contracts::did_proxy::DidProxy;
use crate::error::{ConfigError, MutationError};
use crate::ledger::{LedgerCall, LedgerMutation, NewMethod};
use crate::models::did::{Identifier, IdentifierUrl};
use crate::models::document::{Relationship, RelationshipKind};
use crate::services::confirmer::TransactionConfirmer;
use crate::wallet::key_management::KeyManager;
use log::info;
use std::sync::Arc;

/// Submits registry mutations on behalf of one identity.
pub struct IdentityController<M: ?Sized> {
    /// Identity the submitted calls are authenticated as
    did: Identifier,
    ledger: Arc<M>,
    confirmer: TransactionConfirmer,
}

impl IdentityController<DidProxy> {
    /// Binds the configured proxy contract and acts as the identity the
    /// client's signer registers next.
    ///
    /// # Arguments
    /// * `settings` - Source of the proxy address and confirmation policy
    /// * `client` - Chain client with a signer attached
    ///
    /// # Errors
    /// - An invalid confirmation policy
    /// - `ConfigError::Ledger` without a signer, or if the nonce lookup fails
    pub async fn from_settings(settings: &Settings, client: Arc<EvmClient>) -> Result<Self, ConfigError> {
        let confirmer = TransactionConfirmer::new(settings.confirm_policy()?);
        let proxy = DidProxy::new(client, settings.proxy_address)?;
        let did = proxy.fresh_identifier().await?;
        info!("controller for {} bound to proxy {:#x}", did, settings.proxy_address);
        Ok(Self::new(did, Arc::new(proxy), confirmer))
    }
}

impl<M> IdentityController<M>
where
    M: LedgerMutation + ?Sized,
{
    /// Creates a controller acting as `did`.
    ///
    /// # Arguments
    /// * `did` - Identity whose key signs the submitted calls
    /// * `ledger` - Mutation port bound to that key
    /// * `confirmer` - Receipt polling policy
    pub fn new(did: Identifier, ledger: Arc<M>, confirmer: TransactionConfirmer) -> Self {
        Self { did, ledger, confirmer }
    }

    pub fn did(&self) -> &Identifier {
        &self.did
    }

    fn caller(&self) -> String {
        self.did.identifier().to_string()
    }

    async fn execute(&self, operation: &'static str, call: LedgerCall) -> Result<(), MutationError> {
        let target = call.target().to_string();
        let tx = self
            .ledger
            .submit(call)
            .await
            .map_err(|source| MutationError::Submit { operation, target: target.clone(), source })?;
        info!("{}: submitted transaction({:#x}) for did:memo:{}", operation, tx, target);

        self.confirmer.confirm(self.ledger.as_ref(), tx, operation).await
    }

    /// Registers this controller's own identity with its master key at slot 0.
    ///
    /// # Arguments
    /// * `method_type` - Verification method type of the master key
    /// * `public_key` - Master key material
    pub async fn register(&self, method_type: &str, public_key: &[u8]) -> Result<(), MutationError> {
        let call = LedgerCall::CreateDid {
            did: self.caller(),
            method_type: method_type.to_string(),
            public_key: public_key.to_vec(),
        };
        self.execute("RegisterDID", call).await
    }

    /// Registers this controller's own identity with `key` as its master key.
    pub async fn register_with_key(&self, key: &KeyManager) -> Result<(), MutationError> {
        self.register(key.method_type(), &key.public_key()).await
    }

    /// Authorizes `controller` to fully control `did`.
    pub async fn add_controller(
        &self,
        did: &Identifier,
        controller: &Identifier,
    ) -> Result<(), MutationError> {
        let call = LedgerCall::AddController {
            did: did.identifier().to_string(),
            caller: self.caller(),
            controller: controller.identifier().to_string(),
        };
        self.execute("AddController", call).await
    }

    pub async fn remove_controller(
        &self,
        did: &Identifier,
        controller: &Identifier,
    ) -> Result<(), MutationError> {
        let call = LedgerCall::RemoveController {
            did: did.identifier().to_string(),
            caller: self.caller(),
            controller: controller.identifier().to_string(),
        };
        self.execute("RemoveController", call).await
    }

    /// Appends a verification method to `did`; the ledger assigns the next slot.
    pub async fn add_verification_method(
        &self,
        did: &Identifier,
        method_type: &str,
        controller: &Identifier,
        public_key: &[u8],
    ) -> Result<(), MutationError> {
        let call = LedgerCall::AddMethod {
            did: did.identifier().to_string(),
            caller: self.caller(),
            method: NewMethod {
                method_type: method_type.to_string(),
                controller: controller.identifier().to_string(),
                public_key: public_key.to_vec(),
            },
        };
        self.execute("AddVerificationMethod", call).await
    }

    /// Replaces type and key material of the method at `url`'s slot.
    pub async fn update_verification_method(
        &self,
        url: &IdentifierUrl,
        method_type: &str,
        public_key: &[u8],
    ) -> Result<(), MutationError> {
        let call = LedgerCall::UpdateMethod {
            did: url.did().identifier().to_string(),
            caller: self.caller(),
            index: url.slot_index(),
            method_type: method_type.to_string(),
            public_key: public_key.to_vec(),
        };
        self.execute("UpdateVerificationMethod", call).await
    }

    /// Tombstones the method at `url`'s slot. The slot is never reused.
    pub async fn deactivate_verification_method(&self, url: &IdentifierUrl) -> Result<(), MutationError> {
        let call = LedgerCall::DeactivateMethod {
            did: url.did().identifier().to_string(),
            caller: self.caller(),
            index: url.slot_index(),
        };
        self.execute("DeactivateVerificationMethod", call).await
    }

    /// Grants `url` a relationship on `did`.
    ///
    /// A capability delegation's expiry is forwarded verbatim, even when it is
    /// already in the past; resolution is what filters expired entries.
    pub async fn add_relationship(
        &self,
        did: &Identifier,
        relationship: Relationship,
        url: &IdentifierUrl,
    ) -> Result<(), MutationError> {
        let call = LedgerCall::AddRelationship {
            did: did.identifier().to_string(),
            caller: self.caller(),
            relationship,
            url: url.to_string(),
        };
        self.execute("AddRelationShip", call).await
    }

    pub async fn deactivate_relationship(
        &self,
        did: &Identifier,
        kind: RelationshipKind,
        url: &IdentifierUrl,
    ) -> Result<(), MutationError> {
        let call = LedgerCall::RemoveRelationship {
            did: did.identifier().to_string(),
            caller: self.caller(),
            kind,
            url: url.to_string(),
        };
        self.execute("DeactivateRelationShip", call).await
    }

    /// Deactivates `did`. This is irreversible.
    pub async fn deactivate(&self, did: &Identifier) -> Result<(), MutationError> {
        let call = LedgerCall::DeactivateDid {
            did: did.identifier().to_string(),
            caller: self.caller(),
        };
        self.execute("DeactivateDID", call).await
    }
}
