// src/services/resolver.rs
//! DID Document resolution.
//!
//! The registry's event log is append-only and never records removals in a
//! form usable as a membership list. Every list in the document is therefore
//! rebuilt in two steps:
//!
//! 1. **enumerate** the historical "added" events for the subject, and
//! 2. **filter** each candidate through a fresh point-in-time check
//!    (membership, expiry, method not deactivated).
//!
//! Nothing is cached: every call re-reads the ledger.

use crate::error::{LedgerError, ResolveError};
use crate::ledger::{AddedEvent, LedgerQuery, MethodRecord};
use crate::models::did::{Identifier, IdentifierUrl};
use crate::models::document::{Document, RelationshipKind, VerificationMethod, DEFAULT_CONTEXT};
use log::debug;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Source of "now" in unix seconds, used for delegation expiry.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp())
}

fn query_failed(
    operation: &'static str,
    target: &dyn fmt::Display,
) -> impl FnOnce(LedgerError) -> ResolveError {
    let target = target.to_string();
    move |source| ResolveError::Ledger { operation, target, source }
}

/// Controller candidates from controller-added events, first occurrence wins.
///
/// # Errors
/// An event whose controller is not a valid identifier is reported as
/// [`ResolveError::MalformedEvent`].
pub fn controller_candidates(
    subject: &Identifier,
    events: &[AddedEvent],
) -> Result<Vec<Identifier>, ResolveError> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for event in events {
        // controllers are stored as bare ids since only did:memo is supported
        let controller = Identifier::from_hex(&event.related).map_err(|source| {
            ResolveError::MalformedEvent {
                operation: "QueryController",
                target: subject.to_string(),
                source,
            }
        })?;
        if seen.insert(controller.clone()) {
            candidates.push(controller);
        }
    }
    Ok(candidates)
}

/// Relationship candidates from added events of one kind, first occurrence wins.
pub fn relationship_candidates(
    subject: &Identifier,
    kind: RelationshipKind,
    events: &[AddedEvent],
) -> Result<Vec<IdentifierUrl>, ResolveError> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for event in events {
        let url = IdentifierUrl::parse(&event.related).map_err(|source| {
            ResolveError::MalformedEvent {
                operation: relationship_operation(kind),
                target: subject.to_string(),
                source,
            }
        })?;
        if seen.insert(url.clone()) {
            candidates.push(url);
        }
    }
    Ok(candidates)
}

/// A permanent grant is active while it is in its set and the referenced
/// method exists and is not deactivated.
pub fn grant_active(in_set: bool, method: Option<&MethodRecord>) -> bool {
    in_set && method.map_or(false, |m| !m.deactivated)
}

/// A delegation is active until its expiry (inclusive), under the same method
/// rule as [`grant_active`]. An absent entry has expiry zero.
pub fn delegation_active(expiry: i64, now: i64, method: Option<&MethodRecord>) -> bool {
    expiry >= now && method.map_or(false, |m| !m.deactivated)
}

/// Maps the ledger record at `index` to a document entry.
pub fn to_verification_method(
    did: &Identifier,
    index: u64,
    record: MethodRecord,
) -> Result<VerificationMethod, ResolveError> {
    let controller = if record.controller.is_empty() {
        Identifier::zero()
    } else {
        Identifier::from_hex(&record.controller).map_err(|source| ResolveError::MalformedEvent {
            operation: "VerificationMethodAt",
            target: did.url(index).to_string(),
            source,
        })?
    };
    Ok(VerificationMethod {
        id: did.url(index),
        controller,
        method_type: record.method_type,
        public_key: record.public_key,
    })
}

fn relationship_operation(kind: RelationshipKind) -> &'static str {
    match kind {
        RelationshipKind::Authentication => "QueryAuthentication",
        RelationshipKind::AssertionMethod => "QueryAssertion",
        RelationshipKind::CapabilityDelegation => "QueryDelegation",
        RelationshipKind::Recovery => "QueryRecovery",
    }
}

/// Assembles DID Documents from ledger reads.
pub struct DocumentResolver<Q: ?Sized> {
    ledger: Arc<Q>,
    clock: Clock,
}

impl<Q: ?Sized> Clone for DocumentResolver<Q> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<Q> DocumentResolver<Q>
where
    Q: LedgerQuery + ?Sized,
{
    /// Creates a resolver evaluating expiry against the system clock.
    pub fn new(ledger: Arc<Q>) -> Self {
        Self { ledger, clock: system_clock() }
    }

    /// Replaces the clock used for delegation expiry.
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Resolves `did_string` to a fresh document snapshot.
    ///
    /// # Returns
    /// The empty document if the identity is deactivated.
    ///
    /// # Errors
    /// - [`ResolveError::Parse`] for a malformed DID
    /// - [`ResolveError::Ledger`] if any read fails; no partial document is returned
    /// - [`ResolveError::MalformedEvent`] if the ledger history holds an invalid identifier
    pub async fn resolve(&self, did_string: &str) -> Result<Document, ResolveError> {
        let did = Identifier::parse(did_string)?;

        let deactivated = self
            .ledger
            .is_deactivated(did.identifier())
            .await
            .map_err(query_failed("IsDeactivated", &did))?;
        if deactivated {
            debug!("{} is deactivated", did);
            return Ok(Document::default());
        }

        let now = (self.clock)();
        let (
            controllers,
            verification_methods,
            authentication,
            assertion_method,
            capability_delegation,
            recovery,
        ) = futures::try_join!(
            self.controllers(&did),
            self.verification_methods(&did),
            self.relationship(&did, RelationshipKind::Authentication, now),
            self.relationship(&did, RelationshipKind::AssertionMethod, now),
            self.relationship(&did, RelationshipKind::CapabilityDelegation, now),
            self.relationship(&did, RelationshipKind::Recovery, now),
        )?;

        debug!(
            "resolved {}: {} controllers, {} verification methods",
            did,
            controllers.len(),
            verification_methods.len()
        );
        Ok(Document {
            context: DEFAULT_CONTEXT.to_string(),
            id: Some(did),
            controllers,
            verification_methods,
            authentication,
            assertion_method,
            capability_delegation,
            recovery,
        })
    }

    /// Returns the type and key material of the method addressed by `url_string`.
    ///
    /// Relationship lists are not consulted.
    ///
    /// # Errors
    /// Fails on a malformed URL, a missing or deactivated method, or a ledger error.
    pub async fn dereference(&self, url_string: &str) -> Result<(String, Vec<u8>), ResolveError> {
        let url = IdentifierUrl::parse(url_string)?;
        let record = self
            .ledger
            .method_at(url.did().identifier(), url.slot_index())
            .await
            .map_err(query_failed("VerificationMethodAt", &url))?
            .ok_or_else(|| ResolveError::MethodNotFound(url.to_string()))?;
        if record.deactivated {
            return Err(ResolveError::MethodDeactivated(url.to_string()));
        }
        Ok((record.method_type, record.public_key))
    }

    async fn controllers(&self, did: &Identifier) -> Result<Vec<Identifier>, ResolveError> {
        let events = self
            .ledger
            .controller_events(did.identifier())
            .await
            .map_err(query_failed("QueryController", did))?;

        let mut active = Vec::new();
        for candidate in controller_candidates(did, &events)? {
            let is_controller = self
                .ledger
                .is_controller(did.identifier(), candidate.identifier())
                .await
                .map_err(query_failed("IsController", did))?;
            if is_controller {
                active.push(candidate);
            }
        }
        Ok(active)
    }

    async fn verification_methods(
        &self,
        did: &Identifier,
    ) -> Result<Vec<VerificationMethod>, ResolveError> {
        let count = self
            .ledger
            .method_count(did.identifier())
            .await
            .map_err(query_failed("VerificationMethodCount", did))?;

        let mut methods = Vec::new();
        for index in 0..count {
            let record = self
                .ledger
                .method_at(did.identifier(), index)
                .await
                .map_err(query_failed("VerificationMethodAt", did))?
                .ok_or_else(|| ResolveError::Inconsistent {
                    target: did.to_string(),
                    index,
                    count,
                })?;
            if !record.deactivated {
                methods.push(to_verification_method(did, index, record)?);
            }
        }
        Ok(methods)
    }

    async fn relationship(
        &self,
        did: &Identifier,
        kind: RelationshipKind,
        now: i64,
    ) -> Result<Vec<IdentifierUrl>, ResolveError> {
        let operation = relationship_operation(kind);
        let events = self
            .ledger
            .relationship_events(did.identifier(), kind)
            .await
            .map_err(query_failed(operation, did))?;

        let mut active = Vec::new();
        for url in relationship_candidates(did, kind, &events)? {
            let keep = self.grant_is_active(did, kind, &url, now).await?;
            if keep {
                active.push(url);
            }
        }
        Ok(active)
    }

    async fn grant_is_active(
        &self,
        did: &Identifier,
        kind: RelationshipKind,
        url: &IdentifierUrl,
        now: i64,
    ) -> Result<bool, ResolveError> {
        let id = did.identifier();
        let url_string = url.to_string();
        let failed = || query_failed(relationship_operation(kind), url);

        // the referenced method lives under the URL's own identifier
        let method = self
            .ledger
            .method_at(url.did().identifier(), url.slot_index())
            .await
            .map_err(query_failed("VerificationMethodAt", url))?;

        let active = match kind {
            RelationshipKind::Authentication => {
                let in_set = self.ledger.in_authentication(id, &url_string).await.map_err(failed())?;
                grant_active(in_set, method.as_ref())
            }
            RelationshipKind::AssertionMethod => {
                let in_set = self.ledger.in_assertion(id, &url_string).await.map_err(failed())?;
                grant_active(in_set, method.as_ref())
            }
            RelationshipKind::CapabilityDelegation => {
                let expiry = self.ledger.delegation_expiry(id, &url_string).await.map_err(failed())?;
                delegation_active(expiry, now, method.as_ref())
            }
            RelationshipKind::Recovery => {
                let in_set = self.ledger.in_recovery(id, &url_string).await.map_err(failed())?;
                grant_active(in_set, method.as_ref())
            }
        };
        Ok(active)
    }
}
