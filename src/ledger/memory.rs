// src/ledger/memory.rs
//! In-memory registry used by tests.
//!
//! Mimics the registry contract closely enough for end-to-end tests: callers
//! must be the subject itself or one of its controllers, deactivated
//! identities refuse every call, refused calls are mined with a failure
//! receipt, and grants are appended to per-kind event logs that are never
//! rewritten.

use super::{AddedEvent, LedgerCall, LedgerMutation, LedgerQuery, MethodRecord, Receipt, TxHash};
use crate::error::LedgerError;
use crate::models::document::{Relationship, RelationshipKind};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

const GAS_USED: u64 = 21_000;

#[derive(Default)]
struct DidState {
    deactivated: bool,
    methods: Vec<MethodRecord>,
    controllers: HashSet<String>,
    authentication: HashSet<String>,
    assertion: HashSet<String>,
    delegation: HashMap<String, i64>,
    recovery: HashSet<String>,
}

struct PendingReceipt {
    receipt: Receipt,
    misses_left: u32,
}

#[derive(Default)]
struct State {
    dids: HashMap<String, DidState>,
    controller_log: Vec<AddedEvent>,
    relationship_log: HashMap<RelationshipKind, Vec<AddedEvent>>,
    receipts: HashMap<TxHash, PendingReceipt>,
    tx_count: u64,
    failing_reads: bool,
    overstated_slots: u64,
    exhaust_gas_next: bool,
    withhold_receipts: bool,
}

/// Registry fake implementing both ledger ports.
#[derive(Default)]
pub(crate) struct InMemoryLedger {
    state: Mutex<State>,
    receipt_delay: u32,
}

impl InMemoryLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Receipts become visible only after `polls` unsuccessful lookups.
    pub(crate) fn with_receipt_delay(polls: u32) -> Self {
        InMemoryLedger {
            state: Mutex::new(State::default()),
            receipt_delay: polls,
        }
    }

    /// Makes every subsequent read fail with a transport error.
    pub(crate) fn fail_reads(&self, failing: bool) {
        self.state.lock().unwrap().failing_reads = failing;
    }

    /// Reports `extra` more method slots than are stored, for every DID.
    pub(crate) fn overstate_method_count(&self, extra: u64) {
        self.state.lock().unwrap().overstated_slots = extra;
    }

    /// The next submitted call runs out of gas instead of executing.
    pub(crate) fn exhaust_gas_next(&self) {
        self.state.lock().unwrap().exhaust_gas_next = true;
    }

    /// Transactions are accepted but never mined.
    pub(crate) fn withhold_receipts(&self) {
        self.state.lock().unwrap().withhold_receipts = true;
    }

    /// Appends a raw grant event without touching membership state.
    pub(crate) fn push_event(&self, kind: Option<RelationshipKind>, subject: &str, related: &str) {
        let event = AddedEvent {
            subject: subject.to_string(),
            related: related.to_string(),
        };
        let mut state = self.state.lock().unwrap();
        match kind {
            None => state.controller_log.push(event),
            Some(kind) => state.relationship_log.entry(kind).or_default().push(event),
        }
    }

    fn read(&self) -> Result<std::sync::MutexGuard<'_, State>, LedgerError> {
        let state = self.state.lock().unwrap();
        if state.failing_reads {
            return Err(LedgerError::Transport("connection refused".to_string()));
        }
        Ok(state)
    }
}

fn authorized(state: &State, did: &str, caller: &str) -> bool {
    match state.dids.get(did) {
        Some(subject) if !subject.deactivated => {
            caller == did || subject.controllers.contains(caller)
        }
        _ => false,
    }
}

/// Applies `call` to `state`; `false` means the contract reverted.
fn execute(state: &mut State, call: LedgerCall) -> bool {
    if let LedgerCall::CreateDid { did, method_type, public_key } = call {
        if state.dids.contains_key(&did) {
            return false;
        }
        let subject = DidState {
            methods: vec![MethodRecord {
                method_type,
                controller: String::new(),
                public_key,
                deactivated: false,
            }],
            ..Default::default()
        };
        state.dids.insert(did, subject);
        return true;
    }

    let (did, caller) = match &call {
        LedgerCall::AddController { did, caller, .. }
        | LedgerCall::RemoveController { did, caller, .. }
        | LedgerCall::AddMethod { did, caller, .. }
        | LedgerCall::UpdateMethod { did, caller, .. }
        | LedgerCall::DeactivateMethod { did, caller, .. }
        | LedgerCall::AddRelationship { did, caller, .. }
        | LedgerCall::RemoveRelationship { did, caller, .. }
        | LedgerCall::DeactivateDid { did, caller } => (did.clone(), caller.clone()),
        LedgerCall::CreateDid { .. } => unreachable!("handled above"),
    };
    if !authorized(state, &did, &caller) {
        return false;
    }

    let mut event = None;
    let subject = state.dids.get_mut(&did).expect("authorized subject exists");
    let applied = match call {
        LedgerCall::AddController { controller, .. } => {
            let added = subject.controllers.insert(controller.clone());
            if added {
                event = Some((None, controller));
            }
            added
        }
        LedgerCall::RemoveController { controller, .. } => subject.controllers.remove(&controller),
        LedgerCall::AddMethod { method, .. } => {
            subject.methods.push(MethodRecord {
                method_type: method.method_type,
                controller: method.controller,
                public_key: method.public_key,
                deactivated: false,
            });
            true
        }
        LedgerCall::UpdateMethod { index, method_type, public_key, .. } => {
            match subject.methods.get_mut(index as usize) {
                Some(record) if !record.deactivated => {
                    record.method_type = method_type;
                    record.public_key = public_key;
                    true
                }
                _ => false,
            }
        }
        LedgerCall::DeactivateMethod { index, .. } => match subject.methods.get_mut(index as usize) {
            Some(record) if !record.deactivated => {
                record.deactivated = true;
                true
            }
            _ => false,
        },
        LedgerCall::AddRelationship { relationship, url, .. } => {
            match relationship {
                Relationship::Authentication => subject.authentication.insert(url.clone()),
                Relationship::AssertionMethod => subject.assertion.insert(url.clone()),
                Relationship::CapabilityDelegation { expires_at } => {
                    subject.delegation.insert(url.clone(), expires_at);
                    true
                }
                Relationship::Recovery => subject.recovery.insert(url.clone()),
            };
            event = Some((Some(relationship.kind()), url));
            true
        }
        LedgerCall::RemoveRelationship { kind, url, .. } => match kind {
            RelationshipKind::Authentication => subject.authentication.remove(&url),
            RelationshipKind::AssertionMethod => subject.assertion.remove(&url),
            RelationshipKind::CapabilityDelegation => subject.delegation.remove(&url).is_some(),
            RelationshipKind::Recovery => subject.recovery.remove(&url),
        },
        LedgerCall::DeactivateDid { .. } => {
            subject.deactivated = true;
            true
        }
        LedgerCall::CreateDid { .. } => unreachable!("handled above"),
    };

    if let Some((kind, related)) = event {
        let added = AddedEvent { subject: did, related };
        match kind {
            None => state.controller_log.push(added),
            Some(kind) => state.relationship_log.entry(kind).or_default().push(added),
        }
    }
    applied
}

#[async_trait]
impl LedgerMutation for InMemoryLedger {
    async fn submit(&self, call: LedgerCall) -> Result<TxHash, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.tx_count += 1;
        let tx = TxHash::from_low_u64_be(state.tx_count);

        let receipt = if std::mem::take(&mut state.exhaust_gas_next) {
            Receipt {
                success: false,
                gas_used: 300_000,
                cumulative_gas_used: 300_000 + GAS_USED,
            }
        } else {
            Receipt {
                success: execute(&mut state, call),
                gas_used: GAS_USED,
                cumulative_gas_used: GAS_USED,
            }
        };
        state.receipts.insert(
            tx,
            PendingReceipt {
                receipt,
                misses_left: self.receipt_delay,
            },
        );
        Ok(tx)
    }

    async fn receipt(&self, tx: TxHash) -> Result<Option<Receipt>, LedgerError> {
        let mut state = self.state.lock().unwrap();
        if state.withhold_receipts {
            return Ok(None);
        }
        match state.receipts.get_mut(&tx) {
            Some(pending) if pending.misses_left > 0 => {
                pending.misses_left -= 1;
                Ok(None)
            }
            Some(pending) => Ok(Some(pending.receipt)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LedgerQuery for InMemoryLedger {
    async fn is_deactivated(&self, id: &str) -> Result<bool, LedgerError> {
        Ok(self.read()?.dids.get(id).map_or(false, |s| s.deactivated))
    }

    async fn method_count(&self, id: &str) -> Result<u64, LedgerError> {
        let state = self.read()?;
        Ok(state
            .dids
            .get(id)
            .map_or(0, |s| s.methods.len() as u64 + state.overstated_slots))
    }

    async fn method_at(&self, id: &str, index: u64) -> Result<Option<MethodRecord>, LedgerError> {
        Ok(self
            .read()?
            .dids
            .get(id)
            .and_then(|s| s.methods.get(index as usize).cloned()))
    }

    async fn is_controller(&self, id: &str, candidate: &str) -> Result<bool, LedgerError> {
        Ok(self
            .read()?
            .dids
            .get(id)
            .map_or(false, |s| s.controllers.contains(candidate)))
    }

    async fn controller_events(&self, id: &str) -> Result<Vec<AddedEvent>, LedgerError> {
        let state = self.read()?;
        Ok(state
            .controller_log
            .iter()
            .filter(|e| e.subject == id)
            .cloned()
            .collect())
    }

    async fn relationship_events(
        &self,
        id: &str,
        kind: RelationshipKind,
    ) -> Result<Vec<AddedEvent>, LedgerError> {
        let state = self.read()?;
        Ok(state
            .relationship_log
            .get(&kind)
            .map(|log| log.iter().filter(|e| e.subject == id).cloned().collect())
            .unwrap_or_default())
    }

    async fn in_authentication(&self, id: &str, url: &str) -> Result<bool, LedgerError> {
        Ok(self
            .read()?
            .dids
            .get(id)
            .map_or(false, |s| s.authentication.contains(url)))
    }

    async fn in_assertion(&self, id: &str, url: &str) -> Result<bool, LedgerError> {
        Ok(self
            .read()?
            .dids
            .get(id)
            .map_or(false, |s| s.assertion.contains(url)))
    }

    async fn delegation_expiry(&self, id: &str, url: &str) -> Result<i64, LedgerError> {
        Ok(self
            .read()?
            .dids
            .get(id)
            .and_then(|s| s.delegation.get(url).copied())
            .unwrap_or(0))
    }

    async fn in_recovery(&self, id: &str, url: &str) -> Result<bool, LedgerError> {
        Ok(self
            .read()?
            .dids
            .get(id)
            .map_or(false, |s| s.recovery.contains(url)))
    }
}
