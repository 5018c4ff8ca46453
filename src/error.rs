// src/error.rs
//! Error taxonomy for the memo DID client.
//!
//! Every error carries enough context (operation, target, cause) to diagnose a
//! failure without re-running it. Nothing in the crate downgrades an error to a
//! log line.

use ethers::types::H256;
use std::fmt;
use thiserror::Error;

/// Malformed or unsupported identifier / identifier-URL text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{0} is not a did (expected did:<method>:<id>)")]
    Syntax(String),

    #[error("{0} is a did url, expected a bare did")]
    UnexpectedUrl(String),

    #[error("{0} is not a did url")]
    NotUrl(String),

    #[error("unsupported method {0}")]
    UnsupportedMethod(String),

    #[error("{0}: chain id segments are not supported")]
    MultipleSegments(String),

    #[error("{0} is not a 32 byte hex string")]
    NotHex(String),

    #[error("{0}: path and query are not supported in memo did")]
    PathOrQuery(String),

    #[error("unsupported fragment: {0}")]
    Fragment(String),
}

/// Failure reported by a ledger port implementation.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("contract call {method} failed: {reason}")]
    Contract { method: String, reason: String },

    #[error("abi: {0}")]
    Abi(#[from] ethers::abi::AbiError),

    #[error("abi definition: {0}")]
    AbiDefinition(String),

    #[error("no signing key configured, mutations are unavailable")]
    NoSigner,
}

/// Failure while assembling a DID Document or dereferencing a DID URL.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{operation} for {target}: {source}")]
    Ledger {
        operation: &'static str,
        target: String,
        #[source]
        source: LedgerError,
    },

    #[error("{operation} for {target}: ledger event carries malformed identifier: {source}")]
    MalformedEvent {
        operation: &'static str,
        target: String,
        #[source]
        source: ParseError,
    },

    #[error("{target}: ledger reports {count} verification methods but slot {index} is missing")]
    Inconsistent { target: String, index: u64, count: u64 },

    #[error("verification method {0} is deactivated")]
    MethodDeactivated(String),

    #[error("verification method {0} not found")]
    MethodNotFound(String),
}

/// Why the ledger refused a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The contract logic reverted (unauthorized caller, invalid target state).
    LogicRejected,
    /// The transaction ran out of gas.
    GasExhausted,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::LogicRejected => write!(f, "logic rejected"),
            RejectReason::GasExhausted => write!(f, "exceeded gas limit"),
        }
    }
}

/// Outcome of a mutation other than confirmed success.
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("{operation}: transaction({tx:#x}) mined but failed: {reason}")]
    Rejected {
        operation: &'static str,
        tx: H256,
        reason: RejectReason,
    },

    #[error("{operation}: no receipt for transaction({tx:#x}) after {attempts} attempts, outcome unknown")]
    Unresolved {
        operation: &'static str,
        tx: H256,
        attempts: u32,
        /// Most recent failed receipt lookup, if any
        #[source]
        last_error: Option<LedgerError>,
    },

    #[error("{operation} on {target}: submit failed: {source}")]
    Submit {
        operation: &'static str,
        target: String,
        #[source]
        source: LedgerError,
    },
}

impl MutationError {
    /// The ledger refused the operation.
    pub fn is_rejected(&self) -> bool {
        matches!(self, MutationError::Rejected { .. })
    }

    /// The outcome of the operation could not be observed.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, MutationError::Unresolved { .. })
    }
}

/// Invalid runtime settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("initial confirmation wait ({initial:?}) must exceed the block period ({block_period:?})")]
    InitialWaitTooShort {
        initial: std::time::Duration,
        block_period: std::time::Duration,
    },

    #[error("at least one confirmation attempt is required")]
    NoAttempts,

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("binding the registry: {0}")]
    Ledger(#[from] LedgerError),
}
