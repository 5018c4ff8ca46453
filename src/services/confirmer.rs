// src/services/confirmer.rs
//! Transaction confirmation.
//!
//! Turns an asynchronous ledger write into a synchronous outcome by polling for
//! the transaction receipt. The poll loop is driven by an explicit state
//! machine:
//!
//! ```text
//! Submitted --receipt ok--------> Confirmed
//!           --receipt failed----> Failed(LogicRejected | GasExhausted)
//!           --no receipt, last--> Unresolved
//!           --no receipt--------> Submitted (wait one block period)
//! ```

use crate::error::{ConfigError, LedgerError, MutationError, RejectReason};
use crate::ledger::{LedgerMutation, Receipt, TxHash};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Timing of the receipt poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmPolicy {
    initial_wait: Duration,
    block_period: Duration,
    max_attempts: u32,
}

impl ConfirmPolicy {
    /// Builds a policy.
    ///
    /// # Arguments
    /// * `initial_wait` - Delay before the first receipt lookup
    /// * `block_period` - Delay between subsequent lookups
    /// * `max_attempts` - Total number of lookups
    ///
    /// # Errors
    /// The initial wait must exceed one block period, and at least one attempt
    /// is required.
    pub fn new(
        initial_wait: Duration,
        block_period: Duration,
        max_attempts: u32,
    ) -> Result<Self, ConfigError> {
        if initial_wait <= block_period {
            return Err(ConfigError::InitialWaitTooShort { initial: initial_wait, block_period });
        }
        if max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        Ok(Self { initial_wait, block_period, max_attempts })
    }

    pub fn initial_wait(&self) -> Duration {
        self.initial_wait
    }

    pub fn block_period(&self) -> Duration {
        self.block_period
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for ConfirmPolicy {
    /// One 5 s block plus a second of margin, then one lookup per block, ten
    /// lookups in total.
    fn default() -> Self {
        Self {
            initial_wait: Duration::from_secs(6),
            block_period: Duration::from_secs(5),
            max_attempts: 10,
        }
    }
}

/// Confirmation state of one submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Submitted { attempts: u32 },
    Confirmed,
    Failed(RejectReason),
    Unresolved { attempts: u32 },
}

impl TxState {
    /// State after one receipt lookup.
    pub fn observe(self, receipt: Option<Receipt>, max_attempts: u32) -> TxState {
        match self {
            TxState::Submitted { attempts } => {
                let attempts = attempts + 1;
                match receipt {
                    Some(receipt) => classify(&receipt),
                    None if attempts >= max_attempts => TxState::Unresolved { attempts },
                    None => TxState::Submitted { attempts },
                }
            }
            terminal => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxState::Submitted { .. })
    }
}

/// Maps a mined receipt to its terminal state.
///
/// A failed transaction that consumed the whole block's cumulative gas was
/// reverted by the contract; one that used less ran out of gas.
pub fn classify(receipt: &Receipt) -> TxState {
    if receipt.success {
        TxState::Confirmed
    } else if receipt.gas_used < receipt.cumulative_gas_used {
        TxState::Failed(RejectReason::GasExhausted)
    } else {
        TxState::Failed(RejectReason::LogicRejected)
    }
}

/// What one poll loop has observed so far, readable after a caller timeout.
#[derive(Default)]
struct Progress {
    attempts: AtomicU32,
    last_error: Mutex<Option<LedgerError>>,
}

impl Progress {
    fn record_error(&self, err: LedgerError) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(err);
        }
    }

    fn unresolved(&self, operation: &'static str, tx: TxHash) -> MutationError {
        MutationError::Unresolved {
            operation,
            tx,
            attempts: self.attempts.load(Ordering::Relaxed),
            last_error: self.last_error.lock().ok().and_then(|mut last| last.take()),
        }
    }
}

/// Polls the ledger until a submitted transaction reaches a terminal state.
#[derive(Debug, Clone, Default)]
pub struct TransactionConfirmer {
    policy: ConfirmPolicy,
}

impl TransactionConfirmer {
    pub fn new(policy: ConfirmPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ConfirmPolicy {
        &self.policy
    }

    /// Waits for `tx` to be mined and reports its outcome.
    ///
    /// # Arguments
    /// * `ledger` - Port used for receipt lookups
    /// * `tx` - Hash returned by the submission
    /// * `operation` - Operation label for logs and errors
    ///
    /// # Errors
    /// - [`MutationError::Rejected`] if the transaction was mined and failed
    /// - [`MutationError::Unresolved`] if no receipt appeared within the budget
    pub async fn confirm<L>(
        &self,
        ledger: &L,
        tx: TxHash,
        operation: &'static str,
    ) -> Result<(), MutationError>
    where
        L: LedgerMutation + ?Sized,
    {
        self.poll(ledger, tx, operation, &Progress::default()).await
    }

    /// Like [`confirm`](Self::confirm), bounded by a caller deadline. Hitting
    /// the deadline reports the transaction as unresolved.
    pub async fn confirm_within<L>(
        &self,
        ledger: &L,
        tx: TxHash,
        operation: &'static str,
        deadline: Duration,
    ) -> Result<(), MutationError>
    where
        L: LedgerMutation + ?Sized,
    {
        let progress = Progress::default();
        match tokio::time::timeout(deadline, self.poll(ledger, tx, operation, &progress)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("{}: gave up waiting for transaction({:#x}) after {:?}", operation, tx, deadline);
                Err(progress.unresolved(operation, tx))
            }
        }
    }

    async fn poll<L>(
        &self,
        ledger: &L,
        tx: TxHash,
        operation: &'static str,
        progress: &Progress,
    ) -> Result<(), MutationError>
    where
        L: LedgerMutation + ?Sized,
    {
        let mut state = TxState::Submitted { attempts: 0 };
        let mut wait = self.policy.initial_wait;

        loop {
            tokio::time::sleep(wait).await;

            // A failed lookup tells nothing about the transaction; count it as a miss.
            let receipt = match ledger.receipt(tx).await {
                Ok(receipt) => receipt,
                Err(e) => {
                    warn!("{}: receipt lookup for transaction({:#x}) failed: {}", operation, tx, e);
                    progress.record_error(e);
                    None
                }
            };

            state = state.observe(receipt, self.policy.max_attempts);
            if let TxState::Submitted { attempts } = state {
                progress.attempts.store(attempts, Ordering::Relaxed);
            }
            debug!("{}: transaction({:#x}) is {:?}", operation, tx, state);

            match state {
                TxState::Submitted { .. } => wait = self.policy.block_period,
                TxState::Confirmed => {
                    info!("{}: transaction({:#x}) confirmed", operation, tx);
                    return Ok(());
                }
                TxState::Failed(reason) => {
                    return Err(MutationError::Rejected { operation, tx, reason });
                }
                TxState::Unresolved { attempts } => {
                    progress.attempts.store(attempts, Ordering::Relaxed);
                    return Err(progress.unresolved(operation, tx));
                }
            }
        }
    }
}
