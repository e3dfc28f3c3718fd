//! Non-negative resource balances with atomic, overflow-safe mutation.
//!
//! Every mutating operation validates before any write: a failed call leaves
//! the ledger exactly as it was. Overflow is detected by checking remaining
//! capacity (`u64::MAX - balance`) up front, never by post-hoc wraparound
//! inspection. Amounts are `u64`, so negative quantities are unrepresentable.

use crate::id::ResourceId;
use std::collections::HashMap;
use std::hash::Hash;

/// Errors from ledger mutation.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u64, available: u64 },
    #[error("arithmetic overflow: balance {balance} cannot absorb {amount}")]
    ArithmeticOverflow { balance: u64, amount: u64 },
    #[error("transfer source and destination are the same subject")]
    ReflexiveTransfer,
}

/// Previous and current balance of a single subject after a mutation, for
/// change-event emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub previous: u64,
    pub current: u64,
}

/// Balance changes on both endpoints of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferChange {
    pub from: BalanceChange,
    pub to: BalanceChange,
}

/// Per-subject, per-resource balances. Balances default to zero; entries are
/// created on first write.
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger<S> {
    balances: HashMap<(S, ResourceId), u64>,
}

impl<S> ResourceLedger<S>
where
    S: Copy + Eq + Hash,
{
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            balances: HashMap::new(),
        }
    }

    /// Current balance. Unwritten entries read as zero.
    pub fn balance(&self, subject: S, resource: ResourceId) -> u64 {
        self.balances.get(&(subject, resource)).copied().unwrap_or(0)
    }

    /// Check that a subject can absorb `amount` without overflow.
    pub fn can_add(&self, subject: S, resource: ResourceId, amount: u64) -> Result<(), LedgerError> {
        let balance = self.balance(subject, resource);
        if amount > u64::MAX - balance {
            return Err(LedgerError::ArithmeticOverflow { balance, amount });
        }
        Ok(())
    }

    /// Add to a balance. Fails with `ArithmeticOverflow` when the balance
    /// cannot absorb the amount; the balance is unchanged on failure.
    pub fn add(
        &mut self,
        subject: S,
        resource: ResourceId,
        amount: u64,
    ) -> Result<BalanceChange, LedgerError> {
        let previous = self.balance(subject, resource);
        if amount > u64::MAX - previous {
            return Err(LedgerError::ArithmeticOverflow {
                balance: previous,
                amount,
            });
        }
        let current = previous + amount;
        self.balances.insert((subject, resource), current);
        Ok(BalanceChange { previous, current })
    }

    /// Remove from a balance. Fails with `InsufficientBalance` when the
    /// balance is smaller than the amount; the balance is unchanged on
    /// failure.
    pub fn remove(
        &mut self,
        subject: S,
        resource: ResourceId,
        amount: u64,
    ) -> Result<BalanceChange, LedgerError> {
        let previous = self.balance(subject, resource);
        if amount > previous {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: previous,
            });
        }
        let current = previous - amount;
        self.balances.insert((subject, resource), current);
        Ok(BalanceChange { previous, current })
    }

    /// Atomically move `amount` between two subjects of this ledger.
    ///
    /// Both the source sufficiency check and the destination capacity check
    /// run before either balance is written, so a failed transfer leaves
    /// both endpoints exactly as they were.
    pub fn transfer(
        &mut self,
        resource: ResourceId,
        from: S,
        to: S,
        amount: u64,
    ) -> Result<TransferChange, LedgerError> {
        if from == to {
            return Err(LedgerError::ReflexiveTransfer);
        }
        let from_previous = self.balance(from, resource);
        if amount > from_previous {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: from_previous,
            });
        }
        let to_previous = self.balance(to, resource);
        if amount > u64::MAX - to_previous {
            return Err(LedgerError::ArithmeticOverflow {
                balance: to_previous,
                amount,
            });
        }

        self.balances.insert((from, resource), from_previous - amount);
        self.balances.insert((to, resource), to_previous + amount);
        Ok(TransferChange {
            from: BalanceChange {
                previous: from_previous,
                current: from_previous - amount,
            },
            to: BalanceChange {
                previous: to_previous,
                current: to_previous + amount,
            },
        })
    }

    /// Iterate all stored balances (including zeros left by removal).
    pub fn balances(&self) -> impl Iterator<Item = (S, ResourceId, u64)> + '_ {
        self.balances.iter().map(|(&(s, r), &b)| (s, r, b))
    }

    /// Sum of all balances for one resource. Used by conservation checks.
    pub fn total(&self, resource: ResourceId) -> u128 {
        self.balances
            .iter()
            .filter(|&(&(_, r), _)| r == resource)
            .map(|(_, &b)| b as u128)
            .sum()
    }

    /// Drop all balances stored for a subject.
    pub fn purge_subject(&mut self, subject: S) {
        self.balances.retain(|&(s, _), _| s != subject);
    }

    /// Restore a balance when rehydrating from a snapshot.
    pub(crate) fn restore_balance(&mut self, subject: S, resource: ResourceId, amount: u64) {
        self.balances.insert((subject, resource), amount);
    }
}
