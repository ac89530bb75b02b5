use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

/// Why a balance query did not go through. This is the closed set every
/// backend reports from; callers branch on these values and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorCode {
    /// No row exists for the target username.
    #[error("account not found")]
    AccountNotFound,
    /// The update statement matched no rows, so nothing was written.
    #[error("no changes made")]
    NoChangesMade,
    /// Increment rejected: the balance already sits at or above the cap.
    #[error("balance cap exceeded")]
    BalanceCapExceeded,
    /// Increment rejected: the headroom left under the cap is smaller
    /// than the requested amount.
    #[error("balance insufficient")]
    BalanceInsufficient,
    /// Decrement rejected: it would take the balance below zero.
    #[error("insufficient funds")]
    BalanceInsufficientOther,
}

impl ErrorCode {
    /// Stable wire tag, as it appears in API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AccountNotFound => "account_not_found",
            ErrorCode::NoChangesMade => "no_changes_made",
            ErrorCode::BalanceCapExceeded => "balance_cap_exceeded",
            ErrorCode::BalanceInsufficient => "balance_insufficient",
            ErrorCode::BalanceInsufficientOther => "balance_insufficient_other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Increment,
    Decrement,
    Set,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("transaction target must not be empty")]
pub struct EmptyTarget;

/// Lower-cased form of a username, the only form the storage layer sees.
pub fn canonical_key(username: &str) -> String {
    username.to_lowercase()
}

/// A single requested change to one account's balance. Immutable once
/// built; the target is canonicalized by the constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceTransaction {
    target: Arc<str>,
    kind: OperationKind,
    value: u64,
    balance_cap: Option<u64>,
}

impl BalanceTransaction {
    pub fn new(
        target: &str,
        kind: OperationKind,
        value: u64,
        balance_cap: Option<u64>,
    ) -> Result<Self, EmptyTarget> {
        let key = canonical_key(target);
        if key.is_empty() {
            return Err(EmptyTarget);
        }
        Ok(Self {
            target: Arc::from(key),
            kind,
            value,
            balance_cap,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn balance_cap(&self) -> Option<u64> {
        self.balance_cap
    }

    /// Checks the transaction against the current balance, in the order the
    /// codes are defined: a capped increment on a balance already at or over
    /// the cap is `BalanceCapExceeded`, a capped increment that would land
    /// over the cap is `BalanceInsufficient`, and a decrement below zero is
    /// `BalanceInsufficientOther`. Sets always pass.
    pub fn verify(&self, current: u64) -> Result<(), ErrorCode> {
        match self.kind {
            OperationKind::Increment => {
                if let Some(cap) = self.balance_cap {
                    if current >= cap {
                        return Err(ErrorCode::BalanceCapExceeded);
                    }
                    match current.checked_add(self.value) {
                        Some(next) if next <= cap => {}
                        _ => return Err(ErrorCode::BalanceInsufficient),
                    }
                }
            }
            OperationKind::Decrement => {
                if self.value > current {
                    return Err(ErrorCode::BalanceInsufficientOther);
                }
            }
            OperationKind::Set => {}
        }
        Ok(())
    }

    /// The value the backend actually writes. Sets are clamped down to the
    /// cap; increments and decrements pass through untouched.
    pub fn effective_value(&self) -> u64 {
        match (self.kind, self.balance_cap) {
            (OperationKind::Set, Some(cap)) => self.value.min(cap),
            _ => self.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub username: String,
    pub balance: u64,
}
