use std::time::Duration;

use thiserror::Error;

use crate::domain::{AccountId, Money};

/// Failures of the ledger store. Every variant except `Persistence` is
/// detected inside a unit of work that has already been rolled back.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Insufficient balance in account {account_id}: balance {balance}, required {required}")]
    InsufficientBalance {
        account_id: AccountId,
        balance: Money,
        required: Money,
    },

    #[error("Balance of account {0} would overflow")]
    BalanceOverflow(AccountId),

    #[error("Transaction already processed: {0}")]
    DuplicateTransaction(String),

    /// The deadline ran out before the commit started.
    #[error("Transaction did not reach commit within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Persistence error: {0:#}")]
    Persistence(#[from] anyhow::Error),
}
