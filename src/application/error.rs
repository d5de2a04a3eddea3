use std::time::Duration;

use thiserror::Error;

use crate::domain::{AccountId, Money};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Insufficient balance in account {account_id}: balance {balance}, required {required}")]
    InsufficientBalance {
        account_id: AccountId,
        balance: Money,
        required: Money,
    },

    /// The unit of work was rolled back before its commit; resubmitting the
    /// same request is safe.
    #[error("Transaction did not complete within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Database error: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl AppError {
    /// True for failures where the caller should resubmit the identical request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::DeadlineExceeded(_) | AppError::Persistence(_))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => AppError::AccountNotFound(id),
            StoreError::InsufficientBalance {
                account_id,
                balance,
                required,
            } => AppError::InsufficientBalance {
                account_id,
                balance,
                required,
            },
            StoreError::BalanceOverflow(id) => {
                AppError::InvalidAmount(format!("amount would overflow the balance of account {}", id))
            }
            // Only `apply_transaction` raises this, and `process_transaction`
            // turns it into `TransactionOutcome::AlreadyApplied`.
            StoreError::DuplicateTransaction(id) => {
                AppError::InvalidRequest(format!("transaction {:?} already processed", id))
            }
            StoreError::DeadlineExceeded(deadline) => AppError::DeadlineExceeded(deadline),
            StoreError::Persistence(err) => AppError::Persistence(err),
        }
    }
}
