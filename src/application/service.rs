use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::domain::{
    is_valid_account_id, Account, AccountId, Direction, LedgerEntry, Money, NewLedgerEntry,
    SourceType,
};
use crate::storage::{sqlite_url, Repository, StoreConfig, StoreError};

use super::AppError;

/// Application service providing the balance operations of the ledger.
/// This is the primary interface for any client (HTTP, CLI, tests).
///
/// It holds no balance state of its own: every call goes to the repository.
#[derive(Clone)]
pub struct LedgerService {
    repo: Repository,
    /// Upper bound on one balance mutation up to its commit, including waiting
    /// for the lock.
    deadline: Option<Duration>,
}

/// A transaction as submitted by a caller, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// "win" or "lose"
    #[serde(default)]
    pub state: String,
    /// Decimal string, e.g. "25.50"
    #[serde(default)]
    pub amount: String,
    #[serde(default, rename = "transactionId")]
    pub transaction_id: String,
}

/// Result of a successfully handled transaction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// The transaction was applied; `balance` is the new balance.
    Applied { balance: Money },
    /// The external transaction id had already been applied. Nothing changed.
    AlreadyApplied,
}

/// Balance of a single account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceView {
    pub account_id: AccountId,
    pub balance: Money,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            deadline: None,
        }
    }

    /// Bound each balance mutation by `deadline`. A mutation that has not
    /// reached its commit when the deadline passes is rolled back.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Initialize a database at the given path (created if missing, migrated).
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let repo = Repository::init(&sqlite_url(database_path)).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database at the given path.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let config = StoreConfig {
            create_if_missing: false,
            ..StoreConfig::default()
        };
        let repo = Repository::connect_with(&sqlite_url(database_path), &config).await?;
        Ok(Self::new(repo))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // ========================
    // Balance mutation
    // ========================

    /// Validate a transaction request and apply it atomically.
    ///
    /// Validation failures never touch storage. A resubmitted transaction id is
    /// not an error: it yields `TransactionOutcome::AlreadyApplied`.
    pub async fn process_transaction(
        &self,
        account_id: AccountId,
        request: &TransactionRequest,
        source_type: &str,
    ) -> Result<TransactionOutcome, AppError> {
        let entry = validate_transaction(account_id, request, source_type)?;

        let applied = self.repo.apply_transaction(&entry, self.deadline).await;

        match applied {
            Ok(balance) => {
                info!(
                    account_id,
                    external_tx_id = %entry.external_tx_id,
                    source_type = %entry.source_type,
                    direction = %entry.direction,
                    amount = %entry.amount,
                    %balance,
                    "transaction processed"
                );
                Ok(TransactionOutcome::Applied { balance })
            }
            Err(StoreError::DuplicateTransaction(external_tx_id)) => {
                info!(account_id, %external_tx_id, "transaction already processed");
                Ok(TransactionOutcome::AlreadyApplied)
            }
            Err(StoreError::DeadlineExceeded(deadline)) => {
                error!(
                    account_id,
                    external_tx_id = %entry.external_tx_id,
                    ?deadline,
                    "transaction deadline exceeded before commit, rolled back"
                );
                Err(AppError::DeadlineExceeded(deadline))
            }
            Err(StoreError::Persistence(err)) => {
                error!(
                    account_id,
                    external_tx_id = %entry.external_tx_id,
                    error = ?err,
                    "process transaction failed"
                );
                Err(AppError::Persistence(err))
            }
            Err(err) => {
                debug!(
                    account_id,
                    external_tx_id = %entry.external_tx_id,
                    error = %err,
                    "transaction rejected"
                );
                Err(err.into())
            }
        }
    }

    // ========================
    // Balance query
    // ========================

    /// Current balance of an account.
    pub async fn query_balance(&self, account_id: AccountId) -> Result<BalanceView, AppError> {
        ensure_account_id(account_id)?;
        let balance = self.repo.get_balance(account_id).await.map_err(|err| {
            if let StoreError::Persistence(cause) = &err {
                error!(account_id, error = ?cause, "get balance failed");
            }
            AppError::from(err)
        })?;
        Ok(BalanceView {
            account_id,
            balance,
        })
    }

    /// Get an account with its timestamps.
    pub async fn get_account(&self, account_id: AccountId) -> Result<Account, AppError> {
        ensure_account_id(account_id)?;
        self.repo
            .get_account(account_id)
            .await?
            .ok_or(AppError::AccountNotFound(account_id))
    }

    /// Applied transactions of an account, oldest first.
    pub async fn list_entries(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>, AppError> {
        let account = self.get_account(account_id).await?;
        Ok(self.repo.list_entries_for_account(account.id).await?)
    }
}

/// Turn a raw request into an entry the store can apply.
pub fn validate_transaction(
    account_id: AccountId,
    request: &TransactionRequest,
    source_type: &str,
) -> Result<NewLedgerEntry, AppError> {
    ensure_account_id(account_id)?;

    let source_type = SourceType::from_str(source_type)
        .ok_or_else(|| AppError::InvalidRequest(format!("invalid source type {:?}", source_type)))?;

    let amount = Money::parse(&request.amount)
        .map_err(|err| AppError::InvalidAmount(err.to_string()))?;
    if !amount.is_positive() {
        return Err(AppError::InvalidAmount(format!(
            "amount must be positive, got {}",
            amount
        )));
    }

    let direction = Direction::from_str(&request.state).ok_or_else(|| {
        AppError::InvalidState(format!("state must be 'win' or 'lose', got {:?}", request.state))
    })?;

    // Stored exactly as received: ids differing only in whitespace are distinct.
    if request.transaction_id.trim().is_empty() {
        return Err(AppError::InvalidRequest("transactionId is required".into()));
    }

    Ok(NewLedgerEntry {
        account_id,
        external_tx_id: request.transaction_id.clone(),
        source_type,
        direction,
        amount,
    })
}

fn ensure_account_id(account_id: AccountId) -> Result<(), AppError> {
    if is_valid_account_id(account_id) {
        Ok(())
    } else {
        Err(AppError::InvalidRequest(format!(
            "account id must be positive, got {}",
            account_id
        )))
    }
}
