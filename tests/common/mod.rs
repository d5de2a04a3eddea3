// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use tempfile::TempDir;
use wallet_ledger::application::{LedgerService, TransactionRequest};
use wallet_ledger::domain::{AccountId, Money};

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to create a test service whose accounts are already seeded
pub async fn seeded_service(accounts: &[(AccountId, &str)]) -> Result<(LedgerService, TempDir)> {
    let (service, temp_dir) = test_service().await?;
    for (id, balance) in accounts {
        service
            .repository()
            .seed_account(*id, money(balance))
            .await?;
    }
    Ok((service, temp_dir))
}

pub fn money(value: &str) -> Money {
    Money::parse(value).unwrap()
}

pub fn win(amount: &str, transaction_id: &str) -> TransactionRequest {
    request("win", amount, transaction_id)
}

pub fn lose(amount: &str, transaction_id: &str) -> TransactionRequest {
    request("lose", amount, transaction_id)
}

pub fn request(state: &str, amount: &str, transaction_id: &str) -> TransactionRequest {
    TransactionRequest {
        state: state.into(),
        amount: amount.into(),
        transaction_id: transaction_id.into(),
    }
}

/// Current balance rendered with two fraction digits
pub async fn balance_of(service: &LedgerService, account_id: AccountId) -> Result<String> {
    Ok(service.query_balance(account_id).await?.balance.to_string())
}
