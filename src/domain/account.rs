use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Money;

/// Externally supplied account identifier. Always positive.
pub type AccountId = i64;

/// A user account holding a non-negative balance.
/// Accounts are bootstrapped outside the mutation path and never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returns true if the id can name an account.
pub fn is_valid_account_id(id: AccountId) -> bool {
    id > 0
}
