use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, Money};

/// Direction of a transaction against the balance.
/// Wire names are "win" (credit) and "lose" (debit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "win")]
    Credit,
    #[serde(rename = "lose")]
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "win",
            Direction::Debit => "lose",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "win" => Some(Direction::Credit),
            "lose" => Some(Direction::Debit),
            _ => None,
        }
    }

    /// Apply this direction to a balance. `None` on overflow.
    pub fn apply(&self, balance: Money, amount: Money) -> Option<Money> {
        match self {
            Direction::Credit => balance.checked_add(amount),
            Direction::Debit => balance.checked_sub(amount),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a transaction originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Game,
    Server,
    Payment,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [SourceType::Game, SourceType::Server, SourceType::Payment];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Game => "game",
            SourceType::Server => "server",
            SourceType::Payment => "payment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "game" => Some(SourceType::Game),
            "server" => Some(SourceType::Server),
            "payment" => Some(SourceType::Payment),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated transaction waiting to be applied by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub account_id: AccountId,
    pub external_tx_id: String,
    pub source_type: SourceType,
    pub direction: Direction,
    /// Always positive
    pub amount: Money,
}

/// An applied transaction. Created once, never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Internal sequence id assigned by the store
    pub id: i64,
    pub account_id: AccountId,
    /// Caller-supplied id, unique across all entries
    pub external_tx_id: String,
    pub source_type: SourceType,
    pub direction: Direction,
    pub amount: Money,
    pub applied_at: DateTime<Utc>,
}
