mod error;
mod repository;

pub use error::*;
pub use repository::*;

/// SQL migration for the initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// Seed rows for the default accounts (1, 2 and 3)
pub const MIGRATION_002_SEED_ACCOUNTS: &str = include_str!("migrations/002_seed_accounts.sql");
