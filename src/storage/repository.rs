use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Connection, Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::{
    Account, AccountId, Direction, LedgerEntry, Money, NewLedgerEntry, SourceType,
};

use super::{MIGRATION_001_INITIAL, MIGRATION_002_SEED_ACCOUNTS, StoreError};

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub max_connections: u32,
    /// How long a writer waits for the database lock before giving up.
    pub busy_timeout: Duration,
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_connections: 25,
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
        }
    }
}

/// Repository for persisting and querying accounts and ledger entries.
///
/// `apply_transaction` is the only path that changes a balance or records an
/// entry.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database with default pool settings.
    /// Creates the database file if it doesn't exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, &StoreConfig::default()).await
    }

    /// Connect to a SQLite database.
    /// WAL mode keeps readers off the writer's lock; foreign keys are enforced.
    pub async fn connect_with(database_url: &str, config: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database url: {}", database_url))?
            .create_if_missing(config.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Connect, retrying up to `attempts` times with `delay` between tries.
    pub async fn connect_with_retry(
        database_url: &str,
        config: &StoreConfig,
        attempts: u32,
        delay: Duration,
    ) -> Result<Self> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match Self::connect_with(database_url, config).await {
                Ok(repo) => {
                    info!(attempt, "database connection established");
                    return Ok(repo);
                }
                Err(err) if attempt < attempts => {
                    warn!(attempt, of = attempts, error = %err, "waiting for database");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("Could not reach database after {} attempts", attempts)
                    });
                }
            }
        }
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        info!("migrations completed");
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ========================
    // Account bootstrap
    // ========================

    /// Insert the default accounts (1, 2, 3) if they are missing.
    pub async fn seed_default_accounts(&self) -> Result<()> {
        sqlx::query(MIGRATION_002_SEED_ACCOUNTS)
            .execute(&self.pool)
            .await
            .context("Failed to seed default accounts")?;
        Ok(())
    }

    /// Create an account with an opening balance unless it already exists.
    /// Returns false if the account was already present.
    pub async fn seed_account(&self, id: AccountId, balance: Money) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO accounts (id, balance_cents, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(balance.cents())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to seed account {}", id))?;

        Ok(result.rows_affected() == 1)
    }

    // ========================
    // Account queries
    // ========================

    /// Get an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, balance_cents, created_at, updated_at
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    /// Current balance of an account.
    pub async fn get_balance(&self, id: AccountId) -> Result<Money, StoreError> {
        let row = sqlx::query("SELECT balance_cents FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch balance")?;

        match row {
            Some(row) => Ok(Money::from_cents(row.get("balance_cents"))),
            None => Err(StoreError::AccountNotFound(id)),
        }
    }

    // ========================
    // Balance mutation
    // ========================

    /// Apply a transaction and return the new balance.
    ///
    /// The balance update and the ledger insert commit together or not at all.
    /// A second submission of the same external id fails the unique index and
    /// rolls back its balance update, so it surfaces as `DuplicateTransaction`
    /// even when both submissions raced past validation.
    ///
    /// `deadline` bounds everything up to the commit: waiting for a connection,
    /// taking the write lock, and staging the update and insert. When it runs
    /// out the unit of work is rolled back and `DeadlineExceeded` is returned.
    /// The commit itself is never cut short, so its outcome is always reported.
    pub async fn apply_transaction(
        &self,
        entry: &NewLedgerEntry,
        deadline: Option<Duration>,
    ) -> Result<Money, StoreError> {
        let expires_at = deadline.map(|limit| Instant::now() + limit);
        let expired = || StoreError::DeadlineExceeded(deadline.unwrap_or_default());

        let Some(acquired) = before(expires_at, self.pool.acquire()).await else {
            return Err(expired());
        };
        let mut conn = acquired.context("Failed to acquire connection")?;
        // A deferred BEGIN does not wait for the lock; the first write does.
        let mut tx = Connection::begin(&mut *conn)
            .await
            .context("Failed to begin transaction")?;
        let now = Utc::now().to_rfc3339();

        let (balance, new_balance) =
            match before(expires_at, stage_entry(&mut tx, entry, &now)).await {
                Some(Ok(balances)) => balances,
                Some(Err(err)) => return abort(tx, err).await,
                None => return abort(tx, expired()).await,
            };

        tx.commit().await.context("Failed to commit transaction")?;

        debug!(
            account_id = entry.account_id,
            external_tx_id = %entry.external_tx_id,
            %balance,
            %new_balance,
            "transaction applied"
        );
        Ok(new_balance)
    }

    // ========================
    // Ledger entry queries
    // ========================

    /// Get a ledger entry by its external transaction id.
    pub async fn get_entry(&self, external_tx_id: &str) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, external_tx_id, source_type, direction, amount_cents, applied_at
            FROM ledger_entries
            WHERE external_tx_id = ?
            "#,
        )
        .bind(external_tx_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch ledger entry")?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    /// List ledger entries for an account, oldest first.
    pub async fn list_entries_for_account(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, external_tx_id, source_type, direction, amount_cents, applied_at
            FROM ledger_entries
            WHERE account_id = ?
            ORDER BY id
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list ledger entries")?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// Count ledger entries for an account.
    pub async fn count_entries(&self, account_id: AccountId) -> Result<i64> {
        let count: i64 =
            sqlx::query("SELECT COUNT(*) as count FROM ledger_entries WHERE account_id = ?")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await
                .context("Failed to count ledger entries")?
                .get("count");
        Ok(count)
    }

    fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(Account {
            id: row.get("id"),
            balance: Money::from_cents(row.get("balance_cents")),
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at")?,
            updated_at: parse_timestamp(&updated_at_str).context("Invalid updated_at")?,
        })
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerEntry> {
        let source_type_str: String = row.get("source_type");
        let direction_str: String = row.get("direction");
        let applied_at_str: String = row.get("applied_at");

        Ok(LedgerEntry {
            id: row.get("id"),
            account_id: row.get("account_id"),
            external_tx_id: row.get("external_tx_id"),
            source_type: SourceType::from_str(&source_type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid source type: {}", source_type_str))?,
            direction: Direction::from_str(&direction_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid direction: {}", direction_str))?,
            amount: Money::from_cents(row.get("amount_cents")),
            applied_at: parse_timestamp(&applied_at_str).context("Invalid applied_at")?,
        })
    }
}

/// SQLite connection url for a database file path.
pub fn sqlite_url(database_path: &str) -> String {
    format!("sqlite:{}", database_path)
}

/// Roll back the unit of work before surfacing `err`.
/// Run `work` unless `expires_at` passes first. `None` means the deadline won.
async fn before<F: Future>(expires_at: Option<Instant>, work: F) -> Option<F::Output> {
    match expires_at {
        Some(at) => tokio::time::timeout_at(at, work).await.ok(),
        None => Some(work.await),
    }
}

/// Lock the account, check the new balance and stage the update and ledger
/// insert. Returns the balance before and after. Nothing is committed here.
async fn stage_entry(
    conn: &mut SqliteConnection,
    entry: &NewLedgerEntry,
    now: &str,
) -> Result<(Money, Money), StoreError> {
    // SQLite has no SELECT ... FOR UPDATE. Writing the row first takes the
    // database write lock before the balance is read.
    let locked = sqlx::query(
        r#"
        UPDATE accounts
        SET updated_at = ?
        WHERE id = ?
        RETURNING balance_cents
        "#,
    )
    .bind(now)
    .bind(entry.account_id)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to lock account")?;

    let Some(locked) = locked else {
        return Err(StoreError::AccountNotFound(entry.account_id));
    };
    let balance = Money::from_cents(locked.get("balance_cents"));

    let Some(new_balance) = entry.direction.apply(balance, entry.amount) else {
        return Err(StoreError::BalanceOverflow(entry.account_id));
    };
    if new_balance.is_negative() {
        return Err(StoreError::InsufficientBalance {
            account_id: entry.account_id,
            balance,
            required: entry.amount,
        });
    }

    sqlx::query("UPDATE accounts SET balance_cents = ? WHERE id = ?")
        .bind(new_balance.cents())
        .bind(entry.account_id)
        .execute(&mut *conn)
        .await
        .context("Failed to update balance")?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO ledger_entries (account_id, external_tx_id, source_type, direction, amount_cents, applied_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.account_id)
    .bind(&entry.external_tx_id)
    .bind(entry.source_type.as_str())
    .bind(entry.direction.as_str())
    .bind(entry.amount.cents())
    .bind(now)
    .execute(&mut *conn)
    .await;

    match inserted {
        Ok(_) => Ok((balance, new_balance)),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(StoreError::DuplicateTransaction(entry.external_tx_id.clone()))
        }
        Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
            Err(StoreError::AccountNotFound(entry.account_id))
        }
        Err(err) => Err(anyhow::Error::new(err)
            .context("Failed to insert ledger entry")
            .into()),
    }
}

async fn abort<T>(tx: Transaction<'_, Sqlite>, err: StoreError) -> Result<T, StoreError> {
    tx.rollback()
        .await
        .context("Failed to roll back transaction")?;
    Err(err)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp: {}", value))?
        .with_timezone(&Utc))
}
