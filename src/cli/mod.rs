use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::{self, ApiState};
use crate::application::{LedgerService, TransactionOutcome, TransactionRequest};
use crate::domain::AccountId;
use crate::storage::{sqlite_url, Repository, StoreConfig};

/// Pause between database connection attempts at startup
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Wallet Ledger - idempotent win/lose transactions over user balances
#[derive(Parser)]
#[command(name = "wallet-ledger")]
#[command(about = "A wallet ledger service applying idempotent win/lose transactions")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "DATABASE_PATH", default_value = "wallet.db", global = true)]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init {
        /// Do not create the default accounts (1, 2, 3)
        #[arg(long)]
        no_seed: bool,
    },

    /// Run the HTTP server
    Serve(ServeArgs),

    /// Show the balance of an account
    Balance {
        /// Account (user) id
        account: AccountId,
    },

    /// Apply a win/lose transaction to an account
    Transaction {
        /// Account (user) id
        account: AccountId,

        /// "win" credits the account, "lose" debits it
        #[arg(long)]
        state: String,

        /// Amount (e.g., "25.50" or "25")
        #[arg(short, long)]
        amount: String,

        /// External transaction id (idempotency key)
        #[arg(long = "id")]
        transaction_id: String,

        /// Source type: game, server, payment
        #[arg(short, long, default_value = "server")]
        source: String,
    },

    /// List applied transactions of an account
    History {
        /// Account (user) id
        account: AccountId,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Export an account's applied transactions to CSV
    Export {
        /// Account (user) id
        account: AccountId,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Settings for the HTTP server and its connection pool.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Deployment environment reported by /health
    #[arg(long = "env", env = "APP_ENV", default_value = "development")]
    pub environment: String,

    /// Seconds to wait for in-flight requests on shutdown
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 30)]
    pub shutdown_timeout: u64,

    /// Seconds one transaction may take before it is rolled back (0 disables)
    #[arg(long, env = "TRANSACTION_TIMEOUT", default_value_t = 15)]
    pub transaction_timeout: u64,

    /// Maximum pooled database connections
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 25)]
    pub max_connections: u32,

    /// Seconds a writer waits for the database lock
    #[arg(long, env = "DB_BUSY_TIMEOUT", default_value_t = 5)]
    pub busy_timeout: u64,

    /// Database connection attempts before giving up
    #[arg(long, env = "DB_CONNECT_ATTEMPTS", default_value_t = 5)]
    pub connect_attempts: u32,

    /// Do not create the default accounts (1, 2, 3)
    #[arg(long)]
    pub no_seed: bool,
}

impl ServeArgs {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_connections: self.max_connections,
            busy_timeout: Duration::from_secs(self.busy_timeout),
            create_if_missing: true,
        }
    }

    pub fn transaction_deadline(&self) -> Option<Duration> {
        (self.transaction_timeout > 0).then(|| Duration::from_secs(self.transaction_timeout))
    }
}

impl Cli {
    /// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
    pub fn init_logging(&self) {
        let default_filter = if self.verbose {
            "wallet_ledger=debug,tower_http=debug"
        } else {
            "wallet_ledger=info,tower_http=info"
        };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);
        if self.json_logs {
            builder.json().init();
        } else {
            builder.init();
        }
    }

    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init { no_seed } => {
                let service = LedgerService::init(&self.database).await?;
                if !no_seed {
                    service.repository().seed_default_accounts().await?;
                }
                println!("Database initialized: {}", self.database);
            }

            Commands::Serve(args) => {
                run_serve(&self.database, args).await?;
            }

            Commands::Balance { account } => {
                let service = LedgerService::connect(&self.database).await?;
                let view = service.query_balance(account).await?;
                println!("Account {}: {}", view.account_id, view.balance);
            }

            Commands::Transaction {
                account,
                state,
                amount,
                transaction_id,
                source,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let request = TransactionRequest {
                    state,
                    amount: amount.trim().to_string(),
                    transaction_id,
                };

                match service
                    .process_transaction(account, &request, &source)
                    .await?
                {
                    TransactionOutcome::Applied { balance } => println!(
                        "Applied {} {} to account {} ({}): balance {}",
                        request.state, request.amount, account, request.transaction_id, balance
                    ),
                    TransactionOutcome::AlreadyApplied => println!(
                        "Transaction {} already processed",
                        request.transaction_id
                    ),
                }
            }

            Commands::History { account, format } => {
                let service = LedgerService::connect(&self.database).await?;
                run_history_command(&service, account, &format).await?;
            }

            Commands::Export { account, output } => {
                let service = LedgerService::connect(&self.database).await?;
                run_export_command(&service, account, output.as_deref()).await?;
            }
        }

        Ok(())
    }
}

async fn run_serve(database: &str, args: ServeArgs) -> Result<()> {
    let repo = Repository::connect_with_retry(
        &sqlite_url(database),
        &args.store_config(),
        args.connect_attempts,
        CONNECT_RETRY_DELAY,
    )
    .await?;
    repo.migrate().await?;
    if !args.no_seed {
        repo.seed_default_accounts().await?;
    }

    let mut service = LedgerService::new(repo.clone());
    if let Some(deadline) = args.transaction_deadline() {
        service = service.with_deadline(deadline);
    }

    let listener = TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", args.host, args.port))?;
    info!(
        env = %args.environment,
        database,
        transaction_timeout = ?args.transaction_deadline(),
        "starting wallet ledger"
    );

    let state = ApiState::new(service, args.environment.clone());
    let result = api::serve(listener, state, Duration::from_secs(args.shutdown_timeout)).await;
    repo.close().await;
    result
}

async fn run_history_command(
    service: &LedgerService,
    account: AccountId,
    format: &str,
) -> Result<()> {
    let entries = service.list_entries(account).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        "table" => {
            if entries.is_empty() {
                println!("No transactions for account {}.", account);
                return Ok(());
            }
            println!(
                "{:<6} {:<24} {:<8} {:<5} {:>12}  {}",
                "ID", "TRANSACTION", "SOURCE", "STATE", "AMOUNT", "APPLIED"
            );
            println!("{}", "-".repeat(80));
            for entry in &entries {
                println!(
                    "{:<6} {:<24} {:<8} {:<5} {:>12}  {}",
                    entry.id,
                    entry.external_tx_id,
                    entry.source_type,
                    entry.direction,
                    entry.amount.to_string(),
                    entry.applied_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        _ => anyhow::bail!("Invalid format '{}'. Valid formats: table, json", format),
    }

    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    account: AccountId,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::export::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    let count = exporter.export_entries_csv(account, writer).await?;
    if output.is_some() {
        eprintln!("Exported {} transactions", count);
    }
    Ok(())
}
