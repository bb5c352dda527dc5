use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use uuid::Uuid;

use crate::application::{
    AppError, LedgerService, TransactionList, TransactionRequest, ValidationErrors, WalletRequest,
};
use crate::config::{Config, WalletDeletePolicy};
use crate::domain::{format_cents, Transaction, UserId, Wallet, WalletStatus};

/// Coinpurse - per-user wallet ledger
#[derive(Parser)]
#[command(name = "coinpurse")]
#[command(about = "Record income and expenses against per-user wallets")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "COINPURSE_DATABASE", default_value = "coinpurse.db")]
    pub database: String,

    /// Maximum number of pooled database connections
    #[arg(long, env = "COINPURSE_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Milliseconds a writer waits for the database lock
    #[arg(long, env = "COINPURSE_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,

    /// Attempts per atomic unit before a write conflict is reported
    #[arg(long, env = "COINPURSE_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    /// What deleting a wallet does with its transactions
    #[arg(
        long,
        env = "COINPURSE_WALLET_DELETE_POLICY",
        value_enum,
        default_value_t = WalletDeletePolicy::Restrict
    )]
    pub wallet_delete_policy: WalletDeletePolicy,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Wallet management commands
    #[command(subcommand)]
    Wallet(WalletCommands),

    /// Transaction commands for a user's wallet
    #[command(subcommand, name = "tx")]
    Transaction(TransactionCommands),

    /// Verify every wallet balance against its transaction history
    Check,

    /// Export a user's data to CSV or JSON
    Export {
        /// What to export: transactions, wallet
        export_type: String,

        /// Authenticated user ID
        #[arg(long)]
        user: UserId,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Create the caller's wallet
    Create {
        /// Authenticated user ID
        #[arg(long)]
        user: UserId,

        /// Opening balance (e.g., "100.00"), defaults to 0
        #[arg(short, long)]
        balance: Option<String>,
    },

    /// Show the caller's wallet
    Show {
        /// Authenticated user ID
        #[arg(long)]
        user: UserId,
    },

    /// List all wallets
    List,

    /// Show any wallet by ID
    Get {
        /// Wallet ID
        id: String,
    },

    /// Freeze a wallet, rejecting balance changes
    Freeze {
        /// Wallet ID
        id: String,
    },

    /// Unfreeze a wallet
    Unfreeze {
        /// Wallet ID
        id: String,
    },

    /// Delete a wallet (see --wallet-delete-policy)
    Delete {
        /// Wallet ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum TransactionCommands {
    /// Record a transaction
    Add {
        /// Authenticated user ID
        #[arg(long)]
        user: UserId,

        /// Income or Expense
        #[arg(short = 't', long = "type")]
        kind: String,

        /// Amount (e.g., "50.00" or "50")
        #[arg(short, long)]
        amount: String,

        /// One of: Salary, Food, Savings, Transportation
        #[arg(short, long)]
        category: String,
    },

    /// List the caller's transactions
    List {
        /// Authenticated user ID
        #[arg(long)]
        user: UserId,
    },

    /// List the caller's transactions in one category
    Filter {
        /// Authenticated user ID
        #[arg(long)]
        user: UserId,

        /// Category to match exactly
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Show one transaction
    Show {
        /// Authenticated user ID
        #[arg(long)]
        user: UserId,

        /// Transaction ID
        id: String,
    },

    /// Replace a transaction's type, amount and category
    Edit {
        /// Authenticated user ID
        #[arg(long)]
        user: UserId,

        /// Transaction ID
        id: String,

        /// Income or Expense
        #[arg(short = 't', long = "type")]
        kind: String,

        /// Amount (e.g., "50.00" or "50")
        #[arg(short, long)]
        amount: String,

        /// One of: Salary, Food, Savings, Transportation
        #[arg(short, long)]
        category: String,
    },

    /// Delete a transaction and reverse its effect on the balance
    Delete {
        /// Authenticated user ID
        #[arg(long)]
        user: UserId,

        /// Transaction ID
        id: String,
    },
}

impl Cli {
    /// Ledger configuration assembled from arguments and environment.
    pub fn config(&self) -> Config {
        Config {
            database_path: self.database.clone(),
            max_connections: self.max_connections,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            max_retries: self.max_retries,
            wallet_delete_policy: self.wallet_delete_policy,
            ..Config::default()
        }
    }

    /// Run the command and report any failure, returning the process exit code.
    pub async fn execute(self) -> ExitCode {
        let json = self.json;
        match self.run().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                report_error(&err, json);
                ExitCode::FAILURE
            }
        }
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config();
        let output = Output { json: self.json };

        match self.command {
            Commands::Init => {
                let service = LedgerService::init(config).await?;
                output.message(&format!("Database initialized: {}", self.database));
                service.close().await;
            }

            Commands::Wallet(wallet_cmd) => {
                let service = LedgerService::connect(config).await?;
                let result = run_wallet_command(&service, &output, wallet_cmd).await;
                service.close().await;
                result?;
            }

            Commands::Transaction(tx_cmd) => {
                let service = LedgerService::connect(config).await?;
                let result = run_transaction_command(&service, &output, tx_cmd).await;
                service.close().await;
                result?;
            }

            Commands::Check => {
                let service = LedgerService::connect(config).await?;
                let result = run_check_command(&service, &output).await;
                service.close().await;
                result?;
            }

            Commands::Export {
                export_type,
                user,
                output: path,
            } => {
                let service = LedgerService::connect(config).await?;
                let result = run_export_command(&service, &export_type, user, path.as_deref()).await;
                service.close().await;
                result?;
            }
        }

        Ok(())
    }
}

/// Renders command results either as text or as JSON shaped like
/// `{ "success": true, ... }`.
struct Output {
    json: bool,
}

impl Output {
    fn message(&self, message: &str) {
        if self.json {
            println!("{}", json!({ "success": true, "message": message }));
        } else {
            println!("{}", message);
        }
    }

    fn wallet(&self, message: &str, wallet: &Wallet) {
        if self.json {
            println!(
                "{}",
                json!({ "success": true, "message": message, "wallet": wallet_json(wallet) })
            );
        } else {
            println!("{}", message);
            print_wallet(wallet);
        }
    }

    fn transaction(&self, message: &str, transaction: &Transaction, balance: Option<i64>) {
        if self.json {
            let mut body = json!({
                "success": true,
                "message": message,
                "transaction": transaction_json(transaction),
            });
            if let Some(balance) = balance {
                body["balance"] = json!(format_cents(balance));
            }
            println!("{}", body);
        } else {
            println!("{}", message);
            print_transaction(transaction);
            if let Some(balance) = balance {
                println!("  Balance:   {}", format_cents(balance));
            }
        }
    }

    fn transactions(&self, list: &TransactionList) {
        if self.json {
            let transactions: Vec<_> = list.transactions.iter().map(transaction_json).collect();
            println!(
                "{}",
                json!({ "success": true, "transactions": transactions, "total": list.total })
            );
            return;
        }

        if list.transactions.is_empty() {
            println!("No transactions found.");
            return;
        }

        println!(
            "{:<36}  {:<8}  {:>12}  {:<14}  {}",
            "ID", "TYPE", "AMOUNT", "CATEGORY", "DATE"
        );
        println!("{}", "-".repeat(90));
        for transaction in &list.transactions {
            println!(
                "{:<36}  {:<8}  {:>12}  {:<14}  {}",
                transaction.id,
                transaction.kind,
                format_cents(transaction.amount_cents),
                transaction.category,
                transaction.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        println!("\nTotal: {}", list.total);
    }
}

fn wallet_json(wallet: &Wallet) -> serde_json::Value {
    json!({
        "id": wallet.id,
        "userId": wallet.user_id,
        "balance": format_cents(wallet.balance_cents),
        "status": wallet.status,
        "createdAt": wallet.created_at,
        "updatedAt": wallet.updated_at,
    })
}

fn transaction_json(transaction: &Transaction) -> serde_json::Value {
    json!({
        "id": transaction.id,
        "walletId": transaction.wallet_id,
        "type": transaction.kind,
        "amount": format_cents(transaction.amount_cents),
        "category": transaction.category,
        "createdAt": transaction.created_at,
        "updatedAt": transaction.updated_at,
    })
}

fn print_wallet(wallet: &Wallet) {
    println!("  ID:        {}", wallet.id);
    println!("  User:      {}", wallet.user_id);
    println!("  Balance:   {}", format_cents(wallet.balance_cents));
    println!("  Status:    {}", wallet.status);
    println!(
        "  Created:   {}",
        wallet.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn print_transaction(transaction: &Transaction) {
    println!("  ID:        {}", transaction.id);
    println!("  Type:      {}", transaction.kind);
    println!("  Amount:    {}", format_cents(transaction.amount_cents));
    println!("  Category:  {}", transaction.category);
    println!(
        "  Recorded:  {}",
        transaction.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

/// Print an error following the exposure policy: field detail for invalid
/// input, a bare message for lookups, nothing internal for everything else.
fn report_error(err: &anyhow::Error, json: bool) {
    let (message, fields) = match err.downcast_ref::<AppError>() {
        Some(AppError::Internal(inner)) => {
            tracing::error!(error = ?inner, "internal error");
            ("An internal error occurred".to_string(), None)
        }
        Some(AppError::Validation(errors)) => ("Validation failed".to_string(), Some(errors)),
        Some(app_err) => (app_err.to_string(), None),
        None => (format!("{:#}", err), None),
    };

    if json {
        let mut body = json!({ "success": false, "message": message });
        if let Some(errors) = fields {
            body["errors"] = json!(errors.errors);
        }
        println!("{}", body);
    } else {
        eprintln!("Error: {}", message);
        if let Some(errors) = fields {
            for error in &errors.errors {
                eprintln!("  {}: {}", error.field, error.message);
            }
        }
    }
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ValidationErrors::single("id", format!("Invalid {} ID", what)).into())
}

async fn run_wallet_command(
    service: &LedgerService,
    output: &Output,
    cmd: WalletCommands,
) -> Result<()> {
    match cmd {
        WalletCommands::Create { user, balance } => {
            let request = WalletRequest { balance };
            let wallet = service.create_wallet(user, &request).await?;
            output.wallet("Wallet created successfully", &wallet);
        }

        WalletCommands::Show { user } => {
            let wallet = service.get_wallet(user).await?;
            output.wallet("Wallet", &wallet);
        }

        WalletCommands::List => {
            let wallets = service.list_wallets().await?;
            if output.json {
                let wallets: Vec<_> = wallets.iter().map(wallet_json).collect();
                println!("{}", json!({ "success": true, "wallets": wallets }));
            } else if wallets.is_empty() {
                println!("No wallets found.");
            } else {
                println!("{:<36}  {:>8}  {:>14}  {:<8}", "ID", "USER", "BALANCE", "STATUS");
                println!("{}", "-".repeat(72));
                for wallet in wallets {
                    println!(
                        "{:<36}  {:>8}  {:>14}  {:<8}",
                        wallet.id,
                        wallet.user_id,
                        format_cents(wallet.balance_cents),
                        wallet.status
                    );
                }
            }
        }

        WalletCommands::Get { id } => {
            let wallet = service.get_wallet_by_id(parse_id(&id, "wallet")?).await?;
            output.wallet("Wallet", &wallet);
        }

        WalletCommands::Freeze { id } => {
            let wallet = service
                .set_wallet_status(parse_id(&id, "wallet")?, WalletStatus::Frozen)
                .await?;
            output.wallet("Wallet frozen", &wallet);
        }

        WalletCommands::Unfreeze { id } => {
            let wallet = service
                .set_wallet_status(parse_id(&id, "wallet")?, WalletStatus::Unfrozen)
                .await?;
            output.wallet("Wallet unfrozen", &wallet);
        }

        WalletCommands::Delete { id } => {
            let deletion = service.delete_wallet(parse_id(&id, "wallet")?).await?;
            output.message(&format!(
                "Wallet with ID {} deleted ({} transaction(s) removed)",
                deletion.wallet.id, deletion.removed_transactions
            ));
        }
    }
    Ok(())
}

async fn run_transaction_command(
    service: &LedgerService,
    output: &Output,
    cmd: TransactionCommands,
) -> Result<()> {
    match cmd {
        TransactionCommands::Add {
            user,
            kind,
            amount,
            category,
        } => {
            let request = TransactionRequest::new(kind, amount, category);
            let result = service.create_transaction(user, &request).await?;
            output.transaction(
                "Transaction created successfully",
                &result.transaction,
                Some(result.balance_cents),
            );
        }

        TransactionCommands::List { user } => {
            let list = service.list_transactions(user).await?;
            output.transactions(&list);
        }

        TransactionCommands::Filter { user, category } => {
            let list = service.filter_by_category(user, category.as_deref()).await?;
            output.transactions(&list);
        }

        TransactionCommands::Show { user, id } => {
            let transaction = service
                .get_transaction(user, parse_id(&id, "transaction")?)
                .await?;
            output.transaction("Transaction", &transaction, None);
        }

        TransactionCommands::Edit {
            user,
            id,
            kind,
            amount,
            category,
        } => {
            let id = parse_id(&id, "transaction")?;
            let request = TransactionRequest::new(kind, amount, category);
            let result = service.update_transaction(user, id, &request).await?;
            output.transaction(
                "Transaction updated successfully",
                &result.transaction,
                Some(result.balance_cents),
            );
        }

        TransactionCommands::Delete { user, id } => {
            let id = parse_id(&id, "transaction")?;
            let result = service.delete_transaction(user, id).await?;
            output.message(&format!(
                "Transaction with ID {} deleted successfully (balance {})",
                id,
                format_cents(result.balance_cents)
            ));
        }
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService, output: &Output) -> Result<()> {
    let report = service.check_integrity().await?;

    if output.json {
        println!(
            "{}",
            json!({ "success": report.is_healthy(), "report": report })
        );
        if !report.is_healthy() {
            anyhow::bail!(
                "{} wallet(s) disagree with their history",
                report.mismatches.len()
            );
        }
        return Ok(());
    }

    println!("Ledger integrity check");
    println!("  Wallets:       {}", report.wallet_count);
    println!("  Transactions:  {}", report.transaction_count);

    if report.is_healthy() {
        println!("\nAll wallet balances match their transaction history.");
    } else {
        println!("\nBalance mismatches:");
        for mismatch in &report.mismatches {
            println!(
                "  wallet {} (user {}): stored {}, expected {}",
                mismatch.wallet_id,
                mismatch.user_id,
                format_cents(mismatch.stored),
                format_cents(mismatch.expected)
            );
        }
        anyhow::bail!(
            "{} wallet(s) disagree with their history",
            report.mismatches.len()
        );
    }
    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    user: UserId,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    // Determine output writer
    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "transactions" => {
            let count = exporter.export_transactions_csv(user, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        "wallet" => {
            let snapshot = exporter.export_wallet_json(user, writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported wallet {} with {} transactions",
                    snapshot.wallet.id,
                    snapshot.transactions.len()
                );
            }
        }
        other => {
            anyhow::bail!(
                "Unknown export type '{}'. Valid types: transactions, wallet",
                other
            );
        }
    }

    Ok(())
}
