use std::future::Future;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, WalletDeletePolicy};
use crate::domain::{
    apply_transaction, build_integrity_report, format_cents, reverse_transaction,
    revise_transaction, Cents, IntegrityReport, Transaction, TransactionId, UserId, Wallet,
    WalletId, WalletStatus,
};
use crate::storage::Repository;

use super::command::{parse_category, NewTransaction, TransactionRequest, WalletRequest};
use super::{AppError, ValidationErrors};

/// Application service providing the wallet ledger operations.
/// This is the primary interface for any client (CLI, API, etc.).
///
/// Every balance mutation runs as one atomic unit that locks the owner's
/// wallet row before reading its balance, so concurrent mutations of the
/// same wallet are serialized and none of them is lost.
pub struct LedgerService {
    repo: Repository,
    config: Config,
}

/// Result of a balance-mutating transaction operation
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResult {
    pub transaction: Transaction,
    /// Wallet balance after the operation committed
    pub balance_cents: Cents,
}

/// A wallet's transactions with their total count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionList {
    pub transactions: Vec<Transaction>,
    pub total: usize,
}

impl TransactionList {
    fn new(transactions: Vec<Transaction>) -> Self {
        let total = transactions.len();
        Self {
            transactions,
            total,
        }
    }
}

/// Result of deleting a wallet
#[derive(Debug, Clone, Serialize)]
pub struct WalletDeletion {
    pub wallet: Wallet,
    pub removed_transactions: u64,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository, config: Config) -> Self {
        Self { repo, config }
    }

    /// Initialize the configured database, creating it if needed.
    pub async fn init(config: Config) -> Result<Self, AppError> {
        let repo = Repository::init(&config).await?;
        Ok(Self::new(repo, config))
    }

    /// Connect to an existing database.
    pub async fn connect(config: Config) -> Result<Self, AppError> {
        let repo = Repository::connect_with(&config).await?;
        Ok(Self::new(repo, config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Close the database handle.
    pub async fn close(self) {
        self.repo.close().await;
    }

    // ========================
    // Wallet operations
    // ========================

    /// Provision the caller's wallet. Each user owns at most one.
    pub async fn create_wallet(
        &self,
        owner: UserId,
        request: &WalletRequest,
    ) -> Result<Wallet, AppError> {
        let command = request.validate()?;
        let wallet = Wallet::new(owner, command.opening_balance_cents);

        let inserted = self
            .with_retry("create_wallet", || self.repo.save_wallet(&wallet))
            .await?;
        if !inserted {
            return Err(AppError::WalletAlreadyExists(owner));
        }

        info!(
            wallet_id = %wallet.id,
            user_id = owner,
            balance = %format_cents(wallet.balance_cents),
            "wallet created"
        );
        Ok(wallet)
    }

    /// Get the caller's wallet.
    pub async fn get_wallet(&self, owner: UserId) -> Result<Wallet, AppError> {
        self.repo
            .get_wallet_by_user(owner)
            .await?
            .ok_or(AppError::WalletNotFound)
    }

    /// Get any wallet by ID.
    pub async fn get_wallet_by_id(&self, id: WalletId) -> Result<Wallet, AppError> {
        self.repo
            .get_wallet(id)
            .await?
            .ok_or(AppError::WalletNotFound)
    }

    /// List all wallets.
    pub async fn list_wallets(&self) -> Result<Vec<Wallet>, AppError> {
        Ok(self.repo.list_wallets().await?)
    }

    /// Freeze or unfreeze a wallet.
    pub async fn set_wallet_status(
        &self,
        id: WalletId,
        status: WalletStatus,
    ) -> Result<Wallet, AppError> {
        let wallet = self
            .with_retry("set_wallet_status", || {
                self.repo.set_wallet_status(id, status)
            })
            .await?
            .ok_or(AppError::WalletNotFound)?;

        info!(wallet_id = %id, status = %status, "wallet status changed");
        Ok(wallet)
    }

    /// Delete a wallet according to the configured delete policy.
    pub async fn delete_wallet(&self, id: WalletId) -> Result<WalletDeletion, AppError> {
        let deletion = self
            .with_retry("delete_wallet", || self.try_delete_wallet(id))
            .await?;

        info!(
            wallet_id = %id,
            policy = self.config.wallet_delete_policy.as_str(),
            removed_transactions = deletion.removed_transactions,
            "wallet deleted"
        );
        Ok(deletion)
    }

    async fn try_delete_wallet(&self, id: WalletId) -> Result<WalletDeletion, AppError> {
        let mut tx = self.repo.begin().await?;

        let wallet = Repository::lock_wallet(&mut tx, id)
            .await?
            .ok_or(AppError::WalletNotFound)?;

        let count = Repository::count_transactions(&mut *tx, id).await?;
        let removed_transactions = match self.config.wallet_delete_policy {
            WalletDeletePolicy::Restrict if count > 0 => {
                return Err(AppError::WalletHasTransactions(count));
            }
            WalletDeletePolicy::Restrict => 0,
            WalletDeletePolicy::Cascade => {
                Repository::delete_transactions_for_wallet(&mut tx, id).await?
            }
        };
        Repository::delete_wallet_row(&mut tx, id).await?;

        tx.commit().await.context("Failed to commit wallet deletion")?;

        Ok(WalletDeletion {
            wallet,
            removed_transactions,
        })
    }

    // ========================
    // Transaction operations
    // ========================

    /// Record a transaction against the caller's wallet and apply it to the balance.
    pub async fn create_transaction(
        &self,
        owner: UserId,
        request: &TransactionRequest,
    ) -> Result<TransactionResult, AppError> {
        let command = request.validate()?;
        let result = self
            .with_retry("create_transaction", || {
                self.try_create_transaction(owner, command)
            })
            .await?;

        info!(
            transaction_id = %result.transaction.id,
            wallet_id = %result.transaction.wallet_id,
            kind = %result.transaction.kind,
            amount = %format_cents(result.transaction.amount_cents),
            balance = %format_cents(result.balance_cents),
            "transaction created"
        );
        Ok(result)
    }

    async fn try_create_transaction(
        &self,
        owner: UserId,
        command: NewTransaction,
    ) -> Result<TransactionResult, AppError> {
        let mut tx = self.repo.begin().await?;

        let wallet = Repository::lock_wallet_for_user(&mut tx, owner)
            .await?
            .ok_or(AppError::WalletNotFound)?;
        if wallet.is_frozen() {
            return Err(AppError::WalletFrozen);
        }

        let balance_cents =
            apply_transaction(wallet.balance_cents, command.kind, command.amount_cents)
                .ok_or_else(balance_overflow)?;

        let mut transaction = Transaction::new(
            wallet.id,
            command.kind,
            command.amount_cents,
            command.category,
        );
        Repository::insert_transaction(&mut tx, &mut transaction).await?;
        Repository::write_balance(&mut tx, wallet.id, balance_cents, transaction.created_at)
            .await?;

        tx.commit().await.context("Failed to commit transaction")?;

        Ok(TransactionResult {
            transaction,
            balance_cents,
        })
    }

    /// Replace a transaction's type, amount and category, re-deriving the
    /// wallet balance from the old and new effects.
    pub async fn update_transaction(
        &self,
        owner: UserId,
        id: TransactionId,
        request: &TransactionRequest,
    ) -> Result<TransactionResult, AppError> {
        let command = request.validate()?;
        let result = self
            .with_retry("update_transaction", || {
                self.try_update_transaction(owner, id, command)
            })
            .await?;

        info!(
            transaction_id = %id,
            wallet_id = %result.transaction.wallet_id,
            balance = %format_cents(result.balance_cents),
            "transaction updated"
        );
        Ok(result)
    }

    async fn try_update_transaction(
        &self,
        owner: UserId,
        id: TransactionId,
        command: NewTransaction,
    ) -> Result<TransactionResult, AppError> {
        let mut tx = self.repo.begin().await?;

        let wallet = Repository::lock_wallet_for_user(&mut tx, owner)
            .await?
            .ok_or(AppError::WalletNotFound)?;
        if wallet.is_frozen() {
            return Err(AppError::WalletFrozen);
        }

        let existing = Repository::find_transaction(&mut *tx, wallet.id, id)
            .await?
            .ok_or(AppError::TransactionNotFound)?;

        let balance_cents = revise_transaction(
            wallet.balance_cents,
            &existing,
            command.kind,
            command.amount_cents,
        )
        .ok_or_else(balance_overflow)?;

        let transaction = Transaction {
            kind: command.kind,
            amount_cents: command.amount_cents,
            category: command.category,
            updated_at: Utc::now(),
            ..existing
        };
        Repository::update_transaction_row(&mut tx, &transaction).await?;
        Repository::write_balance(&mut tx, wallet.id, balance_cents, transaction.updated_at)
            .await?;

        tx.commit().await.context("Failed to commit transaction update")?;

        Ok(TransactionResult {
            transaction,
            balance_cents,
        })
    }

    /// Delete a transaction and reverse its effect on the wallet balance.
    /// Returns the deleted transaction.
    pub async fn delete_transaction(
        &self,
        owner: UserId,
        id: TransactionId,
    ) -> Result<TransactionResult, AppError> {
        let result = self
            .with_retry("delete_transaction", || {
                self.try_delete_transaction(owner, id)
            })
            .await?;

        info!(
            transaction_id = %id,
            wallet_id = %result.transaction.wallet_id,
            balance = %format_cents(result.balance_cents),
            "transaction deleted"
        );
        Ok(result)
    }

    async fn try_delete_transaction(
        &self,
        owner: UserId,
        id: TransactionId,
    ) -> Result<TransactionResult, AppError> {
        let mut tx = self.repo.begin().await?;

        let wallet = Repository::lock_wallet_for_user(&mut tx, owner)
            .await?
            .ok_or(AppError::WalletNotFound)?;
        if wallet.is_frozen() {
            return Err(AppError::WalletFrozen);
        }

        let existing = Repository::find_transaction(&mut *tx, wallet.id, id)
            .await?
            .ok_or(AppError::TransactionNotFound)?;

        let balance_cents =
            reverse_transaction(wallet.balance_cents, &existing).ok_or_else(balance_overflow)?;

        Repository::delete_transaction_row(&mut tx, wallet.id, id).await?;
        Repository::write_balance(&mut tx, wallet.id, balance_cents, Utc::now()).await?;

        tx.commit().await.context("Failed to commit transaction deletion")?;

        Ok(TransactionResult {
            transaction: existing,
            balance_cents,
        })
    }

    /// Get one of the caller's transactions.
    pub async fn get_transaction(
        &self,
        owner: UserId,
        id: TransactionId,
    ) -> Result<Transaction, AppError> {
        let wallet = self.get_wallet(owner).await?;
        self.repo
            .get_transaction(wallet.id, id)
            .await?
            .ok_or(AppError::TransactionNotFound)
    }

    /// List all of the caller's transactions in recording order.
    pub async fn list_transactions(&self, owner: UserId) -> Result<TransactionList, AppError> {
        let wallet = self.get_wallet(owner).await?;
        let transactions = self.repo.list_transactions(wallet.id, None).await?;
        debug!(wallet_id = %wallet.id, total = transactions.len(), "listed transactions");
        Ok(TransactionList::new(transactions))
    }

    /// List the caller's transactions filed under exactly `category`.
    pub async fn filter_by_category(
        &self,
        owner: UserId,
        category: Option<&str>,
    ) -> Result<TransactionList, AppError> {
        let category = parse_category(category)?;
        let wallet = self.get_wallet(owner).await?;
        let transactions = self
            .repo
            .list_transactions(wallet.id, Some(category))
            .await?;
        debug!(
            wallet_id = %wallet.id,
            category = %category,
            total = transactions.len(),
            "filtered transactions"
        );
        Ok(TransactionList::new(transactions))
    }

    // ========================
    // Integrity operations
    // ========================

    /// Replay every wallet's history and compare it with the stored balance.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let snapshot = self.repo.integrity_snapshot().await?;
        let report = build_integrity_report(
            &snapshot.wallets,
            &snapshot.effects,
            snapshot.transaction_count,
        );
        if !report.is_healthy() {
            warn!(
                mismatches = report.mismatches.len(),
                "wallet balances disagree with transaction history"
            );
        }
        Ok(report)
    }

    /// Run `unit` until it succeeds, fails for a reason other than a write
    /// conflict, or runs out of attempts.
    async fn with_retry<T, E, F, Fut>(
        &self,
        operation: &'static str,
        mut unit: F,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<AppError>,
    {
        let mut attempt: u32 = 1;
        loop {
            match unit().await.map_err(Into::into) {
                Err(err) if err.is_write_conflict() && attempt < self.config.max_retries => {
                    warn!(operation, attempt, error = %err, "write conflict, retrying");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

fn balance_overflow() -> AppError {
    ValidationErrors::single("amount", "Amount would overflow the wallet balance").into()
}
