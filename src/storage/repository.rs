use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{
    Category, Cents, Transaction, TransactionId, TransactionType, UserId, Wallet, WalletId,
    WalletStatus,
};

use super::MIGRATION_001_INITIAL;

const WALLET_COLUMNS: &str = "id, user_id, balance_cents, opening_balance_cents, status, version, created_at, updated_at";

const TRANSACTION_COLUMNS: &str =
    "id, sequence, wallet_id, type, amount_cents, category, created_at, updated_at";

/// Raw data for ledger integrity verification.
#[derive(Debug, Clone)]
pub struct IntegritySnapshot {
    pub wallets: Vec<Wallet>,
    /// Summed balance effect of each wallet's transactions
    pub effects: HashMap<WalletId, Cents>,
    pub transaction_count: i64,
}

/// An open atomic unit. Dropping it without committing rolls it back.
pub type UnitOfWork = sqlx::Transaction<'static, Sqlite>;

/// Repository for persisting and querying wallets and transactions.
///
/// Reads go through the pool. Writes that must be serialized against each
/// other run inside a [`UnitOfWork`] via the associated functions that take a
/// `&mut SqliteConnection`, starting with [`Repository::lock_wallet_for_user`]
/// or [`Repository::lock_wallet`].
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a connection pool for an existing database.
    pub async fn connect_with(config: &Config) -> Result<Self> {
        Self::open(config, false).await
    }

    async fn open(config: &Config, create_if_missing: bool) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url())
            .context("Invalid database path")?
            .create_if_missing(create_if_missing)
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

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    /// Creates the database file if it doesn't exist.
    pub async fn init(config: &Config) -> Result<Self> {
        let repo = Self::open(config, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Close every pooled connection. Pending units must be finished first.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Start an atomic unit of work.
    pub async fn begin(&self) -> Result<UnitOfWork> {
        self.pool
            .begin()
            .await
            .context("Failed to begin database transaction")
    }

    // ========================
    // Wallet operations
    // ========================

    /// Insert a new wallet unless its owner already has one.
    /// Returns `false` when the owner already has a wallet.
    pub async fn save_wallet(&self, wallet: &Wallet) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO wallets (id, user_id, balance_cents, opening_balance_cents, status, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(wallet.id.to_string())
        .bind(wallet.user_id)
        .bind(wallet.balance_cents)
        .bind(wallet.opening_balance_cents)
        .bind(wallet.status.as_str())
        .bind(wallet.version)
        .bind(wallet.created_at.to_rfc3339())
        .bind(wallet.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save wallet")?;
        Ok(result.rows_affected() == 1)
    }

    /// Get a wallet by ID.
    pub async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        let row = sqlx::query(&format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch wallet")?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    /// Get the wallet owned by a user.
    pub async fn get_wallet_by_user(&self, user_id: UserId) -> Result<Option<Wallet>> {
        let row = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = ?"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch wallet by user")?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    /// List all wallets, ordered by owner.
    pub async fn list_wallets(&self) -> Result<Vec<Wallet>> {
        let rows = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets ORDER BY user_id"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list wallets")?;

        rows.iter().map(Self::row_to_wallet).collect()
    }

    /// Set a wallet's status in a single statement.
    pub async fn set_wallet_status(
        &self,
        id: WalletId,
        status: WalletStatus,
    ) -> Result<Option<Wallet>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE wallets
            SET status = ?, version = version + 1, updated_at = ?
            WHERE id = ?
            RETURNING {WALLET_COLUMNS}
            "#
        ))
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update wallet status")?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    /// Take the write lock on a user's wallet row and return its current state.
    ///
    /// Must be the first statement of the unit: the version bump makes SQLite
    /// grant the write lock before anything is read, so concurrent units on
    /// the same wallet wait here instead of reading a stale balance.
    pub async fn lock_wallet_for_user(
        conn: &mut SqliteConnection,
        user_id: UserId,
    ) -> Result<Option<Wallet>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE wallets
            SET version = version + 1
            WHERE user_id = ?
            RETURNING {WALLET_COLUMNS}
            "#
        ))
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to lock wallet")?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    /// Same as [`Repository::lock_wallet_for_user`], keyed by wallet ID.
    pub async fn lock_wallet(conn: &mut SqliteConnection, id: WalletId) -> Result<Option<Wallet>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE wallets
            SET version = version + 1
            WHERE id = ?
            RETURNING {WALLET_COLUMNS}
            "#
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to lock wallet")?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    /// Write a new balance for a locked wallet.
    pub async fn write_balance(
        conn: &mut SqliteConnection,
        id: WalletId,
        balance_cents: Cents,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE wallets SET balance_cents = ?, updated_at = ? WHERE id = ?")
            .bind(balance_cents)
            .bind(updated_at.to_rfc3339())
            .bind(id.to_string())
            .execute(&mut *conn)
            .await
            .context("Failed to write wallet balance")?;
        Ok(())
    }

    /// Delete a locked wallet row.
    pub async fn delete_wallet_row(conn: &mut SqliteConnection, id: WalletId) -> Result<()> {
        sqlx::query("DELETE FROM wallets WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await
            .context("Failed to delete wallet")?;
        Ok(())
    }

    fn row_to_wallet(row: &SqliteRow) -> Result<Wallet> {
        let id_str: String = row.get("id");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(Wallet {
            id: Uuid::parse_str(&id_str).context("Invalid wallet ID")?,
            user_id: row.get("user_id"),
            balance_cents: row.get("balance_cents"),
            opening_balance_cents: row.get("opening_balance_cents"),
            status: WalletStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid wallet status: {}", status_str))?,
            version: row.get("version"),
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
            updated_at: parse_timestamp(&updated_at_str).context("Invalid updated_at timestamp")?,
        })
    }

    // ========================
    // Transaction operations
    // ========================

    /// Insert a new transaction row.
    /// Automatically assigns the next sequence number.
    pub async fn insert_transaction(
        conn: &mut SqliteConnection,
        transaction: &mut Transaction,
    ) -> Result<()> {
        transaction.sequence = Self::next_sequence(conn).await?;

        sqlx::query(&format!(
            "INSERT INTO transactions ({TRANSACTION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(transaction.id.to_string())
        .bind(transaction.sequence)
        .bind(transaction.wallet_id.to_string())
        .bind(transaction.kind.as_str())
        .bind(transaction.amount_cents)
        .bind(transaction.category.as_str())
        .bind(transaction.created_at.to_rfc3339())
        .bind(transaction.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .context("Failed to save transaction")?;

        Ok(())
    }

    /// Get the next sequence number and increment the counter.
    async fn next_sequence(conn: &mut SqliteConnection) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'transaction_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut *conn)
        .await
        .context("Failed to get next sequence number")?;

        Ok(row.get("value"))
    }

    /// Overwrite the mutable fields of an existing transaction row.
    pub async fn update_transaction_row(
        conn: &mut SqliteConnection,
        transaction: &Transaction,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET type = ?, amount_cents = ?, category = ?, updated_at = ?
            WHERE id = ? AND wallet_id = ?
            "#,
        )
        .bind(transaction.kind.as_str())
        .bind(transaction.amount_cents)
        .bind(transaction.category.as_str())
        .bind(transaction.updated_at.to_rfc3339())
        .bind(transaction.id.to_string())
        .bind(transaction.wallet_id.to_string())
        .execute(&mut *conn)
        .await
        .context("Failed to update transaction")?;
        Ok(())
    }

    /// Delete a transaction row.
    pub async fn delete_transaction_row(
        conn: &mut SqliteConnection,
        wallet_id: WalletId,
        id: TransactionId,
    ) -> Result<()> {
        sqlx::query("DELETE FROM transactions WHERE id = ? AND wallet_id = ?")
            .bind(id.to_string())
            .bind(wallet_id.to_string())
            .execute(&mut *conn)
            .await
            .context("Failed to delete transaction")?;
        Ok(())
    }

    /// Delete every transaction of a wallet. Returns how many were removed.
    pub async fn delete_transactions_for_wallet(
        conn: &mut SqliteConnection,
        wallet_id: WalletId,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM transactions WHERE wallet_id = ?")
            .bind(wallet_id.to_string())
            .execute(&mut *conn)
            .await
            .context("Failed to delete wallet transactions")?;
        Ok(result.rows_affected())
    }

    /// Count the transactions of a wallet.
    pub async fn count_transactions<'e, E>(executor: E, wallet_id: WalletId) -> Result<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query("SELECT COUNT(*) as count FROM transactions WHERE wallet_id = ?")
            .bind(wallet_id.to_string())
            .fetch_one(executor)
            .await
            .context("Failed to count transactions")?;
        Ok(row.get("count"))
    }

    /// Find a transaction by ID, scoped to the wallet that owns it.
    /// A transaction of another wallet is reported as absent.
    pub async fn find_transaction<'e, E>(
        executor: E,
        wallet_id: WalletId,
        id: TransactionId,
    ) -> Result<Option<Transaction>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ? AND wallet_id = ?"
        ))
        .bind(id.to_string())
        .bind(wallet_id.to_string())
        .fetch_optional(executor)
        .await
        .context("Failed to fetch transaction")?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    /// Get a transaction of a wallet from the pool.
    pub async fn get_transaction(
        &self,
        wallet_id: WalletId,
        id: TransactionId,
    ) -> Result<Option<Transaction>> {
        Self::find_transaction(&self.pool, wallet_id, id).await
    }

    /// List a wallet's transactions, optionally restricted to one category,
    /// ordered by sequence number.
    pub async fn list_transactions(
        &self,
        wallet_id: WalletId,
        category: Option<Category>,
    ) -> Result<Vec<Transaction>> {
        let mut query = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE wallet_id = ?");
        if category.is_some() {
            query.push_str(" AND category = ?");
        }
        query.push_str(" ORDER BY sequence");

        let mut sql_query = sqlx::query(&query).bind(wallet_id.to_string());
        if let Some(category) = category {
            sql_query = sql_query.bind(category.as_str());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// Read every wallet, the summed balance effect of each wallet's
    /// transactions, and the transaction count from one consistent snapshot.
    pub async fn integrity_snapshot(&self) -> Result<IntegritySnapshot> {
        let mut tx = self.begin().await?;

        let wallet_rows = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets ORDER BY user_id"
        ))
        .fetch_all(&mut *tx)
        .await
        .context("Failed to list wallets")?;
        let wallets = wallet_rows
            .iter()
            .map(Self::row_to_wallet)
            .collect::<Result<Vec<_>>>()?;

        // Wallets with no transactions won't be in the map
        let effect_rows = sqlx::query(
            r#"
            SELECT
                wallet_id,
                SUM(CASE WHEN type = 'Income' THEN amount_cents ELSE -amount_cents END) as effect
            FROM transactions
            GROUP BY wallet_id
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .context("Failed to sum transaction effects")?;

        let mut effects = HashMap::new();
        for row in effect_rows {
            let wallet_id_str: String = row.get("wallet_id");
            let effect: Cents = row.get("effect");
            let wallet_id = Uuid::parse_str(&wallet_id_str).context("Invalid wallet ID")?;
            effects.insert(wallet_id, effect);
        }

        let transaction_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM transactions")
            .fetch_one(&mut *tx)
            .await
            .context("Failed to count transactions")?
            .get("count");

        tx.commit().await.context("Failed to finish integrity snapshot")?;

        Ok(IntegritySnapshot {
            wallets,
            effects,
            transaction_count,
        })
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let wallet_str: String = row.get("wallet_id");
        let type_str: String = row.get("type");
        let category_str: String = row.get("category");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            sequence: row.get("sequence"),
            wallet_id: Uuid::parse_str(&wallet_str).context("Invalid wallet ID")?,
            kind: TransactionType::from_str(&type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", type_str))?,
            amount_cents: row.get("amount_cents"),
            category: Category::from_str(&category_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid category: {}", category_str))?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
            updated_at: parse_timestamp(&updated_at_str).context("Invalid updated_at timestamp")?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
