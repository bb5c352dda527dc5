// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use coinpurse::application::{LedgerService, TransactionRequest, WalletRequest};
use coinpurse::config::{Config, WalletDeletePolicy};
use coinpurse::domain::{Cents, Wallet};
use tempfile::TempDir;

/// Config pointing at a fresh database file inside `temp_dir`
pub fn test_config(temp_dir: &TempDir) -> Config {
    let db_path = temp_dir.path().join("test.db");
    Config::new(db_path.to_string_lossy())
}

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    test_service_with_policy(WalletDeletePolicy::Restrict).await
}

/// Helper to create a test service with a specific wallet delete policy
pub async fn test_service_with_policy(
    policy: WalletDeletePolicy,
) -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let config = test_config(&temp_dir).with_delete_policy(policy);
    let service = LedgerService::init(config).await?;
    Ok((service, temp_dir))
}

/// Create a wallet for `user` with the given opening balance
pub async fn open_wallet(service: &LedgerService, user: i64, balance: &str) -> Result<Wallet> {
    Ok(service
        .create_wallet(user, &WalletRequest::with_balance(balance))
        .await?)
}

/// Record a transaction and return the balance after it
pub async fn record(
    service: &LedgerService,
    user: i64,
    kind: &str,
    amount: &str,
    category: &str,
) -> Result<Cents> {
    let result = service
        .create_transaction(user, &TransactionRequest::new(kind, amount, category))
        .await?;
    Ok(result.balance_cents)
}
