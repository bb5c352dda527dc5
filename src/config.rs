use std::time::Duration;

use clap::ValueEnum;

/// What happens to a wallet's transactions when the wallet is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum WalletDeletePolicy {
    /// Refuse to delete a wallet that still has transactions
    #[default]
    Restrict,
    /// Delete the wallet together with all of its transactions
    Cascade,
}

impl WalletDeletePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletDeletePolicy::Restrict => "restrict",
            WalletDeletePolicy::Cascade => "cascade",
        }
    }
}

/// Runtime settings for the ledger and its database handle.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub max_connections: u32,
    /// How long a writer waits for the database lock before reporting a conflict
    pub busy_timeout: Duration,
    /// Attempts made for one atomic unit before giving up on write conflicts
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub wallet_delete_policy: WalletDeletePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "coinpurse.db".to_string(),
            max_connections: 5,
            busy_timeout: Duration::from_millis(5000),
            max_retries: 5,
            retry_backoff: Duration::from_millis(20),
            wallet_delete_policy: WalletDeletePolicy::Restrict,
        }
    }
}

impl Config {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Self::default()
        }
    }

    pub fn with_delete_policy(mut self, policy: WalletDeletePolicy) -> Self {
        self.wallet_delete_policy = policy;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// SQLite connection URL for the configured database path.
    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.database_path)
    }
}
