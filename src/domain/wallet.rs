use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type WalletId = Uuid;

/// Identifier of the authenticated user that owns a wallet.
pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    /// Accepts balance-mutating operations
    Unfrozen,
    /// Rejects balance-mutating operations until an operator unfreezes it
    Frozen,
}

impl WalletStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::Unfrozen => "unfrozen",
            WalletStatus::Frozen => "frozen",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "unfrozen" => Some(WalletStatus::Unfrozen),
            "frozen" => Some(WalletStatus::Frozen),
            _ => None,
        }
    }
}

impl std::fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    #[serde(rename = "balance", with = "super::cents_string")]
    pub balance_cents: Cents,
    /// Balance the wallet was provisioned with, used to replay its history
    #[serde(rename = "opening_balance", with = "super::cents_string")]
    pub opening_balance_cents: Cents,
    pub status: WalletStatus,
    /// Bumped by every write to the wallet row
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: UserId, opening_balance_cents: Cents) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance_cents: opening_balance_cents,
            opening_balance_cents,
            status: WalletStatus::Unfrozen,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.status == WalletStatus::Frozen
    }
}
