use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, WalletId};

pub type TransactionId = Uuid;

/// Direction of a transaction relative to the wallet balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "Income",
            TransactionType::Expense => "Expense",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Income" => Some(TransactionType::Income),
            "Expense" => Some(TransactionType::Expense),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The fixed set of categories a transaction can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Salary,
    Food,
    Savings,
    Transportation,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Salary,
        Category::Food,
        Category::Savings,
        Category::Transportation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Salary => "Salary",
            Category::Food => "Food",
            Category::Savings => "Savings",
            Category::Transportation => "Transportation",
        }
    }

    /// Exact, case-sensitive match against the category names.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Comma separated list of valid names, for error messages.
    pub fn names() -> String {
        Self::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single income or expense event recorded against a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Monotonically increasing sequence number for ordering
    pub sequence: i64,
    pub wallet_id: WalletId,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Amount in cents (always positive)
    #[serde(rename = "amount", with = "super::cents_string")]
    pub amount_cents: Cents,
    pub category: Category,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction. Sequence number must be assigned by the repository.
    pub fn new(
        wallet_id: WalletId,
        kind: TransactionType,
        amount_cents: Cents,
        category: Category,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sequence: 0, // Will be set by repository
            wallet_id,
            kind,
            amount_cents,
            category,
            created_at: now,
            updated_at: now,
        }
    }

    /// Signed change this transaction applies to its wallet balance.
    pub fn balance_effect(&self) -> Cents {
        super::balance_effect(self.kind, self.amount_cents)
    }
}
