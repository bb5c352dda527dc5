use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{format_cents, Transaction, UserId, Wallet};

/// Snapshot of one user's wallet and its full transaction history
#[derive(Debug, Clone, Serialize)]
pub struct WalletSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub wallet: Wallet,
    pub transactions: Vec<Transaction>,
}

/// Exporter for converting a user's ledger data to various formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export the user's transactions to CSV format
    pub async fn export_transactions_csv<W: Write>(&self, owner: UserId, writer: W) -> Result<usize> {
        let list = self.service.list_transactions(owner).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "type",
            "amount",
            "category",
            "created_at",
            "updated_at",
        ])?;

        for transaction in &list.transactions {
            csv_writer.write_record([
                transaction.id.to_string(),
                transaction.sequence.to_string(),
                transaction.kind.to_string(),
                format_cents(transaction.amount_cents),
                transaction.category.to_string(),
                transaction.created_at.to_rfc3339(),
                transaction.updated_at.to_rfc3339(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(list.total)
    }

    /// Export the user's wallet and transactions as a JSON snapshot
    pub async fn export_wallet_json<W: Write>(
        &self,
        owner: UserId,
        mut writer: W,
    ) -> Result<WalletSnapshot> {
        let wallet = self.service.get_wallet(owner).await?;
        let list = self.service.list_transactions(owner).await?;

        let snapshot = WalletSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            wallet,
            transactions: list.transactions,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
