use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::domain::UserId;

// Primary SQLite result codes that signal a competing writer.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every field-level problem found while mapping a request to a command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// True if any error was reported for `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed")?;
        for (i, error) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}: {}", sep, error.field, error.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    #[error("Wallet not found. Please create a wallet first.")]
    WalletNotFound,

    #[error("Wallet already exists for user {0}")]
    WalletAlreadyExists(UserId),

    #[error("Wallet is frozen")]
    WalletFrozen,

    #[error("Wallet still has {0} transaction(s)")]
    WalletHasTransactions(i64),

    #[error("Transaction not found")]
    TransactionNotFound,

    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True when the error came from a competing writer holding the database
    /// lock, meaning the whole unit can be retried from scratch.
    pub fn is_write_conflict(&self) -> bool {
        let AppError::Internal(err) = self else {
            return false;
        };

        err.chain()
            .any(|cause| match cause.downcast_ref::<sqlx::Error>() {
                Some(sqlx::Error::Database(db_err)) => db_err
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
                Some(sqlx::Error::PoolTimedOut) => true,
                _ => false,
            })
    }
}
