//! Mapping from loosely typed requests to validated commands.
//!
//! Requests carry the raw strings a client sent (all optional, so a missing
//! field is reported like any other invalid one). `validate` either yields a
//! strongly typed command or every field-level problem at once.

use serde::Deserialize;

use crate::domain::{parse_cents, Category, Cents, ParseCentsError, TransactionType};

use super::ValidationErrors;

/// Raw body of a create/update transaction request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub amount: Option<String>,
    pub category: Option<String>,
}

/// A transaction request that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewTransaction {
    pub kind: TransactionType,
    pub amount_cents: Cents,
    pub category: Category,
}

impl TransactionRequest {
    pub fn new(
        kind: impl Into<String>,
        amount: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            kind: Some(kind.into()),
            amount: Some(amount.into()),
            category: Some(category.into()),
        }
    }

    pub fn validate(&self) -> Result<NewTransaction, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let kind = match self.kind.as_deref() {
            None => {
                errors.add("type", "Type is required");
                None
            }
            Some(raw) => {
                let kind = TransactionType::from_str(raw);
                if kind.is_none() {
                    errors.add("type", "Type must be either Income or Expense");
                }
                kind
            }
        };

        let amount_cents = match self.amount.as_deref() {
            None => {
                errors.add("amount", "Amount is required");
                None
            }
            Some(raw) => match parse_positive_amount(raw) {
                Ok(cents) => Some(cents),
                Err(message) => {
                    errors.add("amount", message);
                    None
                }
            },
        };

        let category = match parse_category(self.category.as_deref()) {
            Ok(category) => Some(category),
            Err(category_errors) => {
                errors.errors.extend(category_errors.errors);
                None
            }
        };

        match (kind, amount_cents, category) {
            (Some(kind), Some(amount_cents), Some(category)) if errors.is_empty() => {
                Ok(NewTransaction {
                    kind,
                    amount_cents,
                    category,
                })
            }
            _ => Err(errors),
        }
    }
}

/// Raw body of a create-wallet request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletRequest {
    /// Opening balance; a missing balance means zero
    pub balance: Option<String>,
}

/// A wallet request that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewWallet {
    pub opening_balance_cents: Cents,
}

impl WalletRequest {
    pub fn with_balance(balance: impl Into<String>) -> Self {
        Self {
            balance: Some(balance.into()),
        }
    }

    pub fn validate(&self) -> Result<NewWallet, ValidationErrors> {
        let opening_balance_cents = match self.balance.as_deref() {
            None => 0,
            Some(raw) => match parse_cents(raw) {
                Ok(cents) if cents >= 0 => cents,
                Ok(_) => {
                    return Err(ValidationErrors::single(
                        "balance",
                        "Balance must be a non-negative number",
                    ));
                }
                Err(err) => {
                    return Err(ValidationErrors::single(
                        "balance",
                        format!("Balance must be a non-negative number ({})", err),
                    ));
                }
            },
        };

        Ok(NewWallet {
            opening_balance_cents,
        })
    }
}

/// Validate a category filter value against the fixed category set.
pub fn parse_category(raw: Option<&str>) -> Result<Category, ValidationErrors> {
    match raw.map(str::trim) {
        None | Some("") => Err(ValidationErrors::single("category", "Category is required")),
        Some(raw) => Category::from_str(raw).ok_or_else(|| {
            ValidationErrors::single(
                "category",
                format!("Category must be one of: {}", Category::names()),
            )
        }),
    }
}

fn parse_positive_amount(raw: &str) -> Result<Cents, String> {
    match parse_cents(raw) {
        Ok(cents) if cents > 0 => Ok(cents),
        Ok(_) => Err("Amount must be a positive number".to_string()),
        Err(ParseCentsError::TooPrecise) => {
            Err("Amount must have at most two decimal places".to_string())
        }
        Err(err) => Err(format!("Amount must be a positive number ({})", err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_request_maps_to_command() {
        let command = TransactionRequest::new("Income", "50.00", "Salary")
            .validate()
            .unwrap();
        assert_eq!(
            command,
            NewTransaction {
                kind: TransactionType::Income,
                amount_cents: 5000,
                category: Category::Salary,
            }
        );
    }

    #[test]
    fn test_zero_and_negative_amounts_rejected() {
        for amount in ["0", "0.00", "-5"] {
            let errors = TransactionRequest::new("Expense", amount, "Food")
                .validate()
                .unwrap_err();
            assert!(errors.has_field("amount"), "amount {amount} should be rejected");
        }
    }

    #[test]
    fn test_unknown_category_rejected() {
        let errors = TransactionRequest::new("Expense", "10", "Rent")
            .validate()
            .unwrap_err();
        assert_eq!(errors.errors.len(), 1);
        assert_eq!(errors.errors[0].field, "category");
    }

    #[test]
    fn test_all_problems_reported_at_once() {
        let errors = TransactionRequest {
            kind: Some("Transfer".into()),
            amount: Some("abc".into()),
            category: None,
        }
        .validate()
        .unwrap_err();

        let fields: Vec<_> = errors.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["type", "amount", "category"]);
    }

    #[test]
    fn test_deserializes_type_field() {
        let request: TransactionRequest =
            serde_json::from_str(r#"{"type":"Expense","amount":"30.00","category":"Food"}"#)
                .unwrap();
        assert_eq!(request.validate().unwrap().kind, TransactionType::Expense);
    }

    #[test]
    fn test_wallet_balance_defaults_to_zero() {
        let wallet = WalletRequest::default().validate().unwrap();
        assert_eq!(wallet.opening_balance_cents, 0);
    }

    #[test]
    fn test_wallet_balance_must_be_non_negative() {
        assert!(WalletRequest::with_balance("-1").validate().is_err());
        assert!(WalletRequest::with_balance("ten").validate().is_err());
        assert_eq!(
            WalletRequest::with_balance("100.00")
                .validate()
                .unwrap()
                .opening_balance_cents,
            10000
        );
    }

    #[test]
    fn test_parse_category_requires_value() {
        assert!(parse_category(None).is_err());
        assert!(parse_category(Some("  ")).is_err());
        assert_eq!(parse_category(Some("Food")).unwrap(), Category::Food);
    }
}
