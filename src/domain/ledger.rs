use std::collections::HashMap;

use serde::Serialize;

use super::{Cents, Transaction, TransactionType, UserId, Wallet, WalletId};

/// Signed balance delta for a transaction of the given type and amount.
/// Income adds to the wallet, Expense subtracts from it.
pub fn balance_effect(kind: TransactionType, amount_cents: Cents) -> Cents {
    match kind {
        TransactionType::Income => amount_cents,
        TransactionType::Expense => -amount_cents,
    }
}

/// Balance after recording a new transaction, or `None` on overflow.
pub fn apply_transaction(
    balance: Cents,
    kind: TransactionType,
    amount_cents: Cents,
) -> Option<Cents> {
    balance.checked_add(balance_effect(kind, amount_cents))
}

/// Balance after replacing `old` with a transaction of `kind`/`amount_cents`:
/// the old effect is undone before the new one is applied.
pub fn revise_transaction(
    balance: Cents,
    old: &Transaction,
    kind: TransactionType,
    amount_cents: Cents,
) -> Option<Cents> {
    balance
        .checked_sub(old.balance_effect())?
        .checked_add(balance_effect(kind, amount_cents))
}

/// Balance after removing `old` from the wallet history.
pub fn reverse_transaction(balance: Cents, old: &Transaction) -> Option<Cents> {
    balance.checked_sub(old.balance_effect())
}

/// A wallet whose stored balance disagrees with its transaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceMismatch {
    pub wallet_id: WalletId,
    pub user_id: UserId,
    #[serde(serialize_with = "super::cents_string::serialize")]
    pub stored: Cents,
    #[serde(serialize_with = "super::cents_string::serialize")]
    pub expected: Cents,
}

/// Result of replaying every wallet's history against its stored balance.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub wallet_count: i64,
    pub transaction_count: i64,
    pub mismatches: Vec<BalanceMismatch>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Build an integrity report from wallets and the summed transaction effects
/// per wallet. Wallets missing from `effects` have no transactions.
pub fn build_integrity_report(
    wallets: &[Wallet],
    effects: &HashMap<WalletId, Cents>,
    transaction_count: i64,
) -> IntegrityReport {
    let mismatches = wallets
        .iter()
        .filter_map(|wallet| {
            let effect = effects.get(&wallet.id).copied().unwrap_or(0);
            let expected = wallet.opening_balance_cents.saturating_add(effect);
            (expected != wallet.balance_cents).then(|| BalanceMismatch {
                wallet_id: wallet.id,
                user_id: wallet.user_id,
                stored: wallet.balance_cents,
                expected,
            })
        })
        .collect();

    IntegrityReport {
        wallet_count: wallets.len() as i64,
        transaction_count,
        mismatches,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::Category;

    fn make_transaction(kind: TransactionType, amount: Cents) -> Transaction {
        Transaction::new(Uuid::new_v4(), kind, amount, Category::Food)
    }

    #[test]
    fn test_apply_income_and_expense() {
        assert_eq!(apply_transaction(10000, TransactionType::Income, 5000), Some(15000));
        assert_eq!(apply_transaction(15000, TransactionType::Expense, 3000), Some(12000));
    }

    #[test]
    fn test_expense_may_overdraw() {
        assert_eq!(apply_transaction(1000, TransactionType::Expense, 2500), Some(-1500));
    }

    #[test]
    fn test_apply_overflow_is_none() {
        assert_eq!(apply_transaction(Cents::MAX, TransactionType::Income, 1), None);
        assert_eq!(apply_transaction(Cents::MIN, TransactionType::Expense, 1), None);
    }

    #[test]
    fn test_revise_undoes_old_effect_first() {
        let old = make_transaction(TransactionType::Expense, 3000);
        // 12000 already includes the -3000; switching to +2000 income gives 17000
        assert_eq!(
            revise_transaction(12000, &old, TransactionType::Income, 2000),
            Some(17000)
        );
        // Same type, different amount
        assert_eq!(
            revise_transaction(12000, &old, TransactionType::Expense, 1000),
            Some(14000)
        );
    }

    #[test]
    fn test_reverse_restores_prior_balance() {
        let income = make_transaction(TransactionType::Income, 5000);
        let expense = make_transaction(TransactionType::Expense, 3000);

        assert_eq!(reverse_transaction(15000, &income), Some(10000));
        assert_eq!(reverse_transaction(12000, &expense), Some(15000));
    }

    #[test]
    fn test_integrity_report_detects_drift() {
        let mut healthy = Wallet::new(1, 10000);
        healthy.balance_cents = 12000;
        let mut drifted = Wallet::new(2, 0);
        drifted.balance_cents = 500;
        let untouched = Wallet::new(3, 2500);

        let mut effects = HashMap::new();
        effects.insert(healthy.id, 2000);
        effects.insert(drifted.id, 700);

        let report = build_integrity_report(
            &[healthy, drifted.clone(), untouched],
            &effects,
            4,
        );

        assert!(!report.is_healthy());
        assert_eq!(report.wallet_count, 3);
        assert_eq!(
            report.mismatches,
            vec![BalanceMismatch {
                wallet_id: drifted.id,
                user_id: 2,
                stored: 500,
                expected: 700,
            }]
        );
    }

    #[test]
    fn test_integrity_report_healthy_when_history_matches() {
        let mut wallet = Wallet::new(1, 10000);
        wallet.balance_cents = 7000;
        let mut effects = HashMap::new();
        effects.insert(wallet.id, -3000);

        let report = build_integrity_report(&[wallet], &effects, 1);
        assert!(report.is_healthy());
        assert_eq!(report.transaction_count, 1);
    }

    #[test]
    fn test_mismatch_serializes_money_as_decimal_strings() {
        let mismatch = BalanceMismatch {
            wallet_id: Uuid::new_v4(),
            user_id: 2,
            stored: 1,
            expected: 10000,
        };
        let value = serde_json::to_value(&mismatch).unwrap();
        assert_eq!(value["stored"], "0.01");
        assert_eq!(value["expected"], "100.00");
    }
}
