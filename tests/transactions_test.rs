mod common;

use anyhow::Result;
use coinpurse::application::{AppError, TransactionRequest};
use coinpurse::domain::{Category, TransactionType, WalletStatus};
use common::{open_wallet, record, test_service};
use uuid::Uuid;

#[tokio::test]
async fn test_income_then_expense_then_filter() -> Result<()> {
    let (service, _temp) = test_service().await?;
    open_wallet(&service, 1, "100.00").await?;

    let balance = record(&service, 1, "Income", "50.00", "Salary").await?;
    assert_eq!(balance, 15000);

    let balance = record(&service, 1, "Expense", "30.00", "Food").await?;
    assert_eq!(balance, 12000);

    let food = service.filter_by_category(1, Some("Food")).await?;
    assert_eq!(food.total, 1);
    assert_eq!(food.transactions[0].kind, TransactionType::Expense);
    assert_eq!(food.transactions[0].amount_cents, 3000);
    assert_eq!(food.transactions[0].category, Category::Food);

    assert_eq!(service.get_wallet(1).await?.balance_cents, 12000);

    Ok(())
}

#[tokio::test]
async fn test_list_is_in_recording_order_and_idempotent() -> Result<()> {
    let (service, _temp) = test_service().await?;
    open_wallet(&service, 1, "0").await?;

    record(&service, 1, "Income", "10", "Salary").await?;
    record(&service, 1, "Expense", "2.50", "Transportation").await?;
    record(&service, 1, "Income", "5", "Savings").await?;

    let first = service.list_transactions(1).await?;
    let second = service.list_transactions(1).await?;
    assert_eq!(first, second);
    assert_eq!(first.total, 3);

    let sequences: Vec<i64> = first.transactions.iter().map(|t| t.sequence).collect();
    let mut sorted = sequences.clone();
    sorted.sort();
    assert_eq!(sequences, sorted);
    assert_eq!(first.transactions[1].category, Category::Transportation);

    Ok(())
}

#[tokio::test]
async fn test_empty_list_for_new_wallet() -> Result<()> {
    let (service, _temp) = test_service().await?;
    open_wallet(&service, 7, "25").await?;

    let list = service.list_transactions(7).await?;
    assert!(list.transactions.is_empty());
    assert_eq!(list.total, 0);

    Ok(())
}

#[tokio::test]
async fn test_missing_wallet_is_reported() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let err = service
        .create_transaction(42, &TransactionRequest::new("Income", "10", "Salary"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::WalletNotFound));

    let err = service.list_transactions(42).await.unwrap_err();
    assert!(matches!(err, AppError::WalletNotFound));

    Ok(())
}

#[tokio::test]
async fn test_frozen_wallet_rejects_mutations() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let wallet = open_wallet(&service, 1, "100").await?;
    let result = service
        .create_transaction(1, &TransactionRequest::new("Expense", "10", "Food"))
        .await?;

    service
        .set_wallet_status(wallet.id, WalletStatus::Frozen)
        .await?;

    let err = service
        .create_transaction(1, &TransactionRequest::new("Income", "50", "Salary"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::WalletFrozen));

    let err = service
        .update_transaction(
            1,
            result.transaction.id,
            &TransactionRequest::new("Expense", "20", "Food"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::WalletFrozen));

    let err = service
        .delete_transaction(1, result.transaction.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::WalletFrozen));

    // Reads still work and nothing moved
    assert_eq!(service.get_wallet(1).await?.balance_cents, 9000);
    assert_eq!(service.list_transactions(1).await?.total, 1);

    Ok(())
}

#[tokio::test]
async fn test_invalid_input_leaves_balance_unchanged() -> Result<()> {
    let (service, _temp) = test_service().await?;
    open_wallet(&service, 1, "100").await?;

    for (kind, amount, category, field) in [
        ("Income", "0", "Salary", "amount"),
        ("Expense", "-5", "Food", "amount"),
        ("Expense", "1.005", "Food", "amount"),
        ("Expense", "5", "Rent", "category"),
        ("Gift", "5", "Food", "type"),
    ] {
        let err = service
            .create_transaction(1, &TransactionRequest::new(kind, amount, category))
            .await
            .unwrap_err();
        match err {
            AppError::Validation(errors) => assert!(errors.has_field(field)),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    assert_eq!(service.get_wallet(1).await?.balance_cents, 10000);
    assert_eq!(service.list_transactions(1).await?.total, 0);

    Ok(())
}

#[tokio::test]
async fn test_type_and_category_must_match_exactly() -> Result<()> {
    let (service, _temp) = test_service().await?;
    open_wallet(&service, 1, "0").await?;

    let balance = record(&service, 1, "Income", "12.34", "Savings").await?;
    assert_eq!(balance, 1234);

    let err = service
        .create_transaction(1, &TransactionRequest::new("income", "1", "Savings"))
        .await
        .unwrap_err();
    match err {
        AppError::Validation(errors) => assert!(errors.has_field("type")),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(service.get_wallet(1).await?.balance_cents, 1234);

    let err = service
        .create_transaction(1, &TransactionRequest::new("Income", "1", "savings"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = service.filter_by_category(1, Some("food")).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = service.filter_by_category(1, None).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    Ok(())
}

#[tokio::test]
async fn test_expense_may_overdraw() -> Result<()> {
    let (service, _temp) = test_service().await?;
    open_wallet(&service, 1, "10").await?;

    let balance = record(&service, 1, "Expense", "25", "Food").await?;
    assert_eq!(balance, -1500);

    Ok(())
}

#[tokio::test]
async fn test_update_rederives_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    open_wallet(&service, 1, "100").await?;

    let created = service
        .create_transaction(1, &TransactionRequest::new("Expense", "30", "Food"))
        .await?;
    assert_eq!(created.balance_cents, 7000);

    let updated = service
        .update_transaction(
            1,
            created.transaction.id,
            &TransactionRequest::new("Income", "40", "Salary"),
        )
        .await?;
    assert_eq!(updated.balance_cents, 14000);
    assert_eq!(updated.transaction.id, created.transaction.id);
    assert_eq!(updated.transaction.sequence, created.transaction.sequence);
    assert_eq!(updated.transaction.created_at, created.transaction.created_at);
    assert_eq!(updated.transaction.kind, TransactionType::Income);

    let stored = service.get_transaction(1, created.transaction.id).await?;
    assert_eq!(stored.amount_cents, 4000);
    assert_eq!(stored.category, Category::Salary);

    assert_eq!(service.get_wallet(1).await?.balance_cents, 14000);
    assert!(service.check_integrity().await?.is_healthy());

    Ok(())
}

#[tokio::test]
async fn test_delete_reverses_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    open_wallet(&service, 1, "100").await?;

    let income = service
        .create_transaction(1, &TransactionRequest::new("Income", "50", "Salary"))
        .await?;
    record(&service, 1, "Expense", "30", "Food").await?;

    let deleted = service.delete_transaction(1, income.transaction.id).await?;
    assert_eq!(deleted.balance_cents, 7000);
    assert_eq!(deleted.transaction.id, income.transaction.id);

    let err = service
        .get_transaction(1, income.transaction.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TransactionNotFound));

    let err = service
        .delete_transaction(1, income.transaction.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TransactionNotFound));

    assert_eq!(service.get_wallet(1).await?.balance_cents, 7000);
    assert!(service.check_integrity().await?.is_healthy());

    Ok(())
}

#[tokio::test]
async fn test_transactions_are_scoped_to_their_owner() -> Result<()> {
    let (service, _temp) = test_service().await?;
    open_wallet(&service, 1, "100").await?;
    open_wallet(&service, 2, "100").await?;

    let theirs = service
        .create_transaction(1, &TransactionRequest::new("Expense", "10", "Food"))
        .await?;

    let err = service
        .get_transaction(2, theirs.transaction.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TransactionNotFound));

    let err = service
        .update_transaction(
            2,
            theirs.transaction.id,
            &TransactionRequest::new("Income", "1000", "Salary"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TransactionNotFound));

    let err = service
        .delete_transaction(2, theirs.transaction.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TransactionNotFound));

    assert_eq!(service.list_transactions(2).await?.total, 0);
    assert_eq!(service.get_wallet(1).await?.balance_cents, 9000);
    assert_eq!(service.get_wallet(2).await?.balance_cents, 10000);

    Ok(())
}

#[tokio::test]
async fn test_unknown_transaction_id() -> Result<()> {
    let (service, _temp) = test_service().await?;
    open_wallet(&service, 1, "0").await?;

    let err = service
        .get_transaction(1, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TransactionNotFound));

    Ok(())
}
