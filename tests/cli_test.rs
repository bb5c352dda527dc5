mod common;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use coinpurse::cli::Cli;
use coinpurse::storage::Repository;
use common::{open_wallet, test_config};
use tempfile::TempDir;

fn check_command(database: &str, json: bool) -> Result<Cli> {
    let mut args = vec!["coinpurse", "--database", database];
    if json {
        args.push("--json");
    }
    args.push("check");
    Ok(Cli::try_parse_from(args)?)
}

#[tokio::test]
async fn test_check_fails_on_drift_in_both_output_modes() -> Result<()> {
    let temp = TempDir::new()?;
    let config = test_config(&temp);

    let service = coinpurse::LedgerService::init(config.clone()).await?;
    let wallet = open_wallet(&service, 1, "100").await?;
    service.close().await;

    check_command(&config.database_path, true)?.run().await?;
    check_command(&config.database_path, false)?.run().await?;

    let repo = Repository::connect_with(&config).await?;
    let mut tx = repo.begin().await?;
    Repository::write_balance(&mut tx, wallet.id, 1, Utc::now()).await?;
    tx.commit().await?;
    repo.close().await;

    assert!(check_command(&config.database_path, true)?.run().await.is_err());
    assert!(check_command(&config.database_path, false)?.run().await.is_err());

    Ok(())
}
