#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::panic, clippy::unwrap_used, clippy::expect_used))]

use std::sync::Arc;

use color_eyre::eyre::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{
    cli::CliArgs,
    config::Config,
    dispatcher::Dispatcher,
    domain::command::{DEPOSIT_STREAM, WITHDRAW_STREAM},
    ledger::{
        client::LedgerClient, connect::connect_with_retry, schema::init_tables,
        sqlite::SqliteLedgerStore,
    },
    query::{transaction::save_transactions_csv, wallet::print_wallets_csv},
    queue::Broker,
};

pub(crate) mod cli;
mod config;
mod csv;
mod dispatcher;
mod domain;
mod ingest;
mod ledger;
mod query;
mod queue;
mod telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::load()?;
    let config = Config::load()?;
    telemetry::init();

    let wallets = csv::read_input::<csv::CsvWalletRecord>(&cli_args.wallets_file_path)?;
    let commands = csv::read_input::<csv::CsvCommandRecord>(&cli_args.commands_file_path)?;

    // Wallets and transactions share one sqlite db, a temp file per run unless configured.
    let sqlite_pool = connect_with_retry(&config.database_url, &config.connect_retry).await?;
    init_tables(&sqlite_pool).await?;
    let seeded = ingest::seed_wallets(&sqlite_pool, wallets).await?;
    info!("Seeded {} wallets", seeded);

    let mut broker = Broker::new(config.queue_capacity);
    broker.declare(DEPOSIT_STREAM);
    broker.declare(WITHDRAW_STREAM);
    let deposits = broker.subscribe(DEPOSIT_STREAM)?;
    let withdrawals = broker.subscribe(WITHDRAW_STREAM)?;
    let deposit_publisher = broker.publisher(DEPOSIT_STREAM)?;
    let withdraw_publisher = broker.publisher(WITHDRAW_STREAM)?;
    drop(broker);

    let (dead_letter_sink, mut dead_letters) = mpsc::unbounded_channel();
    let client = Arc::new(LedgerClient::new(
        SqliteLedgerStore::new(sqlite_pool.clone()),
        config.consistency,
        config.store_retry.clone(),
    ));
    let dispatcher = Dispatcher::new(client.clone()).with_dead_letters(dead_letter_sink);
    let running = tokio::spawn(dispatcher.run(deposits, withdrawals));

    let published =
        ingest::publish_commands(commands, &deposit_publisher, &withdraw_publisher).await?;
    drop(deposit_publisher);
    drop(withdraw_publisher);

    let stats = running.await??;
    info!("Published {} commands, dispatch finished: {:?}", published, stats);

    while let Some(dead) = dead_letters.recv().await {
        warn!(
            "Dropped {} of {} for wallet {} at {}: {}",
            dead.command.kind, dead.command.amount, dead.command.wallet_id, dead.stage, dead.reason
        );
    }

    if let Some(path) = &cli_args.transactions_file_path {
        save_transactions_csv(client.as_ref(), &sqlite_pool, path).await?;
    }
    print_wallets_csv(&sqlite_pool).await?;

    Ok(())
}
