use std::{fs::File, io};

use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, eyre};
use csv::WriterBuilder;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    domain::{command::CommandKind, props::TransactionId, transaction::TxStatus},
    ledger::{LedgerStore, client::LedgerClient},
};

#[derive(Clone, Debug, Serialize, PartialEq)]
pub(crate) struct TransactionView {
    pub transaction_id: String,
    #[serde(rename = "wallet")]
    pub wallet_id: i64,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub status: TxStatus,
    pub recorded_at: DateTime<Utc>,
}

pub async fn save_transactions_csv<S: LedgerStore>(
    client: &LedgerClient<S>,
    sqlite_pool: &SqlitePool,
    file_path: &str,
) -> Result<()> {
    let file =
        File::create(file_path).map_err(|e| eyre!("Could not write output file: {}", e))?;
    write_transactions_csv(client, sqlite_pool, file).await
}

/// The transaction log in recording order, each record read back by id.
pub async fn write_transactions_csv<S: LedgerStore, W: io::Write>(
    client: &LedgerClient<S>,
    sqlite_pool: &SqlitePool,
    out: W,
) -> Result<()> {
    let mut csv_writer = WriterBuilder::new().from_writer(out);

    // ids first, so the connection is released before each lookup
    let ids: Vec<String> = sqlx::query_scalar(
        "select transaction_id from transactions order by recorded_at, transaction_id",
    )
    .fetch_all(sqlite_pool)
    .await
    .map_err(|e| eyre!(e))?;

    for id in ids {
        let id: TransactionId = id
            .parse()
            .map_err(|e| eyre!("Bad transaction id '{}': {}", id, e))?;
        let record = client.get_transaction(id).await?;

        csv_writer.serialize(TransactionView {
            transaction_id: record.id.to_string(),
            wallet_id: *record.wallet_id,
            kind: record.kind,
            amount: *record.amount,
            status: record.status,
            recorded_at: record.recorded_at,
        })?;
    }
    csv_writer.flush()?;

    Ok(())
}
