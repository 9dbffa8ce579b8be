use std::io;

use color_eyre::eyre::{Result, eyre};
use csv::WriterBuilder;
use futures::TryStreamExt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::ledger::sqlite::parse_decimal;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub(crate) struct WalletView {
    #[serde(rename = "wallet")]
    pub wallet_id: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
}

pub async fn print_wallets_csv(sqlite_pool: &SqlitePool) -> Result<()> {
    write_wallets_csv(sqlite_pool, io::stdout()).await
}

/// Every wallet ordered by id, one `wallet,balance` row each.
pub async fn write_wallets_csv<W: io::Write>(sqlite_pool: &SqlitePool, out: W) -> Result<()> {
    let mut csv_writer = WriterBuilder::new().from_writer(out);

    let mut query = sqlx::query("select id, balance from wallets order by id").fetch(sqlite_pool);
    while let Some(row) = query.try_next().await.map_err(|e| eyre!(e))? {
        let balance: String = row.get("balance");
        csv_writer.serialize(WalletView {
            wallet_id: row.get("id"),
            balance: parse_decimal(&balance)?,
        })?;
    }
    csv_writer.flush()?;

    Ok(())
}
