use color_eyre::eyre::Result;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::{
    csv::{CsvCommandRecord, CsvWalletRecord},
    domain::{
        command::{Command, CommandKind},
        props::WalletId,
    },
    ledger::schema::provision_wallet,
    queue::Publisher,
};

/// Provisions every parsable wallet row. Rows that fail to parse or fall out of
/// bounds are skipped; storage failures abort.
pub async fn seed_wallets(
    pool: &SqlitePool,
    rows: impl Iterator<Item = Result<CsvWalletRecord>>,
) -> Result<usize> {
    let mut seeded = 0;

    for row_result in rows {
        let row = match row_result {
            Ok(row) => row,
            Err(e) => {
                warn!("Skipping wallet row: {}", e);
                continue;
            }
        };

        match provision_wallet(pool, WalletId(row.wallet_id), row.balance).await {
            Ok(()) => seeded += 1,
            Err(e) if e.is_transient() => return Err(e.into()),
            Err(e) => warn!("Skipping wallet {}: {}", row.wallet_id, e),
        }
    }

    Ok(seeded)
}

/// Publishes each command row to its stream as a JSON body.
pub async fn publish_commands(
    rows: impl Iterator<Item = Result<CsvCommandRecord>>,
    deposits: &Publisher,
    withdrawals: &Publisher,
) -> Result<usize> {
    let mut published = 0;

    for row_result in rows {
        let row = match row_result {
            Ok(row) => row,
            Err(e) => {
                debug!("Skipping command row: {}", e);
                continue;
            }
        };

        let command = Command::new(row.kind, row.wallet_id, row.amount);
        let body = serde_json::to_vec(&command.payload())?;
        let publisher = match row.kind {
            CommandKind::Deposit => deposits,
            CommandKind::Withdraw => withdrawals,
        };
        publisher.publish(body).await?;
        published += 1;
    }

    Ok(published)
}
