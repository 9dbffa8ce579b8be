use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use tracing::{debug, error};

use crate::{
    domain::{
        props::{Amount, TransactionId, WalletId},
        transaction::TransactionRecord,
    },
    ledger::{LedgerStore, StoreError, WalletBalance},
};

/// Ledger store backed by a shared sqlite pool.
#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteLedgerStore { pool }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(FromRow)]
struct WalletRow {
    balance: String,
    version: i64,
}

#[derive(FromRow)]
struct TransactionRow {
    transaction_id: String,
    wallet_id: i64,
    amount: String,
    kind: String,
    status: String,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(TransactionRecord {
            id: row
                .transaction_id
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("transaction id: {}", e)))?,
            wallet_id: WalletId(row.wallet_id),
            amount: Amount(parse_decimal(&row.amount)?),
            kind: row.kind.parse().map_err(StoreError::Corrupt)?,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            recorded_at: row.recorded_at,
        })
    }
}

pub(crate) fn parse_decimal(s: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(s).map_err(|e| StoreError::Corrupt(format!("decimal '{}': {}", s, e)))
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn read_balance(&self, wallet_id: WalletId) -> Result<WalletBalance, StoreError> {
        let row: WalletRow = sqlx::query_as("SELECT balance, version FROM wallets WHERE id = ?")
            .bind(*wallet_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::WalletNotFound(wallet_id))?;

        Ok(WalletBalance {
            wallet_id,
            balance: parse_decimal(&row.balance)?,
            version: row.version,
        })
    }

    async fn write_balance(
        &self,
        wallet_id: WalletId,
        new_balance: Decimal,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated =
            sqlx::query("UPDATE wallets SET balance = ?, version = version + 1 WHERE id = ?")
                .bind(new_balance.to_string())
                .bind(*wallet_id)
                .execute(&mut *tx)
                .await?;

        // Dropping `tx` rolls back.
        if updated.rows_affected() == 0 {
            return Err(StoreError::WalletNotFound(wallet_id));
        }

        tx.commit().await?;
        debug!("Wallet {} balance set to {}", wallet_id, new_balance);

        Ok(())
    }

    async fn append_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_transaction(&mut tx, record).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn read_transaction(&self, id: TransactionId) -> Result<TransactionRecord, StoreError> {
        let row: TransactionRow = sqlx::query_as(
            "SELECT transaction_id, wallet_id, amount, kind, status, recorded_at
                FROM transactions
                WHERE transaction_id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::TransactionNotFound(id))?;

        row.try_into()
    }

    async fn commit_mutation(
        &self,
        read: &WalletBalance,
        new_balance: Decimal,
        record: &TransactionRecord,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE wallets SET balance = ?, version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind(new_balance.to_string())
        .bind(*read.wallet_id)
        .bind(read.version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                wallet_id: read.wallet_id,
                expected: read.version,
            });
        }

        insert_transaction(&mut tx, record).await?;
        tx.commit().await?;

        Ok(())
    }
}

async fn insert_transaction(
    tx: &mut Transaction<'_, Sqlite>,
    record: &TransactionRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO transactions (transaction_id, wallet_id, amount, kind, status, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(record.id.to_string())
    .bind(*record.wallet_id)
    .bind(record.amount.to_string())
    .bind(record.kind.to_string())
    .bind(record.status.to_string())
    .bind(record.recorded_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            StoreError::DuplicateTransaction(record.id)
        }
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
            StoreError::WalletNotFound(record.wallet_id)
        }
        e => {
            error!("Unable to insert transaction record {}: {}", record.id, e);
            StoreError::Database(e)
        }
    })?;

    Ok(())
}
