use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::info;

use crate::{
    domain::props::{WalletId, within_bounds},
    ledger::StoreError,
};

pub async fn init_tables(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS wallets
            (
                id      integer                     NOT NULL,
                balance text                        NOT NULL,
                version bigint CHECK (version >= 0) NOT NULL DEFAULT 0,
                PRIMARY KEY (id)
            );",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS transactions
            (
                transaction_id text    NOT NULL,
                wallet_id      integer NOT NULL REFERENCES wallets (id),
                amount         text    NOT NULL,
                kind           text    NOT NULL,
                status         text    NOT NULL,
                recorded_at    text    NOT NULL,
                PRIMARY KEY (transaction_id)
            );",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Creates the wallet, or resets the balance of an existing one.
pub async fn provision_wallet(
    pool: &SqlitePool,
    wallet_id: WalletId,
    balance: Decimal,
) -> Result<(), StoreError> {
    if !within_bounds(balance) {
        return Err(StoreError::InvalidBalance { wallet_id, balance });
    }

    sqlx::query(
        "INSERT INTO wallets (id, balance, version) VALUES (?, ?, 0)
            ON CONFLICT (id) DO UPDATE SET balance = excluded.balance, version = version + 1",
    )
    .bind(*wallet_id)
    .bind(balance.to_string())
    .execute(pool)
    .await?;

    info!("Provisioned wallet {} with balance {}", wallet_id, balance);

    Ok(())
}
